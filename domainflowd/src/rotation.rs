//! Persona and proxy rotation, held in a processor's transient batch
//! context. Nothing here is shared across campaigns.

use std::time::Duration;

use uuid::Uuid;

use domainflow_api::proxy::{Proxy, ProxySelectionStrategy};

/// Wall-clock persona rotation: the active index advances once per
/// `interval`, not per item, so a burst of items inside one interval all
/// use the same persona.
#[derive(Debug, Clone)]
pub struct PersonaRotation {
    count: usize,
    interval: Duration,
}

impl PersonaRotation {
    pub fn new(count: usize, interval_seconds: i32) -> Self {
        Self {
            count: count.max(1),
            interval: Duration::from_secs(interval_seconds.max(0) as u64),
        }
    }

    /// Index of the persona active at `elapsed` since the batch started.
    pub fn index_at(&self, elapsed: Duration) -> usize {
        if self.interval.is_zero() {
            return 0;
        }
        ((elapsed.as_secs() / self.interval.as_secs()) as usize) % self.count
    }
}

/// Proxy selection over an ordered pool. Unhealthy or disabled entries are
/// skipped; when nothing remains the item records a proxy error.
#[derive(Debug)]
pub struct ProxySelector {
    pool: Vec<Proxy>,
    strategy: ProxySelectionStrategy,
    cursor: usize,
}

impl ProxySelector {
    pub fn new(pool: Vec<Proxy>, strategy: ProxySelectionStrategy) -> Self {
        Self { pool, strategy, cursor: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Pick the next proxy for an item handled by `persona_id`. Starting
    /// from the strategy's choice, advance until a healthy entry turns up.
    pub fn next(&mut self, persona_id: Uuid) -> Option<&Proxy> {
        if self.pool.is_empty() {
            return None;
        }
        let n = self.pool.len();
        let start = match self.strategy {
            ProxySelectionStrategy::RoundRobin => {
                let i = self.cursor % n;
                self.cursor = self.cursor.wrapping_add(1);
                i
            }
            ProxySelectionStrategy::Random => fastrand::usize(0..n),
            ProxySelectionStrategy::StickyPerPersona => {
                (persona_id.as_u128() % n as u128) as usize
            }
        };
        for step in 0..n {
            let idx = (start + step) % n;
            let p = &self.pool[idx];
            if p.is_enabled && p.is_healthy {
                return Some(&self.pool[idx]);
            }
        }
        None
    }

    /// Mirror a health verdict into the in-memory pool so the rest of the
    /// batch skips a proxy that just failed.
    pub fn mark_unhealthy(&mut self, proxy_id: Uuid) {
        if let Some(p) = self.pool.iter_mut().find(|p| p.id == proxy_id) {
            p.is_healthy = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn rotation_advances_on_wall_clock_not_items() {
        let rot = PersonaRotation::new(3, 10);
        assert_eq!(rot.index_at(Duration::from_secs(0)), 0);
        assert_eq!(rot.index_at(Duration::from_secs(9)), 0);
        assert_eq!(rot.index_at(Duration::from_secs(10)), 1);
        assert_eq!(rot.index_at(Duration::from_secs(25)), 2);
        assert_eq!(rot.index_at(Duration::from_secs(30)), 0);
    }

    #[test]
    fn zero_interval_pins_the_first_persona() {
        let rot = PersonaRotation::new(4, 0);
        assert_eq!(rot.index_at(Duration::from_secs(1_000)), 0);
    }

    fn proxy(name: &str, healthy: bool) -> Proxy {
        Proxy {
            id: Uuid::new_v4(),
            name: name.into(),
            address: format!("{name}.proxy:1080"),
            protocol: domainflow_api::proxy::ProxyProtocol::Socks5,
            username: None,
            password_enc: None,
            is_enabled: true,
            is_healthy: healthy,
            last_checked_at: None,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn round_robin_cycles_and_skips_unhealthy() {
        let pool = vec![proxy("a", true), proxy("b", false), proxy("c", true)];
        let persona = Uuid::new_v4();
        let mut sel = ProxySelector::new(pool, ProxySelectionStrategy::RoundRobin);
        let picks: Vec<String> =
            (0..4).map(|_| sel.next(persona).unwrap().name.clone()).collect();
        assert_eq!(picks, ["a", "c", "c", "a"]);
    }

    #[test]
    fn exhausted_pool_yields_none() {
        let pool = vec![proxy("a", false), proxy("b", false)];
        let mut sel = ProxySelector::new(pool, ProxySelectionStrategy::Random);
        assert!(sel.next(Uuid::new_v4()).is_none());
    }

    #[test]
    fn sticky_strategy_is_stable_per_persona() {
        let pool = vec![proxy("a", true), proxy("b", true), proxy("c", true)];
        let persona = Uuid::new_v4();
        let mut sel = ProxySelector::new(pool, ProxySelectionStrategy::StickyPerPersona);
        let first = sel.next(persona).unwrap().id;
        for _ in 0..5 {
            assert_eq!(sel.next(persona).unwrap().id, first);
        }
    }

    #[test]
    fn marking_unhealthy_redirects_the_rest_of_the_batch() {
        let pool = vec![proxy("a", true), proxy("b", true)];
        let persona = Uuid::new_v4();
        let mut sel = ProxySelector::new(pool, ProxySelectionStrategy::StickyPerPersona);
        let first = sel.next(persona).unwrap().id;
        sel.mark_unhealthy(first);
        assert_ne!(sel.next(persona).unwrap().id, first);
    }
}
