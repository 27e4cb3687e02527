//! JSON wire helpers.
//!
//! 64-bit counters and offsets are serialized as strings: JSON numbers pass
//! through IEEE doubles in most clients and silently lose precision above
//! 2^53.

/// Serialize an `i64` as a decimal string; accept either form on input.
pub mod i64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &i64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(i64),
            Text(String),
        }
        match Raw::deserialize(d)? {
            Raw::Num(n) => Ok(n),
            Raw::Text(t) => t.parse::<i64>().map_err(serde::de::Error::custom),
        }
    }
}

/// `Option<i64>` variant of [`i64_string`]; `null` stays `null`.
pub mod opt_i64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<i64>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(n) => s.serialize_some(&n.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(i64),
            Text(String),
        }
        match Option::<Raw>::deserialize(d)? {
            None => Ok(None),
            Some(Raw::Num(n)) => Ok(Some(n)),
            Some(Raw::Text(t)) => t.parse::<i64>().map(Some).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Counters {
        #[serde(with = "super::i64_string")]
        processed: i64,
        #[serde(with = "super::opt_i64_string")]
        total: Option<i64>,
    }

    #[test]
    fn values_above_2_pow_53_round_trip_without_loss() {
        let big = (1i64 << 53) + 7;
        let c = Counters { processed: big, total: Some(i64::MAX) };
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains(&format!("\"{big}\"")));
        assert!(json.contains(&format!("\"{}\"", i64::MAX)));
        let back: Counters = serde_json::from_str(&json).unwrap();
        assert_eq!(back.processed, big);
        assert_eq!(back.total, Some(i64::MAX));
    }

    #[test]
    fn accepts_plain_numbers_on_input() {
        let back: Counters = serde_json::from_str(r#"{"processed": 12, "total": null}"#).unwrap();
        assert_eq!(back.processed, 12);
        assert_eq!(back.total, None);
    }
}
