//! Typed persistence operations. Every function takes an explicit executor
//! so it can run against the pool directly or inside a caller-owned
//! transaction; multi-statement sequences that need a row lock take
//! `&mut PgConnection`.

pub mod audit;
pub mod campaigns;
pub mod cursor;
pub mod dns_results;
pub mod generated;
pub mod http_results;
pub mod jobs;
pub mod keywords;
pub mod params;
pub mod personas;
pub mod proxies;
