//! Database view models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business
//! logic should live in higher layers.

use serde::Serialize;

/// Store-wide counters surfaced by the stats endpoint and ops tooling.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreStats {
    pub total_users: i64,
    pub active_users: i64,
    pub total_downloads: i64,
}
