//! # Document Numbers
//!
//! Human-readable numbers for orders and stock operations.
//!
//! ```text
//!   OD  20261017  0042  7315
//!   ──  ────────  ────  ────
//!   │   │         │     └── random suffix (4 digits)
//!   │   │         └──────── actor fragment: actor id mod 10000
//!   │   └────────────────── UTC date stamp
//!   └────────────────────── prefix from CheckoutConfig
//! ```
//!
//! Numbers are unique by convention only. The store carries no uniqueness
//! constraint on them; entity ids are the real keys.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generates a number for `actor_id` at `now`.
pub fn generate_number(prefix: &str, actor_id: i64, now: DateTime<Utc>) -> String {
    let random = (Uuid::new_v4().as_u128() % 10_000) as u16;
    format_number(prefix, actor_id, now, random)
}

/// Deterministic part of [`generate_number`].
pub fn format_number(prefix: &str, actor_id: i64, now: DateTime<Utc>, random: u16) -> String {
    format!(
        "{}{}{:04}{:04}",
        prefix,
        now.format("%Y%m%d"),
        actor_id.rem_euclid(10_000),
        random % 10_000
    )
}
