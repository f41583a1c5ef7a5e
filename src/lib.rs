//! Cross-exchange funding-rate spread tracker with telegram alerts.
//!
//! Three core pieces: exchange adapters ([`exchanges`]) fetch and
//! normalize per-exchange funding data, the [`aggregator`] fans out to
//! all of them and ranks the largest spread per base asset, and the
//! [`scheduler`] decides per subscriber when and whether a
//! pre-settlement alert fires. The [`telegram`] layer is the
//! presentation surface over that core.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod exchanges;
pub mod models;
pub mod scheduler;
pub mod telegram;
