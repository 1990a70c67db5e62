//! Client-side state for the Callboard call-analytics dashboard.
//!
//! [`query`] is the cache engine: keyed entries, deduplicated fetches with
//! retry, mutations that invalidate by key prefix, change notifications and
//! garbage collection. [`resources`] maps the dashboard REST API onto it.

pub mod config;
pub mod infra;
pub mod query;
pub mod resources;
