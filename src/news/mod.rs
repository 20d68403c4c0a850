//! NewsAPI module
//!
//! Contains wire types and the HTTP client for the NewsAPI v2 endpoints.

pub mod client;
pub mod types;
