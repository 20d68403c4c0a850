//! AI proxy module
//!
//! The [`client::AiClient`] trait is the seam AI tools are written against;
//! [`client::ProxyAiClient`] talks to an OpenAI-compatible proxy over HTTP.

pub mod client;
pub mod types;

pub use client::{AiClient, ProxyAiClient};
