//! News MCP Server Library
//!
//! A Model Context Protocol (MCP) server for news headlines from NewsAPI,
//! personalized greetings and AI helper tools backed by a local AI proxy.

pub mod ai;
pub mod auth;
pub mod config;
pub mod error;
pub mod mcp;
pub mod news;
pub mod sanitize;
pub mod schema;

pub use config::Config;
pub use error::{NewsMcpError, Result};
