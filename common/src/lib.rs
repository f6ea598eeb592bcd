//! Shared building blocks for the MySQL browser service.
//!
//! - `config`: environment driven service configuration
//! - `errors`: the unified error type and its HTTP rendering
//! - `models`: connection configs, catalog entries and query results
//! - `response`: the API response envelope
//! - `middleware`: request id propagation
//! - `utils`: id generation and identifier quoting

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
