//! Connected Apple developer account, as provided by the build service
//!
//! - `connection` - the connection record and its session/expiry logic
//! - `client` - providers that fetch the record

pub mod client;
pub mod connection;

pub use client::{BitriseClient, ConnectionProvider, JsonConnectionProvider};
pub use connection::{ApiKeyConnection, Cookie, DeveloperConnection, SessionConnection, TestDevice};
