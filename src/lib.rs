//! Apple credential resolution and App Store Connect uploads with
//! `fastlane deliver`

pub mod auth;
pub mod config;
pub mod deliver;
pub mod devportal;
pub mod error;
pub mod fastlane;
pub mod logging;
pub mod status;

#[cfg(test)]
mod test_support;

// Re-export common types
pub use auth::{Credentials, Inputs, KeyCache, Source, select};
pub use config::{BuildService, ConnectionMode, Platform, StepConfig};
pub use deliver::DeliverCommand;
pub use error::{Result, StepError};
pub use fastlane::{FastlaneParams, fastlane_auth_params};
