//! Apple authentication for App Store Connect uploads
//!
//! - `inputs` - user-provided authentication inputs and their validation
//! - `credentials` - the resolved credential types
//! - `key` - private key download and cache
//! - `source` - where a credential comes from
//! - `select` - picks the first configured source

pub mod credentials;
pub mod inputs;
pub mod key;
pub mod select;
pub mod source;

pub use credentials::{ApiKey, AppleId, Credentials};
pub use inputs::Inputs;
pub use key::KeyCache;
pub use select::select;
pub use source::Source;

/// Placeholder for secrets in `Debug` output; empty values stay visible.
pub(crate) fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "[REDACTED]" }
}
