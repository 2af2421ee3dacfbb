//! Resolved Apple credentials

use super::redact;
use crate::devportal::ApiKeyConnection;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Exactly one kind of Apple authentication, ready to hand to fastlane
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    AppleId(AppleId),
    ApiKey(ApiKey),
}

/// Apple ID authentication
///
/// Without two-factor authentication only `username` and `password` are
/// needed. With it, uploads through iTMSTransporter also need the
/// `app_specific_password`, and the App Store Connect web API needs the
/// serialized `session`.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AppleId {
    pub username: String,
    pub password: String,
    pub session: String,
    pub app_specific_password: String,
}

/// App Store Connect API key
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ApiKey {
    pub key_id: String,
    pub issuer_id: String,
    pub private_key: String,
}

impl From<&ApiKeyConnection> for ApiKey {
    fn from(conn: &ApiKeyConnection) -> Self {
        Self {
            key_id: conn.key_id.clone(),
            issuer_id: conn.issuer_id.clone(),
            private_key: conn.private_key.clone(),
        }
    }
}

impl fmt::Debug for AppleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppleId")
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("session", &redact(&self.session))
            .field("app_specific_password", &redact(&self.app_specific_password))
            .finish()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("key_id", &self.key_id)
            .field("issuer_id", &self.issuer_id)
            .field("private_key", &redact(&self.private_key))
            .finish()
    }
}
