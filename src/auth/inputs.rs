//! Authentication inputs provided by the step user

use super::redact;
use crate::error::{Result, StepError};
use std::fmt;

/// Apple authentication configuration that is not centrally managed
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Inputs {
    // Apple ID
    pub username: String,
    pub password: String,
    pub app_specific_password: String,
    // App Store Connect API key
    pub api_issuer: String,
    pub api_key_path: String,
}

impl Inputs {
    #[must_use]
    pub fn is_api_key_type(&self) -> bool {
        !self.api_key_path.is_empty() || !self.api_issuer.is_empty()
    }

    #[must_use]
    pub fn is_apple_id_type(&self) -> bool {
        !self.app_specific_password.is_empty()
            || !self.username.is_empty()
            || !self.password.is_empty()
    }

    /// No authentication input was set at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.is_api_key_type() && !self.is_apple_id_type()
    }

    /// Trim surrounding whitespace and check that exactly one kind of
    /// authentication is configured, completely.
    ///
    /// The trimmed values are kept for later use.
    pub fn validate(&mut self) -> Result<()> {
        self.username = self.username.trim().to_string();
        self.api_issuer = self.api_issuer.trim().to_string();
        self.api_key_path = self.api_key_path.trim().to_string();

        let is_api_key = self.is_api_key_type();
        let is_apple_id = self.is_apple_id_type();

        if is_api_key == is_apple_id {
            return Err(StepError::Config(
                "one type of authentication required, either provide itunescon_user with password \
                 and optionally app_password or api_key_path with api_issuer"
                    .to_string(),
            ));
        }

        if is_apple_id {
            if self.username.is_empty() {
                return Err(StepError::Config("no itunescon_user provided".to_string()));
            }
            if self.password.is_empty() {
                return Err(StepError::Config("no password provided".to_string()));
            }
        } else {
            if self.api_issuer.is_empty() {
                return Err(StepError::Config("no api_issuer provided".to_string()));
            }
            if self.api_key_path.is_empty() {
                return Err(StepError::Config("no api_key_path provided".to_string()));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for Inputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inputs")
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("app_specific_password", &redact(&self.app_specific_password))
            .field("api_issuer", &self.api_issuer)
            .field("api_key_path", &self.api_key_path)
            .finish()
    }
}
