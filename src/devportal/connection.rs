//! Developer connection record as served by the build service.

use crate::error::{Result, StepError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::warn;

/// Cookie jar key holding the Apple ID authentication cookies
pub const AUTH_COOKIE_DOMAIN: &str = "https://idmsa.apple.com";

/// Point-in-time snapshot of the developer account connected to a build.
///
/// Either sub-record may be missing: a missing sub-record means that kind of
/// authentication is not configured, which is different from a configured
/// record with empty fields.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeveloperConnection {
    #[serde(default, rename = "apple_id_connection", alias = "session_connection")]
    pub session: Option<SessionConnection>,

    #[serde(default, rename = "api_key_connection", alias = "jwt_connection")]
    pub api_key: Option<ApiKeyConnection>,

    #[serde(default)]
    pub test_devices: Vec<TestDevice>,
}

impl DeveloperConnection {
    /// Neither session nor API key authentication is connected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.session.is_none() && self.api_key.is_none()
    }
}

/// Session based (Apple ID + two-factor session) connection
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SessionConnection {
    #[serde(default)]
    pub apple_id: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub app_specific_password: String,
    #[serde(default)]
    pub connection_expiry_date: Option<String>,
    #[serde(default)]
    pub session_cookies: HashMap<String, Vec<Cookie>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Cookie {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub expires: Option<String>,
    #[serde(default)]
    pub max_age: Option<i64>,
    #[serde(default)]
    pub httponly: bool,
    #[serde(default)]
    pub for_domain: Option<bool>,
}

/// App Store Connect API key connection
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiKeyConnection {
    pub key_id: String,
    pub issuer_id: String,
    pub private_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TestDevice {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default, rename = "device_identifier")]
    pub device_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub device_type: String,
}

impl SessionConnection {
    fn auth_cookies(&self) -> &[Cookie] {
        self.session_cookies
            .get(AUTH_COOKIE_DOMAIN)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Effective expiry of the session.
    ///
    /// Uses `connection_expiry_date` when it is present and parsable, else the
    /// earliest `expires` among the authentication cookies. `None` when
    /// neither carries a usable date.
    #[must_use]
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        if let Some(raw) = self.connection_expiry_date.as_deref()
            && !raw.is_empty()
        {
            match DateTime::parse_from_rfc3339(raw) {
                Ok(date) => return Some(date.with_timezone(&Utc)),
                Err(e) => warn!("Could not parse session-based connection expiry date ({raw}): {e}"),
            }
        }

        self.auth_cookies()
            .iter()
            .filter_map(|cookie| cookie.expires.as_deref())
            .filter_map(parse_cookie_date)
            .min()
    }

    /// True when `now` is at or past the effective expiry
    #[must_use]
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry().is_some_and(|expiry| now >= expiry)
    }

    #[must_use]
    pub fn expired(&self) -> bool {
        self.expired_at(Utc::now())
    }

    /// Serialize the authentication cookies into the session text fastlane
    /// reads from `FASTLANE_SESSION`.
    ///
    /// Cookies keep the order they were received in. No cookies yield an
    /// empty string.
    pub fn fastlane_login_session(&self) -> Result<String> {
        let cookies = self.auth_cookies();
        if cookies.is_empty() {
            return Ok(String::new());
        }

        let mut session = String::from("---\n");
        for cookie in cookies {
            for (field, text) in [("name", &cookie.name), ("value", &cookie.value)] {
                if text.contains(['\n', '\r']) {
                    return Err(StepError::SessionData(format!(
                        "cookie {field} contains a line break: {:?}",
                        cookie.name
                    )));
                }
            }

            write!(
                session,
                "- !ruby/object:HTTP::Cookie\n  name: {}\n  value: {}\n  domain: {}\n  for_domain: {}\n  path: \"{}\"\n\n",
                cookie.name,
                cookie.value,
                cookie.domain,
                cookie.for_domain.unwrap_or(true),
                cookie.path,
            )
            .map_err(|e| StepError::SessionData(e.to_string()))?;
        }

        Ok(session)
    }
}

fn parse_cookie_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|date| date.with_timezone(&Utc))
        .ok()
}
