//! Credential sources
//!
//! A source produces one kind of credential (Apple ID or API key) from one
//! origin (the connected developer account or the step inputs). Fetching
//! has three outcomes: a credential, `None` when the source is not
//! configured, or an error that aborts resolution.

use super::credentials::{ApiKey, AppleId, Credentials};
use super::inputs::Inputs;
use super::key::KeyCache;
use crate::devportal::DeveloperConnection;
use crate::error::{Result, StepError};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// API key from the connected developer account
    ConnectionApiKey,
    /// Apple ID and two-factor session from the connected developer account
    ConnectionAppleId,
    /// API key from the `api_key_path` and `api_issuer` inputs
    InputApiKey,
    /// Apple ID from the `itunescon_user` and password inputs
    InputAppleId,
}

impl Source {
    /// Provenance line logged when this source provides the credentials
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::ConnectionApiKey => {
                "Connected Apple Developer Portal Account for App Store Connect API found"
            }
            Self::ConnectionAppleId => "Connected session-based Apple Developer Portal Account found",
            Self::InputApiKey => "Authenticating using Step inputs (App Store Connect API)",
            Self::InputAppleId => {
                "Authenticating using Step inputs (session-based). This method does not support 2FA."
            }
        }
    }

    #[must_use]
    pub fn requires_connection(self) -> bool {
        matches!(self, Self::ConnectionApiKey | Self::ConnectionAppleId)
    }

    pub async fn fetch(
        self,
        connection: Option<&DeveloperConnection>,
        inputs: &Inputs,
        keys: &KeyCache,
    ) -> Result<Option<Credentials>> {
        match self {
            Self::ConnectionApiKey => Ok(connection
                .and_then(|conn| conn.api_key.as_ref())
                .map(|api_key| Credentials::ApiKey(ApiKey::from(api_key)))),
            Self::ConnectionAppleId => Ok(connection_apple_id(connection, inputs)),
            Self::InputApiKey => input_api_key(inputs, keys).await,
            Self::InputAppleId => Ok(input_apple_id(inputs)),
        }
    }
}

fn connection_apple_id(
    connection: Option<&DeveloperConnection>,
    inputs: &Inputs,
) -> Option<Credentials> {
    let session_conn = connection.and_then(|conn| conn.session.as_ref())?;

    if !inputs.username.is_empty() && inputs.username != session_conn.apple_id {
        warn!(
            "Connected Apple Developer ({}) and App Store login account ({}) do not match, using the connected account",
            session_conn.apple_id, inputs.username
        );
    }

    if session_conn.expired() {
        let expiry = session_conn
            .expiry()
            .map(|expiry| expiry.to_string())
            .unwrap_or_default();
        warn!("TFA session expired on {expiry}.");
        return None;
    }

    let session = match session_conn.fastlane_login_session() {
        Ok(session) => session,
        Err(e) => {
            warn!("Failed to activate Bitrise Apple Developer Portal connection: {e}");
            return None;
        }
    };

    Some(Credentials::AppleId(AppleId {
        username: session_conn.apple_id.clone(),
        password: session_conn.password.clone(),
        session,
        app_specific_password: inputs.app_specific_password.clone(),
    }))
}

async fn input_api_key(inputs: &Inputs, keys: &KeyCache) -> Result<Option<Credentials>> {
    if inputs.api_key_path.is_empty() {
        return Ok(None);
    }

    let (key, key_id) = keys.fetch_private_key(&inputs.api_key_path).await?;
    let private_key = String::from_utf8(key)
        .map_err(|e| StepError::key_fetch(&inputs.api_key_path, format!("key is not UTF-8: {e}")))?;

    Ok(Some(Credentials::ApiKey(ApiKey {
        key_id,
        issuer_id: inputs.api_issuer.clone(),
        private_key,
    })))
}

fn input_apple_id(inputs: &Inputs) -> Option<Credentials> {
    if inputs.username.is_empty() {
        return None;
    }

    Some(Credentials::AppleId(AppleId {
        username: inputs.username.clone(),
        password: inputs.password.clone(),
        session: String::new(),
        app_specific_password: inputs.app_specific_password.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devportal::{ApiKeyConnection, Cookie, SessionConnection};
    use crate::devportal::connection::AUTH_COOKIE_DOMAIN;
    use crate::test_support::LevelCapture;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::TempDir;
    use tracing::Level;

    fn keys(dir: &TempDir) -> KeyCache {
        KeyCache::new(vec![dir.path().to_path_buf()]).expect("key cache")
    }

    fn session_conn(expiry: Option<chrono::DateTime<Utc>>) -> SessionConnection {
        SessionConnection {
            apple_id: "x@test.org".into(),
            password: "y".into(),
            app_specific_password: "password_from_connection".into(),
            connection_expiry_date: expiry.map(|e| e.to_rfc3339()),
            session_cookies: HashMap::from([(
                AUTH_COOKIE_DOMAIN.to_string(),
                vec![Cookie {
                    name: "myacinfo".into(),
                    value: "token".into(),
                    domain: "idmsa.apple.com".into(),
                    path: "/".into(),
                    ..Default::default()
                }],
            )]),
        }
    }

    fn with_session(session: SessionConnection) -> DeveloperConnection {
        DeveloperConnection {
            session: Some(session),
            ..Default::default()
        }
    }

    #[test]
    fn only_connection_sources_require_connection() {
        assert!(Source::ConnectionApiKey.requires_connection());
        assert!(Source::ConnectionAppleId.requires_connection());
        assert!(!Source::InputApiKey.requires_connection());
        assert!(!Source::InputAppleId.requires_connection());
    }

    #[tokio::test]
    async fn connection_sources_are_absent_without_connection() {
        let dir = TempDir::new().expect("temp dir");
        let empty = DeveloperConnection::default();

        for source in [Source::ConnectionApiKey, Source::ConnectionAppleId] {
            for conn in [None, Some(&empty)] {
                let fetched = source
                    .fetch(conn, &Inputs::default(), &keys(&dir))
                    .await
                    .expect("no error");
                assert_eq!(fetched, None, "{source:?}");
            }
        }
    }

    #[tokio::test]
    async fn connection_api_key_is_passed_through() {
        let dir = TempDir::new().expect("temp dir");
        let conn = DeveloperConnection {
            api_key: Some(ApiKeyConnection {
                key_id: "x".into(),
                issuer_id: "y".into(),
                private_key: "z".into(),
            }),
            ..Default::default()
        };

        let fetched = Source::ConnectionApiKey
            .fetch(Some(&conn), &Inputs::default(), &keys(&dir))
            .await
            .expect("no error");

        assert_eq!(
            fetched,
            Some(Credentials::ApiKey(ApiKey {
                key_id: "x".into(),
                issuer_id: "y".into(),
                private_key: "z".into(),
            }))
        );
    }

    #[tokio::test]
    async fn connection_apple_id_uses_connected_account_and_input_app_password() {
        let dir = TempDir::new().expect("temp dir");
        let conn = with_session(session_conn(Some(Utc::now() + Duration::days(1))));
        let inputs = Inputs {
            username: "a@test.org".into(),
            password: "b".into(),
            app_specific_password: "password_from_input".into(),
            ..Default::default()
        };

        let capture = LevelCapture::default();
        let _guard = capture.install();

        let fetched = Source::ConnectionAppleId
            .fetch(Some(&conn), &inputs, &keys(&dir))
            .await
            .expect("no error");

        let Some(Credentials::AppleId(apple_id)) = fetched else {
            panic!("expected Apple ID credentials, got {fetched:?}");
        };
        assert_eq!(apple_id.username, "x@test.org");
        assert_eq!(apple_id.password, "y");
        assert_eq!(apple_id.app_specific_password, "password_from_input");
        assert!(apple_id.session.contains("name: myacinfo"));
        // Mismatching login account is reported but not fatal
        assert!(capture.contains(Level::WARN));
    }

    #[tokio::test]
    async fn connection_app_password_comes_from_inputs_only() {
        let dir = TempDir::new().expect("temp dir");
        let conn = with_session(session_conn(None));

        let fetched = Source::ConnectionAppleId
            .fetch(Some(&conn), &Inputs::default(), &keys(&dir))
            .await
            .expect("no error");

        let Some(Credentials::AppleId(apple_id)) = fetched else {
            panic!("expected Apple ID credentials, got {fetched:?}");
        };
        assert_eq!(apple_id.app_specific_password, "");
    }

    #[tokio::test]
    async fn expired_session_is_absent_with_warning() {
        let dir = TempDir::new().expect("temp dir");
        let conn = with_session(session_conn(Some(Utc::now() - Duration::hours(1))));
        let inputs = Inputs {
            username: "x@test.org".into(),
            ..Default::default()
        };

        let keys = keys(&dir);
        let capture = LevelCapture::default();
        let _guard = capture.install();

        let fetched = Source::ConnectionAppleId
            .fetch(Some(&conn), &inputs, &keys)
            .await
            .expect("expiry is not an error");

        assert_eq!(fetched, None);
        assert_eq!(capture.levels(), vec![Level::WARN]);
    }

    #[tokio::test]
    async fn broken_session_data_is_absent_with_warning() {
        let dir = TempDir::new().expect("temp dir");
        let mut session = session_conn(None);
        session
            .session_cookies
            .get_mut(AUTH_COOKIE_DOMAIN)
            .expect("auth cookies")[0]
            .value = "line\nbreak".into();
        let conn = with_session(session);

        let capture = LevelCapture::default();
        let _guard = capture.install();

        let fetched = Source::ConnectionAppleId
            .fetch(Some(&conn), &Inputs::default(), &keys(&dir))
            .await
            .expect("session errors are not fatal");

        assert_eq!(fetched, None);
        assert!(capture.contains(Level::WARN));
    }

    #[tokio::test]
    async fn input_sources_are_absent_without_inputs() {
        let dir = TempDir::new().expect("temp dir");
        for source in [Source::InputApiKey, Source::InputAppleId] {
            let fetched = source
                .fetch(None, &Inputs::default(), &keys(&dir))
                .await
                .expect("no error");
            assert_eq!(fetched, None, "{source:?}");
        }
    }

    #[tokio::test]
    async fn input_apple_id_has_no_session() {
        let dir = TempDir::new().expect("temp dir");
        let inputs = Inputs {
            username: "a".into(),
            password: "b".into(),
            app_specific_password: "c".into(),
            ..Default::default()
        };

        let fetched = Source::InputAppleId
            .fetch(None, &inputs, &keys(&dir))
            .await
            .expect("no error");

        assert_eq!(
            fetched,
            Some(Credentials::AppleId(AppleId {
                username: "a".into(),
                password: "b".into(),
                session: String::new(),
                app_specific_password: "c".into(),
            }))
        );
    }

    #[tokio::test]
    async fn input_api_key_reads_key_file() {
        let cache_dir = TempDir::new().expect("temp dir");
        let source_dir = TempDir::new().expect("temp dir");
        let key_path = source_dir.path().join("AuthKey_ABC123.p8");
        std::fs::write(&key_path, "private key").expect("write key");

        let inputs = Inputs {
            api_issuer: "issuer".into(),
            api_key_path: key_path.to_string_lossy().into_owned(),
            ..Default::default()
        };

        let fetched = Source::InputApiKey
            .fetch(None, &inputs, &keys(&cache_dir))
            .await
            .expect("no error");

        assert_eq!(
            fetched,
            Some(Credentials::ApiKey(ApiKey {
                key_id: "ABC123".into(),
                issuer_id: "issuer".into(),
                private_key: "private key".into(),
            }))
        );
    }

    #[tokio::test]
    async fn unreadable_input_key_is_fatal() {
        let dir = TempDir::new().expect("temp dir");
        let inputs = Inputs {
            api_issuer: "issuer".into(),
            api_key_path: "/does/not/exist/AuthKey_ABC123.p8".into(),
            ..Default::default()
        };

        let err = Source::InputApiKey
            .fetch(None, &inputs, &keys(&dir))
            .await
            .expect_err("missing key file");

        assert!(matches!(err, StepError::KeyFetch { .. }));
    }
}
