//! Turns resolved credentials into fastlane environment variables and
//! arguments

use crate::auth::Credentials;
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use zeroize::Zeroizing;

pub const PASSWORD_ENV: &str = "DELIVER_PASSWORD";
pub const SESSION_ENV: &str = "FASTLANE_SESSION";
pub const APP_SPECIFIC_PASSWORD_ENV: &str = "FASTLANE_APPLE_APPLICATION_SPECIFIC_PASSWORD";

const API_KEY_FILE_NAME: &str = "api_key.json";

/// API key file layout read by fastlane's `--api_key_path`
///
/// See <https://docs.fastlane.tools/app-store-connect-api/#using-fastlane-api-key-json-file>
#[derive(Serialize)]
struct FastlaneApiKey<'a> {
    key_id: &'a str,
    issuer_id: &'a str,
    key: &'a str,
}

/// Authentication parameters for a fastlane invocation
///
/// For API keys this owns the temporary directory holding the key file; the
/// file is removed when the params are dropped, so keep them alive until
/// fastlane has exited.
#[derive(Debug, Default)]
pub struct FastlaneParams {
    pub envs: BTreeMap<String, String>,
    pub args: Vec<String>,
    key_dir: Option<TempDir>,
}

impl FastlaneParams {
    /// Path of the written API key file, if any
    #[must_use]
    pub fn api_key_file(&self) -> Option<PathBuf> {
        self.key_dir
            .as_ref()
            .map(|dir| dir.path().join(API_KEY_FILE_NAME))
    }
}

/// Build fastlane parameters for `credentials`.
///
/// Apple ID secrets go into environment variables and only the username is
/// passed as an argument. An API key is written to a JSON file whose path is
/// passed with `--api_key_path`; precheck of in-app purchases is disabled
/// since it does not work with API key authentication.
///
/// # Errors
/// Fails when the API key file cannot be written.
pub async fn fastlane_auth_params(credentials: &Credentials) -> Result<FastlaneParams> {
    let mut params = FastlaneParams::default();

    match credentials {
        Credentials::AppleId(apple_id) => {
            for (name, value) in [
                (PASSWORD_ENV, &apple_id.password),
                (SESSION_ENV, &apple_id.session),
                (APP_SPECIFIC_PASSWORD_ENV, &apple_id.app_specific_password),
            ] {
                if !value.is_empty() {
                    params.envs.insert(name.to_string(), value.clone());
                }
            }

            if !apple_id.username.is_empty() {
                params.args.push("--username".to_string());
                params.args.push(apple_id.username.clone());
            }
        }
        Credentials::ApiKey(api_key) => {
            let contents = Zeroizing::new(serde_json::to_vec(&FastlaneApiKey {
                key_id: &api_key.key_id,
                issuer_id: &api_key.issuer_id,
                key: &api_key.private_key,
            })?);

            let dir = tempfile::Builder::new().prefix("apiKey").tempdir()?;
            let path = dir.path().join(API_KEY_FILE_NAME);
            write_private(&path, &contents).await?;
            debug!("API key configuration written to {}", path.display());

            params.args.push("--api_key_path".to_string());
            params.args.push(path.to_string_lossy().into_owned());
            params.args.push("--precheck_include_in_app_purchases".to_string());
            params.args.push("false".to_string());
            params.key_dir = Some(dir);
        }
    }

    Ok(params)
}

async fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(path, contents).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    Ok(())
}
