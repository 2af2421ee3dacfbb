//! Private key (.p8) retrieval for API key inputs
//!
//! The key input may point to a local file or to a remote URL. Keys are
//! cached under the directories altool and fastlane search, named
//! `AuthKey_<KEY_ID>.p8`, so a key already present there is reused as-is.

use crate::error::{Result, StepError};
use jsonwebtoken::EncodingKey;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Key ID used when the file name does not carry one
pub const DEFAULT_KEY_ID: &str = "Bitrise";

const DOWNLOAD_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 10;

static KEY_FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"AuthKey_(.+)\.p8").expect("key file pattern is valid"));

/// Key cache directories, in lookup priority order (see altool's man page).
///
/// New keys are stored in the first one.
#[must_use]
pub fn standard_key_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::with_capacity(4);
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join(".appstoreconnect/private_keys"));
        dirs.push(home.join(".private_keys"));
        dirs.push(home.join("private_keys"));
    }
    dirs.push(PathBuf::from("./private_keys"));
    dirs
}

/// Key ID encoded in an `AuthKey_<KEY_ID>.p8` file name, or [`DEFAULT_KEY_ID`]
#[must_use]
pub fn key_id_from_file_name(file_name: &str) -> String {
    KEY_FILE_NAME
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| DEFAULT_KEY_ID.to_string(), |m| m.as_str().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyLocation {
    Local(PathBuf),
    Remote(Url),
}

impl KeyLocation {
    fn parse(raw: &str) -> std::result::Result<Self, String> {
        match Url::parse(raw) {
            Ok(url) => match url.scheme() {
                "file" => url
                    .to_file_path()
                    .map(Self::Local)
                    .map_err(|()| format!("invalid file URL: {raw}")),
                "http" | "https" => Ok(Self::Remote(url)),
                other => Err(format!("unsupported URL scheme: {other}")),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let expanded = shellexpand::tilde(raw).to_string();
                if raw.starts_with('~') && expanded.starts_with('~') {
                    return Err(
                        "could not expand ~ in path (HOME environment variable not set)".to_string(),
                    );
                }
                Ok(Self::Local(PathBuf::from(expanded)))
            }
            Err(e) => Err(format!("invalid key path: {e}")),
        }
    }

    fn file_name(&self) -> String {
        match self {
            Self::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Local store of `.p8` keys
pub struct KeyCache {
    dirs: Vec<PathBuf>,
    http: reqwest::Client,
}

impl KeyCache {
    /// Cache over `dirs`, probed in the given order
    pub fn new(dirs: Vec<PathBuf>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| StepError::HttpRequest(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { dirs, http })
    }

    pub fn standard() -> Result<Self> {
        Self::new(standard_key_dirs())
    }

    #[must_use]
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Resolve the key behind `key_path`, returning its content and key ID.
    ///
    /// A cached `AuthKey_<KEY_ID>.p8` wins over `key_path`; otherwise the key
    /// is copied or downloaded into the first cache directory.
    pub async fn fetch_private_key(&self, key_path: &str) -> Result<(Vec<u8>, String)> {
        let location = KeyLocation::parse(key_path).map_err(|e| StepError::key_fetch(key_path, e))?;
        let key_id = key_id_from_file_name(&location.file_name());
        let file_name = format!("AuthKey_{key_id}.p8");

        let cached = self
            .find_cached(&file_name)
            .await
            .map_err(|e| StepError::key_fetch(key_path, e))?;

        let stored = match cached {
            Some(path) => {
                debug!("Using cached API key: {}", path.display());
                path
            }
            None => {
                let dir = self
                    .dirs
                    .first()
                    .ok_or_else(|| StepError::key_fetch(key_path, "no key cache directory"))?;
                let target = dir.join(&file_name);
                self.store(&location, &target)
                    .await
                    .map_err(|e| StepError::key_fetch(key_path, e))?;
                target
            }
        };

        let key = tokio::fs::read(&stored)
            .await
            .map_err(|e| StepError::key_fetch(key_path, e))?;

        if key.is_empty() {
            return Err(StepError::key_fetch(key_path, "empty key"));
        }

        if EncodingKey::from_ec_pem(&key).is_err() {
            warn!(
                "API key ({}) is not a PEM encoded EC private key, App Store Connect may reject it",
                stored.display()
            );
        }

        Ok((key, key_id))
    }

    async fn find_cached(&self, file_name: &str) -> std::io::Result<Option<PathBuf>> {
        for dir in &self.dirs {
            let candidate = dir.join(file_name);
            if tokio::fs::try_exists(&candidate).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn store(&self, location: &KeyLocation, target: &Path) -> std::result::Result<(), String> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
        }

        match location {
            KeyLocation::Local(source) => {
                tokio::fs::copy(source, target)
                    .await
                    .map_err(|e| format!("failed to copy {}: {e}", source.display()))?;
            }
            KeyLocation::Remote(url) => {
                let bytes = self
                    .http
                    .get(url.clone())
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(|e| format!("failed to download {url}: {e}"))?
                    .bytes()
                    .await
                    .map_err(|e| format!("failed to read {url}: {e}"))?;

                tokio::fs::write(target, &bytes)
                    .await
                    .map_err(|e| format!("failed to write {}: {e}", target.display()))?;
            }
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(target, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| format!("failed to restrict {}: {e}", target.display()))?;
        }

        debug!("Stored API key at {}", target.display());
        Ok(())
    }
}
