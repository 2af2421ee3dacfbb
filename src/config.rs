//! Step configuration: inputs, connection mode and build service access.

use crate::auth::{Inputs, Source};
use crate::devportal::{BitriseClient, ConnectionProvider, JsonConnectionProvider};
use crate::error::{Result, StepError};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, ValueEnum};
use serde::Deserialize;
use std::fmt;

pub const BUILD_URL_ENV: &str = "BITRISE_BUILD_URL";
pub const BUILD_API_TOKEN_ENV: &str = "BITRISE_BUILD_API_TOKEN";
pub const PORTAL_DATA_JSON_ENV: &str = "BITRISE_PORTAL_DATA_JSON";

/// Which credential sources are consulted, and in which order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Connected account first, then step inputs
    #[default]
    Automatic,
    /// Only the API key of the connected account
    #[value(name = "api_key")]
    ApiKey,
    /// Only the Apple ID session of the connected account
    #[value(name = "apple_id")]
    AppleId,
    /// Only step inputs
    Off,
}

impl ConnectionMode {
    #[must_use]
    pub fn sources(self) -> &'static [Source] {
        match self {
            Self::Automatic => &[
                Source::ConnectionApiKey,
                Source::ConnectionAppleId,
                Source::InputApiKey,
                Source::InputAppleId,
            ],
            Self::ApiKey => &[Source::ConnectionApiKey],
            Self::AppleId => &[Source::ConnectionAppleId],
            Self::Off => &[Source::InputApiKey, Source::InputAppleId],
        }
    }

    #[must_use]
    pub fn uses_connection(self) -> bool {
        self.sources().iter().any(|source| source.requires_connection())
    }

    #[must_use]
    pub fn uses_inputs(self) -> bool {
        self.sources().iter().any(|source| !source.requires_connection())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Ios,
    Osx,
    Appletvos,
}

impl Platform {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Osx => "osx",
            Self::Appletvos => "appletvos",
        }
    }
}

/// Deliver step inputs
///
/// Every field can be given as a flag, through the environment variable the
/// build service exports for the input, or in a TOML file.
#[derive(Clone, Default, PartialEq, Eq, Args, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Path to the .ipa to upload
    #[arg(long, env = "ipa_path", default_value = "")]
    pub ipa_path: String,

    /// Path to the .pkg to upload (macOS apps)
    #[arg(long, env = "pkg_path", default_value = "")]
    pub pkg_path: String,

    /// Apple ID of the App Store Connect account
    #[arg(long, env = "itunescon_user", default_value = "")]
    pub itunescon_user: String,

    /// Apple ID password
    #[arg(long, env = "password", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Application-specific password for uploads with two-factor authentication
    #[arg(long, env = "app_password", default_value = "", hide_env_values = true)]
    pub app_password: String,

    /// Path or URL of the App Store Connect API private key (.p8)
    #[arg(long, env = "api_key_path", default_value = "")]
    pub api_key_path: String,

    /// App Store Connect API issuer ID
    #[arg(long, env = "api_issuer", default_value = "")]
    pub api_issuer: String,

    /// Credential sources to use
    #[arg(long, env = "connection", value_enum, default_value = "automatic")]
    pub connection: ConnectionMode,

    /// Apple ID of the app (takes precedence over bundle_id)
    #[arg(long, env = "app_id", default_value = "")]
    pub app_id: String,

    #[arg(long, env = "bundle_id", default_value = "")]
    pub bundle_id: String,

    /// Team ID when the account belongs to more than one team
    #[arg(long, env = "team_id", default_value = "")]
    pub team_id: String,

    /// Team name (takes precedence over team_id)
    #[arg(long, env = "team_name", default_value = "")]
    pub team_name: String,

    #[arg(long, env = "platform", value_enum, default_value = "ios")]
    pub platform: Platform,

    #[arg(long, env = "submit_for_review", value_parser = BoolishValueParser::new(), action = ArgAction::Set, default_value = "no")]
    pub submit_for_review: bool,

    #[arg(long, env = "skip_metadata", value_parser = BoolishValueParser::new(), action = ArgAction::Set, default_value = "no")]
    pub skip_metadata: bool,

    #[arg(long, env = "skip_screenshots", value_parser = BoolishValueParser::new(), action = ArgAction::Set, default_value = "no")]
    pub skip_screenshots: bool,

    #[arg(long, env = "skip_app_version_update", value_parser = BoolishValueParser::new(), action = ArgAction::Set, default_value = "no")]
    pub skip_app_version_update: bool,

    /// Extra iTMSTransporter upload parameters
    #[arg(long, env = "itms_upload_parameters", default_value = "")]
    pub itms_upload_parameters: String,

    #[arg(long, env = "verbose_log", value_parser = BoolishValueParser::new(), action = ArgAction::Set, default_value = "no")]
    pub verbose_log: bool,

    /// Additional fastlane deliver options, shell quoted
    #[arg(long, env = "options", default_value = "", allow_hyphen_values = true)]
    pub options: String,
}

impl StepConfig {
    /// Parse a TOML step configuration; missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| StepError::Config(e.to_string()))
    }

    /// Check that there is something to upload and an app to upload it to.
    pub fn validate(&self) -> Result<()> {
        if self.ipa_path.is_empty() && self.pkg_path.is_empty() {
            return Err(StepError::Config(
                "no IpaPath nor PkgPath parameter specified".to_string(),
            ));
        }
        if self.app_id.is_empty() && self.bundle_id.is_empty() {
            return Err(StepError::Config(
                "no AppID or BundleID parameter specified".to_string(),
            ));
        }
        self.deliver_options()?;
        Ok(())
    }

    /// `options` split into arguments the way a shell would
    pub fn deliver_options(&self) -> Result<Vec<String>> {
        shell_words::split(&self.options).map_err(|e| {
            StepError::Config(format!("failed to split options ({}): {e}", self.options))
        })
    }

    /// Authentication inputs, validated when the connection mode reads them.
    ///
    /// In `automatic` mode unset inputs are fine, the connected account may
    /// provide everything, and `app_password` alone only complements a
    /// connected session. With `off` they are the only source, so they must
    /// be complete.
    pub fn auth_inputs(&self) -> Result<Inputs> {
        let mut inputs = Inputs {
            username: self.itunescon_user.clone(),
            password: self.password.clone(),
            app_specific_password: self.app_password.clone(),
            api_issuer: self.api_issuer.clone(),
            api_key_path: self.api_key_path.clone(),
        };

        let app_password_only = !inputs.app_specific_password.is_empty()
            && inputs.username.trim().is_empty()
            && inputs.password.is_empty()
            && inputs.api_issuer.trim().is_empty()
            && inputs.api_key_path.trim().is_empty();

        if self.connection.uses_inputs()
            && !(app_password_only && self.connection.uses_connection())
            && (!inputs.is_empty() || self.connection == ConnectionMode::Off)
        {
            inputs.validate()?;
        }

        Ok(inputs)
    }
}

impl fmt::Debug for StepConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepConfig")
            .field("ipa_path", &self.ipa_path)
            .field("pkg_path", &self.pkg_path)
            .field("itunescon_user", &self.itunescon_user)
            .field("password", &crate::auth::redact(&self.password))
            .field("app_password", &crate::auth::redact(&self.app_password))
            .field("api_key_path", &self.api_key_path)
            .field("api_issuer", &self.api_issuer)
            .field("connection", &self.connection)
            .field("app_id", &self.app_id)
            .field("bundle_id", &self.bundle_id)
            .field("team_id", &self.team_id)
            .field("team_name", &self.team_name)
            .field("platform", &self.platform)
            .field("submit_for_review", &self.submit_for_review)
            .field("skip_metadata", &self.skip_metadata)
            .field("skip_screenshots", &self.skip_screenshots)
            .field("skip_app_version_update", &self.skip_app_version_update)
            .field("itms_upload_parameters", &self.itms_upload_parameters)
            .field("verbose_log", &self.verbose_log)
            .field("options", &self.options)
            .finish()
    }
}

/// Build service environment, exported by bitrise.io for every build
#[derive(Clone, Default, Args)]
pub struct BuildService {
    #[arg(long, env = BUILD_URL_ENV, default_value = "", hide = true)]
    pub build_url: String,

    #[arg(long, env = BUILD_API_TOKEN_ENV, default_value = "", hide = true, hide_env_values = true)]
    pub build_api_token: String,

    /// Developer connection JSON to use instead of asking the build service
    #[arg(long, env = PORTAL_DATA_JSON_ENV, default_value = "", hide = true, hide_env_values = true)]
    pub portal_data_json: String,
}

impl BuildService {
    /// Connection provider for this environment, if any.
    ///
    /// Inline connection JSON wins over the build service; the build service
    /// needs both the build URL and the API token.
    pub fn provider(&self) -> Result<Option<Box<dyn ConnectionProvider>>> {
        if !self.portal_data_json.is_empty() {
            return Ok(Some(Box::new(JsonConnectionProvider::new(
                self.portal_data_json.clone(),
            ))));
        }

        if self.build_url.is_empty() || self.build_api_token.is_empty() {
            return Ok(None);
        }

        Ok(Some(Box::new(BitriseClient::new(
            &self.build_url,
            &self.build_api_token,
        )?)))
    }
}
