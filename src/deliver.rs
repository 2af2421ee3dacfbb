//! `fastlane deliver` invocation

use crate::config::StepConfig;
use crate::error::{Result, StepError};
use crate::fastlane::FastlaneParams;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

const FASTLANE: &str = "fastlane";
const ITMS_PARAMETERS_ENV: &str = "DELIVER_ITMSTRANSPORTER_ADDITIONAL_UPLOAD_PARAMETERS";
/// Inherited from the user's environment, it would override `DELIVER_PASSWORD`
const INHERITED_PASSWORD_ENV: &str = "FASTLANE_PASSWORD";

/// A ready-to-run `fastlane deliver` command line
#[derive(Clone, PartialEq, Eq)]
pub struct DeliverCommand {
    pub args: Vec<String>,
    pub envs: BTreeMap<String, String>,
}

impl DeliverCommand {
    /// Fails when the `options` input is not valid shell quoting.
    pub fn new(config: &StepConfig, auth: &FastlaneParams) -> Result<Self> {
        let mut args = vec!["deliver".to_string()];
        args.extend(auth.args.iter().cloned());

        if !config.app_id.is_empty() {
            push(&mut args, "--app", &config.app_id);
            if !config.bundle_id.is_empty() {
                warn!("AppID parameter specified, BundleID will be ignored");
            }
        } else if !config.bundle_id.is_empty() {
            push(&mut args, "--app_identifier", &config.bundle_id);
        }

        if !config.team_name.is_empty() {
            push(&mut args, "--team_name", &config.team_name);
            if !config.team_id.is_empty() {
                warn!("TeamName parameter specified, TeamID will be ignored");
            }
        } else if !config.team_id.is_empty() {
            push(&mut args, "--team_id", &config.team_id);
        }

        if !config.ipa_path.is_empty() {
            push(&mut args, "--ipa", &config.ipa_path);
        } else if !config.pkg_path.is_empty() {
            push(&mut args, "--pkg", &config.pkg_path);
        }

        for (enabled, flag) in [
            (config.skip_screenshots, "--skip_screenshots"),
            (config.skip_metadata, "--skip_metadata"),
            (config.skip_app_version_update, "--skip_app_version_update"),
        ] {
            if enabled {
                args.push(flag.to_string());
            }
        }

        args.push("--force".to_string());
        if config.submit_for_review {
            args.push("--submit_for_review".to_string());
        }
        push(&mut args, "--platform", config.platform.as_str());
        args.extend(config.deliver_options()?);

        let mut envs = auth.envs.clone();
        if !config.itms_upload_parameters.is_empty() {
            envs.insert(
                ITMS_PARAMETERS_ENV.to_string(),
                config.itms_upload_parameters.clone(),
            );
        }

        Ok(Self { args, envs })
    }

    /// Command line for display, quoted for a POSIX shell. Environment
    /// values are never shown.
    #[must_use]
    pub fn printable(&self) -> String {
        shell_words::join(std::iter::once(FASTLANE).chain(self.args.iter().map(String::as_str)))
    }

    /// Run fastlane with the inherited stdio and wait for it to exit.
    pub async fn run(&self) -> Result<()> {
        let program = find_fastlane()?;
        debug!("Using {}", program.display());

        let status = tokio::process::Command::new(&program)
            .args(&self.args)
            .env_remove(INHERITED_PASSWORD_ENV)
            .envs(&self.envs)
            .status()
            .await
            .map_err(|e| StepError::CommandExecution(format!("{FASTLANE} failed to start: {e}")))?;

        if !status.success() {
            return Err(StepError::CommandExecution(format!(
                "Deploy failed, {FASTLANE} deliver exited with {status}"
            )));
        }

        Ok(())
    }
}

impl std::fmt::Debug for DeliverCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliverCommand")
            .field("args", &self.args)
            .field("envs", &self.envs.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn push(args: &mut Vec<String>, flag: &str, value: &str) {
    args.push(flag.to_string());
    args.push(value.to_string());
}

fn find_fastlane() -> Result<PathBuf> {
    which::which(FASTLANE).map_err(|_| {
        StepError::MissingDependency(
            "fastlane not found. Install with:\n\
             \n\
             gem install fastlane\n\
             or: brew install fastlane"
                .to_string(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Platform;
    use pretty_assertions::assert_eq;

    fn auth() -> FastlaneParams {
        let mut params = FastlaneParams::default();
        params
            .envs
            .insert("DELIVER_PASSWORD".to_string(), "secret".to_string());
        params.args = vec!["--username".into(), "a@test.org".into()];
        params
    }

    fn config() -> StepConfig {
        StepConfig {
            ipa_path: "build/My App.ipa".into(),
            bundle_id: "io.bitrise.app".into(),
            ..Default::default()
        }
    }

    #[test]
    fn builds_deliver_arguments_in_order() {
        let command = DeliverCommand::new(
            &StepConfig {
                skip_metadata: true,
                submit_for_review: true,
                team_id: "TEAM".into(),
                platform: Platform::Osx,
                options: "--skip_binary_upload --app_rating_config_path 'rating config.json'".into(),
                ..config()
            },
            &auth(),
        )
        .expect("command");

        assert_eq!(
            command.args,
            vec![
                "deliver",
                "--username",
                "a@test.org",
                "--app_identifier",
                "io.bitrise.app",
                "--team_id",
                "TEAM",
                "--ipa",
                "build/My App.ipa",
                "--skip_metadata",
                "--force",
                "--submit_for_review",
                "--platform",
                "osx",
                "--skip_binary_upload",
                "--app_rating_config_path",
                "rating config.json",
            ]
        );
    }

    #[test]
    fn app_id_and_team_name_take_precedence() {
        let command = DeliverCommand::new(
            &StepConfig {
                app_id: "123".into(),
                team_name: "Team".into(),
                team_id: "TEAM".into(),
                ipa_path: String::new(),
                pkg_path: "app.pkg".into(),
                ..config()
            },
            &FastlaneParams::default(),
        )
        .expect("command");

        assert_eq!(
            command.args,
            vec![
                "deliver",
                "--app",
                "123",
                "--team_name",
                "Team",
                "--pkg",
                "app.pkg",
                "--force",
                "--platform",
                "ios",
            ]
        );
    }

    #[test]
    fn envs_include_credentials_and_itms_parameters() {
        let command = DeliverCommand::new(
            &StepConfig {
                itms_upload_parameters: "-t DAV".into(),
                ..config()
            },
            &auth(),
        )
        .expect("command");

        assert_eq!(command.envs.get("DELIVER_PASSWORD").map(String::as_str), Some("secret"));
        assert_eq!(
            command.envs.get(ITMS_PARAMETERS_ENV).map(String::as_str),
            Some("-t DAV")
        );
    }

    #[test]
    fn malformed_options_are_config_errors() {
        let err = DeliverCommand::new(
            &StepConfig {
                options: "--team_name \"My Team".into(),
                ..config()
            },
            &auth(),
        )
        .expect_err("unbalanced quote");

        assert!(matches!(err, StepError::Config(_)));
    }

    #[test]
    fn printable_round_trips_through_a_shell() {
        let mut auth = auth();
        auth.args.extend(["it's".into(), "$HOME".into(), "a;b".into(), "x\"y".into()]);
        let command = DeliverCommand::new(&config(), &auth).expect("command");
        let printed = command.printable();

        assert!(printed.starts_with("fastlane deliver --username a@test.org"));
        let mut words = shell_words::split(&printed).expect("valid shell words");
        assert_eq!(words.remove(0), FASTLANE);
        assert_eq!(words, command.args);
        assert!(!printed.contains("secret"));
        assert!(!format!("{command:?}").contains("secret"));
    }
}
