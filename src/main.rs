use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use appstore_deliver::config::{BuildService, StepConfig};
use appstore_deliver::{
    DeliverCommand, KeyCache, StepError, echo, failure, fastlane_auth_params, select, success,
};

#[derive(Parser)]
#[command(name = "appstore_deliver")]
#[command(version, about = "Upload an app to App Store Connect with fastlane deliver")]
struct Cli {
    /// Path to a step config file (TOML); replaces the step input flags
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    #[command(flatten)]
    step: StepConfig,

    #[command(flatten)]
    build: BuildService,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path).await?,
        None => cli.step,
    };

    appstore_deliver::logging::init(config.verbose_log);
    debug!("{config:?}");

    if let Err(e) = run(&config, &cli.build).await {
        failure!("{e:#}");
        std::process::exit(1);
    }

    success!("Success");
    info!(
        "The app was successfully uploaded to App Store Connect (https://appstoreconnect.apple.com), \
         you should see it in the Prerelease section on the app's page!"
    );
    Ok(())
}

async fn load_config(path: &Path) -> Result<StepConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    Ok(StepConfig::from_toml_str(&content)?)
}

async fn run(config: &StepConfig, build: &BuildService) -> Result<()> {
    config.validate().context("Issue with input")?;
    let inputs = config.auth_inputs().context("Issue with input")?;

    let provider = if config.connection.uses_connection() {
        let provider = build.provider()?;
        if provider.is_none() {
            warn!(
                "Step is not running on bitrise.io: BITRISE_BUILD_URL and BITRISE_BUILD_API_TOKEN envs are not set"
            );
        }
        provider
    } else {
        None
    };

    let keys = KeyCache::standard()?;
    let credentials = match select(
        provider.as_deref(),
        config.connection.sources(),
        &inputs,
        &keys,
    )
    .await
    {
        Ok(credentials) => credentials,
        Err(StepError::MissingAuthConfig) => anyhow::bail!(
            "Apple Service authentication not configured. Connect an Apple Developer Portal \
             account to the build, or provide the itunescon_user and password or the \
             api_key_path and api_issuer inputs"
        ),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context("Could not configure Apple Service authentication"));
        }
    };

    let auth = fastlane_auth_params(&credentials)
        .await
        .context("Failed to set up Apple Service authentication for fastlane")?;
    drop(credentials);

    if !config.password.is_empty() {
        info!(
            "Note: if your password contains special characters and you experience problems, \
             please consider changing your password to something with only alphanumeric characters."
        );
    }

    let command = DeliverCommand::new(config, &auth)?;
    echo!("{}", command.printable());
    command.run().await?;

    // The API key file lives until fastlane has exited
    drop(auth);
    Ok(())
}
