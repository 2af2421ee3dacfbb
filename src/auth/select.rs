//! Ordered-fallback selection of Apple credentials

use super::credentials::Credentials;
use super::inputs::Inputs;
use super::key::KeyCache;
use super::source::Source;
use crate::devportal::{ConnectionProvider, DeveloperConnection};
use crate::error::{Result, StepError};
use tracing::{debug, info, warn};

const CONNECTION_DOCS: &str = "https://devcenter.bitrise.io/getting-started/configuring-bitrise-steps-that-require-apple-developer-account-data/";

/// Return the credentials of the first source in `sources` that is
/// configured.
///
/// `sources` is checked in order, so it encodes priority, for example
/// `[ConnectionApiKey, ConnectionAppleId, InputApiKey, InputAppleId]`.
/// The developer connection is fetched at most once, and only when some
/// source needs it and a provider is available. A failed fetch does not
/// abort selection; connection sources just see no connection.
///
/// # Errors
/// * the first error returned by a source
/// * [`StepError::MissingAuthConfig`] when no source is configured
pub async fn select(
    provider: Option<&dyn ConnectionProvider>,
    sources: &[Source],
    inputs: &Inputs,
    keys: &KeyCache,
) -> Result<Credentials> {
    let needs_connection = sources.iter().any(|source| source.requires_connection());

    let connection = match provider {
        Some(provider) if needs_connection => fetch_connection(provider).await,
        None if needs_connection => {
            debug!("No developer connection provider configured");
            None
        }
        _ => None,
    };

    for source in sources {
        if let Some(credentials) = source.fetch(connection.as_ref(), inputs, keys).await? {
            info!("{}", source.description());
            return Ok(credentials);
        }
    }

    Err(StepError::MissingAuthConfig)
}

async fn fetch_connection(provider: &dyn ConnectionProvider) -> Option<DeveloperConnection> {
    match provider.developer_connection().await {
        Ok(connection) => {
            if connection.is_empty() {
                info!(
                    "Connected Apple Developer Portal Account not found. Most likely because there is no \
                     Apple Developer Portal Account connected to the build. Read more: {CONNECTION_DOCS}"
                );
            }
            Some(connection)
        }
        Err(e) => {
            report_connection_error(&e);
            None
        }
    }
}

/// Log a failed connection fetch.
///
/// A 404 only means nothing is connected to the build (or it runs locally),
/// so it stays at debug level. Anything else is a real failure.
pub fn report_connection_error(err: &StepError) {
    if err.is_not_found() {
        debug!("Connected Apple Developer Portal Account not found");
        debug!(
            "Most likely because there is no Apple Developer Portal Account connected to the build, \
             or the build is running locally."
        );
        debug!("Read more: {CONNECTION_DOCS}");
    } else {
        warn!(
            "Failed to activate Bitrise Apple Developer Portal connection: {err}. Read more: {CONNECTION_DOCS}"
        );
    }
}
