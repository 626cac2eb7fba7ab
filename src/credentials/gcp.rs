//! GCP access tokens for the GCS backend
//!
//! Tokens come from, in `auto` order:
//! 1. `GOOGLE_OAUTH_ACCESS_TOKEN`
//! 2. the GCE/GKE metadata server, when running on Kubernetes or when
//!    `GCE_METADATA_HOST` is set
//! 3. `gcloud auth print-access-token`

use crate::config::schema::{CredentialSource, GcsConfig};
use crate::error::{CacherError, CacherResult};
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Environment variable holding a ready-made access token
pub const TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";
const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Token response from the metadata server
#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// GCP credential provider
pub struct GcpCredentials;

impl GcpCredentials {
    /// Get an access token from the configured source
    pub async fn get_access_token(config: &GcsConfig) -> CacherResult<String> {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        match Self::resolve_source(config.credentials, env) {
            CredentialSource::Env => env(TOKEN_ENV)
                .ok_or_else(|| CacherError::GcpCredential(format!("{} is not set", TOKEN_ENV))),
            CredentialSource::Metadata => {
                let host = env(METADATA_HOST_ENV).unwrap_or_else(|| DEFAULT_METADATA_HOST.into());
                Self::from_metadata_server(host).await
            }
            CredentialSource::Gcloud | CredentialSource::Auto => Self::from_gcloud(config).await,
        }
    }

    /// Pick a concrete source; `Auto` is decided from the environment
    fn resolve_source(
        configured: CredentialSource,
        env: impl Fn(&str) -> Option<String>,
    ) -> CredentialSource {
        if configured != CredentialSource::Auto {
            return configured;
        }
        let source = if env(TOKEN_ENV).is_some() {
            CredentialSource::Env
        } else if env(METADATA_HOST_ENV).is_some() || env("KUBERNETES_SERVICE_HOST").is_some() {
            CredentialSource::Metadata
        } else {
            CredentialSource::Gcloud
        };
        debug!("Using {:?} credentials for GCS", source);
        source
    }

    /// Get access token from gcloud CLI
    async fn from_gcloud(config: &GcsConfig) -> CacherResult<String> {
        info!("Requesting GCP access token from gcloud...");

        let mut cmd = Command::new("gcloud");
        cmd.args(["auth", "print-access-token"]);

        if let Some(account) = &config.service_account {
            cmd.args(["--impersonate-service-account", account]);
        }

        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = cmd
            .output()
            .await
            .map_err(|e| CacherError::command_failed("gcloud auth print-access-token", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not logged in") || stderr.contains("no active account") {
                return Err(CacherError::GcpNotAuthenticated);
            }
            return Err(CacherError::GcpCredential(stderr.trim().to_string()));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if token.is_empty() {
            return Err(CacherError::GcpCredential("Empty token returned".to_string()));
        }

        Ok(token)
    }

    /// Get the default service account token from the metadata server
    async fn from_metadata_server(host: String) -> CacherResult<String> {
        let url = format!("http://{}{}", host, TOKEN_PATH);
        info!("Requesting GCP access token from {}", host);

        tokio::task::spawn_blocking(move || {
            let mut response = ureq::get(&url)
                .header("Metadata-Flavor", "Google")
                .call()
                .map_err(|e| CacherError::GcpCredential(format!("metadata server: {}", e)))?;
            let body = response
                .body_mut()
                .read_to_string()
                .map_err(|e| CacherError::http(&url, e))?;
            parse_metadata_token(&body)
        })
        .await
        .map_err(|e| CacherError::Internal(format!("Token task failed: {}", e)))?
    }
}

fn parse_metadata_token(body: &str) -> CacherResult<String> {
    let token: MetadataToken = serde_json::from_str(body)?;
    if token.access_token.is_empty() {
        return Err(CacherError::GcpCredential(
            "Metadata server returned an empty token".to_string(),
        ));
    }
    Ok(token.access_token)
}
