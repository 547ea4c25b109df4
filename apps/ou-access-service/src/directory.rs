use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("directory update rejected ({status}): {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Write-only client for the directory service. The desired unit always comes
/// from configuration, so the subject's current unit is never read back.
#[derive(Clone)]
pub struct DirectoryClient {
    base_url: String,
    access_token: String,
    http: reqwest::Client,
}

impl DirectoryClient {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.directory_api_base_url.clone(),
            access_token: config.google_access_token.clone(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn set_org_unit(
        &self,
        user_email: &str,
        org_unit: &str,
    ) -> Result<(), DirectoryError> {
        let url = format!("{}/admin/directory/v1/users/{}", self.base_url, user_email);
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "orgUnitPath": org_unit }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Rejected { status, body });
        }

        tracing::debug!(
            target: "ou_access.directory",
            org_unit = %org_unit,
            "updated subject organizational unit",
        );
        Ok(())
    }
}
