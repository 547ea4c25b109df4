use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

/// The single persisted record tracking today's elevation quota and whether
/// the subject currently holds elevated access.
///
/// Stored as one JSON blob in the object store; load-then-save with
/// last-writer-wins semantics. Day rollover is not applied here, the quota
/// policy normalizes `date` lazily when it evaluates a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub date: NaiveDate,
    pub count_used: u32,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Default for StateRecord {
    fn default() -> Self {
        Self {
            // Sentinel date guarantees the first quota evaluation rolls over.
            date: NaiveDate::MIN,
            count_used: 0,
            active: false,
            expires_at: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("state blob request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("state blob request rejected ({status}): {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("state blob is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct StateStore {
    base_url: String,
    bucket: String,
    object: String,
    access_token: String,
    http: reqwest::Client,
}

impl StateStore {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.storage_api_base_url.clone(),
            bucket: config.bucket_name.clone(),
            object: config.state_object.clone(),
            access_token: config.google_access_token.clone(),
            http: reqwest::Client::new(),
        }
    }

    /// Fetch the state record. A missing blob is the fresh-deployment case and
    /// yields the default record; a blob that exists but fails to decode is an
    /// error, so a corrupt store can never silently reset the quota.
    pub async fn load(&self) -> Result<StateRecord, StateStoreError> {
        let url = format!(
            "{}/storage/v1/b/{}/o/{}",
            self.base_url, self.bucket, self.object
        );
        let response = self
            .http
            .get(&url)
            .query(&[("alt", "media")])
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(StateRecord::default());
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StateStoreError::Rejected { status, body });
        }

        let raw = response.text().await?;
        let record = serde_json::from_str(&raw)?;
        Ok(record)
    }

    pub async fn save(&self, record: &StateRecord) -> Result<(), StateStoreError> {
        let url = format!("{}/upload/storage/v1/b/{}/o", self.base_url, self.bucket);
        let payload = serde_json::to_vec(record)?;
        let response = self
            .http
            .post(&url)
            .query(&[("uploadType", "media"), ("name", self.object.as_str())])
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StateStoreError::Rejected { status, body });
        }
        Ok(())
    }
}
