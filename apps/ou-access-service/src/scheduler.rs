use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Timelike, Utc};
use thiserror::Error;

use crate::config::Config;
use crate::{HEADER_API_KEY, ROUTE_ACCESS_REVERT};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("scheduler request rejected ({status}): {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Client for the external job scheduler that fires the reversion callback.
///
/// One job per subject, named deterministically, so a re-toggle replaces the
/// pending job instead of queueing a second callback.
#[derive(Clone)]
pub struct SchedulerClient {
    base_url: String,
    project_id: String,
    location: String,
    user_email: String,
    api_key: String,
    callback_url: String,
    access_token: String,
    http: reqwest::Client,
}

/// Fully qualified job name for the subject's pending reversion.
pub fn job_name(project_id: &str, location: &str, user_email: &str) -> String {
    let sanitized = user_email.replace(['@', '.'], "_");
    format!("projects/{project_id}/locations/{location}/jobs/{sanitized}_revert_ou")
}

/// When the reversion callback should fire.
///
/// The scheduler runs jobs on whole minutes, so the requested instant is
/// truncated to the minute and padded by one more minute rather than cutting
/// the window short. The effective window is duration to duration plus the
/// rounding minute.
pub fn revert_fire_time(now: DateTime<Utc>, duration_minutes: u32) -> DateTime<Utc> {
    let target = now + Duration::minutes(i64::from(duration_minutes));
    truncate_to_minute(target) + Duration::minutes(1)
}

fn truncate_to_minute(value: DateTime<Utc>) -> DateTime<Utc> {
    let seconds = i64::from(value.second());
    let nanos = i64::from(value.timestamp_subsec_nanos());
    value - Duration::seconds(seconds) - Duration::nanoseconds(nanos)
}

impl SchedulerClient {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.scheduler_api_base_url.clone(),
            project_id: config.project_id.clone(),
            location: config.location.clone(),
            user_email: config.user_email.clone(),
            api_key: config.api_key.clone(),
            callback_url: format!("{}{}", config.public_base_url, ROUTE_ACCESS_REVERT),
            access_token: config.google_access_token.clone(),
            http: reqwest::Client::new(),
        }
    }

    fn job_name(&self) -> String {
        job_name(&self.project_id, &self.location, &self.user_email)
    }

    /// Register the reversion callback at `fire_at`, replacing any job still
    /// pending for the subject.
    pub async fn schedule_revert(&self, fire_at: DateTime<Utc>) -> Result<(), SchedulerError> {
        self.delete_revert_job().await?;

        let callback_body = serde_json::json!({ "email": self.user_email });
        let job = serde_json::json!({
            "name": self.job_name(),
            "schedule": format!("{} {} * * *", fire_at.minute(), fire_at.hour()),
            "timeZone": "Etc/UTC",
            "httpTarget": {
                "uri": self.callback_url,
                "httpMethod": "POST",
                "headers": {
                    "Content-Type": "application/json",
                    HEADER_API_KEY: self.api_key,
                },
                "body": STANDARD.encode(callback_body.to_string()),
            },
        });

        let url = format!(
            "{}/v1/projects/{}/locations/{}/jobs",
            self.base_url, self.project_id, self.location
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&job)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SchedulerError::Rejected { status, body });
        }

        tracing::info!(
            target: "ou_access.scheduler",
            fire_at = %fire_at,
            job = %self.job_name(),
            "scheduled reversion job",
        );
        Ok(())
    }

    /// Delete the subject's reversion job. Absence is success.
    pub async fn delete_revert_job(&self) -> Result<(), SchedulerError> {
        let url = format!("{}/v1/{}", self.base_url, self.job_name());
        let response = self
            .http
            .delete(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SchedulerError::Rejected { status, body })
    }
}
