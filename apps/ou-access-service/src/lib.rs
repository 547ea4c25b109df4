use std::sync::Arc;
use std::time::SystemTime;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod api_envelope;
pub mod config;
pub mod directory;
pub mod quota;
pub mod scheduler;
pub mod state_store;


use crate::api_envelope::{
    ApiErrorCode, ApiErrorTuple, error_response, ok_data, unauthorized_error,
};
use crate::config::Config;
use crate::directory::DirectoryClient;
use crate::scheduler::SchedulerClient;
use crate::state_store::StateStore;

const SERVICE_NAME: &str = "ou-access-service";
const HEADER_API_KEY: &str = "x-api-key";
pub(crate) const ROUTE_ACCESS_TOGGLE: &str = "/v1/access/toggle";
pub(crate) const ROUTE_ACCESS_REVERT: &str = "/v1/access/revert";

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: StateStore,
    directory: DirectoryClient,
    scheduler: SchedulerClient,
    started_at: SystemTime,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    status: &'static str,
    daily_switch_limit: u32,
    elevation_duration_minutes: u32,
}

#[derive(Debug, Serialize)]
struct ToggleResponse {
    status: &'static str,
    expires_at: Option<String>,
    remaining_today: u32,
    message: String,
}

#[derive(Debug, Serialize)]
struct RevertResponse {
    status: &'static str,
    message: &'static str,
}

pub fn build_router(config: Config) -> Router {
    let store = StateStore::from_config(&config);
    let directory = DirectoryClient::from_config(&config);
    let scheduler = SchedulerClient::from_config(&config);
    let state = AppState {
        config: Arc::new(config),
        store,
        directory,
        scheduler,
        started_at: SystemTime::now(),
    };
    let gate_state = state.clone();

    let access_router = Router::new()
        .route(ROUTE_ACCESS_TOGGLE, post(toggle_access))
        .route(ROUTE_ACCESS_REVERT, post(revert_access))
        .route_layer(middleware::from_fn_with_state(gate_state, require_api_key));

    Router::new()
        .route("/healthz", get(health))
        .route("/readyz", get(readiness))
        .merge(access_router)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http()),
        )
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = match state.started_at.elapsed() {
        Ok(duration) => duration.as_secs(),
        Err(_) => 0,
    };

    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
    })
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            daily_switch_limit: state.config.switch_limit,
            elevation_duration_minutes: state.config.duration_minutes,
        }),
    )
}

/// Static API-key gate for the access routes. Runs before the handlers, so a
/// bad key is rejected ahead of any quota or upstream work.
async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(HEADER_API_KEY)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if provided.is_empty() || provided != state.config.api_key {
        tracing::warn!(
            target: "ou_access.http",
            path = %request.uri().path(),
            "rejected request with missing or invalid api key",
        );
        return unauthorized_error("Unauthorized.").into_response();
    }

    next.run(request).await
}

/// Elevate the subject into the unrestricted unit for the configured window.
///
/// Ordering is deliberate: the directory mutation lands before anything is
/// persisted. A failure after that point leaves the subject elevated, which
/// is surfaced as `elevation_incomplete` rather than reported as success.
async fn toggle_access(State(state): State<AppState>) -> Result<impl IntoResponse, ApiErrorTuple> {
    let now = Utc::now();

    let record = state.store.load().await.map_err(|error| {
        tracing::error!(target: "ou_access.toggle", error = %error, "failed to load state record");
        error_response(
            ApiErrorCode::StoreUnavailable,
            "We couldn't check your remaining switches. Please try again later.",
        )
    })?;

    let decision = quota::evaluate(&record, now, state.config.switch_limit);
    if !decision.allowed {
        let hours_remaining = quota::hours_until_reset(now);
        tracing::info!(
            target: "ou_access.toggle",
            count_used = decision.record.count_used,
            "daily switch limit reached",
        );
        return Err(error_response(
            ApiErrorCode::QuotaExceeded,
            quota_exceeded_message(state.config.switch_limit, hours_remaining),
        ));
    }

    if record.active {
        // Nothing is persisted on this path; decision.record only carries the
        // provisional increment.
        let used_today = decision.record.count_used.saturating_sub(1);
        let remaining = state.config.switch_limit.saturating_sub(used_today);
        tracing::info!(
            target: "ou_access.toggle",
            expires_at = ?record.expires_at,
            "elevation already active; leaving the current window in place",
        );
        return Ok(ok_data(ToggleResponse {
            status: "already_active",
            expires_at: record.expires_at.map(timestamp),
            remaining_today: remaining,
            message: already_active_message(record.expires_at, now, remaining),
        }));
    }

    state
        .directory
        .set_org_unit(&state.config.user_email, &state.config.unrestricted_ou)
        .await
        .map_err(|error| {
            tracing::error!(
                target: "ou_access.toggle",
                error = %error,
                "failed to move subject to the unrestricted unit",
            );
            error_response(
                ApiErrorCode::DirectoryUnavailable,
                "We encountered an issue moving you to unrestricted mode. Please try again later.",
            )
        })?;

    let fire_at = scheduler::revert_fire_time(now, state.config.duration_minutes);
    state
        .scheduler
        .schedule_revert(fire_at)
        .await
        .map_err(|error| {
            tracing::error!(
                target: "ou_access.toggle",
                error = %error,
                "subject elevated but the reversion job could not be scheduled",
            );
            error_response(
                ApiErrorCode::ElevationIncomplete,
                "We encountered an issue scheduling your unrestricted time. Please try again later.",
            )
        })?;

    let mut updated = decision.record;
    updated.active = true;
    updated.expires_at = Some(fire_at);
    state.store.save(&updated).await.map_err(|error| {
        tracing::error!(
            target: "ou_access.toggle",
            error = %error,
            "subject elevated but the state record could not be persisted",
        );
        error_response(
            ApiErrorCode::ElevationIncomplete,
            "We encountered an issue recording your unrestricted time. Please try again later.",
        )
    })?;

    let remaining = state.config.switch_limit.saturating_sub(updated.count_used);
    tracing::info!(
        target: "ou_access.toggle",
        expires_at = %timestamp(fire_at),
        count_used = updated.count_used,
        "subject elevated to the unrestricted unit",
    );
    Ok(ok_data(ToggleResponse {
        status: "elevated",
        expires_at: Some(timestamp(fire_at)),
        remaining_today: remaining,
        message: elevated_message(state.config.duration_minutes, remaining),
    }))
}

/// Restore the subject to the restricted unit. Idempotent: the directory
/// write, the job deletion, and the state update all converge on the same end
/// state no matter how often the scheduler retries the callback.
async fn revert_access(State(state): State<AppState>) -> Result<impl IntoResponse, ApiErrorTuple> {
    state
        .directory
        .set_org_unit(&state.config.user_email, &state.config.restricted_ou)
        .await
        .map_err(|error| {
            tracing::error!(
                target: "ou_access.revert",
                error = %error,
                "failed to move subject back to the restricted unit",
            );
            error_response(
                ApiErrorCode::DirectoryUnavailable,
                "Failed to restore restricted access. The reversion will be retried.",
            )
        })?;

    state.scheduler.delete_revert_job().await.map_err(|error| {
        tracing::error!(
            target: "ou_access.revert",
            error = %error,
            "failed to delete the reversion job",
        );
        error_response(
            ApiErrorCode::SchedulingFailed,
            "Failed to clean up the reversion job. The reversion will be retried.",
        )
    })?;

    let mut record = state.store.load().await.map_err(map_revert_store_error)?;
    record.active = false;
    record.expires_at = None;
    state
        .store
        .save(&record)
        .await
        .map_err(map_revert_store_error)?;

    tracing::info!(
        target: "ou_access.revert",
        count_used = record.count_used,
        "subject reverted to the restricted unit",
    );
    Ok(ok_data(RevertResponse {
        status: "reverted",
        message: "Your access has expired and you've been moved to restricted mode.",
    }))
}

// Store failures here happen after the job deletion, so no callback is
// coming back for them. The caller has to re-issue the reversion.
fn map_revert_store_error(error: state_store::StateStoreError) -> ApiErrorTuple {
    tracing::error!(target: "ou_access.revert", error = %error, "failed to update state record");
    error_response(
        ApiErrorCode::StoreUnavailable,
        "Failed to record the reversion. Access is restored but the record is stale; re-issue it.",
    )
}

fn elevated_message(duration_minutes: u32, remaining: u32) -> String {
    let times_word = if remaining == 1 { "time" } else { "times" };
    format!(
        "You've been moved to unrestricted mode and will be reverted after {duration_minutes} minutes. \
         You can switch to unrestricted mode {remaining} more {times_word} today."
    )
}

fn already_active_message(
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    remaining: u32,
) -> String {
    let times_word = if remaining == 1 { "time" } else { "times" };
    let switch_phrase =
        format!("You can switch to unrestricted mode {remaining} more {times_word} today.");
    match expires_at.and_then(|at| remaining_window_phrase(at, now)) {
        Some(window) => format!("You have {window} left in unrestricted mode. {switch_phrase}"),
        None => format!("You are already in unrestricted mode. {switch_phrase}"),
    }
}

fn remaining_window_phrase(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<String> {
    let left = expires_at.signed_duration_since(now);
    if left <= chrono::Duration::zero() {
        return None;
    }

    let hours = left.num_hours();
    let minutes = left.num_minutes() % 60;
    let mut parts = Vec::new();
    if hours > 0 {
        let unit = if hours == 1 { "hour" } else { "hours" };
        parts.push(format!("{hours} {unit}"));
    }
    if minutes > 0 {
        let unit = if minutes == 1 { "minute" } else { "minutes" };
        parts.push(format!("{minutes} {unit}"));
    }
    if parts.is_empty() {
        return Some("less than a minute".to_string());
    }
    Some(parts.join(" and "))
}

fn quota_exceeded_message(limit: u32, hours_remaining: i64) -> String {
    let switches_word = if limit == 1 { "switch" } else { "switches" };
    let hours_word = if hours_remaining == 1 { "hour" } else { "hours" };
    format!(
        "You've reached the maximum of {limit} {switches_word} into a less restrictive \
         organizational unit today. Try again in {hours_remaining} {hours_word}."
    )
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}
