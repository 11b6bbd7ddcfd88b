//! /filter handlers: the enable switch and a dry-run host check.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use nearguard_core::{decide, Verdict};

use super::{store_error, ApiError, ApiState};

// ── /filter (GET, POST) ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct FilterState {
    pub enabled: bool,
}

pub async fn handle_filter_get(State(state): State<ApiState>) -> Result<Json<FilterState>, ApiError> {
    let enabled = state.policy.read_enabled().map_err(store_error)?;
    Ok(Json(FilterState { enabled }))
}

pub async fn handle_filter_set(
    State(state): State<ApiState>,
    Json(req): Json<FilterState>,
) -> Result<Json<FilterState>, ApiError> {
    state
        .policy
        .write_enabled(req.enabled)
        .map_err(store_error)?;
    tracing::info!(enabled = req.enabled, "filter switched");
    Ok(Json(req))
}

// ── /filter/check (GET) ───────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CheckQuery {
    pub host: String,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub host: String,
    pub verdict: Verdict,
    /// The entry that matched, when the verdict is `drop`.
    pub matched: Option<String>,
}

pub async fn handle_filter_check(
    State(state): State<ApiState>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>, ApiError> {
    let snapshot = state
        .policy
        .snapshot(&state.default_domains)
        .map_err(store_error)?;
    let verdict = decide(Some(&query.host), &snapshot);
    let matched = match verdict {
        Verdict::Drop => snapshot.matching_domain(&query.host).map(str::to_string),
        Verdict::Allow => None,
    };
    Ok(Json(CheckResponse {
        host: query.host,
        verdict,
        matched,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support;

    async fn check(state: &ApiState, host: &str) -> CheckResponse {
        let Json(resp) = handle_filter_check(
            State(state.clone()),
            Query(CheckQuery { host: host.into() }),
        )
        .await
        .unwrap();
        resp
    }

    #[tokio::test]
    async fn defaults_and_stored_entries_both_apply() {
        let (state, _hub) = test_support::state();
        state.policy.write_blocked_domains(&["spam.com".into()]).unwrap();

        let yt = check(&state, "m.youtube.com").await;
        assert_eq!(yt.verdict, Verdict::Drop);
        assert_eq!(yt.matched.as_deref(), Some("youtube.com"));

        assert_eq!(check(&state, "ads.spam.com").await.verdict, Verdict::Drop);
        assert_eq!(check(&state, "vimeo.com").await.verdict, Verdict::Allow);
    }

    #[tokio::test]
    async fn disabled_filter_allows_everything() {
        let (state, _hub) = test_support::state();
        let Json(on) = handle_filter_get(State(state.clone())).await.unwrap();
        assert!(on.enabled);

        handle_filter_set(State(state.clone()), Json(FilterState { enabled: false }))
            .await
            .unwrap();
        let resp = check(&state, "www.youtube.com").await;
        assert_eq!(resp.verdict, Verdict::Allow);
        assert_eq!(resp.matched, None);
    }
}
