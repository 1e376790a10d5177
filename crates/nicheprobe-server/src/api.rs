//! The read API over the stored shortlist and run state.
//!
//! The core produces this state; these handlers only serve it. A degraded
//! or failed run's proposed snapshot is never visible here — stale-correct
//! wins over fresh-broken.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use nicheprobe_core::{AppConfig, ScoringConfig};
use nicheprobe_db::{ArtifactRow, DbError};
use nicheprobe_pipeline::RunOptions;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/shortlist", get(get_shortlist))
        .route("/shortlist/export", get(export_shortlist))
        .route("/pipeline/status", get(pipeline_status))
        .route("/pipeline/run", post(trigger_run))
        .with_state(state)
}

struct ApiError(DbError);

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            DbError::NotFound => (StatusCode::NOT_FOUND, "not found").into_response(),
            other => {
                tracing::error!(error = %other, "read API database failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

async fn health(State(state): State<AppState>) -> Response {
    match nicheprobe_db::health_check(&state.pool).await {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ShortlistQuery {
    max_items: Option<usize>,
    min_score: Option<i32>,
    min_value: Option<f64>,
}

/// The served shortlist entries after the query filters, with artifact
/// detail joined in where available.
async fn load_served_items(
    pool: &PgPool,
    query: &ShortlistQuery,
) -> Result<Option<(Uuid, bool, Vec<serde_json::Value>)>, DbError> {
    let Some(snapshot) = nicheprobe_db::latest_served_snapshot(pool).await? else {
        return Ok(None);
    };

    let artifacts = nicheprobe_db::list_artifacts_for_run(pool, snapshot.run_id, false).await?;
    let detail = |asin: &str| -> Option<&ArtifactRow> {
        artifacts.iter().find(|a| a.asin == asin)
    };

    let min_score = query.min_score.unwrap_or(0);
    let min_value = query
        .min_value
        .and_then(Decimal::from_f64_retain)
        .unwrap_or(Decimal::ZERO);
    let max_items = query.max_items.unwrap_or(usize::MAX);

    let mut items = Vec::new();
    for (asin, score) in snapshot.asins.iter().zip(&snapshot.scores) {
        if *score < min_score {
            continue;
        }
        let artifact = detail(asin);
        if let Some(a) = artifact {
            if a.risk_adjusted_value < min_value {
                continue;
            }
        }
        items.push(json!({
            "rank": items.len() + 1,
            "asin": asin,
            "score": score,
            "window_days": artifact.map(|a| a.window_days),
            "urgency": artifact.map(|a| a.urgency_level.clone()),
            "risk_adjusted_value": artifact.map(|a| a.risk_adjusted_value),
            "thesis": artifact.map(|a| a.thesis.clone()),
            "action": artifact.map(|a| a.action_recommendation.clone()),
        }));
        if items.len() >= max_items {
            break;
        }
    }
    Ok(Some((snapshot.run_id, snapshot.active, items)))
}

/// Demo payload served before the first completed run exists.
fn demo_shortlist() -> serde_json::Value {
    json!({
        "run_id": null,
        "active": false,
        "demo": true,
        "items": [
            { "rank": 1, "asin": "B0DEMO0001", "score": 82, "window_days": 30 },
            { "rank": 2, "asin": "B0DEMO0002", "score": 75, "window_days": 60 },
        ],
    })
}

async fn get_shortlist(
    State(state): State<AppState>,
    Query(query): Query<ShortlistQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match load_served_items(&state.pool, &query).await? {
        Some((run_id, active, items)) => Ok(Json(json!({
            "run_id": run_id,
            "active": active,
            "demo": false,
            "items": items,
        }))),
        None => Ok(Json(demo_shortlist())),
    }
}

async fn export_shortlist(
    State(state): State<AppState>,
    Query(query): Query<ShortlistQuery>,
) -> Result<Response, ApiError> {
    let mut csv = String::from("rank,asin,score,window_days,urgency,risk_adjusted_value\n");
    if let Some((_, _, items)) = load_served_items(&state.pool, &query).await? {
        for item in items {
            let field = |key: &str| {
                item.get(key)
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default()
            };
            csv.push_str(&format!(
                "{},{},{},{},{},{}\n",
                field("rank"),
                field("asin"),
                field("score"),
                field("window_days"),
                field("urgency"),
                field("risk_adjusted_value"),
            ));
        }
    }
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"shortlist.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

async fn pipeline_status(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let latest = nicheprobe_db::latest_pipeline_run(&state.pool).await?;
    let tracked = nicheprobe_db::count_tracked_products(&state.pool).await?;
    Ok(Json(match latest {
        Some(run) => json!({
            "run_id": run.id,
            "status": run.status,
            "started_at": run.started_at,
            "ended_at": run.ended_at,
            "products_tracked": tracked,
            "asins_total": run.asins_total,
            "asins_failed": run.asins_failed,
            "error_rate": run.error_rate,
            "dq_passed": run.dq_passed,
            "shortlist_frozen": run.shortlist_frozen,
        }),
        None => json!({
            "run_id": null,
            "status": "never_run",
            "products_tracked": tracked,
        }),
    }))
}

/// Spawns a new pipeline run and returns its id immediately.
async fn trigger_run(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let run_id = Uuid::new_v4();
    let pool = state.pool.clone();
    let config = Arc::clone(&state.config);
    tokio::spawn(async move {
        let scoring_config = ScoringConfig::default();
        let options = RunOptions {
            run_id: Some(run_id),
            ..RunOptions::default()
        };
        match nicheprobe_pipeline::execute_run(
            &pool,
            &config,
            &scoring_config,
            options,
            CancellationToken::new(),
        )
        .await
        {
            Ok(report) => {
                tracing::info!(%run_id, status = %report.status, "triggered run finished");
            }
            Err(e) => {
                tracing::error!(%run_id, error = %e, "triggered run failed to start");
            }
        }
    });
    (
        StatusCode::ACCEPTED,
        Json(json!({ "run_id": run_id, "status": "running" })),
    )
}
