//! Phase-by-phase execution of one controlled run.

use std::path::PathBuf;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use nicheprobe_core::{AppConfig, Asin, RunStatus, ScoringConfig};
use nicheprobe_db::{DbError, NewPipelineRun, NewShortlistSnapshot, NewSnapshot, RunTotals};
use nicheprobe_keepa::{KeepaClient, KeepaError, ProductRecord};
use nicheprobe_reviews::ReviewDoc;
use nicheprobe_scoring::{ScoredOpportunity, ScoringInput};

use crate::assemble;
use crate::audit::RunAudit;
use crate::dq::DataQuality;

/// Reviews loaded per product for signal extraction.
const REVIEWS_PER_PRODUCT: i64 = 500;

/// Concurrent scoring-input assemblies in flight.
const SCORING_CONCURRENCY: usize = 8;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Keepa(#[from] KeepaError),
    #[error("artifact file write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
    #[error("invalid scoring configuration: {0}")]
    InvalidScoringConfig(String),
}

/// Per-invocation knobs, surfaced on the CLI.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides the configured product cap.
    pub max_products: Option<usize>,
    /// Freeze mode: score everything, promote nothing to the shortlist.
    pub freeze: bool,
    /// Skip category discovery and start from tracked products.
    pub skip_discovery: bool,
    /// Explicit product list; bypasses discovery and the freshness filter.
    pub explicit_asins: Option<Vec<Asin>>,
    /// Pre-assigned run identity, so a caller that spawns the run in the
    /// background can hand the id out immediately.
    pub run_id: Option<Uuid>,
}

/// What one run did, for callers and exit codes.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub asins_total: usize,
    pub asins_ok: usize,
    pub asins_failed: usize,
    pub asins_skipped: usize,
    pub artifacts_written: usize,
    pub shortlist_size: Option<usize>,
    pub dq: DataQuality,
    pub error_rate: f64,
    pub shortlist_frozen: bool,
    pub error_message: Option<String>,
    pub audit_path: Option<PathBuf>,
    pub shortlist_path: Option<PathBuf>,
}

/// Executes one controlled run end to end.
///
/// The run row is created first; any phase failure after that lands in the
/// row as a `failed` status rather than bubbling out, so every invocation
/// leaves an audit trail. Cancellation between phases finishes the run as
/// `cancelled`; inside the fetch phase the current batch completes first.
///
/// # Errors
///
/// Returns [`PipelineError`] only when the pre-flight itself cannot
/// complete (invalid calibration, or the run row cannot be created).
pub async fn execute_run(
    pool: &PgPool,
    config: &AppConfig,
    scoring_config: &ScoringConfig,
    options: RunOptions,
    cancel: CancellationToken,
) -> Result<RunReport, PipelineError> {
    scoring_config
        .validate()
        .map_err(PipelineError::InvalidScoringConfig)?;

    let run_id = options.run_id.unwrap_or_else(Uuid::new_v4);
    let config_snapshot = json!({
        "scoring": scoring_config,
        "ingestion": {
            "category_id": config.category_id,
            "batch_size": config.batch_size,
            "freshness_threshold_hours": config.freshness_threshold_hours,
            "max_products": options.max_products.unwrap_or(config.max_products),
            "dq_threshold_pct": config.dq_threshold_pct,
            "error_budget_threshold": config.error_budget_threshold,
            "event_retention_days": config.event_retention_days,
        },
        "options": {
            "freeze": options.freeze,
            "skip_discovery": options.skip_discovery,
            "explicit_asins": options.explicit_asins.as_ref().map(Vec::len),
        },
    });

    nicheprobe_db::create_pipeline_run(
        pool,
        &NewPipelineRun {
            id: run_id,
            config_snapshot,
        },
    )
    .await?;
    tracing::info!(%run_id, freeze = options.freeze, "pipeline run created");

    let mut audit = RunAudit::new(run_id);
    match run_phases(pool, config, scoring_config, &options, &cancel, &mut audit).await {
        Ok(report) => Ok(report),
        Err(e) => {
            tracing::error!(%run_id, error = %e, "run aborted");
            if let Err(mark_err) =
                nicheprobe_db::mark_run_failed(pool, run_id, &e.to_string()).await
            {
                tracing::error!(%run_id, error = %mark_err, "failed to mark run as failed");
            }
            let audit_path = write_json_file(
                &config.artifacts_dir,
                &format!("{run_id}_audit.json"),
                &audit.summary(),
            )
            .ok();
            Ok(RunReport {
                run_id,
                status: RunStatus::Failed,
                asins_total: 0,
                asins_ok: 0,
                asins_failed: 0,
                asins_skipped: 0,
                artifacts_written: 0,
                shortlist_size: None,
                dq: DataQuality::empty(),
                error_rate: 0.0,
                shortlist_frozen: true,
                error_message: Some(e.to_string()),
                audit_path,
                shortlist_path: None,
            })
        }
    }
}

#[allow(clippy::too_many_lines)]
async fn run_phases(
    pool: &PgPool,
    config: &AppConfig,
    scoring_config: &ScoringConfig,
    options: &RunOptions,
    cancel: &CancellationToken,
    audit: &mut RunAudit,
) -> Result<RunReport, PipelineError> {
    let run_id = audit.run_id;
    let max_products = options.max_products.unwrap_or(config.max_products);

    // -- Pre-flight: external API health ---------------------------------
    let client = KeepaClient::from_app_config(config)?;
    let health = client.health_check().await?;
    tracing::info!(
        tokens_left = health.tokens_left,
        refill_per_minute = health.refill_per_minute,
        "external API healthy"
    );

    // -- Phase 1: discovery ----------------------------------------------
    let started = Instant::now();
    let candidates: Vec<Asin> = if let Some(explicit) = &options.explicit_asins {
        tracing::info!(count = explicit.len(), "using explicit product list");
        explicit.clone()
    } else if options.skip_discovery {
        let tracked =
            nicheprobe_db::list_tracked_asins(pool, i64::try_from(max_products * 4).unwrap_or(400))
                .await?;
        tracing::info!(count = tracked.len(), "using tracked products from the store");
        tracked
    } else {
        let discovered = client.discover_category(config.category_id).await?;
        tracing::info!(
            count = discovered.len(),
            category = config.category_id,
            "category discovery finished"
        );
        discovered
    };
    audit.record_count("asins_discovered", candidates.len() as u64);
    audit.record_phase("discovery", started);

    if candidates.is_empty() {
        audit.warn("no candidate products — nothing to do");
        return finalize(
            pool, config, scoring_config, options, audit, &client,
            Totals::default(), DataQuality::empty(), Vec::new(),
        )
        .await;
    }
    if cancel.is_cancelled() {
        return cancelled(pool, config, audit, &client, Totals::default()).await;
    }

    // -- Phase 2: freshness filter ---------------------------------------
    let started = Instant::now();
    let mut targets = if options.explicit_asins.is_some() {
        candidates
    } else {
        let stale =
            nicheprobe_db::list_stale_asins(pool, &candidates, config.freshness_threshold_hours)
                .await?;
        tracing::info!(count = stale.len(), "products past the freshness threshold");
        stale
    };
    let skipped_fresh = targets.len().saturating_sub(max_products);
    targets.truncate(max_products);
    audit.record_count("asins_to_process", targets.len() as u64);
    audit.record_phase("freshness_filter", started);

    let mut totals = Totals {
        total: targets.len(),
        skipped: skipped_fresh,
        ..Totals::default()
    };

    if targets.is_empty() {
        audit.warn("all candidates are fresh — nothing to fetch");
        return finalize(
            pool, config, scoring_config, options, audit, &client,
            totals, DataQuality::empty(), Vec::new(),
        )
        .await;
    }

    // -- Phase 3: fetch ---------------------------------------------------
    let started = Instant::now();
    let batch_size = config.batch_size.clamp(1, nicheprobe_keepa::MAX_BATCH_SIZE);
    // Once cancelled no further batch is dispatched; batches already in
    // flight run to completion and their results are kept.
    let chunks: Vec<Vec<Asin>> = targets.chunks(batch_size).map(<[Asin]>::to_vec).collect();
    let results: Vec<(Vec<Asin>, Result<nicheprobe_keepa::ProductBatch, KeepaError>)> =
        stream::iter(chunks)
            .take_while(|_: &Vec<Asin>| futures::future::ready(!cancel.is_cancelled()))
            .map(|batch| {
                let client = &client;
                async move { (batch.clone(), fetch_batch_with_retry(client, &batch).await) }
            })
            .buffer_unordered(config.fetch_concurrency.max(1))
            .collect()
            .await;

    let mut records: Vec<ProductRecord> = Vec::with_capacity(targets.len());
    for (batch, result) in results {
        match result {
            Ok(batch_result) => {
                for failure in &batch_result.failures {
                    audit.record_error(&failure.asin, "malformed", &failure.reason);
                }
                records.extend(batch_result.records);
            }
            Err(e) => {
                // Batch-level failure: every product in it is recorded and
                // the run moves on.
                tracing::error!(error = %e, batch_len = batch.len(), "batch fetch failed");
                for asin in &batch {
                    audit.record_error(asin.as_str(), "transient", &e.to_string());
                }
            }
        }
    }
    totals.ok = records.len();
    totals.failed = audit.error_count();
    audit.record_count("products_fetched", records.len() as u64);
    audit.record_phase("fetch", started);

    if cancel.is_cancelled() {
        audit.warn("cancelled during fetch — stopping after the in-flight batches");
        return cancelled(pool, config, audit, &client, totals).await;
    }

    // -- Phase 4: store ---------------------------------------------------
    let started = Instant::now();
    let new_products: Vec<_> = records.iter().map(assemble::to_new_product).collect();
    let new_snapshots: Vec<NewSnapshot> = records.iter().map(assemble::to_new_snapshot).collect();
    nicheprobe_db::upsert_products(pool, &new_products).await?;
    let insert_report = nicheprobe_db::insert_snapshots(pool, &new_snapshots, run_id).await?;
    audit.record_count("snapshots_inserted", insert_report.inserted as u64);
    audit.record_count("snapshots_skipped", insert_report.skipped as u64);
    audit.record_count(
        "events_emitted",
        (insert_report.price_events + insert_report.rank_events + insert_report.stock_events)
            as u64,
    );
    audit.record_phase("store", started);

    // -- Phase 5: data-quality gate --------------------------------------
    let started = Instant::now();
    let dq = crate::dq::evaluate(&new_snapshots, config.dq_threshold_pct);
    audit.dq = Some(dq);
    if !dq.passed {
        audit.warn(format!(
            "data-quality gate failed: price {:.1}% / rank {:.1}% / review {:.1}% missing",
            dq.price_missing_pct, dq.rank_missing_pct, dq.review_missing_pct
        ));
    }
    audit.record_phase("data_quality", started);

    if cancel.is_cancelled() {
        return cancelled(pool, config, audit, &client, totals).await;
    }

    // -- Phase 6: review extraction --------------------------------------
    let started = Instant::now();
    let mut profiles_written = 0u64;
    for record in &records {
        match extract_reviews_for(pool, record, run_id).await {
            Ok(true) => profiles_written += 1,
            Ok(false) => {}
            Err(e) => {
                // Review intelligence is additive; its failure never sinks
                // the run.
                audit.warn(format!("review extraction failed for {}: {e}", record.asin));
            }
        }
    }
    audit.record_count("review_profiles_written", profiles_written);
    audit.record_phase("review_extraction", started);

    if cancel.is_cancelled() {
        return cancelled(pool, config, audit, &client, totals).await;
    }

    // -- Phase 7: scoring -------------------------------------------------
    let started = Instant::now();
    let top10_avg = assemble::top10_avg_reviews(&records);
    let inputs: Vec<Result<ScoringInput, DbError>> = stream::iter(records.clone())
        .map(|record: ProductRecord| async move {
            assemble::build_scoring_input(pool, &record, top10_avg).await
        })
        .buffer_unordered(SCORING_CONCURRENCY)
        .collect()
        .await;

    let mut scored: Vec<ScoredOpportunity> = Vec::with_capacity(inputs.len());
    for input in inputs {
        match input {
            Ok(input) => scored.push(nicheprobe_scoring::score(scoring_config, &input)),
            Err(e) => audit.warn(format!("scoring input assembly failed: {e}")),
        }
    }
    // Rank order is part of the artifact: best rank_score first, with the
    // selector's tie-breaks.
    scored.sort_by(|a, b| {
        b.rank_score
            .total_cmp(&a.rank_score)
            .then(b.final_score.cmp(&a.final_score))
            .then(a.window_days.cmp(&b.window_days))
            .then(a.asin.cmp(&b.asin))
    });

    let mut artifacts_written = 0usize;
    for (index, opportunity) in scored.iter().enumerate() {
        audit.record_score(opportunity.final_score, opportunity.rejected);
        let artifact = to_artifact(run_id, i32::try_from(index + 1).unwrap_or(i32::MAX), opportunity);
        if nicheprobe_db::insert_artifact(pool, &artifact).await? {
            artifacts_written += 1;
        }
    }
    audit.record_count("artifacts_written", artifacts_written as u64);
    audit.record_phase("scoring", started);

    // -- Phase 8: aggregates refresh --------------------------------------
    let started = Instant::now();
    nicheprobe_db::refresh_aggregates(pool).await?;
    let pruned = nicheprobe_db::prune_events(pool, config.event_retention_days).await?;
    if pruned > 0 {
        audit.record_count("events_pruned", pruned);
    }
    audit.record_phase("aggregates_refresh", started);

    // -- Phase 9: finalize -------------------------------------------------
    finalize(
        pool, config, scoring_config, options, audit, &client, totals, dq, scored,
    )
    .await
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    total: usize,
    ok: usize,
    failed: usize,
    skipped: usize,
}

async fn fetch_batch_with_retry(
    client: &KeepaClient,
    batch: &[Asin],
) -> Result<nicheprobe_keepa::ProductBatch, KeepaError> {
    match client.fetch_products(batch, false).await {
        Ok(result) => Ok(result),
        Err(first) => {
            tracing::warn!(error = %first, "batch fetch failed — one retry with residual budget");
            client.fetch_products(batch, false).await
        }
    }
}

/// Runs the extractor over one product's stored reviews. Returns whether a
/// profile was written.
async fn extract_reviews_for(
    pool: &PgPool,
    record: &ProductRecord,
    run_id: Uuid,
) -> Result<bool, PipelineError> {
    use rust_decimal::prelude::ToPrimitive;

    let asin = record.asin.as_str();
    let reviews = nicheprobe_db::load_reviews_for_analysis(pool, asin, REVIEWS_PER_PRODUCT).await?;
    if reviews.is_empty() {
        return Ok(false);
    }

    let docs: Vec<ReviewDoc> = reviews
        .iter()
        .map(|r| ReviewDoc {
            body: r.body.clone().unwrap_or_default(),
            rating: r.rating.to_f64().unwrap_or(5.0),
        })
        .collect();

    let extraction = nicheprobe_reviews::extract_defects(&docs);
    let wishes = nicheprobe_reviews::extract_wishes(&docs);
    let profile = nicheprobe_reviews::build_profile(&extraction, &wishes);

    let signals: Vec<nicheprobe_db::NewDefectSignal> = profile
        .top_defects
        .iter()
        .map(|d| nicheprobe_db::NewDefectSignal {
            defect_type: d.defect_type.as_str().to_owned(),
            frequency: i32::try_from(d.frequency).unwrap_or(i32::MAX),
            severity_score: d.severity_score,
            example_quotes: d.example_quotes.clone(),
            total_reviews_scanned: i32::try_from(d.total_reviews_scanned).unwrap_or(i32::MAX),
            negative_reviews_scanned: i32::try_from(d.negative_reviews_scanned)
                .unwrap_or(i32::MAX),
        })
        .collect();
    let requests: Vec<nicheprobe_db::NewFeatureRequest> = profile
        .missing_features
        .iter()
        .map(|w| nicheprobe_db::NewFeatureRequest {
            feature: w.feature.clone(),
            mentions: i32::try_from(w.mentions).unwrap_or(i32::MAX),
            confidence: w.confidence,
            source_quotes: w.source_quotes.clone(),
        })
        .collect();

    nicheprobe_db::insert_defect_signals(pool, asin, run_id, &signals).await?;
    nicheprobe_db::insert_feature_requests(pool, asin, run_id, &requests).await?;
    nicheprobe_db::upsert_improvement_profile(
        pool,
        asin,
        run_id,
        &nicheprobe_db::NewImprovementProfile {
            top_defects: profile.defects_json(),
            missing_features: profile.features_json(),
            dominant_pain: profile.dominant_pain.map(|d| d.as_str().to_owned()),
            improvement_score: profile.improvement_score,
            reviews_analyzed: i32::try_from(profile.reviews_analyzed).unwrap_or(i32::MAX),
            negative_reviews_analyzed: i32::try_from(profile.negative_reviews_analyzed)
                .unwrap_or(i32::MAX),
            reviews_ready: profile.reviews_ready,
        },
    )
    .await?;

    let review_ids: Vec<String> = reviews.iter().map(|r| r.review_id.clone()).collect();
    nicheprobe_db::mark_reviews_analyzed(pool, &review_ids).await?;
    Ok(true)
}

fn to_artifact(
    run_id: Uuid,
    rank_in_run: i32,
    opportunity: &ScoredOpportunity,
) -> nicheprobe_db::NewArtifact {
    nicheprobe_db::NewArtifact {
        run_id,
        asin: opportunity.asin.as_str().to_owned(),
        rank_in_run,
        final_score: opportunity.final_score,
        base_score: opportunity.base_score,
        time_multiplier: opportunity.time_multiplier,
        component_scores: serde_json::to_value(opportunity.components).unwrap_or_default(),
        time_pressure_factors: serde_json::to_value(opportunity.factors).unwrap_or_default(),
        signals_for: opportunity.signals_for.clone(),
        signals_against: opportunity.signals_against.clone(),
        thesis: opportunity.thesis.clone(),
        action_recommendation: opportunity.action.clone(),
        monthly_profit: opportunity.monthly_profit,
        annual_value: opportunity.annual_value,
        risk_adjusted_value: opportunity.risk_adjusted_value,
        rank_score: opportunity.rank_score,
        window_days: opportunity.window_days,
        urgency_level: opportunity.urgency.as_str().to_owned(),
        rejected: opportunity.rejected,
        rejection_reason: opportunity.rejection_reason.clone(),
        input_hash: opportunity.input_hash.clone(),
        price_at_scoring: opportunity.context.price,
        review_count_at_scoring: opportunity.context.review_count,
        rating_at_scoring: opportunity.context.rating_avg,
        rank_at_scoring: opportunity.context.rank,
    }
}

#[allow(clippy::too_many_arguments)]
async fn finalize(
    pool: &PgPool,
    config: &AppConfig,
    scoring_config: &ScoringConfig,
    options: &RunOptions,
    audit: &mut RunAudit,
    client: &KeepaClient,
    totals: Totals,
    dq: DataQuality,
    scored: Vec<ScoredOpportunity>,
) -> Result<RunReport, PipelineError> {
    let run_id = audit.run_id;

    #[allow(clippy::cast_precision_loss)]
    let error_rate = if totals.total == 0 {
        0.0
    } else {
        totals.failed as f64 / totals.total as f64
    };
    let error_budget_breached = error_rate >= config.error_budget_threshold;

    let status = if dq.passed && !error_budget_breached {
        RunStatus::Completed
    } else {
        RunStatus::Degraded
    };
    let frozen = status != RunStatus::Completed || options.freeze;

    // -- Shortlist selection ----------------------------------------------
    let previous_active = nicheprobe_db::active_snapshot(pool).await?;
    let previous_ids = previous_active.map(|s| s.asins).unwrap_or_default();
    let selection =
        nicheprobe_scoring::select_shortlist(&scoring_config.shortlist, &scored, &previous_ids);

    let shortlist_size = selection.items.len();
    let snapshot_row = if scored.is_empty() {
        None
    } else {
        let row = nicheprobe_db::insert_shortlist_snapshot(
            pool,
            &NewShortlistSnapshot {
                run_id,
                asins: selection
                    .items
                    .iter()
                    .map(|i| i.asin.as_str().to_owned())
                    .collect(),
                scores: selection.items.iter().map(|i| i.final_score).collect(),
                total_potential_value: selection.total_potential_value,
                added_asins: selection.added.clone(),
                removed_asins: selection.removed.clone(),
                stability: selection.stability,
                frozen,
            },
        )
        .await?;
        Some(row)
    };

    if frozen {
        tracing::info!(
            %run_id,
            status = %status,
            "shortlist frozen — previously active snapshot keeps serving"
        );
    } else if let Some(row) = &snapshot_row {
        nicheprobe_db::activate_snapshot(pool, row.id).await?;
        tracing::info!(%run_id, snapshot_id = row.id, items = shortlist_size, "shortlist activated");
    }

    // -- Run row and filesystem artifacts ---------------------------------
    let totals_row = RunTotals {
        asins_total: i32::try_from(totals.total).unwrap_or(i32::MAX),
        asins_ok: i32::try_from(totals.ok).unwrap_or(i32::MAX),
        asins_failed: i32::try_from(totals.failed).unwrap_or(i32::MAX),
        asins_skipped: i32::try_from(totals.skipped).unwrap_or(i32::MAX),
        phase_timings: audit.timings_json(),
        tokens_consumed: i64::try_from(client.tokens_consumed()).unwrap_or(i64::MAX),
        dq_price_missing_pct: dq.price_missing_pct,
        dq_rank_missing_pct: dq.rank_missing_pct,
        dq_review_missing_pct: dq.review_missing_pct,
        dq_passed: dq.passed,
        error_rate,
        error_budget_breached,
        shortlist_frozen: frozen,
        failed_asins: audit.failed_asins(),
    };
    nicheprobe_db::finalize_pipeline_run(pool, run_id, status, &totals_row).await?;

    let audit_path = write_json_file(
        &config.artifacts_dir,
        &format!("{run_id}_audit.json"),
        &audit.summary(),
    )?;
    let shortlist_doc = json!({
        "run_id": run_id,
        "frozen": frozen,
        "stability": selection.stability,
        "total_potential_value": selection.total_potential_value,
        "items": selection.items.iter().enumerate().map(|(i, item)| json!({
            "rank": i + 1,
            "asin": item.asin,
            "score": item.final_score,
            "window_days": item.window_days,
            "risk_adjusted_value": item.risk_adjusted_value,
        })).collect::<Vec<_>>(),
    });
    let shortlist_path = write_json_file(
        &config.artifacts_dir,
        &format!("{run_id}_shortlist.json"),
        &shortlist_doc,
    )?;

    tracing::info!(
        %run_id,
        status = %status,
        asins_total = totals.total,
        asins_failed = totals.failed,
        error_rate,
        shortlist = shortlist_size,
        "run finalized"
    );

    Ok(RunReport {
        run_id,
        status,
        asins_total: totals.total,
        asins_ok: totals.ok,
        asins_failed: totals.failed,
        asins_skipped: totals.skipped,
        artifacts_written: scored.len(),
        shortlist_size: Some(shortlist_size),
        dq,
        error_rate,
        shortlist_frozen: frozen,
        error_message: None,
        audit_path: Some(audit_path),
        shortlist_path: Some(shortlist_path),
    })
}

/// Terminal path for a cooperative cancellation: the run closes as
/// `cancelled`, keeps whatever was written, and activates nothing.
async fn cancelled(
    pool: &PgPool,
    config: &AppConfig,
    audit: &mut RunAudit,
    client: &KeepaClient,
    totals: Totals,
) -> Result<RunReport, PipelineError> {
    let run_id = audit.run_id;
    audit.warn("run cancelled by operator");

    #[allow(clippy::cast_precision_loss)]
    let error_rate = if totals.total == 0 {
        0.0
    } else {
        totals.failed as f64 / totals.total as f64
    };

    let dq = audit.dq.unwrap_or_else(DataQuality::empty);
    let totals_row = RunTotals {
        asins_total: i32::try_from(totals.total).unwrap_or(i32::MAX),
        asins_ok: i32::try_from(totals.ok).unwrap_or(i32::MAX),
        asins_failed: i32::try_from(totals.failed).unwrap_or(i32::MAX),
        asins_skipped: i32::try_from(totals.skipped).unwrap_or(i32::MAX),
        phase_timings: audit.timings_json(),
        tokens_consumed: i64::try_from(client.tokens_consumed()).unwrap_or(i64::MAX),
        dq_price_missing_pct: dq.price_missing_pct,
        dq_rank_missing_pct: dq.rank_missing_pct,
        dq_review_missing_pct: dq.review_missing_pct,
        dq_passed: dq.passed,
        error_rate,
        error_budget_breached: false,
        shortlist_frozen: true,
        failed_asins: audit.failed_asins(),
    };
    nicheprobe_db::finalize_pipeline_run(pool, run_id, RunStatus::Cancelled, &totals_row).await?;

    let audit_path = write_json_file(
        &config.artifacts_dir,
        &format!("{run_id}_audit.json"),
        &audit.summary(),
    )?;

    Ok(RunReport {
        run_id,
        status: RunStatus::Cancelled,
        asins_total: totals.total,
        asins_ok: totals.ok,
        asins_failed: totals.failed,
        asins_skipped: totals.skipped,
        artifacts_written: 0,
        shortlist_size: None,
        dq,
        error_rate,
        shortlist_frozen: true,
        error_message: None,
        audit_path: Some(audit_path),
        shortlist_path: None,
    })
}

fn write_json_file(
    dir: &std::path::Path,
    name: &str,
    value: &serde_json::Value,
) -> Result<PathBuf, PipelineError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec_pretty(value)?)?;
    Ok(path)
}
