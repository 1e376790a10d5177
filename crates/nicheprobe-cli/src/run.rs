//! CLI command handlers: the controlled run, the shortlist view, and the
//! shared config/pool helpers.

use std::str::FromStr;

use tokio_util::sync::CancellationToken;

use nicheprobe_core::{Asin, ScoringConfig};
use nicheprobe_pipeline::{execute_run, RunOptions};

/// Runs the full pipeline and returns the process exit code:
/// 0 completed, 2 degraded, 3 failed, 130 cancelled.
pub async fn run_pipeline(
    max_asins: Option<usize>,
    freeze: bool,
    skip_discovery: bool,
    asins: Option<Vec<String>>,
) -> anyhow::Result<i32> {
    let config = load_config_or_exit();
    let pool = connect_or_exit().await;
    let scoring_config = ScoringConfig::default();

    let explicit_asins = match asins {
        Some(raw) => {
            let mut parsed = Vec::with_capacity(raw.len());
            for value in raw {
                match Asin::from_str(&value) {
                    Ok(asin) => parsed.push(asin),
                    Err(e) => anyhow::bail!("invalid --asins entry: {e}"),
                }
            }
            Some(parsed)
        }
        None => None,
    };

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received — cancelling after the current batch");
            ctrl_c_token.cancel();
        }
    });

    let report = execute_run(
        &pool,
        &config,
        &scoring_config,
        RunOptions {
            max_products: max_asins,
            freeze,
            skip_discovery,
            explicit_asins,
            run_id: None,
        },
        cancel,
    )
    .await?;

    println!();
    println!("run {}: {}", report.run_id, report.status);
    println!(
        "  products: {} total, {} ok, {} failed, {} skipped",
        report.asins_total, report.asins_ok, report.asins_failed, report.asins_skipped
    );
    println!(
        "  data quality: price {:.1}% / rank {:.1}% / review {:.1}% missing ({})",
        report.dq.price_missing_pct,
        report.dq.rank_missing_pct,
        report.dq.review_missing_pct,
        if report.dq.passed { "PASS" } else { "FAIL" }
    );
    println!(
        "  error rate: {:.1}%  artifacts: {}",
        report.error_rate * 100.0,
        report.artifacts_written
    );
    match report.shortlist_size {
        Some(size) if !report.shortlist_frozen => println!("  shortlist: {size} items (active)"),
        Some(size) => println!("  shortlist: {size} items (frozen — previous snapshot serves)"),
        None => println!("  shortlist: not produced"),
    }
    if let Some(path) = &report.audit_path {
        println!("  audit: {}", path.display());
    }
    if let Some(message) = &report.error_message {
        eprintln!("error: {message}");
    }

    Ok(report.status.exit_code())
}

/// Prints the currently served shortlist.
pub async fn show_shortlist(as_json: bool) -> anyhow::Result<()> {
    let pool = connect_or_exit().await;
    let Some(snapshot) = nicheprobe_db::latest_served_snapshot(&pool).await? else {
        println!("no shortlist snapshot available yet — run `nicheprobe run` first");
        return Ok(());
    };

    if as_json {
        let doc = serde_json::json!({
            "run_id": snapshot.run_id,
            "active": snapshot.active,
            "frozen": snapshot.frozen,
            "stability": snapshot.stability,
            "total_potential_value": snapshot.total_potential_value,
            "items": snapshot.asins.iter().zip(&snapshot.scores).enumerate()
                .map(|(i, (asin, score))| serde_json::json!({
                    "rank": i + 1,
                    "asin": asin,
                    "score": score,
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!(
        "shortlist from run {} ({})",
        snapshot.run_id,
        if snapshot.active { "active" } else { "latest completed" }
    );
    for (i, (asin, score)) in snapshot.asins.iter().zip(&snapshot.scores).enumerate() {
        println!("{:>3}. {asin}  score {score}", i + 1);
    }
    println!(
        "total potential value: ${}  stability: {:.2}",
        snapshot.total_potential_value, snapshot.stability
    );
    Ok(())
}

pub fn load_config_or_exit() -> nicheprobe_core::AppConfig {
    nicheprobe_core::load_app_config().unwrap_or_else(|e| {
        eprintln!("error: invalid configuration: {e}");
        std::process::exit(3);
    })
}

pub async fn connect_or_exit() -> sqlx::PgPool {
    nicheprobe_db::connect_pool_from_env()
        .await
        .unwrap_or_else(|e| {
            match &e {
                nicheprobe_db::DbError::Config(cfg_err) => {
                    eprintln!("error: invalid configuration: {cfg_err}");
                    eprintln!("hint: copy .env.example to .env and set DATABASE_URL");
                }
                nicheprobe_db::DbError::Sqlx(sql_err) => {
                    eprintln!("error: failed to connect to database: {sql_err}");
                    eprintln!("hint: ensure postgres is running");
                }
                other => {
                    eprintln!("error: unexpected failure during connect: {other}");
                }
            }
            std::process::exit(3);
        })
}
