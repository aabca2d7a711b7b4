// Escalador entry point.
//
// Usage:
//   escalador                 rank, optimize and submit for every stored team
//   escalador import <dir>    seed the datastore from CSV files
//   escalador sync [team_id]  pull the current round's market data
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open database
// 4. Dispatch the command

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{error, info};

use escalador_app::cartola::{CartolaClient, ReqwestTransport};
use escalador_app::pipeline::Pipeline;
use escalador_app::season::SeasonCache;
use escalador_app::sync;
use escalador_core::config;
use escalador_core::db::Database;
use escalador_core::import;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Escalador starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: top_n={}, provaveis={}, dry_run={}",
        config.scoring.top_n, config.scoring.usar_provaveis_cartola, config.pipeline.dry_run
    );

    // 3. Open database
    let db = Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    // 4. Dispatch
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Some("import") = args.first().map(String::as_str) {
        let Some(dir) = args.get(1) else {
            bail!("usage: escalador import <dir>");
        };
        let summary = import::import_dir(&db, Path::new(dir)).context("CSV import failed")?;
        info!("Imported {} rows from {}", summary.total(), dir);
        println!("imported {} rows from {dir}", summary.total());
        return Ok(());
    }

    let transport = ReqwestTransport::new(Duration::from_secs(config.api.timeout_secs))
        .context("failed to build HTTP client")?;
    let client = CartolaClient::new(transport, config.api.clone());
    let season = SeasonCache::default().current_season(&client).await;
    info!("Season {}", season);

    let pipeline = Pipeline::new(&db, &client, &config);

    match args.first().map(String::as_str) {
        Some("sync") => {
            let team = match args.get(1) {
                Some(raw) => Some(raw.parse::<i64>().with_context(|| format!("invalid team id {raw:?}"))?),
                None => None,
            };
            let round = pipeline.open_round().await?;
            let summary = sync::sync_round(&db, &client, round, team).await?;
            info!("Sync for round {} done: {:?}", round, summary);
        }
        Some(other) => bail!("unknown command {other:?}"),
        None => {
            let report = pipeline.run_all().await?;
            for (team_id, e) in &report.failures {
                error!("team {} not escalated: {}", team_id, e);
            }
            println!(
                "{} teams escalated, {} failed",
                report.outcomes.len(),
                report.failures.len()
            );
        }
    }

    info!("Escalador finished");
    Ok(())
}

/// Initialize tracing to log to `logs/escalador.log`.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("escalador.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("escalador=info,escalador_core=info,escalador_app=info,warn")
        }))
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    Ok(())
}
