use anyhow::{bail, Context, Result};
use futures::FutureExt;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::config::AppConfig;
use super::CrawlArgs;
use crate::alert::{AlertCondition, AlertEngine, LogSink};
use crate::checkpoint::CheckpointStore;
use crate::crawler::task::{CrawlTask, FieldFlags};
use crate::crawler::Orchestrator;
use crate::export::{export_items, Column, ExportFormat, DEFAULT_COLUMNS};
use crate::schedule;

fn build_task(args: &CrawlArgs) -> CrawlTask {
    let fields = FieldFlags {
        links: !args.no_links,
        images: !args.no_images,
        text: args.text,
        price: !args.no_price,
        date: !args.no_date,
        description: !args.no_description,
        ..FieldFlags::default()
    };
    let mut task = CrawlTask::new(&args.url, args.backend, args.pages)
        .with_profile(args.profile)
        .with_fields(fields);
    if let Some(delay) = args.delay_ms {
        task = task.with_delay_ms(delay);
    }
    task
}

fn apply_checkpoint_overrides(config: &mut AppConfig, args: &CrawlArgs) {
    if args.no_checkpoint {
        config.checkpoint.every_pages = None;
    } else if let Some(every) = args.checkpoint_every {
        config.checkpoint.every_pages = Some(every.max(1));
    }
}

fn columns_or_default(columns: &[Column]) -> Vec<Column> {
    if columns.is_empty() {
        DEFAULT_COLUMNS.to_vec()
    } else {
        columns.to_vec()
    }
}

fn alert_engine(args: &CrawlArgs) -> Option<AlertEngine> {
    let mut conditions: Vec<AlertCondition> = args
        .alert_keywords
        .iter()
        .map(|keyword| AlertCondition::Keyword(keyword.clone()))
        .collect();
    if let Some(target) = args.alert_price_below {
        conditions.push(AlertCondition::PriceBelow(target));
    }
    if let Some(pct) = args.alert_price_change {
        conditions.push(AlertCondition::PriceChangePercent(pct));
    }
    (!conditions.is_empty()).then(|| AlertEngine::new(conditions, Box::new(LogSink)))
}

/// Wires Ctrl-C to a cancellation token so the running job can stop at the
/// next page boundary.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current page");
            token.cancel();
        }
    });
    cancel
}

/// Start a new crawling job
pub async fn crawl(mut config: AppConfig, args: CrawlArgs) -> Result<()> {
    apply_checkpoint_overrides(&mut config, &args);
    let task = build_task(&args);

    let mut orch = Orchestrator::new(&config, cancel_on_ctrl_c());
    if let Some(alerts) = alert_engine(&args) {
        orch = orch.with_alerts(alerts);
    }

    let job = orch.start(task).await?;
    if let Some(output) = &args.output {
        let columns = columns_or_default(&args.columns);
        export_items(&job.items, args.format, &columns, output)?;
    }
    println!("{}", job.summary());
    Ok(())
}

/// Resume the job saved in the checkpoint
pub async fn resume(
    config: AppConfig,
    url: Option<String>,
    ignore_mismatch: bool,
    output: Option<PathBuf>,
    format: ExportFormat,
    columns: Vec<Column>,
) -> Result<()> {
    let store = CheckpointStore::new(config.checkpoint.resolved_path());
    let Some(checkpoint) = store.load() else {
        bail!("no checkpoint to resume at {}", store.path().display());
    };

    if let Some(url) = &url {
        if !checkpoint.matches_base_url(url) {
            if ignore_mismatch {
                warn!(
                    "Checkpoint is for {}, resuming it anyway",
                    checkpoint.task.base_url
                );
            } else {
                bail!(
                    "checkpoint is for {}, not {} (pass --ignore-mismatch to resume it anyway)",
                    checkpoint.task.base_url,
                    url
                );
            }
        }
    }

    let mut orch = Orchestrator::new(&config, cancel_on_ctrl_c());
    let job = orch.resume(checkpoint).await?;
    if let Some(output) = &output {
        let columns = columns_or_default(&columns);
        export_items(&job.items, format, &columns, output)?;
    }
    println!("{}", job.summary());
    Ok(())
}

/// Run the same crawl repeatedly on a fixed interval
pub async fn watch(mut config: AppConfig, args: CrawlArgs, every: &str) -> Result<()> {
    let every = schedule::parse_interval(every)?;
    apply_checkpoint_overrides(&mut config, &args);
    let task = build_task(&args);
    let cancel = cancel_on_ctrl_c();

    // One orchestrator for all runs, so price history carries across them
    // and delta alerts can fire between runs
    let mut orch = Orchestrator::new(&config, cancel.clone());
    if let Some(alerts) = alert_engine(&args) {
        orch = orch.with_alerts(alerts);
    }

    let output = args.output.clone();
    let format = args.format;
    let columns = columns_or_default(&args.columns);
    let runs = schedule::run_on_interval(every, &cancel, &mut orch, |orch, run| {
        let task = task.clone();
        let output = output.clone();
        let columns = columns.clone();
        async move {
            let job = orch.start(task).await?;
            if let Some(output) = &output {
                export_items(&job.items, format, &columns, output)?;
            }
            info!("Run {} done, {}", run, job.summary());
            Ok(job.summary())
        }
        .boxed()
    })
    .await;

    println!("watch stopped after {} runs", runs);
    Ok(())
}

/// Export the items stored in the current checkpoint
pub fn export(
    config: AppConfig,
    format: ExportFormat,
    output: Option<PathBuf>,
    columns: Vec<Column>,
) -> Result<()> {
    let store = CheckpointStore::new(config.checkpoint.resolved_path());
    let Some(checkpoint) = store.load() else {
        bail!("no checkpoint to export at {}", store.path().display());
    };
    if checkpoint.items.is_empty() {
        warn!("Checkpoint holds no items yet");
    }

    let output =
        output.unwrap_or_else(|| PathBuf::from(format!("harvest.{}", format.extension())));
    let columns = columns_or_default(&columns);
    export_items(&checkpoint.items, format, &columns, &output)?;
    println!("exported {} items to {}", checkpoint.items.len(), output.display());
    Ok(())
}

/// Print a summary of the saved checkpoint
pub fn show_checkpoint(config: AppConfig) -> Result<()> {
    let store = CheckpointStore::new(config.checkpoint.resolved_path());
    match store.load() {
        Some(checkpoint) => {
            println!("Checkpoint: {}", store.path().display());
            println!("  URL:       {}", checkpoint.task.base_url);
            println!("  Saved:     {}", checkpoint.saved_at);
            println!(
                "  Cursor:    page {}/{}",
                checkpoint.cursor, checkpoint.task.max_pages
            );
            println!(
                "  Pages:     {} completed, {} failed",
                checkpoint.completed_pages.len(),
                checkpoint.failed_pages.len()
            );
            println!("  Items:     {}", checkpoint.items.len());
        }
        None => println!("No checkpoint at {}", store.path().display()),
    }
    Ok(())
}

/// Delete the saved checkpoint
pub fn clear_checkpoint(config: AppConfig) -> Result<()> {
    let store = CheckpointStore::new(config.checkpoint.resolved_path());
    if store.exists() {
        store.clear()?;
        println!("checkpoint cleared");
    } else {
        println!("no checkpoint to clear");
    }
    Ok(())
}

/// Show the active configuration
pub fn show_config(config: AppConfig, init: bool) -> Result<()> {
    if init {
        config.save_as_default()?;
    }
    let yaml = serde_yaml::to_string(&config).context("Failed to render configuration")?;
    print!("{}", yaml);
    Ok(())
}
