use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use tracing::debug;
use urlc_service::{BatchItem, ServiceConfig, UrlService};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(&cli, |key| std::env::var(key).ok())?;
    debug!(backend = %config.storage.backend(), base_url = %config.base_url, "configuration resolved");
    let service = UrlService::start(&config)
        .await
        .context("failed to open storage")?;

    let outcome = dispatch(&service, cli.command, cli.format).await;
    // Deletions queued by this run are flushed here.
    let shutdown = service.shutdown().await;
    outcome?;
    shutdown?;
    Ok(())
}

/// Defaults, then the config file, then the environment, then flags.
pub fn build_config(
    cli: &Cli,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<ServiceConfig> {
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ServiceConfig::default(),
    };
    config.apply_env_from(env);

    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(path) = &cli.file_storage_path {
        config.storage.file_storage_path = Some(path.clone());
    }
    if let Some(dsn) = &cli.database_dsn {
        config.storage.database_dsn = Some(dsn.clone());
    }
    Ok(config)
}

async fn dispatch(service: &UrlService, command: Command, format: OutputFormat) -> anyhow::Result<()> {
    match command {
        Command::Shorten(args) => cmd_shorten(service, args, format).await,
        Command::ShortenBatch(args) => cmd_shorten_batch(service, args, format).await,
        Command::Resolve(args) => cmd_resolve(service, args, format).await,
        Command::List(args) => cmd_list(service, args, format).await,
        Command::Delete(args) => cmd_delete(service, args, format).await,
        Command::Stats => cmd_stats(service, format).await,
        Command::Ping => cmd_ping(service, format).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct ShortenOutput {
    result: String,
}

async fn cmd_shorten(service: &UrlService, args: ShortenArgs, format: OutputFormat) -> anyhow::Result<()> {
    let id = service.shorten(args.url.as_bytes(), &args.owner).await?;
    let short_url = service.short_url(&id);
    match format {
        OutputFormat::Json => print_json(&ShortenOutput { result: short_url }),
        OutputFormat::Text => {
            println!("{} {}", "✓".green().bold(), short_url.bold());
            Ok(())
        }
    }
}

async fn cmd_shorten_batch(
    service: &UrlService,
    args: ShortenBatchArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let items: Vec<BatchItem> = serde_json::from_str(&raw).context("malformed batch file")?;

    let results = service.shorten_batch(&items, &args.owner).await?;
    match format {
        OutputFormat::Json => print_json(&results),
        OutputFormat::Text => {
            for r in &results {
                println!("  {} {}", r.correlation_id.cyan(), r.short_url);
            }
            println!("{} {} URLs shortened", "✓".green().bold(), results.len());
            Ok(())
        }
    }
}

async fn cmd_resolve(service: &UrlService, args: ResolveArgs, format: OutputFormat) -> anyhow::Result<()> {
    let url = service.resolve(&args.short_id).await?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "original_url": url })),
        OutputFormat::Text => {
            println!("{}", url);
            Ok(())
        }
    }
}

async fn cmd_list(service: &UrlService, args: ListArgs, format: OutputFormat) -> anyhow::Result<()> {
    let urls = service.user_urls(&args.owner).await?;
    match format {
        OutputFormat::Json => print_json(&urls),
        OutputFormat::Text => {
            for u in &urls {
                println!("{}  {}", u.short_url.yellow(), u.original_url);
            }
            Ok(())
        }
    }
}

async fn cmd_delete(service: &UrlService, args: DeleteArgs, format: OutputFormat) -> anyhow::Result<()> {
    let queued = service.request_deletion(&args.ids, &args.owner).await?;
    let report = service.flush_deletions().await?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "queued": queued,
            "applied": report.applied,
            "pending": report.pending,
        })),
        OutputFormat::Text => {
            if report.pending > 0 {
                println!(
                    "{} {} deletions pending retry",
                    "!".yellow().bold(),
                    report.pending
                );
            } else {
                println!("{} {} deletions applied", "✓".green().bold(), report.applied);
            }
            Ok(())
        }
    }
}

async fn cmd_stats(service: &UrlService, format: OutputFormat) -> anyhow::Result<()> {
    let stats = service.stats().await?;
    match format {
        OutputFormat::Json => print_json(&stats),
        OutputFormat::Text => {
            println!("Backend: {}", service.store().backend().to_string().cyan());
            println!("URLs:    {}", stats.urls.to_string().bold());
            println!("Users:   {}", stats.users.to_string().bold());
            Ok(())
        }
    }
}

async fn cmd_ping(service: &UrlService, format: OutputFormat) -> anyhow::Result<()> {
    service.ping().await?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "ok": true })),
        OutputFormat::Text => {
            println!(
                "{} {} backend reachable",
                "✓".green().bold(),
                service.store().backend()
            );
            Ok(())
        }
    }
}
