//! dinecache - browse restaurants and reviews from the terminal, online or
//! offline.
//!
//! Every command goes through the same cache and write queue the library
//! offers to pages: reads are served from the local store when possible,
//! favorites and reviews are queued and sent when the server is reachable.

mod output;

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dinecache_core::router::Request;
use dinecache_core::sync::SyncEvent;
use dinecache_core::{Config, DineCache};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use output::Output;

/// Capacity of the channel carrying background sync events.
const CHANNEL_BUFFER_SIZE: usize = 16;

#[derive(Debug, Parser)]
#[command(name = "dinecache")]
#[command(about = "Offline-first restaurant reviews from the terminal")]
#[command(version)]
struct Cli {
    /// Review API base URL
    #[arg(long, global = true, env = "DINECACHE_API_URL")]
    api_url: Option<String>,

    /// Directory for the local store (default: platform cache dir)
    #[arg(long, global = true, env = "DINECACHE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Answer from the local store only; queued writes stay queued
    #[arg(long, global = true)]
    offline: bool,

    /// Also write logs to daily files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List restaurants, optionally filtered ("all" matches everything)
    Restaurants {
        #[arg(long, default_value = "all")]
        cuisine: String,
        #[arg(long, default_value = "all")]
        neighborhood: String,
    },
    /// Show one restaurant with its reviews
    Show { id: i64 },
    /// List neighborhoods
    Neighborhoods,
    /// List cuisines
    Cuisines,
    /// List reviews for a restaurant
    Reviews { restaurant_id: i64 },
    /// Mark or unmark a restaurant as favorite
    Favorite {
        id: i64,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },
    /// Write a review
    Review {
        restaurant_id: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        rating: u8,
        #[arg(long, default_value = "")]
        comments: String,
    },
    /// Issue a GET through the request router and show where the answer came from
    Get { url: String },
    /// Send queued writes now
    Sync,
    /// Cache everything needed to browse offline
    Warm,
    /// Show cache contents and queue length
    Status,
    /// Replay queued writes in the background until interrupted
    Watch,
    /// Drop cached restaurants and reviews (queued writes are kept)
    Clear,
    /// Show or change the saved configuration
    Config {
        #[arg(long)]
        set_api_url: Option<String>,
        #[arg(long)]
        set_ttl_minutes: Option<i64>,
        #[arg(long)]
        set_sync_interval: Option<u64>,
        #[arg(long)]
        set_offline: Option<bool>,
    },
}

/// Initialize the tracing subscriber for logging. The returned guard must
/// live until exit so file logs are flushed.
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "dinecache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_ref());
    info!(command = ?cli.command, "dinecache starting");

    let mut config = Config::load()?;
    if let Some(ref url) = cli.api_url {
        config.api_base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(ref dir) = cli.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    if cli.offline {
        config.offline_mode = true;
    }

    let out = Output::new(cli.json);
    match cli.command {
        Command::Config {
            set_api_url,
            set_ttl_minutes,
            set_sync_interval,
            set_offline,
        } => configure(&out, set_api_url, set_ttl_minutes, set_sync_interval, set_offline),
        command => {
            let mut cache = DineCache::open(config)?;
            let result = run(&mut cache, command, &out).await;
            cache.shutdown().await;
            result
        }
    }
}

async fn run(cache: &mut DineCache, command: Command, out: &Output) -> Result<()> {
    let helper = cache.helper();
    match command {
        Command::Restaurants {
            cuisine,
            neighborhood,
        } => {
            let restaurants = helper
                .fetch_restaurants_by_cuisine_and_neighborhood(&cuisine, &neighborhood)
                .await?;
            out.restaurants(&restaurants)
        }
        Command::Show { id } => {
            let restaurant = helper.fetch_restaurant_by_id(id).await?;
            let reviews = match helper.fetch_reviews_by_id(id).await {
                Ok(reviews) => reviews,
                Err(e) => {
                    warn!(restaurant_id = id, error = %e, "Reviews unavailable");
                    Vec::new()
                }
            };
            out.restaurant(&restaurant, &reviews)
        }
        Command::Neighborhoods => out.names(&helper.fetch_neighborhoods().await?),
        Command::Cuisines => out.names(&helper.fetch_cuisines().await?),
        Command::Reviews { restaurant_id } => {
            let reviews = helper.fetch_reviews_by_id(restaurant_id).await?;
            out.reviews(&reviews)
        }
        Command::Favorite { id, value } => {
            let update = helper.update_favorite_selection(id, value).await?;
            out.favorite(&update, cache.store().queue_len()?)
        }
        Command::Review {
            restaurant_id,
            name,
            rating,
            comments,
        } => {
            let review = helper
                .save_review(restaurant_id, &name, rating, &comments)
                .await?;
            out.saved_review(&review, cache.store().queue_len()?)
        }
        Command::Get { url } => {
            let request = Request::get(&url).with_context(|| format!("Invalid URL: {}", url))?;
            let response = cache.router().handle(request).await;
            out.response(&response)
        }
        Command::Sync => {
            let report = cache.sync().await?;
            out.sync_report(&report)
        }
        Command::Warm => {
            let report = helper.warm_cache().await?;
            out.warm_report(&report)
        }
        Command::Status => {
            let status = cache.status()?;
            out.status(&status, cache.config())
        }
        Command::Watch => watch(cache, out).await,
        Command::Clear => {
            cache.clear_cache()?;
            out.message("Cleared cached restaurants and reviews")
        }
        Command::Config { .. } => Ok(()),
    }
}

async fn watch(cache: &mut DineCache, out: &Output) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    cache.start_sync_worker(tx);
    out.message(&format!(
        "Replaying queued writes every {}s, Ctrl-C to stop",
        cache.config().sync_interval().as_secs()
    ))?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => match event {
                Some(SyncEvent::Completed(report)) => out.sync_report(&report)?,
                Some(SyncEvent::Failed(error)) => warn!(error = %error, "Sync failed"),
                None => break,
            },
        }
    }
    Ok(())
}

fn configure(
    out: &Output,
    api_url: Option<String>,
    ttl_minutes: Option<i64>,
    sync_interval: Option<u64>,
    offline: Option<bool>,
) -> Result<()> {
    // Re-read without CLI and env overrides so they are not persisted.
    let path = Config::config_path()?;
    let mut config = Config::load_from(&path)?;
    let changed = api_url.is_some()
        || ttl_minutes.is_some()
        || sync_interval.is_some()
        || offline.is_some();

    if let Some(url) = api_url {
        config.api_base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(minutes) = ttl_minutes {
        config.cache_ttl_minutes = (minutes > 0).then_some(minutes);
    }
    if let Some(secs) = sync_interval {
        config.sync_interval_secs = secs;
    }
    if let Some(offline) = offline {
        config.offline_mode = offline;
    }

    if changed {
        config.api_port()?;
        config.save_to(&path)?;
        info!(path = %path.display(), "Configuration saved");
    }
    out.config(&config, &path)
}
