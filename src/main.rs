use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use url::Url;

use feedpull::{
    DownloadItem, DownloadOptions, DownloadQueue, DownloadStatus, Episode, Feed, FeedFetcher,
    FetchOptions, NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Fetch podcast feeds and download episode enclosures
#[derive(Parser, Debug)]
#[command(name = "feedpull")]
#[command(about = "Fetch podcast feeds and download episode enclosures")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and summarize one or more feeds
    Fetch {
        /// Feed URLs
        #[arg(required = true)]
        urls: Vec<String>,

        /// Emit the parsed feeds and episodes as JSON
        #[arg(long)]
        json: bool,

        /// Request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Maximum number of concurrent fetches
        #[arg(short = 'c', long, default_value = "8")]
        concurrent: usize,

        /// Maximum episodes listed per feed
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Download episode enclosures from a feed
    Download {
        /// Feed URL
        feed: String,

        /// Output directory for downloaded episodes
        output_dir: PathBuf,

        /// Maximum number of concurrent downloads
        #[arg(short = 'c', long, default_value = "3")]
        concurrent: usize,

        /// Maximum number of episodes to download
        #[arg(short, long)]
        limit: Option<usize>,

        /// Quiet mode - suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },
}

/// Per-URL fetch outcome for `--json` output
#[derive(Serialize)]
struct FeedReport<'a> {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    feed: Option<&'a Feed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    episodes: Option<&'a [Episode]>,
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl IndicatifReporter {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn get_or_create_bar(&self, item: &DownloadItem) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap();

        if let Some(bar) = bars.get(item.url.as_str()) {
            return bar.clone();
        }

        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .unwrap()
            .progress_chars("█▓░");

        let bar = self.multi.add(ProgressBar::new(item.total_bytes.unwrap_or(0)));
        bar.set_style(style);
        bars.insert(item.url.to_string(), bar.clone());
        bar
    }

    fn finish_bar(&self, item: &DownloadItem) {
        let mut bars = self.bars.lock().unwrap();
        if let Some(bar) = bars.remove(item.url.as_str()) {
            bar.finish_and_clear();
        }
    }

    fn display_name(item: &DownloadItem) -> String {
        let name = item
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| item.url.to_string());
        truncate_title(&name, 40)
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Queued { .. } => {}

            ProgressEvent::TransferStarted { item } => {
                let bar = self.get_or_create_bar(&item);
                bar.set_length(item.total_bytes.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(Self::display_name(&item));
            }

            ProgressEvent::TransferProgress { item } => {
                let bar = self.get_or_create_bar(&item);
                if let Some(total) = item.total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(item.bytes_downloaded);
            }

            ProgressEvent::Completed { item } => {
                let bar = self.get_or_create_bar(&item);
                bar.set_position(item.bytes_downloaded);
                self.multi
                    .println(format!("{SUCCESS}{}", Self::display_name(&item).green()))
                    .ok();
                self.finish_bar(&item);
            }

            ProgressEvent::Failed { item } => {
                let error = item.error.as_deref().unwrap_or("unknown error");
                self.multi
                    .println(format!(
                        "{FAILURE}{} - {}",
                        Self::display_name(&item).red(),
                        error.red()
                    ))
                    .ok();
                self.finish_bar(&item);
            }

            ProgressEvent::Cancelled { item } => {
                self.multi
                    .println(format!(
                        "{CROSS}{} - cancelled",
                        Self::display_name(&item).yellow()
                    ))
                    .ok();
                self.finish_bar(&item);
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.len() <= max_len {
        title.to_string()
    } else {
        format!("{}...", &title[..max_len.saturating_sub(3)])
    }
}

async fn run_fetch(
    urls: Vec<String>,
    json: bool,
    timeout: u64,
    concurrent: usize,
    limit: Option<usize>,
) -> Result<()> {
    let options = FetchOptions {
        timeout: Duration::from_secs(timeout),
        max_concurrent: concurrent,
        max_episodes: limit,
        ..FetchOptions::default()
    };
    let fetcher = FeedFetcher::new(options);

    let results = fetcher.fetch_many(&urls).await;

    if json {
        let reports: Vec<FeedReport> = urls
            .iter()
            .zip(results.iter())
            .map(|(url, result)| match result {
                Ok((feed, episodes)) => FeedReport {
                    url: url.clone(),
                    error: None,
                    feed: Some(feed),
                    episodes: Some(episodes),
                },
                Err(e) => FeedReport {
                    url: url.clone(),
                    error: Some(e.to_string()),
                    feed: None,
                    episodes: None,
                },
            })
            .collect();

        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for (url, result) in urls.iter().zip(results.iter()) {
            match result {
                Ok((feed, episodes)) => {
                    println!(
                        "{SUCCESS}{} • {} episodes",
                        feed.title.bold().green(),
                        episodes.len().to_string().cyan()
                    );
                    println!("   {}", url.dimmed());
                    for episode in episodes.iter() {
                        let date = episode
                            .pub_date
                            .map(|d| d.format("%Y-%m-%d").to_string())
                            .unwrap_or_else(|| "undated".to_string());
                        println!("   {} {}", date.dimmed(), episode.title);
                    }
                }
                Err(e) => {
                    println!("{FAILURE}{} - {}", url.yellow(), e.to_string().red());
                }
            }
        }
    }

    let failed = results.iter().filter(|r| r.is_err()).count();
    if !results.is_empty() && failed == results.len() {
        std::process::exit(1);
    }

    Ok(())
}

async fn run_download(
    feed_url: String,
    output_dir: PathBuf,
    concurrent: usize,
    limit: Option<usize>,
    quiet: bool,
) -> Result<()> {
    if !quiet {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "feedpull".bold().magenta(),
            "- Podcast Downloader".dimmed()
        );
        println!("{SEARCH}Fetching feed: {}", feed_url.cyan());
    }

    let options = FetchOptions {
        max_episodes: limit,
        ..FetchOptions::default()
    };
    let fetcher = FeedFetcher::new(options);
    let (feed, episodes) = fetcher
        .fetch(&feed_url)
        .await
        .with_context(|| format!("Failed to fetch {feed_url}"))?;

    if !quiet {
        println!(
            "{HEADPHONES}{} • {} episodes to download",
            feed.title.bold().green(),
            episodes.len().to_string().cyan()
        );
    }

    if episodes.is_empty() {
        return Ok(());
    }

    let mut download_options = DownloadOptions::new(&output_dir);
    download_options.max_concurrent = concurrent;
    let queue = DownloadQueue::new(download_options);

    let reporter: SharedProgressReporter = if quiet {
        NoopReporter::shared()
    } else {
        Arc::new(IndicatifReporter::new())
    };
    queue.set_progress_reporter(reporter);

    let requests: Vec<(Url, Option<String>)> = episodes
        .iter()
        .map(|episode| {
            (
                episode.enclosure.url.clone(),
                Some(episode.download_filename()),
            )
        })
        .collect();

    for result in queue.add_batch(requests) {
        // Duplicate enclosure URLs within one feed are skipped, not fatal
        if let Err(e) = result
            && !quiet
        {
            println!("{CROSS}{}", e.to_string().yellow());
        }
    }

    queue.wait_all().await;

    let items = queue.get_items();
    let completed = items
        .iter()
        .filter(|i| i.status == DownloadStatus::Completed)
        .count();
    let failed: Vec<&DownloadItem> = items
        .iter()
        .filter(|i| i.status == DownloadStatus::Failed)
        .collect();

    if !quiet {
        println!(
            "\n{PARTY}{} {} downloaded, {} failed",
            "Done:".bold().green(),
            completed.to_string().green().bold(),
            if failed.is_empty() {
                failed.len().to_string().green()
            } else {
                failed.len().to_string().red().bold()
            }
        );

        for item in &failed {
            println!(
                "  {CROSS}{} - {}",
                item.url.to_string().yellow(),
                item.error.as_deref().unwrap_or("unknown error").dimmed()
            );
        }

        println!(
            "\n{FOLDER}Output: {}\n",
            output_dir.display().to_string().cyan()
        );
    }

    if completed == 0 && !failed.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Fetch {
            urls,
            json,
            timeout,
            concurrent,
            limit,
        } => run_fetch(urls, json, timeout, concurrent, limit).await,

        Command::Download {
            feed,
            output_dir,
            concurrent,
            limit,
            quiet,
        } => run_download(feed, output_dir, concurrent, limit, quiet).await,
    }
}
