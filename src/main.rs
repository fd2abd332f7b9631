use std::{
    fs,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use log::debug;
use seo_audit::{
    http_analyzer::HttpAnalyzer,
    report::markdown_report,
    runner::{Runner, RunnerOptions},
    types::CrawlPhase,
    utils::truncate_url,
};
use signal_hook::consts::{SIGINT, SIGTERM};
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[command(author, version, about = "On-page SEO auditor: crawls a site and scores every page", long_about = None)]
struct Args {
    /// Seed URL to crawl (may be omitted when resuming an interrupted crawl)
    url: Option<String>,
    /// Maximum number of pages per crawl
    #[arg(long, default_value_t = 50)]
    max_pages: usize,
    /// Maximum link depth from the seed (0 = seed page only)
    #[arg(long, default_value_t = 3)]
    max_depth: u32,
    /// Minimum milliseconds between consecutive page analyses
    #[arg(long, default_value_t = 800)]
    rate_limit_ms: u64,
    /// Per-page analysis timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,
    /// Number of retries per failed page
    #[arg(short = 'r', long, default_value_t = 2)]
    retries: u32,
    /// Directory for the crawl checkpoint and audit history
    #[arg(short = 's', long, default_value = ".seo-audit")]
    state_dir: PathBuf,
    /// List saved audits and exit
    #[arg(long)]
    history: bool,
    /// Write the most recent audit as a markdown report to this path and exit
    #[arg(long)]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    let options = RunnerOptions::default_builder()
        .state_dir(args.state_dir)
        .max_pages(args.max_pages)
        .max_depth(args.max_depth)
        .page_interval_ms(args.rate_limit_ms)
        .analyze_timeout_ms(args.timeout * 1000)
        .max_retries(args.retries)
        .build()?;

    let analyzer = Arc::new(HttpAnalyzer::new()?);
    let runner = Arc::new(Runner::new(options, analyzer)?);

    if args.history {
        let audits = runner.audits()?;
        if audits.is_empty() {
            println!("No previous audits");
            return Ok(());
        }
        for audit in audits {
            println!(
                "{}  {}  {} pages  score {}  {}",
                audit.id,
                audit.finished_at.format("%Y-%m-%d %H:%M"),
                audit.page_count,
                audit.overall_score,
                audit.start_url
            );
        }
        return Ok(());
    }

    if let Some(path) = args.export {
        let audits = runner.audits()?;
        let latest = audits.first().context("no saved audit to export")?;
        fs::write(&path, markdown_report(latest))
            .context(format!("could not write report to {:?}", path))?;
        println!("report written to {}", path.display());
        return Ok(());
    }

    // A checkpoint left behind by a killed process takes precedence over a
    // fresh seed.
    let resumed = runner.resume_from_checkpoint()?;
    if resumed {
        println!("Resuming interrupted crawl...");
    } else {
        let url = args
            .url
            .context("a seed URL is required unless an interrupted crawl is being resumed")?;
        runner.start_crawl(&url)?;
    }

    let should_terminate = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGTERM, Arc::clone(&should_terminate))?;
    signal_hook::flag::register(SIGINT, Arc::clone(&should_terminate))?;
    {
        let runner = runner.clone();
        tokio::spawn(async move {
            loop {
                if should_terminate.load(Ordering::Relaxed) {
                    debug!("termination signal received, cancelling crawl");
                    runner.cancel();
                    break;
                }
                sleep(Duration::from_millis(200)).await;
            }
        });
    }

    let printer = {
        let runner = runner.clone();
        tokio::spawn(async move {
            let mut last_message = String::new();
            loop {
                let status = runner.status();
                if status.progress.message != last_message {
                    println!("{}", status.progress.message);
                    last_message = status.progress.message;
                }
                if !status.running && !status.paused {
                    break;
                }
                sleep(Duration::from_millis(500)).await;
            }
        })
    };

    let phase = runner.wait().await;
    printer.abort();

    match phase {
        Some(CrawlPhase::Completed) => {
            let audits = runner.audits()?;
            let audit = audits.first().context("completed crawl saved no audit")?;
            println!();
            println!("{}  overall score {}/100", audit.start_url, audit.overall_score);
            println!(
                "{} pages analyzed in {}s",
                audit.page_count,
                (audit.finished_at - audit.started_at).num_seconds()
            );
            if let Some(stats) = &audit.aggregate {
                println!(
                    "avg seo {}  avg words {}  avg readability {}  median readability {}",
                    stats.averages.seo_score,
                    stats.averages.word_count,
                    stats.averages.readability,
                    stats.median_readability
                );
                println!(
                    "images: {} total, {}% with alt text",
                    stats.images.total, stats.images.alt_percentage
                );
                for (keyword, count) in stats.top_keywords.iter().take(5) {
                    println!("  keyword {}  x{}", keyword, count);
                }
                for (url, count) in stats.top_outbound_links.iter().take(5) {
                    println!("  external {}  linked from {} pages", truncate_url(url, 60), count);
                }
            }
            println!("run with --export report.md to save the full report");
        }
        Some(CrawlPhase::Cancelled) => println!("Crawl cancelled, nothing saved"),
        _ => {}
    }

    Ok(())
}
