//! # harvest CLI
//!
//! `fetch` dumps a provider endpoint as JSON, `summarize-commits` summarises
//! a repository's commits for a period and `status` inspects a progress file.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use harvest::config::{AppConfig, ConfigLoader};
use harvest::fetch::{EndpointSpec, PaginatedFetcher, Record, Throttle, build_http_client};
use harvest::processor::{ResumableRun, RunReport};
use harvest::progress::ProgressStore;
use harvest::providers::github::{self, CommitDetailProcessor, RepoSlug, commit_info};
use harvest::providers::{hackernews, paypal, raindrop, readwise, twitter};
use harvest::summarize::{
    self, AnthropicClient, AnthropicSummarizer, digest, digest_path, summaries_path,
};
use harvest::telemetry::init_tracing;
use harvest::window::{DateWindow, today};
use serde_json::Value;
use tracing::debug;

/// Period used by `summarize-commits` when neither `--days` nor `--month` is given
const DEFAULT_DAYS: u32 = 7;

/// Pull personal data out of paginated APIs and summarise it.
#[derive(Parser)]
#[command(name = "harvest", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch every record of a provider endpoint as a JSON array.
    Fetch {
        #[command(subcommand)]
        provider: Provider,
    },

    /// Summarise a repository's commits and write a digest for the period.
    SummarizeCommits {
        /// OWNER/NAME or a github.com URL
        #[arg(long)]
        repo: String,
        #[command(flatten)]
        window: WindowArgs,
        /// Only digest summaries already on disk
        #[arg(long)]
        no_fetch: bool,
        /// Include each commit's changed files (one extra request per commit)
        #[arg(long)]
        detail: bool,
    },

    /// Show what a progress file holds.
    Status {
        #[arg(long)]
        store: PathBuf,
        #[command(flatten)]
        window: WindowArgs,
        /// JSON pointer to each entry's date
        #[arg(long, default_value = summarize::DATE)]
        date_pointer: String,
    },
}

#[derive(Subcommand)]
enum Provider {
    /// Commits of a GitHub repository
    GithubCommits {
        repo: String,
        #[command(flatten)]
        common: FetchArgs,
    },
    /// Readwise Reader documents
    ReadwiseDocuments {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[command(flatten)]
        common: FetchArgs,
    },
    /// Readwise highlights from the export endpoint, with their book
    ReadwiseExport {
        #[command(flatten)]
        common: FetchArgs,
    },
    /// Readwise highlights list
    ReadwiseHighlights {
        #[command(flatten)]
        common: FetchArgs,
    },
    /// Raindrop.io bookmarks of a collection (0 = all)
    Raindrop {
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        collection: i64,
        #[command(flatten)]
        common: FetchArgs,
    },
    /// Hacker News comments by a user
    HackernewsComments {
        user: String,
        #[command(flatten)]
        common: FetchArgs,
    },
    /// Twitter bookmarks of a user
    TwitterBookmarks {
        user_id: String,
        #[command(flatten)]
        common: FetchArgs,
    },
    /// PayPal catalog products
    PaypalProducts {
        #[command(flatten)]
        common: FetchArgs,
    },
    /// PayPal billing plans
    PaypalPlans {
        #[arg(long)]
        product_id: Option<String>,
        #[command(flatten)]
        common: FetchArgs,
    },
}

impl Provider {
    fn common(&self) -> &FetchArgs {
        match self {
            Provider::GithubCommits { common, .. }
            | Provider::ReadwiseDocuments { common, .. }
            | Provider::ReadwiseExport { common }
            | Provider::ReadwiseHighlights { common }
            | Provider::Raindrop { common, .. }
            | Provider::HackernewsComments { common, .. }
            | Provider::TwitterBookmarks { common, .. }
            | Provider::PaypalProducts { common }
            | Provider::PaypalPlans { common, .. } => common,
        }
    }
}

#[derive(Args, Clone)]
struct FetchArgs {
    #[command(flatten)]
    window: WindowArgs,
    /// Write the records here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct WindowArgs {
    /// From N days ago through today
    #[arg(long, conflicts_with = "month")]
    days: Option<u32>,
    /// A calendar month, YYYY-MM
    #[arg(long)]
    month: Option<String>,
}

impl WindowArgs {
    fn resolve(&self) -> Result<Option<DateWindow>> {
        let window = match (self.days, self.month.as_deref()) {
            (Some(days), _) => Some(DateWindow::last_days(days, today())?),
            (None, Some(month)) => Some(DateWindow::parse_month(month)?),
            (None, None) => None,
        };
        Ok(window)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    if let Err(err) = init_tracing(&config) {
        eprintln!("Warning: failed to initialise tracing: {}", err);
    }
    if let Ok(redacted) = config.redacted_json() {
        debug!("configuration: {}", redacted);
    }

    match cli.command {
        Command::Fetch { provider } => run_fetch(&config, provider).await,
        Command::SummarizeCommits {
            repo,
            window,
            no_fetch,
            detail,
        } => run_summarize_commits(&config, &repo, &window, no_fetch, detail).await,
        Command::Status {
            store,
            window,
            date_pointer,
        } => run_status(store, &window, &date_pointer),
    }
}

async fn run_fetch(config: &AppConfig, provider: Provider) -> Result<()> {
    let common = provider.common().clone();
    let window = common.window.resolve()?;
    let fetcher = PaginatedFetcher::from_config(config)?;

    // Pointer to filter on locally when the API cannot filter by date
    let (spec, local_filter): (EndpointSpec, Option<&str>) = match &provider {
        Provider::GithubCommits { repo, .. } => {
            let repo = parse_repo(repo)?;
            (github::commits(config, &repo, window.as_ref())?, None)
        }
        Provider::ReadwiseDocuments {
            category, location, ..
        } => (
            readwise::documents(
                config,
                category.as_deref(),
                location.as_deref(),
                window.as_ref(),
            )?,
            None,
        ),
        Provider::ReadwiseExport { .. } => (
            readwise::export(config, window.as_ref())?,
            Some(readwise::HIGHLIGHTED_AT),
        ),
        Provider::ReadwiseHighlights { .. } => {
            (readwise::highlights(config, window.as_ref())?, None)
        }
        Provider::Raindrop { collection, .. } => {
            (raindrop::collection(config, *collection)?, None)
        }
        Provider::HackernewsComments { user, .. } => (
            hackernews::comments(config, user)?,
            Some(hackernews::CREATED_AT),
        ),
        Provider::TwitterBookmarks { user_id, .. } => (
            twitter::bookmarks(config, user_id)?,
            Some(twitter::CREATED_AT),
        ),
        Provider::PaypalProducts { .. } => {
            let token = paypal::access_token(&fetcher, config).await?;
            (paypal::products(config, &token)?, None)
        }
        Provider::PaypalPlans { product_id, .. } => {
            let token = paypal::access_token(&fetcher, config).await?;
            (paypal::plans(config, &token, product_id.as_deref())?, None)
        }
    };

    let outcome = fetcher.fetch_all(&spec).await?;
    let mut records = outcome.records;
    if let (Some(window), Some(pointer)) = (window.as_ref(), local_filter) {
        records = window.retain_records(records, pointer);
    }

    let bodies: Vec<&Value> = records.iter().map(|record| &record.body).collect();
    let json = serde_json::to_string_pretty(&bodies)?;
    match &common.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            println!(
                "Saved {} records from {} pages to {}",
                records.len(),
                outcome.pages,
                path.display()
            );
        }
        None => println!("{}", json),
    }
    if outcome.truncated {
        eprintln!("Warning: stopped early at a malformed page, the result is partial");
    }
    Ok(())
}

async fn run_summarize_commits(
    config: &AppConfig,
    repo: &str,
    window: &WindowArgs,
    no_fetch: bool,
    detail: bool,
) -> Result<()> {
    let repo = parse_repo(repo)?;
    let window = match window.resolve()? {
        Some(window) => window,
        None => DateWindow::last_days(DEFAULT_DAYS, today())?,
    };
    println!("Analyzing {} from {} to {}", repo, window.start(), window.end());

    let store_path = summaries_path(&config.progress_dir, &repo.file_stem());
    let mut store = ProgressStore::open(&store_path)?;
    println!(
        "Found {} existing summaries for the period",
        store.entries_in(&window, summarize::DATE).len()
    );

    let http = build_http_client(config)?;
    let throttle = Throttle::from_config(config);
    let anthropic = AnthropicClient::from_config(config, http.clone())?;

    if !no_fetch {
        let fetcher = PaginatedFetcher::new(http, throttle.clone());
        let spec = github::commits(config, &repo, Some(&window))?;
        let outcome = fetcher.fetch_all(&spec).await?;
        println!("Found {} commits", outcome.records.len());

        let commits: Vec<Record> = outcome
            .records
            .iter()
            .map(|record| Record::new(record.id.clone(), commit_info(&repo, &record.body, None)))
            .collect();

        let run = ResumableRun::new(throttle.clone());
        let summarizer = AnthropicSummarizer::for_commits(anthropic.clone());
        let report = if detail {
            let processor = CommitDetailProcessor::new(&fetcher, config, repo.clone(), summarizer);
            run.run(&commits, &mut store, &processor).await?
        } else {
            run.run(&commits, &mut store, &summarizer).await?
        };
        print_report(&report, &store_path);
    }

    let entries = store.entries_in(&window, summarize::DATE);
    match digest(&anthropic, &throttle, &entries, &window, &repo.to_string()).await? {
        Some(text) => {
            let path = digest_path(&config.progress_dir, &repo.file_stem(), &window);
            fs::create_dir_all(&config.progress_dir)
                .with_context(|| format!("creating {}", config.progress_dir.display()))?;
            fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
            println!("Digest of {} commits saved to {}", entries.len(), path.display());
        }
        None => println!("No commits found for the specified period. Nothing to digest."),
    }
    Ok(())
}

fn print_report(report: &RunReport, store_path: &std::path::Path) {
    println!(
        "Summarised {} new commits ({} already done) into {}",
        report.processed,
        report.skipped,
        store_path.display()
    );
    if !report.failed.is_empty() {
        println!(
            "{} commits failed and will be retried next run: {}",
            report.failed.len(),
            report.failed.join(", ")
        );
    }
}

fn run_status(store: PathBuf, window: &WindowArgs, date_pointer: &str) -> Result<()> {
    let store = ProgressStore::open(store)?;
    println!("{}: {} entries", store.path().display(), store.len());

    if let Some(window) = window.resolve()? {
        let entries = store.entries_in(&window, date_pointer);
        println!("{} entries between {} and {}", entries.len(), window.start(), window.end());
        for (id, value) in entries {
            let date = value
                .pointer(date_pointer)
                .and_then(Value::as_str)
                .unwrap_or_default();
            println!("  {}  {}", date, id);
        }
    }
    Ok(())
}

fn parse_repo(value: &str) -> Result<RepoSlug> {
    RepoSlug::parse(value)
        .ok_or_else(|| anyhow!("expected OWNER/NAME or a GitHub URL, got '{}'", value))
}
