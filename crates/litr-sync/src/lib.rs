//! Crawl orchestration: environment configuration, the single-flight crawl
//! runner and the cron scheduler that drives it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use litr_adapters::{extract_detail, extractor_for, ExtractContext, FeedFormat};
use litr_core::{ArticleDraft, CrawlRunStatus, SourceReport};
use litr_storage::{HttpClientConfig, HttpFetcher, PageFetcher, PaperStore, StorageError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

pub const CRATE_NAME: &str = "litr-sync";

pub const DEFAULT_FEED_URL: &str = "https://www.nature.com/nature/research-articles";
pub const DEFAULT_SQLITE_PATH: &str = "./data/papers.db";
pub const DEFAULT_SCHEDULER_CRON: &str = "*/30 * * * *";
pub const DEFAULT_MAX_ITEMS_PER_RUN: usize = 50;
pub const DEFAULT_USER_AGENT: &str = "LiteratureRetrieverBot/1.0 (+https://example.com)";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;

/// One configured feed: a source tag plus the URL it is fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedSource {
    pub source: String,
    pub url: String,
}

impl FeedSource {
    /// Parses `url` or `tag=url`. Without a tag the source is the host minus `www.`.
    pub fn parse(entry: &str) -> Result<Self> {
        let entry = entry.trim();
        let (tag, raw_url) = match entry.split_once('=') {
            Some((tag, rest)) if !tag.trim().is_empty() && !tag.contains([':', '/', '?']) => {
                (Some(tag.trim()), rest.trim())
            }
            _ => (None, entry),
        };

        let url = Url::parse(raw_url).with_context(|| format!("invalid feed url {raw_url:?}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("feed url {raw_url:?} must use http or https");
        }
        let source = match tag {
            Some(tag) => tag.to_string(),
            None => url
                .host_str()
                .map(|host| host.trim_start_matches("www.").to_string())
                .with_context(|| format!("feed url {raw_url:?} has no host"))?,
        };

        Ok(Self {
            source,
            url: url.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub sqlite_path: PathBuf,
    pub scheduler_cron: String,
    pub scheduler_enabled: bool,
    pub max_items_per_run: usize,
    pub user_agent: String,
    pub feeds: Vec<FeedSource>,
    pub http_timeout_secs: u64,
    pub fetch_details: bool,
}

impl CrawlConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let scheduler_cron = var("SCHEDULER_CRON").unwrap_or_else(|| DEFAULT_SCHEDULER_CRON.into());
        normalize_cron(&scheduler_cron)?;

        let max_items_per_run = match var("MAX_ITEMS_PER_RUN") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("MAX_ITEMS_PER_RUN must be a positive integer, got {raw:?}"))?,
            None => DEFAULT_MAX_ITEMS_PER_RUN,
        };

        let http_timeout_secs = match var("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("HTTP_TIMEOUT_SECS must be a positive integer, got {raw:?}"))?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        let mut feeds = match var("FEEDS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(FeedSource::parse)
                .collect::<Result<Vec<_>>>()
                .context("parsing FEEDS")?,
            None => Vec::new(),
        };
        if feeds.is_empty() {
            feeds.push(FeedSource::parse(DEFAULT_FEED_URL)?);
        }

        Ok(Self {
            sqlite_path: var("SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLITE_PATH)),
            scheduler_cron,
            scheduler_enabled: parse_flag("START_SCHEDULER", var("START_SCHEDULER"), true)?,
            max_items_per_run,
            user_agent: var("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.into()),
            feeds,
            http_timeout_secs,
            fetch_details: parse_flag("FETCH_DETAILS", var("FETCH_DETAILS"), true)?,
        })
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
        }
    }
}

fn parse_flag(key: &str, value: Option<String>, default: bool) -> Result<bool> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{key} must be a boolean flag (1/0, true/false), got {value:?}"),
    }
}

/// Accepts standard 5-field cron and returns the seconds-first form the scheduler expects.
pub fn normalize_cron(expr: &str) -> Result<String> {
    let fields = expr.split_whitespace().collect::<Vec<_>>();
    match fields.len() {
        5 => Ok(format!("0 {}", fields.join(" "))),
        6 | 7 => Ok(fields.join(" ")),
        n => bail!("cron expression {expr:?} has {n} fields, expected 5"),
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("a crawl run is already in progress")]
    Busy,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Exclusive right to perform one crawl run. Dropping it frees the runner.
#[derive(Debug)]
pub struct RunPermit {
    run_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl RunPermit {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

pub struct CrawlRunner {
    config: CrawlConfig,
    fetcher: Arc<dyn PageFetcher>,
    store: PaperStore,
    in_flight: Arc<Mutex<()>>,
}

impl CrawlRunner {
    pub fn new(config: CrawlConfig, fetcher: Arc<dyn PageFetcher>, store: PaperStore) -> Self {
        Self {
            config,
            fetcher,
            store,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Opens the SQLite store and an HTTP fetcher described by `config`.
    pub async fn from_config(config: CrawlConfig) -> Result<Self> {
        let store = PaperStore::open(&config.sqlite_path)
            .await
            .with_context(|| format!("opening paper store {}", config.sqlite_path.display()))?;
        let fetcher = HttpFetcher::new(config.http_client_config())?;
        Ok(Self::new(config, Arc::new(fetcher), store))
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn store(&self) -> &PaperStore {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Claims the runner without waiting. Fails with [`CrawlError::Busy`] while a run is active.
    pub fn try_begin(&self) -> Result<RunPermit, CrawlError> {
        let guard = self
            .in_flight
            .clone()
            .try_lock_owned()
            .map_err(|_| CrawlError::Busy)?;
        Ok(RunPermit {
            run_id: Uuid::new_v4(),
            _guard: guard,
        })
    }

    pub async fn run_once(&self) -> Result<CrawlRunStatus, CrawlError> {
        let permit = self.try_begin()?;
        self.run_with(permit).await
    }

    /// Crawls every configured feed in order, sharing one item budget across them.
    pub async fn run_with(&self, permit: RunPermit) -> Result<CrawlRunStatus, CrawlError> {
        let run_id = permit.run_id();
        let span = info_span!("crawl_run", %run_id);
        async move {
            let mut status = CrawlRunStatus::started(run_id, Utc::now());
            self.store.save_run_status(&status).await?;
            info!(
                feeds = self.config.feeds.len(),
                max_items = self.config.max_items_per_run,
                "crawl run started"
            );

            let mut budget = self.config.max_items_per_run;
            for feed in &self.config.feeds {
                if budget == 0 {
                    info!(next_source = %feed.source, "item budget exhausted; remaining feeds skipped");
                    break;
                }
                let report = self
                    .crawl_source(feed, budget)
                    .instrument(info_span!("crawl_source", source = %feed.source, url = %feed.url))
                    .await;
                budget = budget.saturating_sub(report.items_fetched);
                status.record_source(report);
            }

            status.finish(Utc::now());
            self.store.save_run_status(&status).await?;
            info!(
                items_fetched = status.items_fetched,
                items_upserted = status.items_upserted,
                errors = status.errors.len(),
                "crawl run finished"
            );
            drop(permit);
            Ok(status)
        }
        .instrument(span)
        .await
    }

    async fn crawl_source(&self, feed: &FeedSource, budget: usize) -> SourceReport {
        let mut report = SourceReport::new(&feed.source, &feed.url);

        let page = match self.fetcher.fetch_page(&feed.url).await {
            Ok(page) => page,
            Err(err) => {
                warn!(error = %err, "feed fetch failed");
                report.errors.push(format!("fetch failed: {err}"));
                return report;
            }
        };

        let format = FeedFormat::detect(page.content_type.as_deref(), &page.body);
        let ctx = ExtractContext {
            source: feed.source.clone(),
            base_url: page.final_url.clone(),
        };
        let extraction = match extractor_for(format).extract(&page.body, &ctx, budget) {
            Ok(extraction) => extraction,
            Err(err) => {
                warn!(error = %err, ?format, "feed could not be parsed");
                report.errors.push(format!("parse failed: {err}"));
                return report;
            }
        };
        for skipped in &extraction.skipped {
            debug!(%skipped, "malformed entry skipped");
            report.errors.push(format!("parse error: {skipped}"));
        }
        report.items_fetched = extraction.articles.len();
        debug!(?format, items = report.items_fetched, "feed extracted");

        // Feed summaries are teasers; the article page abstract replaces them.
        let teaser_abstracts = format == FeedFormat::Rss;
        for mut draft in extraction.articles {
            if self.config.fetch_details && (teaser_abstracts || draft.needs_details()) {
                self.enrich(&mut draft, teaser_abstracts).await;
            }
            match self.store.upsert(&draft, Utc::now()).await {
                Ok(outcome) => {
                    debug!(url = %draft.url, ?outcome, "article stored");
                    report.items_upserted += 1;
                }
                Err(err) => {
                    error!(url = %draft.url, error = %err, "storage failure; abandoning source");
                    report.errors.push(format!("storage error: {err}"));
                    break;
                }
            }
        }
        report
    }

    /// Fills abstract/DOI from the article page. Failures leave the draft as extracted.
    async fn enrich(&self, draft: &mut ArticleDraft, replace_abstract: bool) {
        let page = match self.fetcher.fetch_page(&draft.url).await {
            Ok(page) => page,
            Err(err) => {
                debug!(url = %draft.url, error = %err, "detail fetch failed");
                return;
            }
        };
        match extract_detail(&page.body) {
            Ok(detail) => {
                if replace_abstract && detail.abstract_text.is_some() {
                    draft.abstract_text = None;
                }
                draft.fill_missing(detail.abstract_text, detail.doi);
            }
            Err(err) => debug!(url = %draft.url, error = %err, "detail page unreadable"),
        }
    }
}

/// One scheduler tick. A run already in progress makes the tick a no-op.
pub async fn scheduled_tick(runner: &CrawlRunner) -> Option<CrawlRunStatus> {
    match runner.run_once().await {
        Ok(status) => Some(status),
        Err(CrawlError::Busy) => {
            info!("previous crawl still running; scheduled tick skipped");
            None
        }
        Err(err) => {
            error!(error = %err, "scheduled crawl failed");
            None
        }
    }
}

/// Starts the cron scheduler when enabled. The caller owns shutdown of the returned handle.
pub async fn maybe_start_scheduler(
    config: &CrawlConfig,
    runner: Arc<CrawlRunner>,
) -> Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        info!("scheduler disabled");
        return Ok(None);
    }

    let cron = normalize_cron(&config.scheduler_cron)?;
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
        let runner = runner.clone();
        Box::pin(async move {
            scheduled_tick(&runner).await;
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    sched.start().await.context("starting scheduler")?;
    info!(cron = %cron, "scheduler started");
    Ok(Some(sched))
}
