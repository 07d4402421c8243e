use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use litr_adapters::{extractor_for, ExtractContext, FeedFormat};
use litr_storage::{HttpFetcher, PageFetcher};
use litr_sync::{CrawlConfig, CrawlRunner, FeedSource};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "litr")]
#[command(about = "Literature retriever: crawl research feeds into SQLite and serve them as JSON")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the API and run the scheduler (default).
    Serve,
    /// Run a single crawl and print its summary.
    Crawl {
        #[arg(long)]
        json: bool,
    },
    /// Fetch and extract one feed without storing anything.
    Probe {
        url: String,
        #[arg(long, default_value_t = 10)]
        max_items: usize,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => litr_web::serve_from_env().await?,
        Commands::Crawl { json } => {
            let config = CrawlConfig::from_env()?;
            info!(
                feeds = config.feeds.len(),
                max_items = config.max_items_per_run,
                db = %config.sqlite_path.display(),
                "starting one-off crawl"
            );
            let runner = CrawlRunner::from_config(config).await?;
            let status = runner.run_once().await.context("crawl run failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!(
                    "crawl complete: run_id={} fetched={} upserted={} errors={}",
                    status.run_id,
                    status.items_fetched,
                    status.items_upserted,
                    status.errors.len()
                );
                for report in &status.sources {
                    println!(
                        "  {:<24} fetched={:<4} upserted={:<4} errors={}",
                        report.source,
                        report.items_fetched,
                        report.items_upserted,
                        report.errors.len()
                    );
                }
                for err in &status.errors {
                    println!("  ! {err}");
                }
            }
        }
        Commands::Probe {
            url,
            max_items,
            json,
        } => probe(&url, max_items, json).await?,
    }

    Ok(())
}

async fn probe(url: &str, max_items: usize, json: bool) -> Result<()> {
    let feed = FeedSource::parse(url)?;
    let config = CrawlConfig::from_env()?;
    let fetcher = HttpFetcher::new(config.http_client_config())?;

    info!(url = %feed.url, source = %feed.source, max_items, "probing feed");
    let page = fetcher.fetch_page(&feed.url).await?;
    let format = FeedFormat::detect(page.content_type.as_deref(), &page.body);
    info!(?format, bytes = page.body.len(), final_url = %page.final_url, "feed fetched");
    let ctx = ExtractContext {
        source: feed.source.clone(),
        base_url: page.final_url.clone(),
    };
    let extraction = extractor_for(format)
        .extract(&page.body, &ctx, max_items)
        .with_context(|| format!("extracting {}", feed.url))?;

    if !extraction.skipped.is_empty() {
        warn!(skipped = extraction.skipped.len(), "some feed entries could not be parsed");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&extraction.articles)?);
        return Ok(());
    }

    println!(
        "{} ({:?}, status {}): {} articles, {} skipped",
        page.final_url,
        format,
        page.status,
        extraction.articles.len(),
        extraction.skipped.len()
    );
    for article in &extraction.articles {
        println!("- {}", article.title);
        println!("  {}", article.url);
        if let Some(doi) = &article.doi {
            println!("  doi: {doi}");
        }
        if !article.authors.is_empty() {
            println!("  authors: {}", article.authors.join(", "));
        }
    }
    for skipped in &extraction.skipped {
        println!("! {skipped}");
    }
    Ok(())
}
