//! SQLite paper store + HTTP fetch utilities for the literature retriever.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use litr_core::{Article, ArticleDraft, CrawlRunStatus, PaperPage, PaperQuery};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, CONTENT_TYPE};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::{debug, info};

pub use reqwest::StatusCode;

pub const CRATE_NAME: &str = "litr-storage";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

impl FetchError {
    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// Something that can retrieve a page body for a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<FetchedResponse, FetchError>;
}

/// Single-attempt HTTP GET client shared by every feed in a run.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .default_headers(headers)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        debug!(url, "fetching page");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(url, err))?;

        let status = resp.status();
        let final_url = resp.url().to_string();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = resp
            .bytes()
            .await
            .map_err(|err| FetchError::from_reqwest(url, err))?
            .to_vec();

        Ok(FetchedResponse {
            status,
            final_url,
            content_type,
            body,
        })
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("preparing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS papers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL UNIQUE,
        doi TEXT,
        title TEXT NOT NULL,
        authors TEXT NOT NULL DEFAULT '[]',
        published_date TEXT,
        abstract TEXT,
        journal TEXT,
        source TEXT NOT NULL,
        first_seen_at TEXT NOT NULL,
        last_seen_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_papers_last_seen ON papers(last_seen_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_papers_source_seen ON papers(source, last_seen_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS crawl_status (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        status_json TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
];

// Absent optional values and empty author lists never erase stored data.
const UPSERT_SQL: &str = r#"
    INSERT INTO papers (url, doi, title, authors, published_date, abstract, journal, source, first_seen_at, last_seen_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(url) DO UPDATE SET
        doi = COALESCE(excluded.doi, papers.doi),
        title = excluded.title,
        authors = CASE WHEN excluded.authors = '[]' THEN papers.authors ELSE excluded.authors END,
        published_date = COALESCE(excluded.published_date, papers.published_date),
        abstract = COALESCE(excluded.abstract, papers.abstract),
        journal = COALESCE(excluded.journal, papers.journal),
        source = excluded.source,
        last_seen_at = excluded.last_seen_at
"#;

const PAPER_COLUMNS: &str =
    "id, url, doi, title, authors, published_date, abstract, journal, source, first_seen_at, last_seen_at";

/// Single-table article store keyed by url, plus the latest crawl status.
#[derive(Debug, Clone)]
pub struct PaperStore {
    pool: SqlitePool,
}

impl PaperStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path = %path.display(), "paper store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert the draft if its url is unseen, otherwise merge it into the stored row.
    pub async fn upsert(
        &self,
        draft: &ArticleDraft,
        seen_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StorageError> {
        let authors = serde_json::to_string(&draft.authors)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let seen_at = format_timestamp(seen_at);

        let mut tx = self.pool.begin().await?;
        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM papers WHERE url = ?")
            .bind(&draft.url)
            .fetch_optional(&mut *tx)
            .await?;
        sqlx::query(UPSERT_SQL)
            .bind(&draft.url)
            .bind(&draft.doi)
            .bind(&draft.title)
            .bind(authors)
            .bind(draft.published_date.map(format_timestamp))
            .bind(&draft.abstract_text)
            .bind(&draft.journal)
            .bind(&draft.source)
            .bind(&seen_at)
            .bind(&seen_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(match existing {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        })
    }

    /// Most-recently-seen first; keyword matches title or abstract.
    pub async fn query(&self, query: &PaperQuery) -> Result<PaperPage, StorageError> {
        let mut sql = format!("SELECT {PAPER_COLUMNS} FROM papers WHERE 1=1");
        if query.keyword.is_some() {
            sql.push_str(r" AND (title LIKE ? ESCAPE '\' OR abstract LIKE ? ESCAPE '\')");
        }
        if query.source.is_some() {
            sql.push_str(" AND source = ?");
        }
        sql.push_str(" ORDER BY last_seen_at DESC, id DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query(&sql);
        if let Some(keyword) = &query.keyword {
            let pattern = format!("%{}%", escape_like(keyword));
            q = q.bind(pattern.clone()).bind(pattern);
        }
        if let Some(source) = &query.source {
            q = q.bind(source.clone());
        }
        let rows = q
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(article_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PaperPage {
            count: items.len(),
            items,
            offset: query.offset,
            limit: query.limit,
        })
    }

    pub async fn get_by_url(&self, url: &str) -> Result<Option<Article>, StorageError> {
        let row = sqlx::query(&format!("SELECT {PAPER_COLUMNS} FROM papers WHERE url = ?"))
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(article_from_row).transpose()
    }

    pub async fn count(&self) -> Result<i64, StorageError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM papers")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Overwrites the single retained run status.
    pub async fn save_run_status(&self, status: &CrawlRunStatus) -> Result<(), StorageError> {
        let json =
            serde_json::to_string(status).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO crawl_status (id, status_json, updated_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status_json = excluded.status_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(json)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_run_status(&self) -> Result<Option<CrawlRunStatus>, StorageError> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT status_json FROM crawl_status WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        json.map(|text| {
            serde_json::from_str(&text).map_err(|e| StorageError::Corrupt(e.to_string()))
        })
        .transpose()
    }
}

fn article_from_row(row: &SqliteRow) -> Result<Article, StorageError> {
    let authors: String = row.try_get("authors")?;
    let published_date: Option<String> = row.try_get("published_date")?;
    let first_seen_at: String = row.try_get("first_seen_at")?;
    let last_seen_at: String = row.try_get("last_seen_at")?;
    Ok(Article {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        doi: row.try_get("doi")?,
        title: row.try_get("title")?,
        authors: serde_json::from_str(&authors)
            .map_err(|e| StorageError::Corrupt(format!("authors: {e}")))?,
        published_date: published_date.as_deref().map(parse_timestamp).transpose()?,
        abstract_text: row.try_get("abstract")?,
        journal: row.try_get("journal")?,
        source: row.try_get("source")?,
        first_seen_at: parse_timestamp(&first_seen_at)?,
        last_seen_at: parse_timestamp(&last_seen_at)?,
    })
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("timestamp {text:?}: {e}")))
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
