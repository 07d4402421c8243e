//! Core domain model for the literature retriever: articles, crawl run status
//! and validated paper queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "litr-core";

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 200;

/// Candidate article handed from the extractors to the crawl runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub url: String,
    pub doi: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    pub published_date: Option<DateTime<Utc>>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub journal: Option<String>,
    pub source: String,
}

impl ArticleDraft {
    pub fn new(url: impl Into<String>, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            doi: None,
            title: title.into(),
            authors: Vec::new(),
            published_date: None,
            abstract_text: None,
            journal: None,
            source: source.into(),
        }
    }

    /// True when an article page could still contribute an abstract or DOI.
    pub fn needs_details(&self) -> bool {
        self.abstract_text.is_none() || self.doi.is_none()
    }

    pub fn fill_missing(&mut self, abstract_text: Option<String>, doi: Option<String>) {
        if self.abstract_text.is_none() {
            self.abstract_text = abstract_text;
        }
        if self.doi.is_none() {
            self.doi = doi;
        }
    }
}

/// Persisted article row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub url: String,
    pub doi: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    pub published_date: Option<DateTime<Utc>>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub journal: Option<String>,
    pub source: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Per-feed outcome inside a crawl run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    pub feed_url: String,
    pub items_fetched: usize,
    pub items_upserted: usize,
    pub errors: Vec<String>,
}

impl SourceReport {
    pub fn new(source: impl Into<String>, feed_url: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            feed_url: feed_url.into(),
            items_fetched: 0,
            items_upserted: 0,
            errors: Vec::new(),
        }
    }
}

/// Summary of the latest crawl run. Only one is retained; each run overwrites it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRunStatus {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub items_fetched: usize,
    pub items_upserted: usize,
    pub errors: Vec<String>,
    pub sources: Vec<SourceReport>,
}

impl CrawlRunStatus {
    pub fn started(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: None,
            items_fetched: 0,
            items_upserted: 0,
            errors: Vec::new(),
            sources: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Folds a source report into the run totals.
    pub fn record_source(&mut self, report: SourceReport) {
        self.items_fetched += report.items_fetched;
        self.items_upserted += report.items_upserted;
        self.errors.extend(
            report
                .errors
                .iter()
                .map(|e| format!("[{}] {}", report.source, e)),
        );
        self.sources.push(report);
    }

    pub fn finish(&mut self, finished_at: DateTime<Utc>) {
        self.finished_at = Some(finished_at);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("limit must be a positive integer, got {0}")]
    Limit(i64),
    #[error("offset must not be negative, got {0}")]
    Offset(i64),
    #[error("{field} must be an integer, got {value:?}")]
    NotAnInteger { field: &'static str, value: String },
}

/// Validated paper listing request. Limits above [`MAX_PAGE_LIMIT`] are clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperQuery {
    pub keyword: Option<String>,
    pub source: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl PaperQuery {
    pub fn new(
        keyword: Option<String>,
        source: Option<String>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Self, ValidationError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit <= 0 {
            return Err(ValidationError::Limit(limit));
        }
        let offset = offset.unwrap_or(0);
        if offset < 0 {
            return Err(ValidationError::Offset(offset));
        }
        Ok(Self {
            keyword: non_blank(keyword),
            source: non_blank(source),
            limit: limit.min(MAX_PAGE_LIMIT),
            offset,
        })
    }
}

impl Default for PaperQuery {
    fn default() -> Self {
        Self {
            keyword: None,
            source: None,
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperPage {
    pub items: Vec<Article>,
    pub count: usize,
    pub offset: i64,
    pub limit: i64,
}
