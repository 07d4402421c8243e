//! Feed format detection + article extractors for RSS/Atom feeds and HTML listing pages.

use chrono::{DateTime, NaiveDate, Utc};
use feed_rs::model::Entry;
use litr_core::ArticleDraft;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const CRATE_NAME: &str = "litr-adapters";

static DOI_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"10\.\d{4,9}/[^\s"<>]+"#).expect("DOI pattern compiles"));

static PUBLISHED_ONLINE_LEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:[^;]{0,160}?published online:[^;]*;\s*)?doi:\s*\S+\s*|^[^;]{0,160}?published online:[^;]*;?\s*")
        .expect("lead pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    Rss,
    Html,
}

impl FeedFormat {
    /// Picks the parser from the document's root element, falling back to the content type.
    pub fn detect(content_type: Option<&str>, body: &[u8]) -> Self {
        let head = String::from_utf8_lossy(&body[..body.len().min(2048)]).to_ascii_lowercase();
        match root_tag(&head) {
            Some(tag) if tag == "html" => return FeedFormat::Html,
            Some(tag) if matches!(tag, "rss" | "feed" | "rdf:rdf") => return FeedFormat::Rss,
            _ => {}
        }
        match content_type {
            Some(ct) if ct.to_ascii_lowercase().contains("xml") => FeedFormat::Rss,
            _ => FeedFormat::Html,
        }
    }
}

/// Name of the first element, skipping the BOM, XML declarations, comments and doctypes.
/// An HTML doctype counts as `html`.
fn root_tag(head: &str) -> Option<&str> {
    let mut rest = head.trim_start_matches('\u{feff}');
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("<?") {
            rest = &after[after.find("?>")? + 2..];
        } else if let Some(after) = rest.strip_prefix("<!--") {
            rest = &after[after.find("-->")? + 3..];
        } else if let Some(after) = rest.strip_prefix("<!doctype") {
            let end = after.find('>')?;
            if after[..end].trim().starts_with("html") {
                return Some("html");
            }
            rest = &after[end + 1..];
        } else {
            let after = rest.strip_prefix('<')?;
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '_')))
                .unwrap_or(after.len());
            return (end > 0).then(|| &after[..end]);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractContext {
    pub source: String,
    /// Final URL of the fetched document; relative links resolve against it.
    pub base_url: String,
}

/// A single feed entry that could not be turned into an article.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("entry #{index}: {reason}")]
pub struct EntryError {
    pub index: usize,
    pub reason: String,
}

impl EntryError {
    fn new(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unreadable feed document: {0}")]
    Document(String),
    #[error("invalid selector {selector:?}: {message}")]
    Selector { selector: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub articles: Vec<ArticleDraft>,
    pub skipped: Vec<EntryError>,
}

impl Extraction {
    fn is_full(&self, limit: usize) -> bool {
        self.articles.len() >= limit
    }
}

/// Shared contract of every feed parser. Stops once `limit` articles are produced.
pub trait ArticleExtractor: Send + Sync {
    fn format(&self) -> FeedFormat;

    fn extract(
        &self,
        body: &[u8],
        ctx: &ExtractContext,
        limit: usize,
    ) -> Result<Extraction, ExtractError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RssExtractor;

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlListingExtractor;

pub fn extractor_for(format: FeedFormat) -> Box<dyn ArticleExtractor> {
    match format {
        FeedFormat::Rss => Box::new(RssExtractor),
        FeedFormat::Html => Box::new(HtmlListingExtractor),
    }
}

impl ArticleExtractor for RssExtractor {
    fn format(&self) -> FeedFormat {
        FeedFormat::Rss
    }

    fn extract(
        &self,
        body: &[u8],
        ctx: &ExtractContext,
        limit: usize,
    ) -> Result<Extraction, ExtractError> {
        let feed =
            feed_rs::parser::parse(body).map_err(|e| ExtractError::Document(e.to_string()))?;
        let journal = feed
            .title
            .as_ref()
            .and_then(|t| text_or_none(html_to_text(&t.content)));

        let mut out = Extraction::default();
        for (index, entry) in feed.entries.into_iter().enumerate() {
            if out.is_full(limit) {
                break;
            }
            match rss_entry_to_draft(entry, ctx, journal.as_deref()) {
                Ok(draft) => out.articles.push(draft),
                Err(reason) => out.skipped.push(EntryError::new(index, reason)),
            }
        }
        Ok(out)
    }
}

fn rss_entry_to_draft(
    entry: Entry,
    ctx: &ExtractContext,
    journal: Option<&str>,
) -> Result<ArticleDraft, String> {
    let title = entry
        .title
        .as_ref()
        .and_then(|t| text_or_none(html_to_text(&t.content)))
        .ok_or("missing title")?;
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or_else(|| entry.links.first())
        .ok_or("missing link")?;
    let url = resolve_url(&ctx.base_url, &link.href)
        .ok_or_else(|| format!("unresolvable link {:?}", link.href))?;

    let mut draft = ArticleDraft::new(url, title, ctx.source.clone());
    draft.authors = dedup_names(entry.authors.iter().map(|p| p.name.clone()));
    draft.published_date = entry.published.or(entry.updated);
    draft.abstract_text = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
        .and_then(|html| feed_summary_text(&html));
    draft.doi = doi_from_link(&entry.id).or_else(|| doi_from_link(&draft.url));
    draft.journal = journal.map(ToString::to_string);
    Ok(draft)
}

impl ArticleExtractor for HtmlListingExtractor {
    fn format(&self) -> FeedFormat {
        FeedFormat::Html
    }

    fn extract(
        &self,
        body: &[u8],
        ctx: &ExtractContext,
        limit: usize,
    ) -> Result<Extraction, ExtractError> {
        let text = String::from_utf8_lossy(body);
        let document = Html::parse_document(&text);

        let card_sel = selector("article")?;
        let link_sel = selector("h1 a[href], h2 a[href], h3 a[href], h4 a[href]")?;
        let time_sel = selector("time[datetime]")?;
        let author_sel = selector("ul.c-author-list li, [itemprop=author]")?;
        let summary_sel = selector(".c-card__summary, [itemprop=description]")?;
        let card_journal_sel = selector("[data-test=journal-title], .c-card__journal")?;
        let page_journal = select_first_attr(&document, "meta[property='og:site_name']", "content")?;

        let mut out = Extraction::default();
        for (index, card) in document.select(&card_sel).enumerate() {
            if out.is_full(limit) {
                break;
            }
            let Some(link) = card.select(&link_sel).next() else {
                out.skipped.push(EntryError::new(index, "missing title link"));
                continue;
            };
            let Some(title) = element_text(&link) else {
                out.skipped.push(EntryError::new(index, "empty title"));
                continue;
            };
            let href = link.value().attr("href").unwrap_or_default();
            let Some(url) = resolve_url(&ctx.base_url, href) else {
                out.skipped
                    .push(EntryError::new(index, format!("unresolvable link {href:?}")));
                continue;
            };

            let mut draft = ArticleDraft::new(url, title, ctx.source.clone());
            draft.published_date = card
                .select(&time_sel)
                .next()
                .and_then(|t| t.value().attr("datetime"))
                .and_then(parse_date);
            draft.authors = dedup_names(card.select(&author_sel).filter_map(|a| element_text(&a)));
            draft.abstract_text = card.select(&summary_sel).next().and_then(|s| element_text(&s));
            draft.journal = card
                .select(&card_journal_sel)
                .next()
                .and_then(|j| element_text(&j))
                .or_else(|| page_journal.clone());
            draft.doi = doi_from_link(&draft.url);
            out.articles.push(draft);
        }
        Ok(out)
    }
}

/// Abstract and DOI read from an individual article page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleDetail {
    pub abstract_text: Option<String>,
    pub doi: Option<String>,
}

pub fn extract_detail(body: &[u8]) -> Result<ArticleDetail, ExtractError> {
    let text = String::from_utf8_lossy(body);
    let document = Html::parse_document(&text);

    let mut abstract_text = None;
    for css in ["div#Abs1-content", "section#Abs1", "section#Abs2"] {
        abstract_text = select_first_text(&document, css)?;
        if abstract_text.is_some() {
            break;
        }
    }
    let abstract_text = match abstract_text {
        Some(text) => Some(text),
        None => select_first_attr(&document, "meta[name='dc.description']", "content")?,
    };

    let doi = select_first_attr(&document, "meta[name='citation_doi']", "content")?
        .as_deref()
        .and_then(normalize_doi)
        .or(select_first_attr(&document, "meta[name='dc.identifier']", "content")?
            .as_deref()
            .and_then(normalize_doi))
        .or(select_first_text(&document, "a[href^='https://doi.org/']")?
            .as_deref()
            .and_then(normalize_doi));

    Ok(ArticleDetail { abstract_text, doi })
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

fn select_first_text(document: &Html, css: &str) -> Result<Option<String>, ExtractError> {
    let sel = selector(css)?;
    Ok(document.select(&sel).find_map(|n| element_text(&n)))
}

fn select_first_attr(document: &Html, css: &str, attr: &str) -> Result<Option<String>, ExtractError> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .filter_map(|n| n.value().attr(attr))
        .find_map(|s| text_or_none(s.to_string())))
}

fn element_text(element: &ElementRef<'_>) -> Option<String> {
    let mut out = String::new();
    collect_text(*element, &mut out);
    text_or_none(out)
}

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption", "figure",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "ol", "p", "pre",
    "section", "table", "td", "th", "tr", "ul",
];

// Inline markup (`<sub>`, `<i>`) joins its text directly; block elements are space separated.
fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            let block = BLOCK_TAGS.contains(&child.value().name());
            if block {
                out.push(' ');
            }
            collect_text(child, out);
            if block {
                out.push(' ');
            }
        }
    }
}

fn text_or_none(value: String) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn html_to_text(fragment: &str) -> String {
    let mut out = String::new();
    collect_text(Html::parse_fragment(fragment).root_element(), &mut out);
    out
}

/// Feed teaser text without the "Journal, Published online: ...; doi:..." lead line.
fn feed_summary_text(html: &str) -> Option<String> {
    let text = text_or_none(html_to_text(html))?;
    text_or_none(PUBLISHED_ONLINE_LEAD.replace(&text, "").into_owned())
}

fn dedup_names(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names.filter_map(text_or_none) {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Absolute http(s) URL for `href`, resolved against `base`, without fragment.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let mut url = match Url::parse(href) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(base).ok()?.join(href).ok()?,
        Err(_) => return None,
    };
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Bare DOI (`10.xxxx/...`) found anywhere in `text`.
pub fn normalize_doi(text: &str) -> Option<String> {
    DOI_PATTERN
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ')']).to_string())
}

fn doi_from_link(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    if lower.contains("doi.org/") || lower.starts_with("doi:") {
        normalize_doi(text)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx(base_url: &str) -> ExtractContext {
        ExtractContext {
            source: "example.org".into(),
            base_url: base_url.into(),
        }
    }

    const RSS_ONE_GOOD_ONE_BROKEN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Letters</title>
    <link>https://example.org/</link>
    <description>Latest research</description>
    <item>
      <title>Molecular passivation of perovskite films</title>
      <link>https://example.org/articles/ab12#comments</link>
      <guid>https://doi.org/10.5555/ab12</guid>
      <pubDate>Mon, 02 Mar 2026 10:00:00 GMT</pubDate>
      <description>&lt;p&gt;We report a &lt;b&gt;stable&lt;/b&gt; device.&lt;/p&gt;</description>
    </item>
    <item>
      <description>An entry with neither title nor link</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn detects_feed_and_page_formats() {
        assert_eq!(FeedFormat::detect(None, RSS_ONE_GOOD_ONE_BROKEN.as_bytes()), FeedFormat::Rss);
        assert_eq!(
            FeedFormat::detect(None, br#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#),
            FeedFormat::Rss
        );
        assert_eq!(
            FeedFormat::detect(None, b"\xef\xbb\xbf<?xml version=\"1.0\"?><rdf:RDF></rdf:RDF>"),
            FeedFormat::Rss
        );
        assert_eq!(
            FeedFormat::detect(Some("application/rss+xml"), b"<!DOCTYPE html><html><body></body></html>"),
            FeedFormat::Html
        );
        assert_eq!(FeedFormat::detect(Some("application/xml"), b"<channel/>"), FeedFormat::Rss);
        assert_eq!(FeedFormat::detect(Some("text/html"), b"<div></div>"), FeedFormat::Html);
        assert_eq!(extractor_for(FeedFormat::Html).format(), FeedFormat::Html);
    }

    #[test]
    fn rss_skips_malformed_entry_and_keeps_the_good_one() {
        let out = RssExtractor
            .extract(RSS_ONE_GOOD_ONE_BROKEN.as_bytes(), &ctx("https://example.org/feed.rss"), 50)
            .unwrap();

        assert_eq!(out.articles.len(), 1);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].index, 1);

        let article = &out.articles[0];
        assert_eq!(article.title, "Molecular passivation of perovskite films");
        assert_eq!(article.url, "https://example.org/articles/ab12");
        assert_eq!(article.doi.as_deref(), Some("10.5555/ab12"));
        assert_eq!(article.abstract_text.as_deref(), Some("We report a stable device."));
        assert_eq!(article.journal.as_deref(), Some("Example Letters"));
        assert_eq!(article.source, "example.org");
        assert_eq!(
            article.published_date,
            Some(Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn rss_stops_at_limit_without_inspecting_later_entries() {
        let items = (1..=3)
            .map(|i| format!("<item><title>Paper {i}</title><link>https://example.org/p/{i}</link></item>"))
            .collect::<String>();
        let feed = format!(
            r#"<rss version="2.0"><channel><title>T</title><link>https://example.org/</link><description>d</description>{items}<item><description>broken</description></item></channel></rss>"#
        );
        let out = RssExtractor
            .extract(feed.as_bytes(), &ctx("https://example.org/feed"), 2)
            .unwrap();
        let titles = out.articles.iter().map(|a| a.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["Paper 1", "Paper 2"]);
        assert!(out.skipped.is_empty());
    }

    #[test]
    fn atom_entries_use_updated_when_published_is_missing() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Cell Reports Physical Science</title>
  <id>urn:feed</id>
  <updated>2026-02-01T00:00:00Z</updated>
  <entry>
    <title>Charge transport in organic semiconductors</title>
    <link href="/articles/s2666-1"/>
    <id>urn:entry:1</id>
    <updated>2026-02-01T09:30:00Z</updated>
    <author><name>Jane Doe</name></author>
    <author><name>John Roe</name></author>
    <summary>Short summary.</summary>
  </entry>
</feed>"#;
        let out = RssExtractor
            .extract(atom.as_bytes(), &ctx("https://www.cell.com/feed.atom"), 10)
            .unwrap();
        assert_eq!(out.articles.len(), 1);
        let article = &out.articles[0];
        assert_eq!(article.url, "https://www.cell.com/articles/s2666-1");
        assert_eq!(article.authors, vec!["Jane Doe".to_string(), "John Roe".to_string()]);
        assert_eq!(
            article.published_date,
            Some(Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 0).unwrap())
        );
        assert_eq!(article.abstract_text.as_deref(), Some("Short summary."));
    }

    #[test]
    fn unreadable_feed_document_is_an_error() {
        let err = RssExtractor
            .extract(b"not a feed at all", &ctx("https://example.org/feed"), 10)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Document(_)));
    }

    #[test]
    fn html_listing_cards_become_articles() {
        let page = r#"<!DOCTYPE html>
<html><head><meta property="og:site_name" content="Nature"></head>
<body>
  <article class="c-card">
    <h3 class="c-card__title"><a href="/articles/s41586-026-00001-x">A <i>molecular</i> route to tandem cells</a></h3>
    <ul class="c-author-list"><li>Ada Lovelace</li><li>Alan Turing</li><li>Ada Lovelace</li></ul>
    <div class="c-card__summary"><p>Tandem cells reach 33%.</p></div>
    <time datetime="2026-03-04">04 Mar 2026</time>
  </article>
  <article class="c-card">
    <div class="c-card__summary">Card without a heading link</div>
  </article>
</body></html>"#;
        let out = HtmlListingExtractor
            .extract(page.as_bytes(), &ctx("https://www.nature.com/nature/research-articles"), 10)
            .unwrap();

        assert_eq!(out.articles.len(), 1);
        assert_eq!(out.skipped, vec![EntryError::new(1, "missing title link")]);
        let article = &out.articles[0];
        assert_eq!(article.title, "A molecular route to tandem cells");
        assert_eq!(article.url, "https://www.nature.com/articles/s41586-026-00001-x");
        assert_eq!(article.authors, vec!["Ada Lovelace".to_string(), "Alan Turing".to_string()]);
        assert_eq!(article.abstract_text.as_deref(), Some("Tandem cells reach 33%."));
        assert_eq!(article.journal.as_deref(), Some("Nature"));
        assert_eq!(
            article.published_date,
            Some(Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn detail_page_yields_abstract_and_doi() {
        let page = r#"<html><head>
<meta name="dc.identifier" content="doi:10.1038/s41586-026-00001-x">
</head><body>
<section id="Abs1"><h2>Abstract</h2><div id="Abs1-content"><p>Perovskite  cells
degrade under light.</p></div></section>
</body></html>"#;
        let detail = extract_detail(page.as_bytes()).unwrap();
        assert_eq!(detail.abstract_text.as_deref(), Some("Perovskite cells degrade under light."));
        assert_eq!(detail.doi.as_deref(), Some("10.1038/s41586-026-00001-x"));

        let bare = extract_detail(b"<html><body><p>nothing here</p></body></html>").unwrap();
        assert_eq!(bare, ArticleDetail::default());
    }

    #[test]
    fn url_resolution_and_doi_normalisation() {
        assert_eq!(
            resolve_url("https://www.nature.com/nature/research-articles", "/articles/x#ref1").as_deref(),
            Some("https://www.nature.com/articles/x")
        );
        assert_eq!(resolve_url("https://a.org/", "mailto:someone@a.org"), None);
        assert_eq!(resolve_url("https://a.org/", "   "), None);
        assert_eq!(normalize_doi("https://doi.org/10.1038/nature12373."), Some("10.1038/nature12373".into()));
        assert_eq!(doi_from_link("https://example.org/10.1234/not-a-doi-link"), None);
    }

    #[test]
    fn inline_markup_in_titles_does_not_split_words() {
        let page = r#"<html><body>
  <article>
    <h3><a href="/articles/co2">Electrochemical CO<sub>2</sub> reduction on Cu</a></h3>
    <div class="c-card__summary"><p>Li<sup>+</sup> transport.</p><p>Second paragraph.</p></div>
  </article>
</body></html>"#;
        let out = HtmlListingExtractor
            .extract(page.as_bytes(), &ctx("https://www.nature.com/nature/research-articles"), 10)
            .unwrap();
        let article = &out.articles[0];
        assert_eq!(article.title, "Electrochemical CO2 reduction on Cu");
        assert_eq!(
            article.abstract_text.as_deref(),
            Some("Li+ transport. Second paragraph.")
        );
    }

    #[test]
    fn rss_teaser_drops_published_online_lead() {
        let feed = r#"<rss version="2.0"><channel><title>Nature Energy</title><link>https://www.nature.com/nenergy</link><description>d</description>
<item><title>Modules</title><link>https://www.nature.com/articles/m1</link>
<description><![CDATA[<p>Nature Energy, Published online: 10 March 2026; <a href="https://www.nature.com/articles/m1">doi:10.1038/m1</a></p>Blade coating works.]]></description></item>
<item><title>Lead only</title><link>https://www.nature.com/articles/m2</link>
<description><![CDATA[<p>Nature Energy, Published online: 09 March 2026; doi:10.1038/m2</p>]]></description></item>
</channel></rss>"#;
        let out = RssExtractor
            .extract(feed.as_bytes(), &ctx("https://www.nature.com/nenergy.rss"), 10)
            .unwrap();
        assert_eq!(out.articles[0].abstract_text.as_deref(), Some("Blade coating works."));
        assert_eq!(out.articles[1].abstract_text, None);
    }

    #[test]
    fn html_inside_an_early_feed_description_does_not_flip_detection() {
        let feed = r#"<?xml version="1.0"?>
<!-- generated -->
<rss version="2.0"><channel><title>T</title>
<item><title>A</title><link>https://example.org/a</link>
<description><![CDATA[<html><body>teaser</body></html>]]></description></item>
</channel></rss>"#;
        assert_eq!(FeedFormat::detect(Some("text/html"), feed.as_bytes()), FeedFormat::Rss);
        assert_eq!(
            FeedFormat::detect(None, b"<!-- cached --><html lang=\"en\"><body><rss></rss></body></html>"),
            FeedFormat::Html
        );
    }
}
