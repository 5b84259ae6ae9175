//! Default extractor: render the target with the live session, then pick
//! listing tiles out of the DOM.

use async_trait::async_trait;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::{Extraction, JobExtractor, PageNotice};
use crate::error::{ExtractionError, ExtractionResult};
use crate::session::BrowserSession;
use crate::types::Candidate;

/// Tried in order; the first selector with any match wins.
const TILE_SELECTORS: &[&str] = &[
    ".job-tile",
    ".job-card",
    "[data-testid*=\"job\"]",
    "[data-test=\"job-card\"]",
    ".job-item",
    ".job-result",
    ".job-posting",
    ".opening-job",
    ".search-result",
];
const TITLE_SELECTORS: &[&str] = &["h3", "h2", ".job-title", ".title", "[data-test=\"job-title\"]"];
const LOCATION_SELECTORS: &[&str] = &[".location", ".job-location", "[data-test=\"job-location\"]"];
const DATE_SELECTORS: &[&str] = &[".date", ".posted-date", ".job-date", "[data-test=\"job-date\"]"];
const DESCRIPTION_SELECTOR: &str = ".description, .job-description, .excerpt";
const FALLBACK_LINK_SELECTOR: &str = "a[href*=\"job\"]";

const NO_JOBS_MARKER: &str = "no jobs available";
const REGION_REDIRECT_MARKER: &str = "visiting the Canada website from the US";
const LOCATION_BANNER_MARKER: &str = "couldn't get your location";

const UNKNOWN_LOCATION: &str = "Not specified";
const MIN_LINK_TITLE_LEN: usize = 4;

#[derive(Debug, Default, Clone)]
pub struct ListingExtractor;

impl ListingExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobExtractor for ListingExtractor {
    async fn extract(
        &self,
        session: &dyn BrowserSession,
        target_url: &str,
    ) -> ExtractionResult<Extraction> {
        let page = session.render(target_url).await?;
        debug!(url = %page.url, bytes = page.html.len(), "page rendered");
        parse_listing(&page.html, target_url)
    }
}

fn selector(css: &str) -> ExtractionResult<Selector> {
    Selector::parse(css).map_err(|e| ExtractionError::Parse(format!("selector {css}: {e}")))
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first descendant matching any of `candidates`, in order.
fn first_text(element: ElementRef<'_>, candidates: &[&str]) -> ExtractionResult<Option<String>> {
    for css in candidates {
        let sel = selector(css)?;
        if let Some(found) = element.select(&sel).next() {
            let text = text_of(found);
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }
    }
    Ok(None)
}

fn resolve(base: Option<&Url>, href: &str, target_url: &str) -> String {
    match base.map(|b| b.join(href)) {
        Some(Ok(url)) => url.to_string(),
        _ if href.is_empty() => target_url.to_string(),
        _ => href.to_string(),
    }
}

fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

fn tile_candidate(
    tile: ElementRef<'_>,
    base: Option<&Url>,
    target_url: &str,
    anchor: &Selector,
    description: &Selector,
) -> ExtractionResult<Option<Candidate>> {
    let Some(title) = first_text(tile, TITLE_SELECTORS)? else {
        return Ok(None);
    };

    let href = tile
        .select(anchor)
        .next()
        .and_then(|a| a.value().attr("href"))
        .unwrap_or_default();
    let url = resolve(base, href, target_url);

    let location =
        first_text(tile, LOCATION_SELECTORS)?.unwrap_or_else(|| UNKNOWN_LOCATION.to_string());
    let posted = first_text(tile, DATE_SELECTORS)?.unwrap_or_else(today);
    let summary = tile.select(description).next().map(text_of).unwrap_or_default();

    Ok(Some(
        Candidate::new(title, location, url)
            .with_posted_label(posted)
            .with_description(summary),
    ))
}

/// Parse rendered HTML into listing candidates plus any page notices.
///
/// Relative links are resolved against `target_url`.
pub fn parse_listing(html: &str, target_url: &str) -> ExtractionResult<Extraction> {
    let document = Html::parse_document(html);
    let base = Url::parse(target_url).ok();
    let mut extraction = Extraction::default();

    let page_text = text_of(document.root_element());
    if page_text.contains(REGION_REDIRECT_MARKER) {
        extraction.notices.push(PageNotice::warning(
            "Region redirect banner detected; results may be for another country",
        ));
    }
    if page_text.contains(LOCATION_BANNER_MARKER) {
        extraction
            .notices
            .push(PageNotice::info("Page could not determine visitor location"));
    }
    if page_text.contains(NO_JOBS_MARKER) {
        extraction
            .notices
            .push(PageNotice::info("Page reports no jobs available"));
        return Ok(extraction);
    }

    let anchor = selector("a[href]")?;
    let description = selector(DESCRIPTION_SELECTOR)?;

    for css in TILE_SELECTORS {
        let tiles: Vec<_> = document.select(&selector(css)?).collect();
        if tiles.is_empty() {
            continue;
        }
        debug!(selector = css, tiles = tiles.len(), "matched listing tiles");
        for tile in tiles {
            if let Some(candidate) =
                tile_candidate(tile, base.as_ref(), target_url, &anchor, &description)?
            {
                extraction.candidates.push(candidate);
            }
        }
        return Ok(extraction);
    }

    // No tiles: fall back to anything that links to a job page
    let links = selector(FALLBACK_LINK_SELECTOR)?;
    for link in document.select(&links) {
        let title = text_of(link);
        if title.chars().count() < MIN_LINK_TITLE_LEN {
            continue;
        }
        let href = link.value().attr("href").unwrap_or_default();
        extraction.candidates.push(
            Candidate::new(title, UNKNOWN_LOCATION, resolve(base.as_ref(), href, target_url))
                .with_posted_label(today()),
        );
    }
    if !extraction.candidates.is_empty() {
        debug!(links = extraction.candidates.len(), "used link fallback");
    }

    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogLevel;

    const BASE: &str = "https://hiring.example.ca/app#/jobsearch";

    #[test]
    fn test_parses_tiles() {
        let html = r#"
            <html><body>
              <div class="job-tile">
                <h3>Warehouse   Associate</h3>
                <a href="/app#/jobDetail?jobId=JOB-1">Apply</a>
                <span class="location">Toronto, ON</span>
                <span class="posted-date">2 days ago</span>
                <p class="description">Pick and pack orders.</p>
              </div>
              <div class="job-tile">
                <h3>Delivery Driver</h3>
                <a href="https://other.example.com/jobs/2">Apply</a>
              </div>
              <div class="job-tile"><span>no title here</span></div>
            </body></html>
        "#;

        let extraction = parse_listing(html, BASE).unwrap();
        assert_eq!(extraction.candidates.len(), 2);
        assert!(extraction.notices.is_empty());

        let first = &extraction.candidates[0];
        assert_eq!(first.title, "Warehouse Associate");
        assert_eq!(first.location, "Toronto, ON");
        assert_eq!(first.posted_label, "2 days ago");
        assert_eq!(first.description, "Pick and pack orders.");
        assert_eq!(first.url, "https://hiring.example.ca/app#/jobDetail?jobId=JOB-1");

        let second = &extraction.candidates[1];
        assert_eq!(second.location, "Not specified");
        assert_eq!(second.url, "https://other.example.com/jobs/2");
        assert_eq!(second.posted_label, today());
    }

    #[test]
    fn test_first_matching_tile_selector_wins() {
        let html = r#"
            <div class="job-card"><h2>Card Title</h2></div>
            <div class="job-item"><h2>Item Title</h2></div>
        "#;
        let extraction = parse_listing(html, BASE).unwrap();
        let titles: Vec<_> = extraction.candidates.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Card Title"]);
    }

    #[test]
    fn test_falls_back_to_job_links() {
        let html = r#"
            <a href="/jobs/123">Fulfillment Center Associate</a>
            <a href="/jobs/124">Go</a>
            <a href="/about">About us</a>
        "#;
        let extraction = parse_listing(html, BASE).unwrap();
        assert_eq!(extraction.candidates.len(), 1);
        assert_eq!(extraction.candidates[0].title, "Fulfillment Center Associate");
        assert_eq!(extraction.candidates[0].url, "https://hiring.example.ca/jobs/123");
    }

    #[test]
    fn test_no_jobs_page_is_empty_not_error() {
        let html = "<p>Sorry, there are no jobs available that match your search.</p>";
        let extraction = parse_listing(html, BASE).unwrap();
        assert!(extraction.is_empty());
        assert_eq!(extraction.notices.len(), 1);
        assert_eq!(extraction.notices[0].level, LogLevel::Info);
    }

    #[test]
    fn test_region_banner_is_a_warning() {
        let html = r#"
            <div>Seems like you're visiting the Canada website from the US</div>
            <div class="job-card"><h3>Sorter</h3></div>
        "#;
        let extraction = parse_listing(html, BASE).unwrap();
        assert_eq!(extraction.candidates.len(), 1);
        assert_eq!(extraction.notices[0].level, LogLevel::Warning);
    }

    #[test]
    fn test_identifiers_stable_across_parses() {
        let html = r#"<div class="job-tile"><h3>Picker</h3><a href="/j/1">x</a></div>"#;
        let a = parse_listing(html, BASE).unwrap();
        let b = parse_listing(html, BASE).unwrap();
        assert_eq!(a.candidates[0].identifier(), b.candidates[0].identifier());
    }
}
