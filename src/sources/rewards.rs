//! Rewards-program membership from the public `/rewards` listing.
//!
//! The listing is numbered (`?page=N`) and has no explicit end marker: past
//! the last page the site serves page 1 again. The walk therefore stops on a
//! repeat of page 1, on a short page, or at the page limit.

use std::collections::HashSet;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::sources::{http_client, KeySet, KeySource, SourceOutcome};
use crate::state::ProgressCounter;

const EVENT_LINK_SELECTOR: &str = r#"a[href*="/event/"]"#;

/// Why a walk ended. Logged, and handy in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkEnd {
    /// Page N repeated page 1's slugs.
    LoopedBack(u32),
    /// Page N had fewer slugs than a full page.
    ShortPage(u32),
    PageLimit,
}

pub struct RewardsScraper {
    client: reqwest::Client,
    base_url: String,
    max_pages: u32,
    full_page: usize,
}

impl RewardsScraper {
    pub fn new(cfg: &Config) -> Result<Self> {
        Ok(Self {
            client: http_client(cfg)?,
            base_url: cfg.rewards_base_url.trim_end_matches('/').to_string(),
            max_pages: cfg.rewards_max_pages,
            full_page: cfg.rewards_full_page,
        })
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<String>> {
        let url = format!("{}/rewards?page={}", self.base_url, page);
        let html = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        extract_event_slugs(&html)
    }

    async fn walk(&self, keys: &mut KeySet, progress: &ProgressCounter) -> Result<WalkEnd> {
        let mut first_page: Option<HashSet<String>> = None;

        for page in 1..=self.max_pages {
            progress.set(keys.len());

            let slugs = self.fetch_page(page).await?;
            if page == 1 && slugs.is_empty() {
                warn!(
                    "Rewards page 1 has no /event/ links; the listing may be rendered \
                     client-side and need a browser-backed source"
                );
            }
            let page_set: HashSet<String> = slugs.iter().cloned().collect();

            match &first_page {
                None => first_page = Some(page_set),
                Some(first) if !first.is_empty() && *first == page_set => {
                    return Ok(WalkEnd::LoopedBack(page));
                }
                Some(_) => {}
            }

            let found = slugs.len();
            keys.extend(slugs);
            progress.set(keys.len());

            if found < self.full_page {
                return Ok(WalkEnd::ShortPage(page));
            }
            debug!(page, found, total = keys.len(), "Rewards page walked");
        }

        Ok(WalkEnd::PageLimit)
    }
}

#[async_trait]
impl KeySource for RewardsScraper {
    fn name(&self) -> &'static str {
        "rewards"
    }

    async fn fetch_keys(&self, progress: &ProgressCounter) -> SourceOutcome<KeySet> {
        info!("Fetching rewards slugs...");

        let mut keys = KeySet::new();
        let result = self.walk(&mut keys, progress).await;
        progress.set(keys.len());

        match result {
            Ok(end) => {
                if end == WalkEnd::PageLimit {
                    warn!("Rewards walk hit the {}-page limit", self.max_pages);
                }
                info!(slugs = keys.len(), end = ?end, "Rewards fetch complete");
                SourceOutcome::complete(keys)
            }
            Err(e) => {
                warn!("Rewards walk stopped early with {} slugs: {e}", keys.len());
                SourceOutcome::partial(keys, e)
            }
        }
    }
}

/// Market slugs linked from a rewards page, de-duplicated in page order.
///
/// A link to `/event/{event}/{market}` yields `{market}`; a single-market
/// event link `/event/{slug}` yields `{slug}`.
pub fn extract_event_slugs(html: &str) -> Result<Vec<String>> {
    let selector =
        Selector::parse(EVENT_LINK_SELECTOR).map_err(|e| AppError::Scrape(e.to_string()))?;
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut slugs = Vec::new();
    for link in document.select(&selector) {
        let Some(slug) = link.value().attr("href").and_then(market_slug_from_href) else {
            continue;
        };
        if seen.insert(slug.to_string()) {
            slugs.push(slug.to_string());
        }
    }
    Ok(slugs)
}

fn market_slug_from_href(href: &str) -> Option<&str> {
    let (_, tail) = href.split_once("/event/")?;
    let tail = tail.split(['?', '#']).next().unwrap_or("");
    tail.split('/').filter(|s| !s.is_empty()).last()
}
