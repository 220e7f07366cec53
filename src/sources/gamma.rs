use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{Config, MARKET_URL_BASE};
use crate::error::{AppError, Result};
use crate::sources::{http_client, ListingSource, SourceOutcome};
use crate::state::ProgressCounter;
use crate::types::Record;

#[derive(Debug, Default)]
pub struct FetchStats {
    pub pages: usize,
    pub events: usize,
    pub markets_seen: usize,
    pub rejected_low_volume: usize,
    pub rejected_low_liquidity: usize,
    pub rejected_malformed: usize,
    /// Emitted without a usable Yes/No price pair; the combiner drops these.
    pub placeholders: usize,
}

/// Walks Gamma `/events` with offset pagination until an empty or short page.
pub struct GammaListingFetcher {
    client: reqwest::Client,
    base_url: String,
    page_size: usize,
    min_volume: f64,
    min_liquidity: f64,
}

impl GammaListingFetcher {
    pub fn new(cfg: &Config) -> Result<Self> {
        Ok(Self {
            client: http_client(cfg)?,
            base_url: cfg.gamma_api_url.trim_end_matches('/').to_string(),
            page_size: cfg.listing_page_size,
            min_volume: cfg.min_volume,
            min_liquidity: cfg.min_liquidity,
        })
    }

    async fn walk(
        &self,
        records: &mut Vec<Record>,
        stats: &mut FetchStats,
        progress: &ProgressCounter,
    ) -> Result<()> {
        let mut offset = 0usize;

        loop {
            progress.set(records.len());

            let url = format!(
                "{}/events?limit={}&offset={}&active=true&closed=false",
                self.base_url, self.page_size, offset
            );

            let body = self
                .client
                .get(&url)
                .header(ACCEPT, "application/json")
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            let resp: Value = serde_json::from_str(&body)?;

            let events = resp.as_array().ok_or_else(|| {
                AppError::Upstream("GAMMA /events response was not an array".to_string())
            })?;

            if events.is_empty() {
                break;
            }

            stats.pages += 1;
            stats.events += events.len();

            for event in events {
                self.collect_event(event, records, stats);
            }
            progress.set(records.len());
            debug!(offset, markets = records.len(), "Gamma page walked");

            if events.len() < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        Ok(())
    }

    fn collect_event(&self, event: &Value, records: &mut Vec<Record>, stats: &mut FetchStats) {
        let ctx = EventContext {
            title: str_field(event, "title").unwrap_or_default(),
            slug: str_field(event, "slug").unwrap_or_default(),
            image: str_field(event, "image").filter(|s| !s.is_empty()),
        };

        let Some(markets) = event.get("markets").and_then(|m| m.as_array()) else {
            return;
        };

        for market in markets {
            stats.markets_seen += 1;
            match parse_gamma_market(market, &ctx, self.min_volume, self.min_liquidity) {
                Ok(record) => {
                    if record.yes_price.is_none() || record.no_price.is_none() {
                        stats.placeholders += 1;
                    }
                    records.push(record);
                }
                Err(Rejection::LowVolume) => stats.rejected_low_volume += 1,
                Err(Rejection::LowLiquidity) => stats.rejected_low_liquidity += 1,
                Err(Rejection::Malformed) => stats.rejected_malformed += 1,
            }
        }
    }
}

#[async_trait]
impl ListingSource for GammaListingFetcher {
    fn name(&self) -> &'static str {
        "gamma"
    }

    async fn fetch_records(&self, progress: &ProgressCounter) -> SourceOutcome<Vec<Record>> {
        info!("Fetching markets from Gamma API...");

        let mut records = Vec::new();
        let mut stats = FetchStats::default();
        let result = self.walk(&mut records, &mut stats, progress).await;
        progress.set(records.len());

        info!(
            pages = stats.pages,
            events = stats.events,
            records = records.len(),
            "[FILTER] seen={} low_volume={} low_liquidity={} malformed={} placeholders={}",
            stats.markets_seen,
            stats.rejected_low_volume,
            stats.rejected_low_liquidity,
            stats.rejected_malformed,
            stats.placeholders,
        );

        match result {
            Ok(()) => SourceOutcome::complete(records),
            Err(e) => {
                warn!("Gamma walk stopped early with {} records: {e}", records.len());
                SourceOutcome::partial(records, e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parent event fields copied onto every market record.
pub struct EventContext {
    pub title: String,
    pub slug: String,
    pub image: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Rejection {
    LowVolume,
    LowLiquidity,
    Malformed,
}

/// Turn one Gamma market object into a record.
///
/// Prices come from the JSON-encoded `outcomes`/`outcomePrices` string arrays
/// and are converted to cents. A market without a Yes/No pair is still
/// returned, with `None` prices, so the combiner can account for it.
pub fn parse_gamma_market(
    v: &Value,
    event: &EventContext,
    min_volume: f64,
    min_liquidity: f64,
) -> std::result::Result<Record, Rejection> {
    let id = v
        .get("id")
        .and_then(|id| {
            id.as_str()
                .map(str::to_string)
                .or_else(|| id.as_i64().map(|n| n.to_string()))
        })
        .filter(|id| !id.is_empty())
        .ok_or(Rejection::Malformed)?;
    let slug = str_field(v, "slug").filter(|s| !s.is_empty()).ok_or(Rejection::Malformed)?;

    let volume = num_field(v, "volumeNum").unwrap_or(0.0);
    if volume < min_volume {
        return Err(Rejection::LowVolume);
    }
    let liquidity = num_field(v, "liquidityNum").unwrap_or(0.0);
    if liquidity < min_liquidity {
        return Err(Rejection::LowLiquidity);
    }

    let (yes_price, no_price) = outcome_prices(v);

    Ok(Record {
        url: format!("{}/{}/{}", MARKET_URL_BASE, event.slug, slug),
        id,
        question: str_field(v, "question").unwrap_or_default(),
        slug,
        event_slug: event.slug.clone(),
        event_title: event.title.clone(),
        image: str_field(v, "image")
            .filter(|s| !s.is_empty())
            .or_else(|| event.image.clone()),
        yes_price,
        no_price,
        spread: num_field(v, "spread"),
        volume,
        volume_24hr: num_field(v, "volume24hr").unwrap_or(0.0).max(0.0),
        liquidity,
        end_date: str_field(v, "endDate"),
        has_rewards: false,
    })
}

/// Yes/No prices in cents, rounded to 2 decimals. `Up`/`Down` count as Yes/No.
fn outcome_prices(v: &Value) -> (Option<f64>, Option<f64>) {
    let outcomes: Vec<String> = v
        .get("outcomes")
        .and_then(|s| s.as_str())
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();
    let prices: Vec<Value> = v
        .get("outcomePrices")
        .and_then(|s| s.as_str())
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    if outcomes.len() < 2 || prices.len() < 2 {
        return (None, None);
    }

    let mut yes = None;
    let mut no = None;
    for (outcome, price) in outcomes.iter().zip(prices.iter()) {
        let Some(p) = value_as_f64(price) else { continue };
        let cents = round2(p * 100.0);
        if outcome.eq_ignore_ascii_case("Yes") || outcome.eq_ignore_ascii_case("Up") {
            yes = Some(cents);
        } else if outcome.eq_ignore_ascii_case("No") || outcome.eq_ignore_ascii_case("Down") {
            no = Some(cents);
        }
    }
    (yes, no)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(|s| s.as_str()).map(|s| s.to_string())
}

fn num_field(v: &Value, key: &str) -> Option<f64> {
    v.get(key).and_then(value_as_f64)
}

fn value_as_f64(x: &Value) -> Option<f64> {
    x.as_f64().or_else(|| x.as_str().and_then(|s| s.trim().parse().ok()))
}
