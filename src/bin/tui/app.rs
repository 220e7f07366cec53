use chrono::{DateTime, Utc};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// API response types (mirror routes.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MarketRecord {
    pub question: String,
    pub slug: String,
    pub event_title: String,
    pub yes_price: Option<f64>,
    pub no_price: Option<f64>,
    pub spread: Option<f64>,
    pub volume_24hr: f64,
    pub liquidity: f64,
    pub end_date: Option<String>,
    pub has_rewards: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Progress {
    pub markets: usize,
    pub rewards: usize,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MarketsResponse {
    pub records: Vec<MarketRecord>,
    pub total_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub in_flight: bool,
    pub loading: bool,
    pub progress: Progress,
    pub rewards_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub status: String,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub data: MarketsResponse,
    /// Client-side filter; the server always returns every record.
    pub rewards_only: bool,
    /// Outcome of the last manual refresh trigger ("started" / "busy").
    pub last_trigger: Option<String>,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            data: MarketsResponse::default(),
            rewards_only: false,
            last_trigger: None,
            base_url,
        }
    }

    pub fn visible(&self) -> Vec<&MarketRecord> {
        filter_records(&self.data.records, self.rewards_only)
    }

    pub fn toggle_rewards_only(&mut self) {
        self.rewards_only = !self.rewards_only;
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let url = format!("{}/api/markets", self.base_url);
        let resp = match client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };
        match resp.json::<MarketsResponse>().await {
            Ok(data) => {
                self.data = data;
                self.status = ConnectionStatus::Connected;
            }
            Err(e) => self.status = ConnectionStatus::Error(format!("parse error: {e}")),
        }
    }

    pub async fn trigger_refresh(&mut self, client: &reqwest::Client) {
        let url = format!("{}/api/refresh", self.base_url);
        let outcome = match client.get(&url).send().await {
            Ok(r) => r.json::<RefreshResponse>().await.map(|r| r.status),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(status) => self.last_trigger = Some(status),
            Err(e) => self.status = ConnectionStatus::Error(format!("{e}")),
        }
    }
}

pub fn filter_records(records: &[MarketRecord], rewards_only: bool) -> Vec<&MarketRecord> {
    records
        .iter()
        .filter(|r| !rewards_only || r.has_rewards)
        .collect()
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_cents(v: Option<f64>) -> String {
    match v {
        Some(c) => format!("{c:.1}¢"),
        None => "—".to_string(),
    }
}

/// Compact USD amount: 1234 → $1.2K, 2500000 → $2.5M.
pub fn format_usd(v: f64) -> String {
    if v >= 1_000_000.0 {
        format!("${:.1}M", v / 1_000_000.0)
    } else if v >= 1_000.0 {
        format!("${:.1}K", v / 1_000.0)
    } else {
        format!("${v:.0}")
    }
}

/// "12s ago", "4m ago", "2h ago"; "never" before the first snapshot.
pub fn format_age(updated: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = updated else {
        return "never".to_string();
    };
    let secs = (now - at).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{s}s ago"),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s => format!("{}h ago", s / 3_600),
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn rec(slug: &str, has_rewards: bool) -> MarketRecord {
        MarketRecord {
            question: format!("Will {slug} happen?"),
            slug: slug.to_string(),
            event_title: "Event".to_string(),
            yes_price: Some(40.0),
            no_price: Some(60.0),
            spread: Some(1.0),
            volume_24hr: 10.0,
            liquidity: 10.0,
            end_date: None,
            has_rewards,
        }
    }

    #[test]
    fn rewards_only_filter_keeps_order() {
        let records = vec![rec("a", true), rec("b", false), rec("c", true)];
        let all = filter_records(&records, false);
        let starred = filter_records(&records, true);
        assert_eq!(all.len(), 3);
        let slugs: Vec<_> = starred.iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(slugs, ["a", "c"]);
    }

    #[test]
    fn parses_markets_payload() {
        let body = r#"{
            "records": [{"id": "1", "question": "Q?", "slug": "q", "event_slug": "e",
                         "event_title": "E", "image": null, "yes_price": 35.0, "no_price": 65.0,
                         "spread": 0.5, "volume": 100.0, "volume_24hr": 5.0, "liquidity": 50.0,
                         "end_date": null, "url": "https://polymarket.com/event/e",
                         "has_rewards": true}],
            "total_count": 1,
            "last_updated": "2025-06-01T12:00:00Z",
            "in_flight": false,
            "loading": false,
            "progress": {"markets": 1, "rewards": 4, "status": "ready"},
            "rewards_count": 4
        }"#;
        let parsed: MarketsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert!(parsed.records[0].has_rewards);
        assert_eq!(parsed.progress.status, "ready");
        assert_eq!(
            parsed.last_updated,
            Some(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn age_buckets() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(format_age(None, now), "never");
        assert_eq!(format_age(Some(now - chrono::Duration::seconds(12)), now), "12s ago");
        assert_eq!(format_age(Some(now - chrono::Duration::minutes(4)), now), "4m ago");
        assert_eq!(format_age(Some(now - chrono::Duration::hours(2)), now), "2h ago");
    }

    #[test]
    fn usd_and_cents() {
        assert_eq!(format_usd(950.0), "$950");
        assert_eq!(format_usd(1_234.0), "$1.2K");
        assert_eq!(format_usd(2_500_000.0), "$2.5M");
        assert_eq!(format_cents(Some(35.4)), "35.4¢");
        assert_eq!(format_cents(None), "—");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefgh", 5), "abcd…");
        assert_eq!(truncate("élection présidentielle", 4), "éle…");
    }
}
