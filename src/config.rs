use std::time::Duration;

use crate::error::{AppError, Result};

pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";
pub const REWARDS_BASE_URL: &str = "https://polymarket.com";

/// Public market page prefix used to build each record's link.
pub const MARKET_URL_BASE: &str = "https://polymarket.com/event";

/// Delay (seconds) between a completed cycle and the next automatic one.
pub const REFRESH_INTERVAL_SECS: u64 = 300;

/// Per-request timeout for upstream HTTP calls (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Upper bound on one adapter's total wall-clock time per cycle (seconds).
/// Overrun is treated as a failed adapter, never as a failed cycle.
pub const ADAPTER_TIMEOUT_SECS: u64 = 600;

/// Gamma `/events` page size. A shorter page ends the walk.
pub const LISTING_PAGE_SIZE: usize = 100;

/// Rewards listing safety limit on pages walked per cycle.
pub const REWARDS_MAX_PAGES: u32 = 50;

/// A rewards page with fewer slugs than this is the last page.
pub const REWARDS_FULL_PAGE: usize = 80;

/// Sent on every upstream request; the rewards listing rejects bare clients.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

#[derive(Debug, Clone)]
pub struct Config {
    pub gamma_api_url: String,
    pub rewards_base_url: String,
    /// When false the rewards scraper is replaced by an always-empty source (REWARDS_ENABLED).
    pub rewards_enabled: bool,
    pub log_level: String,
    pub api_port: u16,
    pub refresh_interval: Duration,
    pub http_timeout: Duration,
    pub adapter_timeout: Duration,
    pub listing_page_size: usize,
    /// Markets below this total volume in USD are skipped (MIN_VOLUME)
    pub min_volume: f64,
    /// Markets below this liquidity in USD are skipped (MIN_LIQUIDITY)
    pub min_liquidity: f64,
    pub rewards_max_pages: u32,
    pub rewards_full_page: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            gamma_api_url: std::env::var("GAMMA_API_URL")
                .unwrap_or_else(|_| GAMMA_API_URL.to_string()),
            rewards_base_url: std::env::var("REWARDS_BASE_URL")
                .unwrap_or_else(|_| REWARDS_BASE_URL.to_string()),
            rewards_enabled: std::env::var("REWARDS_ENABLED")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            refresh_interval: Duration::from_secs(
                std::env::var("REFRESH_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .filter(|&s| s > 0)
                    .unwrap_or(REFRESH_INTERVAL_SECS),
            ),
            http_timeout: Duration::from_secs(
                std::env::var("HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(HTTP_TIMEOUT_SECS),
            ),
            adapter_timeout: Duration::from_secs(
                std::env::var("ADAPTER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(ADAPTER_TIMEOUT_SECS),
            ),
            listing_page_size: std::env::var("LISTING_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(LISTING_PAGE_SIZE),
            min_volume: std::env::var("MIN_VOLUME")
                .unwrap_or_else(|_| "10".to_string())
                .parse::<f64>()
                .unwrap_or(10.0),
            min_liquidity: std::env::var("MIN_LIQUIDITY")
                .unwrap_or_else(|_| "10".to_string())
                .parse::<f64>()
                .unwrap_or(10.0),
            rewards_max_pages: std::env::var("REWARDS_MAX_PAGES")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(REWARDS_MAX_PAGES),
            rewards_full_page: std::env::var("REWARDS_FULL_PAGE")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(REWARDS_FULL_PAGE),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gamma_api_url: GAMMA_API_URL.to_string(),
            rewards_base_url: REWARDS_BASE_URL.to_string(),
            rewards_enabled: true,
            log_level: "info".to_string(),
            api_port: 8080,
            refresh_interval: Duration::from_secs(REFRESH_INTERVAL_SECS),
            http_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            adapter_timeout: Duration::from_secs(ADAPTER_TIMEOUT_SECS),
            listing_page_size: LISTING_PAGE_SIZE,
            min_volume: 10.0,
            min_liquidity: 10.0,
            rewards_max_pages: REWARDS_MAX_PAGES,
            rewards_full_page: REWARDS_FULL_PAGE,
        }
    }
}

fn parse_flag(v: &str) -> bool {
    !matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
