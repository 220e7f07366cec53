//! Source adapters. The coordinator only sees the two traits below: a listing
//! source producing records and a key source producing rewards-program slugs.

pub mod gamma;
pub mod rewards;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::config::{Config, USER_AGENT};
use crate::error::{AppError, Result};
use crate::state::ProgressCounter;
use crate::types::Record;

pub use gamma::GammaListingFetcher;
pub use rewards::RewardsScraper;

/// Slugs of markets in the rewards program. Membership only.
pub type KeySet = HashSet<String>;

/// What an adapter hands back: everything gathered, plus the error that cut
/// the walk short if there was one. Partial data is still usable.
#[derive(Debug)]
pub struct SourceOutcome<T> {
    pub items: T,
    pub failure: Option<String>,
}

impl<T> SourceOutcome<T> {
    pub fn complete(items: T) -> Self {
        Self { items, failure: None }
    }

    pub fn partial(items: T, err: AppError) -> Self {
        Self { items, failure: Some(err.to_string()) }
    }
}

impl<T: Default> SourceOutcome<T> {
    pub fn failed(err: AppError) -> Self {
        Self::partial(T::default(), err)
    }
}

#[async_trait]
pub trait ListingSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Walk the whole listing. Must update `progress` as records accumulate.
    async fn fetch_records(&self, progress: &ProgressCounter) -> SourceOutcome<Vec<Record>>;
}

#[async_trait]
pub trait KeySource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Walk the whole rewards listing. Must update `progress` as keys accumulate.
    async fn fetch_keys(&self, progress: &ProgressCounter) -> SourceOutcome<KeySet>;
}

/// Stand-in key source for environments without rewards scraping.
/// Every record ends up flagged as not in the program.
pub struct DisabledKeySource;

#[async_trait]
impl KeySource for DisabledKeySource {
    fn name(&self) -> &'static str {
        "rewards-disabled"
    }

    async fn fetch_keys(&self, progress: &ProgressCounter) -> SourceOutcome<KeySet> {
        progress.set(0);
        SourceOutcome::complete(KeySet::new())
    }
}

/// Shared client settings for every upstream call.
pub(crate) fn http_client(cfg: &Config) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(cfg.http_timeout)
        .user_agent(USER_AGENT)
        .build()?)
}
