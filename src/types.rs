use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One market entry as served to clients.
///
/// Prices are in cents on a 0–100 scale. A record coming out of the listing
/// adapter may carry `None` prices (placeholder markets); those never survive
/// into a [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub question: String,
    /// Join key against the rewards key set.
    pub slug: String,
    pub event_slug: String,
    pub event_title: String,
    pub image: Option<String>,
    pub yes_price: Option<f64>,
    pub no_price: Option<f64>,
    pub spread: Option<f64>,
    pub volume: f64,
    pub volume_24hr: f64,
    pub liquidity: f64,
    pub end_date: Option<String>,
    pub url: String,
    /// Set once by the combiner; adapters always emit `false`.
    pub has_rewards: bool,
}

impl Record {
    /// True when both prices are present and within [0, 100].
    pub fn has_valid_prices(&self) -> bool {
        match (self.yes_price, self.no_price) {
            (Some(yes), Some(no)) => in_price_range(yes) && in_price_range(no),
            _ => false,
        }
    }
}

fn in_price_range(p: f64) -> bool {
    p.is_finite() && (0.0..=100.0).contains(&p)
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One fully combined generation of the canonical record set.
/// Never mutated after construction; shared as `Arc<Snapshot>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    records: Vec<Record>,
    updated_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(records: Vec<Record>, updated_at: DateTime<Utc>) -> Self {
        Self { records, updated_at }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn rewards_count(&self) -> usize {
        self.records.iter().filter(|r| r.has_rewards).count()
    }
}

// ---------------------------------------------------------------------------
// Refresh phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No cycle has started yet.
    Idle,
    /// Adapters running (combining is folded into this phase).
    Fetching,
    /// Last cycle completed and its snapshot is published.
    Ready,
}

impl Phase {
    pub fn as_u8(self) -> u8 {
        match self {
            Phase::Idle => 0,
            Phase::Fetching => 1,
            Phase::Ready => 2,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Phase::Fetching,
            2 => Phase::Ready,
            _ => Phase::Idle,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Fetching => "fetching",
            Phase::Ready => "ready",
        };
        write!(f, "{s}")
    }
}
