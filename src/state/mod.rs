pub mod progress;
pub mod snapshot_cache;

pub use progress::{ProgressCounter, ProgressState, ProgressView, SourceKind};
pub use snapshot_cache::{CacheRead, SnapshotCache};
