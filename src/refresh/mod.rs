pub mod coordinator;
pub mod timer;

#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::{RefreshCoordinator, RefreshSettings, RefreshTrigger};
