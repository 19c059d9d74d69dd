pub mod handlers;
pub mod usage;

pub use handlers::{AppState, ApiError, LEGACY_SERVICE_PATH, ServiceRequest, router};
pub use usage::{
    CounterStore, CounterStoreError, MemoryCounterStore, MergeStrategy, UsageAggregator,
    UsageConfig, current_period,
};
