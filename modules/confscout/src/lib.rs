pub mod batch;
pub mod enrichment;
pub mod export;
pub mod extraction;
pub mod fetch;
pub mod listing;
pub mod pipeline;
pub mod run_log;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod util;
