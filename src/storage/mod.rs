pub mod result_store;
pub mod schema;

pub use result_store::{DbInfo, MetricStats, ResultStore, StoreStatistics, StoredRecord};
