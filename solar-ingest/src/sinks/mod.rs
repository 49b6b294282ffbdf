pub mod metric_store;

pub use metric_store::MetricStoreSink;
