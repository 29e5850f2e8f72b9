pub mod aggregate;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod dataset;
pub mod error;
pub mod export;
pub mod filter;
pub mod format;
pub mod loader;
pub mod report;
pub mod schema;

#[cfg(test)]
mod fixtures;

pub use aggregate::{aggregate, kpi_snapshot, top_n, AggregateRow, Grouping, KpiSnapshot, Measure, TimeGrain};
pub use cache::SessionCache;
pub use config::Settings;
pub use dashboard::{build_dashboard, Chart, DashboardRequest, DashboardView, Notice};
pub use dataset::Dataset;
pub use error::{DashboardError, Result};
pub use filter::{FilterPipeline, Predicate, Selection};
pub use loader::{DatasetLoader, LoadOutcome};
