pub mod audit;
pub mod metrics;
pub mod refgraph;

pub use audit::{AuditReport, audit};
pub use metrics::{Metrics, collect_metrics, compare};
pub use refgraph::{RefKind, ReferenceGraph};
