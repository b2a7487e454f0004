//! Concurrent typed metric registry.
//!
//! The registry maps composite keys (metric name plus label values in
//! call order) to live series, creating them lazily on first write from
//! the configured descriptor table. Five kinds of update/read semantics
//! are supported: write-once, counter, gauge, and two windowed kinds
//! that expose only the last completed interval to readers.

mod cell;
mod descriptor;
mod store;

pub use descriptor::{DescriptorTable, MetricDescriptor, MetricKind};
pub use store::{MetricsRegistry, Sample};
