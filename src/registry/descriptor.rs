//! Metric descriptors and the static descriptor table.

use crate::config::MetricConfig;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Update/read semantics of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Value fixed by the first write; later writes are ignored.
    Immutable,
    /// Accumulates every written value.
    Counter,
    /// Last written value wins.
    Gauge,
    /// Sums writes over a window; readers see the last completed window.
    WindowSum,
    /// Tracks the peak over a window; readers see the last completed window.
    WindowMax,
}

impl MetricKind {
    /// Default window length for the periodic kinds.
    #[must_use]
    pub fn default_window(self) -> Option<Duration> {
        match self {
            Self::WindowSum => Some(Duration::from_secs(1)),
            Self::WindowMax => Some(Duration::from_secs(60)),
            _ => None,
        }
    }

    /// Whether idle series of this kind may be evicted.
    ///
    /// Write-once series never refresh their touch timestamp, so an idle
    /// threshold would unconditionally remove them.
    #[must_use]
    pub fn is_evictable(self) -> bool {
        !matches!(self, Self::Immutable)
    }

    /// Prometheus exposition type for this kind.
    #[must_use]
    pub fn exposition_type(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            _ => "gauge",
        }
    }

    /// Parse a configured kind name, case-insensitively.
    fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("immutable") {
            Some(Self::Immutable)
        } else if s.eq_ignore_ascii_case("counter") {
            Some(Self::Counter)
        } else if s.eq_ignore_ascii_case("gauge") {
            Some(Self::Gauge)
        } else if s.eq_ignore_ascii_case("window_sum") {
            Some(Self::WindowSum)
        } else if s.eq_ignore_ascii_case("window_max") {
            Some(Self::WindowMax)
        } else {
            None
        }
    }
}

/// Static metadata for one metric family.
#[derive(Debug, Clone)]
pub struct MetricDescriptor {
    /// Metric name.
    pub name: String,
    /// Update/read semantics.
    pub kind: MetricKind,
    /// Help text describing the metric.
    pub help: String,
    /// Label names for this metric.
    pub labels: Vec<String>,
    /// Window length for the periodic kinds.
    pub window: Option<Duration>,
}

impl MetricDescriptor {
    /// Create a new descriptor with the kind's default window.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: MetricKind, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            help: help.into(),
            labels: Vec::new(),
            window: kind.default_window(),
        }
    }

    /// Add label names to the metric.
    #[must_use]
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Override the window length. Ignored for non-periodic kinds.
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        if self.kind.default_window().is_some() {
            self.window = Some(window);
        }
        self
    }
}

/// Insertion-ordered descriptor table with case-insensitive lookup.
///
/// Built once at startup; safe for unsynchronized concurrent reads.
#[derive(Debug, Default)]
pub struct DescriptorTable {
    ordered: Vec<MetricDescriptor>,
    index: HashMap<String, usize>,
}

impl DescriptorTable {
    /// Build a table from descriptors. Later duplicates replace earlier ones.
    #[must_use]
    pub fn new(descriptors: Vec<MetricDescriptor>) -> Self {
        let mut table = Self::default();
        for desc in descriptors {
            table.insert(desc);
        }
        table
    }

    /// Build a table from configuration entries.
    ///
    /// Unknown kind names resolve to gauge with a warning.
    #[must_use]
    pub fn from_config(metrics: &[MetricConfig]) -> Self {
        let mut table = Self::default();
        for mc in metrics {
            let kind = MetricKind::parse(&mc.kind).unwrap_or_else(|| {
                warn!(metric = %mc.name, kind = %mc.kind, "unknown metric kind, using gauge");
                MetricKind::Gauge
            });
            let mut desc =
                MetricDescriptor::new(&mc.name, kind, &mc.help).with_labels(mc.labels.clone());
            if let Some(window) = mc.window {
                desc = desc.with_window(window);
            }
            table.insert(desc);
        }
        table
    }

    fn insert(&mut self, desc: MetricDescriptor) {
        let key = desc.name.to_ascii_lowercase();
        match self.index.get(&key) {
            Some(&pos) => self.ordered[pos] = desc,
            None => {
                self.index.insert(key, self.ordered.len());
                self.ordered.push(desc);
            }
        }
    }

    /// Look up a descriptor by name, case-insensitively.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&MetricDescriptor> {
        self.index
            .get(&name.to_ascii_lowercase())
            .map(|&pos| &self.ordered[pos])
    }

    /// All descriptors, in declaration order.
    #[must_use]
    pub fn descriptors(&self) -> &[MetricDescriptor] {
        &self.ordered
    }

    /// Number of declared families.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, kind: &str) -> MetricConfig {
        MetricConfig {
            name: name.to_string(),
            kind: kind.to_string(),
            help: format!("{name} help"),
            ..MetricConfig::default()
        }
    }

    #[test]
    fn test_parse_kind_case_insensitive() {
        assert_eq!(MetricKind::parse("Counter"), Some(MetricKind::Counter));
        assert_eq!(MetricKind::parse("WINDOW_SUM"), Some(MetricKind::WindowSum));
        assert_eq!(MetricKind::parse("immutable"), Some(MetricKind::Immutable));
        assert_eq!(MetricKind::parse("histogram"), None);
    }

    #[test]
    fn test_unknown_kind_falls_back_to_gauge() {
        let table = DescriptorTable::from_config(&[entry("m", "summary")]);
        assert_eq!(table.resolve("m").unwrap().kind, MetricKind::Gauge);
    }

    #[test]
    fn test_resolve_case_insensitive() {
        let table = DescriptorTable::from_config(&[entry("Tx_Total", "counter")]);
        assert!(table.resolve("tx_total").is_some());
        assert!(table.resolve("TX_TOTAL").is_some());
        assert!(table.resolve("rx_total").is_none());
    }

    #[test]
    fn test_declaration_order_preserved() {
        let table =
            DescriptorTable::from_config(&[entry("b", "gauge"), entry("a", "counter")]);
        let names: Vec<&str> = table.descriptors().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_default_windows() {
        assert_eq!(
            MetricKind::WindowSum.default_window(),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            MetricKind::WindowMax.default_window(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(MetricKind::Counter.default_window(), None);
    }

    #[test]
    fn test_window_override_only_for_periodic_kinds() {
        let desc = MetricDescriptor::new("m", MetricKind::WindowSum, "h")
            .with_window(Duration::from_secs(5));
        assert_eq!(desc.window, Some(Duration::from_secs(5)));

        let desc =
            MetricDescriptor::new("m", MetricKind::Gauge, "h").with_window(Duration::from_secs(5));
        assert_eq!(desc.window, None);
    }

    #[test]
    fn test_evictability() {
        assert!(!MetricKind::Immutable.is_evictable());
        assert!(MetricKind::Counter.is_evictable());
        assert!(MetricKind::WindowMax.is_evictable());
    }
}
