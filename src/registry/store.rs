//! Concurrent keyed store and the snapshot/export protocol.

use super::cell::MetricCell;
use super::descriptor::{DescriptorTable, MetricDescriptor, MetricKind};
use crate::error::{Diagnostic, DiagnosticSink};
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

/// One collected measurement paired with its resolved descriptor.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Descriptor of the family this sample belongs to.
    pub descriptor: MetricDescriptor,
    /// Exported value at collection time.
    pub value: f64,
    /// Ordered label values of the series.
    pub label_values: Vec<String>,
}

/// Concurrent metric registry.
///
/// Maps composite keys (metric name plus label values in call order) to
/// live series. Series are created lazily on first write; concurrent
/// first-writers to the same key converge on a single series, and the
/// race loser's value is still applied. Each series guards its own
/// numeric state, so collection runs concurrently with writers without a
/// global freeze.
#[derive(Debug)]
pub struct MetricsRegistry {
    prefix: String,
    descriptors: DescriptorTable,
    cells: RwLock<HashMap<String, Arc<MetricCell>>>,
    diagnostics: DiagnosticSink,
}

impl MetricsRegistry {
    /// Create a registry over a static descriptor table.
    #[must_use]
    pub fn new(prefix: impl Into<String>, descriptors: DescriptorTable) -> Self {
        Self {
            prefix: prefix.into(),
            descriptors,
            cells: RwLock::new(HashMap::new()),
            diagnostics: DiagnosticSink::default(),
        }
    }

    /// Global family-name prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Route non-fatal diagnostics to the given channel.
    pub fn set_error_sink(&self, tx: mpsc::UnboundedSender<Diagnostic>) {
        self.diagnostics.install(tx);
    }

    /// Record one measurement.
    ///
    /// Creates the series on first write to a key. Writes to names with
    /// no configured descriptor fall back to gauge semantics with no
    /// declared labels and report [`Diagnostic::UnknownKindFallback`].
    pub fn set(&self, name: &str, value: f64, labels: &[&str]) {
        let key = build_key(name, labels);

        let existing = {
            let cells = self.cells.read().expect("cells lock poisoned");
            cells.get(&key).cloned()
        };
        if let Some(cell) = existing {
            self.apply(&cell, value, labels);
            return;
        }

        // First write to this key: resolve the descriptor and build the
        // series outside the store lock.
        let (kind, window) = match self.descriptors.resolve(name) {
            Some(desc) => (desc.kind, desc.window),
            None => {
                self.diagnostics
                    .report(Diagnostic::UnknownKindFallback { key: key.clone() });
                (MetricKind::Gauge, None)
            }
        };
        let fresh = Arc::new(MetricCell::new(
            key.clone(),
            name,
            kind,
            labels.iter().map(|s| (*s).to_string()).collect(),
            window,
        ));

        // Insert-if-absent: a concurrent writer may have created the
        // series since the read above. The losing instance is dropped and
        // the losing writer's value applied to the winner.
        let cell = {
            let mut cells = self.cells.write().expect("cells lock poisoned");
            Arc::clone(cells.entry(key).or_insert(fresh))
        };
        self.apply(&cell, value, labels);
    }

    fn apply(&self, cell: &MetricCell, value: f64, labels: &[&str]) {
        if !cell.is_contained(labels) {
            self.diagnostics.report(Diagnostic::TypeMismatch {
                key: cell.key().to_string(),
            });
            return;
        }
        cell.update(value);
    }

    /// Descriptors for every configured family, in declaration order.
    #[must_use]
    pub fn describe(&self) -> Vec<MetricDescriptor> {
        self.descriptors.descriptors().to_vec()
    }

    /// Snapshot every live series.
    ///
    /// Each value is read under its own series lock; the store is not
    /// frozen as a whole, so a write landing mid-collect is visible only
    /// in samples read after it. Series whose name resolves to no
    /// descriptor are skipped with [`Diagnostic::DescriptorNotFound`].
    #[must_use]
    pub fn collect(&self) -> Vec<Sample> {
        let cells: Vec<Arc<MetricCell>> = {
            let cells = self.cells.read().expect("cells lock poisoned");
            cells.values().cloned().collect()
        };

        let mut samples = Vec::with_capacity(cells.len());
        for cell in cells {
            let Some(desc) = self.descriptors.resolve(cell.name()) else {
                self.diagnostics.report(Diagnostic::DescriptorNotFound {
                    key: cell.key().to_string(),
                });
                continue;
            };
            samples.push(Sample {
                descriptor: desc.clone(),
                value: cell.read(),
                label_values: cell.label_values().to_vec(),
            });
        }
        samples
    }

    /// Current value of one series, if it exists.
    #[must_use]
    pub fn value(&self, name: &str, labels: &[&str]) -> Option<f64> {
        let key = build_key(name, labels);
        let cells = self.cells.read().expect("cells lock poisoned");
        cells.get(&key).map(|cell| cell.read())
    }

    /// Number of live series.
    #[must_use]
    pub fn series_count(&self) -> usize {
        self.cells.read().expect("cells lock poisoned").len()
    }

    /// Roll every windowed series whose deadline has passed.
    pub fn roll_windows(&self, now: Instant) {
        let cells: Vec<Arc<MetricCell>> = {
            let cells = self.cells.read().expect("cells lock poisoned");
            cells.values().cloned().collect()
        };
        for cell in cells {
            cell.roll_due(now);
        }
    }

    /// Evict series idle beyond `threshold`. Returns the evicted count.
    ///
    /// Idleness is checked without the store lock; the write lock is
    /// taken per removal, so writers and collectors are blocked for at
    /// most one entry at a time. A removed key is not reserved: a later
    /// write re-creates the series in its kind's initial state.
    pub fn sweep_idle(&self, threshold: Duration, now: Instant) -> usize {
        let snapshot: Vec<(String, Arc<MetricCell>)> = {
            let cells = self.cells.read().expect("cells lock poisoned");
            cells
                .iter()
                .map(|(k, c)| (k.clone(), Arc::clone(c)))
                .collect()
        };

        let mut evicted = 0;
        for (key, cell) in snapshot {
            if !cell.is_idle(threshold, now) {
                continue;
            }
            let mut cells = self.cells.write().expect("cells lock poisoned");
            // Re-check under the write lock: a write may have landed, or
            // the entry may already have been replaced by a fresh series.
            if cells
                .get(&key)
                .is_some_and(|c| Arc::ptr_eq(c, &cell) && c.is_idle(threshold, now))
            {
                cells.remove(&key);
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(evicted, "evicted idle series");
        }
        evicted
    }

    /// Render the current snapshot in Prometheus text exposition format.
    #[must_use]
    pub fn encode_text(&self) -> String {
        let samples = self.collect();
        let mut out = String::new();
        for desc in self.descriptors.descriptors() {
            let matching: Vec<&Sample> = samples
                .iter()
                .filter(|s| s.descriptor.name == desc.name)
                .collect();
            if matching.is_empty() {
                continue;
            }
            let family = family_name(&self.prefix, &desc.name);
            let _ = writeln!(out, "# HELP {} {}", family, desc.help);
            let _ = writeln!(out, "# TYPE {} {}", family, desc.kind.exposition_type());
            for sample in matching {
                let labels = render_labels(&desc.labels, &sample.label_values);
                let _ = writeln!(out, "{}{} {}", family, labels, sample.value);
            }
        }
        out
    }
}

/// Composite series key: the name plus label values in call order.
///
/// The order is caller-determined on purpose; the same values in a
/// different order identify a different series.
pub(crate) fn build_key(name: &str, labels: &[&str]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let mut key = String::with_capacity(
        name.len() + labels.iter().map(|l| l.len() + 1).sum::<usize>(),
    );
    key.push_str(name);
    for label in labels {
        key.push('_');
        key.push_str(label);
    }
    key
}

fn family_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}_{name}")
    }
}

fn render_labels(names: &[String], values: &[String]) -> String {
    if names.is_empty() || values.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(name, value)| format!("{}=\"{}\"", name, escape_label(value)))
        .collect();
    format!("{{{}}}", pairs.join(","))
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}
