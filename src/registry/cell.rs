//! A single live metric series and its kind-specific state.

use super::descriptor::MetricKind;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Kind-specific numeric state.
#[derive(Debug)]
enum CellValue {
    Immutable { value: f64, written: bool },
    Counter { total: f64 },
    Gauge { value: f64 },
    WindowSum { frozen: f64, accumulating: f64 },
    WindowMax { frozen: f64, pending: f64 },
}

impl CellValue {
    fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Immutable => Self::Immutable {
                value: 0.0,
                written: false,
            },
            MetricKind::Counter => Self::Counter { total: 0.0 },
            MetricKind::Gauge => Self::Gauge { value: 0.0 },
            MetricKind::WindowSum => Self::WindowSum {
                frozen: 0.0,
                accumulating: 0.0,
            },
            MetricKind::WindowMax => Self::WindowMax {
                frozen: 0.0,
                pending: 0.0,
            },
        }
    }
}

#[derive(Debug)]
struct CellState {
    value: CellValue,
    last_write: Instant,
    next_roll: Option<Instant>,
}

/// One live metric series.
///
/// All numeric state sits behind the cell's own mutex; the store never
/// holds a global lock while a cell is read or written, and the lock is
/// never held across I/O.
#[derive(Debug)]
pub struct MetricCell {
    key: String,
    name: String,
    kind: MetricKind,
    label_values: Vec<String>,
    window: Option<Duration>,
    state: Mutex<CellState>,
}

impl MetricCell {
    /// Create a series in its kind's initial state.
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        kind: MetricKind,
        label_values: Vec<String>,
        window: Option<Duration>,
    ) -> Self {
        let window = kind
            .default_window()
            .map(|default| window.unwrap_or(default));
        let now = Instant::now();
        Self {
            key: key.into(),
            name: name.into(),
            kind,
            label_values,
            window,
            state: Mutex::new(CellState {
                value: CellValue::new(kind),
                last_write: now,
                next_roll: window.map(|w| now + w),
            }),
        }
    }

    /// Composite series key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Metric family name, used for descriptor lookup.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered label values of this series.
    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    /// Apply one written value according to the kind's semantics.
    pub fn update(&self, v: f64) {
        let mut state = self.state.lock().expect("cell lock poisoned");
        state.last_write = Instant::now();
        match &mut state.value {
            CellValue::Immutable { value, written } => {
                if !*written {
                    *value = v;
                    *written = true;
                }
            }
            CellValue::Counter { total } => *total += v,
            CellValue::Gauge { value } => *value = v,
            CellValue::WindowSum { accumulating, .. } => *accumulating += v,
            CellValue::WindowMax { pending, .. } => {
                if v > *pending {
                    *pending = v;
                }
            }
        }
    }

    /// Current exported value.
    ///
    /// Windowed kinds expose only the last completed window, never the
    /// in-flight accumulator.
    pub fn read(&self) -> f64 {
        let state = self.state.lock().expect("cell lock poisoned");
        match &state.value {
            CellValue::Immutable { value, .. } => *value,
            CellValue::Counter { total } => *total,
            CellValue::Gauge { value } => *value,
            CellValue::WindowSum { frozen, .. } => *frozen,
            CellValue::WindowMax { frozen, .. } => *frozen,
        }
    }

    /// Freeze the in-flight window if its deadline has passed.
    ///
    /// Returns `true` when a roll happened.
    pub fn roll_due(&self, now: Instant) -> bool {
        let Some(window) = self.window else {
            return false;
        };
        let mut state = self.state.lock().expect("cell lock poisoned");
        match state.next_roll {
            Some(due) if now >= due => {}
            _ => return false,
        }
        match &mut state.value {
            CellValue::WindowSum {
                frozen,
                accumulating,
            } => {
                *frozen = *accumulating;
                *accumulating = 0.0;
            }
            CellValue::WindowMax { frozen, pending } => {
                *frozen = *pending;
                *pending = 0.0;
            }
            _ => {}
        }
        state.next_roll = Some(now + window);
        true
    }

    /// Whether the series has gone unwritten for at least `threshold`.
    ///
    /// Always `false` for kinds that are not eviction-eligible.
    pub fn is_idle(&self, threshold: Duration, now: Instant) -> bool {
        if !self.kind.is_evictable() {
            return false;
        }
        let state = self.state.lock().expect("cell lock poisoned");
        now.duration_since(state.last_write) >= threshold
    }

    /// Whether a candidate label-value sequence matches this series.
    ///
    /// Only gauges compare; the other kinds accept any labels.
    pub fn is_contained(&self, labels: &[&str]) -> bool {
        if self.kind != MetricKind::Gauge {
            return true;
        }
        self.label_values.len() == labels.len()
            && self
                .label_values
                .iter()
                .zip(labels)
                .all(|(have, want)| have.eq_ignore_ascii_case(want))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: MetricKind) -> MetricCell {
        MetricCell::new("k", "k", kind, Vec::new(), None)
    }

    #[test]
    fn test_counter_accumulates() {
        let c = cell(MetricKind::Counter);
        c.update(3.0);
        c.update(4.0);
        assert_eq!(c.read(), 7.0);
    }

    #[test]
    fn test_gauge_overwrites() {
        let c = cell(MetricKind::Gauge);
        c.update(3.0);
        c.update(4.0);
        assert_eq!(c.read(), 4.0);
    }

    #[test]
    fn test_immutable_first_write_wins() {
        let c = cell(MetricKind::Immutable);
        c.update(3.0);
        c.update(4.0);
        assert_eq!(c.read(), 3.0);
    }

    #[test]
    fn test_window_sum_exposes_completed_window_only() {
        let c = MetricCell::new(
            "k",
            "k",
            MetricKind::WindowSum,
            Vec::new(),
            Some(Duration::from_secs(1)),
        );
        c.update(5.0);
        assert_eq!(c.read(), 0.0);

        assert!(!c.roll_due(Instant::now()));
        assert_eq!(c.read(), 0.0);

        assert!(c.roll_due(Instant::now() + Duration::from_secs(2)));
        assert_eq!(c.read(), 5.0);

        c.update(2.0);
        assert_eq!(c.read(), 5.0);
    }

    #[test]
    fn test_window_max_freezes_peak() {
        let c = MetricCell::new(
            "k",
            "k",
            MetricKind::WindowMax,
            Vec::new(),
            Some(Duration::from_secs(1)),
        );
        c.update(3.0);
        c.update(9.0);
        c.update(5.0);
        assert!(c.roll_due(Instant::now() + Duration::from_secs(2)));
        assert_eq!(c.read(), 9.0);

        c.update(1.0);
        assert_eq!(c.read(), 9.0);

        assert!(c.roll_due(Instant::now() + Duration::from_secs(4)));
        assert_eq!(c.read(), 1.0);
    }

    #[test]
    fn test_non_windowed_kind_never_rolls() {
        let c = cell(MetricKind::Counter);
        c.update(1.0);
        assert!(!c.roll_due(Instant::now() + Duration::from_secs(120)));
        assert_eq!(c.read(), 1.0);
    }

    #[test]
    fn test_idle_reporting() {
        let c = cell(MetricKind::Gauge);
        c.update(1.0);
        let later = Instant::now() + Duration::from_secs(10);
        assert!(c.is_idle(Duration::from_secs(5), later));
        assert!(!c.is_idle(Duration::from_secs(60), later));
    }

    #[test]
    fn test_immutable_never_idle() {
        let c = cell(MetricKind::Immutable);
        c.update(1.0);
        let later = Instant::now() + Duration::from_secs(3600);
        assert!(!c.is_idle(Duration::from_millis(1), later));
    }

    #[test]
    fn test_containment_gauge_only() {
        let gauge = MetricCell::new(
            "g_a_b",
            "g",
            MetricKind::Gauge,
            vec!["a".to_string(), "b".to_string()],
            None,
        );
        assert!(gauge.is_contained(&["a", "b"]));
        assert!(gauge.is_contained(&["A", "B"]));
        assert!(!gauge.is_contained(&["a"]));
        assert!(!gauge.is_contained(&["a_b"]));

        let counter = MetricCell::new(
            "c_a_b",
            "c",
            MetricKind::Counter,
            vec!["a".to_string(), "b".to_string()],
            None,
        );
        assert!(counter.is_contained(&["anything"]));
    }
}
