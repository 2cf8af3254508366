//! Report accumulator: incremental per-region/per-host statistics, rendered
//! at shutdown with section order agent header, per-host, per-region
//! (sorted by hash), totals.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Streaming count/first/last/min/max/mean/std accumulator.
///
/// Uses Welford's online algorithm so `std` never requires a second pass.
#[derive(Clone, Debug, Default)]
pub struct MomentAccumulator {
    count: u64,
    first: Option<f64>,
    last: f64,
    min: f64,
    max: f64,
    mean: f64,
    m2: f64,
}

impl MomentAccumulator {
    pub fn new() -> Self {
        MomentAccumulator { min: f64::INFINITY, max: f64::NEG_INFINITY, ..Default::default() }
    }

    /// Folds one observation in. NaN observations are ignored (as with all
    /// `platform`-kind failures elsewhere in the core, a missing reading is
    /// "no information," not a zero).
    pub fn observe(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        if self.first.is_none() {
            self.first = Some(value);
        }
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn first(&self) -> f64 {
        self.first.unwrap_or(f64::NAN)
    }

    pub fn last(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.last
        }
    }

    pub fn min(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.max
        }
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    pub fn std(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else if self.count == 1 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(
            out,
            "{}: count={}, first={}, last={}, min={}, max={}, mean={}, std={}",
            name,
            self.count,
            fmt(self.first()),
            fmt(self.last()),
            fmt(self.min()),
            fmt(self.max()),
            fmt(self.mean()),
            fmt(self.std()),
        );
    }
}

fn fmt(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else {
        format!("{v}")
    }
}

/// Per-region accumulated statistics, keyed by the metric name the agent
/// reported it under (e.g. a signal name like `cpu-energy`).
#[derive(Clone, Debug, Default)]
pub struct RegionReport {
    pub metrics: BTreeMap<String, MomentAccumulator>,
}

impl RegionReport {
    pub fn observe(&mut self, metric: &str, value: f64) {
        self.metrics.entry(metric.to_string()).or_insert_with(MomentAccumulator::new).observe(value);
    }
}

/// Accumulates the whole shutdown report: a header (only the root-level
/// agent emits one), a per-host error-count map, and per-region reports
/// sorted by region hash.
#[derive(Clone, Debug, Default)]
pub struct Report {
    pub header: Vec<(String, String)>,
    pub host_fields: Vec<(String, String)>,
    pub errors: BTreeMap<String, u64>,
    pub regions: BTreeMap<u64, (String, RegionReport)>,
}

impl Report {
    pub fn new() -> Self {
        Report::default()
    }

    pub fn set_header(&mut self, fields: Vec<(String, String)>) {
        self.header = fields;
    }

    pub fn set_host_fields(&mut self, fields: Vec<(String, String)>) {
        self.host_fields = fields;
    }

    pub fn record_error(&mut self, kind: &str) {
        *self.errors.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn region_mut(&mut self, hash: u64, name: &str) -> &mut RegionReport {
        &mut self.regions.entry(hash).or_insert_with(|| (name.to_string(), RegionReport::default())).1
    }

    /// Renders the final report text in the fixed §6 section order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.header {
            let _ = writeln!(out, "{k}: {v}");
        }
        let _ = writeln!(out, "[Host]");
        for (k, v) in &self.host_fields {
            let _ = writeln!(out, "{k}: {v}");
        }
        if !self.errors.is_empty() {
            let _ = writeln!(out, "errors:");
            for (kind, count) in &self.errors {
                let _ = writeln!(out, "  {kind}: {count}");
            }
        }
        for (hash, (name, region)) in &self.regions {
            let _ = writeln!(out, "[Region {name} ({hash:#018x})]");
            for (metric, acc) in &region.metrics {
                acc.render(metric, &mut out);
            }
        }
        out
    }
}
