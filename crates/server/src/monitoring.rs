//! Request logging and input drift detection.
//!
//! Every served recommendation is recorded in a bounded [`RequestLog`]. The
//! drift report compares the oldest window of requests against the newest
//! with a two-sample Kolmogorov-Smirnov test per feature.

use chrono::Local;
use data_loader::UserId;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Entries kept in the log before the oldest is evicted
pub const HISTORY_CAPACITY: usize = 1000;

/// Entries needed before a drift report is produced
pub const MIN_REQUESTS: usize = 50;

/// Size of the reference (oldest) and current (newest) windows
pub const WINDOW: usize = 200;

pub const DRIFT_P_VALUE: f64 = 0.05;

const USER_ID_BINS: usize = 20;
const COUNT_BINS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RequestRecord {
    pub user_id: UserId,
    pub n_recommendations: usize,
}

/// Bounded, thread-safe history of served requests
#[derive(Debug)]
pub struct RequestLog {
    entries: Mutex<VecDeque<RequestRecord>>,
    total: AtomicU64,
    capacity: usize,
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            total: AtomicU64::new(0),
            capacity,
        }
    }

    pub fn record(&self, user_id: UserId, n_recommendations: usize) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(RequestRecord {
            user_id,
            n_recommendations,
        });
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy of the logged entries, oldest first
    pub fn snapshot(&self) -> Vec<RequestRecord> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Requests recorded since startup, including evicted ones
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KsResult {
    pub statistic: f64,
    pub p_value: f64,
}

/// Two-sample Kolmogorov-Smirnov test with an asymptotic p-value
///
/// The p-value comes from the limiting Kolmogorov distribution with
/// Stephens' small-sample correction. It is not the exact distribution, so
/// for small windows (n·m below roughly 10 000) it can differ slightly from
/// an exact test near the drift threshold.
///
/// Returns `None` if either sample is empty.
pub fn ks_2samp(a: &[f64], b: &[f64]) -> Option<KsResult> {
    if a.is_empty() || b.is_empty() {
        return None;
    }

    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);
    let (n, m) = (a.len(), b.len());

    let (mut i, mut j) = (0, 0);
    let mut statistic: f64 = 0.0;
    while i < n && j < m {
        let x = a[i].min(b[j]);
        while i < n && a[i] <= x {
            i += 1;
        }
        while j < m && b[j] <= x {
            j += 1;
        }
        let gap = (i as f64 / n as f64 - j as f64 / m as f64).abs();
        statistic = statistic.max(gap);
    }

    let en = ((n * m) as f64 / (n + m) as f64).sqrt();
    let lambda = (en + 0.12 + 0.11 / en) * statistic;
    Some(KsResult {
        statistic,
        p_value: kolmogorov_survival(lambda),
    })
}

/// Q_KS(λ) = 2 Σ (-1)^(k-1) exp(-2 k² λ²)
fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda < 1e-3 {
        return 1.0;
    }
    let a2 = -2.0 * lambda * lambda;
    let mut sign = 2.0;
    let mut sum = 0.0;
    let mut previous: f64 = 0.0;
    for k in 1..=100 {
        let term = sign * (a2 * f64::from(k * k)).exp();
        sum += term;
        if term.abs() <= 1e-3 * previous || term.abs() <= 1e-8 * sum {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        previous = term.abs();
    }
    // No convergence means λ is tiny, i.e. the samples agree
    1.0
}

/// Counts of two samples over shared equal-width bins
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub lower: f64,
    pub width: f64,
    pub reference: Vec<usize>,
    pub current: Vec<usize>,
}

impl Histogram {
    pub fn new(reference: &[f64], current: &[f64], bins: usize) -> Self {
        let bins = bins.max(1);
        let (lower, upper) = reference
            .iter()
            .chain(current)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            });
        let (lower, width) = if lower.is_finite() && upper > lower {
            (lower, (upper - lower) / bins as f64)
        } else if lower.is_finite() {
            (lower, 1.0)
        } else {
            (0.0, 1.0)
        };

        let count = |sample: &[f64]| {
            let mut counts = vec![0; bins];
            for &x in sample {
                let idx = ((x - lower) / width).floor() as usize;
                counts[idx.min(bins - 1)] += 1;
            }
            counts
        };

        Self {
            lower,
            width,
            reference: count(reference),
            current: count(current),
        }
    }

    pub fn bins(&self) -> usize {
        self.reference.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureDrift {
    pub feature: &'static str,
    pub test: KsResult,
    pub drifted: bool,
    pub histogram: Histogram,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftReport {
    pub generated_at: String,
    pub total_requests: usize,
    pub dataset_drift: bool,
    pub features: Vec<FeatureDrift>,
}

/// Build a drift report, or `None` with fewer than [`MIN_REQUESTS`] entries
pub fn drift_report(records: &[RequestRecord]) -> Option<DriftReport> {
    if records.len() < MIN_REQUESTS {
        return None;
    }

    let reference = &records[..records.len().min(WINDOW)];
    let current = &records[records.len().saturating_sub(WINDOW)..];

    let column = |rows: &[RequestRecord], pick: fn(&RequestRecord) -> f64| -> Vec<f64> {
        rows.iter().map(pick).collect()
    };
    let features: [(&'static str, fn(&RequestRecord) -> f64, usize); 2] = [
        ("user_id", user_id_value, USER_ID_BINS),
        ("n_recommendations", count_value, COUNT_BINS),
    ];
    let features = features
        .into_iter()
        .filter_map(|(feature, pick, bins)| {
            let reference = column(reference, pick);
            let current = column(current, pick);
            let test = ks_2samp(&reference, &current)?;
            Some(FeatureDrift {
                feature,
                test,
                drifted: test.p_value < DRIFT_P_VALUE,
                histogram: Histogram::new(&reference, &current, bins),
            })
        })
        .collect::<Vec<_>>();

    Some(DriftReport {
        generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        total_requests: records.len(),
        dataset_drift: features.iter().any(|f| f.drifted),
        features,
    })
}

fn user_id_value(record: &RequestRecord) -> f64 {
    f64::from(record.user_id)
}

fn count_value(record: &RequestRecord) -> f64 {
    record.n_recommendations as f64
}

impl DriftReport {
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        let verdict = if self.dataset_drift {
            r#"<span style="color:red">YES</span>"#
        } else {
            r#"<span style="color:green">NO</span>"#
        };

        let _ = write!(
            html,
            "<html>\n<head><title>Drift Report</title></head>\n<body>\n\
             <h1>ML Monitoring: Data Drift Report</h1>\n\
             <p><strong>Generated:</strong> {}</p>\n\
             <p><strong>Total requests analyzed:</strong> {}</p>\n\
             <p><strong>Dataset Drift Detected:</strong> {}</p>\n\
             <h3>Feature Drift Details:</h3>\n<ul>\n",
            self.generated_at, self.total_requests, verdict
        );
        for feature in &self.features {
            let _ = writeln!(
                html,
                "<li>{} (KS statistic: {:.4}, p-value: {:.4}): {}</li>",
                feature.feature,
                feature.test.statistic,
                feature.test.p_value,
                if feature.drifted { "Drift!" } else { "Stable" }
            );
        }
        html.push_str("</ul>\n");

        for feature in &self.features {
            let h = &feature.histogram;
            let _ = writeln!(
                html,
                "<h3>{}</h3>\n<table border=\"1\">\n{}",
                feature.feature, "<tr><th>Bin</th><th>Reference</th><th>Current</th></tr>"
            );
            for bin in 0..h.bins() {
                let lo = h.lower + bin as f64 * h.width;
                let _ = writeln!(
                    html,
                    "<tr><td>{:.1} - {:.1}</td><td>{}</td><td>{}</td></tr>",
                    lo,
                    lo + h.width,
                    h.reference[bin],
                    h.current[bin]
                );
            }
            html.push_str("</table>\n");
        }

        html.push_str("</body>\n</html>\n");
        html
    }
}

/// Page shown until enough requests have been logged
pub fn insufficient_data_html(count: usize) -> String {
    format!(
        "<h1>Need {MIN_REQUESTS}+ requests (current: {count})</h1>\
         <p>Make some /recommend calls first!</p>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_evicts_oldest() {
        let log = RequestLog::with_capacity(3);
        for user_id in 1..=5 {
            log.record(user_id, 10);
        }

        let ids: Vec<UserId> = log.snapshot().iter().map(|r| r.user_id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(log.len(), 3);
        assert_eq!(log.total(), 5);
    }

    #[test]
    fn test_ks_identical_samples() {
        let sample = [1.0, 2.0, 3.0, 4.0, 5.0];
        let result = ks_2samp(&sample, &sample).unwrap();
        assert_eq!(result.statistic, 0.0);
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn test_ks_disjoint_samples() {
        let a: Vec<f64> = (0..100).map(f64::from).collect();
        let b: Vec<f64> = (1000..1100).map(f64::from).collect();
        let result = ks_2samp(&a, &b).unwrap();
        assert_eq!(result.statistic, 1.0);
        assert!(result.p_value < 1e-6);
    }

    #[test]
    fn test_ks_statistic_with_ties() {
        let a = [1.0, 2.0, 2.0, 3.0];
        let b = [2.0, 2.0, 3.0, 3.0];
        // After x=1: 1/4 vs 0; after x=2: 3/4 vs 1/2
        let result = ks_2samp(&a, &b).unwrap();
        assert!((result.statistic - 0.25).abs() < 1e-12);
        assert!(ks_2samp(&[], &b).is_none());
    }

    #[test]
    fn test_histogram_shared_range() {
        let h = Histogram::new(&[0.0, 1.0, 2.0], &[9.0, 10.0], 10);
        assert_eq!(h.bins(), 10);
        assert_eq!(h.lower, 0.0);
        assert_eq!(h.width, 1.0);
        assert_eq!(h.reference.iter().sum::<usize>(), 3);
        assert_eq!(h.current[9], 2);

        let flat = Histogram::new(&[5.0, 5.0], &[5.0], 4);
        assert_eq!(flat.reference[0], 2);
        assert_eq!(flat.current[0], 1);
    }

    #[test]
    fn test_report_needs_minimum_requests() {
        let records: Vec<RequestRecord> = (0..MIN_REQUESTS as u32 - 1)
            .map(|user_id| RequestRecord {
                user_id,
                n_recommendations: 10,
            })
            .collect();
        assert!(drift_report(&records).is_none());
        assert!(insufficient_data_html(records.len()).contains("current: 49"));
    }

    #[test]
    fn test_report_detects_shifted_users() {
        let records: Vec<RequestRecord> = (0..400u32)
            .map(|i| RequestRecord {
                user_id: if i < 200 { i % 50 } else { 500 + i % 50 },
                n_recommendations: 10,
            })
            .collect();

        let report = drift_report(&records).unwrap();
        assert!(report.dataset_drift);
        assert!(report.features[0].drifted);
        assert!(!report.features[1].drifted);
        assert_eq!(report.total_requests, 400);

        let html = report.to_html();
        assert!(html.contains("Dataset Drift Detected"));
        assert!(html.contains("user_id"));
    }

    #[test]
    fn test_report_stable_traffic() {
        let records: Vec<RequestRecord> = (0..120u32)
            .map(|i| RequestRecord {
                user_id: i % 10,
                n_recommendations: 5 + (i % 3) as usize,
            })
            .collect();

        let report = drift_report(&records).unwrap();
        assert!(!report.dataset_drift);
    }
}
