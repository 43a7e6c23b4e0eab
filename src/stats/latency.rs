//! Latency sample accumulation and distribution summary.

use crate::utils::ChaseError;

use statistical::{mean, population_standard_deviation, population_variance};

/// Minimum sample count for the tail percentiles to be reported.
pub const TAIL_MIN_SAMPLES: usize = 100;

/// Accumulator of latency samples in microseconds.
#[derive(Debug, Default, Clone)]
pub struct LatencyStats {
    /// Samples in recording order.
    samples: Vec<f64>,
}

impl LatencyStats {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        LatencyStats {
            samples: Vec::new(),
        }
    }

    /// Creates an empty accumulator with room for `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        LatencyStats {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Records one sample.
    #[inline]
    pub fn record(&mut self, lat_us: f64) {
        self.samples.push(lat_us);
    }

    /// Gets all samples in recording order.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Number of samples recorded.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Summarizes all recorded samples.
    pub fn summarize(&self) -> Result<LatencyReport, ChaseError> {
        summarize(&self.samples)
    }
}

/// Distribution summary of a latency sample set.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyReport {
    pub count: usize,
    pub mean: f64,
    pub variance: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub p1: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub p99: f64,
    pub iqr: f64,

    /// Tukey fence `p25 - 1.5 * iqr`.
    pub lower_fence: f64,

    /// Tukey fence `p75 + 1.5 * iqr`.
    pub upper_fence: f64,

    /// Smallest sample strictly above the lower fence.
    pub lower_iqr: f64,

    /// Largest sample not above the upper fence.
    pub upper_iqr: f64,
}

/// Index of the `pct`-th percentile in a sorted sequence of `n` samples:
/// `floor(n * pct / 100) - 1`, clamped to the first sample.
#[inline]
fn pct_index(n: usize, pct: usize) -> usize {
    (n * pct / 100).saturating_sub(1)
}

/// Computes the distribution summary of `samples`. Everything is derived
/// from a sorted copy, so the result does not depend on input order. Fails
/// only on an empty input.
pub fn summarize(samples: &[f64]) -> Result<LatencyReport, ChaseError> {
    if samples.is_empty() {
        return Err(ChaseError::msg("no latency samples to summarize"));
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();

    let avg = mean(&sorted);
    let (variance, stddev) = if n > 1 {
        (
            population_variance(&sorted, Some(avg)),
            population_standard_deviation(&sorted, Some(avg)),
        )
    } else {
        (0.0, 0.0)
    };

    let p25 = sorted[pct_index(n, 25)];
    let p50 = sorted[pct_index(n, 50)];
    let p75 = sorted[pct_index(n, 75)];
    let (p1, p5, p95, p99) = if n >= TAIL_MIN_SAMPLES {
        (
            sorted[pct_index(n, 1)],
            sorted[pct_index(n, 5)],
            sorted[pct_index(n, 95)],
            sorted[pct_index(n, 99)],
        )
    } else {
        (0.0, 0.0, 0.0, 0.0)
    };

    let iqr = p75 - p25;
    let lower_fence = p25 - 1.5 * iqr;
    let upper_fence = p75 + 1.5 * iqr;

    // falls back to the maximum if nothing is above the lower fence
    let lower_iqr = sorted
        .iter()
        .copied()
        .find(|&v| v > lower_fence)
        .unwrap_or(sorted[n - 1]);
    let upper_iqr = sorted
        .iter()
        .copied()
        .take_while(|&v| v <= upper_fence)
        .last()
        .unwrap_or(sorted[0]);

    Ok(LatencyReport {
        count: n,
        mean: avg,
        variance,
        stddev,
        min: sorted[0],
        max: sorted[n - 1],
        p1,
        p5,
        p25,
        p50,
        p75,
        p95,
        p99,
        iqr,
        lower_fence,
        upper_fence,
        lower_iqr,
        upper_iqr,
    })
}

impl LatencyReport {
    /// Tab-separated summary row, prefixed by `#`:
    /// elements, queries per pass, value size, mean, min, max, p1, p5, p25,
    /// p50, p75, p95, p99, lower IQR, upper IQR, stddev.
    pub fn summary_row(
        &self,
        num_elements: usize,
        num_queries: usize,
        value_size: usize,
    ) -> String {
        format!(
            "#{}\t{}\t{}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}",
            num_elements,
            num_queries,
            value_size,
            self.mean,
            self.min,
            self.max,
            self.p1,
            self.p5,
            self.p25,
            self.p50,
            self.p75,
            self.p95,
            self.p99,
            self.lower_iqr,
            self.upper_iqr,
            self.stddev
        )
    }

    /// Human-readable report lines.
    pub fn report_lines(&self, value_size: usize) -> Vec<String> {
        vec![
            format!("iqr: {:.6}", self.iqr),
            format!("Size[B]: {}", value_size),
            format!("Duration[us]: {:.6}", self.mean),
            format!("Min: {:.6}", self.min),
            format!("Max: {:.6}", self.max),
            format!("Median: {:.6}", self.p50),
            format!("1th: {:.6}", self.p1),
            format!("5th: {:.6}", self.p5),
            format!("25th: {:.6}", self.p25),
            format!("75th: {:.6}", self.p75),
            format!("95th: {:.6}", self.p95),
            format!("99th: {:.6}", self.p99),
            format!("Lower IQR: {:.6}", self.lower_iqr),
            format!("Upper IQR: {:.6}", self.upper_iqr),
            format!("Duration stddev: {:.6}", self.stddev),
        ]
    }

    /// Prints the human-readable report followed by the summary row.
    pub fn print(
        &self,
        num_elements: usize,
        num_queries: usize,
        value_size: usize,
    ) {
        for line in self.report_lines(value_size) {
            println!("{}", line);
        }
        println!(
            "{}",
            self.summary_row(num_elements, num_queries, value_size)
        );
    }
}

#[cfg(test)]
mod latency_tests {
    use super::*;
    use rand::seq::SliceRandom;

    fn one_to(n: usize) -> Vec<f64> {
        (1..=n).map(|v| v as f64).collect()
    }

    #[test]
    fn summarize_one_to_128() -> Result<(), ChaseError> {
        let report = summarize(&one_to(128))?;
        assert_eq!(report.count, 128);
        assert_eq!(report.min, 1.0);
        assert_eq!(report.max, 128.0);
        assert_eq!(report.mean, 64.5);
        assert_eq!(report.p50, 64.0);
        assert_eq!(report.p1, 1.0);
        assert_eq!(report.p5, 6.0);
        assert_eq!(report.p25, 32.0);
        assert_eq!(report.p75, 96.0);
        assert_eq!(report.p95, 121.0);
        assert_eq!(report.p99, 126.0);
        assert_eq!(report.iqr, 64.0);
        assert_eq!(report.lower_fence, -64.0);
        assert_eq!(report.upper_fence, 192.0);
        assert_eq!(report.lower_iqr, 1.0);
        assert_eq!(report.upper_iqr, 128.0);
        // population variance of 1..=n is (n^2 - 1) / 12
        assert!((report.variance - (128.0 * 128.0 - 1.0) / 12.0).abs() < 1e-9);
        assert!((report.stddev - report.variance.sqrt()).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn sort_invariant() -> Result<(), ChaseError> {
        let mut samples: Vec<f64> =
            (0..500).map(|v| (v as f64) * 0.37 + 1.0 / (v as f64 + 3.0)).collect();
        let sorted_report = summarize(&samples)?;
        samples.shuffle(&mut rand::thread_rng());
        assert_eq!(summarize(&samples)?, sorted_report);
        samples.reverse();
        assert_eq!(summarize(&samples)?, sorted_report);
        Ok(())
    }

    #[test]
    fn tail_sentinel_below_100() -> Result<(), ChaseError> {
        let report = summarize(&one_to(99))?;
        assert_eq!(report.p1, 0.0);
        assert_eq!(report.p5, 0.0);
        assert_eq!(report.p95, 0.0);
        assert_eq!(report.p99, 0.0);
        assert_eq!(report.p50, 49.0);

        let report = summarize(&one_to(100))?;
        assert_eq!(report.p1, 1.0);
        assert_eq!(report.p99, 99.0);
        Ok(())
    }

    #[test]
    fn single_sample() -> Result<(), ChaseError> {
        let report = summarize(&[5.0])?;
        assert_eq!(report.count, 1);
        assert_eq!(report.mean, 5.0);
        assert_eq!(report.variance, 0.0);
        assert_eq!(report.stddev, 0.0);
        assert_eq!(report.min, 5.0);
        assert_eq!(report.max, 5.0);
        assert_eq!(report.p25, 5.0);
        assert_eq!(report.p50, 5.0);
        assert_eq!(report.p75, 5.0);
        assert_eq!(report.iqr, 0.0);
        assert_eq!(report.lower_iqr, 5.0);
        assert_eq!(report.upper_iqr, 5.0);
        Ok(())
    }

    #[test]
    fn tiny_samples_clamp() -> Result<(), ChaseError> {
        let report = summarize(&[3.0, 1.0, 2.0])?;
        assert_eq!(report.p25, 1.0);
        assert_eq!(report.p50, 1.0);
        assert_eq!(report.p75, 2.0);
        Ok(())
    }

    #[test]
    fn empty_rejected() {
        assert!(summarize(&[]).is_err());
        assert!(LatencyStats::new().summarize().is_err());
    }

    #[test]
    fn outliers_excluded_from_iqr_bounds() -> Result<(), ChaseError> {
        let mut samples = vec![10.0; 96];
        samples.extend_from_slice(&[0.5, 1000.0, 2000.0, 3000.0]);
        for (i, s) in samples.iter_mut().enumerate().take(96) {
            *s += i as f64 * 0.01;
        }
        let report = summarize(&samples)?;
        assert!(report.lower_iqr >= 10.0);
        assert!(report.upper_iqr < 11.0);
        assert_eq!(report.min, 0.5);
        assert_eq!(report.max, 3000.0);
        Ok(())
    }

    #[test]
    fn accumulator_records() -> Result<(), ChaseError> {
        let mut stats = LatencyStats::with_capacity(4);
        assert!(stats.is_empty());
        for v in [4.0, 2.0, 8.0, 6.0] {
            stats.record(v);
        }
        assert_eq!(stats.len(), 4);
        assert_eq!(stats.samples(), &[4.0, 2.0, 8.0, 6.0]);
        assert_eq!(stats.summarize()?.mean, 5.0);
        Ok(())
    }

    #[test]
    fn summary_row_format() -> Result<(), ChaseError> {
        let report = summarize(&[5.0])?;
        let row = report.summary_row(4, 1, 16);
        let cols: Vec<&str> = row.split('\t').collect();
        assert_eq!(cols.len(), 16);
        assert_eq!(cols[0], "#4");
        assert_eq!(cols[1], "1");
        assert_eq!(cols[2], "16");
        assert_eq!(cols[3], "5.000000");
        assert_eq!(cols[15], "0.000000");
        assert_eq!(report.report_lines(16).len(), 15);
        Ok(())
    }

    #[test]
    fn summary_row_counts_one_pass() -> Result<(), ChaseError> {
        // three passes of two lookups each
        let mut stats = LatencyStats::with_capacity(6);
        for lat in [4.0, 5.0, 6.0, 4.0, 5.0, 6.0] {
            stats.record(lat);
        }
        let report = stats.summarize()?;
        assert_eq!(report.count, 6);
        let row = report.summary_row(8, 2, 32);
        let cols: Vec<&str> = row.split('\t').collect();
        assert_eq!(cols[0], "#8");
        assert_eq!(cols[1], "2");
        assert_eq!(cols[2], "32");
        Ok(())
    }
}
