use std::collections::VecDeque;
use std::str::FromStr;

use crate::error::PipelineError;

/// Estimator family used for rolling skewness and kurtosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MomentEstimator {
    /// Moment ratios `m3 / m2^1.5` and `m4 / m2^2 - 3`, with `m_k = Σ(x - x̄)^k / n`.
    #[default]
    Biased,
    /// Fisher-Pearson bias-corrected G1 and G2.
    Adjusted,
}

impl FromStr for MomentEstimator {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "biased" | "moment" => Ok(Self::Biased),
            "adjusted" | "unbiased" => Ok(Self::Adjusted),
            other => Err(PipelineError::Config(format!(
                "unknown moment estimator: {}",
                other
            ))),
        }
    }
}

/// Fixed-size trailing window over a numeric sequence.
///
/// Statistics are only reported once the window holds `size` values, so a
/// caller feeding one value per bar gets `None` for the first `size - 1` bars.
/// Each statistic is recomputed from the buffered values, mean first, which
/// keeps the higher moments stable for price-scale inputs.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    size: usize,
}

struct Moments {
    m2: f64,
    m3: f64,
    m4: f64,
}

impl RollingWindow {
    /// Creates an empty window.
    ///
    /// # Arguments
    /// * `size`: Number of trailing values each statistic covers. A zero-size
    ///   window never reports a statistic.
    pub fn new(size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(size),
            size,
        }
    }

    /// Appends a value, evicting the oldest one once the window is full.
    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        if self.values.len() > self.size {
            self.values.pop_front();
        }
    }

    /// True once `size` values have been pushed.
    pub fn is_full(&self) -> bool {
        self.size > 0 && self.values.len() == self.size
    }

    /// Arithmetic mean of the window, `None` until it is full.
    pub fn mean(&self) -> Option<f64> {
        if !self.is_full() {
            return None;
        }
        finite(self.values.iter().sum::<f64>() / self.size as f64)
    }

    /// Bessel-corrected standard deviation.
    pub fn sample_std(&self) -> Option<f64> {
        if !self.is_full() || self.size < 2 {
            return None;
        }
        let mean = self.mean()?;
        let sum_sq: f64 = self.values.iter().map(|v| (v - mean).powi(2)).sum();
        finite((sum_sq / (self.size - 1) as f64).sqrt())
    }

    pub fn skewness(&self, estimator: MomentEstimator) -> Option<f64> {
        let m = self.moments()?;
        let g1 = m.m3 / m.m2.powf(1.5);
        let n = self.size as f64;

        match estimator {
            MomentEstimator::Biased => finite(g1),
            MomentEstimator::Adjusted => {
                if self.size < 3 {
                    return None;
                }
                finite(g1 * (n * (n - 1.0)).sqrt() / (n - 2.0))
            }
        }
    }

    /// Excess kurtosis: zero for a normal distribution.
    pub fn excess_kurtosis(&self, estimator: MomentEstimator) -> Option<f64> {
        let m = self.moments()?;
        let g2 = m.m4 / (m.m2 * m.m2) - 3.0;
        let n = self.size as f64;

        match estimator {
            MomentEstimator::Biased => finite(g2),
            MomentEstimator::Adjusted => {
                if self.size < 4 {
                    return None;
                }
                finite(((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0)))
            }
        }
    }

    /// Central moments of a full window. `None` when the window is not full
    /// or its variance is zero at the precision of the mean.
    fn moments(&self) -> Option<Moments> {
        let mean = self.mean()?;
        let n = self.size as f64;

        let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
        for v in &self.values {
            let d = v - mean;
            let d2 = d * d;
            m2 += d2;
            m3 += d2 * d;
            m4 += d2 * d2;
        }
        let (m2, m3, m4) = (m2 / n, m3 / n, m4 / n);

        if m2 <= (f64::EPSILON * mean).powi(2) {
            return None;
        }

        Some(Moments { m2, m3, m4 })
    }
}

/// Maps non-finite arithmetic results to the undefined value.
pub(crate) fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
