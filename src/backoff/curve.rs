//! Precomputed backoff curve with bounded jitter and a saturation latch.

use parking_lot::Mutex;
use rand::Rng;
use tracing::trace;

use crate::error::{FloodgateError, Result};

/// Tuning knobs for a [`BackoffCurve`].
///
/// The defaults reproduce the numeric behavior the curve has always had;
/// compatibility tests pin exact values through them. Delays are in
/// seconds.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Growth base of the exponential curve. Also used as the starting
    /// exponent, so the curve begins at `base^base`.
    pub base: f64,
    /// Lower clamp for every produced delay.
    pub min_delay: f64,
    /// Upper clamp for every produced delay, and the saturation point of
    /// the latch.
    pub max_delay: f64,
    /// Attempt cap. Sampling past this index is an error.
    pub max_attempts: u32,
    /// Number of pre-jittered samples held per attempt.
    pub pool_size: usize,
    /// Decimal places kept in final delay values.
    pub precision: u32,
    /// Upper bound of the jitter exponent draw (π/2 rounded to 3 places).
    pub jitter_exp_limit: f64,
    /// Multiplier deriving the jitter threshold from `e^jitter_exp_limit`.
    pub jitter_threshold_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: 2.0,
            min_delay: 0.01,
            max_delay: 302_400.012,
            max_attempts: 100,
            pool_size: 33,
            precision: 3,
            jitter_exp_limit: 1.571,
            jitter_threshold_factor: 1.111,
        }
    }
}

impl BackoffConfig {
    /// Raw delays above this value are eligible for jitter; at or below
    /// it, jitter is never applied.
    pub fn jitter_threshold(&self) -> f64 {
        self.jitter_exp_limit.exp() * self.jitter_threshold_factor
    }

    fn validate(&self) -> Result<()> {
        if self.base <= 1.0 {
            return Err(FloodgateError::Config(format!(
                "backoff base must exceed 1, got {}",
                self.base
            )));
        }
        if !(self.min_delay > 0.0 && self.min_delay < self.max_delay) {
            return Err(FloodgateError::Config(format!(
                "backoff delay bounds must satisfy 0 < min < max, got [{}, {}]",
                self.min_delay, self.max_delay
            )));
        }
        if self.max_attempts < 2 {
            return Err(FloodgateError::Config(format!(
                "backoff attempt cap must be at least 2, got {}",
                self.max_attempts
            )));
        }
        if self.pool_size == 0 {
            return Err(FloodgateError::Config(
                "backoff pool size must be non-zero".to_string(),
            ));
        }
        if self.jitter_exp_limit <= self.min_delay {
            return Err(FloodgateError::Config(format!(
                "jitter exponent limit must exceed min_delay, got {}",
                self.jitter_exp_limit
            )));
        }
        Ok(())
    }
}

/// A precomputed, monotonic delay curve indexed by attempt number.
///
/// Construction derives the raw curve from an exponential-growth formula in
/// log-space, then fills a fixed-size pool of pre-jittered variants per
/// attempt so [`pooled_sample`](Self::pooled_sample) costs one random
/// lookup instead of recomputing curve and jitter on every retry.
///
/// The tables are immutable and safe to read from any number of threads or
/// tasks. The only mutable state is the saturation latch: once
/// [`sample`](Self::sample) produces `max_delay`, every later `sample`
/// call returns `max_delay` for the rest of the instance's life, bounding
/// worst-case growth for long-lived retry loops. Pooled sampling ignores
/// the latch entirely.
pub struct BackoffCurve {
    config: BackoffConfig,
    /// Threshold derived once from the config.
    jitter_threshold: f64,
    /// Raw clamped delays; slot 0 is unreachable (attempt 0 short-circuits).
    curve: Vec<f64>,
    /// Pre-jittered sample pools, indexed by attempt like `curve`.
    pools: Vec<Vec<f64>>,
    /// Saturation latch; written only by `sample`.
    last_value: Mutex<Option<f64>>,
}

impl BackoffCurve {
    /// Build a curve from the given configuration.
    pub fn new(config: BackoffConfig) -> Result<Self> {
        config.validate()?;

        let attempts = config.max_attempts as usize;
        let top_exponent = config.max_delay.log(config.base);
        let step = (top_exponent - config.base) / (attempts as f64 - 1.0);

        let mut curve = Vec::with_capacity(attempts + 1);
        curve.push(0.0);
        for attempt in 1..=attempts {
            let exponent = config.base + attempt as f64 * step;
            let raw = config.base.powf(exponent);
            curve.push(raw.clamp(config.min_delay, config.max_delay));
        }

        let jitter_threshold = config.jitter_threshold();
        let mut rng = rand::thread_rng();
        let mut pools = Vec::with_capacity(attempts + 1);
        pools.push(Vec::new());
        for attempt in 1..=attempts {
            let raw = curve[attempt];
            let pool = (0..config.pool_size)
                .map(|_| {
                    let jittered = apply_threshold_jitter(raw, jitter_threshold, &config, &mut rng);
                    conform(jittered, &config)
                })
                .collect();
            pools.push(pool);
        }

        Ok(Self {
            config,
            jitter_threshold,
            curve,
            pools,
            last_value: Mutex::new(None),
        })
    }

    /// The configuration this curve was built from.
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// The unjittered clamped curve value for an attempt, if one exists.
    pub fn raw(&self, attempt: u32) -> Option<f64> {
        if attempt == 0 || attempt > self.config.max_attempts {
            return None;
        }
        Some(self.curve[attempt as usize])
    }

    /// Sample the curve for a retry attempt.
    ///
    /// Returns `Ok(None)` ("no delay") for `attempt == 0`, and fails with
    /// [`FloodgateError::AttemptsExhausted`] past the attempt cap. When the
    /// saturation latch is set the result is `max_delay` regardless of
    /// `attempt`.
    ///
    /// Jitter is asymmetric and threshold-gated: it is applied only when
    /// requested and the raw value exceeds the jitter threshold. At or
    /// below the threshold the result is the exact clamped curve value,
    /// deterministically, even when jitter was requested.
    pub fn sample(&self, attempt: u32, jitter: bool) -> Result<Option<f64>> {
        if attempt > self.config.max_attempts {
            return Err(FloodgateError::AttemptsExhausted {
                attempt,
                max_attempts: self.config.max_attempts,
            });
        }

        let mut last_value = self.last_value.lock();
        if let Some(last) = *last_value {
            if last >= self.config.max_delay {
                return Ok(Some(conform(self.config.max_delay, &self.config)));
            }
        }

        if attempt == 0 {
            return Ok(None);
        }

        let raw = self.curve[attempt as usize];
        if raw <= 0.0 {
            return Err(FloodgateError::CurveRange { attempt });
        }

        let mut rng = rand::thread_rng();
        let result = if jitter {
            apply_threshold_jitter(raw, self.jitter_threshold, &self.config, &mut rng)
        } else {
            raw
        };

        let value = conform(result, &self.config);
        *last_value = Some(value);

        trace!(attempt, value, "Sampled backoff curve");
        Ok(Some(value))
    }

    /// Draw a delay from the precomputed pool for an attempt.
    ///
    /// `None` (or `Some(0)`, meaning "no previous attempt") substitutes a
    /// uniformly random attempt in `[2, 4]`, avoiding the smallest and
    /// least representative pool. When `jitter` is requested the drawn
    /// value is scaled by a fresh multiplicative factor
    /// `uniform(1, e) / uniform(1, π)`, concentrated near 1.
    ///
    /// This entry point never consults or updates the saturation latch.
    pub fn pooled_sample(&self, attempt: Option<u32>, jitter: bool) -> Result<f64> {
        if let Some(requested) = attempt {
            if requested > self.config.max_attempts {
                return Err(FloodgateError::AttemptsExhausted {
                    attempt: requested,
                    max_attempts: self.config.max_attempts,
                });
            }
        }

        let mut rng = rand::thread_rng();
        let attempt = match attempt {
            Some(requested) if requested > 0 => requested,
            _ => rng.gen_range(2..=4.min(self.config.max_attempts)),
        };

        let pool = &self.pools[attempt as usize];
        let mut result = pool[rng.gen_range(0..pool.len())];
        if jitter {
            result *= rand_factor(&mut rng);
        }

        let value = conform(result, &self.config);
        trace!(attempt, value, "Drew pooled backoff sample");
        Ok(value)
    }
}

/// Multiplicative jitter factor, the ratio of two independent bounded
/// draws, roughly within `[1/π, e]`.
fn rand_factor<R: Rng>(rng: &mut R) -> f64 {
    rng.gen_range(1.0..std::f64::consts::E) / rng.gen_range(1.0..std::f64::consts::PI)
}

/// Additive jitter, applied only above the threshold.
fn apply_threshold_jitter<R: Rng>(
    raw: f64,
    threshold: f64,
    config: &BackoffConfig,
    rng: &mut R,
) -> f64 {
    if raw <= threshold {
        return raw;
    }
    let exponent = rng.gen_range(config.min_delay..config.jitter_exp_limit);
    let jitter = exponent.exp();
    if rng.gen_bool(0.5) {
        raw + jitter
    } else {
        raw - jitter
    }
}

/// Clamp into the configured range and round to the configured precision.
fn conform(value: f64, config: &BackoffConfig) -> f64 {
    let clamped = value.clamp(config.min_delay, config.max_delay);
    let factor = 10f64.powi(config.precision as i32);
    (clamped * factor).round() / factor
}
