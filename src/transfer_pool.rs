// Folio Storage Adaptive Transfer Pool
// Round-based chunk scheduling with a throughput-probing concurrency ramp

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::providers::ProviderError;

/// Fixed chunk size used by the upload protocol (10 MiB)
pub const CHUNK_SIZE: u64 = 10 * 1024 * 1024;
/// Wall-clock budget a round is steered towards
pub const TARGET_WINDOW_MS: u64 = 3000;
/// Hard cap on concurrently issued chunk requests
pub const MAX_PARALLEL: usize = 50;

/// How round latency is folded into the estimate for the next round
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum LatencyAveraging {
    /// Mean of the last round only; earlier rounds are discarded
    #[default]
    BatchMean,
    /// Exponentially weighted mean across rounds (`alpha` weights the newest round)
    Ewma { alpha: f64 },
}

/// Tuning for chunked uploads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelTransferConfig {
    /// Bytes per chunk (default: 10 MiB)
    pub chunk_size: u64,
    /// Target duration of one round in ms (default: 3000)
    pub target_window_ms: u64,
    /// Maximum chunks in flight per round (1-50, default: 50)
    pub max_parallel: usize,
    #[serde(default)]
    pub averaging: LatencyAveraging,
}

impl Default for ParallelTransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            target_window_ms: TARGET_WINDOW_MS,
            max_parallel: MAX_PARALLEL,
            averaging: LatencyAveraging::BatchMean,
        }
    }
}

impl ParallelTransferConfig {
    /// Upper bound on chunk bytes held in memory by one upload: a round
    /// buffers every chunk it sends until that chunk is acknowledged.
    pub fn peak_buffer_bytes(&self) -> u64 {
        self.chunk_size.max(1).saturating_mul(self.max_parallel.max(1) as u64)
    }
}

/// Validate transfer config, clamping values to safe ranges
pub fn validate_config(config: &mut ParallelTransferConfig) {
    if config.chunk_size == 0 {
        config.chunk_size = CHUNK_SIZE;
    }

    config.max_parallel = config.max_parallel.clamp(1, MAX_PARALLEL);

    if config.target_window_ms == 0 {
        config.target_window_ms = TARGET_WINDOW_MS;
    }

    if let LatencyAveraging::Ewma { alpha } = config.averaging {
        if !(alpha > 0.0 && alpha <= 1.0) {
            config.averaging = LatencyAveraging::BatchMean;
        }
    }
}

/// Number of chunks a file of `size` bytes is split into. A zero-byte file
/// still travels as one empty chunk.
///
/// Chunk indices are `u32` on the wire; a count that does not fit is an error
/// rather than a silently truncated upload.
pub fn total_chunks(size: u64, chunk_size: u64) -> Result<u32, ProviderError> {
    let chunk_size = chunk_size.max(1);
    let count = size.div_ceil(chunk_size).max(1);
    u32::try_from(count).map_err(|_| {
        ProviderError::InvalidConfig(format!(
            "{} bytes in chunks of {} bytes needs {} chunks (max {})",
            size,
            chunk_size,
            count,
            u32::MAX
        ))
    })
}

/// Concurrency estimator for the rounds of one upload.
///
/// Before the first round the estimate is empty and one chunk is sent. After
/// each round the next width is `previous width * target / mean latency`,
/// limited by the chunks remaining and by `max_parallel`.
#[derive(Debug, Clone)]
pub struct ConcurrencyRamp {
    target_window_ms: f64,
    max_parallel: usize,
    averaging: LatencyAveraging,
    avg_dt_ms: f64,
    parallel: usize,
}

impl ConcurrencyRamp {
    pub fn new(config: &ParallelTransferConfig) -> Self {
        Self {
            target_window_ms: config.target_window_ms as f64,
            max_parallel: config.max_parallel.max(1),
            averaging: config.averaging,
            avg_dt_ms: 0.0,
            parallel: 1,
        }
    }

    /// Width of the next round given the chunks still to send (`remaining >= 1`).
    pub fn next_round(&mut self, remaining: usize) -> usize {
        let predicted = if self.avg_dt_ms > 0.0 {
            self.target_window_ms / self.avg_dt_ms
        } else {
            1.0
        };
        let wanted = (predicted * self.parallel as f64).min(remaining as f64);
        let width = wanted.clamp(1.0, self.max_parallel as f64).round() as usize;
        self.parallel = width.max(1);
        self.parallel
    }

    /// Fold the per-chunk durations of a finished round into the estimate.
    pub fn record_round(&mut self, elapsed: &[Duration]) {
        if elapsed.is_empty() {
            return;
        }
        let mean = elapsed.iter().map(|d| d.as_secs_f64() * 1000.0).sum::<f64>()
            / elapsed.len() as f64;
        self.avg_dt_ms = match self.averaging {
            LatencyAveraging::BatchMean => mean,
            LatencyAveraging::Ewma { alpha } if self.avg_dt_ms > 0.0 => {
                alpha * mean + (1.0 - alpha) * self.avg_dt_ms
            }
            LatencyAveraging::Ewma { .. } => mean,
        };
    }

    pub fn avg_dt_ms(&self) -> f64 {
        self.avg_dt_ms
    }

    pub fn parallel(&self) -> usize {
        self.parallel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_validate_config_clamp_high() {
        let mut config = ParallelTransferConfig {
            max_parallel: 500,
            ..Default::default()
        };
        validate_config(&mut config);
        assert_eq!(config.max_parallel, MAX_PARALLEL);
    }

    #[test]
    fn test_validate_config_clamp_low() {
        let mut config = ParallelTransferConfig {
            chunk_size: 0,
            target_window_ms: 0,
            max_parallel: 0,
            averaging: LatencyAveraging::Ewma { alpha: 3.0 },
        };
        validate_config(&mut config);
        assert_eq!(config.max_parallel, 1);
        assert_eq!(config.chunk_size, CHUNK_SIZE);
        assert_eq!(config.target_window_ms, TARGET_WINDOW_MS);
        assert_eq!(config.averaging, LatencyAveraging::BatchMean);
    }

    #[test]
    fn test_total_chunks() {
        assert_eq!(total_chunks(0, CHUNK_SIZE).unwrap(), 1);
        assert_eq!(total_chunks(1, CHUNK_SIZE).unwrap(), 1);
        assert_eq!(total_chunks(CHUNK_SIZE, CHUNK_SIZE).unwrap(), 1);
        assert_eq!(total_chunks(CHUNK_SIZE + 1, CHUNK_SIZE).unwrap(), 2);
        assert_eq!(total_chunks(35 * 1024 * 1024, CHUNK_SIZE).unwrap(), 4);
    }

    #[test]
    fn test_peak_buffer_bytes() {
        assert_eq!(
            ParallelTransferConfig::default().peak_buffer_bytes(),
            50 * CHUNK_SIZE
        );
        let small = ParallelTransferConfig {
            chunk_size: 1024 * 1024,
            max_parallel: 4,
            ..Default::default()
        };
        assert_eq!(small.peak_buffer_bytes(), 4 * 1024 * 1024);
    }

    #[test]
    fn test_total_chunks_overflow_is_error() {
        let max = u32::MAX as u64;
        assert_eq!(total_chunks(max, 1).unwrap(), u32::MAX);
        assert!(matches!(
            total_chunks(max + 1, 1),
            Err(ProviderError::InvalidConfig(_))
        ));
        assert!(total_chunks(u64::MAX, 1).is_err());
        assert!(total_chunks(u64::MAX, CHUNK_SIZE).is_ok());
    }

    #[test]
    fn test_first_round_is_single_chunk() {
        let mut ramp = ConcurrencyRamp::new(&ParallelTransferConfig::default());
        assert_eq!(ramp.next_round(40), 1);
    }

    #[test]
    fn test_ramp_grows_multiplicatively() {
        let mut ramp = ConcurrencyRamp::new(&ParallelTransferConfig::default());
        assert_eq!(ramp.next_round(100), 1);
        ramp.record_round(&[ms(1000)]);
        // 3000 / 1000 * 1
        assert_eq!(ramp.next_round(100), 3);
        ramp.record_round(&[ms(1000), ms(1000), ms(1000)]);
        // 3000 / 1000 * 3
        assert_eq!(ramp.next_round(100), 9);
    }

    #[test]
    fn test_ramp_capped_by_remaining_and_max() {
        let mut ramp = ConcurrencyRamp::new(&ParallelTransferConfig::default());
        ramp.next_round(1000);
        ramp.record_round(&[ms(10)]);
        assert_eq!(ramp.next_round(7), 7);
        ramp.record_round(&[ms(10); 7]);
        assert_eq!(ramp.next_round(1000), MAX_PARALLEL);
    }

    #[test]
    fn test_slow_round_collapses_width() {
        let mut ramp = ConcurrencyRamp::new(&ParallelTransferConfig::default());
        ramp.next_round(100);
        ramp.record_round(&[ms(300)]);
        assert_eq!(ramp.next_round(100), 10);
        // one very slow round drags the batch mean up and the width down to 1
        ramp.record_round(&[ms(100_000); 10]);
        assert_eq!(ramp.next_round(100), 1);
    }

    #[test]
    fn test_batch_mean_discards_history() {
        let mut ramp = ConcurrencyRamp::new(&ParallelTransferConfig::default());
        ramp.record_round(&[ms(100), ms(300)]);
        assert!((ramp.avg_dt_ms() - 200.0).abs() < 1e-6);
        ramp.record_round(&[ms(50)]);
        assert!((ramp.avg_dt_ms() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_ewma_blends_rounds() {
        let config = ParallelTransferConfig {
            averaging: LatencyAveraging::Ewma { alpha: 0.5 },
            ..Default::default()
        };
        let mut ramp = ConcurrencyRamp::new(&config);
        ramp.record_round(&[ms(100)]);
        ramp.record_round(&[ms(300)]);
        assert!((ramp.avg_dt_ms() - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = ParallelTransferConfig {
            chunk_size: 1024,
            target_window_ms: 1500,
            max_parallel: 8,
            averaging: LatencyAveraging::Ewma { alpha: 0.25 },
        };
        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: ParallelTransferConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.chunk_size, 1024);
        assert_eq!(deserialized.max_parallel, 8);
        assert_eq!(deserialized.averaging, LatencyAveraging::Ewma { alpha: 0.25 });
    }
}
