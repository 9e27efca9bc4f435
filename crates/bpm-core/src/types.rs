//! Core types for the BPM signal-path simulator
//!
//! This module defines the fundamental types shared by the spectral
//! synthesizer, the cascade propagator and the coverage solver: the
//! uniform frequency grid, one-sided spectra, and the crate error type.
//!
//! ## One-sided spectra and the odd-length record convention
//!
//! A real, periodic, bandlimited waveform of odd length `M = 2N - 1` is
//! fully described by a one-sided spectrum of `N` complex bins: the DC
//! bin plus `N - 1` positive frequencies. The grid spacing `df` implies
//! an effective sampling rate
//!
//! ```text
//! Fs = 2 * f_max + df = (2N - 1) * df
//! ```
//!
//! so that grid, spectrum and time record always agree on the record
//! length. All spectral quantities in this crate live on such a grid.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Type alias for complex numbers using f64 precision.
pub type Complex = Complex64;

/// A one-sided complex spectrum (bin 0 is DC).
pub type Spectrum = Vec<Complex64>;

/// A real time-domain waveform.
pub type Waveform = Vec<f64>;

/// A one-sided noise power spectral density, one value per grid bin.
pub type NoisePsd = Vec<f64>;

/// Transverse beam offset `(x, y)` in the chamber cross-section plane.
pub type BeamPosition = (f64, f64);

/// Per-button coverage factors in quadrant order `{+x+y, -x+y, -x-y, +x-y}`.
pub type CoverageFactor = [f64; 4];

/// Result type for simulator operations.
pub type BpmResult<T> = Result<T, BpmError>;

/// Errors that can occur while building geometry or propagating signals.
///
/// All variants are structural/configuration errors: this is a
/// deterministic numerical pipeline and nothing here is retryable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BpmError {
    #[error("frequency grid needs at least 2 bins, got {0}")]
    GridTooShort(usize),

    #[error("frequency grid is not uniform at bin {bin}: step {step}, expected {expected}")]
    NonUniformGrid { bin: usize, step: f64, expected: f64 },

    #[error("frequency grid must start at DC, first bin is {0} Hz")]
    GridNotAtDc(f64),

    #[error("{what}: expected {expected} bins, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("noise PSD must be non-negative, bin {bin} is {value}")]
    NegativePsd { bin: usize, value: f64 },

    #[error("invalid chamber geometry: {0}")]
    InvalidChamber(String),

    #[error("button distance is required for non-circular chambers")]
    MissingButtonDistance,

    #[error("beam position ({x}, {y}) lies outside the chamber")]
    BeamOutsideChamber { x: f64, y: f64 },
}

/// Strictly increasing, uniformly spaced frequency grid starting at DC.
///
/// Bin `k` maps to frequency `k * df`. The grid fixes the sampling rate
/// and the reconstructed record length for every spectrum defined on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyGrid {
    freqs: Vec<f64>,
    df: f64,
}

impl FrequencyGrid {
    /// Build a grid from an explicit frequency vector.
    ///
    /// Fails fast if the vector is too short, does not start at DC, or
    /// is not uniformly increasing.
    pub fn new(freqs: Vec<f64>) -> BpmResult<Self> {
        if freqs.len() < 2 {
            return Err(BpmError::GridTooShort(freqs.len()));
        }
        let df = freqs[1] - freqs[0];
        if df <= 0.0 {
            return Err(BpmError::NonUniformGrid {
                bin: 1,
                step: df,
                expected: df.abs(),
            });
        }
        if freqs[0].abs() > 1e-9 * df {
            return Err(BpmError::GridNotAtDc(freqs[0]));
        }
        for (i, pair) in freqs.windows(2).enumerate() {
            let step = pair[1] - pair[0];
            if (step - df).abs() > 1e-9 * df {
                return Err(BpmError::NonUniformGrid {
                    bin: i + 1,
                    step,
                    expected: df,
                });
            }
        }
        Ok(Self { freqs, df })
    }

    /// Build a grid of `bins` bins with spacing `df`, starting at DC.
    pub fn from_spacing(df: f64, bins: usize) -> BpmResult<Self> {
        if bins < 2 {
            return Err(BpmError::GridTooShort(bins));
        }
        if df <= 0.0 {
            return Err(BpmError::NonUniformGrid {
                bin: 1,
                step: df,
                expected: df.abs(),
            });
        }
        let freqs = (0..bins).map(|k| k as f64 * df).collect();
        Ok(Self { freqs, df })
    }

    /// Number of one-sided bins `N`.
    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    /// True if the grid is empty (cannot happen for a validated grid).
    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }

    /// Bin spacing `df` in Hz.
    pub fn df(&self) -> f64 {
        self.df
    }

    /// Highest grid frequency.
    pub fn f_max(&self) -> f64 {
        *self.freqs.last().expect("validated grid is non-empty")
    }

    /// Effective sampling rate `Fs = 2 * f_max + df`.
    pub fn sampling_rate(&self) -> f64 {
        2.0 * self.f_max() + self.df
    }

    /// Length of the reconstructed time record, `2N - 1` (always odd).
    pub fn record_len(&self) -> usize {
        2 * self.freqs.len() - 1
    }

    /// The grid frequencies.
    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    /// Sample instants `t_n = n / Fs` of the reconstructed record.
    pub fn time_vector(&self) -> Vec<f64> {
        let fs = self.sampling_rate();
        (0..self.record_len()).map(|n| n as f64 / fs).collect()
    }

    /// Check a per-bin quantity against the grid length.
    pub fn check_len(&self, what: &'static str, len: usize) -> BpmResult<()> {
        if len != self.freqs.len() {
            return Err(BpmError::LengthMismatch {
                what,
                expected: self.freqs.len(),
                actual: len,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_from_spacing() {
        let grid = FrequencyGrid::from_spacing(1e6, 101).unwrap();
        assert_eq!(grid.len(), 101);
        assert_eq!(grid.record_len(), 201);
        assert!((grid.f_max() - 100e6).abs() < 1.0);
        assert!((grid.sampling_rate() - 201e6).abs() < 1.0);
    }

    #[test]
    fn test_grid_rejects_short() {
        assert!(FrequencyGrid::from_spacing(1e6, 1).is_err());
        assert!(FrequencyGrid::new(vec![0.0]).is_err());
    }

    #[test]
    fn test_grid_rejects_non_uniform() {
        let err = FrequencyGrid::new(vec![0.0, 1.0, 2.5, 3.0]);
        assert!(matches!(err, Err(BpmError::NonUniformGrid { bin: 2, .. })));
    }

    #[test]
    fn test_grid_rejects_offset_start() {
        let err = FrequencyGrid::new(vec![5.0, 6.0, 7.0]);
        assert!(matches!(err, Err(BpmError::GridNotAtDc(_))));
    }

    #[test]
    fn test_time_vector_matches_record() {
        let grid = FrequencyGrid::from_spacing(0.5e6, 64).unwrap();
        let t = grid.time_vector();
        assert_eq!(t.len(), grid.record_len());
        assert_eq!(t[0], 0.0);
        let dt = t[1] - t[0];
        assert!((dt - 1.0 / grid.sampling_rate()).abs() < 1e-18);
    }

    #[test]
    fn test_check_len() {
        let grid = FrequencyGrid::from_spacing(1.0, 8).unwrap();
        assert!(grid.check_len("spectrum", 8).is_ok());
        assert!(grid.check_len("spectrum", 7).is_err());
    }
}
