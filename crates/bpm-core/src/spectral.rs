//! Spectral Synthesizer
//!
//! Converts between one-sided complex spectra and real, periodic
//! time-domain waveforms, and realizes pseudorandom noise waveforms
//! from a target power spectral density.
//!
//! ## Conventions
//!
//! A spectrum of `N` bins (DC plus `N - 1` positive frequencies) maps
//! to a real record of `M = 2N - 1` samples via Hermitian symmetry:
//!
//! ```text
//! X[0]     = S[0]                 (DC)
//! X[k]     = S[k] / 2             k = 1 .. N-1
//! X[M-k]   = conj(X[k])
//! x[n]     = Re( IDFT(X) )        (unnormalized inverse)
//! ```
//!
//! With this scaling `S[k]` is the peak amplitude of the cosine
//! component at bin `k`, and the forward direction recovers it exactly,
//! so `to_frequency` and `to_time` form a consistent inverse pair.
//!
//! Noise realization consumes an explicit random source: the same
//! seeded [`rand::rngs::StdRng`] reproduces the same waveform, and two
//! calls on one generator produce independent draws. There is no hidden
//! process-global randomness anywhere in this crate.

use num_complex::Complex64;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use rustfft::{Fft, FftPlanner};
use std::fmt;
use std::sync::Arc;

use crate::types::{BpmError, BpmResult, FrequencyGrid};

/// Forward/inverse spectral transform pair for one grid size.
pub struct SpectralSynthesizer {
    /// One-sided bin count `N`.
    bins: usize,
    /// Time record length `M = 2N - 1`.
    size: usize,
    fft_forward: Arc<dyn Fft<f64>>,
    fft_inverse: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
}

impl fmt::Debug for SpectralSynthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralSynthesizer")
            .field("bins", &self.bins)
            .field("size", &self.size)
            .finish()
    }
}

/// A realized noise waveform together with its one-sided spectrum.
///
/// The spectrum is kept so that a downstream cascade stage can propagate
/// the same realization instead of drawing a fresh one.
#[derive(Debug, Clone)]
pub struct NoiseRealization {
    /// Real time-domain noise record, length `2N - 1`.
    pub waveform: Vec<f64>,
    /// One-sided complex spectrum of the realization.
    pub spectrum: Vec<Complex64>,
}

impl SpectralSynthesizer {
    /// Create a synthesizer for a grid of `bins` one-sided bins.
    pub fn new(bins: usize) -> Self {
        let size = 2 * bins - 1;
        let mut planner = FftPlanner::new();
        let fft_forward = planner.plan_fft_forward(size);
        let fft_inverse = planner.plan_fft_inverse(size);
        let scratch_len = fft_forward
            .get_inplace_scratch_len()
            .max(fft_inverse.get_inplace_scratch_len());
        let scratch = vec![Complex64::new(0.0, 0.0); scratch_len];

        Self {
            bins,
            size,
            fft_forward,
            fft_inverse,
            scratch,
        }
    }

    /// Create a synthesizer matched to a frequency grid.
    pub fn for_grid(grid: &FrequencyGrid) -> Self {
        Self::new(grid.len())
    }

    /// One-sided bin count.
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Time record length `2N - 1`.
    pub fn record_len(&self) -> usize {
        self.size
    }

    /// Synthesize the real waveform of a one-sided complex spectrum.
    pub fn synthesize(&mut self, spectrum: &[Complex64]) -> BpmResult<Vec<f64>> {
        if spectrum.len() != self.bins {
            return Err(BpmError::LengthMismatch {
                what: "spectrum",
                expected: self.bins,
                actual: spectrum.len(),
            });
        }

        let mut full = vec![Complex64::new(0.0, 0.0); self.size];
        full[0] = spectrum[0];
        for k in 1..self.bins {
            let half = spectrum[k] * 0.5;
            full[k] = half;
            full[self.size - k] = half.conj();
        }

        self.fft_inverse
            .process_with_scratch(&mut full, &mut self.scratch);

        Ok(full.iter().map(|c| c.re).collect())
    }

    /// Forward-transform a real waveform into its one-sided spectrum.
    pub fn analyze(&mut self, waveform: &[f64]) -> BpmResult<Vec<Complex64>> {
        if waveform.len() != self.size {
            return Err(BpmError::LengthMismatch {
                what: "waveform",
                expected: self.size,
                actual: waveform.len(),
            });
        }

        let mut buffer: Vec<Complex64> = waveform
            .iter()
            .map(|&x| Complex64::new(x, 0.0))
            .collect();
        self.fft_forward
            .process_with_scratch(&mut buffer, &mut self.scratch);

        let m = self.size as f64;
        let mut spectrum = Vec::with_capacity(self.bins);
        spectrum.push(buffer[0] / m);
        for k in 1..self.bins {
            spectrum.push(buffer[k] * (2.0 / m));
        }
        Ok(spectrum)
    }

    /// Reconstruct a waveform from per-bin amplitude and phase.
    pub fn to_time(&mut self, amplitude: &[f64], phase: &[f64]) -> BpmResult<Vec<f64>> {
        if amplitude.len() != phase.len() {
            return Err(BpmError::LengthMismatch {
                what: "phase",
                expected: amplitude.len(),
                actual: phase.len(),
            });
        }
        let spectrum: Vec<Complex64> = amplitude
            .iter()
            .zip(phase.iter())
            .map(|(&a, &p)| Complex64::from_polar(a, p))
            .collect();
        self.synthesize(&spectrum)
    }

    /// Decompose a waveform into per-bin amplitude and phase.
    pub fn to_frequency(&mut self, waveform: &[f64]) -> BpmResult<(Vec<f64>, Vec<f64>)> {
        let spectrum = self.analyze(waveform)?;
        let amplitude = spectrum.iter().map(|c| c.norm()).collect();
        let phase = spectrum.iter().map(|c| c.arg()).collect();
        Ok((amplitude, phase))
    }

    /// Realize a pseudorandom noise waveform with the given one-sided PSD.
    ///
    /// Draws `2N - 1` independent normal samples scaled by `sqrt(Fs)`,
    /// transforms them to the frequency domain, rescales each bin's
    /// magnitude by `sqrt(psd[bin])` while keeping the drawn random
    /// phase, and synthesizes back to the time domain.
    pub fn noise_waveform<R: Rng + ?Sized>(
        &mut self,
        psd: &[f64],
        sampling_rate: f64,
        rng: &mut R,
    ) -> BpmResult<NoiseRealization> {
        if psd.len() != self.bins {
            return Err(BpmError::LengthMismatch {
                what: "noise PSD",
                expected: self.bins,
                actual: psd.len(),
            });
        }
        if let Some((bin, &value)) = psd.iter().enumerate().find(|(_, &v)| v < 0.0) {
            return Err(BpmError::NegativePsd { bin, value });
        }

        let normal = Normal::new(0.0, 1.0).expect("unit normal is valid");
        let scale = sampling_rate.sqrt();
        let white: Vec<f64> = (0..self.size)
            .map(|_| normal.sample(rng) * scale)
            .collect();

        let mut spectrum = self.analyze(&white)?;
        for (s, &p) in spectrum.iter_mut().zip(psd.iter()) {
            *s *= p.sqrt();
        }
        let waveform = self.synthesize(&spectrum)?;

        Ok(NoiseRealization { waveform, spectrum })
    }
}
