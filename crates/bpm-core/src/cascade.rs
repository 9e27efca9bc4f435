//! Cascaded Signal/Noise Propagation
//!
//! Chains an ordered list of frequency-domain stage models and predicts,
//! after each stage, the propagated beam-signal waveform, the cumulative
//! frequency response, and the propagated thermal/electronic noise.
//!
//! ## Stage model
//!
//! Each stage carries a linear complex response (scalar or per-bin), an
//! optional noise factor, and an optional static nonlinearity. A missing
//! noise factor defaults to `1/G` (the stage's own power gain), which
//! models a purely dissipative element at the reference temperature. A
//! missing nonlinearity means the stage is linear.
//!
//! ## Noise bookkeeping
//!
//! Added noise follows the Friis convention at T0 = 290 K:
//!
//! ```text
//! Na_psd  = (F - 1) * k * T0 * G          (per bin)
//! NiG_psd = (psd_prev * |H|)^2            (per bin, documented form)
//! psd     = NiG_psd + Na_psd              (uncorrelated sources add)
//! ```
//!
//! The `NiG_psd` expression squares the product of the previous stage's
//! PSD value and the response magnitude. It reflects that noise at stage
//! boundaries is tracked both as a PSD value and through a realized
//! complex amplitude spectrum that is re-squared after propagation; it
//! is preserved here exactly as documented rather than replaced by the
//! textbook Friis cascade (see DESIGN.md).
//!
//! Noise waveforms are realized from the passed random source, so runs
//! are reproducible only when the caller seeds the generator; this
//! nondeterminism is part of the API contract, not hidden state.

use num_complex::Complex64;
use rand::Rng;
use tracing::debug;

use crate::constants::KT0;
use crate::spectral::SpectralSynthesizer;
use crate::types::{BpmError, BpmResult, FrequencyGrid};

/// Fixed-coefficient polynomial `c0 + c1*x + c2*x^2 + ...` applied
/// pointwise to a time-domain waveform.
///
/// Models static saturation/compression. The polynomial never modifies
/// the frequency-domain record of a stage: distortion products are not
/// fed back into the spectral accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coeffs: Vec<f64>,
}

impl Polynomial {
    /// Create a polynomial from coefficients in ascending-power order.
    pub fn new(coeffs: Vec<f64>) -> Self {
        Self { coeffs }
    }

    /// Identity map `x -> x`.
    pub fn identity() -> Self {
        Self::new(vec![0.0, 1.0])
    }

    /// Evaluate at `x` using Horner's rule.
    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
    }

    /// Apply the polynomial pointwise to a waveform.
    pub fn apply(&self, waveform: &mut [f64]) {
        for x in waveform.iter_mut() {
            *x = self.eval(*x);
        }
    }
}

/// Linear frequency response of one stage.
#[derive(Debug, Clone)]
pub enum StageResponse {
    /// Frequency-independent response.
    Scalar(Complex64),
    /// One complex value per grid bin.
    PerBin(Vec<Complex64>),
}

impl StageResponse {
    /// Unity (pass-through) response.
    pub fn unity() -> Self {
        StageResponse::Scalar(Complex64::new(1.0, 0.0))
    }

    /// Real scalar gain in voltage terms.
    pub fn scalar(gain: f64) -> Self {
        StageResponse::Scalar(Complex64::new(gain, 0.0))
    }

    /// Response at bin `k`.
    pub fn at(&self, k: usize) -> Complex64 {
        match self {
            StageResponse::Scalar(h) => *h,
            StageResponse::PerBin(h) => h[k],
        }
    }

    fn check(&self, grid: &FrequencyGrid) -> BpmResult<()> {
        match self {
            StageResponse::Scalar(_) => Ok(()),
            StageResponse::PerBin(h) => grid.check_len("stage response", h.len()),
        }
    }
}

/// One element of the analog front-end chain.
#[derive(Debug, Clone)]
pub struct Stage {
    /// Stage name, carried into the result record.
    pub name: String,
    /// Linear complex response.
    pub response: StageResponse,
    /// Noise factor at T0 = 290 K. `None` defaults to `1/G` per bin.
    pub noise_factor: Option<f64>,
    /// Static nonlinearity applied to the time-domain waveform only.
    pub nonlinearity: Option<Polynomial>,
}

impl Stage {
    /// Create a linear stage with the default (dissipative) noise model.
    pub fn new(name: &str, response: StageResponse) -> Self {
        Self {
            name: name.to_string(),
            response,
            noise_factor: None,
            nonlinearity: None,
        }
    }

    /// Set an explicit noise factor (linear, not dB).
    pub fn with_noise_factor(mut self, f: f64) -> Self {
        self.noise_factor = Some(f);
        self
    }

    /// Attach a static nonlinearity.
    pub fn with_nonlinearity(mut self, poly: Polynomial) -> Self {
        self.nonlinearity = Some(poly);
        self
    }
}

/// Immutable per-stage propagation result.
///
/// Results are produced append-only in a single forward pass; no later
/// stage ever mutates an earlier record.
#[derive(Debug, Clone)]
pub struct CascadeStageResult {
    /// Stage name (`"input"` for the raw stage 0).
    pub name: String,
    /// Product of all stage responses up to and including this one.
    pub cumulative_response: Vec<Complex64>,
    /// `cumulative_response * raw input spectrum`, per bin.
    pub signal_spectrum: Vec<Complex64>,
    /// Synthesized waveform, after the stage nonlinearity if present.
    pub signal_waveform: Vec<f64>,
    /// One-sided noise PSD at the stage output.
    pub noise_psd: Vec<f64>,
    /// One-sided spectrum of the realized noise record, consumed by the
    /// next stage for coherent propagation of this realization.
    pub noise_spectrum: Vec<Complex64>,
    /// Realized time-domain noise record.
    pub noise_waveform: Vec<f64>,
    /// Integrated RMS noise over the grid band, volts.
    pub noise_rms: f64,
}

/// Cascaded signal and noise propagation over a stage chain.
pub struct CascadePropagator;

impl CascadePropagator {
    /// Propagate a raw input spectrum and noise PSD through `stages`.
    ///
    /// Stage 0 of the returned sequence is the raw input itself: identity
    /// response, noise PSD equal to `input_noise_psd` (typically all
    /// zero). Each subsequent entry corresponds to one element of
    /// `stages`, in order.
    pub fn propagate<R: Rng + ?Sized>(
        stages: &[Stage],
        input_spectrum: &[Complex64],
        input_noise_psd: &[f64],
        grid: &FrequencyGrid,
        reference_impedance: f64,
        rng: &mut R,
    ) -> BpmResult<Vec<CascadeStageResult>> {
        grid.check_len("input spectrum", input_spectrum.len())?;
        grid.check_len("input noise PSD", input_noise_psd.len())?;
        for stage in stages {
            stage.response.check(grid)?;
        }
        if let Some((bin, &value)) = input_noise_psd.iter().enumerate().find(|(_, &v)| v < 0.0) {
            return Err(BpmError::NegativePsd { bin, value });
        }

        let bins = grid.len();
        let fs = grid.sampling_rate();
        let df = grid.df();
        let mut synth = SpectralSynthesizer::for_grid(grid);

        let mut results: Vec<CascadeStageResult> = Vec::with_capacity(stages.len() + 1);

        // Stage 0: the raw input, untouched apart from realization.
        let unity = vec![Complex64::new(1.0, 0.0); bins];
        let input_wave = synth.synthesize(input_spectrum)?;
        let input_noise = synth.noise_waveform(input_noise_psd, fs, rng)?;
        let input_rms = band_rms(input_noise_psd, reference_impedance, df);
        results.push(CascadeStageResult {
            name: "input".to_string(),
            cumulative_response: unity,
            signal_spectrum: input_spectrum.to_vec(),
            signal_waveform: input_wave,
            noise_psd: input_noise_psd.to_vec(),
            noise_spectrum: input_noise.spectrum,
            noise_waveform: input_noise.waveform,
            noise_rms: input_rms,
        });

        for stage in stages {
            let prev = results.last().expect("stage 0 always present");

            let own: Vec<Complex64> = (0..bins).map(|k| stage.response.at(k)).collect();

            let mut cumulative = Vec::with_capacity(bins);
            let mut signal_spectrum = Vec::with_capacity(bins);
            for k in 0..bins {
                let c = prev.cumulative_response[k] * own[k];
                cumulative.push(c);
                signal_spectrum.push(c * input_spectrum[k]);
            }

            let mut signal_waveform = synth.synthesize(&signal_spectrum)?;
            if let Some(poly) = &stage.nonlinearity {
                poly.apply(&mut signal_waveform);
            }

            // Per-bin noise accounting.
            let mut na_psd = Vec::with_capacity(bins);
            let mut noise_psd = Vec::with_capacity(bins);
            for k in 0..bins {
                let own_mag = own[k].norm();
                let own_g = own_mag * own_mag;
                // Default 1/G models a dissipative element; an amplifying
                // stage must declare its noise factor, so the default
                // never adds negative power.
                let added = match stage.noise_factor {
                    Some(f) => (f - 1.0) * KT0 * own_g,
                    None => (KT0 * (1.0 - own_g)).max(0.0),
                };
                let propagated = (prev.noise_psd[k] * own_mag).powi(2);
                na_psd.push(added);
                noise_psd.push(propagated + added);
            }

            // Realize the added noise fresh, propagate the previous
            // realization through the response magnitude, and sum both
            // in the time domain.
            let added_real = synth.noise_waveform(&na_psd, fs, rng)?;
            let propagated_spectrum: Vec<Complex64> = (0..bins)
                .map(|k| prev.noise_spectrum[k] * own[k].norm())
                .collect();
            let propagated_wave = synth.synthesize(&propagated_spectrum)?;
            let noise_waveform: Vec<f64> = added_real
                .waveform
                .iter()
                .zip(propagated_wave.iter())
                .map(|(a, b)| a + b)
                .collect();
            // Re-transform the summed record so downstream stages consume
            // a self-consistent complex amplitude.
            let noise_spectrum = synth.analyze(&noise_waveform)?;

            let noise_rms = band_rms(&noise_psd, reference_impedance, df);
            debug!(
                stage = %stage.name,
                noise_rms,
                "cascade stage propagated"
            );

            results.push(CascadeStageResult {
                name: stage.name.clone(),
                cumulative_response: cumulative,
                signal_spectrum,
                signal_waveform,
                noise_psd,
                noise_spectrum,
                noise_waveform,
                noise_rms,
            });
        }

        Ok(results)
    }
}

/// RMS voltage of a one-sided PSD integrated over the grid band.
fn band_rms(psd: &[f64], reference_impedance: f64, df: f64) -> f64 {
    (psd.iter().sum::<f64>() * reference_impedance * df).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::KT0;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_grid() -> FrequencyGrid {
        FrequencyGrid::from_spacing(1e6, 32).unwrap()
    }

    fn test_spectrum(grid: &FrequencyGrid) -> Vec<Complex64> {
        (0..grid.len())
            .map(|k| Complex64::from_polar(1.0 / (1.0 + k as f64), 0.3 * k as f64))
            .collect()
    }

    #[test]
    fn test_stage_zero_is_raw_input() {
        let grid = test_grid();
        let spectrum = test_spectrum(&grid);
        let psd = vec![0.0; grid.len()];
        let mut rng = StdRng::seed_from_u64(1);

        let results =
            CascadePropagator::propagate(&[], &spectrum, &psd, &grid, 50.0, &mut rng).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "input");
        assert_eq!(results[0].signal_spectrum, spectrum);
        for c in &results[0].cumulative_response {
            assert!((c - Complex64::new(1.0, 0.0)).norm() < 1e-15);
        }
    }

    #[test]
    fn test_cumulative_response_is_running_product() {
        let grid = test_grid();
        let spectrum = test_spectrum(&grid);
        let psd = vec![0.0; grid.len()];
        let mut rng = StdRng::seed_from_u64(2);

        let stages = vec![
            Stage::new("a", StageResponse::scalar(0.5)),
            Stage::new("b", StageResponse::Scalar(Complex64::new(0.0, 2.0))),
        ];
        let results =
            CascadePropagator::propagate(&stages, &spectrum, &psd, &grid, 50.0, &mut rng).unwrap();
        assert_eq!(results.len(), 3);
        for k in 0..grid.len() {
            let expected = Complex64::new(0.5, 0.0) * Complex64::new(0.0, 2.0);
            assert!((results[2].cumulative_response[k] - expected).norm() < 1e-12);
            let sig = results[2].cumulative_response[k] * spectrum[k];
            assert!((results[2].signal_spectrum[k] - sig).norm() < 1e-12);
        }
    }

    #[test]
    fn test_cascade_linearity_under_input_scaling() {
        let grid = test_grid();
        let spectrum = test_spectrum(&grid);
        let scaled: Vec<Complex64> = spectrum.iter().map(|s| s * 3.0).collect();
        let psd = vec![1e-18; grid.len()];

        let stages = vec![
            Stage::new("cable", StageResponse::scalar(0.7)),
            Stage::new("amp", StageResponse::scalar(10.0)).with_noise_factor(2.0),
        ];

        // Same seed: noise draws identical, signal scales exactly.
        let base = CascadePropagator::propagate(
            &stages, &spectrum, &psd, &grid, 50.0, &mut StdRng::seed_from_u64(3),
        )
        .unwrap();
        let big = CascadePropagator::propagate(
            &stages, &scaled, &psd, &grid, 50.0, &mut StdRng::seed_from_u64(3),
        )
        .unwrap();

        for (b, s) in base.iter().zip(big.iter()) {
            for k in 0..grid.len() {
                assert!((s.signal_spectrum[k] - b.signal_spectrum[k] * 3.0).norm() < 1e-9);
            }
            for (wb, ws) in b.signal_waveform.iter().zip(s.signal_waveform.iter()) {
                assert!((ws - wb * 3.0).abs() < 1e-9);
            }
            // Noise accounting does not depend on the signal level.
            assert_eq!(b.noise_psd, s.noise_psd);
        }
    }

    #[test]
    fn test_nonlinearity_breaks_scaling_in_time_only() {
        let grid = test_grid();
        let spectrum = test_spectrum(&grid);
        let scaled: Vec<Complex64> = spectrum.iter().map(|s| s * 2.0).collect();
        let psd = vec![0.0; grid.len()];

        // Cubic compression term.
        let stages = vec![Stage::new("limiter", StageResponse::unity())
            .with_nonlinearity(Polynomial::new(vec![0.0, 1.0, 0.0, -0.2]))];

        let base = CascadePropagator::propagate(
            &stages, &spectrum, &psd, &grid, 50.0, &mut StdRng::seed_from_u64(4),
        )
        .unwrap();
        let big = CascadePropagator::propagate(
            &stages, &scaled, &psd, &grid, 50.0, &mut StdRng::seed_from_u64(4),
        )
        .unwrap();

        // The frequency-domain record still scales linearly...
        for k in 0..grid.len() {
            assert!((big[1].signal_spectrum[k] - base[1].signal_spectrum[k] * 2.0).norm() < 1e-9);
        }
        // ...but the waveform does not.
        let max_dev = base[1]
            .signal_waveform
            .iter()
            .zip(big[1].signal_waveform.iter())
            .map(|(b, s)| (s - b * 2.0).abs())
            .fold(0.0_f64, f64::max);
        assert!(max_dev > 1e-6, "cubic stage should break linear scaling");
    }

    #[test]
    fn test_passive_stage_default_noise() {
        let grid = test_grid();
        let spectrum = test_spectrum(&grid);
        let psd = vec![0.0; grid.len()];
        let g = 0.25; // |H| = 0.5

        let stages = vec![Stage::new("pad", StageResponse::scalar(0.5))];
        let results = CascadePropagator::propagate(
            &stages, &spectrum, &psd, &grid, 50.0, &mut StdRng::seed_from_u64(5),
        )
        .unwrap();

        let expected = KT0 * (1.0 - g);
        for &p in &results[1].noise_psd {
            assert!((p - expected).abs() < expected * 1e-12);
        }
    }

    #[test]
    fn test_unity_stages_leave_noise_psd_unchanged() {
        let grid = test_grid();
        let spectrum = test_spectrum(&grid);
        let psd = vec![0.0; grid.len()];

        let stages = vec![
            Stage::new("through1", StageResponse::unity()),
            Stage::new("through2", StageResponse::unity()),
        ];
        let results = CascadePropagator::propagate(
            &stages, &spectrum, &psd, &grid, 50.0, &mut StdRng::seed_from_u64(6),
        )
        .unwrap();

        for r in &results {
            for &p in &r.noise_psd {
                assert_eq!(p, 0.0);
            }
            assert_eq!(r.noise_rms, 0.0);
        }
        // Signal passes through untouched.
        for k in 0..grid.len() {
            assert!((results[2].signal_spectrum[k] - spectrum[k]).norm() < 1e-12);
        }
    }

    #[test]
    fn test_noise_psd_non_negative() {
        let grid = test_grid();
        let spectrum = test_spectrum(&grid);
        let psd: Vec<f64> = (0..grid.len()).map(|k| 1e-18 * (k % 3) as f64).collect();

        let per_bin: Vec<Complex64> = (0..grid.len())
            .map(|k| Complex64::from_polar(2.0 / (1.0 + k as f64), -0.1 * k as f64))
            .collect();
        let stages = vec![
            Stage::new("filter", StageResponse::PerBin(per_bin)),
            Stage::new("amp", StageResponse::scalar(31.6)).with_noise_factor(1.26),
            Stage::new("pad", StageResponse::scalar(0.1)),
        ];
        let results = CascadePropagator::propagate(
            &stages, &spectrum, &psd, &grid, 50.0, &mut StdRng::seed_from_u64(7),
        )
        .unwrap();

        for r in &results {
            for &p in &r.noise_psd {
                assert!(p >= 0.0, "noise PSD must stay non-negative, got {}", p);
            }
        }
    }

    #[test]
    fn test_noise_rms_formula() {
        let grid = test_grid();
        let spectrum = test_spectrum(&grid);
        let psd = vec![4e-18; grid.len()];
        let results = CascadePropagator::propagate(
            &[], &spectrum, &psd, &grid, 50.0, &mut StdRng::seed_from_u64(8),
        )
        .unwrap();

        let expected = (4e-18 * grid.len() as f64 * 50.0 * grid.df()).sqrt();
        assert!((results[0].noise_rms - expected).abs() < expected * 1e-12);
    }

    #[test]
    fn test_per_bin_length_mismatch_is_fatal() {
        let grid = test_grid();
        let spectrum = test_spectrum(&grid);
        let psd = vec![0.0; grid.len()];
        let stages = vec![Stage::new(
            "bad",
            StageResponse::PerBin(vec![Complex64::new(1.0, 0.0); grid.len() - 1]),
        )];
        let err = CascadePropagator::propagate(
            &stages, &spectrum, &psd, &grid, 50.0, &mut StdRng::seed_from_u64(9),
        );
        assert!(matches!(err, Err(BpmError::LengthMismatch { .. })));
    }

    #[test]
    fn test_polynomial_horner() {
        let p = Polynomial::new(vec![1.0, -2.0, 3.0]);
        assert!((p.eval(2.0) - (1.0 - 4.0 + 12.0)).abs() < 1e-12);
        assert_eq!(Polynomial::identity().eval(0.7), 0.7);
    }
}
