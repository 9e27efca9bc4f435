//! # BPM Pickup Signal-Path Core
//!
//! Numerical engines for simulating the analog front end of a beam
//! position monitor (BPM) button pickup:
//!
//! - **Cascaded signal/noise propagation**: chain frequency-domain stage
//!   models and predict, after each stage, the propagated beam-signal
//!   waveform, cumulative frequency response, and Friis-style noise
//!   accumulation ([`cascade`]).
//! - **Electrostatic coverage**: the fraction of beam-induced image
//!   charge intercepted by each of four button electrodes, closed-form
//!   for a circular chamber or via a boundary-element solve for an
//!   arbitrary contour ([`coverage`]).
//!
//! ## Signal flow
//!
//! ```text
//! beam spectrum ──► stage 0 (raw) ──► button ──► cable ──► ... ──► ADC input
//!                      │                │
//!                      │                ├─ signal spectrum / waveform
//!                      │                ├─ cumulative response
//!                      │                └─ noise PSD / waveform / RMS
//!                      └─ coverage(x, y) scales the button signal
//! ```
//!
//! Everything is a pure function of its inputs except noise realization,
//! which consumes an explicitly passed random generator; seed it for
//! reproducible runs.
//!
//! ## Example
//!
//! ```rust
//! use bpm_core::{CascadePropagator, FrequencyGrid, Stage, StageResponse};
//! use num_complex::Complex64;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let grid = FrequencyGrid::from_spacing(1e6, 64).unwrap();
//! let spectrum = vec![Complex64::new(1e-3, 0.0); grid.len()];
//! let noise = vec![0.0; grid.len()];
//!
//! let stages = vec![
//!     Stage::new("cable", StageResponse::scalar(0.7)),
//!     Stage::new("amplifier", StageResponse::scalar(10.0)).with_noise_factor(2.0),
//! ];
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let results = CascadePropagator::propagate(
//!     &stages, &spectrum, &noise, &grid, 50.0, &mut rng,
//! ).unwrap();
//! assert_eq!(results.len(), 3); // raw input + two stages
//! ```

pub mod cascade;
pub mod constants;
pub mod coverage;
pub mod geometry;
pub mod spectral;
pub mod types;

pub use cascade::{CascadePropagator, CascadeStageResult, Polynomial, Stage, StageResponse};
pub use coverage::{
    image_charge_density, induced_charge_density, ChargeDensity, CoverageSolver, PickupButton,
    BUTTON_ANGLES, DEFAULT_COVERAGE_POINTS,
};
pub use geometry::{ChamberGeometry, ChamberKind, Point};
pub use spectral::{NoiseRealization, SpectralSynthesizer};
pub use types::{
    BeamPosition, BpmError, BpmResult, Complex, CoverageFactor, FrequencyGrid, NoisePsd, Spectrum,
    Waveform,
};
