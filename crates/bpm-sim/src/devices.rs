//! Front-End Device Models
//!
//! Frequency-response models for the devices in the BPM analog chain:
//! button electrode, coaxial cable run, anti-alias filter, amplifier,
//! and stepped attenuator. Each model is an ordinary serde-loadable
//! config struct that knows how to turn itself into a cascade
//! [`Stage`].
//!
//! The numbers these models consume (attenuation coefficients, cutoff
//! frequencies, noise figures) come from device datasheets; the models
//! here only describe the functional form of each response.

use bpm_core::constants::SPEED_OF_LIGHT;
use bpm_core::{FrequencyGrid, Stage, StageResponse};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

/// Capacitively coupled button electrode.
///
/// Lumped-element model: the image current drives the button capacitance
/// against the load, giving a first-order high-pass
///
/// ```text
/// H(f) = Zt * coverage * j*2*pi*f*tau / (1 + j*2*pi*f*tau),   tau = R*C
/// ```
///
/// where `Zt` is the plateau transfer impedance from the datasheet and
/// `coverage` the beam-position-dependent coverage factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonModel {
    /// Button capacitance to ground, farads.
    pub capacitance: f64,
    /// Load (readout) impedance, ohms.
    pub load_impedance: f64,
    /// Plateau transfer impedance, ohms.
    pub transfer_impedance: f64,
}

impl Default for ButtonModel {
    fn default() -> Self {
        Self {
            capacitance: 8e-12,
            load_impedance: 50.0,
            transfer_impedance: 1.4,
        }
    }
}

impl ButtonModel {
    /// Per-bin button response scaled by a coverage factor.
    pub fn response(&self, grid: &FrequencyGrid, coverage: f64) -> Vec<Complex64> {
        let tau = self.load_impedance * self.capacitance;
        grid.freqs()
            .iter()
            .map(|&f| {
                let jwt = Complex64::new(0.0, 2.0 * PI * f * tau);
                self.transfer_impedance * coverage * (jwt / (Complex64::new(1.0, 0.0) + jwt))
            })
            .collect()
    }

    /// Cascade stage for this button at the given coverage factor.
    pub fn stage(&self, grid: &FrequencyGrid, coverage: f64) -> Stage {
        Stage::new("button", StageResponse::PerBin(self.response(grid, coverage)))
    }
}

/// Coaxial cable run.
///
/// Attenuation follows the usual two-term datasheet fit: a skin-effect
/// term in `sqrt(f)` plus a dielectric term linear in `f`, both quoted
/// in dB per 100 m at 1 GHz. Phase is the linear delay of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CableModel {
    /// Run length, metres.
    pub length: f64,
    /// Skin-effect attenuation coefficient, dB/100 m at 1 GHz.
    pub k1: f64,
    /// Dielectric attenuation coefficient, dB/100 m at 1 GHz.
    pub k2: f64,
    /// Velocity factor of the dielectric (fraction of c).
    pub velocity_factor: f64,
}

impl Default for CableModel {
    fn default() -> Self {
        Self {
            length: 25.0,
            k1: 15.0,
            k2: 3.0,
            velocity_factor: 0.66,
        }
    }
}

impl CableModel {
    /// Attenuation of the full run at `f` in dB (positive number).
    pub fn attenuation_db(&self, f: f64) -> f64 {
        let f_ghz = f / 1e9;
        (self.k1 * f_ghz.sqrt() + self.k2 * f_ghz) * self.length / 100.0
    }

    /// One-way propagation delay of the run, seconds.
    pub fn delay(&self) -> f64 {
        self.length / (self.velocity_factor * SPEED_OF_LIGHT)
    }

    /// Per-bin cable response.
    pub fn response(&self, grid: &FrequencyGrid) -> Vec<Complex64> {
        let delay = self.delay();
        grid.freqs()
            .iter()
            .map(|&f| {
                let mag = 10.0_f64.powf(-self.attenuation_db(f) / 20.0);
                Complex64::from_polar(mag, -2.0 * PI * f * delay)
            })
            .collect()
    }

    /// Cascade stage for this run; dissipative, so the default noise
    /// factor `1/G` applies.
    pub fn stage(&self, grid: &FrequencyGrid) -> Stage {
        Stage::new("cable", StageResponse::PerBin(self.response(grid)))
    }
}

/// N-pole Butterworth low-pass filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterModel {
    /// -3 dB cutoff frequency, Hz.
    pub cutoff: f64,
    /// Filter order (number of poles).
    pub order: u32,
}

impl Default for FilterModel {
    fn default() -> Self {
        Self {
            cutoff: 500e6,
            order: 4,
        }
    }
}

impl FilterModel {
    /// Complex response at `f`, from the normalized Butterworth poles.
    pub fn response_at(&self, f: f64) -> Complex64 {
        let n = self.order;
        let s = Complex64::new(0.0, f / self.cutoff);
        let mut denom = Complex64::new(1.0, 0.0);
        for k in 1..=n {
            let angle = PI * (2 * k + n - 1) as f64 / (2 * n) as f64;
            let pole = Complex64::from_polar(1.0, angle);
            denom *= s - pole;
        }
        // B_n(0) = prod(-p_k) = 1 for the normalized polynomial, so the
        // DC gain is exactly one.
        Complex64::new(1.0, 0.0) / denom
    }

    /// Per-bin filter response.
    pub fn response(&self, grid: &FrequencyGrid) -> Vec<Complex64> {
        grid.freqs().iter().map(|&f| self.response_at(f)).collect()
    }

    /// Cascade stage; dissipative default noise model.
    pub fn stage(&self, grid: &FrequencyGrid) -> Stage {
        Stage::new("filter", StageResponse::PerBin(self.response(grid)))
    }
}

/// Flat-gain amplifier with a datasheet noise figure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmplifierModel {
    /// Voltage gain in dB.
    pub gain_db: f64,
    /// Noise figure in dB at 290 K.
    pub noise_figure_db: f64,
}

impl Default for AmplifierModel {
    fn default() -> Self {
        Self {
            gain_db: 26.0,
            noise_figure_db: 3.5,
        }
    }
}

impl AmplifierModel {
    /// Linear voltage gain.
    pub fn gain_linear(&self) -> f64 {
        10.0_f64.powf(self.gain_db / 20.0)
    }

    /// Linear noise factor.
    pub fn noise_factor(&self) -> f64 {
        10.0_f64.powf(self.noise_figure_db / 10.0)
    }

    /// Cascade stage with the explicit noise factor.
    pub fn stage(&self) -> Stage {
        Stage::new("amplifier", StageResponse::scalar(self.gain_linear()))
            .with_noise_factor(self.noise_factor())
    }
}

/// Stepped attenuator.
///
/// Requested settings are clamped to the device range and rounded to
/// the step size, like the hardware register would.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttenuatorModel {
    /// Maximum attenuation, dB.
    pub max_db: f64,
    /// Step size (resolution), dB.
    pub step_db: f64,
}

impl Default for AttenuatorModel {
    fn default() -> Self {
        Self {
            max_db: 31.5,
            step_db: 0.5,
        }
    }
}

impl AttenuatorModel {
    /// Clamp and round a requested setting to what the device realizes.
    pub fn quantize(&self, db: f64) -> f64 {
        let clamped = db.clamp(0.0, self.max_db);
        (clamped / self.step_db).round() * self.step_db
    }

    /// Cascade stage at the given setting; purely dissipative.
    pub fn stage(&self, db: f64) -> Stage {
        let actual = self.quantize(db);
        debug!(requested = db, actual, "attenuator setting");
        Stage::new(
            "attenuator",
            StageResponse::scalar(10.0_f64.powf(-actual / 20.0)),
        )
    }
}
