//! Machine Configuration
//!
//! Aggregates everything the response simulation needs to know about
//! one BPM installation: chamber and button geometry, the device
//! parameters of the analog chain, and the electrical environment.
//! Fully serde-loadable so installations can live in config files.

use bpm_core::{ChamberKind, PickupButton, DEFAULT_COVERAGE_POINTS};
use serde::{Deserialize, Serialize};

use crate::devices::{AmplifierModel, AttenuatorModel, ButtonModel, CableModel, FilterModel};

/// Button geometry plus its electrical model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonConfig {
    /// Electrode diameter, same unit as the chamber geometry (mm).
    pub diameter: f64,
    /// Shape tag; `"round"` is the recognized value.
    pub shape: String,
    /// Horizontal offset of the button centers, non-circular chambers.
    pub button_distance: Option<f64>,
    /// Electrical model of the electrode.
    #[serde(flatten)]
    pub electrical: ButtonModel,
}

impl ButtonConfig {
    /// The geometric pickup description consumed by the coverage solver.
    pub fn pickup(&self) -> PickupButton {
        PickupButton {
            diameter: self.diameter,
            shape: self.shape.clone(),
            button_distance: self.button_distance,
        }
    }
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            diameter: 4.0,
            shape: "round".to_string(),
            button_distance: None,
            electrical: ButtonModel::default(),
        }
    }
}

/// One BPM installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Reference impedance for noise power bookkeeping, ohms.
    pub reference_impedance: f64,
    /// Declared RF carrier frequency, Hz.
    pub rf_frequency: f64,
    /// Vacuum chamber cross-section.
    pub chamber: ChamberKind,
    /// Pickup button.
    pub button: ButtonConfig,
    /// Cable run from the button to the front end.
    pub cable: CableModel,
    /// Anti-alias / band-limiting filter.
    pub filter: FilterModel,
    /// Front-end amplifier.
    pub amplifier: AmplifierModel,
    /// Stepped attenuator ahead of the digitizer.
    pub attenuator: AttenuatorModel,
    /// Boundary/quadrature point count for the coverage solver.
    pub coverage_points: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            reference_impedance: 50.0,
            rf_frequency: 352.2e6,
            chamber: ChamberKind::Circular { radius: 12.0 },
            button: ButtonConfig::default(),
            cable: CableModel::default(),
            filter: FilterModel::default(),
            amplifier: AmplifierModel::default(),
            attenuator: AttenuatorModel::default(),
            coverage_points: DEFAULT_COVERAGE_POINTS,
        }
    }
}
