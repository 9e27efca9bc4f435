//! # BPM Front-End Simulation
//!
//! Device-parameter models and end-to-end glue on top of
//! [`bpm_core`]: configure a machine (chamber, button, cable, filter,
//! amplifier, attenuator), then predict the per-stage response of the
//! analog chain to a beam-current spectrum, or evaluate the pickup's
//! beam-position coverage.
//!
//! ## Example
//!
//! ```rust
//! use bpm_core::FrequencyGrid;
//! use bpm_sim::{gaussian_bunch_spectrum, simulate_bpm_response, MachineConfig};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let machine = MachineConfig::default();
//! let grid = FrequencyGrid::from_spacing(5e6, 128).unwrap();
//! let beam = gaussian_bunch_spectrum(&grid, 1e-9, 5e6, 1e-9);
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let (stages, time) = simulate_bpm_response(
//!     &beam, &grid, (0.5, -0.2), 10.0, &machine, &mut rng,
//! ).unwrap();
//!
//! assert_eq!(stages.last().unwrap().name, "attenuator");
//! assert_eq!(time.len(), grid.record_len());
//! ```

pub mod devices;
pub mod machine;
pub mod response;

pub use devices::{AmplifierModel, AttenuatorModel, ButtonModel, CableModel, FilterModel};
pub use machine::{ButtonConfig, MachineConfig};
pub use response::{beam_coverage, gaussian_bunch_spectrum, simulate_bpm_response};
