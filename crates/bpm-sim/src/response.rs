//! End-to-End Response Simulation
//!
//! The two public operations of the simulator: propagate a beam-current
//! spectrum through the full front-end chain of a configured machine,
//! and evaluate the beam-position coverage of its pickup.
//!
//! The simulated channel is the `+x+y` electrode; the chain is
//!
//! ```text
//! beam ──► button ──► cable ──► filter ──► amplifier ──► attenuator
//! ```
//!
//! with the button response scaled by the electrostatic coverage factor
//! of the beam position. Noise realization draws from the caller's
//! random generator; pass a seeded [`rand::rngs::StdRng`] for
//! reproducible records.

use bpm_core::{
    BeamPosition, BpmResult, CascadePropagator, CascadeStageResult, CoverageFactor,
    CoverageSolver, FrequencyGrid,
};
use num_complex::Complex64;
use rand::Rng;
use std::f64::consts::PI;
use tracing::debug;

use crate::machine::MachineConfig;

/// Propagate a beam-current spectrum through the configured front end.
///
/// Returns one [`CascadeStageResult`] per chain element (the first entry
/// is the raw input) together with the sample instants of the
/// reconstructed waveforms.
pub fn simulate_bpm_response<R: Rng + ?Sized>(
    beam_spectrum: &[Complex64],
    grid: &FrequencyGrid,
    beam_position: BeamPosition,
    attenuator_db: f64,
    machine: &MachineConfig,
    rng: &mut R,
) -> BpmResult<(Vec<CascadeStageResult>, Vec<f64>)> {
    let solver = CoverageSolver::new(machine.chamber, machine.button.pickup())?;
    let coverage = solver.coverage(&[beam_position], machine.coverage_points)?[0];
    debug!(
        x = beam_position.0,
        y = beam_position.1,
        coverage = coverage[0],
        "simulating front-end response"
    );

    let stages = vec![
        machine.button.electrical.stage(grid, coverage[0]),
        machine.cable.stage(grid),
        machine.filter.stage(grid),
        machine.amplifier.stage(),
        machine.attenuator.stage(attenuator_db),
    ];

    let input_noise = vec![0.0; grid.len()];
    let results = CascadePropagator::propagate(
        &stages,
        beam_spectrum,
        &input_noise,
        grid,
        machine.reference_impedance,
        rng,
    )?;
    Ok((results, grid.time_vector()))
}

/// Coverage factors of the configured pickup for a batch of positions.
pub fn beam_coverage(
    machine: &MachineConfig,
    positions: &[BeamPosition],
    n: usize,
) -> BpmResult<Vec<CoverageFactor>> {
    CoverageSolver::new(machine.chamber, machine.button.pickup())?.coverage(positions, n)
}

/// One-sided current spectrum of a repeating Gaussian bunch train.
///
/// For bunch charge `q`, revolution frequency `f_rev` and RMS bunch
/// length `sigma_t` (seconds), line `k` of the spectrum carries
///
/// ```text
/// A_k = 2 * q * f_rev * exp(-(2*pi*f_k*sigma_t)^2 / 2)    (k > 0)
/// A_0 =     q * f_rev
/// ```
///
/// A convenient drive signal for the response simulation.
pub fn gaussian_bunch_spectrum(
    grid: &FrequencyGrid,
    bunch_charge: f64,
    revolution_frequency: f64,
    sigma_t: f64,
) -> Vec<Complex64> {
    grid.freqs()
        .iter()
        .enumerate()
        .map(|(k, &f)| {
            let line = if k == 0 { 1.0 } else { 2.0 };
            let envelope = (-(2.0 * PI * f * sigma_t).powi(2) / 2.0).exp();
            Complex64::new(line * bunch_charge * revolution_frequency * envelope, 0.0)
        })
        .collect()
}
