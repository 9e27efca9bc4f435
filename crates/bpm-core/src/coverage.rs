//! Electrostatic Coverage Solver
//!
//! Computes, for a beam at a transverse offset, the fraction of induced
//! image charge intercepted by each of the four button electrodes.
//!
//! Two methods, dispatched on the chamber kind:
//!
//! - **Circular chamber**: closed-form image-charge angular density
//!
//!   ```text
//!   j(d, theta, r, phi) = (r^2 - d^2) / (2*pi*(r^2 + d^2 - 2*r*d*cos(phi - theta)))
//!   ```
//!
//!   integrated by midpoint quadrature over each button's angular
//!   aperture. The density integrates to one over the full circle, so
//!   the quadrature result is directly a charge fraction.
//!
//! - **Any other chamber**: boundary-element method. The boundary is
//!   discretized into midpoint segments and a dense influence matrix is
//!   assembled from the 2-D Laplace single-layer logarithmic kernel;
//!   one dense solve per beam position yields the induced charge
//!   density on the contour, which is integrated over each button's
//!   segment range. The matrix depends on geometry only and is
//!   assembled once per batch; positions then solve independently (and
//!   in parallel, the loop carries no cross-iteration state).
//!
//! The full-contour integral of the induced charge is validated against
//! unity within 1%; a violation signals insufficient discretization and
//! is reported as a warning, not an error.

use rayon::prelude::*;
use std::f64::consts::{FRAC_PI_4, PI};
use tracing::warn;

use crate::geometry::{ChamberGeometry, ChamberKind, Point};
use crate::types::{BeamPosition, BpmError, BpmResult, CoverageFactor};

/// Button center angles in quadrant order `{+x+y, -x+y, -x-y, +x-y}`.
pub const BUTTON_ANGLES: [f64; 4] = [
    FRAC_PI_4,
    3.0 * FRAC_PI_4,
    5.0 * FRAC_PI_4,
    7.0 * FRAC_PI_4,
];

/// Relative tolerance for the whole-contour charge normalization check.
const CONTOUR_TOLERANCE: f64 = 0.01;

/// Default boundary/quadrature point count for [`CoverageSolver::coverage`].
pub const DEFAULT_COVERAGE_POINTS: usize = 101;

/// Pickup button electrode description.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PickupButton {
    /// Button diameter, same length unit as the chamber geometry.
    pub diameter: f64,
    /// Shape tag from the device table; `"round"` is the recognized
    /// value, anything else degrades to a correction factor of 1.
    pub shape: String,
    /// Horizontal offset of the button centers from the vertical axis;
    /// required for non-circular chambers, ignored for circular ones.
    pub button_distance: Option<f64>,
}

impl PickupButton {
    /// Round button at the given diameter.
    pub fn round(diameter: f64) -> Self {
        Self {
            diameter,
            shape: "round".to_string(),
            button_distance: None,
        }
    }

    /// Set the horizontal button distance (octagonal chambers).
    pub fn with_distance(mut self, distance: f64) -> Self {
        self.button_distance = Some(distance);
        self
    }

    /// Shape correction factor: `4/pi` for round buttons, `1` for
    /// anything unrecognized (degraded mode, logged once per solve).
    pub fn shape_correction(&self) -> f64 {
        match self.shape.as_str() {
            "round" => 4.0 / PI,
            other => {
                warn!(
                    shape = %other,
                    "unrecognized button shape, falling back to correction factor 1"
                );
                1.0
            }
        }
    }
}

/// Induced charge density on a discretized contour, from one dense solve.
///
/// Exposed as a diagnostic: the coverage path consumes the same solve
/// internally.
#[derive(Debug, Clone)]
pub struct ChargeDensity {
    /// Charge density per segment midpoint.
    pub sigma: Vec<f64>,
    /// Matching segment arc lengths.
    pub segment_lengths: Vec<f64>,
    /// Full-contour integral `sum(sigma * length)`; 1 within tolerance
    /// for an adequately discretized boundary.
    pub total: f64,
}

/// Coverage solver for one pickup/chamber configuration.
#[derive(Debug, Clone)]
pub struct CoverageSolver {
    chamber: ChamberKind,
    button: PickupButton,
}

impl CoverageSolver {
    /// Build a solver, failing fast on invalid geometry or button data.
    pub fn new(chamber: ChamberKind, button: PickupButton) -> BpmResult<Self> {
        chamber.validate()?;
        if button.diameter <= 0.0 {
            return Err(BpmError::InvalidChamber(format!(
                "button diameter must be positive, got {}",
                button.diameter
            )));
        }
        if !matches!(chamber, ChamberKind::Circular { .. }) && button.button_distance.is_none() {
            return Err(BpmError::MissingButtonDistance);
        }
        Ok(Self { chamber, button })
    }

    /// Coverage factors for a batch of beam positions.
    ///
    /// `n` controls both the boundary discretization and the angular
    /// quadrature; positions are processed independently.
    pub fn coverage(
        &self,
        positions: &[BeamPosition],
        n: usize,
    ) -> BpmResult<Vec<CoverageFactor>> {
        let correction = self.button.shape_correction();
        match self.chamber {
            ChamberKind::Circular { radius } => positions
                .par_iter()
                .map(|&pos| self.coverage_circular(radius, pos, n, correction))
                .collect(),
            _ => self.coverage_bem(positions, n, correction),
        }
    }

    /// Closed-form path for the circular chamber.
    fn coverage_circular(
        &self,
        radius: f64,
        (x, y): BeamPosition,
        n: usize,
        correction: f64,
    ) -> BpmResult<CoverageFactor> {
        let d = x.hypot(y);
        if d >= radius {
            return Err(BpmError::BeamOutsideChamber { x, y });
        }
        let theta = y.atan2(x);
        // Aperture half-angle; the button arc spans one diameter to
        // either side of its center (see DESIGN.md on this convention).
        let alpha = self.button.diameter / radius;

        let mut cov = [0.0; 4];
        for (b, &phi_b) in BUTTON_ANGLES.iter().enumerate() {
            let step = 2.0 * alpha / n as f64;
            let mut raw = 0.0;
            for i in 0..n {
                let phi = phi_b - alpha + (i as f64 + 0.5) * step;
                raw += image_charge_density(d, theta, radius, phi) * step;
            }
            cov[b] = raw / correction;
        }
        Ok(cov)
    }

    /// Boundary-element path for arbitrary chamber contours.
    fn coverage_bem(
        &self,
        positions: &[BeamPosition],
        n: usize,
        correction: f64,
    ) -> BpmResult<Vec<CoverageFactor>> {
        let geometry = self.chamber.generate(n)?;
        let influence = influence_matrix(&geometry);
        let ranges = self.button_segments(&geometry)?;

        let factors = positions
            .par_iter()
            .map(|&pos| {
                let sigma = solve_charge_density(&influence, &geometry, pos);
                check_contour_total(&sigma, geometry.segment_lengths());
                let mut cov = [0.0; 4];
                for (b, range) in ranges.iter().enumerate() {
                    cov[b] = trapezoid_over(range, &sigma, geometry.segment_lengths()) / correction;
                }
                cov
            })
            .collect();
        Ok(factors)
    }

    /// Segment index ranges intercepted by each button, from the
    /// horizontal-axis projection of the button apertures.
    fn button_segments(&self, geometry: &ChamberGeometry) -> BpmResult<[Vec<usize>; 4]> {
        let mids = geometry.midpoints();
        let lengths = geometry.segment_lengths();
        let bd = self.button.diameter;

        let mut ranges: [Vec<usize>; 4] = Default::default();
        match self.chamber {
            ChamberKind::Circular { radius } => {
                let alpha = bd / radius;
                for (b, &phi_b) in BUTTON_ANGLES.iter().enumerate() {
                    for (i, (mid, &sl)) in mids.iter().zip(lengths.iter()).enumerate() {
                        let phi = mid[1].atan2(mid[0]).rem_euclid(2.0 * PI);
                        let mut delta = (phi - phi_b).abs();
                        if delta > PI {
                            delta = 2.0 * PI - delta;
                        }
                        // Include segments overlapping the aperture edge.
                        if delta <= alpha + sl / (2.0 * radius) {
                            ranges[b].push(i);
                        }
                    }
                }
            }
            _ => {
                let distance = self
                    .button
                    .button_distance
                    .ok_or(BpmError::MissingButtonDistance)?;
                for (b, &phi_b) in BUTTON_ANGLES.iter().enumerate() {
                    let sx = phi_b.cos().signum();
                    let sy = phi_b.sin().signum();
                    let center = sx * distance;
                    for (i, (mid, &sl)) in mids.iter().zip(lengths.iter()).enumerate() {
                        if mid[1] * sy > 0.0 && (mid[0] - center).abs() <= bd + sl / 2.0 {
                            ranges[b].push(i);
                        }
                    }
                }
            }
        }
        Ok(ranges)
    }
}

/// Image-charge angular density on a circular pipe wall.
///
/// For a unit line charge at polar offset `(d, theta)` inside a pipe of
/// radius `r`; integrates to one over the full circle.
pub fn image_charge_density(d: f64, theta: f64, r: f64, phi: f64) -> f64 {
    (r * r - d * d) / (2.0 * PI * (r * r + d * d - 2.0 * r * d * (phi - theta).cos()))
}

/// Induced charge density on an arbitrary chamber contour, one dense
/// solve for the given beam position.
pub fn induced_charge_density(
    chamber: &ChamberKind,
    beam: BeamPosition,
    n: usize,
) -> BpmResult<ChargeDensity> {
    let geometry = chamber.generate(n)?;
    let influence = influence_matrix(&geometry);
    let sigma = solve_charge_density(&influence, &geometry, beam);
    let lengths = geometry.segment_lengths().to_vec();
    let total = sigma
        .iter()
        .zip(lengths.iter())
        .map(|(s, l)| s * l)
        .sum::<f64>();
    Ok(ChargeDensity {
        sigma,
        segment_lengths: lengths,
        total,
    })
}

/// Dense influence matrix from the single-layer logarithmic kernel.
///
/// Off-diagonal `G[i][j] = -ln(dist(i, j)) * sl[j]`; the diagonal uses
/// the regularized self-influence `2 * sl[j] * (1 - ln(sl[j]))` of a
/// segment on itself.
fn influence_matrix(geometry: &ChamberGeometry) -> Vec<Vec<f64>> {
    let mids = geometry.midpoints();
    let lengths = geometry.segment_lengths();
    let m = mids.len();

    let mut g = vec![vec![0.0; m]; m];
    for i in 0..m {
        for j in 0..m {
            if i == j {
                g[i][j] = 2.0 * lengths[j] * (1.0 - lengths[j].ln());
            } else {
                g[i][j] = -distance(mids[i], mids[j]).ln() * lengths[j];
            }
        }
    }
    g
}

fn solve_charge_density(
    influence: &[Vec<f64>],
    geometry: &ChamberGeometry,
    beam: BeamPosition,
) -> Vec<f64> {
    let rhs: Vec<f64> = geometry
        .midpoints()
        .iter()
        .map(|&mid| -distance([beam.0, beam.1], mid).ln())
        .collect();
    solve_linear_system(influence, &rhs)
}

fn check_contour_total(sigma: &[f64], lengths: &[f64]) {
    let total: f64 = sigma.iter().zip(lengths.iter()).map(|(s, l)| s * l).sum();
    if (total - 1.0).abs() > CONTOUR_TOLERANCE {
        warn!(
            total,
            "contour charge integral deviates from unity; increase the boundary point count"
        );
    }
}

/// Trapezoidal integration of `sigma` over a contiguous segment range,
/// weighted by segment length.
fn trapezoid_over(indices: &[usize], sigma: &[f64], lengths: &[f64]) -> f64 {
    match indices.len() {
        0 => 0.0,
        1 => sigma[indices[0]] * lengths[indices[0]],
        n => indices
            .iter()
            .enumerate()
            .map(|(pos, &i)| {
                let w = if pos == 0 || pos == n - 1 { 0.5 } else { 1.0 };
                w * sigma[i] * lengths[i]
            })
            .sum(),
    }
}

fn distance(a: Point, b: Point) -> f64 {
    ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2)).sqrt()
}

/// Solve a dense linear system `Ax = b` by Gaussian elimination with
/// partial pivoting.
fn solve_linear_system(a: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    if n == 0 {
        return vec![];
    }

    let mut aug: Vec<Vec<f64>> = a
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = row.clone();
            r.push(b[i]);
            r
        })
        .collect();

    // Forward elimination with partial pivoting.
    for col in 0..n {
        let mut max_val = aug[col][col].abs();
        let mut max_row = col;
        for row in (col + 1)..n {
            if aug[row][col].abs() > max_val {
                max_val = aug[row][col].abs();
                max_row = row;
            }
        }
        if max_val < 1e-30 {
            continue;
        }
        aug.swap(col, max_row);

        let pivot = aug[col][col];
        for row in (col + 1)..n {
            let factor = aug[row][col] / pivot;
            for j in col..=n {
                aug[row][j] -= factor * aug[col][j];
            }
        }
    }

    // Back substitution.
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = aug[i][n];
        for j in (i + 1)..n {
            sum -= aug[i][j] * x[j];
        }
        if aug[i][i].abs() > 1e-30 {
            x[i] = sum / aug[i][i];
        }
    }

    x
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: f64 = 12.0;
    const BD: f64 = 4.0;

    fn circular_solver() -> CoverageSolver {
        CoverageSolver::new(
            ChamberKind::Circular { radius: R },
            PickupButton::round(BD),
        )
        .unwrap()
    }

    fn octagonal_chamber() -> ChamberKind {
        ChamberKind::Octagonal {
            up: 30.0,
            down: 30.0,
            left: 20.0,
            right: 20.0,
            height: 40.0,
            width: 60.0,
        }
    }

    #[test]
    fn test_image_charge_density_normalizes() {
        // Integrate the closed form over the full circle for an
        // off-center beam; must come back to one.
        let (d, theta) = (4.0, 0.7);
        let n = 20_000;
        let step = 2.0 * PI / n as f64;
        let total: f64 = (0..n)
            .map(|i| image_charge_density(d, theta, R, (i as f64 + 0.5) * step) * step)
            .sum();
        assert!((total - 1.0).abs() < 1e-6, "density integral = {}", total);
    }

    #[test]
    fn test_centered_beam_equal_coverage_circular() {
        let solver = circular_solver();
        let cov = solver.coverage(&[(0.0, 0.0)], 101).unwrap()[0];
        for b in 1..4 {
            assert!(
                (cov[b] - cov[0]).abs() < 1e-9,
                "centered beam must see equal buttons, got {:?}",
                cov
            );
        }
    }

    #[test]
    fn test_centered_coverage_dimensional_estimate() {
        let solver = circular_solver();
        let cov = solver.coverage(&[(0.0, 0.0)], 101).unwrap()[0];
        // Raw (pre-correction) coupling should sit at the dimensional
        // estimate bd/(pi*r); the returned value carries the round-button
        // correction 4/pi.
        let raw = cov[0] * (4.0 / PI);
        let estimate = BD / (PI * R);
        assert!(
            (raw - estimate).abs() < 0.05 * estimate,
            "raw coupling {} vs estimate {}",
            raw,
            estimate
        );
    }

    #[test]
    fn test_bem_matches_analytic_for_circular_chamber() {
        // Run the circular chamber through the BEM machinery by hand
        // and compare against the closed form.
        let chamber = ChamberKind::Circular { radius: R };
        let button = PickupButton::round(BD);
        let solver = CoverageSolver::new(chamber, button).unwrap();

        let analytic = solver.coverage(&[(0.0, 0.0)], 201).unwrap()[0];
        let correction = solver.button.shape_correction();
        let bem = solver.coverage_bem(&[(0.0, 0.0)], 201, correction).unwrap()[0];

        for b in 0..4 {
            let rel = (bem[b] - analytic[b]).abs() / analytic[b];
            assert!(
                rel < 0.05,
                "button {}: BEM {} vs analytic {} ({}% off)",
                b,
                bem[b],
                analytic[b],
                rel * 100.0
            );
        }
    }

    #[test]
    fn test_contour_charge_completeness_circular() {
        let chamber = ChamberKind::Circular { radius: R };
        let density = induced_charge_density(&chamber, (0.0, 0.0), 201).unwrap();
        assert!(
            (density.total - 1.0).abs() < 0.01,
            "contour integral = {}",
            density.total
        );

        // Off-center beam keeps the normalization.
        let density = induced_charge_density(&chamber, (3.0, -2.0), 201).unwrap();
        assert!((density.total - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_contour_charge_completeness_octagonal() {
        let density = induced_charge_density(&octagonal_chamber(), (0.0, 0.0), 201).unwrap();
        // Corner behaviour converges more slowly than the smooth pipe.
        assert!(
            (density.total - 1.0).abs() < 0.05,
            "contour integral = {}",
            density.total
        );
    }

    #[test]
    fn test_centered_beam_equal_coverage_octagonal() {
        let solver = CoverageSolver::new(
            octagonal_chamber(),
            PickupButton::round(BD).with_distance(8.0),
        )
        .unwrap();
        let cov = solver.coverage(&[(0.0, 0.0)], 201).unwrap()[0];
        for b in 1..4 {
            let rel = (cov[b] - cov[0]).abs() / cov[0];
            assert!(
                rel < 0.02,
                "centered beam must see near-equal buttons, got {:?}",
                cov
            );
        }
    }

    #[test]
    fn test_offset_beam_favors_near_buttons() {
        let solver = circular_solver();
        // Beam displaced towards +x: the +x buttons (0 and 3) must win
        // over the -x buttons (1 and 2).
        let cov = solver.coverage(&[(4.0, 0.0)], 101).unwrap()[0];
        assert!(cov[0] > cov[1]);
        assert!(cov[3] > cov[2]);
        // And symmetric about the x axis.
        assert!((cov[0] - cov[3]).abs() < 1e-9);
        assert!((cov[1] - cov[2]).abs() < 1e-9);
    }

    #[test]
    fn test_batch_positions_are_independent() {
        let solver = circular_solver();
        let batch = solver
            .coverage(&[(0.0, 0.0), (2.0, 1.0), (0.0, 0.0)], 101)
            .unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], batch[2]);
        assert_ne!(batch[0], batch[1]);
    }

    #[test]
    fn test_beam_outside_chamber_is_fatal() {
        let solver = circular_solver();
        let err = solver.coverage(&[(20.0, 0.0)], 101);
        assert!(matches!(err, Err(BpmError::BeamOutsideChamber { .. })));
    }

    #[test]
    fn test_missing_button_distance_is_fatal() {
        let err = CoverageSolver::new(octagonal_chamber(), PickupButton::round(BD));
        assert!(matches!(err, Err(BpmError::MissingButtonDistance)));
    }

    #[test]
    fn test_unknown_shape_degrades_to_unity() {
        let mut button = PickupButton::round(BD);
        button.shape = "elliptic".to_string();
        assert_eq!(button.shape_correction(), 1.0);
        assert!((PickupButton::round(BD).shape_correction() - 4.0 / PI).abs() < 1e-15);
    }

    #[test]
    fn test_solve_linear_system_small() {
        // 2x + y = 5, x - y = 1  =>  x = 2, y = 1
        let a = vec![vec![2.0, 1.0], vec![1.0, -1.0]];
        let x = solve_linear_system(&a, &[5.0, 1.0]);
        assert!((x[0] - 2.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_solve_linear_system_needs_pivoting() {
        // Zero on the leading diagonal forces a row swap.
        let a = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let x = solve_linear_system(&a, &[3.0, 4.0]);
        assert!((x[0] - 4.0).abs() < 1e-12);
        assert!((x[1] - 3.0).abs() < 1e-12);
    }
}
