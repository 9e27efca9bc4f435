//! Chamber Boundary Discretization
//!
//! Turns a vacuum-chamber cross-section into an ordered, closed sequence
//! of boundary vertices for the coverage solver. Two chamber kinds are
//! supported as a closed tagged variant, checked exhaustively at
//! construction: a circular pipe and an octagonal chamber assembled from
//! declared edge lengths. An unrecognized kind cannot be represented;
//! the fatal path for bad configuration lives in field validation and in
//! serde deserialization of the tag.
//!
//! The requested point count is rounded to the nearest multiple of four
//! plus one so the discretization keeps the 4-fold rotational symmetry
//! the pickup assumes.

use serde::{Deserialize, Serialize};

use crate::types::{BpmError, BpmResult};

/// A point in the transverse chamber plane, millimetres.
pub type Point = [f64; 2];

/// Chamber cross-section, carrying only the fields its kind requires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChamberKind {
    /// Circular pipe of the given radius.
    Circular { radius: f64 },
    /// Octagon: flat top/bottom of lengths `up`/`down`, flat left/right
    /// walls of lengths `left`/`right`, overall `height` and `width`,
    /// joined by four diagonal corner cuts.
    Octagonal {
        up: f64,
        down: f64,
        left: f64,
        right: f64,
        height: f64,
        width: f64,
    },
}

impl ChamberKind {
    /// Validate the declared dimensions. Fails fast; no partial
    /// geometry is ever produced from an invalid configuration.
    pub fn validate(&self) -> BpmResult<()> {
        match *self {
            ChamberKind::Circular { radius } => {
                if radius <= 0.0 {
                    return Err(BpmError::InvalidChamber(format!(
                        "circular chamber radius must be positive, got {radius}"
                    )));
                }
            }
            ChamberKind::Octagonal {
                up,
                down,
                left,
                right,
                height,
                width,
            } => {
                for (name, v) in [
                    ("up", up),
                    ("down", down),
                    ("left", left),
                    ("right", right),
                    ("height", height),
                    ("width", width),
                ] {
                    if v <= 0.0 {
                        return Err(BpmError::InvalidChamber(format!(
                            "octagonal field `{name}` must be positive, got {v}"
                        )));
                    }
                }
                if up > width || down > width {
                    return Err(BpmError::InvalidChamber(
                        "top/bottom edges cannot exceed the chamber width".to_string(),
                    ));
                }
                if left > height || right > height {
                    return Err(BpmError::InvalidChamber(
                        "left/right edges cannot exceed the chamber height".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Discretize the boundary into an ordered closed vertex loop.
    ///
    /// `n` is rounded to the nearest multiple of four plus one; the
    /// returned loop repeats the first vertex at the end, so the number
    /// of segments is a multiple of four.
    pub fn generate(&self, n: usize) -> BpmResult<ChamberGeometry> {
        self.validate()?;
        // An octagon needs at least one segment per edge.
        let n = match self {
            ChamberKind::Circular { .. } => round_to_symmetric(n),
            ChamberKind::Octagonal { .. } => round_to_symmetric(n.max(9)),
        };

        let vertices = match *self {
            ChamberKind::Circular { radius } => circle_vertices(radius, n),
            ChamberKind::Octagonal {
                up,
                down,
                left,
                right,
                height,
                width,
            } => octagon_vertices(up, down, left, right, height, width, n),
        };

        Ok(ChamberGeometry::from_loop(vertices))
    }
}

/// Round `n` to the nearest multiple of 4, plus 1.
fn round_to_symmetric(n: usize) -> usize {
    let quads = ((n.max(5) - 1) as f64 / 4.0).round() as usize;
    4 * quads.max(1) + 1
}

fn circle_vertices(radius: f64, n: usize) -> Vec<Point> {
    let segments = n - 1;
    let mut vertices = Vec::with_capacity(n);
    for i in 0..segments {
        let theta = 2.0 * std::f64::consts::PI * i as f64 / segments as f64;
        vertices.push([radius * theta.cos(), radius * theta.sin()]);
    }
    vertices.push(vertices[0]);
    vertices
}

fn octagon_vertices(
    up: f64,
    down: f64,
    left: f64,
    right: f64,
    height: f64,
    width: f64,
    n: usize,
) -> Vec<Point> {
    // Corner loop, counterclockwise, starting on the right wall.
    let corners: [Point; 8] = [
        [width / 2.0, -right / 2.0],
        [width / 2.0, right / 2.0],
        [up / 2.0, height / 2.0],
        [-up / 2.0, height / 2.0],
        [-width / 2.0, left / 2.0],
        [-width / 2.0, -left / 2.0],
        [-down / 2.0, -height / 2.0],
        [down / 2.0, -height / 2.0],
    ];

    let edge_len = |a: Point, b: Point| ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2)).sqrt();
    let lengths: Vec<f64> = (0..8)
        .map(|e| edge_len(corners[e], corners[(e + 1) % 8]))
        .collect();
    let perimeter: f64 = lengths.iter().sum();

    // Distribute the segment budget proportionally to edge length, so
    // the long straight walls are sampled more densely, then repair the
    // rounding drift on the longest edge.
    let segments = n - 1;
    let mut counts: Vec<usize> = lengths
        .iter()
        .map(|&l| ((segments as f64 * l / perimeter).round() as usize).max(1))
        .collect();
    let longest = lengths
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .expect("octagon has 8 edges");
    loop {
        let total: usize = counts.iter().sum();
        if total == segments {
            break;
        }
        if total < segments {
            counts[longest] += 1;
        } else {
            // Never strip an edge below one segment.
            let victim = counts
                .iter()
                .enumerate()
                .filter(|(_, &c)| c > 1)
                .max_by_key(|(_, &c)| c)
                .map(|(i, _)| i)
                .expect("segment budget exceeds edge count");
            counts[victim] -= 1;
        }
    }

    let mut vertices = Vec::with_capacity(n);
    for e in 0..8 {
        let a = corners[e];
        let b = corners[(e + 1) % 8];
        for i in 0..counts[e] {
            let t = i as f64 / counts[e] as f64;
            vertices.push([a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1])]);
        }
    }
    vertices.push(vertices[0]);
    vertices
}

/// Discretized chamber boundary: a closed vertex loop with cached
/// per-segment midpoints and lengths.
#[derive(Debug, Clone)]
pub struct ChamberGeometry {
    vertices: Vec<Point>,
    midpoints: Vec<Point>,
    lengths: Vec<f64>,
}

impl ChamberGeometry {
    fn from_loop(vertices: Vec<Point>) -> Self {
        let m = vertices.len() - 1;
        let mut midpoints = Vec::with_capacity(m);
        let mut lengths = Vec::with_capacity(m);
        for i in 0..m {
            let a = vertices[i];
            let b = vertices[i + 1];
            midpoints.push([(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0]);
            lengths.push(((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2)).sqrt());
        }
        Self {
            vertices,
            midpoints,
            lengths,
        }
    }

    /// Ordered closed vertex loop (first vertex repeated at the end).
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Number of boundary segments.
    pub fn segment_count(&self) -> usize {
        self.midpoints.len()
    }

    /// Segment midpoints, one per segment.
    pub fn midpoints(&self) -> &[Point] {
        &self.midpoints
    }

    /// Segment arc lengths, one per segment.
    pub fn segment_lengths(&self) -> &[f64] {
        &self.lengths
    }

    /// Total boundary arc length.
    pub fn perimeter(&self) -> f64 {
        self.lengths.iter().sum()
    }
}
