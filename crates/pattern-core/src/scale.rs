//! Measurement-driven grading of flattened pieces.
//!
//! Widths are scaled per height: each control line of a piece carries the
//! factor of its dimension, and between control lines the factor is
//! interpolated linearly, so neighbouring bands never tear apart. Heights
//! are scaled by the piece's length dimension. Both scalings are centred on
//! the outline's bounding box.

use nalgebra::Point2;
use tracing::{debug, warn};

use crate::flatten::FlattenedPatch;
use crate::measurement::ScaleFactors;
use crate::template::PieceSpec;

/// Factor at height `v` from `(height, factor)` pairs sorted by height.
///
/// Constant beyond the outermost lines; 1.0 without any line.
pub fn horizontal_factor(lines: &[(f64, f64)], v: f64) -> f64 {
    let (Some(first), Some(last)) = (lines.first(), lines.last()) else {
        return 1.0;
    };
    if v <= first.0 {
        return first.1;
    }
    if v >= last.0 {
        return last.1;
    }
    lines
        .windows(2)
        .find(|w| v <= w[1].0)
        .map_or(last.1, |w| {
            let (lo, hi) = (w[0], w[1]);
            let span = hi.0 - lo.0;
            if span <= f64::EPSILON {
                hi.1
            } else {
                lo.1 + (hi.1 - lo.1) * (v - lo.0) / span
            }
        })
}

/// Control lines of `piece` as `(height, factor)`, sorted by height.
fn control_profile(flat: &FlattenedPatch, piece: &PieceSpec, factors: &ScaleFactors) -> Vec<(f64, f64)> {
    let mut lines: Vec<(f64, f64)> = piece
        .control_lines
        .iter()
        .filter_map(|line| match flat.landmark(&line.at) {
            Some(p) => Some((p.y, factors.get(line.dimension))),
            None => {
                warn!(
                    "Control line at '{}' is not on '{}', skipped",
                    line.at, piece.name
                );
                None
            }
        })
        .collect();
    lines.sort_by(|a, b| a.0.total_cmp(&b.0));
    lines
}

/// Grade a flattened piece. Identity factors return it unchanged.
pub fn scale_patch(flat: &FlattenedPatch, piece: &PieceSpec, factors: &ScaleFactors) -> FlattenedPatch {
    if factors.is_identity() {
        return flat.clone();
    }
    let Some(bounds) = flat.bounds() else {
        return flat.clone();
    };

    let lines = control_profile(flat, piece, factors);
    let f_v = piece.length_dimension.map_or(1.0, |d| factors.get(d));
    let c = bounds.center();

    let positions: Vec<Point2<f64>> = flat
        .positions
        .iter()
        .map(|p| {
            let f_h = horizontal_factor(&lines, p.y);
            Point2::new(c.x + f_h * (p.x - c.x), c.y + f_v * (p.y - c.y))
        })
        .collect();

    debug!(
        "Scaled '{}': {} control lines, length factor {:.4}",
        piece.name,
        lines.len(),
        f_v
    );

    flat.with_positions(positions)
}
