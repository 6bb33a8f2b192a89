//! Seam allowances, grain lines, notches and piece labels.

use std::f64::consts::PI;

use nalgebra::{Point2, Rotation2, Vector2};
use pattern_mesh::polygon::{self, Bounds2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CornerJoinPolicy;
use crate::context::PieceContext;
use crate::error::GeometryError;
use crate::flatten::FlattenedPatch;
use crate::segment::PatchId;
use crate::template::SeamSide;

/// Largest angle swept by one segment of a round join.
const ROUND_STEP: f64 = PI / 18.0;

/// Points closer than this are merged before offsetting.
const DEDUP_EPS: f64 = 1e-9;

/// Grain line length as a fraction of the piece height.
const GRAIN_FRACTION: f64 = 0.7;

/// The offset had to fall back to round joins with loop removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeamOffsetWarning {
    pub loop_index: usize,
    pub intersections: usize,
}

/// Cutting line around a piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeamCurve {
    pub outer: Vec<Point2<f64>>,
    pub holes: Vec<Vec<Point2<f64>>>,
    pub allowance: f64,
    /// Join policy the curve was finally built with.
    pub join: CornerJoinPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<SeamOffsetWarning>,
}

impl SeamCurve {
    /// A curve with only an outer loop.
    pub fn from_outer(outer: Vec<Point2<f64>>) -> Self {
        Self {
            outer,
            holes: Vec::new(),
            allowance: 0.0,
            join: CornerJoinPolicy::Miter,
            warning: None,
        }
    }

    /// Outer loop followed by holes.
    pub fn loops(&self) -> impl Iterator<Item = &Vec<Point2<f64>>> + '_ {
        std::iter::once(&self.outer).chain(&self.holes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrainLine {
    pub origin: Point2<f64>,
    pub direction: Vector2<f64>,
    pub length: f64,
}

/// Alignment mark on a shared seam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notch {
    /// Fraction of the seam span from its `from` end.
    pub arc_fraction: f64,
    pub paired_patch_id: PatchId,
    pub seam: String,
    pub position: Point2<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceLabel {
    pub position: Point2<f64>,
    pub text: String,
    pub cut_quantity: u32,
    pub fabric: String,
}

/// Everything the seam stage adds to a piece.
#[derive(Debug, Clone, PartialEq)]
pub struct SeamAnnotation {
    pub seam_curve: SeamCurve,
    pub grain_line: GrainLine,
    pub notches: Vec<Notch>,
    pub label: PieceLabel,
}

/// Annotate a flattened piece.
pub fn annotate(
    flat: &FlattenedPatch,
    ctx: &PieceContext<'_>,
) -> Result<SeamAnnotation, GeometryError> {
    let outline = flat.outline();
    let bounds = Bounds2::from_points(&outline).ok_or_else(|| GeometryError::NonManifoldPatch {
        piece: ctx.piece_name().to_string(),
        details: "empty outline".into(),
    })?;

    let seam_curve = seam_curve(flat, ctx)?;
    let grain_line = grain_line(&bounds, ctx.piece.grain_angle_deg);
    let notches = notches(flat, ctx, &outline);
    let label = PieceLabel {
        position: bounds.center(),
        text: ctx.piece.name.clone(),
        cut_quantity: ctx.piece.label.cut_quantity,
        fabric: ctx.piece.label.fabric.clone(),
    };

    debug!(
        "Annotated '{}': {} notches, join {:?}",
        ctx.piece_name(),
        notches.len(),
        seam_curve.join
    );

    Ok(SeamAnnotation {
        seam_curve,
        grain_line,
        notches,
        label,
    })
}

/// Offset every boundary loop away from the fabric.
pub fn seam_curve(flat: &FlattenedPatch, ctx: &PieceContext<'_>) -> Result<SeamCurve, GeometryError> {
    let config = ctx.config;
    let allowance = config.seam_allowance;

    let mut loops: Vec<Vec<Point2<f64>>> = Vec::with_capacity(flat.patch.loops.len());
    let mut join = config.corner_join_policy;
    let mut warning = None;

    for (index, raw) in (0..flat.patch.loops.len()).map(|i| (i, flat.loop_polygon(i))) {
        let mut poly = polygon::dedup_points(&raw, DEDUP_EPS);
        // Outer loops run counter-clockwise, holes clockwise, so the right
        // side of every edge faces away from the fabric.
        let area = polygon::signed_area(&poly);
        if (index == 0 && area < 0.0) || (index > 0 && area > 0.0) {
            poly.reverse();
        }

        let offset = offset_polygon(&poly, allowance, config.corner_join_policy, config.miter_limit);
        if polygon::is_simple(&offset) {
            loops.push(offset);
            continue;
        }

        let intersections = polygon::self_intersections(&offset).len();
        warn!(
            "Seam allowance of '{}' loop {} self-intersects ({} crossings), retrying with round joins",
            ctx.piece_name(),
            index,
            intersections
        );
        let fallback = polygon::remove_self_loops(&offset_polygon_fallback(&poly, allowance));
        if !polygon::is_simple(&fallback) {
            return Err(GeometryError::SeamSelfIntersection {
                piece: ctx.piece_name().to_string(),
                loop_index: index,
            });
        }
        join = CornerJoinPolicy::Round;
        warning.get_or_insert(SeamOffsetWarning {
            loop_index: index,
            intersections,
        });
        loops.push(fallback);
    }

    let mut loops = loops.into_iter();
    let outer = loops.next().unwrap_or_default();
    Ok(SeamCurve {
        outer,
        holes: loops.collect(),
        allowance,
        join,
        warning,
    })
}

/// Right-hand unit normal of the edge `a -> b`.
fn edge_normal(a: Point2<f64>, b: Point2<f64>) -> Option<Vector2<f64>> {
    let d = b - a;
    let len = d.norm();
    (len > DEDUP_EPS).then(|| Vector2::new(d.y, -d.x) / len)
}

/// Offset a closed polygon by `distance` to the right of its edges.
pub fn offset_polygon(
    poly: &[Point2<f64>],
    distance: f64,
    policy: CornerJoinPolicy,
    miter_limit: f64,
) -> Vec<Point2<f64>> {
    offset_with(poly, distance, |out, p, n1, n2| {
        let turn = polygon::cross(&n1, &n2);
        let denom = 1.0 + n1.dot(&n2);
        if turn.abs() <= 1e-12 && denom > 1.0 {
            out.push(p + n1 * distance);
        } else if turn < 0.0 {
            // Offset lines overlap: meet at their intersection.
            out.push(p + (n1 + n2) * (distance / denom));
        } else {
            let miter = (n1 + n2) * (distance / denom.max(1e-12));
            if policy == CornerJoinPolicy::Miter && denom > 1e-12 && miter.norm() <= miter_limit * distance {
                out.push(p + miter);
            } else {
                round_join(out, p, n1, n2, distance);
            }
        }
    })
}

/// Round joins everywhere; overlapping corners keep both offset points so
/// loop removal can cut them out.
fn offset_polygon_fallback(poly: &[Point2<f64>], distance: f64) -> Vec<Point2<f64>> {
    offset_with(poly, distance, |out, p, n1, n2| {
        let turn = polygon::cross(&n1, &n2);
        if turn > 1e-12 {
            round_join(out, p, n1, n2, distance);
        } else if turn < -1e-12 {
            out.push(p + n1 * distance);
            out.push(p + n2 * distance);
        } else {
            out.push(p + n1 * distance);
        }
    })
}

fn offset_with(
    poly: &[Point2<f64>],
    distance: f64,
    mut corner: impl FnMut(&mut Vec<Point2<f64>>, Point2<f64>, Vector2<f64>, Vector2<f64>),
) -> Vec<Point2<f64>> {
    let n = poly.len();
    if n < 3 || distance == 0.0 {
        return poly.to_vec();
    }

    let mut out = Vec::with_capacity(n * 2);
    for i in 0..n {
        let prev = poly[(i + n - 1) % n];
        let p = poly[i];
        let next = poly[(i + 1) % n];
        let (Some(n1), Some(n2)) = (edge_normal(prev, p), edge_normal(p, next)) else {
            continue;
        };
        corner(&mut out, p, n1, n2);
    }
    polygon::dedup_points(&out, DEDUP_EPS)
}

/// Arc around `p` from `n1` to `n2`, in steps of at most ten degrees.
fn round_join(out: &mut Vec<Point2<f64>>, p: Point2<f64>, n1: Vector2<f64>, n2: Vector2<f64>, distance: f64) {
    let sweep = polygon::cross(&n1, &n2).atan2(n1.dot(&n2));
    let steps = (sweep.abs() / ROUND_STEP).ceil().max(1.0) as usize;
    for k in 0..=steps {
        let rot = Rotation2::new(sweep * k as f64 / steps as f64);
        out.push(p + rot * n1 * distance);
    }
}

fn grain_line(bounds: &Bounds2, angle_deg: f64) -> GrainLine {
    let theta = angle_deg.to_radians();
    GrainLine {
        origin: bounds.center(),
        direction: Vector2::new(theta.sin(), theta.cos()),
        length: GRAIN_FRACTION * bounds.height(),
    }
}

/// Stretch of an outline covered by one side of a seam, walked from its
/// `from` end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SeamArc {
    /// Arc position of the `from` end.
    pub from: f64,
    pub length: f64,
    /// `1.0` along the outline's direction, `-1.0` against it.
    pub sign: f64,
}

impl SeamArc {
    /// Locate a seam side on the outline of `flat`.
    ///
    /// The seam takes the way round through its `via` keypoint when it has
    /// one, otherwise the shorter way between its ends.
    pub fn locate(flat: &FlattenedPatch, outline: &[Point2<f64>], side: &SeamSide) -> Option<Self> {
        let perimeter = polygon::perimeter(outline);
        let arc = |name: &str| Some(polygon::project_to_boundary(outline, flat.landmark(name)?)?.arc);

        let from = arc(&side.from)?;
        let forward = (arc(&side.to)? - from).rem_euclid(perimeter);
        let backward = perimeter - forward;
        let along = match side.via.as_deref().and_then(arc) {
            Some(via) => (via - from).rem_euclid(perimeter) <= forward,
            None => forward <= backward,
        };

        Some(if along {
            Self {
                from,
                length: forward,
                sign: 1.0,
            }
        } else {
            Self {
                from,
                length: backward,
                sign: -1.0,
            }
        })
    }

    /// Arc position `fraction` of the way from the `from` end.
    pub fn at(&self, fraction: f64) -> f64 {
        self.from + self.sign * fraction * self.length
    }

    /// Start of the covered interval in the outline's direction.
    pub fn start(&self) -> f64 {
        if self.sign > 0.0 {
            self.from
        } else {
            self.from - self.length
        }
    }
}

/// Notches on every seam shared with a piece that produced a patch.
fn notches(flat: &FlattenedPatch, ctx: &PieceContext<'_>, outline: &[Point2<f64>]) -> Vec<Notch> {
    let mut out = Vec::new();

    for (seam, own, other) in ctx.template.seams_for(ctx.piece_name()) {
        let Some(paired) = ctx.patch_id(&other.piece) else {
            continue;
        };
        let Some(arc) = SeamArc::locate(flat, outline, own) else {
            warn!("Seam '{}' ends not found on '{}'", seam.name, ctx.piece_name());
            continue;
        };

        for fraction in seam.notch_fractions() {
            let Some(position) = polygon::point_at_arc(outline, arc.at(fraction)) else {
                continue;
            };
            out.push(Notch {
                arc_fraction: fraction,
                paired_patch_id: paired,
                seam: seam.name.clone(),
                position,
            });
        }
    }

    if !out.is_empty() {
        info!("Placed {} notches on '{}'", out.len(), ctx.piece_name());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternConfig;
    use crate::synthetic;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn rect(w: f64, h: f64) -> Vec<Point2<f64>> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(w, 0.0),
            Point2::new(w, h),
            Point2::new(0.0, h),
        ]
    }

    #[test]
    fn test_miter_offset_of_rectangle() {
        let out = offset_polygon(&rect(4.0, 2.0), 1.0, CornerJoinPolicy::Miter, 4.0);
        assert_eq!(out.len(), 4);
        let b = Bounds2::from_points(&out).unwrap();
        assert_relative_eq!(b.min, Point2::new(-1.0, -1.0), epsilon = 1e-12);
        assert_relative_eq!(b.max, Point2::new(5.0, 3.0), epsilon = 1e-12);
    }

    #[test]
    fn test_round_offset_keeps_distance() {
        let poly = rect(4.0, 2.0);
        let out = offset_polygon(&poly, 1.0, CornerJoinPolicy::Round, 4.0);
        // Quarter circles in steps of at most ten degrees.
        assert!(out.len() >= 4 * 10);
        for p in &out {
            assert_relative_eq!(polygon::distance_to_boundary(&poly, *p), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_sharp_corner_falls_back_to_round_under_miter_limit() {
        let spike = vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(0.0, 0.5),
        ];
        let out = offset_polygon(&spike, 1.0, CornerJoinPolicy::Miter, 2.0);
        assert!(out.len() > 3, "the acute corner is rounded");
        for p in &out {
            assert!(polygon::distance_to_boundary(&spike, *p) >= 1.0 - 1e-9);
        }
    }

    #[test]
    fn test_concave_corner_meets_at_intersection() {
        // L-shape, counter-clockwise.
        let l = vec![
            Point2::new(0.0, 0.0),
            Point2::new(4.0, 0.0),
            Point2::new(4.0, 2.0),
            Point2::new(2.0, 2.0),
            Point2::new(2.0, 4.0),
            Point2::new(0.0, 4.0),
        ];
        let out = offset_polygon(&l, 0.5, CornerJoinPolicy::Miter, 4.0);
        assert!(out.iter().any(|p| (p - Point2::new(2.5, 2.5)).norm() < 1e-12));
        assert!(polygon::is_simple(&out));
    }

    #[test]
    fn test_hole_is_offset_into_the_hole() {
        // Clockwise square hole.
        let mut hole = rect(4.0, 4.0);
        hole.reverse();
        let out = offset_polygon(&hole, 1.0, CornerJoinPolicy::Miter, 4.0);
        let b = Bounds2::from_points(&out).unwrap();
        assert_relative_eq!(b.min, Point2::new(1.0, 1.0), epsilon = 1e-12);
        assert_relative_eq!(b.max, Point2::new(3.0, 3.0), epsilon = 1e-12);
    }

    #[test]
    fn test_notch_slit_needs_fallback() {
        // A narrow slot: offsetting closes it and the loop must be cut.
        let slot = vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(5.2, 10.0),
            Point2::new(5.2, 3.0),
            Point2::new(4.8, 3.0),
            Point2::new(4.8, 10.0),
            Point2::new(0.0, 10.0),
        ];
        let raw = offset_polygon(&slot, 1.0, CornerJoinPolicy::Miter, 4.0);
        assert!(!polygon::is_simple(&raw));

        let repaired = polygon::remove_self_loops(&offset_polygon_fallback(&slot, 1.0));
        assert!(polygon::is_simple(&repaired));
    }

    #[test]
    fn test_torso_annotation() {
        let fixture = synthetic::TorsoFixture::new();
        let flat = fixture.flatten("front").unwrap();
        let ctx = fixture.context("front").unwrap();
        let annotation = annotate(&flat, &ctx).unwrap();

        let outline = Bounds2::from_points(&flat.outline()).unwrap();
        let seam = Bounds2::from_points(&annotation.seam_curve.outer).unwrap();
        assert_relative_eq!(seam.width(), outline.width() + 2.0, epsilon = 1e-9);
        assert_relative_eq!(seam.height(), outline.height() + 2.0, epsilon = 1e-9);
        assert!(annotation.seam_curve.warning.is_none());

        assert_relative_eq!(annotation.grain_line.direction, Vector2::new(0.0, 1.0), epsilon = 1e-12);
        assert_relative_eq!(annotation.grain_line.length, 0.7 * synthetic::TORSO_HEIGHT, epsilon = 1e-9);
        assert_eq!(annotation.label.text, "front");

        // One notch at mid height on each side seam, paired with the back.
        assert_eq!(annotation.notches.len(), 2);
        for notch in &annotation.notches {
            assert_eq!(notch.paired_patch_id, PatchId(1));
            assert_relative_eq!(notch.arc_fraction, 0.5);
            assert_relative_eq!(notch.position.y, outline.center().y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_zero_allowance_is_the_outline() {
        let fixture = synthetic::TorsoFixture::new()
            .with_config(PatternConfig::default().with_seam_allowance(0.0));
        let flat = fixture.flatten("back").unwrap();
        let curve = seam_curve(&flat, &fixture.context("back").unwrap()).unwrap();
        assert_eq!(curve.outer, polygon::dedup_points(&flat.outline(), DEDUP_EPS));
    }

    #[test]
    fn test_seam_arc_follows_its_via_keypoint() {
        let fixture = synthetic::TorsoFixture::new();
        let flat = fixture.flatten("front").unwrap();
        let outline = flat.outline();
        let bounds = Bounds2::from_points(&outline).unwrap();
        let top = flat.landmark("side_left_top").unwrap();

        let mut side = SeamSide {
            piece: "front".into(),
            from: "side_left_top".into(),
            to: "side_left_bottom".into(),
            via: None,
        };
        let short = SeamArc::locate(&flat, &outline, &side).unwrap();
        assert_relative_eq!(short.length, synthetic::TORSO_HEIGHT, epsilon = 1e-9);
        let mid = polygon::point_at_arc(&outline, short.at(0.5)).unwrap();
        assert_relative_eq!(mid.x, top.x, epsilon = 1e-9);

        // Round the far side: across the neckline, down the other side seam
        // and back along the hem.
        side.via = Some("side_right_bottom".into());
        let long = SeamArc::locate(&flat, &outline, &side).unwrap();
        assert_relative_eq!(
            long.length,
            polygon::perimeter(&outline) - synthetic::TORSO_HEIGHT,
            epsilon = 1e-9
        );
        let mid = polygon::point_at_arc(&outline, long.at(0.5)).unwrap();
        assert_relative_eq!((mid.x - top.x).abs(), bounds.width(), epsilon = 1e-9);
        assert_relative_eq!(mid.y, bounds.center().y, epsilon = 1e-9);
    }

    fn convex_polygon() -> impl Strategy<Value = Vec<Point2<f64>>> {
        (
            prop::collection::vec(1.0..10.0f64, 3..12),
            0.0..std::f64::consts::TAU,
            2.0..20.0f64,
        )
            .prop_map(|(gaps, start, radius)| {
                let total: f64 = gaps.iter().sum();
                let mut angle = start;
                gaps.iter()
                    .map(|g| {
                        angle += g / total * std::f64::consts::TAU;
                        Point2::new(radius * angle.cos(), radius * angle.sin())
                    })
                    .collect()
            })
    }

    proptest! {
        #[test]
        fn prop_outline_points_are_one_allowance_from_seam(
            poly in convex_polygon(),
            allowance in 0.1..3.0f64,
        ) {
            let out = offset_polygon(&poly, allowance, CornerJoinPolicy::Miter, 1e6);
            prop_assert!(polygon::is_simple(&out));
            for p in &poly {
                let d = polygon::distance_to_boundary(&out, *p);
                prop_assert!((d - allowance).abs() < 1e-6, "distance {} vs {}", d, allowance);
            }
        }
    }
}
