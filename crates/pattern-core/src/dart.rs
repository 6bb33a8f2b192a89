//! Ease detection and dart placement.
//!
//! At every cross-section of a piece the flattened width is compared with
//! the piece's share of the body measurement. Excess beyond the tolerance is
//! taken in by darts whose legs sit on the outer boundary; each dart takes
//! `excess / n` in total, and `n` doubles while a leg would be wider than
//! `max_dart_width`.

use nalgebra::{Point2, Vector2};
use pattern_mesh::polygon;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::PieceContext;
use crate::error::GeometryError;
use crate::flatten::FlattenedPatch;
use crate::seam::{SeamArc, SeamCurve};
use crate::template::{CrossSection, DartOpening};

/// A wedge sewn out of the piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dart {
    pub apex: Point2<f64>,
    pub leg_a: Point2<f64>,
    pub leg_b: Point2<f64>,
    /// Total intake (both legs).
    pub width: f64,
    /// Apex to the boundary midpoint between the legs.
    pub depth: f64,
    /// Cross-section the dart resolves.
    pub section: String,
}

/// Width of a piece at one cross-section against its body target.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionEase {
    pub section: String,
    /// Height of the section line.
    pub level: f64,
    pub length: f64,
    pub target: f64,
    pub excess: f64,
}

/// Measure the ease at a cross-section; `None` when the section keypoint is
/// not on the piece or the body lacks the dimension.
pub fn measure_section(
    flat: &FlattenedPatch,
    section: &CrossSection,
    ctx: &PieceContext<'_>,
) -> Option<SectionEase> {
    let level = flat.landmark(&section.at)?.y + section.offset;
    let length = polygon::chord_length(&flat.outline(), level);
    let target = section.share * ctx.reference.get(section.dimension)?;
    Some(SectionEase {
        section: section.name.clone(),
        level,
        length,
        target,
        excess: length - target,
    })
}

/// Number of darts and the leg width each gets.
///
/// Halving continues while a leg is wider than `max_width`; when the count
/// would exceed `max_count` the remaining ease is returned as the error.
pub fn split_ease(excess: f64, max_width: f64, max_count: usize) -> Result<(usize, f64), f64> {
    let mut n = 1usize;
    loop {
        let leg = excess / (2 * n) as f64;
        if leg <= max_width {
            return Ok((n, leg));
        }
        if 2 * n > max_count {
            return Err(excess - (n as f64) * 2.0 * max_width);
        }
        n *= 2;
    }
}

/// Arc interval on a closed boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Span {
    start: f64,
    len: f64,
}

impl Span {
    fn contains(&self, s: f64, perimeter: f64) -> bool {
        (s - self.start).rem_euclid(perimeter) < self.len
    }

    fn overlaps(&self, other: &Span, perimeter: f64) -> bool {
        self.contains(other.start, perimeter) || other.contains(self.start, perimeter)
    }
}

/// Plan the darts of one piece.
///
/// `existing` are seam curves already placed for this piece; dart legs may
/// not cross them. Darts are also kept off the piece's own seam spans and
/// off each other by sliding along the boundary.
pub fn plan_darts(
    flat: &FlattenedPatch,
    ctx: &PieceContext<'_>,
    existing: &[SeamCurve],
) -> Result<Vec<Dart>, GeometryError> {
    let config = ctx.config;
    let outline = flat.outline();
    let perimeter = polygon::perimeter(&outline);
    if ctx.piece.cross_sections.is_empty() || perimeter <= 0.0 {
        return Ok(Vec::new());
    }

    let seam_spans = own_seam_spans(flat, ctx, &outline, perimeter);
    let mut placed_spans: Vec<Span> = Vec::new();
    let mut darts = Vec::new();

    for section in &ctx.piece.cross_sections {
        let Some(ease) = measure_section(flat, section, ctx) else {
            warn!(
                "Section '{}' of '{}' cannot be measured",
                section.name,
                ctx.piece_name()
            );
            continue;
        };
        debug!(
            "Section '{}' of '{}': length {:.3}, target {:.3}, excess {:.3}",
            ease.section,
            ctx.piece_name(),
            ease.length,
            ease.target,
            ease.excess
        );
        if ease.excess <= config.ease_tolerance {
            continue;
        }

        let (count, leg) = split_ease(ease.excess, config.max_dart_width, config.max_dart_count)
            .map_err(|residual| {
                warn!(
                    "Unresolved ease {:.3} at '{}' of '{}'",
                    residual,
                    section.name,
                    ctx.piece_name()
                );
                GeometryError::UnresolvedEase {
                    piece: ctx.piece_name().to_string(),
                    section: section.name.clone(),
                    residual,
                }
            })?;
        let apex = section_apex(flat, section, &outline, ease.level);
        let dir = match section.opens {
            DartOpening::Down => Vector2::new(0.0, -1.0),
            DartOpening::Up => Vector2::new(0.0, 1.0),
        };

        for apex_k in split_apices(&outline, apex, ease.level, count) {
            let conflict = || GeometryError::DartConflict {
                piece: ctx.piece_name().to_string(),
                section: section.name.clone(),
            };

            // A ray that leaves through no edge starts from the nearest
            // boundary point instead.
            let start = polygon::ray_hit(&outline, apex_k, dir, 1e-9)
                .map(|hit| hit.arc)
                .or_else(|| polygon::project_to_boundary(&outline, apex_k).map(|p| p.arc))
                .ok_or_else(conflict)?;
            let (dart, span) = slide_dart(
                &outline,
                perimeter,
                apex_k,
                start,
                leg,
                config.max_dart_slide_steps,
                |span, dart_apex, leg_a, leg_b| {
                    seam_spans.iter().any(|s| s.overlaps(span, perimeter))
                        || placed_spans.iter().any(|s| s.overlaps(span, perimeter))
                        || crosses_curves(existing, dart_apex, leg_a, leg_b)
                },
            )
            .ok_or_else(conflict)?;

            placed_spans.push(span);
            darts.push(Dart {
                section: section.name.clone(),
                ..dart
            });
        }
    }

    if !darts.is_empty() {
        info!("Placed {} darts on '{}'", darts.len(), ctx.piece_name());
    }

    Ok(darts)
}

/// Seam spans of this piece on its outer boundary.
fn own_seam_spans(
    flat: &FlattenedPatch,
    ctx: &PieceContext<'_>,
    outline: &[Point2<f64>],
    perimeter: f64,
) -> Vec<Span> {
    ctx.template
        .seams_for(ctx.piece_name())
        .filter_map(|(_, own, _)| {
            let arc = SeamArc::locate(flat, outline, own)?;
            Some(Span {
                start: arc.start().rem_euclid(perimeter),
                len: arc.length,
            })
        })
        .collect()
}

/// Apex for a section: the apex candidate nearest the curvature extremum on
/// the section line, or the extremum itself.
fn section_apex(
    flat: &FlattenedPatch,
    section: &CrossSection,
    outline: &[Point2<f64>],
    level: f64,
) -> Point2<f64> {
    let chords = polygon::horizontal_chords(outline, level);
    let mid_x = match (chords.first(), chords.last()) {
        (Some(first), Some(last)) => (first.0 + last.1) / 2.0,
        _ => flat.bounds().map_or(0.0, |b| b.center().x),
    };
    let midpoint = Point2::new(mid_x, level);

    let band = flat.patch.mean_edge_length() / 2.0;
    let defects = flat.patch.angle_defects();
    let mut extremum: Option<(f64, f64, usize)> = None;
    for (idx, p) in flat.positions.iter().enumerate() {
        if (p.y - level).abs() > band {
            continue;
        }
        let curvature = defects[idx].abs();
        let dist = (p - midpoint).norm();
        let better = match extremum {
            None => true,
            Some((best_c, best_d, _)) => {
                curvature > best_c + 1e-12 || ((curvature - best_c).abs() <= 1e-12 && dist < best_d)
            }
        };
        if better {
            extremum = Some((curvature, dist, idx));
        }
    }
    let extremum = extremum.map_or(midpoint, |(_, _, idx)| flat.positions[idx]);

    section
        .apex_candidates
        .iter()
        .filter_map(|name| flat.landmark(name))
        .fold(None::<Point2<f64>>, |best, p| match best {
            Some(b) if (b - extremum).norm() <= (p - extremum).norm() => Some(b),
            _ => Some(p),
        })
        .unwrap_or(extremum)
}

/// Apices of `count` darts on one section line.
///
/// A single dart keeps the section apex. Split darts divide the chord that
/// holds the apex into `count + 1` equal gaps.
fn split_apices(outline: &[Point2<f64>], apex: Point2<f64>, level: f64, count: usize) -> Vec<Point2<f64>> {
    if count <= 1 {
        return vec![apex];
    }
    let chords = polygon::horizontal_chords(outline, level);
    let chord = chords
        .iter()
        .find(|(lo, hi)| (*lo..=*hi).contains(&apex.x))
        .or_else(|| chords.iter().max_by(|a, b| (a.1 - a.0).total_cmp(&(b.1 - b.0))))
        .copied();
    let Some((lo, hi)) = chord else {
        return vec![apex; count];
    };
    let gap = (hi - lo) / (count + 1) as f64;
    (1..=count)
        .map(|k| Point2::new(lo + k as f64 * gap, apex.y))
        .collect()
}

/// Try leg centres at `s, s + leg, s - leg, s + 2 leg, ...` until one does
/// not conflict.
fn slide_dart(
    outline: &[Point2<f64>],
    perimeter: f64,
    apex: Point2<f64>,
    s: f64,
    leg: f64,
    max_steps: usize,
    conflicts: impl Fn(&Span, Point2<f64>, Point2<f64>, Point2<f64>) -> bool,
) -> Option<(Dart, Span)> {
    let center = polygon::point_at_arc(outline, s)?;

    for step in 0..=max_steps {
        let offset = match step {
            0 => 0.0,
            k if k % 2 == 1 => ((k + 1) / 2) as f64,
            k => -((k / 2) as f64),
        };
        let s_c = s + offset * leg;
        let center_c = polygon::point_at_arc(outline, s_c)?;
        let apex_c = apex + (center_c - center);
        let leg_a = polygon::point_at_arc(outline, s_c - leg)?;
        let leg_b = polygon::point_at_arc(outline, s_c + leg)?;
        let span = Span {
            start: (s_c - leg).rem_euclid(perimeter),
            len: 2.0 * leg,
        };

        if conflicts(&span, apex_c, leg_a, leg_b) {
            continue;
        }
        if step > 0 {
            debug!("Dart slid {} steps along the boundary", step);
        }
        return Some((
            Dart {
                apex: apex_c,
                leg_a,
                leg_b,
                width: 2.0 * leg,
                depth: (apex_c - center_c).norm(),
                section: String::new(),
            },
            span,
        ));
    }

    None
}

fn crosses_curves(
    curves: &[SeamCurve],
    apex: Point2<f64>,
    leg_a: Point2<f64>,
    leg_b: Point2<f64>,
) -> bool {
    curves.iter().flat_map(SeamCurve::loops).any(|poly| {
        let n = poly.len();
        (0..n).any(|i| {
            let (p, q) = (poly[i], poly[(i + 1) % n]);
            polygon::segments_intersect(apex, leg_a, p, q)
                || polygon::segments_intersect(apex, leg_b, p, q)
        })
    })
}
