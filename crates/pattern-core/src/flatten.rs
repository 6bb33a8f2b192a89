//! Distortion-minimizing flattening of patches.
//!
//! The initial embedding is the better of two candidates: unfolding the
//! triangles one by one across shared edges (exact for developable patches)
//! and projecting onto the mean-normal plane. Stress majorization then
//! relaxes every free vertex towards the positions that restore its 3D edge
//! lengths, sweeping vertices in index order so identical input always gives
//! bit-identical output.

use std::collections::VecDeque;
use std::sync::Arc;

use nalgebra::{Point2, Point3, Vector2, Vector3};
use pattern_mesh::polygon::{self, Bounds2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PatternConfig;
use crate::error::{FlattenError, GeometryError};
use crate::segment::Patch;
use crate::session::Interrupt;

/// Why a flattened patch is flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionWarningKind {
    /// The iteration cap was hit first; the best embedding was kept.
    NotConverged,
    /// Converged, but some vertex is stretched beyond `max_distortion`.
    ExceedsThreshold,
}

/// Non-fatal flattening quality warning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistortionWarning {
    pub kind: DistortionWarningKind,
    /// Largest 2D/3D edge length ratio.
    pub max_stretch: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DistortionSummary {
    pub max: f64,
    pub mean: f64,
}

impl DistortionSummary {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        Self {
            max: values.iter().copied().fold(0.0, f64::max),
            mean: values.iter().sum::<f64>() / values.len() as f64,
        }
    }
}

/// A patch laid flat.
#[derive(Debug, Clone)]
pub struct FlattenedPatch {
    pub patch: Arc<Patch>,
    /// 2D position of every local vertex.
    pub positions: Vec<Point2<f64>>,
    /// Per-vertex `max |l2d / l3d - 1|` over incident edges.
    pub distortion: Vec<f64>,
    pub summary: DistortionSummary,
    pub max_stretch: f64,
    pub iterations: usize,
    pub converged: bool,
    pub warning: Option<DistortionWarning>,
}

impl FlattenedPatch {
    pub fn piece_name(&self) -> &str {
        &self.patch.piece_name
    }

    /// Polygon of boundary loop `index`.
    pub fn loop_polygon(&self, index: usize) -> Vec<Point2<f64>> {
        self.patch
            .loops
            .get(index)
            .map(|l| l.vertices.iter().map(|&v| self.positions[v as usize]).collect())
            .unwrap_or_default()
    }

    /// Outer boundary, counter-clockwise.
    pub fn outline(&self) -> Vec<Point2<f64>> {
        self.loop_polygon(0)
    }

    /// Inner boundaries, clockwise.
    pub fn holes(&self) -> Vec<Vec<Point2<f64>>> {
        (1..self.patch.loops.len()).map(|i| self.loop_polygon(i)).collect()
    }

    /// 2D position of a tracked keypoint.
    pub fn landmark(&self, name: &str) -> Option<Point2<f64>> {
        self.patch
            .landmarks
            .get(name)
            .map(|&v| self.positions[v as usize])
    }

    pub fn bounds(&self) -> Option<Bounds2> {
        let outline = self.outline();
        Bounds2::from_points(&outline)
    }

    /// Same patch and distortion record with moved vertices.
    pub fn with_positions(&self, positions: Vec<Point2<f64>>) -> Self {
        Self {
            positions,
            ..self.clone()
        }
    }
}

/// Rest lengths of the patch edges.
struct Springs {
    edges: Vec<(usize, usize, f64)>,
    neighbors: Vec<Vec<(usize, f64)>>,
}

impl Springs {
    fn build(patch: &Patch) -> Self {
        let mut neighbors = vec![Vec::new(); patch.vertex_count()];
        let edges: Vec<(usize, usize, f64)> = patch
            .edges()
            .into_iter()
            .map(|(a, b)| {
                let rest = (patch.mesh.position(a) - patch.mesh.position(b)).norm();
                (a as usize, b as usize, rest)
            })
            .collect();
        for &(a, b, rest) in &edges {
            neighbors[a].push((b, rest));
            neighbors[b].push((a, rest));
        }
        Self { edges, neighbors }
    }

    /// `Σ (|p_i − p_j| − L_ij)²`.
    fn energy(&self, positions: &[Point2<f64>]) -> f64 {
        self.edges
            .iter()
            .map(|&(a, b, rest)| {
                let diff = (positions[a] - positions[b]).norm() - rest;
                diff * diff
            })
            .sum()
    }

    /// One Gauss–Seidel majorization sweep over the free vertices.
    fn sweep(&self, positions: &mut [Point2<f64>], fixed: &[bool]) {
        for i in 0..positions.len() {
            let neighbors = &self.neighbors[i];
            if fixed[i] || neighbors.is_empty() {
                continue;
            }
            let mut acc = Vector2::zeros();
            for &(j, rest) in neighbors {
                let pj = positions[j];
                let d = positions[i] - pj;
                let len = d.norm();
                let target = if len > 1e-12 { pj + d * (rest / len) } else { pj };
                acc += target.coords;
            }
            positions[i] = Point2::from(acc / neighbors.len() as f64);
        }
    }

    /// Per-vertex distortion and the largest edge stretch.
    fn measure(&self, positions: &[Point2<f64>]) -> (Vec<f64>, f64) {
        let mut distortion = vec![0.0f64; positions.len()];
        let mut max_stretch = 0.0f64;
        for &(a, b, rest) in &self.edges {
            if rest <= 1e-12 {
                continue;
            }
            let ratio = (positions[a] - positions[b]).norm() / rest;
            if !ratio.is_finite() {
                return (distortion, f64::INFINITY);
            }
            let dev = (ratio - 1.0).abs();
            distortion[a] = distortion[a].max(dev);
            distortion[b] = distortion[b].max(dev);
            max_stretch = max_stretch.max(ratio);
        }
        (distortion, max_stretch)
    }
}

/// Orthonormal plane frame with `v` along the projected up axis.
struct Frame {
    origin: Point3<f64>,
    u: Vector3<f64>,
    v: Vector3<f64>,
}

impl Frame {
    fn new(origin: Point3<f64>, normal: &Vector3<f64>, up: &Vector3<f64>) -> Self {
        let projected = up - normal * up.dot(normal);
        let v = if projected.norm() > 1e-9 {
            projected.normalize()
        } else {
            let axis = if normal.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
            (axis - normal * axis.dot(normal)).normalize()
        };
        Self {
            origin,
            u: v.cross(normal),
            v,
        }
    }

    fn project(&self, p: &Point3<f64>) -> Point2<f64> {
        let d = p - self.origin;
        Point2::new(d.dot(&self.u), d.dot(&self.v))
    }
}

fn centroid(patch: &Patch) -> Point3<f64> {
    let n = patch.vertex_count().max(1) as f64;
    let sum: Vector3<f64> = patch.mesh.vertices.iter().map(|v| v.position.coords).sum();
    Point3::from(sum / n)
}

/// Unfold triangles breadth-first from the face that best faces the
/// patch's mean normal; the lowest index wins ties.
fn unfold(patch: &Patch, origin: Point3<f64>) -> Option<Vec<Point2<f64>>> {
    let mesh = &patch.mesh;
    let reference = mesh.mean_normal();
    let (root, _) = mesh
        .triangles()
        .enumerate()
        .filter(|(_, t)| t.area() > 1e-12)
        .filter_map(|(idx, t)| t.normal().map(|n| (idx, reference.map_or(0.0, |r| n.dot(&r)))))
        .fold(None::<(usize, f64)>, |best, (idx, score)| match best {
            Some((_, b)) if b >= score => best,
            _ => Some((idx, score)),
        })?;
    let normal = mesh.triangle(root)?.normal()?;
    let frame = Frame::new(origin, &normal, &patch.up);

    let mut placed: Vec<Option<Point2<f64>>> = vec![None; mesh.vertex_count()];
    for &v in &mesh.faces[root] {
        placed[v as usize] = Some(frame.project(&mesh.position(v)));
    }

    let adjacency = mesh.adjacency();
    let mut visited = vec![false; mesh.face_count()];
    visited[root] = true;
    let mut queue = VecDeque::from([root as u32]);
    while let Some(face) = queue.pop_front() {
        for next in adjacency.face_neighbors(&mesh.faces, face) {
            if visited[next as usize] {
                continue;
            }
            visited[next as usize] = true;
            place_third(patch, mesh.faces[next as usize], &mut placed);
            queue.push_back(next);
        }
    }

    placed.into_iter().collect()
}

/// Place the one unplaced vertex of a face from its two placed neighbours,
/// on the side that keeps the face counter-clockwise.
fn place_third(patch: &Patch, face: [u32; 3], placed: &mut [Option<Point2<f64>>]) {
    let mesh = &patch.mesh;
    for k in 0..3 {
        let (i, j, m) = (face[k], face[(k + 1) % 3], face[(k + 2) % 3]);
        if placed[m as usize].is_some() {
            continue;
        }
        let (Some(pi), Some(pj)) = (placed[i as usize], placed[j as usize]) else {
            continue;
        };

        let la = (mesh.position(m) - mesh.position(i)).norm();
        let lb = (mesh.position(m) - mesh.position(j)).norm();
        let e = pj - pi;
        let d = e.norm();
        if d <= 1e-12 {
            placed[m as usize] = Some(pi);
            return;
        }
        let e = e / d;
        let x = (la * la - lb * lb + d * d) / (2.0 * d);
        let h = (la * la - x * x).max(0.0).sqrt();
        let left = Vector2::new(-e.y, e.x);
        placed[m as usize] = Some(pi + e * x + left * h);
        return;
    }
}

/// Orthographic projection onto the area-weighted mean-normal plane.
fn project(patch: &Patch, origin: Point3<f64>) -> Option<Vec<Point2<f64>>> {
    let normal = patch.mesh.mean_normal()?;
    let frame = Frame::new(origin, &normal, &patch.up);
    Some(
        patch
            .mesh
            .vertices
            .iter()
            .map(|v| frame.project(&v.position))
            .collect(),
    )
}

/// Reject embeddings whose outer loop crosses itself or whose holes are not
/// clockwise loops inside it.
fn check_boundary(patch: &Patch, positions: &[Point2<f64>]) -> Result<(), GeometryError> {
    let loop_polygon = |index: usize| -> Vec<Point2<f64>> {
        patch.loops[index]
            .vertices
            .iter()
            .map(|&v| positions[v as usize])
            .collect()
    };
    let overlapping = |details: String| {
        warn!("Flattened '{}' overlaps itself: {}", patch.piece_name, details);
        GeometryError::NonManifoldPatch {
            piece: patch.piece_name.clone(),
            details: format!("self-overlapping flat boundary, {details}"),
        }
    };

    if patch.loops.is_empty() {
        return Ok(());
    }
    let outer = loop_polygon(0);
    let crossings = polygon::self_intersections(&outer).len();
    if crossings > 0 {
        return Err(overlapping(format!("outline crosses itself {crossings} times")));
    }

    for index in 1..patch.loops.len() {
        let hole = loop_polygon(index);
        let nested = polygon::signed_area(&hole) < 0.0
            && polygon::is_simple(&hole)
            && hole.iter().all(|&p| polygon::contains_point(&outer, p));
        if !nested {
            return Err(overlapping(format!("loop {index} is not a hole inside the outline")));
        }
    }
    Ok(())
}

/// Flatten one patch.
///
/// Checks `interrupt` before every relaxation sweep; an interrupted run
/// returns nothing of the partial embedding. Hitting the iteration cap is
/// not an error: the best embedding is returned with a
/// [`DistortionWarningKind::NotConverged`] warning. An embedding whose
/// boundary overlaps itself is a [`GeometryError::NonManifoldPatch`].
pub fn flatten(
    patch: Arc<Patch>,
    config: &PatternConfig,
    interrupt: &Interrupt,
) -> Result<FlattenedPatch, FlattenError> {
    let diverged = |max_stretch: f64| {
        FlattenError::Geometry(GeometryError::FlattenDivergence {
            piece: patch.piece_name.clone(),
            max_stretch,
        })
    };

    let springs = Springs::build(&patch);
    let origin = centroid(&patch);

    // Step 1: Initial embedding, lower energy wins (unfolding on ties)
    let mut positions = [unfold(&patch, origin), project(&patch, origin)]
        .into_iter()
        .flatten()
        .map(|p| (springs.energy(&p), p))
        .filter(|(e, _)| e.is_finite())
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, p)| p)
        .ok_or_else(|| diverged(f64::INFINITY))?;

    let mut fixed = vec![false; positions.len()];
    for &a in &patch.anchors {
        fixed[a as usize] = true;
    }

    // Step 2: Relax until the energy stops decreasing
    let mut energy = springs.energy(&positions);
    let mut best = positions.clone();
    let mut best_energy = energy;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.flatten_iteration_cap {
        if let Some(reason) = interrupt.check() {
            debug!("Flattening '{}' interrupted: {}", patch.piece_name, reason);
            return Err(FlattenError::Interrupted(reason));
        }

        springs.sweep(&mut positions, &fixed);
        iterations += 1;

        let next = springs.energy(&positions);
        if !next.is_finite() {
            return Err(diverged(f64::INFINITY));
        }
        if next < best_energy {
            best.clone_from(&positions);
            best_energy = next;
        }
        let decrease = energy - next;
        energy = next;
        if decrease < config.flatten_convergence_epsilon {
            converged = true;
            break;
        }
    }
    let mut positions = best;

    // Step 3: Outer boundary counter-clockwise
    if let Some(outer) = patch.loops.first() {
        let poly: Vec<Point2<f64>> = outer.vertices.iter().map(|&v| positions[v as usize]).collect();
        if polygon::signed_area(&poly) < 0.0 {
            for p in &mut positions {
                p.x = -p.x;
            }
        }
    }

    // Step 4: The boundary must lie flat without overlapping itself
    check_boundary(&patch, &positions)?;

    // Step 5: Distortion
    let (distortion, max_stretch) = springs.measure(&positions);
    if !max_stretch.is_finite() || max_stretch > config.max_stretch_bound {
        warn!(
            "Flattening '{}' diverged: max stretch {}",
            patch.piece_name, max_stretch
        );
        return Err(diverged(max_stretch));
    }
    let summary = DistortionSummary::from_values(&distortion);

    let warning = if !converged {
        Some(DistortionWarningKind::NotConverged)
    } else if summary.max > config.max_distortion {
        Some(DistortionWarningKind::ExceedsThreshold)
    } else {
        None
    }
    .map(|kind| DistortionWarning {
        kind,
        max_stretch,
        iterations,
    });

    if let Some(w) = &warning {
        warn!(
            "Patch '{}': {:?} (max stretch {:.4}, {} iterations)",
            patch.piece_name, w.kind, w.max_stretch, w.iterations
        );
    }
    info!(
        "Flattened '{}': {} vertices, {} iterations, max distortion {:.2e}",
        patch.piece_name,
        positions.len(),
        iterations,
        summary.max
    );

    Ok(FlattenedPatch {
        patch,
        positions,
        distortion,
        summary,
        max_stretch,
        iterations,
        converged,
        warning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CancelReason;
    use crate::session::CancelToken;
    use crate::synthetic;
    use approx::assert_relative_eq;

    #[test]
    fn test_planar_patch_has_zero_distortion() {
        let patch = Arc::new(synthetic::planar_patch(6, 4, 2.0));
        let flat = flatten(patch, &PatternConfig::default(), &Interrupt::never()).unwrap();

        assert!(flat.converged);
        assert!(flat.warning.is_none());
        assert!(flat.summary.max < 1e-9, "max distortion {}", flat.summary.max);
        assert_relative_eq!(flat.max_stretch, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_outline_is_counter_clockwise() {
        let patch = Arc::new(synthetic::planar_patch(3, 3, 1.0));
        let flat = flatten(patch, &PatternConfig::default(), &Interrupt::never()).unwrap();
        assert!(polygon::signed_area(&flat.outline()) > 0.0);
        assert_relative_eq!(polygon::signed_area(&flat.outline()), 9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_torso_front_unrolls_exactly() {
        let front = synthetic::torso_patch("front");
        let flat = flatten(front, &PatternConfig::default(), &Interrupt::never()).unwrap();
        let bounds = flat.bounds().unwrap();

        assert!(flat.summary.max < 1e-9);
        assert_relative_eq!(
            bounds.width(),
            2.0 * synthetic::TORSO_HALF_WIDTH + 2.0 * synthetic::TORSO_HALF_DEPTH,
            epsilon = 1e-9
        );
        assert_relative_eq!(bounds.height(), synthetic::TORSO_HEIGHT, epsilon = 1e-9);

        // Up stays up.
        let top = flat.landmark("side_left_top").unwrap();
        let bottom = flat.landmark("side_left_bottom").unwrap();
        assert!(top.y > bottom.y);
    }

    #[test]
    fn test_curved_patch_with_one_iteration_warns() {
        let cap = Arc::new(synthetic::hemisphere_patch(10.0, 8, 16));
        let config = PatternConfig::default().with_flatten_limits(1, 1e-12);
        let flat = flatten(cap, &config, &Interrupt::never()).unwrap();

        let warning = flat.warning.expect("capped run warns");
        assert_eq!(warning.kind, DistortionWarningKind::NotConverged);
        assert_eq!(warning.iterations, 1);
        assert!(warning.max_stretch.is_finite() && warning.max_stretch > 0.0);
        assert!(!flat.converged);
    }

    #[test]
    fn test_converged_but_distorted_exceeds_threshold() {
        let cap = Arc::new(synthetic::hemisphere_patch(10.0, 8, 16));
        let mut config = PatternConfig::default().with_flatten_limits(50, 1e9);
        config.max_distortion = 1e-6;
        let flat = flatten(cap, &config, &Interrupt::never()).unwrap();

        assert!(flat.converged);
        assert_eq!(
            flat.warning.map(|w| w.kind),
            Some(DistortionWarningKind::ExceedsThreshold)
        );
    }

    #[test]
    fn test_flattening_is_deterministic() {
        let config = PatternConfig::default().with_flatten_limits(40, 1e-12);
        let a = flatten(
            Arc::new(synthetic::hemisphere_patch(10.0, 6, 12)),
            &config,
            &Interrupt::never(),
        )
        .unwrap();
        let b = flatten(
            Arc::new(synthetic::hemisphere_patch(10.0, 6, 12)),
            &config,
            &Interrupt::never(),
        )
        .unwrap();
        assert_eq!(a.positions, b.positions);
        assert_eq!(a.distortion, b.distortion);
    }

    #[test]
    fn test_relaxation_does_not_increase_energy() {
        let patch = synthetic::hemisphere_patch(10.0, 6, 12);
        let springs = Springs::build(&patch);
        let mut positions = project(&patch, centroid(&patch)).unwrap();
        let mut fixed = vec![false; positions.len()];
        fixed[patch.anchors[0] as usize] = true;

        let mut energy = springs.energy(&positions);
        for _ in 0..20 {
            springs.sweep(&mut positions, &fixed);
            let next = springs.energy(&positions);
            assert!(next <= energy + 1e-9);
            energy = next;
        }
    }

    #[test]
    fn test_cancelled_session_stops_flattening() {
        let token = CancelToken::new();
        token.cancel();
        let interrupt = Interrupt::new(token, None);
        let err = flatten(
            Arc::new(synthetic::planar_patch(3, 3, 1.0)),
            &PatternConfig::default(),
            &interrupt,
        )
        .unwrap_err();
        assert_eq!(err, FlattenError::Interrupted(CancelReason::Cancelled));
    }

    #[test]
    fn test_tiny_stretch_bound_is_divergence() {
        let cap = Arc::new(synthetic::hemisphere_patch(10.0, 6, 12));
        let mut config = PatternConfig::default().with_flatten_limits(1, 1e-12);
        config.max_stretch_bound = 0.5;
        let err = flatten(cap, &config, &Interrupt::never()).unwrap_err();
        assert!(matches!(
            err,
            FlattenError::Geometry(GeometryError::FlattenDivergence { .. })
        ));
    }

    /// Open cylinder around the `y` axis: two boundary loops, wound outward.
    fn open_tube(radius: f64, segments: u32, rows: u32) -> Patch {
        let positions = (0..=rows).flat_map(|k| {
            (0..segments).map(move |s| {
                let phi = std::f64::consts::TAU * s as f64 / segments as f64;
                Point3::new(radius * phi.cos(), k as f64, radius * phi.sin())
            })
        });
        let mut faces = Vec::new();
        for k in 0..rows {
            for s in 0..segments {
                let a = k * segments + s;
                let b = k * segments + (s + 1) % segments;
                let (c, d) = (b + segments, a + segments);
                faces.push([a, d, c]);
                faces.push([a, c, b]);
            }
        }
        let count = segments * (rows + 1);
        Patch::new(
            crate::segment::PatchId(0),
            "tube",
            pattern_mesh::Mesh::from_parts(positions, faces),
            (0..count).collect(),
            Vector3::y(),
        )
        .unwrap()
    }

    #[test]
    fn test_open_tube_cannot_lie_flat() {
        let tube = open_tube(5.0, 16, 6);
        assert_eq!(tube.loops.len(), 2);

        let err = flatten(Arc::new(tube), &PatternConfig::default(), &Interrupt::never()).unwrap_err();
        match err {
            FlattenError::Geometry(GeometryError::NonManifoldPatch { piece, details }) => {
                assert_eq!(piece, "tube");
                assert!(details.contains("self-overlapping"), "{details}");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_disc_with_hole_flattens() {
        // A 3x3 grid without its middle square.
        let grid = synthetic::planar_patch(3, 3, 1.0);
        let faces: Vec<[u32; 3]> = grid
            .mesh
            .triangles()
            .zip(&grid.mesh.faces)
            .filter(|(tri, _)| {
                let c = tri.centroid();
                !(c.x > 1.0 && c.x < 2.0 && c.y > 1.0 && c.y < 2.0)
            })
            .map(|(_, face)| *face)
            .collect();
        let mesh = pattern_mesh::Mesh::from_parts(grid.mesh.vertices.iter().map(|v| v.position), faces);
        let ring = Patch::new(grid.id, "ring", mesh, grid.source_vertices.clone(), Vector3::y()).unwrap();
        assert_eq!(ring.loops.len(), 2);

        let flat = flatten(Arc::new(ring), &PatternConfig::default(), &Interrupt::never()).unwrap();
        assert_eq!(flat.holes().len(), 1);
        assert!(polygon::signed_area(&flat.holes()[0]) < 0.0);
        assert!(flat.summary.max < 1e-9);
    }
}
