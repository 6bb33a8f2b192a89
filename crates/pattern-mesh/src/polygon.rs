//! Closed 2D polygon geometry used on flattened pattern outlines.
//!
//! A polygon is a slice of points with an implied closing edge from the last
//! point back to the first. Arc-length positions are measured from the first
//! point along the direction of the points.

use nalgebra::{Point2, Vector2};

const EPS: f64 = 1e-12;

/// 2D cross product (z component).
#[inline]
pub fn cross(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Shoelace area; positive for counter-clockwise polygons.
pub fn signed_area(poly: &[Point2<f64>]) -> f64 {
    let n = poly.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (poly[i], poly[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice * 0.5
}

/// Reverse the polygon in place if it runs clockwise.
pub fn ensure_ccw(poly: &mut [Point2<f64>]) {
    if signed_area(poly) < 0.0 {
        poly.reverse();
    }
}

/// Length of the closed polygon.
pub fn perimeter(poly: &[Point2<f64>]) -> f64 {
    cumulative_lengths(poly).last().copied().unwrap_or(0.0)
}

/// Arc length at each vertex, plus the total perimeter as the final entry.
pub fn cumulative_lengths(poly: &[Point2<f64>]) -> Vec<f64> {
    let n = poly.len();
    let mut out = Vec::with_capacity(n + 1);
    out.push(0.0);
    let mut acc = 0.0;
    for i in 0..n {
        acc += (poly[(i + 1) % n] - poly[i]).norm();
        out.push(acc);
    }
    out
}

/// Point at arc length `s` (wrapped around the perimeter).
pub fn point_at_arc(poly: &[Point2<f64>], s: f64) -> Option<Point2<f64>> {
    let n = poly.len();
    let cum = cumulative_lengths(poly);
    let total = *cum.last()?;
    if n == 0 || total <= EPS {
        return poly.first().copied();
    }
    let s = s.rem_euclid(total);
    let seg = match cum.partition_point(|&c| c <= s) {
        0 => 0,
        k => (k - 1).min(n - 1),
    };
    let len = cum[seg + 1] - cum[seg];
    let (a, b) = (poly[seg], poly[(seg + 1) % n]);
    if len <= EPS {
        return Some(a);
    }
    Some(a + (b - a) * ((s - cum[seg]) / len))
}

/// Closest point on the boundary to `p`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryProjection {
    pub point: Point2<f64>,
    pub segment: usize,
    pub arc: f64,
    pub distance: f64,
}

/// Project `p` onto the closest boundary segment.
pub fn project_to_boundary(poly: &[Point2<f64>], p: Point2<f64>) -> Option<BoundaryProjection> {
    let n = poly.len();
    if n == 0 {
        return None;
    }
    let cum = cumulative_lengths(poly);
    let mut best: Option<BoundaryProjection> = None;

    for i in 0..n {
        let (a, b) = (poly[i], poly[(i + 1) % n]);
        let ab = b - a;
        let len_sq = ab.norm_squared();
        let t = if len_sq <= EPS {
            0.0
        } else {
            ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0)
        };
        let q = a + ab * t;
        let distance = (p - q).norm();
        if best.map_or(true, |b| distance < b.distance) {
            best = Some(BoundaryProjection {
                point: q,
                segment: i,
                arc: cum[i] + t * len_sq.sqrt(),
                distance,
            });
        }
    }

    best
}

/// Distance from `p` to the closed boundary.
pub fn distance_to_boundary(poly: &[Point2<f64>], p: Point2<f64>) -> f64 {
    project_to_boundary(poly, p).map_or(f64::INFINITY, |proj| proj.distance)
}

/// Intersection parameters `(t, u)` of segments `p1p2` and `q1q2`, where the
/// hit point is `p1 + t (p2 - p1)`. Touching counts; parallel segments do not.
pub fn segment_intersection(
    p1: Point2<f64>,
    p2: Point2<f64>,
    q1: Point2<f64>,
    q2: Point2<f64>,
) -> Option<(f64, f64)> {
    let r = p2 - p1;
    let s = q2 - q1;
    let denom = cross(&r, &s);
    if denom.abs() <= EPS * (1.0 + r.norm() * s.norm()) {
        return None;
    }
    let qp = q1 - p1;
    let t = cross(&qp, &s) / denom;
    let u = cross(&qp, &r) / denom;
    let tol = 1e-12;
    ((-tol..=1.0 + tol).contains(&t) && (-tol..=1.0 + tol).contains(&u)).then_some((t, u))
}

/// Whether two segments intersect, including collinear overlap.
pub fn segments_intersect(
    p1: Point2<f64>,
    p2: Point2<f64>,
    q1: Point2<f64>,
    q2: Point2<f64>,
) -> bool {
    if segment_intersection(p1, p2, q1, q2).is_some() {
        return true;
    }
    let r = p2 - p1;
    let len_sq = r.norm_squared();
    if len_sq <= EPS || cross(&r, &(q1 - p1)).abs() > 1e-9 * len_sq.sqrt() {
        return false;
    }
    // Collinear: compare projections onto r.
    let t0 = (q1 - p1).dot(&r) / len_sq;
    let t1 = (q2 - p1).dot(&r) / len_sq;
    let (lo, hi) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
    hi >= 0.0 && lo <= 1.0
}

/// Pairs `(i, j)`, `i < j`, of non-adjacent edges that intersect.
///
/// Edge `i` runs from point `i` to point `i + 1`. O(n²).
pub fn self_intersections(poly: &[Point2<f64>]) -> Vec<(usize, usize)> {
    let n = poly.len();
    let mut out = Vec::new();
    if n < 4 {
        return out;
    }
    for i in 0..n {
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            if segments_intersect(poly[i], poly[(i + 1) % n], poly[j], poly[(j + 1) % n]) {
                out.push((i, j));
            }
        }
    }
    out
}

/// True when no two non-adjacent edges meet.
pub fn is_simple(poly: &[Point2<f64>]) -> bool {
    self_intersections(poly).is_empty()
}

/// Cut off local loops at self-intersections, keeping the larger side of
/// each crossing.
pub fn remove_self_loops(poly: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let mut pts = poly.to_vec();
    let mut budget = pts.len() * 2;

    'scan: while budget > 0 {
        budget -= 1;
        let n = pts.len();
        if n < 4 {
            break;
        }
        for i in 0..n {
            for j in (i + 2)..n {
                if i == 0 && j == n - 1 {
                    continue;
                }
                let (a, b) = (pts[i], pts[i + 1]);
                let (c, d) = (pts[j], pts[(j + 1) % n]);
                let Some((t, _)) = segment_intersection(a, b, c, d) else {
                    continue;
                };
                let hit = a + (b - a) * t;
                let inner = j - i;
                if inner <= n - inner {
                    pts.splice(i + 1..=j, std::iter::once(hit));
                } else {
                    let mut kept = Vec::with_capacity(inner + 1);
                    kept.push(hit);
                    kept.extend_from_slice(&pts[i + 1..=j]);
                    pts = kept;
                }
                continue 'scan;
            }
        }
        break;
    }

    pts
}

/// Drop consecutive points closer than `eps`, including across the closing edge.
pub fn dedup_points(poly: &[Point2<f64>], eps: f64) -> Vec<Point2<f64>> {
    let mut out: Vec<Point2<f64>> = Vec::with_capacity(poly.len());
    for &p in poly {
        if out.last().map_or(true, |last| (p - last).norm() > eps) {
            out.push(p);
        }
    }
    while out.len() > 1 && (out[0] - out[out.len() - 1]).norm() <= eps {
        out.pop();
    }
    out
}

/// Even-odd point containment.
pub fn contains_point(poly: &[Point2<f64>], p: Point2<f64>) -> bool {
    let n = poly.len();
    let mut inside = false;
    for i in 0..n {
        let (a, b) = (poly[i], poly[(i + 1) % n]);
        if (a.y <= p.y) != (b.y <= p.y) {
            let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x {
                inside = !inside;
            }
        }
    }
    inside
}

/// Intervals `(x_start, x_end)` where the horizontal line at `y` lies inside
/// the polygon, left to right.
///
/// An edge crosses the line when exactly one endpoint satisfies `p.y <= y`,
/// so vertices lying on the line are counted once.
pub fn horizontal_chords(poly: &[Point2<f64>], y: f64) -> Vec<(f64, f64)> {
    let n = poly.len();
    let mut xs: Vec<f64> = Vec::new();
    for i in 0..n {
        let (a, b) = (poly[i], poly[(i + 1) % n]);
        if (a.y <= y) != (b.y <= y) {
            xs.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
        }
    }
    xs.sort_by(f64::total_cmp);
    xs.chunks_exact(2).map(|c| (c[0], c[1])).collect()
}

/// Summed length of the horizontal chords at `y`.
pub fn chord_length(poly: &[Point2<f64>], y: f64) -> f64 {
    horizontal_chords(poly, y).iter().map(|(a, b)| b - a).sum()
}

/// Nearest boundary crossing of a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Point2<f64>,
    pub segment: usize,
    /// Distance along the ray in units of `dir`.
    pub t: f64,
    /// Arc-length position of the hit on the boundary.
    pub arc: f64,
}

/// Cast a ray from `origin` along `dir` and return the nearest boundary hit
/// with `t > min_t`.
pub fn ray_hit(
    poly: &[Point2<f64>],
    origin: Point2<f64>,
    dir: Vector2<f64>,
    min_t: f64,
) -> Option<RayHit> {
    let n = poly.len();
    let cum = cumulative_lengths(poly);
    let mut best: Option<RayHit> = None;

    for i in 0..n {
        let (a, b) = (poly[i], poly[(i + 1) % n]);
        let s = b - a;
        let denom = cross(&dir, &s);
        if denom.abs() <= EPS {
            continue;
        }
        let ao = a - origin;
        let t = cross(&ao, &s) / denom;
        let u = cross(&ao, &dir) / denom;
        if t <= min_t || !(0.0..=1.0).contains(&u) {
            continue;
        }
        if best.map_or(true, |h| t < h.t) {
            best = Some(RayHit {
                point: a + s * u,
                segment: i,
                t,
                arc: cum[i] + u * s.norm(),
            });
        }
    }

    best
}

/// Signed turning angle at vertex `i` (positive turns left).
pub fn turn_angle(poly: &[Point2<f64>], i: usize) -> f64 {
    let n = poly.len();
    if n < 3 {
        return 0.0;
    }
    let prev = poly[(i + n - 1) % n];
    let next = poly[(i + 1) % n];
    let (d0, d1) = (poly[i] - prev, next - poly[i]);
    cross(&d0, &d1).atan2(d0.dot(&d1))
}

/// Axis-aligned 2D bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds2 {
    pub min: Point2<f64>,
    pub max: Point2<f64>,
}

impl Bounds2 {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point2<f64>>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut bounds = Self {
            min: first,
            max: first,
        };
        for p in iter {
            bounds.min.x = bounds.min.x.min(p.x);
            bounds.min.y = bounds.min.y.min(p.y);
            bounds.max.x = bounds.max.x.max(p.x);
            bounds.max.y = bounds.max.y.max(p.y);
        }
        Some(bounds)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point2<f64> {
        nalgebra::center(&self.min, &self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn square(size: f64) -> Vec<Point2<f64>> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(size, 0.0),
            Point2::new(size, size),
            Point2::new(0.0, size),
        ]
    }

    fn regular(n: usize, radius: f64) -> Vec<Point2<f64>> {
        (0..n)
            .map(|i| {
                let a = std::f64::consts::TAU * i as f64 / n as f64;
                Point2::new(radius * a.cos(), radius * a.sin())
            })
            .collect()
    }

    #[test]
    fn test_area_and_orientation() {
        let mut sq = square(2.0);
        assert_relative_eq!(signed_area(&sq), 4.0);
        sq.reverse();
        assert_relative_eq!(signed_area(&sq), -4.0);
        ensure_ccw(&mut sq);
        assert_relative_eq!(signed_area(&sq), 4.0);
        assert_relative_eq!(perimeter(&sq), 8.0);
    }

    #[test]
    fn test_point_at_arc_wraps() {
        let sq = square(1.0);
        assert_relative_eq!(point_at_arc(&sq, 1.5).unwrap(), Point2::new(1.0, 0.5));
        assert_relative_eq!(point_at_arc(&sq, -0.5).unwrap(), Point2::new(0.0, 0.5));
        assert_relative_eq!(point_at_arc(&sq, 4.25).unwrap(), Point2::new(0.25, 0.0));
    }

    #[test]
    fn test_projection() {
        let sq = square(2.0);
        let proj = project_to_boundary(&sq, Point2::new(3.0, 1.0)).unwrap();
        assert_eq!(proj.segment, 1);
        assert_relative_eq!(proj.arc, 3.0);
        assert_relative_eq!(proj.distance, 1.0);
        assert_relative_eq!(distance_to_boundary(&sq, Point2::new(1.0, 1.0)), 1.0);
    }

    #[test]
    fn test_horizontal_chords_concave() {
        // U shape: two prongs above y = 1.
        let u = vec![
            Point2::new(0.0, 0.0),
            Point2::new(3.0, 0.0),
            Point2::new(3.0, 3.0),
            Point2::new(2.0, 3.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 3.0),
            Point2::new(0.0, 3.0),
        ];
        assert_eq!(horizontal_chords(&u, 2.0), vec![(0.0, 1.0), (2.0, 3.0)]);
        assert_relative_eq!(chord_length(&u, 0.5), 3.0);
        assert!(horizontal_chords(&u, 5.0).is_empty());
    }

    #[test]
    fn test_ray_hit() {
        let sq = square(4.0);
        let hit = ray_hit(&sq, Point2::new(2.0, 3.0), Vector2::new(0.0, -1.0), 1e-9).unwrap();
        assert_eq!(hit.segment, 0);
        assert_relative_eq!(hit.point, Point2::new(2.0, 0.0));
        assert_relative_eq!(hit.t, 3.0);
        assert_relative_eq!(hit.arc, 2.0);
        assert!(ray_hit(&sq, Point2::new(9.0, 9.0), Vector2::new(1.0, 0.0), 1e-9).is_none());
    }

    #[test]
    fn test_figure_eight_self_intersects() {
        let bow = vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 2.0),
            Point2::new(2.0, 0.0),
            Point2::new(0.0, 2.0),
        ];
        assert_eq!(self_intersections(&bow), vec![(0, 2)]);
        assert!(!is_simple(&bow));
        assert!(is_simple(&square(1.0)));
    }

    #[test]
    fn test_remove_small_loop() {
        // Square whose bottom edge has a small twisted loop.
        let looped = vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, -0.5),
            Point2::new(1.5, -0.5),
            Point2::new(1.5, 0.5),
            Point2::new(4.0, 0.0),
            Point2::new(4.0, 4.0),
            Point2::new(0.0, 4.0),
        ];
        assert!(!is_simple(&looped));
        let cleaned = remove_self_loops(&looped);
        assert!(is_simple(&cleaned));
        assert!(cleaned.len() < looped.len());
        assert!(signed_area(&cleaned) > 15.0);
    }

    #[test]
    fn test_contains_and_bounds() {
        let sq = square(2.0);
        assert!(contains_point(&sq, Point2::new(1.0, 1.0)));
        assert!(!contains_point(&sq, Point2::new(3.0, 1.0)));

        let b = Bounds2::from_points(&sq).unwrap();
        assert_relative_eq!(b.width(), 2.0);
        assert_relative_eq!(b.center(), Point2::new(1.0, 1.0));
    }

    #[test]
    fn test_turn_angle_square() {
        let sq = square(1.0);
        assert_relative_eq!(turn_angle(&sq, 0), std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_dedup_points() {
        let pts = vec![
            Point2::new(0.0, 0.0),
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 0.0),
        ];
        assert_eq!(dedup_points(&pts, 1e-9).len(), 3);
    }

    proptest! {
        #[test]
        fn regular_polygons_are_simple_and_ccw(n in 3usize..40, radius in 0.5f64..100.0) {
            let poly = regular(n, radius);
            prop_assert!(signed_area(&poly) > 0.0);
            prop_assert!(is_simple(&poly));
        }

        #[test]
        fn arc_points_lie_on_boundary(n in 3usize..24, s in -50.0f64..50.0) {
            let poly = regular(n, 10.0);
            let p = point_at_arc(&poly, s).unwrap();
            prop_assert!(distance_to_boundary(&poly, p) < 1e-9);
        }
    }
}
