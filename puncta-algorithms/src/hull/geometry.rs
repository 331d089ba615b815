//! Geometric predicates shared by the hull builders.

use puncta_core::Point2;

/// Cross product of `(b - a)` and `(c - a)`.
///
/// Positive for a counter-clockwise turn, negative for clockwise, zero for
/// collinear points.
#[inline]
#[must_use]
pub fn orient(a: Point2, b: Point2, c: Point2) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Returns true when `p` lies on the closed segment `a..b`, assuming the
/// three points are collinear.
#[inline]
#[must_use]
pub fn on_segment(a: Point2, b: Point2, p: Point2) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Segment intersection test, inclusive of endpoints and collinear overlap.
#[must_use]
pub fn segments_intersect(p1: Point2, p2: Point2, p3: Point2, p4: Point2) -> bool {
    let d1 = orient(p3, p4, p1);
    let d2 = orient(p3, p4, p2);
    let d3 = orient(p1, p2, p3);
    let d4 = orient(p1, p2, p4);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    (d1 == 0.0 && on_segment(p3, p4, p1))
        || (d2 == 0.0 && on_segment(p3, p4, p2))
        || (d3 == 0.0 && on_segment(p1, p2, p3))
        || (d4 == 0.0 && on_segment(p1, p2, p4))
}

/// Intersection test for polygon edges: segments that share an endpoint
/// are adjacent, not crossing.
#[must_use]
pub fn edges_cross(a1: Point2, a2: Point2, b1: Point2, b2: Point2) -> bool {
    if a1 == b1 || a1 == b2 || a2 == b1 || a2 == b2 {
        return false;
    }
    segments_intersect(a1, a2, b1, b2)
}

/// Point-in-polygon test, boundary inclusive.
///
/// `vertices` is the polygon boundary in order, not closed (the last
/// vertex connects back to the first).
#[must_use]
pub fn polygon_contains(vertices: &[Point2], p: Point2) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let a = vertices[j];
        let b = vertices[i];
        if orient(a, b, p) == 0.0 && on_segment(a, b, p) {
            return true;
        }
        if (b.y > p.y) != (a.y > p.y) && p.x < (a.x - b.x) * (p.y - b.y) / (a.y - b.y) + b.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Cosine of the angle `a - apex - b`.
///
/// Smaller cosine means a wider angle. Returns 1 (zero angle) when either
/// arm is degenerate.
#[must_use]
pub fn cos_angle(apex: Point2, a: Point2, b: Point2) -> f64 {
    let ax = a.x - apex.x;
    let ay = a.y - apex.y;
    let bx = b.x - apex.x;
    let by = b.y - apex.y;
    let den = ((ax * ax + ay * ay) * (bx * bx + by * by)).sqrt();
    if den == 0.0 {
        return 1.0;
    }
    (ax * bx + ay * by) / den
}
