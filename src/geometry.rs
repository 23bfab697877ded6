//! Element geometry and P1/Q1 stiffness matrices for the Laplace operator.
//!
//! All functions are pure functions of the element's vertex coordinates, which are expected in
//! counter-clockwise order. Degenerate or clockwise elements have non-positive area, and the
//! stiffness functions return `None` for them.
use nalgebra::{Matrix2x3, Matrix2x4, Matrix3, Matrix4, Point2, Vector2};

/// Signed area of a triangle, positive for counter-clockwise vertex order.
pub fn triangle_area(p: &[Point2<f64>; 3]) -> f64 {
    let [p0, p1, p2] = p;
    0.5 * ((p1.x - p0.x) * (p2.y - p0.y) - (p2.x - p0.x) * (p1.y - p0.y))
}

/// Signed area of a quadrilateral (shoelace formula), positive for counter-clockwise order.
pub fn quad_area(p: &[Point2<f64>; 4]) -> f64 {
    polygon_area(p)
}

/// Signed area of a simple polygon (shoelace formula).
pub fn polygon_area(vertices: &[Point2<f64>]) -> f64 {
    let n = vertices.len();
    let twice_area: f64 = (0..n)
        .map(|i| {
            let a = &vertices[i];
            let b = &vertices[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum();
    0.5 * twice_area
}

pub fn edge_length(a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    (b - a).norm()
}

/// Unit normal of the edge `a -> b`.
///
/// For an edge traversed counter-clockwise along its element (`is_outward == true`) the normal
/// points out of the element. Otherwise the endpoints are swapped first, so the returned normal
/// always points out of the element the edge was taken from.
pub fn edge_normal(a: &Point2<f64>, b: &Point2<f64>, is_outward: bool) -> Vector2<f64> {
    let (a, b) = if is_outward { (a, b) } else { (b, a) };
    let length = edge_length(a, b);
    Vector2::new(b.y - a.y, a.x - b.x) / length
}

/// Element stiffness matrix `K = area * B^T B` of a linear triangle.
pub fn triangle_stiffness(p: &[Point2<f64>; 3]) -> Option<Matrix3<f64>> {
    let area = triangle_area(p);
    if !(area > 0.0) {
        return None;
    }
    let [p0, p1, p2] = p;
    #[rustfmt::skip]
    let b = Matrix2x3::new(
        p1.y - p2.y, p2.y - p0.y, p0.y - p1.y,
        p2.x - p1.x, p0.x - p2.x, p1.x - p0.x,
    ) / (2.0 * area);
    Some(b.transpose() * b * area)
}

/// One-point approximation of the stiffness matrix of a bilinear quadrilateral.
///
/// The gradient of basis function `a` is approximated by the rotated edge `p[a + 2] -> p[a + 3]`,
/// which does not touch vertex `a`. On rectangles this couples every vertex only to itself and
/// to its opposite corner.
pub fn quad_stiffness(p: &[Point2<f64>; 4]) -> Option<Matrix4<f64>> {
    let area = quad_area(p);
    if !(area > 0.0) {
        return None;
    }
    let mut b = Matrix2x4::zeros();
    for a in 0..4 {
        let m2 = &p[(a + 2) % 4];
        let m3 = &p[(a + 3) % 4];
        b[(0, a)] = m2.y - m3.y;
        b[(1, a)] = m3.x - m2.x;
    }
    b /= 2.0 * area;
    Some(b.transpose() * b * area)
}
