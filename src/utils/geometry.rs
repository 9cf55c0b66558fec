//! Homography estimation and quadrilateral math
//!
//! Points are `[x, y]` pairs in pixel space. Quads are listed clockwise
//! starting at the top-left corner: top-left, top-right, bottom-right,
//! bottom-left.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

/// Four corners, clockwise from top-left
pub type Quad = [[f64; 2]; 4];

/// Homographies whose normalized determinant falls below this are rejected
pub const DEGENERATE_EPSILON: f64 = 1e-6;

const PROJECTIVE_EPS: f64 = 1e-9;

/// Projective 3x3 transform normalized so that `h33 == 1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    /// Wrap a raw matrix, normalizing by its bottom-right entry
    #[must_use]
    pub fn from_matrix(matrix: Matrix3<f64>) -> Option<Self> {
        let w = matrix[(2, 2)];
        if !w.is_finite() || w.abs() <= PROJECTIVE_EPS {
            return None;
        }
        let matrix = matrix / w;
        if matrix.iter().all(|v| v.is_finite()) {
            Some(Self { matrix })
        } else {
            None
        }
    }

    /// Solve the homography mapping `src` corners onto `dst` corners
    ///
    /// Direct linear transform with `h33` fixed to 1; returns `None` when the
    /// 8x8 system is singular.
    #[must_use]
    pub fn from_quads(src: &Quad, dst: &Quad) -> Option<Self> {
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
            let (x, y) = (s[0], s[1]);
            let (u, v) = (d[0], d[1]);
            let r = 2 * i;

            a[(r, 0)] = x;
            a[(r, 1)] = y;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -u * x;
            a[(r, 7)] = -u * y;
            b[r] = u;

            a[(r + 1, 3)] = x;
            a[(r + 1, 4)] = y;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -v * x;
            a[(r + 1, 7)] = -v * y;
            b[r + 1] = v;
        }

        let h = a.lu().solve(&b)?;
        Self::from_matrix(Matrix3::new(
            h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0,
        ))
    }

    /// Axis-aligned scale followed by rotation about `center`, then translation
    ///
    /// Maps the source rectangle `(0,0)-(src_w,src_h)` so its center lands on
    /// `center` with the given size and rotation.
    #[must_use]
    pub fn scale_rotate(
        src_size: (f64, f64),
        dst_size: (f64, f64),
        rotation_degrees: f64,
        center: [f64; 2],
    ) -> Self {
        let sx = if src_size.0 > 0.0 { dst_size.0 / src_size.0 } else { 1.0 };
        let sy = if src_size.1 > 0.0 { dst_size.1 / src_size.1 } else { 1.0 };
        let (sin, cos) = rotation_degrees.to_radians().sin_cos();

        #[rustfmt::skip]
        let to_origin = Matrix3::new(
            1.0, 0.0, -src_size.0 / 2.0,
            0.0, 1.0, -src_size.1 / 2.0,
            0.0, 0.0, 1.0,
        );
        let scale = Matrix3::new(sx, 0.0, 0.0, 0.0, sy, 0.0, 0.0, 0.0, 1.0);
        let rotate = Matrix3::new(cos, -sin, 0.0, sin, cos, 0.0, 0.0, 0.0, 1.0);
        let to_center = Matrix3::new(1.0, 0.0, center[0], 0.0, 1.0, center[1], 0.0, 0.0, 1.0);

        Self {
            matrix: to_center * rotate * scale * to_origin,
        }
    }

    #[must_use]
    pub fn determinant(&self) -> f64 {
        self.matrix.determinant()
    }

    /// Near-singular, or folds any of the given source corners behind the
    /// projective plane
    #[must_use]
    pub fn is_degenerate(&self, src: &Quad) -> bool {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < DEGENERATE_EPSILON {
            return true;
        }
        src.iter().any(|p| {
            let w = self.matrix[(2, 0)] * p[0] + self.matrix[(2, 1)] * p[1] + self.matrix[(2, 2)];
            w <= PROJECTIVE_EPS
        })
    }

    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().and_then(Self::from_matrix)
    }

    /// Map a point; `None` when it lands on the line at infinity
    #[must_use]
    pub fn apply(&self, x: f64, y: f64) -> Option<[f64; 2]> {
        let v = self.matrix * Vector3::new(x, y, 1.0);
        let w = v[2];
        if !w.is_finite() || w.abs() <= PROJECTIVE_EPS || !v[0].is_finite() || !v[1].is_finite() {
            return None;
        }
        Some([v[0] / w, v[1] / w])
    }

    /// Map every corner of a quad
    #[must_use]
    pub fn apply_quad(&self, quad: &Quad) -> Option<Quad> {
        let mut out = [[0.0; 2]; 4];
        for (dst, src) in out.iter_mut().zip(quad.iter()) {
            *dst = self.apply(src[0], src[1])?;
        }
        Some(out)
    }
}

/// Geometry helpers shared by the compositor and analyzers
pub struct GeometryOps;

impl GeometryOps {
    /// Corners of the rectangle `(0,0)-(width,height)`
    #[must_use]
    pub fn rect_corners(width: f64, height: f64) -> Quad {
        [[0.0, 0.0], [width, 0.0], [width, height], [0.0, height]]
    }

    /// Rectangle of the given size centered on `center`
    #[must_use]
    pub fn centered_rect(center: [f64; 2], width: f64, height: f64) -> Quad {
        let (hw, hh) = (width / 2.0, height / 2.0);
        [
            [center[0] - hw, center[1] - hh],
            [center[0] + hw, center[1] - hh],
            [center[0] + hw, center[1] + hh],
            [center[0] - hw, center[1] + hh],
        ]
    }

    /// Rotate every corner about `center`, positive angles clockwise on screen
    #[must_use]
    pub fn rotate_quad(quad: &Quad, center: [f64; 2], degrees: f64) -> Quad {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let mut out = *quad;
        for p in &mut out {
            let dx = p[0] - center[0];
            let dy = p[1] - center[1];
            *p = [center[0] + dx * cos - dy * sin, center[1] + dx * sin + dy * cos];
        }
        out
    }

    /// Shrink the vertical edge nearer the vanishing point
    ///
    /// `skew` in `[-0.5, 0.5]`: positive shortens the right edge, negative the
    /// left edge, by that fraction of its length.
    #[must_use]
    pub fn foreshorten(quad: &Quad, skew: f64) -> Quad {
        let skew = skew.clamp(-0.5, 0.5);
        let mut out = *quad;
        let (top, bottom, factor) = if skew >= 0.0 {
            (1, 2, skew)
        } else {
            (0, 3, -skew)
        };
        let (Some(t), Some(b)) = (quad.get(top).copied(), quad.get(bottom).copied()) else {
            return out;
        };
        let mid = [(t[0] + b[0]) / 2.0, (t[1] + b[1]) / 2.0];
        let keep = 1.0 - factor;
        if let Some(p) = out.get_mut(top) {
            *p = [mid[0] + (t[0] - mid[0]) * keep, mid[1] + (t[1] - mid[1]) * keep];
        }
        if let Some(p) = out.get_mut(bottom) {
            *p = [mid[0] + (b[0] - mid[0]) * keep, mid[1] + (b[1] - mid[1]) * keep];
        }
        out
    }

    /// Inclusive-exclusive integer bounds `(min_x, min_y, max_x, max_y)`
    #[must_use]
    pub fn integer_bounds(points: &[[f64; 2]]) -> (i64, i64, i64, i64) {
        let mut min = [f64::INFINITY; 2];
        let mut max = [f64::NEG_INFINITY; 2];
        for p in points {
            min[0] = min[0].min(p[0]);
            min[1] = min[1].min(p[1]);
            max[0] = max[0].max(p[0]);
            max[1] = max[1].max(p[1]);
        }
        if !min[0].is_finite() || !max[0].is_finite() {
            return (0, 0, 0, 0);
        }
        (
            min[0].floor() as i64,
            min[1].floor() as i64,
            max[0].ceil() as i64,
            max[1].ceil() as i64,
        )
    }

    /// Intersection of `[x0, x1) x [y0, y1)` with `[0, width) x [0, height)`
    #[must_use]
    pub fn clip_to_canvas(
        rect: (i64, i64, i64, i64),
        width: u32,
        height: u32,
    ) -> Option<(u32, u32, u32, u32)> {
        let x0 = rect.0.max(0);
        let y0 = rect.1.max(0);
        let x1 = rect.2.min(i64::from(width));
        let y1 = rect.3.min(i64::from(height));
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: [f64; 2], b: [f64; 2]) {
        assert!(
            (a[0] - b[0]).abs() < 1e-6 && (a[1] - b[1]).abs() < 1e-6,
            "{a:?} != {b:?}"
        );
    }

    #[test]
    fn test_homography_maps_corners() {
        let src = GeometryOps::rect_corners(100.0, 50.0);
        let dst = [[10.0, 20.0], [220.0, 35.0], [210.0, 140.0], [15.0, 120.0]];
        let h = Homography::from_quads(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(dst.iter()) {
            assert_close(h.apply(s[0], s[1]).unwrap(), *d);
        }
        assert!(!h.is_degenerate(&src));
    }

    #[test]
    fn test_homography_inverse_roundtrip() {
        let src = GeometryOps::rect_corners(64.0, 64.0);
        let dst = [[0.0, 0.0], [80.0, 8.0], [80.0, 56.0], [0.0, 64.0]];
        let h = Homography::from_quads(&src, &dst).unwrap();
        let inv = h.inverse().unwrap();
        let p = h.apply(17.0, 41.0).unwrap();
        assert_close(inv.apply(p[0], p[1]).unwrap(), [17.0, 41.0]);
    }

    #[test]
    fn test_collapsed_quad_is_rejected() {
        let src = GeometryOps::rect_corners(100.0, 100.0);
        let dst = [[5.0, 5.0], [5.0, 5.0], [5.0, 5.0], [5.0, 5.0]];
        match Homography::from_quads(&src, &dst) {
            None => {},
            Some(h) => assert!(h.is_degenerate(&src)),
        }
    }

    #[test]
    fn test_scale_rotate_centers_source() {
        let h = Homography::scale_rotate((100.0, 50.0), (200.0, 100.0), 0.0, [300.0, 400.0]);
        assert_close(h.apply(50.0, 25.0).unwrap(), [300.0, 400.0]);
        assert_close(h.apply(0.0, 0.0).unwrap(), [200.0, 350.0]);

        let rotated = Homography::scale_rotate((10.0, 10.0), (10.0, 10.0), 90.0, [0.0, 0.0]);
        assert_close(rotated.apply(10.0, 5.0).unwrap(), [0.0, 5.0]);
    }

    #[test]
    fn test_rotate_and_foreshorten() {
        let quad = GeometryOps::centered_rect([0.0, 0.0], 2.0, 2.0);
        let rotated = GeometryOps::rotate_quad(&quad, [0.0, 0.0], 90.0);
        assert_close(rotated[0], [1.0, -1.0]);

        let skewed = GeometryOps::foreshorten(&quad, 0.5);
        assert_close(skewed[1], [1.0, -0.5]);
        assert_close(skewed[2], [1.0, 0.5]);
        assert_close(skewed[0], quad[0]);
    }

    #[test]
    fn test_integer_bounds() {
        let quad = GeometryOps::rect_corners(4.0, 3.0);
        assert_eq!(GeometryOps::integer_bounds(&quad), (0, 0, 4, 3));
    }

    #[test]
    fn test_clip_to_canvas() {
        assert_eq!(
            GeometryOps::clip_to_canvas((-10, -5, 20, 30), 16, 16),
            Some((0, 0, 16, 16))
        );
        assert_eq!(GeometryOps::clip_to_canvas((20, 20, 30, 30), 16, 16), None);
    }
}
