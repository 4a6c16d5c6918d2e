//! 2D affine transform math for positioned page content.
//!
//! Decoders hand us item positions as affine matrices rather than plain
//! coordinates; this module composes them with the page viewport transform
//! to obtain screen-space positions.

/// An affine matrix `[a, b, c, d, e, f]` representing:
///
/// ```text
/// | a  c  e |
/// | b  d  f |
/// | 0  0  1 |
/// ```
pub type Matrix = [f32; 6];

/// The identity transform.
pub const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Compose two transforms, with `m2` applied first.
///
/// `m1` is typically the page viewport transform and `m2` the item's own
/// matrix. Pure multiply/add, exact.
pub fn multiply(m1: &Matrix, m2: &Matrix) -> Matrix {
    [
        m1[0] * m2[0] + m1[2] * m2[1],
        m1[1] * m2[0] + m1[3] * m2[1],
        m1[0] * m2[2] + m1[2] * m2[3],
        m1[1] * m2[2] + m1[3] * m2[3],
        m1[0] * m2[4] + m1[2] * m2[5] + m1[4],
        m1[1] * m2[4] + m1[3] * m2[5] + m1[5],
    ]
}

/// Screen-space position of an item's origin: the translation component of
/// the composed matrix.
pub fn apply(viewport: &Matrix, item: &Matrix) -> (f32, f32) {
    let m = multiply(viewport, item);
    (m[4], m[5])
}

/// Effective font size under a transform: the larger of the two axis scales.
///
/// For non-rotated text both scales are equal and this is just `d` (or `a`).
pub fn effective_scale(m: &Matrix) -> f32 {
    let scale_x = (m[0].powi(2) + m[1].powi(2)).sqrt();
    let scale_y = (m[2].powi(2) + m[3].powi(2)).sqrt();
    scale_x.max(scale_y)
}
