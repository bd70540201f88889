/*!
Quaternion to rotation matrix conversion.

Produces a 4-by-4 homogeneous matrix in row-major order. Only the upper-left
3-by-3 block carries the rotation, translation is always zero.
*/

/// Quaternions with a squared norm at or below this value map to the identity
pub const MIN_NORM_SQUARED: f32 = 1e-6;

/// Row-major 4-by-4 identity matrix
#[rustfmt::skip]
pub const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

/// Convert the quaternion `q = [w, x, y, z]` into a rotation matrix.
///
/// The input does not need to be unit length, every entry is divided by the
/// squared norm. Degenerate quaternions return [`IDENTITY`].
pub fn rotation_matrix(q: [f32; 4]) -> [f32; 16] {
    let [a, b, c, d] = q;

    let aa = a * a;
    let ab = a * b;
    let ac = a * c;
    let ad = a * d;
    let bb = b * b;
    let bc = b * c;
    let bd = b * d;
    let cc = c * c;
    let cd = c * d;
    let dd = d * d;

    let norm_sq = aa + bb + cc + dd;

    let mut result = IDENTITY;
    // NaN input also falls through to the identity
    if !(norm_sq > MIN_NORM_SQUARED) {
        return result;
    }

    result[0] = (aa + bb - cc - dd) / norm_sq;
    result[1] = 2.0 * (-ad + bc) / norm_sq;
    result[2] = 2.0 * (ac + bd) / norm_sq;
    result[4] = 2.0 * (ad + bc) / norm_sq;
    result[5] = (aa - bb + cc - dd) / norm_sq;
    result[6] = 2.0 * (-ab + cd) / norm_sq;
    result[8] = 2.0 * (-ac + bd) / norm_sq;
    result[9] = 2.0 * (ab + cd) / norm_sq;
    result[10] = (aa - bb - cc + dd) / norm_sq;

    result
}
