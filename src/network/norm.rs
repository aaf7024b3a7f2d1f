//! L2 normalization helpers shared by the similarity and serving paths

use ndarray::{Array1, Array2, Array3, Axis};

/// Norm denominators are clamped to this value so a degenerate zero-norm
/// embedding yields a zero vector instead of NaN.
pub const NORM_EPS: f64 = 1e-8;

/// L2-normalize a single vector.
pub fn unit_vector(v: &Array1<f64>) -> Array1<f64> {
    let norm = v.dot(v).sqrt().max(NORM_EPS);
    v / norm
}

/// L2-normalize every row of a (N, D) matrix.
pub fn unit_rows(m: &Array2<f64>) -> Array2<f64> {
    let mut out = m.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt().max(NORM_EPS);
        row.mapv_inplace(|v| v / norm);
    }
    out
}

/// L2-normalize a (B, K, D) tensor along its last axis.
pub fn unit_rows3(t: &Array3<f64>) -> Array3<f64> {
    let mut out = t.clone();
    for mut plane in out.axis_iter_mut(Axis(0)) {
        for mut row in plane.axis_iter_mut(Axis(0)) {
            let norm = row.dot(&row).sqrt().max(NORM_EPS);
            row.mapv_inplace(|v| v / norm);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_unit_vector() {
        let v = array![3.0, 4.0];
        let u = unit_vector(&v);
        assert_relative_eq!(u[0], 0.6, epsilon = 1e-12);
        assert_relative_eq!(u[1], 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_renormalization_is_idempotent() {
        let v = array![1.0, 2.0, -3.0, 0.5];
        let once = unit_vector(&v);
        let twice = unit_vector(&once);
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
        assert_relative_eq!(twice.dot(&twice).sqrt(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_vector_does_not_produce_nan() {
        let v = array![0.0, 0.0, 0.0];
        let u = unit_vector(&v);
        assert!(u.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_unit_rows() {
        let m = array![[3.0, 4.0], [0.0, 5.0]];
        let u = unit_rows(&m);
        for row in u.axis_iter(Axis(0)) {
            assert_relative_eq!(row.dot(&row).sqrt(), 1.0, epsilon = 1e-12);
        }
    }
}
