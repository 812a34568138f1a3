use itertools::izip;
use multiversion::multiversion;

#[multiversion(targets("x86_64+avx+avx2+fma", "arm+neon"))]
pub(crate) fn vector_dot(a: &[f64], b: &[f64]) -> f64 {
    assert!(a.len() == b.len());

    izip!(a, b).fold(0f64, |acc, (x, y)| x.mul_add(*y, acc))
}

/// `sum_i w_i * x_i * x_i`
#[multiversion(targets("x86_64+avx+avx2+fma", "arm+neon"))]
pub(crate) fn weighted_square_sum(x: &[f64], weights: &[f64]) -> f64 {
    assert!(x.len() == weights.len());

    izip!(x, weights).fold(0f64, |acc, (x, w)| (x * x).mul_add(*w, acc))
}

#[multiversion(targets("x86_64+avx+avx2+fma", "arm+neon"))]
pub(crate) fn multiply(x: &[f64], y: &[f64], out: &mut [f64]) {
    let n = x.len();
    assert!(y.len() == n);
    assert!(out.len() == n);

    izip!(x, y, out).for_each(|(x, y, out)| {
        *out = x * y;
    });
}

#[multiversion(targets("x86_64+avx+avx2+fma", "arm+neon"))]
pub(crate) fn axpy(x: &[f64], y: &mut [f64], a: f64) {
    let n = x.len();
    assert!(y.len() == n);

    izip!(x, y).for_each(|(x, y)| {
        *y = a.mul_add(*x, *y);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn check_axpy(x in prop::collection::vec(-10f64..10f64, 0..20), a in -5f64..5f64) {
            let y_init: Vec<f64> = x.iter().map(|v| v * 0.5 + 1.).collect();
            let mut y = y_init.clone();
            axpy(&x, &mut y, a);

            for ((&xi, &yi), &updated) in x.iter().zip(y_init.iter()).zip(y.iter()) {
                prop_assert!((updated - (yi + a * xi)).abs() < 1e-10);
            }
        }

        #[test]
        fn check_dot_is_symmetric(x in prop::collection::vec(-10f64..10f64, 8)) {
            let y: Vec<f64> = x.iter().rev().cloned().collect();
            prop_assert!((vector_dot(&x, &y) - vector_dot(&y, &x)).abs() < 1e-10);
        }
    }

    #[test]
    fn weighted_squares() {
        let x = [1., -2., 3.];
        let w = [1., 0.5, 2.];
        assert_relative_eq!(weighted_square_sum(&x, &w), 1. + 2. + 18.);
        assert_relative_eq!(vector_dot(&x, &x), 14.);
    }

    #[test]
    fn elementwise_product() {
        let mut out = [0f64; 3];
        multiply(&[1., 2., 3.], &[4., 5., 6.], &mut out);
        assert_eq!(out, [4., 10., 18.]);
    }
}
