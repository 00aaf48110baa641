//! Test utilities for gradient checking

/// Finite difference gradient checker
///
/// Computes numerical gradient using central difference:
/// f'(x) ≈ (f(x + h) - f(x - h)) / (2h)
pub fn finite_difference<F>(f: F, x: &[f64], epsilon: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut grad = vec![0.0; x.len()];
    let mut x_plus = x.to_vec();
    let mut x_minus = x.to_vec();

    for i in 0..x.len() {
        x_plus[i] = x[i] + epsilon;
        x_minus[i] = x[i] - epsilon;

        let f_plus = f(&x_plus);
        let f_minus = f(&x_minus);

        grad[i] = (f_plus - f_minus) / (2.0 * epsilon);

        x_plus[i] = x[i];
        x_minus[i] = x[i];
    }

    grad
}

/// Straight-through surrogate of fake quantization for an interior element.
///
/// The rounding residual `code - (x / scale + zero_point)` is frozen at the
/// nominal parameters, so the surrogate is differentiable in `scale` and
/// `zero_point` with exactly the slope the straight-through estimator
/// assigns to the rounded output.
pub fn ste_surrogate(x: f64, scale: f64, zero_point: f64, frozen_residual: f64) -> f64 {
    let u = x / scale + zero_point;
    (frozen_residual + u - zero_point) * scale
}

/// Fake quantized value of an element whose clamped code sits on a grid
/// boundary: `(code - zero_point) * scale`, smooth in both parameters.
pub fn boundary_surrogate(scale: f64, zero_point: f64, code: f64) -> f64 {
    (code - zero_point) * scale
}

/// Assert two float slices agree within `tol`.
pub fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (&a, &e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            (a - e).abs() <= tol,
            "mismatch at {i}: got {a}, expected {e} (tol {tol})"
        );
    }
}
