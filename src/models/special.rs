//! Special functions used by the likelihoods and the conditional expectations

use std::f64::consts::PI;

const HYP2F1_MAX_TERMS: usize = 200_000;
const HYP2F1_TOLERANCE: f64 = 1e-15;

/// Lanczos approximation of ln(Gamma(x)).
pub fn ln_gamma(x: f64) -> f64 {
    // Lanczos coefficients (g=7, n=9).
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    const G: f64 = 7.0;

    if x.is_nan() || x <= 0.0 {
        return f64::INFINITY;
    }

    if x < 0.5 {
        // Reflection formula.
        let sin_val = (PI * x).sin();
        if sin_val.abs() < 1e-300 {
            return f64::INFINITY;
        }
        return PI.ln() - sin_val.abs().ln() - ln_gamma(1.0 - x);
    }

    let z = x - 1.0;
    let mut sum = COEFFS[0];
    for (i, &c) in COEFFS[1..].iter().enumerate() {
        sum += c / (z + i as f64 + 1.0);
    }

    let t = z + G + 0.5;
    (z + 0.5).mul_add(t.ln(), 0.5 * (2.0 * PI).ln()) - t + sum.ln()
}

/// Gauss hypergeometric function 2F1(a, b; c; z) for `0 <= z < 1`, summed
/// as a power series.
///
/// Returns a non-finite value when the series overflows; callers fall back to
/// [`ln_hyp2f1`], which applies the Euler transformation.
pub fn hyp2f1(a: f64, b: f64, c: f64, z: f64) -> f64 {
    if z == 0.0 {
        return 1.0;
    }

    let mut term = 1.0;
    let mut sum = 1.0;
    for k in 0..HYP2F1_MAX_TERMS {
        let k = k as f64;
        term *= (a + k) * (b + k) / ((c + k) * (k + 1.0)) * z;
        sum += term;
        if !sum.is_finite() {
            return sum;
        }
        if term.abs() <= HYP2F1_TOLERANCE * sum.abs() {
            break;
        }
    }
    sum
}

/// ln 2F1(a, b; c; z), falling back to the Euler transformation
/// `2F1(a, b; c; z) = (1 - z)^(c - a - b) 2F1(c - a, c - b; c; z)`
/// when the direct series is not finite.
pub fn ln_hyp2f1(a: f64, b: f64, c: f64, z: f64) -> f64 {
    let direct = hyp2f1(a, b, c, z).ln();
    if direct.is_finite() {
        return direct;
    }
    hyp2f1(c - a, c - b, c, z).ln() + (c - a - b) * (1.0 - z).ln()
}

/// ln(exp(x) + exp(y)) without overflow
pub fn log_add_exp(x: f64, y: f64) -> f64 {
    let max = x.max(y);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + ((x - max).exp() + (y - max).exp()).ln()
}
