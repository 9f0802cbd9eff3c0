//! Gamma-Gamma average-spend model

use tracing::{info, warn};

use super::optimize::NelderMead;
use super::special::ln_gamma;
use super::{converged_point, Estimator, Fitted, SpendForecaster};
use crate::error::{CltvError, ConvergenceError};
use crate::frame::CltvFrame;

const MODEL: &str = "Gamma-Gamma";

/// Fitted Gamma-Gamma parameters
///
/// Per-transaction spend is Gamma(p, nu); nu is Gamma(q, v) across customers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaGammaParams {
    pub p: f64,
    pub q: f64,
    pub v: f64,
}

impl GammaGammaParams {
    pub fn log_likelihood(&self, frequency: f64, monetary: f64) -> f64 {
        let GammaGammaParams { p, q, v } = *self;
        let (x, m) = (frequency, monetary);
        let px = p * x;

        ln_gamma(px + q) - ln_gamma(px) - ln_gamma(q) + q * v.ln() + (px - 1.0) * m.ln()
            + px * x.ln()
            - (px + q) * (x * m + v).ln()
    }

    /// Mean spend per transaction across the population; only meaningful for `q > 1`
    pub fn population_mean(&self) -> f64 {
        self.v * self.p / (self.q - 1.0)
    }
}

impl SpendForecaster for GammaGammaParams {
    /// Observed average shrunk toward the population mean; customers with
    /// more transactions keep more of their own average
    fn expected_average_value(&self, frequency: f64, monetary: f64) -> f64 {
        let weight = self.p * frequency / (self.p * frequency + self.q - 1.0);
        (1.0 - weight) * self.population_mean() + weight * monetary
    }
}

/// Maximum-likelihood fitter for [`GammaGammaParams`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaGammaFitter {
    pub penalizer_coef: f64,
    pub optimizer: NelderMead,
}

impl Default for GammaGammaFitter {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl GammaGammaFitter {
    pub fn new(penalizer_coef: f64) -> Self {
        Self {
            penalizer_coef,
            optimizer: NelderMead::default(),
        }
    }
}

impl Estimator for GammaGammaFitter {
    type Params = GammaGammaParams;

    fn fit(&self, frame: &CltvFrame) -> Result<Fitted<GammaGammaParams>, CltvError> {
        if frame.is_empty() {
            return Err(CltvError::EmptyFrame("selecting Gamma-Gamma observations"));
        }
        for (i, id) in frame.customer_ids.iter().enumerate() {
            let (x, m) = (frame.frequency[i], frame.monetary[i]);
            if !(x.is_finite() && m.is_finite()) {
                return Err(CltvError::observation(id, "frequency and monetary average must be finite"));
            }
            if x <= 0.0 || m <= 0.0 {
                return Err(CltvError::observation(
                    id,
                    "Gamma-Gamma needs positive frequency and monetary average",
                ));
            }
        }

        let observations: Vec<(f64, f64)> = frame
            .frequency
            .iter()
            .zip(&frame.monetary)
            .map(|(&x, &m)| (x, m))
            .collect();
        let n = observations.len() as f64;
        let penalizer = self.penalizer_coef;

        let objective = |log_params: &[f64]| -> f64 {
            let params = GammaGammaParams {
                p: log_params[0].exp(),
                q: log_params[1].exp(),
                v: log_params[2].exp(),
            };
            let total: f64 = observations
                .iter()
                .map(|&(x, m)| params.log_likelihood(x, m))
                .sum();
            let penalty = params.p * params.p + params.q * params.q + params.v * params.v;
            -total / n + penalizer * penalty
        };

        let minimum = converged_point(MODEL, self.optimizer.minimize(objective, &[0.0; 3]))?;
        let params = GammaGammaParams {
            p: minimum.point[0].exp(),
            q: minimum.point[1].exp(),
            v: minimum.point[2].exp(),
        };
        if let Some(&(x, _)) = observations
            .iter()
            .find(|&&(x, _)| params.p * x + params.q - 1.0 <= 0.0)
        {
            return Err(ConvergenceError {
                model: MODEL,
                iterations: minimum.iterations,
                reason: format!(
                    "p * x + q - 1 = {:.4} <= 0 for frequency {x}; the shrinkage weight is undefined",
                    params.p * x + params.q - 1.0
                ),
            }
            .into());
        }
        if params.q <= 1.0 {
            warn!(
                q = params.q,
                "Gamma-Gamma q <= 1: the population mean spend is undefined"
            );
        }

        let log_likelihood: f64 = observations
            .iter()
            .map(|&(x, m)| params.log_likelihood(x, m))
            .sum();

        info!(
            p = params.p,
            q = params.q,
            v = params.v,
            log_likelihood,
            iterations = minimum.iterations,
            "fitted Gamma-Gamma model"
        );

        Ok(Fitted {
            params,
            log_likelihood,
            iterations: minimum.iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::synthetic_frame;

    /// Published CDNOW estimates
    fn cdnow() -> GammaGammaParams {
        GammaGammaParams {
            p: 6.25,
            q: 3.74,
            v: 15.44,
        }
    }

    #[test]
    fn test_population_mean() {
        let mean = cdnow().population_mean();
        assert!((mean - 35.22).abs() < 0.01, "got {mean}");
    }

    #[test]
    fn test_shrinkage_toward_population_mean() {
        let params = cdnow();
        let mean = params.population_mean();

        let few = params.expected_average_value(1.0, 100.0);
        let many = params.expected_average_value(50.0, 100.0);

        // both shrink toward the mean, fewer transactions shrink more
        assert!(few > mean && few < 100.0);
        assert!(many > few && many < 100.0);
        assert!((params.expected_average_value(0.0, 100.0) - mean).abs() < 1e-12);
    }

    fn assert_close(actual: f64, expected: f64, rel: f64) {
        assert!(
            (actual - expected).abs() <= rel * expected.abs(),
            "got {actual}, expected {expected}"
        );
    }

    #[test]
    fn test_log_likelihood_golden_values() {
        // computed independently with arbitrary-precision log-gamma
        let params = cdnow();
        assert_close(params.log_likelihood(2.0, 35.0), -4.095_817_314_648_980, 1e-10);
        assert_close(params.log_likelihood(10.0, 20.5), -3.431_184_972_653_026, 1e-10);
    }

    #[test]
    fn test_fit_produces_usable_parameters() {
        let frame = synthetic_frame();
        let fitted = GammaGammaFitter::default().fit(&frame).unwrap();
        let params = fitted.params;

        assert_close(params.p, 4.4823, 1e-2);
        assert_close(params.q, 1.7681, 1e-2);
        assert_close(params.v, 4.2857, 1e-2);
        assert!(params.population_mean().is_finite());

        let values = params.predict_average_value(&frame);
        assert!(values.iter().all(|v| v.is_finite() && *v > 0.0));
    }

    #[test]
    fn test_fit_with_q_below_one_still_scores() {
        let mut frame = synthetic_frame();
        frame.monetary.mapv_inplace(|m| m * 5.0);

        let params = GammaGammaFitter::default().fit(&frame).unwrap().params;
        assert!(params.q < 1.0, "q = {}", params.q);
        assert_close(params.q, 0.6685, 1e-2);
        assert!(params.population_mean() < 0.0);

        let values = params.predict_average_value(&frame);
        for (value, monetary) in values.iter().zip(&frame.monetary) {
            assert!(value.is_finite() && *value > 0.0);
            // weight above one pushes the estimate past the observed average
            assert!(*value >= *monetary);
        }
    }

    #[test]
    fn test_zero_spend_is_rejected() {
        let mut frame = synthetic_frame();
        frame.monetary[3] = 0.0;
        let err = GammaGammaFitter::default().fit(&frame).unwrap_err();
        assert!(matches!(err, CltvError::InvalidObservation { .. }));
    }

    #[test]
    fn test_undefined_monetary_average_is_rejected() {
        let mut frame = synthetic_frame();
        frame.monetary[0] = f64::NAN;
        assert!(GammaGammaFitter::default().fit(&frame).is_err());
    }
}
