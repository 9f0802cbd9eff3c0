//! Probabilistic purchase and spend models
//!
//! Each model has a fitter (an [`Estimator`]) that turns a [`CltvFrame`] into an
//! immutable parameter set, and the parameter set carries the predictive formulas.

pub mod bgnbd;
pub mod gamma_gamma;
pub mod optimize;
pub mod special;

use ndarray::{Array1, Zip};

use crate::error::{CltvError, ConvergenceError};
use crate::frame::CltvFrame;
use optimize::{ConvergenceStatus, Minimum};

pub use bgnbd::{BetaGeoFitter, BetaGeoParams};
pub use gamma_gamma::{GammaGammaFitter, GammaGammaParams};

/// Parameters produced by a fit plus its diagnostics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fitted<P> {
    pub params: P,
    /// Unpenalized log-likelihood summed over the fitted customers
    pub log_likelihood: f64,
    pub iterations: usize,
}

/// Fits model parameters by maximum likelihood
pub trait Estimator {
    type Params;

    fn fit(&self, frame: &CltvFrame) -> Result<Fitted<Self::Params>, CltvError>;
}

/// Forecasts the number of purchases over a future horizon
pub trait PurchaseForecaster {
    /// Expected purchases in `(T, T + t]` given a customer's history
    fn expected_purchases(&self, t: f64, frequency: f64, recency: f64, tenure: f64) -> f64;

    /// Expected purchases over `t` for every customer in the frame
    fn predict(&self, t: f64, frame: &CltvFrame) -> Array1<f64> {
        Zip::from(&frame.frequency)
            .and(&frame.recency)
            .and(&frame.tenure)
            .map_collect(|&x, &t_x, &big_t| self.expected_purchases(t, x, t_x, big_t))
    }
}

/// Forecasts the average value of a customer's future transactions
pub trait SpendForecaster {
    fn expected_average_value(&self, frequency: f64, monetary: f64) -> f64;

    fn predict_average_value(&self, frame: &CltvFrame) -> Array1<f64> {
        Zip::from(&frame.frequency)
            .and(&frame.monetary)
            .map_collect(|&x, &m| self.expected_average_value(x, m))
    }
}

/// Map an optimizer outcome to parameters or a labeled convergence failure
pub(crate) fn converged_point(model: &'static str, minimum: Minimum) -> Result<Minimum, ConvergenceError> {
    match minimum.status {
        ConvergenceStatus::Converged => Ok(minimum),
        ConvergenceStatus::MaxIterations => Err(ConvergenceError {
            model,
            iterations: minimum.iterations,
            reason: format!(
                "iteration limit reached with objective {:.6}",
                minimum.value
            ),
        }),
        ConvergenceStatus::NumericalError => Err(ConvergenceError {
            model,
            iterations: minimum.iterations,
            reason: "objective is not finite at any simplex vertex".to_string(),
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::NaiveDate;
    use ndarray::Array1;

    use crate::frame::CltvFrame;

    /// Forty repeat customers with varied histories and spend
    pub(crate) fn synthetic_frame() -> CltvFrame {
        let mut customer_ids = Vec::new();
        let (mut recency, mut tenure, mut frequency, mut monetary) =
            (Vec::new(), Vec::new(), Vec::new(), Vec::new());

        for i in 0..40usize {
            let big_t = 20.0 + ((i * 13) % 60) as f64;
            customer_ids.push(format!("c{i:02}"));
            frequency.push(2.0 + ((i * 7) % 9) as f64);
            tenure.push(big_t);
            recency.push(big_t * (((i * 5) % 10) as f64 + 1.0) / 10.0);
            monetary.push(10.0 + ((i * 17) % 10) as f64);
        }

        CltvFrame {
            analysis_date: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
            customer_ids,
            recency: Array1::from(recency),
            tenure: Array1::from(tenure),
            frequency: Array1::from(frequency),
            monetary: Array1::from(monetary),
        }
    }
}
