//! Discounted customer lifetime value from the two fitted models

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::frame::CltvFrame;
use crate::models::{PurchaseForecaster, SpendForecaster};

/// Unit the recency/tenure columns (and the purchase model) are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    #[default]
    Weekly,
    Monthly,
    Daily,
    Hourly,
}

impl TimeUnit {
    /// Model time units in one month
    pub fn periods_per_month(self) -> f64 {
        match self {
            TimeUnit::Weekly => 4.345,
            TimeUnit::Monthly => 1.0,
            TimeUnit::Daily => 30.0,
            TimeUnit::Hourly => 30.0 * 24.0,
        }
    }
}

/// Horizon and discounting for the lifetime value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClvOptions {
    pub months: u32,
    /// Discount rate per month
    pub discount_rate: f64,
    pub time_unit: TimeUnit,
}

impl Default for ClvOptions {
    fn default() -> Self {
        Self {
            months: 6,
            discount_rate: 0.01,
            time_unit: TimeUnit::Weekly,
        }
    }
}

/// Lifetime value of one customer
///
/// Sums, month by month, the expected purchases in that month times the
/// expected average value, discounted by `(1 + rate)^month`.
pub fn lifetime_value<F, S>(
    transactions: &F,
    spend: &S,
    observation: (f64, f64, f64, f64),
    options: &ClvOptions,
) -> f64
where
    F: PurchaseForecaster + ?Sized,
    S: SpendForecaster + ?Sized,
{
    let (frequency, recency, tenure, monetary) = observation;
    let value = spend.expected_average_value(frequency, monetary);
    let factor = options.time_unit.periods_per_month();

    (1..=options.months)
        .map(|month| {
            let end = f64::from(month) * factor;
            let purchases = transactions.expected_purchases(end, frequency, recency, tenure)
                - transactions.expected_purchases(end - factor, frequency, recency, tenure);
            value * purchases / (1.0 + options.discount_rate).powi(month as i32)
        })
        .sum()
}

/// Lifetime value for every customer in the frame
pub fn customer_lifetime_value<F, S>(
    transactions: &F,
    spend: &S,
    frame: &CltvFrame,
    options: &ClvOptions,
) -> Array1<f64>
where
    F: PurchaseForecaster + ?Sized,
    S: SpendForecaster + ?Sized,
{
    (0..frame.len())
        .map(|i| {
            lifetime_value(
                transactions,
                spend,
                (frame.frequency[i], frame.recency[i], frame.tenure[i], frame.monetary[i]),
                options,
            )
        })
        .collect()
}
