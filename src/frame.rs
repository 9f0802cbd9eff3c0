//! Projection of customer features into the recency/tenure/frequency/monetary frame

use chrono::{Duration, NaiveDate};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CltvError;
use crate::features::CustomerFeatures;

const DAYS_PER_WEEK: f64 = 7.0;

/// How the analysis (cutoff) date is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AnalysisDate {
    /// Latest last-purchase date in the data plus `offset_days`
    Derived { offset_days: i64 },
    /// A fixed calendar date
    Fixed { date: NaiveDate },
}

impl Default for AnalysisDate {
    fn default() -> Self {
        AnalysisDate::Derived { offset_days: 2 }
    }
}

impl AnalysisDate {
    pub fn resolve(
        &self,
        last_orders: impl IntoIterator<Item = NaiveDate>,
    ) -> Result<NaiveDate, CltvError> {
        match *self {
            AnalysisDate::Fixed { date } => Ok(date),
            AnalysisDate::Derived { offset_days } => last_orders
                .into_iter()
                .max()
                .map(|last| last + Duration::days(offset_days))
                .ok_or(CltvError::EmptyFrame("loading")),
        }
    }
}

/// Row filters and cutoff for the frame builder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameOptions {
    pub analysis_date: AnalysisDate,
    /// Drop customers with zero orders or zero spend
    pub drop_zero_rows: bool,
    /// Keep only customers with `frequency > min_frequency`
    pub min_frequency: Option<f64>,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self::generalized()
    }
}

impl FrameOptions {
    /// Degenerate rows dropped, repeat customers only
    pub fn generalized() -> Self {
        Self {
            analysis_date: AnalysisDate::Fixed {
                date: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap_or_default(),
            },
            drop_zero_rows: true,
            min_frequency: Some(1.0),
        }
    }

    /// Every customer kept, cutoff two days after the last purchase
    pub fn exploratory() -> Self {
        Self {
            analysis_date: AnalysisDate::Derived { offset_days: 2 },
            drop_zero_rows: false,
            min_frequency: None,
        }
    }
}

/// The model input frame, one entry per customer in every column
#[derive(Debug, Clone, PartialEq)]
pub struct CltvFrame {
    pub analysis_date: NaiveDate,
    pub customer_ids: Vec<String>,
    /// Weeks between first and last purchase
    pub recency: Array1<f64>,
    /// Weeks between first purchase and the analysis date
    pub tenure: Array1<f64>,
    /// Total number of orders
    pub frequency: Array1<f64>,
    /// Total spend divided by total orders
    pub monetary: Array1<f64>,
}

impl CltvFrame {
    pub fn len(&self) -> usize {
        self.customer_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customer_ids.is_empty()
    }

    /// Rows the spend model learns from: repeat buyers with a positive,
    /// finite average
    pub fn repeat_customers(&self) -> CltvFrame {
        let keep: Vec<bool> = self
            .frequency
            .iter()
            .zip(&self.monetary)
            .map(|(&x, &m)| x > 1.0 && m.is_finite() && m > 0.0)
            .collect();
        self.retain(&keep)
    }

    /// Keep only the rows where `keep` is true
    fn retain(&self, keep: &[bool]) -> CltvFrame {
        let pick = |column: &Array1<f64>| -> Array1<f64> {
            column
                .iter()
                .zip(keep)
                .filter(|&(_, &k)| k)
                .map(|(&v, _)| v)
                .collect()
        };

        CltvFrame {
            analysis_date: self.analysis_date,
            customer_ids: self
                .customer_ids
                .iter()
                .zip(keep)
                .filter(|&(_, &k)| k)
                .map(|(id, _)| id.clone())
                .collect(),
            recency: pick(&self.recency),
            tenure: pick(&self.tenure),
            frequency: pick(&self.frequency),
            monetary: pick(&self.monetary),
        }
    }
}

fn weeks_between(from: NaiveDate, to: NaiveDate) -> f64 {
    (to - from).num_days() as f64 / DAYS_PER_WEEK
}

/// Build the CLTV frame
///
/// # Arguments
/// * `customers` - Customers with derived totals and parsed dates
/// * `options` - Cutoff date and row filters
///
/// # Returns
/// * `CltvFrame` ready for model fitting
pub fn build_cltv_frame(
    customers: &[CustomerFeatures],
    options: &FrameOptions,
) -> Result<CltvFrame, CltvError> {
    let kept: Vec<&CustomerFeatures> = if options.drop_zero_rows {
        customers
            .iter()
            .filter(|c| c.order_num_total != 0.0 && c.customer_value_total != 0.0)
            .collect()
    } else {
        customers.iter().collect()
    };
    if kept.is_empty() {
        return Err(CltvError::EmptyFrame("dropping zero-order and zero-spend rows"));
    }

    let analysis_date = options
        .analysis_date
        .resolve(kept.iter().map(|c| c.last_order_date))?;

    let mut customer_ids = Vec::with_capacity(kept.len());
    let mut recency = Vec::with_capacity(kept.len());
    let mut tenure = Vec::with_capacity(kept.len());
    let mut frequency = Vec::with_capacity(kept.len());
    let mut monetary = Vec::with_capacity(kept.len());
    let mut degenerate = 0usize;

    for customer in kept {
        if customer.last_order_date < customer.first_order_date {
            return Err(CltvError::observation(
                &customer.customer_id,
                format!(
                    "last purchase {} precedes first purchase {}",
                    customer.last_order_date, customer.first_order_date
                ),
            ));
        }
        if customer.last_order_date > analysis_date {
            return Err(CltvError::PurchaseAfterAnalysisDate {
                customer_id: customer.customer_id.clone(),
                last_order: customer.last_order_date,
                analysis_date,
            });
        }

        let average = if customer.order_num_total == 0.0 {
            degenerate += 1;
            f64::NAN
        } else {
            customer.customer_value_total / customer.order_num_total
        };

        customer_ids.push(customer.customer_id.clone());
        recency.push(weeks_between(customer.first_order_date, customer.last_order_date));
        tenure.push(weeks_between(customer.first_order_date, analysis_date));
        frequency.push(customer.order_num_total);
        monetary.push(average);
    }

    if degenerate > 0 {
        warn!(
            rows = degenerate,
            "customers with zero orders kept; their monetary average is undefined"
        );
    }

    let frame = CltvFrame {
        analysis_date,
        customer_ids,
        recency: Array1::from(recency),
        tenure: Array1::from(tenure),
        frequency: Array1::from(frequency),
        monetary: Array1::from(monetary),
    };

    let frame = match options.min_frequency {
        Some(min) => {
            let keep: Vec<bool> = frame.frequency.iter().map(|&f| f > min).collect();
            frame.retain(&keep)
        }
        None => frame,
    };
    if frame.is_empty() {
        return Err(CltvError::EmptyFrame("the minimum frequency filter"));
    }

    info!(
        customers = frame.len(),
        analysis_date = %frame.analysis_date,
        "built CLTV frame"
    );
    Ok(frame)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::ChannelTotals;
    use std::collections::BTreeMap;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn customer(
        id: &str,
        first: NaiveDate,
        last: NaiveDate,
        orders: f64,
        value: f64,
    ) -> CustomerFeatures {
        CustomerFeatures {
            customer_id: id.to_string(),
            first_order_date: first,
            last_order_date: last,
            dates: BTreeMap::new(),
            channels: ChannelTotals {
                order_num_online: orders,
                order_num_offline: 0.0,
                value_online: value,
                value_offline: 0.0,
            },
            order_num_total: orders,
            customer_value_total: value,
        }
    }

    #[test]
    fn test_weekly_recency_and_tenure() {
        let customers = vec![
            customer("a", date(2021, 1, 1), date(2021, 1, 15), 3.0, 300.0),
            customer("b", date(2021, 3, 1), date(2021, 5, 30), 2.0, 50.0),
        ];
        let options = FrameOptions {
            analysis_date: AnalysisDate::Derived { offset_days: 2 },
            drop_zero_rows: true,
            min_frequency: None,
        };

        let frame = build_cltv_frame(&customers, &options).unwrap();
        assert_eq!(frame.analysis_date, date(2021, 6, 1));
        assert_eq!(frame.recency[0], 2.0);
        assert_eq!(frame.tenure[0], 151.0 / 7.0);
        assert_eq!(frame.recency[1], 90.0 / 7.0);
        assert_eq!(frame.monetary[0], 100.0);
        assert_eq!(frame.monetary[1], 25.0);
    }

    #[test]
    fn test_same_day_customer_has_zero_recency() {
        let customers = vec![customer("a", date(2021, 5, 1), date(2021, 5, 1), 2.0, 80.0)];
        let frame = build_cltv_frame(&customers, &FrameOptions::generalized()).unwrap();
        assert_eq!(frame.recency[0], 0.0);
        assert!(frame.recency[0] <= frame.tenure[0]);
    }

    #[test]
    fn test_generalized_filters() {
        let customers = vec![
            customer("zero_orders", date(2021, 1, 1), date(2021, 1, 1), 0.0, 0.0),
            customer("zero_spend", date(2021, 1, 1), date(2021, 2, 1), 2.0, 0.0),
            customer("single", date(2021, 1, 1), date(2021, 1, 1), 1.0, 30.0),
            customer("repeat", date(2021, 1, 1), date(2021, 3, 1), 4.0, 200.0),
        ];

        let frame = build_cltv_frame(&customers, &FrameOptions::generalized()).unwrap();
        assert_eq!(frame.customer_ids, vec!["repeat"]);
        assert_eq!(frame.frequency[0], 4.0);
    }

    #[test]
    fn test_exploratory_keeps_degenerate_rows_as_nan() {
        let customers = vec![
            customer("zero_orders", date(2021, 1, 1), date(2021, 1, 1), 0.0, 0.0),
            customer("repeat", date(2021, 1, 1), date(2021, 3, 1), 4.0, 200.0),
        ];

        let frame = build_cltv_frame(&customers, &FrameOptions::exploratory()).unwrap();
        assert_eq!(frame.len(), 2);
        assert!(frame.monetary[0].is_nan());
        assert_eq!(frame.monetary[1], 50.0);
    }

    #[test]
    fn test_repeat_customers_selection() {
        let customers = vec![
            customer("zero_orders", date(2021, 1, 1), date(2021, 1, 1), 0.0, 0.0),
            customer("single", date(2021, 1, 1), date(2021, 1, 1), 1.0, 30.0),
            customer("free", date(2021, 1, 1), date(2021, 2, 1), 3.0, 0.0),
            customer("repeat", date(2021, 1, 1), date(2021, 3, 1), 4.0, 200.0),
        ];

        let frame = build_cltv_frame(&customers, &FrameOptions::exploratory()).unwrap();
        let repeat = frame.repeat_customers();
        assert_eq!(repeat.customer_ids, vec!["repeat"]);
        assert_eq!(repeat.monetary[0], 50.0);
        assert_eq!(repeat.analysis_date, frame.analysis_date);
    }

    #[test]
    fn test_purchase_after_fixed_analysis_date() {
        let customers = vec![customer("late", date(2021, 1, 1), date(2021, 7, 1), 3.0, 90.0)];
        let err = build_cltv_frame(&customers, &FrameOptions::generalized()).unwrap_err();
        assert!(matches!(err, CltvError::PurchaseAfterAnalysisDate { .. }));
    }

    #[test]
    fn test_everyone_filtered_is_an_error() {
        let customers = vec![customer("single", date(2021, 1, 1), date(2021, 1, 1), 1.0, 30.0)];
        let err = build_cltv_frame(&customers, &FrameOptions::generalized()).unwrap_err();
        assert!(matches!(err, CltvError::EmptyFrame(_)));
    }
}
