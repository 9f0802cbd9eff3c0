//! Winsorization of the channel count/value columns

use tracing::debug;

use crate::data::{ChannelColumn, RawTable};

/// Integer clipping bounds derived from a column's quantiles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierBounds {
    pub low: f64,
    pub high: f64,
}

impl OutlierBounds {
    pub fn clip(&self, value: f64) -> f64 {
        if value < self.low {
            self.low
        } else if value > self.high {
            self.high
        } else {
            value
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.low..=self.high).contains(&value)
    }
}

/// What the suppressor did to one column
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSummary {
    pub column: ChannelColumn,
    pub bounds: Option<OutlierBounds>,
    pub clipped: usize,
}

/// Clips values outside `Q_low - 1.5 IQR .. Q_high + 1.5 IQR`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierSuppressor {
    pub lower_quantile: f64,
    pub upper_quantile: f64,
    pub iqr_multiplier: f64,
}

impl Default for OutlierSuppressor {
    fn default() -> Self {
        Self {
            lower_quantile: 0.01,
            upper_quantile: 0.99,
            iqr_multiplier: 1.5,
        }
    }
}

impl OutlierSuppressor {
    pub fn new(lower_quantile: f64, upper_quantile: f64) -> Self {
        Self {
            lower_quantile,
            upper_quantile,
            ..Self::default()
        }
    }

    /// Rounded bounds for one column, `None` for an empty column
    pub fn thresholds(&self, values: &[f64]) -> Option<OutlierBounds> {
        let q1 = quantile(values, self.lower_quantile)?;
        let q3 = quantile(values, self.upper_quantile)?;
        let iqr = q3 - q1;
        Some(OutlierBounds {
            low: (q1 - self.iqr_multiplier * iqr).round_ties_even(),
            high: (q3 + self.iqr_multiplier * iqr).round_ties_even(),
        })
    }

    /// Clip one column; values inside the bounds are returned untouched
    pub fn replace_with_thresholds(&self, values: &[f64]) -> (Vec<f64>, Option<OutlierBounds>) {
        match self.thresholds(values) {
            Some(bounds) => (values.iter().map(|&v| bounds.clip(v)).collect(), Some(bounds)),
            None => (values.to_vec(), None),
        }
    }

    /// Apply the suppressor independently to each channel column
    pub fn suppress(&self, table: &RawTable) -> (RawTable, Vec<ClipSummary>) {
        let mut suppressed = table.clone();
        let mut summaries = Vec::with_capacity(ChannelColumn::ALL.len());

        for column in ChannelColumn::ALL {
            let original = table.channel_values(column);
            let (clipped_values, bounds) = self.replace_with_thresholds(&original);

            let clipped = original
                .iter()
                .zip(&clipped_values)
                .filter(|(before, after)| before != after)
                .count();

            for (row, value) in suppressed.rows.iter_mut().zip(clipped_values) {
                row.channels = column.with(row.channels, value);
            }

            if let Some(b) = bounds {
                debug!(
                    column = column.name(),
                    low = b.low,
                    high = b.high,
                    clipped,
                    "suppressed outliers"
                );
            }
            summaries.push(ClipSummary {
                column,
                bounds,
                clipped,
            });
        }

        (suppressed, summaries)
    }
}

/// Quantile by linear interpolation between order statistics (R-7)
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let h = (sorted.len() - 1) as f64 * q;
    let lower = h.floor() as usize;
    let upper = h.ceil() as usize;
    let fraction = h - lower as f64;

    Some(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ChannelTotals, RawCustomer};
    use proptest::prelude::*;

    fn table_with_online_orders(values: &[f64]) -> RawTable {
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, &v)| RawCustomer {
                customer_id: format!("c{i}"),
                dates: Default::default(),
                channels: ChannelTotals {
                    order_num_online: v,
                    order_num_offline: 1.0,
                    value_online: 10.0,
                    value_offline: 20.0,
                },
            })
            .collect();
        RawTable {
            rows,
            date_columns: Vec::new(),
        }
    }

    #[test]
    fn test_quantile_interpolates() {
        let values = [5.0, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 0.5), Some(3.0));
        assert_eq!(quantile(&values, 1.0), Some(5.0));
        assert_eq!(quantile(&values, 0.125), Some(1.5));
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&values, 1.5), None);
    }

    #[test]
    fn test_bounds_are_rounded() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        let bounds = OutlierSuppressor::default().thresholds(&values).unwrap();
        // q01 = 1.99, q99 = 99.01, iqr = 97.02
        assert_eq!(bounds.low, -144.0);
        assert_eq!(bounds.high, 245.0);
    }

    #[test]
    fn test_extreme_value_is_clipped_not_dropped() {
        let mut values = vec![1.0; 200];
        values[0] = 5000.0;
        let table = table_with_online_orders(&values);

        let (suppressed, summaries) = OutlierSuppressor::default().suppress(&table);
        assert_eq!(suppressed.len(), 200);

        let online = &summaries[0];
        assert_eq!(online.column, ChannelColumn::OrderNumOnline);
        let bounds = online.bounds.unwrap();
        assert_eq!(suppressed.rows[0].channels.order_num_online, bounds.high);
        assert!(bounds.high < 5000.0);
        assert_eq!(online.clipped, 1);

        // untouched columns keep their values
        assert_eq!(suppressed.rows[0].channels.value_offline, 20.0);
        assert_eq!(summaries[2].clipped, 0);
    }

    #[test]
    fn test_empty_table_passes_through() {
        let table = RawTable::default();
        let (suppressed, summaries) = OutlierSuppressor::default().suppress(&table);
        assert!(suppressed.is_empty());
        assert!(summaries.iter().all(|s| s.bounds.is_none()));
    }

    proptest! {
        #[test]
        fn prop_output_within_bounds_and_inliers_unchanged(
            values in prop::collection::vec(0.0f64..10_000.0, 1..300)
        ) {
            let suppressor = OutlierSuppressor::default();
            let (clipped, bounds) = suppressor.replace_with_thresholds(&values);
            let bounds = bounds.unwrap();

            for (before, after) in values.iter().zip(&clipped) {
                prop_assert!(bounds.contains(*after));
                if bounds.contains(*before) {
                    prop_assert_eq!(before, after);
                }
            }
        }
    }
}
