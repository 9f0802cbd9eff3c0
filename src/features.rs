//! Per-customer totals and parsed purchase dates

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::data::{ChannelTotals, RawTable, FIRST_ORDER_DATE, LAST_ORDER_DATE};
use crate::error::CltvError;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// A customer with channel totals summed and dates parsed
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerFeatures {
    pub customer_id: String,
    pub first_order_date: NaiveDate,
    pub last_order_date: NaiveDate,
    /// Every date column of the input, parsed
    pub dates: BTreeMap<String, NaiveDate>,
    pub channels: ChannelTotals,
    pub order_num_total: f64,
    pub customer_value_total: f64,
}

/// Sum the channel totals and parse every date column
///
/// A single malformed date fails the whole table.
pub fn derive_features(table: &RawTable) -> Result<Vec<CustomerFeatures>, CltvError> {
    table
        .rows
        .iter()
        .enumerate()
        .map(|(row, raw)| {
            let mut dates = BTreeMap::new();
            for (column, value) in &raw.dates {
                let date = parse_date(value).ok_or_else(|| CltvError::InvalidDate {
                    column: column.clone(),
                    row,
                    value: value.clone(),
                })?;
                dates.insert(column.clone(), date);
            }

            let first_order_date = required_date(&dates, FIRST_ORDER_DATE)?;
            let last_order_date = required_date(&dates, LAST_ORDER_DATE)?;
            let channels = raw.channels;

            Ok(CustomerFeatures {
                customer_id: raw.customer_id.clone(),
                first_order_date,
                last_order_date,
                dates,
                channels,
                order_num_total: channels.order_num_online + channels.order_num_offline,
                customer_value_total: channels.value_offline + channels.value_online,
            })
        })
        .collect()
}

/// Parse `YYYY-MM-DD`, dropping any time-of-day component
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, DATE_FORMAT) {
        return Some(date);
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|datetime| datetime.date())
}

fn required_date(dates: &BTreeMap<String, NaiveDate>, column: &str) -> Result<NaiveDate, CltvError> {
    dates
        .get(column)
        .copied()
        .ok_or_else(|| CltvError::MissingColumn(column.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RawCustomer;

    fn raw(id: &str, first: &str, last: &str, channels: ChannelTotals) -> RawCustomer {
        let mut dates = BTreeMap::new();
        dates.insert(FIRST_ORDER_DATE.to_string(), first.to_string());
        dates.insert(LAST_ORDER_DATE.to_string(), last.to_string());
        dates.insert("last_order_date_online".to_string(), last.to_string());
        RawCustomer {
            customer_id: id.to_string(),
            dates,
            channels,
        }
    }

    #[test]
    fn test_totals_are_channel_sums() {
        let channels = ChannelTotals {
            order_num_online: 4.0,
            order_num_offline: 1.0,
            value_online: 799.38,
            value_offline: 139.99,
        };
        let table = RawTable {
            rows: vec![raw("a", "2020-10-30", "2021-02-26", channels)],
            date_columns: Vec::new(),
        };

        let features = derive_features(&table).unwrap();
        assert_eq!(features[0].order_num_total, 5.0);
        assert_eq!(features[0].customer_value_total, 139.99 + 799.38);
        assert_eq!(
            features[0].first_order_date,
            NaiveDate::from_ymd_opt(2020, 10, 30).unwrap()
        );
        assert_eq!(features[0].dates.len(), 3);
    }

    #[test]
    fn test_malformed_date_fails() {
        let table = RawTable {
            rows: vec![
                raw("a", "2020-10-30", "2021-02-26", ChannelTotals::default()),
                raw("b", "2020-13-45", "2021-02-26", ChannelTotals::default()),
            ],
            date_columns: Vec::new(),
        };

        let err = derive_features(&table).unwrap_err();
        match err {
            CltvError::InvalidDate { column, row, value } => {
                assert_eq!(column, FIRST_ORDER_DATE);
                assert_eq!(row, 1);
                assert_eq!(value, "2020-13-45");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2021, 5, 30);
        assert_eq!(parse_date("2021-05-30"), expected);
        assert_eq!(parse_date("2021-05-30 13:45:00"), expected);
        assert_eq!(parse_date("2021-05-30T13:45:00"), expected);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("30/05/2021"), None);
    }
}
