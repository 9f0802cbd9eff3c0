//! Loading raw omnichannel customer rows using Polars

use std::collections::BTreeMap;
use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::error::CltvError;

pub const CUSTOMER_ID: &str = "master_id";
pub const FIRST_ORDER_DATE: &str = "first_order_date";
pub const LAST_ORDER_DATE: &str = "last_order_date";

/// Token marking a column as a date column
pub const DATE_TOKEN: &str = "date";

/// The four per-channel count/value columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelColumn {
    OrderNumOnline,
    OrderNumOffline,
    ValueOffline,
    ValueOnline,
}

impl ChannelColumn {
    pub const ALL: [ChannelColumn; 4] = [
        ChannelColumn::OrderNumOnline,
        ChannelColumn::OrderNumOffline,
        ChannelColumn::ValueOffline,
        ChannelColumn::ValueOnline,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChannelColumn::OrderNumOnline => "order_num_total_ever_online",
            ChannelColumn::OrderNumOffline => "order_num_total_ever_offline",
            ChannelColumn::ValueOffline => "customer_value_total_ever_offline",
            ChannelColumn::ValueOnline => "customer_value_total_ever_online",
        }
    }

    pub fn get(self, totals: &ChannelTotals) -> f64 {
        match self {
            ChannelColumn::OrderNumOnline => totals.order_num_online,
            ChannelColumn::OrderNumOffline => totals.order_num_offline,
            ChannelColumn::ValueOffline => totals.value_offline,
            ChannelColumn::ValueOnline => totals.value_online,
        }
    }

    /// Copy of `totals` with this column replaced by `value`
    pub fn with(self, totals: ChannelTotals, value: f64) -> ChannelTotals {
        let mut updated = totals;
        match self {
            ChannelColumn::OrderNumOnline => updated.order_num_online = value,
            ChannelColumn::OrderNumOffline => updated.order_num_offline = value,
            ChannelColumn::ValueOffline => updated.value_offline = value,
            ChannelColumn::ValueOnline => updated.value_online = value,
        }
        updated
    }
}

/// Per-channel order counts and monetary totals of one customer
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelTotals {
    pub order_num_online: f64,
    pub order_num_offline: f64,
    pub value_online: f64,
    pub value_offline: f64,
}

/// One input row before any derivation
#[derive(Debug, Clone, PartialEq)]
pub struct RawCustomer {
    pub customer_id: String,
    /// Every column whose name contains `date`, as read; blank optional
    /// dates are left out
    pub dates: BTreeMap<String, String>,
    pub channels: ChannelTotals,
}

/// The loaded input table
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    pub rows: Vec<RawCustomer>,
    /// Names of the date columns found in the input, in input order
    pub date_columns: Vec<String>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of one channel column, in row order
    pub fn channel_values(&self, column: ChannelColumn) -> Vec<f64> {
        self.rows.iter().map(|row| column.get(&row.channels)).collect()
    }
}

/// Load the customer CSV file
///
/// # Arguments
/// * `file_path` - Path to a comma-delimited file with a header row
///
/// # Returns
/// * `RawTable` with one row per customer
pub fn load_customers(file_path: impl AsRef<Path>) -> Result<RawTable, CltvError> {
    let path = file_path.as_ref();

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|source| CltvError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let table = customers_from_frame(&df)?;
    info!(
        path = %path.display(),
        customers = table.len(),
        date_columns = table.date_columns.len(),
        "loaded customer table"
    );
    Ok(table)
}

/// Convert an already-loaded frame into typed rows
pub fn customers_from_frame(df: &DataFrame) -> Result<RawTable, CltvError> {
    for required in [CUSTOMER_ID, FIRST_ORDER_DATE, LAST_ORDER_DATE] {
        require_column(df, required)?;
    }
    for column in ChannelColumn::ALL {
        require_column(df, column.name())?;
    }

    let date_columns: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .filter(|name| name.contains(DATE_TOKEN))
        .collect();

    let ids = string_column(df, CUSTOMER_ID)?;
    let mut date_values = Vec::with_capacity(date_columns.len());
    for name in &date_columns {
        date_values.push(string_column(df, name)?);
    }
    let mut channel_values = Vec::with_capacity(ChannelColumn::ALL.len());
    for column in ChannelColumn::ALL {
        channel_values.push(numeric_column(df, column.name())?);
    }

    let mut rows = Vec::with_capacity(df.height());
    for (row, id) in ids.into_iter().enumerate() {
        let customer_id = id.ok_or_else(|| CltvError::InvalidValue {
            column: CUSTOMER_ID.to_string(),
            row,
            reason: "missing customer identifier".to_string(),
        })?;

        // blank per-channel dates are absent; blank purchase dates fail later as invalid
        let dates = date_columns
            .iter()
            .zip(&date_values)
            .filter_map(|(name, values)| match values[row].as_deref() {
                Some(value) if !value.is_empty() => Some((name.clone(), value.to_string())),
                _ if is_purchase_date(name) => Some((name.clone(), String::new())),
                _ => None,
            })
            .collect();

        let mut channels = ChannelTotals::default();
        for (column, values) in ChannelColumn::ALL.iter().zip(&channel_values) {
            let value = values[row].ok_or_else(|| CltvError::InvalidValue {
                column: column.name().to_string(),
                row,
                reason: "missing or non-numeric value".to_string(),
            })?;
            if value < 0.0 {
                return Err(CltvError::InvalidValue {
                    column: column.name().to_string(),
                    row,
                    reason: format!("negative value {value}"),
                });
            }
            channels = column.with(channels, value);
        }

        rows.push(RawCustomer {
            customer_id,
            dates,
            channels,
        });
    }

    Ok(RawTable { rows, date_columns })
}

fn is_purchase_date(name: &str) -> bool {
    name == FIRST_ORDER_DATE || name == LAST_ORDER_DATE
}

fn require_column(df: &DataFrame, name: &str) -> Result<(), CltvError> {
    df.column(name)
        .map(|_| ())
        .map_err(|_| CltvError::MissingColumn(name.to_string()))
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, CltvError> {
    let column = df
        .column(name)
        .map_err(|_| CltvError::MissingColumn(name.to_string()))?;
    let series = column.as_materialized_series().cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|value| value.map(|v| v.trim().to_string()))
        .collect();
    Ok(values)
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, CltvError> {
    let column = df
        .column(name)
        .map_err(|_| CltvError::MissingColumn(name.to_string()))?;
    let series = column.as_materialized_series().cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().collect();
    Ok(values)
}
