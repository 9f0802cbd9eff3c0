//! The scoring pipeline: suppress, derive, frame, fit, predict, segment

use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{info, warn};

use crate::cltv::customer_lifetime_value;
use crate::config::PipelineConfig;
use crate::data::RawTable;
use crate::error::CltvError;
use crate::features::derive_features;
use crate::frame::{build_cltv_frame, CltvFrame};
use crate::models::{
    BetaGeoFitter, BetaGeoParams, Estimator, Fitted, GammaGammaFitter, GammaGammaParams,
    PurchaseForecaster, SpendForecaster,
};
use crate::outliers::ClipSummary;
use crate::segment::{segment_by_cltv, SegmentSummary};

/// One scored customer
#[derive(Debug, Clone, PartialEq)]
pub struct CltvPrediction {
    pub customer_id: String,
    pub recency_weekly: f64,
    pub tenure_weekly: f64,
    pub frequency: f64,
    pub monetary_avg: f64,
    /// Expected purchases over each configured sales horizon
    pub expected_sales: [f64; 2],
    pub probability_alive: f64,
    /// NaN for customers without a defined monetary average
    pub expected_average_value: f64,
    pub cltv: f64,
    /// `None` when the CLTV is undefined
    pub segment: Option<String>,
}

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct CltvReport {
    pub analysis_date: NaiveDate,
    pub sales_horizons: [u32; 2],
    pub outliers: Vec<ClipSummary>,
    pub frequency_model: Fitted<BetaGeoParams>,
    pub monetary_model: Fitted<GammaGammaParams>,
    pub predictions: Vec<CltvPrediction>,
    pub segments: Vec<SegmentSummary>,
}

/// Score every customer in `table`
pub fn run(table: &RawTable, config: &PipelineConfig) -> Result<CltvReport, CltvError> {
    let (suppressed, outliers) = config.outliers.suppress(table);
    let customers = derive_features(&suppressed)?;
    let frame = build_cltv_frame(&customers, &config.frame)?;

    let mut frequency_fitter = BetaGeoFitter::new(config.frequency_penalizer);
    frequency_fitter.optimizer.max_iterations = config.max_iterations;
    let frequency_model = frequency_fitter.fit(&frame)?;

    let mut monetary_fitter = GammaGammaFitter::new(config.monetary_penalizer);
    monetary_fitter.optimizer.max_iterations = config.max_iterations;
    let monetary_model = monetary_fitter.fit(&frame.repeat_customers())?;

    let (predictions, segments) =
        score(&frame, &frequency_model.params, &monetary_model.params, config)?;
    let unscored = predictions.iter().filter(|p| p.segment.is_none()).count();
    if unscored > 0 {
        warn!(customers = unscored, "customers with undefined CLTV left unsegmented");
    }
    info!(
        customers = predictions.len(),
        segments = segments.len(),
        "scored customers"
    );

    Ok(CltvReport {
        analysis_date: frame.analysis_date,
        sales_horizons: config.sales_horizons,
        outliers,
        frequency_model,
        monetary_model,
        predictions,
        segments,
    })
}

/// Predictions and segment summaries for a frame under already-fitted parameters
///
/// Sales horizons are converted to weeks at four weeks per month.
pub fn score(
    frame: &CltvFrame,
    transactions: &BetaGeoParams,
    spend: &GammaGammaParams,
    config: &PipelineConfig,
) -> Result<(Vec<CltvPrediction>, Vec<SegmentSummary>), CltvError> {
    let [short, long] = config
        .sales_horizons
        .map(|months| transactions.predict(4.0 * f64::from(months), frame));
    let average_value = spend.predict_average_value(frame);
    let cltv = customer_lifetime_value(transactions, spend, frame, &config.clv).to_vec();
    let segmentation = segment_by_cltv(&cltv, config.segments)?;

    let predictions = (0..frame.len())
        .map(|i| CltvPrediction {
            customer_id: frame.customer_ids[i].clone(),
            recency_weekly: frame.recency[i],
            tenure_weekly: frame.tenure[i],
            frequency: frame.frequency[i],
            monetary_avg: frame.monetary[i],
            expected_sales: [short[i], long[i]],
            probability_alive: transactions.probability_alive(
                frame.frequency[i],
                frame.recency[i],
                frame.tenure[i],
            ),
            expected_average_value: average_value[i],
            cltv: cltv[i],
            segment: segmentation.labels[i].clone(),
        })
        .collect();
    Ok((predictions, segmentation.summaries))
}

impl CltvReport {
    /// Name of the expected-sales column for horizon `index`
    pub fn sales_column(&self, index: usize) -> String {
        format!("exp_sales_{}_month", self.sales_horizons[index])
    }

    /// Customers ordered by a score, highest first; ties keep input order and
    /// undefined scores are skipped
    pub fn top_by<F>(&self, n: usize, score: F) -> Vec<&CltvPrediction>
    where
        F: Fn(&CltvPrediction) -> f64,
    {
        let mut ranked: Vec<&CltvPrediction> =
            self.predictions.iter().filter(|p| !score(*p).is_nan()).collect();
        ranked.sort_by(|a, b| score(*b).total_cmp(&score(*a)));
        ranked.truncate(n);
        ranked
    }

    /// The output table
    pub fn to_dataframe(&self) -> Result<DataFrame, CltvError> {
        let rows = &self.predictions;
        let column = |name: &str, value: fn(&CltvPrediction) -> f64| {
            Column::new(name.into(), rows.iter().map(value).collect::<Vec<f64>>())
        };

        let df = DataFrame::new(vec![
            Column::new(
                "customer_id".into(),
                rows.iter().map(|p| p.customer_id.as_str()).collect::<Vec<&str>>(),
            ),
            column("recency_cltv_weekly", |p| p.recency_weekly),
            column("T_weekly", |p| p.tenure_weekly),
            column("frequency", |p| p.frequency),
            column("monetary_cltv_avg", |p| p.monetary_avg),
            column(&self.sales_column(0), |p| p.expected_sales[0]),
            column(&self.sales_column(1), |p| p.expected_sales[1]),
            column("exp_average_value", |p| p.expected_average_value),
            column("cltv", |p| p.cltv),
            Column::new(
                "cltv_segment".into(),
                rows.iter().map(|p| p.segment.as_deref()).collect::<Vec<Option<&str>>>(),
            ),
        ])?;
        Ok(df)
    }

    /// Write the output table as CSV with a header row
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), CltvError> {
        let mut df = self.to_dataframe()?;
        let file = File::create(path.as_ref())?;
        CsvWriter::new(file).include_header(true).finish(&mut df)?;
        info!(path = %path.as_ref().display(), rows = df.height(), "wrote predictions");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::synthetic_frame;

    fn fitted() -> (CltvFrame, BetaGeoParams, GammaGammaParams) {
        let frame = synthetic_frame();
        let bg = BetaGeoFitter::default().fit(&frame).unwrap().params;
        let gg = GammaGammaFitter::default().fit(&frame).unwrap().params;
        (frame, bg, gg)
    }

    #[test]
    fn test_score_shapes_and_horizons() {
        let (frame, bg, gg) = fitted();
        let config = PipelineConfig::default();
        let (rows, segments) = score(&frame, &bg, &gg, &config).unwrap();

        assert_eq!(rows.len(), frame.len());
        assert_eq!(segments.len(), 4);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.customer_id, frame.customer_ids[i]);
            assert!(row.expected_sales[0] >= 0.0);
            assert!(row.expected_sales[1] >= row.expected_sales[0]);
            let twelve_weeks = bg.expected_purchases(12.0, row.frequency, row.recency_weekly, row.tenure_weekly);
            assert_eq!(row.expected_sales[0], twelve_weeks);
            assert_eq!(
                row.probability_alive,
                bg.probability_alive(row.frequency, row.recency_weekly, row.tenure_weekly)
            );
            assert!((0.0..=1.0).contains(&row.probability_alive));
            assert!(row.cltv.is_finite() && row.cltv > 0.0);
        }
    }

    #[test]
    fn test_segments_follow_cltv_ranking() {
        let (frame, bg, gg) = fitted();
        let (rows, _) = score(&frame, &bg, &gg, &PipelineConfig::default()).unwrap();

        for a in &rows {
            for b in &rows {
                if a.cltv < b.cltv {
                    assert!(a.segment.is_some() && b.segment.is_some());
                    assert!(a.segment >= b.segment, "{} {:?} vs {} {:?}", a.cltv, a.segment, b.cltv, b.segment);
                }
            }
        }
    }

    #[test]
    fn test_score_rejects_too_many_segments() {
        let (frame, bg, gg) = fitted();
        let config = PipelineConfig {
            segments: 26,
            ..PipelineConfig::default()
        };
        let small = CltvFrame {
            analysis_date: frame.analysis_date,
            customer_ids: frame.customer_ids[..3].to_vec(),
            recency: frame.recency.slice(ndarray::s![..3]).to_owned(),
            tenure: frame.tenure.slice(ndarray::s![..3]).to_owned(),
            frequency: frame.frequency.slice(ndarray::s![..3]).to_owned(),
            monetary: frame.monetary.slice(ndarray::s![..3]).to_owned(),
        };
        let err = score(&small, &bg, &gg, &config).unwrap_err();
        assert!(matches!(err, CltvError::InvalidSegmentCount { segments: 26, rows: 3 }));
    }
}
