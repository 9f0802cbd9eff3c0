//! Equal-population CLTV segments

use crate::error::CltvError;

/// Summary of one segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSummary {
    pub label: String,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub sum: f64,
}

/// Segment label per customer plus per-segment summaries, lowest segment first
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// `None` for customers whose CLTV is undefined
    pub labels: Vec<Option<String>>,
    pub summaries: Vec<SegmentSummary>,
}

/// Labels for `k` segments from lowest to highest value: `D, C, B, A` for 4
pub fn segment_labels(k: usize) -> Vec<String> {
    (0..k)
        .map(|i| char::from(b'A' + (k - 1 - i) as u8).to_string())
        .collect()
}

/// Split customers into `k` equal-population buckets by ascending CLTV
///
/// Ranks come from a stable sort, so equal values keep input order. Bucket
/// sizes differ by at most one. NaN values are left unsegmented and do not
/// count toward the bucket sizes.
pub fn segment_by_cltv(cltv: &[f64], k: usize) -> Result<Segmentation, CltvError> {
    let mut order: Vec<usize> = (0..cltv.len()).filter(|&row| !cltv[row].is_nan()).collect();
    let n = order.len();
    if k == 0 || k > 26 || n < k {
        return Err(CltvError::InvalidSegmentCount { segments: k, rows: n });
    }

    let labels = segment_labels(k);
    order.sort_by(|&i, &j| cltv[i].total_cmp(&cltv[j]));

    let mut bucket_of = vec![None; cltv.len()];
    for (rank, &row) in order.iter().enumerate() {
        bucket_of[row] = Some(rank * k / n);
    }

    let summaries = (0..k)
        .map(|bucket| {
            let values: Vec<f64> = order
                .iter()
                .filter(|&&row| bucket_of[row] == Some(bucket))
                .map(|&row| cltv[row])
                .collect();
            let sum: f64 = values.iter().sum();
            SegmentSummary {
                label: labels[bucket].clone(),
                count: values.len(),
                min: values.first().copied().unwrap_or(f64::NAN),
                max: values.last().copied().unwrap_or(f64::NAN),
                mean: sum / values.len() as f64,
                sum,
            }
        })
        .collect();

    Ok(Segmentation {
        labels: bucket_of
            .iter()
            .map(|bucket| bucket.map(|b| labels[b].clone()))
            .collect(),
        summaries,
    })
}
