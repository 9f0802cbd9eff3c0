//! Console reports and Plotters charts for scored customers

use anyhow::{ensure, Context};
use plotters::prelude::*;

use crate::pipeline::{CltvPrediction, CltvReport};
use crate::segment::SegmentSummary;

/// Color palette for segments, highest segment first
static SEGMENT_COLORS: [RGBColor; 5] = [GREEN, BLUE, MAGENTA, RED, CYAN];

fn segment_color(label: &str) -> &'static RGBColor {
    let index = label.bytes().next().map_or(0, |b| b.saturating_sub(b'A') as usize);
    &SEGMENT_COLORS[index % SEGMENT_COLORS.len()]
}

/// Scatter plot of CLTV against expected long-horizon sales, colored by segment
///
/// # Arguments
/// * `report` - Scored customers
/// * `output_path` - Path to save the PNG plot
/// * `plot_title` - Title for the plot
pub fn create_cltv_scatter(
    report: &CltvReport,
    output_path: &str,
    plot_title: Option<&str>,
) -> crate::Result<()> {
    ensure!(!report.predictions.is_empty(), "no scored customers to plot");
    let title = plot_title.unwrap_or("CLTV vs Expected Sales (Colored by Segment)");

    let sales: Vec<f64> = report.predictions.iter().map(|p| p.expected_sales[1]).collect();
    let cltv: Vec<f64> = report.predictions.iter().map(|p| p.cltv).collect();

    let (sales_min, sales_max) = padded_range(&sales);
    let (cltv_min, cltv_max) = padded_range(&cltv);

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(sales_min..sales_max, cltv_min..cltv_max)?;

    chart
        .configure_mesh()
        .x_desc(report.sales_column(1))
        .y_desc("CLTV")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for summary in &report.segments {
        let color = segment_color(&summary.label);
        let points: Vec<(f64, f64)> = report
            .predictions
            .iter()
            .filter(|p| p.segment.as_deref() == Some(summary.label.as_str()))
            .map(|p| (p.expected_sales[1], p.cltv))
            .collect();

        chart
            .draw_series(points.into_iter().map(|point| Circle::new(point, 3, color.filled())))?
            .label(format!("Segment {}", summary.label))
            .legend(move |(x, y)| Circle::new((x + 5, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()
        .with_context(|| format!("failed to write chart to {output_path}"))?;
    println!("CLTV scatter plot saved to: {}", output_path);

    Ok(())
}

/// Bar chart of customers per segment
pub fn create_segment_size_chart(segments: &[SegmentSummary], output_path: &str) -> crate::Result<()> {
    ensure!(!segments.is_empty(), "no segments to chart");
    let max_size = segments.iter().map(|s| s.count).max().unwrap_or(1) as f64;

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Segment Sizes", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5f64..(segments.len() as f64 - 0.5), 0f64..(max_size * 1.1))?;

    chart
        .configure_mesh()
        .x_labels(segments.len())
        .x_label_formatter(&|x| {
            let index = x.round();
            if index >= 0.0 && (index as usize) < segments.len() {
                segments[index as usize].label.clone()
            } else {
                String::new()
            }
        })
        .x_desc("Segment")
        .y_desc("Number of Customers")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(segments.iter().enumerate().map(|(i, summary)| {
        let x = i as f64;
        Rectangle::new(
            [(x - 0.4, 0.0), (x + 0.4, summary.count as f64)],
            segment_color(&summary.label).filled(),
        )
    }))?;

    root.present()
        .with_context(|| format!("failed to write chart to {output_path}"))?;
    println!("Segment size chart saved to: {}", output_path);

    Ok(())
}

fn padded_range(values: &[f64]) -> (f64, f64) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let pad = ((max - min) * 0.05).max(1e-6);
    (min - pad, max + pad)
}

/// Path of the segment chart that accompanies `plot_path`
pub fn segment_chart_path(plot_path: &str) -> String {
    match plot_path.strip_suffix(".png") {
        Some(stem) => format!("{stem}_segments.png"),
        None => format!("{plot_path}_segments.png"),
    }
}

/// Print the fitted model parameters
pub fn print_model_parameters(report: &CltvReport) {
    let bg = &report.frequency_model;
    let gg = &report.monetary_model;

    println!("\n=== Fitted Models ===");
    println!("Analysis date: {}", report.analysis_date);
    println!(
        "BG/NBD:      r={:.4}, alpha={:.4}, a={:.4}, b={:.4} (log-likelihood {:.2}, {} iterations)",
        bg.params.r, bg.params.alpha, bg.params.a, bg.params.b, bg.log_likelihood, bg.iterations
    );
    println!(
        "Gamma-Gamma: p={:.4}, q={:.4}, v={:.4} (log-likelihood {:.2}, {} iterations)",
        gg.params.p, gg.params.q, gg.params.v, gg.log_likelihood, gg.iterations
    );
    if gg.params.q > 1.0 {
        println!("Population mean spend: {:.2}", gg.params.population_mean());
    } else {
        println!("Population mean spend: undefined (q <= 1)");
    }
}

/// Print the `n` best customers under `score`
pub fn print_top_customers<F>(report: &CltvReport, title: &str, n: usize, score: F)
where
    F: Fn(&CltvPrediction) -> f64,
{
    println!("\n=== Top {} by {} ===", n, title);
    let [short, long] = report.sales_horizons.map(|months| format!("Sales {months}M"));
    println!(
        "  {:<38} | {:>9} | {:>9} | {:>6} | {:>10} | Segment",
        "Customer", short, long, "Alive", "CLTV"
    );
    println!("  {:-<38}-|-{:-<9}-|-{:-<9}-|-{:-<6}-|-{:-<10}-|--------", "", "", "", "", "");
    for p in report.top_by(n, score) {
        println!(
            "  {:<38} | {:9.3} | {:9.3} | {:6.3} | {:10.2} | {}",
            p.customer_id,
            p.expected_sales[0],
            p.expected_sales[1],
            p.probability_alive,
            p.cltv,
            p.segment.as_deref().unwrap_or("-")
        );
    }
}

/// Print per-segment summaries, highest segment first
pub fn print_segment_statistics(report: &CltvReport) {
    let total: usize = report.segments.iter().map(|s| s.count).sum();
    let unsegmented = report.predictions.len() - total;

    println!("\n=== Segment Statistics ===");
    println!("Number of segments: {}", report.segments.len());
    println!("Segmented customers: {}", total);
    if unsegmented > 0 {
        println!("Customers with undefined CLTV: {}", unsegmented);
    }
    println!("  Segment | Customers |      Min CLTV |      Max CLTV |     Mean CLTV |      Sum CLTV");
    println!("  --------|-----------|---------------|---------------|---------------|--------------");
    for s in report.segments.iter().rev() {
        let percentage = (s.count as f64 / total as f64) * 100.0;
        println!(
            "  {:7} | {:9} | {:13.2} | {:13.2} | {:13.2} | {:13.2}  ({:.1}%)",
            s.label, s.count, s.min, s.max, s.mean, s.sum, percentage
        );
    }
}

/// Generate both charts for a report
pub fn generate_visualization_report(report: &CltvReport, base_output_path: &str) -> crate::Result<()> {
    create_cltv_scatter(report, base_output_path, None)?;
    create_segment_size_chart(&report.segments, &segment_chart_path(base_output_path))?;
    Ok(())
}
