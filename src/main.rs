//! CLTV Forge: customer lifetime value prediction CLI
//!
//! Loads the customer table, fits the purchase and spend models, prints the
//! reports, and exports the scored customers and charts.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use cltvforge::config::{AppConfig, LogFormat};
use cltvforge::{load_customers, pipeline, viz, Args};

fn init_logging(config: &AppConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.load_options()).context("failed to load configuration")?;
    init_logging(&config);

    if args.verbose {
        println!("CLTV Forge - BG/NBD and Gamma-Gamma lifetime value");
        println!("===================================================\n");
    }

    let start_time = Instant::now();

    let table = load_customers(&args.input)
        .with_context(|| format!("failed to load customers from {}", args.input))?;
    println!("✓ Data loaded: {} customers", table.len());

    let fit_start = Instant::now();
    let report = pipeline::run(&table, &config.pipeline).context("CLTV pipeline failed")?;
    println!("✓ Models fitted and {} customers scored", report.predictions.len());
    if args.verbose {
        println!("  Fitting time: {:.2}s", fit_start.elapsed().as_secs_f64());
        for summary in &report.outliers {
            if let Some(bounds) = summary.bounds {
                println!(
                    "  {}: clipped {} values to [{}, {}]",
                    summary.column.name(),
                    summary.clipped,
                    bounds.low,
                    bounds.high
                );
            }
        }
    }

    viz::print_model_parameters(&report);
    let [short, long] = report.sales_horizons;
    viz::print_top_customers(&report, &format!("{short}-month expected sales"), args.top, |p| {
        p.expected_sales[0]
    });
    viz::print_top_customers(&report, &format!("{long}-month expected sales"), args.top, |p| {
        p.expected_sales[1]
    });
    viz::print_top_customers(&report, "CLTV", args.top * 2, |p| p.cltv);
    viz::print_segment_statistics(&report);

    if let Some(output) = &args.output {
        report
            .write_csv(output)
            .with_context(|| format!("failed to write predictions to {output}"))?;
        println!("\n✓ Predictions saved to: {}", output);
    }

    if let Some(plot) = &args.plot {
        viz::generate_visualization_report(&report, plot)?;
    }

    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());

    Ok(())
}
