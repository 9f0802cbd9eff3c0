//! CLTV Forge: customer lifetime value prediction for omnichannel retail data
//!
//! Clips outliers, builds a recency/tenure/frequency/monetary frame, fits the
//! BG/NBD purchase model and the Gamma-Gamma spend model, and ranks customers
//! into CLTV segments.

pub mod cli;
pub mod cltv;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod frame;
pub mod models;
pub mod outliers;
pub mod pipeline;
pub mod segment;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use cltv::{customer_lifetime_value, ClvOptions, TimeUnit};
pub use config::{AppConfig, PipelineConfig, Variant};
pub use data::{load_customers, RawTable};
pub use error::{CltvError, ConvergenceError};
pub use frame::{build_cltv_frame, CltvFrame, FrameOptions};
pub use models::{BetaGeoFitter, BetaGeoParams, Estimator, GammaGammaFitter, GammaGammaParams};
pub use pipeline::{CltvPrediction, CltvReport};
pub use segment::segment_by_cltv;

/// Common result type used by the binary and reporting code
pub type Result<T> = anyhow::Result<T>;
