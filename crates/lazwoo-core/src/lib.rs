//! Core of the Lazada → WooCommerce catalog migration pipeline.
//!
//! A catalog run is a fixed sequence of spreadsheet uploads: identity and
//! variant discovery first, then description, categorization, price/stock
//! and freight enrichment, terminated by an export to the WooCommerce
//! import CSV. Stages operate on already-decoded [`grid::Workbook`] grids
//! and accumulate per-run state in a [`session::SessionStore`].

pub mod config;
pub mod error;
pub mod export;
pub mod grid;
pub mod record;
pub mod session;
pub mod stages;
pub mod swatch;

pub use config::{load_app_config, AppConfig, ConfigError, DEFAULT_MAX_UPLOAD_BYTES};
pub use error::PipelineError;
pub use record::{ProductKind, ProductRecord};
pub use session::SessionStore;
