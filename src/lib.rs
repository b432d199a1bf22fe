//! Customer reports - categorized, filtered, paginated report views
//!
//! Each report view projects the wide customer summary table into a closed
//! set of derived categories, applies the caller's filters, and answers with
//! one page of rows, per-category counts and a total in a single response.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use customer_reports::reports::{MemoryReportStore, RawFilters, ReportService, ReportSettings};
//!
//! # async fn demo() -> customer_reports::error::ReportResult<()> {
//! let service = ReportService::new(
//!     Arc::new(MemoryReportStore::default()),
//!     ReportSettings::default(),
//! );
//! let report = service.run("client-status", &RawFilters::new()).await?;
//! assert_eq!(report.total_pages, 0);
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

pub mod auth;
pub mod config;
pub mod reports;

// Database integration (when enabled)
#[cfg(feature = "database")]
pub mod database;

// REST API (when enabled)
#[cfg(feature = "server")]
pub mod api;

pub use error::{ReportError, ReportResult};
