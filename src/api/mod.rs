//! REST API module for report views
//!
//! This module exposes the report service over HTTP.

pub mod report_routes;

pub use report_routes::{create_report_router, status_for, ReportState};
