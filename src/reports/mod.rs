//! Categorized report views
//!
//! Request flow: raw filters are normalized by [`predicate`], the view's rule
//! table comes from [`derivation`], a [`store::ReportStore`] runs the summary,
//! count and page reads, and [`shaper`] formats the rows.

pub mod derivation;
pub mod page;
pub mod predicate;
pub mod query;
pub mod record;
pub mod service;
pub mod shaper;
pub mod sql;
pub mod store;
pub mod views;

pub use derivation::{DerivationRule, DerivationSettings, OTHER_CATEGORY};
pub use page::PageRequest;
pub use predicate::{FilterCondition, PredicateSet, RawFilters, ALL_CATEGORIES, EMPTY_SENTINEL};
pub use record::{CategorizedRecord, Column, RecordType, SourceRecord};
pub use service::{ReportResponse, ReportService, ReportSettings};
pub use shaper::{ReportRow, ResultShaper};
pub use sql::SqlParam;
pub use store::{MemoryReportStore, RawReport, ReportQuery, ReportStore};
pub use views::{view_definition, ViewDefinition, ViewName};
