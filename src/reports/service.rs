//! Report orchestration
//!
//! Validates a request against its view, hands the prepared query to the
//! store, and assembles the response. Nothing reaches the store until the
//! view name, filters and page window have all been accepted.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::derivation::{DerivationRule, DerivationSettings};
use super::page::PageRequest;
use super::predicate::{PredicateSet, RawFilters};
use super::shaper::{ReportRow, ResultShaper};
use super::store::{RawReport, ReportQuery, ReportStore};
use super::views::{view_definition, ViewDefinition, ViewName};
use crate::error::ReportResult;

/// Tunables shared by every report request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportSettings {
    pub derivation: DerivationSettings,
    pub max_page_size: u32,
    /// Offset used for date filters and for formatting row dates
    pub utc_offset: FixedOffset,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            derivation: DerivationSettings::default(),
            max_page_size: 100,
            utc_offset: Utc.fix(),
        }
    }
}

/// Rows, summary and totals for one request
#[derive(Debug, Clone, PartialEq)]
pub struct ReportResponse {
    pub view: ViewName,
    pub rows: Vec<ReportRow>,
    /// Every registered category of the view, zero when absent
    pub summary: BTreeMap<String, i64>,
    pub total_count: i64,
    pub total_pages: i64,
    pub all_products: Option<Vec<String>>,
}

impl Serialize for ReportResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let def = self.view.definition();
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(def.rows_key, &self.rows)?;
        map.serialize_entry("summary", &self.summary)?;
        map.serialize_entry(def.total_key, &self.total_count)?;
        map.serialize_entry("totalPages", &self.total_pages)?;
        if let Some(products) = &self.all_products {
            map.serialize_entry("allProducts", products)?;
        }
        map.end()
    }
}

pub struct ReportService {
    store: Arc<dyn ReportStore>,
    settings: ReportSettings,
    shaper: ResultShaper,
}

impl ReportService {
    pub fn new(store: Arc<dyn ReportStore>, settings: ReportSettings) -> Self {
        Self {
            store,
            shaper: ResultShaper::new(settings.utc_offset),
            settings,
        }
    }

    pub fn settings(&self) -> &ReportSettings {
        &self.settings
    }

    /// Validate a request and build its query; touches no data
    pub fn prepare(
        &self,
        view_name: &str,
        raw: &RawFilters,
        as_of: DateTime<Utc>,
    ) -> ReportResult<ReportQuery> {
        let view = view_definition(view_name)?;
        let predicates = PredicateSet::build(view, raw, self.settings.utc_offset)?;
        let page = PageRequest::from_raw(
            raw.get("page").map(String::as_str),
            raw.get("limit").map(String::as_str),
            self.settings.max_page_size,
        );
        Ok(ReportQuery {
            view,
            rule: DerivationRule::for_view(view.name, &self.settings.derivation, as_of)?,
            predicates,
            page,
        })
    }

    pub async fn run(&self, view_name: &str, raw: &RawFilters) -> ReportResult<ReportResponse> {
        self.run_at(view_name, raw, Utc::now()).await
    }

    /// Run with recency measured from `as_of`
    pub async fn run_at(
        &self,
        view_name: &str,
        raw: &RawFilters,
        as_of: DateTime<Utc>,
    ) -> ReportResult<ReportResponse> {
        let query = self.prepare(view_name, raw, as_of)?;
        debug!(
            view = %query.view.name,
            conditions = query.predicates.conditions().len(),
            page = query.page.page(),
            limit = query.page.limit(),
            "Running report"
        );
        let raw_report = self.store.fetch(&query).await?;
        Ok(self.assemble(query.view, query.page, raw_report))
    }

    fn assemble(
        &self,
        view: &'static ViewDefinition,
        page: PageRequest,
        raw: RawReport,
    ) -> ReportResponse {
        let mut summary: BTreeMap<String, i64> = view
            .categories
            .iter()
            .map(|label| (label.to_string(), 0))
            .collect();
        for (category, count) in raw.summary {
            match summary.get_mut(&category) {
                Some(slot) => *slot = count,
                None => {
                    warn!(view = %view.name, %category, "Dropping unregistered category")
                }
            }
        }

        let rows = raw
            .rows
            .into_iter()
            .filter(|row| view.has_category(&row.category))
            .map(|row| self.shaper.shape(view, row))
            .collect();

        ReportResponse {
            view: view.name,
            rows,
            summary,
            total_count: raw.total,
            total_pages: page.total_pages(raw.total),
            all_products: raw.products,
        }
    }
}
