//! Report store seam
//!
//! A store answers one prepared [`ReportQuery`] with the raw summary, total,
//! page rows and (for views that list them) products. The PostgreSQL store
//! lives in `database::report_repository`; [`MemoryReportStore`] evaluates
//! the same rule table and predicates over records held in memory.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

use super::derivation::DerivationRule;
use super::page::PageRequest;
use super::predicate::PredicateSet;
use super::query::ViewQuery;
use super::record::{is_blank, CategorizedRecord, SourceRecord};
use super::views::ViewDefinition;
use crate::error::ReportResult;

/// Validated request, ready for a store
#[derive(Debug, Clone)]
pub struct ReportQuery {
    pub view: &'static ViewDefinition,
    pub rule: DerivationRule,
    pub predicates: PredicateSet,
    pub page: PageRequest,
}

impl ReportQuery {
    pub fn to_sql(&self) -> ViewQuery {
        ViewQuery::new(self.view, &self.rule, &self.predicates)
    }

    /// Categorize a record and test it against the filter set
    pub fn categorize(&self, record: &SourceRecord) -> Option<CategorizedRecord> {
        let row = CategorizedRecord {
            record: record.clone(),
            category: self.rule.classify(record).to_string(),
        };
        self.predicates.matches(&row).then_some(row)
    }
}

/// Store output before shaping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReport {
    /// `(category, count)` pairs over the filtered population
    pub summary: Vec<(String, i64)>,
    pub total: i64,
    pub rows: Vec<CategorizedRecord>,
    pub products: Option<Vec<String>>,
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn fetch(&self, query: &ReportQuery) -> ReportResult<RawReport>;
}

/// In-memory store over a fixed record set, for tests and local runs
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    records: Vec<SourceRecord>,
}

impl MemoryReportStore {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn fetch(&self, query: &ReportQuery) -> ReportResult<RawReport> {
        let records = &self.records;

        let mut matched: Vec<CategorizedRecord> =
            records.iter().filter_map(|r| query.categorize(r)).collect();

        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for row in &matched {
            *counts.entry(row.category.clone()).or_default() += 1;
        }

        let total = matched.len() as i64;
        let sort = query.view.sort;
        matched.sort_by(|a, b| sort.compare(a, b));
        let rows = matched
            .into_iter()
            .skip(query.page.offset() as usize)
            .take(query.page.limit() as usize)
            .collect();

        let products = query.view.lists_products.then(|| {
            records
                .iter()
                .filter(|r| r.record_type.as_deref() == Some(query.view.record_type.as_str()))
                .filter_map(|r| r.last_order_product.as_deref())
                .filter(|p| !is_blank(p))
                .map(str::to_string)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        });

        Ok(RawReport {
            summary: counts.into_iter().collect(),
            total,
            rows,
            products,
        })
    }
}
