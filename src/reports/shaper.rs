//! Row shaping
//!
//! Turns categorized source records into response rows: sentinel defaults
//! for missing identity fields, numeric coercion, and calendar dates in a
//! fixed UTC offset so output never depends on the server's locale.

use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use super::record::CategorizedRecord;
use super::views::{CategoryKey, SortKey, ViewDefinition};

pub const MISSING_NAME: &str = "N/A";
pub const MISSING_PHONE: &str = "";

/// Derived category, serialized under the view's key (`status` or `segment`)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CategoryField {
    Status(String),
    Segment(String),
}

impl CategoryField {
    pub fn label(&self) -> &str {
        match self {
            CategoryField::Status(label) | CategoryField::Segment(label) => label,
        }
    }
}

/// One shaped response row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub phone: String,
    pub name: String,
    #[serde(flatten)]
    pub category: CategoryField,
    pub last_order_date: Option<String>,
    pub last_order_product: Option<String>,
    pub last_marketplace: Option<String>,
    pub average_order_value: f64,
    pub order_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_spent: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct ResultShaper {
    offset: FixedOffset,
}

impl ResultShaper {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn shape(&self, view: &ViewDefinition, row: CategorizedRecord) -> ReportRow {
        let CategorizedRecord { record, category } = row;
        let total_spent = (view.sort == SortKey::TotalSpentDesc)
            .then(|| money(record.total_spent()));

        ReportRow {
            phone: text_or(record.phone, MISSING_PHONE),
            name: text_or(record.name, MISSING_NAME),
            category: match view.category_key {
                CategoryKey::Status => CategoryField::Status(category),
                CategoryKey::Segment => CategoryField::Segment(category),
            },
            last_order_date: record.last_order_at.map(|at| self.format_date(at)),
            last_order_product: trimmed(record.last_order_product),
            last_marketplace: trimmed(record.last_marketplace),
            average_order_value: money(record.average_order_value),
            order_count: record.order_count.unwrap_or(0),
            total_spent,
        }
    }

    /// `YYYY-MM-DD` in the configured offset
    pub fn format_date(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format("%Y-%m-%d").to_string()
    }
}

fn money(value: Option<Decimal>) -> f64 {
    value.and_then(|v| v.to_f64()).unwrap_or(0.0)
}

fn text_or(value: Option<String>, default: &str) -> String {
    trimmed(value).unwrap_or_else(|| default.to_string())
}

/// Strip spaces the way SQL `TRIM` does; empty becomes `None`
fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim_matches(' ').to_string())
        .filter(|v| !v.is_empty())
}
