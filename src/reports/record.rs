//! Source record model
//!
//! The wide `customer_summary` table is written by the ingestion process and
//! only ever read here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Table every report view projects from
pub const SOURCE_TABLE: &str = "customer_summary";

/// Blank as PostgreSQL's `TRIM(col) = ''` sees it; only spaces are stripped
pub fn is_blank(value: &str) -> bool {
    value.trim_matches(' ').is_empty()
}

/// Columns of the source table that the report layer reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Phone,
    Name,
    StatusCode,
    SegmentCode,
    AverageOrderValue,
    OrderCount,
    LastOrderAt,
    LastOrderProduct,
    LastMarketplace,
    RecordType,
}

impl Column {
    pub const fn sql_name(self) -> &'static str {
        match self {
            Column::Phone => "phone",
            Column::Name => "name",
            Column::StatusCode => "status_code",
            Column::SegmentCode => "segment_code",
            Column::AverageOrderValue => "average_order_value",
            Column::OrderCount => "order_count",
            Column::LastOrderAt => "last_order_at",
            Column::LastOrderProduct => "last_order_product",
            Column::LastMarketplace => "last_marketplace",
            Column::RecordType => "record_type",
        }
    }
}

/// Population a view is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Client,
    Prospect,
}

impl RecordType {
    pub const fn as_str(self) -> &'static str {
        match self {
            RecordType::Client => "client",
            RecordType::Prospect => "prospect",
        }
    }
}

/// One row of the source table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct SourceRecord {
    pub phone: Option<String>,
    pub name: Option<String>,
    pub status_code: Option<String>,
    pub segment_code: Option<String>,
    pub average_order_value: Option<Decimal>,
    pub order_count: Option<i64>,
    pub last_order_at: Option<DateTime<Utc>>,
    pub last_order_product: Option<String>,
    pub last_marketplace: Option<String>,
    pub record_type: Option<String>,
}

impl SourceRecord {
    /// Text value of a column, `None` for numeric and timestamp columns
    pub fn text(&self, column: Column) -> Option<&str> {
        match column {
            Column::Phone => self.phone.as_deref(),
            Column::Name => self.name.as_deref(),
            Column::StatusCode => self.status_code.as_deref(),
            Column::SegmentCode => self.segment_code.as_deref(),
            Column::LastOrderProduct => self.last_order_product.as_deref(),
            Column::LastMarketplace => self.last_marketplace.as_deref(),
            Column::RecordType => self.record_type.as_deref(),
            Column::AverageOrderValue | Column::OrderCount | Column::LastOrderAt => None,
        }
    }

    /// Lifetime spend, `NULL` when either factor is missing (as in SQL)
    pub fn total_spent(&self) -> Option<Decimal> {
        match (self.average_order_value, self.order_count) {
            (Some(aov), Some(count)) => Some(aov * Decimal::from(count)),
            _ => None,
        }
    }
}

/// A source record together with the category its view derived for it
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct CategorizedRecord {
    #[cfg_attr(feature = "database", sqlx(flatten))]
    pub record: SourceRecord,
    pub category: String,
}
