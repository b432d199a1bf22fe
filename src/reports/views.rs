//! Registered report views
//!
//! A view is a fixed report shape: the population it covers, the closed set
//! of categories its rule can produce, the filters it accepts and the order
//! its rows come back in.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::record::{CategorizedRecord, Column, RecordType};
use crate::error::{ReportError, ReportResult};

// Category labels
pub const NEW_CLIENT: &str = "New Client";
pub const ACTIVE: &str = "Active";
pub const CHURNING: &str = "Churning";
pub const CHURNED: &str = "Churned";
pub const VIP: &str = "VIP";
pub const LOYAL_CLIENT: &str = "Loyal Client";
pub const REPEAT_CLIENT: &str = "Repeat Client";
pub const ONE_TIME_CLIENT: &str = "One-Time Client";
pub const HOT_PROSPECT: &str = "Hot Prospect";
pub const COLD_PROSPECT: &str = "Cold Prospect";

/// Name of a registered view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewName {
    ClientStatus,
    ClientSegment,
    ProspectStatus,
}

impl ViewName {
    pub const ALL: [ViewName; 3] = [
        ViewName::ClientStatus,
        ViewName::ClientSegment,
        ViewName::ProspectStatus,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ViewName::ClientStatus => "client-status",
            ViewName::ClientSegment => "client-segment",
            ViewName::ProspectStatus => "prospect-status",
        }
    }

    pub fn definition(self) -> &'static ViewDefinition {
        match self {
            ViewName::ClientStatus => &CLIENT_STATUS,
            ViewName::ClientSegment => &CLIENT_SEGMENT,
            ViewName::ProspectStatus => &PROSPECT_STATUS,
        }
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewName {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViewName::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ReportError::UnknownView(s.to_string()))
    }
}

/// Look up a view definition by name
pub fn view_definition(name: &str) -> ReportResult<&'static ViewDefinition> {
    Ok(name.parse::<ViewName>()?.definition())
}

/// A query-string field a view accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    /// Derived category, or `all`
    Category { param: &'static str },
    /// Exact match on one column
    Exact {
        param: &'static str,
        column: Column,
    },
    /// Case-insensitive substring over one or more columns
    Search {
        param: &'static str,
        columns: &'static [Column],
    },
    /// Inclusive calendar-day bounds on a timestamp column
    DateRange {
        start_param: &'static str,
        end_param: &'static str,
        column: Column,
    },
    /// Comma-separated values, may include the empty sentinel
    Membership {
        param: &'static str,
        column: Column,
    },
}

/// Primary row order of a view; ties always break on phone ascending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    LastActivityDesc,
    TotalSpentDesc,
}

impl SortKey {
    pub const fn order_by_sql(self) -> &'static str {
        match self {
            SortKey::LastActivityDesc => "last_order_at DESC NULLS LAST, phone ASC NULLS LAST",
            SortKey::TotalSpentDesc => {
                "(average_order_value * order_count) DESC NULLS LAST, phone ASC NULLS LAST"
            }
        }
    }

    /// In-memory equivalent of [`SortKey::order_by_sql`]
    pub fn compare(self, a: &CategorizedRecord, b: &CategorizedRecord) -> Ordering {
        let primary = match self {
            SortKey::LastActivityDesc => {
                desc_nulls_last(a.record.last_order_at, b.record.last_order_at)
            }
            SortKey::TotalSpentDesc => {
                desc_nulls_last(a.record.total_spent(), b.record.total_spent())
            }
        };
        primary.then_with(|| asc_nulls_last(a.record.phone.as_deref(), b.record.phone.as_deref()))
    }
}

fn desc_nulls_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn asc_nulls_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// JSON key the derived category is reported under on each row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKey {
    Status,
    Segment,
}

/// Static definition of a report view
#[derive(Debug)]
pub struct ViewDefinition {
    pub name: ViewName,
    pub record_type: RecordType,
    /// Closed category set, in display order
    pub categories: &'static [&'static str],
    pub filters: &'static [FilterField],
    pub sort: SortKey,
    pub category_key: CategoryKey,
    /// Response key for the row array
    pub rows_key: &'static str,
    /// Response key for the total count
    pub total_key: &'static str,
    /// Whether the response lists every product of the population
    pub lists_products: bool,
}

impl ViewDefinition {
    /// Canonical label for a user-supplied category, matched case-insensitively
    pub fn canonical_category(&self, raw: &str) -> Option<&'static str> {
        let raw = raw.trim();
        self.categories
            .iter()
            .copied()
            .find(|label| label.eq_ignore_ascii_case(raw))
    }

    pub fn has_category(&self, label: &str) -> bool {
        self.categories.contains(&label)
    }
}

const SEARCH_COLUMNS: &[Column] = &[Column::Name, Column::Phone];

const ACTIVITY_RANGE: FilterField = FilterField::DateRange {
    start_param: "startDate",
    end_param: "endDate",
    column: Column::LastOrderAt,
};

const CLIENT_STATUS_FILTERS: &[FilterField] = &[
    FilterField::Category { param: "status" },
    FilterField::Exact {
        param: "phone",
        column: Column::Phone,
    },
    FilterField::Search {
        param: "search",
        columns: SEARCH_COLUMNS,
    },
    ACTIVITY_RANGE,
    FilterField::Membership {
        param: "product",
        column: Column::LastOrderProduct,
    },
    FilterField::Membership {
        param: "marketplace",
        column: Column::LastMarketplace,
    },
];

const CLIENT_SEGMENT_FILTERS: &[FilterField] = &[
    FilterField::Category { param: "segment" },
    FilterField::Exact {
        param: "phone",
        column: Column::Phone,
    },
    FilterField::Search {
        param: "search",
        columns: SEARCH_COLUMNS,
    },
    ACTIVITY_RANGE,
    FilterField::Membership {
        param: "product",
        column: Column::LastOrderProduct,
    },
    FilterField::Membership {
        param: "marketplace",
        column: Column::LastMarketplace,
    },
];

const PROSPECT_STATUS_FILTERS: &[FilterField] = &[
    FilterField::Category { param: "status" },
    FilterField::Exact {
        param: "phone",
        column: Column::Phone,
    },
    FilterField::Search {
        param: "search",
        columns: SEARCH_COLUMNS,
    },
    ACTIVITY_RANGE,
];

static CLIENT_STATUS: ViewDefinition = ViewDefinition {
    name: ViewName::ClientStatus,
    record_type: RecordType::Client,
    categories: &[NEW_CLIENT, ACTIVE, CHURNING, CHURNED],
    filters: CLIENT_STATUS_FILTERS,
    sort: SortKey::LastActivityDesc,
    category_key: CategoryKey::Status,
    rows_key: "clients",
    total_key: "totalClients",
    lists_products: true,
};

static CLIENT_SEGMENT: ViewDefinition = ViewDefinition {
    name: ViewName::ClientSegment,
    record_type: RecordType::Client,
    categories: &[VIP, LOYAL_CLIENT, REPEAT_CLIENT, ONE_TIME_CLIENT],
    filters: CLIENT_SEGMENT_FILTERS,
    sort: SortKey::TotalSpentDesc,
    category_key: CategoryKey::Segment,
    rows_key: "clients",
    total_key: "totalClients",
    lists_products: false,
};

static PROSPECT_STATUS: ViewDefinition = ViewDefinition {
    name: ViewName::ProspectStatus,
    record_type: RecordType::Prospect,
    categories: &[HOT_PROSPECT, COLD_PROSPECT],
    filters: PROSPECT_STATUS_FILTERS,
    sort: SortKey::LastActivityDesc,
    category_key: CategoryKey::Status,
    rows_key: "prospects",
    total_key: "totalProspects",
    lists_products: false,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::record::SourceRecord;
    use chrono::{TimeZone, Utc};

    fn row(phone: Option<&str>, days: Option<u32>) -> CategorizedRecord {
        CategorizedRecord {
            record: SourceRecord {
                phone: phone.map(str::to_string),
                last_order_at: days.map(|d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()),
                ..Default::default()
            },
            category: ACTIVE.to_string(),
        }
    }

    #[test]
    fn test_view_name_round_trip() {
        for view in ViewName::ALL {
            assert_eq!(view.as_str().parse::<ViewName>().unwrap(), view);
            assert_eq!(view.definition().name, view);
        }
    }

    #[test]
    fn test_unknown_view() {
        let err = view_definition("client-churn").unwrap_err();
        assert!(matches!(err, ReportError::UnknownView(name) if name == "client-churn"));
    }

    #[test]
    fn test_canonical_category_ignores_case() {
        let view = ViewName::ClientStatus.definition();
        assert_eq!(view.canonical_category("new client"), Some(NEW_CLIENT));
        assert_eq!(view.canonical_category(" CHURNED "), Some(CHURNED));
        assert_eq!(view.canonical_category("VIP"), None);
    }

    #[test]
    fn test_last_activity_sort_puts_nulls_last_and_breaks_ties_on_phone() {
        let mut rows = vec![
            row(Some("3"), None),
            row(Some("2"), Some(5)),
            row(Some("1"), Some(5)),
            row(Some("4"), Some(9)),
        ];
        rows.sort_by(|a, b| SortKey::LastActivityDesc.compare(a, b));
        let phones: Vec<_> = rows
            .iter()
            .map(|r| r.record.phone.clone().unwrap())
            .collect();
        assert_eq!(phones, vec!["4", "1", "2", "3"]);
    }
}
