//! Predicate builder
//!
//! Raw query-string filters are normalized into a conjunction of
//! [`FilterCondition`]s. Only fields the view declares are read. The record
//! type scope and the `Other` exclusion are always present and come first, so
//! the parameter prefix is the same for every query built from the set.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;

use super::derivation::OTHER_CATEGORY;
use super::record::{is_blank, CategorizedRecord, Column, RecordType};
use super::sql::{SqlParam, SqlWriter};
use super::views::{FilterField, ViewDefinition};
use crate::error::{ReportError, ReportResult};

/// Category filter value meaning "no constraint"
pub const ALL_CATEGORIES: &str = "all";

/// Membership token meaning "null or blank"
pub const EMPTY_SENTINEL: &str = "_NONE_";

/// Query-string parameters as received
pub type RawFilters = HashMap<String, String>;

/// One normalized filter condition
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCondition {
    RecordTypeIs(RecordType),
    ExcludeCategory(&'static str),
    CategoryIs(&'static str),
    Equals {
        column: Column,
        value: String,
    },
    /// Case-insensitive substring, OR-combined across columns
    Contains {
        columns: &'static [Column],
        needle: String,
    },
    /// `from` inclusive, `until` exclusive
    ActivityRange {
        column: Column,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    },
    Membership {
        column: Column,
        values: Vec<String>,
        include_empty: bool,
    },
}

impl FilterCondition {
    fn render(&self, w: &mut SqlWriter) {
        match self {
            FilterCondition::RecordTypeIs(record_type) => {
                w.push(Column::RecordType.sql_name())
                    .push(" = ")
                    .push_param(SqlParam::Text(record_type.as_str().to_string()));
            }
            FilterCondition::ExcludeCategory(label) => {
                w.push("category <> ")
                    .push_param(SqlParam::Text(label.to_string()));
            }
            FilterCondition::CategoryIs(label) => {
                w.push("category = ")
                    .push_param(SqlParam::Text(label.to_string()));
            }
            FilterCondition::Equals { column, value } => {
                w.push(column.sql_name())
                    .push(" = ")
                    .push_param(SqlParam::Text(value.clone()));
            }
            FilterCondition::Contains { columns, needle } => {
                let pattern = format!("%{}%", escape_like(needle));
                w.push("(");
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        w.push(" OR ");
                    }
                    w.push(column.sql_name())
                        .push(" ILIKE ")
                        .push_param(SqlParam::Text(pattern.clone()));
                }
                w.push(")");
            }
            FilterCondition::ActivityRange {
                column,
                from,
                until,
            } => {
                w.push("(");
                let mut first = true;
                if let Some(from) = from {
                    w.push(column.sql_name())
                        .push(" >= ")
                        .push_param(SqlParam::Timestamp(*from));
                    first = false;
                }
                if let Some(until) = until {
                    if !first {
                        w.push(" AND ");
                    }
                    w.push(column.sql_name())
                        .push(" < ")
                        .push_param(SqlParam::Timestamp(*until));
                }
                w.push(")");
            }
            FilterCondition::Membership {
                column,
                values,
                include_empty,
            } => {
                let name = column.sql_name();
                w.push("(");
                if !values.is_empty() {
                    w.push(name)
                        .push(" = ANY(")
                        .push_param(SqlParam::TextArray(values.clone()))
                        .push(")");
                }
                if *include_empty {
                    if !values.is_empty() {
                        w.push(" OR ");
                    }
                    w.push(name)
                        .push(" IS NULL OR TRIM(")
                        .push(name)
                        .push(") = ''");
                }
                w.push(")");
            }
        }
    }

    /// In-memory evaluation with SQL NULL semantics
    pub fn matches(&self, row: &CategorizedRecord) -> bool {
        let record = &row.record;
        match self {
            FilterCondition::RecordTypeIs(record_type) => {
                record.record_type.as_deref() == Some(record_type.as_str())
            }
            FilterCondition::ExcludeCategory(label) => row.category != *label,
            FilterCondition::CategoryIs(label) => row.category == *label,
            FilterCondition::Equals { column, value } => {
                record.text(*column) == Some(value.as_str())
            }
            FilterCondition::Contains { columns, needle } => {
                let needle = needle.to_lowercase();
                columns.iter().any(|c| {
                    record
                        .text(*c)
                        .is_some_and(|v| v.to_lowercase().contains(&needle))
                })
            }
            FilterCondition::ActivityRange { from, until, .. } => {
                let Some(at) = record.last_order_at else {
                    return false;
                };
                from.map_or(true, |from| at >= from) && until.map_or(true, |until| at < until)
            }
            FilterCondition::Membership {
                column,
                values,
                include_empty,
            } => match record.text(*column) {
                None => *include_empty,
                Some(v) if is_blank(v) => *include_empty || values.iter().any(|x| x == v),
                Some(v) => values.iter().any(|x| x == v),
            },
        }
    }
}

/// Conjunction of conditions for one request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PredicateSet {
    conditions: Vec<FilterCondition>,
}

impl PredicateSet {
    /// Normalize raw filters for a view; dates are calendar days in `offset`
    pub fn build(
        view: &ViewDefinition,
        raw: &RawFilters,
        offset: FixedOffset,
    ) -> ReportResult<Self> {
        let mut conditions = vec![
            FilterCondition::RecordTypeIs(view.record_type),
            FilterCondition::ExcludeCategory(OTHER_CATEGORY),
        ];

        for field in view.filters {
            match *field {
                FilterField::Category { param } => {
                    let Some(value) = non_empty(raw, param) else {
                        continue;
                    };
                    if value.eq_ignore_ascii_case(ALL_CATEGORIES) {
                        continue;
                    }
                    let label = view.canonical_category(value).ok_or_else(|| {
                        ReportError::validation(format!(
                            "'{value}' is not a category of {}",
                            view.name
                        ))
                    })?;
                    conditions.push(FilterCondition::CategoryIs(label));
                }
                FilterField::Exact { param, column } => {
                    if let Some(value) = non_empty(raw, param) {
                        conditions.push(FilterCondition::Equals {
                            column,
                            value: value.to_string(),
                        });
                    }
                }
                FilterField::Search { param, columns } => {
                    if let Some(value) = non_empty(raw, param) {
                        conditions.push(FilterCondition::Contains {
                            columns,
                            needle: value.to_string(),
                        });
                    }
                }
                FilterField::DateRange {
                    start_param,
                    end_param,
                    column,
                } => {
                    let from = non_empty(raw, start_param)
                        .map(|v| day_start(start_param, v, offset, 0))
                        .transpose()?;
                    let until = non_empty(raw, end_param)
                        .map(|v| day_start(end_param, v, offset, 1))
                        .transpose()?;
                    if from.is_some() || until.is_some() {
                        conditions.push(FilterCondition::ActivityRange {
                            column,
                            from,
                            until,
                        });
                    }
                }
                FilterField::Membership { param, column } => {
                    let Some(value) = non_empty(raw, param) else {
                        continue;
                    };
                    let mut include_empty = false;
                    let mut values = Vec::new();
                    for token in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                        if token == EMPTY_SENTINEL {
                            include_empty = true;
                        } else if !values.iter().any(|v| v == token) {
                            values.push(token.to_string());
                        }
                    }
                    if include_empty || !values.is_empty() {
                        conditions.push(FilterCondition::Membership {
                            column,
                            values,
                            include_empty,
                        });
                    }
                }
            }
        }

        Ok(Self { conditions })
    }

    pub fn conditions(&self) -> &[FilterCondition] {
        &self.conditions
    }

    /// The single category this set narrows to, if any
    pub fn category_filter(&self) -> Option<&'static str> {
        self.conditions.iter().find_map(|c| match c {
            FilterCondition::CategoryIs(label) => Some(*label),
            _ => None,
        })
    }

    /// Append the conjunction to `w`
    pub fn render(&self, w: &mut SqlWriter) {
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                w.push(" AND ");
            }
            condition.render(w);
        }
    }

    /// The conjunction alone, placeholders starting at `$1`
    pub fn to_sql(&self) -> (String, Vec<SqlParam>) {
        let mut w = SqlWriter::new();
        self.render(&mut w);
        w.into_parts()
    }

    pub fn matches(&self, row: &CategorizedRecord) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }
}

fn non_empty<'a>(raw: &'a RawFilters, key: &str) -> Option<&'a str> {
    raw.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Midnight of `value` (+ `shift_days`) in `offset`, as UTC
fn day_start(
    param: &str,
    value: &str,
    offset: FixedOffset,
    shift_days: u64,
) -> ReportResult<DateTime<Utc>> {
    let date = parse_date(value, offset)
        .ok_or_else(|| ReportError::validation(format!("{param} must be an ISO date, got '{value}'")))?;
    let date = date
        .checked_add_days(chrono::Days::new(shift_days))
        .ok_or_else(|| ReportError::validation(format!("{param} is out of range")))?;
    date.and_time(NaiveTime::MIN)
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| ReportError::validation(format!("{param} is out of range")))
}

fn parse_date(value: &str, offset: FixedOffset) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok().or_else(|| {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| dt.with_timezone(&offset).date_naive())
    })
}

/// Escape LIKE metacharacters so user text matches literally
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::record::SourceRecord;
    use crate::reports::views::{ViewName, ACTIVE, CHURNED};
    use chrono::TimeZone;

    fn filters(pairs: &[(&str, &str)]) -> RawFilters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn build(view: ViewName, pairs: &[(&str, &str)]) -> PredicateSet {
        PredicateSet::build(view.definition(), &filters(pairs), utc()).unwrap()
    }

    fn row(product: Option<&str>) -> CategorizedRecord {
        CategorizedRecord {
            record: SourceRecord {
                record_type: Some("client".into()),
                last_order_product: product.map(str::to_string),
                ..Default::default()
            },
            category: ACTIVE.to_string(),
        }
    }

    #[test]
    fn test_base_conditions_always_present() {
        let set = build(ViewName::ClientStatus, &[]);
        let (sql, params) = set.to_sql();
        assert_eq!(sql, "record_type = $1 AND category <> $2");
        assert_eq!(
            params,
            vec![
                SqlParam::Text("client".into()),
                SqlParam::Text(OTHER_CATEGORY.into())
            ]
        );
    }

    #[test]
    fn test_unknown_fields_and_blank_values_are_ignored() {
        let set = build(
            ViewName::ProspectStatus,
            &[("product", "Widget"), ("colour", "red"), ("search", "  "), ("status", "")],
        );
        assert_eq!(set.conditions().len(), 2);
    }

    #[test]
    fn test_all_category_is_no_constraint() {
        let set = build(ViewName::ClientStatus, &[("status", "ALL")]);
        assert_eq!(set.category_filter(), None);

        let set = build(ViewName::ClientStatus, &[("status", "churned")]);
        assert_eq!(set.category_filter(), Some(CHURNED));
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let err = PredicateSet::build(
            ViewName::ClientSegment.definition(),
            &filters(&[("segment", "Active")]),
            utc(),
        )
        .unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
    }

    #[test]
    fn test_search_repeats_pattern_per_column() {
        let set = build(ViewName::ClientStatus, &[("search", "Smith")]);
        let (sql, params) = set.to_sql();
        assert_eq!(
            sql,
            "record_type = $1 AND category <> $2 AND (name ILIKE $3 OR phone ILIKE $4)"
        );
        assert_eq!(params[2], SqlParam::Text("%Smith%".into()));
        assert_eq!(params[3], SqlParam::Text("%Smith%".into()));
    }

    #[test]
    fn test_search_escapes_like_metacharacters() {
        let set = build(ViewName::ClientStatus, &[("search", "50%_off\\")]);
        let (_, params) = set.to_sql();
        assert_eq!(params[2], SqlParam::Text("%50\\%\\_off\\\\%".into()));
    }

    #[test]
    fn test_membership_with_sentinel() {
        let set = build(ViewName::ClientStatus, &[("product", "_NONE_, Widget,,Widget")]);
        let (sql, params) = set.to_sql();
        assert_eq!(
            sql,
            "record_type = $1 AND category <> $2 AND \
             (last_order_product = ANY($3) OR last_order_product IS NULL OR TRIM(last_order_product) = '')"
        );
        assert_eq!(params[2], SqlParam::TextArray(vec!["Widget".into()]));

        assert!(set.matches(&row(None)));
        assert!(set.matches(&row(Some("  "))));
        assert!(set.matches(&row(Some("Widget"))));
        assert!(!set.matches(&row(Some("Gadget"))));
    }

    #[test]
    fn test_sentinel_blank_means_spaces_only() {
        let set = build(ViewName::ClientStatus, &[("product", "_NONE_")]);
        assert!(set.matches(&row(Some("   "))));
        // TRIM leaves tabs and newlines in place
        assert!(!set.matches(&row(Some("\t"))));
        assert!(!set.matches(&row(Some(" \n "))));
    }

    #[test]
    fn test_membership_sentinel_only_adds_no_parameter() {
        let set = build(ViewName::ClientStatus, &[("marketplace", "_NONE_")]);
        let (sql, params) = set.to_sql();
        assert!(sql.ends_with("(last_marketplace IS NULL OR TRIM(last_marketplace) = '')"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_date_range_is_inclusive_of_end_day() {
        let set = build(
            ViewName::ClientStatus,
            &[("startDate", "2024-03-01"), ("endDate", "2024-03-31")],
        );
        let (sql, params) = set.to_sql();
        assert!(sql.ends_with("(last_order_at >= $3 AND last_order_at < $4)"));
        assert_eq!(
            params[2],
            SqlParam::Timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            params[3],
            SqlParam::Timestamp(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_date_bounds_follow_report_offset() {
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let set = PredicateSet::build(
            ViewName::ClientStatus.definition(),
            &filters(&[("startDate", "2024-03-01")]),
            offset,
        )
        .unwrap();
        let (_, params) = set.to_sql();
        assert_eq!(
            params[2],
            SqlParam::Timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_bad_date_is_rejected() {
        let err = PredicateSet::build(
            ViewName::ClientStatus.definition(),
            &filters(&[("endDate", "31/03/2024")]),
            utc(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("endDate"));
    }

    #[test]
    fn test_parameter_order_follows_view_declaration() {
        let set = build(
            ViewName::ClientStatus,
            &[
                ("marketplace", "Shop"),
                ("product", "Widget"),
                ("search", "ann"),
                ("status", "Active"),
                ("phone", "5511"),
            ],
        );
        let (sql, params) = set.to_sql();
        assert_eq!(
            sql,
            "record_type = $1 AND category <> $2 AND category = $3 AND phone = $4 AND \
             (name ILIKE $5 OR phone ILIKE $6) AND (last_order_product = ANY($7)) AND \
             (last_marketplace = ANY($8))"
        );
        assert_eq!(params.len(), 8);
        assert_eq!(params[2], SqlParam::Text(ACTIVE.into()));
        assert_eq!(params[7], SqlParam::TextArray(vec!["Shop".into()]));
    }
}
