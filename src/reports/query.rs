//! SQL for the three coordinated report reads
//!
//! The categorized CTE and the filter conjunction are rendered once. Summary,
//! count and page differ only in their select list and tail, which carry no
//! parameters except the page window appended after the shared prefix.

use super::derivation::DerivationRule;
use super::page::PageRequest;
use super::predicate::PredicateSet;
use super::record::{Column, SOURCE_TABLE};
use super::sql::{SqlParam, SqlWriter};
use super::views::ViewDefinition;

const RECORD_COLUMNS: &str = "phone, name, status_code, segment_code, \
     average_order_value, order_count, last_order_at, last_order_product, \
     last_marketplace, record_type";

/// Rendered filtered-and-categorized view of the source table
#[derive(Debug, Clone, PartialEq)]
pub struct ViewQuery {
    cte: String,
    filter: String,
    order_by: &'static str,
    params: Vec<SqlParam>,
}

impl ViewQuery {
    pub fn new(view: &ViewDefinition, rule: &DerivationRule, predicates: &PredicateSet) -> Self {
        let mut w = SqlWriter::new();
        w.push(
            "WITH categorized AS (SELECT phone, name, status_code, segment_code, \
             average_order_value::numeric AS average_order_value, \
             order_count::bigint AS order_count, last_order_at, last_order_product, \
             last_marketplace, record_type, ",
        );
        rule.render(&mut w);
        w.push(" AS category FROM ")
            .push(SOURCE_TABLE)
            .push(")");
        let cte_len = w.sql().len();
        predicates.render(&mut w);

        let (sql, params) = w.into_parts();
        let (cte, filter) = sql.split_at(cte_len);
        Self {
            cte: cte.to_string(),
            filter: filter.to_string(),
            order_by: view.sort.order_by_sql(),
            params,
        }
    }

    /// Parameters shared by every read of this view
    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    pub fn summary_sql(&self) -> String {
        format!(
            "{} SELECT category, COUNT(*) AS total FROM categorized WHERE {} \
             GROUP BY category ORDER BY category",
            self.cte, self.filter
        )
    }

    pub fn count_sql(&self) -> String {
        format!(
            "{} SELECT COUNT(*) AS total FROM categorized WHERE {}",
            self.cte, self.filter
        )
    }

    /// Page SQL and its parameters (shared prefix, then limit and offset)
    pub fn page_sql(&self, page: PageRequest) -> (String, Vec<SqlParam>) {
        let mut params = self.params.clone();
        params.push(SqlParam::Int(i64::from(page.limit())));
        let limit_idx = params.len();
        params.push(SqlParam::Int(page.offset() as i64));
        let offset_idx = params.len();

        let sql = format!(
            "{} SELECT {}, category FROM categorized WHERE {} ORDER BY {} \
             LIMIT ${} OFFSET ${}",
            self.cte, RECORD_COLUMNS, self.filter, self.order_by, limit_idx, offset_idx
        );
        (sql, params)
    }

    /// Distinct non-blank products across a view's record population, in byte order
    pub fn products_sql(view: &ViewDefinition) -> (String, Vec<SqlParam>) {
        let product = Column::LastOrderProduct.sql_name();
        let mut w = SqlWriter::new();
        w.push("SELECT DISTINCT ")
            .push(product)
            .push(" COLLATE \"C\" AS ")
            .push(product)
            .push(" FROM ")
            .push(SOURCE_TABLE)
            .push(" WHERE ")
            .push(Column::RecordType.sql_name())
            .push(" = ")
            .push_param(SqlParam::Text(view.record_type.as_str().to_string()))
            .push(" AND ")
            .push(product)
            .push(" IS NOT NULL AND TRIM(")
            .push(product)
            .push(") <> '' ORDER BY 1");
        w.into_parts()
    }
}
