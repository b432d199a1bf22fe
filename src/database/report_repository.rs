//! PostgreSQL report store
//!
//! Each request borrows one pooled connection and issues its reads on it in
//! order: summary, total count, page, then products for views that list
//! them. The three reads are not wrapped in a transaction, so a concurrent
//! ingestion write can shift a page boundary relative to the reported total.
//! The connection goes back to the pool when the request's future completes
//! or is dropped.

use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::{Arguments, PgPool};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::{ReportError, ReportResult};
use crate::reports::query::ViewQuery;
use crate::reports::{CategorizedRecord, RawReport, ReportQuery, ReportStore, SqlParam};

#[derive(Clone, Debug)]
pub struct PgReportStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgReportStore {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Await one step under the per-query timeout, logging failures with context
    async fn timed<T, F>(&self, view: &str, step: &'static str, fut: F) -> ReportResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(view, step, error = %e, "Report query failed");
                Err(ReportError::query_failed(format!("{step} for {view}"), e))
            }
            Err(_) => {
                let timeout_ms = self.query_timeout.as_millis() as u64;
                warn!(view, step, timeout_ms, "Report query timed out");
                Err(ReportError::Timeout {
                    context: format!("{step} for {view}"),
                    timeout_ms,
                })
            }
        }
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn fetch(&self, query: &ReportQuery) -> ReportResult<RawReport> {
        let view = query.view.name.as_str();
        let sql = query.to_sql();
        debug!(
            view,
            params = sql.params().len(),
            "Issuing summary, count and page reads"
        );

        let mut conn = self.timed(view, "acquire", self.pool.acquire()).await?;

        let summary_sql = sql.summary_sql();
        let summary: Vec<(String, i64)> = self
            .timed(
                view,
                "summary",
                sqlx::query_as_with(&summary_sql, to_arguments(view, sql.params())?)
                    .fetch_all(&mut *conn),
            )
            .await?;

        let count_sql = sql.count_sql();
        let total: i64 = self
            .timed(
                view,
                "count",
                sqlx::query_scalar_with(&count_sql, to_arguments(view, sql.params())?)
                    .fetch_one(&mut *conn),
            )
            .await?;

        let (page_sql, page_params) = sql.page_sql(query.page);
        let rows: Vec<CategorizedRecord> = self
            .timed(
                view,
                "page",
                sqlx::query_as_with(&page_sql, to_arguments(view, &page_params)?)
                    .fetch_all(&mut *conn),
            )
            .await?;

        let products = if query.view.lists_products {
            let (products_sql, products_params) = ViewQuery::products_sql(query.view);
            let products: Vec<String> = self
                .timed(
                    view,
                    "products",
                    sqlx::query_scalar_with(&products_sql, to_arguments(view, &products_params)?)
                        .fetch_all(&mut *conn),
                )
                .await?;
            Some(products)
        } else {
            None
        };

        Ok(RawReport {
            summary,
            total,
            rows,
            products,
        })
    }
}

/// Bind parameters in placeholder order
fn to_arguments(view: &str, params: &[SqlParam]) -> ReportResult<PgArguments> {
    let mut args = PgArguments::default();
    for param in params {
        let added = match param {
            SqlParam::Text(v) => args.add(v.clone()),
            SqlParam::TextArray(v) => args.add(v.clone()),
            SqlParam::Int(v) => args.add(*v),
            SqlParam::Timestamp(v) => args.add(*v),
        };
        added.map_err(|e| ReportError::query_failed(format!("binding parameters for {view}"), e))?;
    }
    Ok(args)
}
