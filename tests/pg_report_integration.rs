//! PostgreSQL report store integration tests
//!
//! Each test builds a session-local `customer_summary` temp table on a
//! single-connection pool, so nothing outside the test is read or written.
//! The same records are loaded into the in-memory store and both answers
//! must agree.
//!
//! Run with: TEST_DATABASE_URL="postgresql:///reports_test" cargo test --test pg_report_integration -- --ignored

#[cfg(feature = "database")]
mod pg_tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use anyhow::Result;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;

    use customer_reports::database::PgReportStore;
    use customer_reports::error::ReportError;
    use customer_reports::reports::{
        MemoryReportStore, RawFilters, ReportResponse, ReportService, ReportSettings,
        SourceRecord, ViewName,
    };

    // =========================================================================
    // TEST INFRASTRUCTURE
    // =========================================================================

    struct TestDb {
        pool: PgPool,
    }

    impl TestDb {
        async fn new() -> Result<Self> {
            let url = std::env::var("TEST_DATABASE_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .unwrap_or_else(|_| "postgresql:///reports_test".into());

            // One connection keeps the temp table visible to every query
            let pool = PgPoolOptions::new()
                .max_connections(1)
                .connect(&url)
                .await?;

            sqlx::query(
                r#"CREATE TEMP TABLE customer_summary (
                       phone TEXT,
                       name TEXT,
                       status_code TEXT,
                       segment_code TEXT,
                       average_order_value NUMERIC(12, 2),
                       order_count INTEGER,
                       last_order_at TIMESTAMPTZ,
                       last_order_product TEXT,
                       last_marketplace TEXT,
                       record_type TEXT
                   )"#,
            )
            .execute(&pool)
            .await?;

            Ok(Self { pool })
        }

        async fn insert(&self, records: &[SourceRecord]) -> Result<()> {
            for r in records {
                sqlx::query(
                    r#"INSERT INTO customer_summary
                       (phone, name, status_code, segment_code, average_order_value,
                        order_count, last_order_at, last_order_product, last_marketplace,
                        record_type)
                       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
                )
                .bind(&r.phone)
                .bind(&r.name)
                .bind(&r.status_code)
                .bind(&r.segment_code)
                .bind(r.average_order_value)
                .bind(r.order_count.map(|c| c as i32))
                .bind(r.last_order_at)
                .bind(&r.last_order_product)
                .bind(&r.last_marketplace)
                .bind(&r.record_type)
                .execute(&self.pool)
                .await?;
            }
            Ok(())
        }

        fn service(&self) -> ReportService {
            ReportService::new(
                Arc::new(PgReportStore::new(
                    self.pool.clone(),
                    StdDuration::from_secs(5),
                )),
                ReportSettings::default(),
            )
        }
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn filters(pairs: &[(&str, &str)]) -> RawFilters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        phone: &str,
        name: &str,
        status: &str,
        segment: &str,
        days_ago: Option<i64>,
        orders: i64,
        product: Option<&str>,
        record_type: &str,
    ) -> SourceRecord {
        SourceRecord {
            phone: Some(phone.into()),
            name: Some(name.into()),
            status_code: Some(status.into()),
            segment_code: Some(segment.into()),
            average_order_value: Some(Decimal::new(1999, 2)),
            order_count: Some(orders),
            last_order_at: days_ago.map(|d| as_of() - Duration::days(d)),
            last_order_product: product.map(str::to_string),
            last_marketplace: Some("web".into()),
            record_type: Some(record_type.into()),
        }
    }

    fn fixture() -> Vec<SourceRecord> {
        vec![
            record("5550001", "Ann Smith", "active", "vip", Some(3), 9, Some("Widget"), "client"),
            record("5550002", "Bob Jones", "new", "repeat", Some(1), 6, Some("Gadget"), "client"),
            record("5550003", "Cy Smithers", "active", "repeat", Some(100), 2, None, "client"),
            record("5550004", "Dee 100%", "churned", "one_time", Some(400), 1, Some(" "), "client"),
            record("5550005", "Eve Paused", "paused", "unknown", Some(2), 4, Some("Widget"), "client"),
            record("5550006", "Fay Stale", "active", "repeat", Some(365), 5, Some("Widget"), "client"),
            record("5550007", "Gus Undated", "active", "one_time", None, 1, None, "client"),
            record("5559001", "Hal Hot", "engaged", "", Some(7), 0, None, "prospect"),
            record("5559002", "Ida Cold", "lead", "", None, 0, None, "prospect"),
        ]
    }

    async fn memory_run(view: &str, raw: &RawFilters) -> ReportResponse {
        memory_run_with(fixture(), view, raw).await
    }

    async fn memory_run_with(
        records: Vec<SourceRecord>,
        view: &str,
        raw: &RawFilters,
    ) -> ReportResponse {
        ReportService::new(
            Arc::new(MemoryReportStore::new(records)),
            ReportSettings::default(),
        )
        .run_at(view, raw, as_of())
        .await
        .unwrap()
    }

    // =========================================================================
    // TESTS
    // =========================================================================

    #[tokio::test]
    #[ignore] // requires TEST_DATABASE_URL or DATABASE_URL
    async fn test_postgres_matches_memory_store() -> Result<()> {
        let db = TestDb::new().await?;
        db.insert(&fixture()).await?;
        let service = db.service();

        let cases: Vec<Vec<(&str, &str)>> = vec![
            vec![],
            vec![("limit", "2"), ("page", "2")],
            vec![("status", "active")],
            vec![("search", "smith")],
            vec![("search", "100%")],
            vec![("product", "_NONE_,Widget")],
            vec![("startDate", "2024-06-01"), ("endDate", "2024-06-29")],
            vec![("startDate", "2024-06-29"), ("endDate", "2024-06-01")],
            vec![("segment", "loyal client")],
            vec![("phone", "5550002")],
        ];

        for view in ViewName::ALL {
            for pairs in &cases {
                let raw = filters(pairs);
                let pg = service.run_at(view.as_str(), &raw, as_of()).await?;
                let mem = memory_run(view.as_str(), &raw).await;
                assert_eq!(
                    serde_json::to_value(&pg)?,
                    serde_json::to_value(&mem)?,
                    "{view} {pairs:?}"
                );
            }
        }
        Ok(())
    }

    #[tokio::test]
    #[ignore] // requires TEST_DATABASE_URL or DATABASE_URL
    async fn test_whitespace_products_agree_with_memory_store() -> Result<()> {
        let db = TestDb::new().await?;
        let mut records = fixture();
        records.push(record(
            "5550008", "Tab Product", "active", "repeat", Some(4), 2, Some("\t"), "client",
        ));
        records.push(record(
            "5550009", "Newline Product", "active", "repeat", Some(5), 2, Some("\n"), "client",
        ));
        db.insert(&records).await?;
        let service = db.service();

        for pairs in [vec![], vec![("product", "_NONE_")]] {
            let raw = filters(&pairs);
            let pg = service.run_at("client-status", &raw, as_of()).await?;
            let mem = memory_run_with(records.clone(), "client-status", &raw).await;
            assert_eq!(
                serde_json::to_value(&pg)?,
                serde_json::to_value(&mem)?,
                "{pairs:?}"
            );
        }
        Ok(())
    }

    #[tokio::test]
    #[ignore] // requires TEST_DATABASE_URL or DATABASE_URL
    async fn test_client_status_categories() -> Result<()> {
        let db = TestDb::new().await?;
        db.insert(&fixture()).await?;

        let resp = db
            .service()
            .run_at("client-status", &RawFilters::new(), as_of())
            .await?;

        assert_eq!(resp.summary["New Client"], 1);
        assert_eq!(resp.summary["Active"], 1);
        assert_eq!(resp.summary["Churning"], 1);
        // churned status and 365 days idle
        assert_eq!(resp.summary["Churned"], 2);
        assert_eq!(resp.total_count, 5);
        assert_eq!(
            resp.all_products,
            Some(vec!["Gadget".to_string(), "Widget".to_string()])
        );
        // Paused and undated clients derive to Other
        assert!(resp
            .rows
            .iter()
            .all(|r| r.phone != "5550005" && r.phone != "5550007"));
        Ok(())
    }

    #[tokio::test]
    #[ignore] // requires TEST_DATABASE_URL or DATABASE_URL
    async fn test_segment_sorts_by_total_spent() -> Result<()> {
        let db = TestDb::new().await?;
        db.insert(&fixture()).await?;

        let resp = db
            .service()
            .run_at("client-segment", &RawFilters::new(), as_of())
            .await?;

        let phones: Vec<&str> = resp.rows.iter().map(|r| r.phone.as_str()).collect();
        assert_eq!(phones[..2], ["5550001", "5550002"]);
        assert_eq!(resp.summary["VIP"], 1);
        assert_eq!(resp.summary["Loyal Client"], 2);
        assert!(resp.all_products.is_none());
        Ok(())
    }

    #[tokio::test]
    #[ignore] // requires TEST_DATABASE_URL or DATABASE_URL
    async fn test_missing_table_is_query_failure() -> Result<()> {
        let db = TestDb::new().await?;
        sqlx::query("DROP TABLE customer_summary")
            .execute(&db.pool)
            .await?;

        let err = db
            .service()
            .run_at("client-status", &RawFilters::new(), as_of())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::QueryFailed { .. }));
        assert!(err.is_data_source_failure());
        Ok(())
    }
}
