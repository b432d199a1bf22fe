//! Report service configuration
//!
//! Values come from environment variables (a `.env` file is loaded by the
//! binary first). Every variable has a default; a value that is present but
//! invalid is an error naming the variable.

use chrono::FixedOffset;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ReportError, ReportResult};
use crate::reports::{DerivationSettings, ReportSettings};

pub const DEFAULT_USER_HEADER: &str = "x-user-email";

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub settings: ReportSettings,
    /// Upper bound on each report read
    pub query_timeout: Duration,
    /// `s-maxage` of the caching hint on successful responses
    pub cache_max_age_secs: u32,
    /// Empty means every caller may read reports
    pub authorized_emails: Vec<String>,
    /// Request header carrying the caller's email
    pub user_header: String,
    pub port: u16,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            settings: ReportSettings::default(),
            query_timeout: Duration::from_millis(5000),
            cache_max_age_secs: 60,
            authorized_emails: Vec::new(),
            user_header: DEFAULT_USER_HEADER.to_string(),
            port: 3000,
        }
    }
}

impl ReportConfig {
    pub fn from_env() -> ReportResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ReportResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let derivation_defaults = DerivationSettings::default();

        let derivation = DerivationSettings {
            active_days: parse_var(&lookup, "REPORT_ACTIVE_DAYS", derivation_defaults.active_days)?,
            churn_days: parse_var(&lookup, "REPORT_CHURN_DAYS", derivation_defaults.churn_days)?,
            loyal_order_threshold: parse_var(
                &lookup,
                "REPORT_LOYAL_ORDER_THRESHOLD",
                derivation_defaults.loyal_order_threshold,
            )?,
        };
        derivation.validate()?;

        let max_page_size: u32 = parse_var(
            &lookup,
            "REPORT_MAX_PAGE_SIZE",
            defaults.settings.max_page_size,
        )?;
        if max_page_size == 0 {
            return Err(ReportError::validation(
                "REPORT_MAX_PAGE_SIZE must be at least 1",
            ));
        }

        let offset_minutes: i32 = parse_var(&lookup, "REPORT_UTC_OFFSET_MINUTES", 0)?;
        let utc_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ReportError::validation(format!(
                    "REPORT_UTC_OFFSET_MINUTES out of range: {offset_minutes}"
                ))
            })?;

        let timeout_ms: u64 = parse_var(
            &lookup,
            "REPORT_QUERY_TIMEOUT_MS",
            defaults.query_timeout.as_millis() as u64,
        )?;
        if timeout_ms == 0 {
            return Err(ReportError::validation(
                "REPORT_QUERY_TIMEOUT_MS must be positive",
            ));
        }

        let authorized_emails = lookup("REPORT_AUTHORIZED_EMAILS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let user_header = lookup("REPORT_USER_HEADER")
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.user_header);

        Ok(Self {
            settings: ReportSettings {
                derivation,
                max_page_size,
                utc_offset,
            },
            query_timeout: Duration::from_millis(timeout_ms),
            cache_max_age_secs: parse_var(
                &lookup,
                "REPORT_CACHE_MAX_AGE_SECS",
                defaults.cache_max_age_secs,
            )?,
            authorized_emails,
            user_header,
            port: parse_var(&lookup, "SERVER_PORT", defaults.port)?,
        })
    }

    /// `Cache-Control` value for successful report responses
    pub fn cache_control(&self) -> String {
        if self.cache_max_age_secs == 0 {
            return "no-store".to_string();
        }
        format!(
            "public, s-maxage={}, stale-while-revalidate={}",
            self.cache_max_age_secs,
            self.cache_max_age_secs.saturating_mul(5)
        )
    }
}

fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> ReportResult<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ReportError::validation(format!("{name} has an invalid value: '{raw}'"))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> ReportResult<ReportConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ReportConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.settings.derivation, DerivationSettings::default());
        assert_eq!(config.settings.max_page_size, 100);
        assert_eq!(config.query_timeout, Duration::from_secs(5));
        assert_eq!(config.user_header, "x-user-email");
        assert!(config.authorized_emails.is_empty());
        assert_eq!(
            config.cache_control(),
            "public, s-maxage=60, stale-while-revalidate=300"
        );
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("REPORT_ACTIVE_DAYS", "30"),
            ("REPORT_CHURN_DAYS", "90"),
            ("REPORT_UTC_OFFSET_MINUTES", "-180"),
            ("REPORT_AUTHORIZED_EMAILS", "a@x.com, ,b@x.com"),
            ("REPORT_CACHE_MAX_AGE_SECS", "0"),
        ])
        .unwrap();
        assert_eq!(config.settings.derivation.active_days, 30);
        assert_eq!(config.settings.derivation.churn_days, 90);
        assert_eq!(config.settings.utc_offset.local_minus_utc(), -180 * 60);
        assert_eq!(config.authorized_emails, vec!["a@x.com", "b@x.com"]);
        assert_eq!(config.cache_control(), "no-store");
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = from_pairs(&[("REPORT_MAX_PAGE_SIZE", "lots")]).unwrap_err();
        assert!(err.to_string().contains("REPORT_MAX_PAGE_SIZE"));

        let err = from_pairs(&[("REPORT_CHURN_DAYS", "10")]).unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));

        assert!(from_pairs(&[("REPORT_UTC_OFFSET_MINUTES", "100000")]).is_err());
    }

    #[test]
    fn test_oversized_churn_window_rejected_at_load() {
        let err = from_pairs(&[("REPORT_CHURN_DAYS", "200000000")]).unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
        assert!(err.to_string().contains("churn_days"));

        let config = from_pairs(&[("REPORT_CHURN_DAYS", "36500")]).unwrap();
        assert_eq!(config.settings.derivation.churn_days, 36_500);
    }
}
