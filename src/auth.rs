//! Access capability check
//!
//! Authentication happens upstream; the report layer only asks whether the
//! caller's email may read reports.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{ReportError, ReportResult};

pub trait AccessPolicy: Send + Sync {
    fn is_authorized(&self, email: &str) -> bool;

    fn authorize(&self, email: Option<&str>) -> ReportResult<()> {
        let email = email.map(str::trim).unwrap_or_default();
        if self.is_authorized(email) {
            Ok(())
        } else {
            Err(ReportError::AccessDenied)
        }
    }
}

/// Every caller may read reports
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAccess;

impl AccessPolicy for OpenAccess {
    fn is_authorized(&self, _email: &str) -> bool {
        true
    }
}

/// Only listed emails may read reports; comparison ignores case
#[derive(Debug, Clone, Default)]
pub struct AllowListPolicy {
    emails: HashSet<String>,
}

impl AllowListPolicy {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }
}

impl AccessPolicy for AllowListPolicy {
    fn is_authorized(&self, email: &str) -> bool {
        !email.is_empty() && self.emails.contains(&email.to_lowercase())
    }
}

/// Allow-list when emails are configured, open access otherwise
pub fn policy_from_emails(emails: &[String]) -> Arc<dyn AccessPolicy> {
    if emails.iter().all(|e| e.trim().is_empty()) {
        Arc::new(OpenAccess)
    } else {
        Arc::new(AllowListPolicy::new(emails))
    }
}
