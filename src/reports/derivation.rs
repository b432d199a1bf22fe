//! Derivation rules
//!
//! Each view maps raw source attributes to one category label through an
//! ordered rule table evaluated first-match-wins. The same table renders the
//! SQL `CASE` expression shared by the summary, count and page queries, and
//! classifies in-memory records with identical semantics.

use chrono::{DateTime, TimeDelta, Utc};

use super::record::{Column, SourceRecord};
use super::sql::{SqlParam, SqlWriter};
use super::views::{
    ViewName, ACTIVE, CHURNED, CHURNING, COLD_PROSPECT, HOT_PROSPECT, LOYAL_CLIENT, NEW_CLIENT,
    ONE_TIME_CLIENT, REPEAT_CLIENT, VIP,
};
use crate::error::{ReportError, ReportResult};

/// Label for records no rule matched; never reported
pub const OTHER_CATEGORY: &str = "Other";

// Raw codes written by ingestion
pub const NEW_STATUS: &str = "new";
pub const ACTIVE_STATUS: &str = "active";
pub const TERMINAL_STATUSES: &[&str] = &["churned", "inactive"];
pub const HOT_PROSPECT_STATUSES: &[&str] = &["active", "engaged"];
pub const VIP_SEGMENT: &str = "vip";
pub const REPEAT_SEGMENT: &str = "repeat";
pub const ONE_TIME_SEGMENT: &str = "one_time";

/// Upper bound on either recency window (about a century)
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// Business thresholds used by the rule tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivationSettings {
    /// Days since last order within which an active client counts as Active
    pub active_days: i64,
    /// Days since last order beyond which an active client counts as Churned
    pub churn_days: i64,
    /// Lifetime orders at which a repeat client becomes Loyal
    pub loyal_order_threshold: i64,
}

impl Default for DerivationSettings {
    fn default() -> Self {
        Self {
            active_days: 60,
            churn_days: 180,
            loyal_order_threshold: 5,
        }
    }
}

impl DerivationSettings {
    pub fn validate(&self) -> ReportResult<()> {
        if self.active_days <= 0 {
            return Err(ReportError::validation("active_days must be positive"));
        }
        if self.churn_days <= self.active_days {
            return Err(ReportError::validation(
                "churn_days must be greater than active_days",
            ));
        }
        if self.churn_days > MAX_WINDOW_DAYS {
            return Err(ReportError::validation(format!(
                "churn_days must be at most {MAX_WINDOW_DAYS}"
            )));
        }
        if self.loyal_order_threshold < 1 {
            return Err(ReportError::validation(
                "loyal_order_threshold must be at least 1",
            ));
        }
        Ok(())
    }
}

/// One condition of a rule
#[derive(Debug, Clone, PartialEq)]
pub enum RuleCondition {
    StatusIn(&'static [&'static str]),
    SegmentIs(&'static str),
    /// Last order at or after the cutoff
    ActiveSince(DateTime<Utc>),
    /// Last order strictly before the cutoff
    InactiveBefore(DateTime<Utc>),
    OrderCountAtLeast(i64),
    All(Vec<RuleCondition>),
}

impl RuleCondition {
    fn render(&self, w: &mut SqlWriter) {
        match self {
            RuleCondition::StatusIn(codes) => {
                w.push(Column::StatusCode.sql_name())
                    .push(" = ANY(")
                    .push_param(SqlParam::TextArray(
                        codes.iter().map(|c| c.to_string()).collect(),
                    ))
                    .push(")");
            }
            RuleCondition::SegmentIs(code) => {
                w.push(Column::SegmentCode.sql_name())
                    .push(" = ")
                    .push_param(SqlParam::Text(code.to_string()));
            }
            RuleCondition::ActiveSince(cutoff) => {
                w.push(Column::LastOrderAt.sql_name())
                    .push(" >= ")
                    .push_param(SqlParam::Timestamp(*cutoff));
            }
            RuleCondition::InactiveBefore(cutoff) => {
                w.push(Column::LastOrderAt.sql_name())
                    .push(" < ")
                    .push_param(SqlParam::Timestamp(*cutoff));
            }
            RuleCondition::OrderCountAtLeast(threshold) => {
                w.push(Column::OrderCount.sql_name())
                    .push("::bigint >= ")
                    .push_param(SqlParam::Int(*threshold));
            }
            RuleCondition::All(parts) => {
                w.push("(");
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        w.push(" AND ");
                    }
                    part.render(w);
                }
                w.push(")");
            }
        }
    }

    /// NULL attributes never match, as in SQL
    pub fn matches(&self, record: &SourceRecord) -> bool {
        match self {
            RuleCondition::StatusIn(codes) => record
                .status_code
                .as_deref()
                .is_some_and(|s| codes.contains(&s)),
            RuleCondition::SegmentIs(code) => record.segment_code.as_deref() == Some(*code),
            RuleCondition::ActiveSince(cutoff) => {
                record.last_order_at.is_some_and(|at| at >= *cutoff)
            }
            RuleCondition::InactiveBefore(cutoff) => {
                record.last_order_at.is_some_and(|at| at < *cutoff)
            }
            RuleCondition::OrderCountAtLeast(threshold) => {
                record.order_count.is_some_and(|n| n >= *threshold)
            }
            RuleCondition::All(parts) => parts.iter().all(|p| p.matches(record)),
        }
    }
}

/// A condition and the label it assigns
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRule {
    pub condition: RuleCondition,
    pub label: &'static str,
}

impl CategoryRule {
    fn new(condition: RuleCondition, label: &'static str) -> Self {
        Self { condition, label }
    }
}

/// Ordered rule table for one view, evaluated first-match-wins
#[derive(Debug, Clone, PartialEq)]
pub struct DerivationRule {
    rules: Vec<CategoryRule>,
    fallback: &'static str,
}

impl DerivationRule {
    /// Rule table for a view name; cutoffs are measured back from `as_of`
    pub fn expression(
        view_name: &str,
        settings: &DerivationSettings,
        as_of: DateTime<Utc>,
    ) -> ReportResult<Self> {
        let view = view_name.parse::<ViewName>()?;
        Self::for_view(view, settings, as_of)
    }

    pub fn for_view(
        view: ViewName,
        settings: &DerivationSettings,
        as_of: DateTime<Utc>,
    ) -> ReportResult<Self> {
        Ok(match view {
            ViewName::ClientStatus => client_status(settings, as_of)?,
            ViewName::ClientSegment => client_segment(settings),
            ViewName::ProspectStatus => prospect_status(),
        })
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    /// Label assigned when no rule matches
    pub fn fallback(&self) -> &'static str {
        self.fallback
    }

    /// Every label this rule can produce, fallback included
    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules
            .iter()
            .map(|r| r.label)
            .chain(std::iter::once(self.fallback))
    }

    pub fn classify(&self, record: &SourceRecord) -> &'static str {
        self.rules
            .iter()
            .find(|rule| rule.condition.matches(record))
            .map(|rule| rule.label)
            .unwrap_or(self.fallback)
    }

    /// Render as `CASE WHEN .. THEN .. ELSE .. END`, labels bound as parameters
    pub fn render(&self, w: &mut SqlWriter) {
        w.push("CASE");
        for rule in &self.rules {
            w.push(" WHEN ");
            rule.condition.render(w);
            w.push(" THEN ")
                .push_param(SqlParam::Text(rule.label.to_string()));
        }
        w.push(" ELSE ")
            .push_param(SqlParam::Text(self.fallback.to_string()))
            .push(" END");
    }
}

/// `as_of` minus `days`, rejecting windows the calendar cannot represent
fn cutoff(as_of: DateTime<Utc>, days: i64) -> ReportResult<DateTime<Utc>> {
    TimeDelta::try_days(days)
        .and_then(|window| as_of.checked_sub_signed(window))
        .ok_or_else(|| {
            ReportError::validation(format!("recency window of {days} days is out of range"))
        })
}

fn client_status(
    settings: &DerivationSettings,
    as_of: DateTime<Utc>,
) -> ReportResult<DerivationRule> {
    let active_cutoff = cutoff(as_of, settings.active_days)?;
    let churn_cutoff = cutoff(as_of, settings.churn_days)?;
    let active = || RuleCondition::StatusIn(&[ACTIVE_STATUS]);

    Ok(DerivationRule {
        rules: vec![
            CategoryRule::new(RuleCondition::StatusIn(&[NEW_STATUS]), NEW_CLIENT),
            CategoryRule::new(RuleCondition::StatusIn(TERMINAL_STATUSES), CHURNED),
            CategoryRule::new(
                RuleCondition::All(vec![active(), RuleCondition::ActiveSince(active_cutoff)]),
                ACTIVE,
            ),
            CategoryRule::new(
                RuleCondition::All(vec![active(), RuleCondition::ActiveSince(churn_cutoff)]),
                CHURNING,
            ),
            CategoryRule::new(
                RuleCondition::All(vec![active(), RuleCondition::InactiveBefore(churn_cutoff)]),
                CHURNED,
            ),
        ],
        fallback: OTHER_CATEGORY,
    })
}

fn client_segment(settings: &DerivationSettings) -> DerivationRule {
    DerivationRule {
        rules: vec![
            CategoryRule::new(RuleCondition::SegmentIs(VIP_SEGMENT), VIP),
            CategoryRule::new(
                RuleCondition::All(vec![
                    RuleCondition::SegmentIs(REPEAT_SEGMENT),
                    RuleCondition::OrderCountAtLeast(settings.loyal_order_threshold),
                ]),
                LOYAL_CLIENT,
            ),
            CategoryRule::new(RuleCondition::SegmentIs(REPEAT_SEGMENT), REPEAT_CLIENT),
            CategoryRule::new(RuleCondition::SegmentIs(ONE_TIME_SEGMENT), ONE_TIME_CLIENT),
        ],
        fallback: OTHER_CATEGORY,
    }
}

fn prospect_status() -> DerivationRule {
    DerivationRule {
        rules: vec![CategoryRule::new(
            RuleCondition::StatusIn(HOT_PROSPECT_STATUSES),
            HOT_PROSPECT,
        )],
        fallback: COLD_PROSPECT,
    }
}
