//! Built-in routing evaluators
//!
//! Pure functions of state that pick a label for a conditional edge. Each one
//! declares its label set, so `compile()` rejects a mapping that forgets a
//! label before any thread runs.
//!
//! | Router | Reads | Labels |
//! |--------|-------|--------|
//! | [`FreshnessRouter`] | a timestamp field | `fresh`, `stale` |
//! | [`EscalationRouter`] | an iteration counter and a grade | `accept`, `regenerate`, `escalate` |
//! | [`ApprovalRouter`] | a boolean field | `approved`, `rejected` |
//!
//! ```rust
//! use flowkeep_core::routing::EscalationRouter;
//! use flowkeep_core::{Router, WorkflowState};
//! use serde_json::json;
//!
//! let router = EscalationRouter::new(4);
//! let state = WorkflowState::new()
//!     .with("iteration_count", json!(4))
//!     .with("grade", json!("bad"));
//!
//! // the bound wins over the grade
//! assert_eq!(router.route(&state), "escalate");
//! ```

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::graph::Router;
use crate::state::WorkflowState;

pub const FRESH: &str = "fresh";
pub const STALE: &str = "stale";

pub const ACCEPT: &str = "accept";
pub const REGENERATE: &str = "regenerate";
pub const ESCALATE: &str = "escalate";

pub const APPROVED: &str = "approved";
pub const REJECTED: &str = "rejected";

/// Source of "now" for time-dependent routers
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Routes on the age of a timestamp field
///
/// Emits `fresh` when `now - timestamp <= threshold`, otherwise `stale`. A
/// missing, empty, `"NULL"` or unparseable timestamp is `stale`.
///
/// Accepted formats: RFC 3339, naive `YYYY-MM-DD HH:MM:SS[.f]` or
/// `YYYY-MM-DDTHH:MM:SS[.f]` (read as UTC), bare `YYYY-MM-DD`, and integer
/// Unix seconds.
#[derive(Clone)]
pub struct FreshnessRouter {
    field: String,
    threshold: Duration,
    clock: Clock,
}

impl FreshnessRouter {
    pub const DEFAULT_THRESHOLD_HOURS: i64 = 48;

    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            threshold: Duration::hours(Self::DEFAULT_THRESHOLD_HOURS),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    /// Replace the wall clock, for deterministic tests
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Label for a timestamp observed at `now`
    pub fn classify(&self, timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> &'static str {
        match timestamp {
            Some(ts) if now.signed_duration_since(ts) <= self.threshold => FRESH,
            _ => STALE,
        }
    }
}

impl fmt::Debug for FreshnessRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreshnessRouter")
            .field("field", &self.field)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl Router for FreshnessRouter {
    fn route(&self, state: &WorkflowState) -> String {
        let timestamp = state.get(&self.field).and_then(parse_timestamp);
        self.classify(timestamp, (self.clock)()).to_string()
    }

    fn labels(&self) -> Option<Vec<String>> {
        Some(vec![FRESH.to_string(), STALE.to_string()])
    }
}

/// Parse a stored timestamp; `None` for anything unusable
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => parse_timestamp_str(raw),
        Value::Number(secs) => secs
            .as_i64()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        _ => None,
    }
}

fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Bounded regenerate loop
///
/// Once the counter reaches `max_iterations` the router emits the escalation
/// label no matter what the grade says; below the bound it accepts on the
/// passing grade and asks for another attempt otherwise. The node that
/// regenerates is expected to bump the counter once per attempt.
///
/// A missing or `null` counter reads as 0. Integers, floats and numeric
/// strings are accepted; any other counter value escalates so a corrupted
/// counter cannot loop forever.
#[derive(Debug, Clone)]
pub struct EscalationRouter {
    counter_field: String,
    grade_field: String,
    passing_grade: String,
    max_iterations: i64,
    accept_label: String,
    retry_label: String,
    escalate_label: String,
}

impl EscalationRouter {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            counter_field: "iteration_count".to_string(),
            grade_field: "grade".to_string(),
            passing_grade: "good".to_string(),
            max_iterations: i64::from(max_iterations),
            accept_label: ACCEPT.to_string(),
            retry_label: REGENERATE.to_string(),
            escalate_label: ESCALATE.to_string(),
        }
    }

    pub fn with_fields(mut self, counter: impl Into<String>, grade: impl Into<String>) -> Self {
        self.counter_field = counter.into();
        self.grade_field = grade.into();
        self
    }

    pub fn with_passing_grade(mut self, grade: impl Into<String>) -> Self {
        self.passing_grade = grade.into();
        self
    }

    pub fn with_labels(
        mut self,
        accept: impl Into<String>,
        retry: impl Into<String>,
        escalate: impl Into<String>,
    ) -> Self {
        self.accept_label = accept.into();
        self.retry_label = retry.into();
        self.escalate_label = escalate.into();
        self
    }
}

impl Router for EscalationRouter {
    fn route(&self, state: &WorkflowState) -> String {
        let exhausted = match iteration_count(state.get(&self.counter_field)) {
            Some(count) => count >= self.max_iterations as f64,
            None => true,
        };
        if exhausted {
            return self.escalate_label.clone();
        }
        if state.get_str(&self.grade_field) == Some(self.passing_grade.as_str()) {
            self.accept_label.clone()
        } else {
            self.retry_label.clone()
        }
    }

    fn labels(&self) -> Option<Vec<String>> {
        Some(vec![
            self.accept_label.clone(),
            self.retry_label.clone(),
            self.escalate_label.clone(),
        ])
    }
}

/// Read a counter value; `None` when it is present but not a number
fn iteration_count(value: Option<&Value>) -> Option<f64> {
    match value {
        None | Some(Value::Null) => Some(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        Some(_) => None,
    }
}

/// Routes on a boolean approval flag; anything but `true` is a rejection
#[derive(Debug, Clone)]
pub struct ApprovalRouter {
    field: String,
    approved_label: String,
    rejected_label: String,
}

impl ApprovalRouter {
    pub fn new() -> Self {
        Self {
            field: "approved".to_string(),
            approved_label: APPROVED.to_string(),
            rejected_label: REJECTED.to_string(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn with_labels(mut self, approved: impl Into<String>, rejected: impl Into<String>) -> Self {
        self.approved_label = approved.into();
        self.rejected_label = rejected.into();
        self
    }
}

impl Default for ApprovalRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Router for ApprovalRouter {
    fn route(&self, state: &WorkflowState) -> String {
        if state.get_bool(&self.field) == Some(true) {
            self.approved_label.clone()
        } else {
            self.rejected_label.clone()
        }
    }

    fn labels(&self) -> Option<Vec<String>> {
        Some(vec![self.approved_label.clone(), self.rejected_label.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn freshness() -> FreshnessRouter {
        FreshnessRouter::new("fetched_at").with_clock(fixed_now)
    }

    fn stamped(ts: DateTime<Utc>) -> WorkflowState {
        WorkflowState::new().with("fetched_at", json!(ts.to_rfc3339()))
    }

    #[test]
    fn test_freshness_boundary() {
        let router = freshness();
        assert_eq!(router.threshold(), Duration::hours(48));

        assert_eq!(router.route(&stamped(fixed_now() - Duration::hours(36))), FRESH);
        assert_eq!(router.route(&stamped(fixed_now() - Duration::hours(50))), STALE);
        assert_eq!(router.route(&stamped(fixed_now() - Duration::hours(48))), FRESH);
    }

    #[test]
    fn test_freshness_missing_is_stale() {
        let router = freshness();
        assert_eq!(router.route(&WorkflowState::new()), STALE);
        for raw in ["", "NULL", "null", "yesterday", "2024-13-45"] {
            let state = WorkflowState::new().with("fetched_at", json!(raw));
            assert_eq!(router.route(&state), STALE, "{raw:?}");
        }
        let state = WorkflowState::new().with("fetched_at", json!(true));
        assert_eq!(router.route(&state), STALE);
    }

    #[test]
    fn test_naive_timestamps_read_as_utc() {
        let router = freshness();
        for raw in [
            "2024-05-09 12:00:00",
            "2024-05-09T12:00:00.123456",
            "2024-05-09",
        ] {
            let state = WorkflowState::new().with("fetched_at", json!(raw));
            assert_eq!(router.route(&state), FRESH, "{raw}");
        }
        let expected = Utc.with_ymd_and_hms(2024, 5, 9, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&json!("2024-05-09 12:00:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!(expected.timestamp())), Some(expected));
    }

    #[test]
    fn test_custom_threshold() {
        let router = freshness().with_threshold(Duration::hours(1));
        assert_eq!(router.route(&stamped(fixed_now() - Duration::hours(2))), STALE);
    }

    #[test]
    fn test_escalation_below_bound_follows_grade() {
        let router = EscalationRouter::new(4);
        let good = WorkflowState::new()
            .with("iteration_count", json!(1))
            .with("grade", json!("good"));
        let bad = WorkflowState::new()
            .with("iteration_count", json!(3))
            .with("grade", json!("bad"));

        assert_eq!(router.route(&good), ACCEPT);
        assert_eq!(router.route(&bad), REGENERATE);
        assert_eq!(router.route(&WorkflowState::new()), REGENERATE);
    }

    #[test]
    fn test_escalation_at_bound_ignores_grade() {
        let router = EscalationRouter::new(4);
        for grade in ["good", "bad"] {
            for count in [4, 7] {
                let state = WorkflowState::new()
                    .with("iteration_count", json!(count))
                    .with("grade", json!(grade));
                assert_eq!(router.route(&state), ESCALATE);
            }
        }
    }

    #[test]
    fn test_escalation_reads_non_integer_counters() {
        let router = EscalationRouter::new(4);
        let at = |count: Value| {
            router.route(
                &WorkflowState::new()
                    .with("iteration_count", count)
                    .with("grade", json!("bad")),
            )
        };

        assert_eq!(at(json!(4.0)), ESCALATE);
        assert_eq!(at(json!(3.5)), REGENERATE);
        assert_eq!(at(json!(u64::MAX)), ESCALATE);
        assert_eq!(at(json!("4")), ESCALATE);
        assert_eq!(at(json!(" 2 ")), REGENERATE);
        assert_eq!(at(Value::Null), REGENERATE);
    }

    #[test]
    fn test_escalation_unreadable_counter_escalates() {
        let router = EscalationRouter::new(4);
        for count in [json!("many"), json!(true), json!([1]), json!({"n": 1}), json!("NaN")] {
            let state = WorkflowState::new()
                .with("iteration_count", count.clone())
                .with("grade", json!("good"));
            assert_eq!(router.route(&state), ESCALATE, "{count}");
        }
    }

    #[test]
    fn test_escalation_custom_labels_are_declared() {
        let router = EscalationRouter::new(2).with_labels("review", "draft", "review_forced");
        assert_eq!(
            router.labels(),
            Some(vec![
                "review".to_string(),
                "draft".to_string(),
                "review_forced".to_string()
            ])
        );
    }

    #[test]
    fn test_approval() {
        let router = ApprovalRouter::new();
        let yes = WorkflowState::new().with("approved", json!(true));
        let no = WorkflowState::new().with("approved", json!(false));
        let text = WorkflowState::new().with("approved", json!("yes"));

        assert_eq!(router.route(&yes), APPROVED);
        assert_eq!(router.route(&no), REJECTED);
        assert_eq!(router.route(&text), REJECTED);
        assert_eq!(router.route(&WorkflowState::new()), REJECTED);
    }
}
