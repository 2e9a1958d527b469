use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use vellum_rules::Program;

use crate::error::DbError;

/// Most runs a single catch-up executes.
pub const MAX_CATCH_UP: u64 = 32;

/// A scheduled job list. Runs happen at `start + k * span` for
/// `k < times`, never after `end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronDef {
    pub start: i64,
    pub end: Option<i64>,
    pub span: i64,
    pub times: Option<u64>,
    /// Run the ticks already due at registration instead of skipping them.
    #[serde(rename = "do")]
    pub run_now: bool,
    pub jobs: Value,
    pub version: Option<Value>,
    /// Index of the next scheduled run.
    pub next: u64,
}

impl CronDef {
    /// Parse `{start?, end?, span, times?, do?, jobs, version?}`. A missing
    /// start means `now`.
    pub fn from_json(v: &Value, now: i64) -> Result<Self, DbError> {
        let obj = v
            .as_object()
            .ok_or_else(|| DbError::Validation(format!("cron must be an object: {v}")))?;
        let int = |key: &str| -> Result<Option<i64>, DbError> {
            match obj.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(x) => x
                    .as_i64()
                    .map(Some)
                    .ok_or_else(|| DbError::Validation(format!("cron {key} must be an integer"))),
            }
        };
        let span = int("span")?
            .filter(|s| *s > 0)
            .ok_or_else(|| DbError::Validation("cron span must be a positive integer".into()))?;
        let times = match obj.get("times") {
            None | Some(Value::Null) => None,
            Some(t) => Some(
                t.as_u64()
                    .ok_or_else(|| DbError::Validation("cron times must be a count".into()))?,
            ),
        };
        let jobs = obj.get("jobs").cloned().unwrap_or_else(|| json!([]));
        Program::parse(&jobs)?;
        Ok(CronDef {
            start: int("start")?.unwrap_or(now),
            end: int("end")?,
            span,
            times,
            run_now: obj.get("do").and_then(Value::as_bool).unwrap_or(false),
            jobs,
            version: obj.get("version").filter(|v| !v.is_null()).cloned(),
            next: 0,
        })
    }

    /// Time of the `k`th run, if there is one.
    pub fn at(&self, k: u64) -> Option<i64> {
        if self.times.is_some_and(|t| k >= t) {
            return None;
        }
        let t = i64::try_from(k)
            .ok()
            .and_then(|k| k.checked_mul(self.span))
            .and_then(|offset| self.start.checked_add(offset))?;
        match self.end {
            Some(end) if t > end => None,
            _ => Some(t),
        }
    }

    /// Advance past every run due at `now`, returning their times. After a
    /// long gap only the latest [`MAX_CATCH_UP`] runs are returned; older
    /// missed runs are dropped.
    pub fn take_due(&mut self, now: i64) -> Vec<i64> {
        let Some(elapsed) = now.checked_sub(self.start).filter(|e| *e >= 0) else {
            return Vec::new();
        };
        // elapsed and span are non-negative, so the casts are lossless.
        let mut last = (elapsed / self.span) as u64;
        if let Some(times) = self.times {
            let Some(final_run) = times.checked_sub(1) else {
                return Vec::new();
            };
            last = last.min(final_run);
        }
        if let Some(end) = self.end {
            let Some(span_to_end) = end.checked_sub(self.start).filter(|e| *e >= 0) else {
                return Vec::new();
            };
            last = last.min((span_to_end / self.span) as u64);
        }
        if last < self.next {
            return Vec::new();
        }
        let first = self.next.max(last.saturating_sub(MAX_CATCH_UP - 1));
        self.next = last + 1;
        (first..=last).filter_map(|k| self.at(k)).collect()
    }

    /// No runs remain.
    pub fn is_finished(&self) -> bool {
        self.at(self.next).is_none()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "start": self.start,
            "end": self.end,
            "span": self.span,
            "times": self.times,
            "do": self.run_now,
            "jobs": self.jobs,
            "version": self.version,
            "next": self.at(self.next),
        })
    }
}
