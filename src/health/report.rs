//! Summary and detailed projections of an [`AggregateStatus`] as served by the
//! liveliness endpoint.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::AggregateStatus;

pub const SUCCESS: &str = "success";
pub const FAILED: &str = "failed";

pub fn status_text(passing: bool) -> &'static str { if passing { SUCCESS } else { FAILED } }

fn rfc3339(t: DateTime<Utc>) -> String { t.to_rfc3339_opts(SecondsFormat::Secs, true) }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryView {
    pub status: String,
    pub checks: BTreeMap<String, String>,
}

impl SummaryView {
    pub fn from_status(status: &AggregateStatus) -> Self {
        let checks = status
            .checks
            .iter()
            .map(|c| (c.name.clone(), status_text(c.passing).to_string()))
            .collect();
        Self { status: status_text(status.healthy).to_string(), checks }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckView {
    pub name: String,
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedView {
    pub status: String,
    pub time: String,
    pub checks: Vec<CheckView>,
}

impl DetailedView {
    pub fn from_status(status: &AggregateStatus, now: DateTime<Utc>) -> Self {
        let checks = status
            .checks
            .iter()
            .map(|c| CheckView { name: c.name.clone(), status: status_text(c.passing).to_string(), timestamp: rfc3339(c.timestamp) })
            .collect();
        Self { status: status_text(status.healthy).to_string(), time: rfc3339(now), checks }
    }
}
