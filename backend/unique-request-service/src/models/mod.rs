use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Prefix of the human-readable report line.
pub const REPORT_PREFIX: &str = "Unique requests in last minute: ";

/// Caller-supplied request identifier
///
/// Opaque beyond equality and hashing; uniqueness is decided by the
/// membership store, never assumed at the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub i64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ParseIntError;

    /// Plain decimal, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(RequestId)
    }
}

/// Aggregate count emitted once per flush interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEvent {
    pub emitted_at: DateTime<Utc>,
    pub count: u64,
}

impl ReportEvent {
    pub fn new(count: u64) -> Self {
        Self {
            emitted_at: Utc::now(),
            count,
        }
    }

    /// Line written to the report log and published on the event log
    pub fn to_line(&self) -> String {
        self.to_string()
    }

    /// Recover the count from a report line.
    pub fn parse_count(line: &str) -> Option<u64> {
        line.trim()
            .strip_prefix(REPORT_PREFIX.trim_end())
            .and_then(|rest| rest.trim().parse().ok())
    }
}

impl fmt::Display for ReportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", REPORT_PREFIX, self.count)
    }
}

/// HTTP method used for the outbound callback; mirrors the ingress method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackMethod {
    Get,
    Post,
}

impl CallbackMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackMethod::Get => "GET",
            CallbackMethod::Post => "POST",
        }
    }
}

impl fmt::Display for CallbackMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound callback carrying the current unique count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    pub endpoint: String,
    pub count: u64,
    pub method: CallbackMethod,
}

/// JSON body of a POST callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub count: u64,
}
