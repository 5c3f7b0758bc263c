//! Domain types shared by the registry, the pending-work queue and the probe pipeline.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a monitored target (registry primary key)
pub type TargetId = i64;

/// Error returned when parsing one of the enumerations below from user input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// How often a target is probed
///
/// The set is closed: every scheduler loop and every queue key is derived from one of these
/// variants, so the frequency-to-dispatch-group table can be built once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringFrequency {
    TenSeconds,
    ThirtySeconds,
    OneMinute,
    FiveMinutes,
    ThirtyMinutes,
    OneHour,
    TwelveHours,
    TwentyFourHours,
}

impl MonitoringFrequency {
    pub const ALL: [MonitoringFrequency; 8] = [
        MonitoringFrequency::TenSeconds,
        MonitoringFrequency::ThirtySeconds,
        MonitoringFrequency::OneMinute,
        MonitoringFrequency::FiveMinutes,
        MonitoringFrequency::ThirtyMinutes,
        MonitoringFrequency::OneHour,
        MonitoringFrequency::TwelveHours,
        MonitoringFrequency::TwentyFourHours,
    ];

    /// Canonical seconds value, also used in queue key names
    pub fn as_secs(self) -> u64 {
        match self {
            MonitoringFrequency::TenSeconds => 10,
            MonitoringFrequency::ThirtySeconds => 30,
            MonitoringFrequency::OneMinute => 60,
            MonitoringFrequency::FiveMinutes => 300,
            MonitoringFrequency::ThirtyMinutes => 1800,
            MonitoringFrequency::OneHour => 3600,
            MonitoringFrequency::TwelveHours => 43_200,
            MonitoringFrequency::TwentyFourHours => 86_400,
        }
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.as_secs())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MonitoringFrequency::TenSeconds => "ten_seconds",
            MonitoringFrequency::ThirtySeconds => "thirty_seconds",
            MonitoringFrequency::OneMinute => "one_minute",
            MonitoringFrequency::FiveMinutes => "five_minutes",
            MonitoringFrequency::ThirtyMinutes => "thirty_minutes",
            MonitoringFrequency::OneHour => "one_hour",
            MonitoringFrequency::TwelveHours => "twelve_hours",
            MonitoringFrequency::TwentyFourHours => "twenty_four_hours",
        }
    }
}

impl fmt::Display for MonitoringFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitoringFrequency {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MonitoringFrequency::ALL
            .into_iter()
            .find(|frequency| frequency.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("monitoring frequency", s))
    }
}

/// HTTP method used to probe a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Patch => "patch",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "get" => Ok(HttpMethod::Get),
            "post" => Ok(HttpMethod::Post),
            "patch" => Ok(HttpMethod::Patch),
            "put" => Ok(HttpMethod::Put),
            "delete" => Ok(HttpMethod::Delete),
            _ => Err(ParseEnumError::new("http method", s)),
        }
    }
}

/// Health of a target as last recorded by the state transition handler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Registered but never probed
    #[default]
    Pending,
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Pending => "pending",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(HealthStatus::Pending),
            "healthy" => Ok(HealthStatus::Healthy),
            "unhealthy" => Ok(HealthStatus::Unhealthy),
            _ => Err(ParseEnumError::new("health status", s)),
        }
    }
}

/// Unit for incident window queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl WindowUnit {
    /// Length of `amount` units as a chrono duration
    pub fn span(self, amount: u32) -> chrono::Duration {
        let amount = i64::from(amount);
        match self {
            WindowUnit::Second => chrono::Duration::seconds(amount),
            WindowUnit::Minute => chrono::Duration::minutes(amount),
            WindowUnit::Hour => chrono::Duration::hours(amount),
            WindowUnit::Day => chrono::Duration::days(amount),
        }
    }
}

/// A registered endpoint under health monitoring
///
/// The JSON form of this struct is the snapshot cached in the pending-work queue, so probe
/// workers never have to hit the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub address: String,
    pub method: HttpMethod,
    pub frequency: MonitoringFrequency,
    pub contact: String,
    pub status: HealthStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering a new target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTarget {
    pub address: String,
    pub method: HttpMethod,
    pub frequency: MonitoringFrequency,
    pub contact: String,
}

/// Optional constraints for listing targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetFilter {
    pub method: Option<HttpMethod>,
    pub status: Option<HealthStatus>,
    pub frequency: Option<MonitoringFrequency>,
}

impl TargetFilter {
    pub fn frequency(frequency: MonitoringFrequency) -> Self {
        Self {
            frequency: Some(frequency),
            ..Self::default()
        }
    }

    pub fn matches(&self, target: &Target) -> bool {
        self.method.is_none_or(|method| method == target.method)
            && self.status.is_none_or(|status| status == target.status)
            && self
                .frequency
                .is_none_or(|frequency| frequency == target.frequency)
    }
}

/// A recorded downtime interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub target_id: TargetId,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Incident {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// One timestamped probe observation (append-only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSample {
    pub target_id: TargetId,
    pub success: bool,
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn frequency_seconds_match_names() {
        assert_eq!(MonitoringFrequency::TenSeconds.as_secs(), 10);
        assert_eq!(MonitoringFrequency::FiveMinutes.as_secs(), 300);
        assert_eq!(MonitoringFrequency::TwentyFourHours.as_secs(), 86_400);
    }

    #[test]
    fn frequency_parses_snake_case() {
        assert_eq!(
            "thirty_minutes".parse::<MonitoringFrequency>(),
            Ok(MonitoringFrequency::ThirtyMinutes)
        );
        assert!("every_second".parse::<MonitoringFrequency>().is_err());
    }

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!("PATCH".parse::<HttpMethod>(), Ok(HttpMethod::Patch));
        assert_eq!(reqwest::Method::from(HttpMethod::Delete), reqwest::Method::DELETE);
        assert!("trace".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn filter_matches_all_constraints() {
        let now = Utc::now();
        let target = Target {
            id: 1,
            address: "https://example.com".to_string(),
            method: HttpMethod::Get,
            frequency: MonitoringFrequency::OneMinute,
            contact: "ops@example.com".to_string(),
            status: HealthStatus::Healthy,
            created_at: now,
            updated_at: now,
        };

        assert!(TargetFilter::default().matches(&target));
        assert!(TargetFilter::frequency(MonitoringFrequency::OneMinute).matches(&target));
        assert!(!TargetFilter::frequency(MonitoringFrequency::OneHour).matches(&target));

        let filter = TargetFilter {
            status: Some(HealthStatus::Unhealthy),
            ..TargetFilter::default()
        };
        assert!(!filter.matches(&target));
    }

    #[test]
    fn snapshot_json_uses_snake_case_enums() {
        let now = Utc::now();
        let target = Target {
            id: 7,
            address: "http://localhost".to_string(),
            method: HttpMethod::Post,
            frequency: MonitoringFrequency::TwelveHours,
            contact: "a@b.c".to_string(),
            status: HealthStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["method"], "post");
        assert_eq!(json["frequency"], "twelve_hours");
        assert_eq!(json["status"], "pending");
    }
}
