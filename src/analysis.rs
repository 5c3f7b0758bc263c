//! Uptime report for a single target

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::model::{HealthStatus, Target, TargetId, WindowUnit};
use crate::storage::{HealthSampleStore, IncidentStore, StorageResult, TargetRegistry};

/// Windows (in days) incident counts are reported for
pub const INCIDENT_WINDOWS_DAYS: [u32; 4] = [1, 7, 30, 365];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UptimeReport {
    pub target: Target,

    /// Time since the status was last different, or since registration
    pub in_current_state: Duration,

    /// Time since the most recent sample, `None` if never probed
    pub since_last_check: Option<Duration>,

    /// Pairs of window length in days and incidents opened within it
    pub incident_counts: Vec<(u32, u64)>,
}

pub async fn analyze(
    registry: &dyn TargetRegistry,
    samples: &dyn HealthSampleStore,
    incidents: &dyn IncidentStore,
    id: TargetId,
    now: DateTime<Utc>,
) -> StorageResult<UptimeReport> {
    let target = registry.find_by_id(id).await?;

    // the state began right after the last sample with the opposite outcome
    let opposite = match target.status {
        HealthStatus::Healthy => Some(false),
        HealthStatus::Unhealthy => Some(true),
        HealthStatus::Pending => None,
    };
    let state_started = match opposite {
        Some(success) => samples
            .latest_with_outcome(id, success)
            .await?
            .map(|sample| sample.observed_at),
        None => None,
    };
    let in_current_state = now - state_started.unwrap_or(target.created_at);

    let since_last_check = samples
        .latest(id)
        .await?
        .map(|sample| now - sample.observed_at);

    let mut incident_counts = Vec::with_capacity(INCIDENT_WINDOWS_DAYS.len());
    for days in INCIDENT_WINDOWS_DAYS {
        let count = incidents
            .count_in_window(id, days, WindowUnit::Day, now)
            .await?;
        incident_counts.push((days, count));
    }

    Ok(UptimeReport {
        target,
        in_current_state,
        since_last_check,
        incident_counts,
    })
}

/// `1d 2h 3m 4s`, omitting leading zero units
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        (total % 86_400) / 3600,
        (total % 3600) / 60,
        total % 60,
    );

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if days > 0 || hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if days > 0 || hours > 0 || minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    parts.push(format!("{seconds}s"));
    parts.join(" ")
}

impl fmt::Display for UptimeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Target #{}: {}", self.target.id, self.target.address)?;
        writeln!(f, "Status: {}", self.target.status)?;

        match self.target.status {
            HealthStatus::Healthy => {
                writeln!(f, "Up for: {}", format_duration(self.in_current_state))?
            }
            HealthStatus::Unhealthy => {
                writeln!(f, "Down for: {}", format_duration(self.in_current_state))?
            }
            HealthStatus::Pending => writeln!(f, "No check has been performed yet")?,
        }

        if let Some(ago) = self.since_last_check {
            writeln!(f, "Last checked: {} ago", format_duration(ago))?;
        }

        for (days, count) in &self.incident_counts {
            let label = if *days == 1 {
                "24 hours".to_string()
            } else {
                format!("{days} days")
            };
            writeln!(f, "Incidents in the last {label}: {count}")?;
        }
        Ok(())
    }
}
