pub mod actors;
pub mod analysis;
pub mod config;
pub mod events;
pub mod model;
pub mod notify;
pub mod queue;
pub mod runtime;
pub mod storage;
pub mod targets;

pub use model::{
    HealthSample, HealthStatus, HttpMethod, Incident, MonitoringFrequency, NewTarget, Target,
    TargetFilter, TargetId,
};
pub use runtime::WatchdogRuntime;
