//! Domain events and their subscribers

pub mod bus;
pub mod handlers;

pub use bus::{BusStats, EventBus, EventHandler, EventKind, ProbeEvent};
pub use handlers::{HealthTransitionHandler, IncidentAction, Transition, transition};
