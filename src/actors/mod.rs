//! Actor-based probe pipeline
//!
//! Each actor runs as an independent async task communicating via bounded Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!                 ┌──────────────────┐
//!                 │    Scheduler     │  one tick loop per frequency
//!                 └────────┬─────────┘
//!                          │ signal (dropped while busy)
//!              ┌───────────┴───────────┐
//!              ▼                       ▼
//!      ┌───────────────┐       ┌───────────────┐
//!      │ DispatchGroup │  ...  │ DispatchGroup │  LLEN + LRANGE, chunk ids
//!      │    (10s)      │       │    (1h)       │
//!      └───────┬───────┘       └───────┬───────┘
//!              │ bounded distribution queue
//!              ▼                       ▼
//!      ┌───────────────┐       ┌───────────────┐
//!      │  ProbePool    │       │  ProbePool    │  N workers, HTTP probes
//!      └───────┬───────┘       └───────┬───────┘
//!              └───────────┬───────────┘
//!                          │ bounded intake
//!                 ┌────────▼─────────┐
//!                 │ ResultAggregator │  size + time flush
//!                 └────────┬─────────┘
//!                          │ ProbeEvent
//!                 ┌────────▼─────────┐
//!                 │     EventBus     │  → HealthTransitionHandler
//!                 └──────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Dispatch groups and the aggregator take mpsc commands
//! 2. **Backpressure**: Every hop is a bounded queue; a full queue blocks its producer
//! 3. **Request/Response**: oneshot channels for reports and stats
//!
//! A single `CancellationToken` stops every loop.

pub mod aggregator;
pub mod dispatch;
pub mod messages;
pub mod probe;
pub mod scheduler;
