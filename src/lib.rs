//! # Timer Alerts
//!
//! An asynchronous alert scheduler for show-control countdown timers, built on top of Tokio.
//!
//! A show-control host pushes timer updates (running state and total duration) and
//! configuration text (a comma-separated list of target offsets) into this library; the
//! library fires a one-shot "Time reached" notification exactly once per target offset
//! per show, at the moment the live timer value crosses that offset. The timer may be
//! rewound, fast-forwarded, paused, or stopped exactly on a target offset at any time.
//!
//! ## Features
//!
//! - **Asynchronous**: Built on Tokio; a single task owns all scheduling state
//! - **Clear-and-rebuild arming**: Every timer or target change cancels and re-arms all
//!   pending alerts, eliminating stale-timer races
//! - **Skip-past detection**: Offsets jumped over by a manual timer adjustment can still
//!   be reported (policy flag)
//! - **Per-show dedup**: Each offset reports at most once per show unless overridden
//!   (policy flag), with an explicit show-reset message
//! - **Bounded Channels**: Configurable buffer sizes for command and event handling
//! - **Graceful Shutdown**: Support for cancellation tokens and clean shutdowns
//! - **Comprehensive Logging**: Built-in logging for debugging and monitoring
//!
//! ## Quick Start
//!
//! ```rust
//! use timer_alerts::{AlertManager, HostEvent, TargetFormat};
//! use tokio_util::sync::CancellationToken;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cancel_token = CancellationToken::new();
//!
//!     // Create alert manager with configuration
//!     let (manager, mut handle) = AlertManager::new(
//!         "my_alert_manager".to_string(),
//!         Duration::from_millis(10),    // heartbeat interval
//!         TargetFormat::MinutesSeconds, // how this deployment writes offsets
//!         100,                          // command buffer size
//!         100,                          // event buffer size
//!         cancel_token.clone(),
//!     );
//!
//!     // Spawn the manager task
//!     tokio::spawn(manager.run());
//!
//!     // Configure a target offset and start a two-minute timer
//!     let mut config = serde_json::Map::new();
//!     config.insert("Times to report".into(), "01:30".into());
//!     handle.config_update(config).await?;
//!     handle.timer_update(true, 120_000).await?;
//!
//!     // The display-state publish arrives first; a "Time reached" event
//!     // for "01:30" follows 30 seconds into the run
//!     if let Some(HostEvent::SetState(state)) = handle.recv_event().await {
//!         println!("Timer state: {:?}", state);
//!     }
//!
//!     // Shutdown gracefully
//!     handle.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod manager;
mod scheduler;
mod target;

pub use manager::{
    AlertCommand, AlertError, AlertHandle, AlertManager, HostEvent, CONFIG_ALLOW_MULTIPLE_REPORTS,
    CONFIG_REPORT_IF_SKIPPED_PAST, CONFIG_TIMESTAMPS_TO_REPORT, CONFIG_TIMES_TO_REPORT,
    EVENT_TIME_REACHED, STATE_TIMER_STATE,
};
pub use scheduler::{AlertScheduler, TimerState};
pub use target::{TargetFormat, TargetOffset, TargetSet};

// Re-export commonly used types for convenience
pub use std::time::Duration;
pub use tokio_util::sync::CancellationToken;
