use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::scheduler::AlertScheduler;
use crate::target::{TargetFormat, TargetOffset, TargetSet};

/// Configuration key carrying the raw target text in `MM:SS` deployments.
pub const CONFIG_TIMES_TO_REPORT: &str = "Times to report";
/// Configuration key carrying the raw target text in bare-second deployments.
pub const CONFIG_TIMESTAMPS_TO_REPORT: &str = "Timestamps to report";
/// Configuration key for the skip-past reporting policy.
pub const CONFIG_REPORT_IF_SKIPPED_PAST: &str = "Report if skipped past";
/// Configuration key for the per-show dedup policy.
pub const CONFIG_ALLOW_MULTIPLE_REPORTS: &str = "Allow multiple reports per show";

/// Event name sent to the host when a target offset is reached.
pub const EVENT_TIME_REACHED: &str = "Time reached";
/// Display-state key published on every timer update.
pub const STATE_TIMER_STATE: &str = "Timer State";

/// Commands accepted by the alert manager.
#[derive(Debug, Clone)]
pub enum AlertCommand {
    /// A (possibly partial) configuration delivery from the host. Absent
    /// keys leave current values unchanged.
    ConfigUpdate(Map<String, Value>),
    /// A raw host message, tagged by its `"type"` field. Unrecognized
    /// messages are dropped.
    Message(Value),
    Shutdown,
}

/// Outbound notifications to the host. Fire-and-forget: delivery is not
/// guaranteed and never retried.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// `sendEvent(name, payload)` on the host connection.
    SendEvent { name: String, payload: Value },
    /// `setState(state)` on the host connection, best effort.
    SetState(HashMap<String, String>),
}

/// Errors returned from [`AlertHandle`] operations.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert manager is no longer running")]
    ManagerGone,
    #[error("alert manager command channel is full")]
    ChannelFull,
}

impl<T> From<mpsc::error::SendError<T>> for AlertError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        AlertError::ManagerGone
    }
}

impl<T> From<mpsc::error::TrySendError<T>> for AlertError {
    fn from(err: mpsc::error::TrySendError<T>) -> Self {
        match err {
            mpsc::error::TrySendError::Full(_) => AlertError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => AlertError::ManagerGone,
        }
    }
}

/// Host messages the manager understands; everything else is ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum HostMessage {
    #[serde(rename = "show_reset")]
    ShowReset,
    #[serde(rename = "adjustable_timer_update")]
    AdjustableTimerUpdate {
        ticking: bool,
        #[serde(rename = "durationMillis")]
        duration_millis: u64,
    },
}

/// Alert manager task: owns all scheduling state and processes commands,
/// heartbeat ticks and cancellation from a single `tokio::select!` loop.
pub struct AlertManager {
    /// Instance name for logging
    name: String,

    /// Channel for receiving commands from the host glue
    command_rx: mpsc::Receiver<AlertCommand>,

    /// Channel for sending notifications back to the host glue
    event_tx: mpsc::Sender<HostEvent>,

    /// Scheduling core: timer state, targets, pending alerts, dedup set
    scheduler: AlertScheduler,

    /// Parsing strategy and outbound payload convention for this deployment
    target_format: TargetFormat,

    /// Heartbeat interval for due-alert checks
    heartbeat_interval: Duration,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,
}

/// Handle for controlling the alert manager
pub struct AlertHandle {
    command_tx: mpsc::Sender<AlertCommand>,
    event_rx: mpsc::Receiver<HostEvent>,
}

impl AlertManager {
    /// Create a new AlertManager with bounded channels
    ///
    /// # Arguments
    /// * `name` - Manager instance name
    /// * `heartbeat_interval` - How often to check for due alerts
    /// * `target_format` - How this deployment writes its target offsets
    /// * `command_buffer_size` - Size of command channel buffer
    /// * `event_buffer_size` - Size of event channel buffer
    ///
    /// Returns (AlertManager, AlertHandle)
    pub fn new(
        name: String,
        heartbeat_interval: Duration,
        target_format: TargetFormat,
        command_buffer_size: usize,
        event_buffer_size: usize,
        cancel_token: CancellationToken,
    ) -> (Self, AlertHandle) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer_size);
        let (event_tx, event_rx) = mpsc::channel(event_buffer_size);

        let manager = AlertManager {
            name,
            command_rx,
            event_tx,
            scheduler: AlertScheduler::new(),
            target_format,
            heartbeat_interval,
            cancel_token,
        };

        let handle = AlertHandle {
            command_tx,
            event_rx,
        };

        (manager, handle)
    }

    /// Run the alert manager
    pub async fn run(mut self) {
        let mut heartbeat = interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!("Alert manager '{}' started", self.name);

        loop {
            tokio::select! {
                // Handle incoming commands
                Some(command) = self.command_rx.recv() => {
                    match command {
                        _ if self.cancel_token.is_cancelled() => {
                            log::info!("Alert manager '{}' cancelled", self.name);
                            break;
                        }
                        _ => {
                            let shutdown = self.handle_command(command);
                            if shutdown {
                                break;
                            }
                        }
                    }
                },

                // Fire alerts whose instant has been reached
                _ = heartbeat.tick() => {
                    let fired = self.scheduler.collect_due(Instant::now());
                    self.send_alerts(fired);
                },

                // Handle cancellation token
                _ = self.cancel_token.cancelled() => {
                    log::info!("Alert manager '{}' cancelled via token", self.name);
                    break;
                },

                // All senders dropped
                else => {
                    log::info!("Alert manager '{}' shutting down - all senders dropped", self.name);
                    break;
                }
            }
        }

        log::info!("Alert manager '{}' stopped", self.name);
    }

    /// Handle a command, returning true on shutdown
    fn handle_command(&mut self, command: AlertCommand) -> bool {
        match command {
            AlertCommand::ConfigUpdate(config) => {
                self.handle_config_update(&config);
                false
            }
            AlertCommand::Message(message) => {
                self.handle_message(message);
                false
            }
            AlertCommand::Shutdown => true,
        }
    }

    fn handle_config_update(&mut self, config: &Map<String, Value>) {
        if let Some(flag) = config
            .get(CONFIG_REPORT_IF_SKIPPED_PAST)
            .and_then(Value::as_bool)
        {
            self.scheduler.report_if_skipped_past = flag;
        }

        if let Some(flag) = config
            .get(CONFIG_ALLOW_MULTIPLE_REPORTS)
            .and_then(Value::as_bool)
        {
            self.scheduler.allow_multiple_reports_per_show = flag;
        }

        // Either key spelling replaces the target set wholesale and re-arms.
        // Flags-only deliveries leave the arm set alone.
        let raw_targets = config
            .get(CONFIG_TIMES_TO_REPORT)
            .or_else(|| config.get(CONFIG_TIMESTAMPS_TO_REPORT))
            .and_then(Value::as_str);
        if let Some(text) = raw_targets {
            let targets = TargetSet::parse(text, self.target_format);
            log::debug!(
                "Alert manager '{}' replacing targets ({} valid)",
                self.name,
                targets.len()
            );
            self.scheduler.set_targets(targets);
            let fired = self.scheduler.recompute(Instant::now());
            self.send_alerts(fired);
        }
    }

    fn handle_message(&mut self, message: Value) {
        match serde_json::from_value::<HostMessage>(message) {
            Ok(HostMessage::ShowReset) => {
                log::info!("Alert manager '{}' show reset", self.name);
                self.scheduler.show_reset();
            }
            Ok(HostMessage::AdjustableTimerUpdate {
                ticking,
                duration_millis,
            }) => {
                let now = Instant::now();
                self.scheduler.update_timer(ticking, duration_millis, now);
                self.publish_timer_state(ticking);
                let fired = self.scheduler.recompute(now);
                self.send_alerts(fired);
            }
            Err(err) => {
                log::debug!(
                    "Alert manager '{}' ignoring unrecognized message: {}",
                    self.name,
                    err
                );
            }
        }
    }

    fn publish_timer_state(&self, ticking: bool) {
        let state = HashMap::from([(
            STATE_TIMER_STATE.to_string(),
            if ticking { "Ticking" } else { "Paused" }.to_string(),
        )]);
        self.emit(HostEvent::SetState(state));
    }

    fn send_alerts(&self, fired: Vec<TargetOffset>) {
        for offset in fired {
            self.emit(HostEvent::SendEvent {
                name: EVENT_TIME_REACHED.to_string(),
                payload: offset.payload(self.target_format),
            });
        }
    }

    /// Fire-and-forget emission toward the host glue. Uses try_send so the
    /// event loop never blocks on a slow consumer.
    fn emit(&self, event: HostEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(event) => {
                    log::warn!(
                        "Event channel full, dropping {:?} from manager '{}'",
                        event,
                        self.name
                    );
                }
                mpsc::error::TrySendError::Closed(event) => {
                    log::warn!(
                        "Event channel closed, cannot send {:?} from manager '{}'",
                        event,
                        self.name
                    );
                }
            }
        }
    }
}

impl AlertHandle {
    /// Deliver a configuration update
    pub async fn config_update(&self, config: Map<String, Value>) -> Result<(), AlertError> {
        self.command_tx
            .send(AlertCommand::ConfigUpdate(config))
            .await?;
        Ok(())
    }

    /// Deliver a configuration update (non-blocking)
    pub fn try_config_update(&self, config: Map<String, Value>) -> Result<(), AlertError> {
        self.command_tx
            .try_send(AlertCommand::ConfigUpdate(config))?;
        Ok(())
    }

    /// Deliver a raw host message
    pub async fn message(&self, message: Value) -> Result<(), AlertError> {
        self.command_tx.send(AlertCommand::Message(message)).await?;
        Ok(())
    }

    /// Deliver a raw host message (non-blocking)
    pub fn try_message(&self, message: Value) -> Result<(), AlertError> {
        self.command_tx.try_send(AlertCommand::Message(message))?;
        Ok(())
    }

    /// Deliver an adjustable timer update
    pub async fn timer_update(&self, ticking: bool, duration_millis: u64) -> Result<(), AlertError> {
        self.message(json!({
            "type": "adjustable_timer_update",
            "ticking": ticking,
            "durationMillis": duration_millis,
        }))
        .await
    }

    /// Clear the per-show dedup state
    pub async fn show_reset(&self) -> Result<(), AlertError> {
        self.message(json!({ "type": "show_reset" })).await
    }

    /// Shutdown the alert manager
    pub async fn shutdown(&self) -> Result<(), AlertError> {
        self.command_tx.send(AlertCommand::Shutdown).await?;
        Ok(())
    }

    /// Shutdown the alert manager (non-blocking)
    pub fn try_shutdown(&self) -> Result<(), AlertError> {
        self.command_tx.try_send(AlertCommand::Shutdown)?;
        Ok(())
    }

    /// Receive the next host notification (blocking)
    pub async fn recv_event(&mut self) -> Option<HostEvent> {
        self.event_rx.recv().await
    }

    /// Try to receive a host notification (non-blocking)
    pub fn try_recv_event(&mut self) -> Result<HostEvent, mpsc::error::TryRecvError> {
        self.event_rx.try_recv()
    }
}
