//! Basic usage example for the alert manager

use timer_alerts::{
    AlertManager, CancellationToken, Duration, HostEvent, TargetFormat, CONFIG_TIMES_TO_REPORT,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let cancel_token = CancellationToken::new();

    // Create alert manager with configuration
    let (manager, mut handle) = AlertManager::new(
        "example_alert_manager".to_string(),
        Duration::from_millis(10), // heartbeat interval
        TargetFormat::MinutesSeconds,
        100, // command buffer size
        100, // event buffer size
        cancel_token.clone(),
    );

    // Spawn the manager task
    let manager_task = tokio::spawn(manager.run());

    // Report when the timer reaches 3 seconds and 1 second remaining
    let mut config = serde_json::Map::new();
    config.insert(CONFIG_TIMES_TO_REPORT.into(), "00:03,00:01".into());
    handle.config_update(config).await?;

    // Start a four-second countdown
    handle.timer_update(true, 4_000).await?;

    println!("Timer started! Waiting for alerts...");

    // Wait for both target offsets to be reached
    let mut reached_count = 0;
    while reached_count < 2 {
        if let Some(event) = handle.recv_event().await {
            match event {
                HostEvent::SendEvent { name, payload } => {
                    println!("{}: {}", name, payload);
                    reached_count += 1;
                }
                HostEvent::SetState(state) => {
                    println!("Display state: {:?}", state);
                }
            }
        }
    }

    // Stopping the timer cancels anything still armed
    handle.timer_update(false, 500).await?;
    println!("Timer paused!");

    // Shutdown gracefully
    handle.shutdown().await?;
    manager_task.await?;

    println!("Alert manager shut down successfully!");
    Ok(())
}
