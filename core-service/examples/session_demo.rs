//! Headless session walkthrough
//!
//! Opens a simulated source, scrubs forward, then lets it play to the end
//! while printing every session event.
//!
//! Run with:
//! ```bash
//! cargo run --example session_demo -p core-service
//!
//! # JSON logs
//! cargo run --example session_demo -p core-service -- json
//! ```

use bridge_traits::logging::LogLevel;
use bridge_traits::{AudioMetas, AudioType, MediaSource, NotificationSettings, Platform};
use core_playback::OpenRequest;
use core_runtime::events::PlayerEvent;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_service::{bootstrap_headless, CallOutcome, PlayerCall};
use std::env;
use std::time::Duration;

#[tokio::main]
async fn main() -> core_service::Result<()> {
    let format = match env::args().nth(1).as_deref() {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        _ => LogFormat::Pretty,
    };
    if let Err(err) = init_logging(
        LoggingConfig::default()
            .with_format(format)
            .with_level(LogLevel::Debug),
    ) {
        eprintln!("logging disabled: {err}");
    }

    let core = bootstrap_headless(Platform::Android).await?;
    let mut events = core.events().for_player("demo");
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("{:>28}  {:?}", event.event.description(), event.event);
            if event.event == PlayerEvent::Finished {
                break;
            }
        }
    });

    let metas = AudioMetas {
        title: Some("Demo track".to_string()),
        artist: Some("Simulated".to_string()),
        ..AudioMetas::default()
    };
    let request = OpenRequest::new(MediaSource::new(AudioType::Asset, "assets/demo.mp3"))
        .volume(0.8)
        .with_notification(NotificationSettings::default(), metas);

    if let CallOutcome::Opened { duration_ms } = core
        .dispatch("demo", PlayerCall::Open(Box::new(request)))
        .await?
    {
        println!("opened, duration {duration_ms} ms");
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    core.dispatch("demo", PlayerCall::ForwardRewind { speed: 4.0 })
        .await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    core.dispatch("demo", PlayerCall::Play).await?;

    if let CallOutcome::Snapshot(snapshot) = core.dispatch("demo", PlayerCall::Snapshot).await? {
        println!("snapshot: {snapshot:?}");
    }

    let _ = printer.await;
    core.shutdown().await;
    Ok(())
}
