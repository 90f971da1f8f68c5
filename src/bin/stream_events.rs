//! Stream live tracking events
//!
//! Connects a tracking session and prints every typed event until Ctrl+C.
//! The publisher side is connected too when a map is configured.
//!
//! Usage: stream_events [TYPE...]
//! where TYPE is POSITIONS, ZONE_ENTRY_EXIT, ZONE_STATS, ALERTS or ASSETS
//! (default: everything).

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::info;
use waypoint_realtime::bin_common::{
    load_session_config, parse_args, BinaryRunner, ConfigType, RunConfig, ShutdownManager,
};
use waypoint_realtime::waypoint::{
    init_tracing_with, ConnectOptions, EventName, StreamEvent, TrackingSession,
};

const PRINTED_EVENTS: [EventName; 9] = [
    EventName::Connected,
    EventName::Disconnected,
    EventName::Reconnecting,
    EventName::Error,
    EventName::Positions,
    EventName::ZoneEntryExit,
    EventName::ZoneStats,
    EventName::Alert,
    EventName::Asset,
];

struct StreamEvents {
    run_config: RunConfig,
    session: TrackingSession,
    types: Vec<String>,
    shutdown: ShutdownManager,
    lines: Sender<String>,
}

fn describe(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Connected => "connected".to_string(),
        StreamEvent::Disconnected { code, reason } => format!("disconnected ({code}) {reason}"),
        StreamEvent::Reconnecting { attempt, delay } => {
            format!("reconnecting: attempt {attempt} in {delay:?}")
        }
        StreamEvent::Error(e) => format!("error: {e}"),
        StreamEvent::Message(value) => format!("message: {value}"),
        StreamEvent::Positions(p) => {
            let devices: Vec<&str> = p
                .positions
                .iter()
                .filter_map(|pos| pos.user_uuid.as_deref())
                .collect();
            format!("positions: {} update(s) {:?}", p.positions.len(), devices)
        }
        StreamEvent::ZoneEntryExit(z) => format!(
            "zone {}: {} {}",
            z.zone_name.as_deref().or(z.zone_uuid.as_deref()).unwrap_or("?"),
            z.user_uuid.as_deref().unwrap_or("?"),
            z.event.as_deref().unwrap_or("?")
        ),
        StreamEvent::ZoneStats(z) => format!(
            "zone stats {}: {} present",
            z.zone_name.as_deref().or(z.zone_uuid.as_deref()).unwrap_or("?"),
            z.count.unwrap_or_default()
        ),
        StreamEvent::Alert(a) => format!(
            "alert [{}] {}",
            a.severity.as_deref().unwrap_or("-"),
            a.alert_type.as_deref().unwrap_or("?")
        ),
        StreamEvent::Asset(a) => format!("asset {}", a.asset_uuid.as_deref().unwrap_or("?")),
    }
}

/// Print lines off the async runtime
fn spawn_printer(lines: Receiver<String>) {
    thread::spawn(move || {
        for line in lines {
            println!("{}", line);
        }
    });
}

impl BinaryRunner for StreamEvents {
    async fn run(&mut self) -> Result<()> {
        for name in PRINTED_EVENTS {
            let lines = self.lines.clone();
            self.session.on(name, move |event| {
                let _ = lines.send(describe(event));
            });
        }

        self.session.connect(ConnectOptions::default()).await?;

        let names: Vec<&str> = self.types.iter().map(String::as_str).collect();
        let ack = self.session.subscribe_named(&names).await?;
        info!(types = ?ack.types, "Subscribed");

        let mut status = tokio::time::interval(Duration::from_secs(
            self.run_config.status_interval_secs,
        ));
        status.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.wait() => break,
                _ = status.tick() => {
                    let metrics = self.session.subscriber().metrics();
                    info!(
                        state = %metrics.connection_state,
                        received = metrics.messages_received,
                        reconnects = metrics.reconnect_count,
                        "Status"
                    );
                }
            }
        }

        self.session.disconnect().await;
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn stats(&self) -> Option<String> {
        let metrics = self.session.subscriber().metrics();
        Some(format!(
            "Messages received: {}, reconnects: {}",
            metrics.messages_received, metrics.reconnect_count
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_session_config(ConfigType::Session)?;
    init_tracing_with(config.debug);

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    let (lines, printer_rx) = unbounded();
    spawn_printer(printer_rx);

    let mut app = StreamEvents {
        run_config: RunConfig::new("Waypoint Event Stream"),
        session: TrackingSession::new(config)?,
        types: parse_args(),
        shutdown,
        lines,
    };
    app.execute().await
}
