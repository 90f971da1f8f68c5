//! Publish positions from a JSON file
//!
//! Usage: publish_positions <positions.json> [--every SECS]
//!
//! The file holds an array of positions:
//! `[{"device_id": "AA:BB:CC:DD:EE:FF", "lat": 51.5, "lon": -0.12}]`.
//! With `--every` the batch is re-sent on that interval until Ctrl+C.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use waypoint_realtime::bin_common::{
    load_session_config, parse_args, BinaryRunner, ConfigType, RunConfig, ShutdownManager,
};
use waypoint_realtime::waypoint::{init_tracing_with, PositionInput, PublisherSession};

struct Args {
    file: PathBuf,
    every: Option<Duration>,
}

fn parse(args: Vec<String>) -> Result<Args> {
    let mut file = None;
    let mut every = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--every" => {
                let secs: u64 = args
                    .next()
                    .context("--every needs a value")?
                    .parse()
                    .context("--every expects whole seconds")?;
                every = Some(Duration::from_secs(secs.max(1)));
            }
            _ if file.is_none() => file = Some(PathBuf::from(arg)),
            other => bail!("unexpected argument {other:?}"),
        }
    }

    Ok(Args {
        file: file.context("usage: publish_positions <positions.json> [--every SECS]")?,
        every,
    })
}

struct PublishPositions {
    run_config: RunConfig,
    publisher: PublisherSession,
    positions: Vec<PositionInput>,
    every: Option<Duration>,
    shutdown: ShutdownManager,
    rounds: usize,
}

impl PublishPositions {
    async fn publish_once(&mut self) {
        let result = self.publisher.send_batch(self.positions.clone()).await;
        self.rounds += 1;
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => warn!(error = %e, "Could not render batch result"),
        }
        if !result.success {
            warn!(sent = result.sent, failed = result.failed, "Batch had failures");
        }
    }
}

impl BinaryRunner for PublishPositions {
    async fn run(&mut self) -> Result<()> {
        self.publish_once().await;

        if let Some(every) = self.every {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = self.shutdown.wait() => break,
                    _ = ticker.tick() => self.publish_once().await,
                }
            }
        }

        self.publisher.disconnect().await;
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn stats(&self) -> Option<String> {
        Some(format!(
            "Rounds: {}, frames sent: {}",
            self.rounds,
            self.publisher.metrics().messages_sent
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse(parse_args())?;
    let config = load_session_config(ConfigType::Session)?;
    init_tracing_with(config.debug);

    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let positions: Vec<PositionInput> =
        serde_json::from_str(&raw).context("positions file must be a JSON array")?;
    info!(count = positions.len(), file = %args.file.display(), "Loaded positions");

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    let mut app = PublishPositions {
        run_config: RunConfig::new("Waypoint Position Publisher"),
        publisher: PublisherSession::new(config)?,
        positions,
        every: args.every,
        shutdown,
        rounds: 0,
    };
    app.execute().await
}
