mod config;
mod console;
mod source;
mod stream;

use clap::Parser;
use config::{load_config, parse_bool_flag, Args, Config};
use console::{node_line, render_table, ConsoleObserver};
use fleet_core::{FacilityMap, PollAction, Session, SystemClock, TimeSource};
use std::{error::Error, io, path::Path};
use stream::{stream_loop, StreamConfig, StreamEvent};
use tokio::{sync::mpsc, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, trace};
use tracing_subscriber::EnvFilter;

const STREAM_QUEUE_CAPACITY: usize = 256;

type MonitorSession = Session<SystemClock, ConsoleObserver>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = load_config(Args::parse())?;
    init_logging();
    info!(
        event = "startup",
        stream_addr = config.stream_addr.as_deref().unwrap_or(""),
        stream_enabled = config.stream_enabled,
        snapshot_path = %config.snapshot_path.display()
    );

    let mut session = Session::new(SystemClock, config.plot, ConsoleObserver::default());
    let (stream_tx, mut stream_rx) = mpsc::channel(STREAM_QUEUE_CAPACITY);
    let mut stream_task = spawn_stream(&config, &mut session, stream_tx);

    let mut poll_ticker = tokio::time::interval(config.poll_interval);
    poll_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut plot_ticker = tokio::time::interval(config.plot_tick);
    plot_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = poll_ticker.tick() => {
                if session.on_poll_tick() == PollAction::Fetch {
                    refresh_snapshot(&mut session, &config.snapshot_path).await;
                }
            }
            _ = plot_ticker.tick() => {
                let pixels = session.plot_tick();
                if pixels > 0 {
                    trace!(event = "plot_slide", pixels, samples = session.plot().len());
                }
            }
            Some(event) = stream_rx.recv() => {
                if handle_stream_event(&mut session, &config, event) == Some(PollAction::Fetch) {
                    // The stream loop has given up; make sure it is gone before polling.
                    if let Some(task) = stream_task.take() {
                        task.abort();
                    }
                    refresh_snapshot(&mut session, &config.snapshot_path).await;
                }
            }
            _ = &mut shutdown => {
                info!(event = "shutdown");
                break;
            }
        }
        report(&mut session, &config.facility);
    }

    if let Some(task) = stream_task.take() {
        task.abort();
    }
    Ok(())
}

fn spawn_stream(
    config: &Config,
    session: &mut MonitorSession,
    tx: mpsc::Sender<StreamEvent>,
) -> Option<JoinHandle<()>> {
    if !config.stream_enabled {
        return None;
    }
    let addr = config.stream_addr.clone()?;
    session.on_stream_connecting();
    let stream_config = StreamConfig {
        addr,
        framing: config.framing,
        retries: config.stream_retries,
    };
    Some(tokio::spawn(stream_loop(stream_config, tx)))
}

fn handle_stream_event<C: TimeSource>(
    session: &mut Session<C, ConsoleObserver>,
    config: &Config,
    event: StreamEvent,
) -> Option<PollAction> {
    match event {
        StreamEvent::Opened => {
            session.on_stream_open();
            // A reconnect keeps the history already plotted.
            if config.plot_enabled && !session.plot().is_running() {
                session.plot_start();
            }
            None
        }
        StreamEvent::Message(line) => {
            if let Some(update) = session.on_stream_message(&line) {
                debug!(event = "plot_update", update = ?update);
            }
            None
        }
        StreamEvent::Error { recovering } => session.on_stream_error(recovering),
    }
}

async fn refresh_snapshot<C: TimeSource>(session: &mut Session<C, ConsoleObserver>, path: &Path) {
    match source::fetch_snapshot(path).await {
        Ok(snapshot) => session.apply_snapshot(snapshot),
        Err(err) => session.on_snapshot_error(&err),
    }
}

fn report<C: TimeSource>(session: &mut Session<C, ConsoleObserver>, facility: &FacilityMap) {
    if session.observer_mut().take_refresh() {
        println!("{}", render_table(session, facility));
    }
    for id in session.observer_mut().take_changed() {
        println!("{}", node_line(session, &id));
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_enabled = std::env::var("FLEET_LOG_STDOUT")
        .ok()
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(true);
    if stdout_enabled {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}
