use clap::Parser;
use fleet_core::wire::Framing;
use fleet_core::{FacilityMap, PlotGeometry, Room};
use serde::Deserialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 600;
const DEFAULT_PLOT_TICK_MS: u64 = 100;
const DEFAULT_STREAM_RETRIES: u32 = 3;
const DEFAULT_SNAPSHOT_PATH: &str = "workers.json";

#[derive(Parser, Debug, Default)]
#[command(name = "fleet-monitor")]
pub struct Args {
    /// host:port of the delta stream.
    #[arg(long, default_value = "")]
    pub stream_addr: String,
    /// Poll snapshots only, never open the stream.
    #[arg(long, default_value_t = false)]
    pub no_stream: bool,
    /// `lines` or `event-stream`.
    #[arg(long, default_value = "")]
    pub framing: String,
    #[arg(long, default_value = "")]
    pub snapshot: String,
    #[arg(long, default_value = "")]
    pub config: String,
    #[arg(long)]
    pub poll_interval: Option<u64>,
    #[arg(long)]
    pub plot_tick_ms: Option<u64>,
    #[arg(long)]
    pub stream_retries: Option<u32>,
    /// Start the throughput plot as soon as the stream opens.
    #[arg(long, default_value_t = false)]
    pub plot: bool,
}

/// Optional TOML config file. Every field falls back to flags, env or
/// defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub stream_addr: Option<String>,
    pub stream_enabled: Option<bool>,
    pub framing: Option<String>,
    pub snapshot_path: Option<PathBuf>,
    pub poll_interval_secs: Option<u64>,
    pub plot_tick_ms: Option<u64>,
    pub stream_retries: Option<u32>,
    pub plot_enabled: Option<bool>,
    pub plot: Option<PlotGeometry>,
    pub rooms: Vec<Room>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub stream_addr: Option<String>,
    pub stream_enabled: bool,
    pub framing: Framing,
    pub snapshot_path: PathBuf,
    pub poll_interval: Duration,
    pub plot_tick: Duration,
    pub plot: PlotGeometry,
    pub stream_retries: u32,
    pub plot_enabled: bool,
    pub facility: FacilityMap,
}

pub fn load_config(args: Args) -> io::Result<Config> {
    load_config_with(args, |key| std::env::var(key).ok())
}

/// Flags beat environment, environment beats the config file, and the file
/// beats built-in defaults.
pub fn load_config_with<F>(args: Args, env: F) -> io::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let config_path = non_empty(args.config.clone()).or_else(|| non_empty_env(&env, "FLEET_CONFIG"));
    let file = match config_path {
        Some(path) => load_file_config(Path::new(&path))?,
        None => FileConfig::default(),
    };

    let stream_addr = non_empty(args.stream_addr)
        .or_else(|| non_empty_env(&env, "FLEET_STREAM_ADDR"))
        .or(file.stream_addr.and_then(non_empty));
    let stream_enabled = if args.no_stream {
        false
    } else {
        env("FLEET_STREAM_ENABLED")
            .and_then(|value| parse_bool_flag(&value))
            .or(file.stream_enabled)
            .unwrap_or(true)
    };
    let framing_name = non_empty(args.framing).or(file.framing);
    let framing = match framing_name {
        Some(name) => parse_framing(&name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown stream framing '{name}'"),
            )
        })?,
        None => Framing::default(),
    };
    let snapshot_path = non_empty(args.snapshot)
        .or_else(|| non_empty_env(&env, "FLEET_SNAPSHOT_PATH"))
        .map(PathBuf::from)
        .or(file.snapshot_path)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH));
    let poll_secs = args
        .poll_interval
        .or(file.poll_interval_secs)
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
        .max(1);
    let plot_tick_ms = args
        .plot_tick_ms
        .or(file.plot_tick_ms)
        .unwrap_or(DEFAULT_PLOT_TICK_MS)
        .max(1);
    let plot = file.plot.unwrap_or_default();
    if plot.width == 0 || plot.height == 0 || plot.pixels_per_second <= 0.0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "plot width, height and pixels_per_second must be positive",
        ));
    }

    Ok(Config {
        stream_addr,
        stream_enabled,
        framing,
        snapshot_path,
        poll_interval: Duration::from_secs(poll_secs),
        plot_tick: Duration::from_millis(plot_tick_ms),
        plot,
        stream_retries: args
            .stream_retries
            .or(file.stream_retries)
            .unwrap_or(DEFAULT_STREAM_RETRIES),
        plot_enabled: args.plot || file.plot_enabled.unwrap_or(false),
        facility: FacilityMap::new(file.rooms),
    })
}

fn load_file_config(path: &Path) -> io::Result<FileConfig> {
    let contents = fs::read_to_string(path)?;
    toml::from_str(&contents).map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: {err}", path.display()),
        )
    })
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_framing(value: &str) -> Option<Framing> {
    match value.trim().to_ascii_lowercase().as_str() {
        "lines" | "ndjson" => Some(Framing::Lines),
        "event-stream" | "sse" => Some(Framing::EventStream),
        _ => None,
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn non_empty_env<F>(env: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    env(key).and_then(non_empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_flags_env_or_file() {
        let config = load_config_with(Args::default(), env_from(&[])).expect("config");
        assert_eq!(config.stream_addr, None);
        assert!(config.stream_enabled);
        assert_eq!(config.framing, Framing::Lines);
        assert_eq!(config.snapshot_path, PathBuf::from("workers.json"));
        assert_eq!(config.poll_interval, Duration::from_secs(600));
        assert_eq!(config.plot_tick, Duration::from_millis(100));
        assert_eq!(config.plot, PlotGeometry::default());
        assert_eq!(config.stream_retries, 3);
        assert!(!config.plot_enabled);
        assert!(config.facility.is_empty());
    }

    #[test]
    fn parse_bool_flag_accepts_common_values() {
        assert_eq!(parse_bool_flag("1"), Some(true));
        assert_eq!(parse_bool_flag(" On "), Some(true));
        assert_eq!(parse_bool_flag("no"), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }

    #[test]
    fn flags_beat_env_and_env_beats_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
stream_addr = "file-host:9000"
snapshot_path = "/srv/file.json"
poll_interval_secs = 30
stream_enabled = true
framing = "event-stream"

[plot]
width = 300
height = 80
pixels_per_second = 5.0

[[rooms]]
name = "lab"
nodes = ["n1", "n2"]
"#
        )
        .expect("write config");
        let path = file.path().to_string_lossy().to_string();

        let args = Args {
            stream_addr: "flag-host:9100".to_string(),
            poll_interval: Some(5),
            ..Args::default()
        };
        let env = env_from(&[
            ("FLEET_CONFIG", path.as_str()),
            ("FLEET_STREAM_ADDR", "env-host:9200"),
            ("FLEET_SNAPSHOT_PATH", "/srv/env.json"),
            ("FLEET_STREAM_ENABLED", "off"),
        ]);
        let config = load_config_with(args, env).expect("config");

        assert_eq!(config.stream_addr.as_deref(), Some("flag-host:9100"));
        assert_eq!(config.snapshot_path, PathBuf::from("/srv/env.json"));
        assert!(!config.stream_enabled);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.framing, Framing::EventStream);
        assert_eq!(config.plot.width, 300);
        assert_eq!(config.plot.pixels_per_second, 5.0);
        assert_eq!(config.facility.room_of("n2"), Some("lab"));
    }

    #[test]
    fn no_stream_flag_wins_over_env() {
        let args = Args {
            no_stream: true,
            ..Args::default()
        };
        let config =
            load_config_with(args, env_from(&[("FLEET_STREAM_ENABLED", "1")])).expect("config");
        assert!(!config.stream_enabled);
    }

    #[test]
    fn unreadable_or_invalid_config_is_an_error() {
        let args = Args {
            config: "/definitely/not/here.toml".to_string(),
            ..Args::default()
        };
        assert!(load_config_with(args, env_from(&[])).is_err());

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "poll_interval_secs = \"soon\"").expect("write config");
        let args = Args {
            config: file.path().to_string_lossy().to_string(),
            ..Args::default()
        };
        let err = load_config_with(args, env_from(&[])).expect_err("invalid toml");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn unknown_framing_is_rejected() {
        let args = Args {
            framing: "carrier-pigeon".to_string(),
            ..Args::default()
        };
        let err = load_config_with(args, env_from(&[])).expect_err("bad framing");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
