//! livesync agent - headless sync device
//!
//! Runs the sync core against a real coordination server with a simulated
//! player. Useful for soak tests and for watching what a device would do.
//!
//! Usage:
//!   livesync-agent --server http://10.0.0.5:3000 --stream http://10.0.0.5:8096/ekat/stream.m3u8
//!   livesync-agent --device-id tv-lobby-1 --probe http://10.0.0.1:80
//!
//! `LIVESYNC_SERVER`, `LIVESYNC_STREAM` and `LIVESYNC_DEVICE_ID` are read when
//! the matching flag is absent.

mod player;
mod probe;

use chrono::{DateTime, Local, TimeZone};
use livesync_core::network::{AlwaysOnline, NETWORK_CHECK_INTERVAL};
use livesync_core::{DeviceId, HttpAuthority, NetworkMonitor, StatusReport, SyncConfig, SyncLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use player::SimulatedPlayer;
use probe::TcpProbe;

/// How often the simulated player reports its position
const POSITION_REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
struct Options {
    server: String,
    stream: String,
    device_id: Option<String>,
    poll_interval: Option<Duration>,
    probe: Option<String>,
}

impl Options {
    /// Parse flags, falling back to environment variables through `env`
    fn parse(args: &[String], env: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let flag = |name: &str| -> Option<String> {
            args.iter()
                .position(|a| a == name)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };

        let server = flag("--server")
            .or_else(|| env("LIVESYNC_SERVER"))
            .ok_or("missing --server (or LIVESYNC_SERVER)")?;
        let stream = flag("--stream")
            .or_else(|| env("LIVESYNC_STREAM"))
            .ok_or("missing --stream (or LIVESYNC_STREAM)")?;
        let device_id = flag("--device-id").or_else(|| env("LIVESYNC_DEVICE_ID"));
        let poll_interval = match flag("--poll-ms") {
            Some(raw) => Some(Duration::from_millis(
                raw.parse().map_err(|_| format!("invalid --poll-ms '{}'", raw))?,
            )),
            None => None,
        };

        Ok(Self {
            server,
            stream,
            device_id,
            poll_interval,
            probe: flag("--probe"),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,livesync_core=debug,hyper_util=off,reqwest=off,hyper=off")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();
    let options = Options::parse(&args, |key| std::env::var(key).ok())?;

    let mut config = SyncConfig::new(&options.server, &options.stream);
    if let Some(interval) = options.poll_interval {
        config = config.with_poll_interval(interval);
    }

    let device_id = match options.device_id.as_deref() {
        Some(raw) => DeviceId::parse(raw).ok_or_else(|| format!("invalid device id '{}'", raw))?,
        None => DeviceId::random(),
    };

    let started_at = Local::now();
    let authority = Arc::new(HttpAuthority::new(&config)?);
    let (events_tx, events_rx) = mpsc::channel(64);
    let player = Arc::new(SimulatedPlayer::new(events_tx));

    let (monitor, network) = NetworkMonitor::new(true);
    let monitor = Arc::new(monitor);
    let probe_task = match options.probe.as_deref() {
        Some(url) => {
            let probe = TcpProbe::for_url(url)?;
            info!("Probing network via {}", probe.target());
            monitor.clone().spawn_probe(Arc::new(probe), NETWORK_CHECK_INTERVAL)
        }
        None => monitor.clone().spawn_probe(Arc::new(AlwaysOnline), NETWORK_CHECK_INTERVAL),
    };

    let sync = Arc::new(SyncLoop::new(config, device_id, authority, player.clone(), network)?);
    info!("Device {} following {} sessions", sync.device_id(), sync.city());

    let events_task = sync.spawn_player_events(events_rx);
    let reports_task = player.spawn_position_reports(POSITION_REPORT_INTERVAL);
    let status_task = tokio::spawn(log_status(sync.subscribe()));
    let handle = sync.spawn();

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    handle.join().await;
    reports_task.abort();
    probe_task.abort();
    status_task.abort();
    events_task.abort();

    let stats = player.stats();
    let uptime = Local::now().signed_duration_since(started_at);
    info!(
        "Ran {}s: {} loads, {} seeks, {} speed changes, final speed {}",
        uptime.num_seconds(),
        stats.loads,
        stats.seeks,
        stats.speed_changes,
        player.speed()
    );

    Ok(())
}

/// Log every status change on one line
async fn log_status(mut rx: watch::Receiver<StatusReport>) {
    while rx.changed().await.is_ok() {
        let report = rx.borrow_and_update().clone();
        let line = status_line(&report);
        if report.status.is_failure() {
            warn!("{}", line);
        } else {
            info!("{}", line);
        }
    }
}

fn status_line(report: &StatusReport) -> String {
    let mut line = format!(
        "[{}] {} | offset {:+}ms | {}/{} ready | {} active",
        report.phase,
        report.status,
        report.clock_offset_ms,
        report.confirmed_devices,
        report.required_devices,
        report.active_devices
    );
    if let Some(start) = report.start_at_ms.and_then(format_server_time) {
        line.push_str(&format!(" | start {}", start));
    }
    if let Some(drift) = report.last_drift_ms {
        line.push_str(&format!(" | drift {:+}ms", drift));
    }
    if let Some(error) = &report.error_message {
        line.push_str(&format!(" | {}", error));
    }
    if let Some(notice) = &report.notice {
        line.push_str(&format!(" | {}", notice));
    }
    line
}

/// Server timestamp as local wall-clock time
fn format_server_time(ms: i64) -> Option<String> {
    let at: DateTime<Local> = Local.timestamp_millis_opt(ms).single()?;
    Some(at.format("%H:%M:%S%.3f").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use livesync_core::SyncStatus;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flags_win_over_env() {
        let options = Options::parse(
            &args(&["agent", "--server", "http://a:3000", "--poll-ms", "500"]),
            |key| match key {
                "LIVESYNC_SERVER" => Some("http://env:3000".into()),
                "LIVESYNC_STREAM" => Some("http://env:8096/ekat/stream.m3u8".into()),
                _ => None,
            },
        )
        .unwrap();

        assert_eq!(options.server, "http://a:3000");
        assert_eq!(options.stream, "http://env:8096/ekat/stream.m3u8");
        assert_eq!(options.poll_interval, Some(Duration::from_millis(500)));
        assert_eq!(options.device_id, None);
    }

    #[test]
    fn test_missing_or_bad_options() {
        assert!(Options::parse(&args(&["agent"]), |_| None).is_err());
        assert!(Options::parse(
            &args(&["agent", "--server", "s", "--stream", "t", "--poll-ms", "soon"]),
            |_| None
        )
        .is_err());
    }

    #[test]
    fn test_status_line() {
        let report = StatusReport {
            status: SyncStatus::Playing { is_master: true },
            clock_offset_ms: -12,
            last_drift_ms: Some(340),
            ..StatusReport::default()
        };
        let line = status_line(&report);
        assert!(line.starts_with("[idle] Master device | offset -12ms"));
        assert!(line.ends_with("drift +340ms"));
    }
}
