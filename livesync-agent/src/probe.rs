//! TCP reachability probe for the network monitor

use livesync_core::{NetworkProbe, SyncError};
use reqwest::Url;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Treats the network as up when a TCP connection to a fixed host succeeds
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    /// Probe the host and port of `url` (default port for its scheme)
    pub fn for_url(url: &str) -> Result<Self, SyncError> {
        let parsed = Url::parse(url)
            .map_err(|e| SyncError::Config(format!("invalid probe URL {}: {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| SyncError::Config(format!("probe URL {} has no host", url)))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| SyncError::Config(format!("probe URL {} has no port", url)))?;

        Ok(Self {
            host: host.to_string(),
            port,
            timeout: PROBE_TIMEOUT,
        })
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl NetworkProbe for TcpProbe {
    fn is_available(&self) -> bool {
        let addrs = match (self.host.as_str(), self.port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!("Probe lookup of {} failed: {}", self.host, e);
                return false;
            }
        };

        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, self.timeout).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_target_from_url() {
        assert_eq!(TcpProbe::for_url("http://10.0.0.5:3000/api/sync").unwrap().target(), "10.0.0.5:3000");
        assert_eq!(TcpProbe::for_url("https://sync.example.net").unwrap().target(), "sync.example.net:443");
        assert!(TcpProbe::for_url("not a url").is_err());
    }

    #[test]
    fn test_probe_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::for_url(&format!("http://127.0.0.1:{}", port)).unwrap();
        assert!(probe.is_available());

        drop(listener);
        assert!(!probe.is_available());
    }
}
