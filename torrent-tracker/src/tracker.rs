use std::fmt;

use url::Url;

use crate::error::{TrackerError, TrackerResult};

/// Host and port of a UDP tracker, taken from a torrent's announce URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerEndpoint {
    pub host: String,
    pub port: u16,
}

impl TrackerEndpoint {
    pub fn from_announce(announce: &str) -> TrackerResult<Self> {
        let url = Url::parse(announce)
            .map_err(|e| TrackerError::InvalidAnnounceUrl(format!("{}: {}", announce, e)))?;

        if url.scheme() != "udp" {
            return Err(TrackerError::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| TrackerError::InvalidAnnounceUrl(format!("{}: missing host", announce)))?;
        let port = url
            .port()
            .ok_or_else(|| TrackerError::InvalidAnnounceUrl(format!("{}: missing port", announce)))?;

        // IPv6 literals come back bracketed
        let host = host.trim_start_matches('[').trim_end_matches(']');

        Ok(TrackerEndpoint {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for TrackerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
