//! Single reachability checks.

use super::{HealthConfig, HealthStatus};
use crate::connection::SwapTarget;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::debug;

/// HTTPS port used for hosted endpoint resolution
const HOSTED_PORT: u16 = 443;

/// Split `host[:port]`, falling back to `default_port`.
///
/// Named instances (`host\instance`) use the default port on the host part.
pub fn split_host_port(server: &str, default_port: u16) -> Option<(String, u16)> {
    let server = server.trim();
    let server = server.split('\\').next().unwrap_or(server);
    if server.is_empty() {
        return None;
    }

    if let Some(rest) = server.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = match tail.strip_prefix(':') {
            Some(p) => p.parse().ok()?,
            None => default_port,
        };
        return Some((host.to_string(), port));
    }

    match server.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => Some((host.to_string(), port.parse().ok()?)),
        _ => Some((server.to_string(), default_port)),
    }
}

/// Check one target once and classify the outcome
pub async fn check_reachable(target: &SwapTarget, config: &HealthConfig) -> (HealthStatus, String) {
    if target.is_cloud() {
        check_hosted(&target.server, config.tcp_timeout).await
    } else {
        check_local(&target.server, config).await
    }
}

async fn check_local(server: &str, config: &HealthConfig) -> (HealthStatus, String) {
    let Some((host, port)) = split_host_port(server, config.default_port) else {
        return (HealthStatus::Error, format!("Invalid server address '{}'", server));
    };
    let host = if host == "." { "localhost".to_string() } else { host };

    match timeout(config.tcp_timeout, TcpStream::connect((host.as_str(), port))).await {
        Ok(Ok(_stream)) => (HealthStatus::Healthy, format!("{}:{} is accepting connections", host, port)),
        Ok(Err(e)) => {
            debug!("Connect to {}:{} failed: {}", host, port, e);
            (HealthStatus::Unhealthy, format!("{}:{} refused the connection: {}", host, port, e))
        }
        Err(_) => (
            HealthStatus::Unhealthy,
            format!("{}:{} did not answer within {:?}", host, port, config.tcp_timeout),
        ),
    }
}

async fn check_hosted(server: &str, limit: Duration) -> (HealthStatus, String) {
    let url = match url::Url::parse(server) {
        Ok(url) => url,
        Err(e) => return (HealthStatus::Error, format!("Invalid endpoint URL '{}': {}", server, e)),
    };
    let Some(host) = url.host_str().filter(|h| !h.is_empty()) else {
        return (HealthStatus::Error, format!("Endpoint URL '{}' has no host", server));
    };

    let outcome = match timeout(limit, lookup_host((host, HOSTED_PORT))).await {
        Ok(Ok(mut addrs)) => {
            if addrs.next().is_some() {
                (HealthStatus::Healthy, format!("{} resolves", host))
            } else {
                (HealthStatus::Unhealthy, format!("{} resolved to no addresses", host))
            }
        }
        Ok(Err(e)) => (HealthStatus::Unhealthy, format!("Cannot resolve {}: {}", host, e)),
        Err(_) => (HealthStatus::Unhealthy, format!("Resolving {} timed out", host)),
    };
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("localhost:52700", 2383), Some(("localhost".to_string(), 52700)));
        assert_eq!(split_host_port("sql01", 2383), Some(("sql01".to_string(), 2383)));
        assert_eq!(split_host_port("sql01\\TABULAR", 2383), Some(("sql01".to_string(), 2383)));
        assert_eq!(split_host_port("[::1]:9000", 2383), Some(("::1".to_string(), 9000)));
        assert_eq!(split_host_port("host:notaport", 2383), None);
        assert_eq!(split_host_port("  ", 2383), None);
    }

    #[tokio::test]
    async fn test_malformed_hosted_url_is_error() {
        let target = SwapTarget::cloud("not a url", "Model");
        let (status, message) = check_reachable(&target, &HealthConfig::default()).await;
        assert_eq!(status, HealthStatus::Error);
        assert!(message.contains("Invalid endpoint URL"));
    }
}
