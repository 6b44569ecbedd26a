use std::time::{Duration, Instant};

use tokio::net::TcpStream;

/// Time a TCP connect to `host:port`. Any failure, including timeout,
/// reports `failure_ms` instead.
pub async fn probe_latency_ms(host: &str, port: u16, timeout: Duration, failure_ms: u64) -> u64 {
    let started = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => started.elapsed().as_millis() as u64,
        Ok(Err(e)) => {
            tracing::debug!(host, port, error = %e, "latency probe failed");
            failure_ms
        }
        Err(_) => {
            tracing::debug!(host, port, "latency probe timed out");
            failure_ms
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reachable_listener_reports_real_latency() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let ms = probe_latency_ms("127.0.0.1", port, Duration::from_secs(3), 5000).await;
        assert!(ms < 5000);
    }

    #[tokio::test]
    async fn refused_connection_reports_sentinel() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let ms = probe_latency_ms("127.0.0.1", port, Duration::from_secs(3), 5000).await;
        assert_eq!(ms, 5000);
    }

    #[tokio::test]
    async fn unresolvable_host_reports_sentinel() {
        let ms = probe_latency_ms("host.invalid", 53, Duration::from_secs(3), 4321).await;
        assert_eq!(ms, 4321);
    }
}
