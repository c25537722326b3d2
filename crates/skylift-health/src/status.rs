//! HTTP status probe against the cluster's web endpoint.

use std::time::Duration;

use tracing::debug;

/// Port the cluster's status endpoint listens on.
pub const STATUS_PORT: u16 = 8080;

/// Timeout for a single probe round trip.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads the number of cores a cluster currently reports. `None`
/// means the endpoint is unreachable or not serving yet, which during
/// startup is ordinary, not an error.
#[allow(async_fn_in_trait)]
pub trait StatusProbe {
    async fn observed_cores(&self, host: &str) -> Option<u64>;
}

/// Probes `http://{host}:8080/json` and extracts the `cores` field.
#[derive(Debug, Clone, Default)]
pub struct HttpStatusProbe;

impl StatusProbe for HttpStatusProbe {
    async fn observed_cores(&self, host: &str) -> Option<u64> {
        let address = format!("{host}:{STATUS_PORT}");
        let uri = format!("http://{address}/json");

        let result = tokio::time::timeout(PROBE_TIMEOUT, async {
            let stream = match tokio::net::TcpStream::connect(&address).await {
                Ok(s) => s,
                Err(e) => {
                    debug!(error = %e, %uri, "status probe connection failed");
                    return None;
                }
            };

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
                Ok(pair) => pair,
                Err(e) => {
                    debug!(error = %e, %uri, "status probe handshake failed");
                    return None;
                }
            };

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let req = http::Request::builder()
                .method("GET")
                .uri(&uri)
                .header("host", &address)
                .header("user-agent", "skylift-health/0.1")
                .body(http_body_util::Empty::<bytes::Bytes>::new())
                .ok()?;

            let resp = match sender.send_request(req).await {
                Ok(resp) if resp.status().is_success() => resp,
                Ok(resp) => {
                    debug!(status = %resp.status(), %uri, "status probe non-2xx");
                    return None;
                }
                Err(e) => {
                    debug!(error = %e, %uri, "status probe request failed");
                    return None;
                }
            };

            use http_body_util::BodyExt;
            let body = resp.into_body().collect().await.ok()?.to_bytes();
            let status: serde_json::Value = serde_json::from_slice(&body).ok()?;
            status.get("cores")?.as_u64()
        })
        .await;

        match result {
            Ok(cores) => cores,
            Err(_) => {
                debug!(%uri, "status probe timed out");
                None
            }
        }
    }
}
