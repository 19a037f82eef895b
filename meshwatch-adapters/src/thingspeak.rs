//! ThingSpeak adapter using the channel update API.
//!
//! Each forwarded node owns one ThingSpeak channel, addressed by its write
//! API key. Nodes without a key are not forwarded.
//!
//! ## Field Mapping
//!
//! | Field    | Value                 |
//! |----------|-----------------------|
//! | `field1` | temperature           |
//! | `field2` | humidity              |
//! | `field3` | pressure              |
//! | `field4` | latitude              |
//! | `field5` | longitude             |
//! | `field6` | RSSI                  |
//! | `field7` | GPS satellites        |
//! | `field8` | hop distance to root  |
//!
//! Absent values are left out of the request.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use meshwatch_core::{SinkError, SinkReading, TelemetrySink};
use meshwatch_types::NodeId;
use reqwest::Client;

use crate::AdapterError;

/// Public ThingSpeak update endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.thingspeak.com/update";

/// Forwards node readings to per-node ThingSpeak channels.
#[derive(Debug, Clone)]
pub struct ThingSpeakSink {
    client: Client,
    endpoint: String,
    api_keys: BTreeMap<NodeId, String>,
}

impl ThingSpeakSink {
    /// Create a new builder for configuring the sink.
    pub fn builder() -> ThingSpeakSinkBuilder {
        ThingSpeakSinkBuilder::default()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Nodes that have a channel configured.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.api_keys.keys().copied()
    }

    /// Send one reading. Returns the entry id ThingSpeak assigned.
    pub async fn send(&self, reading: &SinkReading) -> Result<u64, AdapterError> {
        let api_key = self.api_keys.get(&reading.node_id).ok_or_else(|| {
            AdapterError::Config(format!("no channel for node {}", reading.node_id))
        })?;

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params(api_key, reading))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AdapterError::Http(format!(
                "API returned status {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        parse_entry(&body)
    }
}

#[async_trait]
impl TelemetrySink for ThingSpeakSink {
    fn name(&self) -> &str {
        "thingspeak"
    }

    fn accepts(&self, node: NodeId) -> bool {
        self.api_keys.contains_key(&node)
    }

    async fn upload(&self, reading: &SinkReading) -> Result<(), SinkError> {
        let entry = self.send(reading).await?;
        tracing::info!(node = %reading.node_id, entry, "thingspeak entry created");
        Ok(())
    }
}

/// Builder for ThingSpeakSink.
#[derive(Debug, Default)]
pub struct ThingSpeakSinkBuilder {
    endpoint: Option<String>,
    api_keys: BTreeMap<u32, String>,
    timeout: Option<Duration>,
}

impl ThingSpeakSinkBuilder {
    /// Set the update endpoint (default: the public ThingSpeak API).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Forward readings of `node` to the channel with this write key.
    pub fn channel(mut self, node: u32, api_key: impl Into<String>) -> Self {
        self.api_keys.insert(node, api_key.into());
        self
    }

    /// Set the HTTP client timeout (default: 5 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the sink.
    pub fn build(self) -> Result<ThingSpeakSink, AdapterError> {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Config(e.to_string()))?;

        let api_keys = self
            .api_keys
            .into_iter()
            .map(|(node, key)| {
                NodeId::new(node)
                    .map(|id| (id, key))
                    .ok_or_else(|| AdapterError::Config("node id 0 cannot own a channel".to_string()))
            })
            .collect::<Result<_, _>>()?;

        Ok(ThingSpeakSink {
            client,
            endpoint: self
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_keys,
        })
    }
}

/// Query parameters for one update.
fn params(api_key: &str, reading: &SinkReading) -> Vec<(&'static str, String)> {
    let fields = [
        ("field1", reading.temperature),
        ("field2", reading.humidity),
        ("field3", reading.pressure),
        ("field4", reading.latitude),
        ("field5", reading.longitude),
        ("field6", reading.rssi),
        ("field7", reading.satellites.map(f64::from)),
        ("field8", reading.hop_distance.map(f64::from)),
    ];

    let mut params = vec![("api_key", api_key.to_string())];
    params.extend(
        fields
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v.to_string()))),
    );
    params
}

// ThingSpeak answers "0" when it refuses an update, e.g. when the channel's
// own rate limit was hit.
fn parse_entry(body: &str) -> Result<u64, AdapterError> {
    match body.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(AdapterError::Rejected(body.trim().to_string())),
        Ok(entry) => Ok(entry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn reading() -> SinkReading {
        SinkReading {
            node_id: NodeId::new(2).unwrap(),
            temperature: Some(21.5),
            humidity: None,
            pressure: Some(1013.2),
            latitude: None,
            longitude: None,
            rssi: Some(-72.0),
            satellites: Some(7),
            hop_distance: Some(1),
        }
    }

    /// Serve one HTTP response and hand back the request line.
    async fn serve_once(body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/update", listener.local_addr().unwrap());

        let task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let request = String::from_utf8_lossy(&request).into_owned();
            request.lines().next().unwrap_or_default().to_string()
        });

        (endpoint, task)
    }

    #[test]
    fn test_builder_defaults() {
        let sink = ThingSpeakSink::builder().build().unwrap();
        assert_eq!(sink.endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(sink.nodes().count(), 0);
    }

    #[test]
    fn test_only_configured_nodes_are_accepted() {
        let sink = ThingSpeakSink::builder()
            .channel(2, "KEY2")
            .channel(5, "KEY5")
            .build()
            .unwrap();

        assert!(sink.accepts(NodeId::new(2).unwrap()));
        assert!(!sink.accepts(NodeId::new(3).unwrap()));
        assert_eq!(sink.nodes().map(NodeId::get).collect::<Vec<_>>(), vec![2, 5]);
    }

    #[test]
    fn test_zero_node_is_rejected() {
        let result = ThingSpeakSink::builder().channel(0, "KEY").build();
        assert!(matches!(result, Err(AdapterError::Config(_))));
    }

    #[test]
    fn test_params_skip_absent_values() {
        let params = params("KEY2", &reading());
        assert_eq!(
            params,
            vec![
                ("api_key", "KEY2".to_string()),
                ("field1", "21.5".to_string()),
                ("field3", "1013.2".to_string()),
                ("field6", "-72".to_string()),
                ("field7", "7".to_string()),
                ("field8", "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_entry() {
        assert_eq!(parse_entry("42\n").unwrap(), 42);
        assert!(matches!(parse_entry("0"), Err(AdapterError::Rejected(_))));
        assert!(matches!(parse_entry("-1"), Err(AdapterError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_upload_sends_query() {
        let (endpoint, server) = serve_once("17").await;
        let sink = ThingSpeakSink::builder()
            .endpoint(endpoint)
            .channel(2, "KEY2")
            .build()
            .unwrap();

        assert_eq!(sink.send(&reading()).await.unwrap(), 17);

        let request_line = server.await.unwrap();
        assert!(request_line.starts_with("GET /update?api_key=KEY2&field1=21.5"));
        assert!(request_line.contains("field8=1"));
        assert!(!request_line.contains("field2"));
    }

    #[tokio::test]
    async fn test_zero_body_is_a_failure() {
        let (endpoint, server) = serve_once("0").await;
        let sink = ThingSpeakSink::builder()
            .endpoint(endpoint)
            .channel(2, "KEY2")
            .build()
            .unwrap();

        let result = sink.upload(&reading()).await;
        server.await.unwrap();

        assert!(matches!(result, Err(SinkError::Rejected(body)) if body == "0"));
    }
}
