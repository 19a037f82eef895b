//! Wires settings, transports, and servers into a running aggregator.

use anyhow::{bail, Context, Result};
use meshwatch_core::http::QueryServer;
use meshwatch_core::Aggregator;
use tokio::sync::mpsc;

use crate::config::{Settings, SourceKind};
use crate::server::SubscriberServer;
use crate::source::{pump, spawn_lines, CommandLink, UdpSource, UNIT_QUEUE_DEPTH};

/// Run until Ctrl-C or the end of the transport.
pub async fn run(settings: Settings) -> Result<()> {
    let aggregator = settings.aggregator()?;

    let subscribers = SubscriberServer::bind(
        settings.subscribers.listen.as_str(),
        aggregator.clone(),
        settings.subscribers.write_timeout,
    )
    .await
    .with_context(|| format!("failed to bind subscriber listener {}", settings.subscribers.listen))?;

    let query = if settings.http.enabled {
        let server = QueryServer::bind(settings.http.listen.as_str(), aggregator.clone())
            .await
            .with_context(|| format!("failed to bind HTTP listener {}", settings.http.listen))?;
        Some(server)
    } else {
        None
    };

    let (tx, rx) = mpsc::channel(UNIT_QUEUE_DEPTH);
    let commands = start_source(&settings, tx).await?;
    let subscribers = subscribers.with_commands(commands);

    tracing::info!(
        source = ?settings.source,
        root = settings.root,
        subscribers = %subscribers.local_addr()?,
        "aggregator started"
    );

    let liveness = aggregator.start();
    let mut pump_task = tokio::spawn(pump(rx, aggregator.clone()));
    if let Some(query) = query {
        query.spawn();
    }

    let result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            signal.context("failed to listen for Ctrl-C")
        }
        served = subscribers.serve() => {
            served.context("subscriber listener failed")
        }
        _ = &mut pump_task => {
            tracing::info!("input exhausted");
            Ok(())
        }
    };

    liveness.stop();
    log_summary(&aggregator);
    result
}

/// Start the configured transport, feeding units into `tx`.
///
/// Returns the command link when the transport can carry commands.
async fn start_source(
    settings: &Settings,
    tx: mpsc::Sender<String>,
) -> Result<Option<CommandLink>> {
    match settings.source {
        SourceKind::Serial => start_serial(settings, tx),
        SourceKind::Udp => {
            let source = UdpSource::bind(settings.udp.listen.as_str())
                .await
                .with_context(|| format!("failed to bind UDP socket {}", settings.udp.listen))?;
            tracing::info!(addr = %source.local_addr()?, "listening for datagrams");
            source.spawn(tx);
            Ok(None)
        }
        SourceKind::Stdin => {
            spawn_lines(tokio::io::stdin(), tx, "stdin");
            Ok(None)
        }
    }
}

#[cfg(feature = "serial")]
fn start_serial(settings: &Settings, tx: mpsc::Sender<String>) -> Result<Option<CommandLink>> {
    use crate::source::{detect_port, SerialSource};

    let Some(port) = settings.serial.port.clone().or_else(detect_port) else {
        bail!("no serial port configured and none could be detected");
    };
    let (link, _handle) = SerialSource::new(port, settings.serial.baud).spawn(tx);
    Ok(Some(link))
}

#[cfg(not(feature = "serial"))]
fn start_serial(_settings: &Settings, _tx: mpsc::Sender<String>) -> Result<Option<CommandLink>> {
    bail!("built without serial support; use --source udp or --source stdin")
}

fn log_summary(aggregator: &Aggregator) {
    let counters = aggregator.counters();
    tracing::info!(
        units = counters.units,
        applied = counters.applied,
        unrecognized = counters.unrecognized,
        console_only = counters.console_only,
        broadcasts = counters.broadcasts,
        lagged = counters.lagged,
        nodes = aggregator.nodes().nodes.len(),
        "final counters"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshwatch_core::NodeId;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unknown_udp_address_fails_startup() {
        let mut settings = Settings::default();
        settings.source = SourceKind::Udp;
        settings.udp.listen = "not-an-address".to_string();
        settings.http.enabled = false;
        settings.subscribers.listen = "127.0.0.1:0".to_string();

        let err = run(settings).await.unwrap_err();
        assert!(err.to_string().contains("UDP"));
    }

    #[tokio::test]
    async fn test_invalid_settings_fail_before_binding() {
        let mut settings = Settings::default();
        settings.root = 0;
        settings.subscribers.listen = "not-an-address".to_string();

        let err = run(settings).await.unwrap_err();
        assert!(err.to_string().contains("invalid aggregator settings"));
    }

    #[tokio::test]
    async fn test_udp_source_feeds_aggregator() {
        let settings = Settings {
            source: SourceKind::Udp,
            ..Settings::default()
        };
        let aggregator = settings.aggregator().unwrap();
        let (tx, rx) = mpsc::channel(UNIT_QUEUE_DEPTH);
        let source = UdpSource::bind("127.0.0.1:0").await.unwrap();
        let addr = source.local_addr().unwrap();
        source.spawn(tx);
        tokio::spawn(pump(rx, aggregator.clone()));

        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket
            .send_to(br#"{"type":"node_status","nodeId":7,"parentNode":1,"hopDistance":1}"#, addr)
            .await
            .unwrap();

        for _ in 0..200 {
            if aggregator.node(NodeId::new(7).unwrap()).is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("datagram never reached the aggregator");
    }
}
