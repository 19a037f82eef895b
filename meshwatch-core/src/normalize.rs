//! Raw record to typed event conversion.
//!
//! Mesh firmware revisions and the simulator disagree on field names and
//! nesting (`temp` vs `sensors.temperature`, `posX` vs `position.x`). All of
//! that is resolved here, once, so nothing downstream ever sees a raw map.
//! Normalization is pure: it reads a record and returns an event.

use meshwatch_types::{
    GatewayStatus, MeshStatsReport, NodeCounters, NodeId, Position, Telemetry, TimeSource,
};
use serde_json::{Map, Value};

use crate::profile::SourceProfile;

/// A transport unit after framing.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingress {
    /// A JSON object, ready for normalization.
    Record(Map<String, Value>),
    /// Anything else: boot banners, debug prints, truncated JSON.
    Console(String),
}

/// Split a transport unit into structured record or console text.
pub fn classify(unit: &str) -> Ingress {
    let trimmed = unit.trim();
    if trimmed.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
            return Ingress::Record(map);
        }
    }
    Ingress::Console(trimmed.to_string())
}

/// Status report of a single node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub telemetry: Telemetry,
    pub position: Option<Position>,
    /// Parent as reported; `None` when absent or zero.
    pub reported_parent: Option<NodeId>,
    pub hop_distance: u32,
    pub rssi: f64,
    pub snr: Option<f64>,
    pub time_source: TimeSource,
    pub neighbor_count: u32,
    pub next_hop: Option<NodeId>,
    pub route_valid: Option<bool>,
    pub is_gateway: bool,
    pub counters: NodeCounters,
}

/// Neighbour beacon heard by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct Beacon {
    pub sender: Option<NodeId>,
    pub distance: Option<u32>,
    pub rssi: Option<f64>,
}

/// A packet sent or received by a simulated node.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketReport {
    pub from_node: Option<NodeId>,
    pub to_node: Option<NodeId>,
    pub packet_type: String,
    pub rssi: f64,
    pub snr: Option<f64>,
    pub seq: u64,
}

/// A packet a node discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct DropReport {
    pub node_id: Option<NodeId>,
    pub reason: String,
}

/// Why a record produced no event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnrecognizedReason {
    MissingType,
    UnknownType,
    MissingNodeId,
}

impl UnrecognizedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            UnrecognizedReason::MissingType => "missing type",
            UnrecognizedReason::UnknownType => "unknown type",
            UnrecognizedReason::MissingNodeId => "missing node id",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unrecognized {
    pub kind: Option<String>,
    pub reason: UnrecognizedReason,
}

/// A normalized mesh event.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshEvent {
    NodeStatus(NodeStatus),
    GatewayStatus(GatewayStatus),
    MeshStats(MeshStatsReport),
    Beacon(Beacon),
    PacketSent(PacketReport),
    PacketReceived(PacketReport),
    PacketDropped(DropReport),
    Unrecognized(Unrecognized),
}

impl MeshEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MeshEvent::NodeStatus(_) => "node_status",
            MeshEvent::GatewayStatus(_) => "gateway_status",
            MeshEvent::MeshStats(_) => "mesh_stats",
            MeshEvent::Beacon(_) => "beacon",
            MeshEvent::PacketSent(_) => "packet_sent",
            MeshEvent::PacketReceived(_) => "packet_received",
            MeshEvent::PacketDropped(_) => "packet_dropped",
            MeshEvent::Unrecognized(_) => "unrecognized",
        }
    }
}

/// Converts raw records to [`MeshEvent`]s.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    root: NodeId,
    profile: SourceProfile,
}

impl Normalizer {
    pub fn new(root: NodeId, profile: SourceProfile) -> Self {
        Self { root, profile }
    }

    pub fn profile(&self) -> SourceProfile {
        self.profile
    }

    /// Classify a record by its `type` field and extract its fields.
    pub fn normalize(&self, record: &Map<String, Value>) -> MeshEvent {
        let Some(kind) = text(record, "type") else {
            return unrecognized(None, UnrecognizedReason::MissingType);
        };

        match kind {
            "node_data" | "node_status" => match node_id(record, "nodeId") {
                Some(id) => MeshEvent::NodeStatus(self.node_status(id, record)),
                None => unrecognized(Some(kind), UnrecognizedReason::MissingNodeId),
            },
            "gateway_status" => MeshEvent::GatewayStatus(gateway_status(record)),
            "mesh_stats" => MeshEvent::MeshStats(mesh_stats(record)),
            "beacon" => MeshEvent::Beacon(Beacon {
                sender: node_id(record, "senderId"),
                distance: small(record, "distance"),
                rssi: number(record, "rssi"),
            }),
            "packet_sent" => MeshEvent::PacketSent(PacketReport {
                from_node: node_id(record, "fromNode").or_else(|| node_id(record, "nodeId")),
                to_node: node_id(record, "toNode"),
                packet_type: packet_type(record),
                rssi: number(record, "rssi").unwrap_or(-50.0),
                snr: number(record, "snr"),
                seq: integer(record, "seq").unwrap_or(0),
            }),
            "packet_received" => MeshEvent::PacketReceived(PacketReport {
                from_node: node_id(record, "fromNode").or_else(|| node_id(record, "from")),
                to_node: node_id(record, "toNode").or_else(|| node_id(record, "nodeId")),
                packet_type: packet_type(record),
                rssi: number(record, "rssi").unwrap_or(-50.0),
                snr: number(record, "snr"),
                seq: integer(record, "seq").unwrap_or(0),
            }),
            "packet_dropped" => MeshEvent::PacketDropped(DropReport {
                node_id: node_id(record, "nodeId"),
                reason: text(record, "reason").unwrap_or("unknown").to_string(),
            }),
            other => unrecognized(Some(other), UnrecognizedReason::UnknownType),
        }
    }

    fn node_status(&self, node_id_value: NodeId, record: &Map<String, Value>) -> NodeStatus {
        let sensors = record.get("sensors").and_then(Value::as_object);
        let sensor = |flat: &str, nested: &str| {
            number(record, flat).or_else(|| sensors.and_then(|s| number(s, nested)))
        };

        let telemetry = Telemetry {
            temperature: sensor("temp", "temperature"),
            humidity: sensor("humidity", "humidity"),
            pressure: sensor("pressure", "pressure"),
            altitude: sensor("altitude", "altitude"),
            latitude: number(record, "lat"),
            longitude: number(record, "lng"),
            satellites: small(record, "satellites"),
            sensors_ok: flag(record, "sensorsOk"),
        };

        NodeStatus {
            node_id: node_id_value,
            telemetry,
            position: position(record),
            reported_parent: node_id(record, "parentNode")
                .or_else(|| node_id(record, "meshSenderId"))
                .or_else(|| node_id(record, "nextHop")),
            hop_distance: small(record, "hopDistance").unwrap_or(0),
            rssi: number(record, "rssi").unwrap_or(self.profile.default_rssi()),
            snr: number(record, "snr").or(self.profile.default_snr()),
            time_source: text(record, "timeSource")
                .map(TimeSource::parse)
                .unwrap_or(self.profile.default_time_source()),
            neighbor_count: small(record, "neighborCount").unwrap_or(0),
            next_hop: node_id(record, "nextHop"),
            route_valid: flag(record, "routeValid"),
            is_gateway: flag(record, "isGateway").unwrap_or(node_id_value == self.root),
            counters: NodeCounters {
                tx_count: integer(record, "txCount"),
                rx_count: integer(record, "rxCount"),
                fwd_count: integer(record, "fwdCount"),
                uptime_secs: integer(record, "uptime_sec"),
            },
        }
    }
}

fn unrecognized(kind: Option<&str>, reason: UnrecognizedReason) -> MeshEvent {
    MeshEvent::Unrecognized(Unrecognized {
        kind: kind.map(str::to_string),
        reason,
    })
}

fn gateway_status(record: &Map<String, Value>) -> GatewayStatus {
    GatewayStatus {
        node_id: node_id(record, "nodeId"),
        uptime: integer(record, "uptime"),
        free_heap: integer(record, "freeHeap"),
        is_gateway: flag(record, "isGateway"),
        route_valid: flag(record, "routeValid"),
        distance_to_gateway: small(record, "distanceToGateway"),
        next_hop: node_id(record, "nextHop"),
    }
}

fn mesh_stats(record: &Map<String, Value>) -> MeshStatsReport {
    MeshStatsReport {
        packets_received: integer(record, "packetsReceived"),
        packets_sent: integer(record, "packetsSent"),
        packets_forwarded: integer(record, "packetsForwarded"),
        duplicates_dropped: integer(record, "duplicatesDropped"),
        ttl_expired: integer(record, "ttlExpired"),
        queue_overflows: integer(record, "queueOverflows"),
        beacons_received: integer(record, "beaconsReceived"),
        beacons_sent: integer(record, "beaconsSent"),
        unicast_forwards: integer(record, "unicastForwards"),
        flooding_fallbacks: integer(record, "floodingFallbacks"),
    }
}

fn packet_type(record: &Map<String, Value>) -> String {
    text(record, "packetType")
        .or_else(|| text(record, "event"))
        .unwrap_or("UNKNOWN")
        .to_string()
}

/// One convention per event: flat `posX`/`posY` (or bare `x`/`y`) when any
/// flat key is present, with the missing coordinate at 0; otherwise the
/// nested `position` object.
fn position(record: &Map<String, Value>) -> Option<Position> {
    let flat_x = number(record, "posX").or_else(|| number(record, "x"));
    let flat_y = number(record, "posY").or_else(|| number(record, "y"));
    if flat_x.is_some() || flat_y.is_some() {
        return Some(Position::new(flat_x.unwrap_or(0.0), flat_y.unwrap_or(0.0)));
    }

    let nested = record.get("position").and_then(Value::as_object)?;
    let x = number(nested, "x");
    let y = number(nested, "y");
    if x.is_none() && y.is_none() {
        return None;
    }
    Some(Position::new(x.unwrap_or(0.0), y.unwrap_or(0.0)))
}

fn text<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

fn number(record: &Map<String, Value>, key: &str) -> Option<f64> {
    record.get(key).and_then(Value::as_f64)
}

/// Non-negative integer, accepting integral floats such as `3.0`.
fn integer(record: &Map<String, Value>, key: &str) -> Option<u64> {
    let value = record.get(key)?;
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    })
}

fn small(record: &Map<String, Value>, key: &str) -> Option<u32> {
    integer(record, key).and_then(|v| u32::try_from(v).ok())
}

fn flag(record: &Map<String, Value>, key: &str) -> Option<bool> {
    match record.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_u64().map(|v| v != 0),
        _ => None,
    }
}

fn node_id(record: &Map<String, Value>, key: &str) -> Option<NodeId> {
    integer(record, key).and_then(NodeId::from_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn serial() -> Normalizer {
        Normalizer::new(NodeId::new(1).unwrap(), SourceProfile::Serial)
    }

    fn simulation() -> Normalizer {
        Normalizer::new(NodeId::new(1).unwrap(), SourceProfile::Simulation)
    }

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn node_status(normalizer: &Normalizer, value: Value) -> NodeStatus {
        match normalizer.normalize(&record(value)) {
            MeshEvent::NodeStatus(status) => status,
            other => panic!("expected node status, got {other:?}"),
        }
    }

    #[test]
    fn classify_splits_records_from_console_text() {
        assert!(matches!(
            classify(r#"{"type":"node_data","nodeId":2}"#),
            Ingress::Record(_)
        ));
        assert_eq!(
            classify("[MESH] beacon sent\r\n"),
            Ingress::Console("[MESH] beacon sent".to_string())
        );
        assert!(matches!(classify(r#"{"type":"node_da"#), Ingress::Console(_)));
        assert!(matches!(classify("[1, 2, 3]"), Ingress::Console(_)));
        assert_eq!(classify(""), Ingress::Console(String::new()));
    }

    #[test]
    fn flat_and_nested_sensor_conventions_agree() {
        let flat = node_status(
            &serial(),
            json!({"type": "node_data", "nodeId": 3, "temp": 21.5, "humidity": 40, "pressure": 1012.3}),
        );
        let nested = node_status(
            &serial(),
            json!({
                "type": "node_data",
                "nodeId": 3,
                "sensors": {"temperature": 21.5, "humidity": 40, "pressure": 1012.3}
            }),
        );

        assert_eq!(flat.telemetry, nested.telemetry);
        assert_eq!(flat.telemetry.temperature, Some(21.5));
    }

    #[test]
    fn flat_keys_take_precedence_over_nested() {
        let status = node_status(
            &simulation(),
            json!({
                "type": "node_data",
                "nodeId": 5,
                "temp": 30.0,
                "sensors": {"temperature": 10.0, "humidity": 55.0},
                "posX": 300,
                "position": {"x": 1, "y": 2}
            }),
        );

        assert_eq!(status.telemetry.temperature, Some(30.0));
        assert_eq!(status.telemetry.humidity, Some(55.0));
        assert_eq!(status.position, Some(Position::new(300.0, 0.0)));
    }

    #[test]
    fn position_conventions() {
        let flat = node_status(
            &simulation(),
            json!({"type": "node_data", "nodeId": 5, "posX": 300, "posY": 0}),
        );
        let nested = node_status(
            &simulation(),
            json!({"type": "node_data", "nodeId": 5, "position": {"x": 300, "y": 0}}),
        );
        let bare = node_status(
            &simulation(),
            json!({"type": "node_data", "nodeId": 5, "x": 300, "y": 0}),
        );
        let absent = node_status(&simulation(), json!({"type": "node_data", "nodeId": 5}));

        assert_eq!(flat.position, Some(Position::new(300.0, 0.0)));
        assert_eq!(flat.position, nested.position);
        assert_eq!(flat.position, bare.position);
        assert_eq!(absent.position, None);
    }

    #[test]
    fn defaults_depend_on_profile() {
        let input = json!({"type": "node_data", "nodeId": 4});
        let from_serial = node_status(&serial(), input.clone());
        let from_sim = node_status(&simulation(), input);

        assert_eq!(from_serial.rssi, -100.0);
        assert_eq!(from_serial.snr, None);
        assert_eq!(from_serial.time_source, TimeSource::None);
        assert_eq!(from_sim.rssi, -50.0);
        assert_eq!(from_sim.snr, Some(10.0));
        assert_eq!(from_sim.time_source, TimeSource::Simulated);
        assert_eq!(from_serial.hop_distance, 0);
        assert_eq!(from_serial.reported_parent, None);
    }

    #[test]
    fn node_status_alias_is_accepted() {
        let status = node_status(
            &simulation(),
            json!({"type": "node_status", "nodeId": 9, "parentNode": 4, "hopDistance": 2}),
        );
        assert_eq!(status.node_id.get(), 9);
        assert_eq!(status.reported_parent, NodeId::new(4));
        assert_eq!(status.hop_distance, 2);
    }

    #[test]
    fn parent_falls_back_to_mesh_sender() {
        let status = node_status(
            &serial(),
            json!({"type": "node_data", "nodeId": 6, "meshSenderId": 3, "timeSource": "UNKNOWN"}),
        );
        assert_eq!(status.reported_parent, NodeId::new(3));
        assert_eq!(status.time_source, TimeSource::None);

        let zero = node_status(
            &serial(),
            json!({"type": "node_data", "nodeId": 6, "parentNode": 0, "meshSenderId": 0}),
        );
        assert_eq!(zero.reported_parent, None);
    }

    #[test]
    fn parent_falls_back_to_next_hop() {
        let status = node_status(
            &serial(),
            json!({"type": "node_data", "nodeId": 4, "nextHop": 3, "hopDistance": 2}),
        );
        assert_eq!(status.reported_parent, NodeId::new(3));
        assert_eq!(status.next_hop, NodeId::new(3));

        let sender_first = node_status(
            &serial(),
            json!({"type": "node_data", "nodeId": 4, "meshSenderId": 2, "nextHop": 3}),
        );
        assert_eq!(sender_first.reported_parent, NodeId::new(2));
    }

    #[test]
    fn gateway_flag_defaults_to_root_identity() {
        let root = node_status(&serial(), json!({"type": "node_data", "nodeId": 1}));
        let leaf = node_status(&serial(), json!({"type": "node_data", "nodeId": 2}));
        let explicit = node_status(
            &serial(),
            json!({"type": "node_data", "nodeId": 2, "isGateway": true}),
        );

        assert!(root.is_gateway);
        assert!(!leaf.is_gateway);
        assert!(explicit.is_gateway);
    }

    #[test]
    fn wrong_typed_optional_fields_fall_back() {
        let status = node_status(
            &serial(),
            json!({"type": "node_data", "nodeId": 2, "temp": "hot", "satellites": -1, "rssi": null}),
        );
        assert_eq!(status.telemetry.temperature, None);
        assert_eq!(status.telemetry.satellites, None);
        assert_eq!(status.rssi, -100.0);
    }

    #[test]
    fn integral_floats_are_accepted_as_ids() {
        let status = node_status(&serial(), json!({"type": "node_data", "nodeId": 7.0}));
        assert_eq!(status.node_id.get(), 7);
    }

    #[test]
    fn node_data_without_id_is_unrecognized() {
        let normalizer = serial();
        for value in [
            json!({"type": "node_data"}),
            json!({"type": "node_data", "nodeId": 0}),
            json!({"type": "node_data", "nodeId": "abc"}),
        ] {
            assert_eq!(
                normalizer.normalize(&record(value)),
                MeshEvent::Unrecognized(Unrecognized {
                    kind: Some("node_data".to_string()),
                    reason: UnrecognizedReason::MissingNodeId,
                })
            );
        }
    }

    #[test]
    fn unknown_and_missing_types_are_unrecognized() {
        let normalizer = serial();
        match normalizer.normalize(&record(json!({"type": "routing", "table": []}))) {
            MeshEvent::Unrecognized(u) => {
                assert_eq!(u.kind.as_deref(), Some("routing"));
                assert_eq!(u.reason, UnrecognizedReason::UnknownType);
            }
            other => panic!("unexpected {other:?}"),
        }
        match normalizer.normalize(&record(json!({"nodeId": 3}))) {
            MeshEvent::Unrecognized(u) => assert_eq!(u.reason, UnrecognizedReason::MissingType),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn packet_field_aliases() {
        let normalizer = simulation();
        let sent = normalizer.normalize(&record(json!({
            "type": "packet_sent", "nodeId": 3, "event": "BEACON", "seq": 44
        })));
        assert_eq!(
            sent,
            MeshEvent::PacketSent(PacketReport {
                from_node: NodeId::new(3),
                to_node: None,
                packet_type: "BEACON".to_string(),
                rssi: -50.0,
                snr: None,
                seq: 44,
            })
        );

        let received = normalizer.normalize(&record(json!({
            "type": "packet_received", "from": 4, "nodeId": 1, "snr": 6.5, "rssi": -88
        })));
        match received {
            MeshEvent::PacketReceived(report) => {
                assert_eq!(report.from_node, NodeId::new(4));
                assert_eq!(report.to_node, NodeId::new(1));
                assert_eq!(report.packet_type, "UNKNOWN");
                assert_eq!(report.snr, Some(6.5));
                assert_eq!(report.rssi, -88.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn gateway_and_stats_reports() {
        let normalizer = serial();
        let gateway = normalizer.normalize(&record(json!({
            "type": "gateway_status", "nodeId": 1, "uptime": 3600, "freeHeap": 120000,
            "isGateway": true, "routeValid": 1, "distanceToGateway": 0
        })));
        match gateway {
            MeshEvent::GatewayStatus(status) => {
                assert_eq!(status.uptime, Some(3600));
                assert_eq!(status.free_heap, Some(120000));
                assert_eq!(status.route_valid, Some(true));
                assert_eq!(status.next_hop, None);
            }
            other => panic!("unexpected {other:?}"),
        }

        let stats = normalizer.normalize(&record(json!({
            "type": "mesh_stats", "packetsReceived": 10, "ttlExpired": 2
        })));
        match stats {
            MeshEvent::MeshStats(report) => {
                assert_eq!(report.packets_received, Some(10));
                assert_eq!(report.ttl_expired, Some(2));
                assert_eq!(report.packets_sent, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
