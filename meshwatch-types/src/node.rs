//! Node identity, telemetry and per-node state.

use core::fmt;

/// Identifier of a mesh node.
///
/// Node ids are assigned by the mesh firmware and are always positive;
/// `0` is used on the wire to mean "not reported" and never names a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct NodeId(u32);

impl NodeId {
    /// Create a node id, rejecting the reserved value `0`.
    pub const fn new(raw: u32) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Create a node id from a wide integer as found in decoded JSON.
    pub fn from_u64(raw: u64) -> Option<Self> {
        u32::try_from(raw).ok().and_then(Self::new)
    }

    /// The raw numeric id.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a node's wall clock comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimeSource {
    /// No time source, or one the node could not name.
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "NONE"))]
    None,
    /// Time taken from a GPS fix.
    #[cfg_attr(feature = "serde", serde(rename = "GPS"))]
    Gps,
    /// Time distributed over the mesh.
    #[cfg_attr(feature = "serde", serde(rename = "NET"))]
    Network,
    /// Clock of a simulated node.
    #[cfg_attr(feature = "serde", serde(rename = "SIM"))]
    Simulated,
}

impl TimeSource {
    /// Classify a reported time-source label.
    ///
    /// Unknown labels (including `UNKNOWN`) collapse to [`TimeSource::None`].
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "GPS" => TimeSource::Gps,
            "NET" | "NETWORK" => TimeSource::Network,
            "SIM" => TimeSource::Simulated,
            _ => TimeSource::None,
        }
    }

    /// Wire label of this time source.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSource::None => "NONE",
            TimeSource::Gps => "GPS",
            TimeSource::Network => "NET",
            TimeSource::Simulated => "SIM",
        }
    }
}

/// Planar position used by simulated deployments.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Environmental and GPS readings reported by a node.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Telemetry {
    /// Temperature in degrees Celsius.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "temp", skip_serializing_if = "Option::is_none")
    )]
    pub temperature: Option<f64>,

    /// Relative humidity in percent.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub humidity: Option<f64>,

    /// Barometric pressure in hPa.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub pressure: Option<f64>,

    /// Altitude in metres.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub altitude: Option<f64>,

    #[cfg_attr(
        feature = "serde",
        serde(rename = "lat", skip_serializing_if = "Option::is_none")
    )]
    pub latitude: Option<f64>,

    #[cfg_attr(
        feature = "serde",
        serde(rename = "lng", skip_serializing_if = "Option::is_none")
    )]
    pub longitude: Option<f64>,

    /// Number of satellites in view.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub satellites: Option<u32>,

    /// Whether the node's sensors initialised correctly.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "sensorsOk", skip_serializing_if = "Option::is_none")
    )]
    pub sensors_ok: Option<bool>,
}

impl Telemetry {
    /// True when the node reported a GPS coordinate pair.
    pub fn has_fix(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Routing attributes of a node as seen by the aggregator.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Routing {
    /// Effective parent used for topology edges.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "parentNode", skip_serializing_if = "Option::is_none")
    )]
    pub parent: Option<NodeId>,

    /// Parent exactly as the node reported it.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub reported_parent: Option<NodeId>,

    /// Set when the parent was not reported and the root was assumed.
    ///
    /// For nodes more than one hop away this is an approximation.
    pub parent_inferred: bool,

    pub hop_distance: u32,
    pub rssi: f64,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub snr: Option<f64>,

    pub time_source: TimeSource,
    pub neighbor_count: u32,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub next_hop: Option<NodeId>,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub route_valid: Option<bool>,
}

/// Radio counters reported by simulated nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct NodeCounters {
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub tx_count: Option<u64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub rx_count: Option<u64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub fwd_count: Option<u64>,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "uptime_sec", skip_serializing_if = "Option::is_none")
    )]
    pub uptime_secs: Option<u64>,
}

/// Everything the aggregator knows about one node.
///
/// Records are created on the first status report from a node and are
/// never removed; a silent node is marked offline instead.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct NodeRecord {
    pub node_id: NodeId,

    #[cfg_attr(feature = "serde", serde(flatten))]
    pub telemetry: Telemetry,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub position: Option<Position>,

    #[cfg_attr(feature = "serde", serde(flatten))]
    pub routing: Routing,

    #[cfg_attr(feature = "serde", serde(flatten))]
    pub counters: NodeCounters,

    pub is_gateway: bool,

    /// Arrival time (Unix ms) of the most recent status report.
    pub last_seen: u64,

    pub online: bool,

    /// When set, the `last_seen` value at the moment the node went offline.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub offline_since: Option<u64>,

    /// Number of status reports applied for this node.
    pub message_count: u64,
}

impl NodeRecord {
    /// A fresh, online record with no telemetry.
    pub fn new(node_id: NodeId, now_ms: u64) -> Self {
        Self {
            node_id,
            telemetry: Telemetry::default(),
            position: None,
            routing: Routing::default(),
            counters: NodeCounters::default(),
            is_gateway: false,
            last_seen: now_ms,
            online: true,
            offline_since: None,
            message_count: 0,
        }
    }

    /// Milliseconds since the node was last heard from.
    pub fn silence_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_rejects_zero() {
        assert!(NodeId::new(0).is_none());
        assert_eq!(NodeId::new(7).map(NodeId::get), Some(7));
    }

    #[test]
    fn node_id_from_u64_rejects_out_of_range() {
        assert!(NodeId::from_u64(u64::from(u32::MAX) + 1).is_none());
        assert_eq!(NodeId::from_u64(42).map(NodeId::get), Some(42));
    }

    #[test]
    fn time_source_labels() {
        assert_eq!(TimeSource::parse("GPS"), TimeSource::Gps);
        assert_eq!(TimeSource::parse("NET"), TimeSource::Network);
        assert_eq!(TimeSource::parse("network"), TimeSource::Network);
        assert_eq!(TimeSource::parse("SIM"), TimeSource::Simulated);
        assert_eq!(TimeSource::parse("UNKNOWN"), TimeSource::None);
        assert_eq!(TimeSource::parse(""), TimeSource::None);
        assert_eq!(TimeSource::Network.as_str(), "NET");
    }

    #[test]
    fn silence_saturates_on_clock_skew() {
        let record = NodeRecord::new(NodeId::new(3).unwrap(), 10_000);
        assert_eq!(record.silence_ms(12_500), 2_500);
        assert_eq!(record.silence_ms(9_000), 0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn record_serializes_with_wire_field_names() {
        let mut record = NodeRecord::new(NodeId::new(5).unwrap(), 1_000);
        record.telemetry.temperature = Some(21.5);
        record.telemetry.latitude = Some(51.5);
        record.routing.parent = NodeId::new(1);
        record.routing.time_source = TimeSource::Gps;
        record.position = Some(Position::new(300.0, 0.0));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["nodeId"], 5);
        assert_eq!(json["temp"], 21.5);
        assert_eq!(json["lat"], 51.5);
        assert_eq!(json["parentNode"], 1);
        assert_eq!(json["timeSource"], "GPS");
        assert_eq!(json["position"]["x"], 300.0);
        assert_eq!(json["lastSeen"], 1_000);
        assert!(json.get("humidity").is_none());
        assert!(json.get("offlineSince").is_none());
    }
}
