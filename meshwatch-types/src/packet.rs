//! Radio packet events reported by simulated meshes.

use crate::NodeId;

/// Whether the reporting node sent or received the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PacketDirection {
    Sent,
    Received,
}

/// One packet transmission or reception, stamped on arrival.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct PacketEvent {
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub direction: PacketDirection,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub from_node: Option<NodeId>,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub to_node: Option<NodeId>,

    /// Firmware packet kind, e.g. `DATA` or `BEACON`.
    pub packet_type: String,

    pub rssi: f64,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub snr: Option<f64>,

    pub seq: u64,

    pub timestamp_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "serde")]
    #[test]
    fn direction_serializes_as_type_tag() {
        let event = PacketEvent {
            direction: PacketDirection::Received,
            from_node: NodeId::new(3),
            to_node: NodeId::new(1),
            packet_type: "DATA".to_string(),
            rssi: -71.0,
            snr: Some(7.5),
            seq: 12,
            timestamp_ms: 99,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "received");
        assert_eq!(json["fromNode"], 3);
        assert_eq!(json["packetType"], "DATA");
    }
}
