//! Mesh-wide counters and gateway health.

use crate::NodeId;

/// Aggregate packet counters for the whole mesh.
///
/// `packets_sent`, `packets_received` and `packets_dropped` are counted by
/// the aggregator from packet events. The remaining fields are overwritten
/// by whatever the gateway last reported in a statistics message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MeshStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub packets_forwarded: u64,
    pub duplicates_dropped: u64,
    pub ttl_expired: u64,
    pub queue_overflows: u64,
    pub beacons_received: u64,
    pub beacons_sent: u64,
    pub unicast_forwards: u64,
    pub flooding_fallbacks: u64,
}

/// Counters as reported by a node; absent fields leave the stored value alone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeshStatsReport {
    pub packets_received: Option<u64>,
    pub packets_sent: Option<u64>,
    pub packets_forwarded: Option<u64>,
    pub duplicates_dropped: Option<u64>,
    pub ttl_expired: Option<u64>,
    pub queue_overflows: Option<u64>,
    pub beacons_received: Option<u64>,
    pub beacons_sent: Option<u64>,
    pub unicast_forwards: Option<u64>,
    pub flooding_fallbacks: Option<u64>,
}

impl MeshStats {
    /// Overwrite every counter present in `report`.
    pub fn apply_report(&mut self, report: &MeshStatsReport) {
        fn set(slot: &mut u64, value: Option<u64>) {
            if let Some(v) = value {
                *slot = v;
            }
        }

        set(&mut self.packets_received, report.packets_received);
        set(&mut self.packets_sent, report.packets_sent);
        set(&mut self.packets_forwarded, report.packets_forwarded);
        set(&mut self.duplicates_dropped, report.duplicates_dropped);
        set(&mut self.ttl_expired, report.ttl_expired);
        set(&mut self.queue_overflows, report.queue_overflows);
        set(&mut self.beacons_received, report.beacons_received);
        set(&mut self.beacons_sent, report.beacons_sent);
        set(&mut self.unicast_forwards, report.unicast_forwards);
        set(&mut self.flooding_fallbacks, report.flooding_fallbacks);
    }
}

/// Health report of the gateway node. Replaced wholesale on each report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct GatewayStatus {
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub node_id: Option<NodeId>,
    /// Seconds since the gateway booted.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub uptime: Option<u64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub free_heap: Option<u64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub is_gateway: Option<bool>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub route_valid: Option<bool>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub distance_to_gateway: Option<u32>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub next_hop: Option<NodeId>,
}
