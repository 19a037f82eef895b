//! Messages pushed to viewers and payloads of the query surface.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{
    GatewayStatus, MeshStats, NodeId, NodeRecord, PacketEvent, SchemaVersion, TopologySnapshot,
    TopologyView,
};

/// Full aggregator state at one revision.
///
/// `revision` increases by one with every state mutation, so a viewer can
/// always tell which of two envelopes is newer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct StateEnvelope {
    pub version: SchemaVersion,
    pub revision: u64,
    #[cfg_attr(feature = "serde", serde(rename = "timestamp"))]
    pub timestamp_ms: u64,
    pub gateway: GatewayStatus,
    pub nodes: BTreeMap<NodeId, NodeRecord>,
    pub mesh_stats: MeshStats,
    pub topology: TopologyView,
}

/// Outcome of a viewer command, sent only to the viewer that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommandResponse {
    pub command: String,
    pub success: bool,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub message: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn ok(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(command: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// A message delivered to a subscribed viewer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum Message {
    /// Full state sent once, when the viewer subscribes.
    Init(StateEnvelope),
    /// Full state after a change.
    Update(StateEnvelope),
    /// A raw line from the transport, mirrored for the console view.
    Serial {
        line: String,
        #[cfg_attr(feature = "serde", serde(rename = "timestamp"))]
        timestamp_ms: u64,
    },
    CommandResponse(CommandResponse),
}

impl Message {
    /// Revision of the carried state, if this message carries state.
    pub fn revision(&self) -> Option<u64> {
        match self {
            Message::Init(envelope) | Message::Update(envelope) => Some(envelope.revision),
            _ => None,
        }
    }

    /// The carried state, if any.
    pub fn envelope(&self) -> Option<&StateEnvelope> {
        match self {
            Message::Init(envelope) | Message::Update(envelope) => Some(envelope),
            _ => None,
        }
    }
}

/// `GET /api/data`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct StateResponse {
    #[cfg_attr(feature = "serde", serde(rename = "timestamp"))]
    pub timestamp_ms: u64,
    pub gateway: GatewayStatus,
    pub nodes: BTreeMap<NodeId, NodeRecord>,
    pub mesh_stats: MeshStats,
}

/// `GET /api/nodes`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodesResponse {
    pub nodes: BTreeMap<NodeId, NodeRecord>,
}

/// `GET /api/topology`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TopologyResponse {
    #[cfg_attr(feature = "serde", serde(rename = "timestamp"))]
    pub timestamp_ms: u64,
    pub topology: TopologyView,
}

/// `GET /api/topology/history`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct HistoryResponse {
    #[cfg_attr(feature = "serde", serde(rename = "timestamp"))]
    pub timestamp_ms: u64,
    pub history: Vec<Arc<TopologySnapshot>>,
    pub packet_events: Vec<PacketEvent>,
}
