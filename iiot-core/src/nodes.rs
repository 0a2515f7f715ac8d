//! Published-nodes document generation.
//!
//! The telemetry publisher consumes a JSON list of OPC endpoints and node
//! identifiers. Stations whose nodes only carry a legacy bare `NodeId`
//! are collected into a flat list which, when non-empty, replaces the
//! structured per-station output.

use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::topology::Factory;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PublishedStation {
    pub endpoint_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_security: Option<bool>,
    pub opc_nodes: Vec<PublishedNode>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PublishedNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded_node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opc_publish_recursive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opc_publishing_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opc_sampling_interval: Option<u64>,
}

/// Either shape serializes to the JSON array the publisher expects.
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum PublishedNodesDocument {
    Legacy(Vec<PublishedNode>),
    Stations(Vec<PublishedStation>),
}

/// Builds the published-nodes document for one factory.
///
/// Returns `None` when the factory has no nodes to publish. A station
/// without an endpoint URL is fatal.
pub fn published_nodes_for_factory(factory: &Factory) -> Result<Option<PublishedNodesDocument>> {
    let mut stations = Vec::new();
    let mut legacy_nodes = Vec::new();

    for station in factory.all_stations() {
        let endpoint_url = station.opc_endpoint_url.clone().ok_or_else(|| {
            CoreError::StationWithoutEndpoint(
                station
                    .opc_uri
                    .clone()
                    .or_else(|| station.application_uri.clone())
                    .unwrap_or_else(|| "<unnamed>".to_string()),
            )
        })?;

        let mut nodes = Vec::new();
        for node in &station.opc_nodes {
            if let Some(expanded) = &node.expanded_node_id {
                nodes.push(PublishedNode {
                    expanded_node_id: Some(expanded.clone()),
                    opc_publish_recursive: node.opc_publish_recursive,
                    opc_publishing_interval: node.opc_publishing_interval,
                    opc_sampling_interval: node.opc_sampling_interval,
                    ..PublishedNode::default()
                });
            } else if let Some(node_id) = &node.node_id {
                legacy_nodes.push(PublishedNode {
                    node_id: Some(node_id.clone()),
                    endpoint_url: Some(endpoint_url.clone()),
                    ..PublishedNode::default()
                });
            }
        }

        if !nodes.is_empty() {
            stations.push(PublishedStation {
                endpoint_url,
                use_security: station.opc_use_security,
                opc_nodes: nodes,
            });
        }
    }

    if !legacy_nodes.is_empty() {
        Ok(Some(PublishedNodesDocument::Legacy(legacy_nodes)))
    } else if !stations.is_empty() {
        Ok(Some(PublishedNodesDocument::Stations(stations)))
    } else {
        Ok(None)
    }
}
