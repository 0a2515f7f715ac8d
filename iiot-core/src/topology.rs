//! Connectedfactory topology description (read-only input).
//!
//! The document describes factories, their production lines and stations.
//! It is fetched from a local file or a URL by the CLI and never mutated
//! by this tool.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TopologyDocument {
    /// Schema marker. Documents without one are rejected.
    #[serde(default)]
    pub version: Option<Value>,
    #[serde(default)]
    pub factories: Vec<Factory>,
}

impl TopologyDocument {
    /// Parses and validates the schema marker.
    pub fn parse(text: &str) -> Result<Self> {
        let topology: TopologyDocument = serde_json::from_str(text)?;
        if topology.version.is_none() {
            return Err(CoreError::UnsupportedTopologyVersion);
        }
        Ok(topology)
    }

    /// The domain of the first factory flagged as a simulation, if any.
    pub fn first_simulation_domain(&self) -> Option<String> {
        self.factories
            .iter()
            .find(|factory| factory.is_simulation())
            .map(|factory| normalized_domain_name(&factory.domain))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Factory {
    #[serde(default)]
    pub name: Option<String>,
    pub domain: String,
    #[serde(default)]
    pub shopfloor: Option<Shopfloor>,
    #[serde(default)]
    pub production_lines: Vec<ProductionLine>,
    #[serde(default)]
    pub stations: Vec<Station>,
}

impl Factory {
    pub fn is_simulation(&self) -> bool {
        self.shopfloor
            .as_ref()
            .and_then(|shopfloor| shopfloor.shopfloor_type.as_deref())
            .map(|kind| kind.eq_ignore_ascii_case("simulation"))
            .unwrap_or(false)
    }

    /// All stations of the factory, production-line ones first.
    pub fn all_stations(&self) -> Vec<&Station> {
        let mut stations: Vec<&Station> = self
            .production_lines
            .iter()
            .flat_map(|line| line.stations.iter())
            .collect();
        stations.extend(self.stations.iter());
        stations
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.domain)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Shopfloor {
    #[serde(rename = "Type", default)]
    pub shopfloor_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductionLine {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub simulation: Option<Simulation>,
    #[serde(default)]
    pub stations: Vec<Station>,
}

impl ProductionLine {
    /// The name used for compose project and file naming.
    pub fn normalized_name(&self) -> String {
        self.name
            .as_deref()
            .unwrap_or("productionline")
            .replace(' ', "")
            .to_lowercase()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Simulation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "Type", default)]
    pub simulation_type: Option<String>,
    #[serde(default)]
    pub args: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Station {
    #[serde(default)]
    pub opc_endpoint_url: Option<String>,
    #[serde(default)]
    pub opc_use_security: Option<bool>,
    #[serde(default)]
    pub opc_uri: Option<String>,
    #[serde(default)]
    pub application_uri: Option<String>,
    #[serde(default)]
    pub opc_nodes: Vec<OpcNode>,
    #[serde(default)]
    pub simulation: Option<Simulation>,
}

impl Station {
    pub fn simulation_type(&self) -> Option<String> {
        self.simulation
            .as_ref()
            .and_then(|simulation| simulation.simulation_type.as_deref())
            .map(str::to_lowercase)
    }

    pub fn simulation_args(&self) -> Option<&str> {
        self.simulation
            .as_ref()
            .and_then(|simulation| simulation.args.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OpcNode {
    #[serde(default)]
    pub expanded_node_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub opc_publish_recursive: Option<bool>,
    #[serde(default)]
    pub opc_publishing_interval: Option<u64>,
    #[serde(default)]
    pub opc_sampling_interval: Option<u64>,
}

/// Normalizes a user- or topology-supplied domain/site name into the
/// namespace used for all generated resource names: lowercased, spaces
/// and dots stripped.
pub fn normalized_domain_name(name: &str) -> String {
    name.replace([' ', '.'], "").to_lowercase()
}
