//! Compose-style service description as authored in the human-edited
//! templates.
//!
//! Optional keys stay optional in the model: the deployment mapper only
//! emits a create-option for a key that was actually present, so nothing
//! here is defaulted.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::error::Result;

/// A rendered compose template.
#[derive(Debug, Deserialize)]
pub struct ComposeFile {
    #[serde(default)]
    pub version: Option<String>,
    pub services: BTreeMap<String, ServiceSpec>,
}

impl ComposeFile {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// One container's declarative description.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSpec {
    pub image: String,
    pub restart: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub environment: Option<Vec<String>>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub expose: Option<Vec<PortValue>>,
    #[serde(default)]
    pub ports: Option<Vec<PortValue>>,
    #[serde(default)]
    pub volumes: Option<Vec<String>>,
    #[serde(default)]
    pub extra_hosts: Option<Vec<String>>,
}

/// Port entries may be written quoted or as bare YAML numbers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u32),
    Text(String),
}

impl fmt::Display for PortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortValue::Number(port) => write!(f, "{}", port),
            PortValue::Text(text) => write!(f, "{}", text),
        }
    }
}
