use thiserror::Error;

/// A specialized [`Result`] type for core transformations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error type for the data-model and transformation layer.
///
/// Every variant is terminal for the run; the CLI maps them onto its
/// exit-code policy.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A port entry used a range or an explicit protocol suffix.
    #[error("only the single port short syntax without protocol is supported (HOSTPORT:CONTAINERPORT), got '{0}'")]
    UnsupportedPortSyntax(String),

    /// The topology description carries no version marker.
    #[error("the topology description format is not supported, please update to a newer version")]
    UnsupportedTopologyVersion,

    /// A station in the topology has no OPC endpoint URL.
    #[error("station '{0}' must have a property OpcEndpointUrl")]
    StationWithoutEndpoint(String),

    /// The deployment content template misses a required schema path.
    #[error("the deployment template is missing '{0}'")]
    MalformedDeploymentTemplate(&'static str),

    /// Failed to parse a YAML document.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Failed to parse or serialize a JSON document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Underlying IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
