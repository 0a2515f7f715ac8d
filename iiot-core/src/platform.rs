//! Target platform, CPU and container image resolution.
//!
//! The generated scripts can target a different platform than the one the
//! tool runs on, so everything platform-specific (script naming, newline
//! style, image tags) is derived once from [`TargetPlatform`] and passed
//! around instead of being re-detected per call.

use std::fmt;

use clap::ValueEnum;

pub const OPCPUBLISHER_CONTAINER_IMAGE: &str = "mcr.microsoft.com/iotedge/opc-publisher";
pub const OPCPUBLISHER_CONTAINER_VERSION: &str = "";
pub const OPCPROXY_CONTAINER_IMAGE: &str = "mcr.microsoft.com/iotedge/opc-proxy";
pub const OPCPROXY_CONTAINER_VERSION: &str = "1.0.4";
pub const OPCTWIN_CONTAINER_IMAGE: &str = "mcr.microsoft.com/iotedge/opc-twin";
pub const OPCTWIN_CONTAINER_VERSION: &str = "";
pub const OPCPLC_CONTAINER_IMAGE: &str = "mcr.microsoft.com/iotedge/opc-plc";
pub const OPCPLC_CONTAINER_VERSION: &str = "";

// Shopfloor simulation images carry their version in the tag already.
pub const CFMES_CONTAINER_IMAGE: &str = "azure-iot-connected-factory-cfmes:latest";
pub const CFSTATION_CONTAINER_IMAGE: &str = "azure-iot-connected-factory-cfsta:latest";

/// Platform the generated scripts should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetPlatform {
    Linux,
    Windows,
    Wsl,
}

impl TargetPlatform {
    /// Detects the platform the tool is currently running on.
    ///
    /// Linux hosts are reported as [`TargetPlatform::Wsl`] when
    /// `/proc/version` mentions Microsoft. Returns `None` on operating
    /// systems the generated scripts cannot target.
    pub fn detect() -> Option<Self> {
        match std::env::consts::OS {
            "linux" => {
                let version = std::fs::read_to_string("/proc/version").unwrap_or_default();
                if version.contains("Microsoft") || version.contains("microsoft") {
                    Some(TargetPlatform::Wsl)
                } else {
                    Some(TargetPlatform::Linux)
                }
            }
            "windows" => Some(TargetPlatform::Windows),
            _ => None,
        }
    }

    /// The OS the containers themselves run on. WSL hosts run Linux
    /// containers.
    pub fn container_os(self) -> ContainerOs {
        match self {
            TargetPlatform::Windows => ContainerOs::Windows,
            TargetPlatform::Linux | TargetPlatform::Wsl => ContainerOs::Linux,
        }
    }

    /// True for platforms using Windows path syntax (`<drive>:/...`).
    pub fn uses_windows_paths(self) -> bool {
        matches!(self, TargetPlatform::Windows | TargetPlatform::Wsl)
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetPlatform::Linux => write!(f, "linux"),
            TargetPlatform::Windows => write!(f, "windows"),
            TargetPlatform::Wsl => write!(f, "wsl"),
        }
    }
}

/// OS flavor of the container images to reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerOs {
    Linux,
    Windows,
}

impl ContainerOs {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerOs::Linux => "linux",
            ContainerOs::Windows => "windows",
        }
    }
}

/// CPU architecture segment of the image tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuArch {
    Amd64,
    Arm32v7,
}

impl CpuArch {
    pub fn detect() -> Self {
        if std::env::consts::ARCH == "x86_64" {
            CpuArch::Amd64
        } else {
            CpuArch::Arm32v7
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CpuArch::Amd64 => "amd64",
            CpuArch::Arm32v7 => "arm32v7",
        }
    }
}

/// Upstream protocol IoT Edge uses towards the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UpstreamProtocol {
    #[value(name = "Amqp")]
    Amqp,
    #[value(name = "AmqpWs")]
    AmqpWs,
}

impl UpstreamProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamProtocol::Amqp => "Amqp",
            UpstreamProtocol::AmqpWs => "AmqpWs",
        }
    }
}

impl fmt::Display for UpstreamProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Prefixes the image with the registry unless it already carries a
/// registry path.
pub fn registry_qualified(registry: &str, image: &str) -> String {
    if image.contains('/') {
        image.to_string()
    } else {
        format!("{}/{}", registry, image)
    }
}

/// Builds a full image reference in the `name:version-os-cpu` tagging
/// scheme used by the gateway images. An empty version leaves the tag
/// starting with the OS segment.
pub fn platform_image(
    registry: &str,
    image: &str,
    version: &str,
    os: ContainerOs,
    cpu: CpuArch,
) -> String {
    let base = registry_qualified(registry, image);
    let tagged = if version.is_empty() {
        format!("{}:", base)
    } else {
        format!("{}:{}-", base, version)
    };
    format!("{}{}-{}", tagged, os.as_str(), cpu.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_prefix_only_for_unqualified_images() {
        assert_eq!(
            registry_qualified("microsoft", "opc-proxy"),
            "microsoft/opc-proxy"
        );
        assert_eq!(
            registry_qualified("microsoft", "mcr.microsoft.com/iotedge/opc-proxy"),
            "mcr.microsoft.com/iotedge/opc-proxy"
        );
    }

    #[test]
    fn image_tag_with_version() {
        assert_eq!(
            platform_image(
                "microsoft",
                OPCPROXY_CONTAINER_IMAGE,
                OPCPROXY_CONTAINER_VERSION,
                ContainerOs::Linux,
                CpuArch::Amd64
            ),
            "mcr.microsoft.com/iotedge/opc-proxy:1.0.4-linux-amd64"
        );
    }

    #[test]
    fn image_tag_without_version() {
        assert_eq!(
            platform_image(
                "microsoft",
                OPCPUBLISHER_CONTAINER_IMAGE,
                OPCPUBLISHER_CONTAINER_VERSION,
                ContainerOs::Windows,
                CpuArch::Arm32v7
            ),
            "mcr.microsoft.com/iotedge/opc-publisher:windows-arm32v7"
        );
    }

    #[test]
    fn wsl_runs_linux_containers() {
        assert_eq!(TargetPlatform::Wsl.container_os(), ContainerOs::Linux);
        assert_eq!(TargetPlatform::Windows.container_os(), ContainerOs::Windows);
    }
}
