use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use iiot_core::platform::{TargetPlatform, UpstreamProtocol};

/// The Industrial IoT edge gateway provisioning CLI.
#[derive(Parser, Debug)]
#[command(name = "iiotedge")]
#[command(about = "Installs an Industrial IoT gateway based on IoT Edge", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available deployment scenarios.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generates scripts for an Azure Industrial IoT gateway deployment.
    Gw {
        /// The site (factory/production line) of the installation. This is
        /// not a DNS domain, but a topology site used to address hosts with
        /// identical IP addresses from the cloud or build redundant systems.
        site: String,

        /// The configuration file specifying the OPC UA nodes to publish.
        /// Requires the hostdir parameter to be set to a directory.
        #[arg(long)]
        nodesconfig: Option<PathBuf>,

        /// The configuration file specifying the format of the telemetry to
        /// be ingested by the publisher. Requires the hostdir parameter to
        /// be set to a directory.
        #[arg(long)]
        telemetryconfig: Option<PathBuf>,

        #[command(flatten)]
        common: CommonOpts,
    },
    /// Generates scripts for a Connectedfactory domain/factory.
    Cf {
        /// The domain of the installation. This is not a DNS domain, but a
        /// topology domain used to address hosts with identical hostnames
        /// from the cloud.
        domain: String,

        #[command(flatten)]
        topology: TopologyOpts,

        #[command(flatten)]
        common: CommonOpts,
    },
    /// Generates scripts for the Connectedfactory shopfloor simulation.
    Cfsim {
        #[command(flatten)]
        topology: TopologyOpts,

        #[command(flatten)]
        common: CommonOpts,
    },
}

impl Commands {
    pub fn common(&self) -> &CommonOpts {
        match self {
            Commands::Gw { common, .. }
            | Commands::Cf { common, .. }
            | Commands::Cfsim { common, .. } => common,
        }
    }
}

/// Topology source, exactly one of file or URL.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct TopologyOpts {
    /// The location of the topology configuration file.
    #[arg(long)]
    pub topofile: Option<PathBuf>,

    /// The URL of the topology configuration file.
    #[arg(long)]
    pub topourl: Option<String>,
}

/// Options shared by all subcommands.
#[derive(Args, Debug, Clone)]
pub struct CommonOpts {
    /// Name of the IoTHub to use.
    #[arg(long)]
    pub iothubname: String,

    /// The container registry for all used containers.
    #[arg(long)]
    pub dockerregistry: Option<String>,

    /// A directory on the host machine, which containers use for log,
    /// config and certificate files. Use the syntax of your target platform
    /// to specify (for WSL use Windows syntax). If not specified everything
    /// is kept in Docker volumes.
    #[arg(long)]
    pub hostdir: Option<String>,

    /// The directory where all generated files are created.
    #[arg(long, default_value = "./out")]
    pub outdir: PathBuf,

    /// The scripts created should target a different platform than you are
    /// working on. Default: the platform you are working on.
    #[arg(long, value_enum)]
    pub targetplatform: Option<TargetPlatform>,

    /// Forces to use Linux Containers On Windows. Only valid for a Windows
    /// target platform.
    #[arg(long)]
    pub lcow: bool,

    /// Forces deletion of existing IoT Edge deployment and device if they
    /// exist.
    #[arg(long)]
    pub force: bool,

    /// Schema for the proxy.
    #[arg(long, default_value = "http")]
    pub proxyschema: String,

    /// Hostname of the proxy to enable IoT Edge communication via proxy.
    #[arg(long)]
    pub proxyhost: Option<String>,

    /// Port to use for the proxy.
    #[arg(long)]
    pub proxyport: Option<u16>,

    /// Username to use for proxy authentication.
    #[arg(long)]
    pub proxyusername: Option<String>,

    /// Password to use for proxy authentication.
    #[arg(long)]
    pub proxypassword: Option<String>,

    /// The upstream protocol IoT Edge should use for communication via
    /// proxy.
    #[arg(long, value_enum, default_value_t = UpstreamProtocol::Amqp)]
    pub upstreamprotocol: UpstreamProtocol,

    /// .pem containing a service principal cert to login to Azure.
    #[arg(short = 's', long)]
    pub serviceprincipalcert: Option<PathBuf>,

    /// TenantId of the Azure tenant to login.
    #[arg(short = 't', long)]
    pub tenantid: Option<String>,

    /// AppId of the Azure service principal to login.
    #[arg(short = 'a', long)]
    pub appid: Option<String>,

    /// The log level. Allowed: error, warn, info, debug, trace.
    #[arg(long, default_value = "info")]
    pub loglevel: String,
}
