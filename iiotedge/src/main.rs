use clap::Parser;
use log::{error, info, warn, LevelFilter};

pub mod args;
pub mod azure;
pub mod error;
pub mod hosts;
pub mod scenario;
pub mod setup;

use std::path::PathBuf;

use args::{Cli, Commands};
use azure::{AzureCli, ShellRunner};
use error::Result;
use iiot_core::script::ScriptSet;
use iiot_core::topology::TopologyDocument;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.command.common().loglevel);

    if let Err(err) = run(cli) {
        error!("{}. Exiting...", err);
        std::process::exit(err.exit_code());
    }
}

fn init_logging(level: &str) {
    let (filter, unknown) = match level.to_lowercase().as_str() {
        "error" | "critical" => (LevelFilter::Error, false),
        "warn" | "warning" => (LevelFilter::Warn, false),
        "info" => (LevelFilter::Info, false),
        "debug" => (LevelFilter::Debug, false),
        "trace" => (LevelFilter::Trace, false),
        _ => (LevelFilter::Info, true),
    };
    env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .init();
    if unknown {
        warn!("Unknown log level '{}', using 'info'", level);
    }
}

/// Per-subcommand data gathered by the precondition phase.
enum Prepared {
    Gw {
        site: String,
        nodesconfig: Option<PathBuf>,
        telemetryconfig: Option<PathBuf>,
    },
    Cf {
        domain: String,
        topology: TopologyDocument,
    },
    Cfsim {
        topology: TopologyDocument,
        edge_domain: String,
    },
}

fn run(cli: Cli) -> Result<()> {
    let common = cli.command.common().clone();
    let env = setup::resolve(&common)?;

    // argument and input-file preconditions fail before any cloud access
    let prepared = match &cli.command {
        Commands::Gw {
            site,
            nodesconfig,
            telemetryconfig,
            ..
        } => {
            scenario::gw::validate(&env, nodesconfig.as_deref(), telemetryconfig.as_deref())?;
            Prepared::Gw {
                site: site.clone(),
                nodesconfig: nodesconfig.clone(),
                telemetryconfig: telemetryconfig.clone(),
            }
        }
        Commands::Cf {
            domain, topology, ..
        } => Prepared::Cf {
            domain: domain.clone(),
            topology: scenario::load_topology(topology)?,
        },
        Commands::Cfsim { topology, .. } => {
            let topology = scenario::load_topology(topology)?;
            let edge_domain = scenario::cfsim::validate(&env, &topology)?;
            Prepared::Cfsim {
                topology,
                edge_domain,
            }
        }
    };

    let mut az = AzureCli::new(common.iothubname.clone(), ShellRunner);
    scenario::login(&env, &mut az)?;
    az.verify_hub()?;
    let hub_connection_string = az.hub_connection_string()?;

    let mut scripts = ScriptSet::new(env.style);

    match prepared {
        Prepared::Gw {
            site,
            nodesconfig,
            telemetryconfig,
        } => scenario::gw::run(
            &env,
            &common,
            &mut az,
            &mut scripts,
            &hub_connection_string,
            &site,
            nodesconfig.as_deref(),
            telemetryconfig.as_deref(),
        )?,
        Prepared::Cf { domain, topology } => scenario::cf::run(
            &env,
            &common,
            &mut az,
            &mut scripts,
            &hub_connection_string,
            &domain,
            &topology,
        )?,
        Prepared::Cfsim {
            topology,
            edge_domain,
        } => scenario::cfsim::run(
            &env,
            &common,
            &mut az,
            &mut scripts,
            &hub_connection_string,
            &topology,
            &edge_domain,
        )?,
    }

    scripts.write_all(&env.outdir)?;
    scenario::copy_platform_assets(&env)?;

    info!("");
    if env.cross_target {
        info!(
            "The generated script files can be found in: '{}'. Please copy them to your target system.",
            env.outdir.display()
        );
    } else {
        info!(
            "The generated script files can be found in: '{}'",
            env.outdir.display()
        );
    }
    info!("");
    info!("Operation completed.");
    Ok(())
}
