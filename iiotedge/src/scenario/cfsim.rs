//! The `cfsim` scenario: the whole shopfloor simulation out of the
//! topology description.
//!
//! The first simulation factory becomes the IoT Edge installation; every
//! other simulation factory runs its components as a standalone compose
//! stack. Each production line gets its own compose stack on the
//! domain's network.

use log::info;

use iiot_core::script::{Phase, ScriptSet};
use iiot_core::template;
use iiot_core::topology::{normalized_domain_name, ProductionLine, TopologyDocument};

use crate::args::CommonOpts;
use crate::azure::{AzureCli, CommandRunner};
use crate::error::{CliError, Result};
use crate::scenario::{self, pause_command};
use crate::setup::ProvisionEnv;

// Well-known OPC UA ports of the simulated station types.
pub const ASSEMBLY_PORT: u16 = 51210;
pub const TEST_PORT: u16 = 51211;
pub const PACKAGING_PORT: u16 = 51212;

const ASSEMBLY_TOKENS: [&str; 6] = [
    "ASSEMBLY_HOSTNAME",
    "ASSEMBLY_ENDPOINT",
    "ASSEMBLY_PORT",
    "ASSEMBLY_POWERCONSUMPTION",
    "ASSEMBLY_CYCLETIME",
    "ASSEMBLY_GENERATEALERTS",
];
const TEST_TOKENS: [&str; 6] = [
    "TEST_HOSTNAME",
    "TEST_ENDPOINT",
    "TEST_PORT",
    "TEST_POWERCONSUMPTION",
    "TEST_CYCLETIME",
    "TEST_GENERATEALERTS",
];
const PACKAGING_TOKENS: [&str; 6] = [
    "PACKAGING_HOSTNAME",
    "PACKAGING_ENDPOINT",
    "PACKAGING_PORT",
    "PACKAGING_POWERCONSUMPTION",
    "PACKAGING_CYCLETIME",
    "PACKAGING_GENERATEALERTS",
];

/// Precondition checks; returns the domain that runs as the IoT Edge
/// installation.
pub fn validate(env: &ProvisionEnv, topology: &TopologyDocument) -> Result<String> {
    // the simulation keeps logs and shared secrets on the host file
    // system
    if env.host_dir.is_none() {
        return Err(CliError::Precondition(
            "subcommand cfsim requires specification of a host directory for --hostdir".to_string(),
        ));
    }
    topology.first_simulation_domain().ok_or_else(|| {
        CliError::Precondition(
            "subcommand cfsim requires a topology with at least one domain/factory of type 'Simulation'"
                .to_string(),
        )
    })
}

pub fn run<R: CommandRunner>(
    env: &ProvisionEnv,
    common: &CommonOpts,
    az: &mut AzureCli<R>,
    scripts: &mut ScriptSet,
    hub_connection_string: &str,
    topology: &TopologyDocument,
    edge_domain: &str,
) -> Result<()> {
    for factory in &topology.factories {
        if !factory.is_simulation() {
            continue;
        }
        let domain = normalized_domain_name(&factory.domain);
        scenario::write_published_nodes(env, factory, &domain)?;

        info!(
            "Create the domain initialization and configuration for '{}'",
            factory.display_name()
        );
        if domain == edge_domain {
            scenario::provision_edge_domain(env, common, az, scripts, &domain, hub_connection_string)?;
        } else {
            provision_standalone_domain(env, scripts, &domain, hub_connection_string)?;
        }

        for line in &factory.production_lines {
            info!(
                "Create a production line '{}' in factory '{}' for the shopfloor simulation",
                line.normalized_name(),
                factory.display_name()
            );
            generate_production_line(env, scripts, edge_domain, &domain, line)?;
        }
    }
    Ok(())
}

/// A domain that runs its components directly via compose instead of as
/// IoT Edge modules.
fn provision_standalone_domain(
    env: &ProvisionEnv,
    scripts: &mut ScriptSet,
    domain: &str,
    hub_connection_string: &str,
) -> Result<()> {
    // init stack: writes the connection-string mapping and certificates
    let init_yml = format!("{}-init.yml", domain);
    template::render_to_file(
        &env.template_dir.join("domain-init.yml"),
        &env.outdir.join(&init_yml),
        &[
            ("OPCPROXY_CONTAINER", env.proxy_image.clone()),
            ("OPCPUBLISHER_CONTAINER", env.publisher_image.clone()),
            ("DOMAIN", domain.to_string()),
            ("HOSTDIR", env.bind_source.clone()),
            (
                "IOTHUB_CONNECTIONSTRING",
                hub_connection_string.to_string(),
            ),
        ],
        env.style.newline,
    )?;
    scripts.push(Phase::Init, format!("docker pull {}", env.proxy_image));
    scripts.push(Phase::Init, format!("docker pull {}", env.publisher_image));
    scripts.push_background(
        Phase::Init,
        format!("docker-compose -p {} -f {} up", domain, init_yml),
    );
    scripts.push_background(Phase::Deinit, format!("docker volume rm {}_cfappdata", domain));
    scripts.push_background(
        Phase::Deinit,
        format!("docker volume rm {}_cfx509certstores", domain),
    );
    scripts.push_background(
        Phase::Deinit,
        format!("docker-compose -p {} -f {} down", domain, init_yml),
    );

    // runtime stack
    let yml = format!("{}.yml", domain);
    template::render_to_file(
        &env.template_dir.join("domain.yml"),
        &env.outdir.join(&yml),
        &[
            ("OPCPROXY_CONTAINER", env.proxy_image.clone()),
            ("OPCPUBLISHER_CONTAINER", env.publisher_image.clone()),
            ("DOMAIN", domain.to_string()),
            ("HOSTDIR", env.bind_source.clone()),
            ("EXTRAHOSTS", env.extra_hosts_block.clone()),
        ],
        env.style.newline,
    )?;
    scripts.push(Phase::Start, format!("docker pull {}", env.proxy_image));
    scripts.push(Phase::Start, format!("docker pull {}", env.publisher_image));
    scripts.push(Phase::Start, format!("docker rm proxy-{}", domain));
    scripts.push(Phase::Start, format!("docker rm publisher-{}", domain));
    scripts.push_background(
        Phase::Start,
        format!("docker-compose -p {} -f {} up", domain, yml),
    );
    scripts.push(Phase::Start, format!("{} 10", pause_command(env.platform)));
    scripts.push_background(
        Phase::Stop,
        format!("docker-compose -p {} -f {} down", domain, yml),
    );
    Ok(())
}

/// Renders one production-line compose stack and its lifecycle commands.
fn generate_production_line(
    env: &ProvisionEnv,
    scripts: &mut ScriptSet,
    edge_domain: &str,
    domain: &str,
    line: &ProductionLine,
) -> Result<()> {
    let line_name = line.normalized_name();
    let scoped_name = format!("{}-{}", domain, line_name);
    // the line joins the network of its domain's components
    let network = if domain == edge_domain {
        "azure-iot-edge".to_string()
    } else {
        format!("{}_default", domain)
    };

    let mut tokens = vec![
        ("CFMES_CONTAINER", env.mes_image.clone()),
        ("CFSTATION_CONTAINER", env.station_image.clone()),
        ("DOMAIN_NETWORK", network),
        ("DOMAIN", domain.to_string()),
        ("PRODUCTIONLINE", line_name.clone()),
        ("MES_HOSTNAME", format!("{}-mes", scoped_name)),
        ("HOSTDIR", env.bind_source.clone()),
    ];

    for station in &line.stations {
        let Some(kind) = station.simulation_type() else {
            continue;
        };
        let (names, port, default_args) = match kind.as_str() {
            "assembly" => (ASSEMBLY_TOKENS, ASSEMBLY_PORT, "200 8 yes"),
            "test" => (TEST_TOKENS, TEST_PORT, "100 10 no"),
            "packaging" => (PACKAGING_TOKENS, PACKAGING_PORT, "150 6 no"),
            _ => continue,
        };
        let args = station.simulation_args().unwrap_or(default_args);
        let endpoint = station.opc_endpoint_url.clone().unwrap_or_else(|| {
            format!("opc.tcp://{}-{}:{}", scoped_name, kind, port)
        });
        let mut fields = args.split_whitespace();
        let power_consumption = fields.next().unwrap_or_default();
        let cycle_time = fields.next().unwrap_or_default();
        let generate_alerts = fields.next().unwrap_or_default();

        tokens.push((names[0], format!("{}-{}", scoped_name, kind)));
        tokens.push((names[1], endpoint));
        tokens.push((names[2], port.to_string()));
        tokens.push((names[3], format!("--pc {}", power_consumption)));
        tokens.push((names[4], format!("--ct {}", cycle_time)));
        tokens.push((
            names[5],
            if generate_alerts.eq_ignore_ascii_case("yes") {
                "--ga".to_string()
            } else {
                String::new()
            },
        ));
    }

    let yml = format!("{}.yml", scoped_name);
    template::render_to_file(
        &env.template_dir.join("cfproductionline.yml"),
        &env.outdir.join(&yml),
        &tokens,
        env.style.newline,
    )?;

    scripts.push(Phase::Start, format!("docker pull {}", env.mes_image));
    scripts.push(Phase::Start, format!("docker pull {}", env.station_image));
    for suffix in ["mes", "assembly", "test", "packaging"] {
        scripts.push(Phase::Start, format!("docker rm {}-{}", scoped_name, suffix));
    }
    scripts.push_background(
        Phase::Start,
        format!("docker-compose -p {} -f {} up", scoped_name, yml),
    );
    scripts.push(Phase::Start, format!("{} 10", pause_command(env.platform)));
    scripts.push_background(
        Phase::Stop,
        format!("docker-compose -p {} -f {} down", scoped_name, yml),
    );
    Ok(())
}
