//! The `cf` scenario: one Connectedfactory domain out of the topology.

use log::info;

use iiot_core::script::ScriptSet;
use iiot_core::topology::{normalized_domain_name, TopologyDocument};

use crate::args::CommonOpts;
use crate::azure::{AzureCli, CommandRunner};
use crate::error::{CliError, Result};
use crate::scenario;
use crate::setup::ProvisionEnv;

pub fn run<R: CommandRunner>(
    env: &ProvisionEnv,
    common: &CommonOpts,
    az: &mut AzureCli<R>,
    scripts: &mut ScriptSet,
    hub_connection_string: &str,
    domain: &str,
    topology: &TopologyDocument,
) -> Result<()> {
    let domain = normalized_domain_name(domain);
    let factory = topology
        .factories
        .iter()
        .find(|factory| normalized_domain_name(&factory.domain) == domain)
        .ok_or_else(|| {
            CliError::Precondition(format!(
                "the domain '{}' is not part of the topology",
                domain
            ))
        })?;

    scenario::write_published_nodes(env, factory, &domain)?;

    info!(
        "Create the domain initialization and configuration for '{}'",
        factory.display_name()
    );
    scenario::provision_edge_domain(env, common, az, scripts, &domain, hub_connection_string)
}
