//! Scenario drivers: the per-subcommand pipelines and the provisioning
//! steps they share.

pub mod cf;
pub mod cfsim;
pub mod gw;

use std::fs;

use log::{info, warn};
use serde_json::Value;

use iiot_core::compose::ComposeFile;
use iiot_core::error::CoreError;
use iiot_core::manifest::{map_services, DeploymentDocument};
use iiot_core::nodes::published_nodes_for_factory;
use iiot_core::platform::{TargetPlatform, UpstreamProtocol};
use iiot_core::script::{Phase, ScriptSet};
use iiot_core::template;
use iiot_core::topology::{Factory, TopologyDocument};

use crate::args::{CommonOpts, TopologyOpts};
use crate::azure::{AzureCli, CommandRunner, ResourceState};
use crate::error::{CliError, Result};
use crate::setup::ProvisionEnv;

/// Naming scheme of the cloud resources and tags for one deployment
/// flavor. The gateway flavor stamps `tags.iiot`/`tags.site`, the
/// Connectedfactory flavor `tags.opc`/`tags.domain`.
pub struct DeploymentFlavor {
    pub deployment_prefix: &'static str,
    pub device_prefix: &'static str,
    pub tag_key: &'static str,
    pub scope_key: &'static str,
    pub deployment_template: &'static str,
}

pub const SITE_FLAVOR: DeploymentFlavor = DeploymentFlavor {
    deployment_prefix: "iiot-deployment-",
    device_prefix: "iiot-edge-",
    tag_key: "iiot",
    scope_key: "site",
    deployment_template: "iiot-edge-deployment-content-template.json",
};

pub const DOMAIN_FLAVOR: DeploymentFlavor = DeploymentFlavor {
    deployment_prefix: "opc-deployment-",
    device_prefix: "iot-edge-",
    tag_key: "opc",
    scope_key: "domain",
    deployment_template: "iot-edge-opc-deployment-content-template.json",
};

impl DeploymentFlavor {
    pub fn deployment_name(&self, scope: &str) -> String {
        format!("{}{}", self.deployment_prefix, scope)
    }

    pub fn device_id(&self, scope: &str) -> String {
        format!("{}{}", self.device_prefix, scope)
    }

    pub fn target_condition(&self, scope: &str) -> String {
        format!(
            "tags.{}='true' and tags.{}='{}'",
            self.tag_key, self.scope_key, scope
        )
    }

    /// Compact tag JSON for the device-twin update.
    pub fn device_tags(&self, scope: &str) -> String {
        let mut tags = serde_json::Map::new();
        tags.insert(self.tag_key.to_string(), Value::String("true".to_string()));
        tags.insert(self.scope_key.to_string(), Value::String(scope.to_string()));
        Value::Object(tags).to_string()
    }
}

/// Logs in with the service principal when one was given, otherwise
/// verifies the existing CLI session.
pub fn login<R: CommandRunner>(env: &ProvisionEnv, az: &mut AzureCli<R>) -> Result<()> {
    match &env.credentials {
        Some(principal) => {
            az.login_with_service_principal(&principal.app_id, &principal.cert, &principal.tenant_id)?
        }
        None => az.verify_session()?,
    }
    Ok(())
}

/// Loads the topology description from the configured file or URL.
pub fn load_topology(source: &TopologyOpts) -> Result<TopologyDocument> {
    let text = if let Some(url) = &source.topourl {
        let url = url.trim();
        if url.is_empty() {
            return Err(CliError::Precondition(
                "the topology URL argument is empty".to_string(),
            ));
        }
        info!("Loading topology file from '{}'", url);
        reqwest::blocking::get(url)?.text()?
    } else if let Some(path) = &source.topofile {
        if !path.is_file() {
            return Err(CliError::Precondition(format!(
                "the file '{}' with the topology description does not exist",
                path.display()
            )));
        }
        info!("Loading topology file from '{}'", path.display());
        fs::read_to_string(path)?
    } else {
        // clap enforces the group; keep the error explicit anyway
        return Err(CliError::Precondition(
            "either --topofile or --topourl must be given".to_string(),
        ));
    };
    Ok(TopologyDocument::parse(&text)?)
}

/// Generates the published-nodes document for one factory and places it
/// into the output directory and, when reachable, the host directory.
pub fn write_published_nodes(env: &ProvisionEnv, factory: &Factory, domain: &str) -> Result<()> {
    let Some(document) = published_nodes_for_factory(factory)? else {
        warn!(
            "There are no nodes configured to publish for domain {}",
            domain
        );
        return Ok(());
    };
    let file_name = format!("publishednodes-{}.json", domain);
    let out_path = env.outdir.join(&file_name);
    let json = serde_json::to_string_pretty(&document).map_err(CoreError::from)?;
    template::write_text(&out_path, &json, env.style.newline)?;
    if let Some(host_dir) = &env.host_dir_local {
        fs::copy(&out_path, host_dir.join(&file_name))?;
    }
    Ok(())
}

/// Ensures the deployment exists: renders the compose template, maps its
/// services into the manifest and issues the create, unless an existing
/// deployment is being reused.
#[allow(clippy::too_many_arguments)]
pub fn provision_deployment<R: CommandRunner>(
    env: &ProvisionEnv,
    az: &mut AzureCli<R>,
    flavor: &DeploymentFlavor,
    scope: &str,
    force: bool,
    compose_template: &str,
    tokens: Vec<(&str, String)>,
) -> Result<()> {
    let deployment_name = flavor.deployment_name(scope);
    let mut machine = az.prepare_deployment(&deployment_name, force)?;
    if machine.state() != ResourceState::Creating {
        return Ok(());
    }
    info!("Creating deployment '{}'", deployment_name);

    let yml_file_name = format!("{}.yml", scope);
    let rendered = template::render_to_file(
        &env.template_dir.join(compose_template),
        &env.outdir.join(&yml_file_name),
        &tokens,
        env.style.newline,
    )?;

    let compose = ComposeFile::parse(&rendered)?;
    let mapped = map_services(scope, env.platform, &compose.services)?;

    let skeleton = fs::read_to_string(env.template_dir.join(flavor.deployment_template))?;
    let mut document = DeploymentDocument::parse(&skeleton)?;
    if let Some(proxy) = &env.proxy {
        document.set_proxy(&proxy.url())?;
    }
    if env.upstream != UpstreamProtocol::Amqp {
        document.set_upstream_protocol(env.upstream.as_str())?;
    }
    document.set_modules(&mapped)?;

    let manifest_path = env.outdir.join(format!("{}.json", deployment_name));
    template::write_text(&manifest_path, &document.to_pretty()?, env.style.newline)?;

    az.create_deployment(
        &deployment_name,
        &manifest_path,
        &flavor.target_condition(scope),
    )?;
    machine.created();
    Ok(())
}

/// Ensures the device identity exists (tagging it on creation) and
/// returns its connection string.
pub fn provision_device<R: CommandRunner>(
    az: &mut AzureCli<R>,
    flavor: &DeploymentFlavor,
    scope: &str,
    force: bool,
) -> Result<String> {
    let device_id = flavor.device_id(scope);
    let mut machine = az.prepare_device(&device_id, force)?;
    if machine.state() == ResourceState::Creating {
        info!("Creating device '{}'", device_id);
        az.create_device(&device_id)?;
        az.update_device_tags(&device_id, &flavor.device_tags(scope))?;
        machine.created();
    }
    Ok(az.device_connection_string(&device_id)?)
}

/// Provisions a Connectedfactory domain as an IoT Edge installation and
/// appends its lifecycle commands. Shared by the `cf` subcommand and the
/// edge domain of the simulation.
pub fn provision_edge_domain<R: CommandRunner>(
    env: &ProvisionEnv,
    common: &CommonOpts,
    az: &mut AzureCli<R>,
    scripts: &mut ScriptSet,
    domain: &str,
    hub_connection_string: &str,
) -> Result<()> {
    let tokens = vec![
        ("OPCPROXY_CONTAINER", env.proxy_image.clone()),
        ("OPCPUBLISHER_CONTAINER", env.publisher_image.clone()),
        ("DOMAIN", domain.to_string()),
        ("HOSTDIR", env.bind_source.clone()),
        ("EXTRAHOSTS", env.extra_hosts_block.clone()),
    ];
    provision_deployment(env, az, &DOMAIN_FLAVOR, domain, common.force, "domain.yml", tokens)?;
    let device_connection_string = provision_device(az, &DOMAIN_FLAVOR, domain, common.force)?;

    scripts.push_background(Phase::Start, "iotedgectl start");
    scripts.push_background(Phase::Stop, "iotedgectl stop");

    let init_yml = format!("{}-edge-init.yml", domain);
    template::render_to_file(
        &env.template_dir.join("domain-edge-init.yml"),
        &env.outdir.join(&init_yml),
        &[
            ("OPCPROXY_CONTAINER", env.proxy_image.clone()),
            ("DOMAIN", domain.to_string()),
            ("HOSTDIR", env.bind_source.clone()),
            ("IOTHUB_CONNECTIONSTRING", hub_connection_string.to_string()),
        ],
        env.style.newline,
    )?;

    let debug_option = if common.loglevel.eq_ignore_ascii_case("debug") {
        "--runtime-log-level debug"
    } else {
        ""
    };
    scripts.push_background(
        Phase::Init,
        format!(
            "iotedgectl setup --connection-string \"{}\" --auto-cert-gen-force-no-passwords {}",
            device_connection_string, debug_option
        ),
    );
    scripts.push(Phase::Init, format!("docker pull {}", env.proxy_image));
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
    scripts.push_background(Phase::Deinit, "iotedgectl uninstall");
    Ok(())
}

/// The pause command generated into the start scripts while compose
/// stacks come up.
pub fn pause_command(platform: TargetPlatform) -> &'static str {
    if platform == TargetPlatform::Windows {
        "timeout"
    } else {
        "sleep"
    }
}

/// Copies the static helper scripts the generated scripts reference into
/// the output directory.
pub fn copy_platform_assets(env: &ProvisionEnv) -> Result<()> {
    if env.cross_target {
        let assets: &[&str] = match env.platform {
            TargetPlatform::Windows => &[
                "Init-IotEdgeService.ps1",
                "Deinit-IotEdgeService.ps1",
                "Prepare-IIotHost.ps1",
            ],
            TargetPlatform::Linux | TargetPlatform::Wsl => &[
                "iiotedge-install-prerequisites.sh",
                "iiotedge-install-linux-packages.sh",
            ],
        };
        copy_assets(env, assets)?;
        info!("");
        info!(
            "Please copy any required script files from '{}' to your target system.",
            env.outdir.display()
        );
        if let (Some(config_dir), Some(host_dir)) = (&env.config_dir, &env.host_dir) {
            info!(
                "Please copy any required configuration files from '{}' to your target system to directory '{}'.",
                config_dir.display(),
                host_dir
            );
        }
    } else if env.platform == TargetPlatform::Windows {
        copy_assets(
            env,
            &[
                "Init-IotEdgeService.ps1",
                "Deinit-IotEdgeService.ps1",
                "Prepare-WindowsGatewayStep1.ps1",
                "Prepare-WindowsGatewayStep2.ps1",
            ],
        )?;
    }
    Ok(())
}

fn copy_assets(env: &ProvisionEnv, names: &[&str]) -> Result<()> {
    for name in names {
        fs::copy(env.template_dir.join(name), env.outdir.join(name))?;
    }
    Ok(())
}
