//! The `gw` scenario: one Industrial IoT gateway site.

use std::fs;
use std::path::Path;

use log::info;

use iiot_core::platform::{TargetPlatform, UpstreamProtocol};
use iiot_core::script::{Phase, ScriptSet};
use iiot_core::template;
use iiot_core::topology::normalized_domain_name;

use crate::args::CommonOpts;
use crate::azure::{AzureCli, CommandRunner};
use crate::error::{CliError, Result};
use crate::scenario::{self, SITE_FLAVOR};
use crate::setup::ProvisionEnv;

/// Precondition checks that must run before any cloud access.
pub fn validate(
    env: &ProvisionEnv,
    nodesconfig: Option<&Path>,
    telemetryconfig: Option<&Path>,
) -> Result<()> {
    validate_config_file(env, nodesconfig, "nodesconfig")?;
    validate_config_file(env, telemetryconfig, "telemetryconfig")
}

fn validate_config_file(env: &ProvisionEnv, path: Option<&Path>, option: &str) -> Result<()> {
    let Some(path) = path else { return Ok(()) };
    if !path.is_file() {
        return Err(CliError::Precondition(format!(
            "the {} file '{}' can not be found or is not a file",
            option,
            path.display()
        )));
    }
    // the file ends up on the host file system, so a host directory is
    // needed to place it
    if env.host_dir.is_none() {
        return Err(CliError::Precondition(format!(
            "if --{} is specified you need to specify a host directory for --hostdir as well",
            option
        )));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn run<R: CommandRunner>(
    env: &ProvisionEnv,
    common: &CommonOpts,
    az: &mut AzureCli<R>,
    scripts: &mut ScriptSet,
    hub_connection_string: &str,
    site: &str,
    nodesconfig: Option<&Path>,
    telemetryconfig: Option<&Path>,
) -> Result<()> {
    let site = normalized_domain_name(site);

    copy_config_file(env, nodesconfig, &format!("pn-{}.json", site))?;
    copy_config_file(env, telemetryconfig, &format!("tc-{}.json", site))?;

    info!(
        "Create the site initialization and configuration for '{}'",
        site
    );

    let telemetry_option = telemetryconfig
        .map(|_| format!("--tc /d/tc-{}.json", site))
        .unwrap_or_default();
    let tokens = vec![
        ("OPCPUBLISHER_CONTAINER", env.publisher_image.clone()),
        ("OPCPROXY_CONTAINER", env.proxy_image.clone()),
        ("OPCTWIN_CONTAINER", env.twin_image.clone()),
        ("OPCPLC_CONTAINER", env.plc_image.clone()),
        ("TELEMETRYCONFIG_OPTION", telemetry_option),
        (
            "IOTHUB_CONNECTIONSTRING",
            hub_connection_string.to_string(),
        ),
        ("OPCTWIN_DEVICECONNECTIONSTRING_OPTION", String::new()),
        ("SITE", site.clone()),
        ("BINDSOURCE", env.bind_source.clone()),
        ("EXTRAHOSTS", env.extra_hosts_block.clone()),
    ];
    scenario::provision_deployment(env, az, &SITE_FLAVOR, &site, common.force, "site.yml", tokens)?;
    let device_connection_string =
        scenario::provision_device(az, &SITE_FLAVOR, &site, common.force)?;

    // the Windows gateway runs IoT Edge as a service
    if env.platform == TargetPlatform::Windows {
        scripts.push(Phase::Start, "Start-Service iotedge");
        scripts.push(Phase::Stop, "Stop-Service iotedge");
    }

    let init_yml = format!("{}-edge-init.yml", site);
    template::render_to_file(
        &env.template_dir.join("site-edge-init.yml"),
        &env.outdir.join(&init_yml),
        &[
            ("OPCPROXY_CONTAINER", env.proxy_image.clone()),
            (
                "IOTHUB_CONNECTIONSTRING",
                hub_connection_string.to_string(),
            ),
            ("SITE", site.clone()),
            ("BINDSOURCE", env.bind_source.clone()),
        ],
        env.style.newline,
    )?;

    scripts.push(Phase::Init, format!("docker volume create {}_cfappdata", site));
    scripts.push(Phase::Init, format!("docker pull {}", env.proxy_image));
    scripts.push_background(
        Phase::Init,
        format!("docker-compose -p {} -f {} up", site, init_yml),
    );
    scripts.push_background(
        Phase::Init,
        format!("docker-compose -p {} -f {} down", site, init_yml),
    );

    if env.platform == TargetPlatform::Windows {
        let mut init_command = format!(
            ". ./Init-IotEdgeService.ps1 -DeviceConnectionString \"{}\" -ContainerOs {}",
            device_connection_string,
            env.container_os.as_str()
        );
        if let Some(proxy) = &env.proxy {
            init_command.push_str(&format!(" -Proxy \"{}\"", proxy.endpoint()));
            if let Some(username) = &proxy.username {
                init_command.push_str(&format!(" -ProxyUsername {}", username));
            }
            if let Some(password) = &proxy.password {
                init_command.push_str(&format!(" -ProxyPassword {}", password));
            }
        }
        if env.upstream != UpstreamProtocol::Amqp {
            init_command.push_str(&format!(" -UpstreamProtocol {}", env.upstream));
        }
        scripts.push_background(Phase::Init, init_command);
        scripts.push_background(Phase::Deinit, ". ./Deinit-IotEdgeService.ps1");
    } else {
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
    }
    scripts.push_background(Phase::Deinit, format!("docker volume rm {}_cfappdata", site));

    Ok(())
}

/// Places a user-supplied configuration file where the target expects
/// it: the host directory when running on the device, the collected
/// config directory otherwise.
fn copy_config_file(env: &ProvisionEnv, source: Option<&Path>, file_name: &str) -> Result<()> {
    let Some(source) = source else { return Ok(()) };
    let target_dir = env
        .config_dir
        .as_ref()
        .or(env.host_dir_local.as_ref())
        .ok_or_else(|| {
            CliError::Precondition(
                "configuration files require a host directory for --hostdir".to_string(),
            )
        })?;
    fs::copy(source, target_dir.join(file_name))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use iiot_core::platform::{ContainerOs, CpuArch};
    use iiot_core::script::ScriptStyle;

    use crate::azure::testing::FakeRunner;
    use crate::setup::ProvisionEnv;

    fn test_env(outdir: PathBuf) -> ProvisionEnv {
        ProvisionEnv {
            platform: TargetPlatform::Linux,
            cross_target: true,
            container_os: ContainerOs::Linux,
            cpu: CpuArch::Amd64,
            outdir,
            config_dir: None,
            host_dir: None,
            host_dir_local: None,
            bind_source: "cfappdata".to_string(),
            registry: "microsoft".to_string(),
            publisher_image: "mcr.microsoft.com/iotedge/opc-publisher:linux-amd64".to_string(),
            proxy_image: "mcr.microsoft.com/iotedge/opc-proxy:1.0.4-linux-amd64".to_string(),
            twin_image: "mcr.microsoft.com/iotedge/opc-twin:linux-amd64".to_string(),
            plc_image: "mcr.microsoft.com/iotedge/opc-plc:linux-amd64".to_string(),
            mes_image: "microsoft/azure-iot-connected-factory-cfmes:latest".to_string(),
            station_image: "microsoft/azure-iot-connected-factory-cfsta:latest".to_string(),
            extra_hosts_block: "- \"gateway:10.0.0.1\"".to_string(),
            // the tests run against the real shipped templates
            template_dir: PathBuf::from("../templates"),
            style: ScriptStyle::for_platform(TargetPlatform::Linux),
            upstream: UpstreamProtocol::Amqp,
            proxy: None,
            credentials: None,
        }
    }

    fn common_opts(force: bool) -> CommonOpts {
        CommonOpts {
            iothubname: "testhub".to_string(),
            dockerregistry: None,
            hostdir: None,
            outdir: PathBuf::from("./out"),
            targetplatform: Some(TargetPlatform::Linux),
            lcow: false,
            force,
            proxyschema: "http".to_string(),
            proxyhost: None,
            proxyport: None,
            proxyusername: None,
            proxypassword: None,
            upstreamprotocol: UpstreamProtocol::Amqp,
            serviceprincipalcert: None,
            tenantid: None,
            appid: None,
            loglevel: "info".to_string(),
        }
    }

    const CONNECTION_STRING: &str =
        "HostName=testhub.azure-devices.net;DeviceId=iiot-edge-planta;SharedAccessKey=abc";

    #[test]
    fn fresh_site_renders_manifest_and_creates_both_resources() {
        let outdir = tempfile::tempdir().unwrap();
        let env = test_env(outdir.path().to_path_buf());
        let mut az = AzureCli::new(
            "testhub".to_string(),
            FakeRunner::with_responses(&[
                "",                                     // deployment list: absent
                r#"{"id": "iiot-deployment-planta"}"#,  // deployment create
                "",                                     // device show: absent
                r#"{"deviceId": "iiot-edge-planta"}"#,  // device create
                r#"{"tags": {}}"#,                      // twin update
                r#"{"cs": "HostName=testhub.azure-devices.net;DeviceId=iiot-edge-planta;SharedAccessKey=abc"}"#,
            ]),
        );
        let mut scripts = ScriptSet::new(env.style);

        super::run(
            &env,
            &common_opts(false),
            &mut az,
            &mut scripts,
            "HostName=testhub.azure-devices.net;SharedAccessKeyName=iothubowner;SharedAccessKey=o",
            "plantA",
            None,
            None,
        )
        .unwrap();

        // site compose file and manifest were rendered into the outdir
        let compose = fs::read_to_string(outdir.path().join("planta.yml")).unwrap();
        assert!(compose.contains("mcr.microsoft.com/iotedge/opc-publisher:linux-amd64"));
        assert!(compose.contains("- \"gateway:10.0.0.1\""));
        assert!(!compose.contains("${"));

        let manifest =
            fs::read_to_string(outdir.path().join("iiot-deployment-planta.json")).unwrap();
        let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
        let modules =
            &manifest["content"]["modulesContent"]["$edgeAgent"]["properties.desired"]["modules"];
        for module in ["pub-planta", "prx-planta", "twin-planta", "plc-planta"] {
            assert!(modules.get(module).is_some(), "missing module {}", module);
        }
        // the twin got its default desired properties
        assert_eq!(
            manifest["content"]["modulesContent"]["twin-planta"]["properties.desired"]["Discovery"],
            "Scan"
        );

        let create = az
            .runner()
            .invocations
            .iter()
            .find(|invocation| invocation.contains("deployment create"))
            .unwrap();
        assert!(create.contains("tags.iiot='true' and tags.site='planta'"));

        // the device connection string ends up in the init script
        let init = scripts.commands(Phase::Init).join("\n");
        assert!(init.contains("docker volume create planta_cfappdata"));
        assert!(init.contains(CONNECTION_STRING));
    }

    #[test]
    fn existing_resources_are_reused_without_any_create_or_delete() {
        let outdir = tempfile::tempdir().unwrap();
        let env = test_env(outdir.path().to_path_buf());
        let mut az = AzureCli::new(
            "testhub".to_string(),
            FakeRunner::with_responses(&[
                r#"[{"id": "iiot-deployment-planta"}]"#, // deployment list: present
                r#"{"deviceId": "iiot-edge-planta"}"#,   // device show: present
                r#"{"cs": "HostName=testhub.azure-devices.net;DeviceId=iiot-edge-planta;SharedAccessKey=abc"}"#,
            ]),
        );
        let mut scripts = ScriptSet::new(env.style);

        super::run(
            &env,
            &common_opts(false),
            &mut az,
            &mut scripts,
            "HostName=testhub.azure-devices.net;SharedAccessKeyName=iothubowner;SharedAccessKey=o",
            "plantA",
            None,
            None,
        )
        .unwrap();

        for invocation in &az.runner().invocations {
            assert!(!invocation.contains(" create"), "unexpected: {}", invocation);
            assert!(!invocation.contains(" delete"), "unexpected: {}", invocation);
        }
        // no manifest was rendered, the existing deployment is used as-is
        assert!(!outdir.path().join("iiot-deployment-planta.json").exists());
        // scripts still carry the existing device's connection string
        let init = scripts.commands(Phase::Init).join("\n");
        assert!(init.contains(CONNECTION_STRING));
    }

    #[test]
    fn nodesconfig_without_hostdir_is_a_precondition_error() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = dir.path().join("nodes.json");
        fs::write(&nodes, "[]").unwrap();
        let env = test_env(dir.path().to_path_buf());
        let err = validate(&env, Some(&nodes), None).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let missing = dir.path().join("missing.json");
        let err = validate(&env, Some(&missing), None).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
