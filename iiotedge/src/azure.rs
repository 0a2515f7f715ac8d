//! Azure resource orchestration through the `az` CLI.
//!
//! Every cloud interaction is one `az` invocation with its stdout
//! captured; an empty result on a step that must emit JSON is fatal, and
//! nothing is retried. The provisioning decision per resource
//! (deployment, device) is an explicit state machine so the
//! presence/force cross product stays testable without a cloud account.

use std::io;
use std::path::Path;
use std::process::Command;

use log::{debug, info};
use serde_json::Value;
use thiserror::Error;

/// Seam for invoking external commands. Production shells out; tests
/// substitute a scripted fake.
pub trait CommandRunner {
    fn run(&mut self, program: &str, args: &[String]) -> io::Result<String>;
}

/// Spawns the real process and captures its stdout.
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&mut self, program: &str, args: &[String]) -> io::Result<String> {
        debug!("exec: {} {}", program, args.join(" "));
        let output = Command::new(program).args(args).output()?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("failed to invoke 'az {args}': {source}")]
    Invoke { args: String, source: io::Error },

    #[error("'az {0}' returned no output")]
    EmptyOutput(String),

    #[error("'az {args}' returned unparseable JSON: {source}")]
    BadJson {
        args: String,
        source: serde_json::Error,
    },

    #[error("please login to Azure with 'az login' and set the subscription which contains IoTHub '{0}' with 'az account set'")]
    NotLoggedIn(String),

    #[error("IoTHub '{0}' can not be found, please verify your Azure login and account settings")]
    HubNotFound(String),

    #[error("the connection string response is missing the 'cs' property")]
    MissingConnectionString,

    #[error("can not create {0}")]
    CreateFailed(&'static str),
}

/// States one cloud resource moves through while being ensured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Unknown,
    Queried,
    Deleting,
    Creating,
    Created,
    Using,
}

/// Provisioning actions derived from the presence/force cross product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    Delete,
    Create,
    Use,
}

/// The transition table: absent resources are created, present ones are
/// reused unless force is set, which destroys and recreates (never an
/// in-place update).
pub fn provisioning_steps(present: bool, force: bool) -> &'static [ProvisionStep] {
    match (present, force) {
        (false, _) => &[ProvisionStep::Create],
        (true, false) => &[ProvisionStep::Use],
        (true, true) => &[ProvisionStep::Delete, ProvisionStep::Create],
    }
}

/// Tracks the state of one resource while it is ensured.
#[derive(Debug)]
pub struct ResourceMachine {
    state: ResourceState,
}

impl ResourceMachine {
    pub fn new() -> Self {
        Self {
            state: ResourceState::Unknown,
        }
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn queried(&mut self) {
        self.state = ResourceState::Queried;
    }

    pub fn apply(&mut self, step: ProvisionStep) {
        self.state = match step {
            ProvisionStep::Delete => ResourceState::Deleting,
            ProvisionStep::Create => ResourceState::Creating,
            ProvisionStep::Use => ResourceState::Using,
        };
    }

    pub fn created(&mut self) {
        self.state = ResourceState::Created;
    }
}

impl Default for ResourceMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Thin wrapper over the `az` CLI, scoped to one IoT hub.
pub struct AzureCli<R: CommandRunner> {
    hub: String,
    runner: R,
}

impl<R: CommandRunner> AzureCli<R> {
    pub fn new(hub: String, runner: R) -> Self {
        Self { hub, runner }
    }

    #[cfg(test)]
    pub(crate) fn runner(&self) -> &R {
        &self.runner
    }

    fn az(&mut self, args: &[&str]) -> Result<String, AzureError> {
        let owned: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        self.runner
            .run("az", &owned)
            .map_err(|source| AzureError::Invoke {
                args: args.join(" "),
                source,
            })
    }

    fn az_json(&mut self, args: &[&str]) -> Result<Value, AzureError> {
        let stdout = self.az(args)?;
        if stdout.trim().is_empty() {
            return Err(AzureError::EmptyOutput(args.join(" ")));
        }
        serde_json::from_str(&stdout).map_err(|source| AzureError::BadJson {
            args: args.join(" "),
            source,
        })
    }

    pub fn login_with_service_principal(
        &mut self,
        app_id: &str,
        cert: &Path,
        tenant: &str,
    ) -> Result<(), AzureError> {
        info!("Login to Azure");
        let cert = cert.to_string_lossy();
        self.az(&[
            "login",
            "--service-principal",
            "-u",
            app_id,
            "-p",
            &cert,
            "--tenant",
            tenant,
        ])?;
        Ok(())
    }

    /// Verifies an existing CLI session when no credentials are given.
    pub fn verify_session(&mut self) -> Result<(), AzureError> {
        info!("Login to Azure");
        let account = self.az(&["account", "show"])?;
        if account.trim().is_empty() {
            return Err(AzureError::NotLoggedIn(self.hub.clone()));
        }
        Ok(())
    }

    pub fn verify_hub(&mut self) -> Result<(), AzureError> {
        let hub = self.hub.clone();
        let result = self.az(&["iot", "hub", "show", "--name", &hub])?;
        if result.trim().is_empty() {
            return Err(AzureError::HubNotFound(hub));
        }
        debug!("{}", result.trim());
        Ok(())
    }

    pub fn hub_connection_string(&mut self) -> Result<String, AzureError> {
        info!("Read IoTHub connectionstring");
        let hub = self.hub.clone();
        let value = self.az_json(&["iot", "hub", "show-connection-string", "--hub-name", &hub])?;
        connection_string(&value)
    }

    /// Queries the deployment and deletes it first when forced. The
    /// returned machine is left in `Creating` when a create is still
    /// needed, in `Using` when the existing deployment is reused.
    pub fn prepare_deployment(
        &mut self,
        name: &str,
        force: bool,
    ) -> Result<ResourceMachine, AzureError> {
        info!("Check if deployment with id '{}' exists", name);
        let mut machine = ResourceMachine::new();
        let present = self.deployment_present(name)?;
        machine.queried();

        for step in provisioning_steps(present, force) {
            machine.apply(*step);
            match step {
                ProvisionStep::Delete => {
                    info!("Deployment '{}' found. Deleting it...", name);
                    self.delete_deployment(name)?;
                }
                ProvisionStep::Create => {}
                ProvisionStep::Use => info!("Deployment '{}' found. Using it...", name),
            }
        }
        Ok(machine)
    }

    fn deployment_present(&mut self, name: &str) -> Result<bool, AzureError> {
        let hub = self.hub.clone();
        let query = format!("[?id=='{}']", name);
        let args: [&str; 8] = [
            "iot",
            "edge",
            "deployment",
            "list",
            "--hub-name",
            &hub,
            "--query",
            &query,
        ];
        let stdout = self.az(&args)?;
        if stdout.trim().is_empty() {
            return Ok(false);
        }
        let value: Value =
            serde_json::from_str(&stdout).map_err(|source| AzureError::BadJson {
                args: args.join(" "),
                source,
            })?;
        Ok(value.as_array().map(|list| !list.is_empty()).unwrap_or(false))
    }

    pub fn delete_deployment(&mut self, name: &str) -> Result<(), AzureError> {
        let hub = self.hub.clone();
        self.az(&[
            "iot",
            "edge",
            "deployment",
            "delete",
            "--hub-name",
            &hub,
            "--config-id",
            name,
        ])?;
        Ok(())
    }

    pub fn create_deployment(
        &mut self,
        name: &str,
        content: &Path,
        target_condition: &str,
    ) -> Result<(), AzureError> {
        let hub = self.hub.clone();
        let content = content.to_string_lossy();
        let result = self.az(&[
            "iot",
            "edge",
            "deployment",
            "create",
            "--config-id",
            name,
            "--hub-name",
            &hub,
            "--content",
            &content,
            "--target-condition",
            target_condition,
        ])?;
        if result.trim().is_empty() {
            return Err(AzureError::CreateFailed("deployment"));
        }
        debug!("{}", result.trim());
        Ok(())
    }

    /// Queries the device identity and deletes it first when forced. The
    /// returned machine is left in `Creating` when a create is still
    /// needed, in `Using` when the existing device is reused.
    pub fn prepare_device(
        &mut self,
        device_id: &str,
        force: bool,
    ) -> Result<ResourceMachine, AzureError> {
        info!("Check if device '{}' already exists", device_id);
        let mut machine = ResourceMachine::new();
        let present = self.device_present(device_id)?;
        machine.queried();

        for step in provisioning_steps(present, force) {
            machine.apply(*step);
            match step {
                ProvisionStep::Delete => {
                    info!("Device '{}' found. Deleting it...", device_id);
                    self.delete_device(device_id)?;
                }
                ProvisionStep::Create => {}
                ProvisionStep::Use => info!("Device '{}' found. Using it...", device_id),
            }
        }
        Ok(machine)
    }

    fn device_present(&mut self, device_id: &str) -> Result<bool, AzureError> {
        let hub = self.hub.clone();
        let args: [&str; 8] = [
            "iot",
            "hub",
            "device-identity",
            "show",
            "--hub-name",
            &hub,
            "--device-id",
            device_id,
        ];
        let stdout = self.az(&args)?;
        if stdout.trim().is_empty() {
            return Ok(false);
        }
        // present, but the answer still has to be valid JSON
        serde_json::from_str::<Value>(&stdout).map_err(|source| AzureError::BadJson {
            args: args.join(" "),
            source,
        })?;
        Ok(true)
    }

    pub fn delete_device(&mut self, device_id: &str) -> Result<(), AzureError> {
        let hub = self.hub.clone();
        self.az(&[
            "iot",
            "hub",
            "device-identity",
            "delete",
            "--hub-name",
            &hub,
            "--device-id",
            device_id,
        ])?;
        Ok(())
    }

    pub fn create_device(&mut self, device_id: &str) -> Result<(), AzureError> {
        let hub = self.hub.clone();
        let result = self.az(&[
            "iot",
            "hub",
            "device-identity",
            "create",
            "--hub-name",
            &hub,
            "--device-id",
            device_id,
            "--edge-enabled",
        ])?;
        if result.trim().is_empty() {
            return Err(AzureError::CreateFailed("device"));
        }
        debug!("{}", result.trim());
        Ok(())
    }

    /// Stamps the topology membership tags onto the device twin.
    pub fn update_device_tags(&mut self, device_id: &str, tags_json: &str) -> Result<(), AzureError> {
        info!("Setting tags for device '{}'", device_id);
        let hub = self.hub.clone();
        let assignment = format!("tags={}", tags_json);
        let result = self.az(&[
            "iot",
            "hub",
            "device-twin",
            "update",
            "--hub-name",
            &hub,
            "--device-id",
            device_id,
            "--set",
            &assignment,
        ])?;
        if result.trim().is_empty() {
            return Err(AzureError::CreateFailed("device tags"));
        }
        debug!("{}", result.trim());
        Ok(())
    }

    pub fn device_connection_string(&mut self, device_id: &str) -> Result<String, AzureError> {
        info!("Fetch connection string for device '{}'", device_id);
        let hub = self.hub.clone();
        let value = self.az_json(&[
            "iot",
            "hub",
            "device-identity",
            "show-connection-string",
            "--hub-name",
            &hub,
            "--device-id",
            device_id,
        ])?;
        connection_string(&value)
    }
}

fn connection_string(value: &Value) -> Result<String, AzureError> {
    value
        .get("cs")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(AzureError::MissingConnectionString)
}

/// Scripted [`CommandRunner`] replaying canned stdout per invocation.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::io;

    use super::CommandRunner;

    pub struct FakeRunner {
        pub responses: VecDeque<&'static str>,
        pub invocations: Vec<String>,
    }

    impl FakeRunner {
        pub fn with_responses(responses: &[&'static str]) -> Self {
            Self {
                responses: responses.iter().copied().collect(),
                invocations: Vec::new(),
            }
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&mut self, _program: &str, args: &[String]) -> io::Result<String> {
            self.invocations.push(args.join(" "));
            Ok(self.responses.pop_front().unwrap_or("").to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeRunner;
    use super::*;

    fn cli(responses: &[&'static str]) -> AzureCli<FakeRunner> {
        AzureCli::new("testhub".to_string(), FakeRunner::with_responses(responses))
    }

    #[test]
    fn transition_table_covers_the_presence_force_cross_product() {
        assert_eq!(provisioning_steps(false, false), &[ProvisionStep::Create]);
        assert_eq!(provisioning_steps(false, true), &[ProvisionStep::Create]);
        assert_eq!(provisioning_steps(true, false), &[ProvisionStep::Use]);
        assert_eq!(
            provisioning_steps(true, true),
            &[ProvisionStep::Delete, ProvisionStep::Create]
        );
    }

    #[test]
    fn machine_walks_the_documented_states() {
        let mut machine = ResourceMachine::new();
        assert_eq!(machine.state(), ResourceState::Unknown);
        machine.queried();
        assert_eq!(machine.state(), ResourceState::Queried);
        machine.apply(ProvisionStep::Delete);
        assert_eq!(machine.state(), ResourceState::Deleting);
        machine.apply(ProvisionStep::Create);
        assert_eq!(machine.state(), ResourceState::Creating);
        machine.created();
        assert_eq!(machine.state(), ResourceState::Created);
    }

    #[test]
    fn absent_deployment_needs_a_create() {
        let mut az = cli(&["[]"]);
        let machine = az.prepare_deployment("iiot-deployment-plant", false).unwrap();
        assert_eq!(machine.state(), ResourceState::Creating);
        assert_eq!(az.runner().invocations.len(), 1);
        assert!(az.runner().invocations[0].contains("deployment list"));
    }

    #[test]
    fn present_deployment_without_force_is_reused() {
        let mut az = cli(&[r#"[{"id": "iiot-deployment-plant"}]"#]);
        let machine = az.prepare_deployment("iiot-deployment-plant", false).unwrap();
        assert_eq!(machine.state(), ResourceState::Using);
        // no delete was issued
        assert_eq!(az.runner().invocations.len(), 1);
    }

    #[test]
    fn present_deployment_with_force_is_deleted_then_recreated() {
        let mut az = cli(&[r#"[{"id": "iiot-deployment-plant"}]"#, ""]);
        let machine = az.prepare_deployment("iiot-deployment-plant", true).unwrap();
        assert_eq!(machine.state(), ResourceState::Creating);
        let invocations = &az.runner().invocations;
        assert_eq!(invocations.len(), 2);
        assert!(invocations[1].contains("deployment delete"));
    }

    #[test]
    fn absent_device_needs_a_create_present_is_reused() {
        let mut az = cli(&[""]);
        let machine = az.prepare_device("iiot-edge-plant", false).unwrap();
        assert_eq!(machine.state(), ResourceState::Creating);

        let mut az = cli(&[r#"{"deviceId": "iiot-edge-plant"}"#]);
        let machine = az.prepare_device("iiot-edge-plant", false).unwrap();
        assert_eq!(machine.state(), ResourceState::Using);
    }

    #[test]
    fn empty_create_output_is_fatal() {
        let mut az = cli(&[""]);
        assert!(matches!(
            az.create_device("iiot-edge-plant"),
            Err(AzureError::CreateFailed("device"))
        ));
    }

    #[test]
    fn connection_strings_come_from_the_cs_property() {
        let mut az = cli(&[r#"{"cs": "HostName=testhub;DeviceId=dev;SharedAccessKey=abc"}"#]);
        assert_eq!(
            az.device_connection_string("dev").unwrap(),
            "HostName=testhub;DeviceId=dev;SharedAccessKey=abc"
        );

        let mut az = cli(&[r#"{"connection": "wrong-key"}"#]);
        assert!(matches!(
            az.device_connection_string("dev"),
            Err(AzureError::MissingConnectionString)
        ));
    }

    #[test]
    fn empty_connection_string_output_is_fatal() {
        let mut az = cli(&[""]);
        assert!(matches!(
            az.hub_connection_string(),
            Err(AzureError::EmptyOutput(_))
        ));
    }

    #[test]
    fn missing_session_points_at_az_login() {
        let mut az = cli(&[""]);
        assert!(matches!(
            az.verify_session(),
            Err(AzureError::NotLoggedIn(hub)) if hub == "testhub"
        ));
    }

    #[test]
    fn tags_are_passed_as_one_whitespace_free_argument() {
        let mut az = cli(&[r#"{"tags": {"iiot": "true"}}"#]);
        az.update_device_tags("iiot-edge-plant", r#"{"iiot":"true","site":"plant"}"#)
            .unwrap();
        let invocation = &az.runner().invocations[0];
        assert!(invocation.contains(r#"--set tags={"iiot":"true","site":"plant"}"#));
    }
}
