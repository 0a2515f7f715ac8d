//! Lifecycle script accumulation and emission.
//!
//! Commands for the four phases are appended in setup order throughout
//! the run; the emitter owns the teardown asymmetry: stop and deinit
//! files are written in reverse append order, start and init as-is.

use std::fs;
use std::io;
use std::path::Path;

use log::debug;

use crate::platform::TargetPlatform;

/// Lifecycle phase a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Stop,
    Init,
    Deinit,
}

/// Per-phase file name and command decoration.
#[derive(Debug, Clone, Copy)]
pub struct PhaseStyle {
    pub file_name: &'static str,
    pub prefix: &'static str,
    pub postfix: &'static str,
}

/// Script naming and command decoration for one target platform,
/// selected once at startup.
#[derive(Debug, Clone, Copy)]
pub struct ScriptStyle {
    pub start: PhaseStyle,
    pub stop: PhaseStyle,
    pub init: PhaseStyle,
    pub deinit: PhaseStyle,
    pub newline: &'static str,
}

impl ScriptStyle {
    pub fn for_platform(platform: TargetPlatform) -> Self {
        match platform {
            TargetPlatform::Linux | TargetPlatform::Wsl => Self {
                start: PhaseStyle {
                    file_name: "start-iiotedge.sh",
                    prefix: "",
                    postfix: " &",
                },
                stop: PhaseStyle {
                    file_name: "stop-iiotedge.sh",
                    prefix: "",
                    postfix: "",
                },
                init: PhaseStyle {
                    file_name: "init-iiotedge.sh",
                    prefix: "",
                    postfix: " &",
                },
                deinit: PhaseStyle {
                    file_name: "deinit-iiotedge.sh",
                    prefix: "",
                    postfix: " &",
                },
                newline: "\n",
            },
            TargetPlatform::Windows => Self {
                start: PhaseStyle {
                    file_name: "Start-IIoTEdge.ps1",
                    prefix: "start ",
                    postfix: "",
                },
                stop: PhaseStyle {
                    file_name: "Stop-IIoTEdge.ps1",
                    prefix: "",
                    postfix: "",
                },
                init: PhaseStyle {
                    file_name: "Init-IIoTEdge.ps1",
                    prefix: "",
                    postfix: "",
                },
                deinit: PhaseStyle {
                    file_name: "Deinit-IIoTEdge.ps1",
                    prefix: "",
                    postfix: "",
                },
                newline: "\r\n",
            },
        }
    }

    pub fn phase(&self, phase: Phase) -> &PhaseStyle {
        match phase {
            Phase::Start => &self.start,
            Phase::Stop => &self.stop,
            Phase::Init => &self.init,
            Phase::Deinit => &self.deinit,
        }
    }
}

/// The four ordered command lists of one provisioning run.
#[derive(Debug)]
pub struct ScriptSet {
    style: ScriptStyle,
    start: Vec<String>,
    stop: Vec<String>,
    init: Vec<String>,
    deinit: Vec<String>,
}

impl ScriptSet {
    pub fn new(style: ScriptStyle) -> Self {
        Self {
            style,
            start: Vec::new(),
            stop: Vec::new(),
            init: Vec::new(),
            deinit: Vec::new(),
        }
    }

    pub fn style(&self) -> &ScriptStyle {
        &self.style
    }

    /// Appends a command verbatim.
    pub fn push(&mut self, phase: Phase, command: impl Into<String>) {
        self.buffer_mut(phase).push(command.into());
    }

    /// Appends a long-running command with the platform's background
    /// decoration (`start ` on Windows, trailing ` &` in shell scripts).
    pub fn push_background(&mut self, phase: Phase, command: impl Into<String>) {
        let decoration = self.style.phase(phase);
        let command = format!("{}{}{}", decoration.prefix, command.into(), decoration.postfix);
        self.buffer_mut(phase).push(command);
    }

    pub fn commands(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::Start => &self.start,
            Phase::Stop => &self.stop,
            Phase::Init => &self.init,
            Phase::Deinit => &self.deinit,
        }
    }

    /// Writes the four script files into the output directory and marks
    /// them executable. Stop and deinit are written in reverse append
    /// order.
    pub fn write_all(&self, outdir: &Path) -> io::Result<()> {
        self.write_one(outdir, self.style.start.file_name, &self.start, false)?;
        self.write_one(outdir, self.style.stop.file_name, &self.stop, true)?;
        self.write_one(outdir, self.style.init.file_name, &self.init, false)?;
        self.write_one(outdir, self.style.deinit.file_name, &self.deinit, true)
    }

    fn write_one(
        &self,
        outdir: &Path,
        file_name: &str,
        commands: &[String],
        reverse: bool,
    ) -> io::Result<()> {
        let path = outdir.join(file_name);
        debug!(
            "Write '{}'{}",
            path.display(),
            if reverse { " in reversed order." } else { "." }
        );
        let mut content = String::new();
        if reverse {
            for command in commands.iter().rev() {
                content.push_str(command);
                content.push_str(self.style.newline);
            }
        } else {
            for command in commands {
                content.push_str(command);
                content.push_str(self.style.newline);
            }
        }
        fs::write(&path, content)?;
        mark_executable(&path)
    }

    fn buffer_mut(&mut self, phase: Phase) -> &mut Vec<String> {
        match phase {
            Phase::Start => &mut self.start,
            Phase::Stop => &mut self.stop,
            Phase::Init => &mut self.init,
            Phase::Deinit => &mut self.deinit,
        }
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_files_are_reversed_setup_files_are_not() {
        let dir = tempfile::tempdir().unwrap();
        let mut scripts = ScriptSet::new(ScriptStyle::for_platform(TargetPlatform::Linux));
        for command in ["A", "B", "C"] {
            scripts.push(Phase::Init, command);
        }
        for command in ["a", "b", "c"] {
            scripts.push(Phase::Deinit, command);
        }
        scripts.write_all(dir.path()).unwrap();

        let init = fs::read_to_string(dir.path().join("init-iiotedge.sh")).unwrap();
        assert_eq!(init, "A\nB\nC\n");
        let deinit = fs::read_to_string(dir.path().join("deinit-iiotedge.sh")).unwrap();
        assert_eq!(deinit, "c\nb\na\n");
    }

    #[test]
    fn background_decoration_follows_the_platform() {
        let mut linux = ScriptSet::new(ScriptStyle::for_platform(TargetPlatform::Linux));
        linux.push_background(Phase::Init, "docker-compose up");
        assert_eq!(linux.commands(Phase::Init), ["docker-compose up &"]);

        let mut windows = ScriptSet::new(ScriptStyle::for_platform(TargetPlatform::Windows));
        windows.push_background(Phase::Start, "docker-compose up");
        windows.push_background(Phase::Init, "docker-compose up");
        assert_eq!(windows.commands(Phase::Start), ["start docker-compose up"]);
        // only the start phase carries the `start ` prefix on Windows
        assert_eq!(windows.commands(Phase::Init), ["docker-compose up"]);
    }

    #[test]
    fn windows_scripts_use_crlf_and_ps1_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut scripts = ScriptSet::new(ScriptStyle::for_platform(TargetPlatform::Windows));
        scripts.push(Phase::Start, "Start-Service iotedge");
        scripts.push(Phase::Stop, "Stop-Service iotedge");
        scripts.write_all(dir.path()).unwrap();

        let start = fs::read_to_string(dir.path().join("Start-IIoTEdge.ps1")).unwrap();
        assert_eq!(start, "Start-Service iotedge\r\n");
        assert!(dir.path().join("Stop-IIoTEdge.ps1").exists());
    }

    #[cfg(unix)]
    #[test]
    fn scripts_are_marked_executable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let mut scripts = ScriptSet::new(ScriptStyle::for_platform(TargetPlatform::Linux));
        scripts.push(Phase::Start, "true");
        scripts.write_all(dir.path()).unwrap();
        let mode = fs::metadata(dir.path().join("start-iiotedge.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
