//! External process supervision
//!
//! Spawns backend helper processes, tracks them through a [`ProcessHandle`],
//! kills them forcefully, and sweeps stray instances left behind by an
//! unclean shutdown. Only `spawn` reports failures; termination and sweeps
//! log and continue.

use std::fmt;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use sysinfo::{Pid, Process, ProcessesToUpdate, System};
use tokio::process::{Child, Command};

use tb_core::TunnelError;

/// A command line to run, optionally with elevated privileges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    privileged: bool,
}

impl CommandSpec {
    /// Create a command for `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            privileged: false,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Mark the command as needing the privilege prefix
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Program name
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments, without any privilege prefix
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Build the tokio command, prefixing `privilege` for privileged commands
    pub fn to_command(&self, privilege: Option<&str>) -> Command {
        match privilege.filter(|_| self.privileged) {
            Some(prefix) => {
                let mut cmd = Command::new(prefix);
                cmd.arg(&self.program).args(&self.args);
                cmd
            }
            None => {
                let mut cmd = Command::new(&self.program);
                cmd.args(&self.args);
                cmd
            }
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Run a short-lived command to completion and capture its output
pub async fn run_to_completion(spec: &CommandSpec, privilege: Option<&str>) -> std::io::Result<Output> {
    tracing::debug!("Running `{}`", spec);
    spec.to_command(privilege)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
}

/// Handle to a spawned helper process
///
/// Dropping the handle kills the process.
pub struct ProcessHandle {
    child: Option<Child>,
    pid: Option<u32>,
    command: String,
}

impl ProcessHandle {
    fn from_child(child: Child, command: String) -> Self {
        Self {
            pid: child.id(),
            child: Some(child),
            command,
        }
    }

    /// A handle with no OS process behind it, used by supervisors that
    /// only simulate spawning
    pub fn detached(command: impl Into<String>) -> Self {
        Self {
            child: None,
            pid: None,
            command: command.into(),
        }
    }

    /// OS process id, if known and not yet reaped
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Command line the process was started with
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Whether the handle still refers to a live child
    pub fn is_tracked(&self) -> bool {
        self.child.is_some()
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("command", &self.command)
            .finish()
    }
}

/// Spawns, kills and sweeps external helper processes
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Start a long-running process. Either a live handle comes back or
    /// nothing was started.
    async fn spawn(&self, spec: &CommandSpec) -> Result<ProcessHandle, TunnelError>;

    /// Forcefully kill the process. A dead or detached handle is a no-op.
    async fn terminate(&self, handle: &mut ProcessHandle);

    /// Kill every process whose command line contains `pattern`, except
    /// those containing `exclude` and this process itself. Returns how many
    /// processes were killed.
    async fn sweep(&self, pattern: &str, exclude: &str) -> usize;
}

/// Supervisor backed by the operating system
#[derive(Debug, Clone, Default)]
pub struct SystemSupervisor {
    privilege: Option<String>,
}

impl SystemSupervisor {
    /// Create a supervisor that prefixes privileged commands with `privilege`
    pub fn new(privilege: Option<String>) -> Self {
        Self { privilege }
    }
}

#[async_trait]
impl Supervisor for SystemSupervisor {
    async fn spawn(&self, spec: &CommandSpec) -> Result<ProcessHandle, TunnelError> {
        let child = spec
            .to_command(self.privilege.as_deref())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                tracing::error!("Failed to spawn `{}`: {}", spec, source);
                TunnelError::Spawn {
                    command: spec.to_string(),
                    source,
                }
            })?;

        let handle = ProcessHandle::from_child(child, spec.to_string());
        tracing::info!("Spawned `{}` (pid {:?})", handle.command, handle.pid);
        Ok(handle)
    }

    async fn terminate(&self, handle: &mut ProcessHandle) {
        let Some(mut child) = handle.child.take() else {
            tracing::debug!("Process `{}` is not tracked, nothing to kill", handle.command);
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!("Process `{}` already exited with {}", handle.command, status);
            }
            _ => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill `{}` (pid {:?}): {}", handle.command, handle.pid, e);
                } else {
                    tracing::debug!("Killed `{}` (pid {:?})", handle.command, handle.pid);
                }
            }
        }
        handle.pid = None;
    }

    async fn sweep(&self, pattern: &str, exclude: &str) -> usize {
        let pattern = pattern.to_string();
        let exclude = exclude.to_string();

        let result = tokio::task::spawn_blocking(move || sweep_process_table(&pattern, &exclude)).await;
        match result {
            Ok(killed) => killed,
            Err(e) => {
                tracing::warn!("Process sweep did not complete: {}", e);
                0
            }
        }
    }
}

fn sweep_process_table(pattern: &str, exclude: &str) -> usize {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    let own_pid = sysinfo::get_current_pid().ok();

    let mut killed = 0;
    for (pid, process) in system.processes() {
        if Some(*pid) == own_pid {
            continue;
        }
        let cmdline = command_line(process);
        if !sweep_matches(&cmdline, pattern, exclude) {
            continue;
        }
        if process.kill() {
            tracing::info!("Swept stray process {} `{}`", pid, cmdline);
            killed += 1;
        } else {
            tracing::warn!("Failed to kill stray process {} `{}`", pid, cmdline);
        }
    }

    if killed == 0 {
        tracing::debug!("Sweep for '{}' found nothing to terminate", pattern);
    }
    killed
}

fn command_line(process: &Process) -> String {
    let parts: Vec<String> = process
        .cmd()
        .iter()
        .map(|part| part.to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        process.name().to_string_lossy().into_owned()
    } else {
        parts.join(" ")
    }
}

/// Whether a command line is a sweep target
pub fn sweep_matches(cmdline: &str, pattern: &str, exclude: &str) -> bool {
    if pattern.is_empty() || !cmdline.contains(pattern) {
        return false;
    }
    exclude.is_empty() || !cmdline.contains(exclude)
}

/// Whether `pid` currently exists in the process table
pub fn process_exists(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}
