//! Process supervisor
//!
//! Owns the set of live OS processes backing running plugins. The chief
//! invariant: at most one managed process per plugin name at any time.
//! All table mutation happens behind one mutex with brief critical
//! sections; monitor tasks reconcile asynchronous process exits against
//! the table so a transient OS-level error never becomes a false
//! positive failure.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::event::{OutputStream, ProcessEvent};
use crate::signal;
use crate::{Error, Result};

/// Everything needed to launch one plugin process.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub plugin_name: String,
    /// Interpreter or executable to run
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env_vars: HashMap<String, String>,
}

/// Queryable metadata for a managed process.
#[derive(Debug, Clone)]
pub struct ManagedProcessInfo {
    pub plugin_name: String,
    pub pid: Option<u32>,
    pub working_dir: PathBuf,
    pub env_vars: HashMap<String, String>,
    pub started_at: DateTime<Utc>,
}

struct ManagedProcess {
    info: ManagedProcessInfo,
    /// Set once startup verification confirms the process is running
    running: bool,
    monitor: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct SupervisorState {
    processes: HashMap<String, ManagedProcess>,
    starting: HashSet<String>,
    stopping: HashSet<String>,
}

/// Tunable grace periods.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Delay before startup verification confirms the running transition
    pub startup_grace: Duration,
    /// How long a graceful terminate may take before force-kill
    pub stop_grace: Duration,
    /// How long the force-kill may take before giving up waiting
    pub kill_grace: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            startup_grace: Duration::from_secs(1),
            stop_grace: Duration::from_secs(5),
            kill_grace: Duration::from_secs(1),
        }
    }
}

struct Inner {
    state: Mutex<SupervisorState>,
    events: mpsc::UnboundedSender<ProcessEvent>,
    options: SupervisorOptions,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: ProcessEvent) {
        let _ = self.events.send(event);
    }

    /// Idempotent teardown of everything tracked for a plugin: the
    /// starting/stopping marks, the monitor subscription, the process
    /// itself if it is somehow still alive, and the table entries.
    fn cleanup(&self, plugin: &str) {
        let entry = {
            let mut state = self.lock();
            state.starting.remove(plugin);
            state.stopping.remove(plugin);
            state.processes.remove(plugin)
        };

        if let Some(entry) = entry {
            if let Some(monitor) = entry.monitor {
                monitor.abort();
            }
            if let Some(pid) = entry.info.pid
                && signal::probe_alive(pid)
            {
                warn!(plugin, pid, "process still alive during cleanup, killing");
                signal::force_kill(pid);
            }
            info!(plugin, "process resources cleaned up");
        }
    }

    /// Handle an exit observed by the monitor task.
    fn handle_exit(&self, plugin: &str, status: std::io::Result<std::process::ExitStatus>) {
        match status {
            Ok(status) => {
                // On unix a `None` code means termination by signal
                let abnormal = status.code().is_none();
                let exit_code = status.code().unwrap_or(-1);
                info!(plugin, exit_code, abnormal, "process finished");
                {
                    let mut state = self.lock();
                    state.starting.remove(plugin);
                }
                self.emit(ProcessEvent::Finished {
                    plugin: plugin.to_string(),
                    exit_code,
                    abnormal,
                });
                self.cleanup(plugin);
            }
            Err(e) => {
                self.handle_error_notification(plugin, &format!("process wait failed: {e}"));
            }
        }
    }

    /// Apply the error-suppression rules to a raw error notification.
    ///
    /// During the starting and stopping windows errors are expected
    /// transients of the protocol and are suppressed while the process
    /// is independently confirmed alive. Only a process that has
    /// actually fallen over escalates.
    fn handle_error_notification(&self, plugin: &str, message: &str) {
        let (window, pid, tracked) = {
            let state = self.lock();
            let window =
                state.starting.contains(plugin) || state.stopping.contains(plugin);
            let pid = state.processes.get(plugin).and_then(|p| p.info.pid);
            (window, pid, state.processes.contains_key(plugin))
        };

        let alive = pid.map(signal::probe_alive).unwrap_or(false);

        if alive {
            if window {
                debug!(plugin, message, "suppressing error during start/stop window");
            } else {
                debug!(plugin, message, "process still alive, ignoring error notification");
            }
            return;
        }

        if !tracked && !window {
            // Nothing of ours; still surface it so the failure is not
            // silently swallowed.
            warn!(plugin, message, "error for untracked plugin");
        } else {
            error!(plugin, message, "process failure escalated");
        }

        self.emit(ProcessEvent::Errored {
            plugin: plugin.to_string(),
            message: message.to_string(),
        });
        self.cleanup(plugin);
    }
}

/// Supervises plugin processes and publishes their lifecycle events.
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

impl ProcessSupervisor {
    /// Create a supervisor and the receiving end of its event channel.
    pub fn new(options: SupervisorOptions) -> (Self, mpsc::UnboundedReceiver<ProcessEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                inner: Arc::new(Inner {
                    state: Mutex::new(SupervisorState::default()),
                    events,
                    options,
                }),
            },
            receiver,
        )
    }

    /// Launch a plugin process.
    ///
    /// Returns `Ok(false)` without spawning when a managed process
    /// already exists for this plugin name. A spawn rejection from the
    /// OS is an error; everything after a successful spawn is reported
    /// through the event channel.
    pub async fn start_plugin(&self, spec: ProcessSpec) -> Result<bool> {
        let plugin = spec.plugin_name.clone();
        info!(plugin, program = %spec.program.display(), "starting plugin process");

        {
            let mut state = self.inner.lock();
            if state.processes.contains_key(&plugin) {
                warn!(plugin, "plugin is already running");
                drop(state);
                self.inner.emit(ProcessEvent::Errored {
                    plugin: plugin.clone(),
                    message: "plugin is already running".to_string(),
                });
                return Ok(false);
            }
            state.starting.insert(plugin.clone());
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .envs(&spec.env_vars)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(plugin, error = %e, "spawn rejected");
                self.inner.cleanup(&plugin);
                self.inner.emit(ProcessEvent::Errored {
                    plugin: plugin.clone(),
                    message: format!("failed to start: {e}"),
                });
                return Err(Error::SpawnFailed {
                    plugin,
                    message: e.to_string(),
                });
            }
        };

        let pid = child.id();
        spawn_output_forwarders(&self.inner, &plugin, &mut child);

        let info = ManagedProcessInfo {
            plugin_name: plugin.clone(),
            pid,
            working_dir: spec.working_dir.clone(),
            env_vars: spec.env_vars.clone(),
            started_at: Utc::now(),
        };

        {
            let mut state = self.inner.lock();
            state.processes.insert(
                plugin.clone(),
                ManagedProcess {
                    info,
                    running: false,
                    monitor: None,
                },
            );
        }

        let monitor = tokio::spawn(monitor_process(self.inner.clone(), plugin.clone(), child));
        {
            let mut state = self.inner.lock();
            if let Some(entry) = state.processes.get_mut(&plugin) {
                entry.monitor = Some(monitor);
            } else {
                // Cleaned up before we could file the handle; stop the task.
                monitor.abort();
            }
        }

        info!(plugin, ?pid, "spawn issued");
        Ok(true)
    }

    /// Stop a plugin process: graceful terminate, bounded wait,
    /// force-kill fallback, then unconditional cleanup.
    ///
    /// Returns `Ok(false)` with no side effects when the plugin is not
    /// in the table.
    pub async fn stop_plugin(&self, plugin: &str) -> Result<bool> {
        let pid = {
            let mut state = self.inner.lock();
            if !state.processes.contains_key(plugin) {
                warn!(plugin, "not in the process table");
                return Ok(false);
            }
            state.stopping.insert(plugin.to_string());
            state.processes.get(plugin).and_then(|p| p.info.pid)
        };

        info!(plugin, ?pid, "stopping plugin process");
        if let Some(pid) = pid {
            signal::terminate(pid);
        }

        if !self
            .wait_until_gone(plugin, self.inner.options.stop_grace)
            .await
        {
            warn!(plugin, "graceful stop timed out, force killing");
            if let Some(pid) = pid {
                signal::force_kill(pid);
            }
            self.wait_until_gone(plugin, self.inner.options.kill_grace)
                .await;
        }

        self.inner.cleanup(plugin);
        info!(plugin, "plugin process stopped");
        Ok(true)
    }

    /// True when the plugin has a managed process that reached running.
    /// Never blocks on I/O.
    pub fn is_plugin_running(&self, plugin: &str) -> bool {
        let state = self.inner.lock();
        state
            .processes
            .get(plugin)
            .map(|p| p.running)
            .unwrap_or(false)
    }

    /// Names of all tracked plugins, including ones still starting.
    pub fn get_all_running_plugins(&self) -> Vec<String> {
        let state = self.inner.lock();
        let mut names: Vec<String> = state.processes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Metadata for a tracked plugin process.
    pub fn process_info(&self, plugin: &str) -> Option<ManagedProcessInfo> {
        let state = self.inner.lock();
        state.processes.get(plugin).map(|p| p.info.clone())
    }

    /// Feed a raw error notification through the suppression rules.
    pub fn notify_error(&self, plugin: &str, message: &str) {
        self.inner.handle_error_notification(plugin, message);
    }

    /// Idempotent cleanup of everything tracked for a plugin.
    pub fn cleanup_process(&self, plugin: &str) {
        self.inner.cleanup(plugin);
    }

    async fn wait_until_gone(&self, plugin: &str, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            {
                let state = self.inner.lock();
                if !state.processes.contains_key(plugin) {
                    return true;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// Per-process monitor: runs startup verification, then reconciles the
/// eventual exit against the table.
async fn monitor_process(inner: Arc<Inner>, plugin: String, mut child: Child) {
    tokio::select! {
        status = child.wait() => {
            // Terminated before the verification delay elapsed
            inner.handle_exit(&plugin, status);
        }
        _ = tokio::time::sleep(inner.options.startup_grace) => {
            // Startup verification: the spawn callback may never fire on
            // some hosts, so the supervisor confirms liveness itself and
            // emits the running transition.
            let verified = {
                let mut state = inner.lock();
                state.starting.remove(&plugin);
                match state.processes.get_mut(&plugin) {
                    Some(entry) => {
                        entry.running = true;
                        true
                    }
                    None => false,
                }
            };
            if verified {
                info!(plugin, "startup verified, plugin running");
                inner.emit(ProcessEvent::Started {
                    plugin: plugin.clone(),
                });
            } else {
                debug!(plugin, "cleaned up before startup verification");
            }

            let status = child.wait().await;
            inner.handle_exit(&plugin, status);
        }
    }
}

/// Forward child stdout/stderr line-wise as output events. Blank lines
/// are dropped. The readers end on their own when the pipes close.
fn spawn_output_forwarders(inner: &Arc<Inner>, plugin: &str, child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        let inner = inner.clone();
        let plugin = plugin.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    inner.emit(ProcessEvent::Output {
                        plugin: plugin.clone(),
                        stream: OutputStream::Stdout,
                        chunk: line,
                    });
                }
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let inner = inner.clone();
        let plugin = plugin.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    inner.emit(ProcessEvent::Output {
                        plugin: plugin.clone(),
                        stream: OutputStream::Stderr,
                        chunk: line,
                    });
                }
            }
        });
    }
}
