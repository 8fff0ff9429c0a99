//! Lifecycle of the local LanguageTool server the grammar checker talks to.

use std::{process::Stdio, time::Duration};

use anyhow::{Context, Result};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::{
    process::{Child, Command},
    sync::Mutex,
    time::{self, Instant},
};

use crate::{grammar::service::GrammarClient, settings::SidecarSettings};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const READY_POLL: Duration = Duration::from_millis(500);
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarStatus {
    /// Something already answers on the endpoint.
    Reused,
    Spawned,
    /// A process we spawned earlier is still alive, possibly still booting.
    AlreadyRunning,
    /// Spawned but never answered within the ready timeout.
    Unready,
    Disabled,
}

/// Owns the spawned server process, if we started one.
pub struct Sidecar {
    child: Mutex<Option<Child>>,
}

impl Sidecar {
    pub fn new() -> Self {
        Self {
            child: Mutex::new(None),
        }
    }

    pub async fn start(
        &self,
        settings: &SidecarSettings,
        client: &GrammarClient,
    ) -> Result<SidecarStatus> {
        if client.ping().await {
            match find_running_server() {
                Some(pid) => log_info!("reusing LanguageTool server pid={}", pid),
                None => log_info!("grammar endpoint {} already answers", client.endpoint()),
            }
            return Ok(SidecarStatus::Reused);
        }

        if !settings.autostart {
            log_info!("grammar sidecar autostart disabled");
            return Ok(SidecarStatus::Disabled);
        }

        let mut slot = self.child.lock().await;
        if let Some(existing) = slot.as_mut() {
            match existing.try_wait() {
                Ok(None) => {
                    log_info!("grammar sidecar pid={:?} still starting", existing.id());
                    return Ok(SidecarStatus::AlreadyRunning);
                }
                Ok(Some(status)) => log_warn!("previous grammar sidecar exited: {}", status),
                Err(err) => log_debug!("polling previous grammar sidecar: {}", err),
            }
        }

        let child = Command::new(&settings.program)
            .args(&settings.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn grammar sidecar `{}`", settings.program))?;
        log_info!(
            "spawned grammar sidecar `{}` pid={:?}",
            settings.program,
            child.id()
        );
        *slot = Some(child);
        drop(slot);

        let ready_timeout = Duration::from_millis(settings.ready_timeout_ms);
        if wait_ready(client, ready_timeout).await {
            log_info!("grammar sidecar ready");
            Ok(SidecarStatus::Spawned)
        } else {
            log_warn!(
                "grammar sidecar did not answer within {:?}; checks will report the service unavailable",
                ready_timeout
            );
            Ok(SidecarStatus::Unready)
        }
    }

    /// Kills the server if this process spawned it.
    pub async fn stop(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };
        if let Err(err) = child.start_kill() {
            log_debug!("grammar sidecar already gone: {}", err);
            return;
        }
        match time::timeout(STOP_GRACE, child.wait()).await {
            Ok(Ok(status)) => log_info!("grammar sidecar exited: {}", status),
            Ok(Err(err)) => log_error!("waiting for grammar sidecar: {}", err),
            Err(_) => log_warn!("grammar sidecar did not exit within {:?}", STOP_GRACE),
        }
    }
}

impl Default for Sidecar {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_ready(client: &GrammarClient, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if client.ping().await {
            return true;
        }
        time::sleep(READY_POLL).await;
    }
    false
}

fn find_running_server() -> Option<u32> {
    let mut system = System::new();
    system.refresh_processes_specifics(ProcessesToUpdate::All, ProcessRefreshKind::everything());

    let own_pid = std::process::id();
    system.processes().iter().find_map(|(pid, process)| {
        let pid = pid.as_u32();
        if pid == own_pid {
            return None;
        }
        let name = process.name().to_string_lossy();
        let args: Vec<String> = process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        is_languagetool_process(&name, &args).then_some(pid)
    })
}

fn is_languagetool_process(name: &str, args: &[String]) -> bool {
    if name.to_ascii_lowercase().contains("languagetool") {
        return true;
    }
    args.iter().any(|arg| {
        let arg = arg.to_ascii_lowercase();
        arg.contains("languagetool-server") || arg.contains("org.languagetool.server")
    })
}
