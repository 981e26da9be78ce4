//! Hot reload of the config file and the project directory.
//!
//! Triggers come from SIGHUP (Unix only) and from a `notify` watcher on the
//! files' parent directories. A reload that fails validation changes nothing.

use crate::allowlist::AllowList;
use crate::config::Config;
use crate::directory::ProjectDirectory;
use crate::error::{GatewayError, Result};
use crate::metrics::IngestMetrics;
use crate::pipeline::EncryptionKey;
use notify::event::{DataChange, EventKind, ModifyKind};
use notify::{RecursiveMode, Watcher};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Minimum spacing between file-change triggers for one file (milliseconds).
///
/// Editors emit several events per save (write temp, rename, chmod).
const FILE_CHANGE_DEBOUNCE_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadTrigger {
    Sighup,
    ConfigChanged,
    ProjectsChanged,
}

pub struct ConfigWatcher {
    rx: mpsc::Receiver<ReloadTrigger>,
    // Dropping the watcher stops it
    _file_watcher: notify::RecommendedWatcher,
}

struct WatchedFile {
    name: OsString,
    trigger: ReloadTrigger,
    last_trigger_ms: AtomicU64,
}

impl ConfigWatcher {
    pub fn new(config_path: &Path, projects_path: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<ReloadTrigger>(8);

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let sighup_tx = tx.clone();
            tokio::spawn(async move {
                let mut sighup = match signal(SignalKind::hangup()) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(error = %e, "failed to install SIGHUP handler");
                        return;
                    }
                };
                while sighup.recv().await.is_some() {
                    info!("received SIGHUP, triggering reload");
                    if sighup_tx.send(ReloadTrigger::Sighup).await.is_err() {
                        break;
                    }
                }
            });
        }

        let files = vec![
            watched(config_path, ReloadTrigger::ConfigChanged)?,
            watched(projects_path, ReloadTrigger::ProjectsChanged)?,
        ];
        let dirs: HashSet<PathBuf> = [config_path, projects_path]
            .iter()
            .map(|p| parent_dir(p))
            .collect();

        let mut watcher: notify::RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let is_write_event = matches!(
                        event.kind,
                        EventKind::Modify(ModifyKind::Data(DataChange::Any | DataChange::Content))
                            | EventKind::Modify(ModifyKind::Name(_))
                            | EventKind::Create(_)
                    );
                    if !is_write_event {
                        return;
                    }
                    for file in &files {
                        let touched = event
                            .paths
                            .iter()
                            .any(|p| p.file_name().map(|f| f == file.name).unwrap_or(false));
                        if !touched {
                            continue;
                        }
                        let now_ms = SystemTime::now()
                            .duration_since(UNIX_EPOCH)
                            .unwrap_or_default()
                            .as_millis() as u64;
                        let prev_ms = file.last_trigger_ms.swap(now_ms, Ordering::Relaxed);
                        if now_ms.saturating_sub(prev_ms) < FILE_CHANGE_DEBOUNCE_MS {
                            continue;
                        }
                        info!(file = ?file.name, "watched file changed, triggering reload");
                        if tx.blocking_send(file.trigger.clone()).is_err() {
                            warn!("reload channel closed, file watcher stopping");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "file watcher error"),
            })?;

        for dir in &dirs {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
            info!(watch_dir = %dir.display(), "config file watcher started");
        }

        Ok(Self {
            rx,
            _file_watcher: watcher,
        })
    }

    pub async fn next(&mut self) -> Option<ReloadTrigger> {
        self.rx.recv().await
    }
}

fn watched(path: &Path, trigger: ReloadTrigger) -> Result<WatchedFile> {
    let name = path
        .file_name()
        .ok_or_else(|| GatewayError::Config(format!("'{}' has no file name", path.display())))?
        .to_os_string();
    Ok(WatchedFile {
        name,
        trigger,
        last_trigger_ms: AtomicU64::new(0),
    })
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Applies reloaded settings to the live gateway.
pub struct Reloader {
    config_path: PathBuf,
    current: Mutex<Config>,
    key: Arc<EncryptionKey>,
    allowlist: Arc<AllowList>,
    directory: Arc<ProjectDirectory>,
}

impl Reloader {
    pub fn new(
        config_path: PathBuf,
        config: Config,
        key: Arc<EncryptionKey>,
        allowlist: Arc<AllowList>,
        directory: Arc<ProjectDirectory>,
    ) -> Self {
        Self {
            config_path,
            current: Mutex::new(config),
            key,
            allowlist,
            directory,
        }
    }

    pub fn projects_path(&self) -> PathBuf {
        self.lock_current().projects_file.clone()
    }

    /// Re-read the config file and apply the key and allowlist.
    pub fn reload_config(&self) -> Result<()> {
        let next = match Config::load(&self.config_path) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, path = %self.config_path.display(), "config reload failed, keeping previous settings");
                IngestMetrics::record_reload(false);
                return Err(e);
            }
        };

        // Validated above, so an error here is only the fail-closed path
        if let Err(e) = self.key.replace(&next.encrypted) {
            IngestMetrics::record_reload(false);
            return Err(e);
        }

        let mut current = self.lock_current();
        if next.ip_pass != current.ip_pass {
            self.allowlist.set_entries(next.ip_pass.clone());
        }
        for setting in current.restart_only_changes(&next) {
            warn!(setting, "changed setting requires a restart, ignoring");
        }
        // Keep restart-only settings as they are running
        current.encrypted = next.encrypted;
        current.ip_pass = next.ip_pass;

        info!(path = %self.config_path.display(), "Configuration reloaded");
        IngestMetrics::record_reload(true);
        Ok(())
    }

    pub fn reload_projects(&self) -> Result<()> {
        let path = self.projects_path();
        match self.directory.reload(&path) {
            Ok(_) => {
                IngestMetrics::record_reload(true);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, path = %path.display(), "project directory reload failed, keeping previous map");
                IngestMetrics::record_reload(false);
                Err(e)
            }
        }
    }

    pub fn handle(&self, trigger: &ReloadTrigger) {
        // Failures are logged and counted inside
        match trigger {
            ReloadTrigger::ConfigChanged => {
                let _ = self.reload_config();
            }
            ReloadTrigger::ProjectsChanged => {
                let _ = self.reload_projects();
            }
            ReloadTrigger::Sighup => {
                let _ = self.reload_config();
                let _ = self.reload_projects();
            }
        }
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Config> {
        self.current.lock().unwrap_or_else(|p| p.into_inner())
    }
}

pub async fn run_reload_loop(
    mut watcher: ConfigWatcher,
    reloader: Arc<Reloader>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            trigger = watcher.next() => match trigger {
                Some(trigger) => reloader.handle(&trigger),
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("Reload loop stopped");
}
