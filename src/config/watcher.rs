//! Configuration file watcher for hot reload.
//!
//! Only configurations that load AND validate cross the reload channel;
//! the daemon swaps them in without re-checking. A file that fails either
//! step is logged and ignored, and the running generation stays up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::loader::load_config;
use crate::config::schema::RouterConfig;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Watches the configuration file and emits validated replacements.
pub struct ConfigWatcher {
    path: PathBuf,
    reload_tx: mpsc::UnboundedSender<RouterConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end of the reload channel.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<RouterConfig>) {
        let (reload_tx, reload_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                reload_tx,
            },
            reload_rx,
        )
    }

    /// Start watching. The returned handle owns the watch; dropping it
    /// stops change detection.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.reload_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    // Editors replace rather than modify, so create
                    // events count as changes too.
                    if event.kind.is_modify() || event.kind.is_create() {
                        info!(path = %path.display(), "Config file changed, reloading");
                        match load_config(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(error) => {
                                error!(%error, "Reload rejected, keeping current configuration");
                            }
                        }
                    }
                }
                Err(error) => error!(%error, "Config watch error"),
            },
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}
