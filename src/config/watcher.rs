//! Route directory watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::routing::collector::FileCollector;

/// A change under the routes root that requires a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteChange {
    pub paths: Vec<PathBuf>,
}

/// A watcher that monitors the routes root for route file changes.
pub struct RouteWatcher {
    root: PathBuf,
    collector: FileCollector,
    change_tx: mpsc::UnboundedSender<RouteChange>,
}

impl RouteWatcher {
    /// Create a new RouteWatcher.
    ///
    /// Returns the watcher and a receiver for change notifications.
    pub fn new(root: &Path, collector: FileCollector) -> (Self, mpsc::UnboundedReceiver<RouteChange>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        (
            Self {
                root: root.to_path_buf(),
                collector,
                change_tx,
            },
            change_rx,
        )
    }

    /// Start watching in a background thread.
    ///
    /// The returned watcher must be kept alive for notifications to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx.clone();
        let collector = self.collector.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove()) {
                        return;
                    }
                    let paths: Vec<PathBuf> = event
                        .paths
                        .into_iter()
                        .filter(|p| collector.is_candidate(p) || p.extension().is_none())
                        .collect();
                    if paths.is_empty() {
                        return;
                    }
                    tracing::info!(paths = ?paths, "Route files changed, rebuilding routes");
                    let _ = tx.send(RouteChange { paths });
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        tracing::info!(path = ?self.root, "Route watcher started");
        Ok(watcher)
    }
}
