//! Package catalog, download queue and update tracking for the TAMods launcher.
//!
//! A [`Launcher`] is the session object the UI layer holds: it owns the
//! config, the catalog and the [`DownloadQueue`]. Transfers themselves are
//! done by a [`DownloadBackend`] supplied by the host.

mod error;

pub mod backend;
pub mod completed;
pub mod config;
pub mod format;
pub mod logger;
pub mod package;
pub mod progress;
pub mod queue;
pub mod resolver;
pub mod staleness;
pub mod store;
pub mod tiers;

use std::sync::Arc;

pub use backend::{CatalogSource, DownloadBackend, DownloadEvent, EventSender, HttpCatalogSource};
pub use completed::CompletedSet;
pub use config::{ConfigManager, LauncherConfig, LauncherPaths};
pub use error::{Error, Result};
pub use logger::LogSettings;
pub use package::{Catalog, Package, PackageNode};
pub use progress::QueueSnapshot;
pub use queue::{DownloadQueue, Notification, PackageState};
pub use tiers::InstallTier;

use crate::store::JsonFileStore;

pub struct Launcher {
    paths: LauncherPaths,
    config: ConfigManager,
    queue: DownloadQueue,
}

impl Launcher {
    /// Start a session: logging, config, completed packages, then the catalog.
    ///
    /// A catalog that can't be fetched leaves an empty package list; only a
    /// logging setup failure is fatal.
    pub async fn start(
        paths: LauncherPaths,
        source: &dyn CatalogSource,
        backend: Arc<dyn DownloadBackend>,
    ) -> Result<Self> {
        Self::start_with(paths, &LogSettings::default(), source, backend).await
    }

    pub async fn start_with(
        paths: LauncherPaths,
        log_settings: &LogSettings,
        source: &dyn CatalogSource,
        backend: Arc<dyn DownloadBackend>,
    ) -> Result<Self> {
        logger::init(&paths.logs_dir(), log_settings)?;
        log::info!("data dir: {}", paths.data_dir().to_string_lossy());

        let config = ConfigManager::load(Box::new(JsonFileStore::<LauncherConfig>::new(
            paths.config_file(),
        )));
        let catalog = backend::load_catalog(source).await;
        let queue = DownloadQueue::new(
            Arc::new(catalog),
            backend,
            Box::new(JsonFileStore::<CompletedSet>::new(paths.completed_file())),
        );

        Ok(Self {
            paths,
            config,
            queue,
        })
    }

    pub fn paths(&self) -> &LauncherPaths {
        &self.paths
    }

    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigManager {
        &mut self.config
    }

    pub fn queue(&self) -> &DownloadQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut DownloadQueue {
        &mut self.queue
    }

    /// Package table rows in display order.
    pub fn packages(&self) -> Vec<&Package> {
        let mut rows: Vec<&Package> = self.queue.catalog().iter().collect();
        rows.sort_by_key(|p| tiers::display_rank(&p.id));
        rows
    }

    pub fn install_tier(&mut self, tier: InstallTier) -> usize {
        tiers::install(tier, &mut self.queue)
    }

    pub fn is_tier_disabled(&self, tier: InstallTier) -> bool {
        tiers::is_disabled(tier, &self.queue)
    }

    pub fn install_packages<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        tiers::install_packages(ids, &mut self.queue)
    }

    /// Install the DLL package for the channel picked in settings.
    pub fn install_selected_dll(&mut self) -> usize {
        let id = self.config.get().dll_package_id();
        tiers::install_packages(&[id], &mut self.queue)
    }

    /// Re-fetch the catalog. Skipped while downloads are running.
    pub async fn refresh_catalog(&mut self, source: &dyn CatalogSource) -> bool {
        if !self.queue.queue().is_empty() {
            log::warn!("catalog refresh skipped while downloading");
            return false;
        }
        let catalog = backend::load_catalog(source).await;
        self.queue.set_catalog(Arc::new(catalog))
    }
}
