use serde::{Deserialize, Serialize};

use crate::package::Catalog;
use crate::queue::DownloadQueue;
use crate::resolver;

/// Order packages are listed in the package table.
const DISPLAY_ORDER: [&str; 8] = [
    "tamods-dll",
    "tamods-stdlib",
    "community-maps",
    "tamods-routesrec",
    "tamods-routeslib",
    "tamods-routesjphard",
    "tamods-dll-beta",
    "tamods-dll-edge",
];

const MINIMUM: [&str; 1] = ["tamods-dll"];
const STANDARD: [&str; 2] = ["tamods-dll", "tamods-stdlib"];
const RECOMMENDED: [&str; 4] = [
    "tamods-dll",
    "tamods-stdlib",
    "community-maps",
    "tamods-routesrec",
];

/// One-click install bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstallTier {
    Minimum,
    Standard,
    Recommended,
    All,
}

impl InstallTier {
    pub const ALL_TIERS: [InstallTier; 4] = [
        InstallTier::Minimum,
        InstallTier::Standard,
        InstallTier::Recommended,
        InstallTier::All,
    ];

    /// Top-level packages; dependencies are resolved at install time.
    pub fn package_ids(self) -> &'static [&'static str] {
        match self {
            InstallTier::Minimum => &MINIMUM,
            InstallTier::Standard => &STANDARD,
            InstallTier::Recommended => &RECOMMENDED,
            InstallTier::All => &DISPLAY_ORDER,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InstallTier::Minimum => "Minimum",
            InstallTier::Standard => "Standard",
            InstallTier::Recommended => "Recommended",
            InstallTier::All => "All",
        }
    }

    /// Download size of the whole tier, shared dependencies counted once.
    pub fn size(self, catalog: &Catalog) -> u64 {
        let ids = resolver::resolve(self.package_ids(), catalog);
        resolver::total_size(ids.as_slice(), catalog)
    }
}

/// Position of `id` in the package table; unlisted ids sort last.
pub fn display_rank(id: &str) -> usize {
    DISPLAY_ORDER
        .iter()
        .position(|p| *p == id)
        .unwrap_or(DISPLAY_ORDER.len())
}

/// Ids a tier install would enqueue: the resolved closure minus anything queued
/// or already installed at the current hash.
pub fn plan(tier: InstallTier, queue: &DownloadQueue) -> Vec<String> {
    plan_ids(tier.package_ids(), queue)
}

pub fn plan_ids<S: AsRef<str>>(ids: &[S], queue: &DownloadQueue) -> Vec<String> {
    resolver::resolve(ids, queue.catalog())
        .into_iter()
        .filter(|id| !queue.is_queued(id) && !queue.is_up_to_date(id))
        .collect()
}

/// A tier's button is disabled once it has nothing left to install.
pub fn is_disabled(tier: InstallTier, queue: &DownloadQueue) -> bool {
    plan(tier, queue).is_empty()
}

pub fn install(tier: InstallTier, queue: &mut DownloadQueue) -> usize {
    let ids = plan(tier, queue);
    log::info!("installing {} tier: {:?}", tier.label(), ids);
    queue.enqueue_all(ids)
}

/// Install individual packages (the advanced table) with their dependencies.
pub fn install_packages<S: AsRef<str>>(ids: &[S], queue: &mut DownloadQueue) -> usize {
    let ids = plan_ids(ids, queue);
    queue.enqueue_all(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DownloadEvent;
    use crate::completed::CompletedSet;
    use crate::package::Package;
    use crate::queue::tests::FakeBackend;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn catalog() -> Catalog {
        Catalog::from_packages([
            Package::new("tamods-dll", 100, "dll1"),
            Package::new("tamods-stdlib", 50, "std1").with_dependencies(["tamods-dll"]),
            Package::new("community-maps", 400, "maps1"),
            Package::new("tamods-routesrec", 10, "rec1").with_dependencies(["tamods-stdlib"]),
        ])
    }

    fn queue(completed: CompletedSet) -> DownloadQueue {
        DownloadQueue::new(
            Arc::new(catalog()),
            Arc::new(FakeBackend::default()),
            Box::new(MemoryStore::with_value(completed)),
        )
    }

    #[test]
    fn tier_sizes() {
        let catalog = catalog();
        assert_eq!(InstallTier::Minimum.size(&catalog), 100);
        assert_eq!(InstallTier::Standard.size(&catalog), 150);
        assert_eq!(InstallTier::Recommended.size(&catalog), 560);
        // Unlisted packages are skipped.
        assert_eq!(InstallTier::All.size(&catalog), 560);
    }

    #[test]
    fn display_rank_orders_known_ids_first() {
        assert_eq!(display_rank("tamods-dll"), 0);
        assert_eq!(display_rank("tamods-dll-edge"), 7);
        assert_eq!(display_rank("something-else"), 8);
    }

    #[tokio::test]
    async fn install_skips_queued_and_up_to_date() {
        let completed: CompletedSet = [("tamods-dll", "dll1")].into_iter().collect();
        let mut q = queue(completed);

        assert_eq!(plan(InstallTier::Standard, &q), vec!["tamods-stdlib"]);
        assert_eq!(install(InstallTier::Standard, &mut q), 1);
        assert!(is_disabled(InstallTier::Standard, &q));
        assert!(is_disabled(InstallTier::Minimum, &q));
        assert!(!is_disabled(InstallTier::Recommended, &q));

        // Re-clicking does nothing.
        assert_eq!(install(InstallTier::Standard, &mut q), 0);
        assert_eq!(q.queue().len(), 1);
    }

    #[tokio::test]
    async fn stale_packages_are_reinstalled() {
        let completed: CompletedSet = [("tamods-dll", "dll0")].into_iter().collect();
        let mut q = queue(completed);
        assert!(!is_disabled(InstallTier::Minimum, &q));
        assert_eq!(install(InstallTier::Minimum, &mut q), 1);

        q.handle_event(DownloadEvent::Completed {
            package_id: "tamods-dll".into(),
            hash: "dll1".into(),
        });
        assert!(is_disabled(InstallTier::Minimum, &q));
    }

    #[tokio::test]
    async fn single_package_pulls_dependencies() {
        let mut q = queue(CompletedSet::new());
        assert_eq!(install_packages(&["tamods-routesrec"], &mut q), 3);
        assert_eq!(
            q.queue(),
            ["tamods-routesrec", "tamods-stdlib", "tamods-dll"].map(String::from)
        );
    }
}
