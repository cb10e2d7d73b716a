use std::collections::{BTreeSet, HashMap};

use crate::completed::CompletedSet;
use crate::package::Catalog;

/// Completed packages that need downloading again.
///
/// A package is stale when its recorded hash differs from the catalog's, or
/// when any dependency is stale, however deep. Dependencies that were never
/// downloaded do not make their dependents stale. Ids the catalog no longer
/// lists are ignored.
pub fn stale_packages(completed: &CompletedSet, catalog: &Catalog) -> BTreeSet<String> {
    let mut memo: HashMap<String, bool> = HashMap::new();
    completed
        .iter()
        .map(|(id, _)| id)
        .filter(|id| catalog.contains(id))
        .filter(|id| is_stale(id, completed, catalog, &mut memo))
        .map(str::to_string)
        .collect()
}

fn is_stale(
    id: &str,
    completed: &CompletedSet,
    catalog: &Catalog,
    memo: &mut HashMap<String, bool>,
) -> bool {
    if let Some(&known) = memo.get(id) {
        return known;
    }
    // Provisional answer while this id is being visited; breaks cycles.
    memo.insert(id.to_string(), false);

    let Some(pkg) = catalog.get(id) else {
        return false;
    };
    let own = match completed.hash_of(id) {
        Some(hash) => hash != pkg.hash,
        None => false,
    };
    let stale = own
        || pkg
            .dependencies
            .iter()
            .any(|dep| is_stale(dep, completed, catalog, memo));

    memo.insert(id.to_string(), stale);
    stale
}

/// Downloaded at the current hash, and so is every dependency.
pub fn is_up_to_date(id: &str, completed: &CompletedSet, catalog: &Catalog) -> bool {
    let mut visiting: Vec<String> = Vec::new();
    up_to_date(id, completed, catalog, &mut visiting)
}

fn up_to_date(
    id: &str,
    completed: &CompletedSet,
    catalog: &Catalog,
    visiting: &mut Vec<String>,
) -> bool {
    if visiting.iter().any(|v| v == id) {
        return true;
    }
    let Some(pkg) = catalog.get(id) else {
        return false;
    };
    if completed.hash_of(id) != Some(pkg.hash.as_str()) {
        return false;
    }
    visiting.push(id.to_string());
    let deps_ok = pkg
        .dependencies
        .iter()
        .all(|dep| up_to_date(dep, completed, catalog, visiting));
    visiting.pop();
    deps_ok
}
