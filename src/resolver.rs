use std::collections::HashSet;

use crate::package::Catalog;

/// Expand requested package ids into everything that has to be downloaded.
///
/// Each requested id that exists in the catalog, and each of its transitive
/// dependencies, appears exactly once. Order is discovery order: a requested id
/// first, then its dependencies depth-first. Unknown ids are skipped.
///
/// Download state is not consulted; callers filter out queued/completed ids.
pub fn resolve<I, S>(requested: I, catalog: &Catalog) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut walk = Walk::default();
    for id in requested {
        let id = id.as_ref();
        if !catalog.contains(id) {
            log::debug!("resolve: skipping unknown package {id}");
            continue;
        }
        walk.visit(id, catalog);
    }
    for id in &walk.missing {
        log::warn!("resolve: dependency {id} is not in the catalog");
    }
    walk.out
}

/// [`resolve`] for one known id, without logging dangling dependencies.
pub(crate) fn closure_of(id: &str, catalog: &Catalog) -> Vec<String> {
    let mut walk = Walk::default();
    if catalog.contains(id) {
        walk.visit(id, catalog);
    }
    walk.out
}

#[derive(Default)]
struct Walk {
    visited: HashSet<String>,
    out: Vec<String>,
    missing: Vec<String>,
}

impl Walk {
    fn visit(&mut self, id: &str, catalog: &Catalog) {
        if !self.visited.insert(id.to_string()) {
            return;
        }
        let Some(pkg) = catalog.get(id) else {
            self.missing.push(id.to_string());
            return;
        };
        self.out.push(id.to_string());
        for dep in &pkg.dependencies {
            self.visit(dep, catalog);
        }
    }
}

/// Sum of own sizes for a set of ids. Duplicates and unknown ids count zero.
pub fn total_size<S: AsRef<str>>(ids: &[S], catalog: &Catalog) -> u64 {
    let mut seen: HashSet<&str> = HashSet::new();
    ids.iter()
        .map(AsRef::as_ref)
        .filter(|id| seen.insert(*id))
        .filter_map(|id| catalog.get(id))
        .map(|p| p.size)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Package;

    fn catalog() -> Catalog {
        Catalog::from_packages([
            Package::new("A", 10, "h").with_dependencies(["B"]),
            Package::new("B", 20, "h"),
            Package::new("C", 30, "h").with_dependencies(["B", "D"]),
            Package::new("D", 40, "h").with_dependencies(["E"]),
            Package::new("E", 50, "h"),
        ])
    }

    #[test]
    fn single_dependency() {
        assert_eq!(resolve(["A"], &catalog()), vec!["A", "B"]);
    }

    #[test]
    fn shared_dependencies_appear_once() {
        let ids = resolve(["A", "C"], &catalog());
        assert_eq!(ids, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn requested_dependency_is_not_duplicated() {
        let ids = resolve(["B", "A", "B"], &catalog());
        assert_eq!(ids, vec!["B", "A"]);
    }

    #[test]
    fn unknown_ids_are_skipped() {
        let ids = resolve(["nope", "D"], &catalog());
        assert_eq!(ids, vec!["D", "E"]);
        assert!(resolve(["nope"], &catalog()).is_empty());
    }

    #[test]
    fn missing_dependency_is_skipped() {
        let catalog = Catalog::from_packages([
            Package::new("A", 1, "").with_dependencies(["ghost", "B"]),
            Package::new("B", 1, ""),
        ]);
        assert_eq!(resolve(["A"], &catalog), vec!["A", "B"]);
    }

    #[test]
    fn closure_of_matches_resolve() {
        let catalog = Catalog::from_packages([
            Package::new("A", 1, "").with_dependencies(["ghost", "B"]),
            Package::new("B", 1, ""),
        ]);
        assert_eq!(closure_of("A", &catalog), resolve(["A"], &catalog));
        assert!(closure_of("ghost", &catalog).is_empty());
    }

    #[test]
    fn terminates_on_cycles() {
        let catalog = Catalog::from_packages([
            Package::new("A", 1, "").with_dependencies(["B"]),
            Package::new("B", 1, "").with_dependencies(["C"]),
            Package::new("C", 1, "").with_dependencies(["A"]),
        ]);
        assert_eq!(resolve(["B"], &catalog), vec!["B", "C", "A"]);
    }

    #[test]
    fn total_size_counts_each_id_once() {
        let catalog = catalog();
        assert_eq!(total_size(&["A", "B", "B", "zzz"], &catalog), 30);
        assert_eq!(total_size::<&str>(&[], &catalog), 0);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        // Indices past the package count name ids the catalog doesn't list.
        fn graph() -> impl Strategy<Value = (Catalog, Vec<String>)> {
            (1usize..10).prop_flat_map(|n| {
                let deps = prop::collection::vec(prop::collection::vec(0..n + 3, 0..4), n);
                let requested = prop::collection::vec(0..n + 3, 0..5);
                (deps, requested).prop_map(|(deps, requested)| {
                    let catalog = Catalog::from_packages(deps.into_iter().enumerate().map(
                        |(i, d)| {
                            Package::new(format!("p{i}"), i as u64 + 1, "h")
                                .with_dependencies(d.into_iter().map(|j| format!("p{j}")))
                        },
                    ));
                    let requested: Vec<String> =
                        requested.into_iter().map(|j| format!("p{j}")).collect();
                    (catalog, requested)
                })
            })
        }

        proptest! {
            #[test]
            fn closure_is_complete_and_duplicate_free((catalog, requested) in graph()) {
                let ids = resolve(&requested, &catalog);

                let unique: HashSet<&String> = ids.iter().collect();
                prop_assert_eq!(unique.len(), ids.len(), "duplicates in {:?}", ids);

                for id in &requested {
                    prop_assert_eq!(ids.contains(id), catalog.contains(id));
                }
                for id in &ids {
                    let pkg = catalog.get(id);
                    prop_assert!(pkg.is_some(), "unknown id {} in closure", id);
                    for dep in pkg.map(|p| p.dependencies.as_slice()).unwrap_or_default() {
                        if catalog.contains(dep) {
                            prop_assert!(ids.contains(dep), "{} missing dependency {}", id, dep);
                        }
                    }
                }
            }

            #[test]
            fn total_size_matches_closure((catalog, requested) in graph()) {
                let ids = resolve(&requested, &catalog);
                let expected: u64 = ids.iter().filter_map(|id| catalog.get(id)).map(|p| p.size).sum();
                prop_assert_eq!(total_size(ids.as_slice(), &catalog), expected);
            }
        }
    }
}
