use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::resolver;

/// One installable unit as published in `packageconfig.yaml`.
///
/// Field names follow the wire format (camelCase). Anything the list omits, or
/// sends as `null`, falls back to an empty/zero value so a single bad entry
/// never sinks the whole catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object_key: String,

    /// Bytes of this package's own archive.
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: u64,
    /// Own size plus every transitive dependency, each counted once.
    #[serde(default)]
    pub total_size: Option<u64>,

    /// Direct dependencies only, in declared order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dependency_count: usize,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_top_level_package: bool,

    /// Content fingerprint of the version currently published (the ETag).
    #[serde(default, deserialize_with = "null_as_default")]
    pub hash: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_modified: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Package {
    pub fn new(id: impl Into<String>, size: u64, hash: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            size,
            hash: hash.into(),
            ..Default::default()
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Size to show next to the package: the precomputed total when known.
    pub fn display_size(&self) -> u64 {
        self.total_size.unwrap_or(self.size)
    }
}

/// A package with its dependencies expanded into a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageNode {
    pub package: Package,
    pub dependencies: BTreeMap<String, PackageNode>,
}

/// Metadata read from the object store (HEAD request) for one archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub size: Option<u64>,
    pub last_modified: Option<String>,
    pub hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PackageList {
    #[serde(default)]
    packages: Vec<Package>,
}

/// Every known package, keyed by id. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    packages: BTreeMap<String, Package>,
}

impl Catalog {
    pub fn from_packages(packages: impl IntoIterator<Item = Package>) -> Self {
        let mut catalog = Catalog {
            packages: packages
                .into_iter()
                .filter(|p| !p.id.is_empty())
                .map(|p| (p.id.clone(), p))
                .collect(),
        };
        for (id, dep) in catalog.dangling_dependencies() {
            log::warn!("package {id} depends on {dep}, which is not in the catalog");
        }
        catalog.refresh_derived();
        catalog
    }

    /// Parse `packageconfig.yaml` (`{ packages: [...] }`).
    pub fn from_yaml(text: &str) -> Result<Self> {
        let list: PackageList = serde_yaml::from_str(text)?;
        Ok(Self::from_packages(list.packages))
    }

    pub fn get(&self, id: &str) -> Option<&Package> {
        self.packages.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.packages.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    /// `(package, dependency)` pairs whose dependency isn't listed.
    pub fn dangling_dependencies(&self) -> Vec<(&str, &str)> {
        let packages = &self.packages;
        packages
            .values()
            .flat_map(move |p| {
                p.dependencies
                    .iter()
                    .filter(move |dep| !packages.contains_key(dep.as_str()))
                    .map(move |dep| (p.id.as_str(), dep.as_str()))
            })
            .collect()
    }

    /// Overlay size/hash/date from the object store onto a listed package.
    pub fn apply_metadata(&mut self, id: &str, meta: RemoteMetadata) -> bool {
        let Some(pkg) = self.packages.get_mut(id) else {
            return false;
        };
        if let Some(size) = meta.size {
            pkg.size = size;
        }
        if let Some(last_modified) = meta.last_modified {
            pkg.last_modified = last_modified;
        }
        if let Some(hash) = meta.hash {
            pkg.hash = hash;
        }
        self.refresh_derived();
        true
    }

    /// Packages nothing else depends on.
    pub fn roots(&self) -> Vec<&Package> {
        let depended_on: HashSet<&str> = self
            .packages
            .values()
            .flat_map(|p| p.dependencies.iter().map(String::as_str))
            .collect();
        self.packages
            .values()
            .filter(|p| !depended_on.contains(p.id.as_str()))
            .collect()
    }

    /// Root packages with their dependency trees expanded.
    pub fn tree(&self) -> BTreeMap<String, PackageNode> {
        let mut path = Vec::new();
        self.roots()
            .into_iter()
            .filter_map(|p| {
                self.build_node(&p.id, &mut path)
                    .map(|node| (p.id.clone(), node))
            })
            .collect()
    }

    fn build_node(&self, id: &str, path: &mut Vec<String>) -> Option<PackageNode> {
        let package = self.packages.get(id)?.clone();
        let mut dependencies = BTreeMap::new();

        // A dependency already on the current path would close a cycle.
        if !path.iter().any(|p| p == id) {
            path.push(id.to_string());
            for dep in &package.dependencies {
                if let Some(node) = self.build_node(dep, path) {
                    dependencies.insert(dep.clone(), node);
                }
            }
            path.pop();
        }

        Some(PackageNode {
            package,
            dependencies,
        })
    }

    fn refresh_derived(&mut self) {
        let this: &Catalog = self;
        let depended_on: BTreeSet<String> = this
            .packages
            .values()
            .flat_map(|p| p.dependencies.iter().cloned())
            .collect();

        let derived: Vec<(String, u64, usize)> = this
            .packages
            .keys()
            .map(|id| {
                let closure = resolver::closure_of(id, this);
                let total = resolver::total_size(closure.as_slice(), this);
                (id.clone(), total, closure.len().saturating_sub(1))
            })
            .collect();

        for (id, total, count) in derived {
            if let Some(pkg) = self.packages.get_mut(&id) {
                pkg.total_size = Some(total);
                pkg.dependency_count = count;
                pkg.is_top_level_package = !depended_on.contains(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r#"
packages:
  - id: tamods-dll
    displayName: TAMods Core Library
    description: Core
    version: "1.0"
    objectKey: packages/tamods-dll.zip
    size: 100
    hash: abc
  - id: tamods-stdlib
    displayName: TAMods Standard Library
    description: Stdlib
    version: "1.0"
    objectKey: packages/tamods-stdlib.zip
    dependencies: [tamods-dll]
    size: 50
  - id: community-maps
    displayName: Community Maps
    description: Maps
    objectKey: packages/community-maps.zip
    size: null
    dependencies: null
"#;

    #[test]
    fn parses_yaml_with_missing_fields() {
        let catalog = Catalog::from_yaml(LIST).unwrap();
        assert_eq!(catalog.len(), 3);

        let maps = catalog.get("community-maps").unwrap();
        assert_eq!(maps.size, 0);
        assert!(maps.dependencies.is_empty());
        assert_eq!(maps.hash, "");
        assert_eq!(maps.version, "");
    }

    #[test]
    fn derives_totals_and_roots() {
        let catalog = Catalog::from_yaml(LIST).unwrap();

        let stdlib = catalog.get("tamods-stdlib").unwrap();
        assert_eq!(stdlib.total_size, Some(150));
        assert_eq!(stdlib.dependency_count, 1);
        assert!(stdlib.is_top_level_package);

        let dll = catalog.get("tamods-dll").unwrap();
        assert!(!dll.is_top_level_package);

        let roots: Vec<&str> = catalog.roots().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(roots, vec!["community-maps", "tamods-stdlib"]);
    }

    #[test]
    fn shared_dependency_counted_once_in_total() {
        let catalog = Catalog::from_packages([
            Package::new("a", 1, "").with_dependencies(["b", "c"]),
            Package::new("b", 10, "").with_dependencies(["d"]),
            Package::new("c", 100, "").with_dependencies(["d"]),
            Package::new("d", 1000, ""),
        ]);
        assert_eq!(catalog.get("a").unwrap().total_size, Some(1111));
        assert_eq!(catalog.get("a").unwrap().dependency_count, 3);
    }

    #[test]
    fn dangling_dependencies_are_listed() {
        let catalog = Catalog::from_packages([
            Package::new("a", 5, "").with_dependencies(["ghost", "b"]),
            Package::new("b", 7, ""),
        ]);
        assert_eq!(catalog.dangling_dependencies(), vec![("a", "ghost")]);
        // Missing ids add nothing to the derived totals.
        assert_eq!(catalog.get("a").unwrap().total_size, Some(12));
        assert_eq!(catalog.get("a").unwrap().dependency_count, 1);
    }

    #[test]
    fn tree_nests_dependencies() {
        let catalog = Catalog::from_yaml(LIST).unwrap();
        let tree = catalog.tree();
        let stdlib = &tree["tamods-stdlib"];
        assert!(stdlib.dependencies.contains_key("tamods-dll"));
        assert!(!tree.contains_key("tamods-dll"));
    }

    #[test]
    fn tree_survives_cycles() {
        let catalog = Catalog::from_packages([
            Package::new("root", 1, "").with_dependencies(["a"]),
            Package::new("a", 1, "").with_dependencies(["b"]),
            Package::new("b", 1, "").with_dependencies(["a"]),
        ]);
        let tree = catalog.tree();
        let a = &tree["root"].dependencies["a"];
        let b = &a.dependencies["b"];
        assert!(b.dependencies["a"].dependencies.is_empty());
    }

    #[test]
    fn metadata_overlay_updates_hash_and_totals() {
        let mut catalog = Catalog::from_yaml(LIST).unwrap();
        let applied = catalog.apply_metadata(
            "tamods-dll",
            RemoteMetadata {
                size: Some(200),
                last_modified: Some("Tue, 01 Oct 2024 10:00:00 GMT".into()),
                hash: Some("def".into()),
            },
        );
        assert!(applied);
        assert_eq!(catalog.get("tamods-dll").unwrap().hash, "def");
        assert_eq!(catalog.get("tamods-stdlib").unwrap().total_size, Some(250));
        assert!(!catalog.apply_metadata("missing", RemoteMetadata::default()));
    }
}
