//! Catalog loading and dependency ordering

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::error::CatalogError;
use crate::steps::ComponentSpec;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    component: Vec<ComponentSpec>,
}

/// A validated set of components in execution order.
///
/// Every component appears after all of its dependencies. Among components
/// whose dependencies are met, the one listed first runs first, so a catalog
/// that is already ordered keeps its order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    components: Vec<ComponentSpec>,
}

impl Catalog {
    /// Validate and order `components`
    pub fn new(components: Vec<ComponentSpec>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for spec in &components {
            if !seen.insert(spec.name.as_str()) {
                return Err(CatalogError::Duplicate(spec.name.clone()));
            }
        }

        for spec in &components {
            if let Some(dependency) = spec.depends_on.iter().find(|d| !seen.contains(d.as_str())) {
                return Err(CatalogError::UnknownDependency {
                    component: spec.name.clone(),
                    dependency: dependency.clone(),
                });
            }
            let invalid = |reason| CatalogError::Invalid {
                component: spec.name.clone(),
                reason,
            };
            spec.step().validate().map_err(invalid)?;
            for probe in spec.check.iter().chain(&spec.verify) {
                probe.validate().map_err(invalid)?;
            }
        }

        let order = execution_order(&components)?;
        let mut slots: Vec<Option<ComponentSpec>> = components.into_iter().map(Some).collect();
        let components = order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect();
        Ok(Self { components })
    }

    /// Parse a `[[component]]` TOML document
    pub fn from_toml(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(text)?;
        Self::new(file.component)
    }

    /// Components in execution order
    pub fn components(&self) -> &[ComponentSpec] {
        &self.components
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ComponentSpec> {
        self.components.iter()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ComponentSpec> {
        self.components.iter().find(|c| c.name == name)
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a ComponentSpec;
    type IntoIter = std::slice::Iter<'a, ComponentSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Kahn's algorithm, always taking the lowest ready index
fn execution_order(components: &[ComponentSpec]) -> Result<Vec<usize>, CatalogError> {
    let index: HashMap<&str, usize> = components
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.as_str(), i))
        .collect();

    let mut pending = vec![0usize; components.len()];
    let mut dependents = vec![Vec::new(); components.len()];
    for (i, spec) in components.iter().enumerate() {
        let deps: HashSet<usize> = spec.depends_on.iter().map(|d| index[d.as_str()]).collect();
        pending[i] = deps.len();
        for dep in deps {
            dependents[dep].push(i);
        }
    }

    let mut ready: Vec<usize> = (0..components.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(components.len());

    while !ready.is_empty() {
        // ready is kept sorted descending, so the lowest index pops first
        ready.sort_unstable_by(|a, b| b.cmp(a));
        let Some(next) = ready.pop() else { break };
        order.push(next);
        for &dependent in &dependents[next] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.push(dependent);
            }
        }
    }

    if order.len() < components.len() {
        let stuck = components
            .iter()
            .enumerate()
            .filter(|(i, _)| pending[*i] > 0)
            .map(|(_, c)| c.name.clone())
            .collect();
        return Err(CatalogError::Cycle(stuck));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{NativePackages, Probe, ServiceEnable};

    fn native(name: &str) -> ComponentSpec {
        ComponentSpec::new(name, NativePackages::new([name]))
    }

    fn names(catalog: &Catalog) -> Vec<&str> {
        catalog.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_list_order_kept_without_dependencies() {
        let catalog = Catalog::new(vec![native("git"), native("curl"), native("fish")]).unwrap();
        assert_eq!(names(&catalog), vec!["git", "curl", "fish"]);
    }

    #[test]
    fn test_dependencies_run_first() {
        let catalog = Catalog::new(vec![
            ComponentSpec::new("docker-service", ServiceEnable::new("docker"))
                .depends_on(["docker"]),
            native("git"),
            native("docker"),
            native("curl"),
        ])
        .unwrap();

        assert_eq!(names(&catalog), vec!["git", "docker", "docker-service", "curl"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = Catalog::new(vec![native("git"), native("git")]).unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate(name) if name == "git"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = Catalog::new(vec![native("paru").depends_on(["base-devel"])]).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::UnknownDependency { dependency, .. } if dependency == "base-devel"
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let err = Catalog::new(vec![
            native("a").depends_on(["c"]),
            native("b").depends_on(["a"]),
            native("c").depends_on(["b"]),
            native("d"),
        ])
        .unwrap_err();
        match err {
            CatalogError::Cycle(names) => assert_eq!(names, vec!["a", "b", "c"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_action_rejected() {
        let empty: [&str; 0] = [];
        let err = Catalog::new(vec![ComponentSpec::new("nothing", NativePackages::new(empty))])
            .unwrap_err();
        assert!(matches!(err, CatalogError::Invalid { component, .. } if component == "nothing"));
    }

    #[test]
    fn test_empty_check_rejected() {
        let err = Catalog::from_toml(
            r#"
[[component]]
name = "desktop-apps"
install = { kind = "flatpak", apps = ["org.gimp.GIMP"] }
check = { kind = "flatpak", apps = [] }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::Invalid { component, .. } if component == "desktop-apps"));

        let err = Catalog::new(vec![native("git").with_verify(Probe::Package { packages: vec![] })])
            .unwrap_err();
        assert!(matches!(err, CatalogError::Invalid { component, .. } if component == "git"));
    }

    #[test]
    fn test_from_toml() {
        let catalog = Catalog::from_toml(
            r#"
[[component]]
name = "docker-group"
depends_on = ["docker"]
install = { kind = "group", group = "docker" }

[[component]]
name = "docker"
install = { kind = "native-package", packages = ["docker", "docker-compose"] }

[[component]]
name = "rustup"
install = { kind = "script", binary = "rustup", url = "https://sh.rustup.rs", args = ["-y"] }
"#,
        )
        .unwrap();

        assert_eq!(names(&catalog), vec!["docker", "docker-group", "rustup"]);
        assert_eq!(catalog.len(), 3);
        assert!(catalog.get("rustup").is_some());
    }

    #[test]
    fn test_from_toml_reports_parse_errors() {
        let err = Catalog::from_toml("[[component]]\nname = 3\n").unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }
}
