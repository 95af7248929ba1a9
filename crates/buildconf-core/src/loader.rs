//! Explicit, validating loader for a complete configuration bundle.
//!
//! The bundle is checked in one pass and either rejected with the first error
//! or turned into an immutable [`LoadedConfig`]. Loading is pure: the same
//! bundle always yields the same records and the same digest.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::descriptor::{BuildType, ParentRef, Project, VcsRoot};
use crate::digest;
use crate::error::{EntityKind, ReferenceError, Result, ValidationError};

/// The complete set of projects handed to the loader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub projects: Vec<Project>,
}

impl ConfigBundle {
    pub fn new(projects: Vec<Project>) -> Self {
        Self { projects }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Non-fatal findings reported at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// The build type has no steps and is not a build entry point.
    NotRunnable { build_type: String },
    /// The VCS root has no branch rules and no default branch.
    NothingMonitored { vcs_root: String },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::NotRunnable { build_type } => {
                write!(f, "build type {:?} has no steps and cannot run", build_type)
            }
            LoadWarning::NothingMonitored { vcs_root } => {
                write!(f, "VCS root {:?} monitors no branches", vcs_root)
            }
        }
    }
}

/// A runnable build type together with its resolved VCS root.
#[derive(Debug, Clone, Copy)]
pub struct BuildEntryPoint<'a> {
    pub project: &'a Project,
    pub build_type: &'a BuildType,
    pub vcs_root: &'a VcsRoot,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    bundle: ConfigBundle,
    projects: BTreeMap<String, usize>,
    build_types: BTreeMap<String, (usize, usize)>,
    vcs_roots: BTreeMap<String, (usize, usize)>,
    warnings: Vec<LoadWarning>,
}

/// Validating loader.
pub struct Loader;

impl Loader {
    /// Validate a bundle and resolve every reference.
    ///
    /// # Errors
    ///
    /// - `ValidationError` when a descriptor is malformed or an id repeats.
    /// - `RuleParseError` or `FeatureError` when a hand-built artifact rule
    ///   or feature would not read back as built.
    /// - `ReferenceError` when a parent or VCS root reference does not
    ///   resolve in scope, or the parent chain loops.
    pub fn load(bundle: ConfigBundle) -> Result<LoadedConfig> {
        for project in &bundle.projects {
            project.validate()?;
            for build_type in &project.build_types {
                build_type.validate_rules()?;
            }
        }

        let (projects, build_types, vcs_roots) = index(&bundle)?;

        let mut config = LoadedConfig {
            bundle,
            projects,
            build_types,
            vcs_roots,
            warnings: Vec::new(),
        };

        config.check_parents()?;
        config.check_vcs_references()?;
        config.collect_warnings();

        info!(
            projects = config.projects.len(),
            build_types = config.build_types.len(),
            vcs_roots = config.vcs_roots.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Read a JSON bundle from disk and load it.
    pub fn load_path(path: impl AsRef<Path>) -> Result<LoadedConfig> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Reading configuration");
        Self::load(ConfigBundle::from_path(path)?)
    }
}

type Indexes = (
    BTreeMap<String, usize>,
    BTreeMap<String, (usize, usize)>,
    BTreeMap<String, (usize, usize)>,
);

/// Index every descriptor by id, rejecting duplicates per entity kind.
fn index(bundle: &ConfigBundle) -> Result<Indexes> {
    let mut projects = BTreeMap::new();
    let mut build_types = BTreeMap::new();
    let mut vcs_roots = BTreeMap::new();

    for (p, project) in bundle.projects.iter().enumerate() {
        if projects.insert(project.id.clone(), p).is_some() {
            return Err(duplicate(EntityKind::Project, &project.id));
        }
        for (r, root) in project.vcs_roots.iter().enumerate() {
            if vcs_roots.insert(root.id.clone(), (p, r)).is_some() {
                return Err(duplicate(EntityKind::VcsRoot, &root.id));
            }
        }
        for (b, build_type) in project.build_types.iter().enumerate() {
            if build_types.insert(build_type.id.clone(), (p, b)).is_some() {
                return Err(duplicate(EntityKind::BuildType, &build_type.id));
            }
        }
    }
    Ok((projects, build_types, vcs_roots))
}

fn duplicate(entity: EntityKind, id: &str) -> crate::error::ConfigError {
    ValidationError::DuplicateId {
        entity,
        id: id.to_string(),
    }
    .into()
}

impl LoadedConfig {
    fn check_parents(&self) -> Result<()> {
        for project in &self.bundle.projects {
            if let ParentRef::Project(parent) = &project.parent {
                if !self.projects.contains_key(parent) {
                    return Err(ReferenceError::UnknownParent {
                        project: project.id.clone(),
                        parent: parent.clone(),
                    }
                    .into());
                }
            }
        }

        for (start, project) in self.bundle.projects.iter().enumerate() {
            let mut seen = HashSet::from([start]);
            let mut current = start;
            while let Some(parent) = self.parent_index(current) {
                if !seen.insert(parent) {
                    return Err(ReferenceError::ParentCycle {
                        project: project.id.clone(),
                    }
                    .into());
                }
                current = parent;
            }
        }
        Ok(())
    }

    fn check_vcs_references(&self) -> Result<()> {
        for (p, project) in self.bundle.projects.iter().enumerate() {
            let scope = self.scope(p);
            for build_type in &project.build_types {
                let root_id = &build_type.vcs.root;
                let (owner, _) = self.vcs_roots.get(root_id).copied().ok_or_else(|| {
                    ReferenceError::UnknownVcsRoot {
                        build_type: build_type.id.clone(),
                        vcs_root: root_id.clone(),
                    }
                })?;
                if !scope.contains(&owner) {
                    return Err(ReferenceError::VcsRootOutOfScope {
                        build_type: build_type.id.clone(),
                        vcs_root: root_id.clone(),
                        project: project.id.clone(),
                        owner: self.bundle.projects[owner].id.clone(),
                    }
                    .into());
                }
                debug!(build_type = %build_type.id, vcs_root = %root_id, "Resolved VCS root");
            }
        }
        Ok(())
    }

    fn collect_warnings(&mut self) {
        let mut warnings = Vec::new();
        for project in &self.bundle.projects {
            for root in &project.vcs_roots {
                if root.branch_spec.is_empty() && root.default_branch.is_none() {
                    warnings.push(LoadWarning::NothingMonitored {
                        vcs_root: root.id.clone(),
                    });
                }
            }
            for build_type in &project.build_types {
                if !build_type.is_runnable() {
                    warnings.push(LoadWarning::NotRunnable {
                        build_type: build_type.id.clone(),
                    });
                }
            }
        }
        for warning in &warnings {
            warn!(%warning, "Configuration warning");
        }
        self.warnings = warnings;
    }

    fn parent_index(&self, project: usize) -> Option<usize> {
        match &self.bundle.projects[project].parent {
            ParentRef::Root => None,
            ParentRef::Project(id) => self.projects.get(id).copied(),
        }
    }

    /// The project itself followed by its ancestors, nearest first.
    fn scope(&self, project: usize) -> Vec<usize> {
        let mut chain = vec![project];
        let mut current = project;
        while let Some(parent) = self.parent_index(current) {
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    fn project_index(&self, id: &str) -> Result<usize> {
        self.projects.get(id).copied().ok_or_else(|| {
            ReferenceError::NotFound {
                entity: EntityKind::Project,
                id: id.to_string(),
            }
            .into()
        })
    }

    fn build_type_index(&self, id: &str) -> Result<(usize, usize)> {
        self.build_types.get(id).copied().ok_or_else(|| {
            ReferenceError::NotFound {
                entity: EntityKind::BuildType,
                id: id.to_string(),
            }
            .into()
        })
    }

    /// Projects in declared order.
    pub fn projects(&self) -> &[Project] {
        &self.bundle.projects
    }

    pub fn project(&self, id: &str) -> Result<&Project> {
        Ok(&self.bundle.projects[self.project_index(id)?])
    }

    pub fn build_type(&self, id: &str) -> Result<&BuildType> {
        let (p, b) = self.build_type_index(id)?;
        Ok(&self.bundle.projects[p].build_types[b])
    }

    pub fn vcs_root(&self, id: &str) -> Result<&VcsRoot> {
        let (p, r) = self.vcs_roots.get(id).copied().ok_or_else(|| ReferenceError::NotFound {
            entity: EntityKind::VcsRoot,
            id: id.to_string(),
        })?;
        Ok(&self.bundle.projects[p].vcs_roots[r])
    }

    /// Project that owns a build type.
    pub fn owner_of(&self, build_type_id: &str) -> Result<&Project> {
        let (p, _) = self.build_type_index(build_type_id)?;
        Ok(&self.bundle.projects[p])
    }

    /// The VCS root a build type is bound to.
    pub fn resolve_vcs_root(&self, build_type_id: &str) -> Result<&VcsRoot> {
        let build_type = self.build_type(build_type_id)?;
        self.vcs_root(&build_type.vcs.root)
    }

    /// Ancestors of a project, nearest first, excluding the root sentinel.
    pub fn ancestors(&self, project_id: &str) -> Result<Vec<&Project>> {
        let p = self.project_index(project_id)?;
        Ok(self
            .scope(p)
            .into_iter()
            .skip(1)
            .map(|i| &self.bundle.projects[i])
            .collect())
    }

    /// Runnable build types of a project and its descendants, in declared
    /// order, each with its resolved VCS root.
    pub fn entry_points(&self, project_id: &str) -> Result<Vec<BuildEntryPoint<'_>>> {
        let target = self.project_index(project_id)?;
        let mut points = Vec::new();
        for (p, project) in self.bundle.projects.iter().enumerate() {
            if !self.scope(p).contains(&target) {
                continue;
            }
            for build_type in project.build_types.iter().filter(|bt| bt.is_runnable()) {
                points.push(BuildEntryPoint {
                    project,
                    build_type,
                    vcs_root: self.vcs_root(&build_type.vcs.root)?,
                });
            }
        }
        Ok(points)
    }

    /// Runnable build types across the whole bundle.
    pub fn all_entry_points(&self) -> Result<Vec<BuildEntryPoint<'_>>> {
        let mut points = Vec::new();
        for project in &self.bundle.projects {
            for build_type in project.build_types.iter().filter(|bt| bt.is_runnable()) {
                points.push(BuildEntryPoint {
                    project,
                    build_type,
                    vcs_root: self.vcs_root(&build_type.vcs.root)?,
                });
            }
        }
        Ok(points)
    }

    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    pub fn build_type_count(&self) -> usize {
        self.build_types.len()
    }

    pub fn vcs_root_count(&self) -> usize {
        self.vcs_roots.len()
    }

    /// Canonical digest of the loaded records.
    pub fn digest(&self) -> Result<String> {
        Ok(digest::compute_digest(&self.bundle)?)
    }

    pub fn bundle(&self) -> &ConfigBundle {
        &self.bundle
    }

    pub fn into_bundle(self) -> ConfigBundle {
        self.bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{AuthMethod, BuildStep, VcsSettings, VcsTrigger};
    use crate::error::ConfigError;
    use crate::rules::BranchSpec;

    fn root(id: &str) -> VcsRoot {
        VcsRoot::new(
            id,
            id,
            "ssh://host/repo.git",
            BranchSpec::parse_block("+:refs/heads/(*)").expect("spec"),
            AuthMethod::Anonymous,
        )
        .expect("root")
    }

    fn build(id: &str, root: &str) -> BuildType {
        BuildType::new(id, id, VcsSettings::new(root))
            .step(BuildStep::script("run.sh"))
            .with_trigger(VcsTrigger::every_commit())
    }

    #[test]
    fn test_minimal_bundle_loads() {
        let bundle = ConfigBundle::new(vec![Project::new("P", "P", ParentRef::Root)
            .vcs_root(root("Repo"))
            .build_type(build("Build", "Repo"))]);
        let config = Loader::load(bundle).expect("load");
        let points = config.entry_points("P").expect("entry points");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].build_type.id, "Build");
        assert_eq!(points[0].vcs_root.id, "Repo");
        assert!(config.warnings().is_empty());
    }

    #[test]
    fn test_vcs_root_resolves_through_ancestor() {
        let bundle = ConfigBundle::new(vec![
            Project::new("Parent", "Parent", ParentRef::Root).vcs_root(root("Shared")),
            Project::new("Child", "Child", ParentRef::from("Parent"))
                .build_type(build("Build", "Shared")),
        ]);
        let config = Loader::load(bundle).expect("load");
        assert_eq!(config.resolve_vcs_root("Build").expect("resolve").id, "Shared");
        let ancestors: Vec<_> = config
            .ancestors("Child")
            .expect("ancestors")
            .into_iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ancestors, vec!["Parent"]);
        assert_eq!(config.entry_points("Parent").expect("points").len(), 1);
        assert_eq!(config.entry_points("Child").expect("points").len(), 1);
    }

    #[test]
    fn test_sibling_vcs_root_is_out_of_scope() {
        let bundle = ConfigBundle::new(vec![
            Project::new("A", "A", ParentRef::Root).vcs_root(root("RepoA")),
            Project::new("B", "B", ParentRef::Root).build_type(build("Build", "RepoA")),
        ]);
        let err = Loader::load(bundle).unwrap_err();
        match err {
            ConfigError::Reference(ReferenceError::VcsRootOutOfScope { owner, project, .. }) => {
                assert_eq!(owner, "A");
                assert_eq!(project, "B");
            }
            other => panic!("Expected VcsRootOutOfScope, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let bundle = ConfigBundle::new(vec![Project::new("P", "P", ParentRef::from("Ghost"))]);
        let err = Loader::load(bundle).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Reference(ReferenceError::UnknownParent { .. })
        ));
    }

    #[test]
    fn test_parent_cycle_rejected() {
        let bundle = ConfigBundle::new(vec![
            Project::new("A", "A", ParentRef::from("B")),
            Project::new("B", "B", ParentRef::from("A")),
        ]);
        let err = Loader::load(bundle).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Reference(ReferenceError::ParentCycle { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected_per_kind() {
        let bundle = ConfigBundle::new(vec![
            Project::new("A", "A", ParentRef::Root).vcs_root(root("Repo")),
            Project::new("B", "B", ParentRef::Root).vcs_root(root("Repo")),
        ]);
        let err = Loader::load(bundle).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Validation(ValidationError::DuplicateId {
                entity: EntityKind::VcsRoot,
                ..
            })
        ));

        // The same id on different kinds is fine.
        let bundle = ConfigBundle::new(vec![Project::new("Repo", "Repo", ParentRef::Root)
            .vcs_root(root("Repo"))
            .build_type(build("Repo", "Repo"))]);
        assert!(Loader::load(bundle).is_ok());
    }

    #[test]
    fn test_not_runnable_is_a_warning() {
        let bundle = ConfigBundle::new(vec![Project::new("P", "P", ParentRef::Root)
            .vcs_root(root("Repo"))
            .build_type(BuildType::new("Idle", "Idle", VcsSettings::new("Repo")))]);
        let config = Loader::load(bundle).expect("load");
        assert_eq!(
            config.warnings(),
            &[LoadWarning::NotRunnable {
                build_type: "Idle".to_string()
            }]
        );
        assert!(config.entry_points("P").expect("points").is_empty());
        assert!(config.build_type("Idle").is_ok());
    }

    #[test]
    fn test_lookup_of_missing_ids() {
        let config = Loader::load(ConfigBundle::default()).expect("load empty");
        assert!(matches!(
            config.project("Nope").unwrap_err(),
            ConfigError::Reference(ReferenceError::NotFound {
                entity: EntityKind::Project,
                ..
            })
        ));
        assert!(config.build_type("Nope").unwrap_err().is_reference());
        assert!(config.vcs_root("Nope").unwrap_err().is_reference());
    }
}
