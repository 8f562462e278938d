//! Dependency index: which build roots does a Go source file feed?
//!
//! Per build root, the index holds every `.go` file reachable from the root's
//! main file through imports that resolve inside the project module, plus
//! the package directories those files live in.
//!
//! ```text
//! web/client.go ──import──> example.com/app/pkg/greet ──> pkg/greet/*.go
//!                                                          └─import─> pkg/util/*.go
//! ```
//!
//! Graphs are built lazily on first query and dropped on invalidation. The
//! index is owned by the router task; nothing else reads or mutates it.

mod imports;


pub use imports::{parse_imports, parse_module_path};

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::Layout;
use crate::core::{BuildRoot, RootKind};

/// Answer to "does root `r` own file `f`?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    NotOwned,
    /// No graph yet, or the main file appeared since the last build.
    NeedsRefresh,
}

/// Resolved import closure of one build root.
#[derive(Debug, Default, Clone)]
pub struct RootGraph {
    pub main_present: bool,
    pub files: FxHashSet<PathBuf>,
    pub package_dirs: FxHashSet<PathBuf>,
    /// In-module package directories each file imports, sorted.
    pub local_imports: FxHashMap<PathBuf, Vec<PathBuf>>,
}

static NO_FILES: LazyLock<FxHashSet<PathBuf>> = LazyLock::new(FxHashSet::default);

pub struct DependencyIndex {
    project_root: PathBuf,
    go_mod: PathBuf,
    roots: Vec<BuildRoot>,
    /// `None` until read; `Some(None)` when go.mod has no module line.
    module: Option<Option<String>>,
    graphs: FxHashMap<RootKind, RootGraph>,
}

impl DependencyIndex {
    pub fn new(layout: &Layout) -> Self {
        Self::with_roots(
            &layout.root,
            RootKind::ALL.iter().map(|&k| layout.root(k)).collect(),
        )
    }

    pub fn with_roots(project_root: &Path, roots: Vec<BuildRoot>) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            go_mod: project_root.join("go.mod"),
            roots,
            module: None,
            graphs: FxHashMap::default(),
        }
    }

    fn root(&self, kind: RootKind) -> Option<&BuildRoot> {
        self.roots.iter().find(|r| r.kind == kind)
    }

    /// Ownership as of the current graph, without building anything.
    pub fn owns(&self, kind: RootKind, file: &Path) -> Ownership {
        let Some(graph) = self.graphs.get(&kind) else {
            return Ownership::NeedsRefresh;
        };

        if !graph.main_present {
            let appeared = self.root(kind).is_some_and(BuildRoot::has_main);
            return if appeared {
                Ownership::NeedsRefresh
            } else {
                Ownership::NotOwned
            };
        }

        if graph.files.contains(file) || self.in_package_dir(graph, file) {
            Ownership::Owned
        } else {
            Ownership::NotOwned
        }
    }

    /// `owns`, building the graph first when needed.
    pub fn owns_refreshing(&mut self, kind: RootKind, file: &Path) -> bool {
        match self.owns(kind, file) {
            Ownership::Owned => true,
            Ownership::NotOwned => false,
            Ownership::NeedsRefresh => {
                self.refresh(kind);
                self.owns(kind, file) == Ownership::Owned
            }
        }
    }

    /// A new non-test `.go` file inside an already indexed package.
    fn in_package_dir(&self, graph: &RootGraph, file: &Path) -> bool {
        is_package_source(file)
            && file
                .parent()
                .is_some_and(|dir| graph.package_dirs.contains(dir))
    }

    /// Files of the last built graph (empty when none was built).
    pub fn all_known_files(&self, kind: RootKind) -> &FxHashSet<PathBuf> {
        self.graphs.get(&kind).map_or(&NO_FILES, |g| &g.files)
    }

    pub fn knows(&self, kind: RootKind, file: &Path) -> bool {
        self.all_known_files(kind).contains(file)
    }

    /// Re-read the in-module imports of a file in `kind`'s graph and compare
    /// them with the ones the graph was built from.
    ///
    /// False when the file is not part of the graph.
    pub fn imports_changed(&mut self, kind: RootKind, file: &Path) -> bool {
        let Some(module) = self.module_path() else {
            return false;
        };
        let Some(recorded) = self
            .graphs
            .get(&kind)
            .and_then(|g| g.local_imports.get(file))
        else {
            return false;
        };
        *recorded != local_deps(&module, &self.project_root, file)
    }

    /// Rebuild the graph of one root.
    pub fn refresh(&mut self, kind: RootKind) {
        let Some(root) = self.root(kind).cloned() else {
            return;
        };
        let module = self.module_path();
        let graph = build_graph(&root, &self.project_root, module.as_deref());
        crate::debug!("deps"; "{} graph: {} files in {} packages{}",
            kind, graph.files.len(), graph.package_dirs.len(),
            if graph.main_present { "" } else { " (main missing)" });
        self.graphs.insert(kind, graph);
    }

    pub fn invalidate(&mut self, kind: RootKind) {
        self.graphs.remove(&kind);
    }

    /// Drop every graph and the cached module path (go.mod / go.sum changed).
    pub fn invalidate_all(&mut self) {
        self.graphs.clear();
        self.module = None;
    }

    fn module_path(&mut self) -> Option<String> {
        if self.module.is_none() {
            let module = std::fs::read_to_string(&self.go_mod)
                .ok()
                .and_then(|content| parse_module_path(&content));
            if module.is_none() {
                crate::warn!("deps"; "no module path in {}, local imports untracked", self.go_mod.display());
            }
            self.module = Some(module);
        }
        self.module.clone().flatten()
    }

    #[cfg(test)]
    pub(crate) fn graph(&self, kind: RootKind) -> Option<&RootGraph> {
        self.graphs.get(&kind)
    }
}

/// Walk imports breadth-first from the root's main file.
///
/// The main file is compiled alone (`go build web/client.go`), so its
/// directory is not a package of the root unless something imports it.
fn build_graph(root: &BuildRoot, project_root: &Path, module: Option<&str>) -> RootGraph {
    let main = root.main_path();
    if !main.is_file() {
        return RootGraph::default();
    }

    let mut graph = RootGraph {
        main_present: true,
        ..RootGraph::default()
    };
    graph.files.insert(main.clone());

    let Some(module) = module else {
        return graph;
    };

    let mut frontier = vec![main];
    while !frontier.is_empty() {
        let resolved: Vec<(PathBuf, Vec<PathBuf>)> = frontier
            .into_par_iter()
            .map(|file| {
                let deps = local_deps(module, project_root, &file);
                (file, deps)
            })
            .collect();

        let mut next = Vec::new();
        for (file, deps) in resolved {
            for dir in &deps {
                if !graph.package_dirs.insert(dir.clone()) {
                    continue;
                }
                for source in package_sources(dir) {
                    if graph.files.insert(source.clone()) {
                        next.push(source);
                    }
                }
            }
            graph.local_imports.insert(file, deps);
        }
        frontier = next;
    }

    graph
}

/// Package directories `file` imports from inside the module.
fn local_deps(module: &str, project_root: &Path, file: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = imports::read_imports(file)
        .iter()
        .filter_map(|import| resolve_import(module, project_root, import))
        .collect();
    dirs.sort();
    dirs.dedup();
    dirs
}

/// Map an import path inside the project module to its directory.
fn resolve_import(module: &str, project_root: &Path, import: &str) -> Option<PathBuf> {
    if import == module {
        return Some(project_root.to_path_buf());
    }
    let rest = import.strip_prefix(module)?.strip_prefix('/')?;
    Some(project_root.join(rest))
}

/// Non-test `.go` files directly inside a package directory.
fn package_sources(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_package_source(p))
        .collect()
}

fn is_package_source(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".go") && !name.ends_with("_test.go") && !name.starts_with('.')
}
