use std::fs;
use std::path::{Component, Path, PathBuf};

use glob::Pattern;

use super::{ResourceStats, WorkspaceError};

/// The seven subdirectories every workspace reserves for specific artifact
/// classes. Tools that produce artifacts place them in the matching bin.
pub const STANDARD_BINS: [&str; 7] = [
    "repos", "runs", "notes", "patches", "data", "queue", "chunks",
];

/// File-name patterns that are never readable, even with project read
/// enabled.
const SENSITIVE_PATTERNS: [&str; 5] = [
    ".env*", "*.pem", "*.key", "*secret*", "*credentials*",
];

/// Workspace path manager that enforces directory isolation.
///
/// All write operations resolve inside the workspace root; reads may also
/// reach project files (the root's parent tree) minus denied directories and
/// sensitive files. The resource checks act as a circuit breaker before
/// write-producing operations.
///
/// # Usage
/// ```rust,ignore
/// let ws = Workspace::new("/home/user/agent/workspace")?;
/// let safe = ws.resolve_write("data/prices.csv")?;     // inside workspace
/// ws.resolve_project_read("src/main.rs")?;             // read-only project
/// ws.resolve_write("../server/api.rs").unwrap_err();   // blocked
/// ```
pub struct Workspace {
    root: PathBuf,
    project_root: PathBuf,
    max_workspace_size_bytes: u64,
    min_free_memory_percent: f32,
    allow_project_read: bool,
    denied_project_dirs: Vec<PathBuf>,
    blocked_files: Vec<PathBuf>,
    sensitive_patterns: Vec<Pattern>,
}

impl Workspace {
    /// Create a workspace rooted at `root`, creating the directory and the
    /// standard bins if needed. The project root is the parent of `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root: PathBuf = root.into();
        fs::create_dir_all(&root)?;
        let root = normalize_path(&root.canonicalize()?);

        for bin in STANDARD_BINS {
            fs::create_dir_all(root.join(bin))?;
        }

        let project_root = root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.clone());

        let blocked_files = [".env", ".env.example", ".env.local"]
            .iter()
            .flat_map(|name| [root.join(name), project_root.join(name)])
            .collect();

        let sensitive_patterns = SENSITIVE_PATTERNS
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();

        // The workspace subtree holds the agent's own state (queue, index,
        // patches); it is reachable only through the workspace resolvers,
        // never through the project-read door.
        let denied_project_dirs = vec![root.clone()];

        Ok(Self {
            root,
            project_root,
            max_workspace_size_bytes: 5 * 1024 * 1024 * 1024,
            min_free_memory_percent: 10.0,
            allow_project_read: true,
            denied_project_dirs,
            blocked_files,
            sensitive_patterns,
        })
    }

    pub fn with_max_size_gb(mut self, gb: f64) -> Self {
        self.max_workspace_size_bytes = (gb * 1024.0 * 1024.0 * 1024.0) as u64;
        self
    }

    pub fn with_min_free_memory_percent(mut self, percent: f32) -> Self {
        self.min_free_memory_percent = percent;
        self
    }

    pub fn with_project_read(mut self, allow: bool) -> Self {
        self.allow_project_read = allow;
        self
    }

    /// Deny project-read access to a directory (relative to the project
    /// root), e.g. the directories holding the agent's own code. The
    /// workspace subtree itself is always denied.
    pub fn with_denied_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.denied_project_dirs
            .push(normalize_path(&self.project_root.join(dir.as_ref())));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Per-run output directory under `runs/`, created on demand.
    pub fn run_dir(&self, run_id: &str) -> Result<PathBuf, WorkspaceError> {
        let dir = self.root.join("runs").join(run_id);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// The standard bin a workspace path falls under, if any.
    pub fn bin_of(&self, path: &Path) -> Option<&'static str> {
        let resolved = self.resolve(path).ok()?;
        let rel = resolved.strip_prefix(&self.root).ok()?;
        let first = rel.components().next()?;
        let first = first.as_os_str().to_str()?;
        STANDARD_BINS.into_iter().find(|bin| *bin == first)
    }

    /// Resolve a path within the workspace.
    ///
    /// Strips a leading `workspace/` segment (the model sees that prefix in
    /// listings and tends to include it), anchors relative paths at the
    /// workspace root, normalizes, and rejects anything that escapes the
    /// root or matches the blocked-file list.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, WorkspaceError> {
        let requested = path.as_ref().to_string_lossy().to_string();
        let stripped = strip_workspace_prefix(&requested);

        let candidate = if Path::new(stripped).is_absolute() {
            PathBuf::from(stripped)
        } else {
            self.root.join(stripped)
        };
        let resolved = normalize_path(&candidate);

        if !paths_contain(&self.root, &resolved) {
            return Err(WorkspaceError::PathOutsideWorkspace {
                requested,
                root: self.root.clone(),
            });
        }

        if self.blocked_files.iter().any(|b| same_path(b, &resolved)) {
            return Err(WorkspaceError::BlockedFile { path: requested });
        }

        Ok(resolved)
    }

    /// Resolve a workspace path for reading; the target must exist.
    pub fn resolve_read(&self, path: impl AsRef<Path>) -> Result<PathBuf, WorkspaceError> {
        let resolved = self.resolve(path)?;
        if !resolved.exists() {
            return Err(WorkspaceError::NotFound {
                path: resolved.to_string_lossy().into_owned(),
            });
        }
        Ok(resolved)
    }

    /// Resolve a workspace path for writing, creating parent directories.
    pub fn resolve_write(&self, path: impl AsRef<Path>) -> Result<PathBuf, WorkspaceError> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(resolved)
    }

    /// Resolve a path for read-only access to project files.
    ///
    /// Source files anywhere under the project root are readable, except
    /// denied directories and sensitive files. The target must exist.
    pub fn resolve_project_read(&self, path: impl AsRef<Path>) -> Result<PathBuf, WorkspaceError> {
        if !self.allow_project_read {
            return Err(WorkspaceError::ProjectReadDisabled);
        }

        let requested = path.as_ref().to_string_lossy().to_string();
        let candidate = if path.as_ref().is_absolute() {
            path.as_ref().to_path_buf()
        } else {
            self.project_root.join(path.as_ref())
        };
        let resolved = normalize_path(&candidate);

        if !paths_contain(&self.project_root, &resolved) {
            return Err(WorkspaceError::PathOutsideProject {
                requested,
                project_root: self.project_root.clone(),
            });
        }

        for denied in &self.denied_project_dirs {
            if paths_contain(denied, &resolved) {
                return Err(WorkspaceError::DeniedDirectory { path: requested });
            }
        }

        if self.blocked_files.iter().any(|b| same_path(b, &resolved)) {
            return Err(WorkspaceError::BlockedFile { path: requested });
        }

        if self.is_sensitive(&resolved) {
            return Err(WorkspaceError::SensitiveFile { path: requested });
        }

        if !resolved.exists() {
            return Err(WorkspaceError::NotFound {
                path: resolved.to_string_lossy().into_owned(),
            });
        }

        Ok(resolved)
    }

    /// Ensure a directory exists within the workspace.
    pub fn ensure_dir(&self, path: impl AsRef<Path>) -> Result<PathBuf, WorkspaceError> {
        let resolved = self.resolve(path)?;
        fs::create_dir_all(&resolved)?;
        Ok(resolved)
    }

    /// List a workspace directory, sorted for stable output.
    pub fn list_contents(
        &self,
        path: Option<&Path>,
    ) -> Result<Vec<PathBuf>, WorkspaceError> {
        let target = match path {
            Some(p) => self.resolve(p)?,
            None => self.root.clone(),
        };
        if !target.is_dir() {
            return Err(WorkspaceError::NotADirectory {
                path: target.to_string_lossy().into_owned(),
            });
        }
        let mut entries: Vec<PathBuf> = fs::read_dir(&target)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();
        Ok(entries)
    }

    /// Workspace-relative form of a resolved path.
    pub fn relative_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, WorkspaceError> {
        let resolved = self.resolve(path)?;
        Ok(resolved
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or(resolved))
    }

    fn is_sensitive(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if self.sensitive_patterns.iter().any(|p| p.matches(&name)) {
            return true;
        }

        // .git/ anywhere in the path blocks the whole subtree
        path.components().any(|c| {
            matches!(c, Component::Normal(seg) if seg.to_string_lossy().eq_ignore_ascii_case(".git"))
        })
    }

    /// Total bytes currently stored under the workspace root.
    pub fn workspace_size(&self) -> u64 {
        dir_size(&self.root)
    }

    /// Disk half of the resource circuit breaker.
    pub fn check_workspace_size(&self) -> Result<(), WorkspaceError> {
        let used = self.workspace_size();
        if used > self.max_workspace_size_bytes {
            const GB: f64 = 1024.0 * 1024.0 * 1024.0;
            return Err(WorkspaceError::WorkspaceSizeExceeded {
                used_gb: used as f64 / GB,
                limit_gb: self.max_workspace_size_bytes as f64 / GB,
            });
        }
        Ok(())
    }

    /// Memory half of the resource circuit breaker.
    pub fn check_memory(&self) -> Result<(), WorkspaceError> {
        let free_percent = super::free_memory_percent();
        if free_percent < self.min_free_memory_percent {
            return Err(WorkspaceError::LowMemory {
                free_percent,
                min_percent: self.min_free_memory_percent,
            });
        }
        Ok(())
    }

    /// Run both resource checks. Call before expensive write-producing
    /// operations; a failure must surface as a tool error, never silently.
    pub fn check_resources(&self) -> Result<(), WorkspaceError> {
        self.check_workspace_size()?;
        self.check_memory()?;
        Ok(())
    }

    pub fn resource_stats(&self) -> ResourceStats {
        super::resource_stats(self.workspace_size(), self.max_workspace_size_bytes)
    }
}

fn strip_workspace_prefix(path: &str) -> &str {
    path.strip_prefix("workspace/")
        .or_else(|| path.strip_prefix("workspace\\"))
        .unwrap_or(path)
}

/// Lexically normalize a path: fold `.` and `..` without touching the
/// filesystem, so escape attempts are caught even for paths that do not
/// exist yet.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn comparable(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if cfg!(windows) {
        s.to_lowercase()
    } else {
        s
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    comparable(a) == comparable(b)
}

fn paths_contain(base: &Path, child: &Path) -> bool {
    let base = comparable(base);
    let child = comparable(child);
    child == base || child.starts_with(&format!("{}/", base.trim_end_matches('/')))
}

fn dir_size(dir: &Path) -> u64 {
    let mut total = 0;
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            total += dir_size(&path);
        } else if let Ok(meta) = entry.metadata() {
            total += meta.len();
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_workspace(tmp: &TempDir) -> Workspace {
        Workspace::new(tmp.path().join("workspace"))
            .unwrap()
            .with_min_free_memory_percent(0.0)
    }

    #[test]
    fn test_standard_bins_created() {
        let tmp = TempDir::new().unwrap();
        let ws = make_workspace(&tmp);
        for bin in STANDARD_BINS {
            assert!(ws.root().join(bin).is_dir(), "missing bin {bin}");
        }
    }

    #[test]
    fn test_resolve_write_inside_workspace() {
        let tmp = TempDir::new().unwrap();
        let ws = make_workspace(&tmp);
        let path = ws.resolve_write("data/out.csv").unwrap();
        assert!(path.starts_with(ws.root()));
        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn test_resolve_strips_workspace_prefix() {
        let tmp = TempDir::new().unwrap();
        let ws = make_workspace(&tmp);
        let path = ws.resolve("workspace/x.txt").unwrap();
        assert_eq!(path, ws.root().join("x.txt"));
    }

    #[test]
    fn test_parent_traversal_is_blocked() {
        let tmp = TempDir::new().unwrap();
        let ws = make_workspace(&tmp);
        let err = ws.resolve_write("../anywhere.txt").unwrap_err();
        assert!(matches!(err, WorkspaceError::PathOutsideWorkspace { .. }));
    }

    #[test]
    fn test_absolute_path_outside_root_is_blocked() {
        let tmp = TempDir::new().unwrap();
        let ws = make_workspace(&tmp);
        let err = ws.resolve_write("/etc/hosts").unwrap_err();
        assert!(matches!(err, WorkspaceError::PathOutsideWorkspace { .. }));
    }

    #[test]
    fn test_env_file_is_blocked() {
        let tmp = TempDir::new().unwrap();
        let ws = make_workspace(&tmp);
        let err = ws.resolve_write(".env").unwrap_err();
        assert!(matches!(err, WorkspaceError::BlockedFile { .. }));
    }

    #[test]
    fn test_resolve_read_requires_existence() {
        let tmp = TempDir::new().unwrap();
        let ws = make_workspace(&tmp);
        let err = ws.resolve_read("nope.txt").unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound { .. }));

        std::fs::write(ws.root().join("yes.txt"), "data").unwrap();
        assert!(ws.resolve_read("yes.txt").is_ok());
    }

    #[test]
    fn test_project_read_allows_source_blocks_sensitive() {
        let tmp = TempDir::new().unwrap();
        let ws = make_workspace(&tmp);

        std::fs::write(tmp.path().join("main.rs"), "fn main() {}").unwrap();
        assert!(ws.resolve_project_read("main.rs").is_ok());

        std::fs::write(tmp.path().join("server.pem"), "cert").unwrap();
        let err = ws.resolve_project_read("server.pem").unwrap_err();
        assert!(matches!(err, WorkspaceError::SensitiveFile { .. }));

        std::fs::write(tmp.path().join("my_credentials.json"), "{}").unwrap();
        let err = ws.resolve_project_read("my_credentials.json").unwrap_err();
        assert!(matches!(err, WorkspaceError::SensitiveFile { .. }));
    }

    #[test]
    fn test_project_read_denied_directory() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("engine")).unwrap();
        std::fs::write(tmp.path().join("engine/core.rs"), "code").unwrap();

        let ws = make_workspace(&tmp).with_denied_project_dir("engine");
        let err = ws.resolve_project_read("engine/core.rs").unwrap_err();
        assert!(matches!(err, WorkspaceError::DeniedDirectory { .. }));
    }

    #[test]
    fn test_project_read_denies_workspace_subtree_by_default() {
        let tmp = TempDir::new().unwrap();
        let ws = make_workspace(&tmp);
        std::fs::write(ws.root().join("notes/internal.md"), "state").unwrap();

        let err = ws
            .resolve_project_read(ws.root().join("notes/internal.md"))
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::DeniedDirectory { .. }));

        // The same file stays reachable through the workspace resolvers.
        assert!(ws.resolve_read("notes/internal.md").is_ok());
    }

    #[test]
    fn test_env_variants_are_sensitive() {
        let tmp = TempDir::new().unwrap();
        let ws = make_workspace(&tmp);

        for name in [".env", ".env.local", ".environment"] {
            std::fs::write(tmp.path().join(name), "SECRET=1").unwrap();
            let err = ws.resolve_project_read(name).unwrap_err();
            assert!(
                matches!(
                    err,
                    WorkspaceError::SensitiveFile { .. } | WorkspaceError::BlockedFile { .. }
                ),
                "{name} should be unreadable"
            );
        }
    }

    #[test]
    fn test_git_subtree_is_sensitive() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".git")).unwrap();
        std::fs::write(tmp.path().join(".git/config"), "[core]").unwrap();

        let ws = make_workspace(&tmp);
        let err = ws.resolve_project_read(".git/config").unwrap_err();
        assert!(matches!(err, WorkspaceError::SensitiveFile { .. }));
    }

    #[test]
    fn test_workspace_size_limit_trips() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path().join("workspace"))
            .unwrap()
            .with_max_size_gb(0.0)
            .with_min_free_memory_percent(0.0);
        std::fs::write(ws.root().join("data/blob.bin"), vec![0u8; 4096]).unwrap();

        let err = ws.check_resources().unwrap_err();
        assert!(err.is_resource_limit());
    }

    #[test]
    fn test_bin_of() {
        let tmp = TempDir::new().unwrap();
        let ws = make_workspace(&tmp);
        assert_eq!(ws.bin_of(Path::new("notes/summary.md")), Some("notes"));
        assert_eq!(ws.bin_of(Path::new("stray.txt")), None);
    }
}
