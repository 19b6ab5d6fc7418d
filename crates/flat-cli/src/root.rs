use flat_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `FLAT_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.flat/` or `flat.yml`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd, |dir| {
        paths::flat_dir(dir).is_dir() || dir.join(paths::DEFAULT_WORKFLOW).is_file()
    })
    .or_else(|| find_upward(&cwd, |dir| dir.join(".git").is_dir()))
    .unwrap_or(cwd)
}

fn find_upward(start: &Path, hit: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    start.ancestors().find(|d| hit(d)).map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn finds_workflow_above_start() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("flat.yml"), "").unwrap();
        let deep = dir.path().join("data/raw");
        std::fs::create_dir_all(&deep).unwrap();

        let found = find_upward(&deep, |d| d.join("flat.yml").is_file());
        assert_eq!(found.as_deref(), Some(dir.path()));
    }

    #[test]
    fn flat_dir_marks_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(paths::flat_dir(dir.path())).unwrap();
        let deep = dir.path().join("src");
        std::fs::create_dir_all(&deep).unwrap();

        let found = find_upward(&deep, |d| paths::flat_dir(d).is_dir());
        assert_eq!(found.as_deref(), Some(dir.path()));
    }

    #[test]
    fn no_marker_finds_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(find_upward(dir.path(), |d| d.join("no-such-marker").exists()).is_none());
    }
}
