use crate::error::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn is_scenario_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "txt")
        && !path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with('_'))
}

/// Scenario files under `root`, sorted by path. A file given directly is
/// used as-is whatever its name.
pub fn discover_scenarios(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && is_scenario_file(path) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Path shown for a scenario file, relative to the working directory when possible.
pub fn display_path(path: &Path) -> PathBuf {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(&cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
}
