use std::path::{Component, Path, PathBuf};

use preflight_types::{Error, ErrorKind};

/// Lexical containment check: does `candidate`, joined onto `root` and
/// normalized without touching the filesystem, stay under `root`?
/// (§4.1's `IsPathWithinRoot`; the secure, symlink-resolving sibling
/// lives in `preflight-core`'s filesystem port, which can do real I/O.)
pub fn is_within_root(root: &Path, candidate: &Path) -> bool {
    let mut depth: i64 = 0;
    for component in candidate.components() {
        match component {
            Component::ParentDir => depth -= 1,
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return false,
        }
        if depth < 0 {
            return false;
        }
    }
    let _ = root;
    true
}

/// Resolves a config-relative path for `target`, applying the target
/// suffix to the path's **first segment only**: `.config/nvim` under
/// target `work` prefers `.config.work/nvim` if present, else falls
/// back to the shared `.config/nvim`. Rejects anything that would climb
/// out of `config_root`.
pub fn resolve_target_path(
    config_root: &Path,
    relative: &str,
    target: &str,
    exists: impl Fn(&Path) -> bool,
) -> Result<PathBuf, Error> {
    let relative_path = Path::new(relative);
    if !is_within_root(config_root, relative_path) {
        return Err(Error::new(ErrorKind::PathEscape)
            .with_path(relative_path)
            .with_message(format!("`{relative}` escapes the config root")));
    }

    let mut components = relative_path.components();
    let Some(Component::Normal(first)) = components.next() else {
        return Err(Error::new(ErrorKind::PathEscape)
            .with_path(relative_path)
            .with_message("empty or absolute relative path"));
    };
    let rest: PathBuf = components.collect();

    let mut suffixed = first.to_os_string();
    suffixed.push(".");
    suffixed.push(target);
    let candidate = config_root.join(suffixed).join(&rest);
    if exists(&candidate) {
        return Ok(candidate);
    }

    Ok(config_root.join(relative_path))
}
