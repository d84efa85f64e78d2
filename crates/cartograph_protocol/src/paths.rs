//! Home-directory resolution and blob path construction.

use std::path::PathBuf;
use std::sync::Once;

static CREATE_DIR_WARNED: Once = Once::new();

/// Resolve the Cartograph home directory.
///
/// Priority:
/// 1) CARTOGRAPH_HOME
/// 2) HOME/USERPROFILE
/// 3) ./.cartograph
pub fn cartograph_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("CARTOGRAPH_HOME") {
        return PathBuf::from(override_path);
    }
    if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        return PathBuf::from(home).join(".cartograph");
    }
    PathBuf::from(".").join(".cartograph")
}

fn ensure_home_dir(home: &PathBuf) {
    if let Err(err) = std::fs::create_dir_all(home) {
        CREATE_DIR_WARNED.call_once(|| {
            eprintln!(
                "Warning: failed to create Cartograph home directory {}: {}. Set CARTOGRAPH_HOME or pass --database.",
                home.display(),
                err
            );
        });
    }
}

/// Default state store path: ~/.cartograph/state.sqlite
pub fn default_state_store_path() -> PathBuf {
    let home = cartograph_home();
    ensure_home_dir(&home);
    home.join("state.sqlite")
}

/// Default blob storage root: ~/.cartograph/blobs
pub fn default_blob_root() -> PathBuf {
    let home = cartograph_home();
    ensure_home_dir(&home);
    home.join("blobs")
}

/// Default logs directory: ~/.cartograph/logs
pub fn default_logs_dir() -> PathBuf {
    let home = cartograph_home();
    ensure_home_dir(&home);
    home.join("logs")
}

/// Returns true if the filename is already safe to embed in a blob path.
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Canonicalize an arbitrary filename into a blob-path-safe one.
///
/// Path separators and every character outside `[A-Za-z0-9._-]` collapse to
/// `_`; leading dots are stripped so a name can never traverse upward.
pub fn sanitize_filename(name: &str) -> String {
    if is_safe_filename(name) {
        return name.to_string();
    }

    let mut out = String::with_capacity(name.len());
    let mut last_was_underscore = false;
    for ch in name.chars() {
        let mapped = if ch.is_ascii_alphanumeric() || ch == '-' || ch == '.' {
            ch
        } else {
            '_'
        };
        if mapped == '_' {
            if last_was_underscore {
                continue;
            }
            last_was_underscore = true;
        } else {
            last_was_underscore = false;
        }
        out.push(mapped);
    }

    let out = out.trim_matches('_').trim_start_matches('.');
    if out.is_empty() {
        "asset".to_string()
    } else {
        out.to_string()
    }
}

/// Blob path for a run artefact: `test-runs/{job_id}/{kind}/{filename}`.
pub fn run_asset_path(job_id: &crate::ids::JobId, kind: crate::types::AssetKind, filename: &str) -> String {
    format!(
        "test-runs/{}/{}/{}",
        job_id,
        kind.as_str(),
        sanitize_filename(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::JobId;
    use crate::types::AssetKind;

    #[test]
    fn safe_names_pass_through() {
        assert_eq!(sanitize_filename("login-page.png"), "login-page.png");
    }

    #[test]
    fn traversal_is_neutralised() {
        let s = sanitize_filename("../../etc/passwd");
        assert!(!s.contains('/'));
        assert!(!s.starts_with('.'));
    }

    #[test]
    fn empty_falls_back() {
        assert_eq!(sanitize_filename("///"), "asset");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize_filename("shot (final)?.png");
        assert_eq!(sanitize_filename(&once), once);
    }

    #[test]
    fn asset_path_is_namespaced_by_job() {
        let id = JobId::new();
        let path = run_asset_path(&id, AssetKind::Screenshot, "home page.png");
        assert!(path.starts_with(&format!("test-runs/{}/screenshots/", id)));
        assert!(path.ends_with("home_page.png"));
    }
}
