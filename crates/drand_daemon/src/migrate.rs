//! One-shot legacy single-beacon → multi-beacon layout migration (§9
//! open question resolution): copies
//! `<config_root>/{key,groups,db}` into
//! `<config_root>/multibeacon/default/` the first time the daemon
//! starts against a pre-multi-beacon data directory. The two layouts
//! are never unified beyond this single copy.

use std::fs;
use std::path::Path;

use crate::config::ConfigError;

fn copy_dir_recursive(from: &Path, to: &Path) -> Result<(), ConfigError> {
    fs::create_dir_all(to).map_err(|source| ConfigError::Io {
        path: to.to_path_buf(),
        source,
    })?;
    for entry in fs::read_dir(from).map_err(|source| ConfigError::Io {
        path: from.to_path_buf(),
        source,
    })? {
        let entry = entry.map_err(|source| ConfigError::Io {
            path: from.to_path_buf(),
            source,
        })?;
        let dest = to.join(entry.file_name());
        let file_type = entry.file_type().map_err(|source| ConfigError::Io {
            path: entry.path(),
            source,
        })?;
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest).map_err(|source| ConfigError::Io {
                path: entry.path(),
                source,
            })?;
        }
    }
    Ok(())
}

/// Returns `true` if a migration copy was performed.
pub fn check_and_migrate(config_root: &Path) -> Result<bool, ConfigError> {
    let multibeacon = config_root.join("multibeacon");
    if multibeacon.exists() {
        return Ok(false);
    }

    let legacy_dirs = ["key", "groups", "db"];
    let has_legacy_layout = legacy_dirs
        .iter()
        .any(|dir| config_root.join(dir).exists());
    if !has_legacy_layout {
        return Ok(false);
    }

    let dest_root = multibeacon.join("default");
    for dir in legacy_dirs {
        let src = config_root.join(dir);
        if src.exists() {
            copy_dir_recursive(&src, &dest_root.join(dir))?;
        }
    }
    tracing::info!(
        from = %config_root.display(),
        to = %dest_root.display(),
        "migrated legacy single-beacon layout to multi-beacon default beacon"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrates_legacy_layout_into_default_beacon() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("key")).unwrap();
        fs::write(dir.path().join("key/identity.public"), b"pub").unwrap();
        fs::create_dir_all(dir.path().join("groups")).unwrap();
        fs::write(dir.path().join("groups/drand_group.toml"), b"id = 'x'").unwrap();

        let migrated = check_and_migrate(dir.path()).unwrap();
        assert!(migrated);
        assert!(dir
            .path()
            .join("multibeacon/default/key/identity.public")
            .exists());
    }

    #[test]
    fn no_op_when_multibeacon_dir_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("multibeacon")).unwrap();
        fs::create_dir_all(dir.path().join("key")).unwrap();

        let migrated = check_and_migrate(dir.path()).unwrap();
        assert!(!migrated);
    }

    #[test]
    fn no_op_on_fresh_data_root() {
        let dir = tempfile::tempdir().unwrap();
        let migrated = check_and_migrate(dir.path()).unwrap();
        assert!(!migrated);
    }
}
