//! On-disk layout for one beacon id's persisted state (§4.H, §6), and
//! the daemon's own `confy`-backed configuration file — grounded on
//! the teacher's `dee::config::Local` (`confy::load`/`store`).

use std::fs;
use std::path::{Path, PathBuf};

use drand_core::{Group, Share};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize group for {path}: {source}")]
    TomlWrite {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
}

fn io_err(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Per-beacon-id directory layout under
/// `<config_root>/multibeacon/<beacon_id>/`.
pub struct BeaconPaths {
    root: PathBuf,
}

impl BeaconPaths {
    pub fn new(config_root: impl AsRef<Path>, beacon_id: &str) -> Self {
        Self {
            root: config_root.as_ref().join("multibeacon").join(beacon_id),
        }
    }

    pub fn identity_public(&self) -> PathBuf {
        self.root.join("key/identity.public")
    }

    pub fn identity_private(&self) -> PathBuf {
        self.root.join("key/identity.private")
    }

    pub fn group_toml(&self) -> PathBuf {
        self.root.join("groups/drand_group.toml")
    }

    pub fn dist_key_private(&self) -> PathBuf {
        self.root.join("groups/dist_key.private")
    }

    pub fn db_dir(&self) -> PathBuf {
        self.root.join("db")
    }

    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [
            self.root.join("key"),
            self.root.join("groups"),
            self.db_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
        Ok(())
    }

    /// Atomically replaces `group.toml`: write to a sibling temp file,
    /// then rename over the destination (§4.H: "old files overwritten
    /// under write-lock").
    pub fn store_group(&self, group: &Group) -> Result<(), ConfigError> {
        let path = self.group_toml();
        let body = toml::to_string_pretty(group).map_err(|source| ConfigError::TomlWrite {
            path: path.clone(),
            source,
        })?;
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, body).map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    pub fn load_group(&self) -> Result<Group, ConfigError> {
        let path = self.group_toml();
        let body = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        toml::from_str(&body).map_err(|source| ConfigError::Toml { path, source })
    }

    pub fn store_share(&self, share: &Share) -> Result<(), ConfigError> {
        let path = self.dist_key_private();
        let mut body = share.index.to_le_bytes().to_vec();
        body.extend_from_slice(&share.private);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, body).map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    pub fn load_share(&self) -> Result<Share, ConfigError> {
        let path = self.dist_key_private();
        let bytes = fs::read(&path).map_err(|e| io_err(&path, e))?;
        let (index_bytes, private) = bytes.split_at(4);
        let index = u32::from_le_bytes(index_bytes.try_into().expect("fixed-size index prefix"));
        Ok(Share {
            index,
            private: private.to_vec(),
        })
    }
}

/// The daemon's own settings: listen addresses, data root, and the
/// bootstrap peer list — orthogonal to the per-beacon group/share
/// files above.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub control_listen: String,
    pub private_listen: String,
    pub public_listen: String,
    pub data_root: String,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            control_listen: "127.0.0.1:8888".to_string(),
            private_listen: "0.0.0.0:4444".to_string(),
            public_listen: "0.0.0.0:4445".to_string(),
            data_root: ".drand".to_string(),
            bootstrap_peers: Vec::new(),
        }
    }
}

impl DaemonConfig {
    const APP_NAME: &'static str = "drand";
    const CONFIG_NAME: Option<&'static str> = Some("default");

    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(Self::APP_NAME, Self::CONFIG_NAME)
    }

    pub fn store(&self) -> Result<(), confy::ConfyError> {
        confy::store(Self::APP_NAME, Self::CONFIG_NAME, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beacon_paths_lay_out_per_beacon_id() {
        let paths = BeaconPaths::new("/tmp/drand-root", "default");
        assert_eq!(
            paths.group_toml(),
            PathBuf::from("/tmp/drand-root/multibeacon/default/groups/drand_group.toml")
        );
        assert_eq!(
            paths.identity_private(),
            PathBuf::from("/tmp/drand-root/multibeacon/default/key/identity.private")
        );
    }

    #[test]
    fn group_round_trips_through_toml_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let paths = BeaconPaths::new(dir.path(), "default");
        paths.ensure_dirs().unwrap();

        let group = Group {
            id: "default".to_string(),
            period_seconds: 30,
            catchup_period_seconds: 1,
            genesis_time: 1000,
            transition_time: 1000,
            genesis_seed: vec![1; 32],
            threshold: 3,
            public_key: vec![2; 96],
            nodes: vec![],
            scheme_name: drand_core::SchemeName::Unchained,
            epoch: 1,
        };
        paths.store_group(&group).unwrap();
        let loaded = paths.load_group().unwrap();
        assert_eq!(loaded, group);
    }

    #[test]
    fn share_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let paths = BeaconPaths::new(dir.path(), "default");
        paths.ensure_dirs().unwrap();

        let share = Share { index: 2, private: vec![9; 32] };
        paths.store_share(&share).unwrap();
        let loaded = paths.load_share().unwrap();
        assert_eq!(loaded.index, share.index);
        assert_eq!(loaded.private, share.private);
    }
}
