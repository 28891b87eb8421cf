//! Persistance de la configuration.
//!
//! Le contrôleur ne connaît la persistance qu'au travers du trait
//! [`ConfigStore`], injecté à la construction. L'implémentation YAML écrit le
//! fichier `config.yaml` ; les tests injectent un store en mémoire.

use anyhow::Result;
use std::path::PathBuf;
use tracing::debug;

use crate::AppConfig;

/// Abstraction de persistance de la configuration.
pub trait ConfigStore: Send + Sync {
    /// Écrit la configuration courante.
    fn save(&self, cfg: &AppConfig) -> Result<()>;
}

/// Store YAML : sauvegarde vers un chemin fixe.
pub struct YamlConfigStore {
    path: PathBuf,
}

impl YamlConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl ConfigStore for YamlConfigStore {
    fn save(&self, cfg: &AppConfig) -> Result<()> {
        cfg.save(&self.path)?;
        debug!(config_file = %self.path.display(), "Config saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CONFIG_FILE;

    #[test]
    fn test_yaml_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let store = YamlConfigStore::new(&path);

        let mut cfg = AppConfig::default();
        cfg.queue.keyword = "join".to_string();
        store.save(&cfg).unwrap();

        let reloaded = AppConfig::load(&path).unwrap();
        assert_eq!(reloaded.queue.keyword, "join");
    }
}
