//! # Configuration DMQueue
//!
//! Cette crate gère la configuration typée de DMQueue :
//! - Chargement/sauvegarde YAML (`config.yaml`) avec valeurs par défaut
//! - Résolution du répertoire de configuration (paramètre, variable
//!   d'environnement, répertoire courant, home)
//! - Sélection du mode danmaku (`open_live` vs `web`), fonction pure de la
//!   configuration
//! - Masquage des secrets pour les instantanés exportés
//!
//! ## Usage
//!
//! ```no_run
//! use dmqconfig::AppConfig;
//!
//! let dir = dmqconfig::config_dir("")?;
//! let cfg = AppConfig::load(&dir.join(dmqconfig::CONFIG_FILE))?;
//! println!("overlay: {}", cfg.overlay_url());
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Context, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};
use tracing::info;

pub mod delta;
pub mod store;

pub use delta::ConfigDelta;
pub use store::{ConfigStore, YamlConfigStore};

/// Nom du fichier de configuration dans le répertoire de configuration.
pub const CONFIG_FILE: &str = "config.yaml";

/// Valeur substituée aux secrets non vides dans les instantanés.
pub const SECRET_MASK: &str = "********";

const ENV_CONFIG_DIR: &str = "DMQUEUE_CONFIG";
const LOCAL_CONFIG_DIR: &str = ".dmqueue";

// ============================================================================
// MODÈLE
// ============================================================================

/// Mode de correspondance entre un message et le mot-clé d'admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Le message (après trim) doit être exactement le mot-clé.
    Exact,
    /// Le mot-clé doit apparaître dans le message (après trim).
    Contains,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Exact => "exact",
            MatchMode::Contains => "contains",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "exact" => Some(MatchMode::Exact),
            "contains" => Some(MatchMode::Contains),
            _ => None,
        }
    }
}

/// Mode d'intégration danmaku effectivement retenu au démarrage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DanmakuMode {
    OpenLive,
    Web,
}

impl DanmakuMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DanmakuMode::OpenLive => "open_live",
            DanmakuMode::Web => "web",
        }
    }
}

/// Préférence de mode danmaku configurée par l'opérateur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PreferredMode {
    /// open_live d'abord, repli sur web.
    #[default]
    Auto,
    OpenLive,
    Web,
}

impl PreferredMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "auto" => Some(PreferredMode::Auto),
            "open_live" => Some(PreferredMode::OpenLive),
            "web" => Some(PreferredMode::Web),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 10000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Mot-clé déclencheur de l'admission. Vide = admission désactivée.
    pub keyword: String,
    /// Capacité totale (current + waiting).
    pub max_queue: usize,
    pub match_mode: MatchMode,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            keyword: "排队".to_string(),
            max_queue: 10,
            match_mode: MatchMode::Contains,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub overlay_title: String,
    pub current_title: String,
    pub queue_title: String,
    pub empty_text: String,
    pub marked_color: String,
    pub overlay_show_mark: bool,
    /// Texte affiché sur l'overlay quand la file est en pause.
    pub pause_message: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            overlay_title: "排队".to_string(),
            current_title: "当前".to_string(),
            queue_title: "队列".to_string(),
            empty_text: "暂无人排队".to_string(),
            marked_color: "#ff5a5a".to_string(),
            overlay_show_mark: true,
            pause_message: "排队已暂停".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub custom_css_path: String,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            custom_css_path: "./custom.css".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub test_enabled: bool,
    pub autostart: bool,
    /// Heure d'auto-pause quotidienne, format "HH:MM". Vide = désactivé.
    pub auto_pause_time: String,
    /// Intervalle de vérification du scheduler d'auto-pause, en secondes.
    pub pause_check_interval: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            test_enabled: false,
            autostart: false,
            auto_pause_time: String::new(),
            pause_check_interval: 60,
        }
    }
}

/// Identifiants B站开放平台 (Open Live).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OpenLiveConfig {
    pub access_key: String,
    pub access_secret: String,
    pub app_id: u64,
    /// 身份码 du streamer.
    pub identity_code: String,
}

impl OpenLiveConfig {
    /// Les quatre champs sont requis pour que le mode open_live soit utilisable.
    pub fn is_complete(&self) -> bool {
        !self.access_key.trim().is_empty()
            && !self.access_secret.trim().is_empty()
            && self.app_id > 0
            && !self.identity_code.trim().is_empty()
    }
}

/// Accès web (cookie SESSDATA + room id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WebDanmakuConfig {
    pub sessdata: String,
    pub room_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BiliConfig {
    pub mode: PreferredMode,
    pub open_live: OpenLiveConfig,
    pub web: WebDanmakuConfig,
}

/// Configuration complète de l'application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub ui: UiConfig,
    pub style: StyleConfig,
    pub runtime: RuntimeConfig,
    pub bilibili: BiliConfig,
}

// ============================================================================
// CHARGEMENT / SAUVEGARDE
// ============================================================================

impl AppConfig {
    /// Charge la configuration depuis `path`, ou retourne les valeurs par
    /// défaut si le fichier n'existe pas. Le fichier est réécrit après
    /// chargement pour matérialiser les clés manquantes.
    pub fn load(path: &Path) -> Result<Self> {
        let cfg = if path.exists() {
            let data = fs::read_to_string(path)
                .with_context(|| format!("cannot read config file {}", path.display()))?;
            let cfg: AppConfig = serde_yaml::from_str(&data)
                .with_context(|| format!("invalid config file {}", path.display()))?;
            info!(config_file = %path.display(), "Loaded config file");
            cfg
        } else {
            info!(config_file = %path.display(), "Config file not found, using defaults");
            AppConfig::default()
        };
        cfg.save(path)?;
        Ok(cfg)
    }

    /// Sauvegarde la configuration au format YAML.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)
            .with_context(|| format!("cannot write config file {}", path.display()))?;
        Ok(())
    }

    /// URL de l'overlay OBS, dérivée de server.host/port.
    pub fn overlay_url(&self) -> String {
        format!("http://{}:{}/overlay", self.server.host, self.server.port)
    }

    /// Sélectionne le mode danmaku utilisable.
    ///
    /// Essaie d'abord le mode préféré puis se replie sur l'autre. L'erreur est
    /// une chaîne lisible destinée à l'opérateur ; aucune mutation d'état.
    pub fn select_danmaku_mode(&self) -> std::result::Result<DanmakuMode, String> {
        let order = match self.bilibili.mode {
            PreferredMode::Auto | PreferredMode::OpenLive => {
                [DanmakuMode::OpenLive, DanmakuMode::Web]
            }
            PreferredMode::Web => [DanmakuMode::Web, DanmakuMode::OpenLive],
        };

        let mut web_error = None;
        for mode in order {
            match mode {
                DanmakuMode::OpenLive if self.bilibili.open_live.is_complete() => {
                    return Ok(DanmakuMode::OpenLive);
                }
                DanmakuMode::Web if !self.bilibili.web.sessdata.trim().is_empty() => {
                    if self.bilibili.web.room_id == 0 {
                        web_error = Some(
                            "bilibili.web.room_id is required when using SESSDATA (web mode)"
                                .to_string(),
                        );
                        continue;
                    }
                    return Ok(DanmakuMode::Web);
                }
                _ => continue,
            }
        }

        Err(web_error.unwrap_or_else(|| {
            "Missing danmaku config: provide bilibili.open_live.* or bilibili.web.sessdata"
                .to_string()
        }))
    }
}

/// Masque un secret : chaîne vide inchangée, sinon remplacée par [`SECRET_MASK`].
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        String::new()
    } else {
        SECRET_MASK.to_string()
    }
}

/// Résout le répertoire de configuration.
///
/// Ordre de recherche :
/// 1. le paramètre `directory` s'il n'est pas vide
/// 2. la variable d'environnement `DMQUEUE_CONFIG`
/// 3. `.dmqueue` dans le répertoire courant
/// 4. `.dmqueue` dans le home de l'utilisateur
///
/// Le répertoire est créé s'il n'existe pas.
pub fn config_dir(directory: &str) -> Result<PathBuf> {
    let dir = find_config_dir(directory);
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }
    if !dir.is_dir() {
        return Err(anyhow!("{} is not a directory", dir.display()));
    }
    Ok(dir)
}

fn find_config_dir(directory: &str) -> PathBuf {
    if !directory.is_empty() {
        return PathBuf::from(directory);
    }

    if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
        info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Using config dir from env");
        return PathBuf::from(env_path);
    }

    if Path::new(LOCAL_CONFIG_DIR).exists() {
        return PathBuf::from(LOCAL_CONFIG_DIR);
    }

    if let Some(home) = home_dir() {
        let home_config = home.join(LOCAL_CONFIG_DIR);
        if home_config.exists() {
            return home_config;
        }
    }

    PathBuf::from(LOCAL_CONFIG_DIR)
}
