//! Types d'erreurs pour dmqcontrol.
//!
//! Les refus d'admission (duplicate, full, no_match, ...) ne sont PAS des
//! erreurs : ils sont rapportés comme valeurs via `AdmitReason`. Ce module ne
//! couvre que les échecs réels (configuration inutilisable, démarrage du
//! client, format d'heure invalide).

/// Erreurs du contrôleur de session.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("runtime is not running")]
    NotRunning,

    #[error("danmaku start failed: {0}")]
    DanmakuStart(String),

    #[error("invalid time format: {0}")]
    InvalidTimeFormat(String),

    #[error("invalid config update: {0}")]
    InvalidConfigUpdate(String),

    #[error("test events are disabled")]
    TestDisabled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Type Result spécialisé pour dmqcontrol.
pub type Result<T> = std::result::Result<T, ControlError>;
