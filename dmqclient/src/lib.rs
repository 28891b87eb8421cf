//! # Frontière client danmaku
//!
//! Cette crate définit le contrat entre le cœur DMQueue et le client de
//! protocole chat (décodage réseau, authentification, reconnexion). Le cœur
//! ne consomme que des évènements déjà décodés ; le client réel vit derrière
//! les traits de ce module :
//!
//! - [`DanmakuClient`] : cycle de vie start / join / stop_and_close
//! - [`ClientFactory`] : construction d'un client pour un mode donné
//! - [`SessdataVerifier`] : validation du cookie SESSDATA avant un démarrage
//!   en mode web
//!
//! Le client est seul propriétaire de sa session réseau : le contrôleur ne le
//! touche que via start/stop.

use async_trait::async_trait;
use dmqconfig::{AppConfig, DanmakuMode};
use serde::Serialize;
use tokio::sync::mpsc;

pub mod verify;

pub use verify::NavApiVerifier;

/// Origine d'un évènement danmaku.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Web,
    OpenLive,
    Test,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Web => "web",
            EventSource::OpenLive => "open_live",
            EventSource::Test => "test",
        }
    }
}

/// Un message de chat décodé, produit une fois et consommé une fois.
#[derive(Debug, Clone)]
pub struct DanmakuEvent {
    pub uname: String,
    pub msg: String,
    /// open_id / uid ; repli sur `uname` si absent.
    pub user_key: Option<String>,
    pub source: EventSource,
}

impl DanmakuEvent {
    pub fn new(
        uname: impl Into<String>,
        msg: impl Into<String>,
        user_key: Option<String>,
        source: EventSource,
    ) -> Self {
        Self {
            uname: uname.into(),
            msg: msg.into(),
            user_key,
            source,
        }
    }

    /// Identité effective : `user_key` si présent, sinon `uname` (après trim).
    pub fn effective_user_key(&self) -> &str {
        match &self.user_key {
            Some(key) if !key.trim().is_empty() => key.trim(),
            _ => self.uname.trim(),
        }
    }
}

/// Canal de production d'évènements vers le pipeline d'ingestion.
///
/// L'envoi suspend le producteur quand le canal est plein (backpressure).
pub type EventSender = mpsc::Sender<DanmakuEvent>;

/// Erreurs de la frontière client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid client config: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("client connection lost: {0}")]
    ConnectionLost(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Cycle de vie d'un client danmaku.
///
/// Le contrôleur appelle `start` puis attend `join` dans une tâche dédiée ;
/// l'annulation coopérative se termine toujours par `stop_and_close`, qui doit
/// libérer la session réseau avant de rendre la main.
#[async_trait]
pub trait DanmakuClient: Send {
    /// Démarre la connexion (non bloquant).
    fn start(&mut self);

    /// Rend la main quand la connexion se termine. Une fin anormale est
    /// rapportée en `Err` ; le contrôleur la capture sans arrêter le runtime.
    async fn join(&mut self) -> Result<()>;

    /// Ferme la connexion et libère la session réseau.
    async fn stop_and_close(&mut self);
}

/// Fabrique de clients, injectée dans le contrôleur.
///
/// Chaque message entrant doit être poussé décodé sur `push`, un par ligne de
/// chat, avec `(uname, msg, user_key, source)`.
pub trait ClientFactory: Send + Sync {
    fn build(
        &self,
        cfg: &AppConfig,
        mode: DanmakuMode,
        push: EventSender,
    ) -> Result<Box<dyn DanmakuClient>>;
}

/// Validation d'un cookie SESSDATA avant un démarrage en mode web.
///
/// `Ok(message)` décrit le compte validé ; `Err(reason)` fait échouer le
/// démarrage avec cette raison, sans changement d'état.
#[async_trait]
pub trait SessdataVerifier: Send + Sync {
    async fn verify(&self, sessdata: &str) -> std::result::Result<String, String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_user_key_prefers_user_key() {
        let ev = DanmakuEvent::new("alice", "hi", Some("uid:42".into()), EventSource::Web);
        assert_eq!(ev.effective_user_key(), "uid:42");
    }

    #[test]
    fn test_effective_user_key_falls_back_to_uname() {
        let ev = DanmakuEvent::new(" alice ", "hi", Some("   ".into()), EventSource::Test);
        assert_eq!(ev.effective_user_key(), "alice");

        let ev = DanmakuEvent::new("bob", "hi", None, EventSource::OpenLive);
        assert_eq!(ev.effective_user_key(), "bob");
    }
}
