//! Pipeline d'ingestion des évènements danmaku.
//!
//! Un seul canal mpsc borné relie les producteurs (client danmaku, endpoint de
//! test) à l'unique consommateur. L'envoi suspend le producteur quand le canal
//! est plein : backpressure délibérée, une rafale de chat ne perd jamais de
//! demandes d'admission. L'ordre de consommation FIFO est la seule garantie
//! d'ordre — pas de réordonnancement ni de fusion, l'ordre d'arrivée détermine
//! l'ordre de la file.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use dmqclient::DanmakuEvent;

use crate::controller::Controller;

/// Capacité du canal d'ingestion (évènements en attente).
pub const EVENT_QUEUE_CAPACITY: usize = 200;

/// Issue d'une admission. Jamais levée en erreur : chaque vérification de la
/// règle d'admission rapporte sa raison, même sans changement d'état.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmitReason {
    NotRunning,
    Paused,
    NoKeyword,
    NoMatch,
    NoUserKey,
    Duplicate,
    Full,
    Ok,
}

impl AdmitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmitReason::NotRunning => "not_running",
            AdmitReason::Paused => "paused",
            AdmitReason::NoKeyword => "no_keyword",
            AdmitReason::NoMatch => "no_match",
            AdmitReason::NoUserKey => "no_user_key",
            AdmitReason::Duplicate => "duplicate",
            AdmitReason::Full => "full",
            AdmitReason::Ok => "ok",
        }
    }

    /// Seul `ok` correspond à une mutation d'état.
    pub fn accepted(&self) -> bool {
        matches!(self, AdmitReason::Ok)
    }
}

/// Boucle de l'unique consommateur : draine le canal en FIFO strict et
/// applique la règle d'admission via le contrôleur (qui diffuse lui-même
/// l'instantané quand l'état change).
pub(crate) async fn consumer_loop(
    controller: Controller,
    mut rx: mpsc::Receiver<DanmakuEvent>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            ev = rx.recv() => {
                let Some(ev) = ev else { break };
                let (changed, reason) = controller.process_event(&ev).await;
                debug!(
                    uname = %ev.uname,
                    source = ev.source.as_str(),
                    reason = reason.as_str(),
                    changed,
                    "Danmaku event consumed"
                );
            }
        }
    }
    debug!("Event consumer stopped");
}
