//! Hub de diffusion des instantanés.
//!
//! Registre des abonnés vivants (overlay, panneau d'admin) derrière son propre
//! verrou interne, distinct du verrou runtime : une diffusion ne bloque jamais
//! une mutation d'état. La livraison est concurrente et best-effort — un échec
//! d'envoi désinscrit cet abonné sans affecter les autres. Pas de retry, pas
//! de file par abonné : c'est une projection de vue en direct, pas un journal.
//!
//! Chaque instantané porte un numéro de révision, attribué sous le verrou
//! d'état. Les livraisons sont sérialisées par révision : un instantané plus
//! ancien que le dernier livré est simplement abandonné, la vue en direct ne
//! revient jamais en arrière.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use tokio::sync::mpsc;
use tracing::debug;

/// Destinataire d'instantanés sérialisés.
#[async_trait]
pub trait StateSink: Send + Sync {
    /// Livre un payload JSON déjà sérialisé. Une erreur désinscrit l'abonné.
    async fn send(&self, payload: &str) -> anyhow::Result<()>;
}

/// Sink basé sur un canal mpsc non borné : l'autre extrémité est tenue par la
/// connexion WebSocket (couche externe) ou par un test.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl StateSink for ChannelSink {
    async fn send(&self, payload: &str) -> anyhow::Result<()> {
        self.tx
            .send(payload.to_string())
            .map_err(|_| anyhow::anyhow!("subscriber channel closed"))
    }
}

struct HubInner {
    sinks: Mutex<HashMap<u64, Arc<dyn StateSink>>>,
    counter: AtomicU64,
    /// Dernière révision livrée. Tenu pendant toute une livraison : les
    /// diffusions concurrentes se sérialisent ici, pas sur le verrou d'état.
    delivery: tokio::sync::Mutex<u64>,
}

/// Registre d'abonnés + fan-out.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                sinks: Mutex::new(HashMap::new()),
                counter: AtomicU64::new(1),
                delivery: tokio::sync::Mutex::new(0),
            }),
        }
    }

    /// Inscrit un abonné et retourne son jeton de désinscription.
    pub fn add(&self, sink: Arc<dyn StateSink>) -> u64 {
        let token = self.inner.counter.fetch_add(1, Ordering::Relaxed);
        self.inner.sinks.lock().unwrap().insert(token, sink);
        token
    }

    /// Désinscrit un abonné. Idempotent.
    pub fn remove(&self, token: u64) {
        self.inner.sinks.lock().unwrap().remove(&token);
    }

    pub fn len(&self) -> usize {
        self.inner.sinks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Livre `payload` à tous les abonnés courants, en parallèle. Les abonnés
    /// en échec sont désinscrits. Un `revision` inférieur ou égal au dernier
    /// livré est abandonné (instantané périmé par une diffusion concurrente).
    pub async fn broadcast(&self, revision: u64, payload: &str) {
        let mut last_delivered = self.inner.delivery.lock().await;
        if revision <= *last_delivered {
            debug!(revision, "Stale snapshot dropped");
            return;
        }
        *last_delivered = revision;

        let sinks: Vec<(u64, Arc<dyn StateSink>)> = {
            let guard = self.inner.sinks.lock().unwrap();
            guard.iter().map(|(k, v)| (*k, v.clone())).collect()
        };
        if sinks.is_empty() {
            return;
        }

        let sends = sinks.iter().map(|(token, sink)| {
            let token = *token;
            async move { (token, sink.send(payload).await) }
        });

        let mut dead = Vec::new();
        for (token, result) in join_all(sends).await {
            if result.is_err() {
                dead.push(token);
            }
        }

        if !dead.is_empty() {
            let mut guard = self.inner.sinks.lock().unwrap();
            for token in &dead {
                guard.remove(token);
            }
            debug!(count = dead.len(), "Dropped dead subscribers");
        }
    }
}
