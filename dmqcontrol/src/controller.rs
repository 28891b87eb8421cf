//! Contrôleur de session.
//!
//! Instance unique construite au démarrage du process, collaborateurs
//! injectés (fabrique de clients danmaku, vérificateur SESSDATA, horloge,
//! persistance de config). Le contrôleur détient l'unique verrou de mutation
//! qui protège {config, runtime, file} ; les tâches de fond (consommateur
//! d'évènements, ticker d'auto-pause, lecteur danmaku) se sérialisent à
//! travers lui. Le verrou n'est tenu que sur des sections critiques bornées :
//! les I/O réseau du démarrage (vérification SESSDATA) sont faites avant de
//! le prendre.
//!
//! Après chaque mutation acceptée, l'instantané complet est diffusé aux
//! abonnés via le hub (verrou interne distinct, jamais bloquant pour l'état).

use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dmqclient::{
    ClientFactory, DanmakuClient, DanmakuEvent, EventSender, EventSource, SessdataVerifier,
};
use dmqconfig::{AppConfig, ConfigDelta, ConfigStore, DanmakuMode, MatchMode};

use crate::clock::{Clock, SystemClock};
use crate::errors::{ControlError, Result};
use crate::events::{consumer_loop, AdmitReason, EVENT_QUEUE_CAPACITY};
use crate::hub::{BroadcastHub, StateSink};
use crate::queue::QueueState;
use crate::runtime::{DanmakuStatus, RuntimeState, RuntimeStatus};
use crate::scheduler::{auto_pause_loop, compute_next, is_valid_time, AUTO_PAUSE_REASON};
use crate::snapshot::{build_state_payload, StatePayload};

/// Tâche danmaku en cours : un seul client vivant par contrôleur.
struct DanmakuTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// État protégé par l'unique verrou de mutation.
struct Shared {
    cfg: AppConfig,
    runtime: RuntimeState,
    queue: QueueState,
    danmaku: Option<DanmakuTask>,
    /// Numéro de révision des instantanés diffusés, incrémenté sous le verrou.
    /// Le hub s'en sert pour abandonner les livraisons périmées.
    revision: u64,
}

struct Inner {
    shared: Mutex<Shared>,
    hub: BroadcastHub,
    event_tx: mpsc::Sender<DanmakuEvent>,
    /// Pris une seule fois par `start_background_tasks`.
    event_rx: StdMutex<Option<mpsc::Receiver<DanmakuEvent>>>,
    factory: Arc<dyn ClientFactory>,
    verifier: Arc<dyn SessdataVerifier>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn ConfigStore>,
    shutdown: CancellationToken,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

/// Contrôleur de la session de file d'attente. Clonable (handle partagé).
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    pub fn new(
        cfg: AppConfig,
        factory: Arc<dyn ClientFactory>,
        verifier: Arc<dyn SessdataVerifier>,
        store: Arc<dyn ConfigStore>,
    ) -> Self {
        Self::with_clock(cfg, factory, verifier, store, Arc::new(SystemClock))
    }

    /// Variante avec horloge injectée (tests déterministes).
    pub fn with_clock(
        cfg: AppConfig,
        factory: Arc<dyn ClientFactory>,
        verifier: Arc<dyn SessdataVerifier>,
        store: Arc<dyn ConfigStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let runtime = RuntimeState::new(&cfg.runtime);
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    cfg,
                    runtime,
                    queue: QueueState::new(),
                    danmaku: None,
                    revision: 0,
                }),
                hub: BroadcastHub::new(),
                event_tx,
                event_rx: StdMutex::new(Some(event_rx)),
                factory,
                verifier,
                clock,
                store,
                shutdown: CancellationToken::new(),
                tasks: StdMutex::new(Vec::new()),
            }),
        }
    }

    // ========================================================================
    // TÂCHES DE FOND
    // ========================================================================

    /// Démarre le consommateur d'évènements et le ticker d'auto-pause.
    /// Idempotent : le récepteur n'est pris qu'une fois.
    pub fn start_background_tasks(&self) {
        let Some(rx) = self.inner.event_rx.lock().unwrap().take() else {
            return;
        };
        let consumer = tokio::spawn(consumer_loop(
            self.clone(),
            rx,
            self.inner.shutdown.child_token(),
        ));
        let ticker = tokio::spawn(auto_pause_loop(
            self.clone(),
            self.inner.shutdown.child_token(),
        ));
        self.inner.tasks.lock().unwrap().extend([consumer, ticker]);
        debug!("Background tasks started");
    }

    /// Arrêt complet : stop du runtime puis annulation coopérative de toutes
    /// les tâches de fond, en attendant leur fin effective.
    pub async fn shutdown(&self) {
        self.stop_runtime().await;
        self.inner.shutdown.cancel();
        let tasks: Vec<_> = std::mem::take(&mut *self.inner.tasks.lock().unwrap());
        for task in tasks {
            let _ = task.await;
        }
        info!("Controller shut down");
    }

    /// Canal de production d'évènements (backpressure : l'envoi suspend quand
    /// le canal est plein). Passé au client danmaku et au harnais de test.
    pub fn event_sender(&self) -> EventSender {
        self.inner.event_tx.clone()
    }

    /// Pousse un évènement dans le pipeline d'ingestion.
    pub async fn put_event(&self, ev: DanmakuEvent) {
        if self.inner.event_tx.send(ev).await.is_err() {
            warn!("Event pipeline closed, event dropped");
        }
    }

    // ========================================================================
    // CYCLE DE VIE
    // ========================================================================

    /// Démarre le runtime.
    ///
    /// La résolution du mode est une fonction pure de la config ; la
    /// vérification SESSDATA (mode web) est faite hors verrou. Tout échec
    /// laisse le statut à `stopped` avec la raison dans `danmaku_error`.
    pub async fn start_runtime(&self) -> Result<()> {
        let (mode, sessdata) = {
            let mut shared = self.inner.shared.lock().await;
            match shared.cfg.select_danmaku_mode() {
                Ok(mode) => {
                    let sessdata = (mode == DanmakuMode::Web)
                        .then(|| shared.cfg.bilibili.web.sessdata.clone());
                    (mode, sessdata)
                }
                Err(reason) => {
                    shared.runtime.danmaku_status = DanmakuStatus::Error;
                    shared.runtime.danmaku_error = Some(reason.clone());
                    drop(shared);
                    self.broadcast_current().await;
                    return Err(ControlError::DanmakuStart(reason));
                }
            }
        };

        // I/O réseau hors verrou : la durée de détention du verrou reste
        // indépendante de la latence externe.
        if let Some(sessdata) = sessdata {
            match self.inner.verifier.verify(&sessdata).await {
                Ok(message) => info!(message = %message, "SESSDATA verified"),
                Err(reason) => {
                    let mut shared = self.inner.shared.lock().await;
                    shared.runtime.danmaku_status = DanmakuStatus::Error;
                    shared.runtime.danmaku_error = Some(reason.clone());
                    drop(shared);
                    self.broadcast_current().await;
                    return Err(ControlError::DanmakuStart(reason));
                }
            }
        }

        {
            let mut shared = self.inner.shared.lock().await;
            shared.runtime.status = RuntimeStatus::Running;
            shared.runtime.danmaku_status = DanmakuStatus::Running;
            shared.runtime.danmaku_error = None;
            shared.runtime.active_mode = Some(mode);
            shared.runtime.test_enabled = shared.cfg.runtime.test_enabled;
            shared.runtime.queue_paused = false;
            shared.runtime.pause_reason = None;
            shared.runtime.auto_pause_time = shared.cfg.runtime.auto_pause_time.clone();
            shared.runtime.pause_until_ts = compute_next(
                &shared.runtime.auto_pause_time,
                self.inner.clock.now_local(),
            );
            self.start_danmaku_locked(&mut shared, mode, false);
        }
        self.broadcast_current().await;
        info!(mode = mode.as_str(), "Runtime started");
        Ok(())
    }

    /// Arrête le runtime : annulation coopérative du client danmaku (attendue
    /// jusqu'à fermeture de sa session réseau), remise à zéro de l'état
    /// runtime. La file n'est PAS vidée.
    pub async fn stop_runtime(&self) {
        let task = {
            let mut shared = self.inner.shared.lock().await;
            let Shared {
                runtime,
                cfg,
                danmaku,
                ..
            } = &mut *shared;
            runtime.reset_stopped(&cfg.runtime);
            danmaku.take()
        };
        if let Some(task) = task {
            task.token.cancel();
            if let Err(e) = task.handle.await {
                warn!(error = %e, "Danmaku task join failed");
            }
        }
        self.broadcast_current().await;
        info!("Runtime stopped");
    }

    /// Bascule runtime-only : la préférence persistée n'est relue qu'au
    /// prochain start/stop.
    pub async fn set_test_enabled(&self, enabled: bool) -> Result<()> {
        {
            let mut shared = self.inner.shared.lock().await;
            shared.runtime.test_enabled = enabled;
        }
        self.broadcast_current().await;
        Ok(())
    }

    /// Applique un delta de configuration validé.
    ///
    /// Si le runtime tourne, le client danmaku est recréé avec la config
    /// effective — sans toucher ni à la file ni au statut de haut niveau.
    pub async fn update_config(&self, delta: ConfigDelta) -> Result<()> {
        delta
            .validate()
            .map_err(ControlError::InvalidConfigUpdate)?;

        {
            let mut shared = self.inner.shared.lock().await;
            delta.apply(&mut shared.cfg);
            if let Err(e) = self.inner.store.save(&shared.cfg) {
                warn!(error = %e, "Failed to persist config");
            }
            shared.runtime.pause_check_interval = shared.cfg.runtime.pause_check_interval.max(1);

            match shared.cfg.select_danmaku_mode() {
                Ok(mode) if shared.runtime.status == RuntimeStatus::Running => {
                    shared.runtime.danmaku_status = DanmakuStatus::Running;
                    shared.runtime.danmaku_error = None;
                    shared.runtime.active_mode = Some(mode);
                    self.start_danmaku_locked(&mut shared, mode, true);
                }
                Ok(_) => {
                    shared.runtime.danmaku_status = DanmakuStatus::Idle;
                    shared.runtime.danmaku_error = None;
                }
                Err(reason) => {
                    shared.runtime.danmaku_status = DanmakuStatus::Error;
                    shared.runtime.danmaku_error = Some(reason);
                }
            }
        }
        self.broadcast_current().await;
        Ok(())
    }

    // ========================================================================
    // ADMISSION
    // ========================================================================

    /// Applique la règle d'admission à un évènement, sous le verrou, et
    /// diffuse l'instantané si l'état a changé. Mêmes sémantiques pour le
    /// pipeline asynchrone et les appels directs.
    pub async fn process_event(&self, ev: &DanmakuEvent) -> (bool, AdmitReason) {
        let (rev, payload) = {
            let mut shared = self.inner.shared.lock().await;
            match self.admit_locked(&mut shared, ev) {
                AdmitReason::Ok => snapshot_locked(&mut shared),
                reason => return (false, reason),
            }
        };
        self.broadcast_payload(rev, payload).await;
        (true, AdmitReason::Ok)
    }

    /// Envoie un message de test par le même chemin d'admission que le chat.
    pub async fn send_test_danmaku(&self, uname: &str, msg: &str) -> Result<(bool, AdmitReason)> {
        let enabled = {
            let shared = self.inner.shared.lock().await;
            shared.runtime.test_enabled
        };
        if !enabled {
            return Err(ControlError::TestDisabled);
        }
        let ev = DanmakuEvent::new(uname, msg, None, EventSource::Test);
        Ok(self.process_event(&ev).await)
    }

    /// Règle d'admission ordonnée (court-circuit). Chaque refus rapporte sa
    /// raison ; seule `Ok` a muté la file.
    fn admit_locked(&self, shared: &mut Shared, ev: &DanmakuEvent) -> AdmitReason {
        if shared.runtime.status != RuntimeStatus::Running {
            return AdmitReason::NotRunning;
        }
        if shared.runtime.queue_paused {
            return AdmitReason::Paused;
        }

        let keyword = shared.cfg.queue.keyword.trim().to_string();
        if keyword.is_empty() {
            return AdmitReason::NoKeyword;
        }

        let msg = ev.msg.trim();
        let matched = match shared.cfg.queue.match_mode {
            MatchMode::Exact => msg == keyword,
            MatchMode::Contains => msg.contains(&keyword),
        };
        if !matched {
            return AdmitReason::NoMatch;
        }

        let user_key = ev.effective_user_key().to_string();
        if user_key.is_empty() {
            return AdmitReason::NoUserKey;
        }

        let joined_at = self.inner.clock.now_utc().to_rfc3339();
        let max_queue = shared.cfg.queue.max_queue;
        shared
            .queue
            .enqueue(&user_key, ev.uname.trim(), max_queue, joined_at)
    }

    // ========================================================================
    // ADMINISTRATION DE LA FILE (runtime running uniquement)
    // ========================================================================

    /// Retire un participant ; promotion FIFO si c'était `current`.
    pub async fn remove_user(&self, user_key: &str) -> Result<bool> {
        self.queue_admin(|queue| queue.remove(user_key)).await
    }

    /// Remonte un participant en tête de `waiting`.
    pub async fn pin_top(&self, user_key: &str) -> Result<bool> {
        self.queue_admin(|queue| queue.pin_top(user_key)).await
    }

    /// Pose ou retire la marque d'un participant.
    pub async fn set_marked(&self, user_key: &str, marked: bool) -> Result<bool> {
        self.queue_admin(|queue| queue.set_marked(user_key, marked))
            .await
    }

    async fn queue_admin<F>(&self, op: F) -> Result<bool>
    where
        F: FnOnce(&mut QueueState) -> bool,
    {
        let (rev, payload) = {
            let mut shared = self.inner.shared.lock().await;
            if shared.runtime.status != RuntimeStatus::Running {
                return Err(ControlError::NotRunning);
            }
            if !op(&mut shared.queue) {
                return Ok(false);
            }
            snapshot_locked(&mut shared)
        };
        self.broadcast_payload(rev, payload).await;
        Ok(true)
    }

    // ========================================================================
    // PAUSE
    // ========================================================================

    /// Pause / reprise manuelle des admissions. La reprise réarme le
    /// déclencheur d'auto-pause pour son prochain passage.
    pub async fn set_queue_paused(&self, paused: bool, reason: Option<String>) -> Result<()> {
        {
            let mut shared = self.inner.shared.lock().await;
            if paused {
                shared.runtime.queue_paused = true;
                shared.runtime.pause_reason =
                    Some(reason.unwrap_or_else(|| "manual".to_string()));
            } else {
                shared.runtime.queue_paused = false;
                shared.runtime.pause_reason = None;
                shared.runtime.pause_until_ts = compute_next(
                    &shared.runtime.auto_pause_time,
                    self.inner.clock.now_local(),
                );
            }
        }
        self.broadcast_current().await;
        Ok(())
    }

    /// Change l'heure d'auto-pause quotidienne. Chaîne vide = désactivé.
    /// Rejette les formats invalides avant toute mutation.
    pub async fn set_auto_pause_time(&self, time_str: &str) -> Result<()> {
        if !is_valid_time(time_str) {
            return Err(ControlError::InvalidTimeFormat(time_str.to_string()));
        }
        {
            let mut shared = self.inner.shared.lock().await;
            let time_str = time_str.trim().to_string();
            shared.runtime.auto_pause_time = time_str.clone();
            shared.runtime.pause_until_ts =
                compute_next(&time_str, self.inner.clock.now_local());
            shared.cfg.runtime.auto_pause_time = time_str;
            if let Err(e) = self.inner.store.save(&shared.cfg) {
                warn!(error = %e, "Failed to persist config");
            }
        }
        self.broadcast_current().await;
        Ok(())
    }

    /// Intervalle courant du ticker d'auto-pause (relu à chaque tour).
    pub(crate) async fn pause_check_interval(&self) -> u64 {
        let shared = self.inner.shared.lock().await;
        shared.runtime.pause_check_interval.max(1)
    }

    /// Un tour du scheduler : bascule en pause si le déclencheur est atteint.
    /// Le déclencheur est consommé ; il sera réarmé à la reprise manuelle, au
    /// start ou au changement de planning.
    pub async fn auto_pause_tick(&self) -> Result<()> {
        let (rev, payload) = {
            let mut shared = self.inner.shared.lock().await;
            if shared.runtime.status != RuntimeStatus::Running || shared.runtime.queue_paused {
                return Ok(());
            }
            let Some(ts) = shared.runtime.pause_until_ts else {
                return Ok(());
            };
            if self.inner.clock.now_local().timestamp() < ts {
                return Ok(());
            }
            shared.runtime.queue_paused = true;
            shared.runtime.pause_reason = Some(AUTO_PAUSE_REASON.to_string());
            shared.runtime.pause_until_ts = None;
            snapshot_locked(&mut shared)
        };
        info!("Queue auto-paused on schedule");
        self.broadcast_payload(rev, payload).await;
        Ok(())
    }

    // ========================================================================
    // OBSERVATION
    // ========================================================================

    /// Instantané complet (secrets masqués).
    pub async fn state_payload(&self) -> StatePayload {
        let shared = self.inner.shared.lock().await;
        build_state_payload(&shared.cfg, &shared.runtime, &shared.queue)
    }

    /// Inscrit un abonné : il reçoit immédiatement l'instantané courant, puis
    /// chaque diffusion. Retourne le jeton de désinscription.
    pub async fn subscribe(&self, sink: Arc<dyn StateSink>) -> u64 {
        let payload = self.state_payload().await;
        match serde_json::to_string(&payload) {
            Ok(json) => {
                if let Err(e) = sink.send(&json).await {
                    debug!(error = %e, "Initial snapshot delivery failed");
                }
            }
            Err(e) => error!(error = %e, "Snapshot serialization failed"),
        }
        self.inner.hub.add(sink)
    }

    pub fn unsubscribe(&self, token: u64) {
        self.inner.hub.remove(token);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.hub.len()
    }

    async fn broadcast_current(&self) {
        let (rev, payload) = {
            let mut shared = self.inner.shared.lock().await;
            snapshot_locked(&mut shared)
        };
        self.broadcast_payload(rev, payload).await;
    }

    async fn broadcast_payload(&self, revision: u64, payload: StatePayload) {
        match serde_json::to_string(&payload) {
            Ok(json) => self.inner.hub.broadcast(revision, &json).await,
            Err(e) => error!(error = %e, "Snapshot serialization failed"),
        }
    }

    // ========================================================================
    // CLIENT DANMAKU
    // ========================================================================

    /// Lance (ou relance) la tâche client danmaku. Appelé sous le verrou ;
    /// au plus une tâche vivante par contrôleur.
    fn start_danmaku_locked(&self, shared: &mut Shared, mode: DanmakuMode, restart: bool) {
        if restart {
            if let Some(task) = shared.danmaku.take() {
                task.token.cancel();
                // la tâche se ferme d'elle-même ; on ne retient pas le verrou
                // le temps de sa fermeture
                tokio::spawn(async move {
                    let _ = task.handle.await;
                });
            }
        }
        if shared
            .danmaku
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
        {
            return;
        }
        shared.danmaku = None;

        let client = match self
            .inner
            .factory
            .build(&shared.cfg, mode, self.inner.event_tx.clone())
        {
            Ok(client) => client,
            Err(e) => {
                shared.runtime.danmaku_status = DanmakuStatus::Error;
                shared.runtime.danmaku_error = Some(format!("danmaku client build failed: {}", e));
                return;
            }
        };

        let token = self.inner.shutdown.child_token();
        let handle = tokio::spawn(run_danmaku_client(self.clone(), client, token.clone()));
        shared.danmaku = Some(DanmakuTask { token, handle });
        debug!(mode = mode.as_str(), restart, "Danmaku client task spawned");
    }

    /// Crash du client (hors annulation) : capturé, statut danmaku en erreur,
    /// le runtime reste `running` et la file est conservée — l'opérateur peut
    /// corriger la config et relancer juste le client.
    async fn record_danmaku_crash(&self, message: String) {
        error!(error = %message, "Danmaku client crashed");
        {
            let mut shared = self.inner.shared.lock().await;
            if shared.runtime.status != RuntimeStatus::Running {
                return;
            }
            shared.runtime.danmaku_status = DanmakuStatus::Error;
            shared.runtime.danmaku_error = Some(format!("danmaku crashed: {}", message));
            shared.danmaku = None;
        }
        self.broadcast_current().await;
    }
}

/// Incrémente la révision et construit l'instantané correspondant. Appelé
/// sous le verrou : la révision suit strictement l'ordre des mutations, ce qui
/// permet au hub d'abandonner les livraisons dépassées par une diffusion
/// concurrente.
fn snapshot_locked(shared: &mut Shared) -> (u64, StatePayload) {
    shared.revision += 1;
    (
        shared.revision,
        build_state_payload(&shared.cfg, &shared.runtime, &shared.queue),
    )
}

/// Fait tourner le client jusqu'à annulation ou fin de connexion, puis ferme
/// toujours la session réseau avant de rendre la main.
async fn run_danmaku_client(
    controller: Controller,
    mut client: Box<dyn DanmakuClient>,
    token: CancellationToken,
) {
    client.start();
    let mut crash = None;
    tokio::select! {
        _ = token.cancelled() => {}
        res = client.join() => {
            crash = res.err();
        }
    }
    client.stop_and_close().await;

    if let Some(e) = crash {
        if token.is_cancelled() {
            return;
        }
        controller.record_danmaku_crash(e.to_string()).await;
    }
}
