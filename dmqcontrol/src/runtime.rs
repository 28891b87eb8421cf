//! État runtime de la session.
//!
//! `status` est le cycle de vie grossier (stopped/running) ; la santé du
//! client danmaku est un sous-état (`danmaku_status`) qui peut passer en
//! erreur sans arrêter le runtime — la file en mémoire survit au crash du
//! client.

use serde::Serialize;

use dmqconfig::{DanmakuMode, RuntimeConfig};

/// Cycle de vie du contrôleur. Seules transitions : stopped → running → stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    Stopped,
    Running,
}

impl RuntimeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeStatus::Stopped => "stopped",
            RuntimeStatus::Running => "running",
        }
    }
}

/// Santé du client danmaku. `Running` est impossible quand le runtime est
/// `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DanmakuStatus {
    Idle,
    Running,
    Error,
}

impl DanmakuStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DanmakuStatus::Idle => "idle",
            DanmakuStatus::Running => "running",
            DanmakuStatus::Error => "error",
        }
    }
}

/// État runtime, possédé exclusivement par le contrôleur et muté sous son
/// verrou.
#[derive(Debug, Clone)]
pub struct RuntimeState {
    pub status: RuntimeStatus,
    pub test_enabled: bool,

    pub danmaku_status: DanmakuStatus,
    pub danmaku_error: Option<String>,
    pub active_mode: Option<DanmakuMode>,

    pub queue_paused: bool,
    pub pause_reason: Option<String>,

    /// Heure d'auto-pause "HH:MM", vide = désactivé.
    pub auto_pause_time: String,
    /// Prochain déclenchement résolu (epoch secondes), consommé au tir.
    pub pause_until_ts: Option<i64>,
    /// Intervalle du ticker d'auto-pause, en secondes.
    pub pause_check_interval: u64,
}

impl RuntimeState {
    pub fn new(cfg: &RuntimeConfig) -> Self {
        Self {
            status: RuntimeStatus::Stopped,
            test_enabled: cfg.test_enabled,
            danmaku_status: DanmakuStatus::Idle,
            danmaku_error: None,
            active_mode: None,
            queue_paused: false,
            pause_reason: None,
            auto_pause_time: cfg.auto_pause_time.clone(),
            pause_until_ts: None,
            pause_check_interval: cfg.pause_check_interval.max(1),
        }
    }

    /// Remise aux valeurs par défaut au `stop` : tout sauf le planning
    /// configuré. La préférence `test_enabled` est relue depuis la config.
    pub fn reset_stopped(&mut self, cfg: &RuntimeConfig) {
        self.status = RuntimeStatus::Stopped;
        self.test_enabled = cfg.test_enabled;
        self.danmaku_status = DanmakuStatus::Idle;
        self.danmaku_error = None;
        self.active_mode = None;
        self.queue_paused = false;
        self.pause_reason = None;
        self.pause_until_ts = None;
    }
}
