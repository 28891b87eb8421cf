//! Instantané d'état exportable.
//!
//! Document complet diffusé après chaque mutation acceptée : runtime, config
//! (secrets masqués) et file. C'est la seule surface par laquelle la couche
//! externe observe l'état ; les secrets (SESSDATA, access_secret) ne sont
//! jamais renvoyés en clair.

use serde::Serialize;

use dmqconfig::{mask_secret, AppConfig};

use crate::queue::{QueueItem, QueueState};
use crate::runtime::RuntimeState;

#[derive(Debug, Clone, Serialize)]
pub struct StatePayload {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub runtime: RuntimePayload,
    pub config: ConfigPayload,
    pub queue: QueuePayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimePayload {
    pub status: &'static str,
    pub test_enabled: bool,
    pub overlay_url: String,
    pub danmaku_status: &'static str,
    pub danmaku_error: Option<String>,
    pub active_mode: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigPayload {
    pub server: ServerPayload,
    pub queue: QueueConfigPayload,
    pub ui: UiPayload,
    pub style: StylePayload,
    pub bilibili: BiliPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerPayload {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueConfigPayload {
    pub keyword: String,
    pub max_queue: usize,
    pub match_mode: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiPayload {
    pub overlay_title: String,
    pub current_title: String,
    pub queue_title: String,
    pub empty_text: String,
    pub marked_color: String,
    pub overlay_show_mark: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StylePayload {
    pub custom_css_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BiliPayload {
    pub mode: &'static str,
    pub open_live: OpenLivePayload,
    pub web: WebPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenLivePayload {
    pub access_key: String,
    /// Masqué si non vide.
    pub access_secret: String,
    pub app_id: u64,
    pub identity_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebPayload {
    /// Masqué si non vide.
    pub sessdata: String,
    pub room_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueuePayload {
    pub items: Vec<QueueItem>,
    pub max_queue: usize,
    pub total: usize,
    pub is_full: bool,
    pub paused: bool,
    pub pause_reason: Option<String>,
    pub pause_message: String,
    pub auto_pause_time: String,
}

/// Construit le document d'état complet. Lecture pure, appelée sous le verrou.
pub fn build_state_payload(
    cfg: &AppConfig,
    runtime: &RuntimeState,
    queue: &QueueState,
) -> StatePayload {
    let items = queue.items();
    let total = items.len();
    let max_queue = cfg.queue.max_queue;

    StatePayload {
        kind: "state",
        runtime: RuntimePayload {
            status: runtime.status.as_str(),
            test_enabled: runtime.test_enabled,
            overlay_url: cfg.overlay_url(),
            danmaku_status: runtime.danmaku_status.as_str(),
            danmaku_error: runtime.danmaku_error.clone(),
            active_mode: runtime.active_mode.map(|m| m.as_str()),
        },
        config: ConfigPayload {
            server: ServerPayload {
                host: cfg.server.host.clone(),
                port: cfg.server.port,
            },
            queue: QueueConfigPayload {
                keyword: cfg.queue.keyword.clone(),
                max_queue,
                match_mode: cfg.queue.match_mode.as_str(),
            },
            ui: UiPayload {
                overlay_title: cfg.ui.overlay_title.clone(),
                current_title: cfg.ui.current_title.clone(),
                queue_title: cfg.ui.queue_title.clone(),
                empty_text: cfg.ui.empty_text.clone(),
                marked_color: cfg.ui.marked_color.clone(),
                overlay_show_mark: cfg.ui.overlay_show_mark,
            },
            style: StylePayload {
                custom_css_path: cfg.style.custom_css_path.clone(),
            },
            bilibili: BiliPayload {
                mode: match cfg.bilibili.mode {
                    dmqconfig::PreferredMode::Auto => "auto",
                    dmqconfig::PreferredMode::OpenLive => "open_live",
                    dmqconfig::PreferredMode::Web => "web",
                },
                open_live: OpenLivePayload {
                    access_key: cfg.bilibili.open_live.access_key.clone(),
                    access_secret: mask_secret(&cfg.bilibili.open_live.access_secret),
                    app_id: cfg.bilibili.open_live.app_id,
                    identity_code: cfg.bilibili.open_live.identity_code.clone(),
                },
                web: WebPayload {
                    sessdata: mask_secret(&cfg.bilibili.web.sessdata),
                    room_id: cfg.bilibili.web.room_id,
                },
            },
        },
        queue: QueuePayload {
            items,
            max_queue,
            total,
            is_full: total >= max_queue,
            paused: runtime.queue_paused,
            pause_reason: runtime.pause_reason.clone(),
            pause_message: cfg.ui.pause_message.clone(),
            auto_pause_time: runtime.auto_pause_time.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmqconfig::SECRET_MASK;

    #[test]
    fn test_secrets_are_masked() {
        let mut cfg = AppConfig::default();
        cfg.bilibili.open_live.access_secret = "verysecret".to_string();
        cfg.bilibili.web.sessdata = "cookievalue".to_string();
        let runtime = RuntimeState::new(&cfg.runtime);
        let queue = QueueState::new();

        let payload = build_state_payload(&cfg, &runtime, &queue);
        assert_eq!(payload.config.bilibili.open_live.access_secret, SECRET_MASK);
        assert_eq!(payload.config.bilibili.web.sessdata, SECRET_MASK);

        let json = serde_json::to_string(&payload).unwrap();
        assert!(!json.contains("verysecret"));
        assert!(!json.contains("cookievalue"));
    }

    #[test]
    fn test_empty_secrets_stay_empty() {
        let cfg = AppConfig::default();
        let runtime = RuntimeState::new(&cfg.runtime);
        let queue = QueueState::new();

        let payload = build_state_payload(&cfg, &runtime, &queue);
        assert_eq!(payload.config.bilibili.open_live.access_secret, "");
        assert_eq!(payload.config.bilibili.web.sessdata, "");
    }

    #[test]
    fn test_queue_block_reflects_fill() {
        let mut cfg = AppConfig::default();
        cfg.queue.max_queue = 2;
        let runtime = RuntimeState::new(&cfg.runtime);
        let mut queue = QueueState::new();
        queue.enqueue("a", "a", 2, "t".into());
        queue.enqueue("b", "b", 2, "t".into());

        let payload = build_state_payload(&cfg, &runtime, &queue);
        assert_eq!(payload.queue.total, 2);
        assert!(payload.queue.is_full);
        assert_eq!(payload.kind, "state");
    }
}
