//! Delta de configuration explicite.
//!
//! Les mises à jour de configuration sont décrites par une valeur
//! [`ConfigDelta`] : chaque champ optionnel décrit un remplacement. Le delta
//! est validé avant toute fusion, puis appliqué à une [`AppConfig`] sous le
//! verrou du contrôleur. Aucune closure opaque.

use serde::Deserialize;

use crate::{AppConfig, MatchMode, PreferredMode};

/// Delta de configuration, champ par champ.
///
/// Tout champ `None` laisse la valeur courante inchangée.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigDelta {
    // server
    pub host: Option<String>,
    pub port: Option<u16>,

    // ui
    pub overlay_title: Option<String>,
    pub current_title: Option<String>,
    pub queue_title: Option<String>,
    pub empty_text: Option<String>,
    pub marked_color: Option<String>,
    pub overlay_show_mark: Option<bool>,
    pub pause_message: Option<String>,

    // queue
    pub keyword: Option<String>,
    pub max_queue: Option<usize>,
    pub match_mode: Option<String>,

    // style
    pub custom_css_path: Option<String>,

    // danmaku : open live
    pub open_live_access_key: Option<String>,
    pub open_live_access_secret: Option<String>,
    pub open_live_app_id: Option<u64>,
    pub open_live_identity_code: Option<String>,

    // danmaku : web
    pub web_sessdata: Option<String>,
    pub web_room_id: Option<u64>,

    // danmaku : préférence de mode
    pub bilibili_mode: Option<String>,
}

impl ConfigDelta {
    /// Valide le delta sans toucher à la configuration.
    ///
    /// Retourne un message lisible en cas de valeur invalide.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(port) = self.port {
            if port == 0 {
                return Err("server.port must be non-zero".to_string());
            }
        }
        if let Some(max_queue) = self.max_queue {
            if max_queue == 0 {
                return Err("queue.max_queue must be at least 1".to_string());
            }
        }
        if let Some(mode) = &self.match_mode {
            if MatchMode::parse(mode).is_none() {
                return Err(format!(
                    "invalid match_mode '{}': expected exact|contains",
                    mode
                ));
            }
        }
        if let Some(mode) = &self.bilibili_mode {
            if PreferredMode::parse(mode).is_none() {
                return Err(format!(
                    "invalid bilibili_mode '{}': expected auto|open_live|web",
                    mode
                ));
            }
        }
        Ok(())
    }

    /// Applique le delta (préalablement validé) à la configuration.
    pub fn apply(&self, cfg: &mut AppConfig) {
        if let Some(v) = &self.host {
            cfg.server.host = v.clone();
        }
        if let Some(v) = self.port {
            cfg.server.port = v;
        }

        if let Some(v) = &self.overlay_title {
            cfg.ui.overlay_title = v.clone();
        }
        if let Some(v) = &self.current_title {
            cfg.ui.current_title = v.clone();
        }
        if let Some(v) = &self.queue_title {
            cfg.ui.queue_title = v.clone();
        }
        if let Some(v) = &self.empty_text {
            cfg.ui.empty_text = v.clone();
        }
        if let Some(v) = &self.marked_color {
            cfg.ui.marked_color = v.clone();
        }
        if let Some(v) = self.overlay_show_mark {
            cfg.ui.overlay_show_mark = v;
        }
        if let Some(v) = &self.pause_message {
            cfg.ui.pause_message = v.clone();
        }

        if let Some(v) = &self.keyword {
            cfg.queue.keyword = v.clone();
        }
        if let Some(v) = self.max_queue {
            cfg.queue.max_queue = v;
        }
        if let Some(v) = &self.match_mode {
            if let Some(mode) = MatchMode::parse(v) {
                cfg.queue.match_mode = mode;
            }
        }

        if let Some(v) = &self.custom_css_path {
            cfg.style.custom_css_path = v.clone();
        }

        if let Some(v) = &self.open_live_access_key {
            cfg.bilibili.open_live.access_key = v.clone();
        }
        if let Some(v) = &self.open_live_access_secret {
            cfg.bilibili.open_live.access_secret = v.clone();
        }
        if let Some(v) = self.open_live_app_id {
            cfg.bilibili.open_live.app_id = v;
        }
        if let Some(v) = &self.open_live_identity_code {
            cfg.bilibili.open_live.identity_code = v.clone();
        }

        if let Some(v) = &self.web_sessdata {
            cfg.bilibili.web.sessdata = v.clone();
        }
        if let Some(v) = self.web_room_id {
            cfg.bilibili.web.room_id = v;
        }

        if let Some(v) = &self.bilibili_mode {
            if let Some(mode) = PreferredMode::parse(v) {
                cfg.bilibili.mode = mode;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_bad_match_mode() {
        let delta = ConfigDelta {
            match_mode: Some("fuzzy".to_string()),
            ..Default::default()
        };
        assert!(delta.validate().unwrap_err().contains("match_mode"));
    }

    #[test]
    fn test_validate_rejects_zero_max_queue() {
        let delta = ConfigDelta {
            max_queue: Some(0),
            ..Default::default()
        };
        assert!(delta.validate().is_err());
    }

    #[test]
    fn test_apply_merges_only_set_fields() {
        let mut cfg = AppConfig::default();
        let delta = ConfigDelta {
            keyword: Some("join".to_string()),
            max_queue: Some(5),
            match_mode: Some("exact".to_string()),
            web_sessdata: Some("cookie".to_string()),
            web_room_id: Some(1234),
            ..Default::default()
        };
        delta.validate().unwrap();
        delta.apply(&mut cfg);

        assert_eq!(cfg.queue.keyword, "join");
        assert_eq!(cfg.queue.max_queue, 5);
        assert_eq!(cfg.queue.match_mode, MatchMode::Exact);
        assert_eq!(cfg.bilibili.web.room_id, 1234);
        // inchangé
        assert_eq!(cfg.server.port, 10000);
    }
}
