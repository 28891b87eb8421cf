//! Scheduler d'auto-pause.
//!
//! Un déclencheur quotidien optionnel "HH:MM" est résolu en timestamp epoch du
//! prochain passage. Un ticker périodique vérifie ce déclencheur et bascule
//! `queue_paused` (raison "auto") quand l'heure est atteinte. Le déclencheur
//! est consommé au tir et réarmé au start, au changement de planning, ou à la
//! reprise manuelle. Toute erreur de tick est avalée et journalisée : la
//! boucle ne doit jamais mourir, sinon la file ne se mettrait plus jamais en
//! pause automatiquement.

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, TimeZone};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::controller::Controller;

/// Raison posée par une pause automatique.
pub const AUTO_PAUSE_REASON: &str = "auto";

/// Vérifie qu'une chaîne de planning est acceptable : vide (désactivé) ou
/// "HH:MM" valide.
pub fn is_valid_time(time_str: &str) -> bool {
    let t = time_str.trim();
    t.is_empty() || NaiveTime::parse_from_str(t, "%H:%M").is_ok()
}

/// Calcule le prochain passage du déclencheur "HH:MM" strictement après `now`
/// (epoch secondes). Si l'heure du jour est déjà passée, retourne l'occurrence
/// de demain. Chaîne vide ou invalide : scheduler désactivé (`None`).
pub fn compute_next(time_str: &str, now: DateTime<Local>) -> Option<i64> {
    let t = time_str.trim();
    if t.is_empty() {
        return None;
    }
    let target = NaiveTime::parse_from_str(t, "%H:%M").ok()?;

    let mut candidate = now.date_naive().and_time(target);
    if candidate <= now.naive_local() {
        candidate += ChronoDuration::days(1);
    }

    first_valid_instant(&Local, candidate).map(|dt| dt.timestamp())
}

/// Résout une heure locale en instant concret. Heure ambiguë (retour à l'heure
/// d'hiver) : première occurrence. Heure inexistante (saut d'heure d'été) :
/// premier instant valide après le trou, par pas de 30 minutes.
fn first_valid_instant<Tz: TimeZone>(tz: &Tz, candidate: NaiveDateTime) -> Option<DateTime<Tz>> {
    let mut attempt = candidate;
    for _ in 0..4 {
        if let Some(dt) = tz.from_local_datetime(&attempt).earliest() {
            return Some(dt);
        }
        attempt += ChronoDuration::minutes(30);
    }
    warn!(candidate = %candidate, "Could not resolve schedule time to a local instant");
    None
}

/// Boucle du ticker d'auto-pause. L'intervalle est relu à chaque tour pour
/// suivre les changements de configuration.
pub(crate) async fn auto_pause_loop(controller: Controller, token: CancellationToken) {
    loop {
        let interval = controller.pause_check_interval().await;
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {
                if let Err(e) = controller.auto_pause_tick().await {
                    warn!(error = %e, "Auto-pause tick failed");
                }
            }
        }
    }
    debug!("Auto-pause scheduler stopped");
}
