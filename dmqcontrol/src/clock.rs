//! Horloge injectable.
//!
//! Le scheduler d'auto-pause et l'horodatage des admissions passent par ce
//! trait, ce qui rend les tests déterministes (horloge figée).

use chrono::{DateTime, Local, Utc};

/// Source de temps du contrôleur.
pub trait Clock: Send + Sync {
    /// Heure murale locale, utilisée par le planning d'auto-pause.
    fn now_local(&self) -> DateTime<Local>;

    /// Heure UTC, utilisée pour `joined_at`.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Horloge système.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
