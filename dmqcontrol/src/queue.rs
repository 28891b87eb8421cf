//! État de la file d'attente.
//!
//! Position 0 = `current` (en cours), 1..n = `waiting`. `max_queue` limite le
//! total (current + waiting). Toutes les opérations sont synchrones et ne
//! sont appelées que sous le verrou du contrôleur : `enqueue` fait ses
//! vérifications (doublon, capacité) avant tout append, ce qui rend la
//! discipline de verrouillage extérieure suffisante.

use serde::Serialize;

use crate::events::AdmitReason;

/// Un participant admis dans la file.
#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    /// open_id / uid, ou repli sur `uname`. Identité : unique dans la file.
    pub user_key: String,
    pub uname: String,
    pub marked: bool,
    /// RFC 3339, UTC.
    pub joined_at: String,
}

/// current + waiting.
#[derive(Debug, Default)]
pub struct QueueState {
    pub current: Option<QueueItem>,
    pub waiting: Vec<QueueItem>,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_len(&self) -> usize {
        usize::from(self.current.is_some()) + self.waiting.len()
    }

    pub fn has_user(&self, user_key: &str) -> bool {
        if let Some(cur) = &self.current {
            if cur.user_key == user_key {
                return true;
            }
        }
        self.waiting.iter().any(|it| it.user_key == user_key)
    }

    /// Tente une admission. Aucune mutation sauf si le résultat est `Ok`.
    ///
    /// - `duplicate` : `user_key` déjà présent (no-op)
    /// - `full` : total >= `max_queue` (no-op)
    /// - `ok` : devient `current` si la file est vide, sinon rejoint la queue
    pub fn enqueue(
        &mut self,
        user_key: &str,
        uname: &str,
        max_queue: usize,
        joined_at: String,
    ) -> AdmitReason {
        if self.has_user(user_key) {
            return AdmitReason::Duplicate;
        }
        if self.total_len() >= max_queue {
            return AdmitReason::Full;
        }

        let item = QueueItem {
            user_key: user_key.to_string(),
            uname: uname.to_string(),
            marked: false,
            joined_at,
        };
        if self.current.is_none() {
            self.current = Some(item);
        } else {
            self.waiting.push(item);
        }
        AdmitReason::Ok
    }

    /// Retire un participant. Si c'était `current`, la tête de `waiting` est
    /// promue (FIFO). Retourne `false` si l'identité est inconnue.
    pub fn remove(&mut self, user_key: &str) -> bool {
        if let Some(cur) = &self.current {
            if cur.user_key == user_key {
                self.current = if self.waiting.is_empty() {
                    None
                } else {
                    Some(self.waiting.remove(0))
                };
                return true;
            }
        }

        if let Some(idx) = self.waiting.iter().position(|it| it.user_key == user_key) {
            self.waiting.remove(idx);
            return true;
        }
        false
    }

    /// Remonte un participant en tête de `waiting`. `current` n'est jamais
    /// touché : `false` si l'identité est `current` ou inconnue.
    pub fn pin_top(&mut self, user_key: &str) -> bool {
        if let Some(cur) = &self.current {
            if cur.user_key == user_key {
                return false;
            }
        }
        match self.waiting.iter().position(|it| it.user_key == user_key) {
            Some(idx) => {
                let item = self.waiting.remove(idx);
                self.waiting.insert(0, item);
                true
            }
            None => false,
        }
    }

    /// Pose ou retire la marque sur l'entrée correspondante.
    pub fn set_marked(&mut self, user_key: &str, marked: bool) -> bool {
        if let Some(cur) = &mut self.current {
            if cur.user_key == user_key {
                cur.marked = marked;
                return true;
            }
        }
        for it in &mut self.waiting {
            if it.user_key == user_key {
                it.marked = marked;
                return true;
            }
        }
        false
    }

    /// Liste ordonnée : current (si présent) puis waiting.
    pub fn items(&self) -> Vec<QueueItem> {
        let mut out = Vec::with_capacity(self.total_len());
        if let Some(cur) = &self.current {
            out.push(cur.clone());
        }
        out.extend(self.waiting.iter().cloned());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enqueue(q: &mut QueueState, key: &str, max: usize) -> AdmitReason {
        q.enqueue(key, key, max, "2026-01-01T00:00:00Z".to_string())
    }

    #[test]
    fn test_first_enqueue_becomes_current() {
        let mut q = QueueState::new();
        assert_eq!(enqueue(&mut q, "a", 10), AdmitReason::Ok);
        assert_eq!(q.current.as_ref().unwrap().user_key, "a");
        assert!(q.waiting.is_empty());
    }

    #[test]
    fn test_duplicate_is_a_noop() {
        let mut q = QueueState::new();
        enqueue(&mut q, "a", 10);
        enqueue(&mut q, "b", 10);
        assert_eq!(enqueue(&mut q, "a", 10), AdmitReason::Duplicate);
        assert_eq!(enqueue(&mut q, "b", 10), AdmitReason::Duplicate);
        assert_eq!(q.total_len(), 2);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut q = QueueState::new();
        let mut admitted = 0;
        for i in 0..20 {
            if enqueue(&mut q, &format!("u{}", i), 5) == AdmitReason::Ok {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
        assert_eq!(q.total_len(), 5);
        assert_eq!(enqueue(&mut q, "late", 5), AdmitReason::Full);
    }

    #[test]
    fn test_remove_current_promotes_fifo() {
        let mut q = QueueState::new();
        for k in ["a", "b", "c", "d"] {
            enqueue(&mut q, k, 10);
        }
        assert!(q.remove("a"));
        assert_eq!(q.current.as_ref().unwrap().user_key, "b");
        let rest: Vec<_> = q.waiting.iter().map(|it| it.user_key.as_str()).collect();
        assert_eq!(rest, vec!["c", "d"]);
    }

    #[test]
    fn test_remove_waiting_preserves_order() {
        let mut q = QueueState::new();
        for k in ["a", "b", "c", "d"] {
            enqueue(&mut q, k, 10);
        }
        assert!(q.remove("c"));
        assert_eq!(q.current.as_ref().unwrap().user_key, "a");
        let rest: Vec<_> = q.waiting.iter().map(|it| it.user_key.as_str()).collect();
        assert_eq!(rest, vec!["b", "d"]);
        assert!(!q.remove("zz"));
    }

    #[test]
    fn test_remove_last_empties_queue() {
        let mut q = QueueState::new();
        enqueue(&mut q, "a", 10);
        assert!(q.remove("a"));
        assert!(q.current.is_none());
        assert_eq!(q.total_len(), 0);
    }

    #[test]
    fn test_pin_top_moves_within_waiting_only() {
        let mut q = QueueState::new();
        for k in ["a", "b", "c", "d"] {
            enqueue(&mut q, k, 10);
        }
        // current n'est jamais déplacé
        assert!(!q.pin_top("a"));
        assert!(q.pin_top("d"));
        let rest: Vec<_> = q.waiting.iter().map(|it| it.user_key.as_str()).collect();
        assert_eq!(rest, vec!["d", "b", "c"]);
        assert!(!q.pin_top("unknown"));
    }

    #[test]
    fn test_set_marked_on_current_and_waiting() {
        let mut q = QueueState::new();
        enqueue(&mut q, "a", 10);
        enqueue(&mut q, "b", 10);
        assert!(q.set_marked("a", true));
        assert!(q.current.as_ref().unwrap().marked);
        assert!(q.set_marked("b", true));
        assert!(q.waiting[0].marked);
        assert!(q.set_marked("b", false));
        assert!(!q.waiting[0].marked);
        assert!(!q.set_marked("zz", true));
    }

    #[test]
    fn test_items_order() {
        let mut q = QueueState::new();
        for k in ["a", "b", "c"] {
            enqueue(&mut q, k, 10);
        }
        let keys: Vec<_> = q.items().into_iter().map(|it| it.user_key).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
