//! # dmqcontrol — cœur concurrent de DMQueue
//!
//! Une session de file d'attente pilotée par le chat : les spectateurs tapent
//! un mot-clé, sont admis dans la liste d'attente, et l'overlay affiche le
//! participant courant et les suivants. Cette crate est le contrôleur
//! concurrent de cette session :
//!
//! - [`queue::QueueState`] : la liste d'admission ordonnée (current + waiting)
//! - [`events`] : le pipeline d'ingestion borné (FIFO, backpressure) et la
//!   règle d'admission ([`events::AdmitReason`])
//! - [`controller::Controller`] : la machine à états du cycle de vie
//!   (start/stop/restart), propriétaire de l'unique verrou de mutation
//! - [`scheduler`] : l'auto-pause quotidienne
//! - [`hub::BroadcastHub`] : le fan-out best-effort des instantanés
//!
//! La couche HTTP/WS, la persistance YAML et le client de protocole chat sont
//! des collaborateurs externes : voir `dmqconfig` et `dmqclient`.

pub mod clock;
pub mod controller;
pub mod errors;
pub mod events;
pub mod hub;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod snapshot;

pub use clock::{Clock, SystemClock};
pub use controller::Controller;
pub use errors::{ControlError, Result};
pub use events::{AdmitReason, EVENT_QUEUE_CAPACITY};
pub use hub::{BroadcastHub, ChannelSink, StateSink};
pub use queue::{QueueItem, QueueState};
pub use runtime::{DanmakuStatus, RuntimeState, RuntimeStatus};
pub use snapshot::StatePayload;
