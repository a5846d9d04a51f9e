//! Live fan-out and notification delivery.
//!
//! - [`hub::PatientHub`] — in-process publish/subscribe keyed by patient,
//!   feeding whatever live transport the host process attaches.
//! - [`job::NotificationJob`] — one deliverable notification.
//! - [`senders`] — polymorphic delivery channels (web push, email, SMS).
//! - [`dispatcher::Dispatcher`] — template resolution, bounded retry with
//!   exponential backoff, dead-lettering on exhaustion.

pub mod dead_letter;
pub mod dispatcher;
pub mod hub;
pub mod job;
pub mod senders;
pub mod template;

pub use dead_letter::{DeadLetterSink, MemoryDeadLetterSink, NewDeadLetter, PgDeadLetterSink};
pub use dispatcher::{DispatchOutcome, DispatchPolicy, Dispatcher};
pub use hub::{PatientEvent, PatientHub};
pub use job::{ChannelType, NotificationJob, Priority};
pub use senders::{NotificationSender, SendError, SenderRegistry};
pub use template::{MemoryTemplateStore, PgTemplateStore, TemplateError, TemplateStore};
