//! Alerting: SOS escalation and notification delivery.

mod escalation;
mod notifier;
mod queue;

pub use escalation::{sos_message, Diagnosis, EscalationEvaluator, SosOutcome, NO_RESPONDER_MESSAGE};
pub use notifier::{
    Delivery, LogNotifier, Notifier, NotifyError, RecordingNotifier, TelegramConfig,
    TelegramNotifier,
};
pub use queue::{Notification, NotificationQueue, QueueConfig, QueueSnapshot, QueueWorkers};
