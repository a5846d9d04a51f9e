//! Notification dispatch with bounded retry and dead-lettering.
//!
//! The dispatcher is the single place that knows the delivery policy:
//! template resolution, per-attempt timeouts, exponential backoff, and
//! what happens when a notification cannot be delivered. Senders stay
//! single-attempt; channels are added in the registry, not here.

use std::sync::Arc;
use std::time::Duration;

use crate::dead_letter::{DeadLetterError, DeadLetterSink, NewDeadLetter};
use crate::job::NotificationJob;
use crate::senders::SenderRegistry;
use crate::template::{TemplateError, TemplateStore};

/// Default number of retries after the initial attempt.
const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Default deadline for a single delivery attempt. An attempt that
/// exceeds it counts as a failed attempt.
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(20);

/// Retry policy for notification delivery.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// Retries after the initial attempt (so 3 means 4 attempts total).
    pub max_retry_attempts: u32,
    /// Deadline for each individual attempt.
    pub attempt_timeout: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// Terminal result of dispatching one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered on attempt `attempts` (1-based).
    Delivered { attempts: u32 },
    /// Exhausted retries or hit a configuration error; recorded as a
    /// dead letter.
    DeadLettered,
}

/// Errors that prevent the dispatcher from reaching a terminal outcome.
///
/// Delivery failures are not in here: those end in
/// [`DispatchOutcome::DeadLettered`]. These errors are transient
/// infrastructure failures; the caller should redeliver the job.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Template lookup failed: {0}")]
    Template(#[from] sqlx::Error),

    #[error(transparent)]
    DeadLetter(#[from] DeadLetterError),
}

/// Dispatches notification jobs to their channel senders.
pub struct Dispatcher {
    registry: SenderRegistry,
    templates: Arc<dyn TemplateStore>,
    dead_letters: Arc<dyn DeadLetterSink>,
    policy: DispatchPolicy,
    /// Topic label recorded on dead letters, for manual triage.
    topic: String,
}

impl Dispatcher {
    pub fn new(
        registry: SenderRegistry,
        templates: Arc<dyn TemplateStore>,
        dead_letters: Arc<dyn DeadLetterSink>,
        policy: DispatchPolicy,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            templates,
            dead_letters,
            policy,
            topic: topic.into(),
        }
    }

    /// Drive one job to a terminal outcome.
    ///
    /// Configuration errors (unknown template, missing required field,
    /// unregistered channel) dead-letter immediately: retrying cannot fix
    /// them. Delivery failures retry with exponential backoff (2s, 4s,
    /// 8s, ...) up to the policy limit, then dead-letter with the last
    /// error.
    pub async fn dispatch(&self, job: &NotificationJob) -> Result<DispatchOutcome, DispatchError> {
        let body = match self.resolve_body(job).await {
            Ok(body) => body,
            Err(TemplateError::Db(e)) => return Err(DispatchError::Template(e)),
            Err(e) => {
                // Unknown template or missing field: a config error.
                return self.dead_letter(job, &e.to_string()).await;
            }
        };

        let Some(sender) = self.registry.get(job.channel) else {
            let reason = format!("No sender registered for channel {}", job.channel);
            return self.dead_letter(job, &reason).await;
        };

        let total_attempts = 1 + self.policy.max_retry_attempts;
        let mut last_error = String::new();

        for attempt in 1..=total_attempts {
            let result = tokio::time::timeout(
                self.policy.attempt_timeout,
                sender.send(&job.recipient, &job.subject, &body),
            )
            .await;

            match result {
                Ok(Ok(())) => {
                    tracing::info!(
                        channel = %job.channel,
                        recipient = %job.recipient,
                        attempt,
                        "Notification delivered"
                    );
                    return Ok(DispatchOutcome::Delivered { attempts: attempt });
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!(
                        "Delivery attempt timed out after {:?}",
                        self.policy.attempt_timeout
                    );
                }
            }

            tracing::warn!(
                channel = %job.channel,
                recipient = %job.recipient,
                attempt,
                error = %last_error,
                "Notification delivery attempt failed"
            );

            if attempt < total_attempts {
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
            }
        }

        self.dead_letter(job, &last_error).await
    }

    /// Resolve the final body: the named template rendered with the
    /// job's params, or the job's own body when no template is requested.
    async fn resolve_body(&self, job: &NotificationJob) -> Result<String, TemplateError> {
        let Some(name) = &job.template_name else {
            return Ok(job.body.clone());
        };
        let template = self
            .templates
            .find_active(name, job.channel)
            .await?
            .ok_or_else(|| TemplateError::NotFound {
                name: name.clone(),
                channel: job.channel,
            })?;
        template.render(&job.template_params)
    }

    async fn dead_letter(
        &self,
        job: &NotificationJob,
        reason: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.dead_letters
            .record(NewDeadLetter {
                topic: self.topic.clone(),
                receiver: job.recipient.clone(),
                subject: job.subject.clone(),
                body: job.body.clone(),
                priority: job.priority.as_str().to_string(),
                error_message: reason.to_string(),
            })
            .await?;
        Ok(DispatchOutcome::DeadLettered)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ChannelType, Priority};
    use crate::senders::{NotificationSender, SendError};
    use crate::template::{MemoryTemplateStore, Template};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use crate::dead_letter::MemoryDeadLetterSink;

    /// Fails the first `failures` attempts, then succeeds.
    struct FlakySender {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakySender {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl NotificationSender for FlakySender {
        async fn send(&self, _: &str, _: &str, _: &str) -> Result<(), SendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(SendError::HttpStatus(503))
            } else {
                Ok(())
            }
        }
    }

    /// Never returns within any attempt deadline.
    struct StuckSender;

    #[async_trait]
    impl NotificationSender for StuckSender {
        async fn send(&self, _: &str, _: &str, _: &str) -> Result<(), SendError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn job(channel: ChannelType) -> NotificationJob {
        NotificationJob {
            channel,
            recipient: "oncall@clinic.example".to_string(),
            subject: "Pulse alert".to_string(),
            body: "Patient 7 pulse at 140".to_string(),
            priority: Priority::Critical,
            template_name: None,
            template_params: HashMap::new(),
        }
    }

    fn dispatcher(
        sender: Arc<dyn NotificationSender>,
        templates: MemoryTemplateStore,
    ) -> (Dispatcher, Arc<MemoryDeadLetterSink>) {
        let mut registry = SenderRegistry::new();
        registry.register(ChannelType::Email, sender);
        let sink = Arc::new(MemoryDeadLetterSink::new());
        let dispatcher = Dispatcher::new(
            registry,
            Arc::new(templates),
            sink.clone(),
            DispatchPolicy::default(),
            "alerts",
        );
        (dispatcher, sink)
    }

    #[tokio::test]
    async fn first_attempt_success_skips_retries() {
        let sender = Arc::new(FlakySender::new(0));
        let (dispatcher, sink) = dispatcher(sender.clone(), MemoryTemplateStore::new());

        let outcome = dispatcher.dispatch(&job(ChannelType::Email)).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered { attempts: 1 });
        assert_eq!(sender.calls.load(Ordering::SeqCst), 1);
        assert!(sink.letters().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_with_backoff() {
        let sender = Arc::new(FlakySender::new(2));
        let (dispatcher, sink) = dispatcher(sender.clone(), MemoryTemplateStore::new());

        let outcome = dispatcher.dispatch(&job(ChannelType::Email)).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered { attempts: 3 });
        assert_eq!(sender.calls.load(Ordering::SeqCst), 3);
        assert!(sink.letters().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_dead_letter_with_last_error() {
        let sender = Arc::new(FlakySender::new(u32::MAX));
        let (dispatcher, sink) = dispatcher(sender.clone(), MemoryTemplateStore::new());

        let start = tokio::time::Instant::now();
        let outcome = dispatcher.dispatch(&job(ChannelType::Email)).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::DeadLettered);
        // 1 initial attempt + 3 retries.
        assert_eq!(sender.calls.load(Ordering::SeqCst), 4);
        // Backoff of 2s, 4s and 8s before retries 2, 3 and 4; the attempts
        // themselves return instantly here.
        assert_eq!(start.elapsed(), Duration::from_secs(14));
        let letters = sink.letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].topic, "alerts");
        assert!(letters[0].error_message.contains("503"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_count_as_failures() {
        let (dispatcher, sink) = dispatcher(Arc::new(StuckSender), MemoryTemplateStore::new());

        let outcome = dispatcher.dispatch(&job(ChannelType::Email)).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::DeadLettered);
        assert!(sink.letters()[0].error_message.contains("timed out"));
    }

    #[tokio::test]
    async fn unregistered_channel_dead_letters_without_attempting() {
        let sender = Arc::new(FlakySender::new(0));
        let (dispatcher, sink) = dispatcher(sender.clone(), MemoryTemplateStore::new());

        let outcome = dispatcher.dispatch(&job(ChannelType::Sms)).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::DeadLettered);
        assert_eq!(sender.calls.load(Ordering::SeqCst), 0);
        assert!(sink.letters()[0].error_message.contains("sms"));
    }

    #[tokio::test]
    async fn unknown_template_dead_letters_immediately() {
        let sender = Arc::new(FlakySender::new(0));
        let (dispatcher, sink) = dispatcher(sender.clone(), MemoryTemplateStore::new());

        let mut job = job(ChannelType::Email);
        job.template_name = Some("missing-template".to_string());
        let outcome = dispatcher.dispatch(&job).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::DeadLettered);
        assert_eq!(sender.calls.load(Ordering::SeqCst), 0);
        assert!(sink.letters()[0].error_message.contains("missing-template"));
    }

    #[tokio::test]
    async fn rendered_template_body_is_what_gets_sent() {
        struct CapturingSender(std::sync::Mutex<Vec<String>>);

        #[async_trait]
        impl NotificationSender for CapturingSender {
            async fn send(&self, _: &str, _: &str, body: &str) -> Result<(), SendError> {
                self.0.lock().unwrap().push(body.to_string());
                Ok(())
            }
        }

        let mut templates = MemoryTemplateStore::new();
        templates.insert(
            "pulse-alert",
            ChannelType::Email,
            Template {
                body: "Patient {patient} needs attention".to_string(),
                required_fields: vec!["patient".to_string()],
            },
        );
        let sender = Arc::new(CapturingSender(std::sync::Mutex::new(Vec::new())));
        let (dispatcher, _sink) = dispatcher(sender.clone(), templates);

        let mut job = job(ChannelType::Email);
        job.template_name = Some("pulse-alert".to_string());
        job.template_params = HashMap::from([("patient".to_string(), "7".to_string())]);
        dispatcher.dispatch(&job).await.unwrap();

        assert_eq!(
            sender.0.lock().unwrap().as_slice(),
            ["Patient 7 needs attention"]
        );
    }
}
