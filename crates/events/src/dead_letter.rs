//! Dead-letter sink for undeliverable notifications.

use async_trait::async_trait;
use sqlx::PgPool;
use vitalflow_db::repositories::DeadLetterRepo;

#[derive(Debug, thiserror::Error)]
pub enum DeadLetterError {
    #[error("Failed to record dead letter: {0}")]
    Db(#[from] sqlx::Error),
}

/// Snapshot of a notification that exhausted delivery, or could never be
/// delivered due to a configuration error.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeadLetter {
    pub topic: String,
    pub receiver: String,
    pub subject: String,
    pub body: String,
    pub priority: String,
    pub error_message: String,
}

/// Where exhausted notifications go. Dead letters are never retried
/// automatically.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, letter: NewDeadLetter) -> Result<(), DeadLetterError>;
}

/// Postgres-backed sink writing to `dead_letter_messages`.
pub struct PgDeadLetterSink {
    pool: PgPool,
}

impl PgDeadLetterSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterSink for PgDeadLetterSink {
    async fn record(&self, letter: NewDeadLetter) -> Result<(), DeadLetterError> {
        let id = DeadLetterRepo::create(
            &self.pool,
            &letter.topic,
            &letter.receiver,
            &letter.subject,
            &letter.body,
            &letter.priority,
            &letter.error_message,
        )
        .await?;
        tracing::error!(
            dead_letter_id = id,
            topic = %letter.topic,
            receiver = %letter.receiver,
            error = %letter.error_message,
            "Notification dead-lettered"
        );
        Ok(())
    }
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct MemoryDeadLetterSink {
    letters: std::sync::Mutex<Vec<NewDeadLetter>>,
}

impl MemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn letters(&self) -> Vec<NewDeadLetter> {
        self.letters.lock().expect("sink lock poisoned").clone()
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetterSink {
    async fn record(&self, letter: NewDeadLetter) -> Result<(), DeadLetterError> {
        self.letters.lock().expect("sink lock poisoned").push(letter);
        Ok(())
    }
}
