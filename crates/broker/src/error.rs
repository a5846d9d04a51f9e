use crate::codec::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Returned by topic creation when the topic exists. Startup treats
    /// this as success.
    #[error("Topic already exists: {0}")]
    TopicExists(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Topic {0} must have at least one partition")]
    InvalidPartitionCount(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
