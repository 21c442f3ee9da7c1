use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("leaf index {index} is outside a tree of capacity {capacity}")]
    IndexOutOfRange { index: u64, capacity: u64 },

    #[error("leaf {index} has not been inserted yet")]
    LeafNotInserted { index: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("{count} signups plus the blank leaf exceed state tree capacity {capacity}")]
    TooManySignUps { count: u64, capacity: u64 },

    #[error("{count} messages (padded to whole batches) exceed message tree capacity {capacity}")]
    TooManyMessages { count: u64, capacity: u64 },

    #[error("max vote options {max} exceeds vote option tree capacity {capacity}")]
    TooManyVoteOptions { max: u64, capacity: u64 },

    #[error("message index {0} appears more than once")]
    DuplicateMessageIndex(u64),

    #[error("batch size must be positive")]
    ZeroBatchSize,

    #[error("tally batch size {0} must be a power of five within the ballot tree")]
    InvalidTallyBatchSize(usize),
}
