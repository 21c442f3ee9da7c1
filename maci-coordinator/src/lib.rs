//! maci-coordinator
//!
//! Off-chain coordinator for MACI polls.
//!
//! Architecture:
//! 1. Scan the registry for polls whose voting period has ended
//! 2. Merge the on-chain queues and rebuild sign-ups and messages from events
//! 3. Process messages, prove each batch and submit it
//! 4. Tally ballots, prove the tally and publish results

pub mod config;
pub mod coordinator;
pub mod error;
pub mod ingest;
pub mod ledger;
pub mod pipeline;
pub mod redact;
pub mod retry;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, ScanReport, SkipReason};
pub use error::{CoordinatorError, LedgerError};
pub use ledger::{EvmLedger, Ledger, MessagePublishedEvent, PollAddresses, PollResults, SignUpEvent};
pub use pipeline::{PipelineSettings, PollOutcome, PollPipeline};
pub use retry::RetryPolicy;
