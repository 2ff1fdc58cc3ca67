pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use store::{InsertOutcome, TransactionStore};
pub use types::{HiddenChat, NewTransaction, ParsingLogEntry, ProcessingTask, Transaction};
