//! Transaction submission module with nonce sequencing and fee estimation

mod fees;
mod gas;
mod nonce;
mod sender;

pub use fees::FeeFields;
pub use sender::{Attempt, SubmissionReceipt, TransactionSender};

#[cfg(test)]
pub(crate) use sender::tests as sender_fixtures;
