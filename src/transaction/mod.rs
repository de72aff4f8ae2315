//! VeChain transactions: encoding, fee delegation and broadcast

pub mod body;
mod broadcast;
mod delegation;
mod pipeline;

#[cfg(test)]
pub(crate) mod mock_server;

pub use body::{Clause, Reserved, SignedTransaction, TransactionBody, FEATURE_DELEGATION};
pub use broadcast::TransactionBroadcaster;
pub use delegation::{sign_as_sponsor, DelegationRequest, SponsorClient, SponsorResponse};
pub use pipeline::{DelegationOption, TransactionPipeline};
