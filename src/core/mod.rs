//! Card state protocol
//!
//! Leaf modules first: card interface and layout, keys and access bits,
//! value counters, then the ledger, game and provisioning logic built on
//! a [`session::CardSession`].

pub mod access;
pub mod audit;
pub mod card;
pub mod config;
pub mod error;
pub mod game;
pub mod keys;
pub mod layout;
pub mod ledger;
pub mod memory;
pub mod provision;
pub mod session;
pub mod status;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;
