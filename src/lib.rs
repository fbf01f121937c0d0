//! Bill-splitting backend: groups record shared expenses and settlements,
//! and the balance engine folds them into per-currency net balances and a
//! simplified set of settling transfers.

pub mod auth;
pub mod balance;
pub mod config;
pub mod errors;
pub mod exchange;
pub mod handlers;
pub mod money;
pub mod notify;
pub mod schemas;
pub mod split;
pub mod store;
