//! Type-tagged Ethereum wallet abstraction.
//!
//! A [`GenericWallet`] exposes lazily resolved identity fields and the
//! `sign` / `sign_message` / `verify_message` operations, delegating the
//! device specific work to a [`WalletBackend`]: a local key, a Trezor, a
//! Ledger, or an injected Metamask provider.

pub mod core;
pub mod crypto;
pub mod hardware;
pub mod injected;
pub mod logging;
pub mod software;
pub mod wallet;

pub use crate::core::config::WalletConfig;
pub use crate::core::errors::{Vendor, WalletError};
pub use crate::core::types::{
    SignMessageArgs, TransactionObject, VerifyMessageArgs, WalletSubtype, WalletType,
};
pub use crate::wallet::{GenericWallet, HardwareOptions, WalletBackend};
