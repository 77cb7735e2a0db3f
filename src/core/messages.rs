//! Read-only catalog of user-facing warnings and error texts.
//!
//! Call sites look messages up by `(component, operation, kind)` instead of
//! inlining the text, so every backend words the same situation the same way.

use std::collections::HashMap;

use once_cell::sync::Lazy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Wallet,
    Software,
    Trezor,
    Ledger,
    Metamask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Open,
    Sign,
    SignMessage,
    VerifyMessage,
    Detect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// The user declined on the device or in the provider popup.
    UserCancel,
    /// Anything else that went wrong talking to the vendor.
    GenericError,
    /// Ask the user to look at the device.
    ConfirmOnDevice,
    /// A signature could not be verified.
    SignatureInvalid,
    /// The injected provider is missing.
    NotAvailable,
    /// Contract deployments must carry input data.
    ContractDeployment,
    /// The caller forced a nonce the provider would normally pick.
    NonceOverride,
    /// Signatures only the same vendor can verify.
    ProprietarySignature,
}

pub type MessageKey = (Component, Operation, Kind);

static CATALOG: Lazy<HashMap<MessageKey, &'static str>> = Lazy::new(|| {
    use Component::*;
    use Kind::*;
    use Operation::*;

    HashMap::from([
        ((Wallet, VerifyMessage, SignatureInvalid), "Could not verify the message signature, treating it as invalid"),
        ((Software, Sign, GenericError), "Could not sign the transaction with the software signer"),
        ((Software, SignMessage, GenericError), "Could not sign the message with the software signer"),
        ((Trezor, Open, UserCancel), "User cancelled the account export request (via Window prompt)"),
        ((Trezor, Open, GenericError), "Could not export the wallet account, check the values you are sending to the Trezor service"),
        ((Trezor, Sign, UserCancel), "User cancelled signing the transaction (via Hardware buttons)"),
        ((Trezor, Sign, GenericError), "Could not sign the transaction, check the values you are sending to the Trezor service"),
        ((Trezor, Sign, ContractDeployment), "In order to sign a contract deployment transaction (Not having a destination address), the Trezor service requires the `inputData` prop value to be set"),
        ((Trezor, SignMessage, UserCancel), "User cancelled signing the message (via Hardware buttons)"),
        ((Trezor, SignMessage, GenericError), "Could not sign the message, check the values you are sending to the Trezor service"),
        ((Trezor, VerifyMessage, SignatureInvalid), "The message signature is invalid"),
        ((Trezor, VerifyMessage, ProprietarySignature), "Please take note: The message signature produced by a trezor wallet can only be verified using that trezor wallet (verifyMessage method)"),
        ((Ledger, Open, UserCancel), "User cancelled the account export request (via Ledger buttons)"),
        ((Ledger, Open, GenericError), "Could not export the wallet account from the Ledger device, make sure the Ethereum app is open"),
        ((Ledger, Sign, ConfirmOnDevice), "Please confirm the transaction on your Ledger device"),
        ((Ledger, Sign, UserCancel), "User cancelled signing the transaction (via Ledger buttons)"),
        ((Ledger, Sign, GenericError), "Could not sign the transaction, make sure the Ledger device is unlocked and the Ethereum app is open"),
        ((Ledger, SignMessage, ConfirmOnDevice), "Please confirm the message on your Ledger device"),
        ((Ledger, SignMessage, UserCancel), "User cancelled signing the message (via Ledger buttons)"),
        ((Ledger, SignMessage, GenericError), "Could not sign the message, make sure the Ledger device is unlocked and the Ethereum app is open"),
        ((Metamask, Detect, NotAvailable), "The Metamask in-page provider is not available. Make sure that the Metamask extension is installed and enabled in your browser"),
        ((Metamask, Open, NotAvailable), "Could not read the selected account from Metamask. Make sure Metamask is unlocked"),
        ((Metamask, Sign, UserCancel), "User cancelled signing the transaction (via Metamask)"),
        ((Metamask, Sign, GenericError), "Could not sign the transaction with Metamask"),
        ((Metamask, Sign, NonceOverride), "You are manually setting the nonce. Metamask usually manages it on its own, so this transaction may get stuck"),
        ((Metamask, SignMessage, UserCancel), "User cancelled signing the message (via Metamask)"),
        ((Metamask, SignMessage, GenericError), "Could not sign the message with Metamask"),
    ])
});

/// Looks up a catalog entry. Unknown keys fall back to a generic text so a
/// missing entry never hides the underlying failure.
pub fn message(component: Component, operation: Operation, kind: Kind) -> &'static str {
    CATALOG
        .get(&(component, operation, kind))
        .copied()
        .unwrap_or("An unexpected wallet error occurred")
}
