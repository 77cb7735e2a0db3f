//! Trezor helpers: popup window options and vendor failure translation.

use serde_json::Value;
use thiserror::Error;

use crate::core::defaults::trezor::{FAILURE_ACTION_CANCELLED, FAILURE_PIN_CANCELLED};
use crate::core::errors::{Vendor, WalletError};
use crate::core::helpers::failure_warning;
use crate::core::messages::{message, Component, Kind, Operation};

/// Failure reported by the Trezor service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Trezor failure{}: {message}", .code.map(|c| format!(" ({})", c)).unwrap_or_default())]
pub struct TrezorFailure {
    /// `Failure.code` from the device, when there is one.
    pub code: Option<u32>,
    pub message: String,
}

impl TrezorFailure {
    pub fn new(code: Option<u32>, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self.code, Some(FAILURE_ACTION_CANCELLED) | Some(FAILURE_PIN_CANCELLED))
    }
}

/// Turns a service failure into a wallet error, warning on user cancellation.
pub fn translate_failure(operation: Operation, failure: TrezorFailure) -> WalletError {
    if failure.is_cancellation() {
        failure_warning(Component::Trezor, operation, Kind::UserCancel, &failure.message);
        WalletError::VendorCancellation(message(Component::Trezor, operation, Kind::UserCancel).to_string())
    } else {
        failure_warning(Component::Trezor, operation, Kind::GenericError, &failure.message);
        WalletError::transport(Vendor::Trezor, failure)
    }
}

/// Serializes popup window features as `key=value,` pairs. Booleans render
/// as `yes`/`no`, strings unquoted.
pub fn window_features_serializer(features: &[(&str, Value)]) -> String {
    features
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::Bool(true) => "yes".to_string(),
                Value::Bool(false) => "no".to_string(),
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            format!("{}={},", key, rendered)
        })
        .collect()
}
