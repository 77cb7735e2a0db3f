use thiserror::Error;

/// Which vendor backend produced a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Trezor,
    Ledger,
    Metamask,
    Software,
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Vendor::Trezor => "Trezor",
            Vendor::Ledger => "Ledger",
            Vendor::Metamask => "Metamask",
            Vendor::Software => "Software",
        };
        f.write_str(name)
    }
}

/// Custom error type for wallet operations.
#[derive(Debug, Error)]
pub enum WalletError {
    /// A field is missing or malformed. Raised before any vendor I/O.
    #[error("Validation error on `{field}`: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Hex sequence or derivation path grammar could not be canonicalized.
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// A loosely typed vendor value did not have the expected type.
    #[error("Type mismatch on `{field}`: expected {expected}")]
    TypeMismatch { field: &'static str, expected: &'static str },

    /// The user declined the request on the device or in the injected provider.
    #[error("Cancelled by user: {0}")]
    VendorCancellation(String),

    /// Communication with the vendor failed. The underlying cause is kept.
    #[error("{vendor} transport error: {source}")]
    VendorTransport {
        vendor: Vendor,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The injected provider global is not installed.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Signing key or signature material is unusable.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WalletError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation { field, reason: reason.into() }
    }

    pub fn transport(
        vendor: Vendor,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::VendorTransport { vendor, source: source.into() }
    }

    /// Raised synchronously by the validation pipeline (validators and normalizers).
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            WalletError::Validation { .. }
                | WalletError::Normalization(_)
                | WalletError::TypeMismatch { .. }
        )
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, WalletError::VendorCancellation(_))
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::Normalization(err.to_string())
    }
}

impl From<hex::FromHexError> for WalletError {
    fn from(err: hex::FromHexError) -> Self {
        WalletError::Normalization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_validation_error() {
        let err = WalletError::validation("gasPrice", "missing");
        assert_eq!(format!("{}", err), "Validation error on `gasPrice`: missing");
        assert!(err.is_input_error());
    }

    #[test]
    fn test_transport_keeps_source() {
        use std::error::Error as _;

        let err = WalletError::transport(Vendor::Ledger, anyhow::anyhow!("HID write failed"));
        assert_eq!(format!("{}", err), "Ledger transport error: HID write failed");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("HID write failed"));
        assert!(!err.is_cancellation());
    }

    #[test]
    fn test_from_hex_error() {
        let hex_err = hex::decode("zz").unwrap_err();
        let wallet_err: WalletError = hex_err.into();
        assert!(matches!(wallet_err, WalletError::Normalization(_)));
    }
}
