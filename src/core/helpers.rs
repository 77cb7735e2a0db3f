//! Composite validation over whole argument objects, plus the glue every
//! backend shares (warnings, message-or-data selection, signature assembly).

use serde_json::Value;
use tracing::warn;

use super::big_number::BigNumber;
use super::defaults::HEX_PREFIX;
use super::errors::WalletError;
use super::messages::{message, Component, Kind, Operation};
use super::normalizers::{address_normalizer, hex_sequence_normalizer, recovery_param_normalizer};
use super::types::{
    SignMessageArgs, SignTransactionRequest, SignerIdentity, TransactionObject, VerifyMessageArgs,
};
use super::validators::{
    address_validator, big_number_validator, hex_sequence_validator, message_data_validator,
    safe_integer_validator,
};

/// Required and optional fields of one operation's argument object.
#[derive(Debug, Clone, Copy)]
pub struct FieldSet {
    /// Every one of these must be present.
    pub required_all: &'static [&'static str],
    /// At least one of these must be present (ignored when empty).
    pub required_either: &'static [&'static str],
    /// Validated only when present.
    pub optional: &'static [&'static str],
}

pub const SIGN_TRANSACTION: FieldSet = FieldSet {
    required_all: &["gasPrice", "gasLimit"],
    required_either: &["to", "inputData"],
    optional: &["nonce", "chainId", "value"],
};

pub const SIGN_MESSAGE: FieldSet = FieldSet {
    required_all: &[],
    required_either: &["message", "messageData"],
    optional: &[],
};

pub const VERIFY_MESSAGE: FieldSet = FieldSet {
    required_all: &["message", "signature", "address"],
    required_either: &[],
    optional: &[],
};

/// Argument objects the composite validator can walk field by field.
pub trait ArgumentObject {
    fn has_field(&self, field: &str) -> bool;

    /// Applies the leaf validator matching `field`. Only called for present fields.
    fn validate_field(&self, field: &str) -> Result<(), WalletError>;
}

/// Checks presence of every required field and runs the leaf validator of
/// each present field, stopping at the first failure.
pub fn user_input_validator<A: ArgumentObject>(args: &A, fields: &FieldSet) -> Result<(), WalletError> {
    for &field in fields.required_all {
        if !args.has_field(field) {
            return Err(WalletError::validation(field, "is required"));
        }
    }
    if !fields.required_either.is_empty()
        && !fields.required_either.iter().any(|field| args.has_field(field))
    {
        return Err(WalletError::validation(
            fields.required_either[0],
            format!("one of {:?} is required", fields.required_either),
        ));
    }
    let present = fields
        .required_all
        .iter()
        .chain(fields.required_either)
        .chain(fields.optional)
        .filter(|field| args.has_field(field));
    for field in present {
        args.validate_field(field)?;
    }
    Ok(())
}

impl ArgumentObject for TransactionObject {
    fn has_field(&self, field: &str) -> bool {
        match field {
            "chainId" => self.chain_id.is_some(),
            "gasPrice" => self.gas_price.is_some(),
            "gasLimit" => self.gas_limit.is_some(),
            "nonce" => self.nonce.is_some(),
            "to" => self.to.is_some(),
            "value" => self.value.is_some(),
            "inputData" => self.input_data.is_some(),
            _ => false,
        }
    }

    fn validate_field(&self, field: &str) -> Result<(), WalletError> {
        let big_number = |value: &Option<BigNumber>| match value {
            Some(value) => big_number_validator(value),
            None => Ok(()),
        };
        match field {
            "chainId" => self.chain_id.map_or(Ok(()), safe_integer_validator),
            "nonce" => self.nonce.map_or(Ok(()), safe_integer_validator),
            "gasPrice" => big_number(&self.gas_price),
            "gasLimit" => big_number(&self.gas_limit),
            "value" => big_number(&self.value),
            "to" => self.to.as_deref().map_or(Ok(()), address_validator),
            "inputData" => self.input_data.as_deref().map_or(Ok(()), hex_sequence_validator),
            _ => Ok(()),
        }
    }
}

impl ArgumentObject for SignMessageArgs {
    fn has_field(&self, field: &str) -> bool {
        match field {
            "message" => self.message.is_some(),
            "messageData" => self.message_data.is_some(),
            _ => false,
        }
    }

    fn validate_field(&self, field: &str) -> Result<(), WalletError> {
        // Any string is signable, the empty one included, so `message` has no check.
        match field {
            "messageData" => self.message_data.as_deref().map_or(Ok(()), message_data_validator),
            _ => Ok(()),
        }
    }
}

impl ArgumentObject for VerifyMessageArgs {
    fn has_field(&self, field: &str) -> bool {
        match field {
            "message" => true,
            "signature" => !self.signature.is_empty(),
            "address" => self.address.is_some(),
            _ => false,
        }
    }

    fn validate_field(&self, field: &str) -> Result<(), WalletError> {
        match field {
            "signature" => hex_sequence_validator(&self.signature),
            "address" => self.address.as_deref().map_or(Ok(()), address_validator),
            _ => Ok(()),
        }
    }
}

/// Validates a transaction object. Contract deployments (no `to`) must carry
/// non-empty input data.
pub fn transaction_object_validator(tx: &TransactionObject) -> Result<(), WalletError> {
    user_input_validator(tx, &SIGN_TRANSACTION)?;
    if tx.to.is_none() {
        let data = tx.input_data.as_deref().map(|data| hex_sequence_normalizer(data, false));
        if data.map_or(true, |data| data.is_empty()) {
            return Err(WalletError::validation(
                "inputData",
                "contract deployments (no `to`) need input data",
            ));
        }
    }
    Ok(())
}

/// Validates `message` / `messageData` and returns the bytes to sign.
/// `message` wins when both are set.
pub fn message_or_data_validator(args: &SignMessageArgs) -> Result<Vec<u8>, WalletError> {
    user_input_validator(args, &SIGN_MESSAGE)?;
    match (&args.message, &args.message_data) {
        (Some(message), _) => Ok(message.as_bytes().to_vec()),
        (None, Some(data)) => Ok(data.clone()),
        (None, None) => Err(WalletError::validation("message", "is required")),
    }
}

/// Validates a verification object (address already resolved by the wallet).
pub fn message_verification_object_validator(args: &VerifyMessageArgs) -> Result<(), WalletError> {
    user_input_validator(args, &VERIFY_MESSAGE)
}

/// Builds the canonical request a backend receives.
pub fn transaction_request(
    tx: &TransactionObject,
    chain_id: u64,
    identity: SignerIdentity,
) -> SignTransactionRequest {
    SignTransactionRequest {
        identity,
        chain_id,
        gas_price: tx.gas_price.unwrap_or_default(),
        gas_limit: tx.gas_limit.unwrap_or_default(),
        nonce: tx.nonce,
        to: tx.to.as_deref().map(|to| address_normalizer(to, true)),
        value: tx.value.unwrap_or_default(),
        input_data: hex_sequence_normalizer(tx.input_data.as_deref().unwrap_or(HEX_PREFIX), true),
    }
}

/// Joins vendor `{r, s, v}` components into one prefixed `r || s || v` hex
/// string. `v` arrives loosely typed and goes through the recovery param
/// normalizer first.
pub fn join_signature(r: &str, s: &str, v: &Value) -> Result<String, WalletError> {
    hex_sequence_validator(r)?;
    hex_sequence_validator(s)?;
    let (r, s) = (hex_sequence_normalizer(r, false), hex_sequence_normalizer(s, false));
    for (field, component) in [("r", &r), ("s", &s)] {
        if component.len() > 64 {
            return Err(WalletError::validation(
                "signature",
                format!("`{}` is {} hex digits, more than 32 bytes", field, component.len()),
            ));
        }
    }
    let v = recovery_param_normalizer(v)?;
    let v = u8::try_from(v)
        .map_err(|_| WalletError::validation("signature", format!("`v` {} does not fit one byte", v)))?;
    Ok(hex_sequence_normalizer(&format!("{:0>64}{:0>64}{:02x}", r, s, v), true))
}

/// Emits one catalog warning.
pub fn warning(component: Component, operation: Operation, kind: Kind, detail: &str) {
    warn!(
        component = ?component,
        operation = ?operation,
        detail,
        "{}",
        message(component, operation, kind)
    );
}

/// Warning for a translated vendor failure. Skipped for verification, whose
/// failures the wallet reports itself as a single warning.
pub fn failure_warning(component: Component, operation: Operation, kind: Kind, detail: &str) {
    if operation != Operation::VerifyMessage {
        warning(component, operation, kind, detail);
    }
}
