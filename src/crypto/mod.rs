pub mod derivation;
pub mod signature_utils;
