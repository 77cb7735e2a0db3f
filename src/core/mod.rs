pub mod big_number;
pub mod config;
pub mod defaults;
pub mod errors;
pub mod helpers;
pub mod lazy;
pub mod messages;
pub mod normalizers;
pub mod transaction;
pub mod types;
pub mod validators;

pub use big_number::BigNumber;
pub use lazy::LazyField;
