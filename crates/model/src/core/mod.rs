pub mod fingerprint;
pub mod value;
