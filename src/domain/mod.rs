pub mod candidate;
pub mod fingerprint;
pub mod track;
