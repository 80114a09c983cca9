//! License model, key codec, and signature verification.

pub mod key;
pub mod model;
