// src/identity/mod.rs

pub mod detect;
pub mod extract;

pub use detect::{detect_identity_column, score_header, score_values, ColumnScore};
pub use extract::{
    best_token, contains_identity_shape, extract_identity, first_line, is_acceptable, is_canonical,
};
