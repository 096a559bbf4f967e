//! Category taxonomy sources.
//!
//! - `tsv`: the standard `category_id<TAB>category_text` format every index is built from
//! - `convert`: turns raw marketplace exports into that format

pub mod convert;
mod tsv;

pub use tsv::{parse_tsv, render_tsv, Category};
