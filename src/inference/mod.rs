mod client;
mod parse;

pub use client::{Classifier, ClassifyError, InferenceClient, InferenceSettings};
pub use parse::parse_result;
