//! Hybrid retrieval over the legal corpus.

pub mod bm25;
pub mod hybrid;
pub mod service;
pub mod vector;

pub use service::{IndexSnapshot, RetrievalError, RetrievalService};
