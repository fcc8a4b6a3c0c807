//! # readme-rag core
//!
//! Runtime-free logic for readme-rag: data models, character chunking,
//! the vector index abstraction, index building, retrieval, token
//! splitting, and token-budgeted prompt composition.
//!
//! This crate contains no tokio, filesystem I/O, or network code. The
//! `readme-rag` app crate supplies repository sources, embedding
//! providers, and the generation backend.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod store;
pub mod tokens;

pub use error::PipelineError;
