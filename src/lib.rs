//! # readme-rag
//!
//! Keeps a repository's README in step with its pull requests by
//! retrieval-augmented generation.
//!
//! For one pull request, readme-rag snapshots the repository into a scratch
//! session, chunks and embeds it into a per-run index, composes a
//! token-budgeted prompt from the diff, commit messages and current README,
//! and asks a language model for the updated README, optionally opening a
//! pull request with the result.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ GitHub repo  │──▶│   Scratch    │──▶│ Chunk+Embed  │──▶│  In-memory  │
//! │ tree/content │   │   session    │   │              │   │    index    │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────┬──────┘
//!                                                                  │ top-k
//!   diff + commits + README ──▶ Prompt composer ──▶ Generation ◀──┘
//!                                                   client ──▶ PR (optional)
//! ```
//!
//! The runtime-free pieces (chunking, index, retrieval, prompt) live in
//! `readme-rag-core`; this crate supplies the I/O.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and secrets |
//! | [`traits`] | Repository source, publisher and generation backend traits |
//! | [`connector_github`] | GitHub REST implementation of the source and publisher |
//! | [`fetch`] | Content fetcher with error sentinels |
//! | [`scratch`] | Scratch sessions and the snapshot materializer |
//! | [`embedding`] | OpenAI and Ollama embedding providers |
//! | [`generate`] | Generation client and OpenAI chat backend |
//! | [`publish`] | README pull-request publication |
//! | [`pipeline`] | Per-request orchestration |
//! | [`server`] | HTTP server |
//! | [`commands`] | CLI command implementations |

pub mod commands;
pub mod config;
pub mod connector_github;
pub mod embedding;
pub mod fetch;
pub mod generate;
pub mod pipeline;
pub mod publish;
pub mod scratch;
pub mod server;
pub mod traits;

pub use readme_rag_core::{chunk, models, prompt, retrieve, store, tokens};
