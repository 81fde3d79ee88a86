//! # legal-assistant
//!
//! A conversational legal-assistant backend. Questions are answered from a
//! corpus of legal documents through a hybrid retrieval pipeline, and every
//! exchange is stored per user and conversation.
//!
//! ## Architecture
//!
//! ```text
//!                      ┌──────────────────────┐
//!                      │  Question + history  │
//!                      └──────────┬───────────┘
//!                                 │
//!                    ┌────────────┴────────────┐
//!                    ▼                         ▼
//!           ┌────────────────┐       ┌─────────────────┐
//!           │  Dense search  │       │   BM25 search   │
//!           │ cosine, top k  │       │ tantivy, top k  │
//!           └───────┬────────┘       └────────┬────────┘
//!                   │ weight 0.4              │ weight 0.6
//!                   └────────────┬────────────┘
//!                                ▼
//!                  ┌───────────────────────────┐
//!                  │   Weighted RRF (k = 60)   │
//!                  │   ties broken by chunk id │
//!                  └─────────────┬─────────────┘
//!                                │
//!                                ▼
//!                  ┌───────────────────────────┐
//!                  │  Optional rerank          │
//!                  │  Nano: in-process lexical │
//!                  │  Small/Medium/Large:      │
//!                  │  cross-encoder sidecar    │
//!                  └─────────────┬─────────────┘
//!                                │
//!                                ▼
//!                  ┌───────────────────────────┐
//!                  │  Localized prompt + LLM   │
//!                  │  French / English / عربي  │
//!                  └─────────────┬─────────────┘
//!                                │
//!                                ▼
//!                  ┌───────────────────────────┐
//!                  │  Answer stored as the     │
//!                  │  assistant's message      │
//!                  └───────────────────────────┘
//! ```
//!
//! Both indexes are built from one chunk sequence and published together as
//! an [`search::IndexSnapshot`]. The dense index is persisted and reused
//! only while its corpus fingerprint matches.
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration
//! - [`models`] - Shared data types and request/response bodies
//! - [`ingest`] - Document loading (PDF, text, markdown) and recursive chunking
//! - [`search::bm25`] - BM25 keyword index powered by tantivy
//! - [`search::vector`] - Dense index with cosine similarity and disk persistence
//! - [`search::hybrid`] - Weighted Reciprocal Rank Fusion
//! - [`search::service`] - Snapshot building, refresh and retrieval
//! - [`llm::embeddings`] - Embeddings via Ollama or OpenAI-compatible APIs
//! - [`llm::prompt`] - Per-language prompt templates
//! - [`llm::generate`] - Answer generation with bounded retries
//! - [`llm::rerank`] - Tiered reranking
//! - [`db`] - SQLite store for users, tokens, conversations and messages
//! - [`auth`] - Password hashing and token authentication
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod search;
pub mod state;
