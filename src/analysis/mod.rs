//! Staged LLM analysis of extracted document text.
//!
//! ```text
//! document text ──▶ base analysis ──▶ field discovery ──▶ detailed analysis ──▶ count estimation
//!                   (truncated)       (per type)          (full text)            (full text)
//! ```
//!
//! 1. [`backend`]      — the `ChatBackend`/`ChatSession` seam plus the Ollama client
//! 2. [`parser`]       — JSON-vs-markdown reply decoding with fallback
//! 3. [`orchestrator`] — the sequential stage driver that assembles the record

pub mod backend;
pub mod orchestrator;
pub mod parser;
