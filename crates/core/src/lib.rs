//! Core types and traits for the regulation navigator
//!
//! This crate provides foundational types used across all other crates:
//! - Regulation identifiers and EUR-Lex references
//! - Passages with structural metadata and breadcrumbs
//! - Retrieval results, confidence tiers and query plans
//! - Seam traits for encoders, text extraction and answer generation
//! - Error types

pub mod error;
pub mod passage;
pub mod plan;
pub mod retrieval;
pub mod source;
pub mod traits;

pub use error::{Error, Result};
pub use passage::{Passage, PassageKind, Structure};
pub use plan::{ChatMessage, ChatRole, QueryContext, QueryIntent, QueryPlan, RegulationFocus};
pub use retrieval::{Confidence, RetrievedPassage};
pub use source::SourceId;
pub use traits::{AnswerGenerator, Encoder, EncoderKind, GenerationRequest, TextExtractor};
