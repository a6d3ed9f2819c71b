//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Check cross-entity invariants (existence, cycles, block matching) that
//!   single repositories cannot see.

pub mod book_service;
pub mod instance_service;
pub mod manuscript_service;
pub mod note_service;
pub mod schema_service;
pub mod user_doc_service;
