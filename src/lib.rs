//! Cardbox - AI-assisted flashcard generation and management
//!
//! Paste study material, let a language model propose flashcards, review
//! them, and keep the ones you like. Everything lives in a local SQLite
//! database; the web UI is embedded in the binary.
//!
//! # Flow
//!
//! | Step | What happens |
//! |------|--------------|
//! | generate | source text is sent to the configured model, proposals come back |
//! | review | each proposal is accepted, edited, or rejected in the UI |
//! | save | surviving cards are persisted with their provenance (`ai-full`, `ai-edited`, `manual`) |
//! | browse | saved cards are searchable, sortable, and paginated |
//!
//! # Quick Start
//!
//! ```no_run
//! use cardbox::db::{Database, FlashcardDraft, ListParams};
//!
//! let db = Database::open().unwrap();
//!
//! let cards = db
//!     .create_flashcards(
//!         "user-id",
//!         &[FlashcardDraft {
//!             front: "What is the capital of France?".into(),
//!             back: "Paris".into(),
//!             source: "manual".into(),
//!             generation_id: None,
//!         }],
//!     )
//!     .unwrap();
//!
//! let (page, total) = db.list_flashcards("user-id", &ListParams::default()).unwrap();
//! println!("{} of {} cards", page.len(), total);
//! # let _ = cards;
//! ```

pub mod auth;
pub mod config;
pub mod db;
pub mod generation;
pub mod llm;
pub mod schema;
pub mod serve;

pub use config::Config;
pub use db::{Database, DbError, Flashcard, FlashcardChanges, FlashcardDraft, ListParams};
pub use generation::{generate_flashcards, FlashcardProposal, GenerationResult, ProposalSource};
pub use llm::{LlmClient, LlmError, ProposedCard};
pub use serve::ServerContext;
