//! Flashcard generation workflow
//!
//! Fingerprints the source text, asks a proposal source (the LLM client in
//! production) for front/back pairs, and records an audit row: a generation
//! record on success, an error log on failure. Proposals themselves are
//! transient; they only become flashcard rows when the user saves them.

use crate::db::{Database, DbError, ErrorLogDraft, GenerationDraft};
use crate::llm::{LlmError, ProposedCard};
use sha2::{Digest, Sha256};
use std::time::Instant;

/// System prompt used for every generation request
pub const FLASHCARD_SYSTEM_PROMPT: &str = "You are an expert at creating educational flashcards. \
Given a passage of text, extract the key facts and concepts and turn them into concise \
question/answer flashcards. Each front should be a single clear question under 200 characters; \
each back should be a complete answer under 500 characters. Cover the important material without \
inventing facts that are not in the text.";

/// A transient flashcard candidate returned to the caller for review
#[derive(Debug, Clone, serde::Serialize)]
pub struct FlashcardProposal {
    pub front: String,
    pub back: String,
    pub source: String,
}

/// Result of a successful generation request
#[derive(Debug, Clone, serde::Serialize)]
pub struct GenerationResult {
    pub generation_id: i32,
    pub generated_count: i32,
    pub flashcards_proposals: Vec<FlashcardProposal>,
}

/// Error type for the generation workflow
#[derive(Debug)]
pub enum GenerationError {
    Llm(LlmError),
    Db(DbError),
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::Llm(e) => write!(f, "{}", e),
            GenerationError::Db(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for GenerationError {}

impl From<LlmError> for GenerationError {
    fn from(e: LlmError) -> Self {
        GenerationError::Llm(e)
    }
}

impl From<DbError> for GenerationError {
    fn from(e: DbError) -> Self {
        GenerationError::Db(e)
    }
}

/// Anything that can turn source text into proposed cards. The production
/// implementation is [`crate::llm::LlmClient`]; tests substitute a stub so
/// the workflow is exercised without the network.
pub trait ProposalSource {
    /// Model identifier recorded in audit rows
    fn model_name(&self) -> String;

    /// Produce front/back pairs for the given source text
    fn generate(&mut self, system_prompt: &str, source_text: &str) -> crate::llm::Result<Vec<ProposedCard>>;
}

impl ProposalSource for crate::llm::LlmClient {
    fn model_name(&self) -> String {
        self.model_config().model.clone()
    }

    fn generate(&mut self, system_prompt: &str, source_text: &str) -> crate::llm::Result<Vec<ProposedCard>> {
        self.set_system_message(system_prompt)?;
        self.set_user_message(source_text)?;
        self.send_request()
    }
}

/// SHA-256 hex fingerprint of the source text, for audit/dedup tracking
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Run one generation request for a user.
///
/// On success one generation row is written and the proposals are returned
/// tagged `ai-full`. On any failure one error-log row is written and the
/// original error propagates; a failure of the error-log insert itself is
/// reported to stderr but never masks the original error. No generation row
/// is written on failure.
pub fn generate_flashcards(
    db: &Database,
    source: &mut dyn ProposalSource,
    user_id: &str,
    source_text: &str,
) -> Result<GenerationResult, GenerationError> {
    let hash = fingerprint(source_text);
    let length = source_text.chars().count() as i32;
    let model = source.model_name();
    let start = Instant::now();

    let cards = match source.generate(FLASHCARD_SYSTEM_PROMPT, source_text) {
        Ok(cards) => cards,
        Err(e) => {
            log_generation_error(db, user_id, &hash, length, &model, &e.code(), &e.to_string());
            return Err(e.into());
        }
    };

    let duration_ms = start.elapsed().as_millis() as i32;
    let generated_count = cards.len() as i32;

    let generation = match db.insert_generation(
        user_id,
        &GenerationDraft {
            source_text_hash: hash.clone(),
            source_text_length: length,
            ai_model: model.clone(),
            generated_count,
            generation_duration_ms: duration_ms,
        },
    ) {
        Ok(generation) => generation,
        Err(e) => {
            log_generation_error(db, user_id, &hash, length, &model, "db", &e.to_string());
            return Err(e.into());
        }
    };

    let flashcards_proposals = cards
        .into_iter()
        .map(|card| FlashcardProposal {
            front: card.front,
            back: card.back,
            source: "ai-full".to_string(),
        })
        .collect();

    Ok(GenerationResult {
        generation_id: generation.id,
        generated_count,
        flashcards_proposals,
    })
}

fn log_generation_error(
    db: &Database,
    user_id: &str,
    hash: &str,
    length: i32,
    model: &str,
    code: &str,
    message: &str,
) {
    let draft = ErrorLogDraft {
        source_text_hash: hash.to_string(),
        source_text_length: length,
        ai_model: model.to_string(),
        error_code: code.to_string(),
        error_message: message.to_string(),
    };
    if let Err(log_err) = db.insert_generation_error(user_id, &draft) {
        eprintln!("Failed to log generation error: {}", log_err);
    }
}
