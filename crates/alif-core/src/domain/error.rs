use thiserror::Error;

use super::models::{LemmaId, SentenceId};

/// Errors raised by pure domain logic: ingest validation ("input garbage",
/// §7) and scheduling-invariant violations caught by a guard rather than
/// propagated as a hard failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("invalid root '{0}': radicals must be 3-4 Arabic letters (U+0621-U+064A)")]
    InvalidRoot(String),

    #[error("surface form '{0}' too short after stripping punctuation/abbreviations")]
    SurfaceTooShort(String),

    #[error("lemma bare form '{0}' is not unique")]
    DuplicateLemmaBareForm(String),

    #[error("lemma {0} is a variant and cannot be scheduled directly")]
    LemmaIsVariant(LemmaId),

    #[error("knowledge record for {0} violates state invariant: {1}")]
    InvariantViolation(LemmaId, String),

    #[error("sentence {0} has an unresolved token and cannot be activated")]
    UnresolvedToken(SentenceId),

    #[error("sentence {0} covers fewer than 2 of its target words after token mapping")]
    InsufficientTargetCoverage(SentenceId),

    #[error("graduation attempted before the minimum-calendar-days guard was satisfied")]
    GraduationGuardFailed,

    #[error("invalid rating value: {0}")]
    InvalidRating(u8),

    #[error("record for {0} is not in the acquiring state")]
    NotAcquiring(LemmaId),

    #[error("record for {0} has no FSRS card to review")]
    NoFsrsCard(LemmaId),
}

pub type DomainResult<T> = std::result::Result<T, DomainError>;

/// Transient-external / untrusted-input failures at the oracle boundary
/// (§6, §7, SPEC_FULL §C). `Unavailable` is the degrade-gracefully path
/// (identity resolution falls back to the morphological analyzer only;
/// sentence quality audit fails closed and rejects). `Invalid` is an
/// untrusted response that failed schema validation — always fail closed,
/// never partially trust it (§9: "treat all LLM responses as untrusted
/// inputs... on schema mismatch, fail closed").
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    #[error("oracle returned an invalid/untrusted response: {0}")]
    Invalid(String),

    #[error("oracle call timed out after {0:?}")]
    Timeout(std::time::Duration),
}
