//! Context subsystem constants.

// =============================================================================
// Token Estimation
// =============================================================================

/// Approximate characters per token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Character weight charged for an image block (~1500 tokens, 1024x1024).
pub const IMAGE_BLOCK_CHARS: usize = 6_000;

// =============================================================================
// Summarizer
// =============================================================================

/// Truncation limit for a user request quoted by the keyword summarizer.
pub const KEYWORD_USER_REQUEST_LIMIT: usize = 200;

// =============================================================================
// Context clearing
// =============================================================================

/// Reason recorded on `context.cleared` when the caller gives none.
pub const DEFAULT_CLEAR_REASON: &str = "manual";
