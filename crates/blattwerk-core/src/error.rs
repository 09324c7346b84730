// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Blattwerk.

use thiserror::Error;

/// Top-level error type for all Blattwerk operations.
///
/// Budget infeasibility is deliberately absent: an unreachable byte budget is
/// reported through result flags, never as an error.
#[derive(Debug, Error)]
pub enum BlattwerkError {
    // -- Input errors --
    #[error("source document is unreadable or corrupt: {0}")]
    CorruptInput(String),

    #[error("document has no pages: {0}")]
    EmptyDocument(String),

    #[error("document is encrypted: {0}")]
    EncryptedDocument(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    // -- Processing errors --
    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("no page renderer available: {0}")]
    RenderUnavailable(String),

    #[error("page rendering failed: {0}")]
    Render(String),

    // -- Scheduler errors --
    #[error("worker for chunk {chunk_id} failed: {detail}")]
    Worker { chunk_id: usize, detail: String },

    #[error("worker protocol violation: {0}")]
    WorkerProtocol(String),

    // -- Caller errors --
    #[error("invalid byte budget: {0}")]
    InvalidBudget(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BlattwerkError {
    /// Whether this error belongs to the "bad input" class that aborts an
    /// operation before anything is written.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::CorruptInput(_)
                | Self::EmptyDocument(_)
                | Self::EncryptedDocument(_)
                | Self::UnsupportedFormat(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BlattwerkError>;
