// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the command line.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The severity drives the exit code and how the CLI presents the failure.

use crate::error::BlattwerkError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Resource hiccup; running the same command again may work.
    Transient,
    /// The user must change something (a path, a flag, the input file).
    ActionRequired,
    /// Retrying will not help: the input cannot be processed.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (first line of output).
    pub message: String,
    /// What the user should try.
    pub suggestion: String,
    /// Whether re-running the command could succeed.
    pub retriable: bool,
    pub severity: Severity,
}

impl HumanError {
    fn new(message: &str, suggestion: &str, retriable: bool, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            retriable,
            severity,
        }
    }
}

/// Convert a `BlattwerkError` into a `HumanError`.
pub fn humanize_error(err: &BlattwerkError) -> HumanError {
    match err {
        // -- Input --
        BlattwerkError::CorruptInput(_) => HumanError::new(
            "The file could not be read as a valid document or image.",
            "Check that the file opens in another viewer. It may be damaged or only partly downloaded.",
            false,
            Severity::Permanent,
        ),

        BlattwerkError::EmptyDocument(_) => HumanError::new(
            "The document has no pages.",
            "There is nothing to process. Choose a document with at least one page.",
            false,
            Severity::Permanent,
        ),

        BlattwerkError::EncryptedDocument(_) => HumanError::new(
            "The document is password-protected.",
            "Remove the password in the program that created it, then try again.",
            false,
            Severity::ActionRequired,
        ),

        BlattwerkError::UnsupportedFormat(_) => HumanError::new(
            "That file type isn't supported.",
            "Use a PDF, or a JPEG, PNG, BMP or GIF image.",
            false,
            Severity::Permanent,
        ),

        // -- Processing --
        BlattwerkError::ImageError(_) => HumanError::new(
            "An image could not be processed.",
            "The image may be damaged or in an unusual colour format. Try re-saving it as JPEG or PNG.",
            false,
            Severity::Permanent,
        ),

        BlattwerkError::PdfError(_) => HumanError::new(
            "The PDF could not be processed.",
            "The document may use features that aren't supported. Try printing it to a new PDF first.",
            false,
            Severity::Permanent,
        ),

        BlattwerkError::RenderUnavailable(_) => HumanError::new(
            "Page rendering isn't available in this build.",
            "Install a build with the \"mupdf\" feature enabled to scan or extract pages.",
            false,
            Severity::ActionRequired,
        ),

        BlattwerkError::Render(_) => HumanError::new(
            "A page could not be rendered.",
            "The page may contain damaged content. Try a lower resolution or repair the PDF.",
            false,
            Severity::Permanent,
        ),

        // -- Workers --
        BlattwerkError::Worker { .. } => HumanError::new(
            "A background worker stopped before finishing.",
            "Run the command again. If it keeps failing, try --threads or fewer --workers.",
            true,
            Severity::Transient,
        ),

        BlattwerkError::WorkerProtocol(_) => HumanError::new(
            "A background worker sent an unexpected reply.",
            "Make sure only one version of blattwerk is installed, then run the command again.",
            true,
            Severity::Transient,
        ),

        // -- Caller --
        BlattwerkError::InvalidBudget(_) => HumanError::new(
            "The target size isn't valid.",
            "Give a size greater than zero, for example 2MB or 500KB.",
            false,
            Severity::ActionRequired,
        ),

        BlattwerkError::InvalidArgument(_) => HumanError::new(
            "One of the options isn't valid.",
            "Check the command's --help output and the values in your config file.",
            false,
            Severity::ActionRequired,
        ),

        // -- Storage --
        BlattwerkError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError::new(
                "The file couldn't be found.",
                "Check the path. The file may have been moved or deleted.",
                false,
                Severity::ActionRequired,
            ),
            std::io::ErrorKind::PermissionDenied => HumanError::new(
                "Permission denied while reading or writing a file.",
                "Check the file and folder permissions, or choose a different output location.",
                false,
                Severity::ActionRequired,
            ),
            _ => HumanError::new(
                "There was a problem reading or writing a file.",
                "Try again. If this keeps happening, the disk may be full.",
                true,
                Severity::Transient,
            ),
        },

        BlattwerkError::Serialization(_) => HumanError::new(
            "Some data could not be read or written.",
            "If you passed --config, check that the file is valid JSON.",
            false,
            Severity::ActionRequired,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_input_is_permanent() {
        let human = humanize_error(&BlattwerkError::CorruptInput("bad xref".into()));
        assert_eq!(human.severity, Severity::Permanent);
        assert!(!human.retriable);
    }

    #[test]
    fn missing_file_is_action_required() {
        let err = BlattwerkError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(human.message.contains("couldn't be found"));
    }

    #[test]
    fn worker_crash_is_retriable() {
        let err = BlattwerkError::Worker {
            chunk_id: 2,
            detail: "exit status 101".into(),
        };
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }

    #[test]
    fn bad_budget_asks_for_a_new_value() {
        let human = humanize_error(&BlattwerkError::InvalidBudget("zero".into()));
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(human.suggestion.contains("2MB"));
    }
}
