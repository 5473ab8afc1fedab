//! Custom error types for xpand.
//!
//! Provides structured error handling with detailed context for better
//! diagnostics and user experience.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for xpand operations.
///
/// Each variant provides specific context about what went wrong,
/// enabling better error messages and programmatic error handling.
#[derive(Error, Debug)]
pub enum XpandError {
    // =========================================================================
    // Archive Errors
    // =========================================================================
    /// Base directory missing or not a directory.
    #[error("'{path}' is not a directory or does not exist")]
    NotADirectory { path: PathBuf },

    /// Archive file is malformed, missing, or does not match the account.
    #[error("Invalid archive file '{path}': {reason}")]
    InvalidArchiveFile { path: PathBuf, reason: String },

    // =========================================================================
    // Credential Errors
    // =========================================================================
    /// No usable credentials in the given file.
    #[error("No {kind} credentials found at '{path}'")]
    InvalidCredentials { kind: &'static str, path: PathBuf },

    /// No cached user profile in the given file.
    #[error("No user profile found at '{path}'")]
    InvalidUserProfile { path: PathBuf },

    /// Credential or profile file exists but has the wrong shape.
    #[error("Malformed {kind} in '{path}': {reason}")]
    MalformedCredentials {
        kind: &'static str,
        path: PathBuf,
        reason: String,
    },

    // =========================================================================
    // Cache Errors
    // =========================================================================
    /// Attempted to save a record whose contents were never populated.
    #[error("Tweet {id} has no contents to save")]
    MissingContents { id: u64 },

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// Remote lookup failed in a way the engine does not recover from.
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    // =========================================================================
    // IO Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    /// Invalid command-line argument or API misuse.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Catch-all for other errors with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Wrapped anyhow error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure modes of a remote tweet lookup.
///
/// `NotFound` and `RateLimited` are recovered by the engine; everything
/// else is surfaced to the caller.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The tweet does not exist or is not visible to the authenticated user.
    #[error("Tweet not found")]
    NotFound,

    /// The API refused the request because the rate-limit window is spent.
    #[error("Rate limited by the API")]
    RateLimited,

    /// Non-success HTTP status other than 404/429.
    #[error("API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Connection, TLS, or timeout failure.
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request could not be built (bad id list, signing failure).
    #[error("Could not build request: {0}")]
    Request(String),

    /// Response body did not have the expected shape.
    #[error("Unexpected API response: {0}")]
    Decode(String),
}

/// Result type alias for xpand operations.
pub type Result<T> = std::result::Result<T, XpandError>;

impl XpandError {
    /// Create a directory error.
    pub fn not_a_directory(path: impl Into<PathBuf>) -> Self {
        Self::NotADirectory { path: path.into() }
    }

    /// Create an invalid archive file error.
    pub fn invalid_archive_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidArchiveFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a malformed credentials error.
    pub fn malformed(kind: &'static str, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedCredentials {
            kind,
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Wrap an error with additional context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Check if re-running the same command is expected to make progress.
    #[must_use]
    pub const fn is_resumable(&self) -> bool {
        matches!(
            self,
            Self::Fetch(FetchError::Transport(_) | FetchError::Api { .. }) | Self::IoError(_)
        )
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NotADirectory { .. } => {
                Some("Pass the extracted archive directory with --dir, or cd into it.")
            }
            Self::InvalidArchiveFile { .. } => Some(
                "Check that data/tweets.js and data/account.js come from the account you authorized.",
            ),
            Self::InvalidCredentials { .. } | Self::MalformedCredentials { .. } => {
                Some("Delete the credential file and re-run to be prompted again.")
            }
            Self::InvalidUserProfile { .. } => {
                Some("Delete user.json and re-run to fetch the profile again.")
            }
            Self::Fetch(FetchError::Transport(_) | FetchError::Api { .. }) | Self::IoError(_) => {
                Some("Re-run the same command; already expanded tweets are kept.")
            }
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| XpandError::with_context(context, e))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| XpandError::with_context(f(), e))
    }
}

// =============================================================================
// CLI Error Formatting Utilities
// =============================================================================

use colored::Colorize;

/// Format a structured CLI error with explanation and suggestions.
///
/// # Arguments
/// * `title` - Brief error title (e.g., "Account mismatch")
/// * `explanation` - What went wrong and why
/// * `suggestions` - List of actionable suggestions
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), title.bold());

    if !explanation.is_empty() {
        let _ = write!(output, "\n\n   {explanation}");
    }

    if !suggestions.is_empty() {
        output.push_str("\n\n   ");
        if suggestions.len() == 1 {
            let _ = write!(output, "{} {}", "Hint:".cyan(), suggestions[0]);
        } else {
            let _ = write!(output, "{}:", "Try".cyan());
            for suggestion in suggestions {
                let _ = write!(output, "\n     {} {}", "•".dimmed(), suggestion);
            }
        }
    }

    output
}

/// Render an error chain for the terminal, with a hint when one applies.
#[must_use]
pub fn format_xpand_error(err: &XpandError) -> String {
    let mut explanation = String::new();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if !explanation.is_empty() {
            explanation.push_str("\n   ");
        }
        explanation.push_str("caused by: ");
        explanation.push_str(&cause.to_string());
        source = cause.source();
    }
    let suggestions: Vec<&str> = err.suggestion().into_iter().collect();
    format_error(&err.to_string(), &explanation, &suggestions)
}
