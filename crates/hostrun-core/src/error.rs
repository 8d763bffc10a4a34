//! Error types for hostrun-core.

use thiserror::Error;

/// Result type for hostrun-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in hostrun-core.
#[derive(Debug, Error)]
pub enum Error {
    /// No fragments were supplied to the combiner.
    #[error("no source fragments provided to combine")]
    EmptyInput,

    /// Several fragments were supplied but none contains top-level statements.
    #[error("no fragment contains top-level statements")]
    NoEntryPoint,

    /// More than one fragment contains top-level statements.
    #[error("only one fragment may contain top-level statements, found: {}", files.join(", "))]
    MultipleEntryPoints { files: Vec<String> },

    /// A single fragment could not be scanned.
    #[error("{file}({line},{column}): {message}")]
    FragmentParse {
        file: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// A submission reached the dispatcher before it was bound to the host.
    #[error("dispatcher is not initialized: no host signal has been bound")]
    DispatcherNotInitialized,

    /// A host-thread query returned an error.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// A host-thread query panicked.
    #[error("query panicked: {0}")]
    QueryPanicked(String),

    /// A query was dropped before the host thread ran it.
    #[error("query was abandoned before the host thread ran it")]
    QueryAbandoned,

    /// The parameter document could not be interpreted.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The host document refused a transaction operation.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The host side is gone (host thread stopped, channels closed).
    #[error("host unavailable: {0}")]
    HostUnavailable(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error was produced while combining fragments.
    pub fn is_combination(&self) -> bool {
        matches!(
            self,
            Error::EmptyInput
                | Error::NoEntryPoint
                | Error::MultipleEntryPoints { .. }
                | Error::FragmentParse { .. }
        )
    }

    /// Render the error together with a recovery hint, when one applies.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::EmptyInput => Some("pass at least one source file"),
            Error::NoEntryPoint => Some(
                "add top-level statements to exactly one file, or allow library-only units",
            ),
            Error::MultipleEntryPoints { .. } => Some(
                "move the top-level statements of all but one file into methods or types",
            ),
            Error::FragmentParse { .. } => {
                Some("check for unterminated strings, comments or unbalanced brackets")
            }
            Error::DispatcherNotInitialized => {
                Some("the host integration must call initialize() before submitting work")
            }
            Error::InvalidParameters(_) => Some(
                "parameters must be a JSON object or a list of {name, type, value} entries",
            ),
            _ => None,
        };

        match hint {
            Some(hint) => format!("{self}\n  hint: {hint}"),
            None => self.to_string(),
        }
    }
}
