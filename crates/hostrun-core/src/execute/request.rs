//! Submissions and the requests built from them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::combine::{CombineOptions, CombinedUnit, SourceFragment, combine};
use crate::error::Result;
use crate::host::ExecutionContext;

/// Label used for binary submissions without a name.
pub const COMPILED_SCRIPT_NAME: &str = "Compiled Script";

/// Correlation handle for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What a caller asks to run.
///
/// A submission may carry source fragments, a precompiled binary or both;
/// the binary wins when both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(default)]
    pub fragments: Vec<SourceFragment>,
    #[serde(default)]
    pub binary: Option<Vec<u8>>,
    /// Opaque parameter document (JSON).
    #[serde(default)]
    pub parameters: String,
    /// Display label; defaults to the entry file name.
    #[serde(default)]
    pub script_name: Option<String>,
    /// Who submitted (transport, dashboard, test harness).
    #[serde(default)]
    pub source: Option<String>,
}

impl Submission {
    pub fn from_fragments(fragments: Vec<SourceFragment>) -> Self {
        Self {
            fragments,
            ..Self::default()
        }
    }

    pub fn from_binary(binary: Vec<u8>) -> Self {
        Self {
            binary: Some(binary),
            ..Self::default()
        }
    }

    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = parameters.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = Some(name.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The label results carry when the submission cannot be combined.
    pub(crate) fn fallback_name(&self) -> String {
        if let Some(name) = &self.script_name {
            return name.clone();
        }
        if self.binary.is_some() {
            return COMPILED_SCRIPT_NAME.to_string();
        }
        self.fragments
            .first()
            .map(|f| f.file_name.clone())
            .unwrap_or_default()
    }
}

/// The payload a request executes. Never both.
#[derive(Debug, Clone)]
pub enum ExecutableUnit {
    Combined(CombinedUnit),
    Binary(Vec<u8>),
}

/// One submission ready for the host thread.
pub struct ExecutionRequest {
    pub id: RequestId,
    pub unit: ExecutableUnit,
    pub parameters: String,
    pub context: Box<dyn ExecutionContext>,
    pub script_name: String,
    pub source: String,
}

impl ExecutionRequest {
    /// Build a request, combining source fragments unless a binary is present.
    ///
    /// Combination errors are returned here, before any host work.
    pub fn build(
        submission: Submission,
        context: Box<dyn ExecutionContext>,
        options: &CombineOptions,
    ) -> Result<Self> {
        Self::build_with_id(RequestId::new(), submission, context, options)
    }

    pub(crate) fn build_with_id(
        id: RequestId,
        submission: Submission,
        context: Box<dyn ExecutionContext>,
        options: &CombineOptions,
    ) -> Result<Self> {
        let Submission {
            fragments,
            binary,
            parameters,
            script_name,
            source,
        } = submission;

        let (unit, default_name) = match binary {
            Some(bytes) => {
                if !fragments.is_empty() {
                    tracing::debug!(
                        "Submission carries both a binary and {} fragments; using the binary",
                        fragments.len()
                    );
                }
                (ExecutableUnit::Binary(bytes), COMPILED_SCRIPT_NAME.to_string())
            }
            None => {
                let unit = combine(&fragments, options)?;
                let name = unit
                    .entry_file()
                    .map(str::to_string)
                    .or_else(|| fragments.first().map(|f| f.file_name.clone()))
                    .unwrap_or_default();
                (ExecutableUnit::Combined(unit), name)
            }
        };

        Ok(Self {
            id,
            unit,
            parameters,
            context,
            script_name: script_name.unwrap_or(default_name),
            source: source.unwrap_or_else(|| "local".to_string()),
        })
    }
}

impl std::fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("id", &self.id)
            .field("unit", &self.unit)
            .field("script_name", &self.script_name)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
