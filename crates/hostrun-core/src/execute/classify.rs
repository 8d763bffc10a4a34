//! Fault classification.
//!
//! Distinguishes environment conflicts (the engine's compiler or runtime
//! libraries shadowed by another host extension) from ordinary script
//! faults. Classification is a pure function of the fault.

use serde::{Deserialize, Serialize};

use crate::host::ScriptFault;

use super::result::FailureKind;

/// Signatures that mark a fault as an environment conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConflictRules {
    /// Fault kinds that always indicate a conflict.
    pub fault_kinds: Vec<String>,
    /// Message fragments (case-sensitive) that indicate a conflict.
    pub message_markers: Vec<String>,
    /// User-facing message for conflicts.
    pub message: String,
    /// Follow-up line naming the likely cause.
    pub hint: String,
}

impl Default for ConflictRules {
    fn default() -> Self {
        Self {
            fault_kinds: vec![
                "ReflectionTypeLoadException".to_string(),
                "FileLoadException".to_string(),
                "TypeLoadException".to_string(),
            ],
            message_markers: vec![
                "Roslyn".to_string(),
                "SyntaxTree".to_string(),
                "CSharpScript".to_string(),
            ],
            message: "Add-in conflict: the script engine has been blocked by another host \
                      extension and cannot safely run this script."
                .to_string(),
            hint: "Tip: another extension loaded an incompatible version of a compiler or \
                   runtime library. Disable it or load the engine first."
                .to_string(),
        }
    }
}

impl ConflictRules {
    pub fn matches(&self, fault: &ScriptFault) -> bool {
        let kind = fault.kind.rsplit('.').next().unwrap_or(&fault.kind);
        self.fault_kinds.iter().any(|k| k == kind)
            || self
                .message_markers
                .iter()
                .any(|m| fault.message.contains(m.as_str()))
    }
}

/// A classified fault, ready to be turned into a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: FailureKind,
    pub message: String,
    pub details: Vec<String>,
}

/// Classify a fault as a conflict or an ordinary runtime failure.
pub fn classify_fault(fault: &ScriptFault, rules: &ConflictRules) -> Classified {
    if rules.matches(fault) {
        return Classified {
            kind: FailureKind::Conflict,
            message: rules.message.clone(),
            details: vec![rules.hint.clone(), fault.to_string()],
        };
    }

    let mut details = vec![fault.to_string()];
    if let Some(trace) = &fault.trace {
        details.extend(trace.lines().map(str::to_string));
    }
    Classified {
        kind: FailureKind::Runtime,
        message: format!("Script execution error: {}", fault.message),
        details,
    }
}
