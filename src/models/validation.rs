use serde::{Deserialize, Serialize};
use std::fmt;

/// One field-level finding from a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Outcome of a validator. Validators never panic and never short-circuit;
/// they accumulate everything wrong (errors) and everything questionable
/// (warnings) so callers can decide whether to abort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<FieldError>,
    pub warnings: Vec<FieldError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    pub fn warn(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(FieldError::new(field, message));
    }

    /// Folds another report in, prefixing its fields (`attachments[2].size`).
    pub fn absorb(&mut self, prefix: &str, other: ValidationReport) {
        for e in other.errors {
            self.errors
                .push(FieldError::new(format!("{prefix}.{}", e.field), e.message));
        }
        for w in other.warnings {
            self.warnings
                .push(FieldError::new(format!("{prefix}.{}", w.field), w.message));
        }
    }

    pub fn has_error_on(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    pub fn has_warning_on(&self, field: &str) -> bool {
        self.warnings.iter().any(|w| w.field == field)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "ok");
        }
        let joined = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{joined}")
    }
}
