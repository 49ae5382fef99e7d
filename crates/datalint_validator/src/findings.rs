//! Raw findings collected by the format validators.

use datalint_core::{Check, Diagnostic, ImageInfo, Severity};

/// Error diagnostics collected before a validator stops scanning.
pub const MAX_ERRORS: usize = 100;

/// Which optional check layers a validator should run.
///
/// Structural checks always run; header and content checks build on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationScope {
    /// Check headers, schemas and metadata blocks
    pub header: bool,
    /// Decode the payload
    pub content: bool,
}

impl ValidationScope {
    /// Derives the scope from a requested check set.
    pub fn from_checks(checks: &[Check]) -> Self {
        Self {
            header: checks.contains(&Check::Header),
            content: checks.contains(&Check::Content),
        }
    }

    /// Every layer enabled.
    pub fn full() -> Self {
        Self {
            header: true,
            content: true,
        }
    }
}

/// What a validator found, before the engine turns it into a result.
#[derive(Debug, Clone, Default)]
pub struct Findings {
    /// Diagnostics in discovery order
    pub diagnostics: Vec<Diagnostic>,
    /// Bytes examined
    pub bytes_checked: u64,
    /// Records examined
    pub records_checked: u64,
    /// Whether scanning stopped before the end of the artifact
    pub sampled: bool,
    /// Decoded image geometry
    pub image: Option<ImageInfo>,
}

impl Findings {
    /// Findings for a validator that examines the whole artifact.
    pub fn whole(len: u64) -> Self {
        Self {
            bytes_checked: len,
            ..Default::default()
        }
    }

    /// Records a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Whether any error was recorded.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Whether the error budget is used up.
    pub fn error_budget_spent(&self) -> bool {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
            >= MAX_ERRORS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalint_core::DiagnosticCode;

    #[test]
    fn test_scope_from_checks() {
        let scope = ValidationScope::from_checks(&[Check::Structure, Check::Content]);
        assert!(!scope.header);
        assert!(scope.content);
    }

    #[test]
    fn test_error_budget() {
        let mut findings = Findings::whole(10);
        assert!(!findings.has_errors());
        for _ in 0..MAX_ERRORS {
            findings.push(Diagnostic::error(DiagnosticCode::ColumnCount, "x"));
        }
        assert!(findings.has_errors());
        assert!(findings.error_budget_spent());
    }
}
