//! Provider configuration
//!
//! Selects which container form a provider accepts and how forgiving the best-effort
//! operations are.

use crate::format::BytecodeForm;

/// How best-effort operations treat consistency failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum Hardening {
    /// Layout and index failures are returned to the caller
    #[default]
    Strict,
    /// Layout and index failures in best-effort operations are ignored
    Relaxed,
}

/// Configuration for a [`crate::BytecodeProvider`]
///
/// # Examples
///
/// ```rust
/// use hbcscope::{BytecodeForm, Hardening, ProviderConfig};
///
/// let config = ProviderConfig::default()
///     .with_form(BytecodeForm::Delta)
///     .with_hardening(Hardening::Relaxed);
/// assert_eq!(config.form, BytecodeForm::Delta);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProviderConfig {
    /// Which magic the container must carry
    pub form: BytecodeForm,
    /// Failure policy of best-effort operations
    pub hardening: Hardening,
}

impl ProviderConfig {
    /// Accept containers of `form`.
    #[must_use]
    pub fn with_form(mut self, form: BytecodeForm) -> Self {
        self.form = form;
        self
    }

    /// Use `hardening` for best-effort operations.
    #[must_use]
    pub fn with_hardening(mut self, hardening: Hardening) -> Self {
        self.hardening = hardening;
        self
    }

    /// Accept delta containers, strict otherwise.
    #[must_use]
    pub fn delta() -> Self {
        Self::default().with_form(BytecodeForm::Delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProviderConfig::default();
        assert_eq!(config.form, BytecodeForm::Execution);
        assert_eq!(config.hardening, Hardening::Strict);
    }

    #[test]
    fn test_builders() {
        let config = ProviderConfig::delta().with_hardening(Hardening::Relaxed);
        assert_eq!(config.form, BytecodeForm::Delta);
        assert_eq!(config.hardening, Hardening::Relaxed);
        assert_eq!(config.hardening.to_string(), "Relaxed");
    }
}
