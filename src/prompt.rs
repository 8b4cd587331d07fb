//! The interactive identity picker capability.
//!
//! The manager never talks to a terminal directly; it goes through
//! [`IdentityPrompt`] so tests can inject a scripted implementation and
//! non-interactive environments fail with a precise error instead of
//! hanging on a prompt nobody will answer.

use atty::Stream;
use dialoguer::Select;
use std::fmt::Debug;

use crate::error::AuthError;

pub trait IdentityPrompt: Debug + Send + Sync {
    /// Whether this prompt can actually interact with a user. The manager
    /// consults this before deciding that ambiguous default-identity
    /// configurations can be resolved by asking.
    fn interactive(&self) -> bool;

    /// Presents the options and returns the chosen one. Fails with
    /// `NoIdentitiesAvailable` on an empty option list and
    /// `SelectionRequiresTty` when interaction is needed but impossible.
    fn select(&self, message: &str, options: &[String]) -> Result<String, AuthError>;
}

/// The real picker, rendered on stderr so command output stays clean.
#[derive(Clone, Copy, Debug, Default)]
pub struct TtyPrompt;

impl TtyPrompt {
    pub fn new() -> Self {
        TtyPrompt
    }
}

impl IdentityPrompt for TtyPrompt {
    fn interactive(&self) -> bool {
        atty::is(Stream::Stderr)
    }

    fn select(&self, message: &str, options: &[String]) -> Result<String, AuthError> {
        if options.is_empty() {
            return Err(AuthError::NoIdentitiesAvailable);
        }
        if !self.interactive() {
            return Err(AuthError::SelectionRequiresTty);
        }

        let index = Select::new()
            .with_prompt(message)
            .items(options)
            .default(0)
            .interact()
            .map_err(|e| AuthError::Manager(format!("identity selection failed: {e}")))?;

        Ok(options[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::{IdentityPrompt, TtyPrompt};
    use crate::error::AuthErrorKind;

    #[test]
    fn empty_options_fail_before_any_terminal_check() {
        let err = TtyPrompt::new().select("pick an identity", &[]).unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::NoIdentitiesAvailable);
    }

    #[test]
    fn non_interactive_selection_requires_tty() {
        // Test runners detach stderr from a terminal, so the real prompt
        // must refuse rather than hang.
        let prompt = TtyPrompt::new();
        if !prompt.interactive() {
            let err = prompt
                .select("pick an identity", &["dev".to_owned()])
                .unwrap_err();
            assert_eq!(err.kind(), AuthErrorKind::SelectionRequiresTty);
        }
    }
}
