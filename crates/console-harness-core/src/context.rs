//! Fixed attributes of a spawned session.

use std::path::{Path, PathBuf};

use crate::template::{FieldSource, SessionField};

/// The attributes a session is spawned with.
///
/// Both values are fixed at spawn time and exposed to templates through
/// [`SessionField`] references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// Working directory of the process (the daemon's data directory).
    working_dir: PathBuf,

    /// Default account handed to the daemon, if any.
    account: Option<String>,
}

impl SessionContext {
    /// Create a context with just a working directory.
    #[must_use]
    pub const fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            account: None,
        }
    }

    /// Create a context with a default account.
    #[must_use]
    pub fn with_account(working_dir: PathBuf, account: impl Into<String>) -> Self {
        Self {
            working_dir,
            account: Some(account.into()),
        }
    }

    /// Working directory of the session.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Default account of the session.
    #[must_use]
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }
}

impl FieldSource for SessionContext {
    fn field(&self, field: SessionField) -> Option<String> {
        match field {
            SessionField::Datadir => Some(self.working_dir.display().to_string()),
            SessionField::Account => self.account.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_resolve() {
        let ctx = SessionContext::with_account(PathBuf::from("/data/net"), "0xabc");
        assert_eq!(ctx.field(SessionField::Datadir).as_deref(), Some("/data/net"));
        assert_eq!(ctx.field(SessionField::Account).as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_missing_account() {
        let ctx = SessionContext::new(PathBuf::from("/data/net"));
        assert_eq!(ctx.account(), None);
        assert_eq!(ctx.field(SessionField::Account), None);
    }
}
