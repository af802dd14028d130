//! Exclusive management-session bracket
//!
//! A management session is a single open/closed flag per application,
//! never persisted. At most one bracket may be open at a time; a closed
//! bracket may always be reopened.

use warden_core::{Result, SecurityError};

/// The Start/End management bracket for one application.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManagementGuard {
    open: bool,
}

impl ManagementGuard {
    /// A closed guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a bracket is currently open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Open the bracket. Fails if one is already open.
    pub fn start(&mut self) -> Result<()> {
        if self.open {
            return Err(SecurityError::ManagementAlreadyStarted);
        }
        self.open = true;
        Ok(())
    }

    /// Close the bracket. Fails if none is open.
    pub fn end(&mut self) -> Result<()> {
        if !self.open {
            return Err(SecurityError::ManagementNotStarted);
        }
        self.open = false;
        Ok(())
    }

    /// Force-close, used by factory reset.
    pub fn clear(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn bracket_is_exclusive_and_reopenable() {
        let mut guard = ManagementGuard::new();
        assert!(!guard.is_open());
        guard.start().unwrap();
        assert!(guard.is_open());
        assert_matches!(guard.start(), Err(SecurityError::ManagementAlreadyStarted));
        guard.end().unwrap();
        assert!(!guard.is_open());
        assert_matches!(guard.end(), Err(SecurityError::ManagementNotStarted));
        guard.start().unwrap();
    }
}
