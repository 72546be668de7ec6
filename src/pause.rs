use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseGate {
    paused: bool,
}

impl PauseGate {
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn ensure_not_paused(&self) -> Result<(), LedgerError> {
        if self.paused {
            Err(LedgerError::Paused)
        } else {
            Ok(())
        }
    }

    pub fn ensure_paused(&self) -> Result<(), LedgerError> {
        if self.paused {
            Ok(())
        } else {
            Err(LedgerError::NotPaused)
        }
    }

    pub fn pause(&mut self) -> Result<(), LedgerError> {
        self.ensure_not_paused()?;
        self.paused = true;
        Ok(())
    }

    pub fn unpause(&mut self) -> Result<(), LedgerError> {
        self.ensure_paused()?;
        self.paused = false;
        Ok(())
    }
}

/// Non-reentrant section flag: set on entry of a public operation, cleared on exit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReentrancyGuard {
    entered: bool,
}

impl ReentrancyGuard {
    pub fn is_entered(&self) -> bool {
        self.entered
    }

    pub fn enter(&mut self) -> Result<(), LedgerError> {
        if self.entered {
            return Err(LedgerError::ReentrantCall);
        }
        self.entered = true;
        Ok(())
    }

    pub fn exit(&mut self) {
        self.entered = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_toggles_once() {
        let mut gate = PauseGate::default();
        assert_eq!(gate.unpause().unwrap_err(), LedgerError::NotPaused);
        gate.pause().unwrap();
        assert!(gate.is_paused());
        assert_eq!(gate.pause().unwrap_err(), LedgerError::Paused);
        assert_eq!(gate.ensure_not_paused().unwrap_err(), LedgerError::Paused);
        gate.unpause().unwrap();
        assert!(!gate.is_paused());
    }

    #[test]
    fn guard_rejects_nested_entry() {
        let mut guard = ReentrancyGuard::default();
        guard.enter().unwrap();
        assert_eq!(guard.enter().unwrap_err(), LedgerError::ReentrantCall);
        guard.exit();
        guard.enter().unwrap();
    }
}
