use crate::state::Database;

/// Guard for one undo layer.
///
/// The layer is reverted when the guard is dropped unless it was pushed or squashed first.
#[must_use = "dropping an undo session reverts its changes"]
pub struct UndoSession {
    db: Database,
    revision: u64,
    active: bool,
}

impl UndoSession {
    pub(crate) fn new(db: Database, revision: u64) -> Self {
        Self {
            db,
            revision,
            active: true,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Keeps the changes as a separate layer on the undo stack.
    pub fn push(mut self) {
        self.active = false;
    }

    /// Merges the changes into the enclosing layer.
    pub fn squash(mut self) {
        if self.active && self.is_top() {
            if let Err(err) = self.db.squash() {
                log::error!("Failed to squash undo session {}: {err}", self.revision);
            }
        }
        self.active = false;
    }

    /// Reverts the changes right away.
    pub fn undo(mut self) {
        self.revert();
    }

    fn revert(&mut self) {
        if self.active && self.is_top() {
            if let Err(err) = self.db.undo() {
                log::error!("Failed to undo session {}: {err}", self.revision);
            }
        }
        self.active = false;
    }

    fn is_top(&self) -> bool {
        let top = self.db.is_session_top(self.revision);
        if !top {
            log::warn!(
                "Undo session {} is no longer the top layer, revision is {}",
                self.revision,
                self.db.revision()
            );
        }
        top
    }
}

impl Drop for UndoSession {
    fn drop(&mut self) {
        self.revert();
    }
}
