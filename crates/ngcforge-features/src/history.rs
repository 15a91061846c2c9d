//! Undo/redo log of serialized project snapshots

/// Default number of snapshots kept
pub const DEFAULT_MAX_LEN: usize = 200;

/// Snapshots with a movable cursor.
///
/// The cursor points at the snapshot matching the current document; it is
/// `None` only while the log is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoLog {
    snapshots: Vec<String>,
    cursor: Option<usize>,
    max_len: usize,
}

impl Default for UndoLog {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoLog {
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_LEN)
    }

    /// A zero cap is treated as one
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            snapshots: Vec::new(),
            cursor: None,
            max_len: max_len.max(1),
        }
    }

    /// Record a snapshot, discarding anything that was undone
    pub fn commit(&mut self, snapshot: String) {
        let keep = self.cursor.map_or(0, |c| c + 1);
        self.snapshots.truncate(keep);
        self.snapshots.push(snapshot);
        if self.snapshots.len() > self.max_len {
            let excess = self.snapshots.len() - self.max_len;
            self.snapshots.drain(..excess);
        }
        self.cursor = Some(self.snapshots.len() - 1);
    }

    /// Step back; returns the snapshot to restore
    pub fn undo(&mut self) -> Option<&str> {
        let cursor = self.cursor.filter(|&c| c > 0)? - 1;
        self.cursor = Some(cursor);
        self.snapshots.get(cursor).map(String::as_str)
    }

    /// Step forward; returns the snapshot to restore
    pub fn redo(&mut self) -> Option<&str> {
        let cursor = self.cursor? + 1;
        if cursor >= self.snapshots.len() {
            return None;
        }
        self.cursor = Some(cursor);
        self.snapshots.get(cursor).map(String::as_str)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.snapshots.len())
    }

    pub fn current(&self) -> Option<&str> {
        self.snapshots.get(self.cursor?).map(String::as_str)
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = None;
    }
}
