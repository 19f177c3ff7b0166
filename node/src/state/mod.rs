//! Versioned object store.
//!
//! Every object type lives in its own table. Mutations made while an [`UndoSession`] is open
//! are recorded in that session's undo layer, so they can be reverted, merged into the
//! enclosing session, or kept. The store's revision counts the layers pushed on top of the
//! permanent state and, between blocks, equals the head block number.
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use session::UndoSession;
use table::{Table, UndoableTable};

mod session;
mod table;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An object stored in the versioned store.
pub trait LedgerObject: Clone + Debug + Send + Sync + 'static {
    const TYPE_NAME: &'static str;

    fn id(&self) -> ObjectId;

    /// Secondary key that must be unique within the table.
    fn unique_key(&self) -> Option<Vec<u8>> {
        None
    }

    /// Key the table keeps its objects sorted by. Several objects may share it.
    fn order_key(&self) -> Option<Vec<u8>> {
        None
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("{type_name} {key} not found")]
    NotFound { type_name: &'static str, key: String },
    #[error("{type_name} with key {key} already exists")]
    DuplicateKey { type_name: &'static str, key: String },
    #[error("{type_name} id mismatch, expected {expected}, got {actual}")]
    IdMismatch {
        type_name: &'static str,
        expected: ObjectId,
        actual: ObjectId,
    },
    #[error("Table for {0} has an unexpected type")]
    TableType(&'static str),
    #[error("No undo history left")]
    UndoHistoryExhausted,
    #[error("Revision can't be changed while {0} undo sessions are open")]
    SessionsOpen(usize),
}

impl StateError {
    pub(crate) fn not_found<T: LedgerObject>(id: ObjectId) -> Self {
        StateError::NotFound {
            type_name: T::TYPE_NAME,
            key: id.to_string(),
        }
    }
}

#[derive(Default)]
struct DatabaseState {
    tables: HashMap<TypeId, Box<dyn UndoableTable>>,
    revision: u64,
    /// Number of open undo layers.
    depth: usize,
}

impl DatabaseState {
    fn table<T: LedgerObject>(&self) -> Option<&Table<T>> {
        self.tables
            .get(&TypeId::of::<T>())
            .and_then(|table| table.as_any().downcast_ref::<Table<T>>())
    }

    fn table_mut<T: LedgerObject>(&mut self) -> Result<&mut Table<T>, StateError> {
        let depth = self.depth;
        self.tables
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Table::<T>::with_depth(depth)))
            .as_any_mut()
            .downcast_mut::<Table<T>>()
            .ok_or(StateError::TableType(T::TYPE_NAME))
    }
}

/// Read-only handle to the store.
#[derive(Clone, Default)]
pub struct StateReader {
    state: Arc<RwLock<DatabaseState>>,
}

impl StateReader {
    pub fn get<T: LedgerObject>(&self, id: ObjectId) -> Result<T, StateError> {
        self.find(id).ok_or_else(|| StateError::not_found::<T>(id))
    }

    pub fn find<T: LedgerObject>(&self, id: ObjectId) -> Option<T> {
        self.state.read().table::<T>()?.get(id).cloned()
    }

    pub fn get_by_key<T: LedgerObject>(&self, key: &[u8]) -> Result<T, StateError> {
        self.find_by_key(key).ok_or_else(|| StateError::NotFound {
            type_name: T::TYPE_NAME,
            key: String::from_utf8_lossy(key).into_owned(),
        })
    }

    pub fn find_by_key<T: LedgerObject>(&self, key: &[u8]) -> Option<T> {
        self.state.read().table::<T>()?.find_by_key(key).cloned()
    }

    /// Objects whose order key is at most `until`, in key order.
    pub fn ordered_until<T: LedgerObject>(&self, until: &[u8]) -> Vec<T> {
        self.state
            .read()
            .table::<T>()
            .map(|table| table.iter_ordered_until(until).cloned().collect())
            .unwrap_or_default()
    }

    /// All objects of a type in id order.
    pub fn all<T: LedgerObject>(&self) -> Vec<T> {
        self.filter(|_: &T| true)
    }

    pub fn filter<T, P>(&self, predicate: P) -> Vec<T>
    where
        T: LedgerObject,
        P: Fn(&T) -> bool,
    {
        self.state
            .read()
            .table::<T>()
            .map(|table| table.iter().filter(|o| predicate(o)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    pub fn undo_depth(&self) -> usize {
        self.state.read().depth
    }
}

/// Mutable handle to the store. Clones share the same state.
#[derive(Clone, Default)]
pub struct Database {
    reader: StateReader,
}

impl Deref for Database {
    type Target = StateReader;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reader(&self) -> StateReader {
        self.reader.clone()
    }

    /// Creates an object with the next free id of its table.
    pub fn create<T, F>(&self, constructor: F) -> Result<T, StateError>
    where
        T: LedgerObject,
        F: FnOnce(ObjectId) -> T,
    {
        let mut state = self.reader.state.write();
        let table = state.table_mut::<T>()?;
        let object = constructor(table.next_id());
        table.insert(object.clone())?;
        Ok(object)
    }

    pub fn modify<T, F>(&self, object: &T, f: F) -> Result<T, StateError>
    where
        T: LedgerObject,
        F: FnOnce(&mut T),
    {
        self.modify_by_id(object.id(), f)
    }

    pub fn modify_by_id<T, F>(&self, id: ObjectId, f: F) -> Result<T, StateError>
    where
        T: LedgerObject,
        F: FnOnce(&mut T),
    {
        let mut state = self.reader.state.write();
        state.table_mut::<T>()?.modify(id, f)
    }

    pub fn remove<T: LedgerObject>(&self, object: &T) -> Result<(), StateError> {
        let mut state = self.reader.state.write();
        state.table_mut::<T>()?.remove(object.id())
    }

    /// Opens a new undo layer on every table. Revision goes up by one.
    pub fn start_undo_session(&self) -> UndoSession {
        let mut state = self.reader.state.write();
        state.revision += 1;
        state.depth += 1;
        for table in state.tables.values_mut() {
            table.start_undo();
        }
        UndoSession::new(self.clone(), state.revision)
    }

    /// Reverts the most recent undo layer.
    pub fn undo(&self) -> Result<(), StateError> {
        let mut state = self.reader.state.write();
        if state.depth == 0 {
            return Err(StateError::UndoHistoryExhausted);
        }
        state.revision -= 1;
        state.depth -= 1;
        for table in state.tables.values_mut() {
            table.undo();
        }
        Ok(())
    }

    pub fn undo_all(&self) {
        while self.undo().is_ok() {}
    }

    /// Merges the most recent undo layer into the one below it.
    pub(crate) fn squash(&self) -> Result<(), StateError> {
        let mut state = self.reader.state.write();
        if state.depth == 0 {
            return Err(StateError::UndoHistoryExhausted);
        }
        state.revision -= 1;
        state.depth -= 1;
        for table in state.tables.values_mut() {
            table.squash();
        }
        Ok(())
    }

    /// Makes every layer with revision <= `revision` permanent.
    pub fn commit(&self, revision: u64) {
        let mut state = self.reader.state.write();
        let keep = state.revision.saturating_sub(revision) as usize;
        let keep = keep.min(state.depth);
        if keep == state.depth {
            return;
        }
        log::trace!("Committing state up to revision {revision}, keeping {keep} undo layers");
        state.depth = keep;
        for table in state.tables.values_mut() {
            table.commit(keep);
        }
    }

    pub fn set_revision(&self, revision: u64) -> Result<(), StateError> {
        let mut state = self.reader.state.write();
        if state.depth > 0 {
            return Err(StateError::SessionsOpen(state.depth));
        }
        state.revision = revision;
        Ok(())
    }

    /// Drops all objects and history.
    pub fn wipe(&self) {
        let mut state = self.reader.state.write();
        *state = DatabaseState::default();
    }

    pub(crate) fn is_session_top(&self, revision: u64) -> bool {
        let state = self.reader.state.read();
        state.depth > 0 && state.revision == revision
    }
}
