use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::state::{LedgerObject, ObjectId, StateError};
use crate::utilities::to_hex;

/// Type-erased view of a table, used for operations applied to every table at once.
pub(crate) trait UndoableTable: Send + Sync {
    fn start_undo(&mut self);

    fn undo(&mut self);

    fn squash(&mut self);

    /// Keeps only the `keep` most recent layers.
    fn commit(&mut self, keep: usize);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Everything needed to revert one session's changes to a table.
#[derive(Debug)]
pub(crate) struct UndoLayer<T> {
    /// Value before the first modification in this layer.
    old_values: BTreeMap<ObjectId, T>,
    /// Objects that existed before this layer and were removed in it.
    removed: BTreeMap<ObjectId, T>,
    created: BTreeSet<ObjectId>,
    old_next_id: u64,
}

impl<T> UndoLayer<T> {
    fn new(old_next_id: u64) -> Self {
        Self {
            old_values: BTreeMap::new(),
            removed: BTreeMap::new(),
            created: BTreeSet::new(),
            old_next_id,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Table<T> {
    objects: BTreeMap<ObjectId, T>,
    unique: BTreeMap<Vec<u8>, ObjectId>,
    ordered: BTreeSet<(Vec<u8>, ObjectId)>,
    next_id: u64,
    stack: VecDeque<UndoLayer<T>>,
}

impl<T: LedgerObject> Table<T> {
    /// A table created while `depth` sessions are open joins all of them.
    pub(crate) fn with_depth(depth: usize) -> Self {
        Self {
            objects: BTreeMap::new(),
            unique: BTreeMap::new(),
            ordered: BTreeSet::new(),
            next_id: 0,
            stack: (0..depth).map(|_| UndoLayer::new(0)).collect(),
        }
    }

    pub(crate) fn next_id(&self) -> ObjectId {
        ObjectId(self.next_id)
    }

    pub(crate) fn get(&self, id: ObjectId) -> Option<&T> {
        self.objects.get(&id)
    }

    pub(crate) fn find_by_key(&self, key: &[u8]) -> Option<&T> {
        self.unique.get(key).and_then(|id| self.objects.get(id))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.objects.values()
    }

    /// Objects whose order key is at most `until`, lowest key first.
    pub(crate) fn iter_ordered_until<'a>(&'a self, until: &[u8]) -> impl Iterator<Item = &'a T> + 'a {
        self.ordered
            .range(..=(until.to_vec(), ObjectId(u64::MAX)))
            .filter_map(|(_, id)| self.objects.get(id))
    }

    pub(crate) fn insert(&mut self, object: T) -> Result<(), StateError> {
        let id = object.id();
        if id.0 != self.next_id {
            return Err(StateError::IdMismatch {
                type_name: T::TYPE_NAME,
                expected: ObjectId(self.next_id),
                actual: id,
            });
        }
        if let Some(key) = object.unique_key() {
            if self.unique.contains_key(&key) {
                return Err(StateError::DuplicateKey {
                    type_name: T::TYPE_NAME,
                    key: to_hex(&key),
                });
            }
            self.unique.insert(key, id);
        }
        if let Some(key) = object.order_key() {
            self.ordered.insert((key, id));
        }

        self.objects.insert(id, object);
        self.next_id += 1;
        if let Some(layer) = self.stack.back_mut() {
            layer.created.insert(id);
        }
        Ok(())
    }

    pub(crate) fn modify<F>(&mut self, id: ObjectId, f: F) -> Result<T, StateError>
    where
        F: FnOnce(&mut T),
    {
        let Some(object) = self.objects.get_mut(&id) else {
            return Err(StateError::not_found::<T>(id));
        };
        let old = object.clone();
        f(object);
        let new_key = object.unique_key();
        let old_key = old.unique_key();
        let new_order = object.order_key();
        let old_order = old.order_key();

        if new_key != old_key {
            if let Some(key) = &new_key {
                if self.unique.contains_key(key) {
                    self.objects.insert(id, old);
                    return Err(StateError::DuplicateKey {
                        type_name: T::TYPE_NAME,
                        key: to_hex(key),
                    });
                }
            }
            if let Some(key) = &old_key {
                self.unique.remove(key);
            }
            if let Some(key) = new_key {
                self.unique.insert(key, id);
            }
        }

        if new_order != old_order {
            if let Some(key) = old_order {
                self.ordered.remove(&(key, id));
            }
            if let Some(key) = new_order {
                self.ordered.insert((key, id));
            }
        }

        let updated = self.objects.get(&id).cloned();
        if let Some(layer) = self.stack.back_mut() {
            if !layer.created.contains(&id) && !layer.old_values.contains_key(&id) {
                layer.old_values.insert(id, old);
            }
        }
        updated.ok_or_else(|| StateError::not_found::<T>(id))
    }

    pub(crate) fn remove(&mut self, id: ObjectId) -> Result<(), StateError> {
        let Some(object) = self.objects.remove(&id) else {
            return Err(StateError::not_found::<T>(id));
        };
        if let Some(key) = object.unique_key() {
            self.unique.remove(&key);
        }
        if let Some(key) = object.order_key() {
            self.ordered.remove(&(key, id));
        }

        if let Some(layer) = self.stack.back_mut() {
            if layer.created.remove(&id) {
                return Ok(());
            }
            match layer.old_values.remove(&id) {
                Some(original) => layer.removed.insert(id, original),
                None => layer.removed.insert(id, object),
            };
        }
        Ok(())
    }

    fn detach(&mut self, id: ObjectId) {
        if let Some(object) = self.objects.remove(&id) {
            if let Some(key) = object.unique_key() {
                self.unique.remove(&key);
            }
            if let Some(key) = object.order_key() {
                self.ordered.remove(&(key, id));
            }
        }
    }

    fn attach(&mut self, object: T) {
        let id = object.id();
        if let Some(key) = object.unique_key() {
            self.unique.insert(key, id);
        }
        if let Some(key) = object.order_key() {
            self.ordered.insert((key, id));
        }
        self.objects.insert(id, object);
    }
}

impl<T: LedgerObject> UndoableTable for Table<T> {
    fn start_undo(&mut self) {
        self.stack.push_back(UndoLayer::new(self.next_id));
    }

    fn undo(&mut self) {
        let Some(layer) = self.stack.pop_back() else {
            return;
        };

        // Detach everything first so restored unique keys never collide with current ones.
        for id in &layer.created {
            self.detach(*id);
        }
        for id in layer.old_values.keys() {
            self.detach(*id);
        }
        for (_, object) in layer.old_values {
            self.attach(object);
        }
        for (_, object) in layer.removed {
            self.attach(object);
        }
        self.next_id = layer.old_next_id;
    }

    fn squash(&mut self) {
        let Some(top) = self.stack.pop_back() else {
            return;
        };
        let Some(previous) = self.stack.back_mut() else {
            // Squashing the only layer folds it into the permanent state.
            return;
        };

        for (id, value) in top.old_values {
            if previous.created.contains(&id) || previous.old_values.contains_key(&id) {
                continue;
            }
            previous.old_values.insert(id, value);
        }

        for id in top.created {
            previous.created.insert(id);
        }

        for (id, value) in top.removed {
            if previous.created.remove(&id) {
                continue;
            }
            match previous.old_values.remove(&id) {
                Some(original) => previous.removed.insert(id, original),
                None => previous.removed.insert(id, value),
            };
        }
    }

    fn commit(&mut self, keep: usize) {
        while self.stack.len() > keep {
            self.stack.pop_front();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
