use std::collections::BTreeMap;
use std::fmt;

/// An entry which can be stored in a [TimeSortedContainer]: it carries an
/// identifier and a time tag.
pub trait ContainerEntry {
    /// The identifier type, typically a string or an integer.
    type Id: Ord + Clone + fmt::Debug;

    /// Returns the identifier under which this entry is grouped.
    fn entry_id(&self) -> Self::Id;

    /// Returns the time tag by which this entry is sorted.
    fn time(&self) -> f64;
}

/// A container for storing and retrieving entries sorted first by an
/// associated identifier and then by time.
///
/// Each identifier holds at most `max_size` entries; inserting beyond the
/// bound evicts the oldest entries. Within an identifier, entries are
/// strictly ordered by time: adding an entry whose `(id, time)` matches an
/// existing one replaces it.
#[derive(Debug)]
pub struct TimeSortedContainer<E: ContainerEntry> {
    entries: BTreeMap<E::Id, Vec<Box<E>>>,
    max_size: usize,
}

impl<E: ContainerEntry> Default for TimeSortedContainer<E> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            max_size: usize::MAX,
        }
    }
}

impl<E: ContainerEntry> TimeSortedContainer<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes a container whose per-identifier entry count is bounded.
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Updates the per-identifier bound and evicts the oldest entries of any
    /// identifier currently above it.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        for seq in self.entries.values_mut() {
            while seq.len() > max_size {
                seq.remove(0);
            }
        }
    }

    /// Adds an entry, taking ownership. The entry is placed at the position
    /// given by a lower bound on its time; an entry already present with the
    /// exact same `(id, time)` is replaced. If the identifier then holds more
    /// than `max_size` entries, the oldest are dropped in order.
    pub fn add(&mut self, entry: Box<E>) {
        let time = entry.time();
        let seq = self.entries.entry(entry.entry_id()).or_insert_with(Vec::new);
        let idx = seq.partition_point(|existing| existing.time() < time);
        if idx < seq.len() && seq[idx].time() == time {
            seq[idx] = entry;
        } else {
            seq.insert(idx, entry);
        }
        while seq.len() > self.max_size {
            seq.remove(0);
        }
    }

    /// Retrieves the entry tagged at exactly the specified time.
    pub fn get_at(&self, id: &E::Id, time: f64) -> Option<&E> {
        let seq = self.entries.get(id)?;
        let idx = seq.partition_point(|existing| existing.time() < time);
        match seq.get(idx) {
            Some(entry) if entry.time() == time => Some(entry),
            _ => None,
        }
    }

    /// Retrieves the latest entry associated with the specified identifier.
    pub fn latest(&self, id: &E::Id) -> Option<&E> {
        self.entries
            .get(id)
            .and_then(|seq| seq.last())
            .map(|boxed| &**boxed)
    }

    /// Retrieves the entry with the greatest time not exceeding `time`.
    pub fn most_recent_available(&self, id: &E::Id, time: f64) -> Option<&E> {
        let seq = self.entries.get(id)?;
        let idx = seq.partition_point(|existing| existing.time() <= time);
        if idx == 0 {
            None
        } else {
            seq.get(idx - 1).map(|boxed| &**boxed)
        }
    }

    /// Retrieves all entries with the specified identifier whose time lies in
    /// `[start_time, end_time]`, inclusive on both ends.
    pub fn get(&self, id: &E::Id, start_time: f64, end_time: f64) -> Vec<&E> {
        match self.entries.get(id) {
            Some(seq) => seq
                .iter()
                .filter(|entry| entry.time() >= start_time && entry.time() <= end_time)
                .map(|boxed| &**boxed)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Retrieves all entries with the specified identifier.
    pub fn get_all(&self, id: &E::Id) -> Vec<&E> {
        match self.entries.get(id) {
            Some(seq) => seq.iter().map(|boxed| &**boxed).collect(),
            None => Vec::new(),
        }
    }

    /// Iterates over every entry as `(id, time, entry)` triples, ordered by
    /// identifier and then time.
    pub fn iter(&self) -> impl Iterator<Item = (&E::Id, f64, &E)> {
        self.entries.iter().flat_map(|(id, seq)| {
            seq.iter().map(move |entry| (id, entry.time(), &**entry))
        })
    }

    /// Deletes all entries with the specified identifier whose time lies in
    /// `[start_time, end_time]` and returns how many were dropped.
    pub fn delete(&mut self, id: &E::Id, start_time: f64, end_time: f64) -> usize {
        let mut dropped = 0;
        if let Some(seq) = self.entries.get_mut(id) {
            let before = seq.len();
            seq.retain(|entry| entry.time() < start_time || entry.time() > end_time);
            dropped = before - seq.len();
            if seq.is_empty() {
                self.entries.remove(id);
            }
        }
        dropped
    }

    /// Deletes an entry by reference identity. Returns whether it was found.
    pub fn delete_entry(&mut self, entry: &E) -> bool {
        self.take_entry(entry).is_some()
    }

    /// Removes an entry by reference identity without dropping it, releasing
    /// ownership back to the caller.
    pub fn take_entry(&mut self, entry: &E) -> Option<Box<E>> {
        let id = entry.entry_id();
        let seq = self.entries.get_mut(&id)?;
        let idx = seq
            .iter()
            .position(|existing| std::ptr::eq(&**existing, entry))?;
        let taken = seq.remove(idx);
        if seq.is_empty() {
            self.entries.remove(&id);
        }
        Some(taken)
    }

    /// Deletes all entries associated with the specified identifier.
    pub fn delete_id(&mut self, id: &E::Id) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Deletes every entry in this container.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the number of entries contained within this object.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Returns the number of entries associated with the given identifier.
    pub fn len_of(&self, id: &E::Id) -> usize {
        self.entries.get(id).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the identifiers currently present, in order.
    pub fn ids(&self) -> Vec<E::Id> {
        self.entries.keys().cloned().collect()
    }
}
