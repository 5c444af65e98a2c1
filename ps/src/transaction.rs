//! Lock-scoped read-modify-write over a single document

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::document::{Versioned, read_document, write_document};
use crate::lock::{StoreLock, lock_path_for};
use crate::StoreError;

/// Outcome of a mutation closure passed to [`DocumentStore::update`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation<T> {
    /// Replace the document with this value
    Write(T),
    /// Leave the document as it is
    Unchanged,
}

/// Handle to one document file and its lock
#[derive(Debug, Clone)]
pub struct DocumentStore<T> {
    path: PathBuf,
    lock_path: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T: Versioned> DocumentStore<T> {
    /// Create a store for the document at `path` (the file need not exist)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = lock_path_for(&path);
        debug!(?path, ?lock_path, "DocumentStore::new: called");
        Self {
            path,
            lock_path,
            _doc: PhantomData,
        }
    }

    /// Path of the document file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the lock file
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Read the document without locking
    ///
    /// Suitable for diagnostics that only report; anything that writes must go
    /// through [`DocumentStore::begin`] or [`DocumentStore::update`].
    pub fn load(&self) -> Result<Option<T>, StoreError> {
        debug!(path = ?self.path, "DocumentStore::load: called");
        read_document(&self.path)
    }

    /// Start a transaction, waiting for the lock if another process holds it
    pub fn begin(&self) -> Result<Transaction<'_, T>, StoreError> {
        debug!(path = ?self.path, "DocumentStore::begin: called");
        let lock = StoreLock::acquire(&self.lock_path)?;
        Ok(Transaction { store: self, _lock: lock })
    }

    /// Start a transaction, failing with `StoreError::Locked` instead of waiting
    pub fn try_begin(&self) -> Result<Transaction<'_, T>, StoreError> {
        debug!(path = ?self.path, "DocumentStore::try_begin: called");
        let lock = StoreLock::try_acquire(&self.lock_path)?;
        Ok(Transaction { store: self, _lock: lock })
    }

    /// Lock, load, apply `f`, write if asked, unlock
    ///
    /// The lock is released on every path out of this function, including
    /// when `f` fails or panics.
    pub fn update<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(Option<T>) -> Result<(Mutation<T>, R), E>,
        E: From<StoreError>,
    {
        debug!(path = ?self.path, "DocumentStore::update: called");
        let tx = self.begin()?;
        let current = tx.load()?;
        let (mutation, result) = f(current)?;
        match mutation {
            Mutation::Write(doc) => {
                debug!("DocumentStore::update: writing");
                tx.save(&doc)?;
            }
            Mutation::Unchanged => {
                debug!("DocumentStore::update: unchanged");
            }
        }
        Ok(result)
    }
}

/// An open read-modify-write cycle; the lock is held until this is dropped
#[derive(Debug)]
pub struct Transaction<'a, T> {
    store: &'a DocumentStore<T>,
    _lock: StoreLock,
}

impl<T: Versioned> Transaction<'_, T> {
    /// Load the document under the lock
    pub fn load(&self) -> Result<Option<T>, StoreError> {
        read_document(&self.store.path)
    }

    /// Atomically replace the document under the lock
    pub fn save(&self, doc: &T) -> Result<(), StoreError> {
        write_document(&self.store.path, doc)
    }

    /// Path of the document file
    pub fn path(&self) -> &Path {
        &self.store.path
    }
}
