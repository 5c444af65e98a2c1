//! PoolStore - versioned JSON documents shared between processes
//!
//! A document lives in a single JSON file. Readers see either the previous or
//! the next complete version of the file, never a partial write, and writers
//! serialize through an advisory lock on a sibling `.lock` file.
//!
//! # Layout
//!
//! ```text
//! <dir>/
//! ├── pool.json        # the document
//! └── pool.json.lock   # advisory lock (contents unused)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use poolstore::{DocumentStore, Mutation};
//!
//! let store = DocumentStore::<MyDoc>::new("/path/pool.json");
//! let current = store.load()?;                      // unlocked read
//! store.update(|doc| {
//!     let mut doc = doc.unwrap_or_default();
//!     doc.counter += 1;
//!     Ok::<_, poolstore::StoreError>((Mutation::Write(doc), ()))
//! })?;
//! ```

mod document;
mod error;
mod lock;
mod transaction;

pub use document::{Versioned, read_document, write_document};
pub use error::StoreError;
pub use lock::{StoreLock, lock_path_for};
pub use transaction::{DocumentStore, Mutation, Transaction};
