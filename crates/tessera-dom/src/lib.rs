//! Tessera DOM - the document platform the runtime observes
//!
//! This crate provides the pieces a browser would normally supply:
//! - An arena document tree with validated [`Element`] handles
//! - A [`MutationObserver`] that batches [`MutationRecord`]s per microtask
//! - A single-threaded [`Microtasks`] queue for cooperative deferral
//!
//! Everything here is `!Send`: one runtime lives on one thread.

mod error;
mod identity;
mod microtask;
mod observer;
mod tree;

pub use error::{Error, Result};
pub use identity::{Element, NodeId};
pub use microtask::Microtasks;
pub use observer::{MutationKind, MutationObserver, MutationRecord, ObserverInit};
pub use tree::{Document, NodeType};
