//! Tessera Core - document-change propagation
//!
//! This crate turns raw platform mutation records into the lifecycle events
//! a directive layer consumes:
//! - Validated [`ChangeRecord`]s and [`Attribute`] payloads
//! - Batch [`Classification`] with move detection
//! - A per-element [`AttributeCleanupRegistry`]
//! - The [`MutationPipeline`] itself: buffering, deferred flushing, ordered
//!   dispatch, and the `mutate_dom` self-mutation guard
//!
//! ## Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use tessera_core::MutationPipeline;
//! use tessera_dom::{Document, Microtasks};
//!
//! let doc = Document::new();
//! let tasks = Microtasks::new();
//! let pipeline = MutationPipeline::new(&doc, &tasks);
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! pipeline.on_el_added(move |el| sink.borrow_mut().push(el));
//! pipeline.start_observing();
//!
//! let el = doc.create_element("div");
//! doc.append_child(doc.root(), el).unwrap();
//! tasks.run_until_idle();
//!
//! assert_eq!(*seen.borrow(), vec![el]);
//! ```

mod classify;
mod cleanup;
mod config;
mod error;
pub mod pipeline;
mod record;

pub use classify::Classification;
pub use cleanup::{AttributeCleanupRegistry, Cleanup};
pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use pipeline::{AttributesCallback, ElementCallback, MutationPipeline};
pub use record::{Attribute, ChangeRecord};
