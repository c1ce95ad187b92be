//! The mutation pipeline
//!
//! Observes the document, buffers change records, classifies each batch and
//! fans the result out to the lifecycle callbacks registered by the directive
//! layer. Dispatch for one batch always runs in this order:
//!
//! 1. attribute cleanups for removed (and changed) attributes
//! 2. attributes-added callbacks
//! 3. element-added callbacks, skipping moved elements
//! 4. element-removed callbacks, skipping moved elements, then full attribute
//!    teardown of the removed subtree
//!
//! Records reach the pipeline two ways: taken early by
//! [`MutationPipeline::flush_observer`] or delivered by the observer's own
//! microtask. Both feed one record queue, so a batch always holds every record
//! in the order the changes happened.
//!
//! Writes the runtime makes itself go through [`MutationPipeline::mutate_dom`],
//! which turns observation off for their duration.

use crate::classify::Classification;
use crate::cleanup::AttributeCleanupRegistry;
use crate::config::PipelineConfig;
use crate::record::{Attribute, ChangeRecord};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tessera_dom::{Document, Element, Microtasks, MutationObserver, MutationRecord};
use tracing::{debug, trace, warn};

/// Callback for element-added and element-removed events
pub type ElementCallback = Rc<dyn Fn(Element)>;

/// Callback for attributes announced on one element
pub type AttributesCallback = Rc<dyn Fn(Element, &[Attribute])>;

struct Inner {
    document: Document,
    microtasks: Microtasks,
    observer: MutationObserver,
    config: PipelineConfig,
    on_el_added: RefCell<Vec<ElementCallback>>,
    on_el_removed: RefCell<Vec<ElementCallback>>,
    on_attributes_added: RefCell<Vec<AttributesCallback>>,
    cleanups: AttributeCleanupRegistry,
    /// Records taken from the observer and waiting for the deferred flush
    record_queue: RefCell<Vec<ChangeRecord>>,
    flush_pending: Cell<bool>,
    /// A batch is being dispatched
    processing: Cell<bool>,
    observing: Cell<bool>,
}

/// Shared handle to the pipeline of one document
///
/// Cloning the handle does not clone the pipeline. Every operation may be
/// called from inside a callback the pipeline is running.
#[derive(Clone)]
pub struct MutationPipeline {
    inner: Rc<Inner>,
}

impl MutationPipeline {
    /// Create a pipeline for `document` with the default configuration
    pub fn new(document: &Document, microtasks: &Microtasks) -> Self {
        Self::with_config(document, microtasks, PipelineConfig::default())
    }

    /// Create a pipeline with a specific configuration
    ///
    /// The pipeline starts out not observing; call
    /// [`start_observing`](Self::start_observing) once the directive layer has
    /// registered its callbacks.
    pub fn with_config(
        document: &Document,
        microtasks: &Microtasks,
        config: PipelineConfig,
    ) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let observer = MutationObserver::new(microtasks, move |records| {
                if let Some(inner) = weak.upgrade() {
                    MutationPipeline { inner }.on_mutate(records);
                }
            });
            Inner {
                document: document.clone(),
                microtasks: microtasks.clone(),
                observer,
                config,
                on_el_added: RefCell::new(Vec::new()),
                on_el_removed: RefCell::new(Vec::new()),
                on_attributes_added: RefCell::new(Vec::new()),
                cleanups: AttributeCleanupRegistry::new(),
                record_queue: RefCell::new(Vec::new()),
                flush_pending: Cell::new(false),
                processing: Cell::new(false),
                observing: Cell::new(false),
            }
        });
        Self { inner }
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    pub fn microtasks(&self) -> &Microtasks {
        &self.inner.microtasks
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    // === Registration ===

    /// Register a callback for elements added to the tree
    pub fn on_el_added(&self, callback: impl Fn(Element) + 'static) {
        self.inner.on_el_added.borrow_mut().push(Rc::new(callback));
    }

    /// Register a callback for elements removed from the tree
    pub fn on_el_removed(&self, callback: impl Fn(Element) + 'static) {
        self.inner.on_el_removed.borrow_mut().push(Rc::new(callback));
    }

    /// Register a callback for attributes added to (or changed on) an element
    pub fn on_attributes_added(&self, callback: impl Fn(Element, &[Attribute]) + 'static) {
        self.inner
            .on_attributes_added
            .borrow_mut()
            .push(Rc::new(callback));
    }

    /// Register a cleanup to run when `name` is removed from or changed on
    /// `el`, or when `el` leaves the tree
    pub fn on_attribute_removed(
        &self,
        el: Element,
        name: impl Into<String>,
        callback: impl FnOnce() + 'static,
    ) {
        self.inner.cleanups.register(el, name, Box::new(callback));
    }

    /// Run and delete the cleanups of `el` for `names`, or for every name
    pub fn cleanup_attributes(&self, el: Element, names: Option<&[String]>) {
        let ran = self.inner.cleanups.run(el, names);
        if ran > 0 {
            trace!(%el, ran, "ran attribute cleanups");
        }
    }

    /// Whether a cleanup entry exists for `name` on `el`
    pub fn has_attribute_cleanups(&self, el: Element, name: &str) -> bool {
        self.inner.cleanups.contains(el, name)
    }

    // === Observation control ===

    /// Attach the platform observer to the document root
    pub fn start_observing(&self) {
        if self.inner.observing.get() {
            return;
        }
        let document = &self.inner.document;
        self.inner
            .observer
            .observe(document, document.root(), self.inner.config.observe);
        self.inner.observing.set(true);
        debug!("started observing mutations");
    }

    /// Detach the platform observer, dropping records it has not handed over
    pub fn stop_observing(&self) {
        if !self.inner.observing.get() {
            return;
        }
        self.inner.observer.disconnect();
        self.inner.observing.set(false);
        debug!("stopped observing mutations");
    }

    pub fn is_observing(&self) -> bool {
        self.inner.observing.get()
    }

    /// Move undelivered observer records into the queue and make sure one
    /// deferred flush is scheduled for them
    pub fn flush_observer(&self) {
        let records = self.inner.observer.take_records();
        self.enqueue(records);
        self.schedule_flush();
    }

    /// Run `f` as a runtime-initiated write that must not be observed
    ///
    /// When observing, pending external records are flushed first so they
    /// keep their place in the ordering; observation resumes when `f`
    /// returns or unwinds. When not observing, `f` runs directly.
    pub fn mutate_dom<R>(&self, f: impl FnOnce() -> R) -> R {
        if !self.is_observing() {
            return f();
        }

        self.flush_observer();
        self.stop_observing();
        let _resume = ResumeObserving(self);
        f()
    }

    /// Records waiting for the deferred flush
    pub fn queued_records(&self) -> usize {
        self.inner.record_queue.borrow().len()
    }

    pub fn is_flush_pending(&self) -> bool {
        self.inner.flush_pending.get()
    }

    // === Processing ===

    fn enqueue(&self, records: Vec<MutationRecord>) {
        if records.is_empty() {
            return;
        }
        let validated = self.validate(records);
        self.inner.record_queue.borrow_mut().extend(validated);
    }

    fn validate(&self, records: Vec<MutationRecord>) -> Vec<ChangeRecord> {
        records
            .into_iter()
            .filter_map(
                |record| match ChangeRecord::validate(&self.inner.document, record) {
                    Ok(record) => Some(record),
                    Err(err) => {
                        debug_assert!(false, "platform broke the record contract: {err}");
                        warn!(%err, "dropping malformed mutation record");
                        None
                    }
                },
            )
            .collect()
    }

    fn schedule_flush(&self) {
        let has_records = !self.inner.record_queue.borrow().is_empty();
        if !has_records || self.inner.flush_pending.get() {
            return;
        }
        self.inner.flush_pending.set(true);
        let weak = Rc::downgrade(&self.inner);
        self.inner.microtasks.queue(move || {
            if let Some(inner) = weak.upgrade() {
                MutationPipeline { inner }.process_record_queue();
            }
        });
    }

    fn process_record_queue(&self) {
        // Cleared first: records queued while dispatching schedule their own flush.
        self.inner.flush_pending.set(false);

        let batch = self.inner.record_queue.borrow().clone();
        {
            let _processing = Processing::enter(&self.inner.processing);
            self.dispatch(&batch);
        }

        let mut queue = self.inner.record_queue.borrow_mut();
        let processed = batch.len().min(queue.len());
        queue.drain(..processed);
    }

    /// Platform delivery path: the observer's own microtask hands a batch over
    ///
    /// Delivered records go behind anything `flush_observer` already queued,
    /// then the whole queue is processed as one batch.
    fn on_mutate(&self, records: Vec<MutationRecord>) {
        self.enqueue(records);
        if self.inner.processing.get() {
            self.schedule_flush();
            return;
        }
        self.process_record_queue();
    }

    fn dispatch(&self, batch: &[ChangeRecord]) {
        if batch.is_empty() {
            return;
        }
        let classification = Classification::classify(&self.inner.document, batch);
        if classification.is_empty() {
            return;
        }
        trace!(
            records = batch.len(),
            added = classification.added_elements.len(),
            removed = classification.removed_elements.len(),
            attributes_added = classification.added_attributes.len(),
            attributes_removed = classification.removed_attributes.len(),
            "dispatching mutation batch"
        );

        for (el, names) in &classification.removed_attributes {
            self.cleanup_attributes(*el, Some(names.as_slice()));
        }

        let callbacks = self.inner.on_attributes_added.borrow().clone();
        for (el, attributes) in &classification.added_attributes {
            for callback in &callbacks {
                callback(*el, attributes);
            }
        }

        let callbacks = self.inner.on_el_added.borrow().clone();
        for el in classification.elements_added() {
            trace!(%el, tag = ?self.inner.document.tag_name(el), "element added");
            for callback in &callbacks {
                callback(el);
            }
        }

        let callbacks = self.inner.on_el_removed.borrow().clone();
        for el in classification.elements_removed() {
            trace!(%el, tag = ?self.inner.document.tag_name(el), "element removed");
            for callback in &callbacks {
                callback(el);
            }
            if self.inner.config.teardown_removed_subtrees {
                self.teardown(el);
            }
        }
    }

    /// Run every remaining attribute cleanup of `el` and its descendants
    fn teardown(&self, el: Element) {
        self.cleanup_attributes(el, None);
        for descendant in self.inner.document.descendants(el) {
            self.cleanup_attributes(descendant, None);
        }
    }
}

/// Marks a dispatch in progress until dropped
struct Processing<'a>(&'a Cell<bool>);

impl<'a> Processing<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for Processing<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Turns observation back on when a `mutate_dom` scope ends
struct ResumeObserving<'a>(&'a MutationPipeline);

impl Drop for ResumeObserving<'_> {
    fn drop(&mut self) {
        self.0.start_observing();
    }
}

impl fmt::Debug for MutationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationPipeline")
            .field("observing", &self.inner.observing.get())
            .field("flush_pending", &self.inner.flush_pending.get())
            .field("queued_records", &self.queued_records())
            .field("cleanups", &self.inner.cleanups)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Added(Element),
        Removed(Element),
        Attributes(Element, Vec<Attribute>),
        Cleanup(Element, &'static str),
    }

    struct Harness {
        doc: Document,
        tasks: Microtasks,
        pipeline: MutationPipeline,
        events: Rc<RefCell<Vec<Event>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(PipelineConfig::default())
        }

        fn with_config(config: PipelineConfig) -> Self {
            let doc = Document::new();
            let tasks = Microtasks::new();
            let pipeline = MutationPipeline::with_config(&doc, &tasks, config);
            let events = Rc::new(RefCell::new(Vec::new()));

            let sink = events.clone();
            pipeline.on_el_added(move |el| sink.borrow_mut().push(Event::Added(el)));
            let sink = events.clone();
            pipeline.on_el_removed(move |el| sink.borrow_mut().push(Event::Removed(el)));
            let sink = events.clone();
            pipeline.on_attributes_added(move |el, attrs| {
                sink.borrow_mut().push(Event::Attributes(el, attrs.to_vec()))
            });

            pipeline.start_observing();
            Self {
                doc,
                tasks,
                pipeline,
                events,
            }
        }

        fn cleanup_logger(&self, el: Element, name: &'static str) {
            let sink = self.events.clone();
            self.pipeline
                .on_attribute_removed(el, name, move || {
                    sink.borrow_mut().push(Event::Cleanup(el, name))
                });
        }

        fn settle(&self) -> Vec<Event> {
            self.tasks.run_until_idle();
            std::mem::take(&mut *self.events.borrow_mut())
        }

        /// Attach an element without observing it
        fn mount(&self, parent: impl Into<tessera_dom::NodeId>, tag: &str) -> Element {
            let el = self.doc.create_element(tag);
            let parent = parent.into();
            self.pipeline
                .mutate_dom(|| self.doc.append_child(parent, el).unwrap());
            el
        }
    }

    #[test]
    fn test_added_element_fires_after_flush() {
        let h = Harness::new();
        let el = h.doc.create_element("div");
        h.doc.append_child(h.doc.root(), el).unwrap();

        assert!(h.events.borrow().is_empty());
        assert_eq!(h.settle(), vec![Event::Added(el)]);
    }

    #[test]
    fn test_attributes_announced_before_element_added() {
        let h = Harness::new();
        let el = h.doc.create_element("div");
        h.doc.append_child(h.doc.root(), el).unwrap();
        h.doc.set_attribute(el, "x-data", "{}").unwrap();

        assert_eq!(
            h.settle(),
            vec![
                Event::Attributes(el, vec![Attribute::new("x-data", Some("{}".into()))]),
                Event::Added(el),
            ]
        );
    }

    #[test]
    fn test_changed_attribute_cleans_up_then_reapplies() {
        let h = Harness::new();
        let el = h.mount(h.doc.root(), "div");
        h.pipeline
            .mutate_dom(|| h.doc.set_attribute(el, "data-x", "1").unwrap());
        h.cleanup_logger(el, "data-x");
        h.settle();

        h.doc.set_attribute(el, "data-x", "2").unwrap();
        assert_eq!(
            h.settle(),
            vec![
                Event::Cleanup(el, "data-x"),
                Event::Attributes(el, vec![Attribute::new("data-x", Some("2".into()))]),
            ]
        );
        assert!(!h.pipeline.has_attribute_cleanups(el, "data-x"));
    }

    #[test]
    fn test_removed_attribute_runs_cleanup_once() {
        let h = Harness::new();
        let el = h.mount(h.doc.root(), "div");
        h.pipeline
            .mutate_dom(|| h.doc.set_attribute(el, "x", "on").unwrap());
        h.cleanup_logger(el, "x");
        h.cleanup_logger(el, "y");

        h.doc.remove_attribute(el, "x").unwrap();
        assert_eq!(h.settle(), vec![Event::Cleanup(el, "x")]);
        assert!(!h.pipeline.has_attribute_cleanups(el, "x"));
        assert!(h.pipeline.has_attribute_cleanups(el, "y"));

        // Re-adding and removing again does not re-run the old cleanup
        h.doc.set_attribute(el, "x", "on").unwrap();
        h.doc.remove_attribute(el, "x").unwrap();
        let events = h.settle();
        assert!(!events.contains(&Event::Cleanup(el, "x")));
    }

    #[test]
    fn test_removing_element_runs_every_cleanup() {
        let h = Harness::new();
        let el = h.mount(h.doc.root(), "div");
        let child = h.mount(el, "span");
        h.cleanup_logger(el, "a");
        h.cleanup_logger(el, "b");
        h.cleanup_logger(child, "c");

        h.doc.remove(el).unwrap();
        assert_eq!(
            h.settle(),
            vec![
                Event::Removed(el),
                Event::Cleanup(el, "a"),
                Event::Cleanup(el, "b"),
                Event::Cleanup(child, "c"),
            ]
        );
        assert!(!h.pipeline.has_attribute_cleanups(el, "a"));
    }

    #[test]
    fn test_subtree_teardown_can_be_disabled() {
        let h = Harness::with_config(PipelineConfig::default().with_subtree_teardown(false));
        let el = h.mount(h.doc.root(), "div");
        h.cleanup_logger(el, "a");

        h.doc.remove(el).unwrap();
        assert_eq!(h.settle(), vec![Event::Removed(el)]);
        assert!(h.pipeline.has_attribute_cleanups(el, "a"));

        h.pipeline.cleanup_attributes(el, None);
        assert_eq!(h.settle(), vec![Event::Cleanup(el, "a")]);
    }

    #[test]
    fn test_move_fires_nothing_for_moved_child() {
        let h = Harness::new();
        let parent = h.mount(h.doc.root(), "div");
        let child = h.mount(parent, "p");
        let other = h.mount(h.doc.root(), "section");
        h.cleanup_logger(child, "x");

        h.doc.remove(parent).unwrap();
        h.doc.append_child(other, child).unwrap();

        assert_eq!(h.settle(), vec![Event::Removed(parent)]);
        // The moved child kept its cleanups
        assert!(h.pipeline.has_attribute_cleanups(child, "x"));
    }

    #[test]
    fn test_reorder_within_parent_is_a_move() {
        let h = Harness::new();
        let a = h.mount(h.doc.root(), "li");
        let b = h.mount(h.doc.root(), "li");

        h.doc.insert_before(h.doc.root(), b, Some(a.node())).unwrap();
        assert!(h.settle().is_empty());
    }

    #[test]
    fn test_move_around_mutate_dom_is_one_batch() {
        let h = Harness::new();
        let el = h.mount(h.doc.root(), "div");
        h.cleanup_logger(el, "x-text");

        h.doc.remove(el).unwrap();
        h.pipeline.mutate_dom(|| ());
        h.doc.append_child(h.doc.root(), el).unwrap();

        assert!(h.settle().is_empty());
        assert_eq!(h.doc.parent(el), Some(h.doc.root()));
        assert!(h.pipeline.has_attribute_cleanups(el, "x-text"));
    }

    #[test]
    fn test_delivered_records_follow_queued_ones() {
        let h = Harness::new();
        let first = h.doc.create_element("a");
        h.doc.append_child(h.doc.root(), first).unwrap();
        h.pipeline.flush_observer();

        let second = h.doc.create_element("b");
        h.doc.append_child(h.doc.root(), second).unwrap();

        assert_eq!(h.settle(), vec![Event::Added(first), Event::Added(second)]);
        assert_eq!(h.pipeline.queued_records(), 0);
    }

    #[test]
    fn test_text_nodes_are_not_announced() {
        let h = Harness::new();
        let text = h.doc.create_text("hi");
        h.doc.append_child(h.doc.root(), text).unwrap();
        assert!(h.settle().is_empty());
    }

    #[test]
    fn test_ignored_element_changes_are_skipped() {
        let h = Harness::new();
        let owned = h.mount(h.doc.root(), "template");
        h.doc.set_ignore_mutations(owned, true).unwrap();

        h.doc.set_attribute(owned, "x", "1").unwrap();
        h.doc.append_child(owned, h.doc.create_element("b")).unwrap();
        assert!(h.settle().is_empty());
    }

    #[test]
    fn test_mutate_dom_is_not_observed() {
        let h = Harness::new();
        let result = h.pipeline.mutate_dom(|| {
            assert!(!h.pipeline.is_observing());
            let el = h.doc.create_element("div");
            h.doc.append_child(h.doc.root(), el).unwrap();
            42
        });

        assert_eq!(result, 42);
        assert!(h.pipeline.is_observing());
        assert!(h.settle().is_empty());
    }

    #[test]
    fn test_mutate_dom_flushes_pending_external_records_first() {
        let h = Harness::new();
        let external = h.doc.create_element("div");
        h.doc.append_child(h.doc.root(), external).unwrap();

        h.pipeline.mutate_dom(|| {
            let internal = h.doc.create_element("span");
            h.doc.append_child(h.doc.root(), internal).unwrap();
        });
        assert_eq!(h.pipeline.queued_records(), 1);
        assert!(h.pipeline.is_flush_pending());

        assert_eq!(h.settle(), vec![Event::Added(external)]);
        assert_eq!(h.pipeline.queued_records(), 0);
        assert!(!h.pipeline.is_flush_pending());
    }

    #[test]
    fn test_nested_mutate_dom_does_not_toggle_twice() {
        let h = Harness::new();
        h.pipeline.mutate_dom(|| {
            h.pipeline.mutate_dom(|| {
                assert!(!h.pipeline.is_observing());
            });
            // Still suspended after the inner scope ends
            assert!(!h.pipeline.is_observing());
        });
        assert!(h.pipeline.is_observing());
    }

    #[test]
    fn test_mutate_dom_without_observation_runs_directly() {
        let h = Harness::new();
        h.pipeline.stop_observing();

        let el = h.doc.create_element("div");
        h.pipeline
            .mutate_dom(|| h.doc.append_child(h.doc.root(), el).unwrap());
        assert!(!h.pipeline.is_observing());
        assert_eq!(h.tasks.pending(), 0);
    }

    #[test]
    fn test_flush_observer_schedules_one_pass() {
        let h = Harness::new();
        let a = h.doc.create_element("a");
        h.doc.append_child(h.doc.root(), a).unwrap();
        h.pipeline.flush_observer();

        let b = h.doc.create_element("b");
        h.doc.append_child(h.doc.root(), b).unwrap();
        h.pipeline.flush_observer();

        assert_eq!(h.pipeline.queued_records(), 2);
        assert!(h.pipeline.is_flush_pending());
        assert_eq!(h.settle(), vec![Event::Added(a), Event::Added(b)]);
    }

    #[test]
    fn test_flush_observer_without_records_schedules_nothing() {
        let h = Harness::new();
        h.pipeline.flush_observer();
        assert!(!h.pipeline.is_flush_pending());
        assert_eq!(h.tasks.pending(), 0);
    }

    #[test]
    fn test_callback_writes_inside_mutate_dom_do_not_loop() {
        let h = Harness::new();
        let pipeline = h.pipeline.clone();
        let doc = h.doc.clone();
        let renders = Rc::new(Cell::new(0));
        let counter = renders.clone();
        h.pipeline.on_el_added(move |el| {
            counter.set(counter.get() + 1);
            pipeline.mutate_dom(|| doc.set_attribute(el, "data-rendered", "yes").unwrap());
        });

        let el = h.doc.create_element("div");
        h.doc.append_child(h.doc.root(), el).unwrap();
        h.settle();

        assert_eq!(renders.get(), 1);
        assert_eq!(
            h.doc.get_attribute(el, "data-rendered").as_deref(),
            Some("yes")
        );
    }

    #[test]
    fn test_records_queued_during_dispatch_are_processed() {
        let h = Harness::new();
        let pipeline = h.pipeline.clone();
        let doc = h.doc.clone();
        let spawned = Rc::new(Cell::new(None));
        let slot = spawned.clone();
        h.pipeline.on_attributes_added(move |el, attrs| {
            if attrs.iter().any(|a| a.name == "spawn") && slot.get().is_none() {
                let child = doc.create_element("i");
                slot.set(Some(child));
                doc.append_child(el, child).unwrap();
                pipeline.flush_observer();
            }
        });

        let el = h.mount(h.doc.root(), "div");
        h.doc.set_attribute(el, "spawn", "").unwrap();
        h.pipeline.flush_observer();

        let events = h.settle();
        let child = spawned.get().unwrap();
        assert!(events.contains(&Event::Added(child)));
        assert_eq!(h.pipeline.queued_records(), 0);
    }
}
