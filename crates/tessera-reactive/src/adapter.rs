//! Reactive effect adapter
//!
//! Wraps a late-bound [`ReactivityEngine`] so that:
//! - effect re-runs go through a [`Scheduler`] unless scheduling is disabled
//! - effects can be bound to an element and released with it
//!
//! The engine can be swapped at startup with
//! [`set_reactivity_engine`](ReactiveAdapter::set_reactivity_engine); until
//! then every primitive except `release` reports [`Error::EngineNotBound`].

use crate::engine::{EffectBody, Job, ReactivityEngine, SchedulerHook};
use crate::error::{Error, Result};
use crate::scheduler::Scheduler;
use indexmap::{IndexMap, IndexSet};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tessera_core::MutationPipeline;
use tessera_dom::Element;
use tracing::{debug, trace};

type EffectFactory<E> = Rc<dyn Fn(EffectBody) -> <E as ReactivityEngine>::Effect>;

struct Inner<E: ReactivityEngine> {
    engine: RefCell<Option<Rc<E>>>,
    effect_override: RefCell<Option<EffectFactory<E>>>,
    scheduler: Rc<dyn Scheduler>,
    should_schedule: Rc<Cell<bool>>,
    /// Live effects per element; an entry exists once an effect was bound
    bound: RefCell<IndexMap<Element, IndexSet<E::Effect>>>,
}

/// Shared handle to the adapter
pub struct ReactiveAdapter<E: ReactivityEngine> {
    inner: Rc<Inner<E>>,
}

impl<E: ReactivityEngine> Clone for ReactiveAdapter<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: ReactivityEngine + 'static> ReactiveAdapter<E> {
    /// Create an adapter that hands re-runs to `scheduler`
    pub fn new(scheduler: impl Scheduler + 'static) -> Self {
        Self {
            inner: Rc::new(Inner {
                engine: RefCell::new(None),
                effect_override: RefCell::new(None),
                scheduler: Rc::new(scheduler),
                should_schedule: Rc::new(Cell::new(true)),
                bound: RefCell::new(IndexMap::new()),
            }),
        }
    }

    // === Engine binding ===

    /// Bind the engine whose primitives the adapter wraps
    ///
    /// Rebinding replaces the engine and drops any effect override.
    pub fn set_reactivity_engine(&self, engine: E) {
        *self.inner.engine.borrow_mut() = Some(Rc::new(engine));
        self.inner.effect_override.borrow_mut().take();
        debug!("reactivity engine bound");
    }

    /// Replace the effect-creation primitive
    ///
    /// The override receives the effect body only; it is responsible for its
    /// own scheduling.
    pub fn override_effect(&self, factory: impl Fn(EffectBody) -> E::Effect + 'static) {
        *self.inner.effect_override.borrow_mut() = Some(Rc::new(factory));
        debug!("effect primitive overridden");
    }

    pub fn is_bound(&self) -> bool {
        self.inner.engine.borrow().is_some()
    }

    fn engine(&self) -> Result<Rc<E>> {
        self.inner
            .engine
            .borrow()
            .clone()
            .ok_or(Error::EngineNotBound)
    }

    // === Engine primitives ===

    pub fn reactive(&self, raw: E::Raw) -> Result<E::Reactive> {
        Ok(self.engine()?.reactive(raw))
    }

    pub fn raw(&self, reactive: &E::Reactive) -> Result<E::Raw> {
        Ok(self.engine()?.raw(reactive))
    }

    /// Create an effect whose re-runs follow the scheduling switch
    pub fn effect(&self, body: impl Fn() + 'static) -> Result<E::Effect> {
        let body: EffectBody = Rc::new(body);
        let factory = self.inner.effect_override.borrow().clone();
        if let Some(factory) = factory {
            return Ok(factory(body));
        }
        let engine = self.engine()?;
        Ok(engine.effect(body, self.scheduler_hook()))
    }

    /// Release an effect; a no-op when no engine is bound
    pub fn release(&self, effect: &E::Effect) {
        if let Ok(engine) = self.engine() {
            engine.release(effect);
        }
    }

    fn scheduler_hook(&self) -> SchedulerHook {
        let should_schedule = self.inner.should_schedule.clone();
        let scheduler = self.inner.scheduler.clone();
        Rc::new(move |job: Job| {
            if should_schedule.get() {
                scheduler.schedule(job);
            } else {
                job();
            }
        })
    }

    // === Scheduling switch ===

    /// Run `f` with re-runs executing synchronously instead of being batched
    ///
    /// The previous setting is restored when `f` returns or unwinds.
    pub fn disable_effect_scheduling<R>(&self, f: impl FnOnce() -> R) -> R {
        let _restore = SchedulingGuard::disable(&self.inner.should_schedule);
        f()
    }

    /// Whether re-runs are currently batched
    pub fn is_scheduling(&self) -> bool {
        self.inner.should_schedule.get()
    }

    // === Element-bound effects ===

    /// Create an effect factory bound to `el` and the cleanup for the effect
    /// it creates
    pub fn element_bound_effect(&self, el: Element) -> (BoundEffect<E>, EffectCleanup<E>) {
        let slot = Rc::new(RefCell::new(None));
        (
            BoundEffect {
                adapter: self.clone(),
                el,
                slot: slot.clone(),
            },
            EffectCleanup {
                adapter: self.clone(),
                el,
                slot,
            },
        )
    }

    /// Run every effect bound to `el`
    ///
    /// Returns `None` when no effect was ever bound to `el`, which is the
    /// case where no run-all accessor exists.
    pub fn run_effects(&self, el: Element) -> Result<Option<usize>> {
        let Some(effects) = self.bound_effects(el) else {
            return Ok(None);
        };
        let engine = self.engine()?;
        for effect in &effects {
            engine.run(effect);
        }
        Ok(Some(effects.len()))
    }

    /// Snapshot of the live effects bound to `el`
    pub fn effects_of(&self, el: Element) -> Vec<E::Effect> {
        self.bound_effects(el).unwrap_or_default()
    }

    fn bound_effects(&self, el: Element) -> Option<Vec<E::Effect>> {
        self.inner
            .bound
            .borrow()
            .get(&el)
            .map(|set| set.iter().cloned().collect())
    }

    /// Release every effect bound to `el` and forget its set
    pub fn release_element(&self, el: Element) {
        let effects = self.inner.bound.borrow_mut().shift_remove(&el);
        if let Some(effects) = effects {
            trace!(%el, count = effects.len(), "releasing element effects");
            for effect in &effects {
                self.release(effect);
            }
        }
    }

    /// Release effects of removed elements and their descendants
    pub fn attach(&self, pipeline: &MutationPipeline) {
        let adapter = self.clone();
        let document = pipeline.document().clone();
        pipeline.on_el_removed(move |el| {
            adapter.release_element(el);
            for descendant in document.descendants(el) {
                adapter.release_element(descendant);
            }
        });
    }

    fn bind(&self, el: Element, effect: E::Effect) {
        let mut bound = self.inner.bound.borrow_mut();
        let set = bound.entry(el).or_insert_with(|| {
            trace!(%el, "installing run-all accessor");
            IndexSet::new()
        });
        set.insert(effect);
    }

    /// Remove `effect` from `el`'s set; returns whether it was there
    fn unbind(&self, el: Element, effect: &E::Effect) -> bool {
        self.inner
            .bound
            .borrow_mut()
            .get_mut(&el)
            .is_some_and(|set| set.shift_remove(effect))
    }
}

impl<E: ReactivityEngine> fmt::Debug for ReactiveAdapter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveAdapter")
            .field("bound", &self.inner.engine.borrow().is_some())
            .field("should_schedule", &self.inner.should_schedule.get())
            .field("elements", &self.inner.bound.borrow().len())
            .finish()
    }
}

/// Restores the scheduling switch on drop
struct SchedulingGuard<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl<'a> SchedulingGuard<'a> {
    fn disable(flag: &'a Cell<bool>) -> Self {
        let previous = flag.replace(false);
        Self { flag, previous }
    }
}

impl Drop for SchedulingGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

/// Creates effects bound to one element
pub struct BoundEffect<E: ReactivityEngine> {
    adapter: ReactiveAdapter<E>,
    el: Element,
    slot: Rc<RefCell<Option<E::Effect>>>,
}

impl<E: ReactivityEngine + 'static> BoundEffect<E> {
    /// Create an effect from `body` and bind it to the element
    ///
    /// The paired [`EffectCleanup`] now refers to this effect.
    pub fn run(&self, body: impl Fn() + 'static) -> Result<E::Effect> {
        let effect = self.adapter.effect(body)?;
        self.adapter.bind(self.el, effect.clone());
        *self.slot.borrow_mut() = Some(effect.clone());
        Ok(effect)
    }
}

impl<E: ReactivityEngine> fmt::Debug for BoundEffect<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundEffect")
            .field("el", &self.el)
            .field("effect", &self.slot.borrow())
            .finish()
    }
}

/// Disposes the effect created through the paired [`BoundEffect`]
pub struct EffectCleanup<E: ReactivityEngine> {
    adapter: ReactiveAdapter<E>,
    el: Element,
    slot: Rc<RefCell<Option<E::Effect>>>,
}

impl<E: ReactivityEngine + 'static> EffectCleanup<E> {
    /// Unbind and release the effect; no-op if none was created or it is
    /// already gone
    pub fn cleanup(&self) {
        let Some(effect) = self.slot.borrow_mut().take() else {
            return;
        };
        // Already released together with its element
        if self.adapter.unbind(self.el, &effect) {
            self.adapter.release(&effect);
        }
    }
}

impl<E: ReactivityEngine> fmt::Debug for EffectCleanup<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectCleanup")
            .field("el", &self.el)
            .field("effect", &self.slot.borrow())
            .finish()
    }
}
