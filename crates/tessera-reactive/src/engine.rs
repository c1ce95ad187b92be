//! The capability an external reactivity engine supplies
//!
//! Dependency tracking lives entirely in the engine. The adapter only needs to
//! create effects with its own scheduling hook, release them, run them on
//! demand, and pass values in and out of the engine's reactive wrapper.

use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

/// A zero-argument re-run request
///
/// Engines must hand out the same `Rc` for every re-run of one effect so that
/// schedulers can coalesce repeated triggers.
pub type Job = Rc<dyn Fn()>;

/// Called by the engine instead of re-running an effect itself
pub type SchedulerHook = Rc<dyn Fn(Job)>;

/// The body of an effect
pub type EffectBody = Rc<dyn Fn()>;

/// Reactive primitives provided by an external engine
pub trait ReactivityEngine {
    /// Plain value accepted by [`reactive`](Self::reactive)
    type Raw;
    /// The engine's tracked wrapper around a raw value
    type Reactive;
    /// Handle to a live effect
    type Effect: Clone + Eq + Hash + fmt::Debug;

    /// Wrap a value so reads are tracked and writes trigger effects
    fn reactive(&self, raw: Self::Raw) -> Self::Reactive;

    /// Create an effect, run it once, and route later re-runs through
    /// `scheduler`
    fn effect(&self, body: EffectBody, scheduler: SchedulerHook) -> Self::Effect;

    /// Stop an effect; releasing twice must be harmless
    fn release(&self, effect: &Self::Effect);

    /// Read the plain value behind a reactive wrapper
    fn raw(&self, reactive: &Self::Reactive) -> Self::Raw;

    /// Run an effect's body now, tracking dependencies as usual
    fn run(&self, effect: &Self::Effect);
}
