//! Tessera Reactive - effect adapter over a pluggable reactivity engine
//!
//! This crate does not track dependencies itself. It provides:
//! - The [`ReactivityEngine`] capability an external engine implements
//! - A [`BatchScheduler`] that coalesces effect re-runs per microtask turn
//! - The [`ReactiveAdapter`]: late engine binding, the scheduling switch
//!   (`disable_effect_scheduling`), and effects bound to element lifetimes
//!
//! ## Wiring
//!
//! ```text
//! MutationPipeline ── element removed ──► ReactiveAdapter::release_element
//!        ▲                                        │
//!        │ mutate_dom (writes not observed)       │ engine.effect(body, hook)
//!        │                                        ▼
//!   effect body ◄── BatchScheduler ◄── hook ◄── ReactivityEngine
//! ```

mod adapter;
mod engine;
mod error;
mod scheduler;

pub use adapter::{BoundEffect, EffectCleanup, ReactiveAdapter};
pub use engine::{EffectBody, Job, ReactivityEngine, SchedulerHook};
pub use error::{Error, Result};
pub use scheduler::{BatchScheduler, Scheduler, RECURSION_LIMIT};
