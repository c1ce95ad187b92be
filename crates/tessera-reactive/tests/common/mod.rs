//! A minimal signal engine for driving the adapter in tests

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tessera_reactive::{EffectBody, Job, ReactivityEngine, SchedulerHook};

struct EffectEntry {
    body: EffectBody,
    hook: SchedulerHook,
    job: Job,
}

#[derive(Default)]
struct Runtime {
    next_id: Cell<u64>,
    effects: RefCell<HashMap<u64, EffectEntry>>,
    running: RefCell<Vec<u64>>,
    runs: Cell<u32>,
}

impl Runtime {
    fn run_effect(&self, id: u64) {
        let body = self.effects.borrow().get(&id).map(|e| e.body.clone());
        if let Some(body) = body {
            self.running.borrow_mut().push(id);
            self.runs.set(self.runs.get() + 1);
            body();
            self.running.borrow_mut().pop();
        }
    }

    fn trigger(&self, id: u64) {
        let entry = self
            .effects
            .borrow()
            .get(&id)
            .map(|e| (e.hook.clone(), e.job.clone()));
        if let Some((hook, job)) = entry {
            hook(job);
        }
    }
}

/// Integer cell that records which effects read it
#[derive(Clone)]
pub struct Signal {
    runtime: Rc<Runtime>,
    value: Rc<Cell<i64>>,
    subscribers: Rc<RefCell<Vec<u64>>>,
}

impl Signal {
    pub fn get(&self) -> i64 {
        if let Some(&id) = self.runtime.running.borrow().last() {
            let mut subscribers = self.subscribers.borrow_mut();
            if !subscribers.contains(&id) {
                subscribers.push(id);
            }
        }
        self.value.get()
    }

    pub fn set(&self, value: i64) {
        self.value.set(value);
        let subscribers = self.subscribers.borrow().clone();
        for id in subscribers {
            self.runtime.trigger(id);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EffectHandle(pub u64);

#[derive(Clone, Default)]
pub struct SignalEngine {
    runtime: Rc<Runtime>,
}

impl SignalEngine {
    /// Number of effect body runs so far
    pub fn runs(&self) -> u32 {
        self.runtime.runs.get()
    }

    pub fn is_live(&self, effect: EffectHandle) -> bool {
        self.runtime.effects.borrow().contains_key(&effect.0)
    }
}

impl ReactivityEngine for SignalEngine {
    type Raw = i64;
    type Reactive = Signal;
    type Effect = EffectHandle;

    fn reactive(&self, raw: i64) -> Signal {
        Signal {
            runtime: self.runtime.clone(),
            value: Rc::new(Cell::new(raw)),
            subscribers: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn effect(&self, body: EffectBody, hook: SchedulerHook) -> EffectHandle {
        let id = self.runtime.next_id.get();
        self.runtime.next_id.set(id + 1);

        let weak: Weak<Runtime> = Rc::downgrade(&self.runtime);
        let job: Job = Rc::new(move || {
            if let Some(runtime) = weak.upgrade() {
                runtime.run_effect(id);
            }
        });
        self.runtime
            .effects
            .borrow_mut()
            .insert(id, EffectEntry { body, hook, job });
        self.runtime.run_effect(id);
        EffectHandle(id)
    }

    fn release(&self, effect: &EffectHandle) {
        self.runtime.effects.borrow_mut().remove(&effect.0);
    }

    fn raw(&self, reactive: &Signal) -> i64 {
        reactive.value.get()
    }

    fn run(&self, effect: &EffectHandle) {
        self.runtime.run_effect(effect.0);
    }
}
