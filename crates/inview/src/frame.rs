//! Shared per-frame polling loop
//!
//! One loop serves every polled element. It starts when the first task is
//! added and stops itself on the first tick that finds no tasks, so it runs
//! at most one frame past the last removal. [`FrameScheduler::reset`] stops it
//! immediately.

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use inview_core::ElementId;

use crate::callbacks::{Callback, CallbackSet, SharedCallbacks};
use crate::host::{FrameHandle, FrameHost};

/// Zero-argument check run once per frame
pub type FrameTask = Rc<dyn Fn()>;

#[derive(Default)]
struct FrameLoop {
    /// Tasks in registration order
    tasks: IndexMap<ElementId, FrameTask, FxBuildHasher>,
    /// Callbacks per element, kept until `forget` or `reset`
    callbacks: FxHashMap<ElementId, SharedCallbacks>,
    /// Frame requested from the host, if the loop is running
    pending: Option<FrameHandle>,
    ticks: u64,
}

impl FrameLoop {
    fn callbacks_for(&mut self, element: ElementId) -> SharedCallbacks {
        self.callbacks
            .entry(element)
            .or_insert_with(|| CallbackSet::new().into_shared())
            .clone()
    }
}

/// Owner of the single polling loop
#[derive(Clone)]
pub struct FrameScheduler {
    host: Rc<dyn FrameHost>,
    inner: Rc<RefCell<FrameLoop>>,
}

impl FrameScheduler {
    pub fn new(host: Rc<dyn FrameHost>) -> Self {
        Self {
            host,
            inner: Rc::new(RefCell::new(FrameLoop::default())),
        }
    }

    /// Register the check for `element`, replacing any previous one
    ///
    /// Starts the loop if it is not already running.
    pub fn add(&self, element: ElementId, task: FrameTask) {
        let start = {
            let mut inner = self.inner.borrow_mut();
            inner.tasks.insert(element, task);
            inner.pending.is_none()
        };
        if start {
            tracing::debug!("Starting viewport frame loop");
            schedule(&self.host, &self.inner);
        }
    }

    /// Drop the check for `element`
    ///
    /// The loop keeps its pending frame and stops on that tick if nothing is
    /// left.
    pub fn remove(&self, element: ElementId) {
        self.inner.borrow_mut().tasks.shift_remove(&element);
    }

    /// Drop the callbacks stored for `element`
    pub fn forget(&self, element: ElementId) {
        self.inner.borrow_mut().callbacks.remove(&element);
    }

    /// Clear every task and callback and halt the loop now
    pub fn reset(&self) {
        let pending = {
            let mut inner = self.inner.borrow_mut();
            inner.tasks.clear();
            inner.callbacks.clear();
            inner.pending.take()
        };
        if let Some(handle) = pending {
            self.host.cancel_frame(handle);
            tracing::debug!("Halted viewport frame loop");
        }
    }

    /// Callbacks stored for `element`, if any were attached
    pub fn callbacks(&self, element: ElementId) -> Option<SharedCallbacks> {
        self.inner.borrow().callbacks.get(&element).cloned()
    }

    /// Callbacks for `element`, created empty on first use
    pub fn callbacks_or_default(&self, element: ElementId) -> SharedCallbacks {
        self.inner.borrow_mut().callbacks_for(element)
    }

    pub fn add_enter_callback(&self, element: ElementId, callback: Callback) {
        self.callbacks_or_default(element)
            .borrow_mut()
            .add_enter(callback);
    }

    pub fn add_exit_callback(&self, element: ElementId, callback: Callback) {
        self.callbacks_or_default(element)
            .borrow_mut()
            .add_exit(callback);
    }

    pub fn contains(&self, element: ElementId) -> bool {
        self.inner.borrow().tasks.contains_key(&element)
    }

    pub fn task_count(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    /// Whether a frame is currently requested from the host
    pub fn is_running(&self) -> bool {
        self.inner.borrow().pending.is_some()
    }

    /// Ticks executed since creation
    pub fn ticks(&self) -> u64 {
        self.inner.borrow().ticks
    }
}

impl std::fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("tasks", &self.task_count())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Request the next tick; the loop stays stopped if the host refuses
fn schedule(host: &Rc<dyn FrameHost>, inner: &Rc<RefCell<FrameLoop>>) {
    let weak = Rc::downgrade(inner);
    let tick_host = host.clone();
    match host.request_frame(Box::new(move || tick(&tick_host, &weak))) {
        Ok(handle) => inner.borrow_mut().pending = Some(handle),
        Err(err) => tracing::error!(%err, "Failed to schedule viewport frame"),
    }
}

fn tick(host: &Rc<dyn FrameHost>, inner: &Weak<RefCell<FrameLoop>>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };

    let tasks: Vec<(ElementId, FrameTask)> = {
        let mut state = inner.borrow_mut();
        state.pending = None;
        if state.tasks.is_empty() {
            tracing::debug!(ticks = state.ticks, "Stopping idle viewport frame loop");
            return;
        }
        state.ticks += 1;
        state
            .tasks
            .iter()
            .map(|(element, task)| (*element, task.clone()))
            .collect()
    };

    for (element, task) in tasks {
        // An earlier task's callback may have removed or replaced this one
        let current = inner
            .borrow()
            .tasks
            .get(&element)
            .is_some_and(|live| Rc::ptr_eq(live, &task));
        if current {
            task();
        }
    }

    // A task may have reset the loop or re-added itself
    let resume = inner.borrow().pending.is_none() && !inner.borrow().tasks.is_empty();
    if resume {
        schedule(host, &inner);
    }
}
