//! Viewport service facade
//!
//! [`ViewportCoordinator`] routes each watch to one engine, defers engine setup
//! to the host's after-render hook, and remembers which engine owns every
//! element so unwatching and attaching callbacks reach the right one.
//!
//! Per element the lifecycle is:
//!
//! ```text
//! Unwatched -> Pending -> Watching(out) <-> Watching(in) -> Unwatched
//! ```
//!
//! Watches requested during one update cycle are coalesced into a single
//! setup pass. Nothing fires for an element once it is unwatched or the
//! coordinator is destroyed.

use indexmap::map::Entry;
use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::cell::{RefCell, RefMut};
use std::rc::Rc;

use inview_core::{
    Capabilities, ElementId, InViewportConfig, InViewportError, ObserverOptions, Result, Strategy,
    ViewportTolerance, WatchOptions,
};

use crate::callbacks::{Callback, CallbackSet, Transition};
use crate::frame::FrameScheduler;
use crate::host::Host;
use crate::observer::ObserverRegistry;
use crate::poll::{self, PollTask};

/// Which engine owns a watched element, and what it needs to let go
enum Registration {
    Native(ObserverOptions),
    Polling(Rc<PollTask>),
}

impl Registration {
    fn strategy(&self) -> Strategy {
        match self {
            Registration::Native(_) => Strategy::Native,
            Registration::Polling(_) => Strategy::Polling,
        }
    }
}

/// A watch waiting for the next after-render pass
struct PendingWatch {
    options: WatchOptions,
    /// Derived at watch time for the native strategy
    observer: Option<ObserverOptions>,
    callbacks: CallbackSet,
}

#[derive(Default)]
struct CoordinatorState {
    registry: FxHashMap<ElementId, Registration>,
    pending: IndexMap<ElementId, PendingWatch, FxBuildHasher>,
    flush_scheduled: bool,
    destroyed: bool,
}

struct Shared {
    host: Host,
    config: InViewportConfig,
    capabilities: Capabilities,
    strategy: Strategy,
    observers: Option<ObserverRegistry>,
    frames: Option<FrameScheduler>,
    state: RefCell<CoordinatorState>,
}

/// The viewport service
///
/// Cheap to clone; clones share the same engines and registrations.
#[derive(Clone)]
pub struct ViewportCoordinator {
    shared: Rc<Shared>,
}

impl ViewportCoordinator {
    /// Create the service, resolving the default strategy from the host's
    /// capabilities and `config`
    pub fn new(host: Host, config: InViewportConfig) -> Self {
        let capabilities = host.capabilities();
        let strategy = Strategy::resolve(&config, capabilities);
        tracing::debug!(?strategy, ?capabilities, "Created viewport coordinator");

        Self {
            shared: Rc::new(Shared {
                observers: host.intersection.clone().map(ObserverRegistry::new),
                frames: host.frames.clone().map(FrameScheduler::new),
                host,
                config,
                capabilities,
                strategy,
                state: RefCell::new(CoordinatorState::default()),
            }),
        }
    }

    fn state(&self) -> RefMut<'_, CoordinatorState> {
        self.shared.state.borrow_mut()
    }

    // =========================================================================
    // Watching
    // =========================================================================

    /// Start watching `element`
    ///
    /// Options are validated (and for the native strategy, turned into observer
    /// options) right away, so configuration errors surface here. Engine setup
    /// happens in the next after-render pass. Watching an element again merges
    /// the callbacks and applies the new options.
    ///
    /// After [`destroy`](Self::destroy) this is a no-op.
    pub fn watch_element(
        &self,
        element: ElementId,
        options: WatchOptions,
        enter: Callback,
        exit: Callback,
    ) -> Result<()> {
        if self.is_destroyed() {
            tracing::warn!(?element, "watch_element called on a destroyed viewport coordinator");
            return Ok(());
        }

        let observer = match self.shared.strategy {
            Strategy::Native => Some(self.build_observer_options(&options)?),
            Strategy::Polling => {
                options.validate()?;
                if self.shared.frames.is_none() {
                    return Err(InViewportError::Unsupported(
                        "polling requires display-frame callbacks".into(),
                    ));
                }
                None
            }
        };
        let callbacks = CallbackSet::with(enter, exit);

        let schedule = {
            let mut state = self.state();
            match state.pending.entry(element) {
                Entry::Occupied(mut entry) => {
                    let pending = entry.get_mut();
                    pending.options = options;
                    pending.observer = observer;
                    pending.callbacks.merge(&callbacks);
                }
                Entry::Vacant(entry) => {
                    entry.insert(PendingWatch {
                        options,
                        observer,
                        callbacks,
                    });
                }
            }
            !std::mem::replace(&mut state.flush_scheduled, true)
        };

        if schedule {
            let shared = Rc::downgrade(&self.shared);
            self.shared
                .host
                .render
                .schedule_after_render(Box::new(move || {
                    if let Some(shared) = shared.upgrade() {
                        ViewportCoordinator { shared }.flush_pending();
                    }
                }));
        }
        Ok(())
    }

    /// Derive native observer options from watch options
    ///
    /// The scrollable-area selector is resolved now; an unresolvable selector
    /// observes against the window.
    pub fn build_observer_options(&self, options: &WatchOptions) -> Result<ObserverOptions> {
        let intersection = self.shared.host.intersection.as_ref().ok_or_else(|| {
            InViewportError::Unsupported("native intersection observation".into())
        })?;
        let root = options
            .scrollable_area
            .as_deref()
            .and_then(|selector| intersection.resolve_root(selector));
        options.observer_options(root)
    }

    /// Attach another enter callback to `element`
    ///
    /// Routed to the engine that owns the element; elements not yet watched
    /// keep the callback in the default strategy's engine until they are.
    pub fn add_enter_callback(&self, element: ElementId, callback: Callback) {
        self.attach(element, callback, Transition::Enter);
    }

    /// Attach another exit callback to `element`
    pub fn add_exit_callback(&self, element: ElementId, callback: Callback) {
        self.attach(element, callback, Transition::Exit);
    }

    fn attach(&self, element: ElementId, callback: Callback, transition: Transition) {
        let owner = {
            let mut state = self.state();
            if state.destroyed {
                tracing::warn!(?element, "Callback added to a destroyed viewport coordinator");
                return;
            }
            if let Some(pending) = state.pending.get_mut(&element) {
                match transition {
                    Transition::Enter => pending.callbacks.add_enter(callback),
                    Transition::Exit => pending.callbacks.add_exit(callback),
                }
                return;
            }
            state
                .registry
                .get(&element)
                .map_or(self.shared.strategy, Registration::strategy)
        };

        match (owner, transition) {
            (Strategy::Native, Transition::Enter) => {
                if let Some(observers) = &self.shared.observers {
                    observers.add_enter_callback(element, callback);
                }
            }
            (Strategy::Native, Transition::Exit) => {
                if let Some(observers) = &self.shared.observers {
                    observers.add_exit_callback(element, callback);
                }
            }
            (Strategy::Polling, Transition::Enter) => {
                if let Some(frames) = &self.shared.frames {
                    frames.add_enter_callback(element, callback);
                }
            }
            (Strategy::Polling, Transition::Exit) => {
                if let Some(frames) = &self.shared.frames {
                    frames.add_exit_callback(element, callback);
                }
            }
        }
    }

    // =========================================================================
    // Unwatching
    // =========================================================================

    /// Stop watching `element`, whichever engine owns it
    ///
    /// Also cancels a watch still waiting for its setup pass and drops
    /// callbacks attached to the element without a watch. Unknown elements
    /// are otherwise ignored.
    pub fn unwatch_element(&self, element: ElementId) {
        let registration = {
            let mut state = self.state();
            state.pending.shift_remove(&element);
            state.registry.remove(&element)
        };
        if let Some(registration) = registration {
            self.release(element, registration);
        }
        self.forget(element);
    }

    /// Stop watching `target` if it is owned by the native engine
    pub fn unobserve_intersection_observer(&self, target: ElementId) {
        let registration = {
            let mut state = self.state();
            match state.registry.get(&target) {
                Some(Registration::Native(_)) => state.registry.remove(&target),
                _ => None,
            }
        };
        if let Some(registration) = registration {
            self.release(target, registration);
        }
        if let Some(observers) = &self.shared.observers {
            observers.forget(target);
        }
    }

    /// Drop engine-side callbacks for an element no engine watches
    fn forget(&self, element: ElementId) {
        if let Some(observers) = &self.shared.observers {
            observers.forget(element);
        }
        if let Some(frames) = &self.shared.frames {
            frames.forget(element);
        }
    }

    fn release(&self, element: ElementId, registration: Registration) {
        match registration {
            Registration::Native(options) => {
                if let Some(observers) = &self.shared.observers {
                    observers.unobserve(element, &options);
                }
            }
            Registration::Polling(_) => {
                if let Some(frames) = &self.shared.frames {
                    frames.remove(element);
                    frames.forget(element);
                }
            }
        }
        tracing::trace!(?element, "Released viewport watch");
    }

    // =========================================================================
    // Setup pass
    // =========================================================================

    fn flush_pending(&self) {
        let pending = {
            let mut state = self.state();
            state.flush_scheduled = false;
            if state.destroyed {
                return;
            }
            std::mem::take(&mut state.pending)
        };
        tracing::debug!(count = pending.len(), "Setting up viewport watches");

        for (element, watch) in pending {
            if let Err(err) = self.setup(element, watch) {
                tracing::error!(?element, %err, "Failed to set up viewport watch");
            }
        }
    }

    fn setup(&self, element: ElementId, watch: PendingWatch) -> Result<()> {
        let previous = self.state().registry.remove(&element);

        let registration = match watch.observer {
            Some(observer_options) => {
                let observers = self.shared.observers.as_ref().ok_or_else(|| {
                    InViewportError::Unsupported("native intersection observation".into())
                })?;
                // Add before releasing the old key so callbacks and state carry over
                if let Err(err) = observers.add(element, &observer_options, &watch.callbacks) {
                    if let Some(previous) = previous {
                        self.state().registry.insert(element, previous);
                    }
                    return Err(err);
                }
                match previous {
                    Some(Registration::Native(old)) if old.key() == observer_options.key() => {}
                    Some(other) => self.release(element, other),
                    None => {}
                }
                Registration::Native(observer_options)
            }
            None => {
                let frames = self.shared.frames.as_ref().ok_or_else(|| {
                    InViewportError::Unsupported("polling requires display-frame callbacks".into())
                })?;
                let prior = match previous {
                    Some(Registration::Polling(task)) => Some(task),
                    Some(other) => {
                        self.release(element, other);
                        None
                    }
                    None => None,
                };
                let task = poll::start_polling(
                    frames,
                    self.shared.host.geometry.clone(),
                    element,
                    &watch.options,
                    &watch.callbacks,
                    prior.as_deref(),
                );
                Registration::Polling(task)
            }
        };

        self.state().registry.insert(element, registration);
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// One-off synchronous check outside the watch/callback model
    pub fn is_in_viewport(
        &self,
        element: ElementId,
        tolerance: &ViewportTolerance,
        scrollable_area: Option<&str>,
    ) -> bool {
        self.shared
            .host
            .geometry
            .is_in_viewport(element, tolerance, scrollable_area)
    }

    /// Default strategy for new watches
    pub fn strategy(&self) -> Strategy {
        self.shared.strategy
    }

    pub fn capabilities(&self) -> Capabilities {
        self.shared.capabilities
    }

    pub fn config(&self) -> &InViewportConfig {
        &self.shared.config
    }

    /// Configured defaults for new watches
    pub fn default_options(&self) -> WatchOptions {
        self.shared.config.watch_options()
    }

    /// Engine currently tracking `element`, if any
    pub fn watching_strategy(&self, element: ElementId) -> Option<Strategy> {
        self.shared
            .state
            .borrow()
            .registry
            .get(&element)
            .map(Registration::strategy)
    }

    pub fn is_watching(&self, element: ElementId) -> bool {
        self.shared.state.borrow().registry.contains_key(&element)
    }

    /// Whether `element` waits for the next setup pass
    pub fn is_pending(&self, element: ElementId) -> bool {
        self.shared.state.borrow().pending.contains_key(&element)
    }

    pub fn watched_count(&self) -> usize {
        self.shared.state.borrow().registry.len()
    }

    pub fn observers(&self) -> Option<&ObserverRegistry> {
        self.shared.observers.as_ref()
    }

    pub fn frames(&self) -> Option<&FrameScheduler> {
        self.shared.frames.as_ref()
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Release every registration and engine resource
    ///
    /// The coordinator is inert afterwards: watches and callbacks are ignored
    /// and pending setup passes do nothing.
    pub fn destroy(&self) {
        {
            let mut state = self.state();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.registry.clear();
            state.pending.clear();
        }
        if let Some(observers) = &self.shared.observers {
            observers.destroy();
        }
        if let Some(frames) = &self.shared.frames {
            frames.reset();
        }
        tracing::debug!("Destroyed viewport coordinator");
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.state.borrow().destroyed
    }
}

impl std::fmt::Debug for ViewportCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("ViewportCoordinator")
            .field("strategy", &self.shared.strategy)
            .field("watched", &state.registry.len())
            .field("pending", &state.pending.len())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}
