//! Shared native intersection observers
//!
//! Every watch whose derived [`ObserverOptions`] produce the same
//! [`ObserverKey`] lands on the same native observer. An entry exists only
//! while at least one element is watched through it; removing the last
//! element disconnects and discards the observer.

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use inview_core::{ElementId, ObserverKey, ObserverOptions, Result};

use crate::callbacks::{self, Callback, CallbackSet, Presence, SharedCallbacks};
use crate::host::{IntersectionDispatch, IntersectionHost, IntersectionReport, NativeObserver};

/// One element watched through a shared observer
struct Watcher {
    callbacks: SharedCallbacks,
    presence: Presence,
}

/// A native observer and the elements it serves
struct ObserverEntry {
    observer: Box<dyn NativeObserver>,
    options: ObserverOptions,
    watchers: IndexMap<ElementId, Watcher, FxBuildHasher>,
}

#[derive(Default)]
struct RegistryInner {
    entries: FxHashMap<ObserverKey, ObserverEntry>,
    /// Callbacks per element, kept from first attach until unobserve
    callbacks: FxHashMap<ElementId, SharedCallbacks>,
    /// Native observers constructed over the registry's lifetime
    created: u64,
}

impl RegistryInner {
    fn callbacks_for(&mut self, element: ElementId) -> SharedCallbacks {
        self.callbacks
            .entry(element)
            .or_insert_with(|| CallbackSet::new().into_shared())
            .clone()
    }

    fn is_watched(&self, element: ElementId) -> bool {
        self.entries
            .values()
            .any(|entry| entry.watchers.contains_key(&element))
    }
}

/// Multiplexes watched elements over the fewest native observers
#[derive(Clone)]
pub struct ObserverRegistry {
    host: Rc<dyn IntersectionHost>,
    inner: Rc<RefCell<RegistryInner>>,
}

impl ObserverRegistry {
    pub fn new(host: Rc<dyn IntersectionHost>) -> Self {
        Self {
            host,
            inner: Rc::new(RefCell::new(RegistryInner::default())),
        }
    }

    /// Watch `element` with the observer for `options`, creating it if needed
    ///
    /// Watching an element again through the same observer keeps its current
    /// in/out state and merges the callbacks.
    pub fn add(
        &self,
        element: ElementId,
        options: &ObserverOptions,
        callbacks: &CallbackSet,
    ) -> Result<()> {
        let key = options.key();

        let fresh = if self.inner.borrow().entries.contains_key(&key) {
            None
        } else {
            let dispatch = self.dispatcher(key.clone());
            Some(self.host.create_observer(options, dispatch)?)
        };

        let mut inner = self.inner.borrow_mut();
        let shared = inner.callbacks_for(element);
        shared.borrow_mut().merge(callbacks);
        // Moving to another observer keeps the element's in/out state
        let carried = inner
            .entries
            .values()
            .find_map(|entry| entry.watchers.get(&element).map(|watcher| watcher.presence))
            .unwrap_or_default();

        let entry = match fresh {
            Some(observer) => {
                inner.created += 1;
                tracing::debug!(
                    root_margin = key.root_margin(),
                    threshold = key.threshold(),
                    "Created native intersection observer"
                );
                inner.entries.entry(key.clone()).or_insert(ObserverEntry {
                    observer,
                    options: options.clone(),
                    watchers: IndexMap::default(),
                })
            }
            None => match inner.entries.get_mut(&key) {
                Some(entry) => entry,
                None => return Ok(()),
            },
        };
        if entry.watchers.contains_key(&element) {
            return Ok(());
        }
        entry.watchers.insert(
            element,
            Watcher {
                callbacks: shared,
                presence: carried,
            },
        );
        entry.observer.observe(element);
        tracing::trace!(?element, watchers = entry.watchers.len(), "Observing element");
        Ok(())
    }

    /// Attach an extra enter callback to `element`
    pub fn add_enter_callback(&self, element: ElementId, callback: Callback) {
        let shared = self.inner.borrow_mut().callbacks_for(element);
        shared.borrow_mut().add_enter(callback);
    }

    /// Attach an extra exit callback to `element`
    pub fn add_exit_callback(&self, element: ElementId, callback: Callback) {
        let shared = self.inner.borrow_mut().callbacks_for(element);
        shared.borrow_mut().add_exit(callback);
    }

    /// Stop watching `element` through the observer for `options`
    ///
    /// Unknown elements are ignored. When the observer has no elements left
    /// it is disconnected and dropped.
    pub fn unobserve(&self, element: ElementId, options: &ObserverOptions) {
        let key = options.key();
        let mut inner = self.inner.borrow_mut();

        let Some(entry) = inner.entries.get_mut(&key) else {
            return;
        };
        if entry.watchers.shift_remove(&element).is_none() {
            return;
        }
        entry.observer.unobserve(element);

        if entry.watchers.is_empty() {
            if let Some(entry) = inner.entries.remove(&key) {
                entry.observer.disconnect();
                tracing::debug!(
                    root_margin = key.root_margin(),
                    scrollable_area = entry.options.scrollable_area(),
                    "Discarded idle intersection observer"
                );
            }
        }

        if !inner.is_watched(element) {
            inner.callbacks.remove(&element);
        }
    }

    /// Drop callbacks attached to `element` while it is not watched
    pub fn forget(&self, element: ElementId) {
        let mut inner = self.inner.borrow_mut();
        if !inner.is_watched(element) {
            inner.callbacks.remove(&element);
        }
    }

    /// Whether callbacks are stored for `element`
    pub fn has_callbacks(&self, element: ElementId) -> bool {
        self.inner.borrow().callbacks.contains_key(&element)
    }

    /// Disconnect every observer and forget every element
    pub fn destroy(&self) {
        let entries: Vec<ObserverEntry> = {
            let mut inner = self.inner.borrow_mut();
            inner.callbacks.clear();
            inner.entries.drain().map(|(_, entry)| entry).collect()
        };
        for entry in &entries {
            entry.observer.disconnect();
        }
        if !entries.is_empty() {
            tracing::debug!(observers = entries.len(), "Destroyed intersection observers");
        }
    }

    pub fn is_observing(&self, element: ElementId) -> bool {
        self.inner.borrow().is_watched(element)
    }

    /// Live native observers
    pub fn observer_count(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Native observers constructed so far, including discarded ones
    pub fn created_count(&self) -> u64 {
        self.inner.borrow().created
    }

    /// Elements watched through the observer for `options`
    pub fn watcher_count(&self, options: &ObserverOptions) -> usize {
        self.inner
            .borrow()
            .entries
            .get(&options.key())
            .map_or(0, |entry| entry.watchers.len())
    }

    fn dispatcher(&self, key: ObserverKey) -> IntersectionDispatch {
        let inner = Rc::downgrade(&self.inner);
        Rc::new(move |reports: &[IntersectionReport]| dispatch(&inner, &key, reports))
    }
}

/// Apply a batch of native reports for the observer at `key`
///
/// Reports are handled one at a time with no borrow held while callbacks run,
/// so a callback that unobserves a later target in the same batch suppresses
/// that target's report.
fn dispatch(inner: &Weak<RefCell<RegistryInner>>, key: &ObserverKey, reports: &[IntersectionReport]) {
    let Some(inner) = inner.upgrade() else {
        return;
    };

    for report in reports {
        let fired = {
            let mut inner = inner.borrow_mut();
            let Some(watcher) = inner
                .entries
                .get_mut(key)
                .and_then(|entry| entry.watchers.get_mut(&report.target))
            else {
                // Stale report for an element already unobserved
                continue;
            };
            watcher
                .presence
                .update(report.is_intersecting)
                .map(|transition| (watcher.callbacks.clone(), transition))
        };

        if let Some((shared, transition)) = fired {
            tracing::trace!(target_element = ?report.target, ?transition, "Intersection transition");
            callbacks::fire(&shared, transition);
        }
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observer_count())
            .field("created", &self.created_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inview_core::{InViewportError, ViewportTolerance, WatchOptions};
    use slotmap::SlotMap;
    use std::cell::Cell;

    /// Records every native call and hands out the dispatch handlers
    #[derive(Default)]
    struct FakeHost {
        dispatchers: RefCell<Vec<IntersectionDispatch>>,
        log: Rc<RefCell<Vec<String>>>,
        refuse: Cell<bool>,
    }

    struct FakeObserver {
        id: usize,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl NativeObserver for FakeObserver {
        fn observe(&self, _target: ElementId) {
            self.log.borrow_mut().push(format!("observe {}", self.id));
        }

        fn unobserve(&self, _target: ElementId) {
            self.log.borrow_mut().push(format!("unobserve {}", self.id));
        }

        fn disconnect(&self) {
            self.log.borrow_mut().push(format!("disconnect {}", self.id));
        }
    }

    impl IntersectionHost for FakeHost {
        fn resolve_root(&self, _selector: &str) -> Option<ElementId> {
            None
        }

        fn create_observer(
            &self,
            _options: &ObserverOptions,
            dispatch: IntersectionDispatch,
        ) -> Result<Box<dyn NativeObserver>> {
            if self.refuse.get() {
                return Err(InViewportError::Host("rootMargin rejected".into()));
            }
            let mut dispatchers = self.dispatchers.borrow_mut();
            dispatchers.push(dispatch);
            Ok(Box::new(FakeObserver {
                id: dispatchers.len() - 1,
                log: self.log.clone(),
            }))
        }
    }

    impl FakeHost {
        fn report(&self, observer: usize, target: ElementId, is_intersecting: bool) {
            self.report_batch(observer, &[(target, is_intersecting)]);
        }

        fn report_batch(&self, observer: usize, batch: &[(ElementId, bool)]) {
            let dispatch = self.dispatchers.borrow()[observer].clone();
            let reports: Vec<IntersectionReport> = batch
                .iter()
                .map(|&(target, is_intersecting)| IntersectionReport {
                    target,
                    is_intersecting,
                })
                .collect();
            dispatch(&reports);
        }
    }

    struct Fixture {
        host: Rc<FakeHost>,
        registry: ObserverRegistry,
        elements: SlotMap<ElementId, ()>,
    }

    fn fixture() -> Fixture {
        let host = Rc::new(FakeHost::default());
        let registry = ObserverRegistry::new(host.clone());
        Fixture {
            host,
            registry,
            elements: SlotMap::with_key(),
        }
    }

    fn counting() -> (Rc<Cell<u32>>, Callback) {
        let count = Rc::new(Cell::new(0));
        let handle = count.clone();
        (count, Rc::new(move || handle.set(handle.get() + 1)))
    }

    fn options(bottom: f64) -> ObserverOptions {
        WatchOptions::new()
            .tolerance(ViewportTolerance::bottom(bottom))
            .observer_options(None)
            .unwrap()
    }

    #[test]
    fn test_identical_options_share_one_observer() {
        let mut f = fixture();
        let a = f.elements.insert(());
        let b = f.elements.insert(());

        f.registry.add(a, &options(300.0), &CallbackSet::new()).unwrap();
        f.registry.add(b, &options(300.0), &CallbackSet::new()).unwrap();

        assert_eq!(f.registry.observer_count(), 1);
        assert_eq!(f.registry.created_count(), 1);
        assert_eq!(f.registry.watcher_count(&options(300.0)), 2);
    }

    #[test]
    fn test_distinct_options_get_distinct_observers() {
        let mut f = fixture();
        let a = f.elements.insert(());
        let b = f.elements.insert(());

        f.registry.add(a, &options(0.0), &CallbackSet::new()).unwrap();
        f.registry.add(b, &options(300.0), &CallbackSet::new()).unwrap();

        assert_eq!(f.registry.observer_count(), 2);
    }

    #[test]
    fn test_enter_and_exit_fire_on_transitions_only() {
        let mut f = fixture();
        let a = f.elements.insert(());
        let (entered, enter) = counting();
        let (exited, exit) = counting();

        f.registry
            .add(a, &options(0.0), &CallbackSet::with(enter, exit))
            .unwrap();

        // Initial report while outside is not a transition
        f.host.report(0, a, false);
        assert_eq!((entered.get(), exited.get()), (0, 0));

        f.host.report(0, a, true);
        f.host.report(0, a, true);
        assert_eq!((entered.get(), exited.get()), (1, 0));

        f.host.report(0, a, false);
        f.host.report(0, a, false);
        assert_eq!((entered.get(), exited.get()), (1, 1));
    }

    #[test]
    fn test_coalesced_batch_is_applied_in_order() {
        let mut f = fixture();
        let a = f.elements.insert(());
        let (entered, enter) = counting();
        let (exited, exit) = counting();

        f.registry
            .add(a, &options(0.0), &CallbackSet::with(enter, exit))
            .unwrap();
        f.host.report_batch(0, &[(a, true), (a, true), (a, false), (a, true)]);

        assert_eq!(entered.get(), 2);
        assert_eq!(exited.get(), 1);
    }

    #[test]
    fn test_unobserve_last_element_discards_observer() {
        let mut f = fixture();
        let a = f.elements.insert(());
        let b = f.elements.insert(());

        f.registry.add(a, &options(0.0), &CallbackSet::new()).unwrap();
        f.registry.add(b, &options(0.0), &CallbackSet::new()).unwrap();

        f.registry.unobserve(a, &options(0.0));
        assert_eq!(f.registry.observer_count(), 1);

        f.registry.unobserve(b, &options(0.0));
        assert_eq!(f.registry.observer_count(), 0);
        assert_eq!(
            f.host.log.borrow().last().map(String::as_str),
            Some("disconnect 0")
        );

        // Same options later build a fresh instance
        f.registry.add(a, &options(0.0), &CallbackSet::new()).unwrap();
        assert_eq!(f.registry.observer_count(), 1);
        assert_eq!(f.registry.created_count(), 2);
    }

    #[test]
    fn test_unobserved_element_gets_no_more_callbacks() {
        let mut f = fixture();
        let a = f.elements.insert(());
        let b = f.elements.insert(());
        let (entered, enter) = counting();

        f.registry
            .add(a, &options(0.0), &CallbackSet::with(enter, Rc::new(|| {})))
            .unwrap();
        f.registry.add(b, &options(0.0), &CallbackSet::new()).unwrap();
        f.registry.unobserve(a, &options(0.0));

        // A stale report for `a` still arrives on the shared observer
        f.host.report(0, a, true);
        assert_eq!(entered.get(), 0);
        assert!(!f.registry.is_observing(a));
    }

    #[test]
    fn test_unobserve_unknown_element_is_noop() {
        let mut f = fixture();
        let a = f.elements.insert(());
        let stranger = f.elements.insert(());

        f.registry.unobserve(stranger, &options(0.0));
        f.registry.add(a, &options(0.0), &CallbackSet::new()).unwrap();
        f.registry.unobserve(stranger, &options(0.0));

        assert_eq!(f.registry.watcher_count(&options(0.0)), 1);
        assert!(!f.host.log.borrow().iter().any(|line| line.starts_with("unobserve")));
    }

    #[test]
    fn test_forget_drops_callbacks_of_unwatched_elements_only() {
        let mut f = fixture();
        let watched = f.elements.insert(());
        let loose = f.elements.insert(());
        let (entered, enter) = counting();

        f.registry
            .add(watched, &options(0.0), &CallbackSet::with(enter, Rc::new(|| {})))
            .unwrap();
        f.registry.add_enter_callback(loose, Rc::new(|| {}));
        assert!(f.registry.has_callbacks(loose));

        f.registry.forget(loose);
        f.registry.forget(watched);
        assert!(!f.registry.has_callbacks(loose));
        assert!(f.registry.has_callbacks(watched));

        f.host.report(0, watched, true);
        assert_eq!(entered.get(), 1);
    }

    #[test]
    fn test_callback_unobserving_later_target_suppresses_its_report() {
        let mut f = fixture();
        let a = f.elements.insert(());
        let b = f.elements.insert(());
        let (b_entered, b_enter) = counting();

        let registry = f.registry.clone();
        let unwatch_b: Callback = Rc::new(move || registry.unobserve(b, &options(0.0)));

        f.registry
            .add(a, &options(0.0), &CallbackSet::with(unwatch_b, Rc::new(|| {})))
            .unwrap();
        f.registry
            .add(b, &options(0.0), &CallbackSet::with(b_enter, Rc::new(|| {})))
            .unwrap();

        f.host.report_batch(0, &[(a, true), (b, true)]);
        assert_eq!(b_entered.get(), 0);
    }

    #[test]
    fn test_added_callbacks_fire_alongside_originals() {
        let mut f = fixture();
        let a = f.elements.insert(());
        let (first, enter) = counting();
        let (second, extra) = counting();
        let (exited, exit) = counting();

        f.registry
            .add(a, &options(0.0), &CallbackSet::with(enter, Rc::new(|| {})))
            .unwrap();
        f.registry.add_enter_callback(a, extra);
        f.registry.add_exit_callback(a, exit);

        f.host.report(0, a, true);
        f.host.report(0, a, false);
        assert_eq!((first.get(), second.get(), exited.get()), (1, 1, 1));
    }

    #[test]
    fn test_readding_keeps_state() {
        let mut f = fixture();
        let a = f.elements.insert(());
        let (entered, enter) = counting();

        f.registry
            .add(a, &options(0.0), &CallbackSet::with(enter.clone(), Rc::new(|| {})))
            .unwrap();
        f.host.report(0, a, true);
        f.registry
            .add(a, &options(0.0), &CallbackSet::with(enter, Rc::new(|| {})))
            .unwrap();
        f.host.report(0, a, true);

        assert_eq!(entered.get(), 1);
        let observes = f
            .host
            .log
            .borrow()
            .iter()
            .filter(|line| line.starts_with("observe"))
            .count();
        assert_eq!(observes, 1);
    }

    #[test]
    fn test_host_failure_propagates_and_leaves_no_entry() {
        let mut f = fixture();
        let a = f.elements.insert(());
        f.host.refuse.set(true);

        let result = f.registry.add(a, &options(0.0), &CallbackSet::new());
        assert!(matches!(result, Err(InViewportError::Host(_))));
        assert_eq!(f.registry.observer_count(), 0);
        assert!(!f.registry.is_observing(a));
    }

    #[test]
    fn test_destroy_disconnects_everything() {
        let mut f = fixture();
        let a = f.elements.insert(());
        let b = f.elements.insert(());
        let (entered, enter) = counting();

        f.registry
            .add(a, &options(0.0), &CallbackSet::with(enter, Rc::new(|| {})))
            .unwrap();
        f.registry.add(b, &options(100.0), &CallbackSet::new()).unwrap();
        f.registry.destroy();

        assert_eq!(f.registry.observer_count(), 0);
        let disconnects = f
            .host
            .log
            .borrow()
            .iter()
            .filter(|line| line.starts_with("disconnect"))
            .count();
        assert_eq!(disconnects, 2);

        f.host.report(0, a, true);
        assert_eq!(entered.get(), 0);
    }
}
