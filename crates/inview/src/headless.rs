//! Headless host
//!
//! A simulated document for tests and non-browser embedders. Layout is set by
//! hand, and every asynchronous source is driven manually:
//!
//! - [`HeadlessHost::flush_render`] runs the after-render queue
//! - [`HeadlessHost::advance_frame`] runs one display frame
//! - [`HeadlessHost::flush_intersections`] delivers native observer reports
//!
//! Element bounds are given in page coordinates. Client rectangles subtract the
//! window scroll offset and the scroll offset of the element's container.

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};
use slotmap::{new_key_type, SlotMap};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use inview_core::{
    intersection_ratio, is_in_viewport, ElementId, InViewportError, ObserverOptions, Rect,
    Result, ViewportTolerance,
};

use crate::host::{
    FrameCallback, FrameHandle, FrameHost, GeometryPredicate, Host, IntersectionDispatch,
    IntersectionHost, IntersectionReport, NativeObserver, RenderQueue, RenderTask,
};

new_key_type! {
    struct ObserverSlot;
}

struct Node {
    bounds: Rect,
    container: Option<ElementId>,
    scroll: (f64, f64),
    connected: bool,
}

struct SimulatedObserver {
    root: Option<ElementId>,
    margin: ViewportTolerance,
    threshold: f64,
    /// Last state reported per target; `None` until the first report
    targets: IndexMap<ElementId, Option<bool>, FxBuildHasher>,
    dispatch: IntersectionDispatch,
}

struct Document {
    nodes: SlotMap<ElementId, Node>,
    selectors: FxHashMap<String, ElementId>,
    viewport: Rect,
    scroll: (f64, f64),
    frames: Vec<(FrameHandle, FrameCallback)>,
    next_frame: u64,
    refuse_frames: bool,
    render_queue: Vec<RenderTask>,
    observers: SlotMap<ObserverSlot, SimulatedObserver>,
    observers_created: u64,
}

/// Client rectangle of a connected node, walking up its containers
fn client_rect(
    nodes: &SlotMap<ElementId, Node>,
    scroll: (f64, f64),
    element: ElementId,
) -> Option<Rect> {
    let node = nodes.get(element)?;
    if !node.connected {
        return None;
    }
    let mut rect = node.bounds.offset(-scroll.0, -scroll.1);
    let mut parent = node.container;
    while let Some(id) = parent {
        let container = nodes.get(id)?;
        if !container.connected {
            return None;
        }
        rect = rect.offset(-container.scroll.0, -container.scroll.1);
        parent = container.container;
    }
    Some(rect)
}

/// Single-threaded simulated host; clones share one document
#[derive(Clone)]
pub struct HeadlessHost {
    doc: Rc<RefCell<Document>>,
}

impl HeadlessHost {
    /// Create a document with a `width` x `height` window
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            doc: Rc::new(RefCell::new(Document {
                nodes: SlotMap::with_key(),
                selectors: FxHashMap::default(),
                viewport: Rect::from_size(width, height),
                scroll: (0.0, 0.0),
                frames: Vec::new(),
                next_frame: 1,
                refuse_frames: false,
                render_queue: Vec::new(),
                observers: SlotMap::with_key(),
                observers_created: 0,
            })),
        }
    }

    /// Host bundle with native observers and frame scheduling
    pub fn host(&self) -> Host {
        self.polling_host().with_intersection(Rc::new(self.clone()))
    }

    /// Host bundle without native observers, as on older browsers
    pub fn polling_host(&self) -> Host {
        Host::new(Rc::new(self.clone()), Rc::new(self.clone())).with_frames(Rc::new(self.clone()))
    }

    // =========================================================================
    // Document
    // =========================================================================

    pub fn create_element(&self, bounds: Rect) -> ElementId {
        self.insert(bounds, None)
    }

    /// Create an element inside a scrolling `container`
    pub fn create_child(&self, container: ElementId, bounds: Rect) -> ElementId {
        self.insert(bounds, Some(container))
    }

    fn insert(&self, bounds: Rect, container: Option<ElementId>) -> ElementId {
        self.doc.borrow_mut().nodes.insert(Node {
            bounds,
            container,
            scroll: (0.0, 0.0),
            connected: true,
        })
    }

    /// Make `element` resolvable by `selector`
    pub fn set_selector(&self, selector: impl Into<String>, element: ElementId) {
        self.doc
            .borrow_mut()
            .selectors
            .insert(selector.into(), element);
    }

    pub fn set_bounds(&self, element: ElementId, bounds: Rect) {
        if let Some(node) = self.doc.borrow_mut().nodes.get_mut(element) {
            node.bounds = bounds;
        }
    }

    /// Scroll the window to a page offset
    pub fn scroll_to(&self, x: f64, y: f64) {
        self.doc.borrow_mut().scroll = (x, y);
    }

    /// Scroll a container's content to an offset
    pub fn scroll_container_to(&self, container: ElementId, x: f64, y: f64) {
        if let Some(node) = self.doc.borrow_mut().nodes.get_mut(container) {
            node.scroll = (x, y);
        }
    }

    pub fn resize(&self, width: f64, height: f64) {
        self.doc.borrow_mut().viewport = Rect::from_size(width, height);
    }

    /// Take `element` out of the document without freeing its id
    pub fn detach(&self, element: ElementId) {
        self.set_connected(element, false);
    }

    pub fn attach(&self, element: ElementId) {
        self.set_connected(element, true);
    }

    fn set_connected(&self, element: ElementId, connected: bool) {
        if let Some(node) = self.doc.borrow_mut().nodes.get_mut(element) {
            node.connected = connected;
        }
    }

    /// Free `element`; its id never resolves again
    pub fn remove_element(&self, element: ElementId) {
        let mut doc = self.doc.borrow_mut();
        doc.nodes.remove(element);
        doc.selectors.retain(|_, id| *id != element);
    }

    pub fn client_rect(&self, element: ElementId) -> Option<Rect> {
        let doc = self.doc.borrow();
        client_rect(&doc.nodes, doc.scroll, element)
    }

    // =========================================================================
    // Clocks
    // =========================================================================

    /// Run the after-render queue, returning how many tasks ran
    ///
    /// Tasks scheduled while flushing wait for the next flush.
    pub fn flush_render(&self) -> usize {
        let tasks = std::mem::take(&mut self.doc.borrow_mut().render_queue);
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    pub fn pending_render_tasks(&self) -> usize {
        self.doc.borrow().render_queue.len()
    }

    /// Run one display frame, returning how many frame callbacks ran
    pub fn advance_frame(&self) -> usize {
        let callbacks = std::mem::take(&mut self.doc.borrow_mut().frames);
        let count = callbacks.len();
        for (_, callback) in callbacks {
            callback();
        }
        count
    }

    /// Run `count` display frames
    pub fn advance_frames(&self, count: usize) {
        for _ in 0..count {
            self.advance_frame();
        }
    }

    /// Make frame requests fail, as a browser does for hidden documents
    pub fn refuse_frames(&self, refuse: bool) {
        self.doc.borrow_mut().refuse_frames = refuse;
    }

    /// Frame callbacks waiting for the next frame
    pub fn pending_frames(&self) -> usize {
        self.doc.borrow().frames.len()
    }

    /// Deliver intersection reports to every live observer
    ///
    /// Each observer receives one batch holding every target whose state
    /// differs from the last report, plus first reports for new targets.
    /// Returns the number of reports delivered.
    pub fn flush_intersections(&self) -> usize {
        let batches: Vec<(IntersectionDispatch, Vec<IntersectionReport>)> = {
            let mut guard = self.doc.borrow_mut();
            let doc = &mut *guard;
            let nodes = &doc.nodes;
            let scroll = doc.scroll;
            let viewport = doc.viewport;

            let batches = doc
                .observers
                .values_mut()
                .filter_map(|observer| {
                    let root = match observer.root {
                        Some(root) => client_rect(nodes, scroll, root),
                        None => Some(viewport),
                    }
                    .map(|root| root.inflate(&observer.margin));
                    let threshold = observer.threshold;

                    let mut reports = Vec::new();
                    for (target, last) in observer.targets.iter_mut() {
                        let now = match (client_rect(nodes, scroll, *target), root) {
                            (Some(bounds), Some(root)) => intersection_ratio(&bounds, &root)
                                .is_some_and(|ratio| threshold == 0.0 || ratio >= threshold),
                            _ => false,
                        };
                        if *last != Some(now) {
                            *last = Some(now);
                            reports.push(IntersectionReport {
                                target: *target,
                                is_intersecting: now,
                            });
                        }
                    }
                    (!reports.is_empty()).then(|| (observer.dispatch.clone(), reports))
                })
                .collect();
            batches
        };

        let mut delivered = 0;
        for (dispatch, reports) in batches {
            delivered += reports.len();
            dispatch(&reports);
        }
        delivered
    }

    /// Native observers currently connected
    pub fn live_observers(&self) -> usize {
        self.doc.borrow().observers.len()
    }

    /// Native observers constructed so far
    pub fn observers_created(&self) -> u64 {
        self.doc.borrow().observers_created
    }

    /// Targets observed across every live observer
    pub fn observed_targets(&self) -> usize {
        self.doc
            .borrow()
            .observers
            .values()
            .map(|observer| observer.targets.len())
            .sum()
    }
}

impl std::fmt::Debug for HeadlessHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let doc = self.doc.borrow();
        f.debug_struct("HeadlessHost")
            .field("nodes", &doc.nodes.len())
            .field("viewport", &doc.viewport)
            .field("scroll", &doc.scroll)
            .field("observers", &doc.observers.len())
            .field("pending_frames", &doc.frames.len())
            .finish()
    }
}

struct SimulatedObserverHandle {
    slot: ObserverSlot,
    doc: Weak<RefCell<Document>>,
}

impl SimulatedObserverHandle {
    fn with_observer(&self, f: impl FnOnce(&mut SimulatedObserver)) {
        if let Some(doc) = self.doc.upgrade() {
            if let Some(observer) = doc.borrow_mut().observers.get_mut(self.slot) {
                f(observer);
            }
        }
    }
}

impl NativeObserver for SimulatedObserverHandle {
    fn observe(&self, target: ElementId) {
        self.with_observer(|observer| {
            observer.targets.entry(target).or_insert(None);
        });
    }

    fn unobserve(&self, target: ElementId) {
        self.with_observer(|observer| {
            observer.targets.shift_remove(&target);
        });
    }

    fn disconnect(&self) {
        if let Some(doc) = self.doc.upgrade() {
            doc.borrow_mut().observers.remove(self.slot);
        }
    }
}

impl IntersectionHost for HeadlessHost {
    fn resolve_root(&self, selector: &str) -> Option<ElementId> {
        self.doc.borrow().selectors.get(selector).copied()
    }

    fn create_observer(
        &self,
        options: &ObserverOptions,
        dispatch: IntersectionDispatch,
    ) -> Result<Box<dyn NativeObserver>> {
        let mut doc = self.doc.borrow_mut();
        doc.observers_created += 1;
        let slot = doc.observers.insert(SimulatedObserver {
            root: options.root(),
            margin: *options.tolerance(),
            threshold: options.threshold(),
            targets: IndexMap::default(),
            dispatch,
        });
        Ok(Box::new(SimulatedObserverHandle {
            slot,
            doc: Rc::downgrade(&self.doc),
        }))
    }
}

impl FrameHost for HeadlessHost {
    fn request_frame(&self, callback: FrameCallback) -> Result<FrameHandle> {
        let mut doc = self.doc.borrow_mut();
        if doc.refuse_frames {
            return Err(InViewportError::Host("frame request refused".into()));
        }
        let handle = FrameHandle(doc.next_frame);
        doc.next_frame += 1;
        doc.frames.push((handle, callback));
        Ok(handle)
    }

    fn cancel_frame(&self, handle: FrameHandle) {
        self.doc
            .borrow_mut()
            .frames
            .retain(|(pending, _)| *pending != handle);
    }
}

impl RenderQueue for HeadlessHost {
    fn schedule_after_render(&self, task: RenderTask) {
        self.doc.borrow_mut().render_queue.push(task);
    }
}

impl GeometryPredicate for HeadlessHost {
    fn is_in_viewport(
        &self,
        element: ElementId,
        tolerance: &ViewportTolerance,
        scrollable_area: Option<&str>,
    ) -> bool {
        let doc = self.doc.borrow();
        let Some(bounds) = client_rect(&doc.nodes, doc.scroll, element) else {
            return false;
        };
        let area = scrollable_area
            .and_then(|selector| doc.selectors.get(selector))
            .and_then(|&container| client_rect(&doc.nodes, doc.scroll, container))
            .unwrap_or(doc.viewport);
        is_in_viewport(&bounds, &area, tolerance)
    }
}
