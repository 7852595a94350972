//! Polling strategy task
//!
//! A [`PollTask`] asks the geometry predicate about one element on every frame
//! and fires the element's callbacks when the answer flips.

use std::cell::Cell;
use std::rc::Rc;

use inview_core::{ElementId, ViewportTolerance, WatchOptions};

use crate::callbacks::{self, CallbackSet, Presence, SharedCallbacks};
use crate::frame::{FrameScheduler, FrameTask};
use crate::host::GeometryPredicate;

pub struct PollTask {
    element: ElementId,
    tolerance: ViewportTolerance,
    scrollable_area: Option<String>,
    geometry: Rc<dyn GeometryPredicate>,
    callbacks: SharedCallbacks,
    presence: Cell<Presence>,
}

impl PollTask {
    pub fn new(
        element: ElementId,
        options: &WatchOptions,
        geometry: Rc<dyn GeometryPredicate>,
        callbacks: SharedCallbacks,
    ) -> Self {
        Self {
            element,
            tolerance: options.viewport_tolerance,
            scrollable_area: options.scrollable_area.clone(),
            geometry,
            callbacks,
            presence: Cell::new(Presence::default()),
        }
    }

    /// Continue from another task's in/out state instead of "out"
    pub fn resume_from(self, previous: &PollTask) -> Self {
        self.presence.set(previous.presence.get());
        self
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn is_inside(&self) -> bool {
        self.presence.get().is_inside()
    }

    /// Evaluate the predicate once and fire on a transition
    pub fn check(&self) {
        let inside = self.geometry.is_in_viewport(
            self.element,
            &self.tolerance,
            self.scrollable_area.as_deref(),
        );

        let mut presence = self.presence.get();
        let transition = presence.update(inside);
        self.presence.set(presence);

        if let Some(transition) = transition {
            tracing::trace!(element = ?self.element, ?transition, "Polling transition");
            callbacks::fire(&self.callbacks, transition);
        }
    }

    /// Wrap as a frame task
    pub fn into_frame_task(self: Rc<Self>) -> FrameTask {
        Rc::new(move || self.check())
    }
}

impl std::fmt::Debug for PollTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollTask")
            .field("element", &self.element)
            .field("tolerance", &self.tolerance)
            .field("scrollable_area", &self.scrollable_area)
            .field("inside", &self.is_inside())
            .finish()
    }
}

/// Build the polling task for `element` and hand it to the frame loop
///
/// Callbacks already stored in the scheduler for this element are reused, so
/// re-registering an element never loses callbacks attached earlier. Passing
/// the `previous` task keeps its in/out state, so a re-registered element that
/// is already inside does not enter twice.
pub fn start_polling(
    frames: &FrameScheduler,
    geometry: Rc<dyn GeometryPredicate>,
    element: ElementId,
    options: &WatchOptions,
    callbacks: &CallbackSet,
    previous: Option<&PollTask>,
) -> Rc<PollTask> {
    let shared = frames.callbacks_or_default(element);
    shared.borrow_mut().merge(callbacks);

    let mut task = PollTask::new(element, options, geometry, shared);
    if let Some(previous) = previous {
        task = task.resume_from(previous);
    }
    let task = Rc::new(task);
    frames.add(element, task.clone().into_frame_task());
    task
}
