//! Host capability traits
//!
//! The engines never touch a document directly. Everything platform specific
//! (native observers, display-frame callbacks, the after-render hook, and
//! element geometry) comes from a [`Host`] bundle.
//!
//! # Implementations
//!
//! - [`crate::headless::HeadlessHost`] - simulated document with manual clocks
//! - `inview_web::WebHost` - browser backend over `web-sys`
//!
//! All hosts are single-threaded. Callbacks handed to a host are invoked from
//! the same thread, never re-entrantly from inside the call that registered
//! them.

use std::rc::Rc;

use inview_core::{Capabilities, ElementId, ObserverOptions, Result, ViewportTolerance};

/// One native intersection notification for one target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntersectionReport {
    pub target: ElementId,
    pub is_intersecting: bool,
}

/// Handler a native observer invokes with each batch of reports
pub type IntersectionDispatch = Rc<dyn Fn(&[IntersectionReport])>;

/// A native observer instance; may watch many targets
pub trait NativeObserver {
    fn observe(&self, target: ElementId);
    fn unobserve(&self, target: ElementId);
    /// Stop watching every target; the instance is discarded afterwards
    fn disconnect(&self);
}

/// Native intersection observation
pub trait IntersectionHost {
    /// Resolve a scrollable-area selector to an observer root
    fn resolve_root(&self, selector: &str) -> Option<ElementId>;

    /// Construct a native observer bound to `dispatch`
    ///
    /// Reports are delivered asynchronously, batched, and possibly coalesced.
    /// A freshly observed target is reported at least once.
    fn create_observer(
        &self,
        options: &ObserverOptions,
        dispatch: IntersectionDispatch,
    ) -> Result<Box<dyn NativeObserver>>;
}

/// Handle returned by [`FrameHost::request_frame`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

pub type FrameCallback = Box<dyn FnOnce()>;

/// Display-frame scheduling
pub trait FrameHost {
    /// Run `callback` once before the next repaint
    ///
    /// On error the callback is dropped and never runs.
    fn request_frame(&self, callback: FrameCallback) -> Result<FrameHandle>;
    fn cancel_frame(&self, handle: FrameHandle);
}

pub type RenderTask = Box<dyn FnOnce()>;

/// The host framework's "after the next render pass" hook
pub trait RenderQueue {
    fn schedule_after_render(&self, task: RenderTask);
}

/// Decides whether an element currently counts as "in viewport"
///
/// Implementations must answer `false` for elements that are detached from
/// the document or unknown to the host, rather than failing.
pub trait GeometryPredicate {
    fn is_in_viewport(
        &self,
        element: ElementId,
        tolerance: &ViewportTolerance,
        scrollable_area: Option<&str>,
    ) -> bool;
}

/// Bundle of host capabilities handed to the coordinator
///
/// Native observation and frame scheduling are optional; their presence is
/// what [`Host::capabilities`] reports.
#[derive(Clone)]
pub struct Host {
    pub intersection: Option<Rc<dyn IntersectionHost>>,
    pub frames: Option<Rc<dyn FrameHost>>,
    pub render: Rc<dyn RenderQueue>,
    pub geometry: Rc<dyn GeometryPredicate>,
}

impl Host {
    pub fn new(render: Rc<dyn RenderQueue>, geometry: Rc<dyn GeometryPredicate>) -> Self {
        Self {
            intersection: None,
            frames: None,
            render,
            geometry,
        }
    }

    pub fn with_intersection(mut self, intersection: Rc<dyn IntersectionHost>) -> Self {
        self.intersection = Some(intersection);
        self
    }

    pub fn with_frames(mut self, frames: Rc<dyn FrameHost>) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            intersection_observer: self.intersection.is_some(),
            animation_frame: self.frames.is_some(),
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("capabilities", &self.capabilities())
            .finish()
    }
}
