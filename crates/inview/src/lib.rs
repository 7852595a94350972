//! InView
//!
//! Detects when elements enter or exit the viewport (or a scrollable
//! container) and invokes registered callbacks on each transition.
//!
//! Two engines do the tracking:
//!
//! - [`ObserverRegistry`] multiplexes any number of elements over the fewest
//!   native intersection observers, one per distinct [`ObserverKey`]
//! - [`FrameScheduler`] drives a single per-frame polling loop that checks
//!   every watched element's bounding box, running only while something is
//!   registered
//!
//! [`ViewportCoordinator`] is the service facade. It picks a [`Strategy`] from
//! host [`Capabilities`] and [`InViewportConfig`], defers setup to the host's
//! after-render hook, and remembers which engine owns each element.
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use inview::headless::HeadlessHost;
//! use inview::{InViewportConfig, Rect, ViewportCoordinator, WatchOptions};
//!
//! let host = HeadlessHost::new(800.0, 600.0);
//! let viewport = ViewportCoordinator::new(host.host(), InViewportConfig::default());
//!
//! let hero = host.create_element(Rect::new(0.0, 900.0, 100.0, 100.0));
//! let entered = Rc::new(Cell::new(0));
//!
//! let counter = entered.clone();
//! viewport
//!     .watch_element(hero, WatchOptions::new(), Rc::new(move || counter.set(counter.get() + 1)), Rc::new(|| {}))
//!     .unwrap();
//!
//! host.flush_render();
//! host.flush_intersections();
//! assert_eq!(entered.get(), 0);
//!
//! host.scroll_to(0.0, 400.0);
//! host.flush_intersections();
//! assert_eq!(entered.get(), 1);
//! ```

pub mod callbacks;
pub mod coordinator;
pub mod frame;
pub mod headless;
pub mod host;
pub mod observer;
pub mod poll;

pub use callbacks::{Callback, CallbackSet, Presence, SharedCallbacks, Transition};
pub use coordinator::ViewportCoordinator;
pub use frame::{FrameScheduler, FrameTask};
pub use headless::HeadlessHost;
pub use host::{
    FrameCallback, FrameHandle, FrameHost, GeometryPredicate, Host, IntersectionDispatch,
    IntersectionHost, IntersectionReport, NativeObserver, RenderQueue, RenderTask,
};
pub use observer::ObserverRegistry;
pub use poll::PollTask;

pub use inview_core::{
    intersection_ratio, is_in_viewport, Capabilities, ElementId, InViewportConfig,
    InViewportError, ObserverKey, ObserverOptions, Rect, Result, Strategy, ViewportTolerance,
    WatchOptions,
};
