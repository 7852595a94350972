//! InView Core
//!
//! Foundational types shared by the viewport observation engines and their
//! host backends:
//!
//! - **Element identity**: [`ElementId`] arena keys, so engines never hold
//!   references to host nodes
//! - **Geometry**: [`Rect`], [`ViewportTolerance`] and the containment
//!   predicate used by the polling strategy
//! - **Options**: per-watch [`WatchOptions`] and the derived
//!   [`ObserverOptions`] / [`ObserverKey`] used to share native observers
//! - **Configuration**: [`InViewportConfig`], [`Capabilities`] and
//!   [`Strategy`] resolution
//!
//! # Example
//!
//! ```rust
//! use inview_core::{ViewportTolerance, WatchOptions};
//!
//! let options = WatchOptions::new().tolerance(ViewportTolerance::bottom(300.0));
//! let observer = options.observer_options(None).unwrap();
//!
//! assert_eq!(observer.root_margin(), "0px 0px 300px 0px");
//! assert_eq!(observer.threshold(), 0.0);
//! ```

pub mod config;
pub mod element;
pub mod error;
pub mod geometry;
pub mod options;

pub use config::{Capabilities, InViewportConfig, Strategy};
pub use element::ElementId;
pub use error::{InViewportError, Result};
pub use geometry::{intersection_ratio, is_in_viewport, Rect, ViewportTolerance};
pub use options::{ObserverKey, ObserverOptions, WatchOptions};
