//! InView Web
//!
//! Browser backend for [`inview`]. [`WebHost`] implements every host trait
//! over `web-sys`:
//!
//! - native observation through `IntersectionObserver`
//! - frame polling through `requestAnimationFrame`
//! - the after-render hook through `queueMicrotask`
//! - geometry through `getBoundingClientRect`
//!
//! DOM elements are registered in an [`ElementArena`] and handed to the
//! engines as [`inview::ElementId`]s. A registered element carries its id in
//! a JS property, so observer reports map back to ids without a scan.
//!
//! Only the arena is available off `wasm32`.

pub mod arena;

#[cfg(target_arch = "wasm32")]
mod web;

pub use arena::{ElementArena, TaggedNode};

#[cfg(target_arch = "wasm32")]
pub use web::WebHost;
