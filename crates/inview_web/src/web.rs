//! `web-sys` host implementation

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use js_sys::{Array, Reflect};
use wasm_bindgen::prelude::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    Document, DomRect, Element, IntersectionObserver, IntersectionObserverEntry,
    IntersectionObserverInit, Window,
};

use inview::{
    FrameCallback, FrameHandle, FrameHost, GeometryPredicate, Host, IntersectionDispatch,
    IntersectionHost, IntersectionReport, NativeObserver, RenderQueue, RenderTask,
};
use inview_core::{
    is_in_viewport, Capabilities, ElementId, InViewportError, ObserverOptions, Rect, Result,
    ViewportTolerance,
};

use crate::arena::{ElementArena, TaggedNode};

type Elements = Rc<RefCell<ElementArena<Element>>>;

/// JS property holding the arena id of a registered element
const ID_PROPERTY: &str = "__inviewElementId";

impl TaggedNode for Element {
    fn tag(&self) -> Option<ElementId> {
        let value = Reflect::get(self, &JsValue::from_str(ID_PROPERTY)).ok()?;
        let raw = value.as_string()?.parse().ok()?;
        Some(ElementId::from_raw(raw))
    }

    fn set_tag(&self, id: Option<ElementId>) {
        let key = JsValue::from_str(ID_PROPERTY);
        // Stored as a string; raw ids do not fit a JS number
        let result = match id {
            Some(id) => Reflect::set(self, &key, &JsValue::from_str(&id.to_raw().to_string())),
            None => Reflect::delete_property(self, &key),
        };
        if let Err(err) = result {
            tracing::warn!(?err, "Failed to tag element with its viewport id");
        }
    }
}

fn rect_of(rect: &DomRect) -> Rect {
    Rect::new(rect.x(), rect.y(), rect.width(), rect.height())
}

fn js_error(context: &str, err: JsValue) -> InViewportError {
    InViewportError::Host(format!("{context}: {err:?}"))
}

/// Browser host over the global `window`
///
/// Cheap to clone; clones share one element arena. Use one host per
/// document, since registered elements carry the arena's ids.
///
/// The embedder owns element lifetimes in the arena: unwatch an element, then
/// [`release`](Self::release) it. Scrollable-area containers resolved from a
/// `scrollable_area` selector are registered too and stay registered until
/// released the same way, once no watch uses that container.
#[derive(Clone)]
pub struct WebHost {
    window: Window,
    document: Document,
    elements: Elements,
}

impl WebHost {
    pub fn new() -> Result<Self> {
        let window = web_sys::window()
            .ok_or_else(|| InViewportError::Unsupported("no global window".into()))?;
        let document = window
            .document()
            .ok_or_else(|| InViewportError::Unsupported("window has no document".into()))?;
        Ok(Self {
            window,
            document,
            elements: Rc::new(RefCell::new(ElementArena::new())),
        })
    }

    /// Id for a DOM element, registering it on first use
    pub fn register(&self, element: &Element) -> ElementId {
        self.elements.borrow_mut().register(element.clone())
    }

    /// Register the first element matching `selector`
    ///
    /// The returned id stays registered until [`release`](Self::release).
    pub fn register_selector(&self, selector: &str) -> Result<Option<ElementId>> {
        let element = self
            .document
            .query_selector(selector)
            .map_err(|err| js_error("querySelector", err))?;
        Ok(element.map(|element| self.register(&element)))
    }

    pub fn element(&self, id: ElementId) -> Option<Element> {
        self.elements.borrow().get(id).cloned()
    }

    /// Drop the arena's reference to a DOM element
    ///
    /// Unwatch the element first; reports for released ids are ignored.
    pub fn release(&self, id: ElementId) {
        self.elements.borrow_mut().release(id);
    }

    /// Feature-detect the browser APIs the engines rely on
    pub fn capabilities(&self) -> Capabilities {
        let has = |name: &str| Reflect::has(&self.window, &JsValue::from_str(name)).unwrap_or(false);
        Capabilities {
            intersection_observer: has("IntersectionObserver"),
            animation_frame: has("requestAnimationFrame"),
        }
    }

    /// Host bundle exposing whatever the browser supports
    pub fn host(&self) -> Host {
        let capabilities = self.capabilities();
        let this = Rc::new(self.clone());
        let mut host = Host::new(this.clone(), this.clone());
        if capabilities.intersection_observer {
            host = host.with_intersection(this.clone());
        }
        if capabilities.animation_frame {
            host = host.with_frames(this);
        }
        tracing::debug!(?capabilities, "Created web host");
        host
    }

    fn viewport(&self) -> Rect {
        let dimension = |value: std::result::Result<JsValue, JsValue>| {
            value.ok().and_then(|value| value.as_f64()).unwrap_or(0.0)
        };
        Rect::from_size(
            dimension(self.window.inner_width()),
            dimension(self.window.inner_height()),
        )
    }
}

impl std::fmt::Debug for WebHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebHost")
            .field("elements", &self.elements.borrow().len())
            .finish()
    }
}

// =============================================================================
// Native observation
// =============================================================================

struct WebObserver {
    observer: IntersectionObserver,
    elements: Weak<RefCell<ElementArena<Element>>>,
    _closure: Closure<dyn FnMut(Array, IntersectionObserver)>,
}

impl WebObserver {
    fn element(&self, target: ElementId) -> Option<Element> {
        self.elements.upgrade()?.borrow().get(target).cloned()
    }
}

impl NativeObserver for WebObserver {
    fn observe(&self, target: ElementId) {
        match self.element(target) {
            Some(element) => self.observer.observe(&element),
            None => tracing::warn!(?target, "Cannot observe an unregistered element"),
        }
    }

    fn unobserve(&self, target: ElementId) {
        if let Some(element) = self.element(target) {
            self.observer.unobserve(&element);
        }
    }

    fn disconnect(&self) {
        self.observer.disconnect();
    }
}

impl Drop for WebObserver {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

impl IntersectionHost for WebHost {
    /// Registers the container; see [`WebHost`] for who releases it
    fn resolve_root(&self, selector: &str) -> Option<ElementId> {
        match self.register_selector(selector) {
            Ok(root) => root,
            Err(err) => {
                tracing::warn!(selector, %err, "Invalid scrollable area selector");
                None
            }
        }
    }

    fn create_observer(
        &self,
        options: &ObserverOptions,
        dispatch: IntersectionDispatch,
    ) -> Result<Box<dyn NativeObserver>> {
        let init = IntersectionObserverInit::new();
        if let Some(root) = options.root().and_then(|root| self.element(root)) {
            init.set_root(Some(&root));
        }
        init.set_root_margin(&options.root_margin());
        init.set_threshold(&JsValue::from_f64(options.threshold()));

        let elements = Rc::downgrade(&self.elements);
        let closure = Closure::<dyn FnMut(Array, IntersectionObserver)>::new(
            move |entries: Array, _observer: IntersectionObserver| {
                let Some(elements) = elements.upgrade() else {
                    return;
                };
                let reports: Vec<IntersectionReport> = {
                    let elements = elements.borrow();
                    entries
                        .iter()
                        .filter_map(|entry| {
                            let entry: IntersectionObserverEntry = entry.unchecked_into();
                            Some(IntersectionReport {
                                target: elements.find(&entry.target())?,
                                is_intersecting: entry.is_intersecting(),
                            })
                        })
                        .collect()
                };
                if !reports.is_empty() {
                    dispatch(&reports);
                }
            },
        );

        let observer =
            IntersectionObserver::new_with_options(closure.as_ref().unchecked_ref(), &init)
                .map_err(|err| js_error("IntersectionObserver", err))?;

        Ok(Box::new(WebObserver {
            observer,
            elements: Rc::downgrade(&self.elements),
            _closure: closure,
        }))
    }
}

// =============================================================================
// Frames and render hook
// =============================================================================

impl FrameHost for WebHost {
    fn request_frame(&self, callback: FrameCallback) -> Result<FrameHandle> {
        let closure = Closure::once_into_js(move || callback());
        let id = self
            .window
            .request_animation_frame(closure.unchecked_ref())
            .map_err(|err| js_error("requestAnimationFrame", err))?;
        Ok(FrameHandle(id as u64))
    }

    fn cancel_frame(&self, handle: FrameHandle) {
        if let Err(err) = self.window.cancel_animation_frame(handle.0 as i32) {
            tracing::warn!(?err, "cancelAnimationFrame failed");
        }
    }
}

impl RenderQueue for WebHost {
    fn schedule_after_render(&self, task: RenderTask) {
        let closure = Closure::once_into_js(move || task());
        self.window.queue_microtask(closure.unchecked_ref());
    }
}

// =============================================================================
// Geometry
// =============================================================================

impl GeometryPredicate for WebHost {
    fn is_in_viewport(
        &self,
        element: ElementId,
        tolerance: &ViewportTolerance,
        scrollable_area: Option<&str>,
    ) -> bool {
        let Some(node) = self.element(element) else {
            return false;
        };
        if !node.is_connected() {
            return false;
        }

        let container = scrollable_area
            .and_then(|selector| self.document.query_selector(selector).ok().flatten());
        let area = match container {
            Some(container) => rect_of(&container.get_bounding_client_rect()),
            None => self.viewport(),
        };
        is_in_viewport(&rect_of(&node.get_bounding_client_rect()), &area, tolerance)
    }
}
