//! Watch options and derived observer configuration
//!
//! [`WatchOptions`] is what a caller asks for. The native strategy turns it
//! into [`ObserverOptions`], and every set of options with the same
//! [`ObserverKey`] shares one native observer instance.

use serde::{Deserialize, Serialize};

use crate::element::ElementId;
use crate::error::{InViewportError, Result};
use crate::geometry::ViewportTolerance;

/// Per-watch options
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Fraction of the element that must be visible for the native observer
    /// to report it as intersecting
    pub intersection_threshold: f64,
    /// Selector for a scrolling container to use instead of the window
    pub scrollable_area: Option<String>,
    /// Per-edge margin around the viewport
    pub viewport_tolerance: ViewportTolerance,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.intersection_threshold = threshold;
        self
    }

    pub fn scrollable_area(mut self, selector: impl Into<String>) -> Self {
        self.scrollable_area = Some(selector.into());
        self
    }

    pub fn tolerance(mut self, tolerance: ViewportTolerance) -> Self {
        self.viewport_tolerance = tolerance;
        self
    }

    /// Reject values a native observer would refuse
    pub fn validate(&self) -> Result<()> {
        if !self.viewport_tolerance.is_finite() {
            return Err(InViewportError::InvalidConfiguration(format!(
                "viewport tolerance must be finite, got {:?}",
                self.viewport_tolerance
            )));
        }
        let threshold = self.intersection_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(InViewportError::InvalidConfiguration(format!(
                "intersection threshold must be within [0, 1], got {threshold}"
            )));
        }
        Ok(())
    }

    /// Derive native observer options
    ///
    /// `root` is the resolved scrollable area, or `None` for the window.
    pub fn observer_options(&self, root: Option<ElementId>) -> Result<ObserverOptions> {
        self.validate()?;
        let t = &self.viewport_tolerance;
        // -0.0 and 0.0 must share an observer
        Ok(ObserverOptions {
            root,
            scrollable_area: self.scrollable_area.clone(),
            tolerance: ViewportTolerance {
                top: t.top + 0.0,
                left: t.left + 0.0,
                bottom: t.bottom + 0.0,
                right: t.right + 0.0,
            },
            threshold: self.intersection_threshold + 0.0,
        })
    }
}

/// Configuration actually applied to a native observer
#[derive(Clone, Debug, PartialEq)]
pub struct ObserverOptions {
    root: Option<ElementId>,
    scrollable_area: Option<String>,
    tolerance: ViewportTolerance,
    threshold: f64,
}

impl ObserverOptions {
    /// Root element, `None` for the window viewport
    pub fn root(&self) -> Option<ElementId> {
        self.root
    }

    /// Selector the root was resolved from
    pub fn scrollable_area(&self) -> Option<&str> {
        self.scrollable_area.as_deref()
    }

    pub fn tolerance(&self) -> &ViewportTolerance {
        &self.tolerance
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// CSS margin string in `top right bottom left` order
    pub fn root_margin(&self) -> String {
        let t = &self.tolerance;
        format!("{}px {}px {}px {}px", t.top, t.right, t.bottom, t.left)
    }

    pub fn key(&self) -> ObserverKey {
        ObserverKey {
            root: self.root,
            root_margin: self.root_margin(),
            threshold_bits: self.threshold.to_bits(),
        }
    }
}

/// Canonical identity of a native observer configuration
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObserverKey {
    root: Option<ElementId>,
    root_margin: String,
    threshold_bits: u64,
}

impl ObserverKey {
    pub fn root(&self) -> Option<ElementId> {
        self.root
    }

    pub fn root_margin(&self) -> &str {
        &self.root_margin
    }

    pub fn threshold(&self) -> f64 {
        f64::from_bits(self.threshold_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_bottom_tolerance_root_margin() {
        let options = WatchOptions::new().tolerance(ViewportTolerance::bottom(300.0));
        let observer = options.observer_options(None).unwrap();

        assert_eq!(observer.root_margin(), "0px 0px 300px 0px");
        assert_eq!(observer.threshold(), 0.0);
        assert_eq!(observer.root(), None);
    }

    #[test]
    fn test_fractional_margins_are_preserved() {
        let options = WatchOptions::new().tolerance(ViewportTolerance::new(1.5, -2.0, 0.0, 4.0));
        let observer = options.observer_options(None).unwrap();
        assert_eq!(observer.root_margin(), "1.5px -2px 0px 4px");
    }

    #[test]
    fn test_equal_options_share_key() {
        let a = WatchOptions::new()
            .threshold(0.5)
            .tolerance(ViewportTolerance::uniform(10.0));
        let b = a.clone();

        assert_eq!(
            a.observer_options(None).unwrap().key(),
            b.observer_options(None).unwrap().key()
        );
    }

    #[test]
    fn test_negative_zero_threshold_shares_key() {
        let zero = WatchOptions::new().observer_options(None).unwrap();
        let negative = WatchOptions::new()
            .threshold(-0.0)
            .observer_options(None)
            .unwrap();
        assert_eq!(zero.key(), negative.key());
    }

    #[test]
    fn test_negative_zero_tolerance_shares_key() {
        let zero = WatchOptions::new().observer_options(None).unwrap();
        let negative = WatchOptions::new()
            .tolerance(ViewportTolerance::new(-0.0, -0.0, -0.0, -0.0))
            .observer_options(None)
            .unwrap();
        assert_eq!(negative.root_margin(), "0px 0px 0px 0px");
        assert_eq!(zero.key(), negative.key());
    }

    #[test]
    fn test_root_distinguishes_keys() {
        let mut arena: SlotMap<ElementId, ()> = SlotMap::with_key();
        let container = arena.insert(());

        let options = WatchOptions::new().scrollable_area(".list");
        let windowed = options.observer_options(None).unwrap();
        let rooted = options.observer_options(Some(container)).unwrap();

        assert_ne!(windowed.key(), rooted.key());
        assert_eq!(rooted.key().root(), Some(container));
        assert_eq!(rooted.scrollable_area(), Some(".list"));
    }

    #[test]
    fn test_invalid_tolerance_is_rejected() {
        let options = WatchOptions::new().tolerance(ViewportTolerance::bottom(f64::NAN));
        assert!(matches!(
            options.observer_options(None),
            Err(InViewportError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_threshold_out_of_range_is_rejected() {
        for threshold in [1.5, -0.1, f64::INFINITY] {
            let result = WatchOptions::new().threshold(threshold).validate();
            assert!(matches!(
                result,
                Err(InViewportError::InvalidConfiguration(_))
            ));
        }
    }
}
