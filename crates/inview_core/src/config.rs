//! Service configuration and strategy selection
//!
//! Configuration is merged once when the coordinator is created. Keys mirror
//! the service options:
//!
//! ```toml
//! viewport_use_raf = false
//! viewport_use_intersection_observer = true
//! intersection_threshold = 0.25
//! scrollable_area = "#feed"
//!
//! [viewport_tolerance]
//! bottom = 300
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::options::WatchOptions;

/// Viewport service configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InViewportConfig {
    /// Force the per-frame polling strategy
    pub viewport_use_raf: Option<bool>,
    /// Allow (or, with `false`, forbid) the native observer strategy
    pub viewport_use_intersection_observer: Option<bool>,
    /// Default options for new watches
    #[serde(flatten)]
    pub defaults: WatchOptions,
}

impl InViewportConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!("Loaded viewport configuration from {}", path.display());
        Ok(config)
    }

    /// Configured defaults to refine per watch
    pub fn watch_options(&self) -> WatchOptions {
        self.defaults.clone()
    }
}

/// Host capabilities, detected once at startup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Native intersection observation is available
    pub intersection_observer: bool,
    /// Display-frame callbacks are available
    pub animation_frame: bool,
}

/// Which engine tracks a watched element
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Shared native intersection observers
    Native,
    /// Per-frame bounding box polling
    Polling,
}

impl Strategy {
    /// Pick the default strategy for a host
    ///
    /// An explicit `viewport_use_raf` wins when frames are available. Otherwise
    /// the native observer is used unless unsupported or switched off.
    pub fn resolve(config: &InViewportConfig, capabilities: Capabilities) -> Strategy {
        if config.viewport_use_raf == Some(true) && capabilities.animation_frame {
            return Strategy::Polling;
        }
        if capabilities.intersection_observer
            && config.viewport_use_intersection_observer != Some(false)
        {
            return Strategy::Native;
        }
        Strategy::Polling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ViewportTolerance;

    const ALL: Capabilities = Capabilities {
        intersection_observer: true,
        animation_frame: true,
    };

    #[test]
    fn test_parse_full_config() {
        let config = InViewportConfig::from_toml_str(
            r##"
            viewport_use_raf = false
            viewport_use_intersection_observer = true
            intersection_threshold = 0.25
            scrollable_area = "#feed"

            [viewport_tolerance]
            bottom = 300
            "##,
        )
        .unwrap();

        assert_eq!(config.viewport_use_raf, Some(false));
        assert_eq!(config.viewport_use_intersection_observer, Some(true));
        assert_eq!(config.defaults.intersection_threshold, 0.25);
        assert_eq!(config.defaults.scrollable_area.as_deref(), Some("#feed"));
        assert_eq!(
            config.defaults.viewport_tolerance,
            ViewportTolerance::bottom(300.0)
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = InViewportConfig::from_toml_str("").unwrap();
        assert_eq!(config, InViewportConfig::default());
        assert_eq!(config.watch_options(), WatchOptions::default());
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let result = InViewportConfig::from_toml_str("viewport_use_raf = \"yes\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = InViewportConfig::from_file("/nonexistent/inview.toml");
        assert!(matches!(result, Err(crate::InViewportError::Io(_))));
    }

    #[test]
    fn test_native_is_default_when_supported() {
        let config = InViewportConfig::default();
        assert_eq!(Strategy::resolve(&config, ALL), Strategy::Native);
    }

    #[test]
    fn test_use_raf_forces_polling() {
        let config = InViewportConfig {
            viewport_use_raf: Some(true),
            ..Default::default()
        };
        assert_eq!(Strategy::resolve(&config, ALL), Strategy::Polling);

        // Without frames the forced polling falls back to native
        let no_frames = Capabilities {
            intersection_observer: true,
            animation_frame: false,
        };
        assert_eq!(Strategy::resolve(&config, no_frames), Strategy::Native);
    }

    #[test]
    fn test_disabled_or_missing_native_falls_back_to_polling() {
        let disabled = InViewportConfig {
            viewport_use_intersection_observer: Some(false),
            ..Default::default()
        };
        assert_eq!(Strategy::resolve(&disabled, ALL), Strategy::Polling);

        let frames_only = Capabilities {
            intersection_observer: false,
            animation_frame: true,
        };
        assert_eq!(
            Strategy::resolve(&InViewportConfig::default(), frames_only),
            Strategy::Polling
        );
    }
}
