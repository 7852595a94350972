//! Headless Feed Demo
//!
//! A long feed of cards in a simulated 800x600 window. Cards report when they
//! scroll into view and out again, first through native observers and then
//! through frame polling.
//!
//! Run with: RUST_LOG=inview=debug cargo run -p inview --example headless_feed

use std::rc::Rc;

use inview::{HeadlessHost, InViewportConfig, Rect, Result, ViewportCoordinator, WatchOptions};

const CONFIG: &str = r#"
# Load cards a little before they reach the fold
viewport_tolerance = { top = 0.0, right = 0.0, bottom = 150.0, left = 0.0 }
"#;

const CARD_HEIGHT: f64 = 240.0;
const CARD_COUNT: usize = 12;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = InViewportConfig::from_toml_str(CONFIG)?;

    run_feed("native", |host| host.host(), config.clone())?;
    run_feed("polling", |host| host.polling_host(), config)?;
    Ok(())
}

fn run_feed(
    label: &str,
    bundle: impl Fn(&HeadlessHost) -> inview::Host,
    config: InViewportConfig,
) -> Result<()> {
    let document = HeadlessHost::new(800.0, 600.0);
    let viewport = ViewportCoordinator::new(bundle(&document), config);
    tracing::info!(label, strategy = ?viewport.strategy(), "Building feed");

    for index in 0..CARD_COUNT {
        let card = document.create_element(Rect::new(
            20.0,
            index as f64 * CARD_HEIGHT,
            760.0,
            CARD_HEIGHT - 20.0,
        ));
        viewport.watch_element(
            card,
            viewport.default_options(),
            Rc::new(move || tracing::info!(card = index, "Entered viewport")),
            Rc::new(move || tracing::info!(card = index, "Left viewport")),
        )?;
    }

    // A banner that only cares about appearing, scoped to a tighter margin
    let banner = document.create_element(Rect::new(0.0, 1800.0, 800.0, 90.0));
    viewport.watch_element(
        banner,
        WatchOptions::new(),
        Rc::new(|| tracing::info!("Banner shown")),
        Rc::new(|| {}),
    )?;

    let pump = || {
        document.flush_render();
        document.flush_intersections();
        document.advance_frame();
    };

    pump();
    for offset in (0..=CARD_COUNT).map(|step| step as f64 * 200.0) {
        tracing::info!(label, offset, "Scrolling");
        document.scroll_to(0.0, offset);
        pump();
    }

    document.scroll_to(0.0, 0.0);
    pump();

    viewport.destroy();
    tracing::info!(label, ?viewport, "Feed torn down");
    Ok(())
}
