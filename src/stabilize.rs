//! Page stabilizer
//!
//! Forces lazy-loaded and viewport-triggered content to materialize before
//! capture: incremental scrolling from top to bottom with a per-image
//! completion wait, then a return to the top, and optionally an
//! overlay-dismiss pass so hover/focus UI opened by the scrolling does not
//! pollute the final frame. Every step is catch-log-continue; an
//! unstabilized page is still captured rather than failing the job.

use crate::session::eval_in;
use crate::{Error, Result};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::page::Page;
use log::{debug, warn};
use std::time::Duration;
use tokio::time::sleep;

/// Timing and distance knobs for one stabilization pass
#[derive(Debug, Clone)]
pub struct StabilizeOptions {
    /// Cap on the total scrolled distance, protecting against infinite feeds
    pub max_scroll_px: u32,
    /// Pause after each scroll increment, in milliseconds
    pub step_pause_ms: u32,
    /// Per-image completion wait, in milliseconds
    pub image_wait_ms: u32,
    /// Overall budget for the scroll pass
    pub pass_budget: Duration,
    /// Whether to run the overlay-dismiss pass after scrolling
    pub dismiss_overlays: bool,
    /// Settle delay between dismissal inputs
    pub dismiss_settle: Duration,
}

impl Default for StabilizeOptions {
    fn default() -> Self {
        Self {
            max_scroll_px: 60_000,
            step_pause_ms: 250,
            image_wait_ms: 1_000,
            pass_budget: Duration::from_secs(60),
            dismiss_overlays: true,
            dismiss_settle: Duration::from_millis(300),
        }
    }
}

impl StabilizeOptions {
    /// Profile-aware defaults: mobile contexts skip overlay dismissal, since
    /// Escape and synthetic pointer input interact badly with touch-oriented
    /// menus that a later step may want to open.
    pub fn for_profile(profile: &crate::DeviceProfile) -> Self {
        Self {
            dismiss_overlays: !profile.is_mobile,
            ..Self::default()
        }
    }
}

// Placeholder substitution instead of format!() so the script can use braces
// freely.
const SCROLL_PASS_JS: &str = r#"(async () => {
    const doc = document.documentElement;
    const body = document.body;
    const fullHeight = Math.max(doc ? doc.scrollHeight : 0, body ? body.scrollHeight : 0);
    const maxScroll = Math.min(fullHeight, __MAX_SCROLL__);
    const step = Math.max(200, window.innerHeight);
    const waitFor = (img) => new Promise((resolve) => {
        if (img.complete) { resolve(); return; }
        img.addEventListener('load', resolve, { once: true });
        img.addEventListener('error', resolve, { once: true });
        setTimeout(resolve, __IMAGE_WAIT__);
    });
    for (let y = 0; y <= maxScroll; y += step) {
        window.scrollTo(0, y);
        await new Promise((r) => setTimeout(r, __STEP_PAUSE__));
        const pending = Array.from(document.images).filter((img) => !img.complete);
        await Promise.all(pending.map(waitFor));
    }
    window.scrollTo(0, 0);
    return Math.round(maxScroll);
})()"#;

fn scroll_pass_script(opts: &StabilizeOptions) -> String {
    SCROLL_PASS_JS
        .replace("__MAX_SCROLL__", &opts.max_scroll_px.to_string())
        .replace("__STEP_PAUSE__", &opts.step_pause_ms.to_string())
        .replace("__IMAGE_WAIT__", &opts.image_wait_ms.to_string())
}

/// Run the stabilization pass. Never fails: any error is logged and the page
/// is captured in whatever state it reached.
pub async fn stabilize(page: &Page, opts: &StabilizeOptions) {
    match eval_in::<i64>(page, &scroll_pass_script(opts), opts.pass_budget).await {
        Ok(scrolled) => debug!("Stabilized {}px of scrollable content", scrolled),
        Err(e) => warn!("Stabilization scroll pass failed, capturing as-is: {}", e),
    }

    if opts.dismiss_overlays {
        dismiss_overlays(page, opts.dismiss_settle).await;
    }
}

/// Close transient hover/focus UI left open by the scroll pass: Escape, a
/// neutral click near the viewport origin, then Escape again, each followed
/// by a short settle.
pub async fn dismiss_overlays(page: &Page, settle: Duration) {
    let steps: [&str; 3] = ["escape", "click", "escape"];
    for step in steps {
        let res = match step {
            "click" => neutral_click(page).await,
            _ => press_escape(page).await,
        };
        if let Err(e) = res {
            debug!("Overlay dismissal input ({}) failed: {}", step, e);
        }
        sleep(settle).await;
    }
}

async fn press_escape(page: &Page) -> Result<()> {
    for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
        let event = DispatchKeyEventParams::builder()
            .r#type(kind)
            .key("Escape")
            .code("Escape")
            .windows_virtual_key_code(27)
            .native_virtual_key_code(27)
            .build()
            .map_err(Error::Other)?;
        page.execute(event)
            .await
            .map_err(|e| Error::Other(format!("key dispatch failed: {}", e)))?;
    }
    Ok(())
}

async fn neutral_click(page: &Page) -> Result<()> {
    for kind in [
        DispatchMouseEventType::MousePressed,
        DispatchMouseEventType::MouseReleased,
    ] {
        let event = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(4.0)
            .y(4.0)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(Error::Other)?;
        page.execute(event)
            .await
            .map_err(|e| Error::Other(format!("mouse dispatch failed: {}", e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_script_substitutes_every_placeholder() {
        let js = scroll_pass_script(&StabilizeOptions::default());
        assert!(!js.contains("__MAX_SCROLL__"));
        assert!(!js.contains("__STEP_PAUSE__"));
        assert!(!js.contains("__IMAGE_WAIT__"));
        assert!(js.contains("60000"));
    }

    #[test]
    fn scroll_script_returns_to_top() {
        let js = scroll_pass_script(&StabilizeOptions::default());
        assert!(js.contains("window.scrollTo(0, 0)"));
    }

    #[test]
    fn mobile_profile_skips_overlay_dismissal() {
        let mobile = StabilizeOptions::for_profile(&crate::DeviceProfile::mobile());
        let desktop = StabilizeOptions::for_profile(&crate::DeviceProfile::desktop());
        assert!(!mobile.dismiss_overlays);
        assert!(desktop.dismiss_overlays);
    }

    #[test]
    fn scroll_distance_is_capped() {
        let opts = StabilizeOptions::default();
        assert!(opts.max_scroll_px <= 100_000);
        assert!(opts.pass_budget <= Duration::from_secs(120));
    }
}
