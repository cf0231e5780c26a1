//! Capture engine
//!
//! Produces a raster image plus textual signals from a stabilized browsing
//! context. Pages at or under the height ceiling are captured whole;
//! pathologically tall pages are clipped from the top down to the ceiling,
//! trading completeness for the bounded execution time a paid job requires.

use crate::session::{eval_in, PageContext};
use crate::{
    CaptureResult, Error, PageSignals, Result, MAX_CAPTURE_HEIGHT_PX, TEXT_EXCERPT_MAX_CHARS,
};
use base64::Engine as Base64Engine;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, Viewport as ClipRegion,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::page::Page;
use log::{debug, warn};
use std::time::Duration;

/// Knobs for one capture
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Vertical safety ceiling in CSS pixels
    pub max_height_px: u32,
    /// Budget for the screenshot command itself
    pub screenshot_budget: Duration,
    /// Budget for each individual signal extraction
    pub signal_budget: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            max_height_px: MAX_CAPTURE_HEIGHT_PX,
            screenshot_budget: Duration::from_secs(30),
            signal_budget: Duration::from_secs(5),
        }
    }
}

/// The effective vertical extent of a capture under the clamp policy.
pub fn clamp_capture_height(page_height: u32, ceiling: u32) -> u32 {
    page_height.min(ceiling)
}

const PAGE_HEIGHT_JS: &str = "Math.max(document.documentElement.scrollHeight, \
document.body ? document.body.scrollHeight : 0)";

const META_DESCRIPTION_JS: &str = r#"(() => {
    const el = document.querySelector('meta[name="description"]');
    return el ? (el.getAttribute('content') || '') : '';
})()"#;

const TEXT_EXCERPT_JS: &str = r#"(() => {
    const body = document.body;
    const text = body ? (body.innerText || '') : '';
    return text.slice(0, __MAX_CHARS__);
})()"#;

/// Capture the context's current page: raster image plus extracted signals.
///
/// The device profile was applied when the context was created; by this
/// point the page has been navigated and stabilized.
pub async fn capture_page(ctx: &PageContext, opts: &CaptureOptions) -> Result<CaptureResult> {
    let page = ctx.page();

    let height = match eval_in::<i64>(page, PAGE_HEIGHT_JS, Duration::from_secs(5)).await {
        Ok(h) => h.max(0) as u32,
        Err(e) => {
            warn!("Page height probe failed ({}); assuming clamp-safe height", e);
            0
        }
    };

    let png = if height <= opts.max_height_px {
        full_page_screenshot(page, opts).await?
    } else {
        warn!(
            "Page height {}px exceeds ceiling {}px; capturing clipped region",
            height, opts.max_height_px
        );
        clipped_screenshot(page, ctx.profile().viewport.width, opts).await?
    };

    let signals = extract_signals(ctx, opts.signal_budget).await;
    debug!(
        "Captured {} profile: {} bytes, title {:?}",
        ctx.profile().name,
        png.len(),
        signals.title
    );

    Ok(CaptureResult { png, signals })
}

async fn full_page_screenshot(page: &Page, opts: &CaptureOptions) -> Result<Vec<u8>> {
    let params = ScreenshotParams::builder()
        .format(CaptureScreenshotFormat::Png)
        .full_page(true)
        .build();
    tokio::time::timeout(opts.screenshot_budget, page.screenshot(params))
        .await
        .map_err(|_| Error::Timeout(opts.screenshot_budget.as_millis() as u64))?
        .map_err(|e| Error::Capture(format!("Screenshot failed: {}", e)))
}

async fn clipped_screenshot(page: &Page, width: u32, opts: &CaptureOptions) -> Result<Vec<u8>> {
    let clip = ClipRegion {
        x: 0.0,
        y: 0.0,
        width: width as f64,
        height: opts.max_height_px as f64,
        scale: 1.0,
    };
    let params = CaptureScreenshotParams::builder()
        .format(CaptureScreenshotFormat::Png)
        .clip(clip)
        .capture_beyond_viewport(true)
        .build();
    let response = tokio::time::timeout(opts.screenshot_budget, page.execute(params))
        .await
        .map_err(|_| Error::Timeout(opts.screenshot_budget.as_millis() as u64))?
        .map_err(|e| Error::Capture(format!("Clipped screenshot failed: {}", e)))?;

    base64::engine::general_purpose::STANDARD
        .decode(&response.result.data)
        .map_err(|e| Error::Capture(format!("Screenshot payload not base64: {}", e)))
}

/// Extract title, meta description and a bounded visible-text excerpt.
/// Every field is best-effort: a failed extraction yields an empty string
/// and never aborts the capture.
pub async fn extract_signals(ctx: &PageContext, budget: Duration) -> PageSignals {
    let page = ctx.page();
    let excerpt_js = TEXT_EXCERPT_JS.replace("__MAX_CHARS__", &TEXT_EXCERPT_MAX_CHARS.to_string());

    PageSignals {
        title: string_or_empty(page, "document.title || ''", budget).await,
        description: string_or_empty(page, META_DESCRIPTION_JS, budget).await,
        text_excerpt: string_or_empty(page, &excerpt_js, budget).await,
        viewport_width: ctx.profile().viewport.width,
        viewport_height: ctx.profile().viewport.height,
    }
}

async fn string_or_empty(page: &Page, js: &str, budget: Duration) -> String {
    match eval_in::<String>(page, js, budget).await {
        Ok(s) => s,
        Err(e) => {
            debug!("Signal extraction degraded to empty: {}", e);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heights_at_or_under_ceiling_capture_whole_page() {
        assert_eq!(clamp_capture_height(4_000, MAX_CAPTURE_HEIGHT_PX), 4_000);
        assert_eq!(
            clamp_capture_height(MAX_CAPTURE_HEIGHT_PX, MAX_CAPTURE_HEIGHT_PX),
            MAX_CAPTURE_HEIGHT_PX
        );
    }

    #[test]
    fn pathological_heights_clamp_to_exactly_the_ceiling() {
        assert_eq!(
            clamp_capture_height(20_000, MAX_CAPTURE_HEIGHT_PX),
            MAX_CAPTURE_HEIGHT_PX
        );
        assert_eq!(clamp_capture_height(u32::MAX, MAX_CAPTURE_HEIGHT_PX), 10_000);
    }

    #[test]
    fn default_options_use_the_shared_ceiling() {
        let opts = CaptureOptions::default();
        assert_eq!(opts.max_height_px, MAX_CAPTURE_HEIGHT_PX);
        assert!(opts.screenshot_budget >= Duration::from_secs(10));
    }

    #[test]
    fn excerpt_script_carries_the_bound() {
        let js = TEXT_EXCERPT_JS.replace("__MAX_CHARS__", &TEXT_EXCERPT_MAX_CHARS.to_string());
        assert!(js.contains("4000"));
        assert!(!js.contains("__MAX_CHARS__"));
    }
}
