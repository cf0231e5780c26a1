//! Document renderer
//!
//! Converts a composed report document into a paginated PDF with fixed page
//! geometry. Inline-encoded images are rewritten to transient object URLs
//! before pagination (the print pipeline renders oversized data URIs
//! unreliably), then image readiness is verified across multiple passes with
//! inter-pass re-scrolling, because decode state races layout and there is no
//! explicit "fully rendered" signal to wait on. Image failures degrade the
//! artifact, they never abort it.

use crate::session::{eval_in, with_session, EngineSession, SessionConfig};
use crate::stabilize::{stabilize, StabilizeOptions};
use crate::{Error, Result};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::page::Page;
use log::{debug, warn};
use std::time::Duration;
use tokio::time::sleep;

/// A4 paper width in inches
pub const A4_WIDTH_IN: f64 = 8.27;
/// A4 paper height in inches
pub const A4_HEIGHT_IN: f64 = 11.69;

const MM_PER_INCH: f64 = 25.4;

/// Convert millimetres to the inches `Page.printToPDF` expects.
pub fn mm_to_inches(mm: f64) -> f64 {
    mm / MM_PER_INCH
}

/// Timing and geometry knobs for one render
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Budget for loading the composed document
    pub load_timeout: Duration,
    /// Per-image completion wait during the explicit image pass, in ms
    pub image_wait_ms: u32,
    /// Budget for each image pass evaluation
    pub image_pass_budget: Duration,
    /// Maximum verification retry passes
    pub verify_passes: u32,
    /// Fixed settle before pagination
    pub settle: Duration,
    /// Budget for the print command
    pub pdf_budget: Duration,
    /// Page margins in millimetres: top, right, bottom, left
    pub margins_mm: (f64, f64, f64, f64),
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(30),
            image_wait_ms: 3_000,
            image_pass_budget: Duration::from_secs(30),
            verify_passes: 3,
            settle: Duration::from_millis(1000),
            pdf_budget: Duration::from_secs(60),
            margins_mm: (12.0, 12.0, 14.0, 12.0),
        }
    }
}

/// A produced artifact plus render statistics
#[derive(Debug)]
pub struct RenderOutcome {
    /// The paginated PDF bytes
    pub pdf: Vec<u8>,
    /// How many inline-encoded images were rewritten to object URLs
    pub normalized_images: usize,
}

const NORMALIZE_IMAGES_JS: &str = r#"(async () => {
    const imgs = Array.from(document.images).filter((img) => (img.src || '').startsWith('data:'));
    await Promise.all(imgs.map(async (img) => {
        try {
            const resp = await fetch(img.src);
            const blob = await resp.blob();
            img.src = URL.createObjectURL(blob);
        } catch (e) {}
    }));
    return imgs.length;
})()"#;

const IMAGE_PASS_JS: &str = r#"(async () => {
    const imgs = Array.from(document.images);
    for (const img of imgs) {
        img.scrollIntoView({ block: 'center' });
        void img.offsetHeight;
        if (!img.complete) {
            const src = img.src;
            img.src = '';
            img.src = src;
        }
        await new Promise((r) => setTimeout(r, 80));
    }
    const waitFor = (img) => new Promise((resolve) => {
        if (img.complete && img.naturalWidth > 0) { resolve(); return; }
        img.addEventListener('load', resolve, { once: true });
        img.addEventListener('error', resolve, { once: true });
        setTimeout(resolve, __IMAGE_WAIT__);
    });
    await Promise.all(imgs.map(waitFor));
    window.scrollTo(0, 0);
    return imgs.length;
})()"#;

const VERIFY_IMAGES_JS: &str = r#"(() => {
    let pending = 0;
    for (const img of Array.from(document.images)) {
        if (!(img.complete && img.naturalWidth > 0 && img.naturalHeight > 0)) { pending += 1; }
    }
    return pending;
})()"#;

/// Render the composed document into a paginated PDF.
///
/// When `session` is supplied the caller keeps ownership and the renderer
/// never closes it; otherwise a private session is created and released on
/// every exit path.
pub async fn render_document(
    html: &str,
    session: Option<&EngineSession>,
    opts: &RenderOptions,
) -> Result<RenderOutcome> {
    match session {
        Some(shared) => render_with_session(shared, html, opts).await,
        None => {
            let own = EngineSession::launch(&SessionConfig::default()).await?;
            with_session(own, |s| async move { render_with_session(&s, html, opts).await })
                .await
        }
    }
}

async fn render_with_session(
    session: &EngineSession,
    html: &str,
    opts: &RenderOptions,
) -> Result<RenderOutcome> {
    let page = session.new_plain_page().await?;
    let outcome = render_on_page(&page, html, opts).await;
    // The rendering page is always released, success or not.
    if let Err(e) = page.close().await {
        warn!("Failed to release render page: {}", e);
    }
    outcome
}

async fn render_on_page(page: &Page, html: &str, opts: &RenderOptions) -> Result<RenderOutcome> {
    tokio::time::timeout(opts.load_timeout, page.set_content(html))
        .await
        .map_err(|_| Error::Timeout(opts.load_timeout.as_millis() as u64))?
        .map_err(|e| Error::Render(format!("Failed to load composed document: {}", e)))?;
    wait_for_complete(page, opts.load_timeout).await;

    let normalized_images =
        match eval_in::<i64>(page, NORMALIZE_IMAGES_JS, opts.image_pass_budget).await {
            Ok(n) => n.max(0) as usize,
            Err(e) => {
                warn!("Inline image normalization failed: {}", e);
                0
            }
        };
    debug!("Normalized {} inline images to object URLs", normalized_images);

    // Same scroll stabilization the capture path uses, minus input synthesis:
    // the document is ours, there are no overlays to dismiss.
    let stabilize_opts = StabilizeOptions {
        dismiss_overlays: false,
        ..StabilizeOptions::default()
    };
    stabilize(page, &stabilize_opts).await;

    let image_pass_js =
        IMAGE_PASS_JS.replace("__IMAGE_WAIT__", &opts.image_wait_ms.to_string());
    run_image_pass(page, &image_pass_js, opts).await;

    let mut pending = verify_images(page).await;
    let mut pass = 0;
    while pending > 0 && pass < opts.verify_passes {
        debug!(
            "Image verification pass {}/{}: {} images pending",
            pass + 1,
            opts.verify_passes,
            pending
        );
        run_image_pass(page, &image_pass_js, opts).await;
        pending = verify_images(page).await;
        pass += 1;
    }
    if pending > 0 {
        warn!(
            "{} images never reached decoded state; paginating anyway",
            pending
        );
    }

    sleep(opts.settle).await;

    let (top, right, bottom, left) = opts.margins_mm;
    let params = PrintToPdfParams::builder()
        .print_background(true)
        .display_header_footer(false)
        .paper_width(A4_WIDTH_IN)
        .paper_height(A4_HEIGHT_IN)
        .margin_top(mm_to_inches(top))
        .margin_right(mm_to_inches(right))
        .margin_bottom(mm_to_inches(bottom))
        .margin_left(mm_to_inches(left))
        .build();

    let pdf = tokio::time::timeout(opts.pdf_budget, page.pdf(params))
        .await
        .map_err(|_| Error::Timeout(opts.pdf_budget.as_millis() as u64))?
        .map_err(|e| Error::Render(format!("Pagination failed: {}", e)))?;

    Ok(RenderOutcome {
        pdf,
        normalized_images,
    })
}

async fn wait_for_complete(page: &Page, budget: Duration) {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        let state: String = eval_in(page, "document.readyState", Duration::from_secs(5))
            .await
            .unwrap_or_default();
        if state == "complete" {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!("Composed document never reported load completion; continuing");
            return;
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn run_image_pass(page: &Page, js: &str, opts: &RenderOptions) {
    if let Err(e) = eval_in::<i64>(page, js, opts.image_pass_budget).await {
        warn!("Per-image render pass failed: {}", e);
    }
}

async fn verify_images(page: &Page) -> i64 {
    match eval_in::<i64>(page, VERIFY_IMAGES_JS, Duration::from_secs(5)).await {
        Ok(n) => n.max(0),
        Err(e) => {
            debug!("Image verification probe failed: {}", e);
            0
        }
    }
}
