//! Pagetear
//!
//! A capture-and-render pipeline for automated web page teardown reports.
//! It drives a headless Chromium session over CDP to produce deterministic,
//! complete visual evidence (desktop and mobile renderings, including an
//! opened mobile navigation state) from arbitrary third-party pages, and
//! converts a composed report document into a paginated PDF artifact.
//!
//! # Features
//!
//! - **Bounded everything**: every navigation wait, settle delay and image
//!   wait carries its own timeout; a hostile page degrades the output, it
//!   never hangs the job
//! - **Best-effort completeness**: stabilization, menu discovery and image
//!   verification failures are logged and absorbed, never escalated
//! - **Exclusive session ownership**: one engine session per job, closed
//!   exactly once on every exit path
//!
//! # Example
//!
//! ```no_run
//! use pagetear::session::EngineSession;
//! use pagetear::{DeviceProfile, SessionConfig};
//!
//! # async fn run() -> pagetear::Result<()> {
//! let session = EngineSession::launch(&SessionConfig::default()).await?;
//! let ctx = session.new_context(&DeviceProfile::desktop()).await?;
//! pagetear::navigate::navigate(ctx.page(), "https://example.com", &Default::default()).await?;
//! let shot = pagetear::capture::capture_page(&ctx, &Default::default()).await?;
//! println!("captured {} bytes, title {:?}", shot.png.len(), shot.signals.title);
//! ctx.close().await;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod capture;
pub mod critique;
pub mod job;
pub mod menu;
pub mod navigate;
pub mod pdf;
pub mod report;
pub mod session;
pub mod stabilize;
pub mod storage;

pub use session::{EngineSession, PageContext, SessionConfig};

/// Vertical safety ceiling for captures, in CSS pixels.
///
/// Pages taller than this are captured as a clipped region from the top down
/// to the ceiling. Pathologically tall pages (infinite feeds, broken layout)
/// would otherwise blow the job's wall-clock budget during encoding.
pub const MAX_CAPTURE_HEIGHT_PX: u32 = 10_000;

/// Upper bound on the visible-text excerpt extracted as a capture signal.
pub const TEXT_EXCERPT_MAX_CHARS: usize = 4_000;

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1365,
            height: 768,
        }
    }
}

/// Device emulation profile: viewport, user agent, pixel ratio and the
/// mobile-emulation flag. Pure configuration, not owned by anything.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    /// Short name used in logs and artifact paths ("desktop", "mobile")
    pub name: &'static str,
    pub viewport: Viewport,
    /// User agent override; `None` keeps the engine default
    pub user_agent: Option<String>,
    pub is_mobile: bool,
    pub scale_factor: f64,
}

const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

impl DeviceProfile {
    /// Canonical desktop profile: 1365x768, pixel ratio 1, default UA.
    pub fn desktop() -> Self {
        Self {
            name: "desktop",
            viewport: Viewport {
                width: 1365,
                height: 768,
            },
            user_agent: None,
            is_mobile: false,
            scale_factor: 1.0,
        }
    }

    /// Canonical mobile profile: 390x844, pixel ratio 2, mobile Safari UA.
    pub fn mobile() -> Self {
        Self {
            name: "mobile",
            viewport: Viewport {
                width: 390,
                height: 844,
            },
            user_agent: Some(MOBILE_USER_AGENT.to_string()),
            is_mobile: true,
            scale_factor: 2.0,
        }
    }
}

/// Textual signals extracted alongside a capture
///
/// Every field is best-effort: extraction failures degrade to an empty
/// string, they never abort the capture.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PageSignals {
    /// Page title
    pub title: String,
    /// Content of the `meta[name=description]` tag
    pub description: String,
    /// Visible body text, truncated to [`TEXT_EXCERPT_MAX_CHARS`]
    pub text_excerpt: String,
    /// Viewport width the signals were extracted under
    pub viewport_width: u32,
    /// Viewport height the signals were extracted under
    pub viewport_height: u32,
}

/// A single capture: raw PNG bytes plus the extracted signals.
/// Immutable after creation.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub png: Vec<u8>,
    pub signals: PageSignals,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desktop_profile_matches_canonical_geometry() {
        let p = DeviceProfile::desktop();
        assert_eq!(p.viewport.width, 1365);
        assert_eq!(p.viewport.height, 768);
        assert_eq!(p.scale_factor, 1.0);
        assert!(!p.is_mobile);
        assert!(p.user_agent.is_none());
    }

    #[test]
    fn mobile_profile_matches_canonical_geometry() {
        let p = DeviceProfile::mobile();
        assert_eq!(p.viewport.width, 390);
        assert_eq!(p.viewport.height, 844);
        assert_eq!(p.scale_factor, 2.0);
        assert!(p.is_mobile);
        let ua = p.user_agent.expect("mobile profile sets a user agent");
        assert!(ua.contains("iPhone"));
        assert!(ua.contains("Safari"));
    }

    #[test]
    fn signals_default_to_empty_fields() {
        let s = PageSignals::default();
        assert!(s.title.is_empty());
        assert!(s.description.is_empty());
        assert!(s.text_excerpt.is_empty());
    }
}
