//! Engine session management
//!
//! One [`EngineSession`] owns one headless Chromium process for the duration
//! of a job; every capture and the final render share it to amortize startup
//! cost. The session is exclusively owned and must be closed exactly once on
//! every exit path, which [`with_session`] enforces as a scoped
//! acquire/use/release pattern.

use crate::{DeviceProfile, Error, Result, Viewport};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCookiesParams, SetUserAgentOverrideParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Configuration for launching an engine session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Path to a Chrome/Chromium executable; `None` auto-detects
    pub chrome_path: Option<String>,
    /// Initial browser window size
    pub window: Viewport,
    /// Timeout applied to individual CDP requests
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            window: Viewport::default(),
            request_timeout: Duration::from_secs(45),
        }
    }
}

/// A running automation engine instance hosting short-lived browsing contexts.
///
/// Owned exclusively by one job. Closing consumes the session, so the type
/// system rules out double-close; [`with_session`] guarantees the single close
/// actually happens on success, failure and early-return paths alike.
pub struct EngineSession {
    browser: Browser,
    events: JoinHandle<()>,
}

impl EngineSession {
    /// Launch a headless browser process and start draining its event stream.
    pub async fn launch(config: &SessionConfig) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(config.window.width, config.window.height)
            .request_timeout(config.request_timeout)
            .no_sandbox()
            .disable_default_args()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-software-rasterizer")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-extensions")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--mute-audio")
            .arg("--hide-scrollbars");

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder
            .build()
            .map_err(|e| Error::Session(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| Error::Session(format!("Failed to launch browser: {}", e)))?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        Ok(Self { browser, events })
    }

    /// Create an isolated browsing context emulating the given device profile.
    ///
    /// Cookies are cleared so every context starts from a cold state; the
    /// device metrics and user-agent overrides are applied before any
    /// navigation happens in the context.
    pub async fn new_context(&self, profile: &DeviceProfile) -> Result<PageContext> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::Session(format!("Failed to create page: {}", e)))?;

        // Contexts are sequential within a job; a stale cookie jar from the
        // previous capture would leak consent/session state into this one.
        if let Err(e) = page.execute(ClearBrowserCookiesParams::default()).await {
            warn!("Failed to clear cookies for new context: {}", e);
        }

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(profile.viewport.width as i64)
            .height(profile.viewport.height as i64)
            .device_scale_factor(profile.scale_factor)
            .mobile(profile.is_mobile)
            .build()
            .map_err(Error::Session)?;
        page.execute(metrics)
            .await
            .map_err(|e| Error::Session(format!("Failed to apply device metrics: {}", e)))?;

        if let Some(ref ua) = profile.user_agent {
            let override_params = SetUserAgentOverrideParams::builder()
                .user_agent(ua.as_str())
                .build()
                .map_err(Error::Session)?;
            page.execute(override_params)
                .await
                .map_err(|e| Error::Session(format!("Failed to set user agent: {}", e)))?;
        }

        Ok(PageContext {
            page,
            profile: profile.clone(),
        })
    }

    /// Create a plain page without device emulation (used for rendering the
    /// composed document, which supplies its own geometry via print settings).
    pub async fn new_plain_page(&self) -> Result<Page> {
        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::Session(format!("Failed to create page: {}", e)))
    }

    /// Close the session, terminating the browser process.
    pub async fn close(mut self) -> Result<()> {
        let res = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| Error::Session(format!("Failed to close browser: {}", e)));
        self.events.abort();
        res
    }
}

/// An isolated, single-use browsing context bound to a device profile.
pub struct PageContext {
    page: Page,
    profile: DeviceProfile,
}

impl PageContext {
    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Destroy the context. Failure to close is logged, not escalated: the
    /// capture that used this context has already been extracted, and sibling
    /// contexts must proceed regardless.
    pub async fn close(self) {
        if let Err(e) = self.page.close().await {
            warn!("Failed to close page context ({}): {}", self.profile.name, e);
        }
    }
}

/// Evaluate a script in the page, bounded by `budget`, deserializing the
/// result. Promises are awaited, so scripts with internal waits must keep
/// their own deadlines under the budget.
pub(crate) async fn eval_in<T>(page: &Page, js: &str, budget: Duration) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let evaluation = tokio::time::timeout(budget, page.evaluate(js))
        .await
        .map_err(|_| Error::Timeout(budget.as_millis() as u64))?
        .map_err(|e| Error::Other(format!("Evaluation failed: {}", e)))?;
    evaluation
        .into_value::<T>()
        .map_err(|e| Error::Other(format!("Unexpected evaluation result: {}", e)))
}

/// Seam for the scoped-release helper, so release-exactly-once is testable
/// without a live browser.
pub trait OwnedSession {
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

impl OwnedSession for EngineSession {
    fn close(self) -> impl Future<Output = Result<()>> + Send {
        EngineSession::close(self)
    }
}

/// Run `work` against an owned session and close the session on every exit
/// path, exactly once.
///
/// The session is handed to `work` behind an [`Arc`] so the work future can
/// own its handle; the closure must not stash a clone past its own
/// completion. A close failure after successful work is reported; a close
/// failure after failed work is logged and the work error wins.
pub async fn with_session<S, T, F, Fut>(session: S, work: F) -> Result<T>
where
    S: OwnedSession,
    F: FnOnce(Arc<S>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let session = Arc::new(session);
    let outcome = work(Arc::clone(&session)).await;
    let closed = match Arc::try_unwrap(session) {
        Ok(owned) => OwnedSession::close(owned).await,
        Err(_) => {
            warn!("Session handle still referenced after pipeline; close skipped");
            Ok(())
        }
    };
    match closed {
        Ok(()) => outcome,
        Err(close_err) => match outcome {
            Ok(_) => Err(close_err),
            Err(work_err) => {
                warn!("Session close failed after pipeline error: {}", close_err);
                Err(work_err)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MockSession {
        closes: Arc<AtomicUsize>,
        close_fails: bool,
    }

    impl OwnedSession for MockSession {
        fn close(self) -> impl Future<Output = Result<()>> + Send {
            async move {
                self.closes.fetch_add(1, Ordering::SeqCst);
                if self.close_fails {
                    Err(Error::Session("close failed".into()))
                } else {
                    Ok(())
                }
            }
        }
    }

    #[tokio::test]
    async fn session_closed_exactly_once_on_success() {
        let closes = Arc::new(AtomicUsize::new(0));
        let session = MockSession {
            closes: closes.clone(),
            close_fails: false,
        };
        let out = with_session(session, |s| async move {
            drop(s);
            Ok(42u32)
        })
        .await;
        assert_eq!(out.unwrap(), 42);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn session_closed_exactly_once_when_work_fails_mid_sequence() {
        let closes = Arc::new(AtomicUsize::new(0));
        let session = MockSession {
            closes: closes.clone(),
            close_fails: false,
        };
        let out: Result<u32> = with_session(session, |s| async move {
            drop(s);
            Err(Error::Capture("second capture exploded".into()))
        })
        .await;
        assert!(matches!(out, Err(Error::Capture(_))));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn work_error_wins_over_close_error() {
        let closes = Arc::new(AtomicUsize::new(0));
        let session = MockSession {
            closes: closes.clone(),
            close_fails: true,
        };
        let out: Result<u32> = with_session(session, |s| async move {
            drop(s);
            Err(Error::Navigation("both tiers failed".into()))
        })
        .await;
        assert!(matches!(out, Err(Error::Navigation(_))));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_error_surfaces_when_work_succeeded() {
        let closes = Arc::new(AtomicUsize::new(0));
        let session = MockSession {
            closes: closes.clone(),
            close_fails: true,
        };
        let out = with_session(session, |s| async move {
            drop(s);
            Ok(())
        })
        .await;
        assert!(matches!(out, Err(Error::Session(_))));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_config_has_bounded_request_timeout() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.request_timeout, Duration::from_secs(45));
        assert_eq!(cfg.window.width, 1365);
    }
}
