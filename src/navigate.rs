//! Navigation controller
//!
//! Brings a browsing context to a state suitable for stabilization within a
//! bounded time budget. The primary attempt waits for the document structure
//! to be parsed; on failure the load is retried exactly once against the
//! stricter fully-loaded signal. A network-quiescence wait afterwards is
//! best-effort only: many pages never go quiet (live chat, analytics,
//! polling), so its failure is swallowed, never escalated.

use crate::session::eval_in;
use crate::{DeviceProfile, Error, Result};
use chromiumoxide::page::Page;
use log::{debug, warn};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Timing knobs for one navigation
#[derive(Debug, Clone)]
pub struct NavigateOptions {
    /// Budget for each readiness-signal attempt
    pub ready_timeout: Duration,
    /// Upper bound on the best-effort network-quiescence wait
    pub quiet_timeout: Duration,
    /// Interval between quiescence polls
    pub quiet_poll: Duration,
    /// Fixed settle delay after load, letting post-load scripts paint
    pub settle: Duration,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(45),
            quiet_timeout: Duration::from_secs(3),
            quiet_poll: Duration::from_millis(400),
            settle: Duration::from_millis(1500),
        }
    }
}

impl NavigateOptions {
    /// Per-profile budgets: mobile emulation renders slower under a doubled
    /// pixel ratio, so it gets a longer first-stage timeout.
    pub fn for_profile(profile: &DeviceProfile) -> Self {
        let ready_timeout = if profile.is_mobile {
            Duration::from_secs(60)
        } else {
            Duration::from_secs(45)
        };
        Self {
            ready_timeout,
            ..Self::default()
        }
    }
}

/// A named page-load milestone used as a wait condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    /// DOM structure parsed (`readyState` left `loading`)
    StructureParsed,
    /// Load event fired (`readyState` is `complete`)
    FullyLoaded,
}

impl Readiness {
    fn satisfied_by(self, state: &str) -> bool {
        match self {
            Readiness::StructureParsed => state == "interactive" || state == "complete",
            Readiness::FullyLoaded => state == "complete",
        }
    }
}

/// Load `url` into the page and wait until it is ready for stabilization.
///
/// Returns an error only when both readiness attempts fail; that is fatal for
/// the capture using this context.
pub async fn navigate(page: &Page, url: &str, opts: &NavigateOptions) -> Result<()> {
    match attempt(page, url, opts.ready_timeout, Readiness::StructureParsed).await {
        Ok(()) => {}
        Err(first) => {
            warn!(
                "First-stage navigation to {} failed ({}); retrying with full-load readiness",
                url, first
            );
            attempt(page, url, opts.ready_timeout, Readiness::FullyLoaded)
                .await
                .map_err(|e| {
                    Error::Navigation(format!(
                        "{} failed both readiness attempts: {} (first attempt: {})",
                        url, e, first
                    ))
                })?;
        }
    }

    wait_for_network_quiet(page, opts).await;
    sleep(opts.settle).await;
    Ok(())
}

async fn attempt(page: &Page, url: &str, budget: Duration, readiness: Readiness) -> Result<()> {
    let deadline = Instant::now() + budget;

    tokio::time::timeout(budget, page.goto(url))
        .await
        .map_err(|_| Error::Timeout(budget.as_millis() as u64))?
        .map_err(|e| Error::Navigation(format!("goto {} failed: {}", url, e)))?;

    loop {
        let state: String = eval_in(page, "document.readyState", Duration::from_secs(5))
            .await
            .unwrap_or_default();
        if readiness.satisfied_by(&state) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::Timeout(budget.as_millis() as u64));
        }
        sleep(Duration::from_millis(150)).await;
    }
}

/// Wait until the page's resource-entry count is stable across two
/// consecutive polls, or until `quiet_timeout` runs out. Either outcome is
/// fine; this only exists to give late subresources a chance to land.
async fn wait_for_network_quiet(page: &Page, opts: &NavigateOptions) {
    const COUNT_JS: &str = "performance.getEntriesByType('resource').length";
    let deadline = Instant::now() + opts.quiet_timeout;
    let mut last: Option<i64> = None;

    while Instant::now() < deadline {
        match eval_in::<i64>(page, COUNT_JS, Duration::from_secs(2)).await {
            Ok(count) => {
                if last == Some(count) {
                    debug!("Network quiescent at {} resource entries", count);
                    return;
                }
                last = Some(count);
            }
            Err(e) => {
                debug!("Quiescence probe failed, skipping wait: {}", e);
                return;
            }
        }
        sleep(opts.quiet_poll).await;
    }
    debug!("Network never became quiescent within budget, proceeding");
}
