//! Mobile menu discovery heuristics
//!
//! Attempts to open a navigation drawer on a mobile-profile context so its
//! contents show up in a dedicated capture. Hamburger buttons and chat-widget
//! launchers look structurally alike (fixed-position icon button near the top
//! of the viewport), so a selector match alone is not enough: candidates are
//! ranked from semantic to positional and anything whose label, class list or
//! id mentions "chat" is rejected outright. The scan is an ordered predicate
//! list with short-circuit on the first candidate that survives every rule.

use crate::session::eval_in;
use crate::{Error, Result};
use chromiumoxide::page::Page;
use log::debug;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Candidate selectors, most specific first. Explicit hamburger/menu-icon
/// markers outrank generic header/nav buttons, which only act as a fallback.
pub const MENU_CANDIDATES: &[&str] = &[
    ".hamburger",
    ".hamburger-menu",
    "[class*='hamburger']",
    "[class*='menu-icon']",
    "[class*='menu-toggle']",
    "[id*='menu-toggle']",
    "[aria-label*='menu' i]",
    "[aria-label*='navigation' i]",
    "button[class*='menu']",
    "[class*='burger']",
    "[role='button'][class*='nav']",
    "header button",
    "nav button",
];

/// Timing knobs for the menu scan
#[derive(Debug, Clone)]
pub struct MenuOptions {
    /// Bound on the wait for a menu-opened indicator after the click
    pub indicator_timeout: Duration,
    /// Interval between indicator polls
    pub indicator_poll: Duration,
    /// Settle after the indicator appeared (drawer animations)
    pub settle_opened: Duration,
    /// Settle when no indicator appeared
    pub settle_blind: Duration,
    /// Budget for each candidate probe evaluation
    pub probe_budget: Duration,
}

impl Default for MenuOptions {
    fn default() -> Self {
        Self {
            indicator_timeout: Duration::from_secs(2),
            indicator_poll: Duration::from_millis(200),
            settle_opened: Duration::from_millis(1200),
            settle_blind: Duration::from_millis(500),
            probe_budget: Duration::from_secs(3),
        }
    }
}

/// Result of the menu scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuOutcome {
    /// A candidate was clicked; `indicator_seen` records whether an opened
    /// indicator pattern appeared within the bounded wait
    Clicked {
        selector: &'static str,
        indicator_seen: bool,
    },
    /// No candidate satisfied every constraint; the page was left untouched
    NotFound,
}

/// Lexical exclusion rule: reject elements whose accessible label, class
/// list or id carries a "chat" token, case-insensitively.
pub fn is_chat_like(label: &str) -> bool {
    label.to_ascii_lowercase().contains("chat")
}

#[derive(Debug, Deserialize)]
struct CandidateProbe {
    found: bool,
    #[serde(default)]
    label: String,
    #[serde(default)]
    visible: bool,
}

const PROBE_JS: &str = r#"(() => {
    const el = document.querySelector(__SELECTOR__);
    if (!el) { return JSON.stringify({ found: false }); }
    const label = [
        el.getAttribute('aria-label') || '',
        typeof el.className === 'string' ? el.className : '',
        el.id || ''
    ].join(' ');
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    const visible = rect.width > 0 && rect.height > 0
        && style.visibility !== 'hidden' && style.display !== 'none';
    return JSON.stringify({ found: true, label: label, visible: visible });
})()"#;

const FORCE_CLICK_JS: &str = r#"(() => {
    const el = document.querySelector(__SELECTOR__);
    if (!el) { return false; }
    el.click();
    return true;
})()"#;

const INDICATOR_JS: &str = r#"(() => {
    const sels = [
        "[aria-expanded='true']",
        "[class*='drawer'][class*='open']",
        "[class*='sidebar'][class*='open']",
        "[class*='menu'][class*='open']",
        "nav[class*='open']",
        "[class*='menu-open']",
        ".mobile-menu:not([hidden])",
        "[id*='mobile-menu']:not([hidden])"
    ];
    for (const sel of sels) {
        const el = document.querySelector(sel);
        if (el) {
            const style = window.getComputedStyle(el);
            if (style.display !== 'none' && style.visibility !== 'hidden') { return true; }
        }
    }
    return false;
})()"#;

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Scan the candidate ladder and open the first viable menu control.
///
/// Failure to find one is a normal outcome, not an error: the context is
/// left as-is and the capture proceeds without an open menu.
pub async fn open_mobile_menu(page: &Page, opts: &MenuOptions) -> MenuOutcome {
    for &selector in MENU_CANDIDATES {
        let probe = match probe_candidate(page, selector, opts.probe_budget).await {
            Ok(p) => p,
            Err(e) => {
                debug!("Probe for {} failed: {}", selector, e);
                continue;
            }
        };
        if !probe.found {
            continue;
        }
        if is_chat_like(&probe.label) {
            debug!("Rejecting {}: chat-like label {:?}", selector, probe.label);
            continue;
        }
        if !probe.visible {
            debug!("Rejecting {}: not visible", selector);
            continue;
        }
        if let Err(e) = click_candidate(page, selector).await {
            debug!("Click on {} failed: {}", selector, e);
            continue;
        }

        let indicator_seen = wait_for_open_indicator(page, opts).await;
        let settle = if indicator_seen {
            opts.settle_opened
        } else {
            opts.settle_blind
        };
        sleep(settle).await;
        return MenuOutcome::Clicked {
            selector,
            indicator_seen,
        };
    }
    MenuOutcome::NotFound
}

async fn probe_candidate(
    page: &Page,
    selector: &str,
    budget: Duration,
) -> Result<CandidateProbe> {
    let js = PROBE_JS.replace("__SELECTOR__", &js_string(selector));
    let raw: String = eval_in(page, &js, budget).await?;
    serde_json::from_str(&raw).map_err(|e| Error::Other(format!("probe result malformed: {}", e)))
}

async fn click_candidate(page: &Page, selector: &str) -> Result<()> {
    // Trusted click first; fall back to a forced DOM click when the trusted
    // one is intercepted by an overlay or the element resolves oddly.
    match page.find_element(selector).await {
        Ok(el) => match el.click().await {
            Ok(_) => return Ok(()),
            Err(e) => debug!("Trusted click on {} intercepted ({}); forcing", selector, e),
        },
        Err(e) => debug!("Lookup for {} failed ({}); forcing DOM click", selector, e),
    }

    let js = FORCE_CLICK_JS.replace("__SELECTOR__", &js_string(selector));
    let clicked: bool = eval_in(page, &js, Duration::from_secs(3)).await?;
    if clicked {
        Ok(())
    } else {
        Err(Error::Other(format!(
            "{} disappeared before it could be clicked",
            selector
        )))
    }
}

async fn wait_for_open_indicator(page: &Page, opts: &MenuOptions) -> bool {
    let deadline = Instant::now() + opts.indicator_timeout;
    loop {
        match eval_in::<bool>(page, INDICATOR_JS, Duration::from_secs(2)).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                debug!("Menu indicator probe failed: {}", e);
                return false;
            }
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(opts.indicator_poll).await;
    }
}
