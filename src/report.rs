//! Report composition
//!
//! Builds the composed document: an HTML report embedding the capture images
//! as inline-encoded data plus the critique findings as content blocks. The
//! composer tolerates empty or malformed critique output by substituting
//! explicit placeholder content; it never emits an empty section.

use base64::Engine as Base64Engine;
use serde::{Deserialize, Serialize};

/// Cap on rendered fixes per lane
const MAX_FIXES_PER_LANE: usize = 8;
/// Cap on rendered experiments
const MAX_EXPERIMENTS: usize = 6;

/// Structured critique output
///
/// Every field defaults so a partial or empty payload still deserializes;
/// the composer substitutes placeholders for whatever is missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Findings {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub friction_points: Vec<FrictionPoint>,
    #[serde(default)]
    pub prioritized_fixes: PrioritizedFixes,
    #[serde(default)]
    pub copy_suggestions: Vec<CopySuggestion>,
    #[serde(default)]
    pub accessibility_mobile_notes: Vec<String>,
}

impl Findings {
    /// Parse a critique payload, degrading to an empty findings object when
    /// the payload is not the expected shape.
    pub fn from_json_lossy(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrictionPoint {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub why_it_hurts: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub fix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrioritizedFixes {
    #[serde(default)]
    pub quick_wins: Vec<Fix>,
    #[serde(default)]
    pub medium_lifts: Vec<Fix>,
    #[serde(default)]
    pub experiments: Vec<Experiment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fix {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub why: String,
    #[serde(default)]
    pub how: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Experiment {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub hypothesis: String,
    #[serde(default)]
    pub test: String,
    #[serde(default)]
    pub success_metric: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopySuggestion {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub after: String,
}

/// Report metadata rendered into the header
#[derive(Debug, Clone)]
pub struct ReportMeta {
    pub url: String,
    pub notes: Option<String>,
    /// Preformatted creation timestamp
    pub created_at: String,
}

/// Capture images embedded into the report
#[derive(Debug, Clone, Copy)]
pub struct ReportShots<'a> {
    pub desktop_png: &'a [u8],
    pub mobile_png: &'a [u8],
    pub mobile_menu_png: Option<&'a [u8]>,
}

/// Host of the target URL with the `www.` prefix stripped; used for artifact
/// naming. Falls back to "site" for unparseable input.
pub fn brand_name(target_url: &str) -> String {
    url::Url::parse(target_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .map(|h| h.trim_start_matches("www.").to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "site".to_string())
}

/// Artifact filename for the rendered report.
pub fn report_filename(brand: &str, date: &str) -> String {
    format!(
        "{}-Website-Improvement-Report-Ecommerce-Teardown-{}.pdf",
        brand.replace('.', "-"),
        date
    )
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

fn inline_png(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}

const REPORT_CSS: &str = r#"
      * { box-sizing: border-box; }
      body {
        margin: 0;
        font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
        color: #1a1a1a;
        line-height: 1.5;
        background: white;
      }
      .topbar { height: 6px; background: linear-gradient(to right, #e91e63, #f8b500); }
      .wrap { padding: 28px 34px 40px; }
      h1 { margin: 0; font-size: 28px; font-weight: 900; text-transform: uppercase; letter-spacing: 0.2px; }
      .meta { margin-top: 10px; color: #666666; font-size: 12px; }
      .pill {
        display: inline-block; margin-top: 12px; padding: 6px 10px; border-radius: 999px;
        background: rgba(0,166,81,0.10); border: 1px solid rgba(0,166,81,0.25); color: #0a5a31;
        font-weight: 800; font-size: 11px; text-transform: uppercase; letter-spacing: 0.3px;
      }
      .section { margin-top: 26px; }
      .section h2 { margin: 0 0 10px; font-size: 16px; font-weight: 900; text-transform: uppercase; letter-spacing: 0.2px; }
      .grid2 { display: grid; grid-template-columns: 1fr 1fr; gap: 14px; }
      .shot { border: 1px solid rgba(0,0,0,0.10); border-radius: 10px; overflow: hidden; background: #fff; }
      .shot .label { padding: 10px 12px; font-size: 12px; font-weight: 900; border-bottom: 1px solid rgba(0,0,0,0.08); }
      .shot img { width: 100%; display: block; }
      .card { border: 1px solid rgba(0,0,0,0.10); border-radius: 12px; padding: 12px 14px; margin-bottom: 10px; background: #fff; }
      .card h3 { margin: 0 0 6px; font-size: 13px; font-weight: 900; }
      .kvs { margin-top: 10px; font-size: 12px; }
      .kvs div { margin: 4px 0; }
      .k { font-weight: 900; color: #1a1a1a; }
      ul { margin: 8px 0 0 18px; padding: 0; color: #666666; font-size: 12px; }
      li { margin: 5px 0; }
      .twoCol { display: grid; grid-template-columns: 1fr 1fr; gap: 12px; }
      .small { font-size: 11px; color: #666666; }
"#;

/// Build the composed document: report HTML with every capture embedded as
/// inline-encoded image data.
pub fn compose_report(meta: &ReportMeta, findings: &Findings, shots: &ReportShots<'_>) -> String {
    let mut html = String::with_capacity(16 * 1024);

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\" />\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n");
    html.push_str("<title>Page Teardown Report</title>\n<style>");
    html.push_str(REPORT_CSS);
    html.push_str("</style>\n</head>\n<body>\n<div class=\"topbar\"></div>\n<div class=\"wrap\">\n");

    html.push_str("<h1>Page Teardown Report</h1>\n");
    html.push_str(&format!(
        "<div class=\"meta\"><div><span class=\"k\">URL:</span> {}</div>\
         <div><span class=\"k\">Created:</span> {}</div></div>\n",
        escape_html(&meta.url),
        escape_html(&meta.created_at)
    ));
    match &meta.notes {
        Some(notes) if !notes.is_empty() => html.push_str(&format!(
            "<div class=\"pill\">Goal: {}</div>\n",
            escape_html(notes)
        )),
        _ => html.push_str("<div class=\"pill\">Automated page teardown</div>\n"),
    }

    // Executive summary
    html.push_str("<div class=\"section\"><h2>Executive summary</h2><div class=\"card\">");
    let summary = if findings.summary.is_empty() {
        "No summary returned."
    } else {
        &findings.summary
    };
    html.push_str(&format!(
        "<div class=\"small\">{}</div></div></div>\n",
        escape_html(summary)
    ));

    // Screenshots
    html.push_str("<div class=\"section\"><h2>Screenshots</h2><div class=\"grid2\">");
    push_shot(&mut html, "Desktop", shots.desktop_png);
    push_shot(&mut html, "Mobile", shots.mobile_png);
    if let Some(menu_png) = shots.mobile_menu_png {
        push_shot(&mut html, "Mobile navigation", menu_png);
    }
    html.push_str("</div></div>\n");

    // Friction points
    html.push_str("<div class=\"section\"><h2>Friction points</h2>");
    if findings.friction_points.is_empty() {
        html.push_str("<div class=\"small\">No friction points returned.</div>");
    } else {
        for fp in &findings.friction_points {
            html.push_str(&render_friction(fp));
        }
    }
    html.push_str("</div>\n");

    // Prioritized fixes
    html.push_str("<div class=\"section\"><h2>Prioritized fixes</h2><div class=\"twoCol\"><div>");
    html.push_str("<div class=\"card\"><h3>Quick wins</h3>");
    html.push_str(&render_fix_list(&findings.prioritized_fixes.quick_wins));
    html.push_str("</div><div class=\"card\"><h3>Medium lifts</h3>");
    html.push_str(&render_fix_list(&findings.prioritized_fixes.medium_lifts));
    html.push_str("</div></div><div>");
    html.push_str("<div class=\"card\"><h3>Experiments</h3>");
    html.push_str(&render_experiments(&findings.prioritized_fixes.experiments));
    html.push_str("</div><div class=\"card\"><h3>Mobile &amp; accessibility notes</h3>");
    if findings.accessibility_mobile_notes.is_empty() {
        html.push_str("<div class=\"small\">No notes returned.</div>");
    } else {
        html.push_str("<ul>");
        for note in &findings.accessibility_mobile_notes {
            html.push_str(&format!("<li>{}</li>", escape_html(note)));
        }
        html.push_str("</ul>");
    }
    html.push_str("</div></div></div></div>\n");

    // Copy suggestions
    html.push_str("<div class=\"section\"><h2>Copy suggestions</h2>");
    if findings.copy_suggestions.is_empty() {
        html.push_str("<div class=\"small\">No copy suggestions returned.</div>");
    } else {
        for cs in &findings.copy_suggestions {
            html.push_str(&render_copy(cs));
        }
    }
    html.push_str("</div>\n");

    html.push_str(
        "<div class=\"section small\">Generated automatically. If a page blocks automated \
         screenshots or is highly dynamic, results may vary.</div>\n",
    );
    html.push_str("</div>\n</body>\n</html>");
    html
}

fn push_shot(html: &mut String, label: &str, png: &[u8]) {
    html.push_str(&format!(
        "<div class=\"shot\"><div class=\"label\">{}</div>\
         <img src=\"{}\" alt=\"{} screenshot\" /></div>",
        escape_html(label),
        inline_png(png),
        escape_html(label)
    ));
}

fn render_friction(fp: &FrictionPoint) -> String {
    let title = if fp.title.is_empty() {
        "Friction point"
    } else {
        &fp.title
    };
    format!(
        "<div class=\"card\"><h3>{}</h3><div class=\"kvs\">\
         <div><span class=\"k\">Why it hurts:</span> {}</div>\
         <div><span class=\"k\">Evidence:</span> {}</div>\
         <div><span class=\"k\">Fix:</span> {}</div>\
         </div></div>",
        escape_html(title),
        escape_html(&fp.why_it_hurts),
        escape_html(&fp.evidence),
        escape_html(&fp.fix)
    )
}

fn render_fix_list(items: &[Fix]) -> String {
    if items.is_empty() {
        return "<div class=\"small\">No items returned.</div>".to_string();
    }
    items
        .iter()
        .take(MAX_FIXES_PER_LANE)
        .map(|x| {
            let title = if x.title.is_empty() { "Fix" } else { &x.title };
            format!(
                "<div class=\"card\"><h3>{}</h3><div class=\"kvs\">\
                 <div><span class=\"k\">Why:</span> {}</div>\
                 <div><span class=\"k\">How:</span> {}</div>\
                 </div></div>",
                escape_html(title),
                escape_html(&x.why),
                escape_html(&x.how)
            )
        })
        .collect()
}

fn render_experiments(items: &[Experiment]) -> String {
    if items.is_empty() {
        return "<div class=\"small\">No items returned.</div>".to_string();
    }
    items
        .iter()
        .take(MAX_EXPERIMENTS)
        .map(|x| {
            let title = if x.title.is_empty() {
                "Experiment"
            } else {
                &x.title
            };
            format!(
                "<div class=\"card\"><h3>{}</h3><div class=\"kvs\">\
                 <div><span class=\"k\">Hypothesis:</span> {}</div>\
                 <div><span class=\"k\">Test:</span> {}</div>\
                 <div><span class=\"k\">Success metric:</span> {}</div>\
                 </div></div>",
                escape_html(title),
                escape_html(&x.hypothesis),
                escape_html(&x.test),
                escape_html(&x.success_metric)
            )
        })
        .collect()
}

fn render_copy(cs: &CopySuggestion) -> String {
    let location = if cs.location.is_empty() {
        "Location"
    } else {
        &cs.location
    };
    format!(
        "<div class=\"card\"><h3>{}</h3><div class=\"kvs\">\
         <div><span class=\"k\">Before:</span> {}</div>\
         <div><span class=\"k\">After:</span> {}</div>\
         </div></div>",
        escape_html(location),
        escape_html(&cs.before),
        escape_html(&cs.after)
    )
}
