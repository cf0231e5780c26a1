//! Job orchestration
//!
//! Sequences one teardown: desktop capture, mobile full-page capture,
//! mobile-menu capture, critique, report composition, pagination, artifact
//! storage and job-state transitions. All captures and the render share one
//! engine session, strictly sequentially, and the session is released on
//! every exit path. Critique and storage failures propagate unchanged; retry
//! policy belongs to whatever shell sits above this.

use crate::capture::{capture_page, CaptureOptions};
use crate::critique::{CritiqueRequest, CritiqueService};
use crate::menu::{open_mobile_menu, MenuOptions, MenuOutcome};
use crate::navigate::{navigate, NavigateOptions};
use crate::pdf::{render_document, RenderOptions};
use crate::report::{
    brand_name, compose_report, report_filename, Findings, ReportMeta, ReportShots,
};
use crate::session::{with_session, EngineSession, PageContext};
use crate::storage::{new_job_id, JobArtifacts, JobRecord, JobStore, ObjectStore};
use crate::stabilize::{stabilize, StabilizeOptions};
use crate::{CaptureResult, DeviceProfile, Result, SessionConfig};
use chrono::{DateTime, Utc};
use log::info;

/// Configuration shared by every step of a job
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub session: SessionConfig,
    pub capture: CaptureOptions,
    pub render: RenderOptions,
    pub menu: MenuOptions,
    /// Capture a third, menu-open mobile rendering
    pub capture_menu: bool,
}

impl PipelineConfig {
    /// Defaults with the menu capture enabled.
    pub fn standard() -> Self {
        Self {
            capture_menu: true,
            ..Self::default()
        }
    }
}

/// One teardown request, already validated and normalized by the caller.
#[derive(Debug, Clone)]
pub struct TeardownRequest {
    pub url: String,
    pub notes: Option<String>,
}

/// Everything a finished job produced
#[derive(Debug)]
pub struct TeardownOutput {
    pub job_id: String,
    pub findings: Findings,
    pub artifacts: JobArtifacts,
    pub pdf_filename: String,
}

struct CaptureSet {
    desktop: CaptureResult,
    mobile: CaptureResult,
    mobile_menu: Option<CaptureResult>,
}

/// Storage path prefix for a job's artifacts.
fn artifact_base(job_id: &str) -> String {
    format!("ai-teardown/{}", job_id)
}

/// Run one teardown end to end, recording running → done | error into the
/// job store.
pub async fn run_teardown<C, S, J>(
    request: &TeardownRequest,
    critique: &C,
    store: &S,
    jobs: &J,
    cfg: &PipelineConfig,
) -> Result<TeardownOutput>
where
    C: CritiqueService + Sync,
    S: ObjectStore + Sync,
    J: JobStore + Sync,
{
    let job_id = new_job_id();
    jobs.set(&job_id, JobRecord::running(&request.url));

    match run_job(&job_id, request, critique, store, cfg).await {
        Ok(output) => {
            jobs.set(
                &job_id,
                JobRecord::done(&request.url, output.artifacts.clone()),
            );
            Ok(output)
        }
        Err(e) => {
            jobs.set(&job_id, JobRecord::error(&request.url, &e.to_string()));
            Err(e)
        }
    }
}

async fn run_job<C, S>(
    job_id: &str,
    request: &TeardownRequest,
    critique: &C,
    store: &S,
    cfg: &PipelineConfig,
) -> Result<TeardownOutput>
where
    C: CritiqueService + Sync,
    S: ObjectStore + Sync,
{
    let started_at: DateTime<Utc> = Utc::now();

    let session = EngineSession::launch(&cfg.session).await?;
    let (captures, findings, rendered) = with_session(session, |s| async move {
        let captures = capture_set(&s, request, cfg).await?;

        let findings = critique
            .critique(CritiqueRequest {
                url: &request.url,
                notes: request.notes.as_deref(),
                desktop: &captures.desktop,
                mobile: &captures.mobile,
                mobile_menu: captures.mobile_menu.as_ref(),
            })
            .await?;

        let meta = ReportMeta {
            url: request.url.clone(),
            notes: request.notes.clone(),
            created_at: started_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        };
        let html = compose_report(
            &meta,
            &findings,
            &ReportShots {
                desktop_png: &captures.desktop.png,
                mobile_png: &captures.mobile.png,
                mobile_menu_png: captures.mobile_menu.as_ref().map(|c| c.png.as_slice()),
            },
        );

        let rendered = render_document(&html, Some(s.as_ref()), &cfg.render).await?;
        Ok((captures, findings, rendered))
    })
    .await?;

    // The session is gone; artifact storage happens outside its scope.
    let base = artifact_base(job_id);
    let pdf_filename = report_filename(
        &brand_name(&request.url),
        &started_at.format("%Y-%m-%d").to_string(),
    );

    let pdf = store
        .put(
            &format!("{}/{}", base, pdf_filename),
            "application/pdf",
            rendered.pdf,
        )
        .await?;
    let desktop = store
        .put(&format!("{}/desktop.png", base), "image/png", captures.desktop.png)
        .await?;
    let mobile = store
        .put(&format!("{}/mobile.png", base), "image/png", captures.mobile.png)
        .await?;
    let mobile_menu = match captures.mobile_menu {
        Some(capture) => Some(
            store
                .put(
                    &format!("{}/mobile-menu.png", base),
                    "image/png",
                    capture.png,
                )
                .await?,
        ),
        None => None,
    };

    Ok(TeardownOutput {
        job_id: job_id.to_string(),
        findings,
        artifacts: JobArtifacts {
            pdf,
            desktop,
            mobile,
            mobile_menu,
        },
        pdf_filename,
    })
}

/// Produce the job's captures in the fixed order: desktop, mobile full-page,
/// then the menu-open mobile rendering when requested. Strictly sequential
/// against the shared session.
async fn capture_set(
    session: &EngineSession,
    request: &TeardownRequest,
    cfg: &PipelineConfig,
) -> Result<CaptureSet> {
    let desktop =
        capture_profile(session, &request.url, DeviceProfile::desktop(), false, cfg).await?;
    let mobile =
        capture_profile(session, &request.url, DeviceProfile::mobile(), false, cfg).await?;
    let mobile_menu = if cfg.capture_menu {
        Some(capture_profile(session, &request.url, DeviceProfile::mobile(), true, cfg).await?)
    } else {
        None
    };

    Ok(CaptureSet {
        desktop,
        mobile,
        mobile_menu,
    })
}

/// One capture against a fresh context; the context is destroyed immediately
/// after, whatever the outcome.
async fn capture_profile(
    session: &EngineSession,
    url: &str,
    profile: DeviceProfile,
    open_menu: bool,
    cfg: &PipelineConfig,
) -> Result<CaptureResult> {
    let ctx = session.new_context(&profile).await?;
    let result = drive_capture(&ctx, url, open_menu, cfg).await;
    ctx.close().await;
    result
}

async fn drive_capture(
    ctx: &PageContext,
    url: &str,
    open_menu: bool,
    cfg: &PipelineConfig,
) -> Result<CaptureResult> {
    let nav_opts = NavigateOptions::for_profile(ctx.profile());
    navigate(ctx.page(), url, &nav_opts).await?;

    stabilize(ctx.page(), &StabilizeOptions::for_profile(ctx.profile())).await;

    if open_menu {
        match open_mobile_menu(ctx.page(), &cfg.menu).await {
            MenuOutcome::Clicked {
                selector,
                indicator_seen,
            } => info!(
                "Opened mobile menu via {} (indicator seen: {})",
                selector, indicator_seen
            ),
            MenuOutcome::NotFound => {
                info!("No viable menu control found; capturing the page as-is")
            }
        }
    }

    capture_page(ctx, &cfg.capture).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_requests_the_menu_capture() {
        assert!(PipelineConfig::standard().capture_menu);
        assert!(!PipelineConfig::default().capture_menu);
    }

    #[test]
    fn artifacts_live_under_the_job_prefix() {
        assert_eq!(artifact_base("abc123"), "ai-teardown/abc123");
    }
}
