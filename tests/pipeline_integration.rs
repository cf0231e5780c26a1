//! Integration tests for the capture-and-render pipeline
//!
//! Browser-backed tests are `#[ignore]`d because they require a local
//! Chrome/Chromium install; run them with `cargo test -- --ignored`.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use pagetear::capture::{capture_page, CaptureOptions};
use pagetear::critique::NullCritique;
use pagetear::job::{run_teardown, PipelineConfig, TeardownRequest};
use pagetear::menu::{open_mobile_menu, MenuOptions, MenuOutcome};
use pagetear::navigate::{navigate, NavigateOptions};
use pagetear::pdf::{render_document, RenderOptions};
use pagetear::report::{compose_report, Findings, ReportMeta, ReportShots};
use pagetear::session::EngineSession;
use pagetear::storage::{JobStatus, JobStore, MemoryJobStore, PassthroughStore, StoredObject};
use pagetear::{DeviceProfile, SessionConfig, MAX_CAPTURE_HEIGHT_PX};
use tiny_http::{Response, Server};

/// Valid 1x1 transparent PNG, served as the fixture image.
const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0x64,
    0x60, 0xf8, 0x5f, 0x0f, 0x00, 0x02, 0x87, 0x01, 0x80, 0xeb, 0x47, 0xba, 0x92, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

const BASIC_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Fixture Page</title>
  <meta name="description" content="A small page used by pipeline tests" />
</head>
<body>
  <h1>Hello from the fixture server</h1>
  <p>Some visible body text for the excerpt signal.</p>
  <img src="/img.png" alt="fixture" />
</body>
</html>"#;

const TALL_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Tall Page</title></head>
<body style="margin:0">
  <div style="height:20000px;background:linear-gradient(#fff,#000)">tall</div>
</body>
</html>"#;

const BUSY_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Busy Page</title></head>
<body>
  <p>This page polls forever and never goes network-quiescent.</p>
  <script>setInterval(() => { fetch('/ping').catch(() => {}); }, 200);</script>
</body>
</html>"#;

// Every element a menu candidate can match carries a chat token, so the
// heuristics must reject them all and leave the page untouched.
const CHATTY_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Chatty Page</title></head>
<body>
  <header>
    <button class="hamburger chat-launcher" aria-label="Open chat"
            onclick="window.__clicked = true">&#9776;</button>
  </header>
  <nav>
    <button id="support-chat" class="chat-open"
            onclick="window.__clicked = true">Chat</button>
  </nav>
</body>
</html>"#;

const MENU_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Menu Page</title></head>
<body>
  <header>
    <button class="menu-toggle" aria-label="Open menu" aria-expanded="false"
            onclick="this.setAttribute('aria-expanded', 'true'); document.querySelector('nav').className = 'drawer open';">&#9776;</button>
  </header>
  <nav class="drawer"><a href="/">Home</a></nav>
</body>
</html>"#;

fn html_response(body: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(body).with_header(
        "Content-Type: text/html; charset=utf-8"
            .parse::<tiny_http::Header>()
            .unwrap(),
    )
}

static SERVER: OnceLock<String> = OnceLock::new();

/// Start the shared fixture server once, on an ephemeral port.
fn server_url() -> String {
    SERVER
        .get_or_init(|| {
            let server = Server::http("127.0.0.1:0").unwrap();
            let addr = server.server_addr();
            std::thread::spawn(move || {
                for request in server.incoming_requests() {
                    let path = request.url().to_string();
                    let response = match path.as_str() {
                        "/" => html_response(BASIC_PAGE),
                        "/tall" => html_response(TALL_PAGE),
                        "/busy" => html_response(BUSY_PAGE),
                        "/chatty" => html_response(CHATTY_PAGE),
                        "/menu" => html_response(MENU_PAGE),
                        "/ping" => Response::from_string("pong"),
                        "/img.png" => Response::from_data(TINY_PNG.to_vec()).with_header(
                            "Content-Type: image/png".parse::<tiny_http::Header>().unwrap(),
                        ),
                        _ => Response::from_string("Not Found").with_status_code(404),
                    };
                    let _ = request.respond(response);
                }
            });
            std::thread::sleep(Duration::from_millis(100));
            format!("http://{}", addr)
        })
        .clone()
}

/// PNG pixel dimensions straight out of the IHDR chunk.
fn png_dimensions(png: &[u8]) -> (u32, u32) {
    assert_eq!(&png[0..8], b"\x89PNG\r\n\x1a\n", "not a PNG");
    let width = u32::from_be_bytes([png[16], png[17], png[18], png[19]]);
    let height = u32::from_be_bytes([png[20], png[21], png[22], png[23]]);
    (width, height)
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn capture_basic_page_produces_png_and_signals() {
    let base = server_url();
    let session = EngineSession::launch(&SessionConfig::default())
        .await
        .expect("Failed to launch session");

    let ctx = session
        .new_context(&DeviceProfile::desktop())
        .await
        .expect("Failed to create context");
    navigate(ctx.page(), &base, &NavigateOptions::default())
        .await
        .expect("Navigation failed");
    let shot = capture_page(&ctx, &CaptureOptions::default())
        .await
        .expect("Capture failed");
    ctx.close().await;
    session.close().await.expect("Failed to close session");

    assert_eq!(&shot.png[0..8], b"\x89PNG\r\n\x1a\n");
    assert_eq!(shot.signals.title, "Fixture Page");
    assert!(shot.signals.description.contains("pipeline tests"));
    assert!(shot.signals.text_excerpt.contains("fixture server"));
    assert_eq!(shot.signals.viewport_width, 1365);
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn tall_page_clamps_to_exactly_the_ceiling() {
    let base = server_url();
    let session = EngineSession::launch(&SessionConfig::default())
        .await
        .expect("Failed to launch session");

    let ctx = session
        .new_context(&DeviceProfile::desktop())
        .await
        .expect("Failed to create context");
    navigate(ctx.page(), &format!("{}/tall", base), &NavigateOptions::default())
        .await
        .expect("Navigation failed");
    let shot = capture_page(&ctx, &CaptureOptions::default())
        .await
        .expect("Capture failed");
    ctx.close().await;
    session.close().await.expect("Failed to close session");

    let (_, height) = png_dimensions(&shot.png);
    assert_eq!(height, MAX_CAPTURE_HEIGHT_PX);
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn endless_polling_page_completes_within_the_bounded_wait() {
    let base = server_url();
    let session = EngineSession::launch(&SessionConfig::default())
        .await
        .expect("Failed to launch session");

    let ctx = session
        .new_context(&DeviceProfile::desktop())
        .await
        .expect("Failed to create context");
    let started = Instant::now();
    navigate(ctx.page(), &format!("{}/busy", base), &NavigateOptions::default())
        .await
        .expect("Navigation failed");
    let elapsed = started.elapsed();
    ctx.close().await;
    session.close().await.expect("Failed to close session");

    // Load + capped quiescence wait + settle; nowhere near the ready timeout.
    assert!(elapsed < Duration::from_secs(30), "took {:?}", elapsed);
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn chat_only_candidates_leave_the_page_unmodified() {
    let base = server_url();
    let session = EngineSession::launch(&SessionConfig::default())
        .await
        .expect("Failed to launch session");

    let ctx = session
        .new_context(&DeviceProfile::mobile())
        .await
        .expect("Failed to create context");
    navigate(ctx.page(), &format!("{}/chatty", base), &NavigateOptions::default())
        .await
        .expect("Navigation failed");

    let outcome = open_mobile_menu(ctx.page(), &MenuOptions::default()).await;
    assert_eq!(outcome, MenuOutcome::NotFound);

    let clicked = ctx
        .page()
        .evaluate("window.__clicked === true")
        .await
        .unwrap()
        .into_value::<bool>()
        .unwrap();
    assert!(!clicked, "a chat-labeled element was clicked");

    ctx.close().await;
    session.close().await.expect("Failed to close session");
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn menu_toggle_is_discovered_and_opened() {
    let base = server_url();
    let session = EngineSession::launch(&SessionConfig::default())
        .await
        .expect("Failed to launch session");

    let ctx = session
        .new_context(&DeviceProfile::mobile())
        .await
        .expect("Failed to create context");
    navigate(ctx.page(), &format!("{}/menu", base), &NavigateOptions::default())
        .await
        .expect("Navigation failed");

    match open_mobile_menu(ctx.page(), &MenuOptions::default()).await {
        MenuOutcome::Clicked { indicator_seen, .. } => assert!(indicator_seen),
        MenuOutcome::NotFound => panic!("menu toggle was not discovered"),
    }

    ctx.close().await;
    session.close().await.expect("Failed to close session");
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn renderer_never_closes_a_supplied_session() {
    let session = EngineSession::launch(&SessionConfig::default())
        .await
        .expect("Failed to launch session");

    let html = sample_report(2);
    let outcome = render_document(&html, Some(&session), &RenderOptions::default())
        .await
        .expect("Render failed");
    assert!(outcome.pdf.starts_with(b"%PDF"));

    // The session must remain usable after rendering.
    let page = session
        .new_plain_page()
        .await
        .expect("session was closed by the renderer");
    page.close().await.ok();
    session.close().await.expect("Failed to close session");
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn every_inline_image_is_normalized_before_pagination() {
    let html = sample_report(3);
    let outcome = render_document(&html, None, &RenderOptions::default())
        .await
        .expect("Render failed");
    assert_eq!(outcome.normalized_images, 3);
    assert!(outcome.pdf.starts_with(b"%PDF"));
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn full_job_records_done_with_artifacts() {
    let base = server_url();
    let store = PassthroughStore;
    let jobs = MemoryJobStore::new();
    let request = TeardownRequest {
        url: base,
        notes: Some("fixture run".to_string()),
    };

    let output = run_teardown(
        &request,
        &NullCritique,
        &store,
        &jobs,
        &PipelineConfig::standard(),
    )
    .await
    .expect("Teardown failed");

    match &output.artifacts.pdf {
        StoredObject::Bytes { data } => assert!(data.starts_with(b"%PDF")),
        other => panic!("expected pass-through bytes, got {:?}", other),
    }
    let record = jobs.get(&output.job_id).expect("job record missing");
    assert_eq!(record.status, JobStatus::Done);
    assert!(record.artifacts.is_some());
}

/// A composed report embedding `images` inline captures.
fn sample_report(images: usize) -> String {
    let meta = ReportMeta {
        url: "https://example.com".to_string(),
        notes: None,
        created_at: "2025-06-01".to_string(),
    };
    let menu = if images > 2 { Some(TINY_PNG) } else { None };
    assert!((2..=3).contains(&images));
    compose_report(
        &meta,
        &Findings::default(),
        &ReportShots {
            desktop_png: TINY_PNG,
            mobile_png: TINY_PNG,
            mobile_menu_png: menu,
        },
    )
}
