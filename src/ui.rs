//! The form UI: a small HTTP server on the loopback interface with one tab per operation.
//!
//! `GET /` renders the page; `POST /create`, `/read`, `/update` and `/delete` take
//! url-encoded form fields, run one dispatch and render the page again with the result.
use crate::dispatcher::{Dispatcher, OperationResult};
use crate::error::Failure;
use crate::request::{parse_tags, NewVideo, OperationRequest};
use crate::video::{PrivacyStatus, SnippetPatch};

use futures::lock::Mutex;
use http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::Connect;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::form_urlencoded;

/// The four tabs, in display order: path, label.
const TABS: [(&str, &str); 4] = [
    ("create", "Create Video"),
    ("read", "Get Video"),
    ("update", "Update Video"),
    ("delete", "Delete Video"),
];

/// Serves the form pages and runs one operation at a time.
pub struct Ui<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    dispatcher: Dispatcher<C>,
    /// Held for the duration of a dispatch.
    gate: Mutex<()>,
}

impl<C> Ui<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    /// Wrap a dispatcher.
    pub fn new(dispatcher: Dispatcher<C>) -> Ui<C> {
        Ui {
            dispatcher,
            gate: Mutex::new(()),
        }
    }

    /// Answer one HTTP request.
    pub async fn handle<B>(&self, req: Request<B>) -> Result<Response<String>, http::Error>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        let method = req.method().clone();
        let path = req.uri().path().trim_start_matches('/').to_string();
        match (&method, path.as_str()) {
            (&Method::GET, "") => {
                let tab = req
                    .uri()
                    .query()
                    .and_then(|q| {
                        form_urlencoded::parse(q.as_bytes())
                            .find(|(k, _)| k == "tab")
                            .map(|(_, v)| v.into_owned())
                    })
                    .unwrap_or_default();
                html(StatusCode::OK, render_page(tab_or_default(&tab), None))
            }
            (&Method::POST, op) if TABS.iter().any(|(name, _)| *name == op) => {
                let op = op.to_string();
                let body = match req.into_body().collect().await {
                    Ok(collected) => collected.to_bytes(),
                    Err(err) => {
                        return Response::builder()
                            .status(StatusCode::BAD_REQUEST)
                            .body(format!("Unreadable form: {}", err))
                    }
                };
                let fields: HashMap<String, String> = form_urlencoded::parse(&body)
                    .into_owned()
                    .collect();
                let outcome = match request_from_form(&op, &fields) {
                    Ok(request) => {
                        let _running = self.gate.lock().await;
                        self.dispatcher.dispatch(&request).await
                    }
                    Err(failure) => Err(failure),
                };
                html(StatusCode::OK, render_page(tab_or_default(&op), Some(&outcome)))
            }
            (_, op) if op.is_empty() || TABS.iter().any(|(name, _)| *name == op) => {
                Response::builder()
                    .status(StatusCode::METHOD_NOT_ALLOWED)
                    .body(String::from("Method not allowed"))
            }
            _ => Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(String::from("Not found")),
        }
    }
}

/// Accept connections on `listener` until `shutdown` completes, then wait briefly for open
/// connections to finish.
pub async fn serve<C, F>(
    ui: Arc<Ui<C>>,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> std::io::Result<()>
where
    C: Connect + Clone + Send + Sync + 'static,
    F: Future<Output = ()>,
{
    let service = hyper::service::service_fn(move |req| {
        let ui = ui.clone();
        async move { ui.handle(req).await }
    });

    let server =
        hyper_util::server::conn::auto::Builder::new(hyper_util::rt::TokioExecutor::new())
            .http1_only();
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    log::info!("form UI listening on http://{}", listener.local_addr()?);

    tokio::pin!(shutdown);
    loop {
        let conn = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((conn, peer)) => {
                    log::debug!("connection from {}", peer);
                    conn
                }
                Err(err) => {
                    log::warn!("accept failed: {}", err);
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        let conn = server
            .serve_connection(hyper_util::rt::TokioIo::new(conn), service.clone())
            .into_owned();
        let conn = graceful.watch(conn);

        tokio::spawn(async move {
            if let Err(err) = conn.await {
                log::debug!("connection error: {err}");
            }
        });
    }

    tokio::select! {
        _ = graceful.shutdown() => {
            log::debug!("form UI shut down");
        },
        _ = tokio::time::sleep(Duration::from_secs(10)) => {
            log::debug!("waited 10 seconds for open connections, aborting");
        }
    }
    Ok(())
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> &'a str {
    fields.get(name).map(|v| v.trim()).unwrap_or("")
}

/// `None` for a blank field.
fn optional(fields: &HashMap<String, String>, name: &str) -> Option<String> {
    Some(field(fields, name))
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Build the request a submitted form describes. On update a blank field means "unchanged".
fn request_from_form(
    op: &str,
    fields: &HashMap<String, String>,
) -> Result<OperationRequest, Failure> {
    let video_id = field(fields, "video_id").to_string();
    match op {
        "create" => {
            let privacy_status = match field(fields, "privacy_status") {
                "" => PrivacyStatus::default(),
                value => value.parse().map_err(Failure::validation)?,
            };
            Ok(OperationRequest::Create(NewVideo {
                file: PathBuf::from(field(fields, "file")),
                title: field(fields, "title").to_string(),
                description: fields.get("description").cloned().unwrap_or_default(),
                category_id: field(fields, "category_id").to_string(),
                tags: parse_tags(field(fields, "tags")),
                privacy_status,
            }))
        }
        "read" => Ok(OperationRequest::Read { video_id }),
        "update" => Ok(OperationRequest::Update {
            video_id,
            patch: SnippetPatch {
                title: optional(fields, "title"),
                description: optional(fields, "description"),
                tags: Some(parse_tags(field(fields, "tags"))).filter(|tags| !tags.is_empty()),
            },
        }),
        "delete" => Ok(OperationRequest::Delete { video_id }),
        other => Err(Failure::validation(format!("unknown operation '{}'", other))),
    }
}

fn tab_or_default(tab: &str) -> &'static str {
    TABS.iter()
        .map(|(name, _)| *name)
        .find(|name| *name == tab)
        .unwrap_or(TABS[0].0)
}

fn html(status: StatusCode, body: String) -> Result<Response<String>, http::Error> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, mime::TEXT_HTML_UTF_8.as_ref())
        .body(body)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn render_page(active: &str, outcome: Option<&OperationResult>) -> String {
    let mut page = String::from(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>YouTube CRUD</title>\
         <style>body{font-family:sans-serif;max-width:48em;margin:2em auto}\
         nav a{margin-right:1em}nav a.active{font-weight:bold}\
         label{display:block;margin-top:.6em}input,textarea,select{width:100%}\
         .error{background:#fdd;border:1px solid #c00;padding:.6em;margin:1em 0}\
         pre{background:#f4f4f4;padding:.6em;overflow:auto}</style></head><body>\
         <h1>YouTube CRUD Application</h1><nav>",
    );
    for (name, label) in TABS {
        let class = if name == active { " class=\"active\"" } else { "" };
        let _ = write!(page, "<a href=\"/?tab={}\"{}>{}</a>", name, class, label);
    }
    page.push_str("</nav>");

    let (_, label) = TABS
        .iter()
        .find(|(name, _)| *name == active)
        .unwrap_or(&TABS[0]);
    let _ = write!(
        page,
        "<h2>{}</h2><form method=\"post\" action=\"/{}\">{}<button type=\"submit\">{}</button></form>",
        label,
        active,
        form_fields(active),
        label
    );

    match outcome {
        Some(Ok(value)) => {
            let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            let _ = write!(page, "<h3>Result</h3><pre>{}</pre>", escape(&pretty));
        }
        Some(Err(failure)) => {
            let _ = write!(
                page,
                "<div class=\"error\"><strong>{}</strong>: {}</div>",
                failure.kind,
                escape(&failure.message)
            );
        }
        None => {}
    }
    page.push_str("</body></html>");
    page
}

fn form_fields(tab: &str) -> &'static str {
    match tab {
        "create" => {
            "<label>Video file (local path)<input name=\"file\" required></label>\
             <label>Title<input name=\"title\" required></label>\
             <label>Description<textarea name=\"description\"></textarea></label>\
             <label>Category ID<input name=\"category_id\" value=\"22\" required></label>\
             <label>Tags (comma-separated)<input name=\"tags\"></label>\
             <label>Privacy<select name=\"privacy_status\">\
             <option>private</option><option>unlisted</option><option>public</option>\
             </select></label>"
        }
        "update" => {
            "<label>Video ID<input name=\"video_id\" required></label>\
             <label>New title<input name=\"title\"></label>\
             <label>New description<textarea name=\"description\"></textarea></label>\
             <label>New tags (comma-separated)<input name=\"tags\"></label>\
             <p>Blank fields are left unchanged.</p>"
        }
        _ => "<label>Video ID<input name=\"video_id\" required></label>",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::{AuthFlow, Authenticator};
    use crate::error::FailureKind;
    use crate::types::ApplicationSecret;

    fn ui() -> Ui<crate::client::DefaultConnector> {
        let secret = ApplicationSecret {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            ..Default::default()
        };
        let auth = Authenticator::builder(AuthFlow::cached_oauth(secret))
            .interactive_fallback(false)
            .build()
            .unwrap();
        Ui::new(Dispatcher::new(auth).api_base_url("http://127.0.0.1:1"))
    }

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_update_blank_fields_unchanged() {
        let req = request_from_form(
            "update",
            &form(&[("video_id", "abc"), ("title", "New"), ("description", "  "), ("tags", ",")]),
        )
        .unwrap();
        assert_eq!(
            req,
            OperationRequest::Update {
                video_id: "abc".to_string(),
                patch: SnippetPatch {
                    title: Some("New".to_string()),
                    ..Default::default()
                },
            }
        );
    }

    #[test]
    fn test_create_form() {
        let req = request_from_form(
            "create",
            &form(&[
                ("file", "/tmp/clip.mp4"),
                ("title", "Test"),
                ("category_id", "22"),
                ("tags", "a, b,"),
                ("privacy_status", "unlisted"),
            ]),
        )
        .unwrap();
        match req {
            OperationRequest::Create(video) => {
                assert_eq!(video.tags, vec!["a", "b"]);
                assert_eq!(video.privacy_status, PrivacyStatus::Unlisted);
                assert_eq!(video.description, "");
            }
            other => panic!("unexpected request {:?}", other),
        }
        let err = request_from_form("create", &form(&[("privacy_status", "secret")])).unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("<b>\"x\" & 'y'</b>"), "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;");
    }

    #[tokio::test]
    async fn test_index_renders_tabs() {
        let req = Request::get("/?tab=update").body(String::new()).unwrap();
        let resp = ui().handle(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body();
        for (_, label) in TABS {
            assert!(body.contains(label));
        }
        assert!(body.contains("action=\"/update\""));
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let req = Request::get("/nope").body(String::new()).unwrap();
        let resp = ui().handle(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_validation_banner() {
        let req = Request::post("/read")
            .body(String::from("video_id=+"))
            .unwrap();
        let resp = ui().handle(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body();
        assert!(body.contains("<strong>ValidationError</strong>"));
    }

    #[tokio::test]
    async fn test_auth_failure_banner() {
        let req = Request::post("/delete")
            .body(String::from("video_id=abc"))
            .unwrap();
        let body = ui().handle(req).await.unwrap().into_body();
        assert!(body.contains("<strong>AuthError</strong>"));
    }
}
