// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::header::{ALLOW, CONTENT_TYPE, LOCATION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::webapp::{Lookup, PathRejection, RequestPath, WebApp};
use crate::errors::Error;

/// Diagnostic route listing the discovered components.
pub const COMPONENTS_PATH: &str = "/_devrunner/components";

static BADREQUEST: &[u8] = b"Bad request";
static NOTFOUND: &[u8] = b"Not found";
static NOTALLOWED: &[u8] = b"Method not allowed";
static UNAVAILABLE: &[u8] = b"No application deployed";
static INTERNAL: &[u8] = b"Internal server error";

type ResponseBody = BoxBody<Bytes, std::io::Error>;

/// The application currently served, if any. Empty while an application
/// server is up but nothing has been deployed to it yet.
#[derive(Debug, Default)]
pub struct DeploymentSlot(RwLock<Option<Arc<WebApp>>>);

impl DeploymentSlot {
    pub fn with(app: WebApp) -> Self {
        Self(RwLock::new(Some(Arc::new(app))))
    }

    pub fn install(&self, app: WebApp) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(app));
    }

    pub fn current(&self) -> Option<Arc<WebApp>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, Error> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::backend_start(format!("could not bind {addr}"), e))
}

fn body(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into()).map_err(|e| match e {}).boxed()
}

fn respond(status: StatusCode, content_type: &str, bytes: impl Into<Bytes>) -> Response<ResponseBody> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .body(body(bytes))
        .unwrap_or_else(|e| {
            error!("Failed to build response: {e}");
            Response::new(body(INTERNAL))
        })
}

fn text(status: StatusCode, message: &'static [u8]) -> Response<ResponseBody> {
    respond(status, "text/plain; charset=utf-8", message)
}

fn redirect(location: &str) -> Response<ResponseBody> {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(LOCATION, location)
        .body(Empty::new().map_err(|e| match e {}).boxed())
        .unwrap_or_else(|e| {
            error!("Failed to build redirect: {e}");
            text(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL)
        })
}

fn method_not_allowed() -> Response<ResponseBody> {
    let mut response = text(StatusCode::METHOD_NOT_ALLOWED, NOTALLOWED);
    response
        .headers_mut()
        .insert(ALLOW, hyper::header::HeaderValue::from_static("GET, HEAD"));
    response
}

fn handle_components(app: &WebApp) -> Response<ResponseBody> {
    match serde_json::to_vec(app.components()) {
        Ok(json) => respond(StatusCode::OK, "application/json", json),
        Err(e) => {
            error!("Failed to serialize components: {e}");
            text(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL)
        }
    }
}

async fn handle_static(app: Arc<WebApp>, raw_path: &str) -> Response<ResponseBody> {
    let path = match RequestPath::parse(raw_path) {
        Ok(path) => path,
        Err(PathRejection::Protected) => return text(StatusCode::NOT_FOUND, NOTFOUND),
        Err(rejection) => {
            debug!("rejecting {raw_path}: {rejection:?}");
            return text(StatusCode::BAD_REQUEST, BADREQUEST);
        }
    };

    // Resource reads hit the filesystem and zip archives.
    match tokio::task::spawn_blocking(move || app.lookup(&path)).await {
        Ok(Ok(Lookup::Found(resource))) => respond(StatusCode::OK, resource.content_type, resource.body),
        Ok(Ok(Lookup::Redirect(location))) => redirect(&location),
        Ok(Ok(Lookup::NotFound)) => text(StatusCode::NOT_FOUND, NOTFOUND),
        Ok(Err(e)) => {
            error!("Failed to read {raw_path}: {e}");
            text(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL)
        }
        Err(e) => {
            error!("Lookup task failed for {raw_path}: {e}");
            text(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL)
        }
    }
}

async fn handle_request<B>(slot: &DeploymentSlot, req: Request<B>) -> Response<ResponseBody> {
    if !matches!(*req.method(), Method::GET | Method::HEAD) {
        debug!("{} {} not allowed", req.method(), req.uri().path());
        return method_not_allowed();
    }
    let Some(app) = slot.current() else {
        return text(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE);
    };
    match req.uri().path() {
        COMPONENTS_PATH => handle_components(&app),
        path => handle_static(app, path).await,
    }
}

/// Accept connections until `shutdown` flips, then drain them for at most
/// `stop_timeout` before aborting the stragglers.
pub async fn accept_loop(
    listener: TcpListener,
    slot: Arc<DeploymentSlot>,
    mut shutdown: watch::Receiver<bool>,
    stop_timeout: Duration,
) -> Result<(), Error> {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (stream, peer) = accept_result?;
                debug!("connection from {peer}");

                // Use an adapter to access something implementing `tokio::io` traits as if they
                // implement `hyper::rt` IO traits.
                let io = TokioIo::new(stream);
                let slot = Arc::clone(&slot);
                let mut conn_shutdown = shutdown.clone();

                connections.spawn(async move {
                    let service = service_fn(move |req| {
                        let slot = Arc::clone(&slot);
                        async move { Ok::<_, Infallible>(handle_request(&slot, req).await) }
                    });
                    let conn = http1::Builder::new().serve_connection(io, service);
                    tokio::pin!(conn);
                    let result = tokio::select! {
                        result = conn.as_mut() => result,
                        _ = conn_shutdown.changed() => {
                            conn.as_mut().graceful_shutdown();
                            conn.as_mut().await
                        }
                    };
                    if let Err(err) = result {
                        debug!("Error serving connection from {peer}: {err}");
                    }
                });
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown.changed() => {
                break;
            }
        }
    }

    drop(listener);
    let live = connections.len();
    if live > 0 {
        info!("waiting for {live} open connection(s) to finish");
    }
    let drained = tokio::time::timeout(stop_timeout, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            "{} connection(s) still open after {}s, aborting",
            connections.len(),
            stop_timeout.as_secs()
        );
        connections.shutdown().await;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::backend::webapp::WebAppSpec;
    use crate::policy::ResolutionPolicy;
    use crate::scanner::ScanOptions;

    fn app(root: &std::path::Path) -> WebApp {
        WebApp::deploy(
            WebAppSpec {
                name: "ROOT".into(),
                document_root: Some(root.to_path_buf()),
                class_path: vec![],
            },
            Arc::new(ResolutionPolicy::default()),
            &ScanOptions::default(),
        )
        .unwrap()
    }

    fn request(method: Method, path: &str) -> Request<()> {
        Request::builder().method(method).uri(path).body(()).unwrap()
    }

    async fn body_bytes(response: Response<ResponseBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_empty_slot_is_unavailable() {
        let slot = DeploymentSlot::default();
        let response = handle_request(&slot, request(Method::GET, "/")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_methods_and_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), b"<h1>hi</h1>").unwrap();
        std::fs::create_dir(dir.path().join("WEB-INF")).unwrap();
        std::fs::write(dir.path().join("WEB-INF/secret.txt"), b"secret").unwrap();
        let slot = DeploymentSlot::with(app(dir.path()));

        let response = handle_request(&slot, request(Method::GET, "/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(body_bytes(response).await, "<h1>hi</h1>");

        let response = handle_request(&slot, request(Method::HEAD, "/index.html")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = handle_request(&slot, request(Method::POST, "/index.html")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, HEAD");

        let response = handle_request(&slot, request(Method::GET, "/WEB-INF/secret.txt")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = handle_request(&slot, request(Method::GET, "/a/../index.html")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = handle_request(&slot, request(Method::GET, "/nope.css")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_components_route() {
        let dir = tempfile::tempdir().unwrap();
        let slot = DeploymentSlot::with(app(dir.path()));
        let response = handle_request(&slot, request(Method::GET, COMPONENTS_PATH)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_bytes(response).await, "{}");
    }

    #[tokio::test]
    async fn test_slot_install_replaces_empty() {
        let dir = tempfile::tempdir().unwrap();
        let slot = DeploymentSlot::default();
        assert!(slot.current().is_none());
        slot.install(app(dir.path()));
        assert_eq!(slot.current().unwrap().name(), "ROOT");
    }

    #[tokio::test]
    async fn test_bind_conflict_is_backend_start() {
        let first = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let taken = first.local_addr().unwrap();
        let err = bind(taken).await.unwrap_err();
        assert!(matches!(err, Error::BackendStart { .. }));
    }
}
