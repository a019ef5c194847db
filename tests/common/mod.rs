#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, HeaderMap, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::{SocketAddr, TcpListener};

pub fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

pub fn spawn(listener: TcpListener, router: Router) {
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(router.into_make_service());
    tokio::spawn(server);
}

/// Stand-in for the static file host. Echoes the request target it
/// received so tests can see the rewritten path.
pub fn file_host() -> SocketAddr {
    let (listener, addr) = bind();
    let files = Router::new()
        .route("/missing.png", get(|| async { StatusCode::NOT_FOUND }))
        .fallback(|uri: Uri, headers: HeaderMap| async move {
            let authorized = headers.contains_key(AUTHORIZATION).to_string();
            (
                [("x-served-by", "file-host".to_owned()), ("x-saw-auth", authorized)],
                uri.to_string(),
            )
                .into_response()
        });
    spawn(listener, files);
    addr
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_string(resp: Response) -> String {
    let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
