//! Reverse proxy to the static file host.
//!
//! Routing of the single page application happens client-side, so unless a
//! concrete file is requested the upstream root document is served.

use axum::{
    body::{Body, StreamBody},
    extract::State,
    http::{
        header::{CONNECTION, HOST},
        HeaderMap, HeaderName, Method, Request, StatusCode,
    },
    response::{IntoResponse, Response},
};
use percent_encoding::percent_decode_str;
use reqwest::Url;
use std::borrow::Cow;

#[derive(Clone)]
pub struct Proxy {
    client: reqwest::Client,
    target: Url,
}

impl Proxy {
    pub fn new(target: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            target,
        }
    }

    /// Destination for an incoming `path` and `query`. Scheme, host and
    /// path prefix always come from the target.
    ///
    /// `None` for file paths with `.` or `..` segments: the URL parser would
    /// resolve them and the result could leave the target's path prefix.
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> Option<Url> {
        let mut url = self.target.clone();
        if is_file_request(path) {
            if has_dot_segment(path) {
                return None;
            }
            url.set_path(&join_paths(self.target.path(), path));
        }
        let queries: Vec<&str> = [self.target.query(), query]
            .into_iter()
            .flatten()
            .filter(|q| !q.is_empty())
            .collect();
        if queries.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&queries.join("&")));
        }
        url.set_fragment(None);
        Some(url)
    }
}

fn decode(path: &str) -> Cow<'_, str> {
    percent_decode_str(path).decode_utf8_lossy()
}

/// True when the last segment of the decoded path looks like a file name.
pub fn is_file_request(path: &str) -> bool {
    decode(path)
        .rsplit('/')
        .next()
        .map_or(false, |segment| segment.contains('.'))
}

fn has_dot_segment(path: &str) -> bool {
    path.split('/')
        .any(|segment| matches!(decode(segment).as_ref(), "." | ".."))
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Copy of `headers` without hop-by-hop headers, including those listed in
/// `Connection`, and without `Host`.
fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    headers
        .iter()
        .filter(|(name, _)| {
            !is_hop_by_hop(name) && **name != HOST && !listed.iter().any(|t| t == name.as_str())
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

pub async fn forward(State(proxy): State<Proxy>, req: Request<Body>) -> Response {
    if req.method() != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let Some(url) = proxy.upstream_url(req.uri().path(), req.uri().query()) else {
        tracing::debug!("refusing dot segments in {}", req.uri());
        return StatusCode::BAD_REQUEST.into_response();
    };
    tracing::debug!("proxying {} to {}", req.uri(), url);

    let upstream = match proxy
        .client
        .get(url)
        .headers(forwardable(req.headers()))
        .send()
        .await
    {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::warn!("file server request failed: {}", e);
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let status = upstream.status();
    let headers = forwardable(upstream.headers());
    let mut response = StreamBody::new(upstream.bytes_stream()).into_response();
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
