//! Request pipeline: the single axum handler that ties the TTL policy, store, coalescer
//! and scheduler together.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::cache_control::RequestDirectives;
use crate::cache_key::CacheKey;
use crate::coalescer::Coalescer;
use crate::store::{CacheEntry, Lookup};
use crate::traits::OriginResponse;

pub use crate::server::ProxyState;

const CACHE_STATUS_HEADER: &str = "x-cache";

enum CacheStatus {
    Hit,
    Stale,
    Miss,
    Bypass,
}

impl CacheStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Stale => "STALE",
            Self::Miss => "MISS",
            Self::Bypass => "BYPASS",
        }
    }
}

fn now_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub async fn handle(State(state): State<Arc<ProxyState>>, req: Request<Body>) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let path = uri.path().to_string();
    let query = uri.query().map(str::to_string);

    if method != Method::GET || state.skip_paths.iter().any(|skip| skip == &path) {
        return forward_passthrough(&state, req).await;
    }

    let directives = RequestDirectives::parse(
        req.headers()
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok()),
    );

    if directives.no_store {
        return forward_passthrough(&state, req).await;
    }

    let key = CacheKey::from_request(&path, query.as_deref(), state.cache_key_include_query);
    let now = now_epoch_seconds();

    if !directives.no_cache {
        match state.store.get(&key, now).await {
            Lookup::HitFresh(entry) => {
                let too_old = directives
                    .max_age
                    .is_some_and(|max_age| now.saturating_sub(entry.stored_at) >= max_age);
                if !too_old {
                    return entry_response(&entry, CacheStatus::Hit);
                }
            }
            Lookup::HitStale(entry) => {
                maybe_schedule_refresh(&state, &key).await;
                return entry_response(&entry, CacheStatus::Stale);
            }
            Lookup::Miss => {}
        }
    }

    let coalescer = Coalescer {
        store: &state.store,
        origin: state.origin.as_ref(),
        ttl_policy: &state.ttl_policy,
        lock_lease: state.lock_lease,
        loser_max_wait: state.loser_max_wait,
    };

    match coalescer
        .resolve_miss(
            &key,
            &path,
            query.as_deref(),
            directives.max_age,
            directives.no_cache,
        )
        .await
    {
        Ok(response) => origin_response(response, CacheStatus::Miss),
        Err(err) => {
            warn!(key = %key, error = %err, "origin fetch failed on miss");
            (StatusCode::BAD_GATEWAY, "origin unavailable").into_response()
        }
    }
}

async fn maybe_schedule_refresh(state: &ProxyState, key: &CacheKey) {
    let marked = state
        .store
        .near()
        .set_if_absent_marker(&key.refresh_mark_key(), Duration::from_secs(state.refresh_mark_ttl_seconds))
        .await;
    if marked {
        state.scheduler.schedule_refresh(key.as_str().to_string());
    }
}

fn entry_response(entry: &CacheEntry, status: CacheStatus) -> Response {
    let mut response = (
        StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK),
        axum::Json(entry.body.clone()),
    )
        .into_response();
    set_content_type(&mut response, &entry.content_type);
    set_cache_status(&mut response, status);
    response
}

fn origin_response(response: OriginResponse, status: CacheStatus) -> Response {
    let status_code = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut http_response = (status_code, response.body.to_vec()).into_response();
    set_content_type(&mut http_response, &response.content_type);
    set_cache_status(&mut http_response, status);
    http_response
}

fn set_content_type(response: &mut Response, content_type: &str) {
    if let Ok(value) = HeaderValue::from_str(content_type) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
}

fn set_cache_status(response: &mut Response, status: CacheStatus) {
    response.headers_mut().insert(
        HeaderName::from_static(CACHE_STATUS_HEADER),
        HeaderValue::from_static(status.as_str()),
    );
}

/// Relays a non-cacheable request to the origin byte-for-byte: method, headers, and a streamed
/// body in both directions, without buffering it in memory.
async fn forward_passthrough(state: &ProxyState, req: Request<Body>) -> Response {
    let (parts, body) = req.into_parts();
    let mut url = format!("{}{}", state.origin_url, parts.uri.path());
    if let Some(query) = parts.uri.query() {
        url.push('?');
        url.push_str(query);
    }

    let mut headers = HeaderMap::new();
    for (name, value) in &parts.headers {
        if name != header::HOST {
            headers.insert(name.clone(), value.clone());
        }
    }

    let request = state
        .forward_client
        .request(parts.method, &url)
        .headers(headers)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()));

    let upstream = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(url = %url, error = %err, "pass-through forward failed");
            return (StatusCode::BAD_GATEWAY, "origin unavailable").into_response();
        }
    };

    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        response_headers.insert(name.clone(), value.clone());
    }

    let body = Body::from_stream(upstream.bytes_stream());
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    set_cache_status(&mut response, CacheStatus::Bypass);
    response
}
