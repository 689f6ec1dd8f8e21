use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, HeaderValue, Response, StatusCode};
use governor::middleware::StateInformationMiddleware;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::PeerIpKeyExtractor, GovernorError,
    GovernorLayer,
};

use crate::config::Config;

/// Sliding window of session creations for one device identity.
#[derive(Debug, Clone)]
struct CreateWindow {
    creates: VecDeque<Instant>,
}

const CREATE_LIMIT_PERIODIC_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

fn create_limit_store() -> &'static Mutex<HashMap<String, CreateWindow>> {
    static CREATE_LIMIT_STORE: OnceLock<Mutex<HashMap<String, CreateWindow>>> = OnceLock::new();
    CREATE_LIMIT_STORE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn create_limit_cleanup_threshold() -> usize {
    static THRESHOLD: OnceLock<usize> = OnceLock::new();
    *THRESHOLD.get_or_init(|| {
        parse_cleanup_threshold(std::env::var("CREATE_LIMIT_STORE_CLEANUP_THRESHOLD").ok())
    })
}

fn create_limit_last_cleanup() -> &'static Mutex<Instant> {
    static LAST_CLEANUP: OnceLock<Mutex<Instant>> = OnceLock::new();
    // Start at "now" so periodic cleanup does not fire immediately during startup.
    LAST_CLEANUP.get_or_init(|| Mutex::new(Instant::now()))
}

fn parse_cleanup_threshold(raw: Option<String>) -> usize {
    const DEFAULT_THRESHOLD: usize = 10_000;
    raw.and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_THRESHOLD)
}

fn should_cleanup_create_limit_store(
    store_len: usize,
    threshold: usize,
    now: Instant,
    last_cleanup_at: Instant,
    interval: Duration,
) -> bool {
    store_len > threshold || now.duration_since(last_cleanup_at) >= interval
}

/// Checks the per-device session creation budget. The key is the device
/// identity from the request payload, so this runs inside the create handler
/// rather than as a layer. Returns the retry-after seconds on rejection.
pub fn check_session_create_limit(
    device_ip: &str,
    max_creates: u32,
    window: Duration,
) -> Result<(), u64> {
    let max_creates = max_creates.max(1);
    let now = Instant::now();
    let threshold = create_limit_cleanup_threshold();
    let last_cleanup_at = *create_limit_last_cleanup()
        .lock()
        .unwrap_or_else(|e| e.into_inner());

    let (outcome, did_cleanup) = {
        let mut store = create_limit_store().lock().unwrap_or_else(|e| e.into_inner());
        let mut did_cleanup = false;
        if should_cleanup_create_limit_store(
            store.len(),
            threshold,
            now,
            last_cleanup_at,
            CREATE_LIMIT_PERIODIC_CLEANUP_INTERVAL,
        ) {
            store.retain(|_, entry| {
                prune_expired_creates(entry, now, window);
                !entry.creates.is_empty()
            });
            did_cleanup = true;
        }

        (
            evaluate_create_limit(&mut store, device_ip.to_string(), max_creates, window, now),
            did_cleanup,
        )
    };

    if did_cleanup {
        let mut last_cleanup = create_limit_last_cleanup()
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *last_cleanup = now;
    }

    outcome
}

fn evaluate_create_limit(
    store: &mut HashMap<String, CreateWindow>,
    key: String,
    max_creates: u32,
    window: Duration,
    now: Instant,
) -> Result<(), u64> {
    let entry = store.entry(key).or_insert(CreateWindow {
        creates: VecDeque::new(),
    });
    prune_expired_creates(entry, now, window);

    if entry.creates.len() >= max_creates as usize {
        let retry_after = entry
            .creates
            .front()
            .map(|oldest| {
                window
                    .saturating_sub(now.duration_since(*oldest))
                    .as_secs()
                    .max(1)
            })
            .unwrap_or(1);
        return Err(retry_after);
    }

    entry.creates.push_back(now);
    Ok(())
}

fn prune_expired_creates(entry: &mut CreateWindow, now: Instant, window: Duration) {
    while let Some(oldest) = entry.creates.front() {
        if now.duration_since(*oldest) >= window {
            entry.creates.pop_front();
        } else {
            break;
        }
    }
}

/// Builds the per-IP rate limiting layer applied in front of the whole API.
pub fn create_ip_rate_limiter(
    config: &Config,
) -> GovernorLayer<PeerIpKeyExtractor, StateInformationMiddleware, Body> {
    let per_second = config.ip_rate_limit_per_second.max(1);
    let burst_size = config.ip_rate_limit_burst.max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(per_second)
            .burst_size(burst_size)
            .key_extractor(PeerIpKeyExtractor)
            .use_headers()
            .finish()
            .expect("rate limiter config should be valid"),
    );

    GovernorLayer::new(governor_conf).error_handler(rate_limit_error_handler)
}

fn rate_limit_error_handler(error: GovernorError) -> Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            tracing::warn!(wait_time, "Rate limit exceeded");
            let mut response = json_error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many requests. Please try again later.",
                Some(wait_time),
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
        GovernorError::UnableToExtractKey => json_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "RATE_LIMIT_KEY_ERROR",
            "Unable to determine request identity.",
            None,
        ),
        GovernorError::Other { code, msg, headers } => {
            let mut response = json_error_response(
                code,
                "RATE_LIMIT_ERROR",
                &msg.unwrap_or_else(|| "Rate limit error".to_string()),
                None,
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
    }
}

/// Error body in the same shape as [`crate::error::ErrorResponse`].
fn json_error_response(
    status: StatusCode,
    code: &str,
    message: &str,
    retry_after: Option<u64>,
) -> Response<Body> {
    let mut body = serde_json::json!({
        "error": message,
        "code": code,
    });
    if let Some(retry_after) = retry_after {
        body["details"] = serde_json::json!({ "retry_after_seconds": retry_after });
    }

    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(retry_after) = retry_after {
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
    }
    response
}
