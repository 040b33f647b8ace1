use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use http::Extensions;
use log::{debug, error};
use reqwest::{Client, Request, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{
    default_on_request_failure, default_on_request_success, Retryable, RetryableStrategy,
    RetryTransientMiddleware,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared counter of rate-limit responses seen on the wire. The expansion
/// engine samples and resets it once per batch to drive its tuning loop.
/// Retried attempts count too; the feedback loop must see pressure that the
/// retry middleware absorbs.
#[derive(Debug, Clone, Default)]
pub struct RateLimitMeter {
    hits: Arc<AtomicU32>,
}

impl RateLimitMeter {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn take(&self) -> u32 {
        self.hits.swap(0, Ordering::Relaxed)
    }
}

pub fn create_client(rate_limit_meter: RateLimitMeter) -> ClientWithMiddleware {
    let reqwest_client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap();

    let limiter = RateLimiter::direct(Quota::per_second(std::num::NonZeroU32::new(20u32).unwrap()));
    let arc_limiter = Arc::new(limiter);

    let rate_limiting_middleware = RateLimitingMiddleware { limiter: arc_limiter };

    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(50), Duration::from_secs(60))
        .build_with_max_retries(5);

    ClientBuilder::new(reqwest_client)
        .with(RateLimitBackoffMiddleware::default())
        .with(RetryTransientMiddleware::new_with_policy_and_strategy(retry_policy, SkipRateLimitStrategy))
        .with(ErrorLoggingMiddleware)
        .with(RateLimitCountingMiddleware::new(rate_limit_meter))
        .with(rate_limiting_middleware)
        .build()
}

/// Rate-limit responses are waited out by [`RateLimitBackoffMiddleware`] and
/// must not consume the transient-retry budget.
struct SkipRateLimitStrategy;

impl RetryableStrategy for SkipRateLimitStrategy {
    fn handle(&self, res: &reqwest_middleware::Result<Response>) -> Option<Retryable> {
        match res {
            Ok(response) if is_rate_limit_status(response.status()) => None,
            Ok(response) => default_on_request_success(response),
            Err(error) => default_on_request_failure(error),
        }
    }
}

/// Sleeps through 420/429 responses and replays the request, without a retry
/// cap. The server's Retry-After header is authoritative when present; the
/// wait is bounded only to guard against nonsense header values.
struct RateLimitBackoffMiddleware {
    fallback_wait: Duration,
    max_wait: Duration,
}

impl Default for RateLimitBackoffMiddleware {
    fn default() -> Self {
        Self {
            fallback_wait: Duration::from_secs(10),
            max_wait: Duration::from_secs(120),
        }
    }
}

#[async_trait::async_trait]
impl Middleware for RateLimitBackoffMiddleware {
    async fn handle(&self, req: Request, extensions: &mut Extensions, next: Next<'_>) -> reqwest_middleware::Result<Response> {
        let mut req = req;
        loop {
            let replay = req.try_clone();
            let response = next.clone().run(req, extensions).await?;

            if !is_rate_limit_status(response.status()) {
                return Ok(response);
            }

            // a request with a streaming body cannot be replayed
            let Some(retry_req) = replay else {
                return Ok(response);
            };

            let wait = retry_after(&response).unwrap_or(self.fallback_wait).min(self.max_wait);
            debug!(
                "Rate limited (status {}), waiting {:?} before replaying {}",
                response.status(),
                wait,
                retry_req.url()
            );
            tokio::time::sleep(wait).await;
            req = retry_req;
        }
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn is_rate_limit_status(status: StatusCode) -> bool {
    // the market API reports error-limiting as 420, some proxies as 429
    status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 420
}

struct RateLimitCountingMiddleware {
    meter: RateLimitMeter,
}

impl RateLimitCountingMiddleware {
    pub fn new(meter: RateLimitMeter) -> Self {
        Self { meter }
    }
}

#[async_trait::async_trait]
impl Middleware for RateLimitCountingMiddleware {
    async fn handle(&self, req: Request, extensions: &mut Extensions, next: Next<'_>) -> reqwest_middleware::Result<Response> {
        let response = next.run(req, extensions).await;

        if let Ok(resp) = &response {
            if is_rate_limit_status(resp.status()) {
                self.meter.record();
            }
        }

        response
    }
}

struct RateLimitingMiddleware {
    limiter: Arc<DefaultDirectRateLimiter>,
}

#[async_trait::async_trait]
impl Middleware for RateLimitingMiddleware {
    async fn handle(&self, req: Request, extensions: &mut Extensions, next: Next<'_>) -> reqwest_middleware::Result<Response> {
        self.limiter.until_ready().await;

        next.run(req, extensions).await
    }
}

pub struct ErrorLoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for ErrorLoggingMiddleware {
    async fn handle(&self, req: Request, extensions: &mut Extensions, next: Next<'_>) -> reqwest_middleware::Result<Response> {
        let start = Instant::now();
        let method = req.method().clone();
        let url = req.url().clone();

        let result = next.run(req, extensions).await;

        let duration = start.elapsed();

        match &result {
            Ok(resp) if !resp.status().is_success() => {
                let status = resp.status();

                // reduce log-spam / false-positives with these conditions
                match status {
                    StatusCode::NOT_FOUND => {
                        debug!("Request returned 404: {} {} - Duration: {:?}", method, url, duration);
                    }
                    status if is_rate_limit_status(status) => {
                        debug!(
                            "Request failed due to rate-limit {} {} - Status: {}, Duration: {:?}",
                            method, url, status, duration
                        )
                    }
                    _ => error!("Request failed: {} {} - Status: {}, Duration: {:?}", method, url, status, duration),
                }
            }
            Err(e) => {
                error!("Request error: {} {} - Error: {}, Duration: {:?}", method, url, e, duration);
            }
            _ => {
                debug!("Request succeeded: {} {} - Duration: {:?}", method, url, duration);
            }
        }

        result
    }
}
