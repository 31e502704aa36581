//! Tower middleware for the gRPC server: bearer-token authentication and a
//! process-wide token-bucket rate limit shared by unary and streaming calls.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Instant;

use http::{HeaderMap, Request, Response};
use tonic::Code;
use tower::{Layer, Service};

use crate::auth::Authorizer;

/// The metadata scheme is the literal word `jwt` followed by a space.
const AUTH_SCHEME: &str = "jwt ";

/// The registration/login service must stay reachable without a token.
const AUTH_SERVICE_PREFIX: &str = "/gophkeeper.AuthorizationService/";

type BoxFuture<T, E> = Pin<Box<dyn Future<Output = std::result::Result<T, E>> + Send>>;

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let token = value.strip_prefix(AUTH_SCHEME)?;
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Build a bare gRPC error response at the transport layer, before any
/// service handler runs. Status travels in headers (a trailers-only reply).
fn deny<B: Default>(code: Code, message: &str) -> Response<B> {
    let mut builder = http::Response::builder()
        .status(http::StatusCode::OK)
        .header("content-type", "application/grpc")
        .header("grpc-status", (code as i32).to_string());

    if !message.is_empty() {
        builder = builder.header("grpc-message", message);
    }

    builder
        .body(B::default())
        .expect("static response parts are always valid")
}

/// Authenticates every call outside the bootstrap auth service and stores the
/// resulting identity in the request extensions.
#[derive(Clone)]
pub struct AuthLayer {
    auth: Arc<Authorizer>,
}

impl AuthLayer {
    pub fn new(auth: Arc<Authorizer>) -> Self {
        Self { auth }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            auth: self.auth.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    auth: Arc<Authorizer>,
}

impl<S, ReqBody, RespBody> Service<Request<ReqBody>> for AuthMiddleware<S>
where
    S: Service<Request<ReqBody>, Response = Response<RespBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    RespBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // Clone-and-swap keeps the readiness we were polled for.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let auth = self.auth.clone();

        Box::pin(async move {
            if req.uri().path().starts_with(AUTH_SERVICE_PREFIX) {
                return inner.call(req).await;
            }

            let token = match bearer_token(req.headers()) {
                Some(token) => token,
                None => return Ok(deny(Code::Unauthenticated, "unauthorized")),
            };

            match auth.authorize_with_token(&token).await {
                Ok(data) => {
                    req.extensions_mut().insert(data);
                    inner.call(req).await
                }
                Err(err) => {
                    tracing::debug!(error = %err, "token rejected");
                    Ok(deny(Code::Unauthenticated, "unauthorized"))
                }
            }
        })
    }
}

/// Process-wide token bucket. Refills continuously at `rps` tokens per
/// second up to a burst capacity of one second's worth.
pub struct RateLimiter {
    rps: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(rps: u32) -> Self {
        let rps = rps.max(1) as f64;
        Self {
            rps,
            state: Mutex::new(BucketState {
                tokens: rps,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn try_acquire(&self) -> bool {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rps).min(self.rps);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Applies the shared bucket to every call, unary and streaming alike.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S, ReqBody, RespBody> Service<Request<ReqBody>> for RateLimitMiddleware<S>
where
    S: Service<Request<ReqBody>, Response = Response<RespBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    RespBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let allowed = self.limiter.try_acquire();

        Box::pin(async move {
            if !allowed {
                return Ok(deny(Code::ResourceExhausted, "rate limit exceeded"));
            }
            inner.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", "jwt abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi".to_string()));

        headers.insert("authorization", "bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", "jwt ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_bucket_drains_and_refills() {
        let limiter = RateLimiter::new(10);

        let granted = (0..20).filter(|_| limiter.try_acquire()).count();
        assert_eq!(granted, 10);

        std::thread::sleep(std::time::Duration::from_millis(250));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_bucket_caps_at_capacity() {
        let limiter = RateLimiter::new(5);
        std::thread::sleep(std::time::Duration::from_millis(100));

        // No amount of idling may accumulate more than one second of burst.
        let granted = (0..20).filter(|_| limiter.try_acquire()).count();
        assert!(granted <= 5);
    }
}
