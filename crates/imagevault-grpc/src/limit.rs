//! Per-method admission control.
//!
//! A tower layer that caps how many invocations of each RPC method are in
//! flight at once. Each configured method gets its own semaphore of unit
//! permits; a permit is reserved before the inner service runs and released
//! only when the response body finishes or is dropped, so streaming calls
//! hold their slot for the stream's whole life. Methods with no configured
//! gate run unrestricted, and saturation of one method never affects
//! another.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::{Request, Response};
use http_body::{Body, Frame, SizeHint};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower::{Layer, Service};

/// In-flight cap applied to each image-service method by default.
pub const DEFAULT_METHOD_LIMIT: usize = 10;

/// Layer that installs [`MethodConcurrency`] around a service.
#[derive(Clone)]
pub struct MethodConcurrencyLayer {
    gates: Arc<HashMap<String, Arc<Semaphore>>>,
}

impl MethodConcurrencyLayer {
    /// Gates each listed method at the paired number of concurrent
    /// in-flight calls.
    pub fn new<I, M>(limits: I) -> Self
    where
        I: IntoIterator<Item = (M, usize)>,
        M: Into<String>,
    {
        let gates = limits
            .into_iter()
            .map(|(method, permits)| (method.into(), Arc::new(Semaphore::new(permits))))
            .collect();
        Self {
            gates: Arc::new(gates),
        }
    }
}

impl Default for MethodConcurrencyLayer {
    /// Gates all three image-service methods at [`DEFAULT_METHOD_LIMIT`].
    fn default() -> Self {
        Self::new([
            ("UploadImage", DEFAULT_METHOD_LIMIT),
            ("DownloadImage", DEFAULT_METHOD_LIMIT),
            ("GetUploadedImagesTableString", DEFAULT_METHOD_LIMIT),
        ])
    }
}

impl<S> Layer<S> for MethodConcurrencyLayer {
    type Service = MethodConcurrency<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MethodConcurrency {
            inner,
            gates: Arc::clone(&self.gates),
        }
    }
}

/// Service wrapper enforcing the per-method gates.
#[derive(Clone)]
pub struct MethodConcurrency<S> {
    inner: S,
    gates: Arc<HashMap<String, Arc<Semaphore>>>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for MethodConcurrency<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<PermitBody<ResBody>>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // Method name is the last segment of "/package.Service/Method".
        let gate = req
            .uri()
            .path()
            .rsplit('/')
            .next()
            .and_then(|method| self.gates.get(method))
            .cloned();

        // Hand the future the service instance that was polled ready.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let permit = match gate {
                // A caller that disconnects while parked here has its
                // future dropped, abandoning the wait without a permit.
                Some(gate) => Some(
                    gate.acquire_owned()
                        .await
                        .expect("method gate semaphore is never closed"),
                ),
                None => None,
            };

            let response = inner.call(req).await?;
            Ok(response.map(|body| PermitBody {
                inner: Box::pin(body),
                _permit: permit,
            }))
        })
    }
}

/// Response body that keeps the method permit alive until the last frame
/// is sent or the body is dropped, covering every exit path.
pub struct PermitBody<B> {
    inner: Pin<Box<B>>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl<B: Body> Body for PermitBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<B::Data>, B::Error>>> {
        self.get_mut().inner.as_mut().poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
