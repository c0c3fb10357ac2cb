use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt, TryFutureExt};
use http::header::WARNING;
use http::{HeaderMap, Request, Response};
use kube::client::ClientBuilder;
use kube::{Client, Config};
use tower::{Layer, Service};
use tracing::{event, Level};

use super::handler::WarningHandler;
use super::header::parse_warning_header;
use crate::error::{Error, Result};

/// A [`Layer`] that hands every `Warning` response header to a
/// [`WarningHandler`] before the response reaches the kube client.
pub struct WarningLayer<H> {
    handler: Arc<H>,
}

impl<H> WarningLayer<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }
}

impl<H> Clone for WarningLayer<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<S, H> Layer<S> for WarningLayer<H> {
    type Service = WarningService<S, H>;

    fn layer(&self, inner: S) -> Self::Service {
        WarningService {
            inner,
            handler: Arc::clone(&self.handler),
        }
    }
}

/// The service produced by [`WarningLayer`].
pub struct WarningService<S, H> {
    inner: S,
    handler: Arc<H>,
}

impl<S: Clone, H> Clone for WarningService<S, H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<S, H, ReqBody, ResBody> Service<Request<ReqBody>> for WarningService<S, H>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: 'static,
    ResBody: Send + 'static,
    H: WarningHandler + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let handler = Arc::clone(&self.handler);
        self.inner
            .call(req)
            .map_ok(move |response| {
                dispatch_warnings(response.headers(), handler.as_ref());
                response
            })
            .boxed()
    }
}

/// Feeds each warning in `headers` to `handler`, in header order. Values that
/// cannot be parsed are logged and skipped.
pub fn dispatch_warnings<H: WarningHandler + ?Sized>(headers: &HeaderMap, handler: &H) {
    for value in headers.get_all(WARNING) {
        let value = match value.to_str() {
            Ok(value) => value,
            Err(err) => {
                event!(Level::DEBUG, err = %err, "Skipping non-text warning header.");
                continue;
            }
        };
        match parse_warning_header(value) {
            Ok(warnings) => {
                for warning in warnings {
                    handler.handle_warning_header(warning.code, &warning.agent, &warning.text);
                }
            }
            Err(err) => {
                event!(
                    Level::DEBUG,
                    err = %err,
                    header = value,
                    "Skipping malformed warning header."
                );
            }
        }
    }
}

/// Builds a client from `config` whose responses are inspected for warnings
/// by `handler`.
pub fn client_with_warnings<H>(config: Config, handler: Arc<H>) -> Result<Client>
where
    H: WarningHandler + 'static,
{
    let builder = ClientBuilder::try_from(config).map_err(Error::kube("building client"))?;
    Ok(builder.with_layer(&WarningLayer::new(handler)).build())
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use http::HeaderValue;
    use tower::{service_fn, ServiceExt};

    use super::*;
    use crate::warning::handler::tests::Spy;

    fn response_with(values: &[&'static str]) -> Response<String> {
        let mut response = Response::new(String::from("{}"));
        for value in values {
            response
                .headers_mut()
                .append(WARNING, HeaderValue::from_static(value));
        }
        response
    }

    #[tokio::test]
    async fn warnings_reach_handler_in_header_order() {
        let spy = Arc::new(Spy::default());
        let backend = service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(response_with(&[
                r#"299 - "existing pods in namespace \"a\" violate the new PodSecurity enforce level \"restricted:latest\"""#,
                r#"299 - "web-0: runAsNonRoot != true""#,
            ]))
        });
        let service = WarningLayer::new(Arc::clone(&spy)).layer(backend);

        let response = service.oneshot(Request::new(())).await.unwrap();
        assert_eq!(response.body(), "{}");
        assert_eq!(
            spy.calls(),
            vec![
                (
                    299,
                    "-".to_string(),
                    r#"existing pods in namespace "a" violate the new PodSecurity enforce level "restricted:latest""#.to_string()
                ),
                (299, "-".to_string(), "web-0: runAsNonRoot != true".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn malformed_headers_do_not_fail_the_request() {
        let spy = Arc::new(Spy::default());
        let backend = service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(response_with(&["not a warning", r#"299 - "kept""#]))
        });
        let service = WarningLayer::new(Arc::clone(&spy)).layer(backend);

        assert!(service.oneshot(Request::new(())).await.is_ok());
        assert_eq!(spy.calls(), vec![(299, "-".to_string(), "kept".to_string())]);
    }

    #[tokio::test]
    async fn responses_without_warnings_are_untouched() {
        let spy = Arc::new(Spy::default());
        let backend =
            service_fn(|_req: Request<()>| async { Ok::<_, Infallible>(response_with(&[])) });
        let service = WarningLayer::new(Arc::clone(&spy)).layer(backend);

        service.oneshot(Request::new(())).await.unwrap();
        assert!(spy.calls().is_empty());
    }
}
