use std::sync::Arc;
use std::time::Instant;

use loadgate_http::{HttpClient, HttpRequest, join_url};

use crate::config::Endpoint;
use crate::ipc::StatusClass;

use super::{IssueFuture, RequestOutcome};

/// Builds the production request function: one GET per call against `base_url + endpoint.path`.
///
/// Transport errors become `NetworkError`, connect timeouts become `Timeout`. The per-request
/// deadline itself is enforced by the dispatch loop.
pub fn http_request_fn(
    client: HttpClient,
    base_url: Arc<str>,
    headers: Arc<[(String, String)]>,
) -> impl Fn(Arc<Endpoint>) -> IssueFuture + Clone + Send + Sync + 'static {
    move |endpoint: Arc<Endpoint>| {
        let client = client.clone();
        let url = join_url(&base_url, &endpoint.path);
        let headers = headers.to_vec();

        Box::pin(async move {
            let req = HttpRequest::get(url).with_headers(headers);
            let start = Instant::now();
            let res = client.request(req).await;
            let duration_micros = start.elapsed().as_micros() as u64;

            let class = match res {
                Ok(res) => StatusClass::from_status(res.status),
                Err(err) if err.is_timeout() => StatusClass::Timeout,
                Err(err) => {
                    tracing::debug!(
                        endpoint = %endpoint.name,
                        kind = %err.transport_error_kind(),
                        "request error: {err}"
                    );
                    StatusClass::NetworkError
                }
            };

            RequestOutcome::new(endpoint.name.as_str().into(), class, duration_micros)
        }) as IssueFuture
    }
}
