use bytes::Bytes;
use http_body_util::{BodyExt as _, Empty};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use super::{Error, HttpRequest, HttpResponse, Result, check_header};

/// Pooled HTTP/1 client. Cheap to clone; clones share connections.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // An unreachable target should surface as a prompt network error, not an OS-level
        // connect timeout of tens of seconds.
        Self::new(Some(Duration::from_secs(3)))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_nodelay(true);
        http_connector.set_connect_timeout(connect_timeout);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Self { inner }
    }

    /// Sends one GET. Deadlines are the caller's business; only connecting is bounded here.
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::UnsupportedScheme(req.url));
        }
        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

        let mut builder = Request::get(uri);
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let request = builder.body(Empty::new()).map_err(|source| {
            // The builder only fails on the headers we fed it.
            Error::InvalidHeader {
                name: first_invalid_header(&req.headers),
                source,
            }
        })?;

        let res = self.inner.request(request).await?;
        let status = res.status().as_u16();

        // Drain the body so the connection goes back to the pool.
        let body = res.into_body().collect().await?.to_bytes();

        Ok(HttpResponse {
            status,
            body_len: body.len(),
        })
    }
}

fn first_invalid_header(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .find(|(k, v)| check_header(k, v).is_err())
        .map(|(k, _)| k.clone())
        .unwrap_or_default()
}
