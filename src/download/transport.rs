use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use headers::{HeaderMapExt, Range};
use log::debug;
use reqwest::{Client, Request, StatusCode};
use url::Url;

use crate::http::error::HttpError;

pub type ByteStream = BoxStream<'static, Result<Bytes, HttpError>>;

/// The transfer seam of the download pipeline. `open_stream` must honor
/// `start_offset` so an interrupted task can resume mid-file, and the
/// returned length is the total resource length when the server reports
/// one.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open_stream(
        &self,
        url: &Url,
        start_offset: u64,
    ) -> Result<(ByteStream, Option<u64>), HttpError>;
}

/// reqwest-backed transport using a byte-range request to resume.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    // Client 内部拥有一个连接池，所以应尽量使用 clone 复用
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open_stream(
        &self,
        url: &Url,
        start_offset: u64,
    ) -> Result<(ByteStream, Option<u64>), HttpError> {
        let mut request = Request::new(reqwest::Method::GET, url.clone());
        if start_offset > 0 {
            request
                .headers_mut()
                .typed_insert(Range::bytes(start_offset..).map_err(|err| {
                    HttpError::fatal(format!("invalid range offset {start_offset}: {err:?}"))
                })?);
        }

        let response = self.client.execute(request).await?;
        let status = response.status();
        if !(status.is_success() || status == StatusCode::PARTIAL_CONTENT) {
            return Err(HttpError::transient(format!("HTTP {status} from {url}")));
        }

        // Content-Length of a ranged response covers the remainder only
        let total = response
            .content_length()
            .map(|remaining| start_offset + remaining);
        debug!("stream opened at offset {start_offset}, total {total:?}: {url}");

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(HttpError::from))
            .boxed();

        Ok((stream, total))
    }
}
