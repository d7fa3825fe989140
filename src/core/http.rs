//! 以 HTTP 下載遠端檔案: `GET /download?path=<遠端路徑>`.
//! 每條連線只處理一個請求, 回應後即關閉.

use crate::core::transfer::FtpTransfer;
use crate::core::{ConfigProvider, Storage};
use crate::utils::error::{FtpError, Result};
use ::http::header::{self, HeaderValue};
use ::http::{Method, Response, StatusCode, Uri};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub const DOWNLOAD_PATH: &str = "/download";
pub const MAX_REQUEST_HEAD: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub uri: Uri,
}

impl RequestLine {
    pub fn query_param(&self, key: &str) -> Option<String> {
        let query = self.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

fn bad_request(message: impl Into<String>) -> FtpError {
    FtpError::HttpRequestError {
        message: message.into(),
    }
}

pub fn parse_request_line(line: &str) -> Result<RequestLine> {
    let mut parts = line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v), None) => (m, t, v),
        _ => return Err(bad_request(format!("malformed request line: {}", line))),
    };
    if !version.starts_with("HTTP/1.") {
        return Err(bad_request(format!("unsupported version: {}", version)));
    }

    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| bad_request(format!("invalid method: {}", method)))?;
    let uri = target
        .parse::<Uri>()
        .map_err(|e| bad_request(format!("invalid target '{}': {}", target, e)))?;

    Ok(RequestLine { method, uri })
}

/// 讀取請求行與標頭 (標頭內容不使用), 總長度上限 MAX_REQUEST_HEAD
pub async fn read_request_head<R>(reader: &mut R) -> Result<RequestLine>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut limited = (&mut *reader).take(MAX_REQUEST_HEAD as u64);
    let mut request: Option<RequestLine> = None;

    loop {
        let mut raw = Vec::new();
        limited.read_until(b'\n', &mut raw).await?;
        if !raw.ends_with(b"\n") {
            return Err(if limited.limit() == 0 {
                bad_request("request head too large")
            } else {
                bad_request("connection closed before end of request head")
            });
        }

        let line = std::str::from_utf8(&raw)
            .map_err(|_| bad_request("request head is not valid UTF-8"))?
            .trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            if request.is_some() {
                break;
            }
            continue;
        }
        if request.is_none() {
            request = Some(parse_request_line(line)?);
        }
    }

    request.ok_or_else(|| bad_request("empty request"))
}

fn content_disposition(file_name: &str) -> HeaderValue {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let encoded = utf8_percent_encode(file_name, NON_ALPHANUMERIC);

    HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// 檔案下載的回應標頭, 長度未知時不帶 Content-Length
pub fn download_head(file_name: &str, content_length: Option<u64>) -> Response<()> {
    let mut response = Response::new(());
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(file_name));
    if let Some(len) = content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

pub fn text_response(status: StatusCode, message: &str) -> Response<String> {
    let body = format!("{}\n", message);
    let mut response = Response::new(String::new());
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    *response.body_mut() = body;
    response
}

pub async fn write_head<W, B>(writer: &mut W, response: &Response<B>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let status = response.status();
    let mut head = Vec::with_capacity(256);
    head.extend_from_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .as_bytes(),
    );
    for (name, value) in response.headers() {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");

    writer.write_all(&head).await?;
    writer.flush().await
}

pub async fn write_response<W>(writer: &mut W, response: &Response<String>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    write_head(writer, response).await?;
    writer.write_all(response.body().as_bytes()).await?;
    writer.flush().await
}

/// 依序處理連線, 直到 shutdown 完成
pub async fn serve<C, S, F>(listener: TcpListener, transfer: &FtpTransfer<C, S>, shutdown: F) -> Result<()>
where
    C: ConfigProvider,
    S: Storage,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let local = listener.local_addr()?;
    tracing::info!("🚀 Serving downloads on http://{}{}?path=", local, DOWNLOAD_PATH);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("🛑 Download server on {} stopped", local);
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!("accept failed ------->>> {}", e);
                        continue;
                    }
                };
                if let Err(e) = handle_connection(stream, transfer).await {
                    tracing::warn!("❌ Request from {} failed: {}", peer, e);
                }
            }
        }
    }

    Ok(())
}

async fn handle_connection<C, S>(mut stream: TcpStream, transfer: &FtpTransfer<C, S>) -> Result<()>
where
    C: ConfigProvider,
    S: Storage,
{
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);

    let request = match read_request_head(&mut reader).await {
        Ok(request) => request,
        Err(FtpError::HttpRequestError { message }) => {
            tracing::debug!("Bad request: {}", message);
            write_response(&mut write_half, &text_response(StatusCode::BAD_REQUEST, &message)).await?;
            write_half.shutdown().await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    tracing::debug!("{} {}", request.method, request.uri);

    if request.uri.path() != DOWNLOAD_PATH {
        write_response(&mut write_half, &text_response(StatusCode::NOT_FOUND, "not found")).await?;
    } else if request.method != Method::GET {
        let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "only GET is allowed");
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("GET"));
        write_response(&mut write_half, &response).await?;
    } else {
        match request.query_param("path").filter(|p| !p.trim().is_empty()) {
            None => {
                write_response(
                    &mut write_half,
                    &text_response(StatusCode::BAD_REQUEST, "missing 'path' query parameter"),
                )
                .await?;
            }
            Some(remote_path) => {
                // 失敗時 download_to_http 已寫出 404/502
                if let Err(e) = transfer.download_to_http(&remote_path, &mut write_half).await {
                    tracing::debug!("download {} failed: {}", remote_path, e);
                }
            }
        }
    }

    write_half.shutdown().await?;
    Ok(())
}
