//! `reqwest`-backed [`HttpClient`].

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use spendsync_sync::{
    ClientFailure, HttpClient, HttpRequest, HttpResponse, Method, MultipartForm, RequestBody,
};

/// HTTP client used by the CLI.
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    /// Builds a client with the CLI's user agent.
    pub fn new() -> Result<Self, reqwest::Error> {
        let inner = reqwest::Client::builder()
            .user_agent(concat!("spendsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientFailure> {
        let builder = match request.method {
            Method::Get => self.inner.get(&request.url),
            Method::Post => self.inner.post(&request.url),
        }
        .bearer_auth(&request.bearer)
        .timeout(request.timeout)
        .header(ACCEPT, "application/json");

        let builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(bytes) => builder.header(CONTENT_TYPE, "application/json").body(bytes),
            RequestBody::Multipart(form) => builder.multipart(multipart(form)?),
        };

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify)?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn multipart(form: MultipartForm) -> Result<Form, ClientFailure> {
    let mut out = Form::new();
    for (name, value) in form.fields {
        out = out.text(name, value);
    }
    if let Some(file) = form.file {
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.content_type)
            .map_err(|e| ClientFailure::Fatal(format!("invalid content type: {e}")))?;
        out = out.part(file.field, part);
    }
    Ok(out)
}

fn classify(err: reqwest::Error) -> ClientFailure {
    if err.is_timeout() {
        ClientFailure::Timeout
    } else if err.is_builder() {
        ClientFailure::Fatal(err.to_string())
    } else {
        ClientFailure::Connect(err.to_string())
    }
}
