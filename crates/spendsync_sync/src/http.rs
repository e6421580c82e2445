//! HTTP transport implementation.
//!
//! This module maps write intents and list calls onto the expense REST API.
//! The actual HTTP client is abstracted via a trait so the mapping can be
//! tested without a network and so hosts can bring their own client.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{ReadEndpoint, WriteEndpoint};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use spendsync_core::{Amount, Category, ConfirmedExpense, TransactionType, WriteIntent};
use std::time::Duration;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
}

/// A request handed to the [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Bearer token for the `Authorization` header.
    pub bearer: String,
    /// Body.
    pub body: RequestBody,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Request body encodings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// `application/json` bytes.
    Json(Vec<u8>),
    /// `multipart/form-data`.
    Multipart(MultipartForm),
}

/// A multipart form: text fields plus at most one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    /// Text fields, in order.
    pub fields: Vec<(String, String)>,
    /// File part.
    pub file: Option<FilePart>,
}

impl MultipartForm {
    /// Value of the text field `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A file part of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Form field name.
    pub field: String,
    /// File name.
    pub file_name: String,
    /// MIME type.
    pub content_type: String,
    /// Contents.
    pub bytes: Vec<u8>,
}

/// A response from the [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status.
    pub status: u16,
    /// Body bytes.
    pub body: Vec<u8>,
}

/// A request that produced no HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFailure {
    /// The timeout elapsed.
    Timeout,
    /// Connection-level failure worth retrying (DNS, refused, reset).
    Connect(String),
    /// Failure that will not go away by retrying (bad URL, TLS config).
    Fatal(String),
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport (reqwest,
/// hyper, a loopback for tests).
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response, whatever its status.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientFailure>;
}

/// JSON body of a create request without attachment.
#[derive(Serialize)]
struct CreateExpenseBody<'a> {
    transaction_type: TransactionType,
    amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<u64>,
}

/// REST-backed endpoint for the expense API.
pub struct HttpTransport<C: HttpClient> {
    expenses_url: String,
    categories_url: String,
    timeout: Duration,
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport for the API described by `config`.
    pub fn new(config: &SyncConfig, client: C) -> Self {
        Self {
            expenses_url: config.expenses_url(),
            categories_url: config.categories_url(),
            timeout: config.request_timeout,
            client,
        }
    }

    /// Returns the expenses collection URL.
    pub fn expenses_url(&self) -> &str {
        &self.expenses_url
    }

    /// Returns the categories collection URL.
    pub fn categories_url(&self) -> &str {
        &self.categories_url
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Builds the create request for `intent`.
    ///
    /// Intents with an attachment go out as multipart with the file in a
    /// `receipt` part; all others as JSON.
    pub fn create_request(&self, intent: &WriteIntent, token: &str) -> SyncResult<HttpRequest> {
        let payload = &intent.payload;
        let body = match payload.receipt.as_ref().filter(|_| intent.has_attachment) {
            Some(receipt) => {
                let mut fields = vec![
                    (
                        "transaction_type".to_string(),
                        payload.transaction_type.as_str().to_string(),
                    ),
                    ("amount".to_string(), payload.amount.to_string()),
                ];
                if let Some(description) = &payload.description {
                    fields.push(("description".into(), description.clone()));
                }
                if let Some(date) = payload.date {
                    fields.push(("date".into(), date.format("%Y-%m-%d").to_string()));
                }
                if let Some(category) = payload.category {
                    fields.push(("category".into(), category.to_string()));
                }
                RequestBody::Multipart(MultipartForm {
                    fields,
                    file: Some(FilePart {
                        field: "receipt".into(),
                        file_name: receipt.file_name.clone(),
                        content_type: receipt.content_type.clone(),
                        bytes: receipt.bytes.clone(),
                    }),
                })
            }
            None => {
                let body = CreateExpenseBody {
                    transaction_type: payload.transaction_type,
                    amount: payload.amount,
                    description: payload.description.as_deref(),
                    date: payload.date,
                    category: payload.category,
                };
                let bytes = serde_json::to_vec(&body)
                    .map_err(|e| SyncError::Protocol(format!("failed to encode request: {e}")))?;
                RequestBody::Json(bytes)
            }
        };

        Ok(self.request(Method::Post, &self.expenses_url, token, body))
    }

    fn request(&self, method: Method, url: &str, token: &str, body: RequestBody) -> HttpRequest {
        HttpRequest {
            method,
            url: url.to_string(),
            bearer: token.to_string(),
            body,
            timeout: self.timeout,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: HttpRequest) -> SyncResult<T> {
        let url = request.url.clone();
        let response = self.client.send(request).await.map_err(|failure| match failure {
            ClientFailure::Timeout => SyncError::Timeout,
            ClientFailure::Connect(message) => SyncError::transport_retryable(message),
            ClientFailure::Fatal(message) => SyncError::transport_fatal(message),
        })?;

        if !(200..300).contains(&response.status) {
            tracing::debug!(url = %url, status = response.status, "request failed");
            return Err(SyncError::from_status(response.status, &response.body));
        }

        serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
    }
}

#[async_trait]
impl<C: HttpClient> WriteEndpoint for HttpTransport<C> {
    async fn create_expense(
        &self,
        intent: &WriteIntent,
        token: &str,
    ) -> SyncResult<ConfirmedExpense> {
        let request = self.create_request(intent, token)?;
        self.execute(request).await
    }
}

#[async_trait]
impl<C: HttpClient> ReadEndpoint for HttpTransport<C> {
    async fn list_categories(&self, token: &str) -> SyncResult<Vec<Category>> {
        let request = self.request(Method::Get, &self.categories_url, token, RequestBody::Empty);
        self.execute(request).await
    }

    async fn list_expenses(&self, token: &str) -> SyncResult<Vec<ConfirmedExpense>> {
        let request = self.request(Method::Get, &self.expenses_url, token, RequestBody::Empty);
        self.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use parking_lot::Mutex;
    use spendsync_core::{Attachment, ExpensePayload, TempId};

    struct TestClient {
        response: Mutex<Result<HttpResponse, ClientFailure>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl TestClient {
        fn new() -> Self {
            Self {
                response: Mutex::new(Ok(HttpResponse {
                    status: 200,
                    body: b"[]".to_vec(),
                })),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn respond(&self, status: u16, body: &str) {
            *self.response.lock() = Ok(HttpResponse {
                status,
                body: body.as_bytes().to_vec(),
            });
        }

        fn fail(&self, failure: ClientFailure) {
            *self.response.lock() = Err(failure);
        }
    }

    #[async_trait]
    impl HttpClient for TestClient {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientFailure> {
            self.seen.lock().push(request);
            self.response.lock().clone()
        }
    }

    fn transport() -> HttpTransport<TestClient> {
        HttpTransport::new(&SyncConfig::new("https://api.example.com"), TestClient::new())
    }

    fn intent(payload: ExpensePayload) -> WriteIntent {
        WriteIntent {
            temp_id: TempId::new(1),
            has_attachment: payload.has_attachment(),
            payload,
        }
    }

    fn food_payload() -> ExpensePayload {
        ExpensePayload::new(Amount::from_cents(4250))
            .with_date("2024-01-01".parse().unwrap())
            .with_category(3)
    }

    const CONFIRMED: &str = r#"{"id":99,"transaction_type":"expense","amount":"42.50",
        "description":null,"date":"2024-01-01","category":3,"category_name":"Food",
        "category_icon":"mdi-food","receipt":null}"#;

    #[test]
    fn json_create_request() {
        let request = transport()
            .create_request(&intent(food_payload()), "tok")
            .unwrap();

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url, "https://api.example.com/api/expenses/");
        assert_eq!(request.bearer, "tok");
        let RequestBody::Json(bytes) = request.body else {
            panic!("expected json body");
        };
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["amount"], "42.50");
        assert_eq!(value["category"], 3);
        assert_eq!(value["date"], "2024-01-01");
        assert_eq!(value["transaction_type"], "expense");
        assert!(value.get("description").is_none());
    }

    #[test]
    fn attachment_goes_multipart() {
        let payload = food_payload().with_receipt(Attachment {
            file_name: "r.jpg".into(),
            content_type: "image/jpeg".into(),
            bytes: vec![1, 2, 3],
        });
        let request = transport()
            .create_request(&intent(payload), "tok")
            .unwrap();

        let RequestBody::Multipart(form) = request.body else {
            panic!("expected multipart body");
        };
        assert_eq!(form.field("amount"), Some("42.50"));
        assert_eq!(form.field("date"), Some("2024-01-01"));
        assert_eq!(form.field("category"), Some("3"));
        let file = form.file.unwrap();
        assert_eq!(file.field, "receipt");
        assert_eq!(file.bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn create_decodes_confirmation() {
        let transport = transport();
        transport.client().respond(201, CONFIRMED);

        let confirmed = transport
            .create_expense(&intent(food_payload()), "tok")
            .await
            .unwrap();

        assert_eq!(confirmed.id, 99);
        assert_eq!(confirmed.amount, Amount::from_cents(4250));
        assert_eq!(confirmed.category_name.as_deref(), Some("Food"));
    }

    #[tokio::test]
    async fn statuses_map_to_failure_kinds() {
        let transport = transport();
        let client = transport.client();
        let intent = intent(food_payload());

        for (status, kind) in [
            (401, FailureKind::Authentication),
            (400, FailureKind::Permanent),
            (503, FailureKind::Transient),
        ] {
            client.respond(status, "{}");
            let err = transport.create_expense(&intent, "tok").await.unwrap_err();
            assert_eq!(err.kind(), kind, "status {status}");
        }
    }

    #[tokio::test]
    async fn client_failures_map_to_errors() {
        let transport = transport();
        let client = transport.client();
        let intent = intent(food_payload());

        client.fail(ClientFailure::Timeout);
        assert!(matches!(
            transport.create_expense(&intent, "tok").await,
            Err(SyncError::Timeout)
        ));

        client.fail(ClientFailure::Connect("refused".into()));
        let err = transport.create_expense(&intent, "tok").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn undecodable_success_is_a_protocol_error() {
        let transport = transport();
        transport.client().respond(201, "<html>");

        let err = transport
            .create_expense(&intent(food_payload()), "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[tokio::test]
    async fn list_categories_uses_get() {
        let transport = transport();
        transport
            .client()
            .respond(200, r#"[{"id":3,"name":"Food","type":"expense"}]"#);

        let categories = transport.list_categories("tok").await.unwrap();

        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].icon, "mdi-help-circle");
        let seen = transport.client().seen.lock();
        assert_eq!(seen[0].method, Method::Get);
        assert_eq!(seen[0].url, "https://api.example.com/api/categories/");
        assert_eq!(seen[0].body, RequestBody::Empty);
    }
}
