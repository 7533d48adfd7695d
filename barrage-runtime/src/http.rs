//! reqwest-backed [`RequestExecutor`].

use crate::config::HttpConfig;
use async_trait::async_trait;
use barrage_core::{
    ExecutionRequest, HttpMethod, HttpResponse, RequestBody, RequestExecutor, TransportError,
};
use reqwest::{multipart, Client, Method};

#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: Client,
}

impl ReqwestExecutor {
    pub fn new(config: &HttpConfig) -> anyhow::Result<Self> {
        tracing::debug!(
            timeout_ms = config.timeout.as_millis() as u64,
            verify_tls = config.verify_tls,
            "creating HTTP client"
        );
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_tls)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;
        Ok(Self { client })
    }

    /// Shares an existing client, e.g. across leaves of one run.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
    }
}

#[async_trait]
impl RequestExecutor for ReqwestExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url();
        let mut builder = self.client.request(method(request.method), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::Form(fields) => builder.form(&fields),
            RequestBody::Multipart(fields) => {
                let mut form = multipart::Form::new();
                for field in fields {
                    let part = multipart::Part::text(field.value);
                    let part = match field.file_name {
                        Some(file_name) => part.file_name(file_name),
                        None => part,
                    };
                    form = form.part(field.name, part);
                }
                builder.multipart(form)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::ReadBody(e.to_string()))?;
        tracing::trace!(%url, status, bytes = body.len(), "response received");
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method as http_method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_execute_json_request() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path("/users/42"))
            .and(query_param("verbose", "1"))
            .and(header("x-run", "smoke"))
            .and(body_json(json!({"name": "ada"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let executor = ReqwestExecutor::new(&HttpConfig::default()).unwrap();
        let mut request = ExecutionRequest::new(HttpMethod::Post, server.uri())
            .endpoint("/users/{id}")
            .path_variable("id", "42")
            .header("x-run", "smoke")
            .body(RequestBody::Json(json!({"name": "ada"})));
        request.query.push(("verbose".into(), "1".into()));

        let response = executor.execute(request).await.unwrap();
        assert_eq!(response.status, 201);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_connection_failure_is_send_error() {
        let executor = ReqwestExecutor::new(&HttpConfig::default()).unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let request = ExecutionRequest::new(HttpMethod::Get, format!("http://{addr}"));
        assert!(matches!(
            executor.execute(request).await,
            Err(TransportError::Send(_))
        ));
    }
}
