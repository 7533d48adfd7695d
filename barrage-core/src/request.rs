use crate::error::PlanError;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(PlanError::InvalidField {
                field: "method",
                context: "request".to_string(),
                reason: format!("unsupported HTTP method `{s}`"),
            }),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipartField {
    pub name: String,
    pub value: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Multipart(Vec<MultipartField>),
}

/// How a response body is turned into a tree for extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    #[default]
    Json,
    Text,
    /// Keep only the raw bytes.
    None,
}

impl FromStr for ResponseType {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ResponseType::Json),
            "text" => Ok(ResponseType::Text),
            "none" | "raw" => Ok(ResponseType::None),
            _ => Err(PlanError::InvalidField {
                field: "responseType",
                context: "request".to_string(),
                reason: format!("unsupported response type `{s}`"),
            }),
        }
    }
}

/// One concrete HTTP request, owned by exactly one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub target: String,
    pub endpoint: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub path_variables: BTreeMap<String, String>,
    pub body: RequestBody,
    pub response_type: ResponseType,
}

impl ExecutionRequest {
    pub fn new(method: HttpMethod, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            endpoint: String::new(),
            method,
            headers: Vec::new(),
            query: Vec::new(),
            path_variables: BTreeMap::new(),
            body: RequestBody::Empty,
            response_type: ResponseType::Json,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn path_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_variables.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Full URL with `{name}` placeholders in the endpoint replaced by
    /// path variables. Unknown placeholders are left untouched.
    pub fn url(&self) -> String {
        let mut endpoint = self.endpoint.clone();
        for (name, value) in &self.path_variables {
            endpoint = endpoint.replace(&format!("{{{name}}}"), value);
        }
        match (self.target.ends_with('/'), endpoint.starts_with('/')) {
            _ if endpoint.is_empty() => self.target.clone(),
            (true, true) => format!("{}{}", self.target, &endpoint[1..]),
            (false, false) => format!("{}/{}", self.target, endpoint),
            _ => format!("{}{}", self.target, endpoint),
        }
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }
}
