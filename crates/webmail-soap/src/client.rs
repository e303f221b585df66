//! SOAP client and envelope handling.

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fault::Fault;
use crate::upload::{UploadedFile, parse_upload_reply};

/// Namespace of the envelope context header.
const ACCOUNT_NAMESPACE: &str = "urn:zimbra";

/// Cookie carrying the session token on the upload endpoint.
const AUTH_COOKIE: &str = "ZM_AUTH_TOKEN";

/// Mail server connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the mail server, e.g. `https://mail.example.com`.
    pub base_url: String,
    /// Session auth token issued by the host shell.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl ServerConfig {
    /// Creates a configuration for the given server.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
        }
    }

    /// Sets the auth token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Client for the mail server's JSON SOAP endpoint.
#[derive(Debug, Clone)]
pub struct SoapClient {
    config: ServerConfig,
    http_client: Client,
}

impl SoapClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not an absolute http(s) URL.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let url = reqwest::Url::parse(&config.base_url).map_err(|e| Error::Url(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Url(format!("unsupported scheme: {}", url.scheme())));
        }

        Ok(Self {
            config,
            http_client: Client::new(),
        })
    }

    /// Returns the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Issues `<method>Request` and decodes `<method>Response`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Fault` when the server answers with a fault,
    /// `Error::Http` on transport failures, and `Error::Json` or
    /// `Error::InvalidResponse` when the reply cannot be decoded.
    pub async fn request<Req, Resp>(&self, method: &str, namespace: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let payload = envelope(method, namespace, self.config.auth_token.as_deref(), body)?;
        let url = self.endpoint(&format!("service/soap/{method}Request"));

        debug!(method, "Sending SOAP request");
        let response = self.http_client.post(url).json(&payload).send().await?;
        let status = response.status();

        // Faults come back with HTTP 500, so decode the body regardless of status.
        let value: Value = response.json().await?;
        let result = parse_response(method, value);
        if let Err(Error::Fault(fault)) = &result {
            warn!(method, status = status.as_u16(), code = %fault.error_code, "SOAP fault");
        }
        result
    }

    /// Uploads a file to the upload endpoint and returns its attachment id.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails or the server rejects the file.
    pub async fn upload(
        &self,
        filename: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<UploadedFile> {
        let part = Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let form = Form::new().part("file", part);

        let mut request = self
            .http_client
            .post(self.endpoint("service/upload?fmt=extended,raw"))
            .multipart(form);
        if let Some(token) = &self.config.auth_token {
            request = request.header(reqwest::header::COOKIE, format!("{AUTH_COOKIE}={token}"));
        }

        debug!(filename, "Uploading attachment");
        let response = request.send().await?;
        let text = response.text().await?;

        parse_upload_reply(&text)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("upload reply listed no files".into()))
    }
}

/// Builds a request envelope.
///
/// # Errors
///
/// Returns an error if `body` does not serialize to a JSON object.
pub fn envelope<Req: Serialize>(
    method: &str,
    namespace: &str,
    auth_token: Option<&str>,
    body: &Req,
) -> Result<Value> {
    let mut request = match serde_json::to_value(body)? {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(Error::InvalidResponse(format!(
                "request body must be an object, got {other}"
            )));
        }
    };
    request.insert("_jsns".into(), Value::String(namespace.into()));

    let mut context = Map::new();
    context.insert("_jsns".into(), Value::String(ACCOUNT_NAMESPACE.into()));
    if let Some(token) = auth_token {
        context.insert("authToken".into(), Value::String(token.into()));
    }

    let mut body = Map::new();
    body.insert(format!("{method}Request"), Value::Object(request));

    Ok(json!({
        "Header": { "context": context },
        "Body": body,
    }))
}

/// Extracts `Body.<method>Response` from a reply envelope.
///
/// # Errors
///
/// Returns `Error::Fault` for fault replies and `Error::InvalidResponse` when
/// the expected response element is missing.
pub fn parse_response<Resp: DeserializeOwned>(method: &str, mut value: Value) -> Result<Resp> {
    let Some(body) = value.get_mut("Body") else {
        return Err(Error::InvalidResponse("missing Body".into()));
    };

    if let Some(fault) = body.get("Fault") {
        return Err(Error::Fault(Fault::from_json(fault)));
    }

    let key = format!("{method}Response");
    let response = body
        .get_mut(&key)
        .map(Value::take)
        .ok_or_else(|| Error::InvalidResponse(format!("missing {key}")))?;

    Ok(serde_json::from_value(response)?)
}
