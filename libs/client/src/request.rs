//! Request values sent through the [`ApiClient`](crate::ApiClient)
//!
//! An [`ApiRequest`] describes a call independently of any transport
//! object, so it can be rebuilt for a retry. Retrying yields a new value
//! with a higher `retry_count` instead of flagging the original.

use reqwest::{Method, RequestBuilder, multipart};
use serde::Serialize;

use crate::{error::ClientError, http::endpoint, receipt::ReceiptFile};

/// How many times a request is resent after a `401` and a successful
/// refresh.
pub const MAX_AUTH_RETRIES: u8 = 1;

#[derive(Debug, Clone)]
enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Receipt {
        fields: Vec<(String, String)>,
        receipt: ReceiptFile,
    },
}

/// One API call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: RequestBody,
    retry_count: u8,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
            retry_count: 0,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach a multipart body made of text `fields` plus the receipt file
    /// under the `receipt` part name.
    pub fn receipt(mut self, fields: Vec<(String, String)>, receipt: ReceiptFile) -> Self {
        self.body = RequestBody::Receipt { fields, receipt };
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }

    /// The same request, marked as one more retry.
    pub fn retried(self) -> Self {
        Self {
            retry_count: self.retry_count.saturating_add(1),
            ..self
        }
    }

    pub(crate) fn build(
        &self,
        http: &reqwest::Client,
        base_url: &str,
        access_token: Option<&str>,
    ) -> Result<RequestBuilder, ClientError> {
        let mut builder = http.request(self.method.clone(), endpoint(base_url, &self.path));

        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }

        builder = match &self.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Receipt { fields, receipt } => {
                let mut form = multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                builder.multipart(form.part("receipt", receipt.to_part()?))
            }
        };

        Ok(builder)
    }
}
