//! Turn an endpoint plus caller values into one HTTP request

use indexmap::IndexMap;
use openapi_endpoints::{
    scalar_to_string, ArgumentLocation, HttpMethod, InvocableEndpoint, ParameterLocation,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::context::InvocationContext;
use crate::error::{InvokeError, Result};
use crate::request::{
    find_header, push_pairs, remove_header, set_header, FormValue, Payload, PreparedRequest,
    RequestParts,
};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Builds and sends requests for a single endpoint
pub struct RequestBuilder<'a, E: InvocableEndpoint + ?Sized> {
    endpoint: &'a E,
    context: &'a InvocationContext,
}

impl<'a, E: InvocableEndpoint + ?Sized> RequestBuilder<'a, E> {
    pub fn new(endpoint: &'a E, context: &'a InvocationContext) -> Self {
        Self { endpoint, context }
    }

    pub fn endpoint(&self) -> &E {
        self.endpoint
    }

    /// Validate, build and send a request from separated values
    pub async fn invoke(&self, parts: RequestParts) -> Result<Response> {
        let prepared = self.prepare(parts).await?;
        self.dispatch(prepared).await
    }

    /// Split a merged argument object, then invoke. `base` carries the
    /// values that are not arguments (token, server URL, extra headers).
    pub async fn invoke_with_args(
        &self,
        args: Map<String, Value>,
        base: RequestParts,
    ) -> Result<Response> {
        let parts = self.split_arguments(args, base);
        self.invoke(parts).await
    }

    /// Sort merged arguments into path, query, header, form and body values
    pub fn split_arguments(&self, args: Map<String, Value>, mut parts: RequestParts) -> RequestParts {
        let mut body_object = Map::new();
        let mut whole_body = None;

        for (name, value) in args {
            match self.endpoint.locate_argument(&name) {
                Some(ArgumentLocation::Parameter(ParameterLocation::Path)) => {
                    parts.path.insert(name, value);
                }
                Some(ArgumentLocation::Parameter(ParameterLocation::Query)) => {
                    parts.query.insert(name, value);
                }
                Some(ArgumentLocation::Parameter(ParameterLocation::Header)) => {
                    parts.headers.insert(name, scalar_to_string(&value));
                }
                Some(ArgumentLocation::Parameter(ParameterLocation::Form)) => {
                    parts.form.insert(name, FormValue::from_json(value));
                }
                Some(ArgumentLocation::BodyProperty) => {
                    body_object.insert(name, value);
                }
                Some(ArgumentLocation::WholeBody) => whole_body = Some(value),
                None if self.endpoint.has_request_body() => {
                    body_object.insert(name, value);
                }
                None if self.endpoint.has_form_parameters() => {
                    parts.form.insert(name, FormValue::from_json(value));
                }
                None => debug!(
                    "Dropping argument '{}' not accepted by {}",
                    name,
                    self.endpoint.operation_id()
                ),
            }
        }

        if whole_body.is_some() {
            parts.body = whole_body;
        } else if !body_object.is_empty() {
            parts.body = match parts.body.take() {
                Some(Value::Object(mut existing)) => {
                    existing.extend(body_object);
                    Some(Value::Object(existing))
                }
                _ => Some(Value::Object(body_object)),
            };
        }
        parts
    }

    /// Check required values, resolve the URL, attach credentials and encode
    /// the payload. Nothing is sent.
    pub async fn prepare(&self, parts: RequestParts) -> Result<PreparedRequest> {
        self.validate(&parts)?;

        let url = self
            .endpoint
            .full_url(parts.server_url.as_deref(), &parts.path)?;

        let mut headers = parts.headers.clone();
        self.authorize(&parts, &mut headers).await?;

        let declared = self.endpoint.request_content_types();
        let body_expected = parts.body.is_some()
            || !parts.form.is_empty()
            || self.endpoint.required_parameters().body;
        if body_expected && find_header(&headers, "Content-Type").is_none() {
            if let Some(first) = declared.first() {
                headers.insert("Content-Type".to_string(), first.clone());
            }
        }

        let content_type = find_header(&headers, "Content-Type").map(media_type);
        let payload = encode_payload(content_type.as_deref(), parts.body, parts.form);
        if let Payload::Form { multipart: true, .. } = &payload {
            remove_header(&mut headers, "Content-Type");
        }

        let mut query = Vec::new();
        for (name, value) in &parts.query {
            push_pairs(&mut query, name, value);
        }

        Ok(PreparedRequest {
            method: self.endpoint.method(),
            url,
            headers,
            query,
            payload,
            timeout: parts.timeout.or(self.context.default_timeout()),
        })
    }

    /// Required path, query, header and form values, then the body
    pub fn validate(&self, parts: &RequestParts) -> Result<()> {
        let required = self.endpoint.required_parameters();

        if let Some(name) = required.path.iter().find(|name| !parts.path.contains_key(*name)) {
            return Err(InvokeError::MissingPathParameter(name.clone()));
        }
        if let Some(name) = required.query.iter().find(|name| !parts.query.contains_key(*name)) {
            return Err(InvokeError::MissingQueryParameter(name.clone()));
        }
        if let Some(name) = required
            .header
            .iter()
            .find(|name| parts.find_header(name).is_none())
        {
            return Err(InvokeError::MissingHeaderParameter(name.clone()));
        }

        let body_object = match &parts.body {
            Some(Value::Object(object)) if parts.form.is_empty() => Some(object),
            _ => None,
        };
        if let Some(name) = required.form.iter().find(|name| {
            !parts.form.contains_key(*name)
                && !body_object.is_some_and(|object| object.contains_key(*name))
        }) {
            return Err(InvokeError::MissingFormParameter(name.clone()));
        }

        if required.body && parts.body.is_none() {
            return Err(InvokeError::MissingRequestBody);
        }
        Ok(())
    }

    async fn authorize(
        &self,
        parts: &RequestParts,
        headers: &mut IndexMap<String, String>,
    ) -> Result<()> {
        let needs_bearer = self.endpoint.requires_bearer_auth();
        let needs_oauth = self.endpoint.requires_oauth();
        if !needs_bearer && !needs_oauth {
            return Ok(());
        }

        let token = match &parts.bearer_token {
            Some(token) => Some(token.clone()),
            None if needs_oauth => {
                self.context
                    .oauth_token(self.endpoint.oauth_scopes())
                    .await?
            }
            None => None,
        };

        match token {
            Some(token) => set_header(headers, "Authorization", format!("Bearer {}", token)),
            None if needs_bearer => return Err(InvokeError::MissingBearerToken),
            None => debug!(
                "No token available for {}, sending without Authorization",
                self.endpoint.operation_id()
            ),
        }
        Ok(())
    }

    /// Send exactly one request. Non-2xx responses are returned as-is.
    pub async fn dispatch(&self, prepared: PreparedRequest) -> Result<Response> {
        let method = to_reqwest_method(prepared.method);
        let headers = header_map(&prepared.headers)?;

        info!(
            "Executing {} {} ({})",
            method,
            prepared.url,
            self.endpoint.operation_id()
        );

        let mut request = self
            .context
            .http()
            .request(method, &prepared.url)
            .headers(headers);

        if !prepared.query.is_empty() {
            request = request.query(&prepared.query);
        }
        if let Some(timeout) = prepared.timeout {
            request = request.timeout(timeout);
        }

        request = match prepared.payload {
            Payload::None => request,
            Payload::Json(body) => request.json(&body),
            Payload::Raw(body) => request.body(body),
            Payload::Form {
                data,
                multipart: false,
                ..
            } => request.form(&data),
            Payload::Form { data, files, .. } => {
                let mut form = Form::new();
                for (name, value) in data {
                    form = form.text(name, value);
                }
                for (name, file) in files {
                    let part = Part::bytes(file.content)
                        .file_name(file.filename)
                        .mime_str(&file.media_type)?;
                    form = form.part(name, part);
                }
                request.multipart(form)
            }
        };

        let response = request.send().await?;
        debug!("Response status: {}", response.status());
        Ok(response)
    }
}

/// `type/subtype` without parameters, lowercased
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_json(media_type: &str) -> bool {
    media_type == "application/json" || media_type.ends_with("+json")
}

fn encode_payload(
    content_type: Option<&str>,
    body: Option<Value>,
    form: IndexMap<String, FormValue>,
) -> Payload {
    match content_type {
        Some(media) if is_json(media) => {
            if !form.is_empty() {
                warn!(
                    "Content type {} takes a JSON body; dropping form fields: {}",
                    media,
                    form.keys().cloned().collect::<Vec<_>>().join(", ")
                );
            }
            body.map_or(Payload::None, Payload::Json)
        }
        Some(media) if media == FORM_URLENCODED || media.starts_with("multipart/") => {
            encode_form(form, body, media.starts_with("multipart/"))
        }
        Some(_) => match body {
            Some(Value::String(text)) => Payload::Raw(text),
            Some(other) => Payload::Raw(other.to_string()),
            None => Payload::None,
        },
        None => match body {
            Some(body) => Payload::Json(body),
            None if !form.is_empty() => encode_form(form, None, false),
            None => Payload::None,
        },
    }
}

/// Form fields come from the form values, or from an object body when no
/// form values were given. Any file forces multipart.
fn encode_form(form: IndexMap<String, FormValue>, body: Option<Value>, multipart: bool) -> Payload {
    let fields: Vec<(String, FormValue)> = if !form.is_empty() {
        form.into_iter().collect()
    } else {
        match body {
            Some(Value::Object(object)) => object
                .into_iter()
                .map(|(name, value)| (name, FormValue::from_json(value)))
                .collect(),
            Some(Value::String(text)) => return Payload::Raw(text),
            Some(other) => return Payload::Raw(other.to_string()),
            None => return Payload::None,
        }
    };

    let mut data = Vec::new();
    let mut files = Vec::new();
    for (name, value) in fields {
        match value {
            FormValue::File(file) => files.push((name, file)),
            FormValue::Text(value) => push_pairs(&mut data, &name, &value),
        }
    }

    let multipart = multipart || !files.is_empty();
    Payload::Form {
        data,
        files,
        multipart,
    }
}

fn header_map(headers: &IndexMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| InvokeError::InvalidHeader(format!("name '{}': {}", name, e)))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| InvokeError::InvalidHeader(format!("value for '{}': {}", name, e)))?;
        if header_name == CONTENT_TYPE {
            map.insert(header_name, header_value);
        } else {
            map.append(header_name, header_value);
        }
    }
    Ok(map)
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
        HttpMethod::Trace => reqwest::Method::TRACE,
    }
}
