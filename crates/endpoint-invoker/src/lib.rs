//! # endpoint-invoker
//!
//! Validates caller values against a compiled endpoint, builds the HTTP
//! request (URL, headers, query, JSON/form/multipart body), obtains OAuth
//! tokens when the endpoint needs them and dispatches exactly one request.

mod error;
mod request;
mod context;
mod builder;
mod settings;
mod filter;

pub use error::{InvokeError, Result};
pub use request::{FilePart, FormValue, Payload, PreparedRequest, RequestParts};
pub use context::InvocationContext;
pub use builder::RequestBuilder;
pub use settings::{InvokerSettings, OAuthSettings, SettingsManager, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use filter::EndpointFilter;
