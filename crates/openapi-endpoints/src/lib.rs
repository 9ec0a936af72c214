//! # openapi-endpoints
//!
//! OpenAPI 3.x and Swagger 2.0 endpoint compiler.
//! Resolves local references, classifies security requirements and turns
//! every reachable operation into a queryable [`Endpoint`].

mod types;
mod error;
mod resolver;
mod security;
mod endpoint;
mod combined;
mod compiler;
mod registry;
mod loader;

pub use types::*;
pub use error::{CompileError, LoadError, LoadResult, ResolveError, ResolveResult, UrlError};
pub use resolver::SchemaResolver;
pub use security::{OAuthEndpoints, SecurityClassifier, SecurityProfile};
pub use endpoint::{
    path_tokens, scalar_to_string, substitute_path, ArgumentLocation, Endpoint,
    InvocableEndpoint, ParameterSchema, RequiredParameters, WHOLE_BODY_ARGUMENT,
};
pub use combined::CombinedEndpoint;
pub use compiler::{DocumentVersion, EndpointCompiler};
pub use registry::{DocumentInfo, EndpointRegistry};
pub use loader::{DocumentLoader, DocumentSource};
