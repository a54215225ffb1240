pub mod assertion;
pub mod auth;
pub mod functions;
pub mod json_path;
pub mod orchestrator;
pub mod request_builder;
pub mod resolver;
pub mod transport;

pub use assertion::validate_all_assertions;
pub use auth::{AuthService, Claims};
pub use orchestrator::{EnvironmentStatus, Orchestrator, Readiness, VariablePreview};
pub use request_builder::{build_request, BuildError};
pub use resolver::{
    extract_variables, validate_variables, ScopeContext, ScopeSnapshot, VariableResolver,
    VariableValidation,
};
pub use transport::{HttpTransport, TransportError};
