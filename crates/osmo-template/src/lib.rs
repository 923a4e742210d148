//! Sandboxed Template Renderer (spec §4.2).
//!
//! Expands user-supplied workflow templates behind a pool of isolated
//! workers with CPU-wall-clock and memory caps, so a malicious or buggy
//! template cannot block or starve the control plane it renders inside.

pub mod pool;
pub mod sandbox;
pub mod worker;

pub use pool::{RenderCaps, TemplateRenderer};
pub use sandbox::merge_variables;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template render exceeded {0:?}")]
    Timeout(std::time::Duration),
    #[error("template render exceeded memory limit of {0} bytes")]
    Memory(u64),
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("forbidden construct: {0}")]
    Forbidden(String),
    #[error("template syntax error: {0}")]
    Syntax(String),
    #[error("worker crashed after {0} retries")]
    WorkerExhausted(u32),
    #[error("renderer internal error: {0}")]
    Internal(String),
}

impl From<TemplateError> for osmo_types::OsmoError {
    fn from(err: TemplateError) -> Self {
        use osmo_types::ErrorKind;
        let kind = match &err {
            TemplateError::UndefinedVariable(_) | TemplateError::Syntax(_) => ErrorKind::Usage,
            TemplateError::Forbidden(_) => ErrorKind::UserInput,
            TemplateError::Timeout(_) | TemplateError::Memory(_) => ErrorKind::Resource,
            TemplateError::WorkerExhausted(_) | TemplateError::Internal(_) => ErrorKind::Server,
        };
        osmo_types::OsmoError::new(kind, err.to_string())
    }
}
