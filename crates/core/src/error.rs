use crate::{ObjectRef, Operation};

/// Errors surfaced by rendering, namespace policy, and reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum TronError {
    #[error("configuration: no templates configured for component type '{component_type}'")]
    Configuration { component_type: String },
    #[error("template '{template}': {reason}")]
    TemplateParse { template: String, reason: String },
    #[error("validation: {0}")]
    Validation(String),
    #[error("cannot {operation} namespace '{namespace}': it is a protected namespace (protected: {protected})")]
    ProtectedNamespace { namespace: String, operation: String, protected: String },
    #[error("cannot delete namespace '{namespace}': not managed by tron (expected prefix '{prefix}')")]
    NotManaged { namespace: String, prefix: String },
    #[error("conflict: {target} still conflicting after {attempts} attempts ({operation})")]
    ConflictExhausted { target: ObjectRef, operation: Operation, attempts: u32 },
    #[error("not_found: cannot update {target}: object does not exist")]
    NotFoundOnUpdate { target: ObjectRef },
    #[error("failed to {operation} {target}: {} {body}", status_label(.status))]
    Transport { target: ObjectRef, operation: Operation, status: Option<u16>, body: String },
}

pub type TronResult<T> = Result<T, TronError>;

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP {}", code),
        None => "transport error".to_string(),
    }
}

impl TronError {
    /// HTTP status carried by cluster-facing errors, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            TronError::Transport { status, .. } => *status,
            TronError::ConflictExhausted { .. } => Some(409),
            TronError::NotFoundOnUpdate { .. } => Some(404),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<&ObjectRef> {
        match self {
            TronError::Transport { target, .. }
            | TronError::ConflictExhausted { target, .. }
            | TronError::NotFoundOnUpdate { target } => Some(target),
            _ => None,
        }
    }
}
