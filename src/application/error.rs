use std::error::Error as StdError;
use std::process::ExitCode;

use patisserie_records::RecordId;
use serde::Serialize;
use thiserror::Error;

use crate::{
    application::gateway::GatewayError, config::LoadError, domain::entities::EntityKind,
    domain::error::DomainError, infra::error::InfraError,
};

/// Terminal failure of one mutation. Stored on the mutation record and handed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("validation failed: {message}")]
    Validation { message: String },
    #[error("a mutation for {entity} {} is already pending", target_label(.target))]
    Conflict {
        entity: EntityKind,
        target: Option<RecordId>,
    },
    #[error("{failed} of {total} uploads failed: {message}")]
    Upload {
        failed: usize,
        total: usize,
        message: String,
    },
    #[error("backend rejected the write: {message}")]
    Persistence { message: String },
    #[error("network failure: {message}")]
    Network { message: String },
}

fn target_label(target: &Option<RecordId>) -> String {
    target
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "(new)".to_string())
}

impl MutationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MutationError::Validation { .. } => "validation",
            MutationError::Conflict { .. } => "conflict",
            MutationError::Upload { .. } => "upload",
            MutationError::Persistence { .. } => "persistence",
            MutationError::Network { .. } => "network",
        }
    }

    /// Whether the user can fix the cause locally before retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MutationError::Validation { .. } | MutationError::Conflict { .. }
        )
    }
}

impl From<DomainError> for MutationError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation { message } => MutationError::Validation { message },
            DomainError::Invariant { message } => MutationError::Validation { message },
        }
    }
}

impl From<GatewayError> for MutationError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::Network(message) => MutationError::Network { message },
            GatewayError::Timeout => MutationError::Network {
                message: GatewayError::Timeout.to_string(),
            },
            GatewayError::Rejected { message, .. } => MutationError::Persistence { message },
            other => MutationError::Persistence {
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    #[error("Invalid email or password.")]
    InvalidCredentials,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session store is already listening to auth events")]
    AlreadyListening,
}

/// Serializable error chain printed by the console.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("admin access requires a signed-in user")]
    Forbidden,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Mutation(MutationError::Validation { .. })
            | AppError::InvalidInput(_) => ExitCode::from(2),
            AppError::Forbidden | AppError::Login(LoginError::InvalidCredentials) => {
                ExitCode::from(3)
            }
            AppError::Gateway(GatewayError::NotFound) => ExitCode::from(4),
            AppError::Mutation(MutationError::Conflict { .. }) => ExitCode::from(5),
            AppError::Config(_) | AppError::Infra(_) => ExitCode::from(78),
            _ => ExitCode::FAILURE,
        }
    }

    pub fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Mutation(MutationError::Validation { .. })
            | AppError::InvalidInput(_) => "Request could not be processed",
            AppError::Forbidden | AppError::Login(_) | AppError::Session(_) => {
                "Authentication required"
            }
            AppError::Gateway(GatewayError::NotFound) => "Resource not found",
            AppError::Gateway(_)
            | AppError::Mutation(MutationError::Network { .. })
            | AppError::Mutation(MutationError::Persistence { .. })
            | AppError::Mutation(MutationError::Upload { .. }) => "Backend request failed",
            AppError::Mutation(MutationError::Conflict { .. }) => "Another save is in progress",
            AppError::Config(_) | AppError::Infra(_) => "Console misconfigured",
            AppError::Domain(DomainError::Invariant { .. }) | AppError::Unexpected(_) => {
                "Unexpected error occurred"
            }
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}
