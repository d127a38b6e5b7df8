//! Error types for the serialization engine.
//!
//! Two propagation regimes share one taxonomy: structural protocol
//! violations (double-open, no session, mutating a closed store) are hard
//! `Err` returns, while per-member conditions are recorded into the
//! session's diagnostics via
//! [`SerializationManager::report`](crate::SerializationManager::report)
//! and processing continues with the next sibling.

use formloom_model::ContainerError;
use thiserror::Error;

use crate::registry::SerializerKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SerializationError {
    #[error("no serialization session is active")]
    NoActiveSession,
    #[error("a serialization session is already open")]
    SessionAlreadyOpen,
    #[error("name '{0}' is already bound to a different instance")]
    DuplicateName(String),
    #[error("type '{0}' could not be resolved")]
    TypeResolution(String),
    #[error("no {kind:?} serializer found for type '{type_name}'")]
    MissingSerializer {
        type_name: String,
        kind: SerializerKind,
    },
    #[error("component of type '{0}' has no name or site")]
    UnsitedComponent(String),
    #[error("collection type '{0}' has no compatible add operation")]
    IncompatibleCollection(String),
    #[error("unsupported code node: {0}")]
    UnsupportedNode(String),
    #[error("no matching constructor for type '{0}'")]
    ConstructorNotFound(String),
    #[error("no method '{method}' on type '{type_name}' matching the arguments")]
    MethodNotFound { type_name: String, method: String },
    #[error("failed to construct '{type_name}': {message}")]
    Instantiation { type_name: String, message: String },
    #[error("failed to set property '{property}': {message}")]
    PropertySet { property: String, message: String },
    #[error("the serialization store is closed")]
    StoreClosed,
    #[error("the serialization store has not been closed yet")]
    StoreNotClosed,
    #[error("format error: {0}")]
    Format(String),
    #[error("a different host is already bound to this loader")]
    HostMismatch,
    #[error("the loader has already completed a load")]
    AlreadyLoaded,
    #[error(transparent)]
    Container(#[from] ContainerError),
}

pub type SerializationResult<T> = Result<T, SerializationError>;
