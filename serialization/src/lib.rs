//! # formloom-serialization
//!
//! The object-graph ⇄ statement-tree serialization engine behind the
//! formloom designer: persists a live tree of components as a declarative
//! statement/expression tree and reconstructs it later from that tree or
//! from a binary snapshot, preserving property values, nested
//! construction, event bindings, flag combinations, and collection
//! contents — while tolerating partial failure (serialize everything that
//! can be serialized; report the rest).
//!
//! ## Core Types
//!
//! - [`SerializationManager`] / [`SessionGuard`] — the session-scoped
//!   coordinator: name registry, expression-identity cache, diagnostics,
//!   context stack
//! - [`SerializerRegistry`] — (type, kind) → serializer resolution with a
//!   provider chain and per-type overrides
//! - [`serializers`] — the serializer family and the shared
//!   expression/statement interpreter
//! - [`SerializationStore`] — closed, persistable snapshots for copy/paste
//!   and undo, with rename redirection on replay
//! - [`DesignLoader`] — the load / flush / reload lifecycle state machine
//!
//! ## Sessions
//!
//! All per-pass state lives in a session opened with
//! [`SerializationManager::open_session`]; exactly one session may be open
//! per manager, and dropping the [`SessionGuard`] discards every map and
//! cache atomically. The [`SerializationStore`] opens its own session on a
//! fresh manager precisely so closing a store never collides with the
//! surface's session.

mod context;
mod error;
mod format;
mod loader;
mod manager;
mod registry;
pub mod serializers;
mod store;

pub use context::{
    ClassBuildContext, ContextEntry, ExpressionContext, RootContext, StatementContext,
};
pub use error::{SerializationError, SerializationResult};
pub use format::{decode, encode, Format};
pub use loader::{DesignLoader, LoadState, LoaderDelegate, ReloadOptions};
pub use manager::{SerializationManager, SessionEvent, SessionGuard, SessionOptions};
pub use registry::{
    Member, MemberSerializer, RootSerializer, Serializer, SerializerEntry, SerializerKind,
    SerializerOutput, SerializerProvider, SerializerRegistry,
};
pub use serializers::INITIALIZE_METHOD;
pub use store::{SerializationStore, StoreOptions};
