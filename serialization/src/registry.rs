//! Serializer resolution: traits, the typed registry, and the provider
//! chain.
//!
//! Resolution for a `(type, kind)` pair goes through
//! [`SerializationManager::serializer_for`](crate::SerializationManager::serializer_for):
//! session cache, then the type's lazily-installed provider override, then
//! the type's directly-registered serializer, then the ordered provider
//! chain with the built-in default provider last.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use formloom_codemodel::{CodeNode, TypeDecl};
use formloom_model::{EventInfo, ObjectHandle, PropertyInfo, PropertyValue, TypeInfo};
use parking_lot::RwLock;

use crate::manager::SerializationManager;
use crate::serializers::DefaultSerializerProvider;

/// Which registry partition resolves a type to a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SerializerKind {
    /// Whole-object serialization.
    Object,
    /// Individual property/event members.
    Member,
    /// The top-level object of a surface.
    Root,
}

/// What a whole-object serializer produced.
#[derive(Clone, Debug)]
pub enum SerializerOutput {
    /// Nothing; the value does not serialize.
    Empty,
    /// The value is fully described by one expression.
    Expression(formloom_codemodel::Expression),
    /// The value required statements (construction, member assignments).
    Statements(Vec<formloom_codemodel::Statement>),
}

impl SerializerOutput {
    pub fn is_empty(&self) -> bool {
        matches!(self, SerializerOutput::Empty)
    }
}

/// Whole-object serializer contract.
pub trait Serializer: Send + Sync {
    fn serialize(&self, manager: &SerializationManager, value: &PropertyValue) -> SerializerOutput;

    fn deserialize(&self, manager: &SerializationManager, node: &CodeNode) -> PropertyValue;
}

/// A member descriptor handed to member serializers.
#[derive(Clone, Copy)]
pub enum Member<'a> {
    Property(&'a PropertyInfo),
    Event(&'a EventInfo),
}

impl Member<'_> {
    pub fn name(&self) -> &str {
        match self {
            Member::Property(p) => p.name(),
            Member::Event(e) => e.name(),
        }
    }
}

/// Member (property/event) serializer contract. Produced statements are
/// appended to the ambient statement context.
pub trait MemberSerializer: Send + Sync {
    fn should_serialize(
        &self,
        manager: &SerializationManager,
        owner: &ObjectHandle,
        member: &Member<'_>,
        absolute: bool,
    ) -> bool;

    fn serialize_member(
        &self,
        manager: &SerializationManager,
        owner: &ObjectHandle,
        member: &Member<'_>,
        absolute: bool,
    );
}

/// Root serializer contract: a whole surface in, a synthesized type out.
pub trait RootSerializer: Send + Sync {
    fn serialize_root(&self, manager: &SerializationManager, root: &ObjectHandle)
        -> Option<TypeDecl>;

    fn deserialize_root(
        &self,
        manager: &SerializationManager,
        decl: &TypeDecl,
    ) -> Option<ObjectHandle>;
}

/// A resolved serializer, tagged by partition.
#[derive(Clone)]
pub enum SerializerEntry {
    Object(Arc<dyn Serializer>),
    Member(Arc<dyn MemberSerializer>),
    Root(Arc<dyn RootSerializer>),
}

impl SerializerEntry {
    pub fn kind(&self) -> SerializerKind {
        match self {
            SerializerEntry::Object(_) => SerializerKind::Object,
            SerializerEntry::Member(_) => SerializerKind::Member,
            SerializerEntry::Root(_) => SerializerKind::Root,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<dyn Serializer>> {
        match self {
            SerializerEntry::Object(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_member(&self) -> Option<&Arc<dyn MemberSerializer>> {
        match self {
            SerializerEntry::Member(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_root(&self) -> Option<&Arc<dyn RootSerializer>> {
        match self {
            SerializerEntry::Root(s) => Some(s),
            _ => None,
        }
    }
}

/// Pluggable serializer source consulted during resolution.
pub trait SerializerProvider: Send + Sync {
    fn provide(
        &self,
        manager: &SerializationManager,
        ty: &Arc<TypeInfo>,
        kind: SerializerKind,
    ) -> Option<SerializerEntry>;
}

#[derive(Default)]
struct RegistryInner {
    providers: Vec<Arc<dyn SerializerProvider>>,
    type_serializers: HashMap<(TypeId, SerializerKind), SerializerEntry>,
    type_providers: HashMap<TypeId, Arc<dyn SerializerProvider>>,
}

/// The manager-owned registry: registered providers plus per-type
/// overrides, populated at startup.
pub struct SerializerRegistry {
    inner: RwLock<RegistryInner>,
    fallback: Arc<dyn SerializerProvider>,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            fallback: Arc::new(DefaultSerializerProvider::new()),
        }
    }

    /// Append a provider to the chain. Providers are consulted in
    /// registration order, ahead of the built-in default provider.
    pub fn add_provider(&self, provider: Arc<dyn SerializerProvider>) {
        self.inner.write().providers.push(provider);
    }

    /// Directly name the serializer for a `(type, kind)` pair — the
    /// per-type override consulted before the provider chain.
    pub fn set_type_serializer(&self, type_id: TypeId, kind: SerializerKind, entry: SerializerEntry) {
        self.inner
            .write()
            .type_serializers
            .insert((type_id, kind), entry);
    }

    /// Attach a provider that is lazily installed into the session's chain
    /// the first time the type is resolved.
    pub fn set_type_provider(&self, type_id: TypeId, provider: Arc<dyn SerializerProvider>) {
        self.inner.write().type_providers.insert(type_id, provider);
    }

    pub fn providers(&self) -> Vec<Arc<dyn SerializerProvider>> {
        self.inner.read().providers.clone()
    }

    pub fn type_serializer(&self, type_id: TypeId, kind: SerializerKind) -> Option<SerializerEntry> {
        self.inner
            .read()
            .type_serializers
            .get(&(type_id, kind))
            .cloned()
    }

    pub fn type_provider(&self, type_id: TypeId) -> Option<Arc<dyn SerializerProvider>> {
        self.inner.read().type_providers.get(&type_id).cloned()
    }

    pub fn fallback(&self) -> Arc<dyn SerializerProvider> {
        self.fallback.clone()
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
