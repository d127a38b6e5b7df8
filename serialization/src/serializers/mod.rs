//! The serializer family.
//!
//! One serializer per category of value, all speaking the same
//! serialize/deserialize contract, resolved through the registry:
//!
//! - [`PrimitiveSerializer`] — literal values
//! - [`FlagsSerializer`] — flag-enum combinations as OR chains
//! - [`CollectionSerializer`] — add-invocation statements per element
//! - [`ComponentSerializer`] — sited components: reference or full form
//! - [`GenericObjectSerializer`] — the no-op fallback
//! - [`PropertySerializer`] / [`EventSerializer`] — member statements
//! - [`ComponentRootSerializer`] — the whole surface as a synthesized type
//! - [`TypeLevelSerializer`] — non-component roots, no field partitioning
//!
//! Deserialization shares the tree-walking [`interpreter`] over
//! expression and statement nodes.

mod collection;
mod component;
mod event;
mod flags;
mod generic;
pub mod interpreter;
mod primitive;
mod property;
mod root;
mod type_level;

use std::sync::Arc;

pub use collection::CollectionSerializer;
pub use component::ComponentSerializer;
pub use event::EventSerializer;
pub use flags::FlagsSerializer;
pub use generic::GenericObjectSerializer;
pub use primitive::PrimitiveSerializer;
pub use property::PropertySerializer;
pub use root::{ComponentRootSerializer, INITIALIZE_METHOD};
pub use type_level::TypeLevelSerializer;

use formloom_model::{ObjectHandle, TypeInfo};

use crate::manager::SerializationManager;
use crate::registry::{Member, MemberSerializer, SerializerEntry, SerializerKind, SerializerProvider};

const PRIMITIVE_TYPE_NAMES: &[&str] =
    &["null", "bool", "i64", "u64", "f64", "string", "bytes", "list"];

/// Dispatches member serialization to the property or event serializer by
/// descriptor kind.
pub struct MemberDispatchSerializer {
    property: PropertySerializer,
    event: EventSerializer,
}

impl MemberDispatchSerializer {
    pub fn new() -> Self {
        Self {
            property: PropertySerializer,
            event: EventSerializer,
        }
    }
}

impl Default for MemberDispatchSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemberSerializer for MemberDispatchSerializer {
    fn should_serialize(
        &self,
        manager: &SerializationManager,
        owner: &ObjectHandle,
        member: &Member<'_>,
        absolute: bool,
    ) -> bool {
        match member {
            Member::Property(_) => self.property.should_serialize(manager, owner, member, absolute),
            Member::Event(_) => self.event.should_serialize(manager, owner, member, absolute),
        }
    }

    fn serialize_member(
        &self,
        manager: &SerializationManager,
        owner: &ObjectHandle,
        member: &Member<'_>,
        absolute: bool,
    ) {
        match member {
            Member::Property(_) => self.property.serialize_member(manager, owner, member, absolute),
            Member::Event(_) => self.event.serialize_member(manager, owner, member, absolute),
        }
    }
}

/// The built-in provider at the end of every chain. Maps type capabilities
/// to the family: flag tables to the flags serializer, item enumerators to
/// the collection serializer, components to the component serializer,
/// builtins to the primitive serializer. Types it does not recognize get
/// no serializer — that absence is the caller's
/// [`MissingSerializer`](crate::SerializationError::MissingSerializer)
/// diagnostic.
pub struct DefaultSerializerProvider {
    primitive: Arc<PrimitiveSerializer>,
    flags: Arc<FlagsSerializer>,
    collection: Arc<CollectionSerializer>,
    component: Arc<ComponentSerializer>,
    member: Arc<MemberDispatchSerializer>,
    root: Arc<ComponentRootSerializer>,
    type_level: Arc<TypeLevelSerializer>,
}

impl DefaultSerializerProvider {
    pub fn new() -> Self {
        Self {
            primitive: Arc::new(PrimitiveSerializer),
            flags: Arc::new(FlagsSerializer),
            collection: Arc::new(CollectionSerializer),
            component: Arc::new(ComponentSerializer),
            member: Arc::new(MemberDispatchSerializer::new()),
            root: Arc::new(ComponentRootSerializer),
            type_level: Arc::new(TypeLevelSerializer::new()),
        }
    }
}

impl Default for DefaultSerializerProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializerProvider for DefaultSerializerProvider {
    fn provide(
        &self,
        _manager: &SerializationManager,
        ty: &Arc<TypeInfo>,
        kind: SerializerKind,
    ) -> Option<SerializerEntry> {
        match kind {
            SerializerKind::Root => Some(if ty.is_component() {
                SerializerEntry::Root(self.root.clone())
            } else {
                SerializerEntry::Root(self.type_level.clone())
            }),
            SerializerKind::Member => Some(SerializerEntry::Member(self.member.clone())),
            SerializerKind::Object => {
                if ty.flags().is_some() {
                    Some(SerializerEntry::Object(self.flags.clone()))
                } else if ty.is_collection() {
                    Some(SerializerEntry::Object(self.collection.clone()))
                } else if ty.is_component() {
                    Some(SerializerEntry::Object(self.component.clone()))
                } else if PRIMITIVE_TYPE_NAMES.contains(&ty.name()) {
                    Some(SerializerEntry::Object(self.primitive.clone()))
                } else {
                    None
                }
            }
        }
    }
}
