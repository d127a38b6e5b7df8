//! Abstract collaborator services consumed by the engine, with in-memory
//! default implementations.
//!
//! Hosts swap these out to integrate with a real designer shell; the
//! defaults are complete enough for tests and headless use.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::container::{Container, ContainerError};
use crate::object::ObjectId;
use crate::typeinfo::{TypeInfo, TypeRegistry};

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// Creates and validates component names.
pub trait NameCreationService: Send + Sync {
    /// Produce a fresh name for a new component of `ty` in `container`.
    fn create_name(&self, container: &Container, ty: &TypeInfo) -> String;

    fn is_valid_name(&self, name: &str) -> bool;

    fn validate_name(&self, name: &str) -> Result<(), ContainerError> {
        if self.is_valid_name(name) {
            Ok(())
        } else {
            Err(ContainerError::InvalidName(name.to_owned()))
        }
    }
}

/// Counter-based naming: lowercased type name plus the first free index.
pub struct DefaultNameCreation;

impl NameCreationService for DefaultNameCreation {
    fn create_name(&self, container: &Container, ty: &TypeInfo) -> String {
        let stem = ty.name().to_lowercase();
        let mut index = 1;
        loop {
            let candidate = format!("{stem}{index}");
            if !container.contains(&candidate) {
                return candidate;
            }
            index += 1;
        }
    }

    fn is_valid_name(&self, name: &str) -> bool {
        !name.is_empty()
            && name.split('.').all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .next()
                        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                    && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            })
    }
}

// ---------------------------------------------------------------------------
// Type resolution
// ---------------------------------------------------------------------------

/// Resolves type names to metadata.
pub trait TypeResolutionService: Send + Sync {
    fn get_type(&self, name: &str) -> Option<Arc<TypeInfo>>;
}

/// The default resolution service: a straight registry lookup.
pub struct RegistryTypeResolution {
    registry: Arc<TypeRegistry>,
}

impl RegistryTypeResolution {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }
}

impl TypeResolutionService for RegistryTypeResolution {
    fn get_type(&self, name: &str) -> Option<Arc<TypeInfo>> {
        self.registry.get(name)
    }
}

// ---------------------------------------------------------------------------
// Event binding
// ---------------------------------------------------------------------------

/// Stores which handler method name is bound to each (instance, event)
/// pair.
pub trait EventBindingService: Send + Sync {
    fn handler_of(&self, instance: ObjectId, event: &str) -> Option<String>;

    /// Bind (`Some`) or clear (`None`) the handler for an event.
    fn bind(&self, instance: ObjectId, event: &str, handler: Option<String>);
}

#[derive(Default)]
pub struct InMemoryEventBindings {
    bindings: RwLock<HashMap<(ObjectId, String), String>>,
}

impl InMemoryEventBindings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventBindingService for InMemoryEventBindings {
    fn handler_of(&self, instance: ObjectId, event: &str) -> Option<String> {
        self.bindings
            .read()
            .get(&(instance, event.to_owned()))
            .cloned()
    }

    fn bind(&self, instance: ObjectId, event: &str, handler: Option<String>) {
        let key = (instance, event.to_owned());
        let mut bindings = self.bindings.write();
        match handler {
            Some(h) => {
                bindings.insert(key, h);
            }
            None => {
                bindings.remove(&key);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Member relationships
// ---------------------------------------------------------------------------

/// A member whose value is an alias of another component's member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberRelationship {
    /// Container name of the component the value comes from.
    pub source: String,
    /// The member on that component.
    pub member: String,
}

/// Reports when a property's value is linked to another member rather
/// than being an independent value.
pub trait MemberRelationshipService: Send + Sync {
    fn relationship(&self, owner: ObjectId, member: &str) -> Option<MemberRelationship>;

    fn set_relationship(
        &self,
        owner: ObjectId,
        member: &str,
        relationship: Option<MemberRelationship>,
    );
}

#[derive(Default)]
pub struct InMemoryRelationships {
    links: RwLock<HashMap<(ObjectId, String), MemberRelationship>>,
}

impl InMemoryRelationships {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemberRelationshipService for InMemoryRelationships {
    fn relationship(&self, owner: ObjectId, member: &str) -> Option<MemberRelationship> {
        self.links.read().get(&(owner, member.to_owned())).cloned()
    }

    fn set_relationship(
        &self,
        owner: ObjectId,
        member: &str,
        relationship: Option<MemberRelationship>,
    ) {
        let key = (owner, member.to_owned());
        let mut links = self.links.write();
        match relationship {
            Some(r) => {
                links.insert(key, r);
            }
            None => {
                links.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectHandle;

    struct Thing;

    #[test]
    fn default_naming_counts_up() {
        let registry = TypeRegistry::new();
        let info = registry.register(TypeInfo::builder::<Thing>("Thing").build());
        let container = Container::new();
        let naming = DefaultNameCreation;

        assert_eq!(naming.create_name(&container, &info), "thing1");
        container
            .add(ObjectHandle::new(info.clone(), Thing), Some("thing1"), false)
            .unwrap();
        assert_eq!(naming.create_name(&container, &info), "thing2");
    }

    #[test]
    fn name_validation() {
        let naming = DefaultNameCreation;
        assert!(naming.is_valid_name("button1"));
        assert!(naming.is_valid_name("panel1.header"));
        assert!(!naming.is_valid_name(""));
        assert!(!naming.is_valid_name("1button"));
        assert!(!naming.is_valid_name("a..b"));
        assert!(naming.validate_name("1button").is_err());
    }

    #[test]
    fn event_bindings_store_and_clear() {
        let info = std::sync::Arc::new(TypeInfo::builder::<Thing>("Thing").build());
        let h = ObjectHandle::new(info, Thing);
        let bindings = InMemoryEventBindings::new();
        assert_eq!(bindings.handler_of(h.id(), "clicked"), None);
        bindings.bind(h.id(), "clicked", Some("on_clicked".into()));
        assert_eq!(
            bindings.handler_of(h.id(), "clicked").as_deref(),
            Some("on_clicked")
        );
        bindings.bind(h.id(), "clicked", None);
        assert_eq!(bindings.handler_of(h.id(), "clicked"), None);
    }
}
