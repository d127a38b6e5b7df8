//! The environment bundle handed to the engine.

use std::sync::Arc;

use crate::container::Container;
use crate::services::{
    DefaultNameCreation, EventBindingService, InMemoryEventBindings, InMemoryRelationships,
    MemberRelationshipService, NameCreationService, RegistryTypeResolution, TypeResolutionService,
};
use crate::typeinfo::{register_builtin_types, TypeRegistry};

/// The container, type registry, and collaborator services the engine
/// consumes, bundled so a whole designer surface can be passed around (and
/// cheaply cloned) as one value.
#[derive(Clone)]
pub struct DesignEnvironment {
    pub types: Arc<TypeRegistry>,
    pub container: Arc<Container>,
    pub naming: Arc<dyn NameCreationService>,
    pub resolution: Arc<dyn TypeResolutionService>,
    pub events: Arc<dyn EventBindingService>,
    pub relationships: Arc<dyn MemberRelationshipService>,
}

impl DesignEnvironment {
    /// An environment over `types` with a fresh container and the default
    /// in-memory services. Builtin primitive types are registered.
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        register_builtin_types(&types);
        Self {
            resolution: Arc::new(RegistryTypeResolution::new(types.clone())),
            types,
            container: Arc::new(Container::new()),
            naming: Arc::new(DefaultNameCreation),
            events: Arc::new(InMemoryEventBindings::new()),
            relationships: Arc::new(InMemoryRelationships::new()),
        }
    }

    /// Same services and registry, fresh empty container. Used when
    /// replaying a snapshot into a new surface.
    pub fn with_fresh_container(&self) -> Self {
        Self {
            types: self.types.clone(),
            container: Arc::new(Container::new()),
            naming: self.naming.clone(),
            resolution: self.resolution.clone(),
            events: self.events.clone(),
            relationships: self.relationships.clone(),
        }
    }
}
