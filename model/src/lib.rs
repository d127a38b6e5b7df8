//! # formloom-model
//!
//! The live-object side of the formloom serialization boundary.
//!
//! The engine translates between statement trees and graphs of *live*
//! objects. This crate defines how those objects are held and described:
//!
//! ## Core Types
//!
//! - [`ObjectHandle`] / [`ObjectId`] — a type-erased live instance with
//!   reference identity
//! - [`PropertyValue`] — the value shape crossing the property boundary
//! - [`TypeInfo`] / [`TypeRegistry`] — registration-time metadata tables
//!   (properties, constructors, methods, flag members) replacing runtime
//!   reflection
//! - [`Container`] — the component container: name → instance, ordered,
//!   rename-on-collision, change notifications
//! - [`DesignEnvironment`] — bundle of the container, registry, and
//!   collaborator services the engine consumes
//!
//! Components are any `Send + Sync + 'static` value; everything the engine
//! needs to know about them is supplied at registration time through
//! [`TypeInfo::builder`].

mod container;
mod environment;
mod object;
mod services;
mod typeinfo;

pub use container::{Container, ContainerError, ContainerEvent};
pub use environment::DesignEnvironment;
pub use object::{new_cell, AnyCell, ObjectHandle, ObjectId, PropertyValue};
pub use services::{
    DefaultNameCreation, EventBindingService, InMemoryEventBindings, InMemoryRelationships,
    MemberRelationship, MemberRelationshipService, NameCreationService, RegistryTypeResolution,
    TypeResolutionService,
};
pub use typeinfo::{
    register_builtin_types, ConstructorInfo, EventInfo, FlagsInfo, MethodInfo, PropertyInfo,
    PropertyVisibility, TypeInfo, TypeInfoBuilder, TypeRegistry,
};
