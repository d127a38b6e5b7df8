//! The serialization store: a closed, persistable snapshot of selected
//! objects and members, used for copy/paste and undo.
//!
//! Entries are accumulated against live instances while the store is open;
//! `close()` serializes every entry exactly once through a throwaway
//! manager and session — never the caller's active session, so closing a
//! store while the surface's own session is in progress cannot trip the
//! one-session rule. A closed store is pure data: it can be persisted,
//! reloaded, and replayed into any container, with name redirection
//! covering collision renames on paste.

use std::io::{Read, Write};

use formloom_codemodel::{Expression, Statement};
use formloom_model::{DesignEnvironment, ObjectHandle, PropertyValue};
use serde::{Deserialize, Serialize};

use crate::context::{ContextEntry, ExpressionContext};
use crate::error::{SerializationError, SerializationResult};
use crate::format::{decode, encode, Format};
use crate::manager::{SerializationManager, SessionOptions};
use crate::registry::{Member, SerializerKind, SerializerOutput};
use crate::serializers::interpreter;

/// Options for replaying a store into a container.
#[derive(Clone, Copy, Debug, Default)]
pub struct StoreOptions {
    /// Reuse instances already present under the recorded names (undo-style
    /// replay onto an existing surface) instead of constructing new ones.
    pub recycle_instances: bool,
    /// When recycling, discard a reused instance whose type changed.
    pub validate_recycled_types: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct StoredMember {
    name: String,
    absolute: bool,
    statements: Vec<Statement>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct StoredObject {
    name: String,
    type_name: String,
    absolute: bool,
    /// Whole-object entry vs. a bare owner for member entries.
    whole: bool,
    statements: Vec<Statement>,
    members: Vec<StoredMember>,
}

/// The persisted shape of a closed store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StorePayload {
    objects: Vec<StoredObject>,
}

struct PendingEntry {
    instance: ObjectHandle,
    name: String,
    absolute: bool,
    whole: bool,
    /// (member name, absolute) — overwritten on re-add.
    members: Vec<(String, bool)>,
}

/// A mutable-until-closed snapshot of selected objects and members.
pub struct SerializationStore {
    env: Option<DesignEnvironment>,
    pending: Vec<PendingEntry>,
    payload: Option<StorePayload>,
    closed: bool,
    errors: Vec<SerializationError>,
}

impl SerializationStore {
    /// An open store over the surface's environment.
    pub fn new(env: DesignEnvironment) -> Self {
        Self {
            env: Some(env),
            pending: Vec::new(),
            payload: None,
            closed: false,
            errors: Vec::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Diagnostics from the most recent close or replay pass.
    pub fn errors(&self) -> &[SerializationError] {
        &self.errors
    }

    /// Record a whole-object entry. Idempotent per name — the first write
    /// wins.
    pub fn add_object(
        &mut self,
        instance: &ObjectHandle,
        absolute: bool,
    ) -> SerializationResult<()> {
        if self.closed {
            return Err(SerializationError::StoreClosed);
        }
        let name = self.site_name(instance)?;
        if let Some(entry) = self.pending.iter_mut().find(|e| e.name == name) {
            if !entry.whole {
                entry.whole = true;
                entry.absolute = absolute;
            }
            return Ok(());
        }
        self.pending.push(PendingEntry {
            instance: instance.clone(),
            name,
            absolute,
            whole: true,
            members: Vec::new(),
        });
        Ok(())
    }

    /// Record (or overwrite) a member entry on `owner`.
    pub fn add_member(
        &mut self,
        owner: &ObjectHandle,
        member: &str,
        absolute: bool,
    ) -> SerializationResult<()> {
        if self.closed {
            return Err(SerializationError::StoreClosed);
        }
        let name = self.site_name(owner)?;
        let index = match self.pending.iter().position(|e| e.name == name) {
            Some(index) => index,
            None => {
                self.pending.push(PendingEntry {
                    instance: owner.clone(),
                    name,
                    absolute: false,
                    whole: false,
                    members: Vec::new(),
                });
                self.pending.len() - 1
            }
        };
        let entry = &mut self.pending[index];
        match entry.members.iter_mut().find(|(m, _)| m == member) {
            Some(existing) => existing.1 = absolute,
            None => entry.members.push((member.to_owned(), absolute)),
        }
        Ok(())
    }

    fn site_name(&self, instance: &ObjectHandle) -> SerializationResult<String> {
        let env = self.env.as_ref().ok_or(SerializationError::StoreClosed)?;
        env.container
            .name_of(instance.id())
            .ok_or_else(|| SerializationError::UnsitedComponent(instance.type_name().to_owned()))
    }

    /// Serialize every recorded entry. Idempotent; the first call runs the
    /// actual serialization through a throwaway manager and session.
    pub fn close(&mut self) -> SerializationResult<()> {
        if self.closed {
            return Ok(());
        }
        let env = self.env.clone().ok_or(SerializationError::StoreClosed)?;

        // A fresh manager avoids re-entering the surface's own session.
        let manager = SerializationManager::new(env);
        let session = manager.open_session()?;

        let mut objects = Vec::with_capacity(self.pending.len());
        for entry in &self.pending {
            let mut stored = StoredObject {
                name: entry.name.clone(),
                type_name: entry.instance.type_name().to_owned(),
                absolute: entry.absolute,
                whole: entry.whole,
                statements: Vec::new(),
                members: Vec::new(),
            };
            if entry.whole {
                stored.statements = serialize_whole(&manager, entry);
            }
            for (member_name, absolute) in &entry.members {
                stored.members.push(StoredMember {
                    name: member_name.clone(),
                    absolute: *absolute,
                    statements: serialize_member(&manager, entry, member_name, *absolute),
                });
            }
            objects.push(stored);
        }

        self.errors = session.close();
        self.payload = Some(StorePayload { objects });
        self.pending.clear();
        self.closed = true;
        Ok(())
    }

    /// Persist the closed snapshot; implies [`close`](Self::close).
    pub fn save<W: Write>(&mut self, writer: &mut W, format: Format) -> SerializationResult<()> {
        self.close()?;
        let payload = self.payload.as_ref().ok_or(SerializationError::StoreNotClosed)?;
        let bytes = encode(payload, format)?;
        writer
            .write_all(&bytes)
            .map_err(|e| SerializationError::Format(e.to_string()))
    }

    /// Reload a persisted snapshot. No serializer logic runs; objects are
    /// only reconstructed by [`deserialize`](Self::deserialize).
    pub fn load<R: Read>(reader: &mut R, format: Format) -> SerializationResult<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| SerializationError::Format(e.to_string()))?;
        let payload: StorePayload = decode(&bytes, format)?;
        Ok(Self {
            env: None,
            pending: Vec::new(),
            payload: Some(payload),
            closed: true,
            errors: Vec::new(),
        })
    }

    /// Replay the closed snapshot into `env`'s container.
    ///
    /// Runs inside a fresh manager session with rename redirection: when a
    /// recorded name is already taken, the container assigns a new one and
    /// every later statement referencing the recorded name resolves to the
    /// new instance. Returns the reconstructed whole objects.
    pub fn deserialize(
        &mut self,
        env: &DesignEnvironment,
        options: StoreOptions,
    ) -> SerializationResult<Vec<ObjectHandle>> {
        let payload = self.payload.as_ref().ok_or(SerializationError::StoreNotClosed)?;

        let manager = SerializationManager::new(env.clone());
        manager.set_options(SessionOptions {
            preserve_names: false,
            recycle_instances: options.recycle_instances,
            validate_recycled_types: options.validate_recycled_types,
        })?;
        let session = manager.open_session()?;

        for object in &payload.objects {
            interpreter::execute_all(&manager, &object.statements);
            for member in &object.members {
                interpreter::execute_all(&manager, &member.statements);
            }
        }

        let mut instances = Vec::new();
        for object in payload.objects.iter().filter(|o| o.whole) {
            match manager.instance_by_name(&object.name) {
                Ok(Some(instance)) => instances.push(instance),
                Ok(None) => manager.report(SerializationError::UnsupportedNode(format!(
                    "stored object '{}' was not reconstructed",
                    object.name
                ))),
                Err(e) => manager.report(e),
            }
        }

        self.errors = session.close();
        Ok(instances)
    }
}

/// Full serialization of a whole-object entry: construction plus members,
/// honoring the absolute flag.
fn serialize_whole(manager: &SerializationManager, entry: &PendingEntry) -> Vec<Statement> {
    let serializer = match manager.serializer_for(entry.instance.info(), SerializerKind::Object) {
        Ok(Some(found)) => found.as_object().cloned(),
        Ok(None) => {
            manager.report(SerializationError::MissingSerializer {
                type_name: entry.instance.type_name().to_owned(),
                kind: SerializerKind::Object,
            });
            None
        }
        Err(e) => {
            manager.report(e);
            None
        }
    };
    let Some(serializer) = serializer else {
        return Vec::new();
    };

    let reference = Expression::nested_field(Expression::SelfRef, &entry.name);
    let mut ctx = ExpressionContext::new(reference);
    ctx.declared_type = Some(entry.instance.type_name().to_owned());
    ctx.preset = Some(entry.instance.clone());
    ctx.absolute = entry.absolute;

    let ((), statements) = manager.collect_statements(Some(entry.instance.id()), || {
        manager.with_context(ContextEntry::Expression(ctx), || {
            match serializer.serialize(manager, &PropertyValue::Object(entry.instance.clone())) {
                SerializerOutput::Statements(statements) => {
                    for statement in statements {
                        manager.append_statement(statement);
                    }
                }
                SerializerOutput::Expression(_) | SerializerOutput::Empty => {}
            }
        });
    });
    statements
}

/// Serialization of one member entry through the member serializer.
fn serialize_member(
    manager: &SerializationManager,
    entry: &PendingEntry,
    member_name: &str,
    absolute: bool,
) -> Vec<Statement> {
    let serializer = match manager.serializer_for(entry.instance.info(), SerializerKind::Member) {
        Ok(Some(found)) => found.as_member().cloned(),
        Ok(None) => {
            manager.report(SerializationError::MissingSerializer {
                type_name: entry.instance.type_name().to_owned(),
                kind: SerializerKind::Member,
            });
            None
        }
        Err(e) => {
            manager.report(e);
            None
        }
    };
    let Some(serializer) = serializer else {
        return Vec::new();
    };

    let ty = entry.instance.info().clone();
    let member = if let Some(property) = ty.property(member_name) {
        Member::Property(property)
    } else if let Some(event) = ty.event(member_name) {
        Member::Event(event)
    } else {
        manager.report(SerializationError::UnsupportedNode(format!(
            "type '{}' has no member '{member_name}'",
            ty.name()
        )));
        return Vec::new();
    };

    let reference = Expression::nested_field(Expression::SelfRef, &entry.name);
    let mut ctx = ExpressionContext::new(reference.clone());
    ctx.declared_type = Some(entry.instance.type_name().to_owned());
    manager.cache_expression(entry.instance.id(), reference);

    let ((), statements) = manager.collect_statements(Some(entry.instance.id()), || {
        manager.with_context(ContextEntry::Expression(ctx), || {
            if serializer.should_serialize(manager, &entry.instance, &member, absolute) {
                serializer.serialize_member(manager, &entry.instance, &member, absolute);
            }
        });
    });
    statements
}
