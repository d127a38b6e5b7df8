//! Root serialization for non-component roots: no field declarations, no
//! bucket partitioning, just the root's members (or an explicit subset)
//! replayed through one method.

use formloom_codemodel::{Expression, MethodDecl, TypeDecl};
use formloom_model::ObjectHandle;

use crate::context::{ContextEntry, ExpressionContext, RootContext};
use crate::manager::SerializationManager;
use crate::registry::{Member, RootSerializer, SerializerKind};
use crate::serializers::{ComponentSerializer, INITIALIZE_METHOD};
use crate::SerializationError;

pub struct TypeLevelSerializer {
    /// Restrict serialization to these member names; `None` means all.
    members: Option<Vec<String>>,
}

impl TypeLevelSerializer {
    pub fn new() -> Self {
        Self { members: None }
    }

    pub fn with_members(members: Vec<String>) -> Self {
        Self {
            members: Some(members),
        }
    }

    fn serialize_listed_members(
        manager: &SerializationManager,
        root: &ObjectHandle,
        names: &[String],
    ) {
        let entry = match manager.serializer_for(root.info(), SerializerKind::Member) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                manager.report(SerializationError::MissingSerializer {
                    type_name: root.type_name().to_owned(),
                    kind: SerializerKind::Member,
                });
                return;
            }
            Err(e) => {
                manager.report(e);
                return;
            }
        };
        let Some(serializer) = entry.as_member().cloned() else {
            return;
        };

        let ty = root.info().clone();
        for name in names {
            if let Some(property) = ty.property(name) {
                let member = Member::Property(property);
                if serializer.should_serialize(manager, root, &member, false) {
                    serializer.serialize_member(manager, root, &member, false);
                }
            } else if let Some(event) = ty.event(name) {
                let member = Member::Event(event);
                if serializer.should_serialize(manager, root, &member, false) {
                    serializer.serialize_member(manager, root, &member, false);
                }
            } else {
                manager.report(SerializationError::UnsupportedNode(format!(
                    "type '{}' has no member '{name}'",
                    root.type_name()
                )));
            }
        }
    }
}

impl Default for TypeLevelSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl RootSerializer for TypeLevelSerializer {
    fn serialize_root(
        &self,
        manager: &SerializationManager,
        root: &ObjectHandle,
    ) -> Option<TypeDecl> {
        let name = manager
            .name_of(root)
            .ok()
            .flatten()
            .unwrap_or_else(|| root.type_name().to_owned());

        let root_ctx = RootContext {
            value: root.clone(),
            expression: Expression::SelfRef,
        };
        let ((), statements) = manager.collect_statements(Some(root.id()), || {
            manager.with_context(ContextEntry::Root(root_ctx), || {
                let mut ctx = ExpressionContext::new(Expression::SelfRef);
                ctx.declared_type = Some(root.type_name().to_owned());
                manager.with_context(ContextEntry::Expression(ctx), || match &self.members {
                    Some(names) => Self::serialize_listed_members(manager, root, names),
                    None => ComponentSerializer::serialize_members(manager, root, false),
                });
            });
        });

        Some(TypeDecl {
            name,
            base_type: root.type_name().to_owned(),
            fields: Vec::new(),
            methods: vec![MethodDecl {
                name: INITIALIZE_METHOD.to_owned(),
                statements,
            }],
        })
    }

    fn deserialize_root(
        &self,
        manager: &SerializationManager,
        decl: &TypeDecl,
    ) -> Option<ObjectHandle> {
        let ty = match manager.resolve_type(&decl.base_type) {
            Ok(ty) => ty,
            Err(e) => {
                manager.report(e);
                return None;
            }
        };
        let root = match manager.create_instance(&ty, &[], Some(&decl.name), ty.is_component()) {
            Ok(root) => root,
            Err(e) => {
                manager.report(e);
                return None;
            }
        };

        let root_ctx = RootContext {
            value: root.clone(),
            expression: Expression::SelfRef,
        };
        manager.with_context(ContextEntry::Root(root_ctx), || {
            match decl.method(INITIALIZE_METHOD) {
                Some(method) => super::interpreter::execute_all(manager, &method.statements),
                None => manager.report(SerializationError::UnsupportedNode(format!(
                    "type '{}' has no '{INITIALIZE_METHOD}' method",
                    decl.name
                ))),
            }
        });
        Some(root)
    }
}
