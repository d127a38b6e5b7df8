//! The root serializer: a whole designer surface in, one synthesized type
//! declaration out.
//!
//! Serialization walks every sibling component in the container (each
//! under an expression context that presets it for full serialization),
//! partitions the results into field declarations and the pre-init / init
//! / post-init buckets of a class-build context, and folds the root's own
//! members in last. Deserialization constructs the root and replays the
//! synthesized initialization method through the statement interpreter.

use formloom_codemodel::{Expression, FieldDecl, MethodDecl, Statement, TypeDecl};
use formloom_model::{ObjectHandle, PropertyValue};

use crate::context::{ClassBuildContext, ContextEntry, ExpressionContext, RootContext};
use crate::manager::SerializationManager;
use crate::registry::{RootSerializer, SerializerKind, SerializerOutput};
use crate::serializers::ComponentSerializer;
use crate::SerializationError;

/// Name of the synthesized initialization method.
pub const INITIALIZE_METHOD: &str = "initialize_components";

pub struct ComponentRootSerializer;

impl ComponentRootSerializer {
    fn serialize_component(manager: &SerializationManager, name: &str, component: &ObjectHandle) {
        let entry = match manager.serializer_for(component.info(), SerializerKind::Object) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                manager.report(SerializationError::MissingSerializer {
                    type_name: component.type_name().to_owned(),
                    kind: SerializerKind::Object,
                });
                return;
            }
            Err(e) => {
                manager.report(e);
                return;
            }
        };
        let Some(serializer) = entry.as_object().cloned() else {
            return;
        };

        let reference = Expression::nested_field(Expression::SelfRef, name);
        let mut ctx = ExpressionContext::new(reference);
        ctx.declared_type = Some(component.type_name().to_owned());
        ctx.preset = Some(component.clone());

        let ((), statements) = manager.collect_statements(Some(component.id()), || {
            manager.with_context(ContextEntry::Expression(ctx), || {
                match serializer.serialize(manager, &PropertyValue::Object(component.clone())) {
                    SerializerOutput::Statements(statements) => {
                        for statement in statements {
                            manager.append_statement(statement);
                        }
                    }
                    // Already covered by a cached reference, or nothing.
                    SerializerOutput::Expression(_) | SerializerOutput::Empty => {}
                }
            });
        });

        let (construction, rest) = split_construction(manager, component, statements);

        let _ = manager.with_class_build(|cb| {
            // Nested components live behind their owner and get no field
            // of their own.
            if !name.contains('.') {
                cb.fields.push(FieldDecl {
                    name: name.to_owned(),
                    type_name: component.type_name().to_owned(),
                });
            }
            if let Some(construction) = construction {
                cb.pre_init.push(construction);
            }
            cb.init.extend(rest);
        });
    }
}

impl RootSerializer for ComponentRootSerializer {
    fn serialize_root(
        &self,
        manager: &SerializationManager,
        root: &ObjectHandle,
    ) -> Option<TypeDecl> {
        let class_name = manager
            .name_of(root)
            .ok()
            .flatten()
            .unwrap_or_else(|| root.type_name().to_owned());

        let root_ctx = RootContext {
            value: root.clone(),
            expression: Expression::SelfRef,
        };

        let (type_decl, _) = manager.with_context_take(ContextEntry::Root(root_ctx), || {
            let ((), class_build) = manager
                .with_context_take(ContextEntry::ClassBuild(ClassBuildContext::default()), || {
                    for (name, component) in manager.environment().container.components() {
                        if component.same_instance(root) {
                            continue;
                        }
                        Self::serialize_component(manager, &name, &component);
                    }

                    // The root's own members go last, into the init bucket.
                    let ((), root_statements) =
                        manager.collect_statements(Some(root.id()), || {
                            ComponentSerializer::serialize_members(manager, root, false);
                        });
                    let _ = manager.with_class_build(|cb| cb.init.extend(root_statements));
                });

            let class_build = match class_build {
                Some(ContextEntry::ClassBuild(cb)) => cb,
                _ => ClassBuildContext::default(),
            };
            let ClassBuildContext {
                fields,
                pre_init,
                init,
                post_init,
            } = class_build;
            let mut statements = pre_init;
            statements.extend(init);
            statements.extend(post_init);
            TypeDecl {
                name: class_name,
                base_type: root.type_name().to_owned(),
                fields,
                methods: vec![MethodDecl {
                    name: INITIALIZE_METHOD.to_owned(),
                    statements,
                }],
            }
        });

        Some(type_decl)
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
        let root = match manager.create_instance(&ty, &[], Some(&decl.name), true) {
            Ok(root) => root,
            Err(e) => {
                manager.report(e);
                return None;
            }
        };
        manager.environment().container.set_root(&root);

        let root_ctx = RootContext {
            value: root.clone(),
            expression: Expression::SelfRef,
        };
        manager.with_context(ContextEntry::Root(root_ctx), || {
            match decl.method(INITIALIZE_METHOD) {
                Some(method) => {
                    super::interpreter::execute_all(manager, &method.statements);
                }
                None => {
                    manager.report(SerializationError::UnsupportedNode(format!(
                        "type '{}' has no '{INITIALIZE_METHOD}' method",
                        decl.name
                    )));
                }
            }
        });
        Some(root)
    }
}

/// Pull the component's construction assignment out of its statement list:
/// the first assignment whose right side is an object creation resolving
/// to the component's runtime type.
fn split_construction(
    manager: &SerializationManager,
    component: &ObjectHandle,
    statements: Vec<Statement>,
) -> (Option<Statement>, Vec<Statement>) {
    let mut construction = None;
    let mut rest = Vec::with_capacity(statements.len());
    for statement in statements {
        if construction.is_none() {
            if let Statement::Assign {
                right: Expression::ObjectCreate { type_name, .. },
                ..
            } = &statement
            {
                let matches_type = manager
                    .resolve_type(type_name)
                    .map(|t| t.type_id() == component.info().type_id())
                    .unwrap_or_else(|_| type_name == component.type_name());
                if matches_type {
                    construction = Some(statement);
                    continue;
                }
            }
        }
        rest.push(statement);
    }
    (construction, rest)
}
