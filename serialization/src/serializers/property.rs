//! Property members: one assignment statement per visible property,
//! content recursion for owned sub-objects and collections.

use formloom_codemodel::{Expression, Statement};
use formloom_model::{ObjectHandle, PropertyInfo, PropertyVisibility};

use crate::context::{ContextEntry, ExpressionContext};
use crate::manager::SerializationManager;
use crate::registry::{Member, MemberSerializer, SerializerKind, SerializerOutput};
use crate::SerializationError;

pub struct PropertySerializer;

impl PropertySerializer {
    /// The expression referring to `owner` — the cached canonical one, or
    /// whatever the ambient expression context says is being built.
    fn owner_expression(
        manager: &SerializationManager,
        owner: &ObjectHandle,
    ) -> Option<Expression> {
        if let Some(cached) = manager.cached_expression(owner.id()) {
            return Some(cached);
        }
        if let Some(root) = manager.root_context() {
            if root.value.same_instance(owner) {
                return Some(root.expression);
            }
        }
        manager.expression_context().map(|c| c.expression)
    }

    fn serialize_content(
        manager: &SerializationManager,
        owner: &ObjectHandle,
        property: &PropertyInfo,
        absolute: bool,
    ) {
        let value = property.get(owner);
        let Some(child) = value.as_object() else {
            // Content visibility only makes sense for structured values.
            return;
        };
        let entry = match manager.serializer_for(child.info(), SerializerKind::Object) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                manager.report(SerializationError::MissingSerializer {
                    type_name: child.type_name().to_owned(),
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

        let Some(owner_expr) = Self::owner_expression(manager, owner) else {
            manager.report(SerializationError::UnsupportedNode(format!(
                "no expression in scope for owner of '{}'",
                property.name()
            )));
            return;
        };
        let mut ctx = ExpressionContext::new(Expression::property(owner_expr, property.name()));
        ctx.declared_type = Some(property.type_name().to_owned());
        ctx.owner = Some(owner.clone());
        ctx.absolute = absolute;

        manager.with_context(ContextEntry::Expression(ctx), || {
            match serializer.serialize(manager, &value) {
                SerializerOutput::Statements(statements) => {
                    for statement in statements {
                        if !manager.append_statement(statement) {
                            log::debug!(
                                "content statements for '{}' had no statement context",
                                property.name()
                            );
                        }
                    }
                }
                // An expression or nothing: a content property has no
                // assignment to emit.
                SerializerOutput::Expression(_) | SerializerOutput::Empty => {}
            }
        });
    }
}

impl MemberSerializer for PropertySerializer {
    fn should_serialize(
        &self,
        manager: &SerializationManager,
        owner: &ObjectHandle,
        member: &Member<'_>,
        absolute: bool,
    ) -> bool {
        let Member::Property(property) = member else {
            return false;
        };
        if property.visibility() == PropertyVisibility::Hidden {
            return false;
        }
        if absolute {
            return true;
        }
        let linked = manager
            .environment()
            .relationships
            .relationship(owner.id(), property.name())
            .is_some();
        linked || property.should_serialize(owner)
    }

    fn serialize_member(
        &self,
        manager: &SerializationManager,
        owner: &ObjectHandle,
        member: &Member<'_>,
        absolute: bool,
    ) {
        let Member::Property(property) = member else {
            return;
        };
        match property.visibility() {
            PropertyVisibility::Hidden => {}
            PropertyVisibility::Content => {
                Self::serialize_content(manager, owner, property, absolute);
            }
            PropertyVisibility::Visible => {
                let Some(owner_expr) = Self::owner_expression(manager, owner) else {
                    manager.report(SerializationError::UnsupportedNode(format!(
                        "no expression in scope for owner of '{}'",
                        property.name()
                    )));
                    return;
                };
                let left = Expression::property(owner_expr, property.name());

                let relationship = manager
                    .environment()
                    .relationships
                    .relationship(owner.id(), property.name());
                let right = match relationship {
                    Some(rel) => Expression::property(
                        Expression::nested_field(Expression::SelfRef, &rel.source),
                        rel.member,
                    ),
                    None => {
                        let value = property.get(owner);
                        match manager.serialize_to_expression(&value) {
                            Some(expr) => expr,
                            None => {
                                manager.report(SerializationError::MissingSerializer {
                                    type_name: value.type_name().to_owned(),
                                    kind: SerializerKind::Object,
                                });
                                return;
                            }
                        }
                    }
                };

                if !manager.append_statement(Statement::Assign { left, right }) {
                    log::debug!(
                        "assignment for '{}' had no statement context",
                        property.name()
                    );
                }
            }
        }
    }
}
