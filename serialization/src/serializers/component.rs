//! Sited components: reference expressions, and full construction +
//! member statements when an ambient preset requires it.

use formloom_codemodel::{CodeNode, Expression, Statement};
use formloom_model::{ObjectHandle, PropertyValue};

use crate::manager::SerializationManager;
use crate::registry::{Member, Serializer, SerializerKind, SerializerOutput};
use crate::SerializationError;

pub struct ComponentSerializer;

impl ComponentSerializer {
    /// Serialize every member of `instance` through the member serializer,
    /// appending to the ambient statement context.
    pub(crate) fn serialize_members(
        manager: &SerializationManager,
        instance: &ObjectHandle,
        absolute: bool,
    ) {
        let entry = match manager.serializer_for(instance.info(), SerializerKind::Member) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                manager.report(SerializationError::MissingSerializer {
                    type_name: instance.type_name().to_owned(),
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

        let ty = instance.info().clone();
        for property in ty.properties() {
            let member = Member::Property(property);
            if serializer.should_serialize(manager, instance, &member, absolute) {
                serializer.serialize_member(manager, instance, &member, absolute);
            }
        }
        for event in ty.events() {
            let member = Member::Event(event);
            if serializer.should_serialize(manager, instance, &member, absolute) {
                serializer.serialize_member(manager, instance, &member, absolute);
            }
        }
    }
}

impl Serializer for ComponentSerializer {
    fn serialize(&self, manager: &SerializationManager, value: &PropertyValue) -> SerializerOutput {
        let Some(instance) = value.as_object() else {
            return SerializerOutput::Empty;
        };

        // The root never re-serializes inside itself; it is always the
        // canonical self expression.
        if let Some(root) = manager.root_context() {
            if root.value.same_instance(instance) {
                return SerializerOutput::Expression(root.expression);
            }
        }

        let name = match manager.name_of(instance) {
            Ok(Some(name)) => name,
            Ok(None) => {
                manager.report(SerializationError::UnsitedComponent(
                    instance.type_name().to_owned(),
                ));
                return SerializerOutput::Empty;
            }
            Err(e) => {
                manager.report(e);
                return SerializerOutput::Empty;
            }
        };

        let reference = Expression::nested_field(Expression::SelfRef, &name);
        // Cache before recursing so properties referencing this same
        // component resolve to the reference instead of a second
        // construction.
        manager.cache_expression(instance.id(), reference.clone());

        let context = manager.expression_context();
        let full = context.as_ref().is_some_and(|c| c.presets(instance));
        if !full {
            return SerializerOutput::Expression(reference);
        }
        let absolute = context.is_some_and(|c| c.absolute);

        let mut statements = vec![Statement::Assign {
            left: reference.clone(),
            right: Expression::ObjectCreate {
                type_name: instance.type_name().to_owned(),
                args: Vec::new(),
            },
        }];

        let ((), member_statements) = manager.collect_statements(Some(instance.id()), || {
            use crate::context::{ContextEntry, ExpressionContext};
            let mut ctx = ExpressionContext::new(reference.clone());
            ctx.declared_type = Some(instance.type_name().to_owned());
            ctx.absolute = absolute;
            manager.with_context(ContextEntry::Expression(ctx), || {
                Self::serialize_members(manager, instance, absolute);
            });
        });
        statements.extend(member_statements);

        SerializerOutput::Statements(statements)
    }

    fn deserialize(&self, manager: &SerializationManager, node: &CodeNode) -> PropertyValue {
        match node {
            CodeNode::Expression(expr) => super::interpreter::evaluate(manager, expr),
            CodeNode::Statement(statement) => {
                super::interpreter::execute(manager, statement);
                PropertyValue::Missing
            }
            CodeNode::Statements(statements) => {
                super::interpreter::execute_all(manager, statements);
                PropertyValue::Missing
            }
            CodeNode::Type(_) => {
                manager.report(SerializationError::UnsupportedNode(
                    "component deserialization does not accept type declarations".into(),
                ));
                PropertyValue::Missing
            }
        }
    }
}
