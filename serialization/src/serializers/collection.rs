//! Collections: one add-invocation statement per element.

use formloom_codemodel::{CodeNode, Statement};
use formloom_model::PropertyValue;

use crate::manager::SerializationManager;
use crate::registry::{Serializer, SerializerOutput};
use crate::SerializationError;

pub struct CollectionSerializer;

impl Serializer for CollectionSerializer {
    fn serialize(&self, manager: &SerializationManager, value: &PropertyValue) -> SerializerOutput {
        let Some(instance) = value.as_object() else {
            return SerializerOutput::Empty;
        };
        let ty = instance.info().clone();
        let Some(items) = ty.enumerate_items(instance) else {
            return SerializerOutput::Empty;
        };
        if items.is_empty() {
            return SerializerOutput::Empty;
        }

        // Contents are assumed homogeneous: one add overload, matched
        // against the first sampled element, serves every element.
        if ty.find_method("add", &items[..1]).is_none() {
            manager.report(SerializationError::IncompatibleCollection(
                ty.name().to_owned(),
            ));
            return SerializerOutput::Empty;
        }

        let Some(target) = manager
            .cached_expression(instance.id())
            .or_else(|| manager.expression_context().map(|c| c.expression))
        else {
            manager.report(SerializationError::UnsupportedNode(format!(
                "no expression in scope for collection '{}'",
                ty.name()
            )));
            return SerializerOutput::Empty;
        };

        let mut statements = Vec::with_capacity(items.len());
        for item in &items {
            let Some(arg) = manager.serialize_to_expression(item) else {
                manager.report(SerializationError::MissingSerializer {
                    type_name: item.type_name().to_owned(),
                    kind: crate::registry::SerializerKind::Object,
                });
                continue;
            };
            statements.push(Statement::Expression(formloom_codemodel::Expression::invoke(
                target.clone(),
                "add",
                vec![arg],
            )));
        }
        SerializerOutput::Statements(statements)
    }

    fn deserialize(&self, manager: &SerializationManager, node: &CodeNode) -> PropertyValue {
        match node {
            CodeNode::Statement(statement) => {
                super::interpreter::execute(manager, statement);
                PropertyValue::Missing
            }
            CodeNode::Statements(statements) => {
                super::interpreter::execute_all(manager, statements);
                PropertyValue::Missing
            }
            CodeNode::Expression(expr) => super::interpreter::evaluate(manager, expr),
            CodeNode::Type(_) => {
                manager.report(SerializationError::UnsupportedNode(
                    "collection deserialization does not accept type declarations".into(),
                ));
                PropertyValue::Missing
            }
        }
    }
}
