//! Literal values in both directions.

use formloom_codemodel::{CodeNode, Expression};
use formloom_model::PropertyValue;

use crate::manager::SerializationManager;
use crate::registry::{Serializer, SerializerOutput};

pub struct PrimitiveSerializer;

impl Serializer for PrimitiveSerializer {
    fn serialize(&self, _manager: &SerializationManager, value: &PropertyValue) -> SerializerOutput {
        match value {
            PropertyValue::Primitive(v) => {
                SerializerOutput::Expression(Expression::Literal(v.clone()))
            }
            _ => SerializerOutput::Empty,
        }
    }

    fn deserialize(&self, manager: &SerializationManager, node: &CodeNode) -> PropertyValue {
        match node {
            CodeNode::Expression(expr) => super::interpreter::evaluate(manager, expr),
            _ => {
                manager.report(crate::SerializationError::UnsupportedNode(
                    "primitive deserialization expects an expression".into(),
                ));
                PropertyValue::Missing
            }
        }
    }
}
