//! Flag-enum values as left-associative bitwise-OR chains.

use formloom_codemodel::{CodeNode, Expression, Value};
use formloom_model::PropertyValue;

use crate::manager::SerializationManager;
use crate::registry::{Serializer, SerializerOutput};
use crate::SerializationError;

pub struct FlagsSerializer;

impl Serializer for FlagsSerializer {
    fn serialize(&self, manager: &SerializationManager, value: &PropertyValue) -> SerializerOutput {
        let PropertyValue::Flags { type_name, bits } = value else {
            return SerializerOutput::Empty;
        };
        let ty = match manager.resolve_type(type_name) {
            Ok(ty) => ty,
            Err(e) => {
                manager.report(e);
                return SerializerOutput::Empty;
            }
        };
        let Some(flags) = ty.flags() else {
            manager.report(SerializationError::UnsupportedNode(format!(
                "type '{type_name}' is not a flags enum"
            )));
            return SerializerOutput::Empty;
        };

        let (members, remainder) = flags.decompose(*bits);
        if members.is_empty() {
            // No named member covers the value; fall back to the raw bits.
            return SerializerOutput::Expression(Expression::Literal(Value::U64(*bits)));
        }
        if remainder != 0 {
            log::debug!("flags value {bits:#b} of '{type_name}' has unnamed bits {remainder:#b}");
        }

        let mut expr: Option<Expression> = None;
        for member in members {
            let field = Expression::field(Expression::type_ref(type_name.clone()), member);
            expr = Some(match expr {
                Some(left) => Expression::bit_or(left, field),
                None => field,
            });
        }
        match expr {
            Some(expr) => SerializerOutput::Expression(expr),
            None => SerializerOutput::Empty,
        }
    }

    fn deserialize(&self, manager: &SerializationManager, node: &CodeNode) -> PropertyValue {
        match node {
            CodeNode::Expression(expr) => super::interpreter::evaluate(manager, expr),
            _ => {
                manager.report(SerializationError::UnsupportedNode(
                    "flags deserialization expects an expression".into(),
                ));
                PropertyValue::Missing
            }
        }
    }
}
