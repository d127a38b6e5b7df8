//! The fallback for unrecognized object types.
//!
//! Registered explicitly per type by hosts that want "silently skip" for
//! opaque values instead of a missing-serializer diagnostic.

use formloom_codemodel::CodeNode;
use formloom_model::PropertyValue;

use crate::manager::SerializationManager;
use crate::registry::{Serializer, SerializerOutput};

pub struct GenericObjectSerializer;

impl Serializer for GenericObjectSerializer {
    fn serialize(&self, _manager: &SerializationManager, value: &PropertyValue) -> SerializerOutput {
        log::debug!("no serialization for value of type '{}'", value.type_name());
        SerializerOutput::Empty
    }

    fn deserialize(&self, _manager: &SerializationManager, _node: &CodeNode) -> PropertyValue {
        PropertyValue::Missing
    }
}
