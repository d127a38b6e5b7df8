//! The shared deserialization base: tree-walking evaluation of expression
//! and statement nodes against the live object model.
//!
//! Every case that fails to match reports a diagnostic and yields nothing;
//! nothing here aborts the enclosing pass. The best-effort loop is the
//! caller's — one bad statement must not block reconstructing the rest of
//! a large component tree.

use formloom_codemodel::{BinaryOperator, Expression, Statement, Value};
use formloom_model::{ObjectHandle, PropertyValue};

use crate::manager::SerializationManager;
use crate::SerializationError;

/// Evaluate an expression node to a live value.
pub fn evaluate(manager: &SerializationManager, expr: &Expression) -> PropertyValue {
    match expr {
        Expression::SelfRef => match root_value(manager) {
            Some(root) => PropertyValue::Object(root),
            None => {
                manager.report(SerializationError::UnsupportedNode(
                    "self reference outside of a root context".into(),
                ));
                PropertyValue::Missing
            }
        },

        Expression::VariableRef { name } => lookup_name(manager, name),

        Expression::Literal(value) => PropertyValue::Primitive(value.clone()),

        Expression::FieldRef { target, field } => {
            // A field chain rooted at self is a component name; a field on
            // a type reference is an enum member.
            if let Some(path) = expr.self_field_path() {
                return lookup_name(manager, &path);
            }
            if let Expression::TypeRef { type_name } = target.as_ref() {
                return enum_member(manager, type_name, field);
            }
            property_of_target(manager, target, field)
        }

        Expression::PropertyRef { target, property } => {
            if let Expression::TypeRef { type_name } = target.as_ref() {
                return enum_member(manager, type_name, property);
            }
            property_of_target(manager, target, property)
        }

        Expression::TypeRef { type_name } => {
            manager.report(SerializationError::UnsupportedNode(format!(
                "bare type reference '{type_name}' is not a value"
            )));
            PropertyValue::Missing
        }

        Expression::ObjectCreate { type_name, args } => {
            let ty = match manager.resolve_type(type_name) {
                Ok(ty) => ty,
                Err(e) => {
                    manager.report(e);
                    return PropertyValue::Missing;
                }
            };
            let evaluated: Vec<PropertyValue> =
                args.iter().map(|a| evaluate(manager, a)).collect();
            match manager.create_instance(&ty, &evaluated, None, ty.is_component()) {
                Ok(instance) => PropertyValue::Object(instance),
                Err(e) => {
                    manager.report(e);
                    PropertyValue::Missing
                }
            }
        }

        Expression::ArrayCreate {
            element_type,
            initializers,
        } => {
            if let Err(e) = manager.resolve_type(element_type) {
                manager.report(e);
                return PropertyValue::Missing;
            }
            let mut items = Vec::with_capacity(initializers.len());
            for init in initializers {
                match evaluate(manager, init) {
                    PropertyValue::Primitive(v) => items.push(v),
                    other => {
                        manager.report(SerializationError::UnsupportedNode(format!(
                            "array initializer of type '{}' is not a primitive",
                            other.type_name()
                        )));
                    }
                }
            }
            PropertyValue::Primitive(Value::List(items))
        }

        Expression::MethodInvoke {
            target,
            method,
            args,
        } => {
            let Some(instance) = evaluate(manager, target).as_object().cloned() else {
                manager.report(SerializationError::UnsupportedNode(format!(
                    "method '{method}' invoked on a non-object target"
                )));
                return PropertyValue::Missing;
            };
            let evaluated: Vec<PropertyValue> =
                args.iter().map(|a| evaluate(manager, a)).collect();
            let Some(found) = instance.info().find_method(method, &evaluated) else {
                manager.report(SerializationError::MethodNotFound {
                    type_name: instance.type_name().to_owned(),
                    method: method.clone(),
                });
                return PropertyValue::Missing;
            };
            match found.invoke(&instance, &evaluated) {
                Ok(result) => result,
                Err(message) => {
                    manager.report(SerializationError::UnsupportedNode(format!(
                        "invoking '{method}' failed: {message}"
                    )));
                    PropertyValue::Missing
                }
            }
        }

        Expression::Binary { left, op, right } => match op {
            BinaryOperator::BitOr => {
                let lhs = evaluate(manager, left);
                let rhs = evaluate(manager, right);
                let (Some(lbits), Some(rbits)) = (lhs.as_flag_bits(), rhs.as_flag_bits()) else {
                    manager.report(SerializationError::UnsupportedNode(
                        "bitwise OR over non-flag operands".into(),
                    ));
                    return PropertyValue::Missing;
                };
                // The combination keeps whichever side knows its enum type.
                let type_name = match (&lhs, &rhs) {
                    (PropertyValue::Flags { type_name, .. }, _)
                    | (_, PropertyValue::Flags { type_name, .. }) => type_name.clone(),
                    _ => {
                        manager.report(SerializationError::UnsupportedNode(
                            "bitwise OR with no flags-typed operand".into(),
                        ));
                        return PropertyValue::Missing;
                    }
                };
                PropertyValue::Flags {
                    type_name,
                    bits: lbits | rbits,
                }
            }
        },

        Expression::Delegate { .. } | Expression::MethodRef { .. } => {
            manager.report(SerializationError::UnsupportedNode(
                "listener expressions are only valid in event attachment".into(),
            ));
            PropertyValue::Missing
        }
    }
}

/// Execute a statement node.
pub fn execute(manager: &SerializationManager, statement: &Statement) {
    match statement {
        Statement::Assign { left, right } => execute_assignment(manager, left, right),

        Statement::Expression(expr) => {
            evaluate(manager, expr);
        }

        Statement::AttachEvent {
            target,
            event,
            listener,
        } => {
            let Some(handler) = listener_method(listener) else {
                manager.report(SerializationError::UnsupportedNode(
                    "unrecognized listener expression shape".into(),
                ));
                return;
            };
            let Some(instance) = evaluate(manager, target).as_object().cloned() else {
                manager.report(SerializationError::UnsupportedNode(format!(
                    "event '{event}' attached to a non-object target"
                )));
                return;
            };
            manager
                .environment()
                .events
                .bind(instance.id(), event, Some(handler.to_owned()));
        }

        Statement::Comment(_) => {}
    }
}

/// Execute statements in source order.
pub fn execute_all(manager: &SerializationManager, statements: &[Statement]) {
    for statement in statements {
        execute(manager, statement);
    }
}

fn execute_assignment(manager: &SerializationManager, left: &Expression, right: &Expression) {
    match left {
        Expression::PropertyRef { target, property } => {
            let Some(instance) = evaluate(manager, target).as_object().cloned() else {
                manager.report(SerializationError::UnsupportedNode(format!(
                    "property '{property}' assigned on a non-object target"
                )));
                return;
            };
            let value = evaluate(manager, right);
            set_property(manager, &instance, property, value);
        }

        Expression::FieldRef { target, field } => {
            // A field chain on self binds the value under the field path —
            // construction right sides go through create_instance so the
            // requested name is the field name and collision renames are
            // redirected.
            if let Some(path) = left.self_field_path() {
                let value = match right {
                    Expression::ObjectCreate { type_name, args } => {
                        create_named(manager, type_name, args, &path)
                    }
                    other => evaluate(manager, other),
                };
                let Some(instance) = value.as_object().cloned() else {
                    manager.report(SerializationError::UnsupportedNode(format!(
                        "field '{path}' assigned a non-object value"
                    )));
                    return;
                };
                if manager.instance_by_name(&path).ok().flatten().is_none() {
                    if let Err(e) = manager.set_name(&path, &instance) {
                        manager.report(e);
                    }
                }
                return;
            }
            if matches!(target.as_ref(), Expression::TypeRef { .. }) {
                manager.report(SerializationError::UnsupportedNode(format!(
                    "static field '{field}' assignment"
                )));
                return;
            }
            // On another instance, fall back to a same-named property.
            let Some(instance) = evaluate(manager, target).as_object().cloned() else {
                manager.report(SerializationError::UnsupportedNode(format!(
                    "field '{field}' assigned on a non-object target"
                )));
                return;
            };
            let value = evaluate(manager, right);
            set_property(manager, &instance, field, value);
        }

        Expression::VariableRef { name } => {
            let value = match right {
                Expression::ObjectCreate { type_name, args } => {
                    create_named(manager, type_name, args, name)
                }
                other => evaluate(manager, other),
            };
            if let Some(instance) = value.as_object().cloned() {
                if manager.instance_by_name(name).ok().flatten().is_none() {
                    if let Err(e) = manager.set_name(name, &instance) {
                        manager.report(e);
                    }
                }
            }
        }

        other => {
            manager.report(SerializationError::UnsupportedNode(format!(
                "assignment target {other:?}"
            )));
        }
    }
}

/// Construct an instance for a named assignment, requesting the assignment
/// target's name so collision redirection sees the original.
fn create_named(
    manager: &SerializationManager,
    type_name: &str,
    args: &[Expression],
    name: &str,
) -> PropertyValue {
    let ty = match manager.resolve_type(type_name) {
        Ok(ty) => ty,
        Err(e) => {
            manager.report(e);
            return PropertyValue::Missing;
        }
    };
    let evaluated: Vec<PropertyValue> = args.iter().map(|a| evaluate(manager, a)).collect();
    match manager.create_instance(&ty, &evaluated, Some(name), ty.is_component()) {
        Ok(instance) => PropertyValue::Object(instance),
        Err(e) => {
            manager.report(e);
            PropertyValue::Missing
        }
    }
}

fn set_property(
    manager: &SerializationManager,
    instance: &ObjectHandle,
    property: &str,
    value: PropertyValue,
) {
    let ty = instance.info().clone();
    let Some(descriptor) = ty.property(property) else {
        manager.report(SerializationError::UnsupportedNode(format!(
            "type '{}' has no property '{property}'",
            instance.type_name()
        )));
        return;
    };
    if let Err(message) = descriptor.set(instance, value) {
        // A failed setter is logged and recorded, never fatal.
        log::warn!(
            "setter for '{}.{property}' failed: {message}",
            instance.type_name()
        );
        manager.report(SerializationError::PropertySet {
            property: property.to_owned(),
            message,
        });
    }
}

/// The handler method name carried by a listener expression, accepting the
/// three shapes event attachments use.
fn listener_method(listener: &Expression) -> Option<&str> {
    match listener {
        Expression::Delegate { method, .. } => Some(method),
        Expression::MethodRef { method, .. } => Some(method),
        Expression::ObjectCreate { args, .. } => match args.as_slice() {
            [Expression::MethodRef { method, .. }] => Some(method),
            [Expression::Delegate { method, .. }] => Some(method),
            _ => None,
        },
        _ => None,
    }
}

fn root_value(manager: &SerializationManager) -> Option<ObjectHandle> {
    manager
        .root_context()
        .map(|ctx| ctx.value)
        .or_else(|| manager.environment().container.root())
}

fn lookup_name(manager: &SerializationManager, name: &str) -> PropertyValue {
    match manager.instance_by_name(name) {
        Ok(Some(instance)) => PropertyValue::Object(instance),
        Ok(None) => {
            manager.report(SerializationError::UnsupportedNode(format!(
                "unresolved reference '{name}'"
            )));
            PropertyValue::Missing
        }
        Err(e) => {
            manager.report(e);
            PropertyValue::Missing
        }
    }
}

fn enum_member(manager: &SerializationManager, type_name: &str, member: &str) -> PropertyValue {
    let ty = match manager.resolve_type(type_name) {
        Ok(ty) => ty,
        Err(e) => {
            manager.report(e);
            return PropertyValue::Missing;
        }
    };
    let Some(bits) = ty.flags().and_then(|f| f.bits_of(member)) else {
        manager.report(SerializationError::UnsupportedNode(format!(
            "'{member}' is not a member of '{type_name}'"
        )));
        return PropertyValue::Missing;
    };
    PropertyValue::Flags {
        type_name: type_name.to_owned(),
        bits,
    }
}

fn property_of_target(
    manager: &SerializationManager,
    target: &Expression,
    property: &str,
) -> PropertyValue {
    let Some(instance) = evaluate(manager, target).as_object().cloned() else {
        manager.report(SerializationError::UnsupportedNode(format!(
            "property '{property}' read from a non-object target"
        )));
        return PropertyValue::Missing;
    };
    match instance.info().property(property) {
        Some(descriptor) => descriptor.get(&instance),
        None => {
            manager.report(SerializationError::UnsupportedNode(format!(
                "type '{}' has no property '{property}'",
                instance.type_name()
            )));
            PropertyValue::Missing
        }
    }
}
