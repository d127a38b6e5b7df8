//! Expression nodes.

use serde::{Deserialize, Serialize};

use crate::Value;

/// Binary operators understood by the engine.
///
/// Only bitwise OR is produced today (flag-enum combinations); the enum is
/// closed so interpreters can match exhaustively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    BitOr,
}

/// An expression node.
///
/// Expressions carry no object identity; two structurally equal references
/// denote the same thing only because they name the same thing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// The object being declared ("self" in the synthesized type).
    SelfRef,
    /// A named local or forward reference.
    VariableRef { name: String },
    /// A field access on a target expression.
    FieldRef {
        target: Box<Expression>,
        field: String,
    },
    /// A property access on a target expression.
    PropertyRef {
        target: Box<Expression>,
        property: String,
    },
    /// A reference to a type by registered name.
    TypeRef { type_name: String },
    /// A primitive literal.
    Literal(Value),
    /// Constructor invocation.
    ObjectCreate {
        type_name: String,
        args: Vec<Expression>,
    },
    /// Array allocation with element initializers.
    ArrayCreate {
        element_type: String,
        initializers: Vec<Expression>,
    },
    /// Method invocation on a target expression.
    MethodInvoke {
        target: Box<Expression>,
        method: String,
        args: Vec<Expression>,
    },
    /// Binary operator application.
    Binary {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    /// A delegate value binding a method on a target.
    Delegate {
        target: Box<Expression>,
        method: String,
    },
    /// A bare method reference (listener shorthand).
    MethodRef {
        target: Box<Expression>,
        method: String,
    },
}

impl Expression {
    pub fn variable(name: impl Into<String>) -> Self {
        Expression::VariableRef { name: name.into() }
    }

    pub fn field(target: Expression, field: impl Into<String>) -> Self {
        Expression::FieldRef {
            target: Box::new(target),
            field: field.into(),
        }
    }

    pub fn property(target: Expression, property: impl Into<String>) -> Self {
        Expression::PropertyRef {
            target: Box::new(target),
            property: property.into(),
        }
    }

    pub fn type_ref(type_name: impl Into<String>) -> Self {
        Expression::TypeRef {
            type_name: type_name.into(),
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn invoke(target: Expression, method: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::MethodInvoke {
            target: Box::new(target),
            method: method.into(),
            args,
        }
    }

    pub fn bit_or(left: Expression, right: Expression) -> Self {
        Expression::Binary {
            left: Box::new(left),
            op: BinaryOperator::BitOr,
            right: Box::new(right),
        }
    }

    /// Expand a dot-separated component path into a chain of field
    /// references rooted at `target`.
    ///
    /// `"panel1.header"` on [`Expression::SelfRef`] becomes
    /// `self.panel1.header` — nested component names stay addressable
    /// through their logical owner.
    pub fn nested_field(target: Expression, path: &str) -> Self {
        path.split('.').fold(target, |t, segment| Expression::FieldRef {
            target: Box::new(t),
            field: segment.to_owned(),
        })
    }

    /// Collapse a field-reference chain rooted at [`Expression::SelfRef`]
    /// back into its dotted path, if the expression has that shape.
    pub fn self_field_path(&self) -> Option<String> {
        match self {
            Expression::SelfRef => Some(String::new()),
            Expression::FieldRef { target, field } => {
                let prefix = target.self_field_path()?;
                if prefix.is_empty() {
                    Some(field.clone())
                } else {
                    Some(format!("{prefix}.{field}"))
                }
            }
            _ => None,
        }
    }
}
