//! Statement nodes and synthesized declarations.

use serde::{Deserialize, Serialize};

use crate::Expression;

/// A statement node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// Assignment of `right` into the location named by `left`.
    Assign { left: Expression, right: Expression },
    /// An expression evaluated for its side effects.
    Expression(Expression),
    /// Attach `listener` to the named event on `target`.
    AttachEvent {
        target: Expression,
        event: String,
        listener: Expression,
    },
    /// A comment carried through code generation verbatim.
    Comment(String),
}

/// A field declaration in a synthesized type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub type_name: String,
}

/// A method declaration in a synthesized type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub statements: Vec<Statement>,
}

/// A synthesized type declaration: the unit a root serializer produces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub base_type: String,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
}

impl TypeDecl {
    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// The polymorphic unit handed to a deserializer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CodeNode {
    Expression(Expression),
    Statement(Statement),
    Statements(Vec<Statement>),
    Type(TypeDecl),
}
