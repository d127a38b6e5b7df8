//! The per-session context stack.
//!
//! Serializers recurse into each other without threading every parameter
//! explicitly; instead the session carries a LIFO list of tagged ambient
//! hints. Later entries shadow earlier ones of the same tag but do not
//! remove them, and every entry pushed during a recursive call is popped
//! before that call returns — callers go through
//! [`SerializationManager::with_context`](crate::SerializationManager::with_context),
//! which restores the stack depth on scope exit, so the nesting invariant
//! holds structurally rather than by push/pop discipline.

use formloom_codemodel::{Expression, FieldDecl, Statement};
use formloom_model::{ObjectHandle, ObjectId};

/// The top-level object being serialized or deserialized, plus the
/// expression that refers to "self".
#[derive(Clone)]
pub struct RootContext {
    pub value: ObjectHandle,
    pub expression: Expression,
}

/// An in-progress expression: what the value currently being serialized
/// will be assigned to or referenced as.
#[derive(Clone)]
pub struct ExpressionContext {
    pub expression: Expression,
    /// Declared type of the target location, when known.
    pub declared_type: Option<String>,
    /// The object logically owning the target location.
    pub owner: Option<ObjectHandle>,
    /// When set, the named instance must be serialized in full rather than
    /// as a bare reference.
    pub preset: Option<ObjectHandle>,
    /// Serialize members unconditionally, ignoring should-serialize
    /// filtering.
    pub absolute: bool,
}

impl ExpressionContext {
    pub fn new(expression: Expression) -> Self {
        Self {
            expression,
            declared_type: None,
            owner: None,
            preset: None,
            absolute: false,
        }
    }

    pub fn presets(&self, instance: &ObjectHandle) -> bool {
        self.preset
            .as_ref()
            .is_some_and(|p| p.same_instance(instance))
    }
}

/// The statement collection newly produced statements are appended to,
/// optionally scoped to one instance.
pub struct StatementContext {
    pub owner: Option<ObjectId>,
    pub statements: Vec<Statement>,
}

impl StatementContext {
    pub fn new(owner: Option<ObjectId>) -> Self {
        Self {
            owner,
            statements: Vec::new(),
        }
    }
}

/// Accumulator for the synthesized root type: field declarations and the
/// three ordered statement buckets. Pushed by the root serializer only.
#[derive(Default)]
pub struct ClassBuildContext {
    pub fields: Vec<FieldDecl>,
    pub pre_init: Vec<Statement>,
    pub init: Vec<Statement>,
    pub post_init: Vec<Statement>,
}

impl ClassBuildContext {
    /// The synthesized initialization method body, in bucket order.
    pub fn into_statements(self) -> Vec<Statement> {
        let mut statements = self.pre_init;
        statements.extend(self.init);
        statements.extend(self.post_init);
        statements
    }
}

/// A tagged ambient hint on the context stack.
pub enum ContextEntry {
    Root(RootContext),
    Expression(ExpressionContext),
    Statements(StatementContext),
    ClassBuild(ClassBuildContext),
}

/// The session's LIFO hint list. Lookup by tag returns the most recently
/// pushed match.
#[derive(Default)]
pub(crate) struct ContextStack {
    entries: Vec<ContextEntry>,
}

impl ContextStack {
    pub fn push(&mut self, entry: ContextEntry) {
        self.entries.push(entry);
    }

    pub fn pop(&mut self) -> Option<ContextEntry> {
        self.entries.pop()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    pub fn root(&self) -> Option<&RootContext> {
        self.entries.iter().rev().find_map(|e| match e {
            ContextEntry::Root(c) => Some(c),
            _ => None,
        })
    }

    pub fn expression(&self) -> Option<&ExpressionContext> {
        self.entries.iter().rev().find_map(|e| match e {
            ContextEntry::Expression(c) => Some(c),
            _ => None,
        })
    }

    pub fn statements_mut(&mut self) -> Option<&mut StatementContext> {
        self.entries.iter_mut().rev().find_map(|e| match e {
            ContextEntry::Statements(c) => Some(c),
            _ => None,
        })
    }

    pub fn class_build_mut(&mut self) -> Option<&mut ClassBuildContext> {
        self.entries.iter_mut().rev().find_map(|e| match e {
            ContextEntry::ClassBuild(c) => Some(c),
            _ => None,
        })
    }
}
