//! The serialization manager: the session-scoped coordinator every
//! serializer calls into.
//!
//! A manager owns the serializer registry and the design environment for
//! one surface. Opening a session allocates the per-pass state — name
//! maps, expression-identity cache, diagnostics, context stack — and
//! returns a guard that tears it all down on drop. Exactly one session may
//! be open at a time; the model is single-threaded designer use, so the
//! internal locks only guard against accidental misuse, never contention.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use formloom_codemodel::{Expression, Statement, TypeDecl};
use formloom_model::{DesignEnvironment, ObjectHandle, ObjectId, PropertyValue, TypeInfo};
use parking_lot::Mutex;

use crate::context::{ClassBuildContext, ContextEntry, ContextStack, ExpressionContext, RootContext, StatementContext};
use crate::error::{SerializationError, SerializationResult};
use crate::registry::{SerializerEntry, SerializerKind, SerializerOutput, SerializerProvider, SerializerRegistry};

/// Session-wide configuration. May only change while no session is open.
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionOptions {
    /// Require exact requested names in the container instead of
    /// uniquifying on collision.
    pub preserve_names: bool,
    /// When recycling, discard a cached instance whose type no longer
    /// matches.
    pub validate_recycled_types: bool,
    /// Reuse instances already registered under the requested name instead
    /// of constructing new ones.
    pub recycle_instances: bool,
}

/// Notifications fired around session lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Created,
    Disposed,
    SerializationComplete,
}

type ResolveNameFn = Box<dyn Fn(&str) -> Option<ObjectHandle> + Send + Sync>;
type SessionListener = Box<dyn Fn(SessionEvent) + Send + Sync>;

#[derive(Default)]
struct SessionState {
    names: HashMap<String, ObjectHandle>,
    names_by_id: HashMap<ObjectId, String>,
    expressions: HashMap<ObjectId, Expression>,
    diagnostics: Vec<SerializationError>,
    contexts: ContextStack,
    /// requested name → name the container actually assigned.
    redirects: HashMap<String, String>,
    serializers: HashMap<(TypeId, SerializerKind), SerializerEntry>,
    session_providers: Vec<Arc<dyn SerializerProvider>>,
    providers_installed_for: HashSet<TypeId>,
}

/// The session-scoped coordinator.
pub struct SerializationManager {
    env: DesignEnvironment,
    registry: SerializerRegistry,
    options: Mutex<SessionOptions>,
    resolve_name: Mutex<Option<ResolveNameFn>>,
    listeners: Mutex<Vec<SessionListener>>,
    session: Mutex<Option<SessionState>>,
}

impl SerializationManager {
    pub fn new(env: DesignEnvironment) -> Self {
        Self {
            env,
            registry: SerializerRegistry::new(),
            options: Mutex::new(SessionOptions::default()),
            resolve_name: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            session: Mutex::new(None),
        }
    }

    pub fn environment(&self) -> &DesignEnvironment {
        &self.env
    }

    pub fn registry(&self) -> &SerializerRegistry {
        &self.registry
    }

    pub fn options(&self) -> SessionOptions {
        *self.options.lock()
    }

    /// Change session-wide options. Fails while a session is open.
    pub fn set_options(&self, options: SessionOptions) -> SerializationResult<()> {
        if self.is_session_open() {
            return Err(SerializationError::SessionAlreadyOpen);
        }
        *self.options.lock() = options;
        Ok(())
    }

    /// Install the callback consulted for names neither the session nor
    /// the container knows (forward references).
    pub fn set_resolve_name(
        &self,
        resolve: impl Fn(&str) -> Option<ObjectHandle> + Send + Sync + 'static,
    ) {
        *self.resolve_name.lock() = Some(Box::new(resolve));
    }

    pub fn subscribe_session(&self, listener: impl Fn(SessionEvent) + Send + Sync + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    pub fn is_session_open(&self) -> bool {
        self.session.lock().is_some()
    }

    // -----------------------------------------------------------------
    // Session lifetime
    // -----------------------------------------------------------------

    /// Open the one session this manager may have.
    pub fn open_session(&self) -> SerializationResult<SessionGuard<'_>> {
        {
            let mut slot = self.session.lock();
            if slot.is_some() {
                return Err(SerializationError::SessionAlreadyOpen);
            }
            *slot = Some(SessionState::default());
        }
        self.notify(SessionEvent::Created);
        Ok(SessionGuard {
            manager: self,
            closed: false,
        })
    }

    fn close_session_inner(&self) -> Vec<SerializationError> {
        let state = self.session.lock().take();
        let diagnostics = state.map(|s| s.diagnostics).unwrap_or_default();
        self.notify(SessionEvent::Disposed);
        self.notify(SessionEvent::SerializationComplete);
        diagnostics
    }

    fn notify(&self, event: SessionEvent) {
        // Listeners are taken out while firing so one can re-enter.
        let listeners = std::mem::take(&mut *self.listeners.lock());
        for listener in &listeners {
            listener(event);
        }
        let mut slot = self.listeners.lock();
        let added = std::mem::take(&mut *slot);
        *slot = listeners;
        slot.extend(added);
    }

    fn with_state<R>(
        &self,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> SerializationResult<R> {
        let mut slot = self.session.lock();
        match slot.as_mut() {
            Some(state) => Ok(f(state)),
            None => Err(SerializationError::NoActiveSession),
        }
    }

    // -----------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------

    /// Record a recoverable condition and keep going.
    ///
    /// Never aborts serialization of sibling objects; outside a session
    /// the diagnostic is logged and dropped.
    pub fn report(&self, error: SerializationError) {
        log::debug!("serialization diagnostic: {error}");
        if self.with_state(|state| state.diagnostics.push(error)).is_err() {
            log::warn!("diagnostic reported outside of a session");
        }
    }

    /// Snapshot of the session's accumulated diagnostics.
    pub fn diagnostics(&self) -> SerializationResult<Vec<SerializationError>> {
        self.with_state(|state| state.diagnostics.clone())
    }

    // -----------------------------------------------------------------
    // Types and instances
    // -----------------------------------------------------------------

    /// Resolve a type name: the injected resolution service first, then
    /// the global registry.
    pub fn resolve_type(&self, name: &str) -> SerializationResult<Arc<TypeInfo>> {
        self.env
            .resolution
            .get_type(name)
            .or_else(|| self.env.types.get(name))
            .ok_or_else(|| SerializationError::TypeResolution(name.to_owned()))
    }

    /// Metadata for a runtime value, resolving primitives and flag types
    /// through the registry.
    pub fn type_of_value(&self, value: &PropertyValue) -> Option<Arc<TypeInfo>> {
        match value {
            PropertyValue::Missing => None,
            PropertyValue::Object(h) => Some(h.info().clone()),
            PropertyValue::Primitive(v) => self.resolve_type(v.type_name()).ok(),
            PropertyValue::Flags { type_name, .. } => self.resolve_type(type_name).ok(),
        }
    }

    /// Construct (or recycle) an instance.
    ///
    /// With `add_to_container`, the instance is registered under `name` —
    /// the container may rename on collision, and the name actually
    /// assigned is what ends up in the session's name maps, with a
    /// redirect recorded from the requested name.
    pub fn create_instance(
        &self,
        ty: &Arc<TypeInfo>,
        args: &[PropertyValue],
        name: Option<&str>,
        add_to_container: bool,
    ) -> SerializationResult<ObjectHandle> {
        let options = self.options();

        if options.recycle_instances {
            if let Some(requested) = name {
                let cached = self
                    .with_state(|state| state.names.get(requested).cloned())?
                    .or_else(|| self.env.container.get(requested));
                if let Some(existing) = cached {
                    if options.validate_recycled_types && existing.type_name() != ty.name() {
                        log::debug!(
                            "discarding recycled instance '{requested}': type changed from {} to {}",
                            existing.type_name(),
                            ty.name()
                        );
                        self.with_state(|state| {
                            state.names.remove(requested);
                            state.names_by_id.remove(&existing.id());
                        })?;
                    } else {
                        return Ok(existing);
                    }
                }
            }
        }

        let ctor = ty
            .find_constructor(args)
            .ok_or_else(|| SerializationError::ConstructorNotFound(ty.name().to_owned()))?;
        let cell = ctor
            .construct(args)
            .map_err(|message| SerializationError::Instantiation {
                type_name: ty.name().to_owned(),
                message,
            })?;
        let instance = ObjectHandle::from_cell(ty.clone(), cell);

        if add_to_container {
            let assigned =
                self.env
                    .container
                    .add(instance.clone(), name, options.preserve_names)?;
            if let Some(requested) = name {
                if assigned != requested {
                    log::debug!("instance '{requested}' assigned name '{assigned}'");
                    self.with_state(|state| {
                        state
                            .redirects
                            .insert(requested.to_owned(), assigned.clone());
                    })?;
                }
            }
            self.set_name(&assigned, &instance)?;
        } else if let Some(requested) = name {
            self.set_name(requested, &instance)?;
        }
        Ok(instance)
    }

    /// The session name of an instance, falling back to its container
    /// site.
    pub fn name_of(&self, instance: &ObjectHandle) -> SerializationResult<Option<String>> {
        let session_name = self.with_state(|state| state.names_by_id.get(&instance.id()).cloned())?;
        Ok(session_name.or_else(|| self.env.container.name_of(instance.id())))
    }

    /// Bind `name` to `instance` in the session's bidirectional map.
    pub fn set_name(&self, name: &str, instance: &ObjectHandle) -> SerializationResult<()> {
        self.with_state(|state| {
            if let Some(bound) = state.names.get(name) {
                if !bound.same_instance(instance) {
                    return Err(SerializationError::DuplicateName(name.to_owned()));
                }
                return Ok(());
            }
            if let Some(previous) = state.names_by_id.insert(instance.id(), name.to_owned()) {
                state.names.remove(&previous);
            }
            state.names.insert(name.to_owned(), instance.clone());
            Ok(())
        })?
    }

    /// Look an instance up by name: redirect table, session map, container,
    /// then the resolve-name callback.
    pub fn instance_by_name(&self, name: &str) -> SerializationResult<Option<ObjectHandle>> {
        let (actual, cached) = self.with_state(|state| {
            let actual = state
                .redirects
                .get(name)
                .cloned()
                .unwrap_or_else(|| name.to_owned());
            let cached = state.names.get(&actual).cloned();
            (actual, cached)
        })?;
        if cached.is_some() {
            return Ok(cached);
        }
        if let Some(found) = self.env.container.get(&actual) {
            return Ok(Some(found));
        }
        Ok(self
            .resolve_name
            .lock()
            .as_ref()
            .and_then(|resolve| resolve(&actual)))
    }

    // -----------------------------------------------------------------
    // Serializer resolution
    // -----------------------------------------------------------------

    /// Resolve the serializer responsible for `(ty, kind)`.
    ///
    /// Order: session cache, the type's lazily-installed provider
    /// override, the type's directly-named serializer, then the provider
    /// chain (session-installed providers, registered providers, built-in
    /// default). `Ok(None)` means nothing answered — callers report
    /// [`SerializationError::MissingSerializer`] and skip.
    pub fn serializer_for(
        &self,
        ty: &Arc<TypeInfo>,
        kind: SerializerKind,
    ) -> SerializationResult<Option<SerializerEntry>> {
        let type_id = ty.type_id();
        if let Some(cached) =
            self.with_state(|state| state.serializers.get(&(type_id, kind)).cloned())?
        {
            return Ok(Some(cached));
        }

        if let Some(provider) = self.registry.type_provider(type_id) {
            self.with_state(|state| {
                if state.providers_installed_for.insert(type_id) {
                    state.session_providers.push(provider);
                }
            })?;
        }

        if let Some(entry) = self.registry.type_serializer(type_id, kind) {
            self.with_state(|state| {
                state.serializers.insert((type_id, kind), entry.clone());
            })?;
            return Ok(Some(entry));
        }

        let mut chain = self.with_state(|state| state.session_providers.clone())?;
        chain.extend(self.registry.providers());
        chain.push(self.registry.fallback());
        for provider in chain {
            if let Some(entry) = provider.provide(self, ty, kind) {
                self.with_state(|state| {
                    state.serializers.insert((type_id, kind), entry.clone());
                })?;
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    // -----------------------------------------------------------------
    // Expression identity cache
    // -----------------------------------------------------------------

    /// The canonical expression already produced for an instance, if any.
    pub fn cached_expression(&self, id: ObjectId) -> Option<Expression> {
        self.with_state(|state| state.expressions.get(&id).cloned())
            .ok()
            .flatten()
    }

    /// Record the canonical expression for an instance. First write wins;
    /// later references to the same instance become this expression.
    pub fn cache_expression(&self, id: ObjectId, expression: Expression) {
        let _ = self.with_state(|state| {
            state.expressions.entry(id).or_insert(expression);
        });
    }

    // -----------------------------------------------------------------
    // Context stack
    // -----------------------------------------------------------------

    /// Run `f` with `entry` pushed; the stack is restored to its previous
    /// depth on exit regardless of what `f` pushed or popped.
    pub fn with_context<R>(&self, entry: ContextEntry, f: impl FnOnce() -> R) -> R {
        let depth = self
            .with_state(|state| {
                state.contexts.push(entry);
                state.contexts.len()
            })
            .unwrap_or(0);
        let result = f();
        if depth > 0 {
            let _ = self.with_state(|state| state.contexts.truncate(depth - 1));
        }
        result
    }

    /// Like [`with_context`](Self::with_context), returning the popped
    /// entry alongside the closure result.
    pub fn with_context_take<R>(
        &self,
        entry: ContextEntry,
        f: impl FnOnce() -> R,
    ) -> (R, Option<ContextEntry>) {
        let depth = self
            .with_state(|state| {
                state.contexts.push(entry);
                state.contexts.len()
            })
            .unwrap_or(0);
        let result = f();
        if depth == 0 {
            return (result, None);
        }
        let entry = self
            .with_state(|state| {
                state.contexts.truncate(depth);
                state.contexts.pop()
            })
            .ok()
            .flatten();
        (result, entry)
    }

    /// Run `f` with a fresh statement buffer pushed, returning the
    /// statements appended during the scope.
    pub fn collect_statements<R>(
        &self,
        owner: Option<ObjectId>,
        f: impl FnOnce() -> R,
    ) -> (R, Vec<Statement>) {
        let (result, entry) =
            self.with_context_take(ContextEntry::Statements(StatementContext::new(owner)), f);
        let statements = match entry {
            Some(ContextEntry::Statements(ctx)) => ctx.statements,
            _ => Vec::new(),
        };
        (result, statements)
    }

    pub fn root_context(&self) -> Option<RootContext> {
        self.with_state(|state| state.contexts.root().cloned())
            .ok()
            .flatten()
    }

    pub fn expression_context(&self) -> Option<ExpressionContext> {
        self.with_state(|state| state.contexts.expression().cloned())
            .ok()
            .flatten()
    }

    /// Append to the innermost statement context. Returns `false` when no
    /// statement context is in scope.
    pub fn append_statement(&self, statement: Statement) -> bool {
        self.with_state(|state| match state.contexts.statements_mut() {
            Some(ctx) => {
                ctx.statements.push(statement);
                true
            }
            None => false,
        })
        .unwrap_or(false)
    }

    /// Mutate the innermost class-build context, if one is in scope.
    pub fn with_class_build<R>(
        &self,
        f: impl FnOnce(&mut ClassBuildContext) -> R,
    ) -> Option<R> {
        self.with_state(|state| state.contexts.class_build_mut().map(f))
            .ok()
            .flatten()
    }

    // -----------------------------------------------------------------
    // Expression production
    // -----------------------------------------------------------------

    /// Produce a reference-or-value expression for `value`.
    ///
    /// Fallback order, preserved exactly: the cached canonical expression;
    /// a full serializer run (an expression result is used directly); for
    /// a statements result, extraction of the first assignment with an
    /// object-creation right side (the statements themselves are spliced
    /// into the ambient statement context); and one final cache retry.
    pub fn serialize_to_expression(&self, value: &PropertyValue) -> Option<Expression> {
        let identity = value.as_object().map(ObjectHandle::id);
        if let Some(id) = identity {
            if let Some(cached) = self.cached_expression(id) {
                return Some(cached);
            }
        }

        let ty = self.type_of_value(value)?;
        let serializer = match self.serializer_for(&ty, SerializerKind::Object) {
            Ok(Some(entry)) => entry.as_object().cloned(),
            Ok(None) => None,
            Err(e) => {
                self.report(e);
                None
            }
        };

        if let Some(serializer) = serializer {
            match serializer.serialize(self, value) {
                SerializerOutput::Expression(expr) => return Some(expr),
                SerializerOutput::Statements(statements) => {
                    let extracted = extract_creation_target(&statements);
                    for statement in statements {
                        if !self.append_statement(statement) {
                            log::debug!("statement produced outside of a statement context");
                        }
                    }
                    if let Some(expr) = extracted {
                        return Some(expr);
                    }
                }
                SerializerOutput::Empty => {}
            }
        }

        identity.and_then(|id| self.cached_expression(id))
    }

    // -----------------------------------------------------------------
    // Root convenience
    // -----------------------------------------------------------------

    /// Serialize a surface root through its resolved root serializer.
    pub fn serialize_root(&self, root: &ObjectHandle) -> Option<TypeDecl> {
        let entry = match self.serializer_for(root.info(), SerializerKind::Root) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.report(SerializationError::MissingSerializer {
                    type_name: root.type_name().to_owned(),
                    kind: SerializerKind::Root,
                });
                return None;
            }
            Err(e) => {
                self.report(e);
                return None;
            }
        };
        let serializer = entry.as_root()?.clone();
        serializer.serialize_root(self, root)
    }

    /// Reconstruct a surface from a synthesized type declaration.
    pub fn deserialize_root(&self, decl: &TypeDecl) -> Option<ObjectHandle> {
        let ty = match self.resolve_type(&decl.base_type) {
            Ok(ty) => ty,
            Err(e) => {
                self.report(e);
                return None;
            }
        };
        let entry = match self.serializer_for(&ty, SerializerKind::Root) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.report(SerializationError::MissingSerializer {
                    type_name: ty.name().to_owned(),
                    kind: SerializerKind::Root,
                });
                return None;
            }
            Err(e) => {
                self.report(e);
                return None;
            }
        };
        let serializer = entry.as_root()?.clone();
        serializer.deserialize_root(self, decl)
    }
}

/// The lhs of the first assignment whose right side is an object creation
/// — the construction statement a statements-shaped serialization carries.
fn extract_creation_target(statements: &[Statement]) -> Option<Expression> {
    statements.iter().find_map(|s| match s {
        Statement::Assign {
            left,
            right: Expression::ObjectCreate { .. },
        } => Some(left.clone()),
        _ => None,
    })
}

/// Guard over the one open session. Dropping it tears the session down and
/// fires the disposed/complete notifications in order; [`close`](Self::close)
/// does the same while handing back the diagnostics batch.
pub struct SessionGuard<'m> {
    manager: &'m SerializationManager,
    closed: bool,
}

impl SessionGuard<'_> {
    pub fn manager(&self) -> &SerializationManager {
        self.manager
    }

    /// Close the session, returning the accumulated diagnostics.
    pub fn close(mut self) -> Vec<SerializationError> {
        self.closed = true;
        self.manager.close_session_inner()
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if !self.closed {
            self.manager.close_session_inner();
        }
    }
}
