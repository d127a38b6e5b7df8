//! Registration-time type metadata.
//!
//! Everything the engine knows about a type is supplied up front through
//! [`TypeInfo::builder`]: properties with getter/setter closures,
//! constructor and method overload tables, flag-enum member tables, and
//! collection item enumerators. There is no runtime reflection — "find the
//! best matching constructor" is a linear scan of a table populated at
//! startup.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::object::{new_cell, AnyCell, ObjectHandle, PropertyValue};

/// How a property participates in serialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyVisibility {
    /// Serialized as a single assignment statement.
    Visible,
    /// Serialized by recursing into the value's own contents (collections,
    /// owned sub-objects); never assigned as a unit.
    Content,
    /// Never serialized.
    Hidden,
}

type Getter = Box<dyn Fn(&(dyn Any + Send + Sync)) -> PropertyValue + Send + Sync>;
type Setter = Box<dyn Fn(&mut (dyn Any + Send + Sync), PropertyValue) -> Result<(), String> + Send + Sync>;
type Predicate = Box<dyn Fn(&(dyn Any + Send + Sync)) -> bool + Send + Sync>;
type Construct = Box<dyn Fn(&[PropertyValue]) -> Result<AnyCell, String> + Send + Sync>;
type Invoke = Box<dyn Fn(&ObjectHandle, &[PropertyValue]) -> Result<PropertyValue, String> + Send + Sync>;
type ItemEnumerator = Box<dyn Fn(&(dyn Any + Send + Sync)) -> Vec<PropertyValue> + Send + Sync>;

/// Does a declared parameter type accept this runtime value?
///
/// Signed and unsigned integer literals are interchangeable; flag values
/// additionally satisfy integer parameters (the bit pattern is the value).
fn param_matches(param: &str, arg: &PropertyValue) -> bool {
    match arg {
        PropertyValue::Missing => false,
        PropertyValue::Primitive(v) => {
            let name = v.type_name();
            name == param
                || (name == "i64" && param == "u64")
                || (name == "u64" && param == "i64")
        }
        PropertyValue::Object(h) => h.type_name() == param,
        PropertyValue::Flags { type_name, .. } => {
            type_name.as_str() == param || param == "u64" || param == "i64"
        }
    }
}

// ---------------------------------------------------------------------------
// PropertyInfo
// ---------------------------------------------------------------------------

/// A single property descriptor: name, declared type, visibility, and the
/// typed accessor closures.
pub struct PropertyInfo {
    name: String,
    type_name: String,
    visibility: PropertyVisibility,
    get: Getter,
    set: Option<Setter>,
    should_serialize: Option<Predicate>,
}

impl PropertyInfo {
    /// A property backed by typed closures over the concrete component
    /// type `T`. The getter is mandatory; add a setter and predicate with
    /// [`with_setter`](Self::with_setter) /
    /// [`serialize_when`](Self::serialize_when).
    pub fn typed<T: Any>(
        name: impl Into<String>,
        type_name: impl Into<String>,
        visibility: PropertyVisibility,
        get: impl Fn(&T) -> PropertyValue + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            visibility,
            get: Box::new(move |any| match any.downcast_ref::<T>() {
                Some(v) => get(v),
                None => PropertyValue::Missing,
            }),
            set: None,
            should_serialize: None,
        }
    }

    pub fn with_setter<T: Any>(
        mut self,
        set: impl Fn(&mut T, PropertyValue) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.set = Some(Box::new(move |any, value| {
            match any.downcast_mut::<T>() {
                Some(v) => set(v, value),
                None => Err("instance type mismatch".to_owned()),
            }
        }));
        self
    }

    /// Restrict serialization to instances where `pred` holds (the
    /// property-level "should serialize" check; absent means always).
    pub fn serialize_when<T: Any>(
        mut self,
        pred: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_serialize = Some(Box::new(move |any| {
            any.downcast_ref::<T>().is_some_and(&pred)
        }));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn visibility(&self) -> PropertyVisibility {
        self.visibility
    }

    pub fn is_read_only(&self) -> bool {
        self.set.is_none()
    }

    /// Read the property off a live instance.
    pub fn get(&self, instance: &ObjectHandle) -> PropertyValue {
        instance.with(|any| (self.get)(any))
    }

    /// Write the property on a live instance.
    pub fn set(&self, instance: &ObjectHandle, value: PropertyValue) -> Result<(), String> {
        match &self.set {
            Some(set) => instance.with_mut(|any| set(any, value)),
            None => Err(format!("property '{}' is read-only", self.name)),
        }
    }

    /// The property-level serialization predicate; `true` when none is
    /// registered.
    pub fn should_serialize(&self, instance: &ObjectHandle) -> bool {
        match &self.should_serialize {
            Some(pred) => instance.with(|any| pred(any)),
            None => true,
        }
    }
}

impl fmt::Debug for PropertyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyInfo")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("visibility", &self.visibility)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventInfo
// ---------------------------------------------------------------------------

/// An event descriptor. Handler bindings live in the event-binding
/// service, not on the instance.
#[derive(Clone, Debug)]
pub struct EventInfo {
    name: String,
    listener_type: String,
}

impl EventInfo {
    pub fn new(name: impl Into<String>, listener_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listener_type: listener_type.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn listener_type(&self) -> &str {
        &self.listener_type
    }
}

// ---------------------------------------------------------------------------
// ConstructorInfo / MethodInfo
// ---------------------------------------------------------------------------

/// One entry in a type's constructor overload table.
pub struct ConstructorInfo {
    params: Vec<String>,
    construct: Construct,
}

impl ConstructorInfo {
    pub fn new(
        params: &[&str],
        construct: impl Fn(&[PropertyValue]) -> Result<AnyCell, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            params: params.iter().map(|s| (*s).to_owned()).collect(),
            construct: Box::new(construct),
        }
    }

    /// A zero-argument constructor from a plain factory closure.
    pub fn nullary<T: Any + Send + Sync>(
        factory: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            params: Vec::new(),
            construct: Box::new(move |_| Ok(new_cell(factory()))),
        }
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn accepts(&self, args: &[PropertyValue]) -> bool {
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(p, a)| param_matches(p, a))
    }

    pub fn construct(&self, args: &[PropertyValue]) -> Result<AnyCell, String> {
        (self.construct)(args)
    }
}

impl fmt::Debug for ConstructorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConstructorInfo({:?})", self.params)
    }
}

/// One entry in a type's method overload table.
pub struct MethodInfo {
    name: String,
    params: Vec<String>,
    invoke: Invoke,
}

impl MethodInfo {
    pub fn new(
        name: impl Into<String>,
        params: &[&str],
        invoke: impl Fn(&ObjectHandle, &[PropertyValue]) -> Result<PropertyValue, String>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params: params.iter().map(|s| (*s).to_owned()).collect(),
            invoke: Box::new(invoke),
        }
    }

    /// A single-argument mutating method over the concrete type `T` — the
    /// shape collection `add` operations take.
    pub fn single_arg<T: Any>(
        name: impl Into<String>,
        param: &str,
        apply: impl Fn(&mut T, &PropertyValue) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params: vec![param.to_owned()],
            invoke: Box::new(move |handle, args| {
                let arg = args.first().ok_or("missing argument")?;
                handle
                    .downcast_with_mut(|v: &mut T| apply(v, arg))
                    .ok_or("instance type mismatch".to_owned())?
                    .map(|()| PropertyValue::Missing)
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn accepts(&self, args: &[PropertyValue]) -> bool {
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(p, a)| param_matches(p, a))
    }

    pub fn invoke(
        &self,
        instance: &ObjectHandle,
        args: &[PropertyValue],
    ) -> Result<PropertyValue, String> {
        (self.invoke)(instance, args)
    }
}

impl fmt::Debug for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodInfo({} {:?})", self.name, self.params)
    }
}

// ---------------------------------------------------------------------------
// FlagsInfo
// ---------------------------------------------------------------------------

/// The member table of a flags-enum type, in declared order.
#[derive(Clone, Debug, Default)]
pub struct FlagsInfo {
    members: Vec<(String, u64)>,
}

impl FlagsInfo {
    pub fn new(members: &[(&str, u64)]) -> Self {
        Self {
            members: members
                .iter()
                .map(|(name, bits)| ((*name).to_owned(), *bits))
                .collect(),
        }
    }

    pub fn members(&self) -> &[(String, u64)] {
        &self.members
    }

    pub fn bits_of(&self, member: &str) -> Option<u64> {
        self.members
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, bits)| *bits)
    }

    /// Split a value into its constituent members, in declared order.
    ///
    /// A member is included when its bits are non-zero and fully contained
    /// in the value. A zero-valued member is returned only for an all-zero
    /// value. Returns the matched names and the bits left unaccounted for.
    pub fn decompose(&self, bits: u64) -> (Vec<&str>, u64) {
        if bits == 0 {
            let zero = self
                .members
                .iter()
                .find(|(_, b)| *b == 0)
                .map(|(name, _)| name.as_str());
            return (zero.into_iter().collect(), 0);
        }
        let mut matched = Vec::new();
        let mut covered = 0u64;
        for (name, member_bits) in &self.members {
            if *member_bits != 0 && bits & member_bits == *member_bits {
                matched.push(name.as_str());
                covered |= member_bits;
            }
        }
        (matched, bits & !covered)
    }
}

// ---------------------------------------------------------------------------
// TypeInfo
// ---------------------------------------------------------------------------

/// Complete metadata for one registered type.
pub struct TypeInfo {
    name: String,
    type_id: TypeId,
    is_component: bool,
    constructors: Vec<ConstructorInfo>,
    properties: Vec<PropertyInfo>,
    events: Vec<EventInfo>,
    methods: Vec<MethodInfo>,
    flags: Option<FlagsInfo>,
    items: Option<ItemEnumerator>,
}

impl TypeInfo {
    pub fn builder<T: Any + Send + Sync>(name: impl Into<String>) -> TypeInfoBuilder {
        TypeInfoBuilder {
            info: TypeInfo {
                name: name.into(),
                type_id: TypeId::of::<T>(),
                is_component: false,
                constructors: Vec::new(),
                properties: Vec::new(),
                events: Vec::new(),
                methods: Vec::new(),
                flags: None,
                items: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn is_component(&self) -> bool {
        self.is_component
    }

    pub fn is_collection(&self) -> bool {
        self.items.is_some()
    }

    pub fn properties(&self) -> &[PropertyInfo] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyInfo> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn events(&self) -> &[EventInfo] {
        &self.events
    }

    pub fn event(&self, name: &str) -> Option<&EventInfo> {
        self.events.iter().find(|e| e.name() == name)
    }

    pub fn flags(&self) -> Option<&FlagsInfo> {
        self.flags.as_ref()
    }

    /// First constructor overload accepting these runtime argument types.
    pub fn find_constructor(&self, args: &[PropertyValue]) -> Option<&ConstructorInfo> {
        self.constructors.iter().find(|c| c.accepts(args))
    }

    /// First method overload with this name accepting these argument types.
    pub fn find_method(&self, name: &str, args: &[PropertyValue]) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| m.name() == name && m.accepts(args))
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodInfo> {
        self.methods.iter().filter(move |m| m.name() == name)
    }

    /// Enumerate the current contents of a collection instance, if this
    /// type is a collection.
    pub fn enumerate_items(&self, instance: &ObjectHandle) -> Option<Vec<PropertyValue>> {
        let items = self.items.as_ref()?;
        Some(instance.with(|any| items(any)))
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field("is_component", &self.is_component)
            .field("properties", &self.properties.len())
            .field("events", &self.events.len())
            .finish()
    }
}

/// Builder for [`TypeInfo`].
pub struct TypeInfoBuilder {
    info: TypeInfo,
}

impl TypeInfoBuilder {
    /// Mark the type as a component: nameable, container-owned, eligible
    /// for field declarations in the synthesized root type.
    pub fn component(mut self) -> Self {
        self.info.is_component = true;
        self
    }

    pub fn constructor(mut self, ctor: ConstructorInfo) -> Self {
        self.info.constructors.push(ctor);
        self
    }

    pub fn property(mut self, property: PropertyInfo) -> Self {
        self.info.properties.push(property);
        self
    }

    pub fn event(mut self, event: EventInfo) -> Self {
        self.info.events.push(event);
        self
    }

    pub fn method(mut self, method: MethodInfo) -> Self {
        self.info.methods.push(method);
        self
    }

    pub fn flags(mut self, flags: FlagsInfo) -> Self {
        self.info.flags = Some(flags);
        self
    }

    /// Register the collection item enumerator over the concrete type `T`.
    pub fn items<T: Any>(
        mut self,
        enumerate: impl Fn(&T) -> Vec<PropertyValue> + Send + Sync + 'static,
    ) -> Self {
        self.info.items = Some(Box::new(move |any| {
            any.downcast_ref::<T>().map(&enumerate).unwrap_or_default()
        }));
        self
    }

    pub fn build(self) -> TypeInfo {
        self.info
    }
}

// ---------------------------------------------------------------------------
// TypeRegistry
// ---------------------------------------------------------------------------

/// The global name ↔ metadata registry.
///
/// Populated at startup; lookups clone `Arc`s out so nothing holds the
/// internal lock across engine recursion.
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    by_name: HashMap<String, Arc<TypeInfo>>,
    by_id: HashMap<TypeId, Arc<TypeInfo>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Register a type, replacing any previous registration of the same
    /// name.
    pub fn register(&self, info: TypeInfo) -> Arc<TypeInfo> {
        let info = Arc::new(info);
        let mut inner = self.inner.write();
        if inner.by_name.contains_key(info.name()) {
            log::warn!("type '{}' registered twice, replacing", info.name());
        }
        inner.by_name.insert(info.name().to_owned(), info.clone());
        inner.by_id.insert(info.type_id(), info.clone());
        info
    }

    pub fn get(&self, name: &str) -> Option<Arc<TypeInfo>> {
        self.inner.read().by_name.get(name).cloned()
    }

    pub fn get_by_id(&self, id: TypeId) -> Option<Arc<TypeInfo>> {
        self.inner.read().by_id.get(&id).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().by_name.contains_key(name)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the builtin primitive types.
///
/// Primitive property values carry no metadata of their own; these
/// registrations give the serializer registry something to resolve when it
/// partitions by type.
pub fn register_builtin_types(registry: &TypeRegistry) {
    registry.register(TypeInfo::builder::<()>("null").build());
    registry.register(TypeInfo::builder::<bool>("bool").build());
    registry.register(TypeInfo::builder::<i64>("i64").build());
    registry.register(TypeInfo::builder::<u64>("u64").build());
    registry.register(TypeInfo::builder::<f64>("f64").build());
    registry.register(TypeInfo::builder::<String>("string").build());
    registry.register(TypeInfo::builder::<Vec<u8>>("bytes").build());
    registry.register(TypeInfo::builder::<Vec<formloom_codemodel::Value>>("list").build());
}

#[cfg(test)]
mod tests {
    use super::*;
    use formloom_codemodel::Value;

    struct Gadget {
        size: i64,
    }

    fn gadget_info() -> TypeInfo {
        TypeInfo::builder::<Gadget>("Gadget")
            .component()
            .constructor(ConstructorInfo::nullary(|| Gadget { size: 0 }))
            .constructor(ConstructorInfo::new(&["i64"], |args| {
                let size = args[0]
                    .as_primitive()
                    .and_then(Value::as_bits)
                    .ok_or("expected integer size")? as i64;
                Ok(new_cell(Gadget { size }))
            }))
            .property(
                PropertyInfo::typed(
                    "size",
                    "i64",
                    PropertyVisibility::Visible,
                    |g: &Gadget| PropertyValue::Primitive(Value::I64(g.size)),
                )
                .with_setter(|g: &mut Gadget, v| {
                    g.size = v
                        .as_primitive()
                        .and_then(Value::as_bits)
                        .ok_or("expected integer")? as i64;
                    Ok(())
                }),
            )
            .build()
    }

    #[test]
    fn overload_resolution_picks_by_arity_and_type() {
        let info = gadget_info();
        assert!(info.find_constructor(&[]).is_some());
        let args = [PropertyValue::Primitive(Value::I64(4))];
        let ctor = info.find_constructor(&args).unwrap();
        assert_eq!(ctor.params(), ["i64"]);
        assert!(info
            .find_constructor(&[PropertyValue::Primitive(Value::from("x"))])
            .is_none());
    }

    #[test]
    fn property_round_trip_through_closures() {
        let info = Arc::new(gadget_info());
        let handle = ObjectHandle::new(info.clone(), Gadget { size: 3 });
        let prop = info.property("size").unwrap();
        assert_eq!(
            prop.get(&handle).as_primitive().and_then(Value::as_bits),
            Some(3)
        );
        prop.set(&handle, PropertyValue::Primitive(Value::I64(11)))
            .unwrap();
        assert_eq!(
            prop.get(&handle).as_primitive().and_then(Value::as_bits),
            Some(11)
        );
    }

    #[test]
    fn flags_decompose_in_declared_order() {
        let flags = FlagsInfo::new(&[("none", 0), ("top", 1), ("left", 2), ("right", 4)]);
        let (members, rest) = flags.decompose(1 | 4);
        assert_eq!(members, ["top", "right"]);
        assert_eq!(rest, 0);

        let (members, rest) = flags.decompose(0);
        assert_eq!(members, ["none"]);
        assert_eq!(rest, 0);

        let (members, rest) = flags.decompose(2 | 8);
        assert_eq!(members, ["left"]);
        assert_eq!(rest, 8);
    }

    #[test]
    fn registry_lookup_by_name_and_id() {
        let registry = TypeRegistry::new();
        let info = registry.register(gadget_info());
        assert!(registry.get("Gadget").is_some());
        assert!(registry.get_by_id(info.type_id()).is_some());
        assert!(registry.get("Widget").is_none());
    }
}
