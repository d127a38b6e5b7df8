//! The component container.
//!
//! An ordered name → instance map with a designated root, auto-uniquified
//! names, and before/after change notifications. Listeners are taken out
//! of the listener list while firing so a handler can call back into the
//! container without deadlocking.

use std::fmt;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::object::{ObjectHandle, ObjectId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("a component named '{0}' already exists")]
    DuplicateName(String),
    #[error("no component named '{0}'")]
    NotFound(String),
    #[error("invalid component name '{0}'")]
    InvalidName(String),
}

/// A change notification fired by the container.
///
/// `*ing` variants fire before the mutation, `*ed` variants after.
#[derive(Clone)]
pub enum ContainerEvent {
    Adding { name: String },
    Added { name: String, component: ObjectHandle },
    Removing { name: String, component: ObjectHandle },
    Removed { name: String },
    Changing { component: ObjectHandle, member: Option<String> },
    Changed { component: ObjectHandle, member: Option<String> },
    Renaming { old_name: String, new_name: String },
    Renamed { old_name: String, new_name: String, component: ObjectHandle },
}

impl fmt::Debug for ContainerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerEvent::Adding { name } => write!(f, "Adding({name})"),
            ContainerEvent::Added { name, .. } => write!(f, "Added({name})"),
            ContainerEvent::Removing { name, .. } => write!(f, "Removing({name})"),
            ContainerEvent::Removed { name } => write!(f, "Removed({name})"),
            ContainerEvent::Changing { member, .. } => write!(f, "Changing({member:?})"),
            ContainerEvent::Changed { member, .. } => write!(f, "Changed({member:?})"),
            ContainerEvent::Renaming { old_name, new_name } => {
                write!(f, "Renaming({old_name} -> {new_name})")
            }
            ContainerEvent::Renamed { old_name, new_name, .. } => {
                write!(f, "Renamed({old_name} -> {new_name})")
            }
        }
    }
}

type ChangeListener = Box<dyn Fn(&ContainerEvent) + Send + Sync>;

#[derive(Default)]
struct ContainerInner {
    /// Insertion-ordered (name, component) pairs; names are unique.
    items: Vec<(String, ObjectHandle)>,
    root: Option<ObjectId>,
}

/// The component container.
pub struct Container {
    inner: RwLock<ContainerInner>,
    listeners: Mutex<Vec<ChangeListener>>,
    notifications_enabled: Mutex<bool>,
}

impl Container {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ContainerInner::default()),
            listeners: Mutex::new(Vec::new()),
            notifications_enabled: Mutex::new(true),
        }
    }

    /// Add a component under `name`.
    ///
    /// With `exact`, a name collision is an error. Otherwise the container
    /// silently renames by appending a numeric suffix. A `None` name is
    /// derived from the component's type name. Returns the name actually
    /// assigned, which callers must re-read rather than assuming the
    /// requested one.
    pub fn add(
        &self,
        component: ObjectHandle,
        name: Option<&str>,
        exact: bool,
    ) -> Result<String, ContainerError> {
        let requested = match name {
            Some(n) => {
                validate_name_syntax(n)?;
                n.to_owned()
            }
            None => default_name(component.type_name()),
        };

        let assigned = {
            let inner = self.inner.read();
            if !contains_name(&inner, &requested) {
                requested.clone()
            } else if exact {
                return Err(ContainerError::DuplicateName(requested));
            } else {
                let unique = uniquify(&inner, &requested);
                log::debug!("container renamed '{requested}' to '{unique}' on collision");
                unique
            }
        };

        self.emit(ContainerEvent::Adding {
            name: assigned.clone(),
        });
        self.inner
            .write()
            .items
            .push((assigned.clone(), component.clone()));
        self.emit(ContainerEvent::Added {
            name: assigned.clone(),
            component,
        });
        Ok(assigned)
    }

    pub fn remove(&self, name: &str) -> Option<ObjectHandle> {
        let (index, component) = {
            let inner = self.inner.read();
            let index = inner.items.iter().position(|(n, _)| n == name)?;
            (index, inner.items[index].1.clone())
        };
        self.emit(ContainerEvent::Removing {
            name: name.to_owned(),
            component: component.clone(),
        });
        {
            let mut inner = self.inner.write();
            // Re-check: a listener may have mutated the container.
            if index < inner.items.len() && inner.items[index].0 == name {
                inner.items.remove(index);
            } else if let Some(i) = inner.items.iter().position(|(n, _)| n == name) {
                inner.items.remove(i);
            }
            if inner.root == Some(component.id()) {
                inner.root = None;
            }
        }
        self.emit(ContainerEvent::Removed {
            name: name.to_owned(),
        });
        Some(component)
    }

    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<(), ContainerError> {
        validate_name_syntax(new_name)?;
        let component = {
            let inner = self.inner.read();
            if contains_name(&inner, new_name) {
                return Err(ContainerError::DuplicateName(new_name.to_owned()));
            }
            inner
                .items
                .iter()
                .find(|(n, _)| n == old_name)
                .map(|(_, c)| c.clone())
                .ok_or_else(|| ContainerError::NotFound(old_name.to_owned()))?
        };
        self.emit(ContainerEvent::Renaming {
            old_name: old_name.to_owned(),
            new_name: new_name.to_owned(),
        });
        {
            let mut inner = self.inner.write();
            if let Some(entry) = inner.items.iter_mut().find(|(n, _)| n == old_name) {
                entry.0 = new_name.to_owned();
            }
        }
        self.emit(ContainerEvent::Renamed {
            old_name: old_name.to_owned(),
            new_name: new_name.to_owned(),
            component,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ObjectHandle> {
        self.inner
            .read()
            .items
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.clone())
    }

    pub fn name_of(&self, id: ObjectId) -> Option<String> {
        self.inner
            .read()
            .items
            .iter()
            .find(|(_, c)| c.id() == id)
            .map(|(n, _)| n.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        contains_name(&self.inner.read(), name)
    }

    /// Snapshot of all (name, component) pairs in insertion order.
    pub fn components(&self) -> Vec<(String, ObjectHandle)> {
        self.inner.read().items.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }

    pub fn set_root(&self, component: &ObjectHandle) {
        self.inner.write().root = Some(component.id());
    }

    pub fn root(&self) -> Option<ObjectHandle> {
        let inner = self.inner.read();
        let root = inner.root?;
        inner
            .items
            .iter()
            .find(|(_, c)| c.id() == root)
            .map(|(_, c)| c.clone())
    }

    /// Announce an external mutation of a component (or one of its
    /// members); fires Changing then Changed.
    pub fn notify_changed(&self, component: &ObjectHandle, member: Option<&str>) {
        self.emit(ContainerEvent::Changing {
            component: component.clone(),
            member: member.map(str::to_owned),
        });
        self.emit(ContainerEvent::Changed {
            component: component.clone(),
            member: member.map(str::to_owned),
        });
    }

    pub fn subscribe(&self, listener: impl Fn(&ContainerEvent) + Send + Sync + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Suppress or restore change notifications (used while a surface is
    /// being torn down for reload).
    pub fn set_notifications_enabled(&self, enabled: bool) {
        *self.notifications_enabled.lock() = enabled;
    }

    fn emit(&self, event: ContainerEvent) {
        if !*self.notifications_enabled.lock() {
            return;
        }
        // Take the handlers out while firing so a listener can re-enter.
        let listeners = std::mem::take(&mut *self.listeners.lock());
        for listener in &listeners {
            listener(&event);
        }
        let mut slot = self.listeners.lock();
        let added = std::mem::take(&mut *slot);
        *slot = listeners;
        slot.extend(added);
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

fn contains_name(inner: &ContainerInner, name: &str) -> bool {
    inner.items.iter().any(|(n, _)| n == name)
}

fn uniquify(inner: &ContainerInner, requested: &str) -> String {
    let mut counter = 2;
    loop {
        let candidate = format!("{requested}{counter}");
        if !contains_name(inner, &candidate) {
            return candidate;
        }
        counter += 1;
    }
}

fn default_name(type_name: &str) -> String {
    let mut name = type_name.to_lowercase();
    if name.is_empty() {
        name.push_str("component");
    }
    name.push('1');
    name
}

fn validate_name_syntax(name: &str) -> Result<(), ContainerError> {
    let valid = !name.is_empty()
        && name.split('.').all(|segment| {
            !segment.is_empty()
                && segment.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(ContainerError::InvalidName(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::typeinfo::TypeInfo;

    struct Thing;

    fn handle() -> ObjectHandle {
        ObjectHandle::new(Arc::new(TypeInfo::builder::<Thing>("Thing").build()), Thing)
    }

    #[test]
    fn collision_renames_unless_exact() {
        let container = Container::new();
        assert_eq!(container.add(handle(), Some("a"), false).unwrap(), "a");
        assert_eq!(container.add(handle(), Some("a"), false).unwrap(), "a2");
        assert_eq!(container.add(handle(), Some("a"), false).unwrap(), "a3");
        assert_eq!(
            container.add(handle(), Some("a"), true),
            Err(ContainerError::DuplicateName("a".into()))
        );
    }

    #[test]
    fn default_names_derive_from_type() {
        let container = Container::new();
        assert_eq!(container.add(handle(), None, false).unwrap(), "thing1");
        assert_eq!(container.add(handle(), None, false).unwrap(), "thing12");
    }

    #[test]
    fn name_syntax_is_validated() {
        let container = Container::new();
        assert!(container.add(handle(), Some("1bad"), false).is_err());
        assert!(container.add(handle(), Some("ok.nested"), false).is_ok());
        assert!(container.add(handle(), Some("bad..dots"), false).is_err());
    }

    #[test]
    fn notifications_fire_in_order_and_can_be_disabled() {
        let container = Container::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        container.subscribe(move |event| {
            match (seen.fetch_add(1, Ordering::SeqCst), event) {
                (0, ContainerEvent::Adding { .. }) | (1, ContainerEvent::Added { .. }) => {}
                (n, e) => panic!("unexpected event {e:?} at {n}"),
            }
        });
        container.add(handle(), Some("a"), false).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        container.set_notifications_enabled(false);
        container.add(handle(), Some("b"), false).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn remove_and_root_tracking() {
        let container = Container::new();
        let h = handle();
        container.add(h.clone(), Some("a"), false).unwrap();
        container.set_root(&h);
        assert!(container.root().is_some());
        assert!(container.remove("a").is_some());
        assert!(container.root().is_none());
        assert!(container.remove("a").is_none());
    }
}
