//! The load / flush / reload lifecycle of a designer surface.
//!
//! A [`DesignLoader`] drives an abstract [`LoaderDelegate`] (the concrete
//! loader supplied by the host) through the Unloaded → Loading → Loaded
//! states, with a reentrancy-guarded flush, modification tracking fed by
//! container change notifications, dependency-counted nested loads, and a
//! schedulable deferred reload.
//!
//! Errors raised by the delegate during a load are collected into the load
//! batch rather than propagated; the batch is handed to the end-load
//! listeners, and whether it is empty is what drives "needs attention"
//! behavior in the host.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{SerializationError, SerializationResult};
use crate::manager::SerializationManager;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

/// How a reload should run.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReloadOptions {
    /// Reload synchronously instead of deferring to the next idle point.
    pub force: bool,
    /// Skip the flush that normally precedes a reload.
    pub no_flush: bool,
    /// Mark the surface modified when the reload fails.
    pub modify_on_error: bool,
}

/// The concrete loader: how this surface's backing source is read and
/// written.
pub trait LoaderDelegate: Send + Sync {
    /// Populate the surface. Runs inside an open session on the host
    /// manager; errors are collected into the load batch, not propagated.
    fn perform_load(&mut self, manager: &SerializationManager) -> SerializationResult<()>;

    /// Persist the surface. Runs inside an open session on the host
    /// manager.
    fn perform_flush(&mut self, manager: &SerializationManager) -> SerializationResult<()>;

    /// Re-read the backing source before a reload.
    fn refresh_source(&mut self) {}

    /// Hook invoked when a flush fails; the loader has already recorded
    /// the error as its last error.
    fn report_flush_error(&mut self, _error: &SerializationError) {}
}

type BeginLoadListener = Box<dyn Fn() + Send + Sync>;
type EndLoadListener = Box<dyn Fn(bool, &[SerializationError]) + Send + Sync>;

struct LoaderInner {
    state: LoadState,
    host: Option<Arc<SerializationManager>>,
    delegate: Option<Box<dyn LoaderDelegate>>,
    flushing: bool,
    modified: bool,
    /// `None` = unset; `Some(n)` = n outstanding dependent loads.
    dependencies: Option<u32>,
    batch_success: bool,
    batch_errors: Vec<SerializationError>,
    pending_reload: Option<ReloadOptions>,
    reload_in_progress: Option<ReloadOptions>,
    last_error: Option<SerializationError>,
    subscribed: bool,
    begin_listeners: Vec<BeginLoadListener>,
    end_listeners: Vec<EndLoadListener>,
}

/// The lifecycle state machine for one designer surface.
pub struct DesignLoader {
    inner: Arc<Mutex<LoaderInner>>,
}

impl DesignLoader {
    pub fn new(delegate: impl LoaderDelegate + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LoaderInner {
                state: LoadState::Unloaded,
                host: None,
                delegate: Some(Box::new(delegate)),
                flushing: false,
                modified: false,
                dependencies: None,
                batch_success: true,
                batch_errors: Vec::new(),
                pending_reload: None,
                reload_in_progress: None,
                last_error: None,
                subscribed: false,
                begin_listeners: Vec::new(),
                end_listeners: Vec::new(),
            })),
        }
    }

    pub fn state(&self) -> LoadState {
        self.inner.lock().state
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == LoadState::Loaded
    }

    pub fn is_modified(&self) -> bool {
        self.inner.lock().modified
    }

    pub fn set_modified(&self, modified: bool) {
        self.inner.lock().modified = modified;
    }

    pub fn last_error(&self) -> Option<SerializationError> {
        self.inner.lock().last_error.clone()
    }

    pub fn on_begin_load(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.inner.lock().begin_listeners.push(Box::new(listener));
    }

    pub fn on_end_load(
        &self,
        listener: impl Fn(bool, &[SerializationError]) + Send + Sync + 'static,
    ) {
        self.inner.lock().end_listeners.push(Box::new(listener));
    }

    // -----------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------

    /// Load the surface from its backing source.
    ///
    /// Fails if the surface is already loaded or the loader is bound to a
    /// different host. The delegate runs inside an open session; its
    /// errors and the session's diagnostics become the load batch.
    pub fn begin_load(&self, host: &Arc<SerializationManager>) -> SerializationResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.state == LoadState::Loaded {
                return Err(SerializationError::AlreadyLoaded);
            }
            if let Some(bound) = &inner.host {
                if !Arc::ptr_eq(bound, host) {
                    return Err(SerializationError::HostMismatch);
                }
            }
            inner.host = Some(host.clone());
        }
        self.subscribe_to_container(host);

        self.add_load_dependency();

        let mut errors = Vec::new();
        let mut success = true;
        if let Some(mut delegate) = self.take_delegate() {
            match host.open_session() {
                Ok(session) => {
                    if let Err(e) = delegate.perform_load(host) {
                        success = false;
                        errors.push(e);
                    }
                    errors.extend(session.close());
                }
                Err(e) => {
                    success = false;
                    errors.push(e);
                }
            }
            self.restore_delegate(delegate);
        } else {
            success = false;
            errors.push(SerializationError::AlreadyLoaded);
        }

        self.dependent_load_complete(success, errors);
        Ok(())
    }

    /// Register one more participant in the current logical load. The
    /// unset → 1 transition fires the begin-load notification.
    pub fn add_load_dependency(&self) {
        let first = {
            let mut inner = self.inner.lock();
            match inner.dependencies.as_mut() {
                None => {
                    inner.dependencies = Some(1);
                    inner.state = LoadState::Loading;
                    inner.batch_success = true;
                    inner.batch_errors.clear();
                    true
                }
                Some(n) => {
                    *n += 1;
                    false
                }
            }
        };
        if first {
            self.fire_begin_load();
        }
    }

    /// One participant finished. Only when the count reaches zero does the
    /// logical load end, with the accumulated success flag and error
    /// batch.
    pub fn dependent_load_complete(&self, success: bool, errors: Vec<SerializationError>) {
        let finished = {
            let mut inner = self.inner.lock();
            inner.batch_success &= success;
            inner.batch_errors.extend(errors);
            match inner.dependencies.as_mut() {
                Some(n) if *n > 1 => {
                    *n -= 1;
                    None
                }
                Some(_) => {
                    inner.dependencies = None;
                    let success = inner.batch_success;
                    let errors = std::mem::take(&mut inner.batch_errors);
                    inner.state = if success {
                        LoadState::Loaded
                    } else {
                        LoadState::Unloaded
                    };
                    if !success {
                        inner.last_error = errors.last().cloned();
                    }
                    if let Some(options) = inner.reload_in_progress.take() {
                        if !success && options.modify_on_error {
                            inner.modified = true;
                        }
                    }
                    Some((success, errors))
                }
                None => {
                    log::warn!("dependent_load_complete with no load in progress");
                    None
                }
            }
        };
        if let Some((success, errors)) = finished {
            self.fire_end_load(success, &errors);
        }
    }

    // -----------------------------------------------------------------
    // Flushing
    // -----------------------------------------------------------------

    /// Persist pending changes. No-op unless loaded, not already flushing,
    /// and modified.
    pub fn flush(&self) {
        let host = {
            let mut inner = self.inner.lock();
            if inner.state != LoadState::Loaded || inner.flushing || !inner.modified {
                return;
            }
            inner.flushing = true;
            inner.host.clone()
        };
        let Some(host) = host else {
            self.inner.lock().flushing = false;
            return;
        };

        if let Some(mut delegate) = self.take_delegate() {
            let result = match host.open_session() {
                Ok(session) => {
                    let result = delegate.perform_flush(&host);
                    session.close();
                    result
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    self.inner.lock().modified = false;
                }
                Err(e) => {
                    log::warn!("flush failed: {e}");
                    self.inner.lock().last_error = Some(e.clone());
                    delegate.report_flush_error(&e);
                }
            }
            self.restore_delegate(delegate);
        }
        self.inner.lock().flushing = false;
    }

    // -----------------------------------------------------------------
    // Reloading
    // -----------------------------------------------------------------

    /// Schedule a reload. `force` runs it synchronously; otherwise it
    /// waits for [`process_deferred_reload`](Self::process_deferred_reload)
    /// (the host's idle callback). A reload already pending wins.
    pub fn reload(&self, options: ReloadOptions) {
        let run_now = {
            let mut inner = self.inner.lock();
            if inner.pending_reload.is_some() {
                return;
            }
            inner.pending_reload = Some(options);
            options.force
        };
        if run_now {
            self.process_deferred_reload();
        } else {
            log::debug!("reload deferred to next idle point");
        }
    }

    /// Run the pending reload, if any: optional flush, unload with
    /// notifications disabled, source refresh, then a fresh load.
    pub fn process_deferred_reload(&self) {
        let Some(options) = self.inner.lock().pending_reload.take() else {
            return;
        };
        if !options.no_flush {
            self.flush();
        }

        let host = self.inner.lock().host.clone();
        let Some(host) = host else {
            return;
        };

        host.environment().container.set_notifications_enabled(false);
        {
            let mut inner = self.inner.lock();
            inner.state = LoadState::Unloaded;
            inner.modified = false;
            inner.reload_in_progress = Some(options);
        }
        if let Some(mut delegate) = self.take_delegate() {
            delegate.refresh_source();
            self.restore_delegate(delegate);
        }
        host.environment().container.set_notifications_enabled(true);

        if let Err(e) = self.begin_load(&host) {
            log::warn!("reload failed to begin: {e}");
            self.inner.lock().last_error = Some(e);
        }
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    /// Container change notifications toggle the modified flag, but only
    /// while loaded — mutations during the initial load don't count.
    fn subscribe_to_container(&self, host: &Arc<SerializationManager>) {
        let mut inner = self.inner.lock();
        if inner.subscribed {
            return;
        }
        inner.subscribed = true;
        drop(inner);

        let weak: Weak<Mutex<LoaderInner>> = Arc::downgrade(&self.inner);
        host.environment().container.subscribe(move |_event| {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.lock();
                if inner.state == LoadState::Loaded {
                    inner.modified = true;
                }
            }
        });
    }

    fn take_delegate(&self) -> Option<Box<dyn LoaderDelegate>> {
        self.inner.lock().delegate.take()
    }

    fn restore_delegate(&self, delegate: Box<dyn LoaderDelegate>) {
        self.inner.lock().delegate = Some(delegate);
    }

    fn fire_begin_load(&self) {
        let listeners = std::mem::take(&mut self.inner.lock().begin_listeners);
        for listener in &listeners {
            listener();
        }
        let mut inner = self.inner.lock();
        let added = std::mem::take(&mut inner.begin_listeners);
        inner.begin_listeners = listeners;
        inner.begin_listeners.extend(added);
    }

    fn fire_end_load(&self, success: bool, errors: &[SerializationError]) {
        let listeners = std::mem::take(&mut self.inner.lock().end_listeners);
        for listener in &listeners {
            listener(success, errors);
        }
        let mut inner = self.inner.lock();
        let added = std::mem::take(&mut inner.end_listeners);
        inner.end_listeners = listeners;
        inner.end_listeners.extend(added);
    }
}
