use std::fmt;
use std::sync::Arc;

use crate::bridge::{Callback, CallbackRegistry, NativeHandle, PayloadKind};
use crate::crypto::Crypto;
use crate::handle::ScopedHandle;
use crate::native::{AppHandle, NativeCrypto};

/// A native `*_free` call for one kind of handle
pub(crate) type FreeFn = fn(&dyn NativeCrypto, AppHandle, NativeHandle, Callback);

struct AppInner {
    handle: AppHandle,
    native: Arc<dyn NativeCrypto>,
    registry: CallbackRegistry,
}

/// One app session against the native library
///
/// Owns the session handle, the native library it talks to, and the
///  registry of callbacks the session has in flight. Cheap to clone; every
///  clone and every live key handle keeps the session alive.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("handle", &self.inner.handle)
            .field("native", &self.inner.native)
            .field("registry", &self.inner.registry)
            .finish()
    }
}

impl App {
    pub fn new(handle: AppHandle, native: Arc<dyn NativeCrypto>) -> Self {
        Self {
            inner: Arc::new(AppInner {
                handle,
                native,
                registry: CallbackRegistry::new(),
            }),
        }
    }

    pub fn handle(&self) -> AppHandle {
        self.inner.handle
    }

    pub fn native(&self) -> &dyn NativeCrypto {
        self.inner.native.as_ref()
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.inner.registry
    }

    pub fn crypto(&self) -> Crypto<'_> {
        Crypto::new(self)
    }

    /// Wrap a handle so that dropping it issues `free` as a detached call
    pub(crate) fn scoped(&self, handle: NativeHandle, free: FreeFn) -> ScopedHandle {
        let app = self.clone();
        ScopedHandle::new(handle, move |handle| app.free(handle, free))
    }

    /// Issue a free call nobody waits on
    pub(crate) fn free(&self, handle: NativeHandle, free: FreeFn) {
        tracing::debug!(app = %self.handle(), %handle, "releasing native handle");
        let callback = self.registry().register_detached(PayloadKind::Unit);
        free(self.native(), self.handle(), handle, callback);
    }
}
