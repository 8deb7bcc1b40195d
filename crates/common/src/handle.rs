use std::fmt;

use crate::bridge::NativeHandle;

type Release = Box<dyn FnOnce(NativeHandle) + Send + Sync>;

/// Owned native handle, released exactly once
///
/// The release function is bound when the handle is acquired and runs on
///  drop, on an explicit [`ScopedHandle::release`], or never if ownership is
///  handed back with [`ScopedHandle::into_raw`].
pub struct ScopedHandle {
    handle: NativeHandle,
    release: Option<Release>,
}

impl fmt::Debug for ScopedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedHandle")
            .field("handle", &self.handle)
            .field("armed", &self.release.is_some())
            .finish()
    }
}

impl ScopedHandle {
    pub fn new<F>(handle: NativeHandle, release: F) -> Self
    where
        F: FnOnce(NativeHandle) + Send + Sync + 'static,
    {
        Self {
            handle,
            release: Some(Box::new(release)),
        }
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    /// Release now instead of at end of scope
    pub fn release(mut self) {
        self.run_release();
    }

    /// Give up ownership without releasing
    pub fn into_raw(mut self) -> NativeHandle {
        self.release.take();
        self.handle
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.handle);
        }
    }
}

impl Drop for ScopedHandle {
    fn drop(&mut self) {
        self.run_release();
    }
}
