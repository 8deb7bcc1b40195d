//! Permission lists of mutable data
//!
//! A permissions object maps public sign keys to the [`PermissionSet`] they
//!  are granted. Listing it is the one place the native library reports
//!  results item by item, so it is built on the bridge's for-each
//!  registrations.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::app::App;
use crate::bridge::{BridgeError, Callback, ForEachItem, NativeHandle};
use crate::crypto::{KeyHandle, PublicSignKey};
use crate::handle::ScopedHandle;
use crate::native::{AppHandle, NativeCrypto};

const INSERT: u8 = 1;
const UPDATE: u8 = 1 << 1;
const DELETE: u8 = 1 << 2;
const MANAGE_PERMISSIONS: u8 = 1 << 3;

/// Actions a key is allowed to perform on mutable data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionSet {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
    pub manage_permissions: bool,
}

impl PermissionSet {
    /// Every action allowed
    pub fn all() -> Self {
        Self {
            insert: true,
            update: true,
            delete: true,
            manage_permissions: true,
        }
    }

    pub fn to_bits(&self) -> u8 {
        let mut bits = 0;
        if self.insert {
            bits |= INSERT;
        }
        if self.update {
            bits |= UPDATE;
        }
        if self.delete {
            bits |= DELETE;
        }
        if self.manage_permissions {
            bits |= MANAGE_PERMISSIONS;
        }
        bits
    }

    /// Unknown bits are ignored
    pub fn from_bits(bits: u8) -> Self {
        Self {
            insert: bits & INSERT != 0,
            update: bits & UPDATE != 0,
            delete: bits & DELETE != 0,
            manage_permissions: bits & MANAGE_PERMISSIONS != 0,
        }
    }

    /// Decode the single byte of bits the native library reports
    fn from_payload(bytes: &[u8]) -> Result<Self, BridgeError> {
        match bytes {
            [bits] => Ok(Self::from_bits(*bits)),
            _ => Err(BridgeError::MalformedPayload {
                expected: 1,
                got: bytes.len(),
            }),
        }
    }
}

/// Owned handle to a permission set held by the native library
pub struct PermissionSetHandle {
    app: App,
    inner: ScopedHandle,
}

impl fmt::Debug for PermissionSetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PermissionSetHandle({})", self.inner.handle())
    }
}

impl PermissionSetHandle {
    pub fn from_raw(app: &App, handle: NativeHandle) -> Self {
        Self {
            app: app.clone(),
            inner: app.scoped(handle, |native, app, handle, callback| {
                native.mdata_permission_set_free(app, handle, callback)
            }),
        }
    }

    pub fn handle(&self) -> NativeHandle {
        self.inner.handle()
    }

    /// Read the permission set back from the native library
    pub async fn get(&self) -> Result<PermissionSet, BridgeError> {
        let (callback, pending) = self.app.registry().register::<Vec<u8>>();
        self.app
            .native()
            .mdata_permission_set_get(self.app.handle(), self.handle(), callback);
        PermissionSet::from_payload(&pending.await?)
    }
}

/// One entry of a permissions list
#[derive(Debug)]
pub struct PermissionEntry {
    pub sign_key: PublicSignKey,
    pub permission_set: PermissionSetHandle,
}

impl PermissionEntry {
    /// Take ownership of the handles delivered with a for-each item
    pub fn from_item(app: &App, item: ForEachItem) -> Self {
        Self {
            sign_key: KeyHandle::from_raw(app, item.sign_key),
            permission_set: PermissionSetHandle::from_raw(app, item.permission_set),
        }
    }
}

/// Owned permissions object of mutable data
pub struct MDataPermissions {
    app: App,
    inner: ScopedHandle,
}

impl fmt::Debug for MDataPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MDataPermissions({})", self.inner.handle())
    }
}

impl MDataPermissions {
    /// Create an empty permissions object
    pub async fn new(app: &App) -> Result<Self, BridgeError> {
        let owner = app.clone();
        let (callback, pending) = app
            .registry()
            .register_with_orphan::<NativeHandle, _>(move |payload| {
                for handle in payload.handles() {
                    owner.free(handle, free_permissions);
                }
            });
        app.native().mdata_permissions_new(app.handle(), callback);
        let handle = pending.await?;
        Ok(Self {
            app: app.clone(),
            inner: app.scoped(handle, free_permissions),
        })
    }

    pub fn handle(&self) -> NativeHandle {
        self.inner.handle()
    }

    /// Grant `set` to `user`, replacing any set it already has
    pub async fn insert(&self, user: &PublicSignKey, set: PermissionSet) -> Result<(), BridgeError> {
        let (callback, pending) = self.app.registry().register::<()>();
        self.app.native().mdata_permissions_insert(
            self.app.handle(),
            self.handle(),
            user.handle(),
            set,
            callback,
        );
        pending.await
    }

    /// Number of entries
    pub async fn len(&self) -> Result<u64, BridgeError> {
        let (callback, pending) = self.app.registry().register::<NativeHandle>();
        self.app
            .native()
            .mdata_permissions_len(self.app.handle(), self.handle(), callback);
        Ok(pending.await?.0)
    }

    pub async fn is_empty(&self) -> Result<bool, BridgeError> {
        Ok(self.len().await? == 0)
    }

    /// Visit every entry, resolving once the last one has been seen
    ///
    /// `f` runs on the native library's thread.
    pub async fn for_each<F>(&self, mut f: F) -> Result<(), BridgeError>
    where
        F: FnMut(PermissionEntry) + Send + 'static,
    {
        let expected = self.len().await?;
        let app = self.app.clone();
        let (done_tx, done_rx) = oneshot::channel();
        let callback = self.app.registry().register_for_each_fn(
            expected,
            move |item| f(PermissionEntry::from_item(&app, item)),
            move || {
                let _ = done_tx.send(());
            },
        );
        let token = callback.token();
        if expected > 0 {
            self.app
                .native()
                .mdata_permissions_for_each(self.app.handle(), self.handle(), callback);
        }
        done_rx.await.map_err(|_| BridgeError::Abandoned(token))
    }

    /// Every entry, in the order the native library lists them
    pub async fn entries(&self) -> Result<Vec<PermissionEntry>, BridgeError> {
        let entries = Arc::new(Mutex::new(Vec::new()));
        let sink = entries.clone();
        self.for_each(move |entry| sink.lock().push(entry)).await?;
        let entries = std::mem::take(&mut *entries.lock());
        Ok(entries)
    }
}

fn free_permissions(
    native: &dyn NativeCrypto,
    app: AppHandle,
    handle: NativeHandle,
    callback: Callback,
) {
    native.mdata_permissions_free(app, handle, callback)
}
