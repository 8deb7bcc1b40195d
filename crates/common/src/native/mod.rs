//! Interface to the native SAFE library
//!
//! Every call is non-blocking: it takes the session, its inputs and a
//!  callback, and the result arrives later through that callback, possibly
//!  on another thread. Handles produced by a call belong to the caller and
//!  must be handed back through the matching `*_free` call.

use std::fmt;

use crate::bridge::{Callback, ForEachCallback, NativeHandle};
use crate::permissions::PermissionSet;

pub mod local;

pub use local::LocalNative;

/// Opaque identifier of an app session in the native library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppHandle(pub u64);

impl fmt::Display for AppHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app:{}", self.0)
    }
}

/// Key and cryptography calls exposed by the native library
///
/// Payload shapes delivered to the callback:
///
/// - key generation: `HandlePair(public, secret)`
/// - key fetch and import: `Handle`
/// - key export, sign, verify, encrypt and decrypt: `Data`
/// - free and insert calls: `Unit`
pub trait NativeCrypto: Send + Sync + fmt::Debug + 'static {
    // sign keys
    fn app_pub_sign_key(&self, app: AppHandle, callback: Callback);
    fn sign_generate_key_pair(&self, app: AppHandle, callback: Callback);
    fn sign_pub_key_new(&self, app: AppHandle, bytes: &[u8], callback: Callback);
    fn sign_pub_key_get(&self, app: AppHandle, key: NativeHandle, callback: Callback);
    fn sign_pub_key_free(&self, app: AppHandle, key: NativeHandle, callback: Callback);
    fn sign_sec_key_new(&self, app: AppHandle, bytes: &[u8], callback: Callback);
    fn sign_sec_key_free(&self, app: AppHandle, key: NativeHandle, callback: Callback);

    // encrypt keys
    fn app_pub_enc_key(&self, app: AppHandle, callback: Callback);
    fn enc_generate_key_pair(&self, app: AppHandle, callback: Callback);
    fn enc_pub_key_new(&self, app: AppHandle, bytes: &[u8], callback: Callback);
    fn enc_pub_key_get(&self, app: AppHandle, key: NativeHandle, callback: Callback);
    fn enc_pub_key_free(&self, app: AppHandle, key: NativeHandle, callback: Callback);
    fn enc_secret_key_new(&self, app: AppHandle, bytes: &[u8], callback: Callback);
    fn enc_secret_key_free(&self, app: AppHandle, key: NativeHandle, callback: Callback);

    // operations
    fn sign(&self, app: AppHandle, data: &[u8], secret: NativeHandle, callback: Callback);
    fn verify(&self, app: AppHandle, signed: &[u8], public: NativeHandle, callback: Callback);
    fn encrypt(
        &self,
        app: AppHandle,
        data: &[u8],
        public: NativeHandle,
        secret: NativeHandle,
        callback: Callback,
    );
    fn decrypt(
        &self,
        app: AppHandle,
        data: &[u8],
        public: NativeHandle,
        secret: NativeHandle,
        callback: Callback,
    );
    fn encrypt_sealed_box(
        &self,
        app: AppHandle,
        data: &[u8],
        public: NativeHandle,
        callback: Callback,
    );
    fn decrypt_sealed_box(
        &self,
        app: AppHandle,
        data: &[u8],
        secret: NativeHandle,
        callback: Callback,
    );

    // mutable data permissions
    fn mdata_permissions_new(&self, app: AppHandle, callback: Callback);
    /// The entry count is delivered in the `Handle` payload slot
    fn mdata_permissions_len(&self, app: AppHandle, permissions: NativeHandle, callback: Callback);
    fn mdata_permissions_insert(
        &self,
        app: AppHandle,
        permissions: NativeHandle,
        user: NativeHandle,
        set: PermissionSet,
        callback: Callback,
    );
    /// Deliver exactly `callback.expected()` entries, each with fresh handles
    fn mdata_permissions_for_each(
        &self,
        app: AppHandle,
        permissions: NativeHandle,
        callback: ForEachCallback,
    );
    fn mdata_permissions_free(&self, app: AppHandle, permissions: NativeHandle, callback: Callback);
    /// The set is delivered as a single byte of permission bits
    fn mdata_permission_set_get(&self, app: AppHandle, set: NativeHandle, callback: Callback);
    fn mdata_permission_set_free(&self, app: AppHandle, set: NativeHandle, callback: Callback);
}
