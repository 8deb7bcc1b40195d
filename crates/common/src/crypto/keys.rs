use std::fmt;
use std::marker::PhantomData;

use crate::app::App;
use crate::bridge::{Callback, NativeHandle, Payload};
use crate::handle::ScopedHandle;
use crate::native::{AppHandle, NativeCrypto};

mod sealed {
    pub trait Sealed {}
}

/// The kind of key a [`KeyHandle`] addresses
///
/// Each kind knows the native call that frees it.
pub trait KeyKind: sealed::Sealed + Send + Sync + 'static {
    const NAME: &'static str;

    fn free(native: &dyn NativeCrypto, app: AppHandle, key: NativeHandle, callback: Callback);
}

/// Ed25519 verifying key
#[derive(Debug)]
pub enum PublicSign {}
/// Ed25519 signing key
#[derive(Debug)]
pub enum SecretSign {}
/// X25519 public key
#[derive(Debug)]
pub enum PublicEncrypt {}
/// X25519 secret key
#[derive(Debug)]
pub enum SecretEncrypt {}

impl sealed::Sealed for PublicSign {}
impl sealed::Sealed for SecretSign {}
impl sealed::Sealed for PublicEncrypt {}
impl sealed::Sealed for SecretEncrypt {}

impl KeyKind for PublicSign {
    const NAME: &'static str = "public sign key";

    fn free(native: &dyn NativeCrypto, app: AppHandle, key: NativeHandle, callback: Callback) {
        native.sign_pub_key_free(app, key, callback)
    }
}

impl KeyKind for SecretSign {
    const NAME: &'static str = "secret sign key";

    fn free(native: &dyn NativeCrypto, app: AppHandle, key: NativeHandle, callback: Callback) {
        native.sign_sec_key_free(app, key, callback)
    }
}

impl KeyKind for PublicEncrypt {
    const NAME: &'static str = "public encrypt key";

    fn free(native: &dyn NativeCrypto, app: AppHandle, key: NativeHandle, callback: Callback) {
        native.enc_pub_key_free(app, key, callback)
    }
}

impl KeyKind for SecretEncrypt {
    const NAME: &'static str = "secret encrypt key";

    fn free(native: &dyn NativeCrypto, app: AppHandle, key: NativeHandle, callback: Callback) {
        native.enc_secret_key_free(app, key, callback)
    }
}

/// Owned handle to a key held by the native library
///
/// Dropping the handle frees the key on the native side. The handle is only
///  meaningful within the app session that produced it.
pub struct KeyHandle<K: KeyKind> {
    inner: ScopedHandle,
    _kind: PhantomData<fn() -> K>,
}

pub type PublicSignKey = KeyHandle<PublicSign>;
pub type SecretSignKey = KeyHandle<SecretSign>;
pub type PublicEncryptKey = KeyHandle<PublicEncrypt>;
pub type SecretEncryptKey = KeyHandle<SecretEncrypt>;

impl<K: KeyKind> fmt::Debug for KeyHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHandle<{}>({})", K::NAME, self.inner.handle())
    }
}

impl<K: KeyKind> KeyHandle<K> {
    /// Take ownership of a raw handle produced by the native library
    pub fn from_raw(app: &App, handle: NativeHandle) -> Self {
        Self {
            inner: app.scoped(handle, K::free),
            _kind: PhantomData,
        }
    }

    pub fn handle(&self) -> NativeHandle {
        self.inner.handle()
    }

    /// Free the key now instead of at end of scope
    pub fn release(self) {
        self.inner.release()
    }

    /// Give up ownership, the caller becomes responsible for freeing the key
    pub fn into_raw(self) -> NativeHandle {
        self.inner.into_raw()
    }
}

/// Ed25519 key pair produced by one generation call
#[derive(Debug)]
pub struct SignKeyPair {
    pub public: PublicSignKey,
    pub secret: SecretSignKey,
}

/// X25519 key pair produced by one generation call
#[derive(Debug)]
pub struct EncryptKeyPair {
    pub public: PublicEncryptKey,
    pub secret: SecretEncryptKey,
}

/// Free the handles of a result nobody is waiting for
pub(crate) fn free_orphaned_key<K: KeyKind>(app: App) -> impl FnOnce(Payload) + Send + 'static {
    move |payload| {
        if let Payload::Handle(handle) = payload {
            app.free(handle, K::free);
        }
    }
}

pub(crate) fn free_orphaned_pair<P: KeyKind, S: KeyKind>(
    app: App,
) -> impl FnOnce(Payload) + Send + 'static {
    move |payload| {
        if let Payload::HandlePair(public, secret) = payload {
            app.free(public, P::free);
            app.free(secret, S::free);
        }
    }
}
