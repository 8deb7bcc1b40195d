use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use ed25519_dalek::{SigningKey, VerifyingKey};
use parking_lot::Mutex;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use super::codes;
use super::jobs::Op;
use super::primitives;
use crate::bridge::{ForEachCallback, ForEachItem, NativeError, NativeHandle, Payload};
use crate::native::AppHandle;
use crate::permissions::PermissionSet;

/// Native-side state addressed by a handle
enum Object {
    PublicSign(VerifyingKey),
    SecretSign(SigningKey),
    PublicEncrypt(X25519PublicKey),
    SecretEncrypt(StaticSecret),
    Permissions(Vec<(VerifyingKey, PermissionSet)>),
    PermissionSet(PermissionSet),
}

impl Object {
    fn kind(&self) -> &'static str {
        match self {
            Object::PublicSign(_) => "public sign key",
            Object::SecretSign(_) => "secret sign key",
            Object::PublicEncrypt(_) => "public encrypt key",
            Object::SecretEncrypt(_) => "secret encrypt key",
            Object::Permissions(_) => "permissions",
            Object::PermissionSet(_) => "permission set",
        }
    }
}

/// One app session: its identity keys and its handle table
struct Session {
    sign_key: SigningKey,
    encrypt_key: StaticSecret,
    next_handle: u64,
    objects: HashMap<NativeHandle, Object>,
}

fn wrong_kind(handle: NativeHandle, expected: &str, got: &Object) -> NativeError {
    NativeError::new(
        codes::WRONG_HANDLE_KIND,
        format!("handle {} is a {}, expected a {}", handle, got.kind(), expected),
    )
}

fn invalid_handle(handle: NativeHandle) -> NativeError {
    NativeError::new(codes::INVALID_HANDLE, format!("invalid handle {}", handle))
}

impl Session {
    fn new() -> Result<Self, NativeError> {
        Ok(Self {
            sign_key: primitives::generate_sign_key()?,
            encrypt_key: primitives::generate_encrypt_key()?,
            next_handle: 0,
            objects: HashMap::new(),
        })
    }

    fn insert(&mut self, object: Object) -> NativeHandle {
        self.next_handle += 1;
        let handle = NativeHandle(self.next_handle);
        self.objects.insert(handle, object);
        handle
    }

    fn get(&self, handle: NativeHandle) -> Result<&Object, NativeError> {
        self.objects.get(&handle).ok_or_else(|| invalid_handle(handle))
    }

    fn public_sign(&self, handle: NativeHandle) -> Result<VerifyingKey, NativeError> {
        match self.get(handle)? {
            Object::PublicSign(key) => Ok(*key),
            other => Err(wrong_kind(handle, "public sign key", other)),
        }
    }

    fn secret_sign(&self, handle: NativeHandle) -> Result<SigningKey, NativeError> {
        match self.get(handle)? {
            Object::SecretSign(key) => Ok(key.clone()),
            other => Err(wrong_kind(handle, "secret sign key", other)),
        }
    }

    fn public_encrypt(&self, handle: NativeHandle) -> Result<X25519PublicKey, NativeError> {
        match self.get(handle)? {
            Object::PublicEncrypt(key) => Ok(*key),
            other => Err(wrong_kind(handle, "public encrypt key", other)),
        }
    }

    fn secret_encrypt(&self, handle: NativeHandle) -> Result<StaticSecret, NativeError> {
        match self.get(handle)? {
            Object::SecretEncrypt(key) => Ok(key.clone()),
            other => Err(wrong_kind(handle, "secret encrypt key", other)),
        }
    }

    fn permission_set(&self, handle: NativeHandle) -> Result<PermissionSet, NativeError> {
        match self.get(handle)? {
            Object::PermissionSet(set) => Ok(*set),
            other => Err(wrong_kind(handle, "permission set", other)),
        }
    }

    fn permissions_mut(
        &mut self,
        handle: NativeHandle,
    ) -> Result<&mut Vec<(VerifyingKey, PermissionSet)>, NativeError> {
        match self.objects.get_mut(&handle) {
            Some(Object::Permissions(entries)) => Ok(entries),
            Some(other) => Err(wrong_kind(handle, "permissions", other)),
            None => Err(invalid_handle(handle)),
        }
    }

    /// Remove a handle, checking that it addresses the expected kind
    fn free(&mut self, handle: NativeHandle, expected: &str) -> Result<Payload, NativeError> {
        let object = self.get(handle)?;
        if object.kind() != expected {
            return Err(wrong_kind(handle, expected, object));
        }
        self.objects.remove(&handle);
        Ok(Payload::Unit)
    }
}

/// Every session known to the local native library
#[derive(Default)]
pub struct Sessions {
    next_app: AtomicU64,
    sessions: Mutex<HashMap<AppHandle, Session>>,
}

impl Sessions {
    pub fn register(&self) -> Result<AppHandle, NativeError> {
        let session = Session::new()?;
        let app = AppHandle(self.next_app.fetch_add(1, Ordering::SeqCst) + 1);
        self.sessions.lock().insert(app, session);
        Ok(app)
    }

    pub fn live_handles(&self, app: AppHandle) -> Option<usize> {
        self.sessions.lock().get(&app).map(|s| s.objects.len())
    }

    fn with<R>(
        &self,
        app: AppHandle,
        f: impl FnOnce(&mut Session) -> Result<R, NativeError>,
    ) -> Result<R, NativeError> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(&app).ok_or_else(|| {
            NativeError::new(codes::INVALID_APP, format!("invalid app handle {}", app))
        })?;
        f(session)
    }

    /// Run one call; key material is copied out so no lock is held during
    ///  the cryptographic work
    pub fn execute(&self, app: AppHandle, op: Op) -> Result<Payload, NativeError> {
        match op {
            Op::AppPubSignKey => self.with(app, |s| {
                let public = s.sign_key.verifying_key();
                Ok(Payload::Handle(s.insert(Object::PublicSign(public))))
            }),
            Op::SignGenerateKeyPair => {
                let secret = primitives::generate_sign_key()?;
                let public = secret.verifying_key();
                self.with(app, |s| {
                    let public = s.insert(Object::PublicSign(public));
                    let secret = s.insert(Object::SecretSign(secret));
                    Ok(Payload::HandlePair(public, secret))
                })
            }
            Op::SignPubKeyNew(bytes) => {
                let key = primitives::sign_public_key(&bytes)?;
                self.with(app, |s| Ok(Payload::Handle(s.insert(Object::PublicSign(key)))))
            }
            Op::SignPubKeyGet(handle) => {
                let key = self.with(app, |s| s.public_sign(handle))?;
                Ok(Payload::Data(key.to_bytes().to_vec()))
            }
            Op::SignPubKeyFree(handle) => self.with(app, |s| s.free(handle, "public sign key")),
            Op::SignSecKeyNew(bytes) => {
                let key = primitives::sign_secret_key(&bytes)?;
                self.with(app, |s| Ok(Payload::Handle(s.insert(Object::SecretSign(key)))))
            }
            Op::SignSecKeyFree(handle) => self.with(app, |s| s.free(handle, "secret sign key")),

            Op::AppPubEncKey => self.with(app, |s| {
                let public = X25519PublicKey::from(&s.encrypt_key);
                Ok(Payload::Handle(s.insert(Object::PublicEncrypt(public))))
            }),
            Op::EncGenerateKeyPair => {
                let secret = primitives::generate_encrypt_key()?;
                let public = X25519PublicKey::from(&secret);
                self.with(app, |s| {
                    let public = s.insert(Object::PublicEncrypt(public));
                    let secret = s.insert(Object::SecretEncrypt(secret));
                    Ok(Payload::HandlePair(public, secret))
                })
            }
            Op::EncPubKeyNew(bytes) => {
                let key = primitives::encrypt_public_key(&bytes)?;
                self.with(app, |s| Ok(Payload::Handle(s.insert(Object::PublicEncrypt(key)))))
            }
            Op::EncPubKeyGet(handle) => {
                let key = self.with(app, |s| s.public_encrypt(handle))?;
                Ok(Payload::Data(key.as_bytes().to_vec()))
            }
            Op::EncPubKeyFree(handle) => self.with(app, |s| s.free(handle, "public encrypt key")),
            Op::EncSecretKeyNew(bytes) => {
                let key = primitives::encrypt_secret_key(&bytes)?;
                self.with(app, |s| Ok(Payload::Handle(s.insert(Object::SecretEncrypt(key)))))
            }
            Op::EncSecretKeyFree(handle) => {
                self.with(app, |s| s.free(handle, "secret encrypt key"))
            }

            Op::Sign { data, secret } => {
                let key = self.with(app, |s| s.secret_sign(secret))?;
                Ok(Payload::Data(primitives::sign(&key, &data)))
            }
            Op::Verify { signed, public } => {
                let key = self.with(app, |s| s.public_sign(public))?;
                primitives::verify(&key, &signed).map(Payload::Data)
            }
            Op::Encrypt {
                data,
                public,
                secret,
            } => {
                let (public, secret) =
                    self.with(app, |s| Ok((s.public_encrypt(public)?, s.secret_encrypt(secret)?)))?;
                primitives::encrypt(&data, &public, &secret).map(Payload::Data)
            }
            Op::Decrypt {
                data,
                public,
                secret,
            } => {
                let (public, secret) =
                    self.with(app, |s| Ok((s.public_encrypt(public)?, s.secret_encrypt(secret)?)))?;
                primitives::decrypt(&data, &public, &secret).map(Payload::Data)
            }
            Op::EncryptSealedBox { data, public } => {
                let public = self.with(app, |s| s.public_encrypt(public))?;
                primitives::encrypt_sealed(&data, &public).map(Payload::Data)
            }
            Op::DecryptSealedBox { data, secret } => {
                let secret = self.with(app, |s| s.secret_encrypt(secret))?;
                primitives::decrypt_sealed(&data, &secret).map(Payload::Data)
            }

            Op::PermissionsNew => self.with(app, |s| {
                Ok(Payload::Handle(s.insert(Object::Permissions(Vec::new()))))
            }),
            // the length travels in the 64-bit handle slot of the callback
            Op::PermissionsLen(handle) => self.with(app, |s| {
                let len = s.permissions_mut(handle)?.len() as u64;
                Ok(Payload::Handle(NativeHandle(len)))
            }),
            Op::PermissionsInsert {
                permissions,
                user,
                set,
            } => self.with(app, |s| {
                let user = s.public_sign(user)?;
                let entries = s.permissions_mut(permissions)?;
                match entries.iter_mut().find(|(key, _)| *key == user) {
                    Some((_, existing)) => *existing = set,
                    None => entries.push((user, set)),
                }
                Ok(Payload::Unit)
            }),
            Op::PermissionsFree(handle) => self.with(app, |s| s.free(handle, "permissions")),
            Op::PermissionSetGet(handle) => {
                let set = self.with(app, |s| s.permission_set(handle))?;
                Ok(Payload::Data(vec![set.to_bits()]))
            }
            Op::PermissionSetFree(handle) => self.with(app, |s| s.free(handle, "permission set")),
        }
    }

    /// Deliver every entry of a permissions object as its own notification
    ///
    /// Each item carries fresh handles owned by the consumer. At most
    ///  `callback.expected()` items are delivered; if fewer entries exist the
    ///  registration is aborted so it does not stay pending.
    pub fn for_each_permissions(
        &self,
        app: AppHandle,
        permissions: NativeHandle,
        callback: ForEachCallback,
    ) {
        let expected = callback.expected() as usize;
        let items = self.with(app, |s| {
            let entries: Vec<_> = s
                .permissions_mut(permissions)?
                .iter()
                .take(expected)
                .copied()
                .collect();
            Ok(entries
                .into_iter()
                .map(|(key, set)| ForEachItem {
                    sign_key: s.insert(Object::PublicSign(key)),
                    permission_set: s.insert(Object::PermissionSet(set)),
                })
                .collect::<Vec<_>>())
        });

        let items = match items {
            Ok(items) if items.len() == expected => items,
            Ok(items) => {
                tracing::error!(
                    token = %callback.token(),
                    expected,
                    available = items.len(),
                    "permissions have fewer entries than requested"
                );
                self.release_items(app, &items);
                callback.abort();
                return;
            }
            Err(e) => {
                tracing::error!(token = %callback.token(), "failed to enumerate permissions: {}", e);
                callback.abort();
                return;
            }
        };

        for item in items {
            if let Err(e) = callback.item(item) {
                tracing::warn!("failed to deliver permission entry: {}", e);
                self.release_items(app, &[item]);
            }
        }
    }

    fn release_items(&self, app: AppHandle, items: &[ForEachItem]) {
        let _ = self.with(app, |s| {
            for item in items {
                s.objects.remove(&item.sign_key);
                s.objects.remove(&item.permission_set);
            }
            Ok(())
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bridge::CallbackRegistry;

    fn handle(payload: Payload) -> NativeHandle {
        match payload {
            Payload::Handle(h) => h,
            other => panic!("expected handle, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_app_is_rejected() {
        let sessions = Sessions::default();
        let err = sessions.execute(AppHandle(9), Op::AppPubSignKey).unwrap_err();
        assert_eq!(err.code, codes::INVALID_APP);
    }

    #[test]
    fn test_free_checks_handle_kind() {
        let sessions = Sessions::default();
        let app = sessions.register().unwrap();
        let public = handle(sessions.execute(app, Op::AppPubSignKey).unwrap());

        let err = sessions
            .execute(app, Op::EncPubKeyFree(public))
            .unwrap_err();
        assert_eq!(err.code, codes::WRONG_HANDLE_KIND);
        assert_eq!(sessions.live_handles(app), Some(1));

        sessions.execute(app, Op::SignPubKeyFree(public)).unwrap();
        assert_eq!(sessions.live_handles(app), Some(0));

        let err = sessions
            .execute(app, Op::SignPubKeyFree(public))
            .unwrap_err();
        assert_eq!(err.code, codes::INVALID_HANDLE);
    }

    #[test]
    fn test_wrong_key_kind_for_sign() {
        let sessions = Sessions::default();
        let app = sessions.register().unwrap();
        let public = handle(sessions.execute(app, Op::AppPubSignKey).unwrap());

        let err = sessions
            .execute(
                app,
                Op::Sign {
                    data: b"data".to_vec(),
                    secret: public,
                },
            )
            .unwrap_err();
        assert_eq!(err.code, codes::WRONG_HANDLE_KIND);
    }

    #[test]
    fn test_permissions_insert_replaces_existing_entry() {
        let sessions = Sessions::default();
        let app = sessions.register().unwrap();
        let permissions = handle(sessions.execute(app, Op::PermissionsNew).unwrap());
        let user = handle(sessions.execute(app, Op::AppPubSignKey).unwrap());

        for set in [PermissionSet::default(), PermissionSet::all()] {
            sessions
                .execute(
                    app,
                    Op::PermissionsInsert {
                        permissions,
                        user,
                        set,
                    },
                )
                .unwrap();
        }
        let len = handle(sessions.execute(app, Op::PermissionsLen(permissions)).unwrap());
        assert_eq!(len, NativeHandle(1));
    }

    #[test]
    fn test_for_each_with_too_few_entries_aborts() {
        let sessions = Sessions::default();
        let app = sessions.register().unwrap();
        let permissions = handle(sessions.execute(app, Op::PermissionsNew).unwrap());
        let baseline = sessions.live_handles(app);

        let registry = CallbackRegistry::new();
        let callback = registry.register_for_each_fn(2, |_| {}, || panic!("must not complete"));
        sessions.for_each_permissions(app, permissions, callback);

        assert!(registry.is_empty());
        assert_eq!(sessions.live_handles(app), baseline);
    }
}
