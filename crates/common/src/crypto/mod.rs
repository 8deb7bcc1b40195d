//! Key handles and cryptographic operations of an app session
//!
//! Keys live inside the native library and are addressed through owned
//!  [`KeyHandle`]s:
//!
//! - **Signing**: Ed25519 key pairs, signatures are combined with the
//!   message (`signature || message`) and verification returns the message.
//! - **Box encryption**: X25519 key pairs, authenticated encryption between
//!   a sender's secret key and a recipient's public key.
//! - **Sealed boxes**: anonymous encryption to a recipient's public key,
//!   opened with the recipient's secret key alone.
//!
//! Every [`Crypto`] method issues its native request right away and returns
//!  a future for the result. Keys passed in are borrowed until that future
//!  resolves; keys handed out are freed on the native side when dropped.
//!
//! ```ignore
//! let crypto = app.crypto();
//! let pair = crypto.generate_sign_key_pair().await?;
//! let signed = crypto.sign(&pair.secret, b"hello").await?;
//! assert_eq!(crypto.verify(&pair.public, &signed).await?, b"hello");
//! ```

use std::future::Future;

use crate::app::App;
use crate::bridge::{BridgeError, NativeHandle};

mod keys;

pub use keys::{
    EncryptKeyPair, KeyHandle, KeyKind, PublicEncrypt, PublicEncryptKey, PublicSign,
    PublicSignKey, SecretEncrypt, SecretEncryptKey, SecretSign, SecretSignKey, SignKeyPair,
};

use keys::{free_orphaned_key, free_orphaned_pair};

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Cryptographic operations bound to one app session
#[derive(Debug, Clone, Copy)]
pub struct Crypto<'a> {
    app: &'a App,
}

impl<'a> Crypto<'a> {
    pub fn new(app: &'a App) -> Self {
        Self { app }
    }

    // ========================================
    // Sign keys
    // ========================================

    /// The session's own public sign key
    pub fn app_public_sign_key(&self) -> impl Future<Output = Result<PublicSignKey>> + 'static {
        let app = self.app.clone();
        let (callback, pending) = self
            .app
            .registry()
            .register_with_orphan::<NativeHandle, _>(free_orphaned_key::<PublicSign>(app.clone()));
        self.app.native().app_pub_sign_key(self.app.handle(), callback);
        async move { Ok(KeyHandle::from_raw(&app, pending.await?)) }
    }

    pub fn generate_sign_key_pair(&self) -> impl Future<Output = Result<SignKeyPair>> + 'static {
        let app = self.app.clone();
        let (callback, pending) = self
            .app
            .registry()
            .register_with_orphan::<(NativeHandle, NativeHandle), _>(free_orphaned_pair::<
                PublicSign,
                SecretSign,
            >(app.clone()));
        self.app
            .native()
            .sign_generate_key_pair(self.app.handle(), callback);
        async move {
            let (public, secret) = pending.await?;
            Ok(SignKeyPair {
                public: KeyHandle::from_raw(&app, public),
                secret: KeyHandle::from_raw(&app, secret),
            })
        }
    }

    /// Import a public sign key from its 32 raw bytes
    pub fn public_sign_key(
        &self,
        bytes: &[u8],
    ) -> impl Future<Output = Result<PublicSignKey>> + 'static {
        let app = self.app.clone();
        let (callback, pending) = self
            .app
            .registry()
            .register_with_orphan::<NativeHandle, _>(free_orphaned_key::<PublicSign>(app.clone()));
        self.app
            .native()
            .sign_pub_key_new(self.app.handle(), bytes, callback);
        async move { Ok(KeyHandle::from_raw(&app, pending.await?)) }
    }

    /// Import a secret sign key from its 32-byte seed
    pub fn secret_sign_key(
        &self,
        bytes: &[u8],
    ) -> impl Future<Output = Result<SecretSignKey>> + 'static {
        let app = self.app.clone();
        let (callback, pending) = self
            .app
            .registry()
            .register_with_orphan::<NativeHandle, _>(free_orphaned_key::<SecretSign>(app.clone()));
        self.app
            .native()
            .sign_sec_key_new(self.app.handle(), bytes, callback);
        async move { Ok(KeyHandle::from_raw(&app, pending.await?)) }
    }

    /// Raw bytes of a public sign key
    pub fn public_sign_key_bytes<'k>(
        &self,
        key: &'k PublicSignKey,
    ) -> impl Future<Output = Result<Vec<u8>>> + 'k {
        let (callback, pending) = self.app.registry().register::<Vec<u8>>();
        self.app
            .native()
            .sign_pub_key_get(self.app.handle(), key.handle(), callback);
        async move {
            let _key = key;
            pending.await
        }
    }

    // ========================================
    // Encrypt keys
    // ========================================

    /// The session's own public encrypt key
    pub fn app_public_encrypt_key(
        &self,
    ) -> impl Future<Output = Result<PublicEncryptKey>> + 'static {
        let app = self.app.clone();
        let (callback, pending) = self
            .app
            .registry()
            .register_with_orphan::<NativeHandle, _>(free_orphaned_key::<PublicEncrypt>(
                app.clone(),
            ));
        self.app.native().app_pub_enc_key(self.app.handle(), callback);
        async move { Ok(KeyHandle::from_raw(&app, pending.await?)) }
    }

    pub fn generate_encrypt_key_pair(
        &self,
    ) -> impl Future<Output = Result<EncryptKeyPair>> + 'static {
        let app = self.app.clone();
        let (callback, pending) = self
            .app
            .registry()
            .register_with_orphan::<(NativeHandle, NativeHandle), _>(free_orphaned_pair::<
                PublicEncrypt,
                SecretEncrypt,
            >(app.clone()));
        self.app
            .native()
            .enc_generate_key_pair(self.app.handle(), callback);
        async move {
            let (public, secret) = pending.await?;
            Ok(EncryptKeyPair {
                public: KeyHandle::from_raw(&app, public),
                secret: KeyHandle::from_raw(&app, secret),
            })
        }
    }

    /// Import a public encrypt key from its 32 raw bytes
    pub fn public_encrypt_key(
        &self,
        bytes: &[u8],
    ) -> impl Future<Output = Result<PublicEncryptKey>> + 'static {
        let app = self.app.clone();
        let (callback, pending) = self
            .app
            .registry()
            .register_with_orphan::<NativeHandle, _>(free_orphaned_key::<PublicEncrypt>(
                app.clone(),
            ));
        self.app
            .native()
            .enc_pub_key_new(self.app.handle(), bytes, callback);
        async move { Ok(KeyHandle::from_raw(&app, pending.await?)) }
    }

    /// Import a secret encrypt key from its 32 raw bytes
    pub fn secret_encrypt_key(
        &self,
        bytes: &[u8],
    ) -> impl Future<Output = Result<SecretEncryptKey>> + 'static {
        let app = self.app.clone();
        let (callback, pending) = self
            .app
            .registry()
            .register_with_orphan::<NativeHandle, _>(free_orphaned_key::<SecretEncrypt>(
                app.clone(),
            ));
        self.app
            .native()
            .enc_secret_key_new(self.app.handle(), bytes, callback);
        async move { Ok(KeyHandle::from_raw(&app, pending.await?)) }
    }

    /// Raw bytes of a public encrypt key
    pub fn public_encrypt_key_bytes<'k>(
        &self,
        key: &'k PublicEncryptKey,
    ) -> impl Future<Output = Result<Vec<u8>>> + 'k {
        let (callback, pending) = self.app.registry().register::<Vec<u8>>();
        self.app
            .native()
            .enc_pub_key_get(self.app.handle(), key.handle(), callback);
        async move {
            let _key = key;
            pending.await
        }
    }

    // ========================================
    // Operations
    // ========================================

    /// Sign `data`, returning `signature || data`
    pub fn sign<'k>(
        &self,
        secret: &'k SecretSignKey,
        data: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>>> + 'k {
        let (callback, pending) = self.app.registry().register::<Vec<u8>>();
        self.app
            .native()
            .sign(self.app.handle(), data, secret.handle(), callback);
        async move {
            let _secret = secret;
            pending.await
        }
    }

    /// Check a signed buffer and return the message it carries
    pub fn verify<'k>(
        &self,
        public: &'k PublicSignKey,
        signed: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>>> + 'k {
        let (callback, pending) = self.app.registry().register::<Vec<u8>>();
        self.app
            .native()
            .verify(self.app.handle(), signed, public.handle(), callback);
        async move {
            let _public = public;
            pending.await
        }
    }

    /// Encrypt from `secret`'s owner to `public`'s owner
    pub fn encrypt<'k>(
        &self,
        public: &'k PublicEncryptKey,
        secret: &'k SecretEncryptKey,
        data: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>>> + 'k {
        let (callback, pending) = self.app.registry().register::<Vec<u8>>();
        self.app.native().encrypt(
            self.app.handle(),
            data,
            public.handle(),
            secret.handle(),
            callback,
        );
        async move {
            let _keys = (public, secret);
            pending.await
        }
    }

    /// Decrypt a box sent by `public`'s owner to `secret`'s owner
    pub fn decrypt<'k>(
        &self,
        public: &'k PublicEncryptKey,
        secret: &'k SecretEncryptKey,
        data: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>>> + 'k {
        let (callback, pending) = self.app.registry().register::<Vec<u8>>();
        self.app.native().decrypt(
            self.app.handle(),
            data,
            public.handle(),
            secret.handle(),
            callback,
        );
        async move {
            let _keys = (public, secret);
            pending.await
        }
    }

    /// Encrypt anonymously to `public`'s owner
    pub fn encrypt_sealed_box<'k>(
        &self,
        public: &'k PublicEncryptKey,
        data: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>>> + 'k {
        let (callback, pending) = self.app.registry().register::<Vec<u8>>();
        self.app
            .native()
            .encrypt_sealed_box(self.app.handle(), data, public.handle(), callback);
        async move {
            let _public = public;
            pending.await
        }
    }

    /// Open a sealed box with the recipient's secret key
    pub fn decrypt_sealed_box<'k>(
        &self,
        secret: &'k SecretEncryptKey,
        data: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>>> + 'k {
        let (callback, pending) = self.app.registry().register::<Vec<u8>>();
        self.app
            .native()
            .decrypt_sealed_box(self.app.handle(), data, secret.handle(), callback);
        async move {
            let _secret = secret;
            pending.await
        }
    }
}
