//! In-process implementation of the native library
//!
//! Requests are queued to a small pool of worker threads which run the
//!  cryptography and fire callbacks from their own threads. Each app
//!  session owns a handle table; handles are only valid within the session
//!  that produced them.

use std::sync::Arc;
use std::thread;

use crate::bridge::{Callback, ForEachCallback, NativeError, NativeHandle};
use crate::config::{Config, ConfigError};
use crate::permissions::PermissionSet;

use super::{AppHandle, NativeCrypto};

mod jobs;
mod primitives;
mod session;

use jobs::{DispatchError, Job, JobDispatcher, JobReceiver, Op};
use session::Sessions;

pub use primitives::{KEY_SIZE, NONCE_SIZE, SIGNATURE_SIZE, TAG_SIZE};

/// Error codes reported through failed callbacks
pub mod codes {
    /// The app handle does not name a live session
    pub const INVALID_APP: i32 = -101;
    /// The handle does not exist in the session
    pub const INVALID_HANDLE: i32 = -102;
    /// The handle exists but addresses a different kind of object
    pub const WRONG_HANDLE_KIND: i32 = -103;
    /// Key bytes were malformed
    pub const INVALID_KEY: i32 = -104;
    pub const INVALID_SIGNATURE: i32 = -105;
    pub const ENCRYPTION: i32 = -106;
    pub const DECRYPTION: i32 = -107;
    pub const RANDOMNESS: i32 = -108;
    /// The job queue is at capacity
    pub const QUEUE_FULL: i32 = -109;
    /// Every worker thread has stopped
    pub const WORKER_GONE: i32 = -110;
}

#[derive(Debug, thiserror::Error)]
pub enum LocalNativeError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("failed to register app: {0}")]
    Register(#[from] NativeError),
}

/// Local native library backed by a worker thread pool
pub struct LocalNative {
    sessions: Arc<Sessions>,
    dispatcher: JobDispatcher,
    worker_threads: usize,
}

impl std::fmt::Debug for LocalNative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalNative")
            .field("worker_threads", &self.worker_threads)
            .finish()
    }
}

impl LocalNative {
    /// Start the worker pool described by `config`
    ///
    /// Workers stop once the `LocalNative` is dropped and the queue drains.
    pub fn new(config: &Config) -> Result<Self, LocalNativeError> {
        config.validate()?;

        let sessions = Arc::new(Sessions::default());
        let (dispatcher, receiver) = JobDispatcher::new(config.max_queue_size);

        for i in 0..config.worker_threads {
            let sessions = sessions.clone();
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("local-native-{}", i))
                .spawn(move || run_worker(i, sessions, receiver))?;
        }
        tracing::info!(
            workers = config.worker_threads,
            "started local native library"
        );

        Ok(Self {
            sessions,
            dispatcher,
            worker_threads: config.worker_threads,
        })
    }

    /// Open a new app session with its own identity keys
    pub fn register_app(&self) -> Result<AppHandle, LocalNativeError> {
        let app = self.sessions.register()?;
        tracing::debug!(%app, "registered app session");
        Ok(app)
    }

    /// Number of live handles in the session, `None` for an unknown app
    pub fn live_handles(&self, app: AppHandle) -> Option<usize> {
        self.sessions.live_handles(app)
    }

    fn call(&self, app: AppHandle, op: Op, callback: Callback) {
        self.dispatch(Job::Call { app, op, callback })
    }

    /// Queue a job, failing its callback right away if it cannot be queued
    fn dispatch(&self, job: Job) {
        let name = job.name();
        match self.dispatcher.dispatch(job) {
            Ok(()) => {}
            Err(DispatchError::Full(job)) => {
                tracing::warn!(call = name, "native job queue is full");
                job.fail(NativeError::new(codes::QUEUE_FULL, "job queue is full"));
            }
            Err(DispatchError::Disconnected(job)) => {
                tracing::error!(call = name, "native workers have stopped");
                job.fail(NativeError::new(
                    codes::WORKER_GONE,
                    "native workers have stopped",
                ));
            }
        }
    }
}

fn run_worker(id: usize, sessions: Arc<Sessions>, receiver: JobReceiver) {
    tracing::debug!(worker = id, "native worker started");
    while let Some(job) = receiver.recv() {
        match job {
            Job::Call { app, op, callback } => {
                let name = op.name();
                let outcome = sessions.execute(app, op);
                if let Err(e) = &outcome {
                    tracing::debug!(worker = id, call = name, %app, "native call failed: {}", e);
                }
                callback.resolve(outcome);
            }
            Job::ForEachPermissions {
                app,
                permissions,
                callback,
            } => sessions.for_each_permissions(app, permissions, callback),
        }
    }
    tracing::debug!(worker = id, "native job queue closed, worker shutting down");
}

impl NativeCrypto for LocalNative {
    fn app_pub_sign_key(&self, app: AppHandle, callback: Callback) {
        self.call(app, Op::AppPubSignKey, callback)
    }

    fn sign_generate_key_pair(&self, app: AppHandle, callback: Callback) {
        self.call(app, Op::SignGenerateKeyPair, callback)
    }

    fn sign_pub_key_new(&self, app: AppHandle, bytes: &[u8], callback: Callback) {
        self.call(app, Op::SignPubKeyNew(bytes.to_vec()), callback)
    }

    fn sign_pub_key_get(&self, app: AppHandle, key: NativeHandle, callback: Callback) {
        self.call(app, Op::SignPubKeyGet(key), callback)
    }

    fn sign_pub_key_free(&self, app: AppHandle, key: NativeHandle, callback: Callback) {
        self.call(app, Op::SignPubKeyFree(key), callback)
    }

    fn sign_sec_key_new(&self, app: AppHandle, bytes: &[u8], callback: Callback) {
        self.call(app, Op::SignSecKeyNew(bytes.to_vec()), callback)
    }

    fn sign_sec_key_free(&self, app: AppHandle, key: NativeHandle, callback: Callback) {
        self.call(app, Op::SignSecKeyFree(key), callback)
    }

    fn app_pub_enc_key(&self, app: AppHandle, callback: Callback) {
        self.call(app, Op::AppPubEncKey, callback)
    }

    fn enc_generate_key_pair(&self, app: AppHandle, callback: Callback) {
        self.call(app, Op::EncGenerateKeyPair, callback)
    }

    fn enc_pub_key_new(&self, app: AppHandle, bytes: &[u8], callback: Callback) {
        self.call(app, Op::EncPubKeyNew(bytes.to_vec()), callback)
    }

    fn enc_pub_key_get(&self, app: AppHandle, key: NativeHandle, callback: Callback) {
        self.call(app, Op::EncPubKeyGet(key), callback)
    }

    fn enc_pub_key_free(&self, app: AppHandle, key: NativeHandle, callback: Callback) {
        self.call(app, Op::EncPubKeyFree(key), callback)
    }

    fn enc_secret_key_new(&self, app: AppHandle, bytes: &[u8], callback: Callback) {
        self.call(app, Op::EncSecretKeyNew(bytes.to_vec()), callback)
    }

    fn enc_secret_key_free(&self, app: AppHandle, key: NativeHandle, callback: Callback) {
        self.call(app, Op::EncSecretKeyFree(key), callback)
    }

    fn sign(&self, app: AppHandle, data: &[u8], secret: NativeHandle, callback: Callback) {
        let op = Op::Sign {
            data: data.to_vec(),
            secret,
        };
        self.call(app, op, callback)
    }

    fn verify(&self, app: AppHandle, signed: &[u8], public: NativeHandle, callback: Callback) {
        let op = Op::Verify {
            signed: signed.to_vec(),
            public,
        };
        self.call(app, op, callback)
    }

    fn encrypt(
        &self,
        app: AppHandle,
        data: &[u8],
        public: NativeHandle,
        secret: NativeHandle,
        callback: Callback,
    ) {
        let op = Op::Encrypt {
            data: data.to_vec(),
            public,
            secret,
        };
        self.call(app, op, callback)
    }

    fn decrypt(
        &self,
        app: AppHandle,
        data: &[u8],
        public: NativeHandle,
        secret: NativeHandle,
        callback: Callback,
    ) {
        let op = Op::Decrypt {
            data: data.to_vec(),
            public,
            secret,
        };
        self.call(app, op, callback)
    }

    fn encrypt_sealed_box(
        &self,
        app: AppHandle,
        data: &[u8],
        public: NativeHandle,
        callback: Callback,
    ) {
        let op = Op::EncryptSealedBox {
            data: data.to_vec(),
            public,
        };
        self.call(app, op, callback)
    }

    fn decrypt_sealed_box(
        &self,
        app: AppHandle,
        data: &[u8],
        secret: NativeHandle,
        callback: Callback,
    ) {
        let op = Op::DecryptSealedBox {
            data: data.to_vec(),
            secret,
        };
        self.call(app, op, callback)
    }

    fn mdata_permissions_new(&self, app: AppHandle, callback: Callback) {
        self.call(app, Op::PermissionsNew, callback)
    }

    fn mdata_permissions_len(&self, app: AppHandle, permissions: NativeHandle, callback: Callback) {
        self.call(app, Op::PermissionsLen(permissions), callback)
    }

    fn mdata_permissions_insert(
        &self,
        app: AppHandle,
        permissions: NativeHandle,
        user: NativeHandle,
        set: PermissionSet,
        callback: Callback,
    ) {
        let op = Op::PermissionsInsert {
            permissions,
            user,
            set,
        };
        self.call(app, op, callback)
    }

    fn mdata_permissions_for_each(
        &self,
        app: AppHandle,
        permissions: NativeHandle,
        callback: ForEachCallback,
    ) {
        self.dispatch(Job::ForEachPermissions {
            app,
            permissions,
            callback,
        })
    }

    fn mdata_permissions_free(&self, app: AppHandle, permissions: NativeHandle, callback: Callback) {
        self.call(app, Op::PermissionsFree(permissions), callback)
    }

    fn mdata_permission_set_get(&self, app: AppHandle, set: NativeHandle, callback: Callback) {
        self.call(app, Op::PermissionSetGet(set), callback)
    }

    fn mdata_permission_set_free(&self, app: AppHandle, set: NativeHandle, callback: Callback) {
        self.call(app, Op::PermissionSetFree(set), callback)
    }
}
