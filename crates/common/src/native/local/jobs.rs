//! Job queue feeding the local native worker threads
//!
//! Every request is turned into a [`Job`] and pushed onto a flume channel.
//!  Worker threads pull jobs off the channel and fire the job's callback
//!  from their own thread, the way the real native library does.
//!
//! Releases of native handles travel on a second, unbounded channel. A free
//!  is issued from a drop with nobody to report a failure to, so it must
//!  never be turned away by a full request queue.

use crate::bridge::{Callback, ForEachCallback, NativeError, NativeHandle};
use crate::native::AppHandle;
use crate::permissions::PermissionSet;

/// A single native call
#[derive(Debug)]
pub enum Op {
    AppPubSignKey,
    SignGenerateKeyPair,
    SignPubKeyNew(Vec<u8>),
    SignPubKeyGet(NativeHandle),
    SignPubKeyFree(NativeHandle),
    SignSecKeyNew(Vec<u8>),
    SignSecKeyFree(NativeHandle),

    AppPubEncKey,
    EncGenerateKeyPair,
    EncPubKeyNew(Vec<u8>),
    EncPubKeyGet(NativeHandle),
    EncPubKeyFree(NativeHandle),
    EncSecretKeyNew(Vec<u8>),
    EncSecretKeyFree(NativeHandle),

    Sign {
        data: Vec<u8>,
        secret: NativeHandle,
    },
    Verify {
        signed: Vec<u8>,
        public: NativeHandle,
    },
    Encrypt {
        data: Vec<u8>,
        public: NativeHandle,
        secret: NativeHandle,
    },
    Decrypt {
        data: Vec<u8>,
        public: NativeHandle,
        secret: NativeHandle,
    },
    EncryptSealedBox {
        data: Vec<u8>,
        public: NativeHandle,
    },
    DecryptSealedBox {
        data: Vec<u8>,
        secret: NativeHandle,
    },

    PermissionsNew,
    PermissionsLen(NativeHandle),
    PermissionsInsert {
        permissions: NativeHandle,
        user: NativeHandle,
        set: PermissionSet,
    },
    PermissionsFree(NativeHandle),
    PermissionSetGet(NativeHandle),
    PermissionSetFree(NativeHandle),
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::AppPubSignKey => "app_pub_sign_key",
            Op::SignGenerateKeyPair => "sign_generate_key_pair",
            Op::SignPubKeyNew(_) => "sign_pub_key_new",
            Op::SignPubKeyGet(_) => "sign_pub_key_get",
            Op::SignPubKeyFree(_) => "sign_pub_key_free",
            Op::SignSecKeyNew(_) => "sign_sec_key_new",
            Op::SignSecKeyFree(_) => "sign_sec_key_free",
            Op::AppPubEncKey => "app_pub_enc_key",
            Op::EncGenerateKeyPair => "enc_generate_key_pair",
            Op::EncPubKeyNew(_) => "enc_pub_key_new",
            Op::EncPubKeyGet(_) => "enc_pub_key_get",
            Op::EncPubKeyFree(_) => "enc_pub_key_free",
            Op::EncSecretKeyNew(_) => "enc_secret_key_new",
            Op::EncSecretKeyFree(_) => "enc_secret_key_free",
            Op::Sign { .. } => "sign",
            Op::Verify { .. } => "verify",
            Op::Encrypt { .. } => "encrypt",
            Op::Decrypt { .. } => "decrypt",
            Op::EncryptSealedBox { .. } => "encrypt_sealed_box",
            Op::DecryptSealedBox { .. } => "decrypt_sealed_box",
            Op::PermissionsNew => "mdata_permissions_new",
            Op::PermissionsLen(_) => "mdata_permissions_len",
            Op::PermissionsInsert { .. } => "mdata_permissions_insert",
            Op::PermissionsFree(_) => "mdata_permissions_free",
            Op::PermissionSetGet(_) => "mdata_permission_set_get",
            Op::PermissionSetFree(_) => "mdata_permission_set_free",
        }
    }

    /// Whether the call releases a native handle
    pub fn is_release(&self) -> bool {
        matches!(
            self,
            Op::SignPubKeyFree(_)
                | Op::SignSecKeyFree(_)
                | Op::EncPubKeyFree(_)
                | Op::EncSecretKeyFree(_)
                | Op::PermissionsFree(_)
                | Op::PermissionSetFree(_)
        )
    }
}

/// Work handed to a worker thread
#[derive(Debug)]
pub enum Job {
    /// A call answered by one notification
    Call {
        app: AppHandle,
        op: Op,
        callback: Callback,
    },
    /// Enumerate a permissions object, one notification per entry
    ForEachPermissions {
        app: AppHandle,
        permissions: NativeHandle,
        callback: ForEachCallback,
    },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::Call { op, .. } => op.name(),
            Job::ForEachPermissions { .. } => "mdata_permissions_for_each",
        }
    }

    fn is_release(&self) -> bool {
        matches!(self, Job::Call { op, .. } if op.is_release())
    }

    /// Complete the job's callback without running it
    ///
    /// A for-each job has no failure notification, its registration is
    ///  aborted instead.
    pub fn fail(self, err: NativeError) {
        match self {
            Job::Call { callback, .. } => callback.fail(err),
            Job::ForEachPermissions { callback, .. } => callback.abort(),
        }
    }
}

/// Why a job could not be queued, carrying the job back to the caller
#[derive(Debug)]
pub enum DispatchError {
    Full(Job),
    Disconnected(Job),
}

/// Job dispatcher that can be cloned and shared across callers
#[derive(Debug, Clone)]
pub struct JobDispatcher {
    tx: flume::Sender<Job>,
    releases: flume::Sender<Job>,
}

impl JobDispatcher {
    /// Create a new job dispatcher and receiver pair
    ///
    /// `max_queue_size` bounds the number of queued jobs, `None` means
    ///  unbounded.
    pub fn new(max_queue_size: Option<usize>) -> (Self, JobReceiver) {
        let (tx, rx) = match max_queue_size {
            Some(size) => {
                tracing::debug!("creating bounded native job queue with size {}", size);
                flume::bounded(size)
            }
            None => {
                tracing::debug!("creating unbounded native job queue");
                flume::unbounded()
            }
        };
        let (releases, release_rx) = flume::unbounded();
        (
            Self { tx, releases },
            JobReceiver {
                rx,
                releases: release_rx,
            },
        )
    }

    /// Queue a job without blocking
    ///
    /// Handle releases bypass the queue bound and can only fail once the
    ///  workers are gone.
    pub fn dispatch(&self, job: Job) -> Result<(), DispatchError> {
        if job.is_release() {
            return self
                .releases
                .send(job)
                .map_err(|flume::SendError(job)| DispatchError::Disconnected(job));
        }
        self.tx.try_send(job).map_err(|e| match e {
            flume::TrySendError::Full(job) => DispatchError::Full(job),
            flume::TrySendError::Disconnected(job) => DispatchError::Disconnected(job),
        })
    }
}

/// Job receiver shared by the worker threads
#[derive(Debug, Clone)]
pub struct JobReceiver {
    rx: flume::Receiver<Job>,
    releases: flume::Receiver<Job>,
}

impl JobReceiver {
    /// Receive the next job (blocking), pending releases first
    ///
    /// Returns None when all senders have been dropped and both queues are
    ///  drained (graceful shutdown).
    pub fn recv(&self) -> Option<Job> {
        if let Ok(job) = self.releases.try_recv() {
            return Some(job);
        }
        flume::Selector::new()
            .recv(&self.releases, |job| job.ok())
            .recv(&self.rx, |job| job.ok())
            .wait()
            // one side is disconnected, drain whatever the other still holds
            .or_else(|| self.releases.recv().ok())
            .or_else(|| self.rx.recv().ok())
    }
}
