/**
 * Session context tying an app handle, its native
 *  library and its callback registry together.
 */
pub mod app;
/**
 * Asynchronous completion bridge.
 *  - Callback registry keyed by request token
 *  - Call-once notifications as futures
 *  - Call-per-item notifications as sinks and streams
 */
pub mod bridge;
/**
 * Configuration for the native backend and logging.
 */
pub mod config;
/**
 * Key handles and cryptographic operations.
 *  - Sign and encrypt key lifecycle
 *  - Sign/verify, box and sealed box encryption
 */
pub mod crypto;
/**
 * Release-on-drop ownership of native handles.
 */
pub mod handle;
/**
 * Interface to the native library, plus an
 *  in-process implementation of it.
 */
pub mod native;
/**
 * Permission lists of mutable data, the one
 *  consumer of call-per-item notifications.
 */
pub mod permissions;
/**
 * Helpers for standing up an app session in tests.
 */
pub mod testkit;

pub mod prelude {
    pub use crate::app::App;
    pub use crate::bridge::{BridgeError, CallbackRegistry, NativeError, NativeHandle};
    pub use crate::config::Config;
    pub use crate::crypto::{
        Crypto, EncryptKeyPair, PublicEncryptKey, PublicSignKey, SecretEncryptKey, SecretSignKey,
        SignKeyPair,
    };
    pub use crate::native::{AppHandle, LocalNative, NativeCrypto};
    pub use crate::permissions::{MDataPermissions, PermissionEntry, PermissionSet};
}
