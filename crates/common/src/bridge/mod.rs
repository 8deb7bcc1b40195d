//! Asynchronous completion bridge between the native library and Rust futures
//!
//! The native library reports results through callbacks: once for simple
//!  calls, once per item for iterator-style calls. This module adapts both
//!  conventions into futures and sinks:
//!
//! - **Registration**: every request registers a pending operation in the
//!   session's [`CallbackRegistry`] and gets back a [`Callback`] (or
//!   [`ForEachCallback`]) to hand to the native layer, plus the consumer
//!   side ([`Pending`] future, [`ForEachSink`], or [`ForEachStream`]).
//! - **Notification**: the native layer fires the callback from whatever
//!   thread it likes. The registration is retired first, then the consumer
//!   is completed with either the payload or a [`BridgeError`].
//! - **Retirement**: an entry never outlives its terminal notification, so
//!   the registry size always equals the number of requests in flight.
//!
//! ```ignore
//! let registry = CallbackRegistry::new();
//! let (callback, pending) = registry.register::<Vec<u8>>();
//! native.sign(app, &data, key, callback);
//! let signed = pending.await?;
//! ```

mod for_each;
mod payload;
mod registry;
mod result;

pub use for_each::{FnSink, ForEachItem, ForEachSink, ForEachStream};
pub use payload::{
    NativeHandle, Payload, PayloadKind, PayloadShape, RawPointer, VersionedData,
};
pub use registry::{Callback, CallbackRegistry, CallbackToken, ForEachCallback, Pending};
pub use result::{BridgeError, FfiResult, NativeError, CALLBACK_DROPPED};
