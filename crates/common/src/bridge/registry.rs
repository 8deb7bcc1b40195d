use std::collections::hash_map::{Entry, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::for_each::{
    ChannelSink, FnSink, ForEachItem, ForEachSink, ForEachStream, ReleaseItem,
};
use super::payload::{Payload, PayloadKind, PayloadShape};
use super::result::{BridgeError, FfiResult, NativeError, CALLBACK_DROPPED};

/// Identity of one pending operation, assigned at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackToken(u64);

impl CallbackToken {
    /// Rebuild a token from the raw value passed through the native layer
    pub fn from_raw(raw: u64) -> Self {
        CallbackToken(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Outcome = Result<Payload, BridgeError>;
type OrphanHook = Box<dyn FnOnce(Payload) + Send>;
/// Shared between a registration and its [`Pending`] so that whichever side
///  ends up holding an unclaimed payload runs the hook
type SharedOrphan = Arc<Mutex<Option<OrphanHook>>>;

fn run_orphan(orphan: &SharedOrphan, payload: Payload) {
    let hook = orphan.lock().take();
    if let Some(hook) = hook {
        hook(payload);
    }
}

enum Registration {
    SingleShot {
        kind: PayloadKind,
        sink: Option<oneshot::Sender<Outcome>>,
        orphan: Option<SharedOrphan>,
    },
    ForEach(Arc<ForEachEntry>),
}

struct ForEachEntry {
    expected: u64,
    state: Mutex<ForEachState>,
}

struct ForEachState {
    seen: u64,
    sink: Option<Box<dyn ForEachSink>>,
}

#[derive(Default)]
struct RegistryInner {
    next_token: AtomicU64,
    pending: Mutex<HashMap<CallbackToken, Registration>>,
}

/// Registry of in-flight native callbacks
///
/// One registry is owned by each app session. Every registration stays in
///  the registry until its terminal notification arrives, and is removed
///  before its consumer is completed. The registry is a cheap handle over
///  shared state: clones see the same pending set, and every outstanding
///  [`Callback`] keeps it alive.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("pending", &self.len())
            .finish()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registrations that have not fired their terminal notification
    pub fn len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, token: CallbackToken) -> bool {
        self.inner.pending.lock().contains_key(&token)
    }

    // ========================================
    // Registration
    // ========================================

    /// Register a call-once notification of the given shape
    pub fn register_single_shot(&self, kind: PayloadKind) -> (Callback, Pending<Payload>) {
        let (token, rx) = self.insert_single_shot(kind, None);
        let pending = Pending {
            token,
            kind,
            rx,
            decode: Some,
            orphan: None,
        };
        (self.callback(token), pending)
    }

    /// Register a call-once notification decoded into `T`
    pub fn register<T: PayloadShape>(&self) -> (Callback, Pending<T>) {
        self.register_inner(None)
    }

    /// Like [`CallbackRegistry::register`], but hands the success payload to
    ///  `orphan` if the returned future was dropped before completion.
    ///
    /// Used for requests that create native state, so that state can be
    ///  released when nobody is left to own it.
    pub fn register_with_orphan<T, F>(&self, orphan: F) -> (Callback, Pending<T>)
    where
        T: PayloadShape,
        F: FnOnce(Payload) + Send + 'static,
    {
        self.register_inner(Some(Arc::new(Mutex::new(Some(Box::new(orphan))))))
    }

    /// Register a fire-and-forget call-once notification
    ///
    /// Nobody observes the result, failures are only logged.
    pub fn register_detached(&self, kind: PayloadKind) -> Callback {
        let token = self.next_token();
        self.insert(
            token,
            Registration::SingleShot {
                kind,
                sink: None,
                orphan: None,
            },
        );
        self.callback(token)
    }

    /// Register an iterator-style notification expecting `expected` items
    ///
    /// With `expected == 0` the sink completes right away and nothing is
    ///  kept in the registry.
    pub fn register_for_each<S: ForEachSink>(&self, expected: u64, sink: S) -> ForEachCallback {
        let (callback, ()) = self.register_for_each_with(expected, |_| (sink, ()));
        callback
    }

    /// Register an iterator-style notification from a pair of closures
    pub fn register_for_each_fn<I, C>(
        &self,
        expected: u64,
        on_item: I,
        on_complete: C,
    ) -> ForEachCallback
    where
        I: FnMut(ForEachItem) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        self.register_for_each(expected, FnSink::new(on_item, on_complete))
    }

    /// Register an iterator-style notification whose items are read from
    ///  the returned stream
    ///
    /// The caller owns the handles of every item. Items the stream never
    ///  hands out are leaked; use
    ///  [`CallbackRegistry::register_for_each_stream_with_release`] when the
    ///  stream may be dropped early.
    pub fn register_for_each_stream(&self, expected: u64) -> (ForEachCallback, ForEachStream) {
        self.register_for_each_with(expected, |token| ChannelSink::new(token, None))
    }

    /// Like [`CallbackRegistry::register_for_each_stream`], but items the
    ///  stream never hands out are passed to `release`
    pub fn register_for_each_stream_with_release<F>(
        &self,
        expected: u64,
        release: F,
    ) -> (ForEachCallback, ForEachStream)
    where
        F: Fn(ForEachItem) + Send + Sync + 'static,
    {
        let release: ReleaseItem = Arc::new(release);
        self.register_for_each_with(expected, move |token| {
            ChannelSink::new(token, Some(release))
        })
    }

    fn register_for_each_with<S, R, F>(&self, expected: u64, make_sink: F) -> (ForEachCallback, R)
    where
        S: ForEachSink,
        F: FnOnce(CallbackToken) -> (S, R),
    {
        let token = self.next_token();
        let (mut sink, consumer) = make_sink(token);
        if expected == 0 {
            tracing::debug!(%token, "for-each registration with no items, completing");
            sink.on_complete();
        } else {
            self.insert(
                token,
                Registration::ForEach(Arc::new(ForEachEntry {
                    expected,
                    state: Mutex::new(ForEachState {
                        seen: 0,
                        sink: Some(Box::new(sink)),
                    }),
                })),
            );
        }
        let callback = ForEachCallback {
            token,
            expected,
            registry: self.clone(),
        };
        (callback, consumer)
    }

    fn register_inner<T: PayloadShape>(
        &self,
        orphan: Option<SharedOrphan>,
    ) -> (Callback, Pending<T>) {
        let (token, rx) = self.insert_single_shot(T::KIND, orphan.clone());
        let pending = Pending {
            token,
            kind: T::KIND,
            rx,
            decode: T::from_payload,
            orphan,
        };
        (self.callback(token), pending)
    }

    fn insert_single_shot(
        &self,
        kind: PayloadKind,
        orphan: Option<SharedOrphan>,
    ) -> (CallbackToken, oneshot::Receiver<Outcome>) {
        let token = self.next_token();
        let (tx, rx) = oneshot::channel();
        self.insert(
            token,
            Registration::SingleShot {
                kind,
                sink: Some(tx),
                orphan,
            },
        );
        (token, rx)
    }

    fn next_token(&self) -> CallbackToken {
        CallbackToken(self.inner.next_token.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn insert(&self, token: CallbackToken, registration: Registration) {
        let previous = self.inner.pending.lock().insert(token, registration);
        assert!(
            previous.is_none(),
            "callback token {token} registered while still pending"
        );
        tracing::debug!(%token, "registered native callback");
    }

    fn callback(&self, token: CallbackToken) -> Callback {
        Callback {
            token,
            registry: Some(self.clone()),
        }
    }

    // ========================================
    // Notification
    // ========================================

    /// Deliver the call-once notification for `token`
    ///
    /// The registration is retired before its consumer is completed. On a
    ///  failure status the payload is never inspected.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::UnknownToken`] if the token was never registered or
    ///   has already been retired
    /// - [`BridgeError::NotSingleShot`] if the token belongs to a for-each
    ///   registration
    pub fn complete(
        &self,
        token: CallbackToken,
        status: FfiResult,
        payload: Payload,
    ) -> Result<(), BridgeError> {
        let registration = {
            let mut pending = self.inner.pending.lock();
            match pending.entry(token) {
                Entry::Occupied(entry) => {
                    if !matches!(entry.get(), Registration::SingleShot { .. }) {
                        return Err(BridgeError::NotSingleShot(token));
                    }
                    entry.remove()
                }
                Entry::Vacant(_) => return Err(BridgeError::UnknownToken(token)),
            }
        };
        let Registration::SingleShot { kind, sink, orphan } = registration else {
            return Err(BridgeError::NotSingleShot(token));
        };

        let outcome = if status.is_error() {
            Err(BridgeError::Native(NativeError::from(status)))
        } else if payload.kind() != kind {
            tracing::warn!(
                %token,
                expected = ?kind,
                got = ?payload.kind(),
                "native payload has the wrong shape"
            );
            Err(BridgeError::PayloadMismatch {
                expected: kind,
                got: payload.kind(),
            })
        } else {
            Ok(payload)
        };
        tracing::debug!(%token, ok = outcome.is_ok(), "retired native callback");

        let undelivered = match sink {
            Some(sink) => sink.send(outcome).err(),
            None => Some(outcome),
        };
        match undelivered {
            Some(Ok(payload)) => {
                if let Some(orphan) = orphan {
                    tracing::debug!(%token, "result has no consumer, releasing it");
                    run_orphan(&orphan, payload);
                }
            }
            Some(Err(err)) => {
                tracing::warn!(%token, "unobserved native callback failed: {}", err);
            }
            None => {}
        }
        Ok(())
    }

    /// Deliver one item of the for-each registration `token`
    ///
    /// Once the expected number of items has been seen, the registration is
    ///  retired and its sink completed.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::UnknownToken`] if the token is not pending (including
    ///   items arriving after completion)
    /// - [`BridgeError::NotForEach`] if the token is a single-shot registration
    pub fn notify_item(&self, token: CallbackToken, item: ForEachItem) -> Result<(), BridgeError> {
        let entry = match self.inner.pending.lock().get(&token) {
            Some(Registration::ForEach(entry)) => entry.clone(),
            Some(Registration::SingleShot { .. }) => return Err(BridgeError::NotForEach(token)),
            None => return Err(BridgeError::UnknownToken(token)),
        };

        let mut state = entry.state.lock();
        let Some(sink) = state.sink.as_mut() else {
            return Err(BridgeError::UnknownToken(token));
        };
        sink.on_item(item);
        state.seen += 1;
        if state.seen < entry.expected {
            return Ok(());
        }

        self.inner.pending.lock().remove(&token);
        let sink = state.sink.take();
        drop(state);
        tracing::debug!(%token, items = entry.expected, "retired for-each callback");
        if let Some(mut sink) = sink {
            sink.on_complete();
        }
        Ok(())
    }

    /// Retire a for-each registration without completing its sink
    ///
    /// The sink is dropped, so a [`ForEachStream`] consumer sees
    ///  [`BridgeError::Abandoned`].
    pub fn abort(&self, token: CallbackToken) -> Result<(), BridgeError> {
        let registration = {
            let mut pending = self.inner.pending.lock();
            match pending.entry(token) {
                Entry::Occupied(entry) => {
                    if !matches!(entry.get(), Registration::ForEach(_)) {
                        return Err(BridgeError::NotForEach(token));
                    }
                    entry.remove()
                }
                Entry::Vacant(_) => return Err(BridgeError::UnknownToken(token)),
            }
        };
        let Registration::ForEach(entry) = registration else {
            return Err(BridgeError::NotForEach(token));
        };
        let sink = entry.state.lock().sink.take();
        drop(sink);
        tracing::debug!(%token, "aborted for-each callback");
        Ok(())
    }

    #[cfg(test)]
    fn rewind_tokens(&self, next: u64) {
        self.inner.next_token.store(next, Ordering::SeqCst);
    }
}

/// Callback object handed to the native layer for one call-once notification
///
/// Firing consumes the callback, so it can only ever fire once. A callback
///  dropped without firing retires its registration with a
///  [`CALLBACK_DROPPED`] failure.
#[must_use = "a callback must be handed to the native layer"]
pub struct Callback {
    token: CallbackToken,
    registry: Option<CallbackRegistry>,
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").field("token", &self.token).finish()
    }
}

impl Callback {
    pub fn token(&self) -> CallbackToken {
        self.token
    }

    /// Fire with a native status and payload
    pub fn fire(mut self, status: FfiResult, payload: Payload) {
        if let Some(registry) = self.registry.take() {
            if let Err(e) = registry.complete(self.token, status, payload) {
                tracing::warn!(token = %self.token, "failed to fire callback: {}", e);
            }
        }
    }

    pub fn succeed(self, payload: Payload) {
        self.fire(FfiResult::ok(), payload)
    }

    pub fn fail(self, err: NativeError) {
        self.fire(err.into(), Payload::Unit)
    }

    /// Fire with the outcome of a native call
    pub fn resolve(self, outcome: Result<Payload, NativeError>) {
        match outcome {
            Ok(payload) => self.succeed(payload),
            Err(err) => self.fail(err),
        }
    }

    /// Disarm the callback and return its raw token
    ///
    /// The registration stays pending until
    ///  [`CallbackRegistry::complete`] is called with the token.
    pub fn into_token(mut self) -> CallbackToken {
        self.registry.take();
        self.token
    }
}

impl Drop for Callback {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take() {
            tracing::warn!(token = %self.token, "callback dropped without firing");
            let _ = registry.complete(
                self.token,
                FfiResult::error(CALLBACK_DROPPED, "callback dropped without firing"),
                Payload::Unit,
            );
        }
    }
}

/// Callback object handed to the native layer for a call-per-item notification
#[derive(Clone)]
pub struct ForEachCallback {
    token: CallbackToken,
    expected: u64,
    registry: CallbackRegistry,
}

impl fmt::Debug for ForEachCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForEachCallback")
            .field("token", &self.token)
            .field("expected", &self.expected)
            .finish()
    }
}

impl ForEachCallback {
    pub fn token(&self) -> CallbackToken {
        self.token
    }

    /// Number of items the consumer is waiting for
    pub fn expected(&self) -> u64 {
        self.expected
    }

    pub fn item(&self, item: ForEachItem) -> Result<(), BridgeError> {
        self.registry.notify_item(self.token, item)
    }

    /// Give up on delivering the remaining items
    pub fn abort(self) {
        if let Err(e) = self.registry.abort(self.token) {
            tracing::warn!(token = %self.token, "failed to abort for-each callback: {}", e);
        }
    }
}

/// Future resolved by the call-once notification of one registration
#[must_use = "futures do nothing unless polled"]
pub struct Pending<T> {
    token: CallbackToken,
    kind: PayloadKind,
    rx: oneshot::Receiver<Outcome>,
    decode: fn(Payload) -> Option<T>,
    orphan: Option<SharedOrphan>,
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("token", &self.token)
            .field("kind", &self.kind)
            .finish()
    }
}

impl<T> Pending<T> {
    pub fn token(&self) -> CallbackToken {
        self.token
    }
}

impl<T> Drop for Pending<T> {
    fn drop(&mut self) {
        let Some(orphan) = self.orphan.take() else {
            return;
        };
        // a payload delivered but never polled has no consumer either
        self.rx.close();
        if let Ok(Ok(payload)) = self.rx.try_recv() {
            tracing::debug!(token = %self.token, "result dropped unclaimed, releasing it");
            run_orphan(&orphan, payload);
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T, BridgeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(_)) => Poll::Ready(Err(BridgeError::Abandoned(this.token))),
            Poll::Ready(Ok(Err(err))) => Poll::Ready(Err(err)),
            Poll::Ready(Ok(Ok(payload))) => {
                let got = payload.kind();
                Poll::Ready((this.decode)(payload).ok_or(BridgeError::PayloadMismatch {
                    expected: this.kind,
                    got,
                }))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bridge::payload::NativeHandle;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    fn item(n: u64) -> ForEachItem {
        ForEachItem {
            sign_key: NativeHandle(n),
            permission_set: NativeHandle(n + 100),
        }
    }

    #[tokio::test]
    async fn test_single_shot_success() {
        let registry = CallbackRegistry::new();
        let (callback, pending) = registry.register::<Vec<u8>>();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(callback.token()));

        callback.succeed(Payload::Data(b"signed".to_vec()));
        assert!(registry.is_empty());
        assert_eq!(pending.await.unwrap(), b"signed".to_vec());
    }

    #[tokio::test]
    async fn test_failure_status_ignores_payload() {
        let registry = CallbackRegistry::new();
        let (callback, pending) = registry.register::<NativeHandle>();
        // a garbage payload of the wrong shape must not matter on failure
        callback.fire(FfiResult::error(-12, "invalid key"), Payload::Bool(true));

        let err = pending.await.unwrap_err();
        assert_eq!(err, BridgeError::Native(NativeError::new(-12, "invalid key")));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_shape_is_never_success() {
        let registry = CallbackRegistry::new();
        let (callback, pending) = registry.register::<(NativeHandle, NativeHandle)>();
        callback.succeed(Payload::Handle(NativeHandle(1)));

        let err = pending.await.unwrap_err();
        assert_eq!(
            err,
            BridgeError::PayloadMismatch {
                expected: PayloadKind::HandlePair,
                got: PayloadKind::Handle,
            }
        );
    }

    #[tokio::test]
    async fn test_untyped_registration() {
        let registry = CallbackRegistry::new();
        let (callback, pending) = registry.register_single_shot(PayloadKind::StringList);
        callback.succeed(Payload::StringList(vec!["one".into()]));
        assert_eq!(
            pending.await.unwrap(),
            Payload::StringList(vec!["one".to_string()])
        );
    }

    #[tokio::test]
    async fn test_second_completion_is_rejected() {
        let registry = CallbackRegistry::new();
        let (callback, pending) = registry.register::<bool>();
        let token = callback.into_token();

        registry
            .complete(token, FfiResult::ok(), Payload::Bool(true))
            .unwrap();
        assert_eq!(
            registry.complete(token, FfiResult::ok(), Payload::Bool(false)),
            Err(BridgeError::UnknownToken(token))
        );
        assert!(pending.await.unwrap());
    }

    #[test]
    fn test_detached_registration() {
        let registry = CallbackRegistry::new();
        let ok = registry.register_detached(PayloadKind::Unit);
        let failed = registry.register_detached(PayloadKind::Unit);
        assert_eq!(registry.len(), 2);

        ok.succeed(Payload::Unit);
        failed.fail(NativeError::new(-1, "free failed"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_callback_retires() {
        let registry = CallbackRegistry::new();
        let (callback, pending) = registry.register::<()>();
        drop(callback);

        assert!(registry.is_empty());
        let err = pending.await.unwrap_err();
        assert_eq!(err.native().map(|e| e.code), Some(CALLBACK_DROPPED));
    }

    #[tokio::test]
    async fn test_registry_dropped_abandons_pending() {
        let registry = CallbackRegistry::new();
        let (callback, pending) = registry.register::<bool>();
        let token = callback.into_token();
        drop(registry);

        assert_eq!(pending.await.unwrap_err(), BridgeError::Abandoned(token));
    }

    #[test]
    fn test_orphan_hook_receives_unclaimed_payload() {
        let registry = CallbackRegistry::new();
        let released = Arc::new(Mutex::new(Vec::new()));
        let sink = released.clone();
        let (callback, pending) = registry.register_with_orphan::<NativeHandle, _>(move |p| {
            sink.lock().extend(p.handles());
        });

        drop(pending);
        callback.succeed(Payload::Handle(NativeHandle(42)));
        assert_eq!(*released.lock(), vec![NativeHandle(42)]);
    }

    #[test]
    fn test_orphan_hook_receives_delivered_but_unpolled_payload() {
        let registry = CallbackRegistry::new();
        let released = Arc::new(Mutex::new(Vec::new()));
        let sink = released.clone();
        let (callback, pending) = registry.register_with_orphan::<NativeHandle, _>(move |p| {
            sink.lock().extend(p.handles());
        });

        callback.succeed(Payload::Handle(NativeHandle(8)));
        assert!(released.lock().is_empty());
        drop(pending);
        assert_eq!(*released.lock(), vec![NativeHandle(8)]);
    }

    #[tokio::test]
    async fn test_orphan_hook_not_called_when_claimed() {
        let registry = CallbackRegistry::new();
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let (callback, pending) = registry
            .register_with_orphan::<NativeHandle, _>(move |_| flag.store(true, Ordering::SeqCst));

        callback.succeed(Payload::Handle(NativeHandle(7)));
        assert_eq!(pending.await.unwrap(), NativeHandle(7));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_for_each_completes_after_last_item() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicBool::new(false));
        let (s, d) = (seen.clone(), done.clone());
        let callback = registry.register_for_each_fn(
            3,
            move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            },
            move || d.store(true, Ordering::SeqCst),
        );
        assert_eq!(callback.expected(), 3);

        callback.item(item(1)).unwrap();
        callback.item(item(2)).unwrap();
        assert!(!done.load(Ordering::SeqCst));
        assert!(registry.contains(callback.token()));

        callback.item(item(3)).unwrap();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert!(registry.is_empty());

        // late items are rejected, not delivered
        assert_eq!(
            callback.item(item(4)),
            Err(BridgeError::UnknownToken(callback.token()))
        );
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_for_each_zero_items_completes_immediately() {
        let registry = CallbackRegistry::new();
        let done = Arc::new(AtomicBool::new(false));
        let d = done.clone();
        let callback = registry.register_for_each_fn(0, |_| {}, move || d.store(true, Ordering::SeqCst));

        assert!(done.load(Ordering::SeqCst));
        assert!(!registry.contains(callback.token()));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_for_each_stream_collects() {
        let registry = CallbackRegistry::new();
        let (callback, stream) = registry.register_for_each_stream(2);
        assert_eq!(stream.token(), callback.token());

        callback.item(item(1)).unwrap();
        callback.item(item(2)).unwrap();
        assert_eq!(stream.collect().await.unwrap(), vec![item(1), item(2)]);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_for_each_stream_abandoned() {
        let registry = CallbackRegistry::new();
        let (callback, stream) = registry.register_for_each_stream(2);
        let token = callback.token();
        callback.item(item(1)).unwrap();
        drop(callback);
        drop(registry);

        assert_eq!(stream.collect().await, Err(BridgeError::Abandoned(token)));
    }

    #[tokio::test]
    async fn test_for_each_abort_abandons_stream() {
        let registry = CallbackRegistry::new();
        let (callback, stream) = registry.register_for_each_stream(3);
        let token = callback.token();
        callback.item(item(1)).unwrap();
        callback.clone().abort();

        assert!(registry.is_empty());
        assert_eq!(callback.item(item(2)), Err(BridgeError::UnknownToken(token)));
        assert_eq!(stream.collect().await, Err(BridgeError::Abandoned(token)));
    }

    #[test]
    fn test_dropped_stream_releases_unclaimed_items() {
        let registry = CallbackRegistry::new();
        let released = Arc::new(Mutex::new(Vec::new()));
        let sink = released.clone();
        let (callback, stream) =
            registry.register_for_each_stream_with_release(3, move |item| sink.lock().push(item));

        // one item buffered, then the consumer goes away
        callback.item(item(1)).unwrap();
        drop(stream);
        callback.item(item(2)).unwrap();
        callback.item(item(3)).unwrap();

        assert!(registry.is_empty());
        assert_eq!(*released.lock(), vec![item(1), item(2), item(3)]);
    }

    #[tokio::test]
    async fn test_abandoned_stream_releases_collected_items() {
        let registry = CallbackRegistry::new();
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let (callback, stream) = registry.register_for_each_stream_with_release(3, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let token = callback.token();
        callback.item(item(1)).unwrap();
        callback.item(item(2)).unwrap();
        callback.abort();

        assert_eq!(stream.collect().await, Err(BridgeError::Abandoned(token)));
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_completed_stream_releases_nothing() {
        let registry = CallbackRegistry::new();
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let (callback, stream) = registry.register_for_each_stream_with_release(1, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        callback.item(item(7)).unwrap();

        assert_eq!(stream.collect().await.unwrap(), vec![item(7)]);
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_notification_kind_mismatch() {
        let registry = CallbackRegistry::new();
        let (single, _pending) = registry.register::<()>();
        let each = registry.register_for_each_fn(1, |_| {}, || {});

        assert_eq!(
            registry.notify_item(single.token(), item(1)),
            Err(BridgeError::NotForEach(single.token()))
        );
        assert_eq!(
            registry.complete(each.token(), FfiResult::ok(), Payload::Unit),
            Err(BridgeError::NotSingleShot(each.token()))
        );
        // both registrations are still pending
        assert_eq!(registry.len(), 2);
        single.succeed(Payload::Unit);
        each.item(item(1)).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_retirement_removes_entry() {
        let registry = CallbackRegistry::new();
        let (first, _a) = registry.register::<()>();
        let (second, _b) = registry.register::<()>();
        assert_eq!(registry.len(), 2);

        first.succeed(Payload::Unit);
        assert_eq!(registry.len(), 1);
        second.succeed(Payload::Unit);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_repeated_cycles_return_to_baseline() {
        let registry = CallbackRegistry::new();
        let baseline = registry.len();
        for i in 0..10_000u64 {
            let (callback, pending) = registry.register::<NativeHandle>();
            callback.succeed(Payload::Handle(NativeHandle(i)));
            assert_eq!(pending.await.unwrap(), NativeHandle(i));
        }
        assert_eq!(registry.len(), baseline);
    }

    #[test]
    fn test_reentrant_registration_from_sink() {
        let registry = CallbackRegistry::new();
        let inner = registry.clone();
        let follow_up = Arc::new(Mutex::new(None));
        let slot = follow_up.clone();
        let callback = registry.register_for_each_fn(
            1,
            |_| {},
            move || {
                *slot.lock() = Some(inner.register_detached(PayloadKind::Unit));
            },
        );

        callback.item(item(1)).unwrap();
        let next = follow_up.lock().take().unwrap();
        assert_eq!(registry.len(), 1);
        next.succeed(Payload::Unit);
        assert!(registry.is_empty());
    }

    #[test]
    #[should_panic(expected = "registered while still pending")]
    fn test_duplicate_token_is_detected() {
        let registry = CallbackRegistry::new();
        let (first, _pending) = registry.register::<()>();
        let _first = first.into_token();
        registry.rewind_tokens(0);
        let _ = registry.register::<()>();
    }
}
