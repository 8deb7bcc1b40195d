//! Sinks for iterator-style (call-per-item) notifications

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::payload::NativeHandle;
use super::registry::CallbackToken;
use super::result::BridgeError;

/// One item delivered by a call-per-item notification:
///  a sign key and the permission set granted to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForEachItem {
    pub sign_key: NativeHandle,
    pub permission_set: NativeHandle,
}

/// Receives the items of one for-each registration
///
/// `on_item` is called once per delivered item and `on_complete` exactly
///  once, after the expected number of items has been seen. Calls for a
///  single registration never overlap.
///
/// A sink must not deliver items to its own registration from inside
///  `on_item`.
pub trait ForEachSink: Send + 'static {
    fn on_item(&mut self, item: ForEachItem);
    fn on_complete(&mut self);
}

/// A sink built from a pair of closures
pub struct FnSink<I, C> {
    on_item: I,
    on_complete: Option<C>,
}

impl<I, C> FnSink<I, C>
where
    I: FnMut(ForEachItem) + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    pub fn new(on_item: I, on_complete: C) -> Self {
        Self {
            on_item,
            on_complete: Some(on_complete),
        }
    }
}

impl<I, C> ForEachSink for FnSink<I, C>
where
    I: FnMut(ForEachItem) + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    fn on_item(&mut self, item: ForEachItem) {
        (self.on_item)(item)
    }

    fn on_complete(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete();
        }
    }
}

/// Releases the native handles of an item nobody will consume
pub(crate) type ReleaseItem = Arc<dyn Fn(ForEachItem) + Send + Sync>;

/// State shared by a [`ChannelSink`] and its [`ForEachStream`]
struct StreamShared {
    /// Set once the stream is dropped; guards the hand-over of items
    closed: Mutex<bool>,
    release: Option<ReleaseItem>,
}

impl StreamShared {
    fn discard(&self, item: ForEachItem) {
        match &self.release {
            Some(release) => release(item),
            None => tracing::warn!(?item, "for-each item has no consumer, its handles are leaked"),
        }
    }
}

/// Channel-backed sink feeding a [`ForEachStream`]
pub(crate) struct ChannelSink {
    items: Option<flume::Sender<ForEachItem>>,
    done: Option<oneshot::Sender<()>>,
    shared: Arc<StreamShared>,
}

impl ChannelSink {
    pub(crate) fn new(token: CallbackToken, release: Option<ReleaseItem>) -> (Self, ForEachStream) {
        let (items_tx, items_rx) = flume::unbounded();
        let (done_tx, done_rx) = oneshot::channel();
        let shared = Arc::new(StreamShared {
            closed: Mutex::new(false),
            release,
        });
        (
            Self {
                items: Some(items_tx),
                done: Some(done_tx),
                shared: shared.clone(),
            },
            ForEachStream {
                token,
                items: items_rx,
                done: done_rx,
                shared,
            },
        )
    }
}

impl ForEachSink for ChannelSink {
    fn on_item(&mut self, item: ForEachItem) {
        let closed = self.shared.closed.lock();
        let undelivered = match &self.items {
            Some(tx) if !*closed => tx.send(item).err().map(|flume::SendError(item)| item),
            _ => Some(item),
        };
        drop(closed);
        if let Some(item) = undelivered {
            self.shared.discard(item);
        }
    }

    fn on_complete(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
        self.items.take();
    }
}

/// Consumer side of a channel-backed for-each registration
///
/// Items can be pulled one by one with [`ForEachStream::next`], or all at
///  once with [`ForEachStream::collect`] which also reports whether the
///  registration ran to completion.
///
/// Every item received owns its native handles. Items the stream never
///  hands out, because it was dropped early or the registration was
///  abandoned, go to the release hook given at registration; without one
///  their handles are leaked.
pub struct ForEachStream {
    token: CallbackToken,
    items: flume::Receiver<ForEachItem>,
    done: oneshot::Receiver<()>,
    shared: Arc<StreamShared>,
}

impl fmt::Debug for ForEachStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForEachStream")
            .field("token", &self.token)
            .field("buffered", &self.items.len())
            .finish()
    }
}

impl Drop for ForEachStream {
    fn drop(&mut self) {
        let mut closed = self.shared.closed.lock();
        *closed = true;
        for item in self.items.try_iter() {
            self.shared.discard(item);
        }
    }
}

impl ForEachStream {
    pub fn token(&self) -> CallbackToken {
        self.token
    }

    /// Next item, `None` once the registration is retired
    pub async fn next(&self) -> Option<ForEachItem> {
        self.items.recv_async().await.ok()
    }

    /// Wait for completion and return every item in arrival order
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Abandoned`] if the registration was dropped
    ///  before the expected number of items arrived.
    pub async fn collect(mut self) -> Result<Vec<ForEachItem>, BridgeError> {
        let mut collected = Vec::new();
        while let Ok(item) = self.items.recv_async().await {
            collected.push(item);
        }
        match (&mut self.done).await {
            Ok(()) => Ok(collected),
            Err(_) => {
                for item in collected {
                    self.shared.discard(item);
                }
                Err(BridgeError::Abandoned(self.token))
            }
        }
    }
}
