//! Payload shapes carried by call-once native notifications
//!
//! Every native call reports its result through one fixed callback
//!  signature. Rather than one callback type per signature, the bridge
//!  uses a single tagged union ([`Payload`]) and records the expected
//!  [`PayloadKind`] at registration time.

use std::fmt;

/// Opaque identifier for native-side state (a key, a permission set, ...)
///
/// Handles are only meaningful within the session that created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NativeHandle(pub u64);

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl From<u64> for NativeHandle {
    fn from(value: u64) -> Self {
        NativeHandle(value)
    }
}

/// Opaque native address, never dereferenced on this side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawPointer(usize);

impl RawPointer {
    pub fn new(addr: usize) -> Self {
        RawPointer(addr)
    }

    pub fn addr(&self) -> usize {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// A byte buffer with the version it was read at
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionedData {
    pub data: Vec<u8>,
    pub version: u64,
}

/// The shape of a success payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Unit,
    Bool,
    Handle,
    HandlePair,
    Data,
    VersionedData,
    Pointer,
    StringList,
}

/// A success payload delivered by the native layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Unit,
    Bool(bool),
    Handle(NativeHandle),
    HandlePair(NativeHandle, NativeHandle),
    Data(Vec<u8>),
    VersionedData(VersionedData),
    Pointer(RawPointer),
    StringList(Vec<String>),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Unit => PayloadKind::Unit,
            Payload::Bool(_) => PayloadKind::Bool,
            Payload::Handle(_) => PayloadKind::Handle,
            Payload::HandlePair(_, _) => PayloadKind::HandlePair,
            Payload::Data(_) => PayloadKind::Data,
            Payload::VersionedData(_) => PayloadKind::VersionedData,
            Payload::Pointer(_) => PayloadKind::Pointer,
            Payload::StringList(_) => PayloadKind::StringList,
        }
    }

    /// Every handle this payload carries, in delivery order
    pub fn handles(&self) -> Vec<NativeHandle> {
        match self {
            Payload::Handle(h) => vec![*h],
            Payload::HandlePair(a, b) => vec![*a, *b],
            _ => Vec::new(),
        }
    }
}

/// A Rust type that one payload kind decodes into
pub trait PayloadShape: Sized + Send + 'static {
    const KIND: PayloadKind;

    /// Decode the payload, `None` if it has another shape
    fn from_payload(payload: Payload) -> Option<Self>;
}

impl PayloadShape for () {
    const KIND: PayloadKind = PayloadKind::Unit;
    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Unit => Some(()),
            _ => None,
        }
    }
}

impl PayloadShape for bool {
    const KIND: PayloadKind = PayloadKind::Bool;
    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Bool(flag) => Some(flag),
            _ => None,
        }
    }
}

impl PayloadShape for NativeHandle {
    const KIND: PayloadKind = PayloadKind::Handle;
    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Handle(handle) => Some(handle),
            _ => None,
        }
    }
}

impl PayloadShape for (NativeHandle, NativeHandle) {
    const KIND: PayloadKind = PayloadKind::HandlePair;
    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::HandlePair(a, b) => Some((a, b)),
            _ => None,
        }
    }
}

impl PayloadShape for Vec<u8> {
    const KIND: PayloadKind = PayloadKind::Data;
    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Data(data) => Some(data),
            _ => None,
        }
    }
}

impl PayloadShape for VersionedData {
    const KIND: PayloadKind = PayloadKind::VersionedData;
    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::VersionedData(data) => Some(data),
            _ => None,
        }
    }
}

impl PayloadShape for RawPointer {
    const KIND: PayloadKind = PayloadKind::Pointer;
    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Pointer(ptr) => Some(ptr),
            _ => None,
        }
    }
}

impl PayloadShape for Vec<String> {
    const KIND: PayloadKind = PayloadKind::StringList;
    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::StringList(list) => Some(list),
            _ => None,
        }
    }
}
