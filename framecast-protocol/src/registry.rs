//! Packet type registry.
//!
//! Maps a type identifier to a decoder and an optional async callback. The
//! callback receives a caller-chosen context `C` (the server passes a
//! per-client context, the client passes itself) along with the decoded
//! packet.

use crate::error::ProtocolError;
use crate::packet::{Packet, PacketId, PacketReader, PacketType};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed future that can be sent across threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Builds a packet from its payload.
pub type DecodeFn = fn(&mut PacketReader<'_>) -> Result<Box<dyn Packet>, ProtocolError>;

/// Invoked with every successfully decoded packet of one type.
pub type Callback<C> = Arc<dyn Fn(C, Box<dyn Packet>) -> BoxFuture<'static, ()> + Send + Sync>;

fn decode_boxed<P: PacketType>(
    reader: &mut PacketReader<'_>,
) -> Result<Box<dyn Packet>, ProtocolError> {
    Ok(Box::new(P::decode(reader)?))
}

/// Everything the codec needs to know about one packet type.
pub struct Registration<C> {
    id: PacketId,
    name: &'static str,
    decode: DecodeFn,
    callback: Option<Callback<C>>,
}

impl<C> Registration<C> {
    pub fn new(
        id: PacketId,
        name: &'static str,
        decode: DecodeFn,
        callback: Option<Callback<C>>,
    ) -> Self {
        Self {
            id,
            name,
            decode,
            callback,
        }
    }

    /// Registration for a [`PacketType`], named after the Rust type.
    pub fn of<P: PacketType>(callback: Option<Callback<C>>) -> Self {
        Self::new(P::ID, short_type_name::<P>(), decode_boxed::<P>, callback)
    }

    pub fn id(&self) -> PacketId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Decodes a payload (the frame minus its identifier byte).
    pub fn decode(&self, payload: &[u8]) -> Result<Box<dyn Packet>, ProtocolError> {
        let mut reader = PacketReader::new(payload);
        (self.decode)(&mut reader)
    }

    /// Returns the callback future for `packet`, if a callback is set.
    pub fn dispatch(&self, ctx: C, packet: Box<dyn Packet>) -> Option<BoxFuture<'static, ()>> {
        self.callback.as_ref().map(|callback| callback(ctx, packet))
    }
}

impl<C> Clone for Registration<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name,
            decode: self.decode,
            callback: self.callback.clone(),
        }
    }
}

impl<C> fmt::Debug for Registration<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

fn short_type_name<P>() -> &'static str {
    let full = std::any::type_name::<P>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Thread-safe table of registered packet types.
///
/// Registration is normally done before a connection starts receiving, but
/// the table tolerates concurrent registration and lookup.
pub struct Registry<C> {
    entries: RwLock<HashMap<PacketId, Registration<C>>>,
}

impl<C: Send + 'static> Registry<C> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a registration. Fails if its identifier is already taken.
    pub fn register(&self, registration: Registration<C>) -> Result<(), ProtocolError> {
        let mut entries = self.entries.write();
        match entries.entry(registration.id) {
            Entry::Occupied(_) => Err(ProtocolError::AlreadyRegistered(registration.id)),
            Entry::Vacant(slot) => {
                tracing::debug!(
                    "Registered packet {} ({}){}",
                    registration.id,
                    registration.name,
                    if registration.callback.is_some() { "" } else { " without handler" }
                );
                slot.insert(registration);
                Ok(())
            }
        }
    }

    /// Registers `P` with a typed async handler.
    pub fn register_handler<P, F, Fut>(&self, handler: F) -> Result<(), ProtocolError>
    where
        P: PacketType,
        F: Fn(C, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: Callback<C> = Arc::new(
            move |ctx: C, packet: Box<dyn Packet>| -> BoxFuture<'static, ()> {
                match packet.downcast::<P>() {
                    Some(packet) => Box::pin(handler(ctx, *packet)),
                    None => {
                        tracing::warn!(
                            "Decoder for packet {} produced a different type, dropping",
                            P::ID
                        );
                        Box::pin(async {})
                    }
                }
            },
        );
        self.register(Registration::of::<P>(Some(callback)))
    }

    /// Registers `P` so it can be decoded, with no callback.
    pub fn register_passive<P: PacketType>(&self) -> Result<(), ProtocolError> {
        self.register(Registration::of::<P>(None))
    }

    /// Looks up the registration for `id`.
    pub fn lookup(&self, id: PacketId) -> Result<Registration<C>, ProtocolError> {
        self.entries
            .read()
            .get(&id)
            .cloned()
            .ok_or(ProtocolError::NotRegistered(id))
    }

    pub fn contains(&self, id: PacketId) -> bool {
        self.entries.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Registered identifiers in ascending order.
    pub fn ids(&self) -> Vec<PacketId> {
        let mut ids: Vec<_> = self.entries.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl<C: Send + 'static> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        f.debug_struct("Registry")
            .field("entries", &entries.len())
            .finish()
    }
}
