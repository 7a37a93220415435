//! Chat room state and packet handlers for the relay.

use framecast_chat::{
    validate_name, ChatError, ConnectRequest, ConnectResponse, ConnectedPacket,
    DisconnectedPacket, MessagePacket, PingPacket, PongPacket,
};
use framecast_protocol::{ProtocolError, TransportError};
use framecast_server::{ClientContext, ClientId, ServerConfig, SessionManager};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Joined clients, indexed both ways.
#[derive(Debug, Default)]
struct Members {
    by_name: HashMap<String, ClientId>,
    by_id: HashMap<ClientId, String>,
}

/// Names of the clients that completed the join handshake.
#[derive(Debug, Default)]
pub struct ChatRoom {
    members: RwLock<Members>,
}

impl ChatRoom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `name` for `id`.
    pub fn join(&self, id: ClientId, name: &str) -> Result<(), ChatError> {
        validate_name(name)?;

        let mut members = self.members.write();
        if members.by_name.contains_key(name) {
            return Err(ChatError::NameTaken(name.to_string()));
        }
        members.by_name.insert(name.to_string(), id);
        members.by_id.insert(id, name.to_string());
        Ok(())
    }

    /// Frees the name held by `id`, returning it.
    pub fn leave(&self, id: ClientId) -> Option<String> {
        let mut members = self.members.write();
        let name = members.by_id.remove(&id)?;
        members.by_name.remove(&name);
        Some(name)
    }

    pub fn name_of(&self, id: ClientId) -> Option<String> {
        self.members.read().by_id.get(&id).cloned()
    }

    /// Joined names, sorted.
    pub fn members(&self) -> Vec<String> {
        let mut names: Vec<_> = self.members.read().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Adds the departure hook to a session manager configuration.
    pub fn attach(self: &Arc<Self>, config: ServerConfig) -> ServerConfig {
        let room = self.clone();
        config.on_disconnected(move |ctx, cause| {
            let room = room.clone();
            async move { room.on_disconnected(ctx, cause).await }
        })
    }

    /// Registers the chat packet handlers.
    pub fn install(self: &Arc<Self>, sessions: &SessionManager) -> Result<(), ProtocolError> {
        let room = self.clone();
        sessions.register_handler(move |ctx, request: ConnectRequest| {
            let room = room.clone();
            async move { room.on_connect_request(ctx, request).await }
        })?;

        let room = self.clone();
        sessions.register_handler(move |ctx, packet: MessagePacket| {
            let room = room.clone();
            async move { room.on_message(ctx, packet).await }
        })?;

        sessions.register_handler(|ctx: ClientContext, _ping: PingPacket| async move {
            if let Err(e) = ctx.reply(&PongPacket).await {
                tracing::debug!("Failed to answer ping from client {}: {}", ctx.id(), e);
            }
        })?;
        sessions.register_passive::<PongPacket>()?;

        // The relay only answers requests; these flow the other way.
        sessions.register_passive::<ConnectResponse>()?;
        sessions.register_passive::<ConnectedPacket>()?;
        sessions.register_passive::<DisconnectedPacket>()?;
        Ok(())
    }

    async fn on_connect_request(&self, ctx: ClientContext, request: ConnectRequest) {
        if let Some(name) = self.name_of(ctx.id()) {
            tracing::warn!(
                "Client {} already joined as \"{}\", ignoring request for \"{}\"",
                ctx.id(),
                name,
                request.client_name
            );
            return;
        }

        if let Err(e) = self.join(ctx.id(), &request.client_name) {
            tracing::info!(
                "Client {} refused name \"{}\": {}",
                ctx.id(),
                request.client_name,
                e
            );
            if let Err(e) = ctx.reply(&ConnectResponse::rejected(e.to_string())).await {
                tracing::debug!("Failed to send rejection to client {}: {}", ctx.id(), e);
            }
            ctx.close();
            return;
        }

        tracing::info!(
            "Client {} joined as \"{}\" ({} in room)",
            ctx.id(),
            request.client_name,
            self.members().len()
        );
        if let Err(e) = ctx.reply(&ConnectResponse::accepted()).await {
            tracing::debug!("Failed to accept client {}: {}", ctx.id(), e);
            return;
        }
        ctx.broadcast(&ConnectedPacket::new(request.client_name)).await;
    }

    async fn on_message(&self, ctx: ClientContext, packet: MessagePacket) {
        let Some(name) = self.name_of(ctx.id()) else {
            tracing::debug!("Dropping message from client {} before join", ctx.id());
            return;
        };

        let line = MessagePacket::new(format!("{}: {}", name, packet.message));
        let delivered = ctx.broadcast(&line).await;
        tracing::debug!("Relayed message from {} to {} clients", name, delivered);
    }

    async fn on_disconnected(&self, ctx: ClientContext, cause: Option<TransportError>) {
        let Some(name) = self.leave(ctx.id()) else {
            return;
        };

        match cause {
            Some(e) => tracing::info!("\"{}\" left the chat: {}", name, e),
            None => tracing::info!("\"{}\" left the chat", name),
        }
        ctx.broadcast(&DisconnectedPacket::new(name)).await;
    }
}
