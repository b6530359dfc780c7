//! Connection endpoint: socket ownership, the open/close handshake, frame
//! dispatch to sessions, and heartbeats.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use limonite_amqp_types::definitions::{self, Fields};
use limonite_amqp_types::performatives::Open;
use limonite_amqp_types::primitives::Symbol;

use crate::control::{ConnectionControl, SessionAllocation};
use crate::session::frame::{SessionFrame, SessionIncomingItem};
use crate::util::IdAllocator;

pub mod builder;
pub(crate) mod engine;
mod error;
mod heartbeat;

pub use builder::Builder;
pub use error::{Error, OpenError};

/// 2.4.6 Connection States (client subset; the header exchange happens
/// before the engine exists)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    HeaderExchange,
    OpenSent,
    Opened,
    CloseSent,
    End,
}

struct SessionEntry {
    tx: mpsc::Sender<SessionIncomingItem>,
    remote_channel: Option<u16>,
}

/// The connection state machine, owned by its engine task.
///
/// User code opens connections through [`Connection::builder`] (or
/// [`Connection::open`]) and works with the returned
/// [`ConnectionHandle`].
pub struct Connection {
    local_state: ConnectionState,
    local_open: Open,
    remote_open: Option<Open>,

    agreed_channel_max: u16,
    agreed_max_frame_size: u32,

    channels: IdAllocator,
    sessions: HashMap<u16, SessionEntry>,
    by_remote_channel: HashMap<u16, u16>,
}

impl Connection {
    /// Creates a connection builder; the container id is mandatory.
    pub fn builder() -> Builder<builder::WithoutContainerId> {
        Builder::new()
    }

    /// Opens a connection to `url` with default options.
    ///
    /// PLAIN credentials in the URL userinfo enable SASL automatically.
    pub async fn open(
        container_id: impl Into<String>,
        url: impl TryInto<url::Url, Error = url::ParseError>,
    ) -> Result<ConnectionHandle, OpenError> {
        Self::builder().container_id(container_id).open(url).await
    }

    pub(crate) fn new(local_open: Open) -> Self {
        let agreed_channel_max = local_open.channel_max;
        let agreed_max_frame_size = local_open.max_frame_size;
        let channels = IdAllocator::new(agreed_channel_max as u32);
        Self {
            local_state: ConnectionState::HeaderExchange,
            local_open,
            remote_open: None,
            agreed_channel_max,
            agreed_max_frame_size,
            channels,
            sessions: HashMap::new(),
            by_remote_channel: HashMap::new(),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.local_state
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.local_state = state;
    }

    pub(crate) fn local_open(&self) -> &Open {
        &self.local_open
    }

    pub(crate) fn on_incoming_open(&mut self, open: Open) -> Result<(), Error> {
        match self.local_state {
            ConnectionState::OpenSent => {}
            _ => return Err(Error::IllegalState),
        }
        self.agreed_channel_max = self.local_open.channel_max.min(open.channel_max);
        self.agreed_max_frame_size = self.local_open.max_frame_size.min(open.max_frame_size);
        self.channels = IdAllocator::new(self.agreed_channel_max as u32);
        self.remote_open = Some(open);
        self.local_state = ConnectionState::Opened;
        Ok(())
    }

    pub(crate) fn allocate_session(
        &mut self,
        tx: mpsc::Sender<SessionIncomingItem>,
    ) -> Result<SessionAllocation, Error> {
        if self.local_state != ConnectionState::Opened {
            return Err(Error::IllegalState);
        }
        let channel = self
            .channels
            .allocate()
            .ok_or(Error::ChannelMaxReached)? as u16;
        self.sessions.insert(
            channel,
            SessionEntry {
                tx,
                remote_channel: None,
            },
        );
        Ok(SessionAllocation {
            channel,
            max_frame_size: self.agreed_max_frame_size,
        })
    }

    pub(crate) fn deallocate_session(&mut self, channel: u16) {
        if let Some(entry) = self.sessions.remove(&channel) {
            if let Some(remote) = entry.remote_channel {
                self.by_remote_channel.remove(&remote);
            }
            self.channels.release(channel as u32);
        }
    }

    /// Correlates the peer's begin with the session that asked for it.
    pub(crate) fn map_remote_channel(&mut self, local: u16, remote: u16) -> bool {
        match self.sessions.get_mut(&local) {
            Some(entry) => {
                entry.remote_channel = Some(remote);
                self.by_remote_channel.insert(remote, local);
                true
            }
            None => {
                warn!(local, "begin answers an unknown local channel");
                false
            }
        }
    }

    pub(crate) fn session_tx_by_remote_channel(
        &self,
        remote: u16,
    ) -> Option<&mpsc::Sender<SessionIncomingItem>> {
        let local = self.by_remote_channel.get(&remote)?;
        self.sessions.get(local).map(|entry| &entry.tx)
    }

    /// Fans a fatal error out to every live session.
    pub(crate) fn notify_sessions(&mut self, error: Error) {
        for entry in self.sessions.values() {
            let _ = entry.tx.try_send(Err(error.clone()));
        }
    }
}

/// Handle to an open connection.
///
/// Sessions are started with [`crate::Session::begin`]. Dropping the handle
/// without calling [`ConnectionHandle::close`] initiates an implicit close.
pub struct ConnectionHandle {
    pub(crate) control: mpsc::Sender<ConnectionControl>,
    pub(crate) outgoing: mpsc::Sender<SessionFrame>,
    engine: Option<JoinHandle<Result<(), Error>>>,
    result: Option<Result<(), Error>>,

    container_id: String,
    max_frame_size: u32,
    channel_max: u16,
    remote_offered_capabilities: Option<Vec<Symbol>>,
    remote_properties: Option<Fields>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        control: mpsc::Sender<ConnectionControl>,
        outgoing: mpsc::Sender<SessionFrame>,
        engine: JoinHandle<Result<(), Error>>,
        container_id: String,
        max_frame_size: u32,
        channel_max: u16,
        remote_offered_capabilities: Option<Vec<Symbol>>,
        remote_properties: Option<Fields>,
    ) -> Self {
        Self {
            control,
            outgoing,
            engine: Some(engine),
            result: None,
            container_id,
            max_frame_size,
            channel_max,
            remote_offered_capabilities,
            remote_properties,
        }
    }

    /// The container id this connection opened with.
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// The negotiated max-frame-size (minimum of both peers).
    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// The negotiated channel-max (minimum of both peers).
    pub fn channel_max(&self) -> u16 {
        self.channel_max
    }

    /// Capabilities the peer advertised in its open.
    pub fn remote_offered_capabilities(&self) -> Option<&[Symbol]> {
        self.remote_offered_capabilities.as_deref()
    }

    /// Properties the peer advertised in its open.
    pub fn remote_properties(&self) -> Option<&Fields> {
        self.remote_properties.as_ref()
    }

    /// Performs the close handshake and waits for it to finish.
    pub async fn close(mut self) -> Result<(), Error> {
        let _ = self.control.send(ConnectionControl::Close(None)).await;
        self.join_engine().await
    }

    /// Closes the connection with an error.
    pub async fn close_with_error(
        mut self,
        error: definitions::Error,
    ) -> Result<(), Error> {
        let _ = self
            .control
            .send(ConnectionControl::Close(Some(error)))
            .await;
        self.join_engine().await
    }

    /// Waits until the connection terminates without initiating the close,
    /// surfacing the error that ended it.
    pub async fn closed(&mut self) -> Result<(), Error> {
        self.join_engine().await
    }

    async fn join_engine(&mut self) -> Result<(), Error> {
        match self.engine.take() {
            Some(handle) => {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(_) => Err(Error::IllegalState),
                };
                self.result = Some(result.clone());
                result
            }
            None => self.result.clone().unwrap_or(Err(Error::IllegalState)),
        }
    }
}
