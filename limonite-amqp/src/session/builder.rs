//! Session builder

use limonite_amqp_types::definitions::{Fields, Handle};
use limonite_amqp_types::primitives::Symbol;
use tokio::sync::{mpsc, oneshot};

use crate::connection::ConnectionHandle;
use crate::control::ConnectionControl;

use super::engine::SessionEngine;
use super::{Error, Session, SessionHandle};

pub(crate) const DEFAULT_WINDOW: u32 = 5000;
const CONTROL_BUFFER: usize = 128;

/// Builds a session with tuned windows and properties.
///
/// ```rust,ignore
/// let mut session = Session::builder()
///     .incoming_window(1000)
///     .begin(&mut connection)
///     .await?;
/// ```
pub struct Builder {
    pub incoming_window: u32,
    pub outgoing_window: u32,
    pub handle_max: Handle,
    pub offered_capabilities: Option<Vec<Symbol>>,
    pub desired_capabilities: Option<Vec<Symbol>>,
    pub properties: Option<Fields>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            incoming_window: DEFAULT_WINDOW,
            outgoing_window: DEFAULT_WINDOW,
            handle_max: u32::MAX,
            offered_capabilities: None,
            desired_capabilities: None,
            properties: None,
        }
    }

    pub fn incoming_window(mut self, window: u32) -> Self {
        self.incoming_window = window.max(1);
        self
    }

    pub fn outgoing_window(mut self, window: u32) -> Self {
        self.outgoing_window = window.max(1);
        self
    }

    pub fn handle_max(mut self, handle_max: Handle) -> Self {
        self.handle_max = handle_max;
        self
    }

    pub fn add_offered_capabilities(mut self, capability: impl Into<Symbol>) -> Self {
        self.offered_capabilities
            .get_or_insert_with(Vec::new)
            .push(capability.into());
        self
    }

    pub fn add_desired_capabilities(mut self, capability: impl Into<Symbol>) -> Self {
        self.desired_capabilities
            .get_or_insert_with(Vec::new)
            .push(capability.into());
        self
    }

    pub fn properties(mut self, properties: Fields) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Begins the session on the connection.
    pub async fn begin(self, connection: &mut ConnectionHandle) -> Result<SessionHandle, Error> {
        // generous inbox: the incoming window bounds transfer frames in
        // flight, so the connection reader never blocks on a session
        let inbox_capacity = self.incoming_window as usize + 256;
        let (incoming_tx, incoming_rx) = mpsc::channel(inbox_capacity);

        let (responder, allocation_rx) = oneshot::channel();
        connection
            .control
            .send(ConnectionControl::AllocateSession {
                tx: incoming_tx,
                responder,
            })
            .await
            .map_err(|_| Error::Connection(crate::connection::Error::IllegalState))?;
        let allocation = allocation_rx
            .await
            .map_err(|_| Error::Connection(crate::connection::Error::IllegalState))?
            .map_err(Error::Connection)?;

        let session = Session::new(
            allocation.channel,
            allocation.max_frame_size,
            self.incoming_window,
            self.outgoing_window,
            self.handle_max,
            self.offered_capabilities,
            self.desired_capabilities,
            self.properties,
        );

        let (control_tx, control_rx) = mpsc::channel(CONTROL_BUFFER);
        let engine = match SessionEngine::begin(
            connection.control.clone(),
            session,
            control_rx,
            incoming_rx,
            connection.outgoing.clone(),
        )
        .await
        {
            Ok(engine) => engine,
            Err(err) => {
                // give the channel back; the begin never completed
                let _ = connection
                    .control
                    .send(ConnectionControl::DeallocateSession(allocation.channel))
                    .await;
                return Err(err);
            }
        };
        let handle = engine.spawn();

        Ok(SessionHandle::new(control_tx, handle))
    }
}
