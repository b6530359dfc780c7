//! Link builder shared by senders and receivers

use std::marker::PhantomData;

use tokio::sync::{mpsc, oneshot};

use limonite_amqp_types::definitions::{
    Fields, ReceiverSettleMode, Role, SenderSettleMode,
};
use limonite_amqp_types::messaging::{FilterSet, Source, Target};
use limonite_amqp_types::primitives::Symbol;

use crate::control::SessionControl;
use crate::session::SessionHandle;

use super::delivery::{RandomTagSource, TagSource};
use super::error::AttachError;
use super::frame::{AttachRequest, CreditMode, LinkAttached};
use super::receiver::Receiver;
use super::role;
use super::sender::Sender;

const DEFAULT_CREDIT: u32 = 100;

/// Builds a link of either role.
///
/// ```rust,ignore
/// let mut sender = Sender::builder()
///     .name("sender-1")
///     .target("q1")
///     .sender_settle_mode(SenderSettleMode::Mixed)
///     .attach(&mut session)
///     .await?;
/// ```
pub struct Builder<R> {
    pub name: String,
    pub source: Option<Source>,
    pub target: Option<Target>,
    pub snd_settle_mode: SenderSettleMode,
    pub rcv_settle_mode: ReceiverSettleMode,
    pub max_message_size: Option<u64>,
    pub offered_capabilities: Option<Vec<Symbol>>,
    pub desired_capabilities: Option<Vec<Symbol>>,
    pub properties: Option<Fields>,
    pub credit: u32,
    pub credit_mode: CreditMode,
    tag_source: Box<dyn TagSource>,

    marker: PhantomData<R>,
}

impl<R> Builder<R> {
    fn empty() -> Self {
        Self {
            name: String::new(),
            source: None,
            target: None,
            snd_settle_mode: SenderSettleMode::default(),
            rcv_settle_mode: ReceiverSettleMode::default(),
            max_message_size: None,
            offered_capabilities: None,
            desired_capabilities: None,
            properties: None,
            credit: DEFAULT_CREDIT,
            credit_mode: CreditMode::Auto,
            tag_source: Box::new(RandomTagSource::default()),
            marker: PhantomData,
        }
    }

    /// The link name; unique per direction on a session. A random name is
    /// generated when none is given.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn sender_settle_mode(mut self, mode: SenderSettleMode) -> Self {
        self.snd_settle_mode = mode;
        self
    }

    pub fn receiver_settle_mode(mut self, mode: ReceiverSettleMode) -> Self {
        self.rcv_settle_mode = mode;
        self
    }

    pub fn max_message_size(mut self, size: u64) -> Self {
        self.max_message_size = Some(size);
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

    fn name_or_generated(&mut self, role: &str) {
        if self.name.is_empty() {
            self.name = format!("limonite-{}-{:08x}", role, rand::random::<u32>());
        }
    }
}

impl Builder<role::Sender> {
    pub fn new() -> Self {
        Self {
            source: Some(Source::default()),
            ..Self::empty()
        }
    }

    /// The node messages are sent to.
    pub fn target(mut self, target: impl Into<Target>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Overrides the default random delivery-tag source; useful for
    /// deterministic tests.
    pub fn tag_source(mut self, tag_source: impl TagSource + 'static) -> Self {
        self.tag_source = Box::new(tag_source);
        self
    }

    /// Attaches the sender and waits for the peer's answering attach.
    pub async fn attach(mut self, session: &mut SessionHandle) -> Result<Sender, AttachError> {
        self.name_or_generated("sender");
        let request = AttachRequest {
            name: self.name.clone(),
            role: Role::Sender,
            snd_settle_mode: self.snd_settle_mode,
            rcv_settle_mode: self.rcv_settle_mode,
            source: self.source.take(),
            target: self.target.take(),
            initial_delivery_count: 0,
            max_message_size: self.max_message_size,
            offered_capabilities: self.offered_capabilities.take(),
            desired_capabilities: self.desired_capabilities.take(),
            properties: self.properties.take(),
            buffer: None,
            credit: 0,
            credit_mode: CreditMode::Manual,
        };
        let attached = request_attach(&session.control, request).await?;
        Ok(Sender::new(
            session.control.clone(),
            self.name,
            attached,
            self.tag_source,
        ))
    }
}

impl Default for Builder<role::Sender> {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder<role::Receiver> {
    pub fn new() -> Self {
        Self {
            target: Some(Target::default()),
            ..Self::empty()
        }
    }

    /// The node messages are received from.
    pub fn source(mut self, source: impl Into<Source>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Initial link credit; zero starts the link without auto-flow.
    pub fn credit(mut self, credit: u32) -> Self {
        self.credit = credit;
        self
    }

    /// Disables automatic credit top-up; the application calls
    /// [`Receiver::set_credit`] itself.
    pub fn manual_credit(mut self) -> Self {
        self.credit_mode = CreditMode::Manual;
        self
    }

    /// Named filters added to the source.
    pub fn filter(mut self, filter: FilterSet) -> Self {
        self.source
            .get_or_insert_with(Source::default)
            .filter = Some(filter);
        self
    }

    /// Attaches the receiver and waits for the peer's answering attach.
    pub async fn attach(mut self, session: &mut SessionHandle) -> Result<Receiver, AttachError> {
        self.name_or_generated("receiver");
        let buffer_capacity = (self.credit as usize * 2).max(32);
        let (buffer_tx, buffer_rx) = mpsc::channel(buffer_capacity);

        let request = AttachRequest {
            name: self.name.clone(),
            role: Role::Receiver,
            snd_settle_mode: self.snd_settle_mode,
            rcv_settle_mode: self.rcv_settle_mode,
            source: self.source.take(),
            target: self.target.take(),
            initial_delivery_count: 0,
            max_message_size: self.max_message_size,
            offered_capabilities: self.offered_capabilities.take(),
            desired_capabilities: self.desired_capabilities.take(),
            properties: self.properties.take(),
            buffer: Some(buffer_tx),
            credit: self.credit,
            credit_mode: self.credit_mode,
        };
        let attached = request_attach(&session.control, request).await?;
        Ok(Receiver::new(
            session.control.clone(),
            self.name,
            attached,
            buffer_rx,
        ))
    }
}

impl Default for Builder<role::Receiver> {
    fn default() -> Self {
        Self::new()
    }
}

async fn request_attach(
    control: &mpsc::Sender<SessionControl>,
    request: AttachRequest,
) -> Result<LinkAttached, AttachError> {
    let (responder, rx) = oneshot::channel();
    control
        .send(SessionControl::AttachLink { request, responder })
        .await
        .map_err(|_| AttachError::IllegalSessionState)?;
    rx.await.map_err(|_| AttachError::IllegalSessionState)?
}
