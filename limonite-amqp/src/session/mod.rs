//! Session endpoint: the per-channel state machine.
//!
//! The session engine task owns every piece of link protocol state: handle
//! tables, credit, windows, the delivery-id counter, the unsettled map and
//! partial multi-frame transfers. Sender and receiver handles are thin
//! façades that talk to this task over the control channel, so no link
//! state is ever shared between tasks.

use std::collections::{BTreeMap, HashMap, VecDeque};

use bytes::{BufMut, BytesMut};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use limonite_amqp_types::codec::{from_slice, to_vec};
use limonite_amqp_types::definitions::{
    self, serial_cmp, AmqpError, DeliveryNumber, ErrorCondition, Fields, Handle,
    ReceiverSettleMode, Role, SequenceNo, SessionError, TransferNumber,
};
use limonite_amqp_types::messaging::{Accepted, DeliveryState, Message};
use limonite_amqp_types::performatives::{
    Attach, Begin, Detach, Disposition, End, Flow, Transfer,
};
use limonite_amqp_types::primitives::Symbol;

use crate::connection::ConnectionHandle;
use crate::control::SessionControl;
use crate::link::delivery::Delivery;
use crate::link::error::{
    AttachError, DetachError, DispositionError, FlowError, RecvError, SendError,
};
use crate::link::frame::{
    AttachRequest, AttachResponder, CreditMode, DeliverySender, LinkAttached, Settlement,
    TransferRequest,
};
use crate::link::LinkState;
use crate::util::IdAllocator;
use crate::Payload;

pub mod builder;
pub(crate) mod engine;
mod error;
pub(crate) mod frame;

pub use builder::Builder;
pub use error::Error;

use frame::{SessionFrame, SessionFrameBody};

/// 2.5.5 Session States (client subset)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Unmapped,
    BeginSent,
    Mapped,
    EndSent,
    /// End sent with an error; inbound frames are discarded until the
    /// answering end arrives
    Discarding,
}

/// An in-flight outgoing delivery awaiting its disposition.
struct UnsettledDelivery {
    handle: Handle,
    state: Option<DeliveryState>,
    tx: oneshot::Sender<Result<DeliveryState, SendError>>,
}

/// A partially received multi-frame delivery.
struct PartialDelivery {
    delivery_id: DeliveryNumber,
    delivery_tag: definitions::DeliveryTag,
    message_format: u32,
    settled: bool,
    payload: BytesMut,
}

/// A delivery mid-emission; chunks still to be written wait for window.
struct ActiveSend {
    chunks: VecDeque<(Transfer, Payload)>,
    responder: Option<oneshot::Sender<Result<Settlement, SendError>>>,
    settlement: Option<Settlement>,
}

/// Everything the session knows about one of its links.
struct LinkEntry {
    name: String,
    role: Role,
    local_handle: Handle,
    state: LinkState,
    rcv_settle_mode: ReceiverSettleMode,

    // sender bookkeeping
    delivery_count: SequenceNo,
    link_credit: u32,
    pending_sends: VecDeque<TransferRequest>,
    active_send: Option<ActiveSend>,

    // receiver bookkeeping
    credit_mode: CreditMode,
    credit_max: u32,
    remote_delivery_count: SequenceNo,
    buffer: Option<DeliverySender>,
    partial: Option<PartialDelivery>,
    drain_responder: Option<oneshot::Sender<Result<(), FlowError>>>,

    pending_attach: Option<AttachResponder>,
    /// The attach answer lacked the required terminus
    rejected_attach: bool,
    pending_detach: Option<oneshot::Sender<Result<(), DetachError>>>,
}

impl LinkEntry {
    fn new(request: &AttachRequest, local_handle: Handle) -> Self {
        Self {
            name: request.name.clone(),
            role: request.role,
            local_handle,
            state: LinkState::AttachSent,
            rcv_settle_mode: request.rcv_settle_mode,
            delivery_count: request.initial_delivery_count,
            link_credit: 0,
            pending_sends: VecDeque::new(),
            active_send: None,
            credit_mode: request.credit_mode,
            credit_max: request.credit,
            remote_delivery_count: 0,
            buffer: None,
            partial: None,
            drain_responder: None,
            pending_attach: None,
            rejected_attach: false,
            pending_detach: None,
        }
    }
}

/// The session state machine, owned by its engine task.
///
/// User code never touches this type directly; [`Session::begin`] and
/// [`Session::builder`] hand back a [`SessionHandle`].
pub struct Session {
    outgoing_channel: u16,
    local_state: SessionState,

    next_outgoing_id: TransferNumber,
    incoming_window_max: u32,
    incoming_window: u32,
    outgoing_window: u32,
    handle_max: Handle,

    next_incoming_id: TransferNumber,
    remote_incoming_window: u32,

    offered_capabilities: Option<Vec<Symbol>>,
    desired_capabilities: Option<Vec<Symbol>>,
    properties: Option<Fields>,

    /// Negotiated on the connection; bounds outgoing transfer frames
    max_frame_size: u32,

    handles: IdAllocator,
    links: HashMap<Handle, LinkEntry>,
    links_by_name: HashMap<String, Handle>,
    links_by_remote: HashMap<Handle, Handle>,

    next_delivery_id: DeliveryNumber,
    last_incoming_delivery_id: Option<DeliveryNumber>,
    unsettled: BTreeMap<DeliveryNumber, UnsettledDelivery>,
    /// Receiver-settle-mode-second waiters keyed by delivery id
    incoming_unsettled: BTreeMap<DeliveryNumber, oneshot::Sender<Result<(), DispositionError>>>,

    /// Set when the remote initiated (or answered with) an errored end
    remote_end_error: Option<definitions::Error>,
    remote_initiated_end: bool,
}

impl Session {
    /// Starts a session on the connection with default options.
    pub async fn begin(connection: &mut ConnectionHandle) -> Result<SessionHandle, Error> {
        Builder::new().begin(connection).await
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        outgoing_channel: u16,
        max_frame_size: u32,
        incoming_window: u32,
        outgoing_window: u32,
        handle_max: Handle,
        offered_capabilities: Option<Vec<Symbol>>,
        desired_capabilities: Option<Vec<Symbol>>,
        properties: Option<Fields>,
    ) -> Self {
        Self {
            outgoing_channel,
            local_state: SessionState::Unmapped,
            next_outgoing_id: 0,
            incoming_window_max: incoming_window,
            incoming_window,
            outgoing_window,
            handle_max,
            next_incoming_id: 0,
            remote_incoming_window: 0,
            offered_capabilities,
            desired_capabilities,
            properties,
            max_frame_size,
            handles: IdAllocator::new(handle_max),
            links: HashMap::new(),
            links_by_name: HashMap::new(),
            links_by_remote: HashMap::new(),
            next_delivery_id: 0,
            last_incoming_delivery_id: None,
            unsettled: BTreeMap::new(),
            incoming_unsettled: BTreeMap::new(),
            remote_end_error: None,
            remote_initiated_end: false,
        }
    }

    fn outgoing_frame(&self, body: SessionFrameBody) -> SessionFrame {
        SessionFrame::new(self.outgoing_channel, body)
    }

    async fn send_frame(
        &self,
        outgoing: &mpsc::Sender<SessionFrame>,
        body: SessionFrameBody,
    ) {
        // a failed send means the connection engine is gone; its error
        // arrives separately through the incoming channel
        let _ = outgoing.send(self.outgoing_frame(body)).await;
    }

    /* ------------------------- begin / end ------------------------- */

    pub(crate) async fn send_begin(
        &mut self,
        outgoing: &mpsc::Sender<SessionFrame>,
    ) -> Result<(), Error> {
        if self.local_state != SessionState::Unmapped {
            return Err(Error::IllegalState);
        }
        let begin = Begin {
            remote_channel: None,
            next_outgoing_id: self.next_outgoing_id,
            incoming_window: self.incoming_window,
            outgoing_window: self.outgoing_window,
            handle_max: self.handle_max,
            offered_capabilities: self.offered_capabilities.clone(),
            desired_capabilities: self.desired_capabilities.clone(),
            properties: self.properties.clone(),
        };
        self.send_frame(outgoing, SessionFrameBody::Begin(begin)).await;
        self.local_state = SessionState::BeginSent;
        Ok(())
    }

    pub(crate) fn on_incoming_begin(&mut self, begin: Begin) -> Result<(), Error> {
        if self.local_state != SessionState::BeginSent {
            return Err(Error::IllegalState);
        }
        self.next_incoming_id = begin.next_outgoing_id;
        self.remote_incoming_window = begin.incoming_window;
        self.handle_max = self.handle_max.min(begin.handle_max);
        self.local_state = SessionState::Mapped;
        Ok(())
    }

    pub(crate) async fn send_end(
        &mut self,
        outgoing: &mpsc::Sender<SessionFrame>,
        error: Option<definitions::Error>,
    ) {
        match self.local_state {
            SessionState::Mapped => {
                self.fail_everything(Error::Ended);
                self.local_state = match error {
                    Some(_) => SessionState::Discarding,
                    None => SessionState::EndSent,
                };
                self.send_frame(outgoing, SessionFrameBody::End(End { error })).await;
            }
            _ => debug!("end requested in state {:?}", self.local_state),
        }
    }

    pub(crate) async fn on_incoming_end(
        &mut self,
        outgoing: &mpsc::Sender<SessionFrame>,
        end: End,
    ) {
        match self.local_state {
            SessionState::Mapped => {
                self.remote_initiated_end = true;
                self.remote_end_error = end.error.clone();
                self.fail_everything(Error::RemoteEnded { error: end.error });
                self.send_frame(outgoing, SessionFrameBody::End(End { error: None })).await;
                self.local_state = SessionState::Unmapped;
            }
            SessionState::EndSent | SessionState::Discarding => {
                if let Some(error) = end.error {
                    self.remote_end_error = Some(error);
                }
                self.local_state = SessionState::Unmapped;
            }
            state => {
                warn!(?state, "end received in unexpected session state");
                self.local_state = SessionState::Unmapped;
            }
        }
    }

    /// Ends the session because the peer broke a session-level rule.
    async fn fail_session(
        &mut self,
        outgoing: &mpsc::Sender<SessionFrame>,
        condition: impl Into<ErrorCondition>,
        description: &str,
        error: Error,
    ) {
        let condition = condition.into();
        warn!(condition = condition.as_str(), description, "session failure");
        self.fail_everything(error);
        let end = End {
            error: Some(definitions::Error::new(
                condition,
                Some(description.to_string()),
            )),
        };
        self.send_frame(outgoing, SessionFrameBody::End(end)).await;
        self.local_state = SessionState::Discarding;
    }

    /// Completes every pending operation on this session with `error`.
    pub(crate) fn fail_everything(&mut self, error: Error) {
        for (_, delivery) in std::mem::take(&mut self.unsettled) {
            let _ = delivery.tx.send(Err(SendError::Session(error.clone())));
        }
        for (_, tx) in std::mem::take(&mut self.incoming_unsettled) {
            let _ = tx.send(Err(DispositionError::Session(error.clone())));
        }
        for (_, mut entry) in self.links.drain() {
            if let Some(responder) = entry.pending_attach.take() {
                let _ = responder.send(Err(AttachError::Session(error.clone())));
            }
            if let Some(responder) = entry.pending_detach.take() {
                let _ = responder.send(Err(DetachError::Session(error.clone())));
            }
            if let Some(responder) = entry.drain_responder.take() {
                let _ = responder.send(Err(FlowError::Session(error.clone())));
            }
            if let Some(mut active) = entry.active_send.take() {
                if let Some(responder) = active.responder.take() {
                    let _ = responder.send(Err(SendError::Session(error.clone())));
                }
            }
            for request in entry.pending_sends.drain(..) {
                let _ = request
                    .responder
                    .send(Err(SendError::Session(error.clone())));
            }
            if let Some(buffer) = entry.buffer.take() {
                let _ = buffer.try_send(Err(RecvError::Session(error.clone())));
            }
        }
        self.links_by_name.clear();
        self.links_by_remote.clear();
    }

    pub(crate) fn is_unmapped(&self) -> bool {
        self.local_state == SessionState::Unmapped
    }

    pub(crate) fn outgoing_channel(&self) -> u16 {
        self.outgoing_channel
    }

    pub(crate) fn end_result(&self) -> Result<(), Error> {
        if self.remote_initiated_end || self.remote_end_error.is_some() {
            Err(Error::RemoteEnded {
                error: self.remote_end_error.clone(),
            })
        } else {
            Ok(())
        }
    }

    /* --------------------------- attach ---------------------------- */

    pub(crate) async fn attach_link(
        &mut self,
        outgoing: &mpsc::Sender<SessionFrame>,
        mut request: AttachRequest,
        responder: AttachResponder,
    ) {
        if self.local_state != SessionState::Mapped {
            let _ = responder.send(Err(AttachError::IllegalSessionState));
            return;
        }
        if self.links_by_name.contains_key(&request.name) {
            let _ = responder.send(Err(AttachError::DuplicateLinkName));
            return;
        }
        let handle = match self.handles.allocate() {
            Some(handle) if handle <= self.handle_max => handle,
            Some(handle) => {
                self.handles.release(handle);
                let _ = responder.send(Err(AttachError::HandleMaxReached));
                return;
            }
            None => {
                let _ = responder.send(Err(AttachError::HandleMaxReached));
                return;
            }
        };

        let mut entry = LinkEntry::new(&request, handle);
        entry.buffer = request.buffer.take();
        entry.pending_attach = Some(responder);
        self.links_by_name.insert(request.name.clone(), handle);
        self.links.insert(handle, entry);

        let attach = Attach {
            name: request.name,
            handle,
            role: request.role,
            snd_settle_mode: request.snd_settle_mode,
            rcv_settle_mode: request.rcv_settle_mode,
            source: request.source,
            target: request.target,
            unsettled: None,
            incomplete_unsettled: false,
            initial_delivery_count: match request.role {
                Role::Sender => Some(request.initial_delivery_count),
                Role::Receiver => None,
            },
            max_message_size: request.max_message_size,
            offered_capabilities: request.offered_capabilities,
            desired_capabilities: request.desired_capabilities,
            properties: request.properties,
        };
        self.send_frame(outgoing, SessionFrameBody::Attach(attach)).await;
    }

    pub(crate) async fn on_incoming_attach(
        &mut self,
        outgoing: &mpsc::Sender<SessionFrame>,
        attach: Attach,
    ) {
        if self.local_state != SessionState::Mapped {
            return;
        }
        let handle = match self.links_by_name.get(&attach.name) {
            Some(&handle) => handle,
            None => {
                // No link of ours has this name. Treat it as the (bad)
                // answer to the oldest attach still in flight: abort that
                // attach and let the peer's follow-up detach surface the
                // reason to the caller.
                let oldest = self
                    .links
                    .values()
                    .filter(|entry| {
                        entry.state == LinkState::AttachSent && entry.pending_attach.is_some()
                    })
                    .map(|entry| entry.local_handle)
                    .min();
                match oldest {
                    Some(local) => {
                        warn!(
                            name = %attach.name,
                            "attach does not correlate with any local link; aborting"
                        );
                        if let Some(entry) = self.links.get_mut(&local) {
                            entry.state = LinkState::DetachSent;
                        }
                        self.links_by_remote.insert(attach.handle, local);
                        let detach = Detach {
                            handle: local,
                            closed: true,
                            error: None,
                        };
                        self.send_frame(outgoing, SessionFrameBody::Detach(detach)).await;
                    }
                    None => warn!(name = %attach.name, "ignoring unsolicited attach"),
                }
                return;
            }
        };

        let Some(entry) = self.links.get_mut(&handle) else { return };
        if entry.state != LinkState::AttachSent {
            warn!(name = %attach.name, "duplicate attach for an attached link");
            return;
        }

        self.links_by_remote.insert(attach.handle, handle);

        // the answering attach states the modes actually in use
        entry.rcv_settle_mode = attach.rcv_settle_mode;

        let missing_terminus = match entry.role {
            Role::Sender => attach.target.is_none(),
            Role::Receiver => attach.source.is_none(),
        };
        if missing_terminus {
            // the peer will follow up with a detach carrying the reason
            entry.rejected_attach = true;
            entry.state = LinkState::DetachSent;
            let detach = Detach {
                handle,
                closed: true,
                error: None,
            };
            self.send_frame(outgoing, SessionFrameBody::Detach(detach)).await;
            return;
        }

        entry.state = LinkState::Attached;
        if entry.role == Role::Receiver {
            entry.remote_delivery_count = attach.initial_delivery_count.unwrap_or(0);
            entry.link_credit = entry.credit_max;
        }
        if let Some(responder) = entry.pending_attach.take() {
            let _ = responder.send(Ok(LinkAttached {
                handle,
                snd_settle_mode: attach.snd_settle_mode,
                rcv_settle_mode: attach.rcv_settle_mode,
                remote_source: attach.source,
                remote_target: attach.target,
                remote_max_message_size: attach.max_message_size,
            }));
        }

        // grant the receiver's initial credit
        if entry.role == Role::Receiver && entry.link_credit > 0 {
            let flow = self.link_flow(handle, false);
            if let Some(flow) = flow {
                self.send_frame(outgoing, SessionFrameBody::Flow(flow)).await;
            }
        }
    }

    /* --------------------------- detach ---------------------------- */

    pub(crate) async fn detach_link(
        &mut self,
        outgoing: &mpsc::Sender<SessionFrame>,
        handle: Handle,
        closed: bool,
        error: Option<definitions::Error>,
        responder: oneshot::Sender<Result<(), DetachError>>,
    ) {
        let Some(entry) = self.links.get_mut(&handle) else {
            let _ = responder.send(Err(DetachError::IllegalState));
            return;
        };
        if entry.state != LinkState::Attached {
            let _ = responder.send(Err(DetachError::IllegalState));
            return;
        }
        entry.state = LinkState::DetachSent;
        entry.pending_detach = Some(responder);
        let detach = Detach {
            handle,
            closed,
            error,
        };
        self.send_frame(outgoing, SessionFrameBody::Detach(detach)).await;
    }

    pub(crate) async fn on_incoming_detach(
        &mut self,
        outgoing: &mpsc::Sender<SessionFrame>,
        detach: Detach,
    ) {
        if self.local_state != SessionState::Mapped {
            return;
        }
        let Some(&local) = self.links_by_remote.get(&detach.handle) else {
            debug!(handle = detach.handle, "detach for an unknown handle");
            return;
        };
        let Some(mut entry) = self.links.remove(&local) else { return };
        self.links_by_remote.remove(&detach.handle);
        self.links_by_name.remove(&entry.name);
        self.handles.release(local);

        let remote_error = detach.error;

        if let Some(responder) = entry.pending_attach.take() {
            // attach was still in flight: aborted, rejected, or refused
            let result = if entry.rejected_attach {
                Err(AttachError::IncompleteAttach {
                    error: remote_error.clone(),
                })
            } else {
                Err(AttachError::Detached(match remote_error.clone() {
                    Some(error) => DetachError::RemoteDetachedWithError(error),
                    None => DetachError::ClosedByRemote,
                }))
            };
            let _ = responder.send(result);
        } else if let Some(responder) = entry.pending_detach.take() {
            // we initiated; the answering detach completes the handshake
            let result = match remote_error.clone() {
                Some(error) => Err(DetachError::RemoteDetachedWithError(error)),
                None => Ok(()),
            };
            let _ = responder.send(result);
        } else {
            // peer-initiated detach; answer it and fail local waiters
            let answer = Detach {
                handle: local,
                closed: detach.closed,
                error: None,
            };
            self.send_frame(outgoing, SessionFrameBody::Detach(answer)).await;
        }

        let detach_error = match remote_error.clone() {
            Some(error) => DetachError::RemoteDetachedWithError(error),
            None => DetachError::ClosedByRemote,
        };
        if let Some(mut active) = entry.active_send.take() {
            if let Some(responder) = active.responder.take() {
                let _ = responder.send(Err(SendError::Detached(detach_error.clone())));
            }
        }
        for request in entry.pending_sends.drain(..) {
            let _ = request
                .responder
                .send(Err(SendError::Detached(detach_error.clone())));
        }
        if let Some(responder) = entry.drain_responder.take() {
            let _ = responder.send(Err(FlowError::IllegalState));
        }
        if let Some(buffer) = entry.buffer.take() {
            let _ = buffer.try_send(Err(RecvError::RemoteDetached {
                error: remote_error,
            }));
        }
        // in-flight deliveries of this link will never settle
        let orphaned: Vec<DeliveryNumber> = self
            .unsettled
            .iter()
            .filter(|(_, delivery)| delivery.handle == local)
            .map(|(&id, _)| id)
            .collect();
        for id in orphaned {
            if let Some(delivery) = self.unsettled.remove(&id) {
                let _ = delivery
                    .tx
                    .send(Err(SendError::Detached(detach_error.clone())));
            }
        }
    }

    /* ---------------------------- flow ----------------------------- */

    /// Builds a link-level flow.
    ///
    /// A receiver reports its knowledge of the sender's delivery-count; a
    /// sender reports its own.
    fn link_flow(&self, handle: Handle, drain: bool) -> Option<Flow> {
        let entry = self.links.get(&handle)?;
        let delivery_count = match entry.role {
            Role::Sender => entry.delivery_count,
            Role::Receiver => entry.remote_delivery_count,
        };
        Some(Flow {
            next_incoming_id: Some(self.next_incoming_id),
            next_outgoing_id: self.next_outgoing_id,
            incoming_window: self.incoming_window,
            outgoing_window: self.outgoing_window,
            handle: Some(handle),
            delivery_count: Some(delivery_count),
            link_credit: Some(entry.link_credit),
            available: None,
            drain,
            echo: false,
            properties: None,
        })
    }

    fn session_flow(&self) -> Flow {
        Flow {
            next_incoming_id: Some(self.next_incoming_id),
            next_outgoing_id: self.next_outgoing_id,
            incoming_window: self.incoming_window,
            outgoing_window: self.outgoing_window,
            handle: None,
            delivery_count: None,
            link_credit: None,
            available: None,
            drain: false,
            echo: false,
            properties: None,
        }
    }

    pub(crate) async fn link_credit_control(
        &mut self,
        outgoing: &mpsc::Sender<SessionFrame>,
        handle: Handle,
        credit: u32,
        drain: bool,
        responder: oneshot::Sender<Result<(), FlowError>>,
    ) {
        let Some(entry) = self.links.get_mut(&handle) else {
            let _ = responder.send(Err(FlowError::IllegalState));
            return;
        };
        if entry.role != Role::Receiver || entry.state != LinkState::Attached {
            let _ = responder.send(Err(FlowError::IllegalState));
            return;
        }
        if drain {
            if entry.link_credit == 0 {
                // nothing outstanding to drain
                let _ = responder.send(Ok(()));
                return;
            }
            entry.drain_responder = Some(responder);
            if let Some(flow) = self.link_flow(handle, true) {
                self.send_frame(outgoing, SessionFrameBody::Flow(flow)).await;
            }
        } else {
            entry.credit_max = credit;
            entry.link_credit = credit;
            if let Some(flow) = self.link_flow(handle, false) {
                self.send_frame(outgoing, SessionFrameBody::Flow(flow)).await;
            }
            let _ = responder.send(Ok(()));
        }
    }

    pub(crate) async fn on_incoming_flow(
        &mut self,
        outgoing: &mpsc::Sender<SessionFrame>,
        flow: Flow,
    ) -> Result<(), Error> {
        if self.local_state != SessionState::Mapped {
            return Ok(());
        }
        // session-level windows; a null next-incoming-id after the session
        // is established is a protocol violation
        let Some(flow_next_incoming_id) = flow.next_incoming_id else {
            self.fail_session(
                outgoing,
                AmqpError::InvalidField,
                "flow without next-incoming-id on an established session",
                Error::IllegalState,
            )
            .await;
            return Ok(());
        };
        self.remote_incoming_window = flow_next_incoming_id
            .wrapping_add(flow.incoming_window)
            .wrapping_sub(self.next_outgoing_id);

        if let Some(remote_handle) = flow.handle {
            let Some(&local) = self.links_by_remote.get(&remote_handle) else {
                debug!(handle = remote_handle, "flow for an unknown handle");
                return Ok(());
            };
            let Some(entry) = self.links.get_mut(&local) else { return Ok(()) };
            match entry.role {
                Role::Sender => {
                    // effective credit per 2.6.7
                    let base = flow.delivery_count.unwrap_or(entry.delivery_count);
                    let granted = flow.link_credit.unwrap_or(0);
                    let credit = base
                        .wrapping_add(granted)
                        .wrapping_sub(entry.delivery_count);
                    if flow.drain {
                        // consume all credit by advancing delivery-count
                        entry.delivery_count = entry.delivery_count.wrapping_add(credit);
                        entry.link_credit = 0;
                        if let Some(echo) = self.link_flow(local, true) {
                            self.send_frame(outgoing, SessionFrameBody::Flow(echo)).await;
                        }
                    } else {
                        entry.link_credit = credit;
                    }
                }
                Role::Receiver => {
                    if let Some(count) = flow.delivery_count {
                        let consumed = count.wrapping_sub(entry.remote_delivery_count);
                        entry.remote_delivery_count = count;
                        entry.link_credit = entry.link_credit.saturating_sub(consumed);
                    }
                    if entry.drain_responder.is_some()
                        && (flow.drain || entry.link_credit == 0)
                    {
                        entry.link_credit = 0;
                        if let Some(responder) = entry.drain_responder.take() {
                            let _ = responder.send(Ok(()));
                        }
                    }
                }
            }
            // new credit or window may unblock parked sends
            self.drain_link_sends(outgoing, local).await;
        } else {
            // pure session flow; window change may unblock any link
            let handles: Vec<Handle> = self.links.keys().copied().collect();
            for handle in handles {
                self.drain_link_sends(outgoing, handle).await;
            }
        }

        if flow.echo {
            // answer with link state when the request named a link
            let reply = flow
                .handle
                .and_then(|remote| self.links_by_remote.get(&remote).copied())
                .and_then(|local| self.link_flow(local, false))
                .unwrap_or_else(|| self.session_flow());
            self.send_frame(outgoing, SessionFrameBody::Flow(reply)).await;
        }
        Ok(())
    }

    /* -------------------------- transfers -------------------------- */

    pub(crate) async fn transfer(
        &mut self,
        outgoing: &mpsc::Sender<SessionFrame>,
        request: TransferRequest,
    ) {
        let handle = request.handle;
        match self.links.get_mut(&handle) {
            Some(entry) if entry.role == Role::Sender && entry.state == LinkState::Attached => {
                entry.pending_sends.push_back(request);
            }
            _ => {
                let _ = request.responder.send(Err(SendError::IllegalState));
                return;
            }
        }
        self.drain_link_sends(outgoing, handle).await;
    }

    /// Splits a payload into transfer frames that fit the negotiated
    /// max-frame-size. Only the first frame carries the delivery identity.
    fn build_chunks(
        max_frame_size: u32,
        handle: Handle,
        delivery_id: DeliveryNumber,
        request: &TransferRequest,
    ) -> VecDeque<(Transfer, Payload)> {
        let mut chunks = VecDeque::new();
        let mut remaining = request.payload.clone();

        let first = Transfer {
            handle,
            delivery_id: Some(delivery_id),
            delivery_tag: Some(request.delivery_tag.clone()),
            message_format: Some(request.message_format),
            settled: Some(request.settled),
            more: false,
            ..Default::default()
        };
        let first_budget =
            (max_frame_size as usize).saturating_sub(8 + to_vec(&first).len());
        if remaining.len() <= first_budget {
            chunks.push_back((first, remaining));
            return chunks;
        }

        let mut first = first;
        first.more = true;
        let part = remaining.split_to(first_budget);
        chunks.push_back((first, part));

        let continuation = Transfer {
            handle,
            more: true,
            ..Default::default()
        };
        let budget =
            (max_frame_size as usize).saturating_sub(8 + to_vec(&continuation).len());
        while remaining.len() > budget {
            let part = remaining.split_to(budget);
            chunks.push_back((continuation.clone(), part));
        }
        let mut last = continuation;
        last.more = false;
        chunks.push_back((last, remaining));
        chunks
    }

    /// Emits as many transfer frames for this link as credit and the
    /// remote incoming window currently allow.
    async fn drain_link_sends(
        &mut self,
        outgoing: &mpsc::Sender<SessionFrame>,
        handle: Handle,
    ) {
        loop {
            let Some(entry) = self.links.get_mut(&handle) else { return };

            if entry.active_send.is_none() {
                if entry.link_credit == 0 || entry.pending_sends.is_empty() {
                    return;
                }
                let request = match entry.pending_sends.pop_front() {
                    Some(request) => request,
                    None => return,
                };
                let delivery_id = self.next_delivery_id;
                self.next_delivery_id = self.next_delivery_id.wrapping_add(1);
                entry.delivery_count = entry.delivery_count.wrapping_add(1);
                entry.link_credit -= 1;

                let chunks =
                    Self::build_chunks(self.max_frame_size, handle, delivery_id, &request);
                let settlement = if request.settled {
                    Settlement::Settled
                } else {
                    let (tx, rx) = oneshot::channel();
                    self.unsettled.insert(
                        delivery_id,
                        UnsettledDelivery {
                            handle,
                            state: None,
                            tx,
                        },
                    );
                    Settlement::Pending(rx)
                };
                entry.active_send = Some(ActiveSend {
                    chunks,
                    responder: Some(request.responder),
                    settlement: Some(settlement),
                });
            }

            // emit chunks while the peer's incoming window has room
            loop {
                let Some(entry) = self.links.get_mut(&handle) else { return };
                let Some(active) = entry.active_send.as_mut() else { break };
                if active.chunks.is_empty() {
                    if let Some(mut active) = entry.active_send.take() {
                        if let (Some(responder), Some(settlement)) =
                            (active.responder.take(), active.settlement.take())
                        {
                            let _ = responder.send(Ok(settlement));
                        }
                    }
                    break;
                }
                if self.remote_incoming_window == 0 {
                    return;
                }
                let Some((performative, payload)) = active.chunks.pop_front() else { break };
                self.next_outgoing_id = self.next_outgoing_id.wrapping_add(1);
                self.remote_incoming_window -= 1;
                self.send_frame(
                    outgoing,
                    SessionFrameBody::Transfer {
                        performative,
                        payload,
                    },
                )
                .await;
            }
        }
    }

    pub(crate) async fn on_incoming_transfer(
        &mut self,
        outgoing: &mpsc::Sender<SessionFrame>,
        transfer: Transfer,
        payload: Payload,
    ) {
        if self.local_state != SessionState::Mapped {
            return;
        }
        if self.incoming_window == 0 {
            self.fail_session(
                outgoing,
                SessionError::WindowViolation,
                "transfer exceeds the incoming window",
                Error::WindowViolation,
            )
            .await;
            return;
        }
        self.next_incoming_id = self.next_incoming_id.wrapping_add(1);
        self.incoming_window -= 1;

        let Some(&local) = self.links_by_remote.get(&transfer.handle) else {
            self.fail_session(
                outgoing,
                SessionError::UnattachedHandle,
                "transfer on an unattached handle",
                Error::IllegalState,
            )
            .await;
            return;
        };

        let mut fail: Option<(SessionError, &'static str)> = None;
        let mut completed: Option<(PartialDelivery, DeliverySender)> = None;

        if let Some(entry) = self.links.get_mut(&local) {
            if entry.role != Role::Receiver {
                fail = Some((SessionError::ErrantLink, "transfer to a sender link"));
            } else if transfer.aborted {
                entry.partial = None;
            } else {
                if entry.partial.is_some() {
                    if let Some(partial) = entry.partial.as_mut() {
                        partial.payload.put(payload);
                    }
                } else {
                    // first frame of a new delivery
                    match transfer.delivery_id {
                        None => {
                            fail = Some((
                                SessionError::ErrantLink,
                                "first transfer of a delivery without a delivery-id",
                            ));
                        }
                        Some(delivery_id) => {
                            let stale = self
                                .last_incoming_delivery_id
                                .map(|last| {
                                    serial_cmp(delivery_id, last)
                                        != std::cmp::Ordering::Greater
                                })
                                .unwrap_or(false);
                            if stale {
                                fail = Some((
                                    SessionError::ErrantLink,
                                    "delivery-id did not advance",
                                ));
                            } else if entry.link_credit == 0 {
                                fail = Some((
                                    SessionError::ErrantLink,
                                    "transfer without link credit",
                                ));
                            } else {
                                entry.link_credit -= 1;
                                entry.remote_delivery_count =
                                    entry.remote_delivery_count.wrapping_add(1);
                                self.last_incoming_delivery_id = Some(delivery_id);
                                let mut partial_payload = BytesMut::new();
                                partial_payload.put(payload);
                                entry.partial = Some(PartialDelivery {
                                    delivery_id,
                                    delivery_tag: transfer
                                        .delivery_tag
                                        .clone()
                                        .unwrap_or_default(),
                                    message_format: transfer.message_format.unwrap_or(0),
                                    settled: transfer.settled.unwrap_or(false),
                                    payload: partial_payload,
                                });
                            }
                        }
                    }
                }
                if fail.is_none() && !transfer.more {
                    if let (Some(partial), Some(buffer)) =
                        (entry.partial.take(), entry.buffer.clone())
                    {
                        completed = Some((partial, buffer));
                    }
                }
            }
        }

        if let Some((condition, description)) = fail {
            self.fail_session(outgoing, condition, description, Error::IllegalState)
                .await;
            return;
        }

        if let Some((partial, buffer)) = completed {
            match from_slice::<Message>(&partial.payload) {
                Ok((message, _)) => {
                    let delivery = Delivery {
                        delivery_id: partial.delivery_id,
                        delivery_tag: partial.delivery_tag,
                        message_format: partial.message_format,
                        settled: partial.settled,
                        message,
                    };
                    if buffer.try_send(Ok(delivery)).is_err() {
                        debug!("receiver buffer gone; dropping delivery");
                    }
                }
                Err(err) => {
                    let _ = buffer.try_send(Err(RecvError::MessageDecode(err)));
                }
            }
        }

        // replenish the session window once half of it is consumed
        if self.incoming_window <= self.incoming_window_max / 2 {
            self.incoming_window = self.incoming_window_max;
            let flow = self.session_flow();
            self.send_frame(outgoing, SessionFrameBody::Flow(flow)).await;
        }

        // top receiver credit back up when it falls below the low-water
        // mark, unless the application manages credit itself
        if let Some(entry) = self.links.get_mut(&local) {
            if entry.role == Role::Receiver
                && entry.credit_mode == CreditMode::Auto
                && entry.state == LinkState::Attached
                && entry.credit_max > 0
                && entry.link_credit < (entry.credit_max / 2).max(1)
            {
                entry.link_credit = entry.credit_max;
                if let Some(flow) = self.link_flow(local, false) {
                    self.send_frame(outgoing, SessionFrameBody::Flow(flow)).await;
                }
            }
        }
    }

    /* ------------------------- dispositions ------------------------ */

    pub(crate) async fn disposition(
        &mut self,
        outgoing: &mpsc::Sender<SessionFrame>,
        first: DeliveryNumber,
        last: DeliveryNumber,
        state: DeliveryState,
        settled: bool,
        responder: oneshot::Sender<Result<(), DispositionError>>,
    ) {
        if self.local_state != SessionState::Mapped {
            let _ = responder.send(Err(DispositionError::Session(Error::Ended)));
            return;
        }
        let disposition = Disposition {
            role: Role::Receiver,
            first,
            last: Some(last),
            settled,
            state: Some(state),
            batchable: false,
        };
        self.send_frame(outgoing, SessionFrameBody::Disposition(disposition))
            .await;
        if settled {
            let _ = responder.send(Ok(()));
        } else {
            // receiver settle mode second: hold until the peer settles
            self.incoming_unsettled.insert(first, responder);
        }
    }

    pub(crate) async fn on_incoming_disposition(
        &mut self,
        outgoing: &mpsc::Sender<SessionFrame>,
        disposition: Disposition,
    ) {
        if self.local_state != SessionState::Mapped {
            return;
        }
        let first = disposition.first;
        let last = disposition.last.unwrap_or(first);

        match disposition.role {
            Role::Receiver => {
                // about deliveries we sent
                let ids: Vec<DeliveryNumber> = self
                    .unsettled
                    .keys()
                    .copied()
                    .filter(|&id| in_serial_range(id, first, last))
                    .collect();
                let mut echo_ranges: Vec<DeliveryNumber> = Vec::new();
                for id in ids {
                    let Some(delivery) = self.unsettled.get_mut(&id) else { continue };
                    if let Some(state) = disposition.state.clone() {
                        delivery.state = Some(state);
                    }
                    let terminal = delivery
                        .state
                        .as_ref()
                        .map(|state| state.is_terminal())
                        .unwrap_or(false);
                    if disposition.settled {
                        if let Some(delivery) = self.unsettled.remove(&id) {
                            let state = delivery
                                .state
                                .unwrap_or(DeliveryState::Accepted(Accepted {}));
                            let _ = delivery.tx.send(Ok(state));
                        }
                    } else if terminal {
                        // unsettled terminal state: settle it back when the
                        // link runs receiver-settle-mode second
                        let settle_second = self
                            .unsettled
                            .get(&id)
                            .and_then(|delivery| self.links.get(&delivery.handle))
                            .map(|entry| entry.rcv_settle_mode == ReceiverSettleMode::Second)
                            .unwrap_or(false);
                        if settle_second {
                            echo_ranges.push(id);
                            if let Some(delivery) = self.unsettled.remove(&id) {
                                let state = delivery
                                    .state
                                    .unwrap_or(DeliveryState::Accepted(Accepted {}));
                                let _ = delivery.tx.send(Ok(state));
                            }
                        }
                    }
                }
                // settle the echoed ids in contiguous runs
                for (run_first, run_last) in contiguous_runs(&echo_ranges) {
                    let echo = Disposition {
                        role: Role::Sender,
                        first: run_first,
                        last: Some(run_last),
                        settled: true,
                        state: disposition.state.clone(),
                        batchable: false,
                    };
                    self.send_frame(outgoing, SessionFrameBody::Disposition(echo))
                        .await;
                }
            }
            Role::Sender => {
                // about deliveries we received (receiver settle mode second)
                if disposition.settled {
                    let ids: Vec<DeliveryNumber> = self
                        .incoming_unsettled
                        .keys()
                        .copied()
                        .filter(|&id| in_serial_range(id, first, last))
                        .collect();
                    for id in ids {
                        if let Some(tx) = self.incoming_unsettled.remove(&id) {
                            let _ = tx.send(Ok(()));
                        }
                    }
                }
            }
        }
    }
}

/// Whether `id` falls in the inclusive serial-number range `[first, last]`.
fn in_serial_range(id: DeliveryNumber, first: DeliveryNumber, last: DeliveryNumber) -> bool {
    serial_cmp(id, first) != std::cmp::Ordering::Less
        && serial_cmp(id, last) != std::cmp::Ordering::Greater
}

/// Collapses a sorted id list into contiguous `[first, last]` runs.
fn contiguous_runs(ids: &[DeliveryNumber]) -> Vec<(DeliveryNumber, DeliveryNumber)> {
    let mut runs = Vec::new();
    let mut iter = ids.iter().copied();
    let Some(mut start) = iter.next() else { return runs };
    let mut end = start;
    for id in iter {
        if id == end.wrapping_add(1) {
            end = id;
        } else {
            runs.push((start, end));
            start = id;
            end = id;
        }
    }
    runs.push((start, end));
    runs
}

/// Handle to a running session.
///
/// Links are attached through [`crate::Sender::attach`] and
/// [`crate::Receiver::attach`]; ending the session fails everything still
/// pending on it.
pub struct SessionHandle {
    pub(crate) control: mpsc::Sender<SessionControl>,
    engine: Option<JoinHandle<Result<(), Error>>>,
    result: Option<Result<(), Error>>,
}

impl SessionHandle {
    pub(crate) fn new(
        control: mpsc::Sender<SessionControl>,
        engine: JoinHandle<Result<(), Error>>,
    ) -> Self {
        Self {
            control,
            engine: Some(engine),
            result: None,
        }
    }

    /// Ends the session and waits for the answering end.
    pub async fn end(&mut self) -> Result<(), Error> {
        let _ = self.control.send(SessionControl::End(None)).await;
        self.join_engine().await
    }

    /// Ends the session with an error.
    pub async fn end_with_error(
        &mut self,
        error: definitions::Error,
    ) -> Result<(), Error> {
        let _ = self
            .control
            .send(SessionControl::End(Some(error)))
            .await;
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

#[cfg(test)]
mod tests {
    use limonite_amqp_types::codec::to_vec;
    use limonite_amqp_types::primitives::Binary;
    use tokio::sync::oneshot;

    use super::{contiguous_runs, in_serial_range, Session, TransferRequest};
    use crate::Payload;

    #[test]
    fn serial_range_checks() {
        assert!(in_serial_range(5, 5, 5));
        assert!(in_serial_range(6, 5, 8));
        assert!(!in_serial_range(9, 5, 8));
        // wrap-around range
        assert!(in_serial_range(0, u32::MAX, 1));
    }

    #[test]
    fn runs_are_collapsed() {
        assert_eq!(contiguous_runs(&[1, 2, 3, 7, 8, 10]), vec![(1, 3), (7, 8), (10, 10)]);
        assert_eq!(contiguous_runs(&[]), vec![]);
    }

    fn request(payload_len: usize) -> TransferRequest {
        let (responder, _rx) = oneshot::channel();
        TransferRequest {
            handle: 0,
            payload: Payload::from(vec![0xaau8; payload_len]),
            delivery_tag: Binary::from([7u8; 16]),
            message_format: 0,
            settled: false,
            responder,
        }
    }

    #[test]
    fn small_payload_is_a_single_transfer() {
        let request = request(100);
        let chunks = Session::build_chunks(512, 0, 9, &request);
        assert_eq!(chunks.len(), 1);
        let (transfer, payload) = &chunks[0];
        assert_eq!(transfer.delivery_id, Some(9));
        assert!(!transfer.more);
        assert_eq!(payload.len(), 100);
    }

    #[test]
    fn large_payload_is_chunked_within_the_frame_budget() {
        let request = request(2000);
        let chunks = Session::build_chunks(512, 3, 0, &request);
        assert!(chunks.len() > 1);

        let mut total = 0;
        for (index, (transfer, payload)) in chunks.iter().enumerate() {
            // header (8) + performative + payload must fit one frame
            assert!(8 + to_vec(transfer).len() + payload.len() <= 512);
            assert_eq!(transfer.handle, 3);
            if index == 0 {
                assert_eq!(transfer.delivery_id, Some(0));
                assert!(transfer.delivery_tag.is_some());
            } else {
                assert_eq!(transfer.delivery_id, None);
                assert!(transfer.delivery_tag.is_none());
            }
            assert_eq!(transfer.more, index + 1 < chunks.len());
            total += payload.len();
        }
        assert_eq!(total, 2000);
    }

    #[test]
    fn exact_budget_fill_does_not_add_an_empty_tail() {
        // find the continuation budget and build a payload that fills the
        // first frame plus exactly two continuations
        let probe = request(10_000);
        let chunks = Session::build_chunks(512, 0, 0, &probe);
        let first_len = chunks[0].1.len();
        let cont_len = chunks[1].1.len();

        let request = request(first_len + 2 * cont_len);
        let chunks = Session::build_chunks(512, 0, 0, &request);
        assert_eq!(chunks.len(), 3);
        assert!(!chunks[2].0.more);
        assert!(!chunks[2].1.is_empty());
    }
}
