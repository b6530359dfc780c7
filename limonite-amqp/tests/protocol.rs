//! Scripted-peer protocol tests: each test drives the client against a
//! hand-written peer over an in-memory stream.

mod common;

use std::time::Duration;

use common::{peer_begin, peer_open, TestPeer, AMQP_HEADER, SASL_HEADER};

use limonite_amqp::connection;
use limonite_amqp::link::{AttachError, DetachError};
use limonite_amqp::types::definitions::{self, ErrorCondition, LinkError, Role};
use limonite_amqp::types::messaging::{Accepted, DeliveryState, Message, Target};
use limonite_amqp::types::performatives::{
    Attach, Close, Detach, Disposition, End, Flow, Open, Performative,
};
use limonite_amqp::types::primitives::{Binary, Symbol};
use limonite_amqp::types::sasl::{
    SaslCode, SaslFrameBody, SaslMechanisms, SaslOutcome,
};
use limonite_amqp::types::codec::from_slice;
use limonite_amqp::{Connection, Receiver, SaslProfile, Sender, Session};

/// Opens a connection against a scripted peer, running the header and open
/// exchange for both sides.
async fn opened_pair(
    peer_open_frame: Open,
    configure: impl FnOnce(
            connection::Builder<connection::builder::WithContainerId>,
        ) -> connection::Builder<connection::builder::WithContainerId>
        + Send
        + 'static,
) -> (limonite_amqp::ConnectionHandle, TestPeer) {
    let (client_io, mut peer) = TestPeer::pair();

    let client = tokio::spawn(async move {
        let builder = configure(Connection::builder().container_id("test-client"));
        builder.open_with_stream(client_io).await
    });

    peer.expect_header(AMQP_HEADER).await;
    peer.send_raw(&AMQP_HEADER).await;
    let open = peer.read_frame().await;
    assert!(matches!(open.performative, Some(Performative::Open(_))));
    peer.send_performative(0, &peer_open_frame).await;

    let connection = client.await.unwrap().unwrap();
    (connection, peer)
}

/// Answers a begin on the given channel and returns the session.
async fn begin_session(
    connection: &mut limonite_amqp::ConnectionHandle,
    peer: &mut TestPeer,
    channel: u16,
) -> limonite_amqp::SessionHandle {
    let (session, ()) = tokio::join!(Session::begin(connection), async {
        let frame = peer.read_non_empty_frame().await;
        match frame.performative {
            Some(Performative::Begin(begin)) => {
                assert_eq!(frame.channel, channel);
                assert_eq!(begin.next_outgoing_id, 0);
                assert_eq!(begin.incoming_window, 5000);
                assert_eq!(begin.outgoing_window, 5000);
            }
            other => panic!("expected begin, got {:?}", other),
        }
        peer.send_performative(channel, &peer_begin(channel)).await;
    });
    session.unwrap()
}

/// Answers a sender attach on handle 0 and grants `credit`.
async fn attach_sender(
    session: &mut limonite_amqp::SessionHandle,
    peer: &mut TestPeer,
    name: &str,
    credit: u32,
) -> Sender {
    let (sender, ()) = tokio::join!(Sender::attach(session, name, "q1"), async {
        let frame = peer.read_non_empty_frame().await;
        let attach = match frame.performative {
            Some(Performative::Attach(attach)) => attach,
            other => panic!("expected attach, got {:?}", other),
        };
        assert_eq!(attach.name, name);
        assert_eq!(attach.role, Role::Sender);
        assert_eq!(attach.initial_delivery_count, Some(0));

        let answer = Attach {
            name: name.to_string(),
            handle: 0,
            role: Role::Receiver,
            target: Some(Target::with_address("q1")),
            ..Default::default()
        };
        peer.send_performative(0, &answer).await;

        let flow = Flow {
            next_incoming_id: Some(0),
            next_outgoing_id: 0,
            incoming_window: 5000,
            outgoing_window: 5000,
            handle: Some(attach.handle),
            delivery_count: Some(0),
            link_credit: Some(credit),
            ..Default::default()
        };
        peer.send_performative(0, &flow).await;
    });
    sender.unwrap()
}

#[tokio::test]
async fn sasl_plain_handshake_reaches_opened() {
    let (client_io, mut peer) = TestPeer::pair();

    let client = tokio::spawn(async move {
        Connection::builder()
            .container_id("test-client")
            .sasl_profile(SaslProfile::Plain {
                username: "listen".to_string(),
                password: "secret".to_string(),
            })
            .open_with_stream(client_io)
            .await
    });

    // SASL header exchange, then the mechanism negotiation
    peer.expect_header(SASL_HEADER).await;
    peer.send_raw(&SASL_HEADER).await;
    peer.send_sasl(&SaslFrameBody::Mechanisms(SaslMechanisms {
        sasl_server_mechanisms: vec![Symbol::from("PLAIN"), Symbol::from("ANONYMOUS")],
    }))
    .await;

    let init = match peer.read_sasl().await {
        SaslFrameBody::Init(init) => init,
        other => panic!("expected sasl-init, got {:?}", other),
    };
    assert_eq!(init.mechanism, Symbol::from("PLAIN"));
    assert_eq!(
        init.initial_response.unwrap().as_slice(),
        b"\0listen\0secret"
    );

    peer.send_sasl(&SaslFrameBody::Outcome(SaslOutcome {
        code: SaslCode::Ok,
        additional_data: None,
    }))
    .await;

    // the protocol restarts with the plain AMQP header
    peer.expect_header(AMQP_HEADER).await;
    peer.send_raw(&AMQP_HEADER).await;
    let open = peer.read_frame().await;
    match open.performative {
        Some(Performative::Open(open)) => assert_eq!(open.container_id, "test-client"),
        other => panic!("expected open, got {:?}", other),
    }
    peer.send_performative(0, &peer_open("test-peer")).await;

    let connection = client.await.unwrap().unwrap();

    // clean close both ways
    let (result, ()) = tokio::join!(connection.close(), async {
        let frame = peer.read_non_empty_frame().await;
        assert!(matches!(frame.performative, Some(Performative::Close(_))));
        peer.send_performative(0, &Close::default()).await;
    });
    result.unwrap();
}

#[tokio::test]
async fn session_begin_end_reuses_the_channel() {
    let (mut connection, mut peer) = opened_pair(peer_open("peer"), |b| b).await;

    // channel 0 must be free again after every end handshake
    for _ in 0..3 {
        let mut session = begin_session(&mut connection, &mut peer, 0).await;

        let (result, ()) = tokio::join!(session.end(), async {
            let frame = peer.read_non_empty_frame().await;
            assert!(matches!(frame.performative, Some(Performative::End(_))));
            assert_eq!(frame.channel, 0);
            peer.send_performative(0, &End::default()).await;
        });
        result.unwrap();
    }

    let (result, ()) = tokio::join!(connection.close(), async {
        let frame = peer.read_non_empty_frame().await;
        assert!(matches!(frame.performative, Some(Performative::Close(_))));
        peer.send_performative(0, &Close::default()).await;
    });
    result.unwrap();
}

#[tokio::test]
async fn send_resolves_with_the_accepted_disposition() {
    let (mut connection, mut peer) = opened_pair(peer_open("peer"), |b| b).await;
    let mut session = begin_session(&mut connection, &mut peer, 0).await;
    let mut sender = attach_sender(&mut session, &mut peer, "s1", 10).await;

    let message = Message::builder().body(vec![0xffu8]).build();
    let (result, ()) = tokio::join!(sender.send(message), async {
        let frame = peer.read_non_empty_frame().await;
        let transfer = match frame.performative {
            Some(Performative::Transfer(transfer)) => transfer,
            other => panic!("expected transfer, got {:?}", other),
        };
        assert_eq!(transfer.delivery_id, Some(0));
        assert_eq!(transfer.settled, Some(false));
        assert!(!transfer.more);
        assert_eq!(transfer.delivery_tag.as_ref().map(|t| t.len()), Some(16));

        let (message, _) = from_slice::<Message>(&frame.payload).unwrap();
        assert_eq!(message.data(), Some(vec![0xff]));

        let disposition = Disposition {
            role: Role::Receiver,
            first: 0,
            last: Some(0),
            settled: true,
            state: Some(DeliveryState::Accepted(Accepted {})),
            batchable: false,
        };
        peer.send_performative(0, &disposition).await;
    });
    result.unwrap();
}

#[tokio::test]
async fn rejected_disposition_surfaces_as_an_error() {
    let (mut connection, mut peer) = opened_pair(peer_open("peer"), |b| b).await;
    let mut session = begin_session(&mut connection, &mut peer, 0).await;
    let mut sender = attach_sender(&mut session, &mut peer, "s1", 1).await;

    let (result, ()) = tokio::join!(sender.send("doomed"), async {
        let frame = peer.read_non_empty_frame().await;
        assert!(matches!(frame.performative, Some(Performative::Transfer(_))));
        let disposition = Disposition {
            role: Role::Receiver,
            first: 0,
            last: Some(0),
            settled: true,
            state: Some(DeliveryState::Rejected(
                limonite_amqp::types::messaging::Rejected {
                    error: Some(definitions::Error::condition(
                        definitions::AmqpError::NotAllowed,
                    )),
                },
            )),
            batchable: false,
        };
        peer.send_performative(0, &disposition).await;
    });
    match result {
        Err(limonite_amqp::link::SendError::Rejected { error: Some(error) }) => {
            assert_eq!(error.condition.as_str(), "amqp:not-allowed");
        }
        other => panic!("expected a rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn large_message_is_chunked_to_the_frame_size() {
    let (mut connection, mut peer) =
        opened_pair(peer_open("peer"), |b| b.max_frame_size(512)).await;
    assert_eq!(connection.max_frame_size(), 512);

    let mut session = begin_session(&mut connection, &mut peer, 0).await;
    let mut sender = attach_sender(&mut session, &mut peer, "s1", 1).await;

    let body = vec![0xabu8; 2000];
    let message = Message::builder().body(body.clone()).build();

    let (result, ()) = tokio::join!(sender.send(message), async {
        let mut assembled = Vec::new();
        let mut frames = 0;
        loop {
            let frame = peer.read_non_empty_frame().await;
            let transfer = match frame.performative {
                Some(Performative::Transfer(transfer)) => transfer,
                other => panic!("expected transfer, got {:?}", other),
            };
            // frame = 8-byte header + performative + payload chunk
            assert!(frame.payload.len() <= 512 - 8);
            if frames == 0 {
                assert_eq!(transfer.delivery_id, Some(0));
            } else {
                assert_eq!(transfer.delivery_id, None);
            }
            frames += 1;
            assembled.extend_from_slice(&frame.payload);
            if !transfer.more {
                break;
            }
        }
        assert!(frames > 1, "a 2000-byte message must span frames");

        let (message, _) = from_slice::<Message>(&assembled).unwrap();
        assert_eq!(message.data(), Some(body));

        let disposition = Disposition {
            role: Role::Receiver,
            first: 0,
            last: Some(0),
            settled: true,
            state: Some(DeliveryState::Accepted(Accepted {})),
            batchable: false,
        };
        peer.send_performative(0, &disposition).await;
    });
    result.unwrap();
}

#[tokio::test]
async fn receiver_grants_credit_and_replenishes() {
    let (mut connection, mut peer) = opened_pair(peer_open("peer"), |b| b).await;
    let mut session = begin_session(&mut connection, &mut peer, 0).await;

    let (receiver, ()) = tokio::join!(
        async {
            Receiver::builder()
                .name("r1")
                .source("q1")
                .credit(2)
                .attach(&mut session)
                .await
        },
        async {
            let frame = peer.read_non_empty_frame().await;
            let attach = match frame.performative {
                Some(Performative::Attach(attach)) => attach,
                other => panic!("expected attach, got {:?}", other),
            };
            assert_eq!(attach.role, Role::Receiver);
            let answer = Attach {
                name: "r1".to_string(),
                handle: 0,
                role: Role::Sender,
                source: Some(limonite_amqp::types::messaging::Source::with_address("q1")),
                initial_delivery_count: Some(0),
                ..Default::default()
            };
            peer.send_performative(0, &answer).await;

            // the initial credit grant
            let frame = peer.read_non_empty_frame().await;
            match frame.performative {
                Some(Performative::Flow(flow)) => {
                    assert_eq!(flow.handle, Some(0));
                    assert_eq!(flow.link_credit, Some(2));
                }
                other => panic!("expected flow, got {:?}", other),
            }
        }
    );
    let mut receiver = receiver.unwrap();

    // two deliveries consume the credit
    for delivery_id in 0u32..2 {
        let transfer = limonite_amqp::types::performatives::Transfer {
            handle: 0,
            delivery_id: Some(delivery_id),
            delivery_tag: Some(Binary::from(delivery_id.to_be_bytes())),
            message_format: Some(0),
            settled: Some(false),
            ..Default::default()
        };
        let payload = limonite_amqp::types::codec::to_vec(&Message::from(format!(
            "m{}",
            delivery_id
        )));
        peer.send_performative_with_payload(0, &transfer, &payload).await;
    }

    let first = receiver.recv().await.unwrap();
    assert_eq!(first.delivery_id(), 0);

    // consuming the second delivery drops credit to zero, which is below
    // the low-water mark and triggers a replenishing flow
    let frame = peer.read_non_empty_frame().await;
    match frame.performative {
        Some(Performative::Flow(flow)) => {
            assert_eq!(flow.handle, Some(0));
            assert_eq!(flow.link_credit, Some(2));
            assert_eq!(flow.delivery_count, Some(2));
        }
        other => panic!("expected replenishing flow, got {:?}", other),
    }

    receiver.accept(&first).await.unwrap();
    let frame = peer.read_non_empty_frame().await;
    match frame.performative {
        Some(Performative::Disposition(disposition)) => {
            assert_eq!(disposition.role, Role::Receiver);
            assert_eq!(disposition.first, 0);
            assert!(disposition.settled);
            assert!(matches!(
                disposition.state,
                Some(DeliveryState::Accepted(_))
            ));
        }
        other => panic!("expected disposition, got {:?}", other),
    }

    let second = receiver.recv().await.unwrap();
    assert_eq!(second.delivery_id(), 1);
    receiver.accept(&second).await.unwrap();
    let frame = peer.read_non_empty_frame().await;
    assert!(matches!(
        frame.performative,
        Some(Performative::Disposition(_))
    ));
}

#[tokio::test]
async fn drain_completes_when_the_peer_reports_credit_consumed() {
    let (mut connection, mut peer) = opened_pair(peer_open("peer"), |b| b).await;
    let mut session = begin_session(&mut connection, &mut peer, 0).await;

    let (receiver, ()) = tokio::join!(
        async {
            Receiver::builder()
                .name("r1")
                .source("q1")
                .credit(5)
                .attach(&mut session)
                .await
        },
        async {
            let frame = peer.read_non_empty_frame().await;
            assert!(matches!(frame.performative, Some(Performative::Attach(_))));
            let answer = Attach {
                name: "r1".to_string(),
                handle: 0,
                role: Role::Sender,
                source: Some(limonite_amqp::types::messaging::Source::with_address("q1")),
                initial_delivery_count: Some(0),
                ..Default::default()
            };
            peer.send_performative(0, &answer).await;
            let frame = peer.read_non_empty_frame().await;
            assert!(matches!(frame.performative, Some(Performative::Flow(_))));
        }
    );
    let mut receiver = receiver.unwrap();

    let (result, ()) = tokio::join!(receiver.drain(), async {
        let frame = peer.read_non_empty_frame().await;
        match frame.performative {
            Some(Performative::Flow(flow)) => {
                assert!(flow.drain);
                assert_eq!(flow.link_credit, Some(5));
            }
            other => panic!("expected drain flow, got {:?}", other),
        }
        // no messages to give: advance delivery-count past the credit
        let answer = Flow {
            next_incoming_id: Some(0),
            next_outgoing_id: 0,
            incoming_window: 5000,
            outgoing_window: 5000,
            handle: Some(0),
            delivery_count: Some(5),
            link_credit: Some(0),
            drain: true,
            ..Default::default()
        };
        peer.send_performative(0, &answer).await;
    });
    result.unwrap();
}

#[tokio::test]
async fn heartbeats_flow_and_idle_silence_kills_the_connection() {
    let peer_open_frame = Open {
        container_id: "peer".to_string(),
        // ask the client to heartbeat every 100ms
        idle_time_out: Some(200),
        ..Default::default()
    };
    let (mut connection, mut peer) =
        opened_pair(peer_open_frame, |b| b.idle_time_out(200)).await;

    // user silence: the client must emit an empty frame on its own
    let deadline = Duration::from_secs(2);
    let frame = tokio::time::timeout(deadline, peer.read_frame())
        .await
        .expect("no heartbeat before the deadline");
    assert!(frame.performative.is_none(), "expected an empty frame");

    // peer silence: 2x the local 200ms idle timeout must kill the client
    let result = tokio::time::timeout(Duration::from_secs(3), connection.closed())
        .await
        .expect("connection did not fail on idle silence");
    assert!(matches!(result, Err(connection::Error::IdleTimeout)));
}

#[tokio::test]
async fn malformed_frame_is_answered_with_a_decode_error_close() {
    let (mut connection, mut peer) = opened_pair(peer_open("peer"), |b| b).await;

    // a frame whose body is a truncated map rather than a performative
    let malformed = [
        0x00, 0x00, 0x00, 0x0f, // size 15
        0x02, 0x00, 0x00, 0x00, // doff 2, type 0, channel 0
        0xc1, 0x00, 0x30, 0xa0, 0x00, 0x53, 0x30, // bad body
    ];
    peer.send_raw(&malformed).await;

    let frame = peer.read_non_empty_frame().await;
    match frame.performative {
        Some(Performative::Close(close)) => {
            let error = close.error.expect("close must carry an error");
            assert_eq!(error.condition.as_str(), "amqp:decode-error");
        }
        other => panic!("expected close, got {:?}", other),
    }

    let result = connection.closed().await;
    assert!(matches!(result, Err(connection::Error::Decode(_))));
}

#[tokio::test]
async fn mismatched_attach_aborts_and_surfaces_the_stolen_error() {
    let (mut connection, mut peer) = opened_pair(peer_open("peer"), |b| b).await;
    let mut session = begin_session(&mut connection, &mut peer, 0).await;

    let (result, ()) = tokio::join!(Sender::attach(&mut session, "s1", "q1"), async {
        let frame = peer.read_non_empty_frame().await;
        let attach = match frame.performative {
            Some(Performative::Attach(attach)) => attach,
            other => panic!("expected attach, got {:?}", other),
        };
        assert_eq!(attach.name, "s1");

        // answer with the wrong link name, then steal the link
        let answer = Attach {
            name: "other".to_string(),
            handle: 0,
            role: Role::Receiver,
            target: Some(Target::with_address("q1")),
            ..Default::default()
        };
        peer.send_performative(0, &answer).await;

        // the client aborts with a closing detach
        let frame = peer.read_non_empty_frame().await;
        match frame.performative {
            Some(Performative::Detach(detach)) => assert!(detach.closed),
            other => panic!("expected detach, got {:?}", other),
        }

        let stolen = Detach {
            handle: 0,
            closed: true,
            error: Some(definitions::Error::condition(LinkError::Stolen)),
        };
        peer.send_performative(0, &stolen).await;
    });

    match result {
        Err(AttachError::Detached(DetachError::RemoteDetachedWithError(error))) => {
            assert_eq!(
                error.condition,
                ErrorCondition::Link(LinkError::Stolen)
            );
        }
        other => panic!("expected the stolen error, got {:?}", other),
    }

    // the session survives and can attach another link
    let sender = attach_sender(&mut session, &mut peer, "s2", 1).await;
    assert_eq!(sender.name(), "s2");
}

#[tokio::test]
async fn operations_after_close_fail_with_the_connection_error() {
    let (mut connection, mut peer) = opened_pair(peer_open("peer"), |b| b).await;
    let mut session = begin_session(&mut connection, &mut peer, 0).await;

    // peer closes the connection out of the blue, with an error
    let close = Close {
        error: Some(definitions::Error::new(
            definitions::ConnectionError::ConnectionForced,
            Some("maintenance".to_string()),
        )),
    };
    peer.send_performative(0, &close).await;

    let result = connection.closed().await;
    match result {
        Err(connection::Error::RemoteClosed { error: Some(error) }) => {
            assert_eq!(error.condition.as_str(), "amqp:connection:forced");
        }
        other => panic!("expected the remote close error, got {:?}", other),
    }

    // the session is dead too; new work fails with a connection error
    let attach_result = Sender::attach(&mut session, "s1", "q1").await;
    assert!(attach_result.is_err());

    let end_result = session.end().await;
    assert!(end_result.is_err());
}
