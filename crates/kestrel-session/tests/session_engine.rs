//! End-to-end tests for the session engine over an in-memory transport.
//!
//! Each test wires a session to one end of a [`DuplexTransport`] pair and
//! plays the peer by hand on the other end, so every wire frame the engine
//! produces is observable.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};

use kestrel_json_rpc::{
    JsonRpcFrame, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId, error_codes,
};
use kestrel_protocol::{
    ClientCapabilities, Implementation, InitializeRequest, InitializeResult, ProtocolVersion,
    methods,
};
use kestrel_session::{
    DuplexTransport, HandlerError, HandlerRegistry, RequestOptions, Session, SessionConfig,
    SessionError, SessionState, Transport,
};

/// The hand-driven peer on the far side of the duplex transport
struct Peer {
    transport: Arc<DuplexTransport>,
    inbound: mpsc::Receiver<JsonRpcFrame>,
}

impl Peer {
    async fn send(&self, frame: impl Into<JsonRpcFrame>) {
        self.transport.send(frame.into()).await.expect("peer send failed");
    }

    async fn recv(&mut self) -> JsonRpcFrame {
        self.inbound.recv().await.expect("session closed its transport")
    }

    async fn recv_request(&mut self) -> JsonRpcRequest {
        match self.recv().await {
            JsonRpcFrame::Request(req) => req,
            other => panic!("expected request, got {other:?}"),
        }
    }

    async fn recv_reply(&mut self) -> JsonRpcMessage {
        match self.recv().await {
            JsonRpcFrame::Reply(reply) => reply,
            other => panic!("expected reply, got {other:?}"),
        }
    }

    /// Run the full handshake from the client side
    async fn initialize(&mut self) {
        let hello = InitializeRequest::new(
            ProtocolVersion::CURRENT,
            ClientCapabilities::default(),
            Implementation::new("test-client", "0.1.0"),
        );
        self.send(JsonRpcRequest::new(
            RequestId::from("client-init"),
            methods::INITIALIZE,
            Some(serde_json::to_value(&hello).unwrap()),
        ))
        .await;

        let reply = self.recv_reply().await;
        assert!(!reply.is_error(), "initialize refused: {reply:?}");
        let result: InitializeResult =
            serde_json::from_value(reply.into_result().unwrap()).unwrap();
        assert_eq!(result.protocol_version, ProtocolVersion::CURRENT.as_str());

        self.send(JsonRpcNotification::new_no_params(methods::INITIALIZED))
            .await;
    }
}

fn echo_registry() -> HandlerRegistry {
    HandlerRegistry::new().request_fn("echo", |_exchange, params| async move {
        Ok(params.unwrap_or(Value::Null))
    })
}

fn start_session(handlers: HandlerRegistry, config: SessionConfig) -> (Session, Peer) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let ((transport, inbound), (peer_transport, peer_inbound)) = DuplexTransport::pair(64);
    let session = Session::new("test-session", config, transport, Arc::new(handlers));

    let run = session.clone();
    tokio::spawn(async move { run.run(inbound).await });

    (
        session,
        Peer {
            transport: peer_transport,
            inbound: peer_inbound,
        },
    )
}

#[tokio::test]
async fn handshake_then_request_dispatch() {
    let (session, mut peer) = start_session(echo_registry(), SessionConfig::default());
    assert_eq!(session.state(), SessionState::Uninitialized);

    peer.initialize().await;

    peer.send(JsonRpcRequest::new(
        RequestId::from("c-1"),
        "echo",
        Some(json!({"hello": 1})),
    ))
    .await;

    let reply = peer.recv_reply().await;
    assert_eq!(reply.id(), Some(&RequestId::from("c-1")));
    assert_eq!(reply.into_result().unwrap(), json!({"hello": 1}));

    assert_eq!(session.state(), SessionState::Initialized);
    let client = session.client_handshake().unwrap();
    assert_eq!(client.client_info.name, "test-client");
}

#[tokio::test(start_paused = true)]
async fn request_before_handshake_is_deferred() {
    let (_session, mut peer) = start_session(echo_registry(), SessionConfig::default());

    // Application request arrives first; nothing may come back yet
    peer.send(JsonRpcRequest::new(
        RequestId::from("early"),
        "echo",
        Some(json!("queued")),
    ))
    .await;
    assert!(
        tokio::time::timeout(Duration::from_millis(50), peer.recv())
            .await
            .is_err(),
        "request was dispatched before the handshake completed"
    );

    peer.initialize().await;

    // Handshake completion releases the deferred dispatch
    let reply = peer.recv_reply().await;
    assert_eq!(reply.id(), Some(&RequestId::from("early")));
    assert_eq!(reply.into_result().unwrap(), json!("queued"));
}

#[tokio::test]
async fn unknown_method_yields_method_not_found() {
    let (_session, mut peer) = start_session(echo_registry(), SessionConfig::default());
    peer.initialize().await;

    peer.send(JsonRpcRequest::new_no_params(
        RequestId::from("7"),
        "does/not/exist",
    ))
    .await;

    match peer.recv_reply().await {
        JsonRpcMessage::Error(err) => {
            assert_eq!(err.id, Some(RequestId::from("7")));
            assert_eq!(err.error.code, error_codes::METHOD_NOT_FOUND);
        }
        other => panic!("expected error reply, got {other:?}"),
    }
}

#[tokio::test]
async fn handler_error_becomes_internal_error_reply() {
    let registry = echo_registry().request_fn("explode", |_exchange, _params| async move {
        Err::<Value, _>(HandlerError::Internal("kaboom".to_string()))
    });
    let (_session, mut peer) = start_session(registry, SessionConfig::default());
    peer.initialize().await;

    peer.send(JsonRpcRequest::new_no_params(
        RequestId::from("c-2"),
        "explode",
    ))
    .await;

    match peer.recv_reply().await {
        JsonRpcMessage::Error(err) => {
            assert_eq!(err.id, Some(RequestId::from("c-2")));
            assert_eq!(err.error.code, error_codes::INTERNAL_ERROR);
            assert_eq!(err.error.message, "kaboom");
        }
        other => panic!("expected error reply, got {other:?}"),
    }

    // The session survives the fault
    peer.send(JsonRpcRequest::new(
        RequestId::from("c-3"),
        "echo",
        Some(json!("still alive")),
    ))
    .await;
    assert_eq!(
        peer.recv_reply().await.into_result().unwrap(),
        json!("still alive")
    );
}

#[tokio::test]
async fn handler_panic_becomes_internal_error_reply() {
    let registry = echo_registry()
        .request_fn("panic", |_exchange, _params| async move { panic!("handler bug") });
    let (_session, mut peer) = start_session(registry, SessionConfig::default());
    peer.initialize().await;

    peer.send(JsonRpcRequest::new_no_params(RequestId::from("c-4"), "panic"))
        .await;

    match peer.recv_reply().await {
        JsonRpcMessage::Error(err) => {
            assert_eq!(err.id, Some(RequestId::from("c-4")));
            assert_eq!(err.error.code, error_codes::INTERNAL_ERROR);
        }
        other => panic!("expected error reply, got {other:?}"),
    }
}

#[tokio::test]
async fn out_of_order_replies_reach_their_callers() {
    let (session, mut peer) = start_session(HandlerRegistry::new(), SessionConfig::default());

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.send_request("first", None).await }
    });
    let second = tokio::spawn({
        let session = session.clone();
        async move { session.send_request("second", None).await }
    });

    // Collect both requests, then answer them newest-first
    let req_a = peer.recv_request().await;
    let req_b = peer.recv_request().await;
    for req in [req_b, req_a] {
        peer.send(JsonRpcMessage::success(
            req.id.clone(),
            json!({"answered": req.method}),
        ))
        .await;
    }

    assert_eq!(
        first.await.unwrap().unwrap(),
        json!({"answered": "first"})
    );
    assert_eq!(
        second.await.unwrap().unwrap(),
        json!({"answered": "second"})
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_abandons_id_and_late_reply_is_orphan() {
    let (session, mut peer) = start_session(HandlerRegistry::new(), SessionConfig::default());

    let caller = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .send_request_with(
                    "slow",
                    None,
                    RequestOptions::default().timeout(Duration::from_secs(1)),
                )
                .await
        }
    });

    let abandoned_id = peer.recv_request().await.id;

    // No reply: the bounded wait elapses
    let result = caller.await.unwrap();
    assert!(matches!(result, Err(SessionError::Timeout(_))));
    assert_eq!(session.pending_count(), 0);

    // The late reply is an orphan: discarded, no state change, no crash
    peer.send(JsonRpcMessage::success(abandoned_id, json!("too late")))
        .await;

    // Subsequent traffic is unaffected
    let caller = tokio::spawn({
        let session = session.clone();
        async move { session.send_request("fresh", None).await }
    });
    let req = peer.recv_request().await;
    peer.send(JsonRpcMessage::success(req.id, json!("on time"))).await;
    assert_eq!(caller.await.unwrap().unwrap(), json!("on time"));
}

#[tokio::test]
async fn fire_and_forget_leaves_no_correlation_state() {
    let (session, mut peer) = start_session(HandlerRegistry::new(), SessionConfig::default());

    // Completes without any reply ever being sent
    let result = session
        .send_request_with(
            "sampling/createMessage",
            Some(json!({"prompt": "hi"})),
            RequestOptions::default().fire_and_forget(),
        )
        .await
        .unwrap();
    assert_eq!(result, Value::Null);
    assert_eq!(session.pending_count(), 0);

    let req = peer.recv_request().await;
    assert!(req.id.is_empty());
    assert!(!req.expects_reply());
}

#[tokio::test]
async fn forced_close_fails_all_pending_callers() {
    let (session, mut peer) = start_session(HandlerRegistry::new(), SessionConfig::default());

    let callers: Vec<_> = (0..3)
        .map(|n| {
            tokio::spawn({
                let session = session.clone();
                async move { session.send_request(&format!("inflight/{n}"), None).await }
            })
        })
        .collect();

    // All three are on the wire and registered before the close
    for _ in 0..3 {
        peer.recv_request().await;
    }
    assert_eq!(session.pending_count(), 3);

    session.close().await;

    for caller in callers {
        assert!(matches!(
            caller.await.unwrap(),
            Err(SessionError::Closed)
        ));
    }
    assert_eq!(session.pending_count(), 0);

    // New work is refused outright
    assert!(matches!(
        session.send_request("after", None).await,
        Err(SessionError::Closed)
    ));
}

#[tokio::test]
async fn ping_is_answered_in_any_state() {
    let (session, mut peer) = start_session(HandlerRegistry::new(), SessionConfig::default());

    // Inbound ping works before the handshake
    peer.send(JsonRpcRequest::new_no_params(RequestId::from("p-1"), methods::PING))
        .await;
    let reply = peer.recv_reply().await;
    assert_eq!(reply.id(), Some(&RequestId::from("p-1")));
    assert_eq!(reply.into_result().unwrap(), json!({}));

    // Outbound ping resolves once the peer answers
    let pinger = tokio::spawn({
        let session = session.clone();
        async move { session.ping().await }
    });
    let req = peer.recv_request().await;
    assert_eq!(req.method, methods::PING);
    peer.send(JsonRpcMessage::success(req.id, json!({}))).await;
    pinger.await.unwrap().unwrap();
}

#[tokio::test]
async fn second_initialize_is_rejected() {
    let (session, mut peer) = start_session(echo_registry(), SessionConfig::default());
    peer.initialize().await;

    let hello = InitializeRequest::new(
        ProtocolVersion::CURRENT,
        ClientCapabilities::default(),
        Implementation::new("imposter", "9.9.9"),
    );
    peer.send(JsonRpcRequest::new(
        RequestId::from("dup-init"),
        methods::INITIALIZE,
        Some(serde_json::to_value(&hello).unwrap()),
    ))
    .await;

    match peer.recv_reply().await {
        JsonRpcMessage::Error(err) => {
            assert_eq!(err.id, Some(RequestId::from("dup-init")));
            assert_eq!(err.error.code, error_codes::INVALID_REQUEST);
        }
        other => panic!("expected error reply, got {other:?}"),
    }

    // The original handshake data is untouched
    assert_eq!(
        session.client_handshake().unwrap().client_info.name,
        "test-client"
    );
    assert_eq!(session.state(), SessionState::Initialized);
}

#[tokio::test]
async fn duplicate_inflight_inbound_id_is_rejected() {
    let gate = Arc::new(Notify::new());
    let registry = {
        let gate = gate.clone();
        HandlerRegistry::new().request_fn("block", move |_exchange, _params| {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok(json!("released"))
            }
        })
    };
    let (_session, mut peer) = start_session(registry, SessionConfig::default());
    peer.initialize().await;

    peer.send(JsonRpcRequest::new_no_params(RequestId::from("X"), "block"))
        .await;
    peer.send(JsonRpcRequest::new_no_params(RequestId::from("X"), "block"))
        .await;

    // The reuse is refused while the first call still owns the id; the
    // error deliberately carries no id
    match peer.recv_reply().await {
        JsonRpcMessage::Error(err) => {
            assert_eq!(err.id, None);
            assert_eq!(err.error.code, error_codes::INVALID_REQUEST);
        }
        other => panic!("expected error reply, got {other:?}"),
    }

    // The first call completes normally once released (notify_one stores a
    // permit, so the release cannot be lost to scheduling)
    gate.notify_one();
    let reply = peer.recv_reply().await;
    assert_eq!(reply.id(), Some(&RequestId::from("X")));
    assert_eq!(reply.into_result().unwrap(), json!("released"));
}

#[tokio::test]
async fn graceful_close_drains_inflight_requests() {
    let (session, mut peer) = start_session(HandlerRegistry::new(), SessionConfig::default());

    let caller = tokio::spawn({
        let session = session.clone();
        async move { session.send_request("slow", None).await }
    });
    let req = peer.recv_request().await;

    let closer = tokio::spawn({
        let session = session.clone();
        async move { session.close_gracefully().await }
    });

    // Closing refuses new outbound work immediately
    while !session.is_closing() {
        tokio::task::yield_now().await;
    }
    assert!(matches!(
        session.send_notification("late", None).await,
        Err(SessionError::Closed)
    ));

    // The in-flight request still gets its answer
    peer.send(JsonRpcMessage::success(req.id, json!("drained"))).await;
    assert_eq!(caller.await.unwrap().unwrap(), json!("drained"));
    closer.await.unwrap();
}

#[tokio::test]
async fn stray_notifications_are_swallowed() {
    let registry = echo_registry().notification_fn("note/bad", |_exchange, _params| async move {
        Err(HandlerError::Internal("notification fault".to_string()))
    });
    let (_session, mut peer) = start_session(registry, SessionConfig::default());
    peer.initialize().await;

    // Unregistered notification: logged, dropped
    peer.send(JsonRpcNotification::new_no_params("note/unknown")).await;
    // Failing notification handler: logged, swallowed, never on the wire
    peer.send(JsonRpcNotification::new_no_params("note/bad")).await;

    // The only frame the peer ever sees is the echo reply
    peer.send(JsonRpcRequest::new(
        RequestId::from("c-5"),
        "echo",
        Some(json!("quiet")),
    ))
    .await;
    let reply = peer.recv_reply().await;
    assert_eq!(reply.id(), Some(&RequestId::from("c-5")));
}

#[tokio::test]
async fn initialized_before_initialize_is_ignored() {
    let (session, mut peer) = start_session(echo_registry(), SessionConfig::default());

    peer.send(JsonRpcNotification::new_no_params(methods::INITIALIZED))
        .await;
    tokio::task::yield_now().await;
    assert_eq!(session.state(), SessionState::Uninitialized);

    // A proper handshake still works afterwards
    peer.initialize().await;
    tokio::task::yield_now().await;
    assert_eq!(session.state(), SessionState::Initialized);
}

#[tokio::test]
async fn handlers_call_back_through_the_exchange() {
    let registry = HandlerRegistry::new().request_fn("relay", |exchange, _params| async move {
        assert_eq!(exchange.client_info().name, "test-client");
        let confirmation = exchange.send_request("client/confirm", None).await?;
        Ok(json!({"relayed": confirmation}))
    });
    let (_session, mut peer) = start_session(registry, SessionConfig::default());
    peer.initialize().await;

    peer.send(JsonRpcRequest::new_no_params(RequestId::from("c-9"), "relay"))
        .await;

    // The handler's own outbound request comes back to the peer first
    let callback = peer.recv_request().await;
    assert_eq!(callback.method, "client/confirm");
    assert_eq!(callback.id, RequestId::from("test-session-0"));
    peer.send(JsonRpcMessage::success(callback.id, json!("confirmed")))
        .await;

    let reply = peer.recv_reply().await;
    assert_eq!(reply.id(), Some(&RequestId::from("c-9")));
    assert_eq!(
        reply.into_result().unwrap(),
        json!({"relayed": "confirmed"})
    );
}
