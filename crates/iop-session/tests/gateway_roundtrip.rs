use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use iop_session::{
    AdaptorResult, ClientConfig, ClientMessageAdaptor, Envelope, IopClient, IopServer,
    LoginManager, MessageType, Payload, RequestContext, ResponseContext, ServerHandle,
    ServerMessageAdaptor, Session, SessionError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Position {
    #[serde(rename = "InstrumentID")]
    instrument_id: String,
    #[serde(rename = "Volume")]
    volume: i64,
}

struct TokenLogin(&'static str);

impl LoginManager for TokenLogin {
    fn login(&self, _session: &Arc<Session>, _request: &Envelope, payload: Payload) -> AdaptorResult<bool> {
        Ok(payload.str_field("Token") == Some(self.0))
    }
}

/// Answers QRY_POSITION with one part per position, then pushes a depth tick.
struct PositionDesk;

impl ServerMessageAdaptor for PositionDesk {
    fn qry_position(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        let instrument = payload.str_field("InstrumentID").unwrap_or_default().to_string();
        let total = 3;
        for part in 1..=total {
            let position = Position {
                instrument_id: instrument.clone(),
                volume: i64::from(part) * 10,
            };
            let reply = Envelope::response_from_payload(
                ctx.request_id,
                MessageType::RspQryPosition,
                &position,
            )?
            .with_part(part, total);
            session.send_response(&reply)?;
        }

        let tick = Envelope::response(Uuid::new_v4(), MessageType::FlowDepth, r#"{"LastPrice":4100}"#);
        session.send_response(&tick)?;
        Ok(())
    }
}

#[derive(Debug)]
enum Seen {
    Login(bool, ResponseContext),
    Position(Position, ResponseContext),
    Depth(Payload),
    Heartbeat(Uuid),
}

struct Collector(Mutex<Sender<Seen>>);

impl Collector {
    fn new() -> (Arc<Self>, Receiver<Seen>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Self(Mutex::new(tx))), rx)
    }

    fn push(&self, seen: Seen) -> AdaptorResult {
        self.0.lock().unwrap().send(seen)?;
        Ok(())
    }
}

impl ClientMessageAdaptor for Collector {
    fn rsp_req_login(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        let accepted = payload.as_value()["Accepted"].as_bool().unwrap_or(false);
        self.push(Seen::Login(accepted, ctx))
    }

    fn rsp_qry_position(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        self.push(Seen::Position(payload.decode()?, ctx))
    }

    fn depth_market_data(&self, payload: Payload) -> AdaptorResult {
        self.push(Seen::Depth(payload))
    }

    fn heartbeat(&self, request_id: Uuid) -> AdaptorResult {
        self.push(Seen::Heartbeat(request_id))
    }
}

fn start_server() -> (ServerHandle, std::net::SocketAddr, thread::JoinHandle<()>) {
    let server = IopServer::bind("127.0.0.1:0")
        .unwrap()
        .with_login_manager(Arc::new(TokenLogin("s3cret")))
        .with_message_adaptor(Arc::new(PositionDesk));
    let handle = server.handle();
    let addr = server.local_addr();
    let join = thread::spawn(move || server.serve().unwrap());
    (handle, addr, join)
}

#[test]
fn login_query_multi_part_reply_and_push() {
    let (handle, addr, join) = start_server();
    let (collector, seen) = Collector::new();
    let client = IopClient::new().with_message_adaptor(collector);
    let conn = client.connect(addr).unwrap();

    let login_id = conn.login(&serde_json::json!({ "UserID": "trader", "Token": "s3cret" })).unwrap();
    match seen.recv_timeout(WAIT).unwrap() {
        Seen::Login(accepted, ctx) => {
            assert!(accepted);
            assert_eq!(ctx.request_id, login_id);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(conn.session().is_authenticated());

    let request_id = conn
        .request(
            MessageType::QryPosition,
            &serde_json::json!({ "InstrumentID": "c2201" }),
        )
        .unwrap();

    for part in 1..=3 {
        match seen.recv_timeout(WAIT).unwrap() {
            Seen::Position(position, ctx) => {
                assert_eq!(position.instrument_id, "c2201");
                assert_eq!(position.volume, i64::from(part) * 10);
                assert_eq!(ctx.request_id, request_id);
                assert_eq!((ctx.current_count, ctx.total_count), (part, 3));
                assert!(ctx.response_id.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    match seen.recv_timeout(WAIT).unwrap() {
        Seen::Depth(payload) => assert_eq!(payload.as_value()["LastPrice"], 4100),
        other => panic!("unexpected {other:?}"),
    }

    let hb = conn.heartbeat().unwrap();
    match seen.recv_timeout(WAIT).unwrap() {
        Seen::Heartbeat(id) => assert_eq!(id, hb),
        other => panic!("unexpected {other:?}"),
    }

    conn.close().unwrap();
    handle.shutdown();
    join.join().unwrap();
}

#[test]
fn wrong_token_keeps_requests_gated() {
    let (handle, addr, join) = start_server();
    let (collector, seen) = Collector::new();
    let conn = IopClient::new()
        .with_message_adaptor(collector)
        .connect(addr)
        .unwrap();

    conn.login(&serde_json::json!({ "UserID": "trader", "Token": "guess" })).unwrap();
    match seen.recv_timeout(WAIT).unwrap() {
        Seen::Login(accepted, _) => assert!(!accepted),
        other => panic!("unexpected {other:?}"),
    }
    assert!(!conn.session().is_authenticated());

    conn.request(MessageType::QryPosition, &serde_json::json!({ "InstrumentID": "c2201" }))
        .unwrap();
    // The server rejects the request; a heartbeat still round-trips.
    let hb = conn.heartbeat().unwrap();
    match seen.recv_timeout(WAIT).unwrap() {
        Seen::Heartbeat(id) => assert_eq!(id, hb),
        other => panic!("request leaked past the login gate: {other:?}"),
    }

    drop(conn);
    handle.shutdown();
    join.join().unwrap();
}

#[test]
fn refused_connect_builds_no_session() {
    let server = IopServer::bind("127.0.0.1:0").unwrap();
    let addr = server.local_addr();
    drop(server);

    let client = IopClient::new().with_config(ClientConfig {
        connect_timeout: Duration::from_millis(500),
        ..ClientConfig::default()
    });
    let err = client.connect(addr).unwrap_err();
    assert!(matches!(err, SessionError::Transport(_)));
}

#[test]
fn closed_session_rejects_sends() {
    let (handle, addr, join) = start_server();
    let conn = IopClient::new().connect(addr).unwrap();
    let session = Arc::clone(conn.session());

    conn.close().unwrap();
    assert!(!session.is_connected());
    assert!(matches!(
        session.send_heartbeat(Uuid::new_v4()).unwrap_err(),
        SessionError::InvalidState(_)
    ));

    handle.shutdown();
    join.join().unwrap();
}
