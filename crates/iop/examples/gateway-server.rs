//! Toy trading gateway: accepts any user, answers QRY_POSITION with a
//! multi-part reply and pushes FLOW_DEPTH ticks to logged-in sessions.
//!
//! Run with:
//!   cargo run --example gateway-server -- 127.0.0.1:7001
//!
//! In another terminal:
//!   cargo run --example gateway-client -- 127.0.0.1:7001

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use iop::session::{
    AdaptorResult, Envelope, IopServer, LoginManager, MessageType, Payload, RequestContext,
    ServerMessageAdaptor, Session,
};
use serde_json::json;
use uuid::Uuid;

struct AnyUser;

impl LoginManager for AnyUser {
    fn login(
        &self,
        session: &Arc<Session>,
        _request: &Envelope,
        payload: Payload,
    ) -> AdaptorResult<bool> {
        let user = payload.str_field("UserID").unwrap_or_default();
        eprintln!("session {} login as {user:?}", session.id());
        Ok(!user.is_empty())
    }
}

struct Desk;

impl ServerMessageAdaptor for Desk {
    fn qry_position(
        &self,
        session: &Arc<Session>,
        _payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        let positions = [("c2201", 12), ("m2205", -3), ("rb2210", 40)];
        let total = positions.len() as i32;
        for (part, (instrument, volume)) in (1..).zip(positions) {
            let row = json!({ "InstrumentID": instrument, "Volume": volume });
            let reply = Envelope::response_from_payload(ctx.request_id, MessageType::RspQryPosition, &row)?
                .with_part(part, total);
            session.send_response(&reply)?;
        }
        Ok(())
    }

    fn sub_market_data(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        let reply = Envelope::response(ctx.request_id, MessageType::RspSubMd, payload.as_value().to_string());
        session.send_response(&reply)?;
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:7001".to_string());
    let server = Arc::new(
        IopServer::bind(addr.as_str())?
            .with_login_manager(Arc::new(AnyUser))
            .with_message_adaptor(Arc::new(Desk)),
    );
    eprintln!("Listening on {}", server.local_addr());

    let pusher = Arc::clone(&server);
    thread::spawn(move || {
        let mut price = 4100;
        loop {
            thread::sleep(Duration::from_secs(1));
            price += 1;
            let tick = json!({ "InstrumentID": "c2201", "LastPrice": price }).to_string();
            for session in pusher.sessions().iter().filter(|s| s.is_authenticated()) {
                let push = Envelope::response(Uuid::new_v4(), MessageType::FlowDepth, tick.clone());
                if let Err(err) = session.send_response(&push) {
                    eprintln!("push to session {} failed: {err}", session.id());
                }
            }
        }
    });

    server.serve()?;
    Ok(())
}
