//! Logs in to a gateway, queries positions and prints a few market data pushes.
//!
//! Run `gateway-server` first, then:
//!   cargo run --example gateway-client -- 127.0.0.1:7001

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use iop::session::{
    AdaptorResult, ClientMessageAdaptor, IopClient, MessageType, Payload, ResponseContext,
};
use serde_json::json;

struct Printer;

impl ClientMessageAdaptor for Printer {
    fn rsp_req_login(&self, payload: Payload, _ctx: ResponseContext) -> AdaptorResult {
        println!("login: {}", payload.as_value());
        Ok(())
    }

    fn rsp_sub_market_data(&self, payload: Payload, _ctx: ResponseContext) -> AdaptorResult {
        println!("subscribed: {}", payload.as_value());
        Ok(())
    }

    fn rsp_qry_position(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        println!(
            "position {}/{}: {}",
            ctx.current_count,
            ctx.total_count,
            payload.as_value()
        );
        Ok(())
    }

    fn depth_market_data(&self, payload: Payload) -> AdaptorResult {
        println!("depth: {}", payload.as_value());
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:7001".to_string());
    let conn = IopClient::new()
        .with_message_adaptor(Arc::new(Printer))
        .connect(addr.as_str())?;

    conn.login(&json!({ "UserID": "demo" }))?;
    // Requests sent before the login reply would be rejected by the server.
    let deadline = Instant::now() + Duration::from_secs(5);
    while !conn.session().is_authenticated() {
        if Instant::now() >= deadline {
            return Err("login was not accepted".into());
        }
        thread::sleep(Duration::from_millis(10));
    }

    conn.request(MessageType::QryPosition, &json!({}))?;
    conn.request(MessageType::SubMd, &json!({ "InstrumentID": ["c2201"] }))?;
    conn.heartbeat()?;

    thread::sleep(Duration::from_secs(3));
    conn.close()?;
    Ok(())
}
