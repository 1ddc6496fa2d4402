use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use iop::session::{
    AdaptorResult, ClientMessageAdaptor, MessageType, Payload, ResponseContext, Session,
    SessionAdaptor, SessionEvent,
};
use uuid::Uuid;

use crate::output::MessageRecord;

/// What the client reader thread hands to the command thread.
#[derive(Debug)]
pub enum Incoming {
    Message(MessageRecord),
    Heartbeat(Uuid),
    Closed,
}

/// Client adaptor forwarding everything the server sends to a channel.
pub struct Inbox {
    tx: Sender<Incoming>,
}

impl Inbox {
    pub fn channel() -> (Arc<Self>, Receiver<Incoming>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Self { tx }), rx)
    }

    fn forward(&self, incoming: Incoming) -> AdaptorResult {
        self.tx
            .send(incoming)
            .map_err(|_| "command stopped listening")?;
        Ok(())
    }

    fn response(
        &self,
        message_type: MessageType,
        payload: Payload,
        ctx: ResponseContext,
    ) -> AdaptorResult {
        self.forward(Incoming::Message(MessageRecord {
            event: if message_type == MessageType::RspReqLogin {
                "login"
            } else {
                "response"
            },
            message_type: Some(message_type),
            request_id: ctx.request_id,
            response_id: ctx.response_id,
            current_count: ctx.current_count,
            total_count: ctx.total_count,
            peer: None,
            payload: payload.into_value(),
        }))
    }

    fn push(&self, message_type: MessageType, payload: Payload) -> AdaptorResult {
        self.forward(Incoming::Message(MessageRecord {
            event: "push",
            message_type: Some(message_type),
            request_id: Uuid::nil(),
            response_id: None,
            current_count: 1,
            total_count: 1,
            peer: None,
            payload: payload.into_value(),
        }))
    }
}

impl SessionAdaptor for Inbox {
    fn event(&self, _session: &Arc<Session>, event: SessionEvent<'_>) {
        if let SessionEvent::Closed = event {
            // The receiver may already be gone once the command finished.
            let _ = self.tx.send(Incoming::Closed);
        }
    }
}

impl ClientMessageAdaptor for Inbox {
    fn rsp_req_login(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        self.response(MessageType::RspReqLogin, payload, ctx)
    }

    fn rsp_sub_market_data(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        self.response(MessageType::RspSubMd, payload, ctx)
    }

    fn rsp_req_order_insert(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        self.response(MessageType::RspReqOrderInsert, payload, ctx)
    }

    fn rsp_req_order_action(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        self.response(MessageType::RspReqOrderAction, payload, ctx)
    }

    fn rsp_qry_account(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        self.response(MessageType::RspQryAccount, payload, ctx)
    }

    fn rsp_qry_order(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        self.response(MessageType::RspQryOrder, payload, ctx)
    }

    fn rsp_qry_position(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        self.response(MessageType::RspQryPosition, payload, ctx)
    }

    fn rsp_qry_order_exec(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        self.response(MessageType::RspQryOrderExec, payload, ctx)
    }

    fn rsp_qry_action_exec(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        self.response(MessageType::RspQryActionExec, payload, ctx)
    }

    fn rsp_qry_user_exec(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        self.response(MessageType::RspQryUserExec, payload, ctx)
    }

    fn depth_market_data(&self, payload: Payload) -> AdaptorResult {
        self.push(MessageType::FlowDepth, payload)
    }

    fn candle(&self, payload: Payload) -> AdaptorResult {
        self.push(MessageType::FlowCandle, payload)
    }

    fn heartbeat(&self, request_id: Uuid) -> AdaptorResult {
        self.forward(Incoming::Heartbeat(request_id))
    }
}

/// Outcome of waiting on the inbox with an overall deadline.
pub enum Waited {
    Got(Incoming),
    TimedOut,
    Disconnected,
}

/// Receive the next item, giving up once `deadline` has passed.
pub fn recv_until(rx: &Receiver<Incoming>, deadline: Instant) -> Waited {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining == Duration::ZERO {
        return Waited::TimedOut;
    }
    match rx.recv_timeout(remaining) {
        Ok(incoming) => Waited::Got(incoming),
        Err(RecvTimeoutError::Timeout) => Waited::TimedOut,
        Err(RecvTimeoutError::Disconnected) => Waited::Disconnected,
    }
}
