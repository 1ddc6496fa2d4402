//! Application callbacks the dispatcher routes to.
//!
//! Every method has a no-op default, so an application implements only the
//! messages it handles. Callbacks run inline on the connection's reader
//! thread: a slow callback stalls further reads on that connection only.

use std::sync::Arc;

use uuid::Uuid;

use crate::envelope::{Envelope, Payload};
use crate::error::{AdaptorResult, SessionError};
use crate::session::Session;

/// Correlation data of a REQUEST frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub current_count: i32,
    pub total_count: i32,
}

/// Correlation data of a RESPONSE frame (or a LOGIN reply).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseContext {
    pub request_id: Uuid,
    pub response_id: Option<Uuid>,
    pub current_count: i32,
    pub total_count: i32,
}

impl RequestContext {
    pub(crate) fn of(envelope: &Envelope) -> Self {
        Self {
            request_id: envelope.request_id(),
            current_count: envelope.current_count(),
            total_count: envelope.total_count(),
        }
    }
}

impl ResponseContext {
    pub(crate) fn of(envelope: &Envelope) -> Self {
        Self {
            request_id: envelope.request_id(),
            response_id: envelope.response_id(),
            current_count: envelope.current_count(),
            total_count: envelope.total_count(),
        }
    }
}

/// Connection lifecycle notification.
#[derive(Debug, Clone, Copy)]
pub enum SessionEvent<'a> {
    /// Session object built for a new transport.
    Created,
    /// Reader started; frames may now arrive.
    Opened,
    /// Transport closed; no further events follow.
    Closed,
    /// No input for the configured idle timeout. The connection stays open.
    Idle,
    /// A frame or the transport failed.
    Error(&'a SessionError),
    /// The peer closed its sending side.
    InputClosed,
}

impl SessionEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Created => "created",
            SessionEvent::Opened => "opened",
            SessionEvent::Closed => "closed",
            SessionEvent::Idle => "idle",
            SessionEvent::Error(_) => "error",
            SessionEvent::InputClosed => "input_closed",
        }
    }
}

/// Receives lifecycle notifications. Policy (closing idle sessions, say) lives here.
pub trait SessionAdaptor: Send + Sync {
    fn event(&self, session: &Arc<Session>, event: SessionEvent<'_>);
}

/// Decides whether a REQ_LOGIN is accepted.
pub trait LoginManager: Send + Sync {
    /// Return `true` to authenticate the session.
    fn login(&self, session: &Arc<Session>, request: &Envelope, payload: Payload)
        -> AdaptorResult<bool>;
}

/// Server-side business requests.
#[allow(unused_variables)]
pub trait ServerMessageAdaptor: Send + Sync {
    fn sub_market_data(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        Ok(())
    }

    fn req_order_insert(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        Ok(())
    }

    fn req_order_action(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        Ok(())
    }

    fn qry_account(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        Ok(())
    }

    fn qry_order(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        Ok(())
    }

    fn qry_position(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        Ok(())
    }

    fn qry_order_exec(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        Ok(())
    }

    fn qry_action_exec(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        Ok(())
    }

    fn qry_user_exec(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        Ok(())
    }
}

/// Client-side replies, pushes and heartbeats.
#[allow(unused_variables)]
pub trait ClientMessageAdaptor: Send + Sync {
    /// The server's answer to REQ_LOGIN. The session flag is already updated.
    fn rsp_req_login(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        Ok(())
    }

    fn rsp_sub_market_data(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        Ok(())
    }

    fn rsp_req_order_insert(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        Ok(())
    }

    fn rsp_req_order_action(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        Ok(())
    }

    fn rsp_qry_account(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        Ok(())
    }

    fn rsp_qry_order(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        Ok(())
    }

    fn rsp_qry_position(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        Ok(())
    }

    fn rsp_qry_order_exec(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        Ok(())
    }

    fn rsp_qry_action_exec(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        Ok(())
    }

    fn rsp_qry_user_exec(&self, payload: Payload, ctx: ResponseContext) -> AdaptorResult {
        Ok(())
    }

    /// FLOW_DEPTH push.
    fn depth_market_data(&self, payload: Payload) -> AdaptorResult {
        Ok(())
    }

    /// FLOW_CANDLE push.
    fn candle(&self, payload: Payload) -> AdaptorResult {
        Ok(())
    }

    /// The server echoed a heartbeat.
    fn heartbeat(&self, request_id: Uuid) -> AdaptorResult {
        Ok(())
    }
}
