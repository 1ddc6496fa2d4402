use std::sync::Arc;

use iop_frame::{Frame, MetaType};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adaptor::{
    ClientMessageAdaptor, LoginManager, RequestContext, ResponseContext, ServerMessageAdaptor,
    SessionAdaptor, SessionEvent,
};
use crate::envelope::{Envelope, MessageType};
use crate::error::{ProtocolError, Result, SessionError};
use crate::session::Session;

/// Which end of the connection a dispatcher serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Receives REQUEST and LOGIN, echoes HEARTBEAT.
    Server,
    /// Receives RESPONSE and LOGIN replies.
    Client,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }
}

/// Payload of the LOGIN frame a server sends back after REQ_LOGIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginReply {
    #[serde(rename = "Accepted")]
    pub accepted: bool,
}

/// Routes decoded frames of one connection to the registered adaptors.
///
/// Holds no per-connection state; the session passed to [`dispatch`]
/// carries it. Adaptors that are not registered simply receive nothing.
///
/// [`dispatch`]: Dispatcher::dispatch
#[derive(Clone)]
pub struct Dispatcher {
    role: Role,
    session_adaptor: Option<Arc<dyn SessionAdaptor>>,
    server_adaptor: Option<Arc<dyn ServerMessageAdaptor>>,
    client_adaptor: Option<Arc<dyn ClientMessageAdaptor>>,
    login_manager: Option<Arc<dyn LoginManager>>,
}

impl Dispatcher {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            session_adaptor: None,
            server_adaptor: None,
            client_adaptor: None,
            login_manager: None,
        }
    }

    pub fn server() -> Self {
        Self::new(Role::Server)
    }

    pub fn client() -> Self {
        Self::new(Role::Client)
    }

    pub fn with_session_adaptor(mut self, adaptor: Arc<dyn SessionAdaptor>) -> Self {
        self.session_adaptor = Some(adaptor);
        self
    }

    pub fn with_server_adaptor(mut self, adaptor: Arc<dyn ServerMessageAdaptor>) -> Self {
        self.server_adaptor = Some(adaptor);
        self
    }

    pub fn with_client_adaptor(mut self, adaptor: Arc<dyn ClientMessageAdaptor>) -> Self {
        self.client_adaptor = Some(adaptor);
        self
    }

    /// Register the login policy. Without one every login is rejected.
    pub fn with_login_manager(mut self, manager: Arc<dyn LoginManager>) -> Self {
        self.login_manager = Some(manager);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Forward a lifecycle event to the session adaptor.
    pub fn notify(&self, session: &Arc<Session>, event: SessionEvent<'_>) {
        debug!(session_id = session.id(), event = event.name(), "session event");
        if let Some(adaptor) = &self.session_adaptor {
            adaptor.event(session, event);
        }
    }

    /// Handle one decoded frame.
    ///
    /// Errors are scoped to this frame; the caller decides whether the
    /// connection survives them.
    pub fn dispatch(&self, session: &Arc<Session>, frame: &Frame) -> Result<()> {
        let meta = frame
            .meta()
            .ok_or(ProtocolError::UnknownMetaType(frame.meta_type))?;
        let envelope = Envelope::from_bytes(&frame.body)?;

        match meta {
            MetaType::Login => self.handle_login(session, &envelope),
            MetaType::Heartbeat => self.handle_heartbeat(session, &envelope),
            MetaType::Request => self.handle_request(session, &envelope),
            MetaType::Response => self.handle_response(session, &envelope),
        }
    }

    fn handle_login(&self, session: &Arc<Session>, envelope: &Envelope) -> Result<()> {
        match self.role {
            Role::Server => {
                expect_type(MetaType::Login, envelope, |ty| ty == MessageType::ReqLogin)?;
                // Every REQ_LOGIN is answered; a failed check answers "rejected".
                let verdict = self.verify_login(session, envelope);
                let accepted = matches!(verdict, Ok(true));
                session.set_authenticated(accepted);
                if accepted {
                    info!(session_id = session.id(), peer = ?session.peer_addr(), "login accepted");
                } else {
                    warn!(session_id = session.id(), peer = ?session.peer_addr(), "login rejected");
                }

                let reply = Envelope::response_from_payload(
                    envelope.request_id(),
                    MessageType::RspReqLogin,
                    &LoginReply { accepted },
                )?;
                session.send_login(&reply)?;
                verdict.map(|_| ())
            }
            Role::Client => {
                expect_type(MetaType::Login, envelope, |ty| ty == MessageType::RspReqLogin)?;
                let payload = envelope.payload()?;
                let reply: LoginReply = payload.decode()?;
                session.set_authenticated(reply.accepted);
                debug!(session_id = session.id(), accepted = reply.accepted, "login reply");

                match &self.client_adaptor {
                    Some(adaptor) => adaptor
                        .rsp_req_login(payload, ResponseContext::of(envelope))
                        .map_err(SessionError::Adaptor),
                    None => Ok(()),
                }
            }
        }
    }

    fn verify_login(&self, session: &Arc<Session>, envelope: &Envelope) -> Result<bool> {
        let payload = envelope.payload()?;
        match &self.login_manager {
            Some(manager) => manager
                .login(session, envelope, payload)
                .map_err(SessionError::Adaptor),
            None => {
                warn!(session_id = session.id(), "no login manager registered, rejecting login");
                Ok(false)
            }
        }
    }

    fn handle_heartbeat(&self, session: &Arc<Session>, envelope: &Envelope) -> Result<()> {
        match self.role {
            Role::Server => session.send_heartbeat(envelope.request_id()),
            // Echoing here as well would bounce heartbeats forever.
            Role::Client => match &self.client_adaptor {
                Some(adaptor) => adaptor
                    .heartbeat(envelope.request_id())
                    .map_err(SessionError::Adaptor),
                None => Ok(()),
            },
        }
    }

    fn handle_request(&self, session: &Arc<Session>, envelope: &Envelope) -> Result<()> {
        if self.role != Role::Server {
            return Err(wrong_direction(MetaType::Request, self.role));
        }
        ensure_authenticated(session, MetaType::Request)?;
        let message_type = expect_type(MetaType::Request, envelope, MessageType::is_request)?;
        envelope.validate_counts()?;
        let payload = envelope.payload()?;
        let ctx = RequestContext::of(envelope);

        let Some(adaptor) = &self.server_adaptor else {
            debug!(session_id = session.id(), message_type = %message_type, "no server adaptor, request dropped");
            return Ok(());
        };

        let routed = match message_type {
            MessageType::SubMd => adaptor.sub_market_data(session, payload, ctx),
            MessageType::ReqOrderInsert => adaptor.req_order_insert(session, payload, ctx),
            MessageType::ReqOrderAction => adaptor.req_order_action(session, payload, ctx),
            MessageType::QryAccount => adaptor.qry_account(session, payload, ctx),
            MessageType::QryOrder => adaptor.qry_order(session, payload, ctx),
            MessageType::QryPosition => adaptor.qry_position(session, payload, ctx),
            MessageType::QryOrderExec => adaptor.qry_order_exec(session, payload, ctx),
            MessageType::QryActionExec => adaptor.qry_action_exec(session, payload, ctx),
            MessageType::QryUserExec => adaptor.qry_user_exec(session, payload, ctx),
            other => return Err(unexpected(MetaType::Request, other)),
        };
        routed.map_err(SessionError::Adaptor)
    }

    fn handle_response(&self, session: &Arc<Session>, envelope: &Envelope) -> Result<()> {
        if self.role != Role::Client {
            return Err(wrong_direction(MetaType::Response, self.role));
        }
        ensure_authenticated(session, MetaType::Response)?;
        let message_type = expect_type(MetaType::Response, envelope, MessageType::is_response)?;
        if !message_type.is_push() {
            envelope.validate_counts()?;
        }
        let payload = envelope.payload()?;
        let ctx = ResponseContext::of(envelope);

        let Some(adaptor) = &self.client_adaptor else {
            debug!(session_id = session.id(), message_type = %message_type, "no client adaptor, response dropped");
            return Ok(());
        };

        let routed = match message_type {
            MessageType::RspSubMd => adaptor.rsp_sub_market_data(payload, ctx),
            MessageType::RspReqOrderInsert => adaptor.rsp_req_order_insert(payload, ctx),
            MessageType::RspReqOrderAction => adaptor.rsp_req_order_action(payload, ctx),
            MessageType::RspQryAccount => adaptor.rsp_qry_account(payload, ctx),
            MessageType::RspQryOrder => adaptor.rsp_qry_order(payload, ctx),
            MessageType::RspQryPosition => adaptor.rsp_qry_position(payload, ctx),
            MessageType::RspQryOrderExec => adaptor.rsp_qry_order_exec(payload, ctx),
            MessageType::RspQryActionExec => adaptor.rsp_qry_action_exec(payload, ctx),
            MessageType::RspQryUserExec => adaptor.rsp_qry_user_exec(payload, ctx),
            MessageType::FlowDepth => adaptor.depth_market_data(payload),
            MessageType::FlowCandle => adaptor.candle(payload),
            other => return Err(unexpected(MetaType::Response, other)),
        };
        routed.map_err(SessionError::Adaptor)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("role", &self.role)
            .field("session_adaptor", &self.session_adaptor.is_some())
            .field("server_adaptor", &self.server_adaptor.is_some())
            .field("client_adaptor", &self.client_adaptor.is_some())
            .field("login_manager", &self.login_manager.is_some())
            .finish()
    }
}

fn ensure_authenticated(session: &Session, meta: MetaType) -> Result<()> {
    if session.is_authenticated() {
        return Ok(());
    }
    warn!(session_id = session.id(), meta_type = meta.name(), "frame before login");
    Err(SessionError::AuthenticationPending {
        session_id: session.id(),
        meta_type: meta.name(),
    })
}

fn expect_type(
    meta: MetaType,
    envelope: &Envelope,
    allowed: impl Fn(MessageType) -> bool,
) -> Result<MessageType> {
    let message_type = envelope
        .message_type()
        .ok_or(ProtocolError::MissingMessageType {
            meta_type: meta.name(),
        })?;
    if !allowed(message_type) {
        return Err(unexpected(meta, message_type));
    }
    Ok(message_type)
}

fn unexpected(meta: MetaType, message_type: MessageType) -> SessionError {
    ProtocolError::UnexpectedMessageType {
        meta_type: meta.name(),
        message_type,
    }
    .into()
}

fn wrong_direction(meta: MetaType, role: Role) -> SessionError {
    ProtocolError::WrongDirection {
        meta_type: meta.name(),
        role: role.name(),
    }
    .into()
}
