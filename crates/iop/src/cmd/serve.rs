use std::sync::Arc;

use iop::session::{
    AdaptorResult, Envelope, IopServer, LoginManager, MessageType, Payload, RequestContext,
    ServerConfig, ServerHandle, ServerMessageAdaptor, Session, SessionAdaptor, SessionEvent,
};
use tracing::{info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, MessageRecord, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let desk = Arc::new(EchoDesk {
        token: args.token,
        close_idle: args.close_idle,
        format,
    });

    let server = IopServer::bind(args.addr.as_str())
        .map_err(|err| session_error("bind failed", err))?
        .with_config(ServerConfig {
            idle_timeout: args.idle_timeout,
            ..ServerConfig::default()
        })
        .with_login_manager(desk.clone())
        .with_message_adaptor(desk.clone())
        .with_session_adaptor(desk);

    install_ctrlc_handler(server.handle())?;
    info!(addr = %server.local_addr(), "serving; Ctrl-C to stop");

    server
        .serve()
        .map_err(|err| session_error("serve failed", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(handle: ServerHandle) -> CliResult<()> {
    ctrlc::set_handler(move || handle.shutdown())
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

/// Test gateway: token-or-user login, single-part echo of every request.
struct EchoDesk {
    token: Option<String>,
    close_idle: bool,
    format: OutputFormat,
}

impl EchoDesk {
    fn accepts(&self, payload: &Payload) -> bool {
        let has_user = payload.str_field("UserID").is_some_and(|user| !user.is_empty());
        match &self.token {
            Some(token) => has_user && payload.str_field("Token") == Some(token.as_str()),
            None => has_user,
        }
    }

    fn echo(
        &self,
        session: &Arc<Session>,
        request_type: MessageType,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        print_message(
            &MessageRecord {
                event: "request",
                message_type: Some(request_type),
                request_id: ctx.request_id,
                response_id: None,
                current_count: ctx.current_count,
                total_count: ctx.total_count,
                peer: session.peer_addr(),
                payload: payload.as_value().clone(),
            },
            self.format,
        );

        let Some(reply_type) = request_type.response_type() else {
            return Ok(());
        };
        let reply = Envelope::response(ctx.request_id, reply_type, payload.as_value().to_string());
        session.send_response(&reply)?;
        Ok(())
    }
}

impl LoginManager for EchoDesk {
    fn login(
        &self,
        session: &Arc<Session>,
        request: &Envelope,
        payload: Payload,
    ) -> AdaptorResult<bool> {
        let accepted = self.accepts(&payload);
        info!(
            session_id = session.id(),
            request_id = %request.request_id(),
            user = payload.str_field("UserID").unwrap_or_default(),
            accepted,
            "login"
        );
        Ok(accepted)
    }
}

impl ServerMessageAdaptor for EchoDesk {
    fn sub_market_data(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        self.echo(session, MessageType::SubMd, payload, ctx)
    }

    fn req_order_insert(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        self.echo(session, MessageType::ReqOrderInsert, payload, ctx)
    }

    fn req_order_action(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        self.echo(session, MessageType::ReqOrderAction, payload, ctx)
    }

    fn qry_account(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        self.echo(session, MessageType::QryAccount, payload, ctx)
    }

    fn qry_order(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        self.echo(session, MessageType::QryOrder, payload, ctx)
    }

    fn qry_position(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        self.echo(session, MessageType::QryPosition, payload, ctx)
    }

    fn qry_order_exec(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        self.echo(session, MessageType::QryOrderExec, payload, ctx)
    }

    fn qry_action_exec(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        self.echo(session, MessageType::QryActionExec, payload, ctx)
    }

    fn qry_user_exec(
        &self,
        session: &Arc<Session>,
        payload: Payload,
        ctx: RequestContext,
    ) -> AdaptorResult {
        self.echo(session, MessageType::QryUserExec, payload, ctx)
    }
}

impl SessionAdaptor for EchoDesk {
    fn event(&self, session: &Arc<Session>, event: SessionEvent<'_>) {
        match event {
            SessionEvent::Opened => {
                info!(session_id = session.id(), peer = ?session.peer_addr(), "session opened");
            }
            SessionEvent::Closed => info!(session_id = session.id(), "session closed"),
            SessionEvent::Idle if self.close_idle => {
                info!(session_id = session.id(), "closing idle session");
                if let Err(err) = session.close() {
                    warn!(session_id = session.id(), error = %err, "idle close failed");
                }
            }
            SessionEvent::Idle => info!(session_id = session.id(), "session idle"),
            _ => {}
        }
    }
}
