use std::fs;
use std::time::Instant;

use iop::session::{ClientConfig, IopClient, LoginReply, MessageType};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::cmd::SendArgs;
use crate::exit::{
    io_error, session_error, CliError, CliResult, FAILURE, PERMISSION_DENIED, SUCCESS, TIMEOUT,
    USAGE,
};
use crate::inbox::{recv_until, Inbox, Incoming, Waited};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.message_type.is_request() {
        return Err(CliError::new(
            USAGE,
            format!("{} is not a request message type", args.message_type),
        ));
    }
    let payload = resolve_payload(&args)?;

    let (inbox, rx) = Inbox::channel();
    let client = IopClient::new()
        .with_config(ClientConfig {
            connect_timeout: args.timeout,
            ..ClientConfig::default()
        })
        .with_session_adaptor(inbox.clone())
        .with_message_adaptor(inbox);
    let conn = client
        .connect(args.addr.as_str())
        .map_err(|err| session_error("connect failed", err))?;
    let peer = conn.session().peer_addr();

    let login = login_payload(&args.user, args.token.as_deref());
    let login_id = conn
        .login(&login)
        .map_err(|err| session_error("login failed", err))?;

    let deadline = Instant::now() + args.timeout;
    let mut pending = Pending::Login(login_id);
    loop {
        let mut record = match recv_until(&rx, deadline) {
            Waited::Got(Incoming::Message(record)) => record,
            Waited::Got(Incoming::Heartbeat(_)) => continue,
            Waited::Got(Incoming::Closed) | Waited::Disconnected => {
                return Err(CliError::new(FAILURE, "gateway closed the connection"));
            }
            Waited::TimedOut => {
                return Err(CliError::new(TIMEOUT, format!("no reply {}", pending.describe())));
            }
        };
        record.peer = peer;

        match pending {
            Pending::Login(id) if record.message_type == Some(MessageType::RspReqLogin) => {
                if record.request_id != id {
                    continue;
                }
                let reply: LoginReply = serde_json::from_value(record.payload.clone())
                    .map_err(|err| CliError::new(FAILURE, format!("bad login reply: {err}")))?;
                if !reply.accepted {
                    return Err(CliError::new(PERMISSION_DENIED, "login rejected"));
                }
                let request_id = conn
                    .request(args.message_type, &payload)
                    .map_err(|err| session_error("send failed", err))?;
                pending = Pending::Responses(request_id);
            }
            Pending::Responses(id) if record.request_id == id => {
                print_message(&record, format);
                if record.current_count >= record.total_count {
                    break;
                }
            }
            // Pushes and stray replies are shown but do not end the wait.
            _ => print_message(&record, format),
        }
    }

    conn.close()
        .map_err(|err| session_error("close failed", err))?;
    Ok(SUCCESS)
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Login(Uuid),
    Responses(Uuid),
}

impl Pending {
    fn describe(self) -> String {
        match self {
            Pending::Login(id) => format!("to login {id}"),
            Pending::Responses(id) => format!("to request {id}"),
        }
    }
}

fn login_payload(user: &str, token: Option<&str>) -> Value {
    let mut login = json!({ "UserID": user });
    if let (Some(token), Some(map)) = (token, login.as_object_mut()) {
        map.insert("Token".to_string(), Value::String(token.to_string()));
    }
    login
}

fn resolve_payload(args: &SendArgs) -> CliResult<Value> {
    let text = match (&args.json, &args.file) {
        (Some(json), _) => json.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        (None, None) => return Ok(json!({})),
    };
    serde_json::from_str(&text)
        .map_err(|err| CliError::new(USAGE, format!("payload is not valid JSON: {err}")))
}
