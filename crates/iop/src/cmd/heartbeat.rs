use std::time::Instant;

use iop::session::{ClientConfig, IopClient};
use tracing::debug;

use crate::cmd::HeartbeatArgs;
use crate::exit::{session_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::inbox::{recv_until, Inbox, Incoming, Waited};
use crate::output::{print_heartbeat, OutputFormat};

pub fn run(args: HeartbeatArgs, format: OutputFormat) -> CliResult<i32> {
    if args.count == 0 {
        return Err(CliError::new(USAGE, "--count must be at least 1"));
    }

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

    // Heartbeats need no login; the server echoes them on any session.
    for _ in 0..args.count {
        let started = Instant::now();
        let id = conn
            .heartbeat()
            .map_err(|err| session_error("heartbeat failed", err))?;
        let deadline = started + args.timeout;

        loop {
            match recv_until(&rx, deadline) {
                Waited::Got(Incoming::Heartbeat(echoed)) if echoed == id => {
                    print_heartbeat(id, peer, started.elapsed(), format);
                    break;
                }
                Waited::Got(other) if !matches!(other, Incoming::Closed) => {
                    debug!(?other, "ignoring unrelated message");
                }
                Waited::Got(_) | Waited::Disconnected => {
                    return Err(CliError::new(FAILURE, "gateway closed the connection"));
                }
                Waited::TimedOut => {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("no heartbeat echo within {:?}", args.timeout),
                    ));
                }
            }
        }
    }

    conn.close()
        .map_err(|err| session_error("close failed", err))?;
    Ok(SUCCESS)
}
