use std::io::Read;
use std::sync::Arc;

use iop_frame::{FrameError, FrameReader};
use tracing::{debug, warn};

use crate::adaptor::SessionEvent;
use crate::dispatcher::Dispatcher;
use crate::error::SessionError;
use crate::session::Session;

/// Read frames until the connection ends, dispatching each one in order.
///
/// A failed frame is reported as an `Error` event and reading continues; the
/// session adaptor may close the session in response. Read timeouts become
/// `Idle` events. The session is closed before `Closed` is emitted.
pub(crate) fn drive<R: Read>(
    reader: &mut FrameReader<R>,
    session: &Arc<Session>,
    dispatcher: &Dispatcher,
) {
    dispatcher.notify(session, SessionEvent::Opened);

    loop {
        match reader.read_frame() {
            Ok(frame) => {
                if let Err(err) = dispatcher.dispatch(session, &frame) {
                    warn!(
                        session_id = session.id(),
                        meta_type = frame.meta_name(),
                        error = %err,
                        "frame rejected"
                    );
                    dispatcher.notify(session, SessionEvent::Error(&err));
                }
            }
            Err(err) if err.is_timeout() => dispatcher.notify(session, SessionEvent::Idle),
            Err(FrameError::ConnectionClosed) => {
                debug!(session_id = session.id(), "peer closed input");
                dispatcher.notify(session, SessionEvent::InputClosed);
                break;
            }
            Err(err) => {
                // A locally closed session reads as a reset on some platforms.
                if !session.is_connected() {
                    break;
                }
                let err = SessionError::from(err);
                warn!(session_id = session.id(), error = %err, "connection failed");
                dispatcher.notify(session, SessionEvent::Error(&err));
                break;
            }
        }
    }

    if let Err(err) = session.close() {
        debug!(session_id = session.id(), error = %err, "close after read loop failed");
    }
    dispatcher.notify(session, SessionEvent::Closed);
}
