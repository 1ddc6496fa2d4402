//! Frame meta types.
//!
//! The meta type is the first header field and decides how the body is
//! routed. Codes are "IOP" followed by an ordinal, so the high byte is never
//! zero: a resync scan that skips zero bytes stops exactly at a header.

use std::fmt;

/// Business request from client to server.
pub const REQUEST: i32 = 0x494F_5001;

/// Response (or push) from server to client.
pub const RESPONSE: i32 = 0x494F_5002;

/// Keep-alive; the server echoes it back.
pub const HEARTBEAT: i32 = 0x494F_5003;

/// Login request, and the server's login reply.
pub const LOGIN: i32 = 0x494F_5004;

/// The four meta types understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaType {
    Request,
    Response,
    Heartbeat,
    Login,
}

impl MetaType {
    /// Wire code of this meta type.
    pub const fn code(self) -> i32 {
        match self {
            MetaType::Request => REQUEST,
            MetaType::Response => RESPONSE,
            MetaType::Heartbeat => HEARTBEAT,
            MetaType::Login => LOGIN,
        }
    }

    /// Look up a wire code. Returns `None` for anything unrecognized.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            REQUEST => Some(MetaType::Request),
            RESPONSE => Some(MetaType::Response),
            HEARTBEAT => Some(MetaType::Heartbeat),
            LOGIN => Some(MetaType::Login),
            _ => None,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            MetaType::Request => "REQUEST",
            MetaType::Response => "RESPONSE",
            MetaType::Heartbeat => "HEARTBEAT",
            MetaType::Login => "LOGIN",
        }
    }
}

impl From<MetaType> for i32 {
    fn from(meta: MetaType) -> Self {
        meta.code()
    }
}

impl TryFrom<i32> for MetaType {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        MetaType::from_code(code).ok_or(code)
    }
}

impl fmt::Display for MetaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns a human-readable name for a raw meta type code.
pub fn meta_name(code: i32) -> &'static str {
    MetaType::from_code(code).map_or("UNKNOWN", MetaType::name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for meta in [
            MetaType::Request,
            MetaType::Response,
            MetaType::Heartbeat,
            MetaType::Login,
        ] {
            assert_eq!(MetaType::try_from(meta.code()), Ok(meta));
        }
    }

    #[test]
    fn codes_have_non_zero_high_byte() {
        for code in [REQUEST, RESPONSE, HEARTBEAT, LOGIN] {
            assert_ne!(code.to_be_bytes()[0], 0);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert_eq!(MetaType::try_from(7), Err(7));
        assert_eq!(meta_name(7), "UNKNOWN");
        assert_eq!(meta_name(LOGIN), "LOGIN");
    }
}
