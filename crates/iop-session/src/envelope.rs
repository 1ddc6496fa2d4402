//! Business envelope carried in REQUEST, RESPONSE, HEARTBEAT and LOGIN bodies.
//!
//! The envelope is a JSON object whose `Json` field holds the business payload
//! as a JSON *string*, not a nested object. Both layers are kept as-is on the
//! wire so payload typing stays independent of the envelope.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ProtocolError, Result, SessionError};

/// Business operation named by an envelope's `Type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Heartbeat,
    SubMd,
    RspSubMd,
    FlowDepth,
    FlowCandle,
    ReqLogin,
    RspReqLogin,
    ReqOrderInsert,
    RspReqOrderInsert,
    ReqOrderAction,
    RspReqOrderAction,
    QryAccount,
    RspQryAccount,
    QryOrder,
    RspQryOrder,
    QryPosition,
    RspQryPosition,
    QryOrderExec,
    RspQryOrderExec,
    QryActionExec,
    RspQryActionExec,
    QryUserExec,
    RspQryUserExec,
}

impl MessageType {
    /// Every message type, in protocol order.
    pub const ALL: [MessageType; 23] = [
        MessageType::Heartbeat,
        MessageType::SubMd,
        MessageType::RspSubMd,
        MessageType::FlowDepth,
        MessageType::FlowCandle,
        MessageType::ReqLogin,
        MessageType::RspReqLogin,
        MessageType::ReqOrderInsert,
        MessageType::RspReqOrderInsert,
        MessageType::ReqOrderAction,
        MessageType::RspReqOrderAction,
        MessageType::QryAccount,
        MessageType::RspQryAccount,
        MessageType::QryOrder,
        MessageType::RspQryOrder,
        MessageType::QryPosition,
        MessageType::RspQryPosition,
        MessageType::QryOrderExec,
        MessageType::RspQryOrderExec,
        MessageType::QryActionExec,
        MessageType::RspQryActionExec,
        MessageType::QryUserExec,
        MessageType::RspQryUserExec,
    ];

    /// Wire name, e.g. `QRY_POSITION`.
    pub const fn name(self) -> &'static str {
        match self {
            MessageType::Heartbeat => "HEARTBEAT",
            MessageType::SubMd => "SUB_MD",
            MessageType::RspSubMd => "RSP_SUB_MD",
            MessageType::FlowDepth => "FLOW_DEPTH",
            MessageType::FlowCandle => "FLOW_CANDLE",
            MessageType::ReqLogin => "REQ_LOGIN",
            MessageType::RspReqLogin => "RSP_REQ_LOGIN",
            MessageType::ReqOrderInsert => "REQ_ORDER_INSERT",
            MessageType::RspReqOrderInsert => "RSP_REQ_ORDER_INSERT",
            MessageType::ReqOrderAction => "REQ_ORDER_ACTION",
            MessageType::RspReqOrderAction => "RSP_REQ_ORDER_ACTION",
            MessageType::QryAccount => "QRY_ACCOUNT",
            MessageType::RspQryAccount => "RSP_QRY_ACCOUNT",
            MessageType::QryOrder => "QRY_ORDER",
            MessageType::RspQryOrder => "RSP_QRY_ORDER",
            MessageType::QryPosition => "QRY_POSITION",
            MessageType::RspQryPosition => "RSP_QRY_POSITION",
            MessageType::QryOrderExec => "QRY_ORDER_EXEC",
            MessageType::RspQryOrderExec => "RSP_QRY_ORDER_EXEC",
            MessageType::QryActionExec => "QRY_ACTION_EXEC",
            MessageType::RspQryActionExec => "RSP_QRY_ACTION_EXEC",
            MessageType::QryUserExec => "QRY_USER_EXEC",
            MessageType::RspQryUserExec => "RSP_QRY_USER_EXEC",
        }
    }

    /// Look up a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.name() == name)
    }

    /// Business requests a client sends in REQUEST frames.
    pub const fn is_request(self) -> bool {
        matches!(
            self,
            MessageType::SubMd
                | MessageType::ReqOrderInsert
                | MessageType::ReqOrderAction
                | MessageType::QryAccount
                | MessageType::QryOrder
                | MessageType::QryPosition
                | MessageType::QryOrderExec
                | MessageType::QryActionExec
                | MessageType::QryUserExec
        )
    }

    /// Replies and pushes a server sends in RESPONSE frames.
    pub const fn is_response(self) -> bool {
        matches!(
            self,
            MessageType::RspSubMd
                | MessageType::FlowDepth
                | MessageType::FlowCandle
                | MessageType::RspReqOrderInsert
                | MessageType::RspReqOrderAction
                | MessageType::RspQryAccount
                | MessageType::RspQryOrder
                | MessageType::RspQryPosition
                | MessageType::RspQryOrderExec
                | MessageType::RspQryActionExec
                | MessageType::RspQryUserExec
        )
    }

    /// Unsolicited market data; no request to correlate with.
    pub const fn is_push(self) -> bool {
        matches!(self, MessageType::FlowDepth | MessageType::FlowCandle)
    }

    /// The reply type a server answers this request with.
    pub const fn response_type(self) -> Option<MessageType> {
        match self {
            MessageType::SubMd => Some(MessageType::RspSubMd),
            MessageType::ReqLogin => Some(MessageType::RspReqLogin),
            MessageType::ReqOrderInsert => Some(MessageType::RspReqOrderInsert),
            MessageType::ReqOrderAction => Some(MessageType::RspReqOrderAction),
            MessageType::QryAccount => Some(MessageType::RspQryAccount),
            MessageType::QryOrder => Some(MessageType::RspQryOrder),
            MessageType::QryPosition => Some(MessageType::RspQryPosition),
            MessageType::QryOrderExec => Some(MessageType::RspQryOrderExec),
            MessageType::QryActionExec => Some(MessageType::RspQryActionExec),
            MessageType::QryUserExec => Some(MessageType::RspQryUserExec),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ProtocolError::UnknownMessageType(s.to_string()))
    }
}

/// One business message.
///
/// Immutable once built; the builder methods consume and return `self`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    #[serde(rename = "RequestID")]
    request_id: Uuid,
    #[serde(rename = "ResponseID")]
    response_id: Option<Uuid>,
    #[serde(rename = "Type")]
    message_type: Option<MessageType>,
    #[serde(rename = "CurrentCount")]
    current_count: i32,
    #[serde(rename = "TotalCount")]
    total_count: i32,
    #[serde(rename = "Json")]
    json: Option<String>,
}

/// Wire shape before the type name is checked against [`MessageType`].
#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "RequestID")]
    request_id: Uuid,
    #[serde(rename = "ResponseID", default)]
    response_id: Option<Uuid>,
    #[serde(rename = "Type", default)]
    message_type: Option<String>,
    #[serde(rename = "CurrentCount", default)]
    current_count: i32,
    #[serde(rename = "TotalCount", default)]
    total_count: i32,
    #[serde(rename = "Json", default)]
    json: Option<String>,
}

impl Envelope {
    /// A single-part request with a fresh request id.
    pub fn request(message_type: MessageType, json: impl Into<String>) -> Self {
        Self::request_with_id(Uuid::new_v4(), message_type, json)
    }

    /// A single-part request with an explicit request id.
    pub fn request_with_id(
        request_id: Uuid,
        message_type: MessageType,
        json: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            response_id: None,
            message_type: Some(message_type),
            current_count: 1,
            total_count: 1,
            json: Some(json.into()),
        }
    }

    /// A single-part response to `request_id` with a fresh response id.
    pub fn response(request_id: Uuid, message_type: MessageType, json: impl Into<String>) -> Self {
        Self {
            request_id,
            response_id: Some(Uuid::new_v4()),
            message_type: Some(message_type),
            current_count: 1,
            total_count: 1,
            json: Some(json.into()),
        }
    }

    /// Heartbeat envelope: only the correlation id is set.
    pub fn heartbeat(request_id: Uuid) -> Self {
        Self {
            request_id,
            response_id: None,
            message_type: None,
            current_count: 0,
            total_count: 0,
            json: None,
        }
    }

    /// Request envelope whose `Json` is `payload` serialized.
    pub fn from_payload<T: Serialize>(message_type: MessageType, payload: &T) -> Result<Self> {
        Ok(Self::request(message_type, serde_json::to_string(payload)?))
    }

    /// Response envelope whose `Json` is `payload` serialized.
    pub fn response_from_payload<T: Serialize>(
        request_id: Uuid,
        message_type: MessageType,
        payload: &T,
    ) -> Result<Self> {
        Ok(Self::response(
            request_id,
            message_type,
            serde_json::to_string(payload)?,
        ))
    }

    /// Mark this envelope as part `current` of `total`.
    pub fn with_part(mut self, current: i32, total: i32) -> Self {
        self.current_count = current;
        self.total_count = total;
        self
    }

    /// Replace the response id.
    pub fn with_response_id(mut self, response_id: Uuid) -> Self {
        self.response_id = Some(response_id);
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn response_id(&self) -> Option<Uuid> {
        self.response_id
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.message_type
    }

    pub fn current_count(&self) -> i32 {
        self.current_count
    }

    pub fn total_count(&self) -> i32 {
        self.total_count
    }

    /// Nested payload text, exactly as carried on the wire.
    pub fn json(&self) -> Option<&str> {
        self.json.as_deref()
    }

    /// Check `1 <= CurrentCount <= TotalCount`.
    pub fn validate_counts(&self) -> Result<()> {
        if self.total_count < 1 {
            return Err(SessionError::InvalidEnvelope(format!(
                "TotalCount must be at least 1, got {}",
                self.total_count
            )));
        }
        if self.current_count < 1 || self.current_count > self.total_count {
            return Err(SessionError::InvalidEnvelope(format!(
                "CurrentCount {} outside 1..={}",
                self.current_count, self.total_count
            )));
        }
        Ok(())
    }

    /// Parse the nested payload as untyped JSON.
    ///
    /// A missing or blank `Json` field is `null`.
    pub fn payload(&self) -> Result<Payload> {
        match self.json.as_deref().map(str::trim) {
            None | Some("") => Ok(Payload(serde_json::Value::Null)),
            Some(text) => Ok(Payload(serde_json::from_str(text)?)),
        }
    }

    /// Parse the nested payload into `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        self.payload()?.decode()
    }

    /// Serialize to the UTF-8 body of a frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a frame body.
    ///
    /// Non-UTF-8 text and malformed JSON are serialization errors; a `Type`
    /// name outside [`MessageType`] is a protocol error.
    pub fn from_bytes(body: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(body)?;
        let raw: RawEnvelope = serde_json::from_str(text)?;
        let message_type = raw
            .message_type
            .as_deref()
            .map(MessageType::from_str)
            .transpose()?;

        Ok(Self {
            request_id: raw.request_id,
            response_id: raw.response_id,
            message_type,
            current_count: raw.current_count,
            total_count: raw.total_count,
            json: raw.json,
        })
    }
}

/// Decoded nested payload handed to adaptors.
///
/// Kept untyped so each application decides its own business structs.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload(serde_json::Value);

impl Payload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Deserialize into a concrete business type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.0)?)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Look up a top-level string field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(serde_json::Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fixed_id() -> Uuid {
        Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap()
    }

    #[test]
    fn names_roundtrip_through_serde_and_lookup() {
        for ty in MessageType::ALL {
            let encoded = serde_json::to_string(&ty).unwrap();
            assert_eq!(encoded, format!("\"{}\"", ty.name()));
            assert_eq!(MessageType::from_name(ty.name()), Some(ty));
        }
        assert_eq!(MessageType::from_name("QRY_NOTHING"), None);
    }

    #[test]
    fn direction_sets_do_not_overlap() {
        for ty in MessageType::ALL {
            assert!(!(ty.is_request() && ty.is_response()), "{ty}");
        }
        assert!(MessageType::QryPosition.is_request());
        assert!(MessageType::FlowCandle.is_response());
        assert!(MessageType::FlowCandle.is_push());
        assert!(!MessageType::ReqLogin.is_request());
        assert_eq!(
            MessageType::QryPosition.response_type(),
            Some(MessageType::RspQryPosition)
        );
    }

    #[test]
    fn serializes_every_key_including_nulls() {
        let env = Envelope::request_with_id(
            fixed_id(),
            MessageType::QryPosition,
            r#"{"InstrumentID":"c2201"}"#,
        );
        let value: serde_json::Value = serde_json::from_slice(&env.to_bytes().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "RequestID": "11111111-1111-1111-1111-111111111111",
                "ResponseID": null,
                "Type": "QRY_POSITION",
                "CurrentCount": 1,
                "TotalCount": 1,
                "Json": "{\"InstrumentID\":\"c2201\"}",
            })
        );
    }

    #[test]
    fn nested_json_text_survives_byte_for_byte() {
        let nested = "{ \"InstrumentID\" : \"c2201\",\n  \"Volume\": 3 }";
        let env = Envelope::request_with_id(fixed_id(), MessageType::QryOrder, nested);

        let decoded = Envelope::from_bytes(&env.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.json(), Some(nested));
        assert_eq!(decoded, env);
    }

    #[test]
    fn heartbeat_envelope_has_only_the_id() {
        let env = Envelope::heartbeat(fixed_id());
        let decoded = Envelope::from_bytes(&env.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded.request_id(), fixed_id());
        assert_eq!(decoded.message_type(), None);
        assert_eq!(decoded.json(), None);
        assert_eq!(decoded.payload().unwrap().as_value(), &serde_json::Value::Null);
    }

    #[test]
    fn missing_optional_keys_default() {
        let env =
            Envelope::from_bytes(br#"{"RequestID":"11111111-1111-1111-1111-111111111111"}"#)
                .unwrap();
        assert_eq!(env.response_id(), None);
        assert_eq!(env.total_count(), 0);
    }

    #[test]
    fn unknown_type_is_a_protocol_error() {
        let body = br#"{"RequestID":"11111111-1111-1111-1111-111111111111","Type":"QRY_WEATHER"}"#;
        let err = Envelope::from_bytes(body).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolError::UnknownMessageType(ref name)) if name == "QRY_WEATHER"
        ));
    }

    #[test]
    fn malformed_bodies_are_serialization_errors() {
        assert!(matches!(
            Envelope::from_bytes(&[0xFF, 0xFE]).unwrap_err(),
            SessionError::Utf8(_)
        ));
        assert!(matches!(
            Envelope::from_bytes(b"{not json").unwrap_err(),
            SessionError::Json(_)
        ));
        assert!(matches!(
            Envelope::from_bytes(br#"{"RequestID":"not-a-uuid"}"#).unwrap_err(),
            SessionError::Json(_)
        ));
    }

    #[test]
    fn count_validation() {
        let base = Envelope::request(MessageType::QryAccount, "{}");
        assert!(base.clone().with_part(1, 1).validate_counts().is_ok());
        assert!(base.clone().with_part(3, 3).validate_counts().is_ok());
        assert!(base.clone().with_part(0, 1).validate_counts().is_err());
        assert!(base.clone().with_part(2, 1).validate_counts().is_err());
        assert!(base.with_part(1, 0).validate_counts().is_err());
    }

    #[test]
    fn typed_payload_roundtrip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct QryPosition {
            #[serde(rename = "InstrumentID")]
            instrument_id: String,
        }

        let query = QryPosition {
            instrument_id: "c2201".into(),
        };
        let env = Envelope::from_payload(MessageType::QryPosition, &query).unwrap();
        assert_eq!(env.decode_payload::<QryPosition>().unwrap(), query);
        assert_eq!(env.payload().unwrap().str_field("InstrumentID"), Some("c2201"));

        let reply =
            Envelope::response_from_payload(env.request_id(), MessageType::RspQryPosition, &query)
                .unwrap();
        assert_eq!(reply.request_id(), env.request_id());
        assert!(reply.response_id().is_some());
    }

    #[test]
    fn bad_nested_payload_is_a_serialization_error() {
        let env = Envelope::request(MessageType::QryOrder, "{broken");
        assert!(matches!(env.payload().unwrap_err(), SessionError::Json(_)));
    }
}
