use std::io::IsTerminal;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use iop::session::MessageType;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One envelope seen by a CLI command, in either direction.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub event: &'static str,
    #[serde(rename = "type")]
    pub message_type: Option<MessageType>,
    pub request_id: Uuid,
    pub response_id: Option<Uuid>,
    pub current_count: i32,
    pub total_count: i32,
    pub peer: Option<SocketAddr>,
    pub payload: serde_json::Value,
}

#[derive(Serialize)]
struct TimestampedRecord<'a> {
    #[serde(flatten)]
    record: &'a MessageRecord,
    timestamp: String,
}

pub fn print_message(record: &MessageRecord, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = TimestampedRecord {
                record,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "TYPE", "PART", "REQUEST ID", "PAYLOAD"])
                .add_row(vec![
                    record.event.to_string(),
                    type_name(record.message_type).to_string(),
                    part(record),
                    record.request_id.to_string(),
                    record.payload.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} type={} part={} request_id={} payload={}",
                record.event,
                type_name(record.message_type),
                part(record),
                record.request_id,
                record.payload
            );
        }
    }
}

#[derive(Serialize)]
struct HeartbeatOutput {
    request_id: Uuid,
    peer: Option<SocketAddr>,
    round_trip_ms: f64,
    timestamp: String,
}

pub fn print_heartbeat(
    request_id: Uuid,
    peer: Option<SocketAddr>,
    round_trip: Duration,
    format: OutputFormat,
) {
    let round_trip_ms = round_trip.as_secs_f64() * 1000.0;
    let peer_text = peer.map_or_else(|| "-".to_string(), |addr| addr.to_string());
    match format {
        OutputFormat::Json => {
            let out = HeartbeatOutput {
                request_id,
                peer,
                round_trip_ms,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["PEER", "REQUEST ID", "RTT (ms)"])
                .add_row(vec![
                    peer_text,
                    request_id.to_string(),
                    format!("{round_trip_ms:.3}"),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("heartbeat peer={peer_text} request_id={request_id} rtt={round_trip_ms:.3}ms");
        }
    }
}

fn type_name(message_type: Option<MessageType>) -> &'static str {
    message_type.map_or("-", MessageType::name)
}

fn part(record: &MessageRecord) -> String {
    format!("{}/{}", record.current_count, record.total_count)
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_record_uses_wire_type_names() {
        let record = MessageRecord {
            event: "response",
            message_type: Some(MessageType::RspQryPosition),
            request_id: Uuid::nil(),
            response_id: None,
            current_count: 2,
            total_count: 3,
            peer: None,
            payload: serde_json::json!({ "Volume": 10 }),
        };
        let out = TimestampedRecord {
            record: &record,
            timestamp: "0".to_string(),
        };
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["type"], "RSP_QRY_POSITION");
        assert_eq!(value["current_count"], 2);
        assert_eq!(value["payload"]["Volume"], 10);
        assert_eq!(part(&record), "2/3");
    }

    #[test]
    fn missing_type_prints_dash() {
        assert_eq!(type_name(None), "-");
        assert_eq!(type_name(Some(MessageType::FlowDepth)), "FLOW_DEPTH");
    }
}
