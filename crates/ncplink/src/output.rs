use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ncplink_ezsp::{display_name, CallbackKind, Notification, Reply, VersionInfo};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

#[derive(Serialize)]
pub struct ProbeOutput {
    pub device: String,
    pub transport: &'static str,
    pub reset_code: u8,
    pub reset_reason: &'static str,
    pub protocol_version: u8,
    pub stack_type: u8,
    pub stack_version: String,
}

impl ProbeOutput {
    pub fn new(
        device: &str,
        transport: &'static str,
        reset_code: u8,
        version: &VersionInfo,
    ) -> Self {
        Self {
            device: device.to_string(),
            transport,
            reset_code,
            reset_reason: ncplink_ash::reset_code_name(reset_code),
            protocol_version: version.protocol_version,
            stack_type: version.stack_type,
            stack_version: version.stack_version_string(),
        }
    }
}

pub fn print_probe(out: &ProbeOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"])
                .add_row(vec!["device".to_string(), out.device.clone()])
                .add_row(vec!["transport".to_string(), out.transport.to_string()])
                .add_row(vec![
                    "reset".to_string(),
                    format!("0x{:02X} ({})", out.reset_code, out.reset_reason),
                ])
                .add_row(vec![
                    "protocol_version".to_string(),
                    out.protocol_version.to_string(),
                ])
                .add_row(vec!["stack_type".to_string(), out.stack_type.to_string()])
                .add_row(vec!["stack_version".to_string(), out.stack_version.clone()]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "device={} reset=0x{:02X} ({}) protocol={} stack_type={} stack={}",
                out.device,
                out.reset_code,
                out.reset_reason,
                out.protocol_version,
                out.stack_type,
                out.stack_version
            );
        }
    }
}

#[derive(Serialize)]
struct ReplyOutput {
    kind: &'static str,
    sequence: Option<u8>,
    command_id: Option<u8>,
    command: Option<String>,
    data: String,
    callback_pending: bool,
}

pub fn print_reply(reply: &Reply, format: OutputFormat) {
    let out = match reply {
        Reply::Response(response) => ReplyOutput {
            kind: "response",
            sequence: Some(response.sequence),
            command_id: Some(response.command_id),
            command: Some(display_name(response.command_id)),
            data: hex::encode(&response.data),
            callback_pending: response.callback_pending,
        },
        Reply::CallbackDelivered => ReplyOutput {
            kind: "callback",
            sequence: None,
            command_id: None,
            command: None,
            data: String::new(),
            callback_pending: false,
        },
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "SEQ", "COMMAND", "DATA"])
                .add_row(vec![
                    out.kind.to_string(),
                    out.sequence.map(|s| s.to_string()).unwrap_or_default(),
                    out.command.clone().unwrap_or_default(),
                    out.data.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match &out.command {
            Some(command) => println!(
                "seq={} command={} data={}",
                out.sequence.unwrap_or_default(),
                command,
                out.data
            ),
            None => println!("answered by callback (see listen)"),
        },
        OutputFormat::Raw => {
            if let Reply::Response(response) = reply {
                print_raw(&response.data);
            }
        }
    }
}

#[derive(Serialize)]
struct NotificationOutput {
    sequence: u8,
    callback_id: u8,
    callback: String,
    kind: CallbackKind,
    data: String,
    callback_pending: bool,
    timestamp: String,
}

pub fn print_notification(notification: &Notification, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&NotificationOutput {
            sequence: notification.sequence,
            callback_id: notification.command_id,
            callback: display_name(notification.command_id),
            kind: notification.kind,
            data: hex::encode(&notification.data),
            callback_pending: notification.callback_pending,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CALLBACK", "KIND", "SEQ", "DATA"])
                .add_row(vec![
                    display_name(notification.command_id),
                    kind_name(notification.kind).to_string(),
                    notification.sequence.to_string(),
                    hex::encode(&notification.data),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} ({}) seq={} data={}",
                display_name(notification.command_id),
                kind_name(notification.kind),
                notification.sequence,
                hex::encode(&notification.data)
            );
        }
        OutputFormat::Raw => print_raw(&notification.data),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn kind_name(kind: CallbackKind) -> &'static str {
    match kind {
        CallbackKind::Sync => "sync",
        CallbackKind::Async => "async",
    }
}

/// Parse hex, ignoring spaces, colons and an optional `0x` prefix.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let input = input.trim();
    let input = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    let digits: String = input.chars().filter(|c| !matches!(c, ' ' | ':')).collect();
    hex::decode(digits)
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
