//! Text rendering of wire events and the observers built on it

use super::{Event, EventSink};
use crate::types;
use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex, PoisonError};

/// Cells longer than this are truncated when rendered
const CELL_PREVIEW_BYTES: usize = 10;

fn hex(bytes: &[u8], limit: usize) -> String {
    let mut out = String::with_capacity(bytes.len().min(limit) * 2 + 3);
    for b in bytes.iter().take(limit) {
        let _ = write!(out, "{:02x}", b);
    }
    if bytes.len() > limit {
        out.push_str("...");
    }
    out
}

fn type_name(oid: u32) -> String {
    match types::lookup_by_oid(oid) {
        Some(ty) => ty.name.to_string(),
        None => oid.to_string(),
    }
}

fn write_server_error(
    f: &mut fmt::Formatter<'_>,
    kind: &str,
    err: &crate::ServerError,
) -> fmt::Result {
    write!(f, "<- {}: {}", kind, err)?;
    if !err.fields().is_empty() {
        let fields: Vec<String> = err
            .fields()
            .iter()
            .map(|(tag, value)| format!("{}={}", tag, value))
            .collect();
        write!(f, " {{{}}}", fields.join(", "))?;
    }
    Ok(())
}

/// One line per event; row descriptions and data rows add one line per item
impl fmt::Display for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::SentStartup { version, params } => {
                let params: Vec<String> =
                    params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(
                    f,
                    "-> STARTUP: v{}.{}, {{{}}}",
                    version >> 16,
                    version & 0xFFFF,
                    params.join(", ")
                )
            }
            Event::SentPassword => f.write_str("-> AUTHENTICATION_REQUEST: Sent password: ***"),
            Event::SentMd5Password => f.write_str("-> AUTHENTICATION_REQUEST: Sent MD5"),
            Event::SentQuery(query) => write!(f, "-> QUERY: {}", query),
            Event::SentParse {
                statement,
                query,
                param_types,
            } => {
                let types: Vec<String> = param_types.iter().map(|oid| type_name(*oid)).collect();
                write!(
                    f,
                    "-> PARSE '{}' ({}), Query: {}",
                    statement,
                    types.join(", "),
                    query
                )
            }
            Event::SentBind { portal, statement } => {
                write!(f, "-> BIND PORTAL '{}' from STATEMENT '{}'", portal, statement)
            }
            Event::SentDescribe { target, name } => write!(f, "-> DESCRIBE {} '{}'", target, name),
            Event::SentExecute { portal, max_rows } => {
                write!(f, "-> EXECUTE '{}'", portal)?;
                if *max_rows > 0 {
                    write!(f, " (max {} rows)", max_rows)?;
                }
                Ok(())
            }
            Event::SentClose { target, name } => write!(f, "-> CLOSE {} '{}'", target, name),
            Event::SentFlush => f.write_str("-> FLUSH"),
            Event::SentSync => f.write_str("-> SYNC"),
            Event::SentTerminate => f.write_str("-> TERMINATE"),
            Event::ReceivedAuthenticated => f.write_str("<- AUTHENTICATION_REQUEST: OK"),
            Event::ReceivedCleartextRequest => {
                f.write_str("<- AUTHENTICATION_REQUEST: Clear text requested")
            }
            Event::ReceivedMd5Request { salt } => write!(
                f,
                "<- AUTHENTICATION_REQUEST: MD5 requested with salt {}",
                hex(&salt[..], 4)
            ),
            Event::ReceivedBackendKeyData { process_id, secret } => write!(
                f,
                "<- BACKEND_KEY_DATA: pid={} key={}",
                process_id,
                hex(&secret[..], 4)
            ),
            Event::ReceivedParameterStatus { name, value } => {
                write!(f, "<- PARAMETER_STATUS: {} = {}", name, value)
            }
            Event::ReceivedReadyForQuery(status) => write!(f, "<- READY_FOR_QUERY: {}", status),
            Event::ReceivedError(err) => write_server_error(f, "ERROR_RESPONSE", err),
            Event::ReceivedNotice(notice) => write_server_error(f, "NOTICE_RESPONSE", notice),
            Event::ReceivedRowDescription(fields) => {
                write!(f, "<- ROW_DESCRIPTION: {} column(s)", fields.len())?;
                for (i, field) in fields.iter().enumerate() {
                    let size = if field.type_size < 0 {
                        "variable".to_string()
                    } else {
                        format!("{} bytes", field.type_size)
                    };
                    write!(
                        f,
                        "\n<- ROW_DESCRIPTION [#{}]: '{}' : {} {{{}, {}}}",
                        i,
                        field.name,
                        type_name(field.type_oid),
                        size,
                        field.format()
                    )?;
                }
                Ok(())
            }
            Event::ReceivedDataRow(cells) => {
                write!(f, "<- DATA_ROW: {} cell(s)", cells.len())?;
                for (i, cell) in cells.iter().enumerate() {
                    match cell {
                        Some(bytes) => write!(
                            f,
                            "\n<- DATA_ROW [#{}]: {}",
                            i,
                            hex(bytes, CELL_PREVIEW_BYTES)
                        )?,
                        None => write!(f, "\n<- DATA_ROW [#{}]: NULL", i)?,
                    }
                }
                Ok(())
            }
            Event::ReceivedParameterDescription(oids) => {
                let types: Vec<String> = oids.iter().map(|oid| type_name(*oid)).collect();
                write!(f, "<- PARAMETER_DESCRIPTION: ({})", types.join(", "))
            }
            Event::ReceivedCommandComplete(tag) => write!(f, "<- COMMAND_COMPLETE: {}", tag),
            Event::ReceivedEmptyQuery => f.write_str("<- EMPTY_QUERY_RESPONSE"),
            Event::ReceivedGeneric(tag) => write!(f, "<- {} (…)", tag),
        }
    }
}

/// Logs every event at `trace` level under the `pgline::wire` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_event(&mut self, event: &Event<'_>) {
        if tracing::enabled!(target: "pgline::wire", tracing::Level::TRACE) {
            for line in event.to_string().lines() {
                tracing::trace!(target: "pgline::wire", "{}", line);
            }
        }
    }
}

/// Keeps the rendered text of every event, one entry per line
///
/// Clones share the same log, so a test can keep one handle and give the
/// other to a session.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget what was recorded
    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventSink for Recorder {
    fn on_event(&mut self, event: &Event<'_>) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.extend(event.to_string().lines().map(str::to_string));
    }
}

/// Test double asserting an exact exchange
///
/// Every event line must equal the next scripted line; anything unexpected,
/// out of order, or past the end of the script panics.
#[derive(Debug, Clone)]
pub struct Strict {
    expected: Arc<Mutex<VecDeque<String>>>,
}

impl Strict {
    /// Expect exactly these lines, in order
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expected: Arc::new(Mutex::new(lines.into_iter().map(Into::into).collect())),
        }
    }

    /// Lines still expected
    pub fn remaining(&self) -> Vec<String> {
        self.expected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Panic unless every scripted line was seen
    pub fn assert_done(&self) {
        let remaining = self.remaining();
        assert!(
            remaining.is_empty(),
            "expected wire events never happened: {:?}",
            remaining
        );
    }
}

impl EventSink for Strict {
    fn on_event(&mut self, event: &Event<'_>) {
        let mut expected = self.expected.lock().unwrap_or_else(PoisonError::into_inner);
        for line in event.to_string().lines() {
            match expected.pop_front() {
                Some(next) if next == line => {}
                Some(next) => panic!("unexpected wire event: {:?}, expected {:?}", line, next),
                None => panic!("unexpected wire event: {:?}", line),
            }
        }
    }
}
