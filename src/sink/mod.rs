//! Wire observers
//!
//! An [`EventSink`] receives one call per protocol event the client sends or
//! decodes. Every method has a default body that forwards a borrowed
//! [`Event`] to [`EventSink::on_event`], so an observer can either override
//! the few methods it cares about or handle everything in one place.
//!
//! Stock observers:
//!
//! * [`Silent`] accepts everything and does nothing
//! * [`Strict`] asserts an exact scripted exchange and panics on anything else
//! * [`Recorder`] keeps the rendered text of every event
//! * [`TracingSink`] logs every event at `trace` level
//! * [`ResultCollector`] accumulates query results

mod collect;
mod text;

pub use collect::{QueryResult, ResultCollector};
pub use text::{Recorder, Strict, TracingSink};

use crate::error::ServerError;
use crate::protocol::{
    AuthenticationRequest, BackendMessage, BackendTag, DescribeTarget, FieldDescription,
    FrontendMessage, TransactionStatus,
};
use bytes::Bytes;
use std::sync::{Arc, Mutex, PoisonError};

/// A single wire event, borrowing its data from the message it describes
#[derive(Debug, Clone, Copy)]
#[allow(missing_docs)]
pub enum Event<'a> {
    SentStartup {
        version: i32,
        params: &'a [(String, String)],
    },
    SentPassword,
    SentMd5Password,
    SentQuery(&'a str),
    SentParse {
        statement: &'a str,
        query: &'a str,
        param_types: &'a [u32],
    },
    SentBind {
        portal: &'a str,
        statement: &'a str,
    },
    SentDescribe {
        target: DescribeTarget,
        name: &'a str,
    },
    SentExecute {
        portal: &'a str,
        max_rows: i32,
    },
    SentClose {
        target: DescribeTarget,
        name: &'a str,
    },
    SentFlush,
    SentSync,
    SentTerminate,
    ReceivedAuthenticated,
    ReceivedCleartextRequest,
    ReceivedMd5Request {
        salt: &'a [u8; 4],
    },
    ReceivedBackendKeyData {
        process_id: i32,
        secret: &'a [u8; 4],
    },
    ReceivedParameterStatus {
        name: &'a str,
        value: &'a str,
    },
    ReceivedReadyForQuery(TransactionStatus),
    ReceivedError(&'a ServerError),
    ReceivedNotice(&'a ServerError),
    ReceivedRowDescription(&'a [FieldDescription]),
    ReceivedDataRow(&'a [Option<Bytes>]),
    ReceivedParameterDescription(&'a [u32]),
    ReceivedCommandComplete(&'a str),
    ReceivedEmptyQuery,
    ReceivedGeneric(BackendTag),
}

/// Observer of decoded wire traffic
///
/// Called from exactly one task at a time: the caller's task during the
/// handshake, the session's reader task afterwards, and whichever task holds
/// the writer lock for sends.
pub trait EventSink: Send {
    /// Catch-all target of every default method below
    fn on_event(&mut self, _event: &Event<'_>) {}

    /// Startup packet written
    fn sent_startup(&mut self, version: i32, params: &[(String, String)]) {
        self.on_event(&Event::SentStartup { version, params });
    }

    /// Cleartext password written
    fn sent_password(&mut self) {
        self.on_event(&Event::SentPassword);
    }

    /// MD5 digest written
    fn sent_md5_password(&mut self) {
        self.on_event(&Event::SentMd5Password);
    }

    /// Simple query written
    fn sent_query(&mut self, query: &str) {
        self.on_event(&Event::SentQuery(query));
    }

    /// Parse written
    fn sent_parse(&mut self, statement: &str, query: &str, param_types: &[u32]) {
        self.on_event(&Event::SentParse {
            statement,
            query,
            param_types,
        });
    }

    /// Bind written
    fn sent_bind(&mut self, portal: &str, statement: &str) {
        self.on_event(&Event::SentBind { portal, statement });
    }

    /// Describe written
    fn sent_describe(&mut self, target: DescribeTarget, name: &str) {
        self.on_event(&Event::SentDescribe { target, name });
    }

    /// Execute written
    fn sent_execute(&mut self, portal: &str, max_rows: i32) {
        self.on_event(&Event::SentExecute { portal, max_rows });
    }

    /// Close written
    fn sent_close(&mut self, target: DescribeTarget, name: &str) {
        self.on_event(&Event::SentClose { target, name });
    }

    /// Flush written
    fn sent_flush(&mut self) {
        self.on_event(&Event::SentFlush);
    }

    /// Sync written
    fn sent_sync(&mut self) {
        self.on_event(&Event::SentSync);
    }

    /// Terminate written
    fn sent_terminate(&mut self) {
        self.on_event(&Event::SentTerminate);
    }

    /// `AuthenticationOk`
    fn received_authenticated(&mut self) {
        self.on_event(&Event::ReceivedAuthenticated);
    }

    /// Cleartext password challenge
    fn received_cleartext_request(&mut self) {
        self.on_event(&Event::ReceivedCleartextRequest);
    }

    /// MD5 challenge
    fn received_md5_request(&mut self, salt: &[u8; 4]) {
        self.on_event(&Event::ReceivedMd5Request { salt });
    }

    /// Cancellation key
    fn received_backend_key_data(&mut self, process_id: i32, secret: &[u8; 4]) {
        self.on_event(&Event::ReceivedBackendKeyData { process_id, secret });
    }

    /// Server setting reported
    fn received_parameter_status(&mut self, name: &str, value: &str) {
        self.on_event(&Event::ReceivedParameterStatus { name, value });
    }

    /// `ReadyForQuery`
    fn received_ready_for_query(&mut self, status: TransactionStatus) {
        self.on_event(&Event::ReceivedReadyForQuery(status));
    }

    /// `ErrorResponse`
    fn received_error(&mut self, error: &ServerError) {
        self.on_event(&Event::ReceivedError(error));
    }

    /// `NoticeResponse`
    fn received_notice(&mut self, notice: &ServerError) {
        self.on_event(&Event::ReceivedNotice(notice));
    }

    /// `RowDescription`
    fn received_row_description(&mut self, fields: &[FieldDescription]) {
        self.on_event(&Event::ReceivedRowDescription(fields));
    }

    /// `DataRow`
    fn received_data_row(&mut self, cells: &[Option<Bytes>]) {
        self.on_event(&Event::ReceivedDataRow(cells));
    }

    /// `ParameterDescription`
    fn received_parameter_description(&mut self, type_oids: &[u32]) {
        self.on_event(&Event::ReceivedParameterDescription(type_oids));
    }

    /// `CommandComplete`
    fn received_command_complete(&mut self, tag: &str) {
        self.on_event(&Event::ReceivedCommandComplete(tag));
    }

    /// `EmptyQueryResponse`
    fn received_empty_query(&mut self) {
        self.on_event(&Event::ReceivedEmptyQuery);
    }

    /// Acknowledgements and messages whose payload is not interpreted
    fn received_generic(&mut self, tag: BackendTag) {
        self.on_event(&Event::ReceivedGeneric(tag));
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn on_event(&mut self, event: &Event<'_>) {
        (**self).on_event(event)
    }
    fn sent_startup(&mut self, version: i32, params: &[(String, String)]) {
        (**self).sent_startup(version, params)
    }
    fn sent_password(&mut self) {
        (**self).sent_password()
    }
    fn sent_md5_password(&mut self) {
        (**self).sent_md5_password()
    }
    fn sent_query(&mut self, query: &str) {
        (**self).sent_query(query)
    }
    fn sent_parse(&mut self, statement: &str, query: &str, param_types: &[u32]) {
        (**self).sent_parse(statement, query, param_types)
    }
    fn sent_bind(&mut self, portal: &str, statement: &str) {
        (**self).sent_bind(portal, statement)
    }
    fn sent_describe(&mut self, target: DescribeTarget, name: &str) {
        (**self).sent_describe(target, name)
    }
    fn sent_execute(&mut self, portal: &str, max_rows: i32) {
        (**self).sent_execute(portal, max_rows)
    }
    fn sent_close(&mut self, target: DescribeTarget, name: &str) {
        (**self).sent_close(target, name)
    }
    fn sent_flush(&mut self) {
        (**self).sent_flush()
    }
    fn sent_sync(&mut self) {
        (**self).sent_sync()
    }
    fn sent_terminate(&mut self) {
        (**self).sent_terminate()
    }
    fn received_authenticated(&mut self) {
        (**self).received_authenticated()
    }
    fn received_cleartext_request(&mut self) {
        (**self).received_cleartext_request()
    }
    fn received_md5_request(&mut self, salt: &[u8; 4]) {
        (**self).received_md5_request(salt)
    }
    fn received_backend_key_data(&mut self, process_id: i32, secret: &[u8; 4]) {
        (**self).received_backend_key_data(process_id, secret)
    }
    fn received_parameter_status(&mut self, name: &str, value: &str) {
        (**self).received_parameter_status(name, value)
    }
    fn received_ready_for_query(&mut self, status: TransactionStatus) {
        (**self).received_ready_for_query(status)
    }
    fn received_error(&mut self, error: &ServerError) {
        (**self).received_error(error)
    }
    fn received_notice(&mut self, notice: &ServerError) {
        (**self).received_notice(notice)
    }
    fn received_row_description(&mut self, fields: &[FieldDescription]) {
        (**self).received_row_description(fields)
    }
    fn received_data_row(&mut self, cells: &[Option<Bytes>]) {
        (**self).received_data_row(cells)
    }
    fn received_parameter_description(&mut self, type_oids: &[u32]) {
        (**self).received_parameter_description(type_oids)
    }
    fn received_command_complete(&mut self, tag: &str) {
        (**self).received_command_complete(tag)
    }
    fn received_empty_query(&mut self) {
        (**self).received_empty_query()
    }
    fn received_generic(&mut self, tag: BackendTag) {
        (**self).received_generic(tag)
    }
}

/// Permissive observer: accepts every event and ignores it
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl EventSink for Silent {}

/// Report a frontend message to `sink`
///
/// Password messages are reported as cleartext; the handshake reports MD5
/// digests itself because the message alone cannot tell them apart.
pub fn report_sent(sink: &mut dyn EventSink, msg: &FrontendMessage) {
    match msg {
        FrontendMessage::Startup { version, params } => sink.sent_startup(*version, params),
        FrontendMessage::CancelRequest { .. } => {}
        FrontendMessage::Password(_) => sink.sent_password(),
        FrontendMessage::Query(query) => sink.sent_query(query),
        FrontendMessage::Parse {
            name,
            query,
            param_types,
        } => sink.sent_parse(name, query, param_types),
        FrontendMessage::Bind {
            portal, statement, ..
        } => sink.sent_bind(portal, statement),
        FrontendMessage::Describe { target, name } => sink.sent_describe(*target, name),
        FrontendMessage::Execute { portal, max_rows } => sink.sent_execute(portal, *max_rows),
        FrontendMessage::Close { target, name } => sink.sent_close(*target, name),
        FrontendMessage::Flush => sink.sent_flush(),
        FrontendMessage::Sync => sink.sent_sync(),
        FrontendMessage::Terminate => sink.sent_terminate(),
    }
}

/// Report a decoded backend message to `sink`
pub fn report_received(sink: &mut dyn EventSink, msg: &BackendMessage) {
    match msg {
        BackendMessage::Authentication(request) => match request {
            AuthenticationRequest::Ok => sink.received_authenticated(),
            AuthenticationRequest::CleartextPassword => sink.received_cleartext_request(),
            AuthenticationRequest::Md5Password { salt } => sink.received_md5_request(salt),
            AuthenticationRequest::Unsupported(_) => {
                sink.received_generic(BackendTag::Authentication)
            }
        },
        BackendMessage::BackendKeyData { process_id, secret } => {
            sink.received_backend_key_data(*process_id, secret)
        }
        BackendMessage::BindComplete => sink.received_generic(BackendTag::BindComplete),
        BackendMessage::CloseComplete => sink.received_generic(BackendTag::CloseComplete),
        BackendMessage::CommandComplete(tag) => sink.received_command_complete(tag),
        BackendMessage::DataRow(cells) => sink.received_data_row(cells),
        BackendMessage::EmptyQueryResponse => sink.received_empty_query(),
        BackendMessage::ErrorResponse(err) => sink.received_error(err),
        BackendMessage::NoData => sink.received_generic(BackendTag::NoData),
        BackendMessage::NoticeResponse(notice) => sink.received_notice(notice),
        BackendMessage::ParameterDescription(oids) => sink.received_parameter_description(oids),
        BackendMessage::ParameterStatus { name, value } => {
            sink.received_parameter_status(name, value)
        }
        BackendMessage::ParseComplete => sink.received_generic(BackendTag::ParseComplete),
        BackendMessage::PortalSuspended => sink.received_generic(BackendTag::PortalSuspended),
        BackendMessage::ReadyForQuery(status) => sink.received_ready_for_query(*status),
        BackendMessage::RowDescription(fields) => sink.received_row_description(fields),
        BackendMessage::Other(tag) => sink.received_generic(*tag),
    }
}

/// Connection-level sink shared by the writer path and the reader task
#[derive(Clone)]
pub(crate) struct SharedSink {
    inner: Option<Arc<Mutex<Box<dyn EventSink>>>>,
}

impl SharedSink {
    pub(crate) fn new(sink: Option<Box<dyn EventSink>>) -> Self {
        Self {
            inner: sink.map(|sink| Arc::new(Mutex::new(sink))),
        }
    }

    /// Run `f` against the sink, if there is one
    pub(crate) fn with(&self, f: impl FnOnce(&mut dyn EventSink)) {
        if let Some(inner) = &self.inner {
            // A panicking observer must not take the session down with it
            let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut **guard);
        }
    }

    pub(crate) fn sent(&self, msg: &FrontendMessage) {
        self.with(|sink| report_sent(sink, msg));
    }

    pub(crate) fn received(&self, msg: &BackendMessage) {
        self.with(|sink| report_received(sink, msg));
    }
}

impl std::fmt::Debug for SharedSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSink")
            .field("attached", &self.inner.is_some())
            .finish()
    }
}
