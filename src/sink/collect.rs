//! Result-accumulating observer

use super::EventSink;
use crate::error::ServerError;
use crate::protocol::{BackendTag, FieldDescription, TransactionStatus};
use bytes::Bytes;

/// Raw outcome of one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Column descriptions, empty for statements that return no rows
    pub columns: Vec<FieldDescription>,
    /// Rows as raw cells; `None` is SQL NULL
    pub rows: Vec<Vec<Option<Bytes>>>,
    /// `CommandComplete` tag; `None` for an empty query, an error or a suspended portal
    pub tag: Option<String>,
    /// Server error that ended this statement
    pub error: Option<ServerError>,
    /// The portal hit its row limit before completing
    pub suspended: bool,
}

impl QueryResult {
    /// Whether the server reported an error for this statement
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Number of rows affected, parsed from the command tag
    ///
    /// `INSERT 0 5` yields 5, `SELECT 3` yields 3, `BEGIN` yields `None`.
    pub fn rows_affected(&self) -> Option<u64> {
        self.tag.as_deref()?.rsplit(' ').next()?.parse().ok()
    }
}

/// Accumulates the responses of one request cycle into [`QueryResult`]s
///
/// A result is closed by `CommandComplete`, `EmptyQueryResponse`,
/// `ErrorResponse` or `PortalSuspended`; the cycle is complete at
/// `ReadyForQuery`. Server errors are recorded, never raised.
#[derive(Debug, Default)]
pub struct ResultCollector {
    results: Vec<QueryResult>,
    current: Option<QueryResult>,
    notices: Vec<ServerError>,
    parameter_types: Option<Vec<u32>>,
    status: Option<TransactionStatus>,
}

impl ResultCollector {
    /// Empty collector
    pub fn new() -> Self {
        Self::default()
    }

    fn close_current(&mut self, f: impl FnOnce(&mut QueryResult)) {
        let mut result = self.current.take().unwrap_or_default();
        f(&mut result);
        self.results.push(result);
    }

    /// `ReadyForQuery` has been seen
    pub fn is_complete(&self) -> bool {
        self.status.is_some()
    }

    /// Transaction status from the closing `ReadyForQuery`
    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        self.status
    }

    /// Notices received during the cycle
    pub fn notices(&self) -> &[ServerError] {
        &self.notices
    }

    /// Parameter types from a statement `Describe`
    pub fn parameter_types(&self) -> Option<&[u32]> {
        self.parameter_types.as_deref()
    }

    /// Results closed so far
    pub fn results(&self) -> &[QueryResult] {
        &self.results
    }

    /// First server error in the cycle, if any
    pub fn first_error(&self) -> Option<&ServerError> {
        self.results.iter().find_map(|r| r.error.as_ref())
    }

    /// Take the accumulated results
    pub fn finish(mut self) -> Vec<QueryResult> {
        if let Some(partial) = self.current.take() {
            self.results.push(partial);
        }
        self.results
    }
}

impl EventSink for ResultCollector {
    fn received_row_description(&mut self, fields: &[FieldDescription]) {
        self.current.get_or_insert_with(QueryResult::default).columns = fields.to_vec();
    }

    fn received_data_row(&mut self, cells: &[Option<Bytes>]) {
        self.current
            .get_or_insert_with(QueryResult::default)
            .rows
            .push(cells.to_vec());
    }

    fn received_command_complete(&mut self, tag: &str) {
        self.close_current(|r| r.tag = Some(tag.to_string()));
    }

    fn received_empty_query(&mut self) {
        self.close_current(|_| {});
    }

    fn received_error(&mut self, error: &ServerError) {
        self.close_current(|r| r.error = Some(error.clone()));
    }

    fn received_notice(&mut self, notice: &ServerError) {
        self.notices.push(notice.clone());
    }

    fn received_parameter_description(&mut self, type_oids: &[u32]) {
        self.parameter_types = Some(type_oids.to_vec());
    }

    fn received_generic(&mut self, tag: BackendTag) {
        if tag == BackendTag::PortalSuspended {
            self.close_current(|r| r.suspended = true);
        }
    }

    fn received_ready_for_query(&mut self, status: TransactionStatus) {
        if let Some(partial) = self.current.take() {
            self.results.push(partial);
        }
        self.status = Some(status);
    }
}
