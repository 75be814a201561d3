//! Extended query requests

use crate::protocol::{DescribeTarget, Format, FrontendMessage};
use bytes::Bytes;

/// Shape of one Parse/Bind/Describe/Execute/Sync exchange
///
/// Parameter values are pre-serialized by the caller; `None` is SQL NULL.
/// Empty format lists mean "all text". Interpreting the response is left to
/// the decode function the request is paired with.
///
/// ```
/// use pgline::ExtendedQuery;
///
/// let query = ExtendedQuery::new("SELECT $1::int4 + 1")
///     .param_types(vec![23])
///     .param("41");
/// assert_eq!(query.messages().len(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct ExtendedQuery {
    statement: String,
    sql: Option<String>,
    param_types: Vec<u32>,
    portal: String,
    values: Vec<Option<Bytes>>,
    param_formats: Vec<Format>,
    result_formats: Vec<Format>,
    describe: Option<DescribeTarget>,
    max_rows: i32,
}

impl ExtendedQuery {
    /// Parse `sql` as the unnamed statement, then bind and run it
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: Some(sql.into()),
            ..Self::prepared("")
        }
    }

    /// Bind and run an already prepared statement; no Parse is sent
    pub fn prepared(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            sql: None,
            param_types: Vec::new(),
            portal: String::new(),
            values: Vec::new(),
            param_formats: Vec::new(),
            result_formats: Vec::new(),
            describe: Some(DescribeTarget::Portal),
            max_rows: 0,
        }
    }

    /// Name the prepared statement ("" is the unnamed one)
    pub fn statement(mut self, name: impl Into<String>) -> Self {
        self.statement = name.into();
        self
    }

    /// Parameter type oids; 0 lets the server infer
    pub fn param_types(mut self, oids: Vec<u32>) -> Self {
        self.param_types = oids;
        self
    }

    /// Append a parameter value
    pub fn param(mut self, value: impl Into<Bytes>) -> Self {
        self.values.push(Some(value.into()));
        self
    }

    /// Append a NULL parameter
    pub fn null_param(mut self) -> Self {
        self.values.push(None);
        self
    }

    /// Replace all parameter values
    pub fn values(mut self, values: Vec<Option<Bytes>>) -> Self {
        self.values = values;
        self
    }

    /// Parameter formats: none, one for all, or one per parameter
    pub fn param_formats(mut self, formats: Vec<Format>) -> Self {
        self.param_formats = formats;
        self
    }

    /// Result column formats: none, one for all, or one per column
    pub fn result_formats(mut self, formats: Vec<Format>) -> Self {
        self.result_formats = formats;
        self
    }

    /// Bind into a named portal
    pub fn portal(mut self, name: impl Into<String>) -> Self {
        self.portal = name.into();
        self
    }

    /// What to describe before executing; `None` sends no Describe
    pub fn describe(mut self, target: Option<DescribeTarget>) -> Self {
        self.describe = target;
        self
    }

    /// Row limit for Execute; 0 means no limit
    pub fn max_rows(mut self, max_rows: i32) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// The frontend messages, in send order
    pub fn messages(&self) -> Vec<FrontendMessage> {
        let mut messages = Vec::with_capacity(5);

        if let Some(sql) = &self.sql {
            messages.push(FrontendMessage::Parse {
                name: self.statement.clone(),
                query: sql.clone(),
                param_types: self.param_types.clone(),
            });
        }

        messages.push(FrontendMessage::Bind {
            portal: self.portal.clone(),
            statement: self.statement.clone(),
            param_formats: self.param_formats.clone(),
            values: self.values.clone(),
            result_formats: self.result_formats.clone(),
        });

        match self.describe {
            Some(DescribeTarget::Portal) => messages.push(FrontendMessage::Describe {
                target: DescribeTarget::Portal,
                name: self.portal.clone(),
            }),
            Some(DescribeTarget::Statement) => messages.push(FrontendMessage::Describe {
                target: DescribeTarget::Statement,
                name: self.statement.clone(),
            }),
            None => {}
        }

        messages.push(FrontendMessage::Execute {
            portal: self.portal.clone(),
            max_rows: self.max_rows,
        });
        messages.push(FrontendMessage::Sync);
        messages
    }
}
