//! Connection configuration

use crate::{Error, Result};
use std::time::Duration;

/// Default `application_name` sent at startup
pub const DEFAULT_APPLICATION_NAME: &str = "pgline";

/// Default number of receive requests that may be queued on a session
pub const DEFAULT_RECEIVE_QUEUE_CAPACITY: usize = 5;

/// Connection configuration
///
/// Stores connection parameters including database, credentials, and optional timeouts.
/// Use `ConnectionConfig::builder()` for advanced configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Database name
    pub database: String,
    /// Username
    pub user: String,
    /// Password (optional)
    pub password: Option<String>,
    /// Additional startup parameters, in send order
    pub params: Vec<(String, String)>,
    /// TCP connection timeout, used by [`Session::connect`](super::Session::connect)
    pub connect_timeout: Option<Duration>,
    /// Query statement timeout, sent as the `statement_timeout` parameter
    pub statement_timeout: Option<Duration>,
    /// Application name for Postgres logs (default: "pgline")
    pub application_name: Option<String>,
    /// Bound on queued receive requests (default: 5)
    pub receive_queue_capacity: usize,
}

impl ConnectionConfig {
    /// Create new configuration with defaults
    ///
    /// # Arguments
    ///
    /// * `database` - Database name
    /// * `user` - Username
    pub fn new(database: impl Into<String>, user: impl Into<String>) -> Self {
        Self::builder(database, user).build()
    }

    /// Create a builder for advanced configuration
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use pgline::ConnectionConfig;
    ///
    /// let config = ConnectionConfig::builder("mydb", "user")
    ///     .password("secret")
    ///     .statement_timeout(Duration::from_secs(30))
    ///     .build();
    /// assert_eq!(config.database, "mydb");
    /// ```
    pub fn builder(
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            database: database.into(),
            user: user.into(),
            password: None,
            params: Vec::new(),
            connect_timeout: None,
            statement_timeout: None,
            application_name: None,
            receive_queue_capacity: DEFAULT_RECEIVE_QUEUE_CAPACITY,
        }
    }

    /// Set password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Add connection parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        upsert(&mut self.params, key.into(), value.into());
        self
    }

    /// Reject settings the session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.receive_queue_capacity == 0 {
            return Err(Error::Config(
                "receive_queue_capacity must be at least 1".into(),
            ));
        }
        if self.user.is_empty() {
            return Err(Error::Config("user must not be empty".into()));
        }
        Ok(())
    }

    /// Startup parameters in the order they are sent
    ///
    /// `user`, `database`, `application_name`, `client_encoding`, then
    /// `statement_timeout` when set, then caller parameters. A caller
    /// parameter whose key is already present replaces that value in place.
    pub fn startup_parameters(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("user".to_string(), self.user.clone()),
            ("database".to_string(), self.database.clone()),
            (
                "application_name".to_string(),
                self.application_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_APPLICATION_NAME.to_string()),
            ),
            ("client_encoding".to_string(), "UTF8".to_string()),
        ];

        // Statement timeout in milliseconds
        if let Some(timeout) = self.statement_timeout {
            params.push((
                "statement_timeout".to_string(),
                timeout.as_millis().to_string(),
            ));
        }

        for (key, value) in &self.params {
            upsert(&mut params, key.clone(), value.clone());
        }

        params
    }
}

fn upsert(params: &mut Vec<(String, String)>, key: String, value: String) {
    match params.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => params.push((key, value)),
    }
}

/// Builder for creating `ConnectionConfig` with advanced options
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    database: String,
    user: String,
    password: Option<String>,
    params: Vec<(String, String)>,
    connect_timeout: Option<Duration>,
    statement_timeout: Option<Duration>,
    application_name: Option<String>,
    receive_queue_capacity: usize,
}

impl ConnectionConfigBuilder {
    /// Set the password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Add a startup parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        upsert(&mut self.params, key.into(), value.into());
        self
    }

    /// Set TCP connection timeout
    ///
    /// Default: None (no timeout)
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Set statement (query) timeout
    ///
    /// Default: None (server default)
    pub fn statement_timeout(mut self, duration: Duration) -> Self {
        self.statement_timeout = Some(duration);
        self
    }

    /// Set application name for Postgres logs
    ///
    /// Default: "pgline"
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Bound the number of queued receive requests
    ///
    /// Submitting past the bound waits for a slot. Default: 5
    pub fn receive_queue_capacity(mut self, capacity: usize) -> Self {
        self.receive_queue_capacity = capacity;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConnectionConfig {
        ConnectionConfig {
            database: self.database,
            user: self.user,
            password: self.password,
            params: self.params,
            connect_timeout: self.connect_timeout,
            statement_timeout: self.statement_timeout,
            application_name: self.application_name,
            receive_queue_capacity: self.receive_queue_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(params: &[(String, String)]) -> Vec<&str> {
        params.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn test_default_startup_parameters() {
        let config = ConnectionConfig::new("db", "me");
        let params = config.startup_parameters();

        assert_eq!(
            keys(&params),
            vec!["user", "database", "application_name", "client_encoding"]
        );
        assert_eq!(params[0].1, "me");
        assert_eq!(params[1].1, "db");
        assert_eq!(params[2].1, "pgline");
        assert_eq!(params[3].1, "UTF8");
    }

    #[test]
    fn test_builder_options() {
        let config = ConnectionConfig::builder("db", "me")
            .password("pw")
            .application_name("reporting")
            .statement_timeout(Duration::from_secs(30))
            .param("TimeZone", "UTC")
            .build();
        let params = config.startup_parameters();

        assert_eq!(config.password.as_deref(), Some("pw"));
        assert_eq!(params[2].1, "reporting");
        assert_eq!(params[4], ("statement_timeout".to_string(), "30000".to_string()));
        assert_eq!(params[5], ("TimeZone".to_string(), "UTC".to_string()));
    }

    #[test]
    fn test_caller_param_replaces_in_place() {
        let config = ConnectionConfig::new("db", "me")
            .param("client_encoding", "LATIN1")
            .param("search_path", "a")
            .param("search_path", "b");
        let params = config.startup_parameters();

        assert_eq!(
            keys(&params),
            vec![
                "user",
                "database",
                "application_name",
                "client_encoding",
                "search_path"
            ]
        );
        assert_eq!(params[3].1, "LATIN1");
        assert_eq!(params[4].1, "b");
    }

    #[test]
    fn test_validate() {
        assert!(ConnectionConfig::new("db", "me").validate().is_ok());

        let zero = ConnectionConfig::builder("db", "me")
            .receive_queue_capacity(0)
            .build();
        assert!(matches!(zero.validate(), Err(Error::Config(_))));

        assert!(ConnectionConfig::new("db", "").validate().is_err());
    }
}
