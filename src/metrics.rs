//! Metrics emitted through the `metrics` facade
//!
//! The crate never installs a recorder. Without one every call below is a
//! no-op; applications that want the numbers install an exporter of their
//! choice before connecting.

/// Label values
pub mod labels {
    /// Cleartext password authentication
    pub const MECHANISM_CLEARTEXT: &str = "cleartext";
    /// MD5 password authentication
    pub const MECHANISM_MD5: &str = "md5";
    /// Trust / no password requested
    pub const MECHANISM_NONE: &str = "none";

    /// Server rejected the credentials with an `ErrorResponse`
    pub const REASON_SERVER_ERROR: &str = "server_error";
    /// Password required but not configured
    pub const REASON_MISSING_PASSWORD: &str = "missing_password";
    /// Server asked for a method this client does not implement
    pub const REASON_UNSUPPORTED: &str = "unsupported_method";
    /// Malformed challenge
    pub const REASON_PROTOCOL: &str = "protocol";
}

/// Counters
pub mod counters {
    use metrics::counter;

    /// One packet written to the server
    pub fn packet_sent(message: &'static str) {
        counter!("pgline_packets_sent_total", "message" => message).increment(1);
    }

    /// One packet decoded from the server
    pub fn packet_received(message: String) {
        counter!("pgline_packets_received_total", "message" => message).increment(1);
    }

    /// The server requested a password
    pub fn auth_attempted(mechanism: &'static str) {
        counter!("pgline_auth_attempts_total", "mechanism" => mechanism).increment(1);
    }

    /// `AuthenticationOk` received
    pub fn auth_successful(mechanism: &'static str) {
        counter!("pgline_auth_success_total", "mechanism" => mechanism).increment(1);
    }

    /// The handshake failed while authenticating
    pub fn auth_failed(mechanism: &'static str, reason: &'static str) {
        counter!(
            "pgline_auth_failures_total",
            "mechanism" => mechanism,
            "reason" => reason
        )
        .increment(1);
    }

    /// Queued receive requests failed because the reader stopped
    pub fn receive_cancelled(count: u64) {
        counter!("pgline_receive_cancelled_total").increment(count);
    }
}

/// Histograms
pub mod histograms {
    use metrics::histogram;

    /// Time from first challenge to `AuthenticationOk`
    pub fn auth_duration(mechanism: &'static str, duration_ms: u64) {
        histogram!("pgline_auth_duration_ms", "mechanism" => mechanism).record(duration_ms as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        counters::packet_sent("QUERY");
        counters::packet_received("READY_FOR_QUERY".to_string());
        counters::auth_attempted(labels::MECHANISM_MD5);
        counters::auth_successful(labels::MECHANISM_MD5);
        counters::auth_failed(labels::MECHANISM_MD5, labels::REASON_SERVER_ERROR);
        counters::receive_cancelled(3);
        histograms::auth_duration(labels::MECHANISM_MD5, 12);
    }
}
