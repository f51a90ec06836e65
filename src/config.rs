// MIT License - Copyright (c) 2026 Peter Wright
// Dialer and path configuration

use std::time::Duration;

use crate::constants::{
    DEFAULT_PATH_TIMEOUT, DEFAULT_POLL_RETRY_DELAY, DEFAULT_SEND_RETRY_DELAY, RECEIVE_BUFFER_SIZE,
};

/// Identity and timing defaults for a [`Dialer`](crate::dialer::Dialer).
#[derive(Debug, Clone)]
pub struct DialerConfig {
    /// Account number. Most receivers expect 4 to 8 digits.
    pub account: String,
    /// Receiver number for the block header
    pub receiver: Option<u32>,
    /// Line number for the block header
    pub line: Option<u32>,
    /// Connect and answer timeout applied to each path (default: 5s)
    pub path_timeout: Duration,
    /// Delay between delivery retries while every path is failing (default: 500ms)
    pub send_retry_delay: Duration,
    /// Scheduler iteration delay used when routines start the scheduler (default: 5s)
    pub poll_retry_delay: Duration,
    /// Size of the single read for each answer (default: 1024)
    pub receive_buffer_size: usize,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            account: "0000".to_string(),
            receiver: None,
            line: None,
            path_timeout: DEFAULT_PATH_TIMEOUT,
            send_retry_delay: DEFAULT_SEND_RETRY_DELAY,
            poll_retry_delay: DEFAULT_POLL_RETRY_DELAY,
            receive_buffer_size: RECEIVE_BUFFER_SIZE,
        }
    }
}

impl DialerConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> DialerConfigBuilder {
        DialerConfigBuilder::default()
    }
}

/// Builder for DialerConfig.
#[derive(Debug, Clone, Default)]
pub struct DialerConfigBuilder {
    config: DialerConfig,
}

impl DialerConfigBuilder {
    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.config.account = account.into();
        self
    }

    pub fn receiver(mut self, receiver: u32) -> Self {
        self.config.receiver = Some(receiver);
        self
    }

    pub fn line(mut self, line: u32) -> Self {
        self.config.line = Some(line);
        self
    }

    pub fn path_timeout(mut self, timeout: Duration) -> Self {
        self.config.path_timeout = timeout;
        self
    }

    pub fn send_retry_delay(mut self, delay: Duration) -> Self {
        self.config.send_retry_delay = delay;
        self
    }

    pub fn poll_retry_delay(mut self, delay: Duration) -> Self {
        self.config.poll_retry_delay = delay;
        self
    }

    pub fn receive_buffer_size(mut self, size: usize) -> Self {
        self.config.receive_buffer_size = size.max(1);
        self
    }

    pub fn build(self) -> DialerConfig {
        self.config
    }
}

/// Fully resolved identity of one path, handed to the frame codec factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathIdentity {
    pub account: String,
    /// Encryption key (16, 24 or 32 bytes) if the receiver expects encrypted blocks
    pub key: Option<Vec<u8>>,
    pub receiver: Option<u32>,
    pub line: Option<u32>,
}

/// Settings for [`Dialer::set_path`](crate::dialer::Dialer::set_path).
///
/// Account, receiver and line fall back to the dialer's defaults when unset.
#[derive(Debug, Clone)]
pub struct PathOptions {
    pub host: String,
    pub port: u16,
    pub account: Option<String>,
    pub key: Option<Vec<u8>>,
    pub receiver: Option<u32>,
    pub line: Option<u32>,
    pub timeout: Option<Duration>,
}

impl PathOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            account: None,
            key: None,
            receiver: None,
            line: None,
            timeout: None,
        }
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn receiver(mut self, receiver: u32) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `host:port` as used for connecting and logging.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = DialerConfig::builder()
            .account("123456")
            .receiver(7)
            .line(2)
            .send_retry_delay(Duration::from_millis(50))
            .build();

        assert_eq!(config.account, "123456");
        assert_eq!(config.receiver, Some(7));
        assert_eq!(config.line, Some(2));
        assert_eq!(config.send_retry_delay, Duration::from_millis(50));
        assert_eq!(config.path_timeout, DEFAULT_PATH_TIMEOUT);
    }

    #[test]
    fn test_config_defaults() {
        let config = DialerConfig::builder().build();
        assert_eq!(config.receiver, None);
        assert_eq!(config.poll_retry_delay, Duration::from_secs(5));
        assert_eq!(config.send_retry_delay, Duration::from_millis(500));
        assert_eq!(config.receive_buffer_size, 1024);
    }

    #[test]
    fn test_receive_buffer_never_zero() {
        let config = DialerConfig::builder().receive_buffer_size(0).build();
        assert_eq!(config.receive_buffer_size, 1);
    }

    #[test]
    fn test_path_options() {
        let opts = PathOptions::new("10.0.0.1", 12000).account("9999").line(3);
        assert_eq!(opts.endpoint(), "10.0.0.1:12000");
        assert_eq!(opts.account.as_deref(), Some("9999"));
        assert_eq!(opts.line, Some(3));
        assert!(opts.key.is_none());
    }
}
