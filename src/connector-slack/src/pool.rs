//! Shared Slack clients.
//!
//! Adapters configured with `share_slack_connection` draw their client from a
//! [`ConnectionPool`] keyed by bot token, so components of one connector
//! instance talking to the same workspace reuse a single HTTP client.
//! The pool is an ordinary value handed to each adapter; there is no global.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::api::SlackClient;
use crate::config::SlackOutputConfig;
use crate::error::SlackResult;

/// Registry of clients keyed by bot token.
#[derive(Debug, Default, Clone)]
pub struct ConnectionPool {
    clients: Arc<DashMap<String, Arc<SlackClient>>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client for `config`.
    ///
    /// Shared configurations get the pooled client for their bot token,
    /// creating it on first use; others always get a private client.
    pub fn client_for(&self, config: &SlackOutputConfig) -> SlackResult<Arc<SlackClient>> {
        if !config.share_slack_connection {
            return Ok(Arc::new(SlackClient::new(config)?));
        }

        if let Some(client) = self.clients.get(config.bot_token()) {
            return Ok(client.clone());
        }

        let client = self
            .clients
            .entry(config.bot_token().to_string())
            .or_try_insert_with(|| {
                debug!("Creating shared Slack client");
                SlackClient::new(config).map(Arc::new)
            })?;
        Ok(client.clone())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_clients_are_reused() {
        let pool = ConnectionPool::new();
        let mut config = SlackOutputConfig::new("xoxb-shared");
        config.share_slack_connection = true;

        let a = pool.client_for(&config).unwrap();
        let b = pool.client_for(&config).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);

        let mut other = SlackOutputConfig::new("xoxb-other");
        other.share_slack_connection = true;
        let c = pool.client_for(&other).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_unshared_clients_are_private() {
        let pool = ConnectionPool::new();
        let config = SlackOutputConfig::new("xoxb-private");

        let a = pool.client_for(&config).unwrap();
        let b = pool.client_for(&config).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(pool.is_empty());
    }
}
