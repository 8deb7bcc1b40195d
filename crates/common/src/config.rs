#[derive(Debug, Clone)]
pub struct Config {
    // native backend configuration
    /// number of worker threads completing native callbacks
    pub worker_threads: usize,
    /// maximum number of queued native calls,
    ///  if not set then the queue is unbounded
    pub max_queue_size: Option<usize>,

    // misc
    pub log_level: tracing::Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            max_queue_size: Some(4096),
            log_level: tracing::Level::INFO,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.max_queue_size == Some(0) {
            return Err(ConfigError::EmptyQueue);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("worker_threads must be at least 1")]
    NoWorkers,
    #[error("max_queue_size must be at least 1 when set")]
    EmptyQueue,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.max_queue_size, Some(4096));
        assert_eq!(config.log_level, tracing::Level::INFO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_sizes_are_rejected() {
        let config = Config {
            worker_threads: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoWorkers));

        let config = Config {
            max_queue_size: Some(0),
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyQueue));

        let config = Config {
            max_queue_size: None,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }
}
