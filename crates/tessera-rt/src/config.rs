use serde::Deserialize;

use crate::error::RuntimeError;

/// Stack size given to every spawned OS thread unless overridden.
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024; // 1 MiB

/// Smallest stack size accepted for spawned threads.
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// How the bootstrap thread's stack extent is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapStack {
    /// Walk the stack downward until the first protection fault. Only used
    /// when bootstrapping on the process's original thread; other threads
    /// fall back to [`BootstrapStack::Query`].
    #[default]
    Probe,
    /// Trust the bounds reported by the OS thread attributes.
    Query,
}

/// Settings for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Stack size, in bytes, of every spawned OS thread.
    pub stack_size: usize,
    pub bootstrap_stack: BootstrapStack,
    /// High address of the bootstrap thread's stack. The OS-reported top is
    /// used when unset.
    #[serde(skip)]
    pub bootstrap_stack_start: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            bootstrap_stack: BootstrapStack::default(),
            bootstrap_stack_start: None,
        }
    }
}

impl RuntimeConfig {
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn with_bootstrap_stack(mut self, strategy: BootstrapStack) -> Self {
        self.bootstrap_stack = strategy;
        self
    }

    pub fn with_bootstrap_stack_start(mut self, start: usize) -> Self {
        self.bootstrap_stack_start = Some(start);
        self
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.stack_size < MIN_STACK_SIZE {
            return Err(RuntimeError::InvalidConfig(format!(
                "stack_size {} is below the minimum of {} bytes",
                self.stack_size, MIN_STACK_SIZE
            )));
        }
        if self.bootstrap_stack_start == Some(0) {
            return Err(RuntimeError::InvalidConfig(
                "bootstrap_stack_start must not be null".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_one_mebibyte_stacks() {
        let config = RuntimeConfig::default();
        assert_eq!(config.stack_size, 1024 * 1024);
        assert_eq!(config.bootstrap_stack, BootstrapStack::Probe);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tiny_stacks_are_rejected() {
        let config = RuntimeConfig::default().with_stack_size(4096);
        assert!(matches!(config.validate(), Err(RuntimeError::InvalidConfig(_))));
    }
}
