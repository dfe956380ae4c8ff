// Tracing log adapter - Structured logging using tracing crate

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::ports::*;

/// Log adapter forwarding to `tracing`, tagged with the component name
pub struct TracingLogAdapter {
    component: &'static str,
}

impl TracingLogAdapter {
    /// Create new tracing log adapter
    pub fn new(component: &'static str) -> Self {
        Self { component }
    }
}

#[async_trait]
impl LogPort for TracingLogAdapter {
    async fn info(&self, message: &str) {
        info!(component = self.component, "{}", message);
    }

    async fn warn(&self, message: &str) {
        warn!(component = self.component, "{}", message);
    }

    async fn error(&self, message: &str) {
        error!(component = self.component, "{}", message);
    }

    async fn debug(&self, message: &str) {
        debug!(component = self.component, "{}", message);
    }
}

/// Log adapter that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NopLogAdapter;

#[async_trait]
impl LogPort for NopLogAdapter {
    async fn info(&self, _message: &str) {}

    async fn warn(&self, _message: &str) {}

    async fn error(&self, _message: &str) {}

    async fn debug(&self, _message: &str) {}
}
