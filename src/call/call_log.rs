//! Per-Call Log Capture
//!
//! A tracing layer installed once at startup. The supervisor attaches a
//! buffer for the duration of its call; every log record emitted anywhere in
//! the process while a call runs lands in that call's `logs` field.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Shared buffer the layer writes into while a call is active
#[derive(Clone, Default)]
pub struct CallLogBuffer {
    inner: Arc<Mutex<Option<String>>>,
}

impl CallLogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start capturing; any previous buffer is discarded
    pub fn attach(&self) {
        *self.inner.lock().expect("call log poisoned") = Some(String::new());
    }

    /// Stop capturing and return everything collected
    pub fn detach(&self) -> String {
        self.inner
            .lock()
            .expect("call log poisoned")
            .take()
            .unwrap_or_default()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.lock().expect("call log poisoned").is_some()
    }

    fn append(&self, line: &str) {
        if let Some(buffer) = self.inner.lock().expect("call log poisoned").as_mut() {
            buffer.push_str(line);
            buffer.push('\n');
        }
    }
}

/// Layer forwarding formatted events into the active call's buffer
pub struct CallLogLayer {
    buffer: CallLogBuffer,
}

impl CallLogLayer {
    pub fn new(buffer: CallLogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S: Subscriber> Layer<S> for CallLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.buffer.is_attached() {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let mut line = String::with_capacity(visitor.message.len() + 32);
        let _ = write!(
            line,
            "{} {}: {}",
            metadata.level(),
            metadata.target(),
            visitor.message
        );
        self.buffer.append(&line);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            let _ = write!(self.message, "{}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            let _ = write!(self.message, "{}={}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_capture_only_while_attached() {
        let buffer = CallLogBuffer::new();
        let subscriber =
            tracing_subscriber::registry().with(CallLogLayer::new(buffer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("before attach");
            buffer.attach();
            tracing::info!("during call");
            tracing::warn!(queue = "sip-tx", "overflow");
            let captured = buffer.detach();

            assert!(!captured.contains("before attach"));
            assert!(captured.contains("during call"));
            assert!(captured.contains("overflow"));
            assert!(captured.contains("WARN"));

            tracing::info!("after detach");
            assert_eq!(buffer.detach(), "");
        });
    }

    #[test]
    fn test_attach_resets_previous_buffer() {
        let buffer = CallLogBuffer::new();
        let subscriber =
            tracing_subscriber::registry().with(CallLogLayer::new(buffer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            buffer.attach();
            tracing::info!("first call");
            buffer.attach();
            tracing::info!("second call");

            let captured = buffer.detach();
            assert!(!captured.contains("first call"));
            assert!(captured.contains("second call"));
        });
    }
}
