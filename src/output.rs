//! The output boundary.
//!
//! The kernel forwards arbitrary values to a single pluggable consumer via
//! `Context::release_output`. All formatting (tabular reports, file
//! encoding) is external collaborator responsibility.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crossbeam_channel::Sender;

/// A released output value. Concrete reports downcast to their own types.
pub type OutputValue = Box<dyn Any + Send>;

/// External consumer of released output values.
pub trait OutputConsumer {
    /// Receives one released value, in release order.
    fn on_output(&mut self, value: OutputValue);
}

/// Default consumer: drops everything.
#[derive(Debug, Default)]
pub struct DiscardConsumer;

impl OutputConsumer for DiscardConsumer {
    fn on_output(&mut self, _value: OutputValue) {}
}

/// Shared handle to the values gathered by a [`CollectingConsumer`].
#[derive(Debug, Clone, Default)]
pub struct OutputLog {
    items: Rc<RefCell<Vec<OutputValue>>>,
}

impl OutputLog {
    /// Number of values released so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Returns true if nothing has been released.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Drains all values released so far, in release order.
    #[must_use]
    pub fn take(&self) -> Vec<OutputValue> {
        self.items.borrow_mut().drain(..).collect()
    }

    /// Maps every value of type `T` released so far, in release order.
    pub fn extract<T: 'static + Clone>(&self) -> Vec<T> {
        self.items
            .borrow()
            .iter()
            .filter_map(|v| v.downcast_ref::<T>().cloned())
            .collect()
    }
}

/// In-process consumer that appends every value to a shared log.
///
/// Used by tests and by report harnesses that post-process a finished run.
#[derive(Debug, Default)]
pub struct CollectingConsumer {
    log: OutputLog,
}

impl CollectingConsumer {
    /// Creates a consumer together with the handle to read it back.
    #[must_use]
    pub fn new() -> (Self, OutputLog) {
        let log = OutputLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl OutputConsumer for CollectingConsumer {
    fn on_output(&mut self, value: OutputValue) {
        self.log.items.borrow_mut().push(value);
    }
}

/// Consumer that forwards values over a crossbeam channel.
///
/// This is the boundary an experiment harness uses when it replicates a
/// scenario across parallel worker threads: each worker owns a private
/// simulation and sends released values to one central collector.
#[derive(Debug, Clone)]
pub struct ChannelConsumer {
    tx: Sender<OutputValue>,
}

impl ChannelConsumer {
    /// Wraps a channel sender.
    #[must_use]
    pub const fn new(tx: Sender<OutputValue>) -> Self {
        Self { tx }
    }
}

impl OutputConsumer for ChannelConsumer {
    fn on_output(&mut self, value: OutputValue) {
        // A disconnected collector means the harness has stopped listening;
        // the run itself is unaffected.
        let _ = self.tx.send(value);
    }
}
