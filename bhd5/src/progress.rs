//! Progress aggregator.
//!
//! Combines N child progress fractions (`[0, 1]`) into a single forwarded
//! mean. Not a hot path, so a plain mutex-guarded `Vec` is the right tool
//! rather than an async channel.

use std::sync::{Arc, Mutex};

/// A single child's reported fraction, shared with its owning
/// [`ProgressAggregator`].
#[derive(Clone)]
pub struct ProgressSource {
    index: usize,
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    children: Vec<f64>,
    on_update: Option<Box<dyn Fn(f64) + Send + Sync>>,
}

/// Aggregates N child [`ProgressSource`]s into a single downstream mean.
#[derive(Clone)]
pub struct ProgressAggregator {
    inner: Arc<Mutex<Inner>>,
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                children: Vec::new(),
                on_update: None,
            })),
        }
    }

    /// Register a callback invoked with the current mean on every child
    /// update.
    pub fn on_update(&self, f: impl Fn(f64) + Send + Sync + 'static) {
        self.inner.lock().unwrap().on_update = Some(Box::new(f));
    }

    /// Attach a new child, initialized to 0, and return its handle.
    pub fn attach(&self) -> ProgressSource {
        let mut guard = self.inner.lock().unwrap();
        let index = guard.children.len();
        guard.children.push(0.0);
        drop(guard);
        ProgressSource {
            index,
            inner: self.inner.clone(),
        }
    }

    /// The current arithmetic mean across all attached children.
    pub fn mean(&self) -> f64 {
        let guard = self.inner.lock().unwrap();
        mean(&guard.children)
    }
}

impl ProgressSource {
    /// Report a new fraction for this child; recomputes and forwards the
    /// aggregate mean.
    pub fn update(&self, fraction: f64) {
        let mut guard = self.inner.lock().unwrap();
        guard.children[self.index] = fraction.clamp(0.0, 1.0);
        let mean = mean(&guard.children);
        if let Some(cb) = &guard.on_update {
            cb(mean);
        }
    }
}

fn mean(children: &[f64]) -> f64 {
    if children.is_empty() {
        0.0
    } else {
        children.iter().sum::<f64>() / children.len() as f64
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mean_of_two_children() {
        let agg = ProgressAggregator::new();
        let a = agg.attach();
        let b = agg.attach();
        assert_eq!(agg.mean(), 0.0);
        a.update(1.0);
        assert_eq!(agg.mean(), 0.5);
        b.update(1.0);
        assert_eq!(agg.mean(), 1.0);
    }

    #[test]
    fn forwards_mean_via_callback() {
        let agg = ProgressAggregator::new();
        let last = Arc::new(Mutex::new(0.0));
        let last2 = last.clone();
        agg.on_update(move |m| *last2.lock().unwrap() = m);
        let a = agg.attach();
        a.update(0.5);
        assert_eq!(*last.lock().unwrap(), 0.5);
    }
}
