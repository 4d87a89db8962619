//! # Listener Plumbing
//!
//! Advisory reporting hooks for prediction events.
//!
//! Listeners observe — they never influence the prediction outcome, and a
//! panicking listener is caught and logged rather than aborting the
//! prediction in flight.

use crate::alt_set::AltBitSet;
use crate::error::PredictionError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Context handed to ambiguity/context-sensitivity reports.
#[derive(Clone, Debug)]
pub struct ReportContext {
    /// The decision being predicted.
    pub decision: u32,
    /// Input index where the decision started.
    pub start_index: usize,
    /// Input index where the event was identified.
    pub stop_index: usize,
    /// Number of the DFA state at the event, when one was interned.
    pub dfa_state: Option<u32>,
}

/// Receives prediction events.
///
/// All methods default to no-ops so implementations override only what
/// they care about.
pub trait PredictionListener: Send + Sync {
    /// A prediction failed outright.
    fn syntax_error(&self, _error: &PredictionError) {}

    /// Full-context prediction remained ambiguous. `exact` is `true` when
    /// every alternative in `ambig_alts` is truly viable.
    fn report_ambiguity(&self, _context: &ReportContext, _exact: bool, _ambig_alts: &AltBitSet) {}

    /// SLL prediction conflicted and the simulator is falling over to
    /// full-context prediction.
    fn report_attempting_full_context(
        &self,
        _context: &ReportContext,
        _conflicting_alts: &AltBitSet,
    ) {
    }

    /// Full-context prediction produced a unique result where SLL
    /// conflicted.
    fn report_context_sensitivity(&self, _context: &ReportContext, _prediction: u32) {}
}

/// Dispatches every event to a collection of delegates.
///
/// Registration and removal are cheap; dispatch clones the current
/// delegate list so listeners may detach themselves re-entrantly.
#[derive(Default)]
pub struct ProxyListener {
    delegates: parking_lot::RwLock<Vec<Arc<dyn PredictionListener>>>,
}

impl ProxyListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a delegate.
    pub fn attach(&self, listener: Arc<dyn PredictionListener>) {
        self.delegates.write().push(listener);
    }

    /// Detach a previously attached delegate (by identity).
    pub fn detach(&self, listener: &Arc<dyn PredictionListener>) {
        self.delegates
            .write()
            .retain(|existing| !Arc::ptr_eq(existing, listener));
    }

    /// Detach everything.
    pub fn clear(&self) {
        self.delegates.write().clear();
    }

    /// Number of attached delegates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.delegates.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delegates.read().is_empty()
    }

    fn each(&self, f: impl Fn(&dyn PredictionListener)) {
        let delegates = self.delegates.read().clone();
        for listener in delegates {
            // listeners are advisory; a panic must not abort prediction
            if catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))).is_err() {
                tracing::warn!("prediction listener panicked; continuing");
            }
        }
    }
}

impl PredictionListener for ProxyListener {
    fn syntax_error(&self, error: &PredictionError) {
        self.each(|l| l.syntax_error(error));
    }

    fn report_ambiguity(&self, context: &ReportContext, exact: bool, ambig_alts: &AltBitSet) {
        self.each(|l| l.report_ambiguity(context, exact, ambig_alts));
    }

    fn report_attempting_full_context(
        &self,
        context: &ReportContext,
        conflicting_alts: &AltBitSet,
    ) {
        self.each(|l| l.report_attempting_full_context(context, conflicting_alts));
    }

    fn report_context_sensitivity(&self, context: &ReportContext, prediction: u32) {
        self.each(|l| l.report_context_sensitivity(context, prediction));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        ambiguities: AtomicUsize,
        sensitivities: AtomicUsize,
    }

    impl PredictionListener for Counter {
        fn report_ambiguity(&self, _: &ReportContext, _: bool, _: &AltBitSet) {
            self.ambiguities.fetch_add(1, Ordering::SeqCst);
        }

        fn report_context_sensitivity(&self, _: &ReportContext, _: u32) {
            self.sensitivities.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicker;

    impl PredictionListener for Panicker {
        fn report_ambiguity(&self, _: &ReportContext, _: bool, _: &AltBitSet) {
            panic!("listener bug");
        }
    }

    fn report_ctx() -> ReportContext {
        ReportContext {
            decision: 0,
            start_index: 0,
            stop_index: 1,
            dfa_state: None,
        }
    }

    #[test]
    fn proxy_dispatches_to_all() {
        let proxy = ProxyListener::new();
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        proxy.attach(a.clone());
        proxy.attach(b.clone());

        proxy.report_ambiguity(&report_ctx(), true, &AltBitSet::all(2));
        assert_eq!(a.ambiguities.load(Ordering::SeqCst), 1);
        assert_eq!(b.ambiguities.load(Ordering::SeqCst), 1);

        let detachable: Arc<dyn PredictionListener> = b.clone();
        proxy.detach(&detachable);
        proxy.report_ambiguity(&report_ctx(), true, &AltBitSet::all(2));
        assert_eq!(a.ambiguities.load(Ordering::SeqCst), 2);
        assert_eq!(b.ambiguities.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_listener_does_not_poison_dispatch() {
        let proxy = ProxyListener::new();
        let counter = Arc::new(Counter::default());
        proxy.attach(Arc::new(Panicker));
        proxy.attach(counter.clone());

        proxy.report_ambiguity(&report_ctx(), false, &AltBitSet::all(2));
        assert_eq!(counter.ambiguities.load(Ordering::SeqCst), 1);
    }
}
