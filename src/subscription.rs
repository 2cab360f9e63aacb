use crate::object_sink::ObjectSink;
use crate::row::Row;
use crate::thread_context::SubscriptionId;
use crate::{WbemConnection, WbemError, WbemResult};
use log::{debug, warn};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use windows::core::{Interface, BSTR};
use windows::Win32::System::Com::{CoCreateInstance, CLSCTX_LOCAL_SERVER};
use windows::Win32::System::Wmi::{
    IUnsecuredApartment, IWbemObjectSink, IWbemServices, UnsecuredApartment,
    WBEM_FLAG_DIRECT_READ, WBEM_FLAG_SEND_STATUS,
};

/// A provider status report, forwarded to the event target as its own event
/// kind (never as a row).
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionStatus {
    /// The provider's status discriminator (progress, requirements, ...).
    pub kind: i32,
    /// The native status code accompanying the report.
    pub hres: i32,
    /// Provider-supplied text, when there is any.
    pub message: String,
}

/// The caller-supplied receiver for one async query's events.
///
/// All three event callbacks are invoked on provider-chosen worker threads,
/// never on the submitting thread. Within one subscription, events arrive in
/// provider-submission order; nothing is guaranteed across subscriptions.
///
/// Cancellation matches targets by *value*: implement
/// [`same_target`](Self::same_target) so that two instances referring to the
/// same logical receiver compare equal, typically by downcasting `other`
/// through [`as_any`](Self::as_any) and comparing with `PartialEq`.
pub trait EventTarget: Send + Sync {
    /// One materialized result row.
    fn row_available(&self, row: Row);

    /// A provider status report (requested via `send_status` at submit time,
    /// though providers may also report unsolicited).
    fn status(&self, status: SubscriptionStatus);

    /// The stream ended; no new rows will be initiated. Carries the
    /// provider's final status code.
    fn completed(&self, hres: i32);

    fn same_target(&self, other: &dyn EventTarget) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// Identifies a submitted subscription, as an alternative to cancelling by
/// event target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(pub(crate) SubscriptionId);

pub(crate) struct SubscriptionEntry {
    pub id: SubscriptionId,
    pub query: String,
    pub target: Arc<dyn EventTarget>,
    /// The sink handle that was submitted to the provider; cancellation must
    /// present the same object.
    pub sink: IWbemObjectSink,
}

/// The set of live subscriptions. An entry is present iff its provider-side
/// callback has neither been told to stop nor signaled completion.
#[derive(Default)]
pub(crate) struct SinkRegistry {
    entries: Mutex<Vec<SubscriptionEntry>>,
}

impl SinkRegistry {
    fn register(&self, entry: SubscriptionEntry) {
        self.entries.lock().unwrap().push(entry);
    }

    /// Removal can race between explicit cancellation and the sink observing
    /// completion; both callers tolerate the entry being gone already.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    /// The last registered entry whose target matches `target` by value.
    fn find_target(&self, target: &dyn EventTarget) -> Option<(SubscriptionId, IWbemObjectSink)> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|entry| target.same_target(entry.target.as_ref()))
            .map(|entry| (entry.id, entry.sink.clone()))
    }

    fn find_id(&self, id: SubscriptionId) -> Option<(SubscriptionId, IWbemObjectSink)> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| (entry.id, entry.sink.clone()))
    }

    fn drain(&self) -> Vec<(SubscriptionId, String, IWbemObjectSink)> {
        self.entries
            .lock()
            .unwrap()
            .drain(..)
            .map(|entry| (entry.id, entry.query, entry.sink))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

///
/// ### Asynchronous query methods
///
impl WbemConnection {
    /// Submit an asynchronous WQL query.
    ///
    /// Rows stream to `target` from provider worker threads until the
    /// provider reports completion or the subscription is cancelled. With
    /// `send_status`, the provider is asked to also deliver progress reports.
    ///
    /// The subscription is registered before this returns, so a cancellation
    /// issued immediately afterwards is guaranteed to find it. Submitting a
    /// second query against the same target is not deduplicated; it creates a
    /// second, independent subscription.
    pub fn exec_query_async(
        &self,
        query: impl AsRef<str>,
        target: Arc<dyn EventTarget>,
        send_status: bool,
    ) -> WbemResult<SubscriptionHandle> {
        let query = query.as_ref();

        if query.is_empty() {
            return Err(WbemError::EmptyQuery);
        }
        let svc = self.svc()?;

        let id = SubscriptionId::next();
        let done = Arc::new(AtomicBool::new(false));

        let sink = ObjectSink::new(
            id,
            target.clone(),
            self.sinks.clone(),
            self.threads.clone(),
            done.clone(),
        );
        let sink_handle: IWbemObjectSink = sink.into();

        // Deliveries cross thread (and possibly process) boundaries; an
        // unsecured apartment stub spares the embedder from configuring COM
        // security on every delivering thread. Without one the raw sink is a
        // degraded but functional fallback.
        let active_sink = match wrap_in_unsecured_apartment(&sink_handle) {
            Ok(stub) => {
                debug!("Using unsecured apartment for async queries");
                stub
            }
            Err(e) => {
                debug!("No unsecured apartment stub ({}); using the sink directly", e);
                sink_handle
            }
        };

        debug!("Async WQL: {}", query);

        let query_language = BSTR::from("WQL");
        let query_text = BSTR::from(query);

        let flags = if send_status {
            WBEM_FLAG_DIRECT_READ | WBEM_FLAG_SEND_STATUS
        } else {
            WBEM_FLAG_DIRECT_READ
        };

        unsafe {
            svc.ExecQueryAsync(&query_language, &query_text, flags, None, &active_sink)
                .map_err(|e| WbemError::HResultError { hres: e.code().0 })?;
        }

        self.sinks.register(SubscriptionEntry {
            id,
            query: query.to_string(),
            target,
            sink: active_sink,
        });

        // The stream may already have completed on a worker thread, in which
        // case its removal preceded this registration.
        if done.load(Ordering::SeqCst) {
            self.sinks.remove(id);
        }

        Ok(SubscriptionHandle(id))
    }

    /// Cancel the live subscription whose event target equals `target` by
    /// value (the last registered one, when several share a target).
    ///
    /// Cancellation is best effort and asynchronous: a success guarantees no
    /// *new* deliveries are initiated, but a delivery already in flight on a
    /// worker thread may still complete after this returns. If the provider
    /// refuses to stop, the error is surfaced and the subscription stays
    /// registered so that the cancellation can be retried.
    pub fn cancel_async(&self, target: &dyn EventTarget) -> WbemResult<()> {
        let svc = self.svc()?;

        debug!("Cancel async call");

        let (id, sink) = self
            .sinks
            .find_target(target)
            .ok_or(WbemError::SinkNotFound)?;

        self.stop_subscription(svc, id, &sink)
    }

    /// Cancel a subscription by the handle its submission returned.
    pub fn cancel_by_handle(&self, handle: SubscriptionHandle) -> WbemResult<()> {
        let svc = self.svc()?;

        let (id, sink) = self.sinks.find_id(handle.0).ok_or(WbemError::SinkNotFound)?;

        self.stop_subscription(svc, id, &sink)
    }

    /// The number of live subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.sinks.len()
    }

    fn stop_subscription(
        &self,
        svc: &IWbemServices,
        id: SubscriptionId,
        sink: &IWbemObjectSink,
    ) -> WbemResult<()> {
        unsafe {
            svc.CancelAsyncCall(sink)
                .map_err(|e| WbemError::HResultError { hres: e.code().0 })?;
        }

        self.sinks.remove(id);
        self.threads.release(id);

        Ok(())
    }

    /// Best-effort stop of everything still live; used when the connection
    /// closes.
    pub(crate) fn stop_all_subscriptions(&self) {
        let Ok(svc) = self.svc() else {
            return;
        };

        for (id, query, sink) in self.sinks.drain() {
            if let Err(e) = unsafe { svc.CancelAsyncCall(&sink) } {
                warn!("Could not cancel the async call for {:?}: {}", query, e);
            }
            self.threads.release(id);
        }
    }
}

fn wrap_in_unsecured_apartment(sink: &IWbemObjectSink) -> WbemResult<IWbemObjectSink> {
    let apartment: IUnsecuredApartment =
        unsafe { CoCreateInstance(&UnsecuredApartment, None, CLSCTX_LOCAL_SERVER)? };

    let stub = unsafe { apartment.CreateObjectStub(sink)? };

    Ok(stub.cast::<IWbemObjectSink>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread_context::{NoopThreadContextHooks, ThreadContextRegistry};

    /// A target whose identity is its label, so that distinct instances can
    /// still be equal by value.
    #[derive(PartialEq)]
    struct LabelTarget {
        label: String,
    }

    impl LabelTarget {
        fn new(label: &str) -> Arc<Self> {
            Arc::new(Self {
                label: label.to_string(),
            })
        }
    }

    impl EventTarget for LabelTarget {
        fn row_available(&self, _row: Row) {}

        fn status(&self, _status: SubscriptionStatus) {}

        fn completed(&self, _hres: i32) {}

        fn same_target(&self, other: &dyn EventTarget) -> bool {
            other
                .as_any()
                .downcast_ref::<Self>()
                .is_some_and(|other| other == self)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn dummy_entry(registry: &Arc<SinkRegistry>, target: Arc<dyn EventTarget>) -> SubscriptionId {
        let id = SubscriptionId::next();
        let threads = Arc::new(ThreadContextRegistry::new(Arc::new(
            NoopThreadContextHooks,
        )));

        let sink = ObjectSink::new(
            id,
            target.clone(),
            registry.clone(),
            threads,
            Arc::new(AtomicBool::new(false)),
        );

        registry.register(SubscriptionEntry {
            id,
            query: "SELECT * FROM Win32_OperatingSystem".to_string(),
            target,
            sink: sink.into(),
        });

        id
    }

    #[test]
    fn it_matches_targets_by_value_not_identity() {
        let registry = Arc::new(SinkRegistry::default());
        let id = dummy_entry(&registry, LabelTarget::new("alpha"));

        // A different instance that is equal by value.
        let probe = LabelTarget::new("alpha");
        let (found, _sink) = registry.find_target(probe.as_ref()).unwrap();
        assert_eq!(found, id);

        let miss = LabelTarget::new("beta");
        assert!(registry.find_target(miss.as_ref()).is_none());
    }

    #[test]
    fn it_prefers_the_last_registered_subscription() {
        let registry = Arc::new(SinkRegistry::default());

        let _first = dummy_entry(&registry, LabelTarget::new("alpha"));
        let second = dummy_entry(&registry, LabelTarget::new("alpha"));

        // Duplicate submissions are not deduplicated; both stay live and the
        // later one wins the match.
        assert_eq!(registry.len(), 2);

        let probe = LabelTarget::new("alpha");
        let (found, _sink) = registry.find_target(probe.as_ref()).unwrap();
        assert_eq!(found, second);
    }

    #[test]
    fn it_removes_idempotently() {
        let registry = Arc::new(SinkRegistry::default());
        let id = dummy_entry(&registry, LabelTarget::new("alpha"));

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.len(), 0);
    }
}
