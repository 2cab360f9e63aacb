#![allow(non_snake_case)]

use crate::class_object::ClassObject;
use crate::row::materialize;
use crate::subscription::{EventTarget, SinkRegistry, SubscriptionStatus};
use crate::thread_context::{SubscriptionId, ThreadContextRegistry};
use log::{debug, error, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use windows::core::{implement, Ref, Result as WinResult, BSTR, HRESULT};
use windows::Win32::System::Wmi::{
    IWbemClassObject, IWbemObjectSink, IWbemObjectSink_Impl, WBEM_STATUS_COMPLETE,
};

/// The callback object registered with the provider for one subscription.
///
/// WMI invokes it on worker threads of its own choosing; its lifetime is
/// controlled by the provider's reference counting, jointly with the sink
/// registry. Neither entry point ever hands an error back to the provider:
/// destabilizing the delivery thread is worse than losing one batch, so
/// anything unexpected is logged and the callback returns normally.
#[implement(IWbemObjectSink)]
pub(crate) struct ObjectSink {
    id: SubscriptionId,
    target: Arc<dyn EventTarget>,
    registry: Arc<SinkRegistry>,
    threads: Arc<ThreadContextRegistry>,
    /// Set once the stream completed; late deliveries are dropped.
    done: Arc<AtomicBool>,
}

impl ObjectSink {
    pub fn new(
        id: SubscriptionId,
        target: Arc<dyn EventTarget>,
        registry: Arc<SinkRegistry>,
        threads: Arc<ThreadContextRegistry>,
        done: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            target,
            registry,
            threads,
            done,
        }
    }
}

impl IWbemObjectSink_Impl for ObjectSink_Impl {
    fn Indicate(
        &self,
        lObjectCount: i32,
        apObjArray: *const Option<IWbemClassObject>,
    ) -> WinResult<()> {
        trace!("Indicate call with {} objects", lObjectCount);

        // Case of an incorrect or too restrictive query.
        if lObjectCount <= 0 {
            return Ok(());
        }

        if self.done.load(Ordering::SeqCst) {
            trace!("Dropping a late delivery for a finished subscription");
            return Ok(());
        }

        // The delivering thread may be one the embedder has never seen.
        self.threads.acquire(self.id);

        // Safety:
        //
        // Guaranteed by the contract of the Indicate API: `apObjArray` points
        // to `lObjectCount` consecutive (nullable) object pointers, and the
        // memory behind it is not modified while the slice is alive.
        let objs = unsafe { std::slice::from_raw_parts(apObjArray, lObjectCount as usize) };

        for obj in objs {
            let Some(obj) = obj else {
                warn!("Skipping a null object in a delivery batch");
                continue;
            };

            match materialize(&ClassObject::new(obj.clone())) {
                Ok(row) => self.target.row_available(row),
                Err(e) => {
                    error!("Skipping a delivered object that failed to materialize: {}", e)
                }
            }
        }

        Ok(())
    }

    fn SetStatus(
        &self,
        lFlags: i32,
        hResult: HRESULT,
        strParam: &BSTR,
        _pObjParam: Ref<IWbemClassObject>,
    ) -> WinResult<()> {
        if lFlags == WBEM_STATUS_COMPLETE.0 {
            // Completion can race an explicit cancellation; whoever flips the
            // flag first forwards the event, removal is idempotent either way.
            if self.done.swap(true, Ordering::SeqCst) {
                return Ok(());
            }

            debug!(
                "End of async stream for subscription {:?} ({:#X})",
                self.id, hResult.0
            );

            self.threads.acquire(self.id);
            self.registry.remove(self.id);
            self.target.completed(hResult.0);
            self.threads.release(self.id);
        } else {
            self.threads.acquire(self.id);
            self.target.status(SubscriptionStatus {
                kind: lFlags,
                hres: hResult.0,
                message: strParam.to_string(),
            });
        }

        Ok(())
    }
}
