use crate::class_object::ResultEnumerator;
use crate::row::{materialize, Row};
use crate::{WbemConnection, WbemError, WbemResult};
use log::{debug, error, warn};
use std::time::Instant;
use windows::core::BSTR;
use windows::Win32::System::Wmi::{
    WBEM_FLAG_DIRECT_READ, WBEM_FLAG_FORWARD_ONLY, WBEM_FLAG_RETURN_IMMEDIATELY,
};

/// How a synchronous query is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// The provider call blocks until the result set is ready.
    #[default]
    Blocking,
    /// The provider call returns immediately and each row pull blocks
    /// instead ("submit without delay, then stream").
    Streaming,
}

impl WbemConnection {
    /// Execute a WQL query and return all of its rows, in provider delivery
    /// order. The order is not guaranteed to be stable across repeated
    /// identical queries.
    ///
    /// Each row is pulled with an unbounded wait; a hung provider hangs the
    /// caller. A row that fails to pull or materialize is logged and skipped,
    /// so a partially-faulty provider still returns as much data as possible.
    pub fn exec_query(&self, query: impl AsRef<str>, mode: QueryMode) -> WbemResult<Vec<Row>> {
        let query = query.as_ref();

        if query.is_empty() {
            return Err(WbemError::EmptyQuery);
        }
        let svc = self.svc()?;

        debug!("WQL: {}", query);
        let submitted_at = Instant::now();

        let query_language = BSTR::from("WQL");
        let query_text = BSTR::from(query);

        let flags = match mode {
            QueryMode::Blocking => WBEM_FLAG_FORWARD_ONLY | WBEM_FLAG_DIRECT_READ,
            QueryMode::Streaming => {
                WBEM_FLAG_FORWARD_ONLY | WBEM_FLAG_DIRECT_READ | WBEM_FLAG_RETURN_IMMEDIATELY
            }
        };

        let enumerator = unsafe { svc.ExecQuery(&query_language, &query_text, flags, None) }
            .map_err(|e| WbemError::HResultError { hres: e.code().0 })?;

        debug!("Query submitted in {}ms", submitted_at.elapsed().as_millis());
        let pull_started_at = Instant::now();

        let mut rows = Vec::new();

        for item in ResultEnumerator::new(enumerator) {
            let obj = match item {
                Ok(obj) => obj,
                Err(e) => {
                    error!("Could not obtain next class object: {}", e);
                    continue;
                }
            };

            match materialize(&obj) {
                Ok(row) => rows.push(row),
                Err(e) => warn!("Skipping an object that failed to materialize: {}", e),
            }
        }

        debug!(
            "Query returned [{}] object(s), pull time: {}ms",
            rows.len(),
            pull_started_at.elapsed().as_millis()
        );

        Ok(rows)
    }
}
