use thiserror::Error;

/// Errors surfaced by the bridge.
///
/// Conversion-level problems (an unsupported property type, an array kind the
/// bridge does not materialize) never show up here: they are logged and the
/// affected value degrades to [`WbemValue::Null`](crate::WbemValue::Null).
/// Connection, submission and cancellation failures always do.
#[derive(Debug, Error)]
pub enum WbemError {
    /// The query text was empty. No provider call is made.
    #[error("empty query text")]
    EmptyQuery,

    /// The connection was closed (or never established). Reconnecting
    /// requires a fresh [`WbemConnection`](crate::WbemConnection).
    #[error("the WMI connection is closed")]
    NotConnected,

    /// A provider call failed with the given native status code.
    #[error("WMI call failed with {hres:#010X}: {}", crate::hres::to_message(*hres))]
    HResultError { hres: i32 },

    #[error(transparent)]
    ComError(#[from] windows::core::Error),

    /// No live subscription matches the supplied event target.
    #[error("no subscription is registered for the supplied event target")]
    SinkNotFound,

    /// A COM call reported success but handed back a null pointer.
    #[error("a null pointer was returned")]
    NullPointerResult,

    #[error("failed to parse {0:?} as a CIM datetime")]
    ConvertDatetimeError(String),

    #[error("{0}")]
    ConvertValueError(String),
}

impl WbemError {
    /// The native status code carried by this error, when there is one.
    pub fn hres(&self) -> Option<i32> {
        match self {
            WbemError::HResultError { hres } => Some(*hres),
            WbemError::ComError(e) => Some(e.code().0),
            _ => None,
        }
    }
}

pub type WbemResult<T> = Result<T, WbemError>;
