//! Human-readable rendering of the WBEM status codes the provider is most
//! likely to hand back. Anything unlisted falls through to a generic message;
//! the raw code is always part of the error's `Display` output.

pub const WBEM_E_FAILED: u32 = 0x80041001;
pub const WBEM_E_NOT_FOUND: u32 = 0x80041002;
pub const WBEM_E_ACCESS_DENIED: u32 = 0x80041003;
pub const WBEM_E_PROVIDER_FAILURE: u32 = 0x80041004;
pub const WBEM_E_TYPE_MISMATCH: u32 = 0x80041005;
pub const WBEM_E_OUT_OF_MEMORY: u32 = 0x80041006;
pub const WBEM_E_INVALID_CONTEXT: u32 = 0x80041007;
pub const WBEM_E_INVALID_PARAMETER: u32 = 0x80041008;
pub const WBEM_E_NOT_AVAILABLE: u32 = 0x80041009;
pub const WBEM_E_CRITICAL_ERROR: u32 = 0x8004100A;
pub const WBEM_E_NOT_SUPPORTED: u32 = 0x8004100C;
pub const WBEM_E_INVALID_NAMESPACE: u32 = 0x8004100E;
pub const WBEM_E_INVALID_OBJECT: u32 = 0x8004100F;
pub const WBEM_E_INVALID_CLASS: u32 = 0x80041010;
pub const WBEM_E_PROVIDER_NOT_FOUND: u32 = 0x80041011;
pub const WBEM_E_PROVIDER_LOAD_FAILURE: u32 = 0x80041013;
pub const WBEM_E_INITIALIZATION_FAILURE: u32 = 0x80041014;
pub const WBEM_E_TRANSPORT_FAILURE: u32 = 0x80041015;
pub const WBEM_E_INVALID_OPERATION: u32 = 0x80041016;
pub const WBEM_E_INVALID_QUERY: u32 = 0x80041017;
pub const WBEM_E_INVALID_QUERY_TYPE: u32 = 0x80041018;
pub const WBEM_E_UNEXPECTED: u32 = 0x8004101D;
pub const WBEM_E_INVALID_SYNTAX: u32 = 0x80041021;
pub const WBEM_E_UNPARSABLE_QUERY: u32 = 0x80041058;
pub const WBEM_E_CALL_CANCELLED: u32 = 0x80041032;
pub const WBEM_E_SHUTTING_DOWN: u32 = 0x80041033;
pub const WBEM_E_SERVER_TOO_BUSY: u32 = 0x80041045;
pub const WBEM_E_QUOTA_VIOLATION: u32 = 0x8004106C;

pub const fn to_message(hres: i32) -> &'static str {
    match hres as u32 {
        WBEM_E_FAILED => "Call failed",
        WBEM_E_NOT_FOUND => "Object cannot be found",
        WBEM_E_ACCESS_DENIED => "Current user does not have permission to perform the action",
        WBEM_E_PROVIDER_FAILURE => "Provider has failed at some time other than during initialization",
        WBEM_E_TYPE_MISMATCH => "Type mismatch occurred",
        WBEM_E_OUT_OF_MEMORY => "Not enough memory for the operation",
        WBEM_E_INVALID_CONTEXT => "The IWbemContext object is not valid",
        WBEM_E_INVALID_PARAMETER => "One of the parameters to the call is not correct",
        WBEM_E_NOT_AVAILABLE => "Resource, typically a remote server, is not currently available",
        WBEM_E_CRITICAL_ERROR => "Internal, critical, and unexpected error occurred",
        WBEM_E_NOT_SUPPORTED => "Feature or operation is not supported",
        WBEM_E_INVALID_NAMESPACE => "Namespace specified cannot be found",
        WBEM_E_INVALID_OBJECT => "Specified instance is not valid",
        WBEM_E_INVALID_CLASS => "Specified class is not valid",
        WBEM_E_PROVIDER_NOT_FOUND => "Provider referenced in the schema does not have a corresponding registration",
        WBEM_E_PROVIDER_LOAD_FAILURE => "COM cannot locate a provider referenced in the schema",
        WBEM_E_INITIALIZATION_FAILURE => "Component, such as a provider, failed to initialize for internal reasons",
        WBEM_E_TRANSPORT_FAILURE => "Networking error that prevents normal operation has occurred",
        WBEM_E_INVALID_OPERATION => "Requested operation is not valid",
        WBEM_E_INVALID_QUERY => "Query was not syntactically valid",
        WBEM_E_INVALID_QUERY_TYPE => "Requested query language is not supported",
        WBEM_E_UNEXPECTED => "An object invoked an already-released object",
        WBEM_E_INVALID_SYNTAX => "Query is syntactically not valid",
        WBEM_E_UNPARSABLE_QUERY => "Filtering query is syntactically not valid",
        WBEM_E_CALL_CANCELLED => "Asynchronous process has been canceled internally or by the user",
        WBEM_E_SHUTTING_DOWN => "User has requested an operation while WMI is being shut down",
        WBEM_E_SERVER_TOO_BUSY => "Delivery of an event has failed; the provider can refire the event",
        WBEM_E_QUOTA_VIOLATION => "Quota violation",
        _ => "Unknown WMI error",
    }
}
