//! # wbem-bridge
//!
//! [WMI] is a management API for Windows-based operating systems. This crate
//! is a bridge to its COM interface, focused on running [WQL] queries and
//! receiving their results as plain, owning Rust values: either as a
//! complete result set, or streamed through a long-lived asynchronous
//! subscription with explicit cancellation.
//!
//! Before anything else, COM must be initialized and a connection created.
//!
//! ```edition2021,no_run
//! # fn main() -> wbem_bridge::WbemResult<()> {
//! use wbem_bridge::{ComRuntime, QueryMode, WbemConnection};
//!
//! let con = WbemConnection::localhost(ComRuntime::new()?)?;
//!
//! for row in con.exec_query("SELECT * FROM Win32_OperatingSystem", QueryMode::Blocking)? {
//!     println!("{:?}", row.get("Caption"));
//! }
//! #   Ok(())
//! # }
//! ```
//!
//! Remote namespaces take credentials through [`ConnectionOptions`]:
//!
//! ```edition2021,no_run
//! # fn main() -> wbem_bridge::WbemResult<()> {
//! # use wbem_bridge::{ComRuntime, ConnectionOptions, WbemConnection};
//! let options = ConnectionOptions::remote("server01")
//!     .with_domain("CORP")
//!     .with_credentials("monitor", "hunter2");
//!
//! let con = WbemConnection::connect(options, ComRuntime::new()?)?;
//! #   Ok(())
//! # }
//! ```
//!
//! # Data model
//!
//! WMI hands back property values as COM [`VARIANT`]s. Each one is decoded
//! into a [`WbemValue`], and a whole class object into a [`Row`], an ordered
//! name/value mapping that is not tied to the original WMI object in any way.
//! Signed and unsigned integers of one width collapse to the signed kind of
//! that width, and only byte and string arrays are materialized; see
//! [`WbemValue`] for the caveats.
//!
//! # Asynchronous queries
//!
//! [`WbemConnection::exec_query_async`] registers a callback sink with the
//! provider and returns immediately. Rows are then delivered to a
//! caller-supplied [`EventTarget`] on worker threads owned by WMI, until the
//! stream completes or [`WbemConnection::cancel_async`] stops it. Embedders
//! that must prepare such threads before re-entering their runtime (a JVM,
//! an interpreter...) plug in [`ThreadContextHooks`].
//!
//! [WMI]: https://docs.microsoft.com/en-us/windows/desktop/wmisdk/about-wmi
//! [WQL]: https://docs.microsoft.com/en-us/windows/desktop/wmisdk/querying-with-wql
//! [`VARIANT`]: https://docs.microsoft.com/en-us/windows/desktop/api/oaidl/ns-oaidl-tagvariant

#![cfg(windows)]

mod class_object;
pub mod connection;
pub mod datetime;
mod error;
pub mod hres;
mod object_sink;
pub mod query;
pub mod row;
mod safearray;
pub mod subscription;
pub mod thread_context;
pub mod value;


pub use class_object::ClassObject;
pub use connection::{ComRuntime, ConnectionOptions, WbemConnection};
pub use datetime::CimDateTime;
pub use error::{WbemError, WbemResult};
pub use query::QueryMode;
pub use row::Row;
pub use subscription::{EventTarget, SubscriptionHandle, SubscriptionStatus};
pub use thread_context::{
    NoopThreadContextHooks, SubscriptionId, ThreadContextHooks, ThreadContextRegistry,
};
pub use value::WbemValue;
