use crate::subscription::SinkRegistry;
use crate::thread_context::{NoopThreadContextHooks, ThreadContextHooks, ThreadContextRegistry};
use crate::{WbemError, WbemResult};
use log::{debug, info};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use windows::core::BSTR;
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoInitializeSecurity, CoSetProxyBlanket,
    CLSCTX_INPROC_SERVER, COINIT_MULTITHREADED, EOAC_NONE, RPC_C_AUTHN_LEVEL_CALL,
    RPC_C_AUTHN_LEVEL_DEFAULT, RPC_C_IMP_LEVEL_IMPERSONATE,
};
use windows::Win32::System::Rpc::{RPC_C_AUTHN_WINNT, RPC_C_AUTHZ_NONE};
use windows::Win32::System::Wmi::{
    IWbemLocator, IWbemServices, WbemLocator, WBEM_FLAG_CONNECT_USE_MAX_WAIT,
};

/// A marker to indicate that the current thread was `CoInitialize`d.
/// It can be freely copied within the same thread.
#[derive(Clone, Copy)]
pub struct ComRuntime {
    // Force the type to be `!Send`, as each thread must be initialized separately.
    _phantom: PhantomData<*mut ()>,
}

/// Initialize COM.
///
/// `CoUninitialize` will NOT be called when dropped.
/// See: <https://github.com/microsoft/windows-rs/issues/1169#issuecomment-926877227>
impl ComRuntime {
    /// `CoInitialize`s the COM library for use by the calling thread and
    /// applies a default process-wide security context.
    pub fn new() -> WbemResult<Self> {
        let instance = Self::without_security()?;
        instance.init_security()?;

        Ok(instance)
    }

    /// `CoInitialize`s the COM library for use by the calling thread, but
    /// without setting the security context.
    pub fn without_security() -> WbemResult<Self> {
        unsafe { CoInitializeEx(None, COINIT_MULTITHREADED).ok()? }

        Ok(Self {
            _phantom: PhantomData,
        })
    }

    /// Assumes that COM was already initialized for this thread.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that COM is initialized
    /// and will not be uninitialized while any instance of object is in scope.
    pub unsafe fn assume_initialized() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }

    fn init_security(&self) -> WbemResult<()> {
        unsafe {
            CoInitializeSecurity(
                None,
                -1, // let COM choose.
                None,
                None,
                RPC_C_AUTHN_LEVEL_DEFAULT,
                RPC_C_IMP_LEVEL_IMPERSONATE,
                None,
                EOAC_NONE,
                None,
            )?;
        };

        Ok(())
    }
}

/// ```compile_fail
/// let com = wbem_bridge::ComRuntime::new().unwrap();
/// fn assert_send(_s: impl Send) {}
/// assert_send(com);
/// ```
fn _test_com_runtime_not_send(_s: impl Send) {}

/// Where and how to connect: target host, namespace, credentials, locale.
#[derive(Clone)]
pub struct ConnectionOptions {
    host: Option<String>,
    namespace: String,
    domain: Option<String>,
    user: Option<String>,
    password: Option<String>,
    locale: String,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: None,
            namespace: r"ROOT\CIMV2".to_string(),
            domain: None,
            user: None,
            password: None,
            locale: "MS_409".to_string(),
        }
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("host", &self.host)
            .field("namespace", &self.namespace)
            .field("domain", &self.domain)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("locale", &self.locale)
            .finish()
    }
}

impl ConnectionOptions {
    /// Connect to the local machine's `ROOT\CIMV2`.
    pub fn local() -> Self {
        Self::default()
    }

    /// Connect to a remote machine.
    pub fn remote(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// The NTLM domain used to authenticate `user`.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// The full namespace resource path handed to the locator.
    fn resource(&self) -> String {
        match &self.host {
            Some(host) => format!(r"\\{}\{}", host, self.namespace),
            None => self.namespace.clone(),
        }
    }

    fn authority(&self) -> Option<String> {
        self.domain
            .as_ref()
            .map(|domain| format!("NTLMDOMAIN:{}", domain))
    }
}

/// A connection to one WMI namespace on one host.
///
/// A `WbemConnection` is connected for its whole life: it is created by a
/// successful [`connect`](WbemConnection::connect) and cannot be reconnected
/// after [`close`](WbemConnection::close); create a fresh instance instead.
pub struct WbemConnection {
    _com: ComRuntime,
    // `close` releases the service endpoint before the locator; keep the
    // declaration order matching so `Drop` agrees.
    svc: Option<IWbemServices>,
    locator: Option<IWbemLocator>,
    pub(crate) sinks: Arc<SinkRegistry>,
    pub(crate) threads: Arc<ThreadContextRegistry>,
}

impl WbemConnection {
    /// Connect to the namespace described by `options`.
    pub fn connect(options: ConnectionOptions, com: ComRuntime) -> WbemResult<Self> {
        Self::connect_with_hooks(options, com, Arc::new(NoopThreadContextHooks))
    }

    /// Connect to the local `ROOT\CIMV2` namespace.
    pub fn localhost(com: ComRuntime) -> WbemResult<Self> {
        Self::connect(ConnectionOptions::local(), com)
    }

    /// Like [`connect`](Self::connect), with caller-supplied hooks that run
    /// when a provider delivery thread is first seen and when its last
    /// subscription ends. See [`ThreadContextHooks`].
    pub fn connect_with_hooks(
        options: ConnectionOptions,
        com: ComRuntime,
        hooks: Arc<dyn ThreadContextHooks>,
    ) -> WbemResult<Self> {
        let locator = create_locator()?;
        let svc = create_services(&locator, &options)?;

        let this = Self {
            _com: com,
            svc: Some(svc),
            locator: Some(locator),
            sinks: Arc::new(SinkRegistry::default()),
            threads: Arc::new(ThreadContextRegistry::new(hooks)),
        };

        this.set_proxy()?;

        info!("Connected to {}", options.resource());

        Ok(this)
    }

    pub(crate) fn svc(&self) -> WbemResult<&IWbemServices> {
        self.svc.as_ref().ok_or(WbemError::NotConnected)
    }

    fn set_proxy(&self) -> WbemResult<()> {
        debug!("Calling CoSetProxyBlanket");

        unsafe {
            CoSetProxyBlanket(
                self.svc()?,
                RPC_C_AUTHN_WINNT,           // RPC_C_AUTHN_xxx
                RPC_C_AUTHZ_NONE,            // RPC_C_AUTHZ_xxx
                None,
                RPC_C_AUTHN_LEVEL_CALL,      // RPC_C_AUTHN_LEVEL_xxx
                RPC_C_IMP_LEVEL_IMPERSONATE, // RPC_C_IMP_LEVEL_xxx
                None,                        // client identity
                EOAC_NONE,                   // proxy capabilities
            )?;
        }

        Ok(())
    }

    /// Release the connection: stop live subscriptions (best effort), then
    /// release the service endpoint and the locator, in that order.
    ///
    /// Calling `close` on an already-closed connection does nothing.
    pub fn close(&mut self) {
        if self.svc.is_none() {
            return;
        }

        self.stop_all_subscriptions();

        self.svc.take();
        self.locator.take();

        info!("WMI connection closed");
    }

    pub fn is_closed(&self) -> bool {
        self.svc.is_none()
    }
}

impl Drop for WbemConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn create_locator() -> WbemResult<IWbemLocator> {
    debug!("Calling CoCreateInstance for CLSID_WbemLocator");

    let loc = unsafe { CoCreateInstance(&WbemLocator, None, CLSCTX_INPROC_SERVER)? };

    debug!("Got locator {:?}", loc);

    Ok(loc)
}

fn create_services(loc: &IWbemLocator, options: &ConnectionOptions) -> WbemResult<IWbemServices> {
    debug!("Calling ConnectServer");

    let resource = BSTR::from(options.resource().as_str());
    let user = options
        .user
        .as_deref()
        .map(BSTR::from)
        .unwrap_or_else(BSTR::new);
    let password = options
        .password
        .as_deref()
        .map(BSTR::from)
        .unwrap_or_else(BSTR::new);
    let locale = BSTR::from(options.locale.as_str());
    let authority = options
        .authority()
        .as_deref()
        .map(BSTR::from)
        .unwrap_or_else(BSTR::new);

    let svc = unsafe {
        loc.ConnectServer(
            &resource,
            &user,
            &password,
            &locale,
            WBEM_FLAG_CONNECT_USE_MAX_WAIT.0,
            &authority,
            None,
        )?
    };

    debug!("Got service {:?}", svc);

    Ok(svc)
}
