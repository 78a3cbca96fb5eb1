//! Request/response interface to the cache engine.
//!
//! Commands never talk to the engine directly; they build a [`Request`] and
//! send it through a [`ControlChannel`]. Rejections carry an extended
//! [`ErrorCode`] whose text comes from the engine's error table.
//!
//! # Module Structure
//!
//! - [`model`] - data carried by requests and responses
//! - [`errors`] - extended error codes and their messages
//! - [`sim`] - engine simulation persisting its state between invocations

pub mod errors;
pub mod model;
pub mod sim;

use std::path::PathBuf;

use thiserror::Error;

pub use errors::ErrorCode;
pub use model::*;
pub use sim::SimEngine;

use crate::types::CacheMode;

/// How a cache instance is brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheInit {
    New,
    /// Restore the instance from metadata on the caching device.
    Load,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCache {
    /// `None` lets the engine choose: the id stored in metadata on load,
    /// the first free id otherwise.
    pub cache_id: Option<u16>,
    pub device: PathBuf,
    pub init: CacheInit,
    pub mode: CacheMode,
    pub line_size_kib: u32,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    StartCache(StartCache),
    StopCache { cache_id: u16, flush: bool },
    SetCacheMode { cache_id: u16, mode: CacheMode, flush: bool },
    AddCore { cache_id: u16, core_id: Option<u16>, device: PathBuf },
    RemoveCore { cache_id: u16, core_id: u16, force: bool },
    RemoveDetached { device: PathBuf },
    List,
    CacheInfo { cache_id: u16 },
    CoreInfo { cache_id: u16, core_id: u16 },
    IoClassInfo { cache_id: u16, class_id: u8 },
    Stats { cache_id: u16, core_id: Option<u16>, class_id: Option<u8> },
    ResetCounters { cache_id: u16, core_id: Option<u16> },
    FlushCache { cache_id: u16 },
    FlushCore { cache_id: u16, core_id: u16 },
    /// Ask a running flush to stop at the next step.
    InterruptFlushing,
    GetCacheParam { cache_id: u16, param: CacheParam },
    SetCacheParam { cache_id: u16, param: CacheParam, value: ParamValue },
    GetCoreParam { cache_id: u16, core_id: u16, param: CoreParam },
    SetCoreParam { cache_id: u16, core_id: u16, param: CoreParam, value: ParamValue },
    ConfigureIoClasses { cache_id: u16, classes: Vec<IoClass> },
    CheckDevice { device: PathBuf },
    ZeroMetadata { device: PathBuf },
    ModuleVersions,
}

impl Request {
    /// Short operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::StartCache(_) => "start-cache",
            Request::StopCache { .. } => "stop-cache",
            Request::SetCacheMode { .. } => "set-cache-mode",
            Request::AddCore { .. } => "add-core",
            Request::RemoveCore { .. } => "remove-core",
            Request::RemoveDetached { .. } => "remove-detached",
            Request::List => "list",
            Request::CacheInfo { .. } => "cache-info",
            Request::CoreInfo { .. } => "core-info",
            Request::IoClassInfo { .. } => "io-class-info",
            Request::Stats { .. } => "stats",
            Request::ResetCounters { .. } => "reset-counters",
            Request::FlushCache { .. } => "flush-cache",
            Request::FlushCore { .. } => "flush-core",
            Request::InterruptFlushing => "interrupt-flushing",
            Request::GetCacheParam { .. } => "get-cache-param",
            Request::SetCacheParam { .. } => "set-cache-param",
            Request::GetCoreParam { .. } => "get-core-param",
            Request::SetCoreParam { .. } => "set-core-param",
            Request::ConfigureIoClasses { .. } => "configure-io-classes",
            Request::CheckDevice { .. } => "check-device",
            Request::ZeroMetadata { .. } => "zero-metadata",
            Request::ModuleVersions => "module-versions",
        }
    }

    /// Requests that may run long enough to show progress.
    pub fn flushes(&self) -> bool {
        matches!(
            self,
            Request::StopCache { flush: true, .. }
                | Request::SetCacheMode { flush: true, .. }
                | Request::RemoveCore { force: false, .. }
                | Request::FlushCache { .. }
                | Request::FlushCore { .. }
        )
    }

    /// Cache and core whose flush progress reflects this request.
    pub fn progress_target(&self) -> Option<(u16, Option<u16>)> {
        match *self {
            Request::StopCache { cache_id, .. }
            | Request::SetCacheMode { cache_id, .. }
            | Request::FlushCache { cache_id } => Some((cache_id, None)),
            Request::RemoveCore { cache_id, core_id, .. } | Request::FlushCore { cache_id, core_id } => {
                Some((cache_id, Some(core_id)))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Done,
    Started { cache_id: u16 },
    CoreAdded { core_id: u16 },
    Listing(Listing),
    Cache(CacheInfo),
    Core(CoreInfo),
    IoClass(IoClass),
    Stats(Stats),
    Param(ParamValue),
    Device(DeviceCheck),
    Versions(ModuleVersions),
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{0}")]
    Engine(ErrorCode),
    #[error("Cannot access engine state {}: {source}", path.display())]
    State {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupted engine state {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}

impl ControlError {
    /// Extended code, when the engine itself rejected the request.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ControlError::Engine(code) => Some(*code),
            _ => None,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.code().is_some_and(ErrorCode::is_interrupted)
    }
}

impl From<ErrorCode> for ControlError {
    fn from(code: ErrorCode) -> Self {
        ControlError::Engine(code)
    }
}

pub type ControlResult<T> = Result<T, ControlError>;

/// A connection to the cache engine.
pub trait ControlChannel: Send {
    fn execute(&mut self, request: Request) -> ControlResult<Response>;

    /// A second connection to the same engine, usable from another thread
    /// while this one is busy.
    fn open_handle(&self) -> ControlResult<Box<dyn ControlChannel>>;
}

macro_rules! expect_response {
    ($channel:expr, $request:expr, $pattern:pat => $value:expr) => {{
        let request = $request;
        let name = request.name();
        match $channel.execute(request)? {
            $pattern => Ok($value),
            _ => Err(ControlError::UnexpectedResponse(name)),
        }
    }};
}

/// Typed wrappers around [`ControlChannel::execute`].
pub trait ControlExt: ControlChannel {
    fn run(&mut self, request: Request) -> ControlResult<()> {
        self.execute(request).map(|_| ())
    }

    fn list(&mut self) -> ControlResult<Listing> {
        expect_response!(self, Request::List, Response::Listing(l) => l)
    }

    fn cache_info(&mut self, cache_id: u16) -> ControlResult<CacheInfo> {
        expect_response!(self, Request::CacheInfo { cache_id }, Response::Cache(c) => c)
    }

    fn core_info(&mut self, cache_id: u16, core_id: u16) -> ControlResult<CoreInfo> {
        expect_response!(self, Request::CoreInfo { cache_id, core_id }, Response::Core(c) => c)
    }

    fn io_class(&mut self, cache_id: u16, class_id: u8) -> ControlResult<IoClass> {
        expect_response!(self, Request::IoClassInfo { cache_id, class_id }, Response::IoClass(c) => c)
    }

    fn stats(&mut self, cache_id: u16, core_id: Option<u16>, class_id: Option<u8>) -> ControlResult<Stats> {
        expect_response!(self, Request::Stats { cache_id, core_id, class_id }, Response::Stats(s) => s)
    }

    fn cache_param(&mut self, cache_id: u16, param: CacheParam) -> ControlResult<ParamValue> {
        expect_response!(self, Request::GetCacheParam { cache_id, param }, Response::Param(v) => v)
    }

    fn core_param(&mut self, cache_id: u16, core_id: u16, param: CoreParam) -> ControlResult<ParamValue> {
        expect_response!(self, Request::GetCoreParam { cache_id, core_id, param }, Response::Param(v) => v)
    }

    fn check_device(&mut self, device: PathBuf) -> ControlResult<DeviceCheck> {
        expect_response!(self, Request::CheckDevice { device }, Response::Device(d) => d)
    }

    fn module_versions(&mut self) -> ControlResult<ModuleVersions> {
        expect_response!(self, Request::ModuleVersions, Response::Versions(v) => v)
    }
}

impl<T: ControlChannel + ?Sized> ControlExt for T {}
