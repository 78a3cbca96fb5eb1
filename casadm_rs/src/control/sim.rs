//! Engine simulation backed by a JSON state file.
//!
//! Every request loads the state, applies itself and, unless it only reads,
//! writes the state back, so separate invocations see each other's effects.
//! Flushes advance in steps and persist after each one. A second handle
//! opened with [`ControlChannel::open_handle`] can watch the progress from
//! the state file and interrupt the flush between steps.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::model::*;
use super::{CacheInit, ControlChannel, ControlError, ControlResult, ErrorCode, Request, Response, StartCache};
use crate::types::CacheMode;

/// Size assumed for devices that report no length.
const FALLBACK_DEVICE_BYTES: u64 = 1 << 30;
const METADATA_BYTES_PER_LINE: u64 = 64;
const FLUSH_STEPS: u64 = 10;
const DEFAULT_SEQ_CUTOFF_BYTES: u32 = 1024 * 1024;

fn default_seq_cutoff() -> u32 {
    DEFAULT_SEQ_CUTOFF_BYTES
}

/// Everything the simulated engine remembers between invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineState {
    pub caches: BTreeMap<u16, CacheRecord>,
    pub core_pool: Vec<PathBuf>,
    /// Metadata left on caching devices by stopped caches, keyed by path.
    pub metadata: BTreeMap<String, StoredMetadata>,
    pub modules: ModuleRecord,
    /// Pause between flush steps.
    pub flush_step_ms: u64,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            caches: BTreeMap::new(),
            core_pool: Vec::new(),
            metadata: BTreeMap::new(),
            modules: ModuleRecord::default(),
            flush_step_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleRecord {
    pub cache: Option<String>,
    pub disk: Option<String>,
}

impl Default for ModuleRecord {
    fn default() -> Self {
        Self {
            cache: Some(env!("CARGO_PKG_VERSION").to_string()),
            disk: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub device: PathBuf,
    pub lines: u64,
    pub line_size_kib: u32,
    pub mode: CacheMode,
    #[serde(default)]
    pub cleaning: CleaningParams,
    #[serde(default)]
    pub promotion: PromotionParams,
    #[serde(default)]
    pub cores: BTreeMap<u16, CoreRecord>,
    #[serde(default)]
    pub io_classes: BTreeMap<u8, ClassRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreRecord {
    pub device: PathBuf,
    pub size_bytes: u64,
    #[serde(default)]
    pub state: CoreState,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub counters: Counters,
    /// Seconds since the oldest dirty write.
    #[serde(default)]
    pub dirty_for: u64,
    /// Blocks flushed by the flush in progress.
    #[serde(default)]
    pub flushed: u64,
    #[serde(default = "default_seq_cutoff")]
    pub seq_cutoff_threshold: u32,
    #[serde(default)]
    pub seq_cutoff_policy: SeqCutoffPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassRecord {
    pub class: IoClass,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub counters: Counters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMetadata {
    pub cache_id: u16,
    pub cache: CacheRecord,
    pub clean_shutdown: bool,
}

impl CoreRecord {
    fn new(device: PathBuf, size_bytes: u64) -> Self {
        Self {
            device,
            size_bytes,
            state: CoreState::Active,
            usage: Usage::default(),
            counters: Counters::default(),
            dirty_for: 0,
            flushed: 0,
            seq_cutoff_threshold: DEFAULT_SEQ_CUTOFF_BYTES,
            seq_cutoff_policy: SeqCutoffPolicy::default(),
        }
    }

    fn info(&self, cache_id: u16, id: u16) -> CoreInfo {
        CoreInfo {
            cache_id,
            id,
            device: self.device.clone(),
            size_bytes: self.size_bytes,
            state: self.state,
            dirty: self.usage.dirty,
            flushed: self.flushed,
            dirty_for: self.dirty_for,
            seq_cutoff_threshold: self.seq_cutoff_threshold,
            seq_cutoff_policy: self.seq_cutoff_policy,
        }
    }
}

impl CacheRecord {
    fn new(device: PathBuf, lines: u64, line_size_kib: u32, mode: CacheMode) -> Self {
        let mut cache = Self {
            device,
            lines,
            line_size_kib,
            mode,
            cleaning: CleaningParams::default(),
            promotion: PromotionParams::default(),
            cores: BTreeMap::new(),
            io_classes: BTreeMap::new(),
        };
        let unclassified = IoClass::unclassified(cache.blocks());
        cache.io_classes.insert(
            unclassified.id,
            ClassRecord {
                class: unclassified,
                usage: Usage::default(),
                counters: Counters::default(),
            },
        );
        cache
    }

    fn blocks(&self) -> u64 {
        self.lines * u64::from(self.line_size_kib / 4)
    }

    /// Cores a request targets: one of them, or all when `core_id` is `None`.
    fn selected(&self, core_id: Option<u16>) -> impl Iterator<Item = &CoreRecord> {
        self.cores
            .iter()
            .filter(move |(id, _)| core_id.is_none_or(|c| c == **id))
            .map(|(_, core)| core)
    }

    fn dirty_of(&self, core_id: Option<u16>) -> u64 {
        self.selected(core_id).map(|core| core.usage.dirty).sum()
    }

    fn state(&self) -> CacheState {
        if self.cores.values().any(|core| core.state == CoreState::Inactive) {
            CacheState::RUNNING.with(CacheState::INCOMPLETE)
        } else {
            CacheState::RUNNING
        }
    }

    fn usage(&self) -> Usage {
        let mut usage = Usage::default();
        self.cores.values().for_each(|core| usage.add(&core.usage));
        usage
    }

    fn counters(&self) -> Counters {
        let mut counters = Counters::default();
        self.cores.values().for_each(|core| counters.add(&core.counters));
        counters
    }

    fn info(&self, id: u16) -> CacheInfo {
        let mut inactive = Usage::default();
        let mut inactive_cores = 0;
        for core in self.cores.values().filter(|core| core.state == CoreState::Inactive) {
            inactive.add(&core.usage);
            inactive_cores += 1;
        }
        CacheInfo {
            id,
            device: self.device.clone(),
            size: self.lines,
            line_size_kib: self.line_size_kib,
            mode: self.mode,
            cleaning: self.cleaning.policy,
            promotion: self.promotion.policy,
            state: self.state(),
            core_ids: self.cores.keys().copied().collect(),
            inactive_cores,
            inactive,
            dirty: self.dirty_of(None),
            flushed: self.cores.values().map(|core| core.flushed).sum(),
            dirty_for: self.cores.values().map(|core| core.dirty_for).max().unwrap_or(0),
            metadata_footprint: self.lines * METADATA_BYTES_PER_LINE,
        }
    }

    /// Move up to `budget` dirty blocks to clean; returns what stays dirty.
    fn clean(&mut self, core_id: Option<u16>, mut budget: u64) -> u64 {
        for (id, core) in self.cores.iter_mut() {
            if core_id.is_some_and(|c| c != *id) {
                continue;
            }
            let moved = budget.min(core.usage.dirty);
            core.usage.dirty -= moved;
            core.usage.clean += moved;
            core.flushed += moved;
            budget -= moved;
        }
        self.dirty_of(core_id)
    }

    fn end_flush(&mut self, core_id: Option<u16>, completed: bool) {
        for (id, core) in self.cores.iter_mut() {
            if core_id.is_some_and(|c| c != *id) {
                continue;
            }
            core.flushed = 0;
            if completed {
                core.dirty_for = 0;
            }
        }
        if completed && core_id.is_none() {
            for class in self.io_classes.values_mut() {
                class.usage.clean += class.usage.dirty;
                class.usage.dirty = 0;
            }
        }
    }

    /// Dirty data written back at once, as the background cleaner would.
    fn clean_all(&mut self) {
        let dirty = self.dirty_of(None);
        self.clean(None, dirty);
        self.end_flush(None, true);
    }
}

impl EngineState {
    fn cache(&self, id: u16) -> Result<&CacheRecord, ErrorCode> {
        self.caches.get(&id).ok_or(ErrorCode::CacheNotExist)
    }

    fn cache_mut(&mut self, id: u16) -> Result<&mut CacheRecord, ErrorCode> {
        self.caches.get_mut(&id).ok_or(ErrorCode::CacheNotExist)
    }

    fn core_mut(&mut self, cache_id: u16, core_id: u16) -> Result<&mut CoreRecord, ErrorCode> {
        self.cache_mut(cache_id)?
            .cores
            .get_mut(&core_id)
            .ok_or(ErrorCode::CoreNotExist)
    }

    /// Whether a running cache holds `device` as caching or core device.
    fn device_in_use(&self, device: &Path) -> bool {
        self.caches
            .values()
            .any(|cache| cache.device == device || cache.cores.values().any(|core| core.device == device))
    }
}

fn metadata_key(device: &Path) -> String {
    device.to_string_lossy().into_owned()
}

/// Length of a file or block device; `None` when it cannot be opened.
fn device_size(device: &Path) -> Option<u64> {
    let mut file = File::open(device).ok()?;
    let len = file.seek(SeekFrom::End(0)).ok()?;
    Some(if len == 0 { FALLBACK_DEVICE_BYTES } else { len })
}

/// Simulated engine. Clones share the interrupt flag.
#[derive(Debug, Clone)]
pub struct SimEngine {
    path: PathBuf,
    interrupt: Arc<AtomicBool>,
}

impl SimEngine {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.path
    }

    /// Current state; a missing file is an engine with nothing running.
    pub fn load(&self) -> ControlResult<EngineState> {
        match fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| ControlError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(EngineState::default()),
            Err(source) => Err(self.state_error(source)),
        }
    }

    /// Write `state` through a sibling temp file so readers never see a torn file.
    pub fn save(&self, state: &EngineState) -> ControlResult<()> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(|e| self.state_error(e))?;
        }
        let json = serde_json::to_string_pretty(state).map_err(|source| ControlError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(|e| self.state_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.state_error(e))
    }

    fn state_error(&self, source: io::Error) -> ControlError {
        ControlError::State {
            path: self.path.clone(),
            source,
        }
    }

    fn apply(&self, state: &mut EngineState, request: Request) -> ControlResult<Response> {
        let response = match request {
            Request::StartCache(start) => start_cache(state, start)?,
            Request::StopCache { cache_id, flush } => {
                state.cache(cache_id)?;
                if flush {
                    self.flush(state, cache_id, None)?;
                }
                if let Some(cache) = state.caches.remove(&cache_id) {
                    state.metadata.insert(
                        metadata_key(&cache.device),
                        StoredMetadata {
                            cache_id,
                            cache,
                            clean_shutdown: true,
                        },
                    );
                }
                Response::Done
            }
            Request::SetCacheMode { cache_id, mode, flush } => {
                let previous = state.cache(cache_id)?.mode;
                if flush {
                    self.flush(state, cache_id, None)?;
                }
                let cache = state.cache_mut(cache_id)?;
                cache.mode = mode;
                if previous.is_lazy_write() && !mode.is_lazy_write() {
                    cache.clean_all();
                }
                Response::Done
            }
            Request::AddCore { cache_id, core_id, device } => add_core(state, cache_id, core_id, device)?,
            Request::RemoveCore { cache_id, core_id, force } => {
                let core = state.core_mut(cache_id, core_id)?;
                if core.state == CoreState::Inactive {
                    if core.usage.dirty > 0 && !force {
                        return Err(ErrorCode::InactiveCoreIsDirty.into());
                    }
                } else if !force {
                    self.flush(state, cache_id, Some(core_id))?;
                }
                state.cache_mut(cache_id)?.cores.remove(&core_id);
                Response::Done
            }
            Request::RemoveDetached { device } => {
                let index = state
                    .core_pool
                    .iter()
                    .position(|path| *path == device)
                    .ok_or(ErrorCode::CoreNotAvail)?;
                state.core_pool.remove(index);
                Response::Done
            }
            Request::List => Response::Listing(Listing {
                caches: state
                    .caches
                    .iter()
                    .map(|(&id, cache)| CacheListing {
                        cache: cache.info(id),
                        cores: cache.cores.iter().map(|(&core_id, core)| core.info(id, core_id)).collect(),
                    })
                    .collect(),
                core_pool: state.core_pool.clone(),
            }),
            Request::CacheInfo { cache_id } => Response::Cache(state.cache(cache_id)?.info(cache_id)),
            Request::CoreInfo { cache_id, core_id } => {
                let core = state.core_mut(cache_id, core_id)?;
                Response::Core(core.info(cache_id, core_id))
            }
            Request::IoClassInfo { cache_id, class_id } => {
                let class = state
                    .cache(cache_id)?
                    .io_classes
                    .get(&class_id)
                    .ok_or(ErrorCode::IoClassNotExist)?;
                Response::IoClass(class.class.clone())
            }
            Request::Stats { cache_id, core_id, class_id } => {
                let cache = state.cache(cache_id)?;
                let size = cache.blocks();
                let (usage, counters) = match (class_id, core_id) {
                    (Some(class_id), _) => {
                        let class = cache.io_classes.get(&class_id).ok_or(ErrorCode::IoClassNotExist)?;
                        (class.usage, class.counters)
                    }
                    (None, Some(core_id)) => {
                        let core = cache.cores.get(&core_id).ok_or(ErrorCode::CoreNotExist)?;
                        (core.usage, core.counters)
                    }
                    (None, None) => (cache.usage(), cache.counters()),
                };
                Response::Stats(Stats { size, usage, counters })
            }
            Request::ResetCounters { cache_id, core_id } => {
                match core_id {
                    Some(core_id) => state.core_mut(cache_id, core_id)?.counters = Counters::default(),
                    None => {
                        let cache = state.cache_mut(cache_id)?;
                        cache.cores.values_mut().for_each(|core| core.counters = Counters::default());
                        cache
                            .io_classes
                            .values_mut()
                            .for_each(|class| class.counters = Counters::default());
                    }
                }
                Response::Done
            }
            Request::FlushCache { cache_id } => {
                state.cache(cache_id)?;
                self.flush(state, cache_id, None)?;
                Response::Done
            }
            Request::FlushCore { cache_id, core_id } => {
                state.core_mut(cache_id, core_id)?;
                self.flush(state, cache_id, Some(core_id))?;
                Response::Done
            }
            Request::InterruptFlushing => {
                self.interrupt.store(true, Ordering::SeqCst);
                Response::Done
            }
            Request::GetCacheParam { cache_id, param } => {
                Response::Param(get_cache_param(state.cache(cache_id)?, param))
            }
            Request::SetCacheParam { cache_id, param, value } => {
                set_cache_param(state.cache_mut(cache_id)?, param, value)?;
                Response::Done
            }
            Request::GetCoreParam { cache_id, core_id, param } => {
                let core = state.core_mut(cache_id, core_id)?;
                Response::Param(match param {
                    CoreParam::SeqCutoffThreshold => ParamValue::Number(core.seq_cutoff_threshold),
                    CoreParam::SeqCutoffPolicy => ParamValue::SeqCutoff(core.seq_cutoff_policy),
                })
            }
            Request::SetCoreParam { cache_id, core_id, param, value } => {
                let core = state.core_mut(cache_id, core_id)?;
                match (param, value) {
                    (CoreParam::SeqCutoffThreshold, ParamValue::Number(bytes)) => core.seq_cutoff_threshold = bytes,
                    (CoreParam::SeqCutoffPolicy, ParamValue::SeqCutoff(policy)) => core.seq_cutoff_policy = policy,
                    _ => return Err(ErrorCode::Inval.into()),
                }
                Response::Done
            }
            Request::ConfigureIoClasses { cache_id, classes } => {
                let cache = state.cache_mut(cache_id)?;
                let mut previous = std::mem::take(&mut cache.io_classes);
                for class in classes {
                    let record = match previous.remove(&class.id) {
                        Some(old) => ClassRecord { class, ..old },
                        None => ClassRecord {
                            class,
                            usage: Usage::default(),
                            counters: Counters::default(),
                        },
                    };
                    cache.io_classes.insert(record.class.id, record);
                }
                Response::Done
            }
            Request::CheckDevice { device } => {
                let check = if let Some(cache) = state.caches.values().find(|cache| cache.device == device) {
                    DeviceCheck {
                        is_cache_device: true,
                        in_use: true,
                        clean_shutdown: false,
                        dirty: cache.dirty_of(None) > 0,
                    }
                } else if let Some(stored) = state.metadata.get(&metadata_key(&device)) {
                    DeviceCheck {
                        is_cache_device: true,
                        in_use: false,
                        clean_shutdown: stored.clean_shutdown,
                        dirty: stored.cache.dirty_of(None) > 0,
                    }
                } else {
                    DeviceCheck::default()
                };
                Response::Device(check)
            }
            Request::ZeroMetadata { device } => {
                if state.caches.values().any(|cache| cache.device == device) {
                    return Err(ErrorCode::NotOpenExc.into());
                }
                state
                    .metadata
                    .remove(&metadata_key(&device))
                    .ok_or(ErrorCode::NoMetadata)?;
                Response::Done
            }
            Request::ModuleVersions => Response::Versions(ModuleVersions {
                cache: state.modules.cache.clone(),
                disk: state.modules.disk.clone(),
            }),
        };
        Ok(response)
    }

    /// Write back dirty data in steps, saving progress after each one.
    fn flush(&self, state: &mut EngineState, cache_id: u16, core_id: Option<u16>) -> ControlResult<()> {
        self.interrupt.store(false, Ordering::SeqCst);
        let interrupted = match core_id {
            Some(_) => ErrorCode::FlushingInterrupted,
            None => ErrorCode::CacheFlushingInterrupted,
        };
        let delay = Duration::from_millis(state.flush_step_ms);
        let total = state.cache(cache_id)?.dirty_of(core_id);
        let step = total.div_ceil(FLUSH_STEPS).max(1);
        tracing::debug!(cache_id, ?core_id, total, "flush started");

        let mut remaining = total;
        while remaining > 0 {
            if self.interrupt.swap(false, Ordering::SeqCst) {
                state.cache_mut(cache_id)?.end_flush(core_id, false);
                tracing::debug!(cache_id, ?core_id, remaining, "flush interrupted");
                return Err(interrupted.into());
            }
            remaining = state.cache_mut(cache_id)?.clean(core_id, step);
            self.save(state)?;
            if remaining > 0 {
                thread::sleep(delay);
            }
        }
        state.cache_mut(cache_id)?.end_flush(core_id, true);
        Ok(())
    }
}

/// Requests that never change the state.
fn read_only(request: &Request) -> bool {
    matches!(
        request,
        Request::List
            | Request::CacheInfo { .. }
            | Request::CoreInfo { .. }
            | Request::IoClassInfo { .. }
            | Request::Stats { .. }
            | Request::GetCacheParam { .. }
            | Request::GetCoreParam { .. }
            | Request::CheckDevice { .. }
            | Request::ModuleVersions
            | Request::InterruptFlushing
    )
}

fn start_cache(state: &mut EngineState, start: StartCache) -> Result<Response, ErrorCode> {
    if state.device_in_use(&start.device) || state.core_pool.contains(&start.device) {
        return Err(ErrorCode::NotOpenExc);
    }
    let size_bytes = device_size(&start.device).ok_or(ErrorCode::InvalCacheDev)?;
    let key = metadata_key(&start.device);

    let (cache_id, cache) = match start.init {
        CacheInit::New => {
            if !start.force
                && let Some(stored) = state.metadata.get(&key)
            {
                return Err(if stored.cache.dirty_of(None) > 0 {
                    ErrorCode::DirtyExists
                } else {
                    ErrorCode::MetadataFound
                });
            }
            let cache_id = start
                .cache_id
                .unwrap_or_else(|| first_free_cache_id(state.caches.keys().copied()));
            let lines = size_bytes / (u64::from(start.line_size_kib) * 1024);
            (
                cache_id,
                CacheRecord::new(start.device, lines, start.line_size_kib, start.mode),
            )
        }
        CacheInit::Load => {
            let stored = state.metadata.get(&key).ok_or(ErrorCode::NoMetadata)?;
            if start.cache_id.is_some_and(|id| id != stored.cache_id) {
                return Err(ErrorCode::CacheNameMismatch);
            }
            let mut cache = stored.cache.clone();
            for core in cache.cores.values_mut() {
                core.flushed = 0;
                core.state = if core.device.exists() {
                    CoreState::Active
                } else {
                    CoreState::Inactive
                };
            }
            (stored.cache_id, cache)
        }
    };

    if state.caches.contains_key(&cache_id) {
        return Err(ErrorCode::CacheExist);
    }
    state.metadata.remove(&key);
    state.caches.insert(cache_id, cache);
    Ok(Response::Started { cache_id })
}

fn add_core(
    state: &mut EngineState,
    cache_id: u16,
    core_id: Option<u16>,
    device: PathBuf,
) -> Result<Response, ErrorCode> {
    state.cache(cache_id)?;
    if state.device_in_use(&device) {
        return Err(ErrorCode::NotOpenExc);
    }
    let size_bytes = device_size(&device).ok_or(ErrorCode::CoreNotAvail)?;
    let cache = state.cache_mut(cache_id)?;
    let core_id = match core_id {
        Some(id) if cache.cores.contains_key(&id) => return Err(ErrorCode::CoreExist),
        Some(id) => id,
        None => (0..=CORE_ID_MAX)
            .find(|id| !cache.cores.contains_key(id))
            .ok_or(ErrorCode::TooManyCores)?,
    };
    cache.cores.insert(core_id, CoreRecord::new(device.clone(), size_bytes));
    state.core_pool.retain(|path| *path != device);
    Ok(Response::CoreAdded { core_id })
}

fn get_cache_param(cache: &CacheRecord, param: CacheParam) -> ParamValue {
    let (cleaning, promotion) = (&cache.cleaning, &cache.promotion);
    match param {
        CacheParam::CleaningPolicy => ParamValue::Cleaning(cleaning.policy),
        CacheParam::AlruWakeUp => ParamValue::Number(cleaning.alru_wake_up),
        CacheParam::AlruStalenessTime => ParamValue::Number(cleaning.alru_staleness_time),
        CacheParam::AlruFlushMaxBuffers => ParamValue::Number(cleaning.alru_flush_max_buffers),
        CacheParam::AlruActivityThreshold => ParamValue::Number(cleaning.alru_activity_threshold),
        CacheParam::AcpWakeUp => ParamValue::Number(cleaning.acp_wake_up),
        CacheParam::AcpFlushMaxBuffers => ParamValue::Number(cleaning.acp_flush_max_buffers),
        CacheParam::PromotionPolicy => ParamValue::Promotion(promotion.policy),
        CacheParam::NhitThreshold => ParamValue::Number(promotion.nhit_threshold),
        CacheParam::NhitTrigger => ParamValue::Number(promotion.nhit_trigger),
    }
}

fn set_cache_param(cache: &mut CacheRecord, param: CacheParam, value: ParamValue) -> Result<(), ErrorCode> {
    let (cleaning, promotion) = (&mut cache.cleaning, &mut cache.promotion);
    match (param, value) {
        (CacheParam::CleaningPolicy, ParamValue::Cleaning(policy)) => cleaning.policy = policy,
        (CacheParam::PromotionPolicy, ParamValue::Promotion(policy)) => promotion.policy = policy,
        (param, ParamValue::Number(n)) => {
            let slot = match param {
                CacheParam::AlruWakeUp => &mut cleaning.alru_wake_up,
                CacheParam::AlruStalenessTime => &mut cleaning.alru_staleness_time,
                CacheParam::AlruFlushMaxBuffers => &mut cleaning.alru_flush_max_buffers,
                CacheParam::AlruActivityThreshold => &mut cleaning.alru_activity_threshold,
                CacheParam::AcpWakeUp => &mut cleaning.acp_wake_up,
                CacheParam::AcpFlushMaxBuffers => &mut cleaning.acp_flush_max_buffers,
                CacheParam::NhitThreshold => &mut promotion.nhit_threshold,
                CacheParam::NhitTrigger => &mut promotion.nhit_trigger,
                CacheParam::CleaningPolicy | CacheParam::PromotionPolicy => return Err(ErrorCode::Inval),
            };
            *slot = n;
        }
        _ => return Err(ErrorCode::Inval),
    }
    Ok(())
}

impl ControlChannel for SimEngine {
    fn execute(&mut self, request: Request) -> ControlResult<Response> {
        tracing::debug!(request = request.name(), state = %self.path.display(), "engine request");
        let mut state = self.load()?;
        let mutates = !read_only(&request);
        let outcome = self.apply(&mut state, request);
        if mutates {
            self.save(&state)?;
        }
        if let Err(e) = &outcome {
            tracing::debug!(error = %e, "engine rejected request");
        }
        outcome
    }

    fn open_handle(&self) -> ControlResult<Box<dyn ControlChannel>> {
        Ok(Box::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlExt;
    use tempfile::TempDir;

    struct Bench {
        dir: TempDir,
        engine: SimEngine,
    }

    impl Bench {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let engine = SimEngine::open(dir.path().join("state").join("engine.json"));
            Self { dir, engine }
        }

        fn device(&self, name: &str, bytes: u64) -> PathBuf {
            let path = self.dir.path().join(name);
            File::create(&path).unwrap().set_len(bytes).unwrap();
            path
        }

        fn start(&mut self, device: &Path, init: CacheInit, force: bool) -> ControlResult<Response> {
            self.engine.execute(Request::StartCache(StartCache {
                cache_id: None,
                device: device.to_path_buf(),
                init,
                mode: CacheMode::Wb,
                line_size_kib: 4,
                force,
            }))
        }

        fn edit(&self, f: impl FnOnce(&mut EngineState)) {
            let mut state = self.engine.load().unwrap();
            f(&mut state);
            self.engine.save(&state).unwrap();
        }

        fn make_dirty(&self, cache_id: u16, core_id: u16, dirty: u64) {
            self.edit(|state| {
                let core = state.caches.get_mut(&cache_id).unwrap().cores.get_mut(&core_id).unwrap();
                core.usage = Usage {
                    occupancy: dirty,
                    clean: 0,
                    dirty,
                };
                core.dirty_for = 90;
                state.flush_step_ms = 0;
            });
        }
    }

    #[test]
    fn state_survives_between_engines() {
        let mut bench = Bench::new();
        let ssd = bench.device("ssd", 64 << 20);
        assert_eq!(
            bench.start(&ssd, CacheInit::New, false).unwrap(),
            Response::Started { cache_id: 1 }
        );

        let mut other = SimEngine::open(bench.engine.state_path());
        let listing = other.list().unwrap();
        assert_eq!(listing.caches.len(), 1);
        let cache = &listing.caches[0].cache;
        assert_eq!(cache.size, (64 << 20) / 4096);
        assert_eq!(cache.mode, CacheMode::Wb);
        assert_eq!(cache.state, CacheState::RUNNING);
    }

    #[test]
    fn missing_state_is_an_idle_engine() {
        let mut bench = Bench::new();
        assert!(bench.engine.list().unwrap().caches.is_empty());
        assert!(!bench.engine.state_path().exists());
    }

    #[test]
    fn corrupt_state_is_reported() {
        let mut bench = Bench::new();
        let path = bench.engine.state_path().to_path_buf();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(bench.engine.list(), Err(ControlError::Corrupt { .. })));
    }

    #[test]
    fn stopped_cache_leaves_metadata_behind() {
        let mut bench = Bench::new();
        let ssd = bench.device("ssd", 64 << 20);
        bench.start(&ssd, CacheInit::New, false).unwrap();
        bench.engine.run(Request::StopCache { cache_id: 1, flush: true }).unwrap();

        let err = bench.start(&ssd, CacheInit::New, false).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::MetadataFound));

        let check = bench.engine.check_device(ssd.clone()).unwrap();
        assert!(check.is_cache_device && check.clean_shutdown && !check.in_use);

        assert_eq!(
            bench.start(&ssd, CacheInit::Load, false).unwrap(),
            Response::Started { cache_id: 1 }
        );
        assert!(bench.engine.check_device(ssd).unwrap().in_use);
    }

    #[test]
    fn load_needs_metadata_and_matching_id() {
        let mut bench = Bench::new();
        let ssd = bench.device("ssd", 64 << 20);
        let err = bench.start(&ssd, CacheInit::Load, false).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NoMetadata));

        bench.start(&ssd, CacheInit::New, false).unwrap();
        bench.engine.run(Request::StopCache { cache_id: 1, flush: false }).unwrap();
        let err = bench
            .engine
            .execute(Request::StartCache(StartCache {
                cache_id: Some(7),
                device: ssd,
                init: CacheInit::Load,
                mode: CacheMode::Wt,
                line_size_kib: 4,
                force: false,
            }))
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::CacheNameMismatch));
    }

    #[test]
    fn dirty_metadata_blocks_a_fresh_start_until_forced() {
        let mut bench = Bench::new();
        let ssd = bench.device("ssd", 64 << 20);
        let hdd = bench.device("hdd", 128 << 20);
        bench.start(&ssd, CacheInit::New, false).unwrap();
        bench.engine.run(Request::AddCore { cache_id: 1, core_id: None, device: hdd }).unwrap();
        bench.make_dirty(1, 0, 100);
        bench.engine.run(Request::StopCache { cache_id: 1, flush: false }).unwrap();

        assert!(bench.engine.check_device(ssd.clone()).unwrap().dirty);
        let err = bench.start(&ssd, CacheInit::New, false).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::DirtyExists));
        bench.start(&ssd, CacheInit::New, true).unwrap();
        assert!(bench.engine.cache_info(1).unwrap().core_ids.is_empty());
    }

    #[test]
    fn load_marks_missing_cores_inactive() {
        let mut bench = Bench::new();
        let ssd = bench.device("ssd", 64 << 20);
        let hdd = bench.device("hdd", 128 << 20);
        bench.start(&ssd, CacheInit::New, false).unwrap();
        bench.engine.run(Request::AddCore { cache_id: 1, core_id: Some(3), device: hdd.clone() }).unwrap();
        bench.engine.run(Request::StopCache { cache_id: 1, flush: true }).unwrap();
        fs::remove_file(&hdd).unwrap();

        bench.start(&ssd, CacheInit::Load, false).unwrap();
        let info = bench.engine.cache_info(1).unwrap();
        assert_eq!(info.state.name(), "Incomplete");
        assert_eq!(info.inactive_cores, 1);
        assert_eq!(bench.engine.core_info(1, 3).unwrap().state, CoreState::Inactive);
    }

    #[test]
    fn devices_are_exclusive() {
        let mut bench = Bench::new();
        let ssd = bench.device("ssd", 64 << 20);
        let hdd = bench.device("hdd", 128 << 20);
        bench.start(&ssd, CacheInit::New, false).unwrap();
        let err = bench
            .engine
            .run(Request::AddCore { cache_id: 1, core_id: None, device: ssd.clone() })
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NotOpenExc));

        assert_eq!(
            bench
                .engine
                .execute(Request::AddCore { cache_id: 1, core_id: None, device: hdd.clone() })
                .unwrap(),
            Response::CoreAdded { core_id: 0 }
        );
        let err = bench.start(&hdd, CacheInit::New, false).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NotOpenExc));
    }

    #[test]
    fn core_ids_are_unique_per_cache() {
        let mut bench = Bench::new();
        let ssd = bench.device("ssd", 64 << 20);
        let a = bench.device("a", 1 << 20);
        let b = bench.device("b", 1 << 20);
        bench.start(&ssd, CacheInit::New, false).unwrap();
        bench.engine.run(Request::AddCore { cache_id: 1, core_id: Some(0), device: a }).unwrap();
        let err = bench
            .engine
            .run(Request::AddCore { cache_id: 1, core_id: Some(0), device: b.clone() })
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::CoreExist));
        let err = bench
            .engine
            .run(Request::AddCore { cache_id: 2, core_id: None, device: b })
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::CacheNotExist));
    }

    #[test]
    fn flush_cleans_every_dirty_block() {
        let mut bench = Bench::new();
        let ssd = bench.device("ssd", 64 << 20);
        let hdd = bench.device("hdd", 128 << 20);
        bench.start(&ssd, CacheInit::New, false).unwrap();
        bench.engine.run(Request::AddCore { cache_id: 1, core_id: None, device: hdd }).unwrap();
        bench.make_dirty(1, 0, 1234);

        assert_eq!(bench.engine.cache_info(1).unwrap().dirty_for, 90);
        bench.engine.run(Request::FlushCache { cache_id: 1 }).unwrap();
        let info = bench.engine.cache_info(1).unwrap();
        assert_eq!((info.dirty, info.flushed, info.dirty_for), (0, 0, 0));
        let stats = bench.engine.stats(1, Some(0), None).unwrap();
        assert_eq!(stats.usage.clean, 1234);
    }

    #[test]
    fn interrupted_flush_keeps_remaining_dirty_data() {
        let mut bench = Bench::new();
        let ssd = bench.device("ssd", 64 << 20);
        let hdd = bench.device("hdd", 128 << 20);
        bench.start(&ssd, CacheInit::New, false).unwrap();
        bench.engine.run(Request::AddCore { cache_id: 1, core_id: None, device: hdd }).unwrap();
        bench.make_dirty(1, 0, 1000);
        bench.edit(|state| state.flush_step_ms = 40);

        let mut handle = bench.engine.open_handle().unwrap();
        let interrupter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(60));
            handle.run(Request::InterruptFlushing).unwrap();
        });
        let err = bench.engine.run(Request::FlushCore { cache_id: 1, core_id: 0 }).unwrap_err();
        interrupter.join().unwrap();

        assert!(err.is_interrupted());
        assert_eq!(err.code(), Some(ErrorCode::FlushingInterrupted));
        let core = bench.engine.core_info(1, 0).unwrap();
        assert!(core.dirty > 0 && core.dirty < 1000);
        assert_eq!(core.flushed, 0);
    }

    #[test]
    fn leaving_a_lazy_mode_without_flush_cleans_in_background() {
        let mut bench = Bench::new();
        let ssd = bench.device("ssd", 64 << 20);
        let hdd = bench.device("hdd", 128 << 20);
        bench.start(&ssd, CacheInit::New, false).unwrap();
        bench.engine.run(Request::AddCore { cache_id: 1, core_id: None, device: hdd }).unwrap();
        bench.make_dirty(1, 0, 50);

        bench
            .engine
            .run(Request::SetCacheMode { cache_id: 1, mode: CacheMode::Wt, flush: false })
            .unwrap();
        let info = bench.engine.cache_info(1).unwrap();
        assert_eq!(info.mode, CacheMode::Wt);
        assert_eq!(info.dirty, 0);
    }

    #[test]
    fn inactive_dirty_core_needs_force() {
        let mut bench = Bench::new();
        let ssd = bench.device("ssd", 64 << 20);
        let hdd = bench.device("hdd", 128 << 20);
        bench.start(&ssd, CacheInit::New, false).unwrap();
        bench.engine.run(Request::AddCore { cache_id: 1, core_id: None, device: hdd }).unwrap();
        bench.make_dirty(1, 0, 10);
        bench.edit(|state| {
            state.caches.get_mut(&1).unwrap().cores.get_mut(&0).unwrap().state = CoreState::Inactive;
        });

        let remove = |force| Request::RemoveCore { cache_id: 1, core_id: 0, force };
        let err = bench.engine.run(remove(false)).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InactiveCoreIsDirty));
        bench.engine.run(remove(true)).unwrap();
        assert!(bench.engine.cache_info(1).unwrap().core_ids.is_empty());
    }

    #[test]
    fn io_class_stats_come_from_configured_classes() {
        let mut bench = Bench::new();
        let ssd = bench.device("ssd", 64 << 20);
        bench.start(&ssd, CacheInit::New, false).unwrap();
        assert_eq!(bench.engine.io_class(1, 0).unwrap().name, "unclassified");

        let class = IoClass {
            id: 5,
            name: "metadata".into(),
            priority: None,
            max_percent: 50,
            max_size: 8192,
        };
        bench
            .engine
            .run(Request::ConfigureIoClasses { cache_id: 1, classes: vec![class.clone()] })
            .unwrap();
        assert_eq!(bench.engine.io_class(1, 5).unwrap(), class);
        let err = bench.engine.stats(1, None, Some(0)).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::IoClassNotExist));
        assert_eq!(bench.engine.stats(1, None, Some(5)).unwrap().size, 16384);
    }

    #[test]
    fn parameters_round_trip() {
        let mut bench = Bench::new();
        let ssd = bench.device("ssd", 64 << 20);
        let hdd = bench.device("hdd", 128 << 20);
        bench.start(&ssd, CacheInit::New, false).unwrap();
        bench.engine.run(Request::AddCore { cache_id: 1, core_id: None, device: hdd }).unwrap();

        assert_eq!(
            bench.engine.cache_param(1, CacheParam::AlruWakeUp).unwrap(),
            ParamValue::Number(20)
        );
        bench
            .engine
            .run(Request::SetCacheParam {
                cache_id: 1,
                param: CacheParam::CleaningPolicy,
                value: ParamValue::Cleaning(CleaningPolicy::Acp),
            })
            .unwrap();
        assert_eq!(bench.engine.cache_info(1).unwrap().cleaning, CleaningPolicy::Acp);

        let err = bench
            .engine
            .run(Request::SetCacheParam {
                cache_id: 1,
                param: CacheParam::NhitThreshold,
                value: ParamValue::Cleaning(CleaningPolicy::Nop),
            })
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Inval));

        bench
            .engine
            .run(Request::SetCoreParam {
                cache_id: 1,
                core_id: 0,
                param: CoreParam::SeqCutoffThreshold,
                value: ParamValue::Number(4096),
            })
            .unwrap();
        assert_eq!(
            bench.engine.core_param(1, 0, CoreParam::SeqCutoffThreshold).unwrap(),
            ParamValue::Number(4096)
        );
    }

    #[test]
    fn zero_metadata_refuses_running_caches() {
        let mut bench = Bench::new();
        let ssd = bench.device("ssd", 64 << 20);
        let err = bench.engine.run(Request::ZeroMetadata { device: ssd.clone() }).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NoMetadata));

        bench.start(&ssd, CacheInit::New, false).unwrap();
        let err = bench.engine.run(Request::ZeroMetadata { device: ssd.clone() }).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NotOpenExc));

        bench.engine.run(Request::StopCache { cache_id: 1, flush: true }).unwrap();
        bench.engine.run(Request::ZeroMetadata { device: ssd.clone() }).unwrap();
        assert!(!bench.engine.check_device(ssd).unwrap().is_cache_device);
    }

    #[test]
    fn detached_devices_leave_the_pool() {
        let mut bench = Bench::new();
        let pooled = PathBuf::from("/dev/sdz");
        bench.edit(|state| state.core_pool.push(pooled.clone()));
        assert_eq!(bench.engine.list().unwrap().core_pool, vec![pooled.clone()]);
        bench.engine.run(Request::RemoveDetached { device: pooled.clone() }).unwrap();
        let err = bench.engine.run(Request::RemoveDetached { device: pooled }).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::CoreNotAvail));
    }

    #[test]
    fn module_versions_default_to_the_cache_module_only() {
        let mut bench = Bench::new();
        let versions = bench.engine.module_versions().unwrap();
        assert_eq!(versions.cache.as_deref(), Some(env!("CARGO_PKG_VERSION")));
        assert_eq!(versions.disk, None);
    }
}
