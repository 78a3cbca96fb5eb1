//! Data exchanged with the cache engine.
//!
//! Counters are raw; percentages are derived by the statistics producers.
//! All sizes in 4KiB blocks unless a field name says otherwise.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::CacheMode;

pub const CACHE_ID_MIN: u16 = 1;
pub const CACHE_ID_MAX: u16 = 16384;
pub const CORE_ID_MAX: u16 = 4095;
pub const IO_CLASS_ID_MAX: u8 = 32;
pub const IO_CLASS_PRIO_HIGHEST: u8 = 0;
pub const IO_CLASS_PRIO_LOWEST: u8 = 255;
pub const IO_CLASS_NAME_MAX: usize = 1024;

macro_rules! named_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal,)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)*
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|v| v.name() == value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

named_enum! {
    CleaningPolicy {
        Nop => "nop",
        #[default]
        Alru => "alru",
        Acp => "acp",
    }
}

named_enum! {
    PromotionPolicy {
        #[default]
        Always => "always",
        Nhit => "nhit",
    }
}

named_enum! {
    SeqCutoffPolicy {
        Always => "always",
        #[default]
        Full => "full",
        Never => "never",
    }
}

named_enum! {
    CoreState {
        #[default]
        Active => "Active",
        Inactive => "Inactive",
    }
}

/// Bit set of cache states. Combined states are named after the highest bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheState(u8);

impl CacheState {
    pub const RUNNING: CacheState = CacheState(1 << 0);
    pub const STOPPING: CacheState = CacheState(1 << 1);
    pub const INITIALIZING: CacheState = CacheState(1 << 2);
    pub const INCOMPLETE: CacheState = CacheState(1 << 3);

    const NAMES: [&'static str; 4] = ["Running", "Stopping", "Initializing", "Incomplete"];

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn with(self, other: CacheState) -> CacheState {
        CacheState(self.0 | other.0)
    }

    pub const fn without(self, other: CacheState) -> CacheState {
        CacheState(self.0 & !other.0)
    }

    pub const fn contains(self, other: CacheState) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn name(self) -> &'static str {
        (0..Self::NAMES.len())
            .rev()
            .find(|bit| self.0 & (1 << bit) != 0)
            .map_or("Not running", |bit| Self::NAMES[bit])
    }
}

/// Tunables of the cleaning policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningParams {
    pub policy: CleaningPolicy,
    pub alru_wake_up: u32,
    pub alru_staleness_time: u32,
    pub alru_flush_max_buffers: u32,
    pub alru_activity_threshold: u32,
    pub acp_wake_up: u32,
    pub acp_flush_max_buffers: u32,
}

impl Default for CleaningParams {
    fn default() -> Self {
        Self {
            policy: CleaningPolicy::Alru,
            alru_wake_up: 20,
            alru_staleness_time: 120,
            alru_flush_max_buffers: 100,
            alru_activity_threshold: 10000,
            acp_wake_up: 10,
            acp_flush_max_buffers: 128,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionParams {
    pub policy: PromotionPolicy,
    pub nhit_threshold: u32,
    pub nhit_trigger: u32,
}

impl Default for PromotionParams {
    fn default() -> Self {
        Self {
            policy: PromotionPolicy::Always,
            nhit_threshold: 3,
            nhit_trigger: 80,
        }
    }
}

/// Cache-level runtime parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheParam {
    CleaningPolicy,
    AlruWakeUp,
    AlruStalenessTime,
    AlruFlushMaxBuffers,
    AlruActivityThreshold,
    AcpWakeUp,
    AcpFlushMaxBuffers,
    PromotionPolicy,
    NhitThreshold,
    NhitTrigger,
}

/// Core-level runtime parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreParam {
    /// Bytes.
    SeqCutoffThreshold,
    SeqCutoffPolicy,
}

/// Value of a runtime parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamValue {
    Number(u32),
    Cleaning(CleaningPolicy),
    Promotion(PromotionPolicy),
    SeqCutoff(SeqCutoffPolicy),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub occupancy: u64,
    pub clean: u64,
    pub dirty: u64,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.occupancy += other.occupancy;
        self.clean += other.clean;
        self.dirty += other.dirty;
    }
}

/// Request, block and error counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Counters {
    pub read_hits: u64,
    pub read_partial_misses: u64,
    pub read_full_misses: u64,
    pub write_hits: u64,
    pub write_partial_misses: u64,
    pub write_full_misses: u64,
    pub read_pass_through: u64,
    pub write_pass_through: u64,

    pub core_reads: u64,
    pub core_writes: u64,
    pub cache_reads: u64,
    pub cache_writes: u64,
    pub exported_reads: u64,
    pub exported_writes: u64,

    pub cache_read_errors: u64,
    pub cache_write_errors: u64,
    pub core_read_errors: u64,
    pub core_write_errors: u64,
}

impl Counters {
    pub fn add(&mut self, other: &Counters) {
        self.read_hits += other.read_hits;
        self.read_partial_misses += other.read_partial_misses;
        self.read_full_misses += other.read_full_misses;
        self.write_hits += other.write_hits;
        self.write_partial_misses += other.write_partial_misses;
        self.write_full_misses += other.write_full_misses;
        self.read_pass_through += other.read_pass_through;
        self.write_pass_through += other.write_pass_through;
        self.core_reads += other.core_reads;
        self.core_writes += other.core_writes;
        self.cache_reads += other.cache_reads;
        self.cache_writes += other.cache_writes;
        self.exported_reads += other.exported_reads;
        self.exported_writes += other.exported_writes;
        self.cache_read_errors += other.cache_read_errors;
        self.cache_write_errors += other.cache_write_errors;
        self.core_read_errors += other.core_read_errors;
        self.core_write_errors += other.core_write_errors;
    }
}

/// Statistics snapshot for a cache, a core or an IO class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// Capacity the usage figures are relative to.
    pub size: u64,
    pub usage: Usage,
    pub counters: Counters,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    pub id: u16,
    pub device: PathBuf,
    /// Cache lines.
    pub size: u64,
    pub line_size_kib: u32,
    pub mode: CacheMode,
    pub cleaning: CleaningPolicy,
    pub promotion: PromotionPolicy,
    pub state: CacheState,
    pub core_ids: Vec<u16>,
    pub inactive_cores: u32,
    pub inactive: Usage,
    pub dirty: u64,
    pub flushed: u64,
    /// Seconds since the oldest dirty write.
    pub dirty_for: u64,
    /// Bytes.
    pub metadata_footprint: u64,
}

impl CacheInfo {
    /// Cache size in 4KiB blocks.
    pub fn size_in_blocks(&self) -> u64 {
        self.size * u64::from(self.line_size_kib / 4)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreInfo {
    pub cache_id: u16,
    pub id: u16,
    pub device: PathBuf,
    pub size_bytes: u64,
    pub state: CoreState,
    pub dirty: u64,
    pub flushed: u64,
    pub dirty_for: u64,
    /// Bytes.
    pub seq_cutoff_threshold: u32,
    pub seq_cutoff_policy: SeqCutoffPolicy,
}

impl CoreInfo {
    pub fn exported_object(&self) -> String {
        format!("/dev/cas{}-{}", self.cache_id, self.id)
    }
}

/// One configured IO class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoClass {
    pub id: u8,
    pub name: String,
    /// `None` is pinned.
    pub priority: Option<u8>,
    /// Share of the cache, 0..=100; 0 routes the class to pass-through.
    pub max_percent: u32,
    /// Share of the cache in 4KiB blocks.
    pub max_size: u64,
}

impl IoClass {
    pub fn unclassified(cache_blocks: u64) -> Self {
        Self {
            id: 0,
            name: "unclassified".to_string(),
            priority: Some(IO_CLASS_PRIO_LOWEST),
            max_percent: 100,
            max_size: cache_blocks,
        }
    }
}

/// A cache with its cores, as returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheListing {
    pub cache: CacheInfo,
    pub cores: Vec<CoreInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Listing {
    pub caches: Vec<CacheListing>,
    /// Devices waiting in the core pool for their cache to load.
    pub core_pool: Vec<PathBuf>,
}

/// Metadata check result for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCheck {
    pub is_cache_device: bool,
    pub in_use: bool,
    pub clean_shutdown: bool,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleVersions {
    pub cache: Option<String>,
    pub disk: Option<String>,
}

/// First id not taken by `ids`, counting up from [`CACHE_ID_MIN`].
pub fn first_free_cache_id(ids: impl IntoIterator<Item = u16>) -> u16 {
    let mut ids: Vec<u16> = ids.into_iter().collect();
    ids.sort_unstable();
    let mut candidate = CACHE_ID_MIN;
    for id in ids {
        if id == candidate {
            candidate += 1;
        }
    }
    candidate
}

/// `100 * flushed / (dirty + flushed)`, or 0 while nothing was flushed.
pub fn flush_progress(dirty: u64, flushed: u64) -> f64 {
    if flushed == 0 {
        return 0.0;
    }
    let total = dirty + flushed;
    if total == 0 {
        100.0
    } else {
        100.0 * flushed as f64 / total as f64
    }
}
