//! Extended error codes reported by the cache engine and their messages.

use std::fmt;

/// Engine-specific failure code attached to a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Inval,
    InvalVolumeType,
    Intr,
    Unknown,
    TooManyCaches,
    NoMem,
    NoFreeRam,
    StartCacheFail,
    CacheNotExist,
    CoreNotExist,
    CacheExist,
    TooManyCores,
    CoreExist,
    CoreUuidExists,
    CoreNotAvail,
    CacheNotAvail,
    IoClassNotExist,
    Io,
    WriteCache,
    WriteCore,
    DirtyShutdown,
    DirtyExists,
    FlushingInterrupted,
    CacheFlushingInterrupted,
    FlushInProgress,
    CannotAddCoreToPool,
    CacheInIncompleteState,
    CoreInInactiveState,
    NotOpenExc,
    Again,
    NotSupp,
    MetadataVer,
    NoMetadata,
    MetadataFound,
    SuperblockMismatch,
    CrcMismatch,
    CacheNameMismatch,
    InvalCacheDev,
    NoLock,
    CacheLineSizeMismatch,
    CoreSizeMismatch,

    Root,
    System,
    BadRange,
    DevSpace,
    InvIoctl,
    DevPending,
    FileExists,
    Unaligned,
    ContainsPart,
    APart,
    Detached,
    StoppedDirty,
    NoCacheAttached,
    CorePoolNotEmpty,
    WaitingInterrupted,
    CoreInActiveState,
    InactiveCoreIsDirty,
}

impl ErrorCode {
    pub fn message(self) -> &'static str {
        use ErrorCode::*;
        match self {
            Inval => "Invalid input parameter",
            InvalVolumeType => "Invalid volume type",
            Intr => "Interrupted by a signal",
            Unknown => "Unknown error occurred",
            TooManyCaches => "Too many caches",
            NoMem => "Not enough memory to allocate a new cache device",
            NoFreeRam => "Not enough free RAM for cache metadata to start cache",
            StartCacheFail => "Failed to insert cache",
            CacheNotExist => "Cache ID does not exist",
            CoreNotExist => "Core ID does not exist",
            CacheExist => "Cache ID already exists",
            TooManyCores => "Too many core devices in cache",
            CoreExist => "Core id already used",
            CoreUuidExists => "Device already added as a core",
            CoreNotAvail => "Core device not available",
            CacheNotAvail => "Cache device not available",
            IoClassNotExist => "No such IO class ID in the cache",
            Io => "I/O error",
            WriteCache => "Error while writing to cache device",
            WriteCore => "Error while writing to core device",
            DirtyShutdown => {
                "Please use --load option to restore previous cache state (Warning: data corruption may happen)\n\
                 Or initialize your cache using --force option. Warning: All dirty data will be lost!"
            }
            DirtyExists => "Cache closed with dirty data.\nPlease start cache using --load or --force option.",
            FlushingInterrupted => "Flushing of core interrupted",
            CacheFlushingInterrupted => "Cache flushing interrupted",
            FlushInProgress => "Another flush operation in progress",
            CannotAddCoreToPool => "Error occurred during adding core device to core pool",
            CacheInIncompleteState => "Cache is in incomplete state - at least one core is inactive",
            CoreInInactiveState => "Core device is in inactive state",
            NotOpenExc => "Cannot open device exclusively",
            Again => "Try again",
            NotSupp => "Operation not supported",
            MetadataVer => "Metadata version mismatch",
            NoMetadata => "No metadata found on device",
            MetadataFound => {
                "Old metadata found on device.\nPlease load cache metadata using --load option or use --force to\n \
                 discard on-disk metadata and start fresh cache instance."
            }
            SuperblockMismatch => "Metadata on the device doesn't match with metadata in DRAM",
            CrcMismatch => "Metadata checksum is not correct. Metadata is damaged",
            CacheNameMismatch => "Cache id specified by user and loaded from metadata are different",
            InvalCacheDev => "Device does not meet requirements. See dmesg for more information",
            NoLock => "Failed to lock cache for management operation.",
            CacheLineSizeMismatch => "Cache line size mismatch",
            CoreSizeMismatch => "Core volume size does not match the size stored in cache metadata",

            Root => "Must be root",
            System => "System Error",
            BadRange => "Range parameters are invalid",
            DevSpace => "Illegal range, out of device space",
            InvIoctl => "Invalid ioctl",
            DevPending => "Device opens or mount are pending to this cache",
            FileExists => "Could not create exported object because file in /dev directory exists",
            Unaligned => {
                "Cache device logical sector size is greater than core device logical sector size.\n\
                 Consider changing logical sector size on current cache device \n\
                 or try other device with the same logical sector size as core device."
            }
            ContainsPart => {
                "Device contains partitions.\nIf you want to continue, please use --force option.\n\
                 Warning: all data will be lost!"
            }
            APart => "Formatting of partition is unsupported.",
            Detached => "Failed to remove core. See dmesg for more information",
            StoppedDirty => {
                "Cache has been stopped with flushing error.\n\
                 Warning: Core devices may contain inconsistent data.\n\
                 To access your data, please start cache with --load option."
            }
            NoCacheAttached => "Operation not allowed. Caching device is not attached.",
            CorePoolNotEmpty => "Operation not allowed. Core pool is not empty.",
            WaitingInterrupted => "Waiting for operation interrupted",
            CoreInActiveState => "Core device is in active state",
            InactiveCoreIsDirty => {
                "The cache contains dirty data assigned to the core. If you want to continue, \
                 please use --force option.\nWarning: the data will be lost"
            }
        }
    }

    /// Codes reporting that the user cut a flush short.
    pub fn is_interrupted(self) -> bool {
        matches!(
            self,
            ErrorCode::FlushingInterrupted | ErrorCode::CacheFlushingInterrupted
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_the_table() {
        assert_eq!(ErrorCode::CacheNotExist.to_string(), "Cache ID does not exist");
        assert_eq!(ErrorCode::CoreUuidExists.message(), "Device already added as a core");
        assert!(ErrorCode::MetadataFound.message().contains("--load option or use --force to\n discard"));
    }

    #[test]
    fn only_flush_interruptions_are_interrupted() {
        assert!(ErrorCode::FlushingInterrupted.is_interrupted());
        assert!(ErrorCode::CacheFlushingInterrupted.is_interrupted());
        assert!(!ErrorCode::Intr.is_interrupted());
        assert!(!ErrorCode::WaitingInterrupted.is_interrupted());
    }
}
