//! Silt provides the bounded-memory building blocks for external-memory pipelines: record
//! streams fed by background I/O threads, a spill-to-disk sorter, a spill-to-disk priority
//! queue, and the scratch-space accounting they all share.  Every intermediate byte settles
//! into a scratch directory and is swept away when its owner drops.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use biometrics::{Collector, Counter};

use zerror::{iotoz, Z};
use zerror_core::ErrorCore;

pub mod heap;
pub mod record;
pub mod sorter;
pub mod stream;

pub use heap::ExtHeap;
pub use record::Record;
pub use sorter::{SortedStream, Sorter, SorterOptions};
pub use stream::{
    RecordReader, RecordReverseReader, RecordWriter, ScratchVec, ScratchVecWriter, StreamOptions,
};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static SCRATCH_ALLOC: Counter = Counter::new("silt.scratch.alloc");
static SCRATCH_FULL: Counter = Counter::new("silt.scratch.full");
static SCRATCH_RECLAIM: Counter = Counter::new("silt.scratch.reclaim");

pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&SCRATCH_ALLOC);
    collector.register_counter(&SCRATCH_FULL);
    collector.register_counter(&SCRATCH_RECLAIM);
    sorter::register_biometrics(collector);
    heap::register_biometrics(collector);
    stream::register_biometrics(collector);
}

///////////////////////////////////////////// Constants ////////////////////////////////////////////

/// The smallest arena a sorter or heap will accept.  A budget below this cannot hold one
/// useful run and the caller's partitioning is considered broken.
pub const MIN_ARENA_BYTES: usize = 1 << 20;

/////////////////////////////////////////////// Error //////////////////////////////////////////////

#[derive(Clone, Debug)]
pub enum Error {
    Success {
        core: ErrorCore,
    },
    ScratchFull {
        core: ErrorCore,
        cap: u64,
        requested: u64,
    },
    MemoryBudget {
        core: ErrorCore,
        minimum: usize,
        budget: usize,
    },
    SystemError {
        core: ErrorCore,
        what: String,
    },
    Corruption {
        core: ErrorCore,
        context: String,
    },
    LogicError {
        core: ErrorCore,
        context: String,
    },
    EmptyStream {
        core: ErrorCore,
        context: String,
    },
}

impl Error {
    fn core(&self) -> &ErrorCore {
        match self {
            Error::Success { core, .. } => core,
            Error::ScratchFull { core, .. } => core,
            Error::MemoryBudget { core, .. } => core,
            Error::SystemError { core, .. } => core,
            Error::Corruption { core, .. } => core,
            Error::LogicError { core, .. } => core,
            Error::EmptyStream { core, .. } => core,
        }
    }

    fn core_mut(&mut self) -> &mut ErrorCore {
        match self {
            Error::Success { core, .. } => core,
            Error::ScratchFull { core, .. } => core,
            Error::MemoryBudget { core, .. } => core,
            Error::SystemError { core, .. } => core,
            Error::Corruption { core, .. } => core,
            Error::LogicError { core, .. } => core,
            Error::EmptyStream { core, .. } => core,
        }
    }
}

impl Default for Error {
    fn default() -> Self {
        Error::Success {
            core: ErrorCore::default(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::Success { core: _ } => fmt.debug_struct("Success").finish(),
            Error::ScratchFull { core: _, cap, requested } => fmt
                .debug_struct("ScratchFull")
                .field("cap", cap)
                .field("requested", requested)
                .finish(),
            Error::MemoryBudget { core: _, minimum, budget } => fmt
                .debug_struct("MemoryBudget")
                .field("minimum", minimum)
                .field("budget", budget)
                .finish(),
            Error::SystemError { core: _, what } => fmt
                .debug_struct("SystemError")
                .field("what", what)
                .finish(),
            Error::Corruption { core: _, context } => fmt
                .debug_struct("Corruption")
                .field("context", context)
                .finish(),
            Error::LogicError { core: _, context } => fmt
                .debug_struct("LogicError")
                .field("context", context)
                .finish(),
            Error::EmptyStream { core: _, context } => fmt
                .debug_struct("EmptyStream")
                .field("context", context)
                .finish(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(what: std::io::Error) -> Error {
        Error::SystemError {
            core: ErrorCore::default(),
            what: format!("{:?}", what),
        }
    }
}

impl Z for Error {
    type Error = Self;

    fn long_form(&self) -> String {
        format!("{}", self) + "\n" + &self.core().long_form()
    }

    fn with_info<X: std::fmt::Debug>(mut self, name: &str, value: X) -> Self::Error {
        self.core_mut().set_info(name, value);
        self
    }

    fn with_lazy_info<F: FnOnce() -> String>(mut self, name: &str, value: F) -> Self::Error {
        self.core_mut().set_lazy_info(name, value);
        self
    }
}

iotoz! {Error}

pub fn logic_error(context: &str) -> Error {
    Error::LogicError {
        core: ErrorCore::default(),
        context: context.to_string(),
    }
}

pub fn empty_stream(context: &str) -> Error {
    Error::EmptyStream {
        core: ErrorCore::default(),
        context: context.to_string(),
    }
}

/////////////////////////////////////////// ScratchInner ///////////////////////////////////////////

// Distinguishes ScratchDir instances that share a directory within one process.
static SCRATCH_INSTANCE: AtomicU64 = AtomicU64::new(0);

struct ScratchInner {
    root: PathBuf,
    cap: u64,
    instance: u64,
    used: AtomicU64,
    peak: AtomicU64,
    seq: AtomicU64,
}

impl ScratchInner {
    fn charge(&self, bytes: u64) -> Result<(), Error> {
        let used = self.used.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if used > self.cap {
            SCRATCH_FULL.click();
            self.used.fetch_sub(bytes, Ordering::Relaxed);
            return Err(Error::ScratchFull {
                core: ErrorCore::default(),
                cap: self.cap,
                requested: used,
            });
        }
        self.peak.fetch_max(used, Ordering::Relaxed);
        Ok(())
    }

    fn discharge(&self, bytes: u64) {
        self.used.fetch_sub(bytes, Ordering::Relaxed);
    }
}

//////////////////////////////////////////// ScratchDir ////////////////////////////////////////////

/// A scratch directory with a byte cap.  Files allocated from it carry process-unique names
/// and unlink themselves on drop; exceeding the cap fails the write that crossed it.
#[derive(Clone)]
pub struct ScratchDir {
    inner: Arc<ScratchInner>,
}

impl ScratchDir {
    pub fn new<P: AsRef<Path>>(root: P, cap: u64) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            std::fs::create_dir_all(&root)?;
        }
        Ok(Self {
            inner: Arc::new(ScratchInner {
                root,
                cap,
                instance: SCRATCH_INSTANCE.fetch_add(1, Ordering::Relaxed),
                used: AtomicU64::new(0),
                peak: AtomicU64::new(0),
                seq: AtomicU64::new(0),
            }),
        })
    }

    /// Allocate a new scratch file.  The file is created empty and removed when the returned
    /// handle drops.
    pub fn alloc(&self, hint: &str) -> Result<ScratchFile, Error> {
        SCRATCH_ALLOC.click();
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "silt.{}.{}.{}.{}",
            std::process::id(),
            self.inner.instance,
            seq,
            hint
        );
        let path = self.inner.root.join(name);
        std::fs::File::create(&path)
            .map_err(|e| Error::from(e).with_info("path", path.display().to_string()))?;
        Ok(ScratchFile {
            inner: Arc::clone(&self.inner),
            path,
            size: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Bytes of scratch currently charged.
    pub fn used(&self) -> u64 {
        self.inner.used.load(Ordering::Relaxed)
    }

    /// High-water mark of scratch usage.
    pub fn peak(&self) -> u64 {
        self.inner.peak.load(Ordering::Relaxed)
    }
}

/////////////////////////////////////////// ScratchFile ///////////////////////////////////////////

/// One file inside a [ScratchDir].  Writers charge growth against the directory cap through
/// [ScratchFile::grow]; dropping the handle unlinks the file and releases its charge.
pub struct ScratchFile {
    inner: Arc<ScratchInner>,
    path: PathBuf,
    size: Arc<AtomicU64>,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    pub fn grow(&self, bytes: u64) -> Result<(), Error> {
        self.inner.charge(bytes)?;
        self.size.fetch_add(bytes, Ordering::Relaxed);
        Ok(())
    }

    /// A cap-accounting handle a writer thread can own.
    pub fn budget(&self) -> ScratchBudget {
        ScratchBudget {
            inner: Arc::clone(&self.inner),
            size: Arc::clone(&self.size),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        SCRATCH_RECLAIM.click();
        self.inner.discharge(self.size.load(Ordering::Relaxed));
        let _ = std::fs::remove_file(&self.path);
    }
}

////////////////////////////////////////// ScratchBudget //////////////////////////////////////////

/// Clonable cap-accounting handle for one scratch file.
#[derive(Clone)]
pub struct ScratchBudget {
    inner: Arc<ScratchInner>,
    size: Arc<AtomicU64>,
}

impl ScratchBudget {
    pub fn grow(&self, bytes: u64) -> Result<(), Error> {
        self.inner.charge(bytes)?;
        self.size.fetch_add(bytes, Ordering::Relaxed);
        Ok(())
    }
}

//////////////////////////////////////////// KeyOrder /////////////////////////////////////////////

/// A total order a sorter or heap sorts by.  "Sort by first key" and "sort by (first, second)
/// keys" are distinct implementations, not different calls on one comparator.
pub trait KeyOrder<T>: Default {
    fn lt(lhs: &T, rhs: &T) -> bool;

    fn cmp(lhs: &T, rhs: &T) -> std::cmp::Ordering {
        if Self::lt(lhs, rhs) {
            std::cmp::Ordering::Less
        } else if Self::lt(rhs, lhs) {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str, cap: u64) -> ScratchDir {
        let root = std::env::temp_dir().join(format!("silt_test_{}_{}", std::process::id(), name));
        ScratchDir::new(root, cap).expect("scratch dir should create")
    }

    #[test]
    fn scratch_files_unlink_on_drop() {
        let dir = scratch("unlink", 1 << 20);
        let path = {
            let file = dir.alloc("probe").expect("alloc should succeed");
            file.grow(128).expect("grow should succeed");
            assert_eq!(128, dir.used());
            file.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(0, dir.used());
        assert_eq!(128, dir.peak());
    }

    #[test]
    fn scratch_cap_is_enforced() {
        let dir = scratch("cap", 256);
        let file = dir.alloc("probe").expect("alloc should succeed");
        file.grow(200).expect("grow should succeed");
        let err = file.grow(100).unwrap_err();
        assert!(matches!(err, Error::ScratchFull { .. }));
        assert_eq!(200, dir.used());
    }
}
