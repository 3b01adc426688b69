//! A bounded-memory external sorter.  Records accumulate in a RAM arena; full arenas are
//! stably sorted and spilled to scratch as crc32c-guarded runs; sealing returns a stream that
//! merges the runs with a small binary heap.  Sealing consumes the sorter, so pushing after
//! the sort is unrepresentable.

use biometrics::{Collector, Counter};

use zerror_core::ErrorCore;

use super::stream::{RecordReader, ScratchVec, ScratchVecWriter, StreamOptions};
use super::{Error, KeyOrder, Record, ScratchDir, MIN_ARENA_BYTES};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static SORTER_SPILL: Counter = Counter::new("silt.sorter.spill");
static SORTER_RAM_ONLY: Counter = Counter::new("silt.sorter.ram_only");
static SORTER_CRC_FAILURE: Counter = Counter::new("silt.sorter.crc_failure");

pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&SORTER_SPILL);
    collector.register_counter(&SORTER_RAM_ONLY);
    collector.register_counter(&SORTER_CRC_FAILURE);
}

/////////////////////////////////////////// SorterOptions //////////////////////////////////////////

#[derive(Clone, Copy, Debug)]
pub struct SorterOptions {
    /// RAM budget for the arena, in bytes.
    pub arena_bytes: usize,
    /// Ring geometry for spill readers and writers.
    pub stream: StreamOptions,
}

impl SorterOptions {
    pub fn with_budget(arena_bytes: usize) -> Self {
        Self {
            arena_bytes,
            stream: StreamOptions::default(),
        }
    }
}

impl Default for SorterOptions {
    fn default() -> Self {
        Self::with_budget(64 << 20)
    }
}

///////////////////////////////////////////// crc helper ///////////////////////////////////////////

fn crc_record<T: Record>(crc: u32, rec: &T, tmp: &mut [u8]) -> u32 {
    rec.store(tmp);
    crc32c::crc32c_append(crc, tmp)
}

////////////////////////////////////////////// Sorter //////////////////////////////////////////////

/// Push records, then [Sorter::seal] to stream them in `O` order.  The sort is stable: equal
/// records come back in push order, across spills.
pub struct Sorter<T: Record, O: KeyOrder<T>> {
    scratch: ScratchDir,
    opts: SorterOptions,
    arena: Vec<T>,
    arena_cap: usize,
    runs: Vec<Run<T>>,
    pushed: u64,
    _order: O,
}

struct Run<T: Record> {
    vec: ScratchVec<T>,
    crc: u32,
}

impl<T: Record, O: KeyOrder<T>> Sorter<T, O> {
    pub fn new(scratch: &ScratchDir, opts: SorterOptions) -> Result<Self, Error> {
        if opts.arena_bytes < MIN_ARENA_BYTES {
            return Err(Error::MemoryBudget {
                core: ErrorCore::default(),
                minimum: MIN_ARENA_BYTES,
                budget: opts.arena_bytes,
            });
        }
        let arena_cap = std::cmp::max(1, opts.arena_bytes / std::mem::size_of::<T>());
        Ok(Self {
            scratch: scratch.clone(),
            opts,
            arena: Vec::with_capacity(arena_cap),
            arena_cap,
            runs: Vec::new(),
            pushed: 0,
            _order: O::default(),
        })
    }

    pub fn len(&self) -> u64 {
        self.pushed
    }

    pub fn is_empty(&self) -> bool {
        self.pushed == 0
    }

    pub fn push(&mut self, rec: T) -> Result<(), Error> {
        self.arena.push(rec);
        self.pushed += 1;
        if self.arena.len() >= self.arena_cap {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<(), Error> {
        SORTER_SPILL.click();
        self.arena.sort_by(O::cmp);
        let mut writer: ScratchVecWriter<T> =
            ScratchVec::writer(&self.scratch, "run", self.opts.stream)?;
        let mut crc = 0u32;
        let mut tmp = vec![0u8; T::BYTES];
        for rec in self.arena.iter() {
            crc = crc_record(crc, rec, &mut tmp);
            writer.write(rec)?;
        }
        let vec = writer.finish()?;
        self.runs.push(Run { vec, crc });
        self.arena.clear();
        Ok(())
    }

    /// Sort whatever was pushed and return the merged stream.
    pub fn seal(mut self) -> Result<SortedStream<T, O>, Error> {
        if self.runs.is_empty() {
            SORTER_RAM_ONLY.click();
            self.arena.sort_by(O::cmp);
            return Ok(SortedStream {
                ram: self.arena,
                ram_off: 0,
                cursors: Vec::new(),
                len: self.pushed,
                _order: O::default(),
            });
        }
        if !self.arena.is_empty() {
            self.spill()?;
        }
        let mut cursors = Vec::with_capacity(self.runs.len());
        for (seq, run) in self.runs.drain(..).enumerate() {
            let mut cursor = RunCursor {
                reader: run.vec.reader(self.opts.stream)?,
                _vec: run.vec,
                head: None,
                crc_expect: run.crc,
                crc_acc: 0,
                seq,
                tmp: vec![0u8; T::BYTES],
            };
            cursor.advance()?;
            cursors.push(cursor);
        }
        let mut stream = SortedStream {
            ram: Vec::new(),
            ram_off: 0,
            cursors,
            len: self.pushed,
            _order: O::default(),
        };
        stream.heapify();
        Ok(stream)
    }
}

///////////////////////////////////////////// RunCursor ////////////////////////////////////////////

struct RunCursor<T: Record> {
    reader: RecordReader<T>,
    // Keeps the backing scratch file alive (and deleted once the stream drops).
    _vec: ScratchVec<T>,
    head: Option<T>,
    crc_expect: u32,
    crc_acc: u32,
    seq: usize,
    tmp: Vec<u8>,
}

impl<T: Record> RunCursor<T> {
    fn advance(&mut self) -> Result<(), Error> {
        self.head = self.reader.read()?;
        match &self.head {
            Some(rec) => {
                self.crc_acc = crc_record(self.crc_acc, rec, &mut self.tmp);
            }
            None => {
                if self.crc_acc != self.crc_expect {
                    SORTER_CRC_FAILURE.click();
                    return Err(Error::Corruption {
                        core: ErrorCore::default(),
                        context: format!(
                            "spill run {} crc mismatch: stored {:#x}, read {:#x}",
                            self.seq, self.crc_expect, self.crc_acc
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

//////////////////////////////////////////// SortedStream //////////////////////////////////////////

/// The output side of a sealed [Sorter].  `peek` exposes the least unread record; `next`
/// consumes it.
pub struct SortedStream<T: Record, O: KeyOrder<T>> {
    ram: Vec<T>,
    ram_off: usize,
    cursors: Vec<RunCursor<T>>,
    len: u64,
    _order: O,
}

impl<T: Record, O: KeyOrder<T>> SortedStream<T, O> {
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn peek(&self) -> Option<&T> {
        if !self.ram.is_empty() || self.cursors.is_empty() {
            self.ram.get(self.ram_off)
        } else {
            self.cursors[0].head.as_ref()
        }
    }

    pub fn next(&mut self) -> Result<Option<T>, Error> {
        if !self.ram.is_empty() || self.cursors.is_empty() {
            let rec = self.ram.get(self.ram_off).copied();
            if rec.is_some() {
                self.ram_off += 1;
            }
            return Ok(rec);
        }
        let rec = self.cursors[0].head;
        if rec.is_some() {
            self.cursors[0].advance()?;
            self.percolate_down(0);
        }
        Ok(rec)
    }

    /// Read, treating exhaustion as a fault.
    pub fn expect(&mut self, context: &str) -> Result<T, Error> {
        match self.next()? {
            Some(rec) => Ok(rec),
            None => Err(super::empty_stream(context)),
        }
    }

    // Heap of run cursors, least head at index 0.  Ties prefer the earlier run so the merge
    // preserves push order.
    fn is_less(&self, lhs: usize, rhs: usize) -> bool {
        let lhs = &self.cursors[lhs];
        let rhs = &self.cursors[rhs];
        match (&lhs.head, &rhs.head) {
            (Some(l), Some(r)) => {
                if O::lt(l, r) {
                    true
                } else if O::lt(r, l) {
                    false
                } else {
                    lhs.seq < rhs.seq
                }
            }
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn heapify(&mut self) {
        for i in (0..self.cursors.len()).rev() {
            self.percolate_down(i);
        }
    }

    fn percolate_down(&mut self, mut index: usize) {
        loop {
            let child_lhs = index * 2 + 1;
            let child_rhs = index * 2 + 2;
            let child = if child_lhs >= self.cursors.len() {
                break;
            } else if child_rhs >= self.cursors.len() || self.is_less(child_lhs, child_rhs) {
                child_lhs
            } else {
                child_rhs
            };
            if self.is_less(index, child) {
                break;
            }
            self.cursors.swap(index, child);
            index = child;
        }
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use guacamole::Guacamole;

    use super::super::ScratchDir;
    use super::*;

    #[derive(Default)]
    struct ByFirst;

    impl KeyOrder<(u64, u64)> for ByFirst {
        fn lt(lhs: &(u64, u64), rhs: &(u64, u64)) -> bool {
            lhs.0 < rhs.0
        }
    }

    fn scratch(name: &str) -> ScratchDir {
        let root = std::env::temp_dir().join(format!("silt_sorter_{}_{}", std::process::id(), name));
        ScratchDir::new(root, 1 << 30).expect("scratch dir should create")
    }

    fn opts() -> SorterOptions {
        SorterOptions {
            arena_bytes: MIN_ARENA_BYTES,
            stream: StreamOptions {
                buffers: 2,
                buffer_size: 4096,
            },
        }
    }

    fn u64_from(guac: &mut Guacamole) -> u64 {
        let mut buf = [0u8; 8];
        guac.generate(&mut buf);
        u64::from_le_bytes(buf)
    }

    #[test]
    fn ram_only_sort() {
        let dir = scratch("ram");
        let mut sorter: Sorter<(u64, u64), ByFirst> =
            Sorter::new(&dir, opts()).expect("sorter should create");
        for i in 0..100u64 {
            sorter.push((100 - i, i)).expect("push should succeed");
        }
        let mut stream = sorter.seal().expect("seal should succeed");
        for i in 0..100u64 {
            assert_eq!(Some((i + 1, 99 - i)), stream.next().expect("next should succeed"));
        }
        assert_eq!(None, stream.next().expect("next should succeed"));
    }

    #[test]
    fn spilled_sort_is_ordered_and_stable() {
        let dir = scratch("spill");
        let mut sorter: Sorter<(u64, u64), ByFirst> =
            Sorter::new(&dir, opts()).expect("sorter should create");
        let mut guac = Guacamole::new(0x5117);
        // Enough to force several spills at the minimum arena size.
        let total = 200_000u64;
        for i in 0..total {
            sorter.push((u64_from(&mut guac) % 1024, i)).expect("push should succeed");
        }
        let mut stream = sorter.seal().expect("seal should succeed");
        let mut seen = 0u64;
        let mut last: Option<(u64, u64)> = None;
        while let Some(rec) = stream.next().expect("next should succeed") {
            if let Some(prev) = last {
                assert!(prev.0 <= rec.0);
                if prev.0 == rec.0 {
                    // Stability: push order within a key.
                    assert!(prev.1 < rec.1);
                }
            }
            last = Some(rec);
            seen += 1;
        }
        assert_eq!(total, seen);
    }

    #[test]
    fn budget_below_minimum_is_refused() {
        let dir = scratch("budget");
        let err = Sorter::<(u64, u64), ByFirst>::new(&dir, SorterOptions::with_budget(1024));
        assert!(matches!(err, Err(Error::MemoryBudget { .. })));
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig {
            cases: 16,
            .. proptest::prelude::ProptestConfig::default()
        })]

        #[test]
        fn agrees_with_std_stable_sort(keys in proptest::collection::vec(0u64..64, 0..4096)) {
            let dir = scratch("prop");
            let mut sorter: Sorter<(u64, u64), ByFirst> =
                Sorter::new(&dir, opts()).expect("sorter should create");
            let mut expected: Vec<(u64, u64)> = Vec::with_capacity(keys.len());
            for (i, key) in keys.iter().enumerate() {
                sorter.push((*key, i as u64)).expect("push should succeed");
                expected.push((*key, i as u64));
            }
            expected.sort_by_key(|t| t.0);
            let mut stream = sorter.seal().expect("seal should succeed");
            let mut got = Vec::with_capacity(expected.len());
            while let Some(rec) = stream.next().expect("next should succeed") {
                got.push(rec);
            }
            proptest::prop_assert_eq!(expected, got);
        }
    }
}
