//! A bounded-memory priority queue.  Pushes land in a RAM arena kept as a binary heap; a full
//! arena is drained into a sorted scratch run; pops take the least record across the arena
//! and the run heads.  Min- versus max-behavior is entirely the [KeyOrder] parameter.

use biometrics::{Collector, Counter};

use zerror_core::ErrorCore;

use super::stream::{RecordReader, ScratchVec, ScratchVecWriter, StreamOptions};
use super::{Error, KeyOrder, Record, ScratchDir, MIN_ARENA_BYTES};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static HEAP_SPILL: Counter = Counter::new("silt.heap.spill");
static HEAP_CRC_FAILURE: Counter = Counter::new("silt.heap.crc_failure");

pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&HEAP_SPILL);
    collector.register_counter(&HEAP_CRC_FAILURE);
}

fn crc_record<T: Record>(crc: u32, rec: &T, tmp: &mut [u8]) -> u32 {
    rec.store(tmp);
    crc32c::crc32c_append(crc, tmp)
}

/////////////////////////////////////////////// ExtHeap ////////////////////////////////////////////

pub struct ExtHeap<T: Record, O: KeyOrder<T>> {
    scratch: ScratchDir,
    stream: StreamOptions,
    arena: Vec<T>,
    arena_cap: usize,
    spills: Vec<SpillCursor<T>>,
    len: u64,
    _order: O,
}

struct SpillCursor<T: Record> {
    reader: RecordReader<T>,
    _vec: ScratchVec<T>,
    head: Option<T>,
    crc_expect: u32,
    crc_acc: u32,
    tmp: Vec<u8>,
}

impl<T: Record> SpillCursor<T> {
    fn advance(&mut self) -> Result<(), Error> {
        self.head = self.reader.read()?;
        match &self.head {
            Some(rec) => {
                self.crc_acc = crc_record(self.crc_acc, rec, &mut self.tmp);
            }
            None => {
                if self.crc_acc != self.crc_expect {
                    HEAP_CRC_FAILURE.click();
                    return Err(Error::Corruption {
                        core: ErrorCore::default(),
                        context: format!(
                            "heap spill crc mismatch: stored {:#x}, read {:#x}",
                            self.crc_expect, self.crc_acc
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

impl<T: Record, O: KeyOrder<T>> ExtHeap<T, O> {
    pub fn new(scratch: &ScratchDir, arena_bytes: usize, stream: StreamOptions) -> Result<Self, Error> {
        if arena_bytes < MIN_ARENA_BYTES {
            return Err(Error::MemoryBudget {
                core: ErrorCore::default(),
                minimum: MIN_ARENA_BYTES,
                budget: arena_bytes,
            });
        }
        let arena_cap = std::cmp::max(2, arena_bytes / std::mem::size_of::<T>());
        Ok(Self {
            scratch: scratch.clone(),
            stream,
            arena: Vec::with_capacity(arena_cap),
            arena_cap,
            spills: Vec::new(),
            len: 0,
            _order: O::default(),
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, rec: T) -> Result<(), Error> {
        if self.arena.len() >= self.arena_cap {
            self.spill()?;
        }
        self.arena.push(rec);
        self.sift_up(self.arena.len() - 1);
        self.len += 1;
        Ok(())
    }

    /// The least record, without removing it.
    pub fn peek(&self) -> Option<&T> {
        let mut best: Option<&T> = self.arena.first();
        for spill in self.spills.iter() {
            if let Some(head) = &spill.head {
                if best.map(|b| O::lt(head, b)).unwrap_or(true) {
                    best = Some(head);
                }
            }
        }
        best
    }

    /// Remove and return the least record.
    pub fn pop(&mut self) -> Result<Option<T>, Error> {
        let mut source: Option<usize> = None; // None = arena
        let mut best: Option<T> = self.arena.first().copied();
        for (idx, spill) in self.spills.iter().enumerate() {
            if let Some(head) = spill.head {
                if best.map(|b| O::lt(&head, &b)).unwrap_or(true) {
                    best = Some(head);
                    source = Some(idx);
                }
            }
        }
        if best.is_none() {
            return Ok(None);
        }
        match source {
            None => {
                let last = self.arena.len() - 1;
                self.arena.swap(0, last);
                self.arena.pop();
                if !self.arena.is_empty() {
                    self.sift_down(0);
                }
            }
            Some(idx) => {
                self.spills[idx].advance()?;
                if self.spills[idx].head.is_none() {
                    self.spills.swap_remove(idx);
                }
            }
        }
        self.len -= 1;
        Ok(best)
    }

    fn spill(&mut self) -> Result<(), Error> {
        HEAP_SPILL.click();
        let mut drained = std::mem::take(&mut self.arena);
        drained.sort_by(O::cmp);
        let mut writer: ScratchVecWriter<T> = ScratchVec::writer(&self.scratch, "heap", self.stream)?;
        let mut crc = 0u32;
        let mut tmp = vec![0u8; T::BYTES];
        for rec in drained.iter() {
            crc = crc_record(crc, rec, &mut tmp);
            writer.write(rec)?;
        }
        let vec = writer.finish()?;
        let mut cursor = SpillCursor {
            reader: vec.reader(self.stream)?,
            _vec: vec,
            head: None,
            crc_expect: crc,
            crc_acc: 0,
            tmp,
        };
        cursor.advance()?;
        self.spills.push(cursor);
        self.arena = drained;
        self.arena.clear();
        Ok(())
    }

    // Standard array-heap index arithmetic; see the merging cursor for the layout.
    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if O::lt(&self.arena[index], &self.arena[parent]) {
                self.arena.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        loop {
            let child_lhs = index * 2 + 1;
            let child_rhs = index * 2 + 2;
            let child = if child_lhs >= self.arena.len() {
                break;
            } else if child_rhs >= self.arena.len()
                || O::lt(&self.arena[child_lhs], &self.arena[child_rhs])
            {
                child_lhs
            } else {
                child_rhs
            };
            if O::lt(&self.arena[child], &self.arena[index]) {
                self.arena.swap(index, child);
                index = child;
            } else {
                break;
            }
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
    struct Ascending;

    impl KeyOrder<(u64, u64)> for Ascending {
        fn lt(lhs: &(u64, u64), rhs: &(u64, u64)) -> bool {
            lhs < rhs
        }
    }

    fn scratch(name: &str) -> ScratchDir {
        let root = std::env::temp_dir().join(format!("silt_heap_{}_{}", std::process::id(), name));
        ScratchDir::new(root, 1 << 30).expect("scratch dir should create")
    }

    #[test]
    fn drains_in_order_across_spills() {
        let dir = scratch("drain");
        let stream = StreamOptions {
            buffers: 2,
            buffer_size: 4096,
        };
        let mut heap: ExtHeap<(u64, u64), Ascending> =
            ExtHeap::new(&dir, MIN_ARENA_BYTES, stream).expect("heap should create");
        let mut guac = Guacamole::new(42);
        let total = 150_000u64;
        for i in 0..total {
            let mut buf = [0u8; 8];
            guac.generate(&mut buf);
            heap.push((u64::from_le_bytes(buf), i)).expect("push should succeed");
        }
        let mut last: Option<(u64, u64)> = None;
        let mut seen = 0u64;
        while let Some(rec) = heap.pop().expect("pop should succeed") {
            if let Some(prev) = last {
                assert!(prev <= rec);
            }
            last = Some(rec);
            seen += 1;
        }
        assert_eq!(total, seen);
        assert!(heap.is_empty());
    }

    #[test]
    fn interleaved_push_pop() {
        let dir = scratch("interleave");
        let mut heap: ExtHeap<(u64, u64), Ascending> =
            ExtHeap::new(&dir, MIN_ARENA_BYTES, StreamOptions::small()).expect("heap should create");
        heap.push((5, 0)).expect("push should succeed");
        heap.push((1, 0)).expect("push should succeed");
        assert_eq!(Some(&(1, 0)), heap.peek());
        assert_eq!(Some((1, 0)), heap.pop().expect("pop should succeed"));
        heap.push((3, 0)).expect("push should succeed");
        assert_eq!(Some((3, 0)), heap.pop().expect("pop should succeed"));
        assert_eq!(Some((5, 0)), heap.pop().expect("pop should succeed"));
        assert_eq!(None, heap.pop().expect("pop should succeed"));
    }
}
