//! Sequential record streams backed by helper threads.
//!
//! Each open stream owns one background thread and a bounded ring of byte buffers.  The
//! thread fills (or drains) buffers while the pipeline consumes (or produces) them; dropping
//! the stream closes both queues, which the helper observes as a sticky stop.  Buffers are
//! sized to whole multiples of the record width so records never straddle a buffer.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};

use biometrics::{Collector, Counter, Sensor};

use sync42::background::BackgroundThread;

use zerror::Z;
use zerror_core::ErrorCore;

use super::{empty_stream, Error, Record, ScratchBudget, ScratchDir, ScratchFile};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static BYTES_READ: Counter = Counter::new("silt.stream.bytes_read");
static BYTES_WRITTEN: Counter = Counter::new("silt.stream.bytes_written");
static STREAMS_OPENED: Counter = Counter::new("silt.stream.opened");

pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&BYTES_READ);
    collector.register_counter(&BYTES_WRITTEN);
    collector.register_counter(&STREAMS_OPENED);
}

/// Total bytes read through silt streams since process start.
pub fn total_bytes_read() -> u64 {
    BYTES_READ.read()
}

/// Total bytes written through silt streams since process start.
pub fn total_bytes_written() -> u64 {
    BYTES_WRITTEN.read()
}

/////////////////////////////////////////// StreamOptions //////////////////////////////////////////

/// Ring geometry for one stream.
#[derive(Clone, Copy, Debug)]
pub struct StreamOptions {
    /// Number of buffers in the ring.
    pub buffers: usize,
    /// Bytes per buffer, before record-width alignment.
    pub buffer_size: usize,
}

impl StreamOptions {
    /// A small ring for side streams that should not monopolize the budget.
    pub fn small() -> Self {
        Self {
            buffers: 2,
            buffer_size: 1 << 16,
        }
    }

    fn chunk(&self, width: usize) -> usize {
        let size = std::cmp::max(self.buffer_size, width);
        std::cmp::max(width, (size / width) * width)
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            buffers: 4,
            buffer_size: 8 << 20,
        }
    }
}

////////////////////////////////////////// reader plumbing /////////////////////////////////////////

struct ReaderRing {
    full: Receiver<Result<Vec<u8>, Error>>,
    recycle: SyncSender<Vec<u8>>,
    // Dropped after the channels so the helper sees the hangup before the join.
    _thread: BackgroundThread,
}

fn spawn_reader(
    file: File,
    start: u64,
    len: u64,
    chunk: usize,
    buffers: usize,
    reverse: bool,
) -> ReaderRing {
    STREAMS_OPENED.click();
    let (full_tx, full_rx) = sync_channel::<Result<Vec<u8>, Error>>(buffers);
    let (recycle_tx, recycle_rx) = sync_channel::<Vec<u8>>(buffers);
    for _ in 0..buffers {
        // Pre-seed the ring; capacity is reused for the life of the stream.
        let _ = recycle_tx.send(Vec::with_capacity(chunk));
    }
    let thread = BackgroundThread::spawn(move |_done: Arc<AtomicBool>| {
        let result = if reverse {
            pump_reverse(&file, start, len, chunk, &full_tx, &recycle_rx)
        } else {
            pump_forward(&file, start, len, chunk, &full_tx, &recycle_rx)
        };
        if let Err(err) = result {
            let _ = full_tx.send(Err(err));
        }
    });
    ReaderRing {
        full: full_rx,
        recycle: recycle_tx,
        _thread: thread,
    }
}

fn pump_forward(
    file: &File,
    start: u64,
    len: u64,
    chunk: usize,
    full: &SyncSender<Result<Vec<u8>, Error>>,
    recycle: &Receiver<Vec<u8>>,
) -> Result<(), Error> {
    let mut offset = start;
    let limit = start + len;
    while offset < limit {
        let mut buf = match recycle.recv() {
            Ok(buf) => buf,
            Err(_) => return Ok(()),
        };
        let want = std::cmp::min(chunk as u64, limit - offset) as usize;
        buf.resize(want, 0);
        file.read_exact_at(&mut buf[..want], offset)?;
        BYTES_READ.count(want as u64);
        offset += want as u64;
        if full.send(Ok(buf)).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

fn pump_reverse(
    file: &File,
    start: u64,
    len: u64,
    chunk: usize,
    full: &SyncSender<Result<Vec<u8>, Error>>,
    recycle: &Receiver<Vec<u8>>,
) -> Result<(), Error> {
    // Chunk grid is anchored at `start` so every buffer but the last is full-sized; the
    // ragged tail chunk is delivered first.
    let mut remaining = len;
    while remaining > 0 {
        let mut buf = match recycle.recv() {
            Ok(buf) => buf,
            Err(_) => return Ok(()),
        };
        let tail = remaining % chunk as u64;
        let want = if tail != 0 { tail } else { chunk as u64 };
        let offset = start + remaining - want;
        buf.resize(want as usize, 0);
        file.read_exact_at(&mut buf[..want as usize], offset)?;
        BYTES_READ.count(want);
        remaining -= want;
        if full.send(Ok(buf)).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

//////////////////////////////////////////// RecordReader //////////////////////////////////////////

/// A single-pass forward reader of fixed-width records.  Restart by reopening.
pub struct RecordReader<T: Record> {
    ring: ReaderRing,
    cur: Vec<u8>,
    off: usize,
    done: bool,
    remaining: u64,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Record> RecordReader<T> {
    pub fn open<P: AsRef<Path>>(path: P, opts: StreamOptions) -> Result<Self, Error> {
        let file = File::open(path.as_ref())
            .map_err(|e| Error::from(e).with_info("path", path.as_ref().display().to_string()))?;
        let len = file.metadata()?.len();
        Self::with_file(file, len, opts)
    }

    fn with_file(file: File, len: u64, opts: StreamOptions) -> Result<Self, Error> {
        if len % T::BYTES as u64 != 0 {
            return Err(Error::Corruption {
                core: ErrorCore::default(),
                context: format!("stream length {} not a multiple of record width {}", len, T::BYTES),
            });
        }
        let chunk = opts.chunk(T::BYTES);
        let ring = spawn_reader(file, 0, len, chunk, opts.buffers, false);
        Ok(Self {
            ring,
            cur: Vec::new(),
            off: 0,
            done: false,
            remaining: len / T::BYTES as u64,
            _marker: std::marker::PhantomData,
        })
    }

    /// Records left to read.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn read(&mut self) -> Result<Option<T>, Error> {
        if self.off >= self.cur.len() {
            if self.done || !self.refill()? {
                return Ok(None);
            }
        }
        let rec = T::load(&self.cur[self.off..self.off + T::BYTES]);
        self.off += T::BYTES;
        self.remaining -= 1;
        Ok(Some(rec))
    }

    /// Read, treating exhaustion as a fault.
    pub fn expect(&mut self, context: &str) -> Result<T, Error> {
        match self.read()? {
            Some(rec) => Ok(rec),
            None => Err(empty_stream(context)),
        }
    }

    fn refill(&mut self) -> Result<bool, Error> {
        match self.ring.full.recv() {
            Ok(Ok(buf)) => {
                let old = std::mem::replace(&mut self.cur, buf);
                let _ = self.ring.recycle.send(old);
                self.off = 0;
                Ok(true)
            }
            Ok(Err(err)) => {
                self.done = true;
                Err(err)
            }
            Err(_) => {
                self.done = true;
                Ok(false)
            }
        }
    }
}

/////////////////////////////////////// RecordReverseReader ///////////////////////////////////////

/// A single-pass reader yielding records in reverse file order.
pub struct RecordReverseReader<T: Record> {
    ring: ReaderRing,
    cur: Vec<u8>,
    off: usize,
    done: bool,
    remaining: u64,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Record> RecordReverseReader<T> {
    pub fn open<P: AsRef<Path>>(path: P, opts: StreamOptions) -> Result<Self, Error> {
        let file = File::open(path.as_ref())
            .map_err(|e| Error::from(e).with_info("path", path.as_ref().display().to_string()))?;
        let len = file.metadata()?.len();
        if len % T::BYTES as u64 != 0 {
            return Err(Error::Corruption {
                core: ErrorCore::default(),
                context: format!("stream length {} not a multiple of record width {}", len, T::BYTES),
            });
        }
        let chunk = opts.chunk(T::BYTES);
        let ring = spawn_reader(file, 0, len, chunk, opts.buffers, true);
        Ok(Self {
            ring,
            cur: Vec::new(),
            off: 0,
            done: false,
            remaining: len / T::BYTES as u64,
            _marker: std::marker::PhantomData,
        })
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn read(&mut self) -> Result<Option<T>, Error> {
        if self.off == 0 {
            if self.done || !self.refill()? {
                return Ok(None);
            }
        }
        self.off -= T::BYTES;
        self.remaining -= 1;
        Ok(Some(T::load(&self.cur[self.off..self.off + T::BYTES])))
    }

    pub fn expect(&mut self, context: &str) -> Result<T, Error> {
        match self.read()? {
            Some(rec) => Ok(rec),
            None => Err(empty_stream(context)),
        }
    }

    fn refill(&mut self) -> Result<bool, Error> {
        match self.ring.full.recv() {
            Ok(Ok(buf)) => {
                let old = std::mem::replace(&mut self.cur, buf);
                let _ = self.ring.recycle.send(old);
                self.off = self.cur.len();
                Ok(true)
            }
            Ok(Err(err)) => {
                self.done = true;
                Err(err)
            }
            Err(_) => {
                self.done = true;
                Ok(false)
            }
        }
    }
}

//////////////////////////////////////////// RecordWriter //////////////////////////////////////////

/// An append-only record writer whose flushes happen on a helper thread.  `finish` must be
/// called to observe write errors; dropping without finish abandons the tail.
pub struct RecordWriter<T: Record> {
    full: Option<SyncSender<Vec<u8>>>,
    recycle: Receiver<Vec<u8>>,
    cur: Vec<u8>,
    chunk: usize,
    count: u64,
    fault: Arc<Mutex<Option<Error>>>,
    thread: Option<BackgroundThread>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Record> RecordWriter<T> {
    /// Create a writer over an ordinary file path (truncates).
    pub fn create<P: AsRef<Path>>(path: P, opts: StreamOptions) -> Result<Self, Error> {
        let file = File::create(path.as_ref())
            .map_err(|e| Error::from(e).with_info("path", path.as_ref().display().to_string()))?;
        Ok(Self::with_file(file, None, opts))
    }

    /// Create a writer over a scratch file, charging growth against the scratch cap.
    pub fn create_scratch(scratch: &ScratchFile, opts: StreamOptions) -> Result<Self, Error> {
        let file = File::options()
            .write(true)
            .truncate(true)
            .open(scratch.path())
            .map_err(|e| Error::from(e).with_info("path", scratch.path().display().to_string()))?;
        Ok(Self::with_file(file, Some(scratch.budget()), opts))
    }

    fn with_file(file: File, budget: Option<ScratchBudget>, opts: StreamOptions) -> Self {
        STREAMS_OPENED.click();
        let chunk = opts.chunk(T::BYTES);
        let (full_tx, full_rx) = sync_channel::<Vec<u8>>(opts.buffers);
        let (recycle_tx, recycle_rx) = sync_channel::<Vec<u8>>(opts.buffers);
        for _ in 0..opts.buffers {
            let _ = recycle_tx.send(Vec::with_capacity(chunk));
        }
        let fault = Arc::new(Mutex::new(None));
        let fault_p = Arc::clone(&fault);
        let thread = BackgroundThread::spawn(move |_done: Arc<AtomicBool>| {
            let mut offset = 0u64;
            while let Ok(buf) = full_rx.recv() {
                if let Err(err) = drain_one(&file, &budget, offset, &buf) {
                    *fault_p.lock().unwrap() = Some(err);
                    return;
                }
                offset += buf.len() as u64;
                if recycle_tx.send(buf).is_err() {
                    return;
                }
            }
        });
        Self {
            full: Some(full_tx),
            recycle: recycle_rx,
            cur: Vec::with_capacity(chunk),
            chunk,
            count: 0,
            fault,
            thread: Some(thread),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn write(&mut self, rec: &T) -> Result<(), Error> {
        if self.cur.len() + T::BYTES > self.chunk {
            self.flush()?;
        }
        let off = self.cur.len();
        self.cur.resize(off + T::BYTES, 0);
        rec.store(&mut self.cur[off..off + T::BYTES]);
        self.count += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        if self.cur.is_empty() {
            return Ok(());
        }
        let next = self.recycle.recv().unwrap_or_default();
        let buf = std::mem::replace(&mut self.cur, next);
        self.cur.clear();
        let full = self.full.as_ref().expect("writer already finished");
        if full.send(buf).is_err() {
            return Err(self.take_fault());
        }
        Ok(())
    }

    /// Flush the tail, stop the helper, and surface any write fault.
    pub fn finish(mut self) -> Result<u64, Error> {
        self.flush()?;
        self.full.take();
        self.thread.take();
        if let Some(err) = self.fault.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self.count)
    }

    fn take_fault(&mut self) -> Error {
        self.fault.lock().unwrap().take().unwrap_or_else(|| {
            Error::SystemError {
                core: ErrorCore::default(),
                what: "writer helper exited early".to_string(),
            }
        })
    }
}

fn drain_one(
    file: &File,
    budget: &Option<ScratchBudget>,
    offset: u64,
    buf: &[u8],
) -> Result<(), Error> {
    if let Some(budget) = budget {
        budget.grow(buf.len() as u64)?;
    }
    file.write_all_at(buf, offset)?;
    BYTES_WRITTEN.count(buf.len() as u64);
    Ok(())
}

///////////////////////////////////////////// ScratchVec ///////////////////////////////////////////

/// A typed, scratch-backed vector: write once through [ScratchVecWriter], then open as many
/// forward or reverse readers as the pass needs.  The backing file disappears on drop.
pub struct ScratchVec<T: Record> {
    file: ScratchFile,
    count: u64,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Record> ScratchVec<T> {
    pub fn writer(
        scratch: &ScratchDir,
        hint: &str,
        opts: StreamOptions,
    ) -> Result<ScratchVecWriter<T>, Error> {
        let file = scratch.alloc(hint)?;
        let inner = RecordWriter::create_scratch(&file, opts)?;
        Ok(ScratchVecWriter { file, inner, opts })
    }

    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn reader(&self, opts: StreamOptions) -> Result<RecordReader<T>, Error> {
        RecordReader::open(self.file.path(), opts)
    }

    pub fn rev_reader(&self, opts: StreamOptions) -> Result<RecordReverseReader<T>, Error> {
        RecordReverseReader::open(self.file.path(), opts)
    }
}

pub struct ScratchVecWriter<T: Record> {
    file: ScratchFile,
    inner: RecordWriter<T>,
    #[allow(dead_code)]
    opts: StreamOptions,
}

impl<T: Record> ScratchVecWriter<T> {
    pub fn write(&mut self, rec: &T) -> Result<(), Error> {
        self.inner.write(rec)
    }

    pub fn count(&self) -> u64 {
        self.inner.count()
    }

    pub fn finish(self) -> Result<ScratchVec<T>, Error> {
        let count = self.inner.finish()?;
        Ok(ScratchVec {
            file: self.file,
            count,
            _marker: std::marker::PhantomData,
        })
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::super::ScratchDir;
    use super::*;

    fn scratch(name: &str) -> ScratchDir {
        let root = std::env::temp_dir().join(format!("silt_stream_{}_{}", std::process::id(), name));
        ScratchDir::new(root, 1 << 30).expect("scratch dir should create")
    }

    fn tiny() -> StreamOptions {
        StreamOptions {
            buffers: 2,
            buffer_size: 64,
        }
    }

    #[test]
    fn round_trip_forward_and_reverse() {
        let dir = scratch("round_trip");
        let mut writer: ScratchVecWriter<u64> =
            ScratchVec::writer(&dir, "vec", tiny()).expect("writer should open");
        for i in 0..1000u64 {
            writer.write(&(i * i)).expect("write should succeed");
        }
        let vec = writer.finish().expect("finish should succeed");
        assert_eq!(1000, vec.len());

        let mut reader = vec.reader(tiny()).expect("reader should open");
        for i in 0..1000u64 {
            assert_eq!(Some(i * i), reader.read().expect("read should succeed"));
        }
        assert_eq!(None, reader.read().expect("read should succeed"));

        let mut reader = vec.rev_reader(tiny()).expect("reverse reader should open");
        for i in (0..1000u64).rev() {
            assert_eq!(Some(i * i), reader.read().expect("read should succeed"));
        }
        assert_eq!(None, reader.read().expect("read should succeed"));
    }

    #[test]
    fn expect_faults_on_exhaustion() {
        let dir = scratch("expect");
        let writer: ScratchVecWriter<u64> =
            ScratchVec::writer(&dir, "vec", tiny()).expect("writer should open");
        let vec = writer.finish().expect("finish should succeed");
        let mut reader = vec.reader(tiny()).expect("reader should open");
        assert!(matches!(
            reader.expect("unit test"),
            Err(Error::EmptyStream { .. })
        ));
    }
}
