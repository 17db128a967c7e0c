use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;
use may::queue::mpsc::Queue;
use may::sync::Mutex;

#[derive(Debug)]
struct BatchWriter<W: Write> {
    writer: W,
    buf: BytesMut,
}

impl<W: Write> BatchWriter<W> {
    fn new(writer: W) -> Self {
        BatchWriter {
            writer,
            buf: BytesMut::with_capacity(1024 * 32),
        }
    }

    #[inline]
    fn put_data(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data)
    }

    #[inline]
    fn flush_all(&mut self) -> io::Result<()> {
        let ret = self.writer.write_all(&self.buf);
        self.buf.clear();
        ret
    }
}

/// a writer that can be shared by concurrent senders
///
/// each `write` is one complete raw frame (or frame group), frames from
/// different senders are never interleaved
#[derive(Debug)]
pub struct QueuedWriter<W: Write> {
    data_count: AtomicUsize,
    data_queue: Queue<Vec<u8>>,
    writer: Mutex<BatchWriter<W>>,
}

impl<W: Write> QueuedWriter<W> {
    /// wrap the writer
    pub fn new(writer: W) -> Self {
        QueuedWriter {
            data_count: AtomicUsize::new(0),
            data_queue: Queue::new(),
            writer: Mutex::new(BatchWriter::new(writer)),
        }
    }

    /// it's safe and efficient to call this API concurrently
    /// the error is only reported to the sender that performed the flush
    pub fn write(&self, data: Vec<u8>) -> io::Result<()> {
        self.data_queue.push(data);
        // only allow the first writer perform the write operation
        // other concurrent writers would just push the data
        if self.data_count.fetch_add(1, Ordering::AcqRel) != 0 {
            return Ok(());
        }

        // in any cases this should not block since we have only one writer
        let mut writer = self.writer.lock().unwrap();
        loop {
            let mut cnt = 0;
            while let Some(data) = self.data_queue.pop() {
                writer.put_data(&data);
                cnt += 1;
            }

            // detect if there are more packet need to deal with
            if self.data_count.fetch_sub(cnt, Ordering::AcqRel) == cnt {
                break;
            }
        }

        writer.flush_all().map_err(|e| {
            error!("QueuedWriter failed, err={}", e);
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn concurrent_writes_are_not_interleaved() {
        let writer = Arc::new(QueuedWriter::new(Vec::new()));
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let writer = writer.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        writer.write(vec![i; 16]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let data = writer.writer.lock().unwrap().writer.clone();
        assert_eq!(data.len(), 8 * 100 * 16);
        for chunk in data.chunks(16) {
            assert!(chunk.iter().all(|b| *b == chunk[0]));
        }
    }
}
