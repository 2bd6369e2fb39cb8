//! End-to-end flow: front end pushes buffers, processor fills and flushes the window.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use scope_link::{
    trigger_queue, BufferPool, CsvSink, NullSink, Processor, ProcessorConfig, ProcessorState,
    QueueProducer, Sample, SinkError, WindowSink,
};

#[derive(Clone, Default)]
struct CaptureSink {
    windows: Arc<Mutex<Vec<(Vec<Sample>, usize, usize)>>>,
}

impl WindowSink for CaptureSink {
    fn write(&mut self, window: &[Sample], rows: usize, row_width: usize) -> Result<(), SinkError> {
        self.windows.lock().push((window.to_vec(), rows, row_width));
        Ok(())
    }
}

fn config(window_size: usize, persistence_size: usize, buffer_len: usize) -> ProcessorConfig {
    ProcessorConfig {
        window_size,
        persistence_size,
        buffer_len,
        pool_capacity: 8,
        backoff_us: 50,
        ..ProcessorConfig::default()
    }
}

fn push_ramp(pool: &BufferPool, tx: &QueueProducer, base: i8, trigger: Option<usize>) {
    let mut handle = pool.allocate().expect("pool exhausted");
    pool.with_buffer_mut(&mut handle, |buf| {
        for (i, s) in buf.samples_mut().iter_mut().enumerate() {
            *s = base.wrapping_add(i as i8);
        }
        if let Some(t) = trigger {
            buf.mark_trigger(t);
        }
    });
    tx.push(handle).expect("consumer dropped");
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn test_two_row_window_from_three_buffers() {
    let cfg = config(10, 2, 16);
    let pool = Arc::new(BufferPool::new(cfg.buffer_len, cfg.pool_capacity));
    let (tx, rx) = trigger_queue();
    let sink = CaptureSink::default();
    let processor = Processor::new(rx, Arc::clone(&pool), Box::new(sink.clone()), &cfg).unwrap();

    push_ramp(&pool, &tx, 0, Some(3));
    push_ramp(&pool, &tx, 20, None);
    push_ramp(&pool, &tx, 40, None);

    processor.start().unwrap();
    processor.resume();
    assert!(wait_until(|| processor.window_written_time().is_some()));

    // Third buffer stays queued while the full window waits for a resume.
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(processor.processed_count(), 2);
    assert_eq!(processor.untriggered_count(), 1);
    assert_eq!(pool.available(), cfg.pool_capacity - 1);

    let windows = sink.windows.lock().clone();
    assert_eq!(windows.len(), 1);
    let (window, rows, width) = &windows[0];
    assert_eq!((*rows, *width), (2, 10));
    let expected: Vec<Sample> = (3..13).chain(20..30).collect();
    assert_eq!(window, &expected);

    let filled = processor.window_filled_time().unwrap();
    let written = processor.window_written_time().unwrap();
    assert!(written >= filled);

    // Resume clears the window and lets the third buffer through.
    processor.resume();
    assert!(wait_until(|| processor.processed_count() == 3));
    assert!(wait_until(|| pool.available() == cfg.pool_capacity));
    assert!(!processor.is_window_full());

    processor.stop().unwrap();
    assert_eq!(processor.state(), ProcessorState::Stopped);
    assert_eq!(processor.processed_bytes(), 3 * 16);
}

#[test]
fn test_no_buffer_leaks_across_stop() {
    let cfg = config(8, 2, 16);
    let pool = Arc::new(BufferPool::new(cfg.buffer_len, cfg.pool_capacity));
    let (tx, rx) = trigger_queue();
    let processor = Processor::new(rx, Arc::clone(&pool), Box::new(NullSink), &cfg).unwrap();

    for i in 0..cfg.pool_capacity {
        push_ramp(&pool, &tx, i as i8, Some(i % 4));
    }
    processor.start().unwrap();
    processor.resume();
    assert!(wait_until(|| processor.is_window_full()));
    processor.stop().unwrap();

    // Popped buffers were reclaimed; the rest are still owned by the queue.
    let popped = processor.processed_count() as usize;
    assert_eq!(pool.available(), popped);
    assert_eq!(pool.reclaimed_total() as usize, popped);
    assert!(popped < cfg.pool_capacity);
}

#[test]
fn test_smaller_window_after_pause_is_zeroed() {
    let cfg = config(12, 2, 16);
    let pool = Arc::new(BufferPool::new(cfg.buffer_len, cfg.pool_capacity));
    let (tx, rx) = trigger_queue();
    let processor = Processor::new(rx, Arc::clone(&pool), Box::new(NullSink), &cfg).unwrap();

    push_ramp(&pool, &tx, 1, Some(0));
    processor.start().unwrap();
    processor.resume();
    assert!(wait_until(|| processor.stats().rows_filled == 1));

    processor.pause();
    processor.reconfigure(5, 3).unwrap();
    let stats = processor.stats();
    assert_eq!(stats.rows_filled, 0);
    assert_eq!((stats.window_size, stats.persistence_size), (5, 3));
    assert_eq!(processor.window_snapshot(), vec![0; 15]);
    processor.stop().unwrap();
}

#[test]
fn test_csv_sink_receives_full_window() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dump.csv");
    let cfg = ProcessorConfig {
        sink_path: path.clone(),
        ..config(4, 2, 8)
    };
    let pool = Arc::new(BufferPool::new(cfg.buffer_len, cfg.pool_capacity));
    let (tx, rx) = trigger_queue();
    let sink = Box::new(CsvSink::new(&cfg.sink_path));
    assert_eq!(sink.path(), path.as_path());
    let processor = Processor::new(rx, Arc::clone(&pool), sink, &cfg).unwrap();

    push_ramp(&pool, &tx, -2, Some(0));
    push_ramp(&pool, &tx, 10, Some(4));
    processor.resume();
    processor.start().unwrap();
    assert!(wait_until(|| processor.window_written_time().is_some()));
    processor.stop().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, "-2,-1,0,1\n14,15,16,17\n");
}
