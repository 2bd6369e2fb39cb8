//! Demo driver: synthetic acquisition front end → processor → CSV sink.
//! Usage: scope-link [config.json]

use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use scope_link::{
    trigger_queue, BufferPool, CsvSink, Processor, ProcessorConfig, QueueProducer, Sample,
};
use tracing::{error, info, warn};

/// Samples between synthetic trigger marks.
const TRIGGER_PERIOD: usize = 1000;

fn main() -> ExitCode {
    let config = match std::env::args().nth(1) {
        Some(path) => match ProcessorConfig::load_from_file(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load {path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => ProcessorConfig::default(),
    };

    init_tracing(&config);

    info!(
        window_size = config.window_size,
        persistence_size = config.persistence_size,
        buffer_len = config.buffer_len,
        "scope-link starting"
    );

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "scope-link failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &ProcessorConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    if config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(config: &ProcessorConfig) -> Result<(), scope_link::ProcessorError> {
    let pool = Arc::new(BufferPool::new(config.buffer_len, config.pool_capacity));
    let (producer, consumer) = trigger_queue();
    let sink = Box::new(CsvSink::new(&config.sink_path));
    info!(
        pool_capacity = pool.capacity(),
        sink = %sink.path().display(),
        "pipeline assembled"
    );
    let processor = Processor::new(consumer, Arc::clone(&pool), sink, config)?;

    let acquiring = Arc::new(AtomicBool::new(true));
    let front_end = {
        let pool = Arc::clone(&pool);
        let acquiring = Arc::clone(&acquiring);
        std::thread::Builder::new()
            .name("front-end".into())
            .spawn(move || run_front_end(&pool, &producer, &acquiring))
            .map_err(scope_link::ProcessorError::Spawn)?
    };

    processor.start()?;
    processor.resume();

    let deadline = Instant::now() + Duration::from_secs(10);
    while !processor.is_window_full() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    if !processor.is_window_full() {
        warn!("window did not fill before deadline");
    }

    processor.stop()?;
    acquiring.store(false, Ordering::SeqCst);
    if front_end.join().is_err() {
        error!("front end thread panicked");
    }

    let stats = processor.stats();
    match serde_json::to_string(&stats) {
        Ok(json) => info!(stats = %json, "processor stats"),
        Err(e) => warn!(error = %e, "stats serialization failed"),
    }
    for (name, summary) in processor.metrics().summary() {
        info!(
            metric = %name,
            p50_us = summary.p50_us,
            p99_us = summary.p99_us,
            count = summary.count,
            "metric_summary"
        );
    }
    Ok(())
}

/// Fill buffers with a sawtooth and mark a trigger every `TRIGGER_PERIOD` samples.
fn run_front_end(pool: &BufferPool, producer: &QueueProducer, acquiring: &AtomicBool) {
    let mut sample_clock: usize = 0;
    while acquiring.load(Ordering::SeqCst) {
        let Some(mut handle) = pool.allocate() else {
            std::thread::sleep(Duration::from_micros(200));
            continue;
        };

        pool.with_buffer_mut(&mut handle, |buffer| {
            for (i, sample) in buffer.samples_mut().iter_mut().enumerate() {
                let t = sample_clock + i;
                *sample = ((t % 256) as i16 - 128) as Sample;
            }
            let first = (TRIGGER_PERIOD - sample_clock % TRIGGER_PERIOD) % TRIGGER_PERIOD;
            for index in (first..buffer.len()).step_by(TRIGGER_PERIOD) {
                buffer.mark_trigger(index);
            }
            sample_clock += buffer.len();
        });

        if let Err(handle) = producer.push(handle) {
            pool.reclaim(handle);
            break;
        }
    }
}
