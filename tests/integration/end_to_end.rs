//! Integration tests wiring the pipeline worker to the file sink.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use logpipe::sink::SinkSnapshot;
use logpipe::{Config, FileSink, OutputPath, PipelineWorker, SinkWorker, TailOptions};
use serde_json::{Value, json};

const PATTERN: &str = r"^(?P<ip>\S+) (?P<method>\S+) (?P<uri>\S+) (?P<status>\d+)$";

fn config(output: &Path) -> Config {
    Config {
        pattern: PATTERN.to_string(),
        tail: TailOptions {
            from_beginning: true,
            reopen: false,
            poll_interval: Duration::from_millis(10),
        },
        output: OutputPath::new(output),
        queue_capacity: 8,
        ..Config::default()
    }
}

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

fn wait_for_written(stats: impl Fn() -> SinkSnapshot, count: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while stats().events_written < count {
        assert!(Instant::now() < deadline, "timed out waiting for {count} events");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn read_events(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn lines_become_ordered_json_events() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("access.log");
    let output = dir.path().join("events.jsonl");
    fs::write(
        &input,
        "10.0.0.1 GET /search?q=5&lang=en 200\n\
         not an access line\n\
         10.0.0.2 POST /login 302\n",
    )
    .unwrap();

    let config = config(&output);
    let (tx, rx) = flume::bounded(config.queue_capacity);
    let worker = PipelineWorker::new(&input, &config, tx);
    let pipeline = worker.handle();
    let running = worker.spawn().unwrap();
    let sink = SinkWorker::new(FileSink::new(config.output.clone()), rx)
        .start()
        .unwrap();

    wait_for_written(|| sink.stats(), 2);
    append(&input, "10.0.0.3 GET /health?verbose=true 204\n");
    wait_for_written(|| sink.stats(), 3);

    pipeline.stop();
    running.join().unwrap().unwrap();
    let written = sink.join();
    assert_eq!(written.events_written, 3);
    assert_eq!(written.events_failed, 0);

    let stats = pipeline.stats();
    assert_eq!(stats.lines_read, 4);
    assert_eq!(stats.events_published, 3);
    assert_eq!(stats.lines_unmatched, 1);

    let events = read_events(&output);
    assert_eq!(
        events,
        [
            json!({"ip": "10.0.0.1", "method": "GET", "uri": "/search?q=5&lang=en",
                   "q": 5, "lang": "en", "status": 200}),
            json!({"ip": "10.0.0.2", "method": "POST", "uri": "/login", "status": 302}),
            json!({"ip": "10.0.0.3", "method": "GET", "uri": "/health?verbose=true",
                   "verbose": true, "status": 204}),
        ]
    );

    // Field order follows the pattern, with query fields right after `uri`.
    let first = fs::read_to_string(&output).unwrap();
    let first = first.lines().next().unwrap();
    let keys: Vec<usize> = ["\"ip\"", "\"method\"", "\"uri\"", "\"q\"", "\"lang\"", "\"status\""]
        .iter()
        .map(|key| first.find(key).unwrap())
        .collect();
    assert!(keys.windows(2).all(|pair| pair[0] < pair[1]), "{first}");
}

#[test]
fn output_path_switch_applies_to_next_event() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("access.log");
    let first = dir.path().join("first.jsonl");
    let second = dir.path().join("second.jsonl");
    fs::write(&input, "10.0.0.1 GET / 200\n").unwrap();

    let config = config(&first);
    let (tx, rx) = flume::bounded(config.queue_capacity);
    let worker = PipelineWorker::new(&input, &config, tx);
    let pipeline = worker.handle();
    let running = worker.spawn().unwrap();
    let sink = SinkWorker::new(FileSink::new(config.output.clone()), rx)
        .start()
        .unwrap();

    wait_for_written(|| sink.stats(), 1);
    config.output.set(&second);
    append(&input, "10.0.0.2 GET / 500\n");
    wait_for_written(|| sink.stats(), 2);

    pipeline.stop();
    running.join().unwrap().unwrap();
    sink.join();

    assert_eq!(read_events(&first)[0]["status"], 200);
    let moved = read_events(&second);
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0]["ip"], "10.0.0.2");
}

#[test]
fn ignored_keys_and_custom_time_format() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("app.log");
    let output = dir.path().join("events.jsonl");
    fs::write(&input, "05.03.2024 10:15 /job?token=abc&id=7 ok\n").unwrap();

    let mut config = config(&output);
    config.pattern = r"^(?P<when>\S+ \S+) (?P<uri>\S+) (?P<result>\S+)$".to_string();
    config.keys_to_ignore = ["token", "uri"].into_iter().map(String::from).collect();
    config.time_patterns = vec!["%d.%m.%Y %H:%M".to_string()];

    let (tx, rx) = flume::bounded(config.queue_capacity);
    let worker = PipelineWorker::new(&input, &config, tx);
    let pipeline = worker.handle();
    let running = worker.spawn().unwrap();
    let sink = SinkWorker::new(FileSink::new(config.output.clone()), rx)
        .start()
        .unwrap();

    wait_for_written(|| sink.stats(), 1);
    pipeline.stop();
    running.join().unwrap().unwrap();
    sink.join();

    let events = read_events(&output);
    let event = events[0].as_object().unwrap();
    let keys: Vec<&str> = event.keys().map(String::as_str).collect();
    assert!(!keys.contains(&"uri"));
    assert!(!keys.contains(&"token"));
    assert_eq!(event["id"], 7);
    assert_eq!(event["result"], "ok");
    let when = event["when"].as_str().unwrap();
    assert!(when.starts_with("2024-03-05T10:15:00"), "{when}");
}

#[test]
fn stopping_sink_leaves_pipeline_running() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("access.log");
    let output = dir.path().join("events.jsonl");
    fs::write(&input, "10.0.0.1 GET / 200\n").unwrap();

    let config = config(&output);
    let (tx, rx) = flume::bounded(config.queue_capacity);
    let worker = PipelineWorker::new(&input, &config, tx);
    let pipeline = worker.handle();
    let running = worker.spawn().unwrap();
    let sink = SinkWorker::new(FileSink::new(config.output.clone()), rx)
        .start()
        .unwrap();

    wait_for_written(|| sink.stats(), 1);
    sink.stop();

    append(&input, "10.0.0.2 GET / 200\n10.0.0.3 GET / 200\n");
    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.stats().lines_read < 3 {
        assert!(Instant::now() < deadline, "pipeline stopped reading");
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(!running.is_finished());

    pipeline.stop();
    running.join().unwrap().unwrap();
    let stats = pipeline.stats();
    assert_eq!(stats.events_published, 1);
    assert_eq!(stats.lines_dropped, 2);
    assert_eq!(read_events(&output).len(), 1);
}

#[test]
fn stopping_pipeline_leaves_sink_running() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("access.log");
    let output = dir.path().join("events.jsonl");
    fs::write(&input, "10.0.0.1 GET / 200\n").unwrap();

    let config = config(&output);
    let (tx, rx) = flume::bounded(config.queue_capacity);
    let other_producer = tx.clone();
    let worker = PipelineWorker::new(&input, &config, tx);
    let pipeline = worker.handle();
    let running = worker.spawn().unwrap();
    let sink = SinkWorker::new(FileSink::new(config.output.clone()), rx)
        .start()
        .unwrap();

    wait_for_written(|| sink.stats(), 1);
    pipeline.stop();
    running.join().unwrap().unwrap();

    let mut late = logpipe::Event::new();
    late.insert("late", logpipe::Value::Boolean(true));
    other_producer.send(late).unwrap();
    wait_for_written(|| sink.stats(), 2);

    drop(other_producer);
    let written = sink.join();
    assert_eq!(written.events_written, 2);
    assert_eq!(read_events(&output)[1], json!({"late": true}));
}
