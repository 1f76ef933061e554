//! Engine loader tests
//!
//! Artifacts are small modules written in the wasm text format; wasmtime
//! compiles them the same way as binary modules.

use langdetect_core::{EngineState, Error, Result};
use langdetect_engine::{
    Artifact, ArtifactConfig, EngineCell, EngineLoader, InstantiationStrategy, LanguageDetector,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Links against the canonical runtime imports and needs its constructor.
const BOOTSTRAP_MODULE: &str = r#"
(module
  (import "env" "emscripten_date_now" (func $now (result f64)))
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (global $ready (mut i32) (i32.const 0))
  (data (i32.const 16) "en\00")
  (data (i32.const 32) "unknown\00")
  (data (i32.const 48) "fr\00")
  (func (export "_initialize")
    i32.const 1
    global.set $ready)
  (func (export "malloc") (param $size i32) (result i32)
    (local $ptr i32)
    global.get $heap
    local.set $ptr
    global.get $heap
    local.get $size
    i32.add
    global.set $heap
    local.get $ptr)
  (func (export "free") (param i32))
  (func (export "detectLanguage") (param $ptr i32) (param $len i32) (result i32)
    global.get $ready
    i32.eqz
    if
      unreachable
    end
    local.get $len
    i32.const 3
    i32.lt_u
    if (result i32)
      i32.const 32
    else
      local.get $ptr
      i32.load8_u
      i32.const 66
      i32.eq
      if (result i32)
        i32.const 48
      else
        i32.const 16
      end
    end)
)
"#;

/// Minified imports only: the bootstrap strategy cannot link it.
const MINIFIED_MODULE: &str = r#"
(module
  (import "a" "c" (func $clock (result f64)))
  (import "a" "zz" (func $unknown (param i32) (result i32)))
  (import "a" "memory" (memory 1))
  (global $heap (mut i32) (i32.const 1024))
  (data (i32.const 16) "de\00")
  (func (export "malloc") (param $size i32) (result i32)
    (local $ptr i32)
    global.get $heap
    local.set $ptr
    global.get $heap
    local.get $size
    i32.add
    global.set $heap
    local.get $ptr)
  (func (export "detectLanguage") (param $ptr i32) (result i32)
    i32.const 16)
)
"#;

/// Aborts from its constructor, which only the bootstrap strategy runs.
const ABORTING_CTOR_MODULE: &str = r#"
(module
  (import "env" "abort" (func $abort))
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (data (i32.const 16) "es\00")
  (func (export "__wasm_call_ctors")
    call $abort)
  (func (export "malloc") (param $size i32) (result i32)
    (local $ptr i32)
    global.get $heap
    local.set $ptr
    global.get $heap
    local.get $size
    i32.add
    global.set $heap
    local.get $ptr)
  (func (export "detectLanguage") (param $ptr i32) (param $len i32) (result i32)
    i32.const 16)
)
"#;

/// Never returns from detection.
const SPINNING_MODULE: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "malloc") (param $size i32) (result i32)
    i32.const 1024)
  (func (export "detectLanguage") (param $ptr i32) (param $len i32) (result i32)
    (loop $spin
      br $spin)
    i32.const 0)
)
"#;

/// Spins on text starting with 'S', answers "en" otherwise.
const SPIN_ON_S_MODULE: &str = r#"
(module
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (data (i32.const 16) "en\00")
  (func (export "malloc") (param $size i32) (result i32)
    (local $ptr i32)
    global.get $heap
    local.set $ptr
    global.get $heap
    local.get $size
    i32.add
    global.set $heap
    local.get $ptr)
  (func (export "detectLanguage") (param $ptr i32) (param $len i32) (result i32)
    local.get $ptr
    i32.load8_u
    i32.const 83
    i32.eq
    if
      (loop $spin
        br $spin)
    end
    i32.const 16)
)
"#;

/// Valid module without the detection export.
const NO_DETECT_MODULE: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "malloc") (param $size i32) (result i32)
    i32.const 1024)
)
"#;

fn write_artifact(dir: &TempDir, contents: &[u8]) -> PathBuf {
    let path = dir.path().join("cld3_wasm.wasm");
    std::fs::write(&path, contents).unwrap();
    path
}

fn small_config(path: PathBuf) -> ArtifactConfig {
    ArtifactConfig::from_path(path).with_memory_pages(1, 4)
}

/// Strategy double that records how often it was asked to instantiate
struct CountingStrategy {
    calls: Arc<AtomicU32>,
}

impl InstantiationStrategy for CountingStrategy {
    fn name(&self) -> &str {
        "counting"
    }

    fn instantiate(&self, _artifact: &Artifact) -> Result<Arc<dyn LanguageDetector>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(Error::loader("counting strategy never succeeds"))
    }
}

#[tokio::test]
async fn test_missing_artifact_skips_instantiation() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let loader = EngineLoader::with_strategies(
        small_config(dir.path().join("absent.wasm")),
        vec![Box::new(CountingStrategy {
            calls: calls.clone(),
        })],
    );

    let handle = loader.load().await;
    assert_eq!(handle.state(), EngineState::Unavailable);
    assert!(handle.detector().is_none());
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_every_strategy_tried_before_giving_up() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact(&dir, b"\0asm");
    let calls = Arc::new(AtomicU32::new(0));
    let loader = EngineLoader::with_strategies(
        small_config(path),
        vec![
            Box::new(CountingStrategy {
                calls: calls.clone(),
            }),
            Box::new(CountingStrategy {
                calls: calls.clone(),
            }),
        ],
    );

    let handle = loader.load().await;
    assert_eq!(handle.state(), EngineState::Unavailable);
    assert_eq!(calls.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn test_garbage_artifact_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact(&dir, b"this is not a wasm module");

    let handle = EngineLoader::new(small_config(path)).load().await;
    assert_eq!(handle.state(), EngineState::Unavailable);
}

#[tokio::test]
async fn test_missing_detect_export_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact(&dir, NO_DETECT_MODULE.as_bytes());

    let handle = EngineLoader::new(small_config(path)).load().await;
    assert_eq!(handle.state(), EngineState::Unavailable);
}

#[tokio::test]
async fn test_bootstrap_strategy_loads_and_detects() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact(&dir, BOOTSTRAP_MODULE.as_bytes());

    let handle = EngineLoader::new(small_config(path)).load().await;
    assert_eq!(handle.state(), EngineState::Loaded);

    let detector = handle.detector().unwrap();
    assert_eq!(detector.name(), "bootstrap");
    assert_eq!(detector.detect("Hello world").unwrap(), "en");
    assert_eq!(detector.detect("Bonjour").unwrap(), "fr");
    assert_eq!(detector.detect("ab").unwrap(), "unknown");
}

#[tokio::test]
async fn test_detection_is_repeatable() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact(&dir, BOOTSTRAP_MODULE.as_bytes());

    let handle = EngineLoader::new(small_config(path)).load().await;
    let detector = handle.detector().unwrap();
    let first = detector.detect("Hello").unwrap();
    let second = detector.detect("Hello").unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_direct_strategy_handles_minified_imports() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact(&dir, MINIFIED_MODULE.as_bytes());

    let handle = EngineLoader::new(small_config(path)).load().await;
    assert_eq!(handle.state(), EngineState::Loaded);

    let detector = handle.detector().unwrap();
    assert_eq!(detector.name(), "direct");
    assert_eq!(detector.detect("Guten Tag").unwrap(), "de");
}

#[tokio::test]
async fn test_failed_bootstrap_falls_back_to_direct() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact(&dir, ABORTING_CTOR_MODULE.as_bytes());

    let handle = EngineLoader::new(small_config(path)).load().await;
    assert_eq!(handle.state(), EngineState::Loaded);
    assert_eq!(handle.detector().unwrap().name(), "direct");
}

#[tokio::test]
async fn test_fuel_bounds_runaway_detection() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact(&dir, SPINNING_MODULE.as_bytes());

    let handle = EngineLoader::new(small_config(path).with_fuel(100_000))
        .load()
        .await;
    assert_eq!(handle.state(), EngineState::Loaded);

    let detector = handle.detector().unwrap();
    let err = detector.detect("Hello").unwrap_err();
    assert!(matches!(err, Error::Engine(_)));

    // a trapped call does not poison the detector
    assert!(detector.detect("Hello again").is_err());
}

#[tokio::test]
async fn test_deadline_bounds_runaway_detection() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact(&dir, SPINNING_MODULE.as_bytes());
    let config = small_config(path)
        .with_fuel(1 << 40)
        .with_call_timeout(Duration::from_millis(100));

    let handle = EngineLoader::new(config).load().await;
    let detector = handle.detector().unwrap();

    let started = Instant::now();
    let err = detector.detect("Hello").unwrap_err();
    assert!(matches!(err, Error::Timeout), "unexpected error: {:?}", err);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_runaway_call_does_not_block_other_calls() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact(&dir, SPIN_ON_S_MODULE.as_bytes());
    let config = small_config(path)
        .with_fuel(1 << 40)
        .with_call_timeout(Duration::from_secs(2));

    let handle = EngineLoader::new(config).load().await;
    let detector = handle.detector().unwrap().clone();

    let spinning_done = Arc::new(AtomicBool::new(false));
    let spinner = {
        let detector = detector.clone();
        let done = spinning_done.clone();
        std::thread::spawn(move || {
            let outcome = detector.detect("Spin forever");
            done.store(true, Ordering::SeqCst);
            outcome
        })
    };

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(detector.detect("Hello").unwrap(), "en");
    assert!(!spinning_done.load(Ordering::SeqCst));

    let spun = spinner.join().unwrap();
    assert!(matches!(spun, Err(Error::Timeout)));

    // the interrupted instance is replaced, not reused
    assert_eq!(detector.detect("Hello again").unwrap(), "en");
}

#[tokio::test]
async fn test_cell_holds_loader_result() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact(&dir, BOOTSTRAP_MODULE.as_bytes());

    let cell = EngineCell::new();
    assert_eq!(cell.state(), EngineState::Uninitialized);

    cell.initialize(EngineLoader::new(small_config(path)).load().await)
        .unwrap();
    assert_eq!(cell.state(), EngineState::Loaded);
    assert!(cell.detector().is_some());
}
