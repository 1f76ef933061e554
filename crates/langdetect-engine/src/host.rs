//! Host capability set offered to the sandboxed artifact
//!
//! The compiled classifier imports a fixed set of host functions. None of
//! them carry real work for language detection; they exist because the
//! toolchain that produced the module links against a C runtime. Each import
//! is mapped to a [`StubBehavior`] whose semantics are listed below, and the
//! few behaviors that need host data (clock, heap ceiling, allocator) go
//! through [`HostCapabilities`].
//!
//! | Behavior    | Result                                   |
//! |-------------|------------------------------------------|
//! | `Zero`      | `0` of the declared result type          |
//! | `One`       | `1`                                      |
//! | `NoOp`      | nothing, any result is `0`               |
//! | `Clock`     | `HostCapabilities::now_millis`           |
//! | `HeapLimit` | `HostCapabilities::heap_limit`           |
//! | `Allocate`  | `HostCapabilities::allocate(size)`       |
//! | `Release`   | `HostCapabilities::release(ptr)`         |
//! | `MemCopy`   | copies `n` bytes inside guest memory     |
//! | `Abort`     | traps the current call                   |

/// Largest heap the guest is told it may grow to (2 GiB)
pub const DEFAULT_HEAP_LIMIT: i64 = 2_147_483_648;

/// Host data the guest can observe
pub trait HostCapabilities: Send + Sync {
    /// Wall-clock time in milliseconds since the Unix epoch
    fn now_millis(&self) -> f64;

    /// Heap ceiling in bytes reported to the guest allocator
    fn heap_limit(&self) -> i64 {
        DEFAULT_HEAP_LIMIT
    }

    /// Host-side allocation request. `0` tells the guest the host has no
    /// allocator, so it falls back to its own.
    fn allocate(&self, _size: i64) -> i64 {
        0
    }

    /// Counterpart of [`HostCapabilities::allocate`]
    fn release(&self, _ptr: i64) {}
}

/// Capability set with the minimal semantics above
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalHost;

impl HostCapabilities for MinimalHost {
    fn now_millis(&self) -> f64 {
        chrono::Utc::now().timestamp_millis() as f64
    }
}

/// What a stubbed host function does when the guest calls it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubBehavior {
    Zero,
    One,
    NoOp,
    Clock,
    HeapLimit,
    Allocate,
    Release,
    MemCopy,
    Abort,
}

/// One entry of an import table
#[derive(Debug, Clone, Copy)]
pub struct HostImport {
    pub module: &'static str,
    pub name: &'static str,
    pub behavior: StubBehavior,
}

const fn import(module: &'static str, name: &'static str, behavior: StubBehavior) -> HostImport {
    HostImport {
        module,
        name,
        behavior,
    }
}

/// Canonical runtime imports, linked strictly by the bootstrap strategy
pub const BOOTSTRAP_IMPORTS: &[HostImport] = &[
    import("env", "emscripten_date_now", StubBehavior::Clock),
    import("env", "emscripten_get_now", StubBehavior::Clock),
    import("env", "_emscripten_get_now_is_monotonic", StubBehavior::One),
    import("env", "emscripten_get_heap_max", StubBehavior::HeapLimit),
    import("env", "emscripten_resize_heap", StubBehavior::Zero),
    import("env", "emscripten_notify_memory_growth", StubBehavior::NoOp),
    import("env", "emscripten_memcpy_big", StubBehavior::MemCopy),
    import("env", "_emscripten_memcpy_js", StubBehavior::MemCopy),
    import("env", "_tzset_js", StubBehavior::NoOp),
    import("env", "_localtime_js", StubBehavior::NoOp),
    import("env", "abort", StubBehavior::Abort),
    import("env", "_abort_js", StubBehavior::Abort),
    import("env", "__assert_fail", StubBehavior::Abort),
    import("env", "__cxa_throw", StubBehavior::Abort),
    import("env", "_emscripten_throw_longjmp", StubBehavior::Abort),
    import("env", "segfault", StubBehavior::Abort),
    import("env", "alignfault", StubBehavior::Abort),
    import("wasi_snapshot_preview1", "fd_write", StubBehavior::Zero),
    import("wasi_snapshot_preview1", "fd_read", StubBehavior::Zero),
    import("wasi_snapshot_preview1", "fd_close", StubBehavior::Zero),
    import("wasi_snapshot_preview1", "fd_seek", StubBehavior::Zero),
    import("wasi_snapshot_preview1", "environ_sizes_get", StubBehavior::Zero),
    import("wasi_snapshot_preview1", "environ_get", StubBehavior::Zero),
    import("wasi_snapshot_preview1", "clock_time_get", StubBehavior::Zero),
    import("wasi_snapshot_preview1", "proc_exit", StubBehavior::Abort),
];

/// Minified imports of the release build, used by the direct strategy.
/// Anything not listed here is stubbed with `Zero`.
pub const DIRECT_IMPORTS: &[HostImport] = &[
    import("a", "D", StubBehavior::Zero),
    import("a", "F", StubBehavior::Allocate),
    import("a", "G", StubBehavior::Release),
    import("a", "H", StubBehavior::NoOp),
    import("a", "I", StubBehavior::Allocate),
    import("a", "J", StubBehavior::Zero),
    import("a", "g", StubBehavior::NoOp),
    import("a", "l", StubBehavior::NoOp),
    import("a", "j", StubBehavior::NoOp),
    import("a", "f", StubBehavior::NoOp),
    import("a", "i", StubBehavior::NoOp),
    import("a", "b", StubBehavior::NoOp),
    import("a", "a", StubBehavior::NoOp),
    import("a", "k", StubBehavior::NoOp),
    import("a", "d", StubBehavior::NoOp),
    import("a", "s", StubBehavior::NoOp),
    import("a", "o", StubBehavior::NoOp),
    import("a", "v", StubBehavior::NoOp),
    import("a", "r", StubBehavior::Zero),
    import("a", "y", StubBehavior::Zero),
    import("a", "h", StubBehavior::NoOp),
    import("a", "m", StubBehavior::HeapLimit),
    import("a", "c", StubBehavior::Clock),
    import("a", "w", StubBehavior::Zero),
    import("a", "n", StubBehavior::One),
    import("a", "A", StubBehavior::Zero),
    import("a", "z", StubBehavior::Zero),
    import("a", "p", StubBehavior::Zero),
    import("a", "q", StubBehavior::Zero),
    import("a", "u", StubBehavior::NoOp),
    import("a", "e", StubBehavior::NoOp),
    import("a", "t", StubBehavior::NoOp),
    import("a", "x", StubBehavior::Zero),
];

/// Find the behavior for `module::name` in `table`
pub fn lookup(table: &[HostImport], module: &str, name: &str) -> Option<StubBehavior> {
    table
        .iter()
        .find(|entry| entry.module == module && entry.name == name)
        .map(|entry| entry.behavior)
}

/// Value produced by a stub before it is coerced to the declared type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostValue {
    Unit,
    Int(i64),
    Float(f64),
}

impl HostValue {
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Unit => 0,
            Self::Int(v) => *v,
            Self::Float(v) => *v as i64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Unit => 0.0,
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
        }
    }
}

impl StubBehavior {
    /// Evaluate behaviors that need no guest memory access
    ///
    /// `MemCopy` and `Abort` are handled by the runtime and yield `None`.
    pub fn evaluate(&self, host: &dyn HostCapabilities, first_arg: i64) -> Option<HostValue> {
        match self {
            Self::Zero => Some(HostValue::Int(0)),
            Self::One => Some(HostValue::Int(1)),
            Self::NoOp => Some(HostValue::Unit),
            Self::Clock => Some(HostValue::Float(host.now_millis())),
            Self::HeapLimit => Some(HostValue::Int(host.heap_limit())),
            Self::Allocate => Some(HostValue::Int(host.allocate(first_arg))),
            Self::Release => {
                host.release(first_arg);
                Some(HostValue::Unit)
            }
            Self::MemCopy | Self::Abort => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock;

    impl HostCapabilities for FixedClock {
        fn now_millis(&self) -> f64 {
            1_700_000_000_000.0
        }
    }

    #[test]
    fn test_lookup_direct_table() {
        assert_eq!(lookup(DIRECT_IMPORTS, "a", "c"), Some(StubBehavior::Clock));
        assert_eq!(lookup(DIRECT_IMPORTS, "a", "m"), Some(StubBehavior::HeapLimit));
        assert_eq!(lookup(DIRECT_IMPORTS, "a", "n"), Some(StubBehavior::One));
        assert_eq!(lookup(DIRECT_IMPORTS, "env", "c"), None);
    }

    #[test]
    fn test_lookup_bootstrap_table() {
        assert_eq!(
            lookup(BOOTSTRAP_IMPORTS, "env", "abort"),
            Some(StubBehavior::Abort)
        );
        assert_eq!(
            lookup(BOOTSTRAP_IMPORTS, "wasi_snapshot_preview1", "fd_write"),
            Some(StubBehavior::Zero)
        );
        assert_eq!(lookup(BOOTSTRAP_IMPORTS, "a", "c"), None);
    }

    #[test]
    fn test_direct_table_has_unique_names() {
        for (i, a) in DIRECT_IMPORTS.iter().enumerate() {
            for b in &DIRECT_IMPORTS[i + 1..] {
                assert!(a.name != b.name, "duplicate import {}", a.name);
            }
        }
    }

    #[test]
    fn test_evaluate_uses_capabilities() {
        let host = FixedClock;
        assert_eq!(
            StubBehavior::Clock.evaluate(&host, 0),
            Some(HostValue::Float(1_700_000_000_000.0))
        );
        assert_eq!(
            StubBehavior::HeapLimit.evaluate(&host, 0),
            Some(HostValue::Int(DEFAULT_HEAP_LIMIT))
        );
        assert_eq!(StubBehavior::Allocate.evaluate(&host, 64), Some(HostValue::Int(0)));
        assert_eq!(StubBehavior::Abort.evaluate(&host, 0), None);
    }

    #[test]
    fn test_host_value_conversions() {
        assert_eq!(HostValue::Unit.as_i64(), 0);
        assert_eq!(HostValue::Float(2.9).as_i64(), 2);
        assert_eq!(HostValue::Int(3).as_f64(), 3.0);
    }
}
