//! wasmtime-backed detector
//!
//! Guest ABI expected from the artifact:
//! - a linear memory, exported as `memory` or imported from the host
//! - `malloc(size: i32) -> i32` and optionally `free(ptr: i32)`
//! - `detectLanguage(ptr: i32[, len: i32]) -> i32`, taking a NUL-terminated
//!   UTF-8 string and returning a pointer to a NUL-terminated label

use crate::artifact::{Artifact, RuntimeLimits};
use crate::detector::LanguageDetector;
use crate::host::{self, HostCapabilities, HostImport, HostValue, StubBehavior};
use langdetect_core::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::debug;
use wasmtime::{
    Caller, Engine, ExternType, Func, FuncType, Global, Instance, Linker, Memory, MemoryType,
    Module, Ref, Store, Table, Trap, TypedFunc, Val, ValType,
};

const ALLOC_EXPORTS: &[&str] = &["malloc", "_malloc"];
const FREE_EXPORTS: &[&str] = &["free", "_free"];
const DETECT_EXPORTS: &[&str] = &["detectLanguage", "_detectLanguage", "detect_language"];
const CONSTRUCTOR_EXPORTS: &[&str] = &["_initialize", "__wasm_call_ctors"];

/// Upper bound on a label read back from guest memory
const MAX_LABEL_BYTES: usize = 256;

/// Epoch period; call deadlines are rounded up to whole ticks
const EPOCH_TICK: Duration = Duration::from_millis(10);

/// Idle instances kept for reuse between calls
const MAX_IDLE_INSTANCES: usize = 8;

/// Store data visible to host functions
#[derive(Default)]
pub(crate) struct HostState {
    memory: Option<Memory>,
}

/// How imports are resolved during instantiation
#[derive(Debug, Clone, Copy)]
pub(crate) enum ImportPolicy {
    /// Every function import must appear in the table
    Strict(&'static [HostImport]),
    /// Unknown function imports are stubbed with `Zero`
    Permissive(&'static [HostImport]),
}

impl ImportPolicy {
    fn resolve(&self, module: &str, name: &str) -> Result<StubBehavior> {
        match self {
            Self::Strict(table) => host::lookup(table, module, name).ok_or_else(|| {
                Error::loader(format!("Unsupported host import {}::{}", module, name))
            }),
            Self::Permissive(table) => Ok(host::lookup(table, module, name).unwrap_or_else(|| {
                debug!("Stubbing unknown import {}::{} with zero", module, name);
                StubBehavior::Zero
            })),
        }
    }
}

/// Options shared by the instantiation strategies
#[derive(Debug, Clone, Copy)]
pub(crate) struct InstantiateOptions {
    pub label: &'static str,
    pub policy: ImportPolicy,
    pub run_constructors: bool,
}

/// Compile the artifact and build the first instance
///
/// Failing here is what makes a strategy fail; later instances come from
/// the same factory on demand.
pub(crate) fn instantiate(
    artifact: &Artifact,
    limits: RuntimeLimits,
    host: Arc<dyn HostCapabilities>,
    options: InstantiateOptions,
) -> Result<WasmDetector> {
    let (engine, module) = artifact.compile()?;
    let factory = InstanceFactory {
        engine,
        module,
        limits,
        host,
        options,
    };

    let first = factory.build()?;
    debug!(
        strategy = options.label,
        detect_arity = first.abi.detect_arity,
        "Guest ABI resolved"
    );

    let ticker = EpochTicker::start(factory.engine.clone())?;
    Ok(WasmDetector {
        name: options.label.to_string(),
        factory,
        idle: Mutex::new(vec![first]),
        _ticker: ticker,
    })
}

/// Everything needed to link a fresh instance of the compiled module
struct InstanceFactory {
    engine: Engine,
    module: Module,
    limits: RuntimeLimits,
    host: Arc<dyn HostCapabilities>,
    options: InstantiateOptions,
}

impl InstanceFactory {
    fn build(&self) -> Result<WasmInstance> {
        let deadline_ticks = deadline_ticks(self.limits.call_timeout);
        let mut store = Store::new(&self.engine, HostState::default());
        store.set_fuel(self.limits.fuel_per_call).map_err(loader_error)?;
        store.epoch_deadline_trap();
        store.set_epoch_deadline(deadline_ticks);

        let mut linker: Linker<HostState> = Linker::new(&self.engine);
        linker.allow_shadowing(true);

        for import in self.module.imports() {
            let (module_name, name) = (import.module(), import.name());
            match import.ty() {
                ExternType::Func(ty) => {
                    let behavior = self.options.policy.resolve(module_name, name)?;
                    define_stub(&mut linker, module_name, name, ty, behavior, self.host.clone())?;
                }
                ExternType::Memory(ty) => {
                    let memory = create_memory(&mut store, &ty, self.limits)?;
                    store.data_mut().memory = Some(memory);
                    linker
                        .define(&store, module_name, name, memory)
                        .map_err(loader_error)?;
                }
                ExternType::Global(ty) => {
                    let value = coerce(HostValue::Int(0), ty.content());
                    let global = Global::new(&mut store, ty, value).map_err(loader_error)?;
                    linker
                        .define(&store, module_name, name, global)
                        .map_err(loader_error)?;
                }
                ExternType::Table(ty) => {
                    let table =
                        Table::new(&mut store, ty, Ref::Func(None)).map_err(loader_error)?;
                    linker
                        .define(&store, module_name, name, table)
                        .map_err(loader_error)?;
                }
                _ => {
                    return Err(Error::loader(format!(
                        "Unsupported import kind for {}::{}",
                        module_name, name
                    )))
                }
            }
        }

        let instance = linker
            .instantiate(&mut store, &self.module)
            .map_err(loader_error)?;

        if self.options.run_constructors {
            run_constructors(&mut store, &instance)?;
        }

        let abi = GuestAbi::resolve(&mut store, &instance)?;
        Ok(WasmInstance {
            store,
            abi,
            fuel_per_call: self.limits.fuel_per_call,
            deadline_ticks,
        })
    }
}

/// Epoch ticks a call may run before it is interrupted, rounded up
fn deadline_ticks(timeout: Duration) -> u64 {
    let tick = EPOCH_TICK.as_millis().max(1);
    let ticks = timeout.as_millis().div_ceil(tick).clamp(1, u128::from(u32::MAX));
    ticks as u64
}

/// Advances the engine epoch so per-call deadlines fire
///
/// Stops when the detector owning it is dropped.
struct EpochTicker {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EpochTicker {
    fn start(engine: Engine) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = std::thread::Builder::new()
            .name("langdetect-epoch".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    std::thread::sleep(EPOCH_TICK);
                    engine.increment_epoch();
                }
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn define_stub(
    linker: &mut Linker<HostState>,
    module: &str,
    name: &str,
    ty: FuncType,
    behavior: StubBehavior,
    host: Arc<dyn HostCapabilities>,
) -> Result<()> {
    let result_types: Vec<ValType> = ty.results().collect();
    let qualified = format!("{}::{}", module, name);

    linker
        .func_new(
            module,
            name,
            ty,
            move |mut caller: Caller<'_, HostState>, params: &[Val], results: &mut [Val]| {
                let first = params.first().map(int_param).unwrap_or(0);
                let value = match behavior {
                    StubBehavior::Abort => {
                        return Err(wasmtime::Error::msg(format!(
                            "guest aborted via {}",
                            qualified
                        )))
                    }
                    StubBehavior::MemCopy => {
                        copy_within_guest(&mut caller, params)?;
                        HostValue::Int(first)
                    }
                    other => other
                        .evaluate(host.as_ref(), first)
                        .unwrap_or(HostValue::Unit),
                };
                for (slot, ty) in results.iter_mut().zip(&result_types) {
                    *slot = coerce(value, ty);
                }
                Ok(())
            },
        )
        .map_err(loader_error)?;

    Ok(())
}

/// `memcpy(dest, src, n)` inside guest memory
fn copy_within_guest(caller: &mut Caller<'_, HostState>, params: &[Val]) -> wasmtime::Result<()> {
    let arg = |i: usize| params.get(i).map(int_param).unwrap_or(0);
    let (dest, src, len) = (arg(0), arg(1), arg(2));
    if dest < 0 || src < 0 || len < 0 {
        return Err(wasmtime::Error::msg("negative memcpy argument"));
    }
    let (dest, src, len) = (dest as usize, src as usize, len as usize);

    let cached = caller.data().memory;
    let memory = match cached {
        Some(memory) => memory,
        None => caller
            .get_export("memory")
            .and_then(|export| export.into_memory())
            .ok_or_else(|| wasmtime::Error::msg("memcpy without guest memory"))?,
    };

    let data = memory.data_mut(&mut *caller);
    let in_bounds = src
        .checked_add(len)
        .zip(dest.checked_add(len))
        .is_some_and(|(src_end, dest_end)| src_end <= data.len() && dest_end <= data.len());
    if !in_bounds {
        return Err(wasmtime::Error::msg("memcpy out of bounds"));
    }
    data.copy_within(src..src + len, dest);
    Ok(())
}

fn create_memory(
    store: &mut Store<HostState>,
    ty: &MemoryType,
    limits: RuntimeLimits,
) -> Result<Memory> {
    if ty.is_64() || ty.is_shared() {
        return Err(Error::loader("64-bit or shared guest memory is not supported"));
    }

    let declared_min = u32::try_from(ty.minimum())
        .map_err(|_| Error::loader("guest memory minimum out of range"))?;
    let ceiling = match ty.maximum() {
        Some(max) => {
            u32::try_from(max).map_err(|_| Error::loader("guest memory maximum out of range"))?
        }
        None => limits.max_memory_pages.max(declared_min),
    };
    let initial = declared_min.max(limits.initial_memory_pages).min(ceiling);

    Memory::new(&mut *store, MemoryType::new(initial, Some(ceiling))).map_err(loader_error)
}

fn run_constructors(store: &mut Store<HostState>, instance: &Instance) -> Result<()> {
    for name in CONSTRUCTOR_EXPORTS {
        if let Ok(ctor) = instance.get_typed_func::<(), ()>(&mut *store, name) {
            ctor.call(&mut *store, ()).map_err(|e| {
                Error::loader(format!("Constructor {} failed: {}", name, e))
            })?;
            debug!("Ran guest constructor {}", name);
            return Ok(());
        }
    }
    Ok(())
}

fn int_param(value: &Val) -> i64 {
    value
        .i32()
        .map(i64::from)
        .or_else(|| value.i64())
        .unwrap_or(0)
}

/// Convert a stub result to the type the guest declared
fn coerce(value: HostValue, ty: &ValType) -> Val {
    match ty {
        ValType::I32 => Val::I32(value.as_i64() as i32),
        ValType::I64 => Val::I64(value.as_i64()),
        ValType::F32 => Val::F32((value.as_f64() as f32).to_bits()),
        ValType::F64 => Val::F64(value.as_f64().to_bits()),
        ValType::V128 => Val::V128(0u128.into()),
        _ => Val::null_func_ref(),
    }
}

fn loader_error(err: wasmtime::Error) -> Error {
    Error::loader(err.to_string())
}

fn engine_error(err: wasmtime::Error) -> Error {
    Error::engine(err.to_string())
}

/// Guest call failure; a passed epoch deadline is a timeout
fn call_error(err: wasmtime::Error) -> Error {
    match err.downcast_ref::<Trap>() {
        Some(Trap::Interrupt) => Error::Timeout,
        _ => engine_error(err),
    }
}

/// Exports the detector calls into
struct GuestAbi {
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    free: Option<TypedFunc<i32, ()>>,
    detect: Func,
    detect_arity: usize,
}

impl GuestAbi {
    fn resolve(store: &mut Store<HostState>, instance: &Instance) -> Result<Self> {
        let exported = instance.get_memory(&mut *store, "memory");
        let memory = exported
            .or(store.data().memory)
            .ok_or_else(|| Error::abi("artifact has no linear memory"))?;

        let alloc = ALLOC_EXPORTS
            .iter()
            .find_map(|name| instance.get_typed_func::<i32, i32>(&mut *store, name).ok())
            .ok_or_else(|| Error::abi("artifact exports no allocator"))?;

        let free = FREE_EXPORTS
            .iter()
            .find_map(|name| instance.get_typed_func::<i32, ()>(&mut *store, name).ok());

        let (detect, detect_arity) = DETECT_EXPORTS
            .iter()
            .find_map(|name| {
                let func = instance.get_func(&mut *store, name)?;
                let arity = detect_signature(&func.ty(&*store))?;
                Some((func, arity))
            })
            .ok_or_else(|| Error::abi("artifact exports no detectLanguage(i32[, i32]) -> i32"))?;

        Ok(Self {
            memory,
            alloc,
            free,
            detect,
            detect_arity,
        })
    }
}

/// Number of parameters if the signature matches the detect ABI
fn detect_signature(ty: &FuncType) -> Option<usize> {
    let params: Vec<ValType> = ty.params().collect();
    let results: Vec<ValType> = ty.results().collect();

    let params_ok = matches!(params.len(), 1 | 2) && params.iter().all(|p| matches!(p, ValType::I32));
    let results_ok = results.len() == 1 && matches!(results[0], ValType::I32);

    (params_ok && results_ok).then_some(params.len())
}

struct WasmInstance {
    store: Store<HostState>,
    abi: GuestAbi,
    fuel_per_call: u64,
    deadline_ticks: u64,
}

impl WasmInstance {
    fn call(&mut self, text: &str) -> Result<String> {
        self.store
            .set_fuel(self.fuel_per_call)
            .map_err(engine_error)?;
        self.store.set_epoch_deadline(self.deadline_ticks);

        let bytes = text.as_bytes();
        let size = i32::try_from(bytes.len() + 1)
            .map_err(|_| Error::engine("text too large for guest memory"))?;
        let len = size - 1;

        let ptr = self
            .abi
            .alloc
            .call(&mut self.store, size)
            .map_err(call_error)?;
        if ptr == 0 {
            return Err(Error::engine("guest allocation failed"));
        }

        let offset = ptr as u32 as usize;
        let write = self
            .abi
            .memory
            .write(&mut self.store, offset, bytes)
            .and_then(|_| self.abi.memory.write(&mut self.store, offset + bytes.len(), &[0]));
        if let Err(e) = write {
            return Err(Error::engine(format!("failed to write input: {}", e)));
        }

        let params = match self.abi.detect_arity {
            1 => vec![Val::I32(ptr)],
            _ => vec![Val::I32(ptr), Val::I32(len)],
        };
        let mut results = [Val::I32(0)];
        let outcome = self
            .abi
            .detect
            .call(&mut self.store, &params, &mut results);

        if let Some(free) = &self.abi.free {
            // a trapped call may leave nothing to free; the label is what matters
            let _ = free.call(&mut self.store, ptr);
        }
        outcome.map_err(call_error)?;

        let label_ptr = results[0]
            .i32()
            .ok_or_else(|| Error::engine("detectLanguage returned a non-i32 value"))?;
        self.read_label(label_ptr)
    }

    fn read_label(&self, ptr: i32) -> Result<String> {
        let data = self.abi.memory.data(&self.store);
        let start = ptr as u32 as usize;
        if ptr == 0 || start >= data.len() {
            return Err(Error::engine("detectLanguage returned an invalid pointer"));
        }

        let window = &data[start..data.len().min(start + MAX_LABEL_BYTES)];
        let end = window
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| Error::engine("label is not NUL-terminated"))?;

        std::str::from_utf8(&window[..end])
            .map(str::to_string)
            .map_err(|e| Error::engine(format!("label is not valid UTF-8: {}", e)))
    }
}

/// Detector backed by a pool of wasm instances
///
/// A store is not reentrant, so each call checks out an instance of its
/// own; concurrent calls never wait on each other. Every call runs under
/// the fuel budget and the epoch deadline. An instance whose call failed
/// may hold a half-updated guest heap and is dropped instead of returned.
pub struct WasmDetector {
    name: String,
    factory: InstanceFactory,
    idle: Mutex<Vec<WasmInstance>>,
    _ticker: EpochTicker,
}

impl WasmDetector {
    fn checkout(&self) -> Result<WasmInstance> {
        let idle = self.idle.lock().pop();
        match idle {
            Some(instance) => Ok(instance),
            None => {
                debug!(strategy = self.factory.options.label, "Building extra engine instance");
                self.factory.build()
            }
        }
    }

    fn checkin(&self, instance: WasmInstance) {
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_INSTANCES {
            idle.push(instance);
        }
    }
}

impl LanguageDetector for WasmDetector {
    fn detect(&self, text: &str) -> Result<String> {
        let mut instance = self.checkout()?;
        let label = instance.call(text)?;
        self.checkin(instance);
        Ok(label)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for WasmDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmDetector")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
