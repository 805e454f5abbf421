//! Task registry
//!
//! Code cannot travel between processes, so every unit of work names a task
//! registered in the worker binary. The registry maps those names to
//! functions and ships a set of built-in tasks every worker understands.

use serde::{Deserialize, Serialize};
use shared::{
    process_debug, process_error, process_info, process_warn, MethodResult, ProcessId, UnitOfWork, Version, VmId,
};
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type TaskFn = Arc<dyn Fn(&TaskContext, &UnitOfWork) -> MethodResult + Send + Sync>;

/// What a task can know about the VM it runs in
pub struct TaskContext {
    pub id: VmId,
    pub version: Version,
    pub generation: u64,
    pub pid: u32,
    locator_port: AtomicU16,
    locator_guard: Mutex<()>,
}

impl TaskContext {
    pub fn new(id: VmId, version: Version, generation: u64) -> Self {
        Self {
            id,
            version,
            generation,
            pid: std::process::id(),
            locator_port: AtomicU16::new(0),
            locator_guard: Mutex::new(()),
        }
    }

    /// Port of the fleet's bootstrap service, 0 if unknown
    pub fn locator_port(&self) -> u16 {
        self.locator_port.load(Ordering::SeqCst)
    }

    pub fn set_locator_port(&self, port: u16) {
        self.locator_port.store(port, Ordering::SeqCst);
    }

    /// Record a port reported by the master unless one is already known
    pub fn learn_locator_port(&self, port: u16) -> bool {
        port != 0
            && self
                .locator_port
                .compare_exchange(0, port, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }

    /// Start the bootstrap service in this VM and return its port
    ///
    /// Starting it twice returns the port of the running instance.
    pub fn start_locator(&self) -> std::io::Result<u16> {
        let _guard = self.locator_guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let running = self.locator_port();
        if running != 0 {
            return Ok(running);
        }

        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        let port = listener.local_addr()?.port();

        std::thread::Builder::new()
            .name("locator".to_string())
            .spawn(move || {
                // Discovery clients only need the port to accept; nothing is served
                for stream in listener.incoming() {
                    drop(stream);
                }
            })?;

        self.set_locator_port(port);
        Ok(port)
    }
}

/// Facts reported by the `vm_info` task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInfo {
    pub id: VmId,
    pub version: Version,
    pub pid: u32,
    pub generation: u64,
    pub locator_port: u16,
}

#[derive(Debug, Deserialize)]
struct SleepArgs {
    millis: u64,
}

#[derive(Debug, Default, Deserialize)]
struct MessageArgs {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogArgs {
    level: String,
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExitArgs {
    #[serde(default)]
    code: i32,
}

/// Name → task lookup
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, TaskFn>,
}

impl TaskRegistry {
    /// Registry without any task
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding the built-in tasks
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();

        registry.register("ping", |_, _| Ok("pong"));

        registry.register("echo", |_, unit| {
            unit.args::<serde_json::Value>().map_err(|e| e.to_string())
        });

        registry.register("vm_info", |ctx, _| {
            Ok(VmInfo {
                id: ctx.id,
                version: ctx.version.clone(),
                pid: ctx.pid,
                generation: ctx.generation,
                locator_port: ctx.locator_port(),
            })
        });

        registry.register("start_locator", |ctx, _| {
            ctx.start_locator()
                .map_err(|e| format!("could not open the bootstrap listener: {e}"))
        });

        registry.register("sleep", |_, unit| {
            let args: SleepArgs = unit.args().map_err(|e| e.to_string())?;
            std::thread::sleep(Duration::from_millis(args.millis));
            Ok(args.millis)
        });

        registry.register("fail", |_, unit| -> Result<(), String> {
            let args: Option<MessageArgs> = unit.args().map_err(|e| e.to_string())?;
            Err(args
                .and_then(|a| a.message)
                .unwrap_or_else(|| "task failed".to_string()))
        });

        registry.register("panic", |_, unit| -> Result<(), String> {
            let args: Option<MessageArgs> = unit.args().map_err(|e| e.to_string())?;
            let message = args
                .and_then(|a| a.message)
                .unwrap_or_else(|| "task panicked".to_string());
            panic!("{message}");
        });

        registry.register("log", |_, unit| {
            let args: LogArgs = unit.args().map_err(|e| e.to_string())?;
            match args.level.to_ascii_lowercase().as_str() {
                "error" => {
                    process_error!(ProcessId::current(), "{}", args.message);
                }
                "warn" => {
                    process_warn!(ProcessId::current(), "{}", args.message);
                }
                "info" => {
                    process_info!(ProcessId::current(), "{}", args.message);
                }
                "debug" => {
                    process_debug!(ProcessId::current(), "{}", args.message);
                }
                other => return Err(format!("unknown log level '{other}'")),
            }
            Ok(())
        });

        registry.register("exit", |ctx, unit| -> Result<(), String> {
            if ctx.id == VmId::Debug {
                return Err("exit is not available in the debug VM".to_string());
            }
            let args: Option<ExitArgs> = unit.args().map_err(|e| e.to_string())?;
            std::process::exit(args.unwrap_or_default().code);
        });

        registry
    }

    /// Register (or replace) a task
    ///
    /// The returned value is JSON-encoded into [`MethodResult::Value`]; an
    /// `Err` becomes a [`MethodResult::Failure`].
    pub fn register<F, T>(&mut self, name: impl Into<String>, task: F)
    where
        F: Fn(&TaskContext, &UnitOfWork) -> Result<T, String> + Send + Sync + 'static,
        T: Serialize,
    {
        let wrapped: TaskFn = Arc::new(move |ctx, unit| match task(ctx, unit) {
            Ok(value) => MethodResult::value(&value),
            Err(message) => MethodResult::failure(message),
        });
        self.tasks.insert(name.into(), wrapped);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run a task synchronously; unknown names yield a failure
    pub fn run(&self, ctx: &TaskContext, unit: &UnitOfWork) -> MethodResult {
        match self.tasks.get(&unit.task) {
            Some(task) => task(ctx, unit),
            None => MethodResult::failure(format!("unknown task '{}'", unit.task)),
        }
    }
}
