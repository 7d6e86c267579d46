use serde_json::Value;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Condvar, Mutex,
    },
    time::Duration,
};

use crate::{
    strategies::{Strategy, StrategyError},
    world::SnapshotVersion,
    IgnoreMutexErr,
};

/// upper bound on how long a stalled strategy blocks its thread
const MAX_STALL: Duration = Duration::from_secs(10);

/// A latch strategy code can block on. Closed until [`Gate::open`] is called.
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn open(&self) {
        let (open, condvar) = &*self.inner;
        *open.lock().unwrap_ignore_poison() = true;
        condvar.notify_all();
    }

    /// Blocks the calling thread until the gate opens.
    pub fn wait(&self) {
        let (open, condvar) = &*self.inner;
        let guard = open.lock().unwrap_ignore_poison();
        let _ = condvar
            .wait_timeout_while(guard, MAX_STALL, |open| !*open)
            .unwrap_ignore_poison();
    }

    /// Opens the gate when dropped, so stalled threads end with the test.
    pub fn opener(&self) -> GateOpener {
        GateOpener(self.clone())
    }
}

pub struct GateOpener(Gate);

impl Drop for GateOpener {
    fn drop(&mut self) {
        self.0.open();
    }
}

#[derive(Clone)]
pub enum Script {
    /// answer with this raw command
    Reply(Value),
    /// return a strategy error
    Fault(String),
    /// panic with this message
    Panic(String),
    /// block for a while, then answer
    Sleep(Duration, Value),
    /// block until the gate opens, then answer
    Stall(Gate, Value),
}

/// A strategy doing what its [`Script`] says, counting its calls and keeping
/// the data it was given. Clones share the counters.
#[derive(Clone)]
pub struct Scripted {
    name: String,
    script: Script,
    version: SnapshotVersion,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Value>>>,
}

impl Scripted {
    pub fn new(name: impl Into<String>, script: Script) -> Self {
        Self {
            name: name.into(),
            script,
            version: SnapshotVersion::default(),
            calls: Default::default(),
            seen: Default::default(),
        }
    }

    pub fn with_version(mut self, version: SnapshotVersion) -> Self {
        self.version = version;
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn seen(&self) -> Arc<Mutex<Vec<Value>>> {
        self.seen.clone()
    }
}

impl Strategy for Scripted {
    fn team_name(&self) -> &str {
        &self.name
    }

    fn snapshot_version(&self) -> SnapshotVersion {
        self.version
    }

    fn update(&mut self, data: &Value) -> Result<Value, StrategyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap_ignore_poison().push(data.clone());
        match &self.script {
            Script::Reply(command) => Ok(command.clone()),
            Script::Fault(message) => Err(StrategyError::new(message.clone())),
            Script::Panic(message) => panic!("{}", message),
            Script::Sleep(delay, command) => {
                std::thread::sleep(*delay);
                Ok(command.clone())
            }
            Script::Stall(gate, command) => {
                gate.wait();
                Ok(command.clone())
            }
        }
    }
}
