//! Scripted [`MediaEngine`] for exercising the host without a platform
//! player.
//!
//! Clones share one script, so a test keeps a clone to inspect calls and
//! fire engine events after handing the engine to the host.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::playback::{EngineEvent, EngineListener, MediaEngine, MediaItem};
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Default)]
struct EngineScript {
    calls: Vec<String>,
    listener: Option<Arc<dyn EngineListener>>,
    position_ms: u64,
    duration_ms: Option<u64>,
    position_reads: usize,
    fail_load: Option<(i32, String)>,
    hold_loads: bool,
}

#[derive(Clone, Default)]
pub struct ScriptedEngine {
    script: Arc<Mutex<EngineScript>>,
    load_gate: Arc<Notify>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine calls in order, excluding position reads.
    pub fn calls(&self) -> Vec<String> {
        self.script.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.script.lock().calls.clear();
    }

    /// Number of `position()` reads so far.
    pub fn position_reads(&self) -> usize {
        self.script.lock().position_reads
    }

    /// Make the next `load` fail with an engine error.
    pub fn fail_next_load(&self, code: i32, message: &str) {
        self.script.lock().fail_load = Some((code, message.to_string()));
    }

    pub fn set_position(&self, position_ms: u64) {
        self.script.lock().position_ms = position_ms;
    }

    /// Block every `load` until [`release_load`](Self::release_load).
    pub fn hold_loads(&self) {
        self.script.lock().hold_loads = true;
    }

    pub fn release_load(&self) {
        self.script.lock().hold_loads = false;
        self.load_gate.notify_one();
    }

    /// Deliver an engine event through the registered listener.
    pub fn fire(&self, event: EngineEvent) {
        let listener = self.script.lock().listener.clone();
        if let Some(listener) = listener {
            listener.on_engine_event(event);
        }
    }

    fn record(&self, call: &str) {
        self.script.lock().calls.push(call.to_string());
    }
}

#[async_trait]
impl MediaEngine for ScriptedEngine {
    fn set_listener(&mut self, listener: Arc<dyn EngineListener>) {
        self.script.lock().listener = Some(listener);
    }

    async fn reset(&mut self) -> Result<()> {
        self.record("reset");
        let mut script = self.script.lock();
        script.position_ms = 0;
        script.duration_ms = None;
        Ok(())
    }

    async fn load(&mut self, item: &MediaItem) -> Result<()> {
        self.record("load");

        let hold = self.script.lock().hold_loads;
        if hold {
            self.load_gate.notified().await;
        }

        let mut script = self.script.lock();
        if let Some((code, message)) = script.fail_load.take() {
            return Err(BridgeError::Engine { code, message });
        }
        script.duration_ms = item.duration_ms();
        script.position_ms = item.start_position_ms;
        Ok(())
    }

    async fn prepare(&mut self) -> Result<()> {
        self.record("prepare");
        Ok(())
    }

    async fn play(&mut self) -> Result<()> {
        self.record("play");
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.record("pause");
        Ok(())
    }

    async fn seek(&mut self, position: Duration) -> Result<()> {
        self.record("seek");
        self.script.lock().position_ms = position.as_millis() as u64;
        Ok(())
    }

    fn position(&self) -> Duration {
        let mut script = self.script.lock();
        script.position_reads += 1;
        Duration::from_millis(script.position_ms)
    }

    fn duration(&self) -> Option<Duration> {
        self.script.lock().duration_ms.map(Duration::from_millis)
    }

    async fn release(&mut self) -> Result<()> {
        self.record("release");
        Ok(())
    }
}
