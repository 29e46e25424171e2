pub mod minimal;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy)]
pub enum EventType {
    RunnerOnFailed,
    RunnerOnOk,
    RunnerOnSkipped,
    RunnerOnUnreachable,
    PlaybookOnStart,
    PlaybookOnPlayStart,
    PlaybookOnNoHostsMatched,
    PlaybookOnStats,
}

pub trait CallbackPlugin: Send + Sync {
    /// The list of events the plugin is interested in handling.
    fn get_interested_events(&self) -> Vec<EventType>;

    /// Called when an event triggers that the plugin has registered for.
    fn on_event(&self, event: &EventType, data: Option<&Value>);
}

/// Routes events to the plugins registered for them.
#[derive(Clone, Default)]
pub struct CallbackManager {
    callbacks: HashMap<EventType, Vec<Arc<dyn CallbackPlugin>>>,
}

impl CallbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_callback(&mut self, callback: Box<dyn CallbackPlugin>) {
        let callback: Arc<dyn CallbackPlugin> = Arc::from(callback);
        for event in callback.get_interested_events() {
            self.callbacks
                .entry(event)
                .or_default()
                .push(callback.clone());
        }
    }

    pub fn emit_event(&self, event: EventType, data: Option<Value>) {
        if let Some(callbacks) = self.callbacks.get(&event) {
            for callback in callbacks {
                callback.on_event(&event, data.as_ref());
            }
        }
    }
}
