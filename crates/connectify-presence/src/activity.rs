//! Activity signals and the host that delivers them.
//!
//! An [`ActivityHost`] plays the role the browser document plays for the web
//! client: the tracker registers one listener per signal kind when it joins
//! and removes each of them exactly once when it tears down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use connectify_config::ActivitySignalKind;

/// Page/window visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Kinds of signal a listener can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    PointerMove,
    KeyDown,
    Scroll,
    Touch,
    Visibility,
}

impl From<ActivitySignalKind> for SignalKind {
    fn from(kind: ActivitySignalKind) -> Self {
        match kind {
            ActivitySignalKind::PointerMove => SignalKind::PointerMove,
            ActivitySignalKind::KeyDown => SignalKind::KeyDown,
            ActivitySignalKind::Scroll => SignalKind::Scroll,
            ActivitySignalKind::Touch => SignalKind::Touch,
        }
    }
}

/// A single raw signal from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    PointerMove,
    KeyDown,
    Scroll,
    Touch,
    VisibilityChanged(Visibility),
}

impl ActivitySignal {
    pub fn kind(&self) -> SignalKind {
        match self {
            ActivitySignal::PointerMove => SignalKind::PointerMove,
            ActivitySignal::KeyDown => SignalKind::KeyDown,
            ActivitySignal::Scroll => SignalKind::Scroll,
            ActivitySignal::Touch => SignalKind::Touch,
            ActivitySignal::VisibilityChanged(_) => SignalKind::Visibility,
        }
    }
}

/// Where a registered listener forwards its signals.
pub type SignalSink = mpsc::UnboundedSender<ActivitySignal>;

/// Opaque handle returned by [`ActivityHost::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Environment that delivers input and visibility signals.
pub trait ActivityHost: Send {
    fn add_listener(&mut self, kind: SignalKind, sink: SignalSink) -> ListenerId;
    fn remove_listener(&mut self, id: ListenerId);
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<ListenerId, (SignalKind, SignalSink)>,
}

/// In-process host fed by [`ChannelHost::emit`].
///
/// Clones share the same listener registry, so one clone can be handed to a
/// tracker while another feeds it signals.
#[derive(Clone, Default)]
pub struct ChannelHost {
    registry: Arc<Mutex<Registry>>,
}

impl ChannelHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a signal to every listener registered for its kind. Returns
    /// how many listeners received it.
    pub fn emit(&self, signal: ActivitySignal) -> usize {
        let Ok(registry) = self.registry.lock() else {
            return 0;
        };
        let mut delivered = 0;
        for (kind, sink) in registry.listeners.values() {
            if *kind == signal.kind() && sink.send(signal).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn listener_count(&self) -> usize {
        self.registry
            .lock()
            .map(|r| r.listeners.len())
            .unwrap_or(0)
    }
}

impl ActivityHost for ChannelHost {
    fn add_listener(&mut self, kind: SignalKind, sink: SignalSink) -> ListenerId {
        let mut registry = match self.registry.lock() {
            Ok(r) => r,
            Err(poisoned) => poisoned.into_inner(),
        };
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry.listeners.insert(id, (kind, sink));
        id
    }

    fn remove_listener(&mut self, id: ListenerId) {
        let mut registry = match self.registry.lock() {
            Ok(r) => r,
            Err(poisoned) => poisoned.into_inner(),
        };
        registry.listeners.remove(&id);
    }
}
