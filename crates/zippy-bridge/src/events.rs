//! Typed listener registry for bridge notifications.
//!
//! Collaborators (a UI layer, the CLI) register callbacks on the
//! [`EventHub`]; the bridge publishes to them synchronously on whichever
//! thread produced the event:
//!
//! | Event | Published by | Payload |
//! |---|---|---|
//! | probe finished | [`LivenessProbe::probe_sync`][crate::probe::LivenessProbe::probe_sync] | `bool` |
//! | response received | request worker | response text |
//! | response finished | request worker | – |
//! | request error | request worker | diagnostic message |
//! | generate status changed | prompt lifecycle | [`GenerateStatus`] |
//!
//! Callbacks fire in registration order.  The registry is snapshotted
//! before dispatch, so a callback may register further callbacks; those
//! only see subsequent events.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use zippy_types::GenerateStatus;

type Callback<T: ?Sized> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered list of callbacks for a single event kind.
pub struct Listeners<T: ?Sized> {
    callbacks: Mutex<Vec<Callback<T>>>,
}

impl<T: ?Sized> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> Listeners<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback`; it receives every later publication.
    pub fn register<F>(&self, callback: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.lock().push(Arc::new(callback));
    }

    /// Invoke every registered callback with `value`.  Returns how many
    /// callbacks ran.
    pub fn publish(&self, value: &T) -> usize {
        let snapshot: Vec<Callback<T>> = self.lock().clone();
        for callback in &snapshot {
            callback(value);
        }
        snapshot.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Callback<T>>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// All notification channels exposed by the bridge.
#[derive(Default)]
pub struct EventHub {
    probe_finished: Listeners<bool>,
    response_received: Listeners<str>,
    response_finished: Listeners<()>,
    request_error: Listeners<str>,
    generate_status_changed: Listeners<GenerateStatus>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per synchronous probe with its result.  Background
    /// probes do not publish here.
    pub fn on_probe_finished<F>(&self, callback: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.probe_finished.register(move |ok: &bool| callback(*ok));
    }

    pub fn on_response_received<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.response_received.register(callback);
    }

    pub fn on_response_finished<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.response_finished.register(move |_: &()| callback());
    }

    pub fn on_request_error<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.request_error.register(callback);
    }

    pub fn on_generate_status_changed<F>(&self, callback: F)
    where
        F: Fn(GenerateStatus) + Send + Sync + 'static,
    {
        self.generate_status_changed
            .register(move |status: &GenerateStatus| callback(*status));
    }

    pub(crate) fn emit_probe_finished(&self, ok: bool) {
        self.probe_finished.publish(&ok);
    }

    pub(crate) fn emit_response_received(&self, text: &str) {
        self.response_received.publish(text);
    }

    pub(crate) fn emit_response_finished(&self) {
        self.response_finished.publish(&());
    }

    pub(crate) fn emit_request_error(&self, message: &str) {
        self.request_error.publish(message);
    }

    pub(crate) fn emit_generate_status_changed(&self, status: GenerateStatus) {
        self.generate_status_changed.publish(&status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn callbacks_fire_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let listeners: Listeners<u32> = Listeners::new();
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            listeners.register(move |v: &u32| order.lock().unwrap().push((tag, *v)));
        }

        assert_eq!(listeners.publish(&7), 3);
        assert_eq!(
            *order.lock().unwrap(),
            vec![("first", 7), ("second", 7), ("third", 7)]
        );
    }

    #[test]
    fn publish_without_listeners_is_a_noop() {
        let listeners: Listeners<str> = Listeners::new();
        assert!(listeners.is_empty());
        assert_eq!(listeners.publish("ignored"), 0);
    }

    #[test]
    fn callback_may_register_another_callback() {
        let listeners: Arc<Listeners<()>> = Arc::new(Listeners::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let inner = listeners.clone();
        let inner_hits = hits.clone();
        listeners.register(move |_: &()| {
            let hits = inner_hits.clone();
            inner.register(move |_: &()| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        });

        // The nested callback is registered but does not see this event.
        assert_eq!(listeners.publish(&()), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(listeners.len(), 2);
    }

    #[test]
    fn hub_routes_each_event_to_its_own_listeners() {
        let hub = EventHub::new();
        let probes = Arc::new(Mutex::new(Vec::new()));
        let texts = Arc::new(Mutex::new(Vec::new()));
        let finished = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let statuses = Arc::new(Mutex::new(Vec::new()));

        let p = probes.clone();
        hub.on_probe_finished(move |ok| p.lock().unwrap().push(ok));
        let t = texts.clone();
        hub.on_response_received(move |s| t.lock().unwrap().push(s.to_string()));
        let f = finished.clone();
        hub.on_response_finished(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let e = errors.clone();
        hub.on_request_error(move |s| e.lock().unwrap().push(s.to_string()));
        let st = statuses.clone();
        hub.on_generate_status_changed(move |s| st.lock().unwrap().push(s));

        hub.emit_probe_finished(false);
        hub.emit_response_received("hello");
        hub.emit_response_finished();
        hub.emit_request_error("boom");
        hub.emit_generate_status_changed(GenerateStatus::Finished);

        assert_eq!(*probes.lock().unwrap(), vec![false]);
        assert_eq!(*texts.lock().unwrap(), vec!["hello".to_string()]);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(*errors.lock().unwrap(), vec!["boom".to_string()]);
        assert_eq!(*statuses.lock().unwrap(), vec![GenerateStatus::Finished]);
    }
}
