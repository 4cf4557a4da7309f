//! Application callbacks and their panic isolation.
//!
//! Callbacks run on the connection's own task. A panicking callback is
//! caught, counted and logged; the connection carries on.

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, PoisonError, RwLock},
};

use futures::{FutureExt, future::BoxFuture};
use log::error;

use crate::{
    message::Message,
    metrics::{self, PanicSource},
    panic::format_panic,
    registry::ConnectionId,
};

/// Handler awaited for every Text or Binary message.
pub type MessageHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handler invoked when a client connects or disconnects.
pub type LifecycleHandler = Arc<dyn Fn(ConnectionId) + Send + Sync>;

#[derive(Default)]
pub(super) struct Callbacks {
    on_message: RwLock<Option<MessageHandler>>,
    on_connect: RwLock<Option<LifecycleHandler>>,
    on_disconnect: RwLock<Option<LifecycleHandler>>,
}

fn load<T: Clone>(slot: &RwLock<Option<T>>) -> Option<T> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn store<T>(slot: &RwLock<Option<T>>, value: T) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = Some(value);
}

impl Callbacks {
    pub(super) fn set_message(&self, handler: MessageHandler) { store(&self.on_message, handler); }

    pub(super) fn set_connect(&self, handler: LifecycleHandler) { store(&self.on_connect, handler); }

    pub(super) fn set_disconnect(&self, handler: LifecycleHandler) {
        store(&self.on_disconnect, handler);
    }

    /// Run the message handler, handing `message` back when none is set.
    pub(super) async fn message(&self, message: Message) -> Option<Message> {
        let Some(handler) = load(&self.on_message) else {
            return Some(message);
        };
        let id = message.client_id;
        match catch_unwind(AssertUnwindSafe(|| handler(message))) {
            Ok(fut) => {
                if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
                    report_panic("on_message", id, &*panic);
                }
            }
            Err(panic) => report_panic("on_message", id, &*panic),
        }
        None
    }

    pub(super) fn connected(&self, id: ConnectionId) {
        invoke_lifecycle("on_connect", load(&self.on_connect), id);
    }

    pub(super) fn disconnected(&self, id: ConnectionId) {
        invoke_lifecycle("on_disconnect", load(&self.on_disconnect), id);
    }
}

fn invoke_lifecycle(name: &'static str, handler: Option<LifecycleHandler>, id: ConnectionId) {
    let Some(handler) = handler else { return };
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(id))) {
        report_panic(name, id, &*panic);
    }
}

fn report_panic(callback: &'static str, id: ConnectionId, payload: &(dyn Any + Send)) {
    metrics::inc_panics(PanicSource::Callback);
    let panic_msg = format_panic(payload);
    // Emit via both `log` and `tracing` for tests that capture either.
    error!("{callback} callback panicked: panic={panic_msg}, id={id}");
    tracing::error!(panic = %panic_msg, %id, callback, "callback panicked");
}
