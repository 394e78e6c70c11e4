//! Panic boundary.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use futures::FutureExt;
use http::StatusCode;

use super::{Middleware, Next};
use crate::envelope::{self, Code};
use crate::handler::BoxFuture;
use crate::request::Request;

/// Turns a panic anywhere below this stage into a `500` envelope.
///
/// Only genuinely unexpected faults should get here; handlers report expected
/// failures as envelopes themselves. The panic unwinds no further than this
/// request's future, so the connection task and every other request carry on.
///
/// The logged `backtrace` is the stack of the panicking frame, recorded by a
/// process-wide panic hook that [`Recovery::new`] installs once. The hook
/// chains to whatever hook was installed before it.
pub struct Recovery(());

impl Recovery {
    pub fn new() -> Self {
        install_hook();
        Self(())
    }
}

impl Default for Recovery {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    /// Backtrace of the most recent panic on this thread.
    static PANIC_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

fn install_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture();
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// Takes the trace recorded for the panic that was just caught.
///
/// `catch_unwind` returns on the thread that panicked, so the slot holds the
/// trace of this panic.
fn take_panic_trace() -> String {
    PANIC_TRACE
        .with(|slot| slot.borrow_mut().take())
        .map_or_else(|| "unavailable".to_owned(), |trace| trace.to_string())
}

impl Middleware for Recovery {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let request_id = req.context().request_id().to_owned();
        let trace_id = req.context().trace_id().to_owned();

        Box::pin(async move {
            match AssertUnwindSafe(next.run(req)).catch_unwind().await {
                Ok(res) => res,
                Err(payload) => {
                    tracing::error!(
                        panic = %panic_message(payload.as_ref()),
                        backtrace = %take_panic_trace(),
                        request_id = %request_id,
                        "panic recovered"
                    );
                    envelope::error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Code::INTERNAL_ERROR,
                        "internal server error",
                        &request_id,
                        &trace_id,
                    )
                }
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
