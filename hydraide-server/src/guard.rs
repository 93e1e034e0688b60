//! Small RAII helpers used by every Gateway handler: a vigil that pins a
//! summoned Swamp for the duration of an operation (spec §5 "vigil wraps
//! operation"), a Treasure guard wrapper that releases even on an early
//! error return, and the panic-catching wrapper around each handler body.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use hydraide_hydra::Observer;
use hydraide_storage::{GuardId, Swamp};
use tonic::Status;

/// Holds a Swamp's vigil count up for as long as this guard lives,
/// preventing `Hydra`'s idle watcher from closing it mid-operation.
pub struct Vigil(Arc<Swamp>);

impl Vigil {
    pub fn hold(swamp: Arc<Swamp>) -> Self {
        swamp.begin_vigil();
        Vigil(swamp)
    }
}

impl std::ops::Deref for Vigil {
    type Target = Swamp;
    fn deref(&self) -> &Swamp {
        &self.0
    }
}

impl Drop for Vigil {
    fn drop(&mut self) {
        self.0.cease_vigil();
    }
}

/// Releases the held Treasure guard on drop. `Swamp::release_treasure_guard`
/// is idempotent, so this is safe to run even after `Swamp::save` has
/// already released the same id.
pub struct TreasureLease<'a> {
    swamp: &'a Swamp,
    key: String,
    pub id: GuardId,
}

impl<'a> TreasureLease<'a> {
    pub async fn acquire(swamp: &'a Swamp, key: &str, exclusive: bool) -> Self {
        let id = swamp.start_treasure_guard(key, exclusive).await;
        TreasureLease {
            swamp,
            key: key.to_string(),
            id,
        }
    }
}

impl Drop for TreasureLease<'_> {
    fn drop(&mut self) {
        self.swamp.release_treasure_guard(&self.key, self.id);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Registers `operation` with the Observer for the lifetime of `fut` and
/// converts a panic inside it into `Status::internal` instead of tearing
/// down the connection (spec §7: "panics in handlers are caught and logged
/// with stack; the call returns InternalError").
pub async fn guarded<F, T>(observer: &Observer, operation: &'static str, fut: F) -> Result<T, Status>
where
    F: Future<Output = Result<T, Status>>,
{
    let _in_flight = observer.track(operation);
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(&*panic);
            tracing::error!(operation, panic = %message, "panic in gateway handler");
            Err(Status::internal("internal error"))
        }
    }
}
