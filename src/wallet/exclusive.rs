//! Single-owner access to an external signing device (e.g. a Ledger transport)

use crate::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Future borrowed from the device for the duration of one operation
pub type DeviceFuture<'a, R> = Pin<Box<dyn Future<Output = Result<R>> + Send + 'a>>;

/// Serializes every operation on a device that cannot interleave requests.
///
/// The lock is released on every exit path: success, error, and panic
/// (the guard drops during unwinding; tokio mutexes do not poison).
#[derive(Debug)]
pub struct ExclusiveDevice<T> {
    device: Arc<Mutex<T>>,
}

impl<T> Clone for ExclusiveDevice<T> {
    fn clone(&self) -> Self {
        Self {
            device: self.device.clone(),
        }
    }
}

impl<T: Send> ExclusiveDevice<T> {
    pub fn new(device: T) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
        }
    }

    /// Run `op` with exclusive access, waiting for any operation in flight.
    pub async fn with_device<R, F>(&self, op: F) -> Result<R>
    where
        F: for<'a> FnOnce(&'a mut T) -> DeviceFuture<'a, R>,
    {
        let mut guard = self.device.lock().await;
        tracing::trace!("Acquired exclusive device");
        op(&mut *guard).await
    }

    /// Whether an operation currently holds the device
    pub fn is_busy(&self) -> bool {
        self.device.try_lock().is_err()
    }
}
