//! Blocking adapters over the async API.
//!
//! Inside a multi-threaded Tokio runtime the calling worker is handed over
//! with `block_in_place`; outside any runtime a private current-thread
//! runtime is started. Blocking from a current-thread runtime would
//! deadlock and is rejected.

use std::future::Future;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

use crate::error::{ColloquyError, Result};

enum Driver {
    Ambient(Handle),
    Owned(Runtime),
}

impl Driver {
    fn acquire() -> Result<Self> {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                Ok(Driver::Ambient(handle))
            }
            Ok(_) => Err(ColloquyError::Configuration(
                "blocking call made from a current-thread async runtime; use the async API".into(),
            )),
            Err(_) => Ok(Driver::Owned(
                Builder::new_current_thread().enable_all().build()?,
            )),
        }
    }

    fn run<F: Future>(&self, future: F) -> F::Output {
        match self {
            Driver::Ambient(handle) => tokio::task::block_in_place(|| handle.block_on(future)),
            Driver::Owned(runtime) => runtime.block_on(future),
        }
    }
}

/// Run `future` to completion from synchronous code.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    Ok(Driver::acquire()?.run(future))
}

/// Synchronous iterator over an async fragment stream.
///
/// The stream is opened and drained on the same runtime. Dropping the
/// iterator early drops the underlying stream.
pub struct BlockingStream<T> {
    stream: BoxStream<'static, Result<T>>,
    driver: Driver,
}

impl<T> BlockingStream<T> {
    /// Open the stream produced by `open`.
    pub fn open<F>(open: F) -> Result<Self>
    where
        F: Future<Output = Result<BoxStream<'static, Result<T>>>>,
    {
        let driver = Driver::acquire()?;
        let stream = driver.run(open)?;
        Ok(Self { stream, driver })
    }
}

impl<T> Iterator for BlockingStream<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let stream = &mut self.stream;
        self.driver.run(stream.next())
    }
}
