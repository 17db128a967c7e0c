use std::fmt;
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};

use may::coroutine::{self, JoinHandle};
use may::go;
use may::sync::{Condvar, Mutex};

/// the shutdown context of one Server/Publisher/Subscriber instance
///
/// tracks every coroutine spawned for the instance, `shutdown` cancels all of
/// them so that blocked socket/channel calls unwind, `join` waits for them.
/// a context is never shared between instances
pub struct Context {
    running: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("running", &self.is_running())
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl Context {
    /// create a running context
    pub fn new() -> Self {
        Context {
            running: AtomicBool::new(true),
            handles: Mutex::new(Vec::new()),
            stopped: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// false once `shutdown` is called
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// spawn a named coroutine owned by this context
    pub fn spawn<F>(&self, name: String, f: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.is_running() {
            return Err(io::Error::new(ErrorKind::NotConnected, "context is shut down"));
        }

        let handle = go!(coroutine::Builder::new().name(name), f)?;
        let mut handles = self.handles.lock().unwrap();
        handles.retain(|h| !h.is_done());
        // lost the race with a concurrent shutdown
        if !self.is_running() {
            unsafe { handle.coroutine().cancel() };
        }
        handles.push(handle);
        Ok(())
    }

    /// stop the context, can be called many times and from any coroutine
    /// including one owned by this context, it never blocks
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        {
            let mut stopped = self.stopped.lock().unwrap();
            *stopped = true;
            self.cond.notify_all();
        }

        // the caller may be one of the owned coroutines, cancel goes last
        let handles = self.handles.lock().unwrap();
        info!("context shutdown, cancel {} coroutines", handles.len());
        for h in handles.iter() {
            unsafe { h.coroutine().cancel() };
        }
    }

    /// block until `shutdown` is called
    pub fn wait(&self) {
        let mut stopped = self.stopped.lock().unwrap();
        while !*stopped {
            stopped = self.cond.wait(stopped).unwrap();
        }
    }

    /// cancel and wait all the owned coroutines
    /// must not be called from a coroutine owned by this context
    pub fn join(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        // a concurrent `shutdown` may find the list already taken
        for h in handles.iter() {
            unsafe { h.coroutine().cancel() };
        }
        for h in handles {
            // cancelled coroutines report a panic, that's the normal exit
            h.join().ok();
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.shutdown();
        self.join();
    }
}
