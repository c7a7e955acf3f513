// src/engine/registry.rs
//
// Callback handle registry.
//
// The engine calls its writer and progress hooks with nothing but a pointer
// to its own picture record. This module keeps a process-wide side table from
// that address to the sink and progress function of the encode call in
// flight, and exposes the two `extern "C"` trampolines the engine invokes.
//
// Entries exist only inside `HandleRegistry::with_registration`: registered
// before WebPEncode, removed when the closure returns or unwinds. The guard
// never leaves this module, so it cannot be leaked past the state it points to.

use crate::error::{Result, WebpError};
use libwebp_sys::WebPPicture;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::ffi::c_int;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::OnceLock;
use tracing::{trace, warn};

/// Opaque identity of a native object; used only as a lookup key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackHandle(usize);

impl CallbackHandle {
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Progress function: receives 0..=100, returns `false` to stop the encode.
pub type ProgressFn<'a> = dyn FnMut(u8) -> bool + Send + 'a;

struct Inner<'a> {
    sink: &'a mut (dyn Write + Send),
    progress: Option<&'a mut ProgressFn<'a>>,
    bytes_written: u64,
    write_error: Option<io::Error>,
    stopped: bool,
    sink_panicked: bool,
    progress_panicked: bool,
}

/// Per-call state reachable from the engine callbacks.
pub struct CallbackState<'a> {
    inner: Mutex<Inner<'a>>,
}

/// What the callbacks observed during one engine call.
#[derive(Debug, Default)]
pub struct CallbackOutcome {
    pub bytes_written: u64,
    pub write_error: Option<io::Error>,
    /// The progress function returned `false`.
    pub stopped: bool,
    pub sink_panicked: bool,
    pub progress_panicked: bool,
}

impl CallbackOutcome {
    /// The progress function ended the encode, by request or by panicking.
    pub fn aborted_by_progress(&self) -> bool {
        self.stopped || self.progress_panicked
    }
}

impl<'a> CallbackState<'a> {
    pub fn new(sink: &'a mut (dyn Write + Send), progress: Option<&'a mut ProgressFn<'a>>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sink,
                progress,
                bytes_written: 0,
                write_error: None,
                stopped: false,
                sink_panicked: false,
                progress_panicked: false,
            }),
        }
    }

    /// Forward one output chunk. `false` tells the engine to abort.
    fn write_chunk(&self, chunk: &[u8]) -> bool {
        let mut inner = self.inner.lock();
        if inner.write_error.is_some() || inner.sink_panicked {
            return false;
        }
        let result = panic::catch_unwind(AssertUnwindSafe(|| inner.sink.write_all(chunk)));
        match result {
            Ok(Ok(())) => {
                inner.bytes_written += chunk.len() as u64;
                true
            }
            Ok(Err(err)) => {
                warn!(target: "webp_bridge::registry", error = %err, "sink write failed; aborting encode");
                inner.write_error = Some(err);
                false
            }
            Err(_) => {
                warn!(target: "webp_bridge::registry", "sink panicked; aborting encode");
                inner.sink_panicked = true;
                false
            }
        }
    }

    /// Forward a progress percentage. `false` tells the engine to abort.
    fn report_progress(&self, percent: u8) -> bool {
        let mut inner = self.inner.lock();
        if inner.progress_panicked || inner.stopped {
            return false;
        }
        let Some(progress) = inner.progress.as_deref_mut() else {
            return true;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| progress(percent))) {
            Ok(true) => true,
            Ok(false) => {
                trace!(target: "webp_bridge::registry", percent, "progress function requested stop");
                inner.stopped = true;
                false
            }
            Err(_) => {
                warn!(target: "webp_bridge::registry", percent, "progress function panicked; aborting encode");
                inner.progress_panicked = true;
                false
            }
        }
    }

    #[cfg(test)]
    fn bytes_written(&self) -> u64 {
        self.inner.lock().bytes_written
    }

    pub fn into_outcome(self) -> CallbackOutcome {
        let inner = self.inner.into_inner();
        CallbackOutcome {
            bytes_written: inner.bytes_written,
            write_error: inner.write_error,
            stopped: inner.stopped,
            sink_panicked: inner.sink_panicked,
            progress_panicked: inner.progress_panicked,
        }
    }
}

/// Lifetime-erased pointer to a registered state.
#[derive(Clone, Copy)]
struct SlotPtr(NonNull<CallbackState<'static>>);

// The pointee is Sync (all access goes through its Mutex) and outlives the
// slot: a slot exists only while the owning Registration borrows the state.
unsafe impl Send for SlotPtr {}
unsafe impl Sync for SlotPtr {}

/// Concurrency-safe table from handle to callback state.
pub struct HandleRegistry {
    slots: RwLock<HashMap<CallbackHandle, SlotPtr>>,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide registry the engine trampolines consult.
    pub fn global() -> &'static HandleRegistry {
        static REGISTRY: OnceLock<HandleRegistry> = OnceLock::new();
        REGISTRY.get_or_init(HandleRegistry::new)
    }

    /// Make `state` reachable from the engine callbacks for `handle` while `f` runs.
    ///
    /// The entry is removed when `f` returns or unwinds, so it can never
    /// outlive the borrow of `state`. Fails if the handle is already
    /// registered: two calls in flight can never share a native object.
    pub fn with_registration<R>(
        &self,
        handle: CallbackHandle,
        state: &CallbackState<'_>,
        f: impl FnOnce() -> R,
    ) -> Result<R> {
        let _registration = self.register(handle, state)?;
        Ok(f())
    }

    fn register<'r, 's>(
        &'r self,
        handle: CallbackHandle,
        state: &'s CallbackState<'_>,
    ) -> Result<Registration<'r, 's>> {
        let ptr = SlotPtr(NonNull::from(state).cast::<CallbackState<'static>>());
        let mut slots = self.slots.write();
        if slots.contains_key(&handle) {
            return Err(WebpError::invalid_argument(
                "callback handle",
                format!("{:#x}", handle.as_usize()),
                "Handle is already registered",
            ));
        }
        slots.insert(handle, ptr);
        trace!(target: "webp_bridge::registry", handle = handle.as_usize(), live = slots.len(), "registered");
        Ok(Registration {
            registry: self,
            handle,
            _state: PhantomData,
        })
    }

    fn unregister(&self, handle: CallbackHandle) {
        let mut slots = self.slots.write();
        slots.remove(&handle);
        trace!(target: "webp_bridge::registry", handle = handle.as_usize(), live = slots.len(), "unregistered");
    }

    /// Read-locked lookup. The lock is released before the pointer is returned,
    /// so user code invoked through it never runs under the registry lock.
    fn lookup(&self, handle: CallbackHandle) -> Option<NonNull<CallbackState<'static>>> {
        self.slots.read().get(&handle).map(|slot| slot.0)
    }

    #[cfg(test)]
    fn contains(&self, handle: CallbackHandle) -> bool {
        self.slots.read().contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Number of live entries in the process-wide registry.
/// Returns to its previous value after every encode call.
///
/// The table itself is private to the crate; only its size is observable:
///
/// ```compile_fail
/// use webp_bridge::engine::registry::HandleRegistry;
/// ```
///
/// ```compile_fail
/// use webp_bridge::codecs::webp_safe::SafePicture;
/// ```
pub fn registered_handles() -> usize {
    HandleRegistry::global().len()
}

/// Registry entry scoped to [`HandleRegistry::with_registration`]; unregisters on drop.
struct Registration<'r, 's> {
    registry: &'r HandleRegistry,
    handle: CallbackHandle,
    _state: PhantomData<&'s ()>,
}

impl Drop for Registration<'_, '_> {
    fn drop(&mut self) {
        self.registry.unregister(self.handle);
    }
}

fn with_state<R>(picture: *const WebPPicture, fallback: R, f: impl FnOnce(&CallbackState<'_>) -> R) -> R {
    let handle = CallbackHandle::from_ptr(picture);
    match HandleRegistry::global().lookup(handle) {
        // The Registration guarding this entry borrows the state for the
        // whole engine call, so the pointer is live here.
        Some(state) => f(unsafe { state.as_ref() }),
        None => {
            warn!(target: "webp_bridge::registry", handle = handle.as_usize(), "callback for unregistered handle");
            fallback
        }
    }
}

/// Engine writer hook: forwards a chunk to the registered sink.
pub(crate) extern "C" fn write_callback(
    data: *const u8,
    data_size: usize,
    picture: *const WebPPicture,
) -> c_int {
    let chunk: &[u8] = if data.is_null() || data_size == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(data, data_size) }
    };
    with_state(picture, 0, |state| state.write_chunk(chunk) as c_int)
}

/// Engine progress hook: forwards the percentage to the registered function.
pub(crate) extern "C" fn progress_callback(percent: c_int, picture: *const WebPPicture) -> c_int {
    let percent = percent.clamp(0, 100) as u8;
    with_state(picture, 0, |state| state.report_progress(percent) as c_int)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct PanickingSink;

    impl Write for PanickingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            panic!("sink exploded");
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A unique address to stand in for a picture; never dereferenced.
    fn fake_picture() -> Box<u64> {
        Box::new(0)
    }

    fn as_picture(anchor: &u64) -> *const WebPPicture {
        anchor as *const u64 as *const WebPPicture
    }

    #[test]
    fn entry_lives_only_inside_the_scope() {
        let registry = HandleRegistry::new();
        let mut sink = Vec::new();
        let state = CallbackState::new(&mut sink, None);
        let handle = CallbackHandle(0x1000);
        let seen = registry
            .with_registration(handle, &state, || {
                assert!(registry.contains(handle));
                assert!(registry.lookup(handle).is_some());
                registry.len()
            })
            .unwrap();
        assert_eq!(seen, 1);
        assert!(registry.is_empty());
        assert!(registry.lookup(handle).is_none());
    }

    #[test]
    fn duplicate_handle_is_rejected() {
        let registry = HandleRegistry::new();
        let (mut a, mut b) = (Vec::new(), Vec::new());
        let first = CallbackState::new(&mut a, None);
        let second = CallbackState::new(&mut b, None);
        let handle = CallbackHandle(0x2000);
        registry
            .with_registration(handle, &first, || {
                let err = registry
                    .with_registration(handle, &second, || unreachable!())
                    .unwrap_err();
                assert!(err.to_string().contains("already registered"));
                assert_eq!(registry.len(), 1);
            })
            .unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_unregisters_on_error_path() {
        let registry = HandleRegistry::new();
        let mut sink = Vec::new();
        let state = CallbackState::new(&mut sink, None);
        let result: Result<()> = registry
            .with_registration(CallbackHandle(0x3000), &state, || {
                Err(WebpError::invalid_configuration("synthetic failure"))
            })
            .and_then(|inner| inner);
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_unregisters_on_unwind() {
        let registry = HandleRegistry::new();
        let mut sink = Vec::new();
        let state = CallbackState::new(&mut sink, None);
        let handle = CallbackHandle(0x4000);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            registry.with_registration(handle, &state, || panic!("engine call unwound"))
        }));
        assert!(result.is_err());
        assert!(!registry.contains(handle));
    }

    #[test]
    fn dropped_state_is_unreachable_from_callbacks() {
        let anchor = fake_picture();
        let pic = as_picture(&anchor);
        let handle = CallbackHandle::from_ptr(pic);
        {
            let mut sink = Vec::new();
            let state = CallbackState::new(&mut sink, None);
            HandleRegistry::global()
                .with_registration(handle, &state, || {
                    assert_eq!(write_callback(b"x".as_ptr(), 1, pic), 1);
                })
                .unwrap();
            assert_eq!(state.into_outcome().bytes_written, 1);
        }
        // the state is gone; the engine hook must not find it
        assert!(!HandleRegistry::global().contains(handle));
        assert_eq!(write_callback(b"y".as_ptr(), 1, pic), 0);
        assert_eq!(progress_callback(50, pic), 0);
    }

    #[test]
    fn write_callback_forwards_bytes() {
        let anchor = fake_picture();
        let pic = as_picture(&anchor);
        let mut sink = Vec::new();
        let state = CallbackState::new(&mut sink, None);
        HandleRegistry::global()
            .with_registration(CallbackHandle::from_ptr(pic), &state, || {
                let data = b"RIFF";
                assert_eq!(write_callback(data.as_ptr(), data.len(), pic), 1);
                assert_eq!(write_callback(b"WEBP".as_ptr(), 4, pic), 1);
                assert_eq!(write_callback(std::ptr::null(), 0, pic), 1);
            })
            .unwrap();
        let outcome = state.into_outcome();
        assert_eq!(outcome.bytes_written, 8);
        assert!(outcome.write_error.is_none());
        assert_eq!(sink, b"RIFFWEBP");
    }

    #[test]
    fn write_failure_aborts_and_is_kept() {
        let anchor = fake_picture();
        let pic = as_picture(&anchor);
        let mut sink = FailingSink;
        let state = CallbackState::new(&mut sink, None);
        HandleRegistry::global()
            .with_registration(CallbackHandle::from_ptr(pic), &state, || {
                assert_eq!(write_callback(b"x".as_ptr(), 1, pic), 0);
                // once failed, later chunks are refused without touching the sink
                assert_eq!(write_callback(b"y".as_ptr(), 1, pic), 0);
            })
            .unwrap();
        let outcome = state.into_outcome();
        let err = outcome.write_error.expect("write error recorded");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(outcome.bytes_written, 0);
    }

    #[test]
    fn panicking_sink_is_contained() {
        let anchor = fake_picture();
        let pic = as_picture(&anchor);
        let mut sink = PanickingSink;
        let state = CallbackState::new(&mut sink, None);
        HandleRegistry::global()
            .with_registration(CallbackHandle::from_ptr(pic), &state, || {
                assert_eq!(write_callback(b"x".as_ptr(), 1, pic), 0);
            })
            .unwrap();
        let outcome = state.into_outcome();
        assert!(outcome.sink_panicked);
        assert!(!outcome.aborted_by_progress());
    }

    #[test]
    fn progress_stop_and_continue() {
        let anchor = fake_picture();
        let pic = as_picture(&anchor);
        let mut sink = Vec::new();
        let mut seen = Vec::new();
        let mut progress = |p: u8| {
            seen.push(p);
            p < 50
        };
        let state = CallbackState::new(&mut sink, Some(&mut progress));
        HandleRegistry::global()
            .with_registration(CallbackHandle::from_ptr(pic), &state, || {
                assert_eq!(progress_callback(10, pic), 1);
                assert_eq!(progress_callback(150, pic), 0);
            })
            .unwrap();
        let outcome = state.into_outcome();
        assert!(outcome.stopped);
        assert!(!outcome.progress_panicked);
        assert!(outcome.aborted_by_progress());
        assert_eq!(seen, vec![10, 100]);
    }

    #[test]
    fn panicking_progress_is_contained() {
        let anchor = fake_picture();
        let pic = as_picture(&anchor);
        let mut sink = Vec::new();
        let mut progress = |_p: u8| -> bool { panic!("progress exploded") };
        let state = CallbackState::new(&mut sink, Some(&mut progress));
        HandleRegistry::global()
            .with_registration(CallbackHandle::from_ptr(pic), &state, || {
                assert_eq!(progress_callback(5, pic), 0);
                assert_eq!(progress_callback(6, pic), 0);
            })
            .unwrap();
        let outcome = state.into_outcome();
        assert!(outcome.progress_panicked);
        assert!(!outcome.stopped);
        assert!(outcome.aborted_by_progress());
    }

    #[test]
    fn missing_progress_function_continues() {
        let anchor = fake_picture();
        let pic = as_picture(&anchor);
        let mut sink = Vec::new();
        let state = CallbackState::new(&mut sink, None);
        let forwarded = HandleRegistry::global()
            .with_registration(CallbackHandle::from_ptr(pic), &state, || {
                progress_callback(42, pic)
            })
            .unwrap();
        assert_eq!(forwarded, 1);
    }

    #[test]
    fn unknown_handle_aborts() {
        let anchor = fake_picture();
        let pic = as_picture(&anchor);
        assert_eq!(write_callback(b"x".as_ptr(), 1, pic), 0);
        assert_eq!(progress_callback(1, pic), 0);
    }

    #[test]
    fn concurrent_register_lookup_unregister() {
        let registry = HandleRegistry::new();
        (0..512usize).into_par_iter().for_each(|i| {
            let mut sink = Vec::new();
            let state = CallbackState::new(&mut sink, None);
            let handle = CallbackHandle(0x10_0000 + i * 8);
            registry
                .with_registration(handle, &state, || {
                    let found = registry.lookup(handle).unwrap();
                    let found = unsafe { found.as_ref() };
                    assert!(found.write_chunk(&[1u8; 8]));
                    assert_eq!(found.bytes_written(), 8);
                })
                .unwrap();
            assert!(!registry.contains(handle));
        });
        assert!(registry.is_empty());
    }
}
