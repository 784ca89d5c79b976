//! Host-supplied C callback that receives broadcasts as JSON.

use std::ffi::{CString, c_char, c_void};

/// `json_ptr` points at `json_len` bytes of UTF-8 JSON followed by a NUL.
/// The buffer is only valid for the duration of the call.
pub type EventCallback =
    unsafe extern "C" fn(json_ptr: *const c_char, json_len: usize, user_data: *mut c_void);

pub struct CallbackSink {
    cb: EventCallback,
    user_data: *mut c_void,
}

// Safety: the host promises `user_data` may be used from any thread for as
// long as the subscription lasts. The callback runs on a runtime worker.
unsafe impl Send for CallbackSink {}
unsafe impl Sync for CallbackSink {}

impl CallbackSink {
    pub fn new(cb: EventCallback, user_data: *mut c_void) -> Self {
        Self { cb, user_data }
    }

    /// Hand one JSON document to the host. Text with an interior NUL can't
    /// cross the boundary and is dropped.
    pub fn dispatch(&self, json: &str) {
        let Ok(cstr) = CString::new(json) else {
            tracing::warn!("broadcast JSON contained a NUL byte, dropping");
            return;
        };
        unsafe {
            (self.cb)(cstr.as_ptr(), json.len(), self.user_data);
        }
    }
}
