//! C ABI exports.
//!
//! Every function is `extern "C"` and `#[no_mangle]`. Bridges are named by
//! opaque non-zero `u64` handles into a global `DashMap`; `0` is never a
//! valid handle. Functions returning `i32` use [`FfiResult`] codes.

use std::ffi::{CStr, c_char, c_void};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use mctoirc_core::{Bridge, ServerStats, TomlConfigFile};

use crate::RUNTIME;
use crate::bridge::callback::{CallbackSink, EventCallback};
use crate::core::{HostCore, HostSink};
use crate::error::FfiResult;

/// How long `mctoirc_stop` waits for the session to send QUIT and close.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

static HANDLES: Lazy<DashMap<u64, Arc<HostCore>>> = Lazy::new(DashMap::new);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Null or invalid UTF-8 gives `None`.
unsafe fn read_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok().map(String::from)
}

/// Clone the core out so the table shard isn't locked while we work.
fn lookup(handle: u64) -> Option<Arc<HostCore>> {
    HANDLES.get(&handle).map(|core| Arc::clone(&core))
}

// ─── Create / Destroy ────────────────────────────────────────────────

/// Create a stopped bridge from a TOML config file. A missing file is
/// created with default values.
///
/// Returns a non-zero handle, or 0 if the path is unusable or the config
/// fails to parse.
///
/// # Safety
///
/// `config_path` must be a valid, NUL-terminated UTF-8 C string, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mctoirc_create(config_path: *const c_char) -> u64 {
    let Some(path) = (unsafe { read_c_str(config_path) }) else {
        tracing::error!("mctoirc_create: null or invalid config_path");
        return 0;
    };

    let store = TomlConfigFile::new(&path);
    let config = match store.load_or_init() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(%path, error = %e, "mctoirc_create: unusable config");
            return 0;
        }
    };

    let sink = Arc::new(HostSink::default());
    let bridge = Bridge::new(
        config,
        Arc::clone(&sink) as _,
        Arc::new(store),
        RUNTIME.handle().clone(),
    );

    let id = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    HANDLES.insert(id, Arc::new(HostCore { id, bridge, sink }));
    tracing::debug!(handle = id, %path, "bridge created");
    id
}

/// Stop and free a bridge. Queued lines that were not sent yet are lost.
/// Destroying an unknown handle is a no-op.
///
/// # Safety
///
/// Any `handle` value is accepted.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mctoirc_destroy(handle: u64) {
    if let Some((_, core)) = HANDLES.remove(&handle) {
        tracing::debug!(handle = core.id, "destroying bridge");
        core.sink.unsubscribe();
        core.bridge.stop();
    }
}

// ─── Subscribe ───────────────────────────────────────────────────────

/// Register the callback that receives channel broadcasts as JSON
/// envelopes. A second call replaces the first.
///
/// # Safety
///
/// `cb` must be a valid function pointer. It is called from a runtime
/// worker thread, and `user_data` must stay valid until the handle is
/// destroyed or the callback replaced.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mctoirc_subscribe(
    handle: u64,
    cb: EventCallback,
    user_data: *mut c_void,
) -> i32 {
    let Some(core) = lookup(handle) else {
        return FfiResult::InvalidHandle as i32;
    };
    core.sink.subscribe(CallbackSink::new(cb, user_data));
    tracing::debug!(handle, "callback registered");
    FfiResult::Ok as i32
}

// ─── Start / Stop ────────────────────────────────────────────────────

/// Start connecting in the background. Returns immediately; calling it on
/// a running bridge does nothing.
///
/// # Safety
///
/// Any `handle` value is accepted.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mctoirc_start(handle: u64) -> i32 {
    let Some(core) = lookup(handle) else {
        return FfiResult::InvalidHandle as i32;
    };
    if core.bridge.start() {
        FfiResult::Ok as i32
    } else {
        FfiResult::Internal as i32
    }
}

/// Send QUIT and disconnect, waiting a few seconds for it to finish.
/// Lines still queued are kept for the next `mctoirc_start`.
///
/// # Safety
///
/// Must not be called from inside the callback.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mctoirc_stop(handle: u64) -> i32 {
    let Some(core) = lookup(handle) else {
        return FfiResult::InvalidHandle as i32;
    };

    let (tx, rx) = std::sync::mpsc::channel();
    RUNTIME.spawn(async move {
        core.bridge.shutdown().await;
        let _ = tx.send(());
    });

    match rx.recv_timeout(STOP_TIMEOUT) {
        Ok(()) => FfiResult::Ok as i32,
        Err(e) => {
            tracing::warn!(handle, error = %e, "bridge did not stop in time");
            FfiResult::Internal as i32
        }
    }
}

/// `true` while a session is registered with the server.
///
/// # Safety
///
/// Any `handle` value is accepted; unknown handles report `false`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mctoirc_is_connected(handle: u64) -> bool {
    lookup(handle).is_some_and(|core| core.bridge.status().is_connected())
}

// ─── Game events ─────────────────────────────────────────────────────

/// Relay a chat message.
///
/// # Safety
///
/// `player` and `message` must be valid, NUL-terminated UTF-8 C strings, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mctoirc_emit_chat(
    handle: u64,
    player: *const c_char,
    message: *const c_char,
) -> i32 {
    let Some(core) = lookup(handle) else {
        return FfiResult::InvalidHandle as i32;
    };
    let Some(player) = (unsafe { read_c_str(player) }) else {
        return FfiResult::InvalidArgument as i32;
    };
    let Some(message) = (unsafe { read_c_str(message) }) else {
        return FfiResult::InvalidArgument as i32;
    };
    FfiResult::from(core.bridge.emit_chat(&player, &message)) as i32
}

/// # Safety
///
/// `player` must be a valid, NUL-terminated UTF-8 C string, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mctoirc_emit_join(handle: u64, player: *const c_char) -> i32 {
    let Some(core) = lookup(handle) else {
        return FfiResult::InvalidHandle as i32;
    };
    let Some(player) = (unsafe { read_c_str(player) }) else {
        return FfiResult::InvalidArgument as i32;
    };
    FfiResult::from(core.bridge.emit_join(&player)) as i32
}

/// Report a player leaving. `kick_reason` may be null. A quit that was
/// already reported through `mctoirc_emit_kick` returns `Ok` and sends
/// nothing.
///
/// # Safety
///
/// `player` must be a valid, NUL-terminated UTF-8 C string, or null.
/// `kick_reason` must be a valid, NUL-terminated C string, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mctoirc_emit_quit(
    handle: u64,
    player: *const c_char,
    was_kicked: bool,
    kick_reason: *const c_char,
    is_banned: bool,
) -> i32 {
    let Some(core) = lookup(handle) else {
        return FfiResult::InvalidHandle as i32;
    };
    let Some(player) = (unsafe { read_c_str(player) }) else {
        return FfiResult::InvalidArgument as i32;
    };
    let reason = unsafe { read_c_str(kick_reason) };
    FfiResult::from(
        core.bridge
            .emit_quit(&player, was_kicked, reason.as_deref(), is_banned),
    ) as i32
}

/// # Safety
///
/// `player` must be a valid, NUL-terminated UTF-8 C string, or null.
/// `reason` must be a valid, NUL-terminated C string, or null for none.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mctoirc_emit_kick(
    handle: u64,
    player: *const c_char,
    reason: *const c_char,
    is_banned: bool,
) -> i32 {
    let Some(core) = lookup(handle) else {
        return FfiResult::InvalidHandle as i32;
    };
    let Some(player) = (unsafe { read_c_str(player) }) else {
        return FfiResult::InvalidArgument as i32;
    };
    let reason = unsafe { read_c_str(reason) }.unwrap_or_default();
    FfiResult::from(core.bridge.emit_kick(&player, &reason, is_banned)) as i32
}

/// Queue a stats report. `stats_json` is a JSON object with any of
/// `tps` (three numbers), `cpu_load` (0 to 1), `memory_used_mb`,
/// `memory_max_mb`, `entities` and `players`.
///
/// # Safety
///
/// `stats_json` must be a valid, NUL-terminated UTF-8 C string, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mctoirc_emit_stats(handle: u64, stats_json: *const c_char) -> i32 {
    let Some(core) = lookup(handle) else {
        return FfiResult::InvalidHandle as i32;
    };
    let Some(json) = (unsafe { read_c_str(stats_json) }) else {
        return FfiResult::InvalidArgument as i32;
    };
    let stats: ServerStats = match serde_json::from_str(&json) {
        Ok(stats) => stats,
        Err(e) => {
            tracing::warn!(handle, error = %e, "mctoirc_emit_stats: invalid JSON");
            return FfiResult::InvalidArgument as i32;
        }
    };
    FfiResult::from(core.bridge.emit_stats(&stats)) as i32
}

// ─── Tests ───────────────────────────────────────────────────────────
