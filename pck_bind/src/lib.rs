//! C ABI surface (§6): a thin, host-language-agnostic shim over
//! [`pck::ArchiveSession`] — one opaque handle per mounted archive, plain
//! `int`/`*mut u8`/`*const c_char` at the boundary, grounded on the original
//! binding crate's `Box::into_raw`/`Box::from_raw` handle-passing idiom.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::sync::Arc;

use pck::{ArchiveSession, Error, KeyOverrides, MountOptions, Severity};

/// Opaque handle returned by [`pck_session_open`]. Internally an
/// `Arc<ArchiveSession>`, since the session's own background extraction
/// workers (§5) need to outlive the call that spawned them.
pub struct PckSession(Arc<ArchiveSession>);

fn cstr_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

/// Mounts the archive at `path` and returns a session handle, or null on
/// failure. `g0`/`g1`/`m`/`c` are key-schedule overrides; pass `0` for any
/// word to use the formula derived from `algorithm_id` (§4.1).
#[no_mangle]
pub unsafe extern "C" fn pck_session_open(
    path: *const c_char,
    algorithm_id: u32,
    g0: u32,
    g1: u32,
    m: u32,
    c: u32,
) -> *mut PckSession {
    let Some(path) = cstr_to_str(path) else {
        return std::ptr::null_mut();
    };

    let session = ArchiveSession::new();
    let options = MountOptions {
        algorithm_id,
        overrides: KeyOverrides { g0, g1, m, c },
    };
    match session.mount(path, options) {
        Ok(()) => Box::into_raw(Box::new(PckSession(Arc::new(session)))),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Unmounts (flushing a dirty session, per §4.9) and frees the handle.
#[no_mangle]
pub unsafe extern "C" fn pck_session_close(handle: *mut PckSession) {
    if handle.is_null() {
        return;
    }
    let session = Box::from_raw(handle);
    let _ = session.0.unmount();
}

fn walk_paths(session: &ArchiveSession, id: pck::NodeId, out: &mut Vec<String>) -> Result<(), Error> {
    for child in session.children(id)? {
        let node = session.node(child)?;
        if node.is_folder {
            walk_paths(session, child, out)?;
        } else {
            out.push(session.full_path(child)?);
        }
    }
    Ok(())
}

/// Lists every file path in the mounted archive (folders are not listed; a
/// host can infer them from the `/`-separated path components, §4.8). On
/// success, `*len` holds the element count and the return value is an array
/// of NUL-terminated strings to be freed with [`pck_session_drop_list`].
/// Returns null on error.
#[no_mangle]
pub unsafe extern "C" fn pck_session_list(
    handle: *mut PckSession,
    len: *mut usize,
) -> *mut *mut c_char {
    let session = &(*handle).0;
    let Ok(root) = session.root() else {
        return std::ptr::null_mut();
    };
    let mut paths = vec![];
    if walk_paths(session, root, &mut paths).is_err() {
        return std::ptr::null_mut();
    }

    let c_strings: Vec<*mut c_char> = paths
        .into_iter()
        .filter_map(|p| CString::new(p).ok())
        .map(CString::into_raw)
        .collect();
    let boxed: Box<[*mut c_char]> = c_strings.into_boxed_slice();
    *len = boxed.len();
    Box::into_raw(boxed) as *mut *mut c_char
}

/// Frees an array returned by [`pck_session_list`].
#[no_mangle]
pub unsafe extern "C" fn pck_session_drop_list(buf: *mut *mut c_char, len: usize) {
    if buf.is_null() {
        return;
    }
    let boxed = Box::from_raw(std::slice::from_raw_parts_mut(buf, len));
    for ptr in boxed.iter() {
        if !ptr.is_null() {
            drop(CString::from_raw(*ptr));
        }
    }
}

/// Reads one file's decompressed bytes into a freshly allocated buffer.
/// Returns `0` on success (`*buffer`/`*length` filled in, to be freed with
/// [`pck_buffer_drop`]), `1` if `path` does not name a file, `-1` on error.
#[no_mangle]
pub unsafe extern "C" fn pck_session_get(
    handle: *mut PckSession,
    path: *const c_char,
    buffer: *mut *mut u8,
    length: *mut usize,
) -> i32 {
    let session = &(*handle).0;
    let Some(path) = cstr_to_str(path) else {
        return -1;
    };
    let node = match session.lookup(path) {
        Ok(Some(node)) => node,
        Ok(None) => return 1,
        Err(_) => return -1,
    };
    match session.read_file(node) {
        Ok(data) => {
            let boxed = data.into_boxed_slice();
            *length = boxed.len();
            *buffer = Box::into_raw(boxed) as *mut u8;
            0
        }
        Err(_) => -1,
    }
}

/// Frees a buffer returned by [`pck_session_get`].
#[no_mangle]
pub unsafe extern "C" fn pck_buffer_drop(buf: *mut u8, len: usize) {
    if buf.is_null() {
        return;
    }
    drop(Box::from_raw(std::slice::from_raw_parts_mut(buf, len)));
}

/// Stages `src_path` on the host filesystem as `archive_path` inside the
/// mounted archive (§4.10). `level` is the deflate level, `0` for store.
/// Returns `0` on success, nonzero on error (duplicate path, I/O failure, a
/// layout that refuses updates, or a busy session).
#[no_mangle]
pub unsafe extern "C" fn pck_session_add(
    handle: *mut PckSession,
    src_path: *const c_char,
    archive_path: *const c_char,
    level: u32,
) -> i32 {
    let session = &(*handle).0;
    let (Some(src_path), Some(archive_path)) = (cstr_to_str(src_path), cstr_to_str(archive_path))
    else {
        return -1;
    };
    match session.add(src_path, archive_path, level) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// Commits pending mutations: re-encodes the index and rewrites the footer
/// and header (§4.10). A no-op, returning `0`, if nothing is dirty.
#[no_mangle]
pub unsafe extern "C" fn pck_session_commit(handle: *mut PckSession) -> i32 {
    let session = &(*handle).0;
    match session.commit() {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// Pointer wrapper used only to smuggle the host's opaque `context` pointer
/// into the `Send + Sync` closure [`pck::register_log_callback`] requires.
/// Safe as long as the host's callback itself tolerates being invoked from
/// whatever thread emitted the log line (§5, §7).
struct SendContext(*mut c_void);
unsafe impl Send for SendContext {}
unsafe impl Sync for SendContext {}

fn severity_code(severity: Severity) -> u8 {
    match severity {
        Severity::Debug => 0,
        Severity::Info => 1,
        Severity::Warn => 2,
        Severity::Error => 3,
    }
}

/// Registers a process-wide log callback `(context, severity, message)`,
/// mirroring the original `log_regShowFunc` hook (§7, §9). Pass a null
/// function pointer to unregister.
#[no_mangle]
pub unsafe extern "C" fn pck_log_register(
    context: *mut c_void,
    callback: Option<extern "C" fn(*mut c_void, u8, *const c_char)>,
) {
    match callback {
        Some(cb) => {
            let ctx = SendContext(context);
            pck::register_log_callback(Some(Box::new(move |severity, message| {
                if let Ok(message) = CString::new(message) {
                    cb(ctx.0, severity_code(severity), message.as_ptr());
                }
            })));
        }
        None => pck::register_log_callback(None),
    }
}
