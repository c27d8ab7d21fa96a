//! C ABI for linking qrferry-core as a static library from mobile scanner hosts.
//! The host owns the camera and QR decoder and passes each decoded payload to `qrferry_receiver_scan`.

use std::ffi::c_void;
use std::os::raw::c_int;
use std::slice;

use crate::core::{ReceiveError, ReceiverSession, ScanEvent};
use crate::protocol::{encode_message, Message};

/// Scan result codes returned by `qrferry_receiver_scan`.
pub const SCAN_ACCEPTED: c_int = 0;
pub const SCAN_DUPLICATE: c_int = 1;
pub const SCAN_ANNOUNCED: c_int = 2;
pub const SCAN_REANNOUNCED: c_int = 3;
pub const SCAN_COMPLETED: c_int = 4;
pub const SCAN_IGNORED: c_int = 5;

pub const ERR_ARGS: c_int = -1;
pub const ERR_NOT_ANNOUNCED: c_int = -2;
pub const ERR_FRAME_REJECTED: c_int = -3;
pub const ERR_BAD_MESSAGE: c_int = -4;
pub const ERR_INTEGRITY: c_int = -5;
pub const ERR_TRANSFER_FAILED: c_int = -6;

/// Session plus the last completed file, kept until the host copies it out.
struct Receiver {
    session: ReceiverSession,
    completed: Option<Vec<u8>>,
}

fn error_code(e: &ReceiveError) -> c_int {
    match e {
        ReceiveError::NotAnnounced => ERR_NOT_ANNOUNCED,
        ReceiveError::TransferFailed => ERR_TRANSFER_FAILED,
        ReceiveError::Frame(_) => ERR_FRAME_REJECTED,
        ReceiveError::Message(_) => ERR_BAD_MESSAGE,
        ReceiveError::Integrity(_) | ReceiveError::Incomplete(_) => ERR_INTEGRITY,
    }
}

/// Copy `src` into the host buffer. Returns bytes written, or -1 if it does not fit.
fn copy_out(src: &[u8], out_buf: *mut u8, out_buf_len: usize) -> c_int {
    if out_buf.is_null() || src.len() > out_buf_len || src.len() > c_int::MAX as usize {
        return ERR_ARGS;
    }
    unsafe {
        out_buf.copy_from_nonoverlapping(src.as_ptr(), src.len());
    }
    src.len() as c_int
}

/// Create a receiver. Returns opaque handle.
#[no_mangle]
pub extern "C" fn qrferry_receiver_create() -> *mut c_void {
    let rx = Receiver {
        session: ReceiverSession::new(),
        completed: None,
    };
    Box::into_raw(Box::new(rx)) as *mut c_void
}

/// Destroy receiver. No-op if h is null.
#[no_mangle]
pub extern "C" fn qrferry_receiver_destroy(h: *mut c_void) {
    if h.is_null() {
        return;
    }
    let _ = unsafe { Box::from_raw(h as *mut Receiver) };
}

/// Drop the active transfer and any completed file.
#[no_mangle]
pub extern "C" fn qrferry_receiver_reset(h: *mut c_void) -> c_int {
    if h.is_null() {
        return ERR_ARGS;
    }
    let rx = unsafe { &mut *(h as *mut Receiver) };
    rx.session.reset();
    rx.completed = None;
    0
}

/// Feed one decoded QR payload. Returns a SCAN_* code (>= 0) or an ERR_* code (< 0).
/// ERR_FRAME_REJECTED only drops the frame; ERR_INTEGRITY ends the transfer.
#[no_mangle]
pub extern "C" fn qrferry_receiver_scan(h: *mut c_void, bytes: *const u8, len: usize) -> c_int {
    if h.is_null() || bytes.is_null() {
        return ERR_ARGS;
    }
    let rx = unsafe { &mut *(h as *mut Receiver) };
    let scanned = unsafe { slice::from_raw_parts(bytes, len) };
    match rx.session.on_scanned(scanned) {
        Ok(ScanEvent::Accepted { .. }) => SCAN_ACCEPTED,
        Ok(ScanEvent::Duplicate { .. }) => SCAN_DUPLICATE,
        Ok(ScanEvent::Announced(_)) => {
            rx.completed = None;
            SCAN_ANNOUNCED
        }
        Ok(ScanEvent::Reannounced) => SCAN_REANNOUNCED,
        Ok(ScanEvent::Completed(file)) => {
            rx.completed = Some(file.data);
            SCAN_COMPLETED
        }
        Ok(ScanEvent::Ignored) => SCAN_IGNORED,
        Err(e) => error_code(&e),
    }
}

/// Fill counters (total, unique, duplicates, errors). Returns 0, or -1 if idle or args null.
#[no_mangle]
pub extern "C" fn qrferry_receiver_stats(
    h: *mut c_void,
    out_total: *mut u64,
    out_count: *mut u64,
    out_duplicates: *mut u64,
    out_errors: *mut u64,
) -> c_int {
    if h.is_null()
        || out_total.is_null()
        || out_count.is_null()
        || out_duplicates.is_null()
        || out_errors.is_null()
    {
        return ERR_ARGS;
    }
    let rx = unsafe { &*(h as *const Receiver) };
    let Some(stats) = rx.session.stats() else {
        return ERR_ARGS;
    };
    unsafe {
        *out_total = stats.total;
        *out_count = stats.count;
        *out_duplicates = stats.duplicates;
        *out_errors = stats.errors;
    }
    0
}

/// Write up to `cap` missing indices (ascending) into out_buf. Returns the total number missing
/// (may exceed `cap`), or -1 if idle.
#[no_mangle]
pub extern "C" fn qrferry_receiver_missing(h: *mut c_void, out_buf: *mut u64, cap: usize) -> c_int {
    if h.is_null() {
        return ERR_ARGS;
    }
    let rx = unsafe { &*(h as *const Receiver) };
    let Some(missing) = rx.session.find_missing() else {
        return ERR_ARGS;
    };
    let n = missing.len().min(cap);
    if n > 0 {
        if out_buf.is_null() {
            return ERR_ARGS;
        }
        unsafe {
            out_buf.copy_from_nonoverlapping(missing.as_ptr(), n);
        }
    }
    missing.len().min(c_int::MAX as usize) as c_int
}

/// Write the recovery JSON (for the host to render as a QR code). Returns bytes written or -1.
#[no_mangle]
pub extern "C" fn qrferry_receiver_recovery_json(
    h: *mut c_void,
    out_buf: *mut u8,
    out_buf_len: usize,
) -> c_int {
    if h.is_null() {
        return ERR_ARGS;
    }
    let rx = unsafe { &*(h as *const Receiver) };
    let Some(req) = rx.session.recovery_request() else {
        return ERR_ARGS;
    };
    match encode_message(&Message::Recovery(req)) {
        Ok(json) => copy_out(json.as_bytes(), out_buf, out_buf_len),
        Err(_) => ERR_ARGS,
    }
}

/// Length of the completed file, or -1 if none.
#[no_mangle]
pub extern "C" fn qrferry_receiver_file_len(h: *mut c_void) -> i64 {
    if h.is_null() {
        return -1;
    }
    let rx = unsafe { &*(h as *const Receiver) };
    rx.completed.as_ref().map(|d| d.len() as i64).unwrap_or(-1)
}

/// Copy the completed file into out_buf. Returns bytes written, or -1 if none or too small.
#[no_mangle]
pub extern "C" fn qrferry_receiver_copy_file(
    h: *mut c_void,
    out_buf: *mut u8,
    out_buf_len: usize,
) -> c_int {
    if h.is_null() {
        return ERR_ARGS;
    }
    let rx = unsafe { &*(h as *const Receiver) };
    match &rx.completed {
        Some(data) => copy_out(data, out_buf, out_buf_len),
        None => ERR_ARGS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::split_with_size;

    #[test]
    fn receive_through_c_abi() {
        let data = b"air-gapped payload".to_vec();
        let set = split_with_size("p.txt", &data, 5).unwrap();
        let info = encode_message(&set.announcement()).unwrap();

        let h = qrferry_receiver_create();
        let frame = &set.frames[0].bytes;
        assert_eq!(
            qrferry_receiver_scan(h, frame.as_ptr(), frame.len()),
            ERR_NOT_ANNOUNCED
        );
        assert_eq!(
            qrferry_receiver_scan(h, info.as_ptr(), info.len()),
            SCAN_ANNOUNCED
        );
        for f in set.frames.iter().skip(1) {
            assert_eq!(qrferry_receiver_scan(h, f.bytes.as_ptr(), f.bytes.len()), SCAN_ACCEPTED);
        }

        let mut missing = [0u64; 8];
        assert_eq!(qrferry_receiver_missing(h, missing.as_mut_ptr(), missing.len()), 1);
        assert_eq!(missing[0], 0);

        let mut json = vec![0u8; 256];
        let n = qrferry_receiver_recovery_json(h, json.as_mut_ptr(), json.len());
        assert!(n > 0);
        let text = std::str::from_utf8(&json[..n as usize]).unwrap();
        assert!(text.contains(r#""missingChunks":[0]"#));

        assert_eq!(
            qrferry_receiver_scan(h, frame.as_ptr(), frame.len()),
            SCAN_COMPLETED
        );
        let (mut t, mut c, mut d, mut e) = (0u64, 0u64, 0u64, 0u64);
        assert_eq!(qrferry_receiver_stats(h, &mut t, &mut c, &mut d, &mut e), 0);
        assert_eq!((c, d, e), (set.frames.len() as u64, 0, 0));

        assert_eq!(qrferry_receiver_file_len(h), data.len() as i64);
        let mut out = vec![0u8; data.len()];
        assert_eq!(
            qrferry_receiver_copy_file(h, out.as_mut_ptr(), out.len()),
            data.len() as c_int
        );
        assert_eq!(out, data);
        assert_eq!(qrferry_receiver_copy_file(h, out.as_mut_ptr(), 2), ERR_ARGS);

        assert_eq!(qrferry_receiver_reset(h), 0);
        assert_eq!(qrferry_receiver_file_len(h), -1);
        qrferry_receiver_destroy(h);
    }

    #[test]
    fn oversized_announcement_is_a_bad_message() {
        let info = format!(
            r#"{{"type":"fileInfo","fileHash":"{}","fileName":"x","fileSize":{max},"totalChunks":{max},"chunkSize":1}}"#,
            crate::integrity::hash_bytes(b"x").to_hex(),
            max = u64::MAX
        );
        let h = qrferry_receiver_create();
        assert_eq!(
            qrferry_receiver_scan(h, info.as_ptr(), info.len()),
            ERR_BAD_MESSAGE
        );
        assert_eq!(qrferry_receiver_missing(h, std::ptr::null_mut(), 0), ERR_ARGS);
        qrferry_receiver_destroy(h);
    }

    #[test]
    fn null_handles_are_rejected() {
        assert_eq!(qrferry_receiver_scan(std::ptr::null_mut(), [0u8].as_ptr(), 1), ERR_ARGS);
        assert_eq!(qrferry_receiver_file_len(std::ptr::null_mut()), -1);
        qrferry_receiver_destroy(std::ptr::null_mut());
    }
}
