//! Narrow `extern "C"` surface over `libvncserver`, plus the small C shim in
//! `shim.c` that pokes the handful of `rfbScreenInfo` fields we configure.
//! `rfbScreenInfoPtr`/`rfbClientPtr` are kept fully opaque on the Rust side;
//! we never read or write their fields directly, only through these
//! functions, so we never need to match the real struct layout here.

use std::os::raw::{c_char, c_int, c_void};

pub const WVNC_FD_WAYLAND: c_int = 1;
pub const WVNC_FD_RFB: c_int = 2;

/// `rfbNewClientAction::RFB_CLIENT_ACCEPT`.
pub const RFB_CLIENT_ACCEPT: c_int = 0;

/// Opaque handle to a `rfbScreenInfo`.
#[repr(C)]
pub struct RfbScreenInfo {
    _private: [u8; 0],
}
pub type RfbScreenInfoPtr = *mut RfbScreenInfo;

/// Opaque handle to a `rfbClientRec`.
#[repr(C)]
pub struct RfbClientRec {
    _private: [u8; 0],
}
pub type RfbClientPtr = *mut RfbClientRec;

pub type RfbKeySym = u32;

pub type RfbNewClientHookPtr = unsafe extern "C" fn(cl: RfbClientPtr) -> c_int;
pub type RfbKbdAddEventProcPtr = unsafe extern "C" fn(down: c_int, key: RfbKeySym, cl: RfbClientPtr);
pub type RfbPtrAddEventProcPtr = unsafe extern "C" fn(button_mask: c_int, x: c_int, y: c_int, cl: RfbClientPtr);

extern "C" {
    pub fn rfbGetScreen(
        argc: *mut c_int,
        argv: *mut *mut c_char,
        width: c_int,
        height: c_int,
        bits_per_sample: c_int,
        samples_per_pixel: c_int,
        bytes_per_pixel: c_int,
    ) -> RfbScreenInfoPtr;

    pub fn rfbInitServer(screen: RfbScreenInfoPtr);
    pub fn rfbShutdownServer(screen: RfbScreenInfoPtr, disconnect_clients: c_int) -> c_int;
    pub fn rfbScreenCleanup(screen: RfbScreenInfoPtr);
    pub fn rfbProcessEvents(screen: RfbScreenInfoPtr, usec_timeout: libc_long) -> c_int;
    pub fn rfbMarkRectAsModified(screen: RfbScreenInfoPtr, x1: c_int, y1: c_int, x2: c_int, y2: c_int);

    // shim.c
    pub fn wvnc_rfb_configure(
        screen: RfbScreenInfoPtr,
        desktop_name: *const c_char,
        listen_interface: u32,
        port: c_int,
        screen_data: *mut c_void,
        new_client_hook: RfbNewClientHookPtr,
        kbd_hook: RfbKbdAddEventProcPtr,
        ptr_hook: RfbPtrAddEventProcPtr,
        framebuffer: *mut c_char,
    );
    pub fn wvnc_client_get_data(cl: RfbClientPtr) -> *mut c_void;
    pub fn wvnc_client_set_data(cl: RfbClientPtr, data: *mut c_void);
    pub fn wvnc_wait_fds(screen: RfbScreenInfoPtr, wayland_fd: c_int, timeout_usec: libc_long) -> c_int;
}

// `long` is 64-bit on every Linux ABI we target; avoid pulling in `libc`
// purely for this one typedef.
#[allow(non_camel_case_types)]
pub type libc_long = i64;
