use std::ffi::CString;
use std::net::Ipv4Addr;
use std::os::raw::c_int;

use crate::error::{Result, WvncError};
use crate::rfb::sys::{
    self, RfbKbdAddEventProcPtr, RfbNewClientHookPtr, RfbPtrAddEventProcPtr, RfbScreenInfoPtr,
};

/// Safe-ish wrapper around a `rfbScreenInfo`. Owns the pixel buffer handed to
/// libvncserver as `frameBuffer`; the buffer must never move or be resized
/// for the lifetime of the server, since the C side holds a raw pointer into
/// it.
pub struct RfbServer {
    screen: RfbScreenInfoPtr,
    framebuffer: Box<[u8]>,
    width: u32,
    height: u32,
}

impl RfbServer {
    /// Creates and initializes the RFB server for a framebuffer of
    /// `width`x`height` RGBA8888 pixels, listening on `port`. The three
    /// callbacks are the raw `rfbNewClientHookPtr`/`rfbKbdAddEventProcPtr`/
    /// `rfbPtrAddEventProcPtr` the engine registers; see `crate::eventloop`
    /// for the single process-wide pointer they use to reach engine state
    /// (spec §9's re-architecture note).
    pub fn new(
        width: u32,
        height: u32,
        bind: Ipv4Addr,
        port: u16,
        new_client_hook: RfbNewClientHookPtr,
        kbd_hook: RfbKbdAddEventProcPtr,
        ptr_hook: RfbPtrAddEventProcPtr,
    ) -> Result<Self> {
        let mut framebuffer = vec![0u8; width as usize * height as usize * 4].into_boxed_slice();

        let screen = unsafe {
            sys::rfbGetScreen(
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                width as c_int,
                height as c_int,
                8,
                3,
                4,
            )
        };
        if screen.is_null() {
            return Err(WvncError::RfbInit);
        }

        let desktop_name = CString::new("wvnc").expect("static string has no interior nul");
        // in_addr_t's in-memory byte layout is the dotted-quad octets in
        // order on every platform ("network byte order"); from_ne_bytes
        // reproduces that layout without an extra swap on little-endian
        // hosts.
        let listen_interface = u32::from_ne_bytes(bind.octets());

        unsafe {
            sys::wvnc_rfb_configure(
                screen,
                desktop_name.as_ptr(),
                listen_interface,
                port as c_int,
                std::ptr::null_mut(),
                new_client_hook,
                kbd_hook,
                ptr_hook,
                framebuffer.as_mut_ptr() as *mut _,
            );
            sys::rfbInitServer(screen);
        }

        Ok(Self { screen, framebuffer, width, height })
    }

    pub fn framebuffer_mut(&mut self) -> &mut [u8] {
        &mut self.framebuffer
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Reports `[x1, x2) x [y1, y2)` as modified since the last update.
    pub fn mark_modified(&mut self, x1: u32, y1: u32, x2: u32, y2: u32) {
        unsafe {
            sys::rfbMarkRectAsModified(
                self.screen,
                x1 as c_int,
                y1 as c_int,
                x2 as c_int,
                y2 as c_int,
            );
        }
    }

    /// Drains any pending client I/O without blocking.
    pub fn pump(&mut self) {
        unsafe {
            sys::rfbProcessEvents(self.screen, 0);
        }
    }

    /// Blocks until either `wayland_fd` or one of the RFB server's own
    /// descriptors becomes readable, or `timeout_usec` elapses. Returns
    /// which side(s) woke the wait.
    pub fn wait_fds(&mut self, wayland_fd: c_int, timeout_usec: i64) -> FdReady {
        let bits = unsafe { sys::wvnc_wait_fds(self.screen, wayland_fd, timeout_usec) };
        FdReady {
            wayland: bits & sys::WVNC_FD_WAYLAND != 0,
            rfb: bits & sys::WVNC_FD_RFB != 0,
        }
    }
}

impl Drop for RfbServer {
    fn drop(&mut self) {
        unsafe {
            sys::rfbShutdownServer(self.screen, 1);
            sys::rfbScreenCleanup(self.screen);
        }
    }
}

pub struct FdReady {
    pub wayland: bool,
    pub rfb: bool,
}
