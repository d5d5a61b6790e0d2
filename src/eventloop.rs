//! Event loop (C7): the single-threaded cooperative driver tying every
//! other module together, plus the process-wide engine pointer the RFB
//! callbacks need (libvncserver calls back through plain C function
//! pointers with no room for a Rust closure environment).
//!
//! Grounded on `original_source/main.c`'s combined-wait loop (capture
//! pacing, `select()` over the Wayland fd and the RFB fd set, `rfbProcessEvents`)
//! and on the teacher's `sync_roundtrip`/`dispatch` usage for draining the
//! Wayland event queue.

use std::cell::RefCell;
use std::os::raw::c_int;
use std::os::unix::io::IntoRawFd;
use std::time::{Duration, Instant};

use wayland_client::Main;
use xkbcommon::xkb;

use crate::capture::CaptureSession;
use crate::config::CmdArgs;
use crate::error::{Result, WvncError};
use crate::fbtransform::apply_damage;
use crate::keyboard::{KeyboardTranslator, VirtualKeyboardSink};
use crate::keymap::Keymap;
use crate::output::{logical_screen_rect, select_output, LogicalScreenRect, Output};
use crate::pointer;
use crate::rfb::sys::{RfbClientPtr, RFB_CLIENT_ACCEPT};
use crate::rfb::RfbServer;
use crate::seat::select_seat;
use crate::uinputdev::UinputDevice;
use crate::wayland_app::WaylandApp;

/// Module-level pointer to the one live `Engine`, set for the duration of
/// `run` and read only from the RFB callbacks below, which always execute
/// synchronously inside `RfbServer::pump`/`wait_fds` on this same thread.
static mut ENGINE_PTR: *mut Engine = std::ptr::null_mut();

struct WaylandKeyboardSink {
    proto: Main<wayland_protocols::unstable::virtual_keyboard::v1::client::zwp_virtual_keyboard_v1::ZwpVirtualKeyboardV1>,
}

impl VirtualKeyboardSink for WaylandKeyboardSink {
    fn upload_keymap(&self, fd: std::os::fd::OwnedFd, size: u32) {
        use wayland_protocols::unstable::virtual_keyboard::v1::client::zwp_virtual_keyboard_v1::KeymapFormat;
        self.proto.keymap(KeymapFormat::XkbV1, fd.into_raw_fd(), size);
    }
    fn key(&self, time: u32, keycode: u32, pressed: bool) {
        self.proto.key(time, keycode, pressed as u32);
    }
    fn modifiers(&self, depressed: u32, latched: u32, locked: u32, group: u32) {
        self.proto.modifiers(depressed, latched, locked, group);
    }
}

struct PointerState {
    prev_mask: u8,
}

pub struct Engine {
    wayland: WaylandApp,
    capture: CaptureSession,
    rfb: RfbServer,
    keyboard: KeyboardTranslator,
    keyboard_sink: WaylandKeyboardSink,
    uinput: Option<UinputDevice>,
    pointer_state: RefCell<PointerState>,
    output: Output,
    screen_rect: LogicalScreenRect,
    period: Duration,
    last_capture: Instant,
}

/// Starts capturing `output`, spins up the virtual keyboard and RFB server,
/// and runs the cooperative loop until the process is killed.
pub fn run(args: CmdArgs) -> Result<()> {
    let wayland = WaylandApp::connect()?;
    let output = select_output(&wayland.outputs, args.output.as_deref())?.clone();
    let screen_rect =
        logical_screen_rect(&wayland.outputs).ok_or_else(|| WvncError::OutputNotFound(None))?;

    // `wayland.outputs` and `wayland.wl_outputs` are built in lockstep
    // (discover_output is called once per wl_outputs entry, in order), so
    // the selected Output's index identifies its live protocol object too.
    let output_index = wayland.outputs.iter().position(|o| o.name == output.name).expect("selected output came from wayland.outputs");
    let wl_output = wayland.wl_outputs[output_index].clone();

    let capture = CaptureSession::new(wayland.screencopy_manager.clone(), wayland.shm.clone(), (*wl_output).clone());

    let seat_index = select_seat(&wayland.seats)
        .and_then(|seat| wayland.seats.iter().position(|s| s.name == seat.name))
        .unwrap_or(0);
    let seat_handle = wayland.wl_seats.get(seat_index).expect("compositor advertises at least one seat");
    let virtual_keyboard = wayland.virtual_keyboard_manager.create_virtual_keyboard(seat_handle);
    let keyboard_sink = WaylandKeyboardSink { proto: virtual_keyboard };
    let keymap = Keymap::synthesize_default()?;
    let keyboard = KeyboardTranslator::new(keymap, &keyboard_sink)?;

    let uinput = if args.no_uinput { None } else { Some(UinputDevice::open()?) };

    let rfb = RfbServer::new(
        output.width,
        output.height,
        args.bind,
        args.port,
        new_client_hook,
        kbd_add_event,
        ptr_add_event,
    )?;

    let mut engine = Engine {
        wayland,
        capture,
        rfb,
        keyboard,
        keyboard_sink,
        uinput,
        pointer_state: RefCell::new(PointerState { prev_mask: 0 }),
        output,
        screen_rect,
        period: Duration::from_millis(args.period),
        last_capture: Instant::now() - Duration::from_secs(1),
    };

    unsafe {
        ENGINE_PTR = &mut engine as *mut Engine;
    }

    engine.main_loop()
}

impl Engine {
    fn main_loop(&mut self) -> Result<()> {
        let prev_frame_orientation = self.output.orientation;
        let mut prev_pixels: Option<Vec<u8>> = None;
        let mut capturing = false;

        loop {
            self.rfb.pump();

            if !capturing && self.last_capture.elapsed() >= self.period {
                self.capture.request_frame();
                capturing = true;
                self.last_capture = Instant::now();
            }

            // Every request queued this iteration (capture_output, frame.copy,
            // injected key/pointer events, the keymap upload) sits in the
            // display's write buffer until flushed; dispatch_pending alone
            // never sends anything and never reads the socket either.
            if let Err(e) = self.wayland.display.flush() {
                if e.kind() != std::io::ErrorKind::WouldBlock {
                    return Err(e.into());
                }
            }

            let wayland_fd = self.wayland.display.get_connection_fd();
            let ready = self.rfb.wait_fds(wayland_fd, self.period.as_micros() as i64);

            if ready.wayland {
                // prepare_read returns None when events are already queued
                // and unread, in which case we must not attempt another
                // socket read before draining those.
                if let Some(guard) = self.wayland.event_queue.prepare_read() {
                    guard.read_events()?;
                }
                self.wayland.event_queue.dispatch_pending(&mut (), |_, _, _| ())?;
            }

            if capturing {
                match self.capture.poll() {
                    Ok(Some(frame)) => {
                        let rects = apply_damage(
                            prev_pixels.as_deref(),
                            frame.data,
                            frame.width,
                            frame.height,
                            frame.stride,
                            prev_frame_orientation,
                            self.output.width,
                            self.output.height,
                            self.rfb.framebuffer_mut(),
                        );
                        for r in rects {
                            self.rfb.mark_modified(r.x, r.y, r.x + r.w, r.y + r.h);
                        }
                        prev_pixels = Some(frame.data.to_vec());
                        capturing = false;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        log::error!("capture failed: {e}");
                        capturing = false;
                    }
                }
            }
        }
    }

    fn handle_key(&mut self, down: bool, sym: u32, _client: RfbClientPtr) {
        let time = 0;
        self.keyboard.handle_key(time, sym as xkb::Keysym, down, &self.keyboard_sink);
    }

    fn handle_pointer(&self, mask: u8, x: i32, y: i32) {
        let prev_mask = {
            let state = self.pointer_state.borrow();
            state.prev_mask
        };
        let events = pointer::translate(
            self.screen_rect,
            self.output.width,
            self.output.height,
            self.output.x,
            self.output.y,
            x,
            y,
            mask,
            prev_mask,
        );
        self.pointer_state.borrow_mut().prev_mask = mask;

        if let Some(uinput) = &self.uinput {
            for event in events {
                if let Err(e) = uinput.apply(event) {
                    log::warn!("uinput write failed: {e}");
                }
            }
        }
    }
}

unsafe extern "C" fn new_client_hook(_cl: RfbClientPtr) -> c_int {
    RFB_CLIENT_ACCEPT
}

unsafe extern "C" fn kbd_add_event(down: c_int, key: u32, cl: RfbClientPtr) {
    if let Some(engine) = ENGINE_PTR.as_mut() {
        engine.handle_key(down != 0, key, cl);
    }
}

unsafe extern "C" fn ptr_add_event(button_mask: c_int, x: c_int, y: c_int, _cl: RfbClientPtr) {
    if let Some(engine) = ENGINE_PTR.as_mut() {
        engine.handle_pointer(button_mask as u8, x, y);
    }
}
