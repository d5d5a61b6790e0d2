//! Keyboard translator (C5): turns RFB keysym events into
//! `zwp_virtual_keyboard_v1` keymap uploads and key/modifier events.
//!
//! The live protocol object is hidden behind `VirtualKeyboardSink` so the
//! lookup/translation logic (spec.md §4.5 steps 1-3) is unit-testable
//! without a Wayland connection. Grounded on
//! `lamco-admin-wayland-rdp/wlr_direct/keyboard.rs` for the keymap-upload
//! shape (memfd + size) and on `original_source/keymap.c` for the
//! keycode-search/modifier-forwarding algorithm.

use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use nix::errno::Errno;
use nix::sys::memfd::{memfd_create, MemFdCreateFlag};
use nix::unistd;
use xkbcommon::xkb;

use crate::error::{Result, WvncError};
use crate::keymap::{Keymap, Modifiers};

/// The wire-level operations a virtual keyboard protocol object exposes.
/// Implemented for the real `zwp_virtual_keyboard_v1` in `wayland_app`.
pub trait VirtualKeyboardSink {
    fn upload_keymap(&self, fd: OwnedFd, size: u32);
    fn key(&self, time: u32, keycode: u32, pressed: bool);
    fn modifiers(&self, depressed: u32, latched: u32, locked: u32, group: u32);
}

/// Writes `text` (plus a trailing nul, per the protocol's text-format
/// requirement) into a sealed memfd and returns it with its size.
fn keymap_to_fd(text: &str) -> Result<(OwnedFd, u32)> {
    let name = CString::new("wvnc-keymap").expect("static string has no interior nul");
    let raw_fd = memfd_create(&name, MemFdCreateFlag::MFD_CLOEXEC)?;
    // nix 0.26's memfd_create still returns a bare RawFd; wrap it so the
    // descriptor is closed if we bail out before handing it to the sink.
    let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };
    let bytes = text.as_bytes();
    let mut written = 0usize;
    // A single nul terminator; the protocol requires the shared memory
    // contents to be a nul-terminated string.
    let full = [bytes, &[0u8]].concat();
    while written < full.len() {
        match unistd::write(fd.as_raw_fd(), &full[written..]) {
            Ok(n) => written += n,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok((fd, full.len() as u32))
}

/// Drives a single virtual keyboard from RFB `key` events.
pub struct KeyboardTranslator {
    keymap: Keymap,
}

impl KeyboardTranslator {
    pub fn new(keymap: Keymap, sink: &dyn VirtualKeyboardSink) -> Result<Self> {
        let translator = KeyboardTranslator { keymap };
        translator.upload_keymap(sink)?;
        Ok(translator)
    }

    fn upload_keymap(&self, sink: &dyn VirtualKeyboardSink) -> Result<()> {
        let text = self.keymap.as_xkb_text();
        let (fd, size) = keymap_to_fd(&text)?;
        sink.upload_keymap(fd, size);
        Ok(())
    }

    /// Processes one RFB keysym event (spec.md §4.5): looks the symbol up in
    /// the keymap, forwards the wire keycode, feeds the XKB state machine,
    /// and forwards a `modifiers` event if the mask changed. A symbol with
    /// no bound keycode is logged and dropped (ambient error policy).
    pub fn handle_key(&mut self, time_ms: u32, sym: xkb::Keysym, pressed: bool, sink: &dyn VirtualKeyboardSink) {
        let Some((keycode, _level)) = self.keymap.find_keycode(sym) else {
            log::warn!("no keycode bound for keysym {sym:#x}, dropping event");
            return;
        };

        let wire_keycode = self.keymap.wire_keycode(keycode);
        sink.key(time_ms, wire_keycode, pressed);

        if let Some(Modifiers { depressed, latched, locked, group }) =
            self.keymap.update_key(keycode, pressed)
        {
            sink.modifiers(depressed, latched, locked, group);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSink {
        keymap_uploads: RefCell<u32>,
        keys: RefCell<Vec<(u32, bool)>>,
        modifier_events: RefCell<u32>,
    }

    impl VirtualKeyboardSink for RecordingSink {
        fn upload_keymap(&self, _fd: OwnedFd, _size: u32) {
            *self.keymap_uploads.borrow_mut() += 1;
        }
        fn key(&self, _time: u32, keycode: u32, pressed: bool) {
            self.keys.borrow_mut().push((keycode, pressed));
        }
        fn modifiers(&self, _depressed: u32, _latched: u32, _locked: u32, _group: u32) {
            *self.modifier_events.borrow_mut() += 1;
        }
    }

    #[test]
    fn construction_uploads_exactly_one_keymap() {
        let keymap = Keymap::synthesize_default().expect("requires system XKB data files");
        let sink = RecordingSink::default();
        let _translator = KeyboardTranslator::new(keymap, &sink).unwrap();
        assert_eq!(*sink.keymap_uploads.borrow(), 1);
    }

    #[test]
    fn pressing_shift_then_a_emits_modifiers_before_the_letter_key_is_released() {
        let keymap = Keymap::synthesize_default().expect("requires system XKB data files");
        let sink = RecordingSink::default();
        let mut translator = KeyboardTranslator::new(keymap, &sink).unwrap();

        let shift = xkb::keysym_from_name("Shift_L", xkb::KEYSYM_NO_FLAGS);
        let a = xkb::keysym_from_name("A", xkb::KEYSYM_NO_FLAGS);

        translator.handle_key(0, shift, true, &sink);
        translator.handle_key(1, a, true, &sink);
        translator.handle_key(2, a, false, &sink);
        translator.handle_key(3, shift, false, &sink);

        assert_eq!(sink.keys.borrow().len(), 4);
        assert!(*sink.modifier_events.borrow() >= 2);
    }

    #[test]
    fn unbound_keysym_is_dropped_without_touching_the_sink() {
        let keymap = Keymap::synthesize_default().expect("requires system XKB data files");
        let sink = RecordingSink::default();
        let mut translator = KeyboardTranslator::new(keymap, &sink).unwrap();
        translator.handle_key(0, 0x10ffff, true, &sink);
        assert!(sink.keys.borrow().is_empty());
    }
}
