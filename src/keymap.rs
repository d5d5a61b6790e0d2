//! XKB keymap/state (part of C5). Wraps `xkbcommon`'s keymap compiler and
//! keyboard state machine: keysym -> keycode/level search, and
//! depressed/latched/locked/effective modifier mask tracking.
//!
//! Grounded on `original_source/keymap.c` for the search algorithm (walk
//! every keycode/level looking for a matching symbol) and on
//! `lamco-admin-wayland-rdp`'s `wlr_direct/keyboard.rs` for the idiomatic
//! `xkbcommon` crate calls (`xkb::Context`, `xkb::Keymap::new_from_names`,
//! `get_as_string`). Unlike the original's ad hoc incremental table, we
//! compile a real keymap so `xkb::State` can track modifiers (spec.md §4.5's
//! supplement).

use xkbcommon::xkb;

use crate::error::{Result, WvncError};

/// Depressed/latched/locked modifier masks plus effective group, forwarded
/// to the virtual keyboard's `modifiers` event verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub depressed: u32,
    pub latched: u32,
    pub locked: u32,
    pub group: u32,
}

pub struct Keymap {
    keymap: xkb::Keymap,
    state: xkb::State,
    min_keycode: xkb::Keycode,
    max_keycode: xkb::Keycode,
}

impl Keymap {
    /// Synthesizes a default "us" keymap. Used when the seat has no
    /// keyboard capability to adopt one from (spec.md §4.5 source (b)).
    pub fn synthesize_default() -> Result<Self> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keymap = xkb::Keymap::new_from_names(
            &context,
            "",
            "",
            "us",
            "",
            None,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or(WvncError::XkbKeymap)?;
        Ok(Self::from_compiled(keymap))
    }

    /// Adopts a keymap the compositor handed us over a `wl_keyboard.keymap`
    /// event's file descriptor (source (a)): the bytes are a
    /// nul-terminated XKB text-format keymap, mmap'd by the caller.
    pub fn from_compositor_bytes(context: &xkb::Context, bytes: &[u8]) -> Result<Self> {
        let keymap = xkb::Keymap::new_from_string(
            context,
            std::str::from_utf8(bytes).map_err(|_| WvncError::XkbKeymap)?.to_string(),
            xkb::KEYMAP_FORMAT_TEXT_V1,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or(WvncError::XkbKeymap)?;
        Ok(Self::from_compiled(keymap))
    }

    fn from_compiled(keymap: xkb::Keymap) -> Self {
        let state = xkb::State::new(&keymap);
        let min_keycode = keymap.min_keycode();
        let max_keycode = keymap.max_keycode();
        Keymap { keymap, state, min_keycode, max_keycode }
    }

    /// The keymap's text-format representation, uploaded verbatim to the
    /// virtual keyboard channel.
    pub fn as_xkb_text(&self) -> String {
        self.keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1)
    }

    /// Step 1 of spec.md §4.5's key-down/up processing: walk every keycode
    /// and level looking for one whose bound symbol equals `sym`. O(keycodes
    /// x levels); caching by keysym is permitted by the design notes but not
    /// implemented here since the keymap never changes mid-session.
    pub fn find_keycode(&self, sym: xkb::Keysym) -> Option<(xkb::Keycode, xkb::LevelIndex)> {
        for keycode in self.min_keycode..=self.max_keycode {
            let num_levels = self.keymap.num_levels_for_key(keycode, 0);
            for level in 0..num_levels {
                let syms = self.keymap.key_get_syms_by_level(keycode, 0, level);
                if syms.contains(&sym) {
                    return Some((keycode, level));
                }
            }
        }
        None
    }

    /// The virtual-keyboard wire keycode: the XKB keycode minus the
    /// keymap's own base, re-offset by one (spec.md §4.5 step 2).
    pub fn wire_keycode(&self, keycode: xkb::Keycode) -> u32 {
        keycode - self.min_keycode + 1
    }

    /// Feeds a press/release into the XKB state machine and returns the new
    /// modifier masks if any of depressed/latched/locked/effective changed.
    pub fn update_key(&mut self, keycode: xkb::Keycode, pressed: bool) -> Option<Modifiers> {
        let direction = if pressed { xkb::KeyDirection::Down } else { xkb::KeyDirection::Up };
        let changed = self.state.update_key(keycode, direction);
        if changed.0 == 0 {
            return None;
        }
        Some(Modifiers {
            depressed: self.state.serialize_mods(xkb::STATE_MODS_DEPRESSED),
            latched: self.state.serialize_mods(xkb::STATE_MODS_LATCHED),
            locked: self.state.serialize_mods(xkb::STATE_MODS_LOCKED),
            group: self.state.serialize_layout(xkb::STATE_LAYOUT_EFFECTIVE),
        })
    }

    pub fn current_modifiers(&self) -> Modifiers {
        Modifiers {
            depressed: self.state.serialize_mods(xkb::STATE_MODS_DEPRESSED),
            latched: self.state.serialize_mods(xkb::STATE_MODS_LATCHED),
            locked: self.state.serialize_mods(xkb::STATE_MODS_LOCKED),
            group: self.state.serialize_layout(xkb::STATE_LAYOUT_EFFECTIVE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_keymap_round_trips_to_xkb_text() {
        let keymap = Keymap::synthesize_default().expect("requires system XKB data files");
        let text = keymap.as_xkb_text();
        assert!(text.contains("xkb_keymap"));
    }

    #[test]
    fn lookup_finds_a_lowercase_letter() {
        let keymap = Keymap::synthesize_default().expect("requires system XKB data files");
        let sym = xkb::keysym_from_name("a", xkb::KEYSYM_NO_FLAGS);
        assert!(keymap.find_keycode(sym).is_some());
    }

    #[test]
    fn lookup_of_an_unbound_symbol_returns_none() {
        let keymap = Keymap::synthesize_default().expect("requires system XKB data files");
        // An unassigned private-use-area keysym should not be bound by "us".
        assert!(keymap.find_keycode(0x10ffff).is_none());
    }

    #[test]
    fn modifier_mask_returns_to_baseline_after_balanced_press_release() {
        let mut keymap = Keymap::synthesize_default().expect("requires system XKB data files");
        let shift_sym = xkb::keysym_from_name("Shift_L", xkb::KEYSYM_NO_FLAGS);
        let (keycode, _level) = keymap.find_keycode(shift_sym).expect("us layout has Shift_L");

        let baseline = keymap.current_modifiers();
        keymap.update_key(keycode, true);
        let after_up = {
            keymap.update_key(keycode, false);
            keymap.current_modifiers()
        };
        assert_eq!(after_up, baseline);
    }
}
