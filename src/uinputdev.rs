//! Synthetic pointer device (C6): a `/dev/uinput` device presenting an
//! absolute pointer, three buttons, and a wheel.
//!
//! Grounded algorithmically on `original_source/uinput.c` (same event bit
//! sets, same `UI_ABS_SETUP` range, same "wvnc-device"/`BUS_VIRTUAL"
//! identity, same settling sleep); expressed through the `input-linux`
//! crate's device-setup/event-write API rather than hand-rolled ioctls.

use std::fs::OpenOptions;
use std::time::Duration;

use input_linux::{
    AbsoluteAxis, AbsoluteInfo, AbsoluteInfoSetup, EventKind, InputEvent, InputId, Key,
    RelativeAxis, SynchronizeEvent, UInputHandle,
};

use crate::error::Result;
use crate::pointer::{Button, PointerEvent, ABS_MAX};

const BUS_VIRTUAL: u16 = 0x06;
const SETTLE_DELAY: Duration = Duration::from_millis(500);

pub struct UinputDevice {
    handle: UInputHandle<std::fs::File>,
}

impl UinputDevice {
    pub fn open() -> Result<Self> {
        let file = OpenOptions::new().write(true).open("/dev/uinput")?;
        let handle = UInputHandle::new(file);

        handle.set_evbit(EventKind::Key)?;
        handle.set_keybit(Key::ButtonLeft)?;
        handle.set_keybit(Key::ButtonMiddle)?;
        handle.set_keybit(Key::ButtonRight)?;

        handle.set_evbit(EventKind::Absolute)?;
        handle.set_absbit(AbsoluteAxis::X)?;
        handle.set_absbit(AbsoluteAxis::Y)?;

        handle.set_evbit(EventKind::Relative)?;
        handle.set_relbit(RelativeAxis::Wheel)?;

        let id = InputId { bustype: BUS_VIRTUAL, vendor: 0, product: 0, version: 1 };
        let axis_info = AbsoluteInfo { value: 0, minimum: 0, maximum: ABS_MAX, fuzz: 0, flat: 0, resolution: 0 };
        let abs_setup = [
            AbsoluteInfoSetup { axis: AbsoluteAxis::X, info: axis_info },
            AbsoluteInfoSetup { axis: AbsoluteAxis::Y, info: axis_info },
        ];
        handle.create(&id, b"wvnc-device", 0, &abs_setup)?;

        // Without this, compositors/input stacks sometimes ignore the
        // device entirely (observed behavior, not documented anywhere).
        std::thread::sleep(SETTLE_DELAY);

        Ok(UinputDevice { handle })
    }

    /// Applies one translated pointer event. Failures are the caller's to
    /// log-and-ignore (spec.md §7's "synthetic-device write failure").
    pub fn apply(&self, event: PointerEvent) -> Result<()> {
        let time = Default::default();
        match event {
            PointerEvent::Move { x, y } => {
                self.handle.write(&[
                    *InputEvent::from(input_linux::AbsoluteEvent::new(time, AbsoluteAxis::X, x)).as_ref(),
                    *InputEvent::from(input_linux::AbsoluteEvent::new(time, AbsoluteAxis::Y, y)).as_ref(),
                    *InputEvent::from(SynchronizeEvent::report(time)).as_ref(),
                ])?;
            }
            PointerEvent::Button { button, pressed } => {
                let key = match button {
                    Button::Left => Key::ButtonLeft,
                    Button::Middle => Key::ButtonMiddle,
                    Button::Right => Key::ButtonRight,
                };
                let state = if pressed {
                    input_linux::KeyState::PRESSED
                } else {
                    input_linux::KeyState::RELEASED
                };
                self.handle.write(&[
                    *InputEvent::from(input_linux::KeyEvent::new(time, key, state)).as_ref(),
                    *InputEvent::from(SynchronizeEvent::report(time)).as_ref(),
                ])?;
            }
            PointerEvent::Wheel { delta } => {
                self.handle.write(&[
                    *InputEvent::from(input_linux::RelativeEvent::new(time, RelativeAxis::Wheel, delta)).as_ref(),
                    *InputEvent::from(SynchronizeEvent::report(time)).as_ref(),
                ])?;
            }
        }
        Ok(())
    }
}

impl Drop for UinputDevice {
    fn drop(&mut self) {
        if let Err(e) = self.handle.dev_destroy() {
            log::warn!("failed to destroy uinput device: {e}");
        }
    }
}
