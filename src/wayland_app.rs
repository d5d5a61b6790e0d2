//! Wayland connection setup: registry discovery and global binding.
//!
//! Grounded on the teacher's `platform::sway::PlatformWayland::new` for the
//! connect/registry/roundtrip sequence and the `zxdg_output_v1` listener
//! shape; extended with `wl_seat` and the virtual-keyboard manager, neither
//! of which the teacher needed.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context;
use log::{debug, info};
use wayland_client::protocol::{wl_output::WlOutput, wl_seat::WlSeat, wl_shm::WlShm};
use wayland_client::{Display, EventQueue, GlobalManager, Main};
use wayland_protocols::unstable::virtual_keyboard::v1::client::zwp_virtual_keyboard_manager_v1::ZwpVirtualKeyboardManagerV1;
use wayland_protocols::unstable::xdg_output::v1::client::zxdg_output_manager_v1::ZxdgOutputManagerV1;
use wayland_protocols::wlr::unstable::screencopy::v1::client::zwlr_screencopy_manager_v1::ZwlrScreencopyManagerV1;

use crate::error::{Result, WvncError};
use crate::output::{Orientation, Output};
use crate::seat::Seat;

const WL_OUTPUT_VERSION: u32 = 3;
const XDG_OUTPUT_VERSION: u32 = 2;
const SCREENCOPY_VERSION: u32 = 1;
const SEAT_VERSION: u32 = 7;
const VIRTUAL_KEYBOARD_VERSION: u32 = 1;
const SHM_VERSION: u32 = 1;

struct SeatData {
    name: String,
    capabilities: wayland_client::protocol::wl_seat::Capability,
}

impl Default for SeatData {
    fn default() -> Self {
        SeatData { name: String::new(), capabilities: wayland_client::protocol::wl_seat::Capability::empty() }
    }
}

impl SeatData {
    fn to_seat(&self) -> Seat {
        Seat { name: self.name.clone(), capabilities: self.capabilities }
    }
}

pub struct WaylandApp {
    pub display: Display,
    pub event_queue: EventQueue,
    pub globals: GlobalManager,
    pub outputs: Vec<Output>,
    pub wl_outputs: Vec<Main<WlOutput>>,
    pub seats: Vec<Seat>,
    pub wl_seats: Vec<Main<WlSeat>>,
    pub screencopy_manager: Main<ZwlrScreencopyManagerV1>,
    pub virtual_keyboard_manager: Main<ZwpVirtualKeyboardManagerV1>,
    pub shm: Main<WlShm>,
}

impl WaylandApp {
    pub fn connect() -> Result<Self> {
        let display = Display::connect_to_env().map_err(|_| WvncError::WaylandConnect)?;
        let mut event_queue = display.create_event_queue();
        let attached_display = (*display).clone().attach(event_queue.token());

        let wl_outputs = Rc::new(RefCell::new(Vec::new()));
        let wl_seats: Rc<RefCell<Vec<Main<WlSeat>>>> = Rc::new(RefCell::new(Vec::new()));
        let seat_data: Rc<RefCell<Vec<Rc<RefCell<SeatData>>>>> = Rc::new(RefCell::new(Vec::new()));

        let globals = GlobalManager::new_with_cb(
            &attached_display,
            wayland_client::global_filter!(
                [WlOutput, WL_OUTPUT_VERSION, {
                    let wl_outputs = wl_outputs.clone();
                    move |output: Main<WlOutput>, _: wayland_client::DispatchData| {
                        wl_outputs.borrow_mut().push(output);
                    }
                }],
                [WlSeat, SEAT_VERSION, {
                    let wl_seats = wl_seats.clone();
                    let seat_data = seat_data.clone();
                    move |seat: Main<WlSeat>, _: wayland_client::DispatchData| {
                        let index = wl_seats.borrow().len();
                        wl_seats.borrow_mut().push(seat.clone());
                        let data = Rc::new(RefCell::new(SeatData::default()));
                        seat_data.borrow_mut().push(data.clone());
                        Self::track_seat(seat, data, index);
                    }
                }]
            ),
        );

        event_queue.sync_roundtrip(&mut (), |_, _, _| unreachable!())?;
        event_queue.sync_roundtrip(&mut (), |_, _, _| ())?;

        // Bind at the spec's pinned version, but accept any compositor-
        // advertised version from 1 up to it rather than requiring an exact
        // match (instantiate_exact errors unless the global is >= the
        // requested version).
        let xdg_output_manager = globals
            .instantiate_range::<ZxdgOutputManagerV1>(1, XDG_OUTPUT_VERSION)
            .map_err(|_| WvncError::MissingProtocol("zxdg_output_manager_v1"))?;

        let mut outputs = Vec::new();
        for wl_output in wl_outputs.borrow().iter() {
            outputs.push(Self::discover_output(&mut event_queue, &xdg_output_manager, wl_output)?);
        }

        let screencopy_manager = globals
            .instantiate_range::<ZwlrScreencopyManagerV1>(1, SCREENCOPY_VERSION)
            .map_err(|_| WvncError::MissingProtocol("zwlr_screencopy_manager_v1"))?;
        let virtual_keyboard_manager = globals
            .instantiate_exact::<ZwpVirtualKeyboardManagerV1>(VIRTUAL_KEYBOARD_VERSION)
            .map_err(|_| WvncError::MissingProtocol("zwp_virtual_keyboard_manager_v1"))?;
        let shm = globals
            .instantiate_exact::<WlShm>(SHM_VERSION)
            .map_err(|_| WvncError::MissingProtocol("wl_shm"))?;

        for output in &outputs {
            info!("discovered output {} ({}x{} @ {},{})", output.name, output.width, output.height, output.x, output.y);
        }

        let seats = seat_data.borrow().iter().map(|d| d.borrow().to_seat()).collect();

        Ok(WaylandApp {
            display,
            event_queue,
            globals,
            outputs,
            wl_outputs: wl_outputs.borrow().clone(),
            seats,
            wl_seats: wl_seats.borrow().clone(),
            screencopy_manager,
            virtual_keyboard_manager,
            shm,
        })
    }

    fn track_seat(seat: Main<WlSeat>, data: Rc<RefCell<SeatData>>, _index: usize) {
        seat.quick_assign(move |_, event, _| {
            use wayland_client::protocol::wl_seat::Event;
            match event {
                Event::Name { name } => data.borrow_mut().name = name,
                Event::Capabilities { capabilities } => data.borrow_mut().capabilities = capabilities,
                _ => (),
            }
        });
    }

    fn discover_output(
        event_queue: &mut EventQueue,
        xdg_output_manager: &Main<ZxdgOutputManagerV1>,
        wl_output: &Main<WlOutput>,
    ) -> Result<Output> {
        let name = Rc::new(RefCell::new(String::new()));
        let x = Rc::new(RefCell::new(0));
        let y = Rc::new(RefCell::new(0));
        let width = Rc::new(RefCell::new(0u32));
        let height = Rc::new(RefCell::new(0u32));
        let transform = Rc::new(RefCell::new(wayland_client::protocol::wl_output::Transform::Normal));

        wl_output.quick_assign({
            let transform = transform.clone();
            move |_, event, _| {
                use wayland_client::protocol::wl_output::Event;
                if let Event::Geometry { transform: t, .. } = event {
                    *transform.borrow_mut() = t;
                }
            }
        });

        let xdg_output = xdg_output_manager.get_xdg_output(wl_output);
        xdg_output.quick_assign({
            let name = name.clone();
            let x = x.clone();
            let y = y.clone();
            let width = width.clone();
            let height = height.clone();
            move |_, event, _| {
                use wayland_protocols::unstable::xdg_output::v1::client::zxdg_output_v1::Event;
                match event {
                    Event::LogicalPosition { x: lx, y: ly } => {
                        *x.borrow_mut() = lx;
                        *y.borrow_mut() = ly;
                    }
                    Event::LogicalSize { width: w, height: h } => {
                        *width.borrow_mut() = w as u32;
                        *height.borrow_mut() = h as u32;
                    }
                    Event::Name { name: output_name } => {
                        *name.borrow_mut() = output_name;
                    }
                    _ => {}
                }
            }
        });

        event_queue
            .sync_roundtrip(&mut (), |_, _, _| unreachable!())
            .context("roundtrip while discovering output geometry")
            .map_err(|_| WvncError::WaylandConnect)?;

        debug!("resolved output {:?} transform {:?}", name.borrow(), transform.borrow());

        Ok(Output {
            name: name.take(),
            x: x.take(),
            y: y.take(),
            width: width.take(),
            height: height.take(),
            orientation: Orientation::from_wl_transform(*transform.borrow())?,
        })
    }
}
