//! Seat (spec.md §3): a compositor input-group handle. Only the capability
//! mask and name matter here; one seat is selected to bind the virtual
//! keyboard, others are retained for diagnostics only (spec.md §4.2's
//! "owned ordered sequence" re-architecture note applies equally to seats).

use wayland_client::protocol::wl_seat::Capability;

#[derive(Debug, Clone)]
pub struct Seat {
    pub name: String,
    pub capabilities: Capability,
}

/// Prefers the first seat advertising a keyboard; falls back to the first
/// seat at all, since the virtual keyboard manager only needs *a* seat to
/// bind to (a seat lacking hardware keyboard capability can still back a
/// virtual one).
pub fn select_seat(seats: &[Seat]) -> Option<&Seat> {
    seats
        .iter()
        .find(|s| s.capabilities.contains(Capability::Keyboard))
        .or_else(|| seats.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_seat_with_keyboard_capability() {
        let seats = vec![
            Seat { name: "seat0".into(), capabilities: Capability::Pointer },
            Seat { name: "seat1".into(), capabilities: Capability::Keyboard },
        ];
        assert_eq!(select_seat(&seats).unwrap().name, "seat1");
    }

    #[test]
    fn falls_back_to_first_seat() {
        let seats = vec![Seat { name: "seat0".into(), capabilities: Capability::Pointer }];
        assert_eq!(select_seat(&seats).unwrap().name, "seat0");
    }

    #[test]
    fn empty_list_selects_nothing() {
        assert!(select_seat(&[]).is_none());
    }
}
