//! Output registry (C2): discovered display state and the pure selection /
//! bounding-box logic around it. The live Wayland listener wiring (registry
//! announcements, `zxdg_output_v1` geometry/logical-size/logical-position/
//! name callbacks) lives in `wayland_app`; this module is kept free of
//! Wayland types so it is plainly unit-testable.
//!
//! Grounded on `original_source/main.c`'s output/xdg_output listeners and
//! the teacher's output enumeration in `screenshot::wayland`.

use crate::error::{Result, WvncError};

/// Orientation as reported by `wl_output`'s geometry event. Flipped variants
/// are a non-goal (spec.md §9): an output reporting one is an unsupported
/// configuration and discovery fails for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Orientation {
    pub fn from_wl_transform(t: wayland_client::protocol::wl_output::Transform) -> Result<Self> {
        use wayland_client::protocol::wl_output::Transform;
        match t {
            Transform::Normal => Ok(Orientation::Normal),
            Transform::_90 => Ok(Orientation::Rotate90),
            Transform::_180 => Ok(Orientation::Rotate180),
            Transform::_270 => Ok(Orientation::Rotate270),
            other => Err(WvncError::UnknownOrientation(other)),
        }
    }
}

/// A discovered display, immutable once its logical geometry round-trip
/// completes (spec.md §3's Output invariant).
#[derive(Debug, Clone)]
pub struct Output {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
}

/// Union bounding box of every discovered output's logical rectangle, used
/// to normalize pointer coordinates (C6) and size the RFB framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalScreenRect {
    pub width: u32,
    pub height: u32,
}

pub fn logical_screen_rect(outputs: &[Output]) -> Option<LogicalScreenRect> {
    if outputs.is_empty() {
        return None;
    }
    let min_x = outputs.iter().map(|o| o.x).min().unwrap();
    let min_y = outputs.iter().map(|o| o.y).min().unwrap();
    let max_x = outputs.iter().map(|o| o.x + o.width as i32).max().unwrap();
    let max_y = outputs.iter().map(|o| o.y + o.height as i32).max().unwrap();
    Some(LogicalScreenRect {
        width: (max_x - min_x) as u32,
        height: (max_y - min_y) as u32,
    })
}

/// Selection policy (spec.md §4.2): exactly one output picks itself;
/// multiple outputs require a matching `--output` name.
pub fn select_output<'a>(outputs: &'a [Output], requested: Option<&str>) -> Result<&'a Output> {
    match requested {
        Some(name) => outputs
            .iter()
            .find(|o| o.name == name)
            .ok_or_else(|| WvncError::OutputNotFound(Some(name.to_string()))),
        None => match outputs.len() {
            0 => Err(WvncError::OutputNotFound(None)),
            1 => Ok(&outputs[0]),
            _ => Err(WvncError::OutputAmbiguous),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(name: &str, x: i32, y: i32, w: u32, h: u32) -> Output {
        Output { name: name.into(), x, y, width: w, height: h, orientation: Orientation::Normal }
    }

    #[test]
    fn single_output_is_picked_without_a_name() {
        let outputs = vec![output("DP-1", 0, 0, 1920, 1080)];
        let picked = select_output(&outputs, None).unwrap();
        assert_eq!(picked.name, "DP-1");
    }

    #[test]
    fn multiple_outputs_require_a_name() {
        let outputs = vec![output("DP-1", 0, 0, 1920, 1080), output("DP-2", 1920, 0, 1920, 1080)];
        assert!(matches!(select_output(&outputs, None), Err(WvncError::OutputAmbiguous)));
        let picked = select_output(&outputs, Some("DP-2")).unwrap();
        assert_eq!(picked.x, 1920);
    }

    #[test]
    fn unresolvable_name_fails() {
        let outputs = vec![output("DP-1", 0, 0, 1920, 1080)];
        assert!(matches!(
            select_output(&outputs, Some("DP-9")),
            Err(WvncError::OutputNotFound(Some(_)))
        ));
    }

    #[test]
    fn bounding_box_spans_side_by_side_outputs() {
        let outputs = vec![output("DP-1", 0, 0, 1920, 1080), output("DP-2", 1920, 0, 1280, 1024)];
        let rect = logical_screen_rect(&outputs).unwrap();
        assert_eq!(rect.width, 3200);
        assert_eq!(rect.height, 1080);
    }

    #[test]
    fn bounding_box_handles_negative_origin() {
        let outputs = vec![output("DP-1", -1920, 0, 1920, 1080), output("DP-2", 0, 0, 1920, 1080)];
        let rect = logical_screen_rect(&outputs).unwrap();
        assert_eq!(rect.width, 3840);
        assert_eq!(rect.height, 1080);
    }
}
