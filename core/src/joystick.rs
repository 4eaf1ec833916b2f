use crate::backend::DeviceBackend;
use crate::gateway::Gateway;
use serde::Serialize;

/// Axis ranges reported by the joystick driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct JoystickBounds {
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl JoystickBounds {
    pub fn to_slots(&self) -> [i64; 4] {
        [self.x_min as i64, self.x_max as i64, self.y_min as i64, self.y_max as i64]
    }
}

/// Raw button mask and axis readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct JoystickPos {
    pub buttons: u32,
    pub x: u32,
    pub y: u32,
}

impl JoystickPos {
    pub fn to_slots(&self) -> [i64; 3] {
        [self.buttons as i64, self.x as i64, self.y as i64]
    }
}

/// Button mask plus axes scaled to `-1.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JoystickState {
    pub buttons: u32,
    pub x: f32,
    pub y: f32,
}

/// Scales a raw axis reading into `-1.0..=1.0`; `0.0` for a degenerate range.
pub fn normalize_axis(value: u32, min: u32, max: u32) -> f32 {
    if max <= min {
        return 0.0;
    }
    let value = value.clamp(min, max);
    ((value - min) as f32 / (max - min) as f32) * 2.0 - 1.0
}

/// An attached joystick and its last observed reading.
pub struct Joystick<'g, B> {
    gateway: &'g Gateway<B>,
    index: u32,
    bounds: JoystickBounds,
    last: Option<JoystickPos>,
}

impl<'g, B: DeviceBackend> Joystick<'g, B> {
    /// Probes joystick `index`.
    ///
    /// The driver keeps reporting bounds after a pad is unplugged, so the
    /// position is queried first to confirm something is attached.
    pub fn open(gateway: &'g Gateway<B>, index: u32) -> Option<Self> {
        gateway.joystick_pos(index).ok()?;
        let bounds = gateway.joystick_bounds(index).ok()?;
        log::debug!("joystick {} bounds {:?}", index, bounds);
        Some(Self { gateway, index, bounds, last: None })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn bounds(&self) -> JoystickBounds {
        self.bounds
    }

    /// Current state, or `None` if nothing changed since the last call.
    ///
    /// An error means the pad went away.
    pub fn poll(&mut self) -> crate::Result<Option<JoystickState>> {
        let pos = self.gateway.joystick_pos(self.index)?;
        if self.last == Some(pos) {
            return Ok(None);
        }
        self.last = Some(pos);
        Ok(Some(JoystickState {
            buttons: pos.buttons,
            x: normalize_axis(pos.x, self.bounds.x_min, self.bounds.x_max),
            y: normalize_axis(pos.y, self.bounds.y_min, self.bounds.y_max),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_scaling() {
        assert_eq!(normalize_axis(0, 0, 65535), -1.0);
        assert_eq!(normalize_axis(65535, 0, 65535), 1.0);
        assert!(normalize_axis(32767, 0, 65535).abs() < 0.001);
    }

    #[test]
    fn axis_out_of_range_is_clamped() {
        assert_eq!(normalize_axis(5, 10, 20), -1.0);
        assert_eq!(normalize_axis(99, 10, 20), 1.0);
    }

    #[test]
    fn degenerate_range_is_centered() {
        assert_eq!(normalize_axis(7, 10, 10), 0.0);
        assert_eq!(normalize_axis(7, 20, 10), 0.0);
    }
}
