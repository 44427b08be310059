use crate::data_mgmt::models::{Fix, Reading};

pub mod pms5003;
pub mod position;
pub mod sensors;
pub mod shtc3;
pub mod sim7000;

/// Anything that can produce the sensor part of a tick
pub trait SensorSource: Send {
    fn read(&mut self) -> Reading;
}

/// Anything that can produce the position part of a tick. Must not fail.
pub trait PositionSource: Send {
    fn current_position(&mut self) -> Fix;
}
