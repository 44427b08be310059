use std::time::Duration;

use crate::constants::defaults;
use crate::data_mgmt::models::Reading;
use crate::hal::{Connector, RegisterBus, SerialLink};
use crate::readers::pms5003::Pms5003;
use crate::readers::shtc3::Shtc3;
use crate::readers::SensorSource;

/// The sensors installed on this node. A driver whose initialisation failed
/// is left out and its fields are never reported.
pub struct SensorHub<B: Connector, S: Connector> {
    climate: Option<Shtc3<B>>,
    particulate: Option<Pms5003<S>>,
    pm_budget: Duration,
}

impl<B, S> SensorHub<B, S>
where
    B: Connector,
    B::Handle: RegisterBus,
    S: Connector,
    S::Handle: SerialLink + 'static,
{
    /// Initialise both drivers. Failures are logged and the sensor is treated as absent.
    pub fn init(climate: Shtc3<B>, particulate: Pms5003<S>) -> Self {
        let climate = match climate.initialize() {
            Ok(()) => Some(climate),
            Err(e) => {
                log::error!("SHTC3 init failed: {e}");
                None
            }
        };

        let mut particulate = particulate;
        let particulate = match particulate.initialize() {
            Ok(()) => Some(particulate),
            Err(e) => {
                log::error!("PMS5003 init failed: {e}");
                None
            }
        };

        SensorHub {
            climate,
            particulate,
            pm_budget: defaults::PM_FRAME_BUDGET,
        }
    }

    pub fn with_pm_budget(mut self, budget: Duration) -> Self {
        self.pm_budget = budget;
        self
    }

    pub fn installed(&self) -> (bool, bool) {
        (self.climate.is_some(), self.particulate.is_some())
    }

    /// Read every installed sensor. Never fails; failed sensors leave their
    /// fields empty.
    pub fn read(&mut self) -> Reading {
        let mut reading = Reading::default();

        if let Some(climate) = &self.climate {
            match climate.read_pair() {
                Ok((temperature, humidity)) => {
                    reading.temperature = Some(temperature);
                    reading.humidity = Some(humidity);
                }
                Err(e) => log::warn!("SHTC3 read error: {e}"),
            }
        }

        if let Some(particulate) = &mut self.particulate {
            match particulate.read_within(self.pm_budget) {
                Ok(pm) => {
                    reading.pm25 = Some(u32::from(pm.pm25));
                    reading.pm10 = Some(u32::from(pm.pm10));
                }
                Err(e) => log::warn!("PMS5003 read error: {e}"),
            }
        }

        if reading.is_empty() {
            log::warn!("No sensor produced a value this tick");
        }
        reading
    }
}

impl<B, S> SensorSource for SensorHub<B, S>
where
    B: Connector,
    B::Handle: RegisterBus,
    S: Connector,
    S::Handle: SerialLink + 'static,
{
    fn read(&mut self) -> Reading {
        SensorHub::read(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::readers::pms5003::tests::{sample_frame, FakeSerial};
    use crate::readers::shtc3::tests::{instant_timings, FakeI2c};

    const T_25C: [u8; 3] = [0x66, 0x66, 0x93];
    const RH_50: [u8; 3] = [0x80, 0x00, 0xA2];
    const EIO: i32 = 5;

    fn climate(fake: &FakeI2c) -> Shtc3<FakeI2c> {
        Shtc3::with_timings(fake.clone(), instant_timings())
    }

    fn particulate(fake: &FakeSerial) -> Pms5003<FakeSerial> {
        Pms5003::new(fake.clone()).with_poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn reads_both_sensors() {
        let i2c = FakeI2c::with_reads(vec![Ok(T_25C), Ok(RH_50)]);
        let serial = FakeSerial::with_links(vec![vec![Ok(sample_frame(12, 20))]]);
        let mut hub = SensorHub::init(climate(&i2c), particulate(&serial))
            .with_pm_budget(Duration::from_millis(500));

        assert_eq!(
            hub.read(),
            Reading {
                temperature: Some(25.0),
                humidity: Some(50.0),
                pm25: Some(12),
                pm10: Some(20),
            }
        );
    }

    #[test]
    fn absent_particulate_sensor_is_skipped() {
        let i2c = FakeI2c::with_reads(vec![Ok(T_25C), Ok(RH_50)]);
        let serial = FakeSerial::with_links(vec![]);
        let mut hub = SensorHub::init(climate(&i2c), particulate(&serial));

        assert_eq!(hub.installed(), (true, false));
        let reading = hub.read();
        assert_eq!(reading.temperature, Some(25.0));
        assert_eq!(reading.pm25, None);
        assert_eq!(reading.pm10, None);
    }

    #[test]
    fn failing_sensors_yield_empty_reading() {
        let i2c = FakeI2c::with_reads(vec![Err(EIO), Err(EIO)]);
        let serial = FakeSerial::with_links(vec![vec![]]);
        let mut hub = SensorHub::init(climate(&i2c), particulate(&serial))
            .with_pm_budget(Duration::from_millis(20));

        assert!(hub.read().is_empty());
    }
}
