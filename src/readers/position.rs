use std::time::{Duration, Instant};

use crate::constants::defaults;
use crate::data_mgmt::models::Fix;
use crate::hal::{Connector, SerialLink};
use crate::readers::sim7000::ModemSession;
use crate::readers::PositionSource;

/// GNSS position with a static fallback.
///
/// A closed modem session is re-initialised at most once per backoff
/// interval, so an absent modem does not stall every tick on port opens.
pub struct PositionProvider<C: Connector> {
    session: ModemSession<C>,
    fallback: Fix,
    reinit_backoff: Duration,
    last_init_attempt: Option<Instant>,
}

impl<C> PositionProvider<C>
where
    C: Connector,
    C::Handle: SerialLink,
{
    pub fn new(session: ModemSession<C>, fallback: Fix) -> Self {
        PositionProvider {
            session,
            fallback,
            reinit_backoff: defaults::POSITION_REINIT_BACKOFF,
            last_init_attempt: None,
        }
    }

    pub fn with_reinit_backoff(mut self, backoff: Duration) -> Self {
        self.reinit_backoff = backoff;
        self
    }

    /// Try to bring the modem session up, logging instead of failing
    pub fn init(&mut self) -> bool {
        self.last_init_attempt = Some(Instant::now());
        match self.session.initialize() {
            Ok(()) => true,
            Err(e) => {
                log::error!("SIM7000 init failed: {e}");
                false
            }
        }
    }

    fn reinit_due(&self) -> bool {
        self.last_init_attempt
            .map_or(true, |at| at.elapsed() >= self.reinit_backoff)
    }

    /// Current position. Never fails: degrades to the configured fallback.
    pub fn current_position(&mut self) -> Fix {
        if !self.session.is_open() && self.reinit_due() {
            self.init();
        }
        if self.session.is_open() {
            match self.session.acquire_fix() {
                Ok(Some(fix)) if fix.has_finite_position() => return fix,
                Ok(_) => log::debug!("No usable GNSS fix, using fallback position"),
                Err(e) => log::warn!("GNSS query failed, using fallback position: {e}"),
            }
        }
        self.fallback
    }
}

impl<C> PositionSource for PositionProvider<C>
where
    C: Connector,
    C::Handle: SerialLink,
{
    fn current_position(&mut self) -> Fix {
        PositionProvider::current_position(self)
    }
}
