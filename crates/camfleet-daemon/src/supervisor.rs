//! Connection Supervisor
//!
//! Opens device handles with a bounded number of attempts. Between attempts
//! the camera interface is power-cycled through the optional hardware reset
//! side channel; without one a plain retry delay is used.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use camfleet_core::{
    CameraDriver, ConnectionError, ConnectionMode, ConnectionState, DeviceDescriptor,
    FleetConfig, InterfaceReset, NativeHandle,
};

use crate::device::{ControlOutcome, DeviceHandle, DeviceLink};
use crate::events::EventRouter;

/// Timing used while opening connections
#[derive(Clone, Debug)]
pub struct ConnectTimings {
    pub retry_delay: Duration,
    pub reset_settle: Duration,
    pub connect_timeout: Duration,
    pub disconnect_timeout: Duration,
}

impl From<&FleetConfig> for ConnectTimings {
    fn from(config: &FleetConfig) -> Self {
        Self {
            retry_delay: config.retry_delay(),
            reset_settle: config.reset_settle(),
            connect_timeout: config.connect_timeout(),
            disconnect_timeout: config.disconnect_timeout(),
        }
    }
}

/// Opens [`DeviceHandle`]s with retries
#[derive(Clone)]
pub struct ConnectionSupervisor {
    driver: Arc<dyn CameraDriver>,
    reset: Option<Arc<dyn InterfaceReset>>,
    router: EventRouter,
    timings: ConnectTimings,
}

impl ConnectionSupervisor {
    pub fn new(
        driver: Arc<dyn CameraDriver>,
        reset: Option<Arc<dyn InterfaceReset>>,
        router: EventRouter,
        config: &FleetConfig,
    ) -> Self {
        Self {
            driver,
            reset,
            router,
            timings: ConnectTimings::from(config),
        }
    }

    pub fn driver(&self) -> &Arc<dyn CameraDriver> {
        &self.driver
    }

    /// Hardware reset of every camera interface, if the facility exists
    pub fn reset_interfaces(&self) -> bool {
        let Some(reset) = &self.reset else {
            return false;
        };
        match reset.reset_interfaces() {
            Ok(0) => {
                debug!("Hardware reset found no camera interface");
                false
            }
            Ok(count) => {
                info!("Reset {} camera interface(s)", count);
                true
            }
            Err(e) => {
                debug!("Hardware reset unavailable: {}", e);
                false
            }
        }
    }

    /// Open `descriptor` in `mode`, trying up to `max_attempts` times.
    ///
    /// Every attempt opens under a fresh event route, so a late event from an
    /// abandoned attempt cannot settle the next one. Intermediate failures are
    /// logged only; the returned error is terminal for this device.
    pub fn connect(
        &self,
        descriptor: &DeviceDescriptor,
        mode: ConnectionMode,
        max_attempts: u32,
    ) -> Result<DeviceHandle, ConnectionError> {
        let identity = descriptor.identity();
        let attempts = max_attempts.max(1);

        for attempt in 1..=attempts {
            let link = self.router.register(&identity);
            debug!(
                token = %link.token(),
                "Opening {} ({:?} mode), attempt {}/{}", identity, mode, attempt, attempts
            );

            match self.try_open(descriptor, mode, &link) {
                Ok(native) => {
                    info!("Connected to {} ({:?} mode)", identity, mode);
                    return Ok(DeviceHandle::new(
                        Arc::clone(&self.driver),
                        self.router.clone(),
                        link,
                        descriptor.clone(),
                        native,
                        mode,
                        self.timings.disconnect_timeout,
                    ));
                }
                Err(e) => {
                    self.router.unregister(link.token());
                    warn!("{}: attempt {}/{} failed: {}", identity, attempt, attempts, e);
                }
            }

            if attempt < attempts {
                self.back_off();
            }
        }

        Err(ConnectionError::Exhausted { identity, attempts })
    }

    fn try_open(
        &self,
        descriptor: &DeviceDescriptor,
        mode: ConnectionMode,
        link: &Arc<DeviceLink>,
    ) -> Result<NativeHandle, ConnectionError> {
        link.set_state(ConnectionState::Connecting);

        // Armed before the open so an immediate Connected event is not lost
        let waiter = link.arm_control();

        let native = match self
            .driver
            .open(descriptor, mode, link.token(), self.router.sender())
        {
            Ok(native) => native,
            Err(e) => {
                link.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };

        let error = match waiter.wait(self.timings.connect_timeout) {
            Ok(ControlOutcome::Connected) => return Ok(native),
            Ok(ControlOutcome::Failed(code)) => ConnectionError::Failed(code),
            Ok(ControlOutcome::Disconnected(code)) => ConnectionError::Dropped(code),
            Err(e) => ConnectionError::Signal(e),
        };

        self.driver.release(native);
        link.set_state(ConnectionState::Disconnected);
        Err(error)
    }

    fn back_off(&self) {
        if self.reset_interfaces() {
            thread::sleep(self.timings.reset_settle);
        } else {
            thread::sleep(self.timings.retry_delay);
        }
    }
}
