//! Scoped access to a [`DeviceLib`].
//!
//! A [`Session`] initialises the backend on [`Session::open`] and shuts it
//! down when dropped, so every exit path of a generation run (including
//! early returns through `?`) releases the backend exactly once.

use std::ops::Deref;

use tracing::{debug, warn};

use crate::device::{Device, DeviceLib, MigDevice};
use crate::{Result, TopologyError};

/// An open session over a device library.
pub struct Session<'a, L: DeviceLib + ?Sized> {
    lib: &'a mut L,
}

impl<'a, L: DeviceLib + ?Sized> Session<'a, L> {
    /// Initialise `lib` and wrap it in a session.
    pub fn open(lib: &'a mut L) -> Result<Self> {
        lib.init()?;
        debug!("device library session opened");
        Ok(Self { lib })
    }

    /// Call `visit` for every physical device with its enumeration index.
    ///
    /// Stops at the first error returned by `visit`.
    pub fn visit_devices<E, F>(&self, mut visit: F) -> std::result::Result<(), E>
    where
        E: From<TopologyError>,
        F: FnMut(usize, &Device) -> std::result::Result<(), E>,
    {
        for (i, device) in self.lib.devices()?.iter().enumerate() {
            visit(i, device)?;
        }
        Ok(())
    }

    /// Call `visit` for every partition of every partition-mode device.
    ///
    /// `visit` receives the parent's enumeration index, the parent, the
    /// partition's index within that parent, and the partition. Devices that
    /// are not in partition mode are passed over.
    pub fn visit_mig_devices<E, F>(&self, mut visit: F) -> std::result::Result<(), E>
    where
        E: From<TopologyError>,
        F: FnMut(usize, &Device, usize, &MigDevice) -> std::result::Result<(), E>,
    {
        for (i, device) in self.lib.devices()?.iter().enumerate() {
            if !self.lib.is_mig_enabled(device)? {
                continue;
            }
            for (j, mig) in self.lib.mig_devices(device)?.iter().enumerate() {
                visit(i, device, j, mig)?;
            }
        }
        Ok(())
    }
}

impl<L: DeviceLib + ?Sized> Deref for Session<'_, L> {
    type Target = L;

    fn deref(&self) -> &L {
        self.lib
    }
}

impl<L: DeviceLib + ?Sized> Drop for Session<'_, L> {
    fn drop(&mut self) {
        match self.lib.shutdown() {
            Ok(()) => debug!("device library session closed"),
            Err(e) => warn!("failed to shut down device library: {}", e),
        }
    }
}
