//! Instrument layer: VISA resource identifiers, SCPI transports and the
//! multimeter driver.

pub mod resource;
pub mod scpi;
pub mod stream;
#[cfg(feature = "instrument_visa")]
pub mod visa;

pub use resource::{InterfaceType, Resource};
pub use scpi::{parse_ascii_values, Multimeter, ScpiTransport};

use crate::error::{AppResult, DaqError};
use std::time::Duration;
use stream::StreamTransport;

/// Open the transport that serves `resource`.
///
/// Raw sockets are handled natively and `ASRL` resources through
/// `serialport`. USB, GPIB and VXI-11 need a VISA library and the
/// `instrument_visa` feature.
pub fn open_transport(resource: &Resource, timeout: Duration) -> AppResult<Box<dyn ScpiTransport>> {
    ensure_supported(resource)?;
    match resource {
        Resource::TcpipSocket { host, port, .. } => {
            Ok(Box::new(StreamTransport::connect(host, *port, timeout)?))
        }
        Resource::Asrl { .. } => open_asrl(resource),
        Resource::Usb { .. } | Resource::Gpib { .. } | Resource::TcpipInstr { .. } => {
            open_visa(resource, timeout)
        }
    }
}

/// Check that this build can open `resource` without touching any device.
pub fn ensure_supported(resource: &Resource) -> AppResult<()> {
    match resource {
        Resource::TcpipSocket { .. } => Ok(()),
        Resource::Asrl { .. } if cfg!(feature = "instrument_serial") => Ok(()),
        Resource::Asrl { .. } => Err(DaqError::SerialFeatureDisabled),
        _ if cfg!(feature = "instrument_visa") => Ok(()),
        _ => {
            tracing::error!(
                resource = %resource,
                "{} resources need a VISA library",
                resource.interface_type()
            );
            Err(DaqError::FeatureNotEnabled("instrument_visa".to_string()))
        }
    }
}

#[cfg(feature = "instrument_serial")]
fn open_asrl(resource: &Resource) -> AppResult<Box<dyn ScpiTransport>> {
    let port_name = resource
        .serial_port_name()
        .ok_or_else(|| DaqError::UnsupportedResource(resource.to_string()))?;
    Ok(Box::new(StreamTransport::open_serial(
        &port_name,
        stream::DEFAULT_ASRL_BAUD,
    )?))
}

#[cfg(not(feature = "instrument_serial"))]
fn open_asrl(_resource: &Resource) -> AppResult<Box<dyn ScpiTransport>> {
    Err(DaqError::SerialFeatureDisabled)
}

#[cfg(feature = "instrument_visa")]
fn open_visa(resource: &Resource, timeout: Duration) -> AppResult<Box<dyn ScpiTransport>> {
    Ok(Box::new(visa::VisaTransport::open(resource, timeout)?))
}

#[cfg(not(feature = "instrument_visa"))]
fn open_visa(_resource: &Resource, _timeout: Duration) -> AppResult<Box<dyn ScpiTransport>> {
    Err(DaqError::FeatureNotEnabled("instrument_visa".to_string()))
}
