//! VISA transport for USB-TMC, GPIB and VXI-11 resources.
//!
//! Requires a system VISA library (NI-VISA, Keysight IO Libraries, ...) and
//! the `instrument_visa` feature.

use crate::error::{AppResult, DaqError};
use crate::hardware::line_io::{read_terminated, LineRead};
use crate::instrument::resource::Resource;
use crate::instrument::scpi::ScpiTransport;
use std::ffi::CString;
use std::io::Write;
use std::time::Duration;
use visa_rs::prelude::*;

/// An open VISA session. The session closes when dropped.
pub struct VisaTransport {
    instr: Instrument,
    // Keeps the resource manager session alive for as long as `instr`.
    _rm: DefaultRM,
}

impl VisaTransport {
    /// Open `resource` through the default resource manager.
    pub fn open(resource: &Resource, timeout: Duration) -> AppResult<Self> {
        let rm = DefaultRM::new().map_err(visa_err)?;

        let expr = CString::new(resource.to_string())
            .map_err(|_| DaqError::invalid_resource(&resource.to_string(), "contains NUL"))?
            .into();
        let rsc = rm.find_res(&expr).map_err(visa_err)?;
        let instr = rm
            .open(&rsc, AccessMode::NO_LOCK, timeout)
            .map_err(visa_err)?;

        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let attr = visa_rs::attribute::AttrTmoValue::new_checked(timeout_ms).ok_or_else(|| {
            DaqError::Configuration(format!("VISA timeout {timeout_ms}ms out of range"))
        })?;
        instr.set_attr(attr).map_err(visa_err)?;

        Ok(Self { instr, _rm: rm })
    }
}

impl ScpiTransport for VisaTransport {
    fn write_line(&mut self, command: &str) -> AppResult<()> {
        let mut message = command.as_bytes().to_vec();
        message.push(b'\n');
        (&self.instr).write_all(&message)?;
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> AppResult<Option<String>> {
        let mut reader = &self.instr;
        match read_terminated(&mut reader, b'\n', timeout)? {
            LineRead::Complete(bytes) => {
                let line = String::from_utf8(bytes).map_err(|e| {
                    DaqError::InvalidResponse(String::from_utf8_lossy(e.as_bytes()).into_owned())
                })?;
                Ok(Some(line.trim_end().to_string()))
            }
            LineRead::TimedOut(_) => Ok(None),
        }
    }
}

fn visa_err(err: visa_rs::Error) -> DaqError {
    DaqError::Instrument(format!("VISA: {err}"))
}
