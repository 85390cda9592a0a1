//! VISA resource identifiers.
//!
//! Parses the address strings handed to a VISA resource manager, e.g.
//! `USB0::0x05E6::0x2100::1373334::INSTR`, into a typed [`Resource`] so the
//! logger can pick a transport before touching any hardware.
//!
//! Supported forms:
//!
//! | Form | Example |
//! |------|---------|
//! | USB INSTR | `USB0::0x05E6::0x2100::1373334::INSTR` |
//! | TCPIP INSTR (VXI-11 / HiSLIP) | `TCPIP0::192.168.1.10::inst0::INSTR` |
//! | TCPIP SOCKET (raw SCPI) | `TCPIP0::192.168.1.10::5025::SOCKET` |
//! | Serial | `ASRL3::INSTR`, `ASRL/dev/ttyUSB0::INSTR` |
//! | GPIB | `GPIB0::22::INSTR` |
//!
//! Keywords are case-insensitive and a missing board number means board 0.

use crate::error::{AppResult, DaqError};
use std::fmt;
use std::str::FromStr;

/// A parsed VISA resource identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// USB Test & Measurement Class device
    Usb {
        board: u16,
        vendor_id: u16,
        product_id: u16,
        serial_number: String,
        interface: Option<u16>,
    },
    /// LAN instrument reached through VXI-11 or HiSLIP
    TcpipInstr {
        board: u16,
        host: String,
        device: Option<String>,
    },
    /// Raw SCPI socket
    TcpipSocket { board: u16, host: String, port: u16 },
    /// Serial instrument
    Asrl { port: String },
    /// GPIB instrument
    Gpib {
        board: u16,
        primary: u8,
        secondary: Option<u8>,
    },
}

/// Transport family of a [`Resource`], used for logging and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceType {
    Usb,
    Tcpip,
    Asrl,
    Gpib,
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterfaceType::Usb => "USB",
            InterfaceType::Tcpip => "TCPIP",
            InterfaceType::Asrl => "ASRL",
            InterfaceType::Gpib => "GPIB",
        };
        f.write_str(name)
    }
}

impl Resource {
    /// Transport family
    pub fn interface_type(&self) -> InterfaceType {
        match self {
            Resource::Usb { .. } => InterfaceType::Usb,
            Resource::TcpipInstr { .. } | Resource::TcpipSocket { .. } => InterfaceType::Tcpip,
            Resource::Asrl { .. } => InterfaceType::Asrl,
            Resource::Gpib { .. } => InterfaceType::Gpib,
        }
    }

    /// Operating-system serial port behind an `ASRL` resource.
    ///
    /// Numeric ports follow the NI convention (`ASRL1` is the first port);
    /// anything else is taken as a literal device path.
    pub fn serial_port_name(&self) -> Option<String> {
        let Resource::Asrl { port } = self else {
            return None;
        };
        match port.parse::<u16>() {
            Ok(n) if cfg!(windows) => Some(format!("COM{n}")),
            Ok(n) => Some(format!("/dev/ttyS{}", n.saturating_sub(1))),
            Err(_) => Some(port.clone()),
        }
    }
}

impl FromStr for Resource {
    type Err = DaqError;

    fn from_str(s: &str) -> AppResult<Self> {
        let trimmed = s.trim();
        let parts: Vec<&str> = trimmed.split("::").collect();
        if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
            return Err(DaqError::invalid_resource(s, "expected '::'-separated fields"));
        }

        let head = parts[0];
        let class = parts[parts.len() - 1].to_ascii_uppercase();
        let fields = &parts[1..parts.len() - 1];
        let upper_head = head.to_ascii_uppercase();

        if let Some(board) = upper_head.strip_prefix("USB") {
            expect_class(s, &class, "INSTR")?;
            let board = parse_board(s, board)?;
            match fields {
                [vid, pid, serial] | [vid, pid, serial, _] => Ok(Resource::Usb {
                    board,
                    vendor_id: parse_id(s, vid)?,
                    product_id: parse_id(s, pid)?,
                    serial_number: (*serial).to_string(),
                    interface: match fields.get(3) {
                        Some(iface) => Some(parse_number(s, iface)?),
                        None => None,
                    },
                }),
                _ => Err(DaqError::invalid_resource(
                    s,
                    "USB needs vendor, product and serial number",
                )),
            }
        } else if let Some(board) = upper_head.strip_prefix("TCPIP") {
            let board = parse_board(s, board)?;
            match (class.as_str(), fields) {
                ("SOCKET", [host, port]) => Ok(Resource::TcpipSocket {
                    board,
                    host: (*host).to_string(),
                    port: parse_number(s, port)?,
                }),
                ("SOCKET", _) => Err(DaqError::invalid_resource(s, "SOCKET needs host and port")),
                ("INSTR", [host]) => Ok(Resource::TcpipInstr {
                    board,
                    host: (*host).to_string(),
                    device: None,
                }),
                ("INSTR", [host, device]) => Ok(Resource::TcpipInstr {
                    board,
                    host: (*host).to_string(),
                    device: Some((*device).to_string()),
                }),
                ("INSTR", _) => Err(DaqError::invalid_resource(s, "TCPIP INSTR needs a host")),
                _ => Err(DaqError::invalid_resource(s, "expected INSTR or SOCKET")),
            }
        } else if upper_head.starts_with("ASRL") {
            expect_class(s, &class, "INSTR")?;
            if !fields.is_empty() {
                return Err(DaqError::invalid_resource(s, "ASRL takes a single port field"));
            }
            // Keep the original case: the port may be a device path.
            let port = &head[4..];
            if port.is_empty() {
                return Err(DaqError::invalid_resource(s, "ASRL needs a port"));
            }
            Ok(Resource::Asrl {
                port: port.to_string(),
            })
        } else if let Some(board) = upper_head.strip_prefix("GPIB") {
            expect_class(s, &class, "INSTR")?;
            let board = parse_board(s, board)?;
            let (primary, secondary) = match fields {
                [primary] => (parse_gpib_address(s, primary)?, None),
                [primary, secondary] => (
                    parse_gpib_address(s, primary)?,
                    Some(parse_gpib_address(s, secondary)?),
                ),
                _ => return Err(DaqError::invalid_resource(s, "GPIB needs a primary address")),
            };
            Ok(Resource::Gpib {
                board,
                primary,
                secondary,
            })
        } else {
            Err(DaqError::invalid_resource(
                s,
                format!("unknown interface '{head}'"),
            ))
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Usb {
                board,
                vendor_id,
                product_id,
                serial_number,
                interface,
            } => {
                write!(
                    f,
                    "USB{board}::0x{vendor_id:04X}::0x{product_id:04X}::{serial_number}"
                )?;
                if let Some(iface) = interface {
                    write!(f, "::{iface}")?;
                }
                f.write_str("::INSTR")
            }
            Resource::TcpipInstr {
                board,
                host,
                device,
            } => match device {
                Some(device) => write!(f, "TCPIP{board}::{host}::{device}::INSTR"),
                None => write!(f, "TCPIP{board}::{host}::INSTR"),
            },
            Resource::TcpipSocket { board, host, port } => {
                write!(f, "TCPIP{board}::{host}::{port}::SOCKET")
            }
            Resource::Asrl { port } => write!(f, "ASRL{port}::INSTR"),
            Resource::Gpib {
                board,
                primary,
                secondary,
            } => match secondary {
                Some(secondary) => write!(f, "GPIB{board}::{primary}::{secondary}::INSTR"),
                None => write!(f, "GPIB{board}::{primary}::INSTR"),
            },
        }
    }
}

fn expect_class(resource: &str, class: &str, expected: &str) -> AppResult<()> {
    if class == expected {
        Ok(())
    } else {
        Err(DaqError::invalid_resource(
            resource,
            format!("expected resource class {expected}, found {class}"),
        ))
    }
}

fn parse_board(resource: &str, digits: &str) -> AppResult<u16> {
    if digits.is_empty() {
        return Ok(0);
    }
    digits
        .parse()
        .map_err(|_| DaqError::invalid_resource(resource, format!("bad board number '{digits}'")))
}

fn parse_number<T: FromStr>(resource: &str, field: &str) -> AppResult<T> {
    field
        .parse()
        .map_err(|_| DaqError::invalid_resource(resource, format!("bad number '{field}'")))
}

/// USB ids are usually hex with a `0x` prefix, but plain decimal is legal.
fn parse_id(resource: &str, field: &str) -> AppResult<u16> {
    let parsed = match field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => field.parse(),
    };
    parsed.map_err(|_| DaqError::invalid_resource(resource, format!("bad USB id '{field}'")))
}

fn parse_gpib_address(resource: &str, field: &str) -> AppResult<u8> {
    let address: u8 = parse_number(resource, field)?;
    if address > 30 {
        return Err(DaqError::invalid_resource(
            resource,
            format!("GPIB address {address} out of range 0-30"),
        ));
    }
    Ok(address)
}
