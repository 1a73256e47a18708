use anyhow::{anyhow, Context};
use lasercam_common::{USB_PID, USB_VID};
use log::{debug, info};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};

use crate::config::HostConfig;
use crate::xfer_protoc::Link;

pub type SerialLink = Link<Box<dyn SerialPort>>;

/// One serial port on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub name: String,
    pub usb_id: Option<(u16, u16)>,
    pub is_lasercam: bool,
}

impl From<SerialPortInfo> for PortEntry {
    fn from(info: SerialPortInfo) -> Self {
        let usb_id = match info.port_type {
            SerialPortType::UsbPort(usb) => Some((usb.vid, usb.pid)),
            _ => None,
        };
        Self {
            name: info.port_name,
            is_lasercam: usb_id == Some((USB_VID, USB_PID)),
            usb_id,
        }
    }
}

pub fn list_ports() -> anyhow::Result<Vec<PortEntry>> {
    let ports = serialport::available_ports().context("enumerating serial ports")?;
    Ok(ports.into_iter().map(PortEntry::from).collect())
}

/// First port whose USB id matches the board.
pub fn find_device_port(ports: &[PortEntry]) -> Option<&str> {
    ports.iter().find(|p| p.is_lasercam).map(|p| p.name.as_str())
}

/// Open the configured port, or search for the board when none is set.
pub fn open(cfg: &HostConfig) -> anyhow::Result<SerialLink> {
    let name = match &cfg.port {
        Some(name) => name.clone(),
        None => {
            info!(
                "searching for device {:04x}:{:04x}",
                USB_VID, USB_PID
            );
            let ports = list_ports()?;
            for p in &ports {
                debug!("found port {} {:04x?}", p.name, p.usb_id);
            }
            find_device_port(&ports)
                .map(str::to_string)
                .ok_or_else(|| anyhow!("no lasercam board found; set `port` or pass --port"))?
        }
    };

    info!("opening {} at {} baud", name, cfg.baud_rate);
    let port = serialport::new(&name, cfg.baud_rate)
        .timeout(cfg.timeout())
        .open()
        .with_context(|| format!("opening serial port {}", name))?;
    Ok(Link::new(port, cfg.retries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, usb_id: Option<(u16, u16)>) -> PortEntry {
        PortEntry {
            name: name.to_string(),
            usb_id,
            is_lasercam: usb_id == Some((USB_VID, USB_PID)),
        }
    }

    #[test]
    fn picks_the_board_by_usb_id() {
        let ports = vec![
            entry("/dev/ttyS0", None),
            entry("/dev/ttyACM0", Some((0x2341, 0x0043))),
            entry("/dev/ttyACM1", Some((USB_VID, USB_PID))),
        ];
        assert_eq!(find_device_port(&ports), Some("/dev/ttyACM1"));
        assert_eq!(find_device_port(&ports[..2]), None);
    }
}
