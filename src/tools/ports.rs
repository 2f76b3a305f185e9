//! `list_ports` — enumeration of attached serial-capable devices.

use serde::Serialize;
use serde_json::Value;
use serialport::{SerialPortInfo, SerialPortType};
use tracing::info;

use crate::error::{HandlerError, HandlerResult};

/// Normalized descriptor for one attached device.
///
/// Produced fresh on every call; the physical device set can change
/// between calls, so nothing is cached.
#[derive(Debug, Serialize)]
pub struct DeviceDescriptor {
    /// Port identifier usable in `serial_send`/`read_serial`/`upload`.
    pub device: String,
    pub description: String,
    pub hwid: String,
}

/// Handle `list_ports`. An empty array is a valid result when nothing is
/// attached.
pub fn list(_params: &Value) -> HandlerResult<Value> {
    let ports = serialport::available_ports()
        .map_err(|e| HandlerError::Internal(anyhow::anyhow!("failed to list serial ports: {e}")))?;

    info!(count = ports.len(), "enumerated serial ports");

    let descriptors: Vec<DeviceDescriptor> = ports.iter().map(describe).collect();
    serde_json::to_value(descriptors)
        .map_err(|e| HandlerError::Internal(anyhow::anyhow!("failed to serialize port list: {e}")))
}

fn describe(info: &SerialPortInfo) -> DeviceDescriptor {
    let (description, hwid) = match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let description = usb
                .product
                .clone()
                .unwrap_or_else(|| "USB serial device".to_owned());
            let mut hwid = format!("USB VID:PID={:04X}:{:04X}", usb.vid, usb.pid);
            if let Some(serial) = &usb.serial_number {
                hwid.push_str(&format!(" SER={serial}"));
            }
            (description, hwid)
        }
        SerialPortType::PciPort => ("PCI serial device".to_owned(), "PCI".to_owned()),
        SerialPortType::BluetoothPort => {
            ("Bluetooth serial device".to_owned(), "BLUETOOTH".to_owned())
        }
        SerialPortType::Unknown => ("Serial device".to_owned(), "n/a".to_owned()),
    };

    DeviceDescriptor {
        device: info.port_name.clone(),
        description,
        hwid,
    }
}
