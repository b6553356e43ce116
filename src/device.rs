//! Device discovery and serial transport

use serialport::{SerialPort, SerialPortInfo, SerialPortType, UsbPortInfo};
use tracing::{debug, info};

use crate::config::SerialConfig;
pub use crate::config::POWER_SHIELD_PRODUCT_ID;
use crate::{PowerMonError, Result};

/// First USB serial port whose product id matches.
pub fn select_port(ports: &[SerialPortInfo], product_id: u16) -> Option<&SerialPortInfo> {
    ports.iter().find(|info| match &info.port_type {
        SerialPortType::UsbPort(UsbPortInfo { pid, .. }) => *pid == product_id,
        _ => false,
    })
}

/// Enumerate serial ports and return the power monitor.
pub fn find_device(product_id: u16) -> Result<SerialPortInfo> {
    let ports =
        serialport::available_ports().map_err(|source| PowerMonError::PortEnumeration { source })?;
    debug!("Enumerated {} serial ports", ports.len());
    locate_device(&ports, product_id)
}

/// Pick the power monitor out of an enumerated port list.
pub fn locate_device(ports: &[SerialPortInfo], product_id: u16) -> Result<SerialPortInfo> {
    let port = select_port(ports, product_id)
        .cloned()
        .ok_or(PowerMonError::DeviceNotFound { product_id })?;
    info!("Power monitor detected: {}", port.port_name);
    Ok(port)
}

/// Open the configured port, discovering it by product id when no name is set.
pub fn open_port(config: &SerialConfig) -> Result<Box<dyn SerialPort>> {
    let name = match &config.port {
        Some(port) => port.clone(),
        None => find_device(config.product_id)?.port_name,
    };

    debug!("Opening {} at {} baud", name, config.baud_rate);
    serialport::new(name.as_str(), config.baud_rate)
        .timeout(config.read_timeout)
        .open()
        .map_err(|source| PowerMonError::PortOpen { port: name, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb(name: &str, pid: u16) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x0483,
                pid,
                serial_number: None,
                manufacturer: Some("STMicroelectronics".to_string()),
                product: None,
            }),
        }
    }

    #[test]
    fn selects_first_matching_usb_port() {
        let ports = vec![
            SerialPortInfo {
                port_name: "/dev/ttyS0".to_string(),
                port_type: SerialPortType::Unknown,
            },
            usb("/dev/ttyACM0", 0x374B),
            usb("/dev/ttyACM1", POWER_SHIELD_PRODUCT_ID),
            usb("/dev/ttyACM2", POWER_SHIELD_PRODUCT_ID),
        ];

        let selected = select_port(&ports, POWER_SHIELD_PRODUCT_ID).map(|p| p.port_name.as_str());
        assert_eq!(selected, Some("/dev/ttyACM1"));
    }

    #[test]
    fn no_match_without_usb_ports() {
        let ports = vec![
            SerialPortInfo { port_name: "COM1".to_string(), port_type: SerialPortType::PciPort },
            usb("COM3", 0x1234),
        ];
        assert!(select_port(&ports, POWER_SHIELD_PRODUCT_ID).is_none());
        assert!(select_port(&[], POWER_SHIELD_PRODUCT_ID).is_none());
    }

    #[test]
    fn missing_device_is_not_found() {
        let ports = vec![usb("/dev/ttyACM0", 0x374B)];
        match locate_device(&ports, POWER_SHIELD_PRODUCT_ID) {
            Err(err @ PowerMonError::DeviceNotFound { .. }) => {
                assert!(err.to_string().contains("0x5740"));
                assert!(!err.recovery_suggestions().is_empty());
            }
            other => panic!("Expected DeviceNotFound, got {:?}", other),
        }

        let found = locate_device(&[usb("/dev/ttyACM4", POWER_SHIELD_PRODUCT_ID)], 0x5740).unwrap();
        assert_eq!(found.port_name, "/dev/ttyACM4");
    }

    #[test]
    fn explicit_port_that_cannot_open_is_reported() {
        let config = SerialConfig::default().with_port("/nonexistent/tty-powermon");
        match open_port(&config) {
            Err(PowerMonError::PortOpen { port, .. }) => {
                assert_eq!(port, "/nonexistent/tty-powermon")
            }
            Err(other) => panic!("Expected PortOpen, got {:?}", other),
            Ok(_) => panic!("Opened a nonexistent port"),
        }
    }
}
