//! Optical fingerprint module (R30x family) over UART.

use crate::error::{HwError, Result};

pub const HEADER: [u8; 2] = [0xEF, 0x01];
pub const DEFAULT_ADDRESS: u32 = 0xFFFF_FFFF;
pub const PID_COMMAND: u8 = 0x01;
pub const PID_ACK: u8 = 0x07;

pub const CMD_GEN_IMAGE: u8 = 0x01;
pub const CMD_IMAGE_TO_TEMPLATE: u8 = 0x02;
pub const CMD_SEARCH: u8 = 0x04;

pub const CONFIRM_OK: u8 = 0x00;
pub const CONFIRM_NO_FINGER: u8 = 0x02;
pub const CONFIRM_NOT_FOUND: u8 = 0x09;

const SEARCH_PAGES: u16 = 0x00A3;

/// Build a command packet: header, address, PID, length, instruction, params, checksum.
pub fn encode_command(address: u32, instruction: u8, params: &[u8]) -> Vec<u8> {
    let len = (params.len() + 3) as u16;
    let mut out = Vec::with_capacity(12 + params.len());
    out.extend_from_slice(&HEADER);
    out.extend_from_slice(&address.to_be_bytes());
    out.push(PID_COMMAND);
    out.extend_from_slice(&len.to_be_bytes());
    out.push(instruction);
    out.extend_from_slice(params);
    let sum = checksum(&out[6..]);
    out.extend_from_slice(&sum.to_be_bytes());
    out
}

fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b)))
}

/// Parse an acknowledge packet and return its confirmation code.
pub fn decode_ack(packet: &[u8]) -> Result<u8> {
    if packet.len() < 12 || packet[..2] != HEADER {
        return Err(HwError::Uart("short or malformed fingerprint reply".into()));
    }
    if packet[6] != PID_ACK {
        return Err(HwError::Uart(format!("unexpected packet id {:#04x}", packet[6])));
    }
    let len = usize::from(u16::from_be_bytes([packet[7], packet[8]]));
    if len < 3 || packet.len() < 9 + len {
        return Err(HwError::Uart("truncated fingerprint reply".into()));
    }
    let body_end = 9 + len - 2;
    let expected = u16::from_be_bytes([packet[body_end], packet[body_end + 1]]);
    if checksum(&packet[6..body_end]) != expected {
        return Err(HwError::Uart("fingerprint reply checksum mismatch".into()));
    }
    Ok(packet[9])
}

pub fn search_params() -> [u8; 5] {
    let pages = SEARCH_PAGES.to_be_bytes();
    [0x01, 0x00, 0x00, pages[0], pages[1]]
}

#[cfg(feature = "hardware")]
pub use driver::UartFingerprint;

#[cfg(feature = "hardware")]
mod driver {
    use super::*;
    use crate::util::poll_until;
    use dispenser_traits::{BoxError, Verifier};
    use rppal::uart::{Parity, Uart};
    use std::time::Duration;

    const BAUD: u32 = 57_600;
    const REPLY_TIMEOUT: Duration = Duration::from_millis(500);

    pub struct UartFingerprint {
        uart: Uart,
        address: u32,
    }

    impl UartFingerprint {
        pub fn open(path: &str) -> Result<Self> {
            let uart_err = |e: rppal::uart::Error| HwError::Uart(e.to_string());
            let mut uart = Uart::with_path(path, BAUD, Parity::None, 8, 1).map_err(uart_err)?;
            uart.set_read_mode(0, REPLY_TIMEOUT).map_err(uart_err)?;
            Ok(Self {
                uart,
                address: DEFAULT_ADDRESS,
            })
        }

        fn command(&mut self, instruction: u8, params: &[u8]) -> Result<u8> {
            let uart_err = |e: rppal::uart::Error| HwError::Uart(e.to_string());
            let packet = encode_command(self.address, instruction, params);
            self.uart.write(&packet).map_err(uart_err)?;

            let mut reply = Vec::with_capacity(12);
            let mut buf = [0u8; 32];
            while reply.len() < 12 {
                let n = self.uart.read(&mut buf).map_err(uart_err)?;
                if n == 0 {
                    break;
                }
                reply.extend_from_slice(&buf[..n]);
            }
            decode_ack(&reply)
        }
    }

    impl Verifier for UartFingerprint {
        fn scan_and_match(&mut self, timeout: Duration) -> std::result::Result<bool, BoxError> {
            poll_until(
                || match self.command(CMD_GEN_IMAGE, &[])? {
                    CONFIRM_OK => Ok(Some(())),
                    CONFIRM_NO_FINGER => Ok(None),
                    code => Err(HwError::Fingerprint(code)),
                },
                timeout,
                Duration::from_millis(50),
            )?;

            if self.command(CMD_IMAGE_TO_TEMPLATE, &[0x01])? != CONFIRM_OK {
                tracing::debug!("fingerprint image unusable");
                return Ok(false);
            }
            match self.command(CMD_SEARCH, &search_params())? {
                CONFIRM_OK => Ok(true),
                CONFIRM_NOT_FOUND => Ok(false),
                code => Err(HwError::Fingerprint(code).into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gen_image_packet_layout() {
        let p = encode_command(DEFAULT_ADDRESS, CMD_GEN_IMAGE, &[]);
        assert_eq!(
            p,
            vec![0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x03, 0x01, 0x00, 0x05]
        );
    }

    #[test]
    fn search_packet_checksum() {
        let p = encode_command(DEFAULT_ADDRESS, CMD_SEARCH, &search_params());
        assert_eq!(p.len(), 17);
        // 0x01 + 0x00 + 0x08 + 0x04 + 0x01 + 0x00 + 0x00 + 0x00 + 0xA3
        assert_eq!(&p[15..], &[0x00, 0xB1]);
    }

    fn ack(code: u8) -> Vec<u8> {
        let mut p = vec![0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, PID_ACK, 0x00, 0x03, code];
        let sum = checksum(&p[6..]);
        p.extend_from_slice(&sum.to_be_bytes());
        p
    }

    #[test]
    fn decodes_confirmation_code() {
        assert_eq!(decode_ack(&ack(CONFIRM_OK)).unwrap(), CONFIRM_OK);
        assert_eq!(decode_ack(&ack(CONFIRM_NOT_FOUND)).unwrap(), CONFIRM_NOT_FOUND);
    }

    #[test]
    fn rejects_bad_checksum_and_short_reply() {
        let mut p = ack(CONFIRM_OK);
        let last = p.len() - 1;
        p[last] ^= 0xFF;
        assert!(matches!(decode_ack(&p), Err(HwError::Uart(_))));
        assert!(matches!(decode_ack(&p[..8]), Err(HwError::Uart(_))));
    }

    #[test]
    fn rejects_command_packet_as_reply() {
        let p = encode_command(DEFAULT_ADDRESS, CMD_GEN_IMAGE, &[]);
        assert!(decode_ack(&p).is_err());
    }
}
