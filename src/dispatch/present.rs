use core::{fmt::Write, net::Ipv4Addr};

use heapless::String;

use crate::{link::codec::LinkStatus, sinks::Rgb};

pub(super) const ACK_OK: &str = "PING ACK OK";
pub(super) const PING_SENT: &str = "PING sent";

pub(super) type Notice = String<32>;

const FLASH_ROTATION: [Rgb; 3] = [Rgb::RED, Rgb::BLUE, Rgb::YELLOW];

pub(super) const fn status_color(status: LinkStatus) -> Rgb {
    match status {
        LinkStatus::Initializing => Rgb::RED,
        LinkStatus::Connected => Rgb::GREEN,
        LinkStatus::Failed => Rgb::BLUE,
        LinkStatus::Unknown => Rgb::WHITE,
    }
}

// Never green, so the revert after the flash is always visible.
pub(super) const fn flash_color(index: u8) -> Rgb {
    FLASH_ROTATION[index as usize % FLASH_ROTATION.len()]
}

pub(super) const fn next_flash_index(index: u8) -> u8 {
    ((index as usize + 1) % FLASH_ROTATION.len()) as u8
}

pub(super) fn wifi_notice(status: LinkStatus) -> Notice {
    let mut out = Notice::new();
    let _ = write!(&mut out, "WiFi: {}", status.as_str());
    out
}

pub(super) fn address_notice(addr: Ipv4Addr) -> Notice {
    let mut out = Notice::new();
    let _ = write!(&mut out, "IP {}", addr);
    out
}

pub(super) fn broker_notice(label: &str) -> Notice {
    let mut out = Notice::new();
    let _ = write!(&mut out, "MQTT: {}", label);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_fit_the_panel_buffer() {
        assert_eq!(wifi_notice(LinkStatus::Initializing).as_str(), "WiFi: INITIALIZING");
        assert_eq!(
            address_notice(Ipv4Addr::new(255, 255, 255, 255)).as_str(),
            "IP 255.255.255.255"
        );
        assert_eq!(broker_notice("DISCONNECTED").as_str(), "MQTT: DISCONNECTED");
    }

    #[test]
    fn flash_rotation_skips_green() {
        for index in 0..=u8::MAX {
            assert_ne!(flash_color(index), Rgb::GREEN);
        }
        assert_eq!(flash_color(3), flash_color(0));
    }

    #[test]
    fn flash_index_cycles_without_repeating_a_color() {
        let mut index = 0;
        let mut previous = flash_color(index);
        for _ in 0..600 {
            index = next_flash_index(index);
            assert!((index as usize) < FLASH_ROTATION.len());
            let color = flash_color(index);
            assert_ne!(color, previous);
            previous = color;
        }
    }
}
