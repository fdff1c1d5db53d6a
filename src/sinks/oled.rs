//! SSD1306 128x64 panel over I2C with a page-ordered framebuffer.

use core::convert::Infallible;

use embassy_time::{Duration, Instant};
use embedded_graphics::{pixelcolor::BinaryColor, prelude::*};
use embedded_hal::i2c::I2c;
use u8g2_fonts::{
    fonts,
    types::{FontColor, VerticalPosition},
    FontRenderer,
};

use super::{DisplayLine, StatusDisplay};
use crate::config::NOTICE_HOLD_MS;

pub const WIDTH: usize = 128;
pub const HEIGHT: usize = 64;
const PAGES: usize = HEIGHT / 8;
const PAGES_PER_LINE: usize = 2;
pub const DEFAULT_ADDRESS: u8 = 0x3C;

const CONTROL_COMMAND: u8 = 0x00;
const CONTROL_DATA: u8 = 0x40;
const DATA_CHUNK: usize = 16;

const INIT_SEQUENCE: [u8; 25] = [
    0xAE, // display off
    0xD5, 0x80, // clock divide
    0xA8, 0x3F, // multiplex 64
    0xD3, 0x00, // display offset
    0x40, // start line 0
    0x8D, 0x14, // charge pump on
    0x20, 0x00, // horizontal addressing
    0xA1, // segment remap
    0xC8, // COM scan descending
    0xDA, 0x12, // COM pins
    0x81, 0xCF, // contrast
    0xD9, 0xF1, // precharge
    0xDB, 0x40, // VCOM detect
    0xA4, // resume from RAM
    0xA6, // normal, not inverted
    0xAF, // display on
];

const TEXT_FONT: FontRenderer = FontRenderer::new::<fonts::u8g2_font_6x10_tf>();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OledError<E> {
    Bus(E),
}

impl<E> OledError<E> {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bus(_) => "bus",
        }
    }
}

pub struct Ssd1306<I2C> {
    i2c: I2C,
    address: u8,
    buffer: [u8; WIDTH * PAGES],
}

impl<I2C: I2c> Ssd1306<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            buffer: [0; WIDTH * PAGES],
        }
    }

    pub fn init(&mut self) -> Result<(), OledError<I2C::Error>> {
        self.command(&INIT_SEQUENCE)?;
        self.buffer.fill(0);
        self.flush()
    }

    pub fn flush(&mut self) -> Result<(), OledError<I2C::Error>> {
        self.command(&[0x21, 0, (WIDTH - 1) as u8, 0x22, 0, (PAGES - 1) as u8])?;
        let mut chunk = [0u8; DATA_CHUNK + 1];
        chunk[0] = CONTROL_DATA;
        for bytes in self.buffer.chunks(DATA_CHUNK) {
            chunk[1..=bytes.len()].copy_from_slice(bytes);
            self.i2c
                .write(self.address, &chunk[..=bytes.len()])
                .map_err(OledError::Bus)?;
        }
        Ok(())
    }

    pub fn clear_pages(&mut self, first_page: usize, count: usize) {
        let start = (first_page * WIDTH).min(self.buffer.len());
        let end = ((first_page + count) * WIDTH).min(self.buffer.len());
        self.buffer[start..end].fill(0);
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        if x >= WIDTH || y >= HEIGHT {
            return false;
        }
        self.buffer[x + (y / 8) * WIDTH] & (1 << (y % 8)) != 0
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn set_pixel(&mut self, x: usize, y: usize, on: bool) {
        let idx = x + (y / 8) * WIDTH;
        let mask = 1u8 << (y % 8);
        if on {
            self.buffer[idx] |= mask;
        } else {
            self.buffer[idx] &= !mask;
        }
    }

    fn command(&mut self, bytes: &[u8]) -> Result<(), OledError<I2C::Error>> {
        for &byte in bytes {
            self.i2c
                .write(self.address, &[CONTROL_COMMAND, byte])
                .map_err(OledError::Bus)?;
        }
        Ok(())
    }
}

impl<I2C> OriginDimensions for Ssd1306<I2C> {
    fn size(&self) -> Size {
        Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

impl<I2C: I2c> DrawTarget for Ssd1306<I2C> {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<It>(&mut self, pixels: It) -> Result<(), Self::Error>
    where
        It: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 || point.x >= WIDTH as i32 || point.y >= HEIGHT as i32 {
                continue;
            }
            self.set_pixel(point.x as usize, point.y as usize, color == BinaryColor::On);
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.buffer
            .fill(if color == BinaryColor::On { 0xFF } else { 0x00 });
        Ok(())
    }
}

/// Four 16 px text rows, each cleared again once its hold time has passed.
pub struct TextPanel<I2C> {
    panel: Ssd1306<I2C>,
    hold: Duration,
    expiry: [Option<Instant>; DisplayLine::COUNT],
}

impl<I2C: I2c> TextPanel<I2C> {
    pub fn new(panel: Ssd1306<I2C>) -> Self {
        Self::with_hold(panel, Duration::from_millis(NOTICE_HOLD_MS))
    }

    pub fn with_hold(panel: Ssd1306<I2C>, hold: Duration) -> Self {
        Self {
            panel,
            hold,
            expiry: [None; DisplayLine::COUNT],
        }
    }

    pub fn panel(&self) -> &Ssd1306<I2C> {
        &self.panel
    }

    pub fn is_showing(&self, line: DisplayLine) -> bool {
        self.expiry[line.index()].is_some()
    }

    fn clear_line(&mut self, line: DisplayLine) {
        self.panel
            .clear_pages(line.index() * PAGES_PER_LINE, PAGES_PER_LINE);
    }

    fn flush(&mut self) {
        if let Err(err) = self.panel.flush() {
            log::warn!("oled: flush err={}", err.as_str());
        }
    }
}

impl<I2C: I2c> StatusDisplay for TextPanel<I2C> {
    fn show(&mut self, line: DisplayLine, text: &str, now: Instant) {
        self.clear_line(line);
        let _ = TEXT_FONT.render(
            text,
            Point::new(0, line.top_px() + 3),
            VerticalPosition::Top,
            FontColor::Transparent(BinaryColor::On),
            &mut self.panel,
        );
        self.expiry[line.index()] = Some(now + self.hold);
        self.flush();
    }

    fn service(&mut self, now: Instant) {
        let mut cleared = false;
        for line in DisplayLine::ALL {
            if self.expiry[line.index()].is_some_and(|deadline| now >= deadline) {
                self.expiry[line.index()] = None;
                self.clear_line(line);
                cleared = true;
            }
        }
        if cleared {
            self.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};

    use super::*;

    #[derive(Default)]
    struct RecordingBus {
        writes: Vec<(u8, Vec<u8>)>,
        fail: bool,
    }

    impl ErrorType for RecordingBus {
        type Error = ErrorKind;
    }

    impl I2c for RecordingBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), ErrorKind> {
            if self.fail {
                return Err(ErrorKind::Other);
            }
            for op in operations {
                if let Operation::Write(bytes) = op {
                    self.writes.push((address, bytes.to_vec()));
                }
            }
            Ok(())
        }
    }

    fn lit_pixels(panel: &Ssd1306<RecordingBus>, line: DisplayLine) -> usize {
        let top = line.top_px() as usize;
        (top..top + 16)
            .flat_map(|y| (0..WIDTH).map(move |x| (x, y)))
            .filter(|&(x, y)| panel.pixel(x, y))
            .count()
    }

    fn data_bytes(bus: &RecordingBus) -> usize {
        bus.writes
            .iter()
            .filter(|(_, bytes)| bytes[0] == CONTROL_DATA)
            .map(|(_, bytes)| bytes.len() - 1)
            .sum()
    }

    #[test]
    fn init_sends_commands_then_a_blank_frame() {
        let mut panel = Ssd1306::new(RecordingBus::default(), DEFAULT_ADDRESS);
        panel.init().unwrap();
        let bus = panel.release();

        assert!(bus.writes.iter().all(|(addr, _)| *addr == DEFAULT_ADDRESS));
        assert_eq!(bus.writes[0].1, [CONTROL_COMMAND, 0xAE]);
        assert!(bus.writes.contains(&(DEFAULT_ADDRESS, Vec::from([CONTROL_COMMAND, 0xAF]))));
        assert_eq!(data_bytes(&bus), WIDTH * PAGES);
    }

    #[test]
    fn bus_errors_surface_from_init() {
        let bus = RecordingBus {
            fail: true,
            ..RecordingBus::default()
        };
        let mut panel = Ssd1306::new(bus, DEFAULT_ADDRESS);
        assert_eq!(panel.init(), Err(OledError::Bus(ErrorKind::Other)));
    }

    #[test]
    fn shown_line_clears_after_hold() {
        let panel = Ssd1306::new(RecordingBus::default(), DEFAULT_ADDRESS);
        let mut text = TextPanel::with_hold(panel, Duration::from_millis(3_000));
        let t0 = Instant::from_millis(10_000);

        text.show(DisplayLine::Network, "IP 192.168.1.50", t0);
        assert!(lit_pixels(text.panel(), DisplayLine::Network) > 0);
        assert_eq!(lit_pixels(text.panel(), DisplayLine::Status), 0);
        assert!(text.is_showing(DisplayLine::Network));

        text.service(t0 + Duration::from_millis(2_999));
        assert!(lit_pixels(text.panel(), DisplayLine::Network) > 0);

        text.service(t0 + Duration::from_millis(3_000));
        assert_eq!(lit_pixels(text.panel(), DisplayLine::Network), 0);
        assert!(!text.is_showing(DisplayLine::Network));
    }

    #[test]
    fn reshowing_a_line_replaces_text_and_extends_hold() {
        let panel = Ssd1306::new(RecordingBus::default(), DEFAULT_ADDRESS);
        let mut text = TextPanel::with_hold(panel, Duration::from_millis(1_000));
        let t0 = Instant::from_millis(0);

        text.show(DisplayLine::Status, "WiFi: FAILED", t0);
        text.show(DisplayLine::Ack, "PING ACK OK", t0);
        text.show(DisplayLine::Status, "WiFi: CONNECTED", t0 + Duration::from_millis(800));

        text.service(t0 + Duration::from_millis(1_000));
        assert!(text.is_showing(DisplayLine::Status));
        assert!(!text.is_showing(DisplayLine::Ack));
        assert_eq!(lit_pixels(text.panel(), DisplayLine::Ack), 0);
        assert!(lit_pixels(text.panel(), DisplayLine::Status) > 0);
    }
}
