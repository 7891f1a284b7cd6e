//! Buffered SH1106 128x64 OLED over I2C.
//!
//! Drawing only touches the in-memory frame; [`Sh1106::flush`] pushes all
//! eight pages to the controller.

use core::convert::Infallible;

use embedded_graphics::{pixelcolor::BinaryColor, prelude::*};
use embedded_hal::i2c::I2c;

pub const SH1106_ADDRESS: u8 = 0x3C;

const WIDTH: usize = 128;
const HEIGHT: usize = 64;
const PAGES: usize = HEIGHT / 8;
const BUFFER_SIZE: usize = WIDTH * PAGES;

/// Controller RAM is 132 columns wide; the glass starts at column 2.
const COLUMN_OFFSET: u8 = 2;

const CONTROL_COMMAND: u8 = 0x00;
const CONTROL_DATA: u8 = 0x40;

const INIT_SEQUENCE: &[u8] = &[
    0xAE, // display off
    0xD5, 0x80, // clock divide / oscillator
    0xA8, 0x3F, // multiplex ratio 64
    0xD3, 0x00, // display offset
    0x40, // start line 0
    0xAD, 0x8B, // DC-DC on
    0xA1, // segment remap
    0xC8, // COM scan descending
    0xDA, 0x12, // COM pins
    0x81, 0xCF, // contrast
    0xD9, 0x22, // precharge
    0xDB, 0x40, // VCOM deselect
    0xA4, // follow RAM
    0xA6, // normal polarity
    0xAF, // display on
];

pub struct Sh1106<I> {
    i2c: I,
    address: u8,
    buffer: [u8; BUFFER_SIZE],
}

impl<I: I2c> Sh1106<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self {
            i2c,
            address,
            buffer: [0; BUFFER_SIZE],
        }
    }

    pub fn init(&mut self) -> Result<(), I::Error> {
        self.command(INIT_SEQUENCE)?;
        self.flush()
    }

    pub fn flush(&mut self) -> Result<(), I::Error> {
        for page in 0..PAGES {
            self.command(&[
                0xB0 | page as u8,
                COLUMN_OFFSET & 0x0F,
                0x10 | (COLUMN_OFFSET >> 4),
            ])?;

            let mut frame = [0_u8; WIDTH + 1];
            frame[0] = CONTROL_DATA;
            frame[1..].copy_from_slice(&self.buffer[page * WIDTH..(page + 1) * WIDTH]);
            self.i2c.write(self.address, &frame)?;
        }
        Ok(())
    }

    pub fn release(self) -> I {
        self.i2c
    }

    fn command(&mut self, bytes: &[u8]) -> Result<(), I::Error> {
        let mut frame = Vec::with_capacity(bytes.len() + 1);
        frame.push(CONTROL_COMMAND);
        frame.extend_from_slice(bytes);
        self.i2c.write(self.address, &frame)
    }
}

impl<I> OriginDimensions for Sh1106<I> {
    fn size(&self) -> Size {
        Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

impl<I> DrawTarget for Sh1106<I> {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<P>(&mut self, pixels: P) -> Result<(), Self::Error>
    where
        P: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            let (Ok(x), Ok(y)) = (usize::try_from(point.x), usize::try_from(point.y)) else {
                continue;
            };
            if x >= WIDTH || y >= HEIGHT {
                continue;
            }

            let index = (y / 8) * WIDTH + x;
            let bit = 1_u8 << (y % 8);
            match color {
                BinaryColor::On => self.buffer[index] |= bit,
                BinaryColor::Off => self.buffer[index] &= !bit,
            }
        }
        Ok(())
    }
}
