//! LCD bus engine: turns logical register accesses into correctly sequenced
//! port expander transactions.
//!
//! The HD44780 sits behind the expander on a 4-bit bus, so every byte moves
//! as two nibbles, each latched by a rising-then-falling pulse on the enable
//! line. The engine keeps a live [`PortImage`] of the last byte driven onto
//! the port and derives every transmitted byte from it; the snapshots that
//! make up one logical access are batched into a single I2C burst to keep
//! bus traffic down.

use core::marker::PhantomData;

use embedded_hal::{delay::DelayNs, i2c};

use crate::{expander::PortExpander, Error};

/// Max execution time of ordinary instructions (not clear display / return
/// home) is 37us when f(OSC) is 270kHz.
const SETTLE_US: u32 = 37;

/// Longest burst one logical access queues: three port snapshots per nibble,
/// two nibbles per byte.
const MAX_BURST_LEN: usize = 6;

/// Addressing width of a bus access. `EightBit` transfers only the high
/// nibble and exists for the bring-up handshake, where the controller must be
/// spoken to as if it had a full-width bus.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BusWidth {
    FourBit,
    EightBit,
}

/// In-memory mirror of the expander's output latch, with one named field per
/// LCD control line. This is the only source of truth for what was last
/// driven onto the port; transmitted bytes are always serialized from it via
/// [`PortImage::as_byte`].
#[derive(Debug, Clone, Copy)]
pub struct PortImage {
    /// Register select: false = instruction register, true = data register.
    pub rs: bool,
    /// Read/write: false = write, true = read.
    pub rw: bool,
    /// Enable line; the controller samples the data lines on its falling edge.
    pub en: bool,
    /// Backlight.
    pub bl: bool,
    /// 4-bit data nibble on the expander's upper pins.
    pub data: u8,
}

impl PortImage {
    /// Fresh image: all control lines low, backlight on.
    pub const fn new() -> Self {
        Self {
            rs: false,
            rw: false,
            en: false,
            bl: true,
            data: 0,
        }
    }

    /// Serialize to the wire byte: RS bit 0, RW bit 1, EN bit 2, BL bit 3,
    /// data nibble in bits 7..4.
    pub fn as_byte(&self) -> u8 {
        (self.rs as u8)
            | (self.rw as u8) << 1
            | (self.en as u8) << 2
            | (self.bl as u8) << 3
            | (self.data & 0x0F) << 4
    }

    /// Extract the data nibble from a byte captured off the port.
    pub fn data_from_byte(byte: u8) -> u8 {
        byte >> 4
    }
}

impl Default for PortImage {
    fn default() -> Self {
        Self::new()
    }
}

/// The bus engine. Owns the port expander, the delay provider and the live
/// port image. Exclusive access through `&mut self` guarantees the nibble
/// sequence of one logical access is never interleaved with another.
pub struct LcdBus<I2C, EXP, DELAY>
where
    I2C: i2c::I2c,
    EXP: PortExpander<I2C>,
    DELAY: DelayNs,
{
    expander: EXP,
    delay: DELAY,
    image: PortImage,
    _marker: PhantomData<I2C>,
}

impl<I2C, EXP, DELAY> LcdBus<I2C, EXP, DELAY>
where
    I2C: i2c::I2c,
    EXP: PortExpander<I2C>,
    DELAY: DelayNs,
{
    pub fn new(expander: EXP, delay: DELAY) -> Self {
        Self {
            expander,
            delay,
            image: PortImage::new(),
            _marker: PhantomData,
        }
    }

    /// Write `value` to the instruction register.
    pub fn write_ir(&mut self, width: BusWidth, value: u8) -> Result<(), Error<I2C>> {
        self.image.rs = false;
        self.image.rw = false;
        self.write_payload(width, value)
    }

    /// Write `value` to the data register (CGRAM or DDRAM, per the last
    /// address-set instruction).
    pub fn write_dr(&mut self, width: BusWidth, value: u8) -> Result<(), Error<I2C>> {
        self.image.rs = true;
        self.image.rw = false;
        self.write_payload(width, value)
    }

    /// Read the instruction register: busy flag in bit 7, address counter in
    /// bits 6..0.
    pub fn read_ir(&mut self, width: BusWidth) -> Result<u8, Error<I2C>> {
        self.image.rs = false;
        self.image.rw = true;
        self.read_payload(width)
    }

    /// Read a byte from the data register.
    pub fn read_dr(&mut self, width: BusWidth) -> Result<u8, Error<I2C>> {
        self.image.rs = true;
        self.image.rw = true;
        self.read_payload(width)
    }

    /// Drive the backlight line directly. A single port write with no
    /// enable-pulse sequencing; safe to issue regardless of lifecycle state.
    pub fn set_backlight(&mut self, on: bool) -> Result<(), Error<I2C>> {
        self.image.bl = on;
        let byte = self.image.as_byte();
        self.expander.set_port_byte(byte, true)
    }

    /// Invert the backlight line.
    pub fn toggle_backlight(&mut self) -> Result<(), Error<I2C>> {
        let on = !self.image.bl;
        self.set_backlight(on)
    }

    pub fn backlight(&self) -> bool {
        self.image.bl
    }

    pub fn delay(&mut self) -> &mut DELAY {
        &mut self.delay
    }

    pub fn expander(&mut self) -> &mut EXP {
        &mut self.expander
    }

    /// Queue the setup/latch/unlatch snapshot triple for each nibble of
    /// `value` and flush them as one burst, then let the instruction settle.
    /// RS/RW/BL are held from the current image.
    fn write_payload(&mut self, width: BusWidth, value: u8) -> Result<(), Error<I2C>> {
        let mut burst = [0u8; MAX_BURST_LEN];
        let mut len = 0;

        self.image.data = value >> 4;
        burst[len] = self.image.as_byte();
        len += 1;

        self.image.en = true;
        burst[len] = self.image.as_byte();
        len += 1;

        self.image.en = false;
        burst[len] = self.image.as_byte();
        len += 1;

        if width == BusWidth::FourBit {
            self.image.data = value & 0x0F;
            burst[len] = self.image.as_byte();
            len += 1;

            self.image.en = true;
            burst[len] = self.image.as_byte();
            len += 1;

            self.image.en = false;
            burst[len] = self.image.as_byte();
            len += 1;
        }

        self.expander.set_port(&mut burst[..len], true)?;

        self.delay.delay_us(SETTLE_US);
        Ok(())
    }

    /// Release the data lines, pulse enable and capture one nibble per pulse.
    /// The port is written once more at the end to leave the bus idle.
    fn read_payload(&mut self, width: BusWidth) -> Result<u8, Error<I2C>> {
        let mut pair = [0u8; 2];

        // Data lines high so the quasi-bidirectional port reads the
        // controller's output.
        self.image.data = 0x0F;
        pair[0] = self.image.as_byte();
        self.image.en = true;
        pair[1] = self.image.as_byte();
        self.expander.set_port(&mut pair, true)?;

        let captured = self.expander.get_port_byte()?;
        let mut value = captured & 0xF0;

        if width == BusWidth::FourBit {
            self.image.en = false;
            pair[0] = self.image.as_byte();
            self.image.en = true;
            pair[1] = self.image.as_byte();
            self.expander.set_port(&mut pair, true)?;

            let captured = self.expander.get_port_byte()?;
            value |= PortImage::data_from_byte(captured);
        }

        self.image.en = false;
        let idle = self.image.as_byte();
        self.expander.set_port_byte(idle, true)?;

        // A busy flag / address counter read needs the same settle time as an
        // ordinary instruction; data register reads return immediately.
        if !self.image.rs && self.image.rw {
            self.delay.delay_us(SETTLE_US);
        }

        Ok(value)
    }
}
