//! This Rust `embedded-hal`-based library drives a [HD44780](https://en.wikipedia.org/wiki/Hitachi_HD44780_LCD_controller)
//! compatible character display that is reachable only through a PCF8574 I2C port expander
//! ("I2C backpack") in an embedded, `no_std` environment. The microcontroller never touches the
//! LCD's parallel bus directly; the driver reconstructs correct 4-bit parallel transactions out
//! of I2C byte bursts against the expander's port latch.
//!
//! Three layers, leaf first:
//! - [`expander`]: generic 8-bit port expander access ([`Pcf8574`] behind the [`PortExpander`]
//!   trait), with no LCD knowledge.
//! - [`bus`]: the [`LcdBus`] engine that sequences enable-pulse latching, batches the port
//!   snapshots of one logical register access into a single I2C burst, and applies the
//!   controller's settle delays.
//! - [`LcdDriver`]: the public operation set (clear, home, shift, glyph definition, character
//!   I/O, backlight) and the power-on bring-up state machine.
//!
//! Key features include:
//! - Documented HD44780 bring-up handshake that tolerates an unknown controller power-on state
//! - Reading back DDRAM/CGRAM contents and the busy flag / address counter
//! - Backlight control that bypasses the command protocol entirely
//! - `core::fmt::Write` implementation for easy use with the `write!` macro
//! - Compatible with the `embedded-hal` traits v1.0 and later
//! - Optional support for the `defmt` and `ufmt` logging frameworks
//!
//! ## Usage
//! Add this to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! hd44780-pcf8574 = { version = "0.1", features = ["defmt"] }
//! ```
//! Then create and start a driver:
//! ```rust
//! use hd44780_pcf8574::{LcdPcf8574, Pcf8574, PCF8574_DEFAULT_ADDRESS};
//!
//! // board setup
//! let i2c = ...; // I2C peripheral
//! let delay = ...; // DelayNs implementation
//!
//! // It is recommended that the `i2c` object be wrapped in an
//! // `embedded_hal_bus::i2c::CriticalSectionDevice` so that it can be shared between
//! // multiple peripherals on the same bus.
//!
//! let port = Pcf8574::new(i2c, PCF8574_DEFAULT_ADDRESS, 0x00, 0x00);
//! let mut lcd = LcdPcf8574::new(port, delay);
//! lcd.start()?;
//! ```
//! Use the display:
//! ```rust
//! lcd.clear_screen()?;
//! lcd.draw_text(0, 0, b"Hello, world!")?;
//! // or position the cursor and use the `write!` macro
//! use core::fmt::Write;
//! lcd.move_to(1, 0)?;
//! write!(lcd, "line two")?;
//! ```
//! A driver owns its port expander and delay provider exclusively; one driver instance exists
//! per physical LCD unit, and instances are independent. Exclusive `&mut` access to an
//! instance is what guarantees the nibble sequences of two operations never interleave on the
//! wire.
//!
//! ### Reading from the display
//! [`LcdDriver::read_data`] positions the address register in DDRAM or CGRAM and reads one
//! byte back. [`LcdDriver::busy_status`] reads the instruction register, yielding the busy
//! flag and the address counter as separate values.

#![no_std]

use core::fmt::Display;

use embedded_hal::{delay::DelayNs, i2c};

pub mod bus;
pub mod expander;

pub use bus::{BusWidth, LcdBus, PortImage};
pub use expander::{Pcf8574, PortExpander, PCF8574_DEFAULT_ADDRESS};

/// HD44780 display behind a generic PCF8574 I2C port expander.
pub type LcdPcf8574<I2C, DELAY> = LcdDriver<I2C, Pcf8574<I2C>, DELAY>;

// commands
const LCD_CMD_CLEAR_DISPLAY: u8 = 0x01; //  Clear display, reset cursor; takes 1.52ms internally
const LCD_CMD_RETURN_HOME: u8 = 0x02; //  Cursor to address zero, undo display shift; takes 1.52ms
const LCD_CMD_ENTRY_MODE_SET: u8 = 0x04; //  Address increment/decrement and display shift on write
const LCD_CMD_DISPLAY_CONTROL: u8 = 0x08; //  Display / cursor / blink on-off bits
const LCD_CMD_CONTENT_SHIFT: u8 = 0x10; //  Shift cursor or whole display left/right
const LCD_CMD_FUNCTION_SET: u8 = 0x20; //  Bus width, line count, font
const LCD_CMD_SET_CGRAM_ADDR: u8 = 0x40; //  Position the address counter in CGRAM
const LCD_CMD_SET_DDRAM_ADDR: u8 = 0x80; //  Position the address counter in DDRAM

// flags for entry mode set
const LCD_FLAG_ENTRY_MODE_INC: u8 = 0x02; //  Increment DDRAM address on each write

// flags for display control
const LCD_FLAG_CURSOR_BLINK_ON: u8 = 0x01;
const LCD_FLAG_CURSOR_ON: u8 = 0x02;
const LCD_FLAG_DISPLAY_ON: u8 = 0x04;

// flags for content shift
const LCD_FLAG_SHIFT_TO_RIGHT: u8 = 0x04;
const LCD_FLAG_SHIFT_DISPLAY: u8 = 0x08; //  Shift the display rather than the cursor

// flags for function set
const LCD_FLAG_TWO_LINE: u8 = 0x08; //  2-line display mode
const LCD_FLAG_BUS_8BIT: u8 = 0x10; //  8-bit bus width

// busy flag / address counter read
const LCD_BUSY_FLAG: u8 = 0x80;
const LCD_ADDRESS_COUNTER_MASK: u8 = 0x7F;

// address masks
const LCD_CGRAM_ADDR_MASK: u8 = 0x3F;
const LCD_DDRAM_ADDR_MASK: u8 = 0x7F;

/// DDRAM stride of row 1 relative to row 0, and the cap on one `draw_text` run.
pub const DEFAULT_LINE_WIDTH: u8 = 0x40;

/// Errors that can occur when driving the display.
#[derive(Debug, PartialEq, Copy, Clone)]
pub enum Error<I2C>
where
    I2C: i2c::I2c,
{
    /// I2C transfer did not complete (NACK or bus error) and the transaction
    /// was aborted. No retry is attempted; that policy belongs to the caller.
    I2c(I2C::Error),
}

impl<I2C> From<&Error<I2C>> for &'static str
where
    I2C: i2c::I2c,
{
    fn from(err: &Error<I2C>) -> Self {
        match err {
            Error::I2c(_) => "I2C transport error",
        }
    }
}

#[cfg(feature = "defmt")]
impl<I2C> defmt::Format for Error<I2C>
where
    I2C: i2c::I2c,
{
    fn format(&self, fmt: defmt::Formatter) {
        let msg: &'static str = From::from(self);
        defmt::write!(fmt, "{}", msg);
    }
}

#[cfg(feature = "ufmt")]
impl<I2C> ufmt::uDisplay for Error<I2C>
where
    I2C: i2c::I2c,
{
    fn fmt<W>(&self, w: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        let msg: &'static str = From::from(self);
        ufmt::uwrite!(w, "{}", msg)
    }
}

impl<I2C> Display for Error<I2C>
where
    I2C: i2c::I2c,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg: &'static str = From::from(self);
        write!(f, "{}", msg)
    }
}

/// Driver lifecycle. A freshly constructed driver is `Stop`; `start` runs the
/// bring-up sequence and moves it to `Ready`; `stop` returns it to `Stop`,
/// from where it may be started again.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State {
    Stop,
    Ready,
}

/// Decoded instruction-register read: the busy flag and the address counter,
/// as two separate channels rather than a sentinel-overloaded byte.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct BusyStatus {
    /// Controller is still executing the previous instruction.
    pub busy: bool,
    /// Current CGRAM/DDRAM address counter, 7 bits.
    pub address: u8,
}

/// HD44780 controller driver. Generic over the port expander so a test double
/// can replace the hardware below the bus engine.
pub struct LcdDriver<I2C, EXP, DELAY>
where
    I2C: i2c::I2c,
    EXP: PortExpander<I2C>,
    DELAY: DelayNs,
{
    bus: LcdBus<I2C, EXP, DELAY>,
    state: State,
    line_width: u8,
}

impl<I2C, EXP, DELAY> LcdDriver<I2C, EXP, DELAY>
where
    I2C: i2c::I2c,
    EXP: PortExpander<I2C>,
    DELAY: DelayNs,
{
    /// Create a driver with the default DDRAM line width of 0x40.
    pub fn new(expander: EXP, delay: DELAY) -> Self {
        Self::new_with_line_width(expander, delay, DEFAULT_LINE_WIDTH)
    }

    /// Create a driver with an explicit DDRAM line width. The width is both
    /// the row stride used by [`LcdDriver::move_to`] and the cap on one
    /// [`LcdDriver::draw_text`] run.
    pub fn new_with_line_width(expander: EXP, delay: DELAY, line_width: u8) -> Self {
        Self {
            bus: LcdBus::new(expander, delay),
            state: State::Stop,
            line_width,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Run the controller's documented power-on bring-up and move to
    /// [`State::Ready`]. May be called again after [`LcdDriver::stop`] to
    /// restart the display.
    ///
    /// The handshake is executed in 8-bit addressing until the explicit
    /// switch: the function-set instruction is issued three times with
    /// decreasing waits to force the controller out of any of its three
    /// possible power-on states (8-bit mode; 4-bit mode awaiting the first
    /// nibble; 4-bit mode awaiting the second nibble) into known 8-bit mode,
    /// then once more to select 4-bit addressing.
    pub fn start(&mut self) -> Result<(), Error<I2C>> {
        // Power-on wait; the controller needs > 40ms after VCC is stable.
        self.bus.delay().delay_ms(40);

        self.bus
            .write_ir(BusWidth::EightBit, LCD_CMD_FUNCTION_SET | LCD_FLAG_BUS_8BIT)?;
        // > 4.1ms
        self.bus.delay().delay_ms(5);

        self.bus
            .write_ir(BusWidth::EightBit, LCD_CMD_FUNCTION_SET | LCD_FLAG_BUS_8BIT)?;
        // > 100us
        self.bus.delay().delay_ms(1);

        // The controller is now either in its original 8-bit mode or awaiting
        // the second nibble; one more pass settles both.
        self.bus
            .write_ir(BusWidth::EightBit, LCD_CMD_FUNCTION_SET | LCD_FLAG_BUS_8BIT)?;

        // Definitely in 8-bit mode now; switch to 4-bit addressing.
        self.bus.write_ir(BusWidth::EightBit, LCD_CMD_FUNCTION_SET)?;

        // Line count and font, now over the 4-bit bus: 2-line, 5x8.
        self.bus
            .write_ir(BusWidth::FourBit, LCD_CMD_FUNCTION_SET | LCD_FLAG_TWO_LINE)?;

        // Display off.
        self.bus.write_ir(BusWidth::FourBit, LCD_CMD_DISPLAY_CONTROL)?;

        self.clear_screen()?;

        // Entry mode: increment address, no display shift.
        self.bus.write_ir(
            BusWidth::FourBit,
            LCD_CMD_ENTRY_MODE_SET | LCD_FLAG_ENTRY_MODE_INC,
        )?;

        self.return_home()?;

        // One discarded busy/address poll to flush the pipeline.
        self.busy_status()?;

        self.set_display(true, false, false)?;

        self.state = State::Ready;
        Ok(())
    }

    /// Blank the display and cut the backlight, moving to [`State::Stop`].
    /// The port image is otherwise retained; a subsequent `start` reuses it.
    pub fn stop(&mut self) -> Result<(), Error<I2C>> {
        self.set_display(false, false, false)?;
        self.bus.set_backlight(false)?;

        self.state = State::Stop;
        Ok(())
    }

    /// Set the display, cursor and cursor-blink enable bits.
    pub fn set_display(
        &mut self,
        display: bool,
        cursor: bool,
        blink: bool,
    ) -> Result<(), Error<I2C>> {
        let mut ctrl = 0;
        if display {
            ctrl |= LCD_FLAG_DISPLAY_ON;
        }
        if cursor {
            ctrl |= LCD_FLAG_CURSOR_ON;
        }
        if blink {
            ctrl |= LCD_FLAG_CURSOR_BLINK_ON;
        }
        self.bus
            .write_ir(BusWidth::FourBit, LCD_CMD_DISPLAY_CONTROL | ctrl)
    }

    /// Clear the display and reset the cursor. The controller sweeps all of
    /// DDRAM internally, so this blocks for the mandated 2ms before returning.
    pub fn clear_screen(&mut self) -> Result<(), Error<I2C>> {
        self.bus.write_ir(BusWidth::FourBit, LCD_CMD_CLEAR_DISPLAY)?;
        self.bus.delay().delay_ms(2);
        Ok(())
    }

    /// Return the cursor to address zero and undo any display shift. Blocks
    /// for the mandated 2ms like [`LcdDriver::clear_screen`].
    pub fn return_home(&mut self) -> Result<(), Error<I2C>> {
        self.bus.write_ir(BusWidth::FourBit, LCD_CMD_RETURN_HOME)?;
        self.bus.delay().delay_ms(2);
        Ok(())
    }

    /// Shift the cursor, or the entire display, one position left or right.
    pub fn shift_content(&mut self, display: bool, right: bool) -> Result<(), Error<I2C>> {
        let mut ctrl = 0;
        if display {
            ctrl |= LCD_FLAG_SHIFT_DISPLAY;
        }
        if right {
            ctrl |= LCD_FLAG_SHIFT_TO_RIGHT;
        }
        self.bus
            .write_ir(BusWidth::FourBit, LCD_CMD_CONTENT_SHIFT | ctrl)
    }

    /// Define one of the 8 CGRAM glyph slots from an 8-byte 5x8 pattern. The
    /// slot index is masked to 0-7. The glyph is displayed by writing the
    /// slot index as a character code.
    pub fn update_pattern(&mut self, slot: u8, pattern: &[u8; 8]) -> Result<(), Error<I2C>> {
        let pos = (slot & 0x07) << 3;
        self.bus
            .write_ir(BusWidth::FourBit, LCD_CMD_SET_CGRAM_ADDR | pos)?;

        for &byte in pattern.iter() {
            self.bus.write_dr(BusWidth::FourBit, byte)?;
        }
        Ok(())
    }

    /// Move the cursor to `(row, col)`. The DDRAM address is row times the
    /// configured line width plus column, masked to 7 bits.
    pub fn move_to(&mut self, row: u8, col: u8) -> Result<(), Error<I2C>> {
        let pos = (row as u16 * self.line_width as u16 + col as u16) as u8 & LCD_DDRAM_ADDR_MASK;
        self.bus
            .write_ir(BusWidth::FourBit, LCD_CMD_SET_DDRAM_ADDR | pos)
    }

    /// Write one character code at the cursor; the controller advances the
    /// address counter per the entry mode.
    pub fn put_char(&mut self, ch: u8) -> Result<(), Error<I2C>> {
        self.bus.write_dr(BusWidth::FourBit, ch)
    }

    /// Draw a text run starting at `(row, col)`. At most one line width of
    /// characters is written; returns the count actually written.
    pub fn draw_text(&mut self, row: u8, col: u8, text: &[u8]) -> Result<u8, Error<I2C>> {
        self.move_to(row, col)?;

        let count = text.len().min(self.line_width as usize);
        for &ch in &text[..count] {
            self.bus.write_dr(BusWidth::FourBit, ch)?;
        }
        Ok(count as u8)
    }

    /// Read one byte back from DDRAM (`ddram` true) or CGRAM at the given
    /// offset, by positioning the address register there first. The offset is
    /// masked to the addressed RAM's range.
    pub fn read_data(&mut self, ddram: bool, offset: u8) -> Result<u8, Error<I2C>> {
        if ddram {
            let pos = offset & LCD_DDRAM_ADDR_MASK;
            self.bus
                .write_ir(BusWidth::FourBit, LCD_CMD_SET_DDRAM_ADDR | pos)?;
        } else {
            let pos = offset & LCD_CGRAM_ADDR_MASK;
            self.bus
                .write_ir(BusWidth::FourBit, LCD_CMD_SET_CGRAM_ADDR | pos)?;
        }

        self.bus.read_dr(BusWidth::FourBit)
    }

    /// Read the busy flag and address counter from the instruction register.
    pub fn busy_status(&mut self) -> Result<BusyStatus, Error<I2C>> {
        let raw = self.bus.read_ir(BusWidth::FourBit)?;
        Ok(BusyStatus {
            busy: raw & LCD_BUSY_FLAG != 0,
            address: raw & LCD_ADDRESS_COUNTER_MASK,
        })
    }

    /// Whether the controller is still executing the previous instruction.
    pub fn is_busy(&mut self) -> Result<bool, Error<I2C>> {
        Ok(self.busy_status()?.busy)
    }

    /// Turn the backlight on or off. A single direct port write that bypasses
    /// the command protocol; valid in any lifecycle state.
    pub fn set_backlight(&mut self, on: bool) -> Result<(), Error<I2C>> {
        self.bus.set_backlight(on)
    }

    /// Invert the backlight.
    pub fn toggle_backlight(&mut self) -> Result<(), Error<I2C>> {
        self.bus.toggle_backlight()
    }

    /// Last commanded backlight state.
    pub fn backlight(&self) -> bool {
        self.bus.backlight()
    }

    /// returns a reference to the I2C peripheral. mostly needed for testing
    #[cfg(test)]
    fn i2c(&mut self) -> &mut I2C {
        self.bus.expander().i2c()
    }
}

/// Implement the `core::fmt::Write` trait for the driver, allowing it to be
/// used with the `write!` macro. Characters are written at the current cursor
/// position.
impl<I2C, EXP, DELAY> core::fmt::Write for LcdDriver<I2C, EXP, DELAY>
where
    I2C: i2c::I2c,
    EXP: PortExpander<I2C>,
    DELAY: DelayNs,
{
    fn write_str(&mut self, s: &str) -> Result<(), core::fmt::Error> {
        for c in s.chars() {
            if self.put_char(c as u8).is_err() {
                return Err(core::fmt::Error);
            }
        }
        Ok(())
    }
}

#[cfg(feature = "ufmt")]
/// Implement the `ufmt::uWrite` trait for the driver, allowing it to be used
/// with the `uwriteln!` and `uwrite!` macros.
impl<I2C, EXP, DELAY> ufmt::uWrite for LcdDriver<I2C, EXP, DELAY>
where
    I2C: i2c::I2c,
    EXP: PortExpander<I2C>,
    DELAY: DelayNs,
{
    type Error = Error<I2C>;

    fn write_str(&mut self, s: &str) -> Result<(), Error<I2C>> {
        for c in s.chars() {
            self.put_char(c as u8)?;
        }
        Ok(())
    }
}
