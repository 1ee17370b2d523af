//! Generic 8-bit I2C port expander access. This layer knows nothing about the
//! LCD protocol; it only moves bytes between the caller and the expander's
//! quasi-bidirectional port latch.

use embedded_hal::i2c;

use crate::Error;

/// Default PCF8574 slave address with A2/A1/A0 tied high.
pub const PCF8574_DEFAULT_ADDRESS: u8 = 0x27;

/// Abstraction over an 8-bit I/O expander port. The LCD bus engine is generic
/// over this trait so a test double can stand in for the real expander.
///
/// `set_port` transmits each byte of `values` to the port latch in a single
/// I2C burst, optionally OR-ing the configured output mask into every byte
/// first (the mask models pins that must be driven high at all times, such as
/// the data lines of a quasi-bidirectional port before a read). When the mask
/// is applied, `values` is modified in place.
pub trait PortExpander<I2C>
where
    I2C: i2c::I2c,
{
    /// Write a burst of port values, one I2C transfer for the whole slice.
    fn set_port(&mut self, values: &mut [u8], apply_mask: bool) -> Result<(), Error<I2C>>;

    /// Read `buffer.len()` bytes from the port in one I2C transfer.
    fn get_port(&mut self, buffer: &mut [u8]) -> Result<(), Error<I2C>>;

    /// Write a single port value.
    fn set_port_byte(&mut self, value: u8, apply_mask: bool) -> Result<(), Error<I2C>> {
        let mut buf = [value];
        self.set_port(&mut buf, apply_mask)
    }

    /// Read a single port value.
    fn get_port_byte(&mut self) -> Result<u8, Error<I2C>> {
        let mut buf = [0];
        self.get_port(&mut buf)?;
        Ok(buf[0])
    }

    /// Returns the underlying I2C peripheral. Mostly needed for testing.
    fn i2c(&mut self) -> &mut I2C;
}

/// PCF8574 / PCF8574A 8-bit I2C port expander.
///
/// The `mask` and `value` pair is static configuration: `mask` is OR-ed into
/// every masked write, `value` is the remaining initial latch state driven by
/// [`Pcf8574::init`].
pub struct Pcf8574<I2C>
where
    I2C: i2c::I2c,
{
    i2c: I2C,
    address: u8,
    mask: u8,
    value: u8,
}

impl<I2C> Pcf8574<I2C>
where
    I2C: i2c::I2c,
{
    pub fn new(i2c: I2C, address: u8, mask: u8, value: u8) -> Self {
        Self {
            i2c,
            address,
            mask,
            value,
        }
    }

    /// Drive the port latch to its configured initial state.
    pub fn init(&mut self) -> Result<(), Error<I2C>> {
        let initial = self.mask | self.value;
        self.set_port_byte(initial, false)
    }

    /// Float all pins by writing the latch high; the quasi-bidirectional
    /// outputs then act as inputs.
    pub fn release(&mut self) -> Result<(), Error<I2C>> {
        self.set_port_byte(0xFF, false)
    }

    pub fn address(&self) -> u8 {
        self.address
    }
}

impl<I2C> PortExpander<I2C> for Pcf8574<I2C>
where
    I2C: i2c::I2c,
{
    fn set_port(&mut self, values: &mut [u8], apply_mask: bool) -> Result<(), Error<I2C>> {
        if apply_mask {
            for value in values.iter_mut() {
                *value |= self.mask;
            }
        }
        self.i2c.write(self.address, values).map_err(Error::I2c)
    }

    fn get_port(&mut self, buffer: &mut [u8]) -> Result<(), Error<I2C>> {
        self.i2c.read(self.address, buffer).map_err(Error::I2c)
    }

    fn i2c(&mut self) -> &mut I2C {
        &mut self.i2c
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    #[test]
    fn test_set_port_applies_mask_to_every_byte() {
        let expected_transactions =
            [I2cTransaction::write(0x27, std::vec![0x38, 0x3C, 0x38])];
        let i2c = I2cMock::new(&expected_transactions);
        let mut port = Pcf8574::new(i2c, PCF8574_DEFAULT_ADDRESS, 0x08, 0x00);

        let mut burst = [0x30, 0x34, 0x30];
        assert!(port.set_port(&mut burst, true).is_ok());
        // masked in place
        assert_eq!(burst, [0x38, 0x3C, 0x38]);
        port.i2c().done();
    }

    #[test]
    fn test_set_port_without_mask() {
        let expected_transactions = [I2cTransaction::write(0x27, std::vec![0x30, 0x34])];
        let i2c = I2cMock::new(&expected_transactions);
        let mut port = Pcf8574::new(i2c, PCF8574_DEFAULT_ADDRESS, 0xF0, 0x00);

        let mut burst = [0x30, 0x34];
        assert!(port.set_port(&mut burst, false).is_ok());
        assert_eq!(burst, [0x30, 0x34]);
        port.i2c().done();
    }

    #[test]
    fn test_single_byte_wrappers() {
        let expected_transactions = [
            I2cTransaction::write(0x27, std::vec![0x0C]),
            I2cTransaction::read(0x27, std::vec![0xA5]),
        ];
        let i2c = I2cMock::new(&expected_transactions);
        let mut port = Pcf8574::new(i2c, PCF8574_DEFAULT_ADDRESS, 0x08, 0x00);

        assert!(port.set_port_byte(0x04, true).is_ok());
        assert_eq!(port.get_port_byte().unwrap(), 0xA5);
        port.i2c().done();
    }

    #[test]
    fn test_init_drives_mask_and_value() {
        let expected_transactions = [I2cTransaction::write(0x27, std::vec![0x09])];
        let i2c = I2cMock::new(&expected_transactions);
        let mut port = Pcf8574::new(i2c, PCF8574_DEFAULT_ADDRESS, 0x08, 0x01);

        assert_eq!(port.address(), 0x27);
        assert!(port.init().is_ok());
        port.i2c().done();
    }

    #[test]
    fn test_release_floats_all_pins() {
        let expected_transactions = [I2cTransaction::write(0x27, std::vec![0xFF])];
        let i2c = I2cMock::new(&expected_transactions);
        let mut port = Pcf8574::new(i2c, PCF8574_DEFAULT_ADDRESS, 0x08, 0x00);

        assert!(port.release().is_ok());
        port.i2c().done();
    }

    #[test]
    fn test_transport_failure_surfaces() {
        let expected_transactions = [I2cTransaction::write(0x27, std::vec![0x00])
            .with_error(embedded_hal::i2c::ErrorKind::Other)];
        let i2c = I2cMock::new(&expected_transactions);
        let mut port = Pcf8574::new(i2c, PCF8574_DEFAULT_ADDRESS, 0x00, 0x00);

        assert!(port.set_port_byte(0x00, true).is_err());
        port.i2c().done();
    }
}
