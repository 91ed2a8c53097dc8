//! 6-byte BLE addresses.
//!
//! The proximity engine deals with two flavors of address: the physical MAC observed by the radio,
//! and the Herald *pseudo-address* carried in the first 6 bytes of the advertised manufacturer
//! data. Both are the same width and interchangeable wherever only identity is needed, so a single
//! type covers both; fields and parameters are named `mac` or `pseudo` where the flavor matters.

use crate::bytes::{ByteReader, ByteWriter, FromBytes, ToBytes};
use crate::Error;
use core::fmt;
use rand_core::RngCore;

/// A 6-byte BLE device address or Herald pseudo-address.
///
/// Comparison is lexicographic with byte index 0 most significant, which the derived `Ord`
/// provides. The bytes are stored as they are sent over the air.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BleAddress([u8; 6]);

impl BleAddress {
    /// Creates an address from 6 raw bytes in wire order.
    pub const fn new(bytes: [u8; 6]) -> Self {
        BleAddress(bytes)
    }

    /// Generates a random pseudo-address.
    ///
    /// Herald peers rotate the address advertised in their manufacturer data independently of the
    /// MAC; the entropy source is supplied by the platform.
    pub fn random(rng: &mut impl RngCore) -> Self {
        let mut bytes = [0; 6];
        rng.fill_bytes(&mut bytes);
        BleAddress(bytes)
    }

    /// Returns the raw bytes making up this address.
    pub fn raw(&self) -> &[u8; 6] {
        &self.0
    }
}

impl ToBytes for BleAddress {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_slice(&self.0)
    }
}

impl FromBytes<'_> for BleAddress {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(BleAddress(bytes.read_array()?))
    }
}

impl fmt::Debug for BleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Note: Bluetooth device addresses are usually displayed with MSB
        // first, so that the OUI (Organizationally Unique Identifier) is at
        // the start of the address and thus acts as a prefix, not as a suffix.
        for (i, b) in self.0.iter().rev().enumerate() {
            if i != 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cmp::Ordering;

    #[test]
    fn debug_representation() {
        let addr = BleAddress::new([0x5A, 0x92, 0x04, 0x26, 0xC6, 0x88]);
        assert_eq!(format!("{:?}", addr), "88:C6:26:04:92:5A");
    }

    #[test]
    fn ordering() {
        let a = BleAddress::new([1, 0, 0, 0, 0, 0]);
        let b = BleAddress::new([2, 0, 0, 0, 0, 0]);
        // Byte index 0 is most significant for comparison.
        assert_eq!(a.cmp(&b), Ordering::Less);
        assert_eq!(b.cmp(&a), Ordering::Greater);
        assert_eq!(a.cmp(&a), Ordering::Equal);

        // Later bytes only break ties.
        let c = BleAddress::new([1, 0, 0, 0, 0, 9]);
        assert_eq!(a.cmp(&c), Ordering::Less);
    }

    #[test]
    fn roundtrip() {
        let addr = BleAddress::new([1, 2, 3, 4, 5, 6]);
        let mut buf = [0; 6];
        addr.to_bytes(&mut ByteWriter::new(&mut buf)).unwrap();
        let decoded = BleAddress::from_bytes(&mut ByteReader::new(&buf)).unwrap();
        assert_eq!(decoded, addr);
    }
}
