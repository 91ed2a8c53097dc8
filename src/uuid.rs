//! UUIDs used by the stack.
//!
//! Two kinds of UUID appear here. [`Uuid128`] is the BLE wire representation used for the Herald
//! GATT service and its characteristics (transmitted in *little* endian over the air, like all
//! GATT UUIDs). The identity types ([`Agent`], [`SensorClass`], [`ModelClass`],
//! [`RiskParameter`]) are RFC 4122 v4 UUIDs built from a one-byte short code; they identify
//! measured phenomena, sensor kinds, risk algorithms and personal risk factors in the exposure
//! engine, and never appear on the air.
//!
//! Identity UUIDs put the short code in the first byte and a kind discriminator in the last byte,
//! giving stable compile-time identifiers without ambiguity between the namespaces. Bytes 6 and 8
//! are forced to the RFC 4122 v4 values on construction.

use crate::bytes::{ByteReader, ByteWriter, FromBytes, ToBytes};
use crate::Error;
use core::fmt;
use uuid::Uuid;

/// A full 128-bit BLE UUID.
#[derive(PartialEq, Eq, Copy, Clone)]
pub struct Uuid128([u8; 16]);

impl Uuid128 {
    /// Creates a 128-bit UUID from 16 raw bytes (encoded in big-endian).
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parses a hyphenated lowercase UUID string into its 16 bytes.
    ///
    /// Meant for constant contexts (the Herald service and characteristic UUIDs); a malformed
    /// string fails compilation by panicking during constant evaluation.
    pub const fn parse_static(s: &'static str) -> Self {
        const fn hex_nibble(c: u8) -> u8 {
            match c {
                b'0'..=b'9' => c - b'0',
                b'a'..=b'f' => c - b'a' + 10,
                _ => panic!("invalid hex digit in UUID string"),
            }
        }

        let src = s.as_bytes();
        if src.len() != 36 {
            panic!("UUID string must be 36 characters");
        }

        let mut bytes = [0; 16];
        let mut out = 0;
        let mut i = 0;
        while i < src.len() {
            if src[i] == b'-' {
                // Hyphens are fixed at offsets 8, 13, 18 and 23.
                if i != 8 && i != 13 && i != 18 && i != 23 {
                    panic!("misplaced hyphen in UUID string");
                }
                i += 1;
            } else {
                bytes[out] = (hex_nibble(src[i]) << 4) | hex_nibble(src[i + 1]);
                out += 1;
                i += 2;
            }
        }

        Uuid128(bytes)
    }

    /// Returns the raw bytes of this UUID in big-endian order.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// UUIDs are transmitted in little-endian byte order.
impl ToBytes for Uuid128 {
    fn to_bytes(&self, buffer: &mut ByteWriter<'_>) -> Result<(), Error> {
        let mut le = self.0;
        le.reverse();
        buffer.write_slice(&le)
    }
}

impl FromBytes<'_> for Uuid128 {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        let mut array: [u8; 16] = bytes.read_array()?;
        array.reverse();
        Ok(Uuid128(array))
    }
}

impl fmt::Debug for Uuid128 {
    #[allow(clippy::many_single_char_names, clippy::just_underscores_and_digits)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [_0, _1, _2, _3, _4, _5, _6, _7, _8, _9, _10, _11, _12, _13, _14, _15] = self.0;
        let a = u32::from_be_bytes([_0, _1, _2, _3]);
        let b = u16::from_be_bytes([_4, _5]);
        let c = u16::from_be_bytes([_6, _7]);
        let d = u16::from_be_bytes([_8, _9]);
        let e = u64::from_be_bytes([0, 0, _10, _11, _12, _13, _14, _15]);
        write!(f, "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}", a, b, c, d, e)
    }
}

/// Constructs an RFC 4122 v4 identity UUID from a short code and a kind discriminator.
const fn identity(short_code: u8, kind: u8) -> Uuid {
    let mut bytes = [0; 16];
    bytes[0] = short_code;
    // Force the version and variant fields to valid v4 values.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    bytes[15] = kind;
    Uuid::from_bytes(bytes)
}

macro_rules! identity_uuid {
    (
        $( #[$attr:meta] )*
        $name:ident = $kind:expr
    ) => {
        $( #[$attr] )*
        #[derive(Copy, Clone, PartialEq, Eq, Hash)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates the identity with the given short code.
            pub const fn new(short_code: u8) -> Self {
                $name(identity(short_code, $kind))
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

identity_uuid! {
    /// Identifies a kind of measured phenomenon (human proximity, luminosity, ...).
    Agent = 1
}

identity_uuid! {
    /// Identifies a kind of sensor producing exposure samples.
    SensorClass = 2
}

identity_uuid! {
    /// Identifies a risk model algorithm.
    ModelClass = 4
}

identity_uuid! {
    /// Identifies a static personal risk factor.
    RiskParameter = 3
}

/// Agents with well-known short codes, for cross-implementation compatibility.
pub mod agent {
    use super::Agent;

    /// Human proximity.
    pub const HUMAN_PROXIMITY: Agent = Agent::new(1);
    /// Single channel visible light luminosity.
    pub const LIGHT_BRIGHTNESS: Agent = Agent::new(2);
    /// Four channel visible light plus infrared luminosity.
    pub const LIGHT_RGB_IR: Agent = Agent::new(3);
    /// Radiation exposure.
    pub const RADIATION: Agent = Agent::new(4);
    /// Sound volume exposure.
    pub const SOUND: Agent = Agent::new(5);
}

/// Sensor classes with well-known short codes.
///
/// Multiple sensor classes may provide data on the same agent.
pub mod sensor_class {
    use super::SensorClass;

    /// Herald Bluetooth proximity sensor.
    pub const BLUETOOTH_PROXIMITY_HERALD: SensorClass = SensorClass::new(1);
    /// Legacy OpenTrace (V1 only) Bluetooth proximity sensor.
    pub const BLUETOOTH_PROXIMITY_OPENTRACE: SensorClass = SensorClass::new(2);
    /// Legacy Google/Apple Exposure Notification (GAEN) sensor.
    pub const BLUETOOTH_PROXIMITY_GAEN: SensorClass = SensorClass::new(3);
}

/// Static personal risk factors, typically not derived from exposure.
pub mod parameter {
    use super::RiskParameter;

    pub const WEIGHT: RiskParameter = RiskParameter::new(1);
    pub const PHENOTYPIC_SEX: RiskParameter = RiskParameter::new(2);
    pub const AGE: RiskParameter = RiskParameter::new(3);
}
