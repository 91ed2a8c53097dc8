//! The rotating identity payload (ID `0x10`).
//!
//! Instead of a fixed client identifier, this format advertises a 16-byte *contact identifier*
//! derived deterministically from a device-private secret key and the current day and period.
//! Observers can record identifiers without being able to link them across periods; the holder
//! of the secret key (or of a day's matching key) can re-derive them for matching.
//!
//! # Key schedule
//!
//! The derivation uses three primitive functions over byte strings: `h` (SHA-256), `t`
//! (truncation to the first half, or to `n` bytes), and `xor`. Seeds are chained downwards from
//! the end of the key's lifetime so that revealing the key material for one day reveals nothing
//! about later days:
//!
//! ```text
//! matchingKeySeed[daysFor] = h(t(secretKey))
//! matchingKeySeed[d]       = h(t(matchingKeySeed[d + 1]))
//! matchingKey[d]           = h(xor(matchingKeySeed[d], matchingKeySeed[d + 1]))
//!
//! contactKeySeed[periods]  = h(t(matchingKey[d]))
//! contactKeySeed[p]        = h(t(contactKeySeed[p + 1]))
//! contactKey[p]            = h(xor(contactKeySeed[p], contactKeySeed[p + 1]))
//!
//! contactIdentifier[d, p]  = t(contactKey[p], 16)
//! ```
//!
//! `day` and `period` are derived from a configurable epoch: `day = (now - epoch) / 86400`,
//! `period = ((now - epoch) % 86400) * periodsInDay / 86400`.
//!
//! The hash is pluggable through [`Hash256`] so platforms with hardware SHA-256 or a different
//! crypto library can substitute their own; [`Sha2`] is the software default.

use super::{extended::ExtendedData, Envelope, PayloadSupplier, SIMPLE_PAYLOAD_ID};
use crate::bytes::{ByteReader, ByteWriter, FromBytes, ToBytes};
use crate::time::Timestamp;
use crate::utils::HexSlice;
use crate::Error;
use core::fmt;
use rand_core::RngCore;

/// Size of the device-private secret key in bytes.
pub const SECRET_KEY_SIZE: usize = 2048;

/// Size of a contact identifier in bytes.
pub const CONTACT_IDENTIFIER_SIZE: usize = 16;

/// A 256-bit hash usable by the key schedule.
pub trait Hash256 {
    /// Hashes `data` and returns the 32-byte digest.
    fn hash(&mut self, data: &[u8]) -> [u8; 32];
}

/// Software SHA-256 backend.
#[derive(Default)]
pub struct Sha2;

impl Hash256 for Sha2 {
    fn hash(&mut self, data: &[u8]) -> [u8; 32] {
        use sha2::Digest;

        let mut digest = sha2::Sha256::new();
        digest.update(data);
        digest.finalize().into()
    }
}

/// Truncates `data` to its first half.
fn t(data: &[u8]) -> &[u8] {
    &data[..data.len() / 2]
}

/// XORs two 32-byte values.
fn xor(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut out = [0; 32];
    for (o, (l, r)) in out.iter_mut().zip(left.iter().zip(right.iter())) {
        *o = l ^ r;
    }
    out
}

/// The device-private secret key the rotating identifiers are derived from.
#[derive(Clone)]
pub struct SecretKey([u8; SECRET_KEY_SIZE]);

impl SecretKey {
    /// Creates a secret key from raw bytes.
    pub fn from_bytes(bytes: [u8; SECRET_KEY_SIZE]) -> Self {
        SecretKey(bytes)
    }

    /// Generates a fresh secret key from the platform's entropy source.
    pub fn generate(rng: &mut impl RngCore) -> Self {
        let mut bytes = [0; SECRET_KEY_SIZE];
        rng.fill_bytes(&mut bytes);
        SecretKey(bytes)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The key is deliberately not printable.
impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// A 16-byte rotating contact identifier.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ContactIdentifier([u8; CONTACT_IDENTIFIER_SIZE]);

impl ContactIdentifier {
    pub fn as_bytes(&self) -> &[u8; CONTACT_IDENTIFIER_SIZE] {
        &self.0
    }
}

impl fmt::Debug for ContactIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContactIdentifier({:?})", HexSlice(&self.0[..]))
    }
}

/// The key schedule: maps `(secretKey, day, period)` to keys and identifiers.
///
/// `K` itself is pure; callers that derive identifiers repeatedly (the payload supplier) cache
/// the per-day matching key to avoid walking the seed chain on every rotation.
pub struct K<H: Hash256> {
    hash: H,
    days_for: u32,
    periods_in_day: u32,
    epoch: Timestamp,
}

impl<H: Hash256> K<H> {
    /// Creates a schedule covering `days_for` days of `periods_in_day` periods, counting from
    /// `epoch`.
    pub fn new(hash: H, days_for: u32, periods_in_day: u32, epoch: Timestamp) -> Self {
        K {
            hash,
            days_for,
            periods_in_day,
            epoch,
        }
    }

    /// Creates a schedule with the protocol defaults: 2000 days of 240 periods (6 minutes each),
    /// epoch at zero.
    pub fn with_defaults(hash: H) -> Self {
        K::new(hash, 2000, 240, Timestamp::ZERO)
    }

    /// The number of periods per day.
    pub fn periods_in_day(&self) -> u32 {
        self.periods_in_day
    }

    /// The day index `at` falls into, counted from the epoch.
    pub fn day(&self, at: Timestamp) -> u32 {
        let secs = at.as_secs().saturating_sub(self.epoch.as_secs());
        (secs / 86_400) as u32
    }

    /// The period index within the day that `at` falls into.
    pub fn period(&self, at: Timestamp) -> u32 {
        let secs = at.as_secs().saturating_sub(self.epoch.as_secs()) % 86_400;
        (secs * u64::from(self.periods_in_day) / 86_400) as u32
    }

    /// Derives the matching key for `day`.
    ///
    /// Walks the seed chain from the end of the key lifetime down to `day`; cost is
    /// proportional to `days_for - day`.
    pub fn matching_key(&mut self, secret: &SecretKey, day: u32) -> Result<[u8; 32], Error> {
        if day >= self.days_for {
            return Err(Error::InvalidValue);
        }
        // seed[days_for], then walk down to seed[day], remembering seed[day + 1].
        let mut seed = self.hash.hash(t(secret.as_bytes()));
        let mut seed_above = seed;
        for _ in day..self.days_for {
            seed_above = seed;
            seed = self.hash.hash(t(&seed_above));
        }
        Ok(self.hash.hash(&xor(&seed, &seed_above)))
    }

    /// Derives the contact key for `period` from a day's matching key.
    pub fn contact_key(&mut self, matching_key: &[u8; 32], period: u32) -> Result<[u8; 32], Error> {
        if period >= self.periods_in_day {
            return Err(Error::InvalidValue);
        }
        let mut seed = self.hash.hash(t(matching_key));
        let mut seed_above = seed;
        for _ in period..self.periods_in_day {
            seed_above = seed;
            seed = self.hash.hash(t(&seed_above));
        }
        Ok(self.hash.hash(&xor(&seed, &seed_above)))
    }

    /// Derives the contact identifier advertised during `(day, period)`.
    pub fn contact_identifier(
        &mut self,
        secret: &SecretKey,
        day: u32,
        period: u32,
    ) -> Result<ContactIdentifier, Error> {
        let matching_key = self.matching_key(secret, day)?;
        let contact_key = self.contact_key(&matching_key, period)?;
        let mut id = [0; CONTACT_IDENTIFIER_SIZE];
        id.copy_from_slice(&contact_key[..CONTACT_IDENTIFIER_SIZE]);
        Ok(ContactIdentifier(id))
    }
}

/// Supplies the rotating payload: envelope, length, current contact identifier and optional
/// extended data.
///
/// `EXT_CAP` bounds the encoded extended-data block.
pub struct SimplePayloadSupplier<H: Hash256, const EXT_CAP: usize> {
    country: u16,
    state: u16,
    secret: SecretKey,
    k: K<H>,
    extended: ExtendedData<EXT_CAP>,
    // The matching key walk is long; cache it per day.
    cached_day: Option<(u32, [u8; 32])>,
}

impl<H: Hash256, const EXT_CAP: usize> SimplePayloadSupplier<H, EXT_CAP> {
    pub fn new(
        country: u16,
        state: u16,
        secret: SecretKey,
        k: K<H>,
        extended: ExtendedData<EXT_CAP>,
    ) -> Self {
        SimplePayloadSupplier {
            country,
            state,
            secret,
            k,
            extended,
            cached_day: None,
        }
    }

    /// The identifier advertised at `now`.
    pub fn contact_identifier(&mut self, now: Timestamp) -> Result<ContactIdentifier, Error> {
        let day = self.k.day(now);
        let period = self.k.period(now);
        let matching_key = match self.cached_day {
            Some((cached, key)) if cached == day => key,
            _ => {
                let key = self.k.matching_key(&self.secret, day)?;
                self.cached_day = Some((day, key));
                key
            }
        };
        let contact_key = self.k.contact_key(&matching_key, period)?;
        let mut id = [0; CONTACT_IDENTIFIER_SIZE];
        id.copy_from_slice(&contact_key[..CONTACT_IDENTIFIER_SIZE]);
        Ok(ContactIdentifier(id))
    }
}

impl<H: Hash256, const EXT_CAP: usize> PayloadSupplier for SimplePayloadSupplier<H, EXT_CAP> {
    fn payload(&mut self, now: Timestamp, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        let contact_id = self.contact_identifier(now)?;
        Envelope::new(SIMPLE_PAYLOAD_ID, self.country, self.state).to_bytes(writer)?;
        writer.write_u16_le(2 + self.extended.as_bytes().len() as u16)?;
        writer.write_slice(contact_id.as_bytes())?;
        self.extended.to_bytes(writer)
    }
}

/// A parsed rotating payload.
#[derive(Debug, PartialEq, Eq)]
pub struct SimplePayload<'a> {
    pub country: u16,
    pub state: u16,
    pub contact_identifier: ContactIdentifier,
    /// Raw extended-data block; walk it with [`extended::sections`].
    ///
    /// [`extended::sections`]: ../extended/fn.sections.html
    pub extended: &'a [u8],
}

/// Parses a rotating payload from a complete payload read.
pub fn parse(bytes: &[u8]) -> Result<SimplePayload<'_>, Error> {
    let mut reader = ByteReader::new(bytes);
    let envelope: &Envelope = FromBytes::from_bytes(&mut reader)?;
    if envelope.version() != SIMPLE_PAYLOAD_ID {
        return Err(Error::InvalidValue);
    }
    // The length field is advisory (2 plus the extended-data size); peers exist that fill it
    // inconsistently, so the identifier and extended block are sliced off the actual data.
    let _length = reader.read_u16_le()?;
    let id_bytes = reader.read_slice(CONTACT_IDENTIFIER_SIZE)?;
    let mut id = [0; CONTACT_IDENTIFIER_SIZE];
    id.copy_from_slice(id_bytes);
    Ok(SimplePayload {
        country: envelope.country(),
        state: envelope.state(),
        contact_identifier: ContactIdentifier(id),
        extended: reader.read_rest(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::extended::TEXT_PREMISES;

    fn test_secret() -> SecretKey {
        let mut bytes = [0; SECRET_KEY_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        SecretKey::from_bytes(bytes)
    }

    fn small_k() -> K<Sha2> {
        K::new(Sha2::default(), 10, 4, Timestamp::ZERO)
    }

    #[test]
    fn identifier_is_deterministic() {
        let secret = test_secret();
        let a = small_k().contact_identifier(&secret, 3, 1).unwrap();
        let b = small_k().contact_identifier(&secret, 3, 1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn identifier_changes_every_period_and_day() {
        let secret = test_secret();
        let mut k = small_k();
        let base = k.contact_identifier(&secret, 3, 1).unwrap();
        assert_ne!(base, k.contact_identifier(&secret, 3, 2).unwrap());
        assert_ne!(base, k.contact_identifier(&secret, 4, 1).unwrap());
    }

    #[test]
    fn day_and_period_from_epoch() {
        let k = K::new(Sha2::default(), 2000, 240, Timestamp::from_secs(1_000));
        let at = Timestamp::from_secs(1_000 + 86_400 * 3 + 43_200);
        assert_eq!(k.day(at), 3);
        // Halfway through the day, with 240 periods.
        assert_eq!(k.period(at), 120);
        // Before the epoch everything saturates to day 0, period 0.
        assert_eq!(k.day(Timestamp::ZERO), 0);
        assert_eq!(k.period(Timestamp::ZERO), 0);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let secret = test_secret();
        let mut k = small_k();
        assert!(k.contact_identifier(&secret, 10, 0).is_err());
        assert!(k.contact_identifier(&secret, 0, 4).is_err());
    }

    #[test]
    fn supplier_roundtrip() {
        let mut ext: ExtendedData<16> = ExtendedData::new();
        ext.add_text_section(TEXT_PREMISES, "Lab").unwrap();
        let mut supplier =
            SimplePayloadSupplier::new(826, 3, test_secret(), small_k(), ext);

        let now = Timestamp::from_secs(86_400 * 2 + 600);
        let expected_id = supplier.contact_identifier(now).unwrap();

        let mut buf = [0; 64];
        let mut writer = ByteWriter::new(&mut buf);
        supplier.payload(now, &mut writer).unwrap();
        let len = 64 - writer.space_left();

        let parsed = parse(&buf[..len]).unwrap();
        assert_eq!(parsed.country, 826);
        assert_eq!(parsed.state, 3);
        assert_eq!(parsed.contact_identifier, expected_id);
        let section = crate::payload::extended::sections(parsed.extended)
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(section.as_text().unwrap(), "Lab");
    }

    #[test]
    fn supplier_rotates_at_period_boundary() {
        let mut supplier = SimplePayloadSupplier::<_, 0>::new(
            826,
            3,
            test_secret(),
            small_k(),
            ExtendedData::new(),
        );
        // 4 periods per day: a period lasts 21600 seconds.
        let a = supplier.contact_identifier(Timestamp::from_secs(21_599)).unwrap();
        let b = supplier.contact_identifier(Timestamp::from_secs(21_600)).unwrap();
        assert_ne!(a, b);
    }
}
