use core::fmt;

/// Errors returned by the codec layers of the stack.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Packet specified an invalid length value or was too short.
    ///
    /// Advertisement segments and payload TLV sections that trip this are
    /// discarded; the error does not abort the surrounding scan or read.
    InvalidLength,

    /// Invalid value supplied for field.
    ///
    /// Also returned when a payload carries an unrecognized TLV extension
    /// code, which terminates parsing of that payload.
    InvalidValue,

    /// Unexpectedly reached EOF while reading or writing data.
    ///
    /// This is returned when a payload or advertisement does not fit into a
    /// fixed-size buffer, and also when reaching EOF prematurely while
    /// reading data from a buffer.
    Eof,

    /// Parsing didn't consume the entire buffer.
    IncompleteParse,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::InvalidLength => "invalid length value specified",
            Error::InvalidValue => "invalid value for field",
            Error::Eof => "end of buffer",
            Error::IncompleteParse => "excess data in buffer",
        })
    }
}
