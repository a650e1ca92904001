use std::fmt;
use std::io;

// Everything that can abort the emulator: decoder failures bubble up from
// the CPU step, the rest is detected once at startup.
#[derive(Debug)]
pub enum Error {
    UnknownOpcode(u8),
    UnknownPrefixOpcode(u8),
    UnknownCartridgeType(u8),
    // The ROM is too small to contain the header area at 0x0100-0x014f.
    InvalidRom,
    // The bootrom image must be exactly 256 bytes; carries the actual size.
    InvalidBootrom(usize),
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnknownOpcode(op) => write!(f, "Unknown opcode: 0x{:02x}", op),
            Error::UnknownPrefixOpcode(op) => write!(f, "Unknown prefix opcode: 0xcb 0x{:02x}", op),
            Error::UnknownCartridgeType(t) => write!(f, "Unknown cartridge type: 0x{:02x}", t),
            Error::InvalidRom => write!(f, "Missing required information area which located at 0100-014f"),
            Error::InvalidBootrom(n) => write!(f, "Bootrom must be 256 bytes, got {}", n),
            Error::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
