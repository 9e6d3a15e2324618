//! Wire format constants and field data types.
//!
//! Every message on the socket has the layout:
//! ```text
//! ┌──────────┬──────────┬─────────────┬──────────────────┐
//! │ Length   │ Tag      │ Field count │ Fields           │
//! │ 4 bytes  │ 2 bytes  │ 2 bytes     │ variable         │
//! │ uint32 BE│ uint16 BE│ uint16 BE   │                  │
//! └──────────┴──────────┴─────────────┴──────────────────┘
//! ```
//!
//! The length counts everything after the length field itself. Each field is
//! `u16 tag`, `u16 data type`, then a type-specific payload. Integers are Big
//! Endian; doubles travel in host byte order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Size of the length prefix in bytes.
pub const LENGTH_SIZE: usize = 4;

/// Size of the tag and field-count header that follows the length prefix.
pub const ENVELOPE_SIZE: usize = 4;

/// Message tag of the self-describing default format (the only one supported).
pub const MESSAGE_TAG_DEFAULT: u16 = 0x0000;

/// Default maximum message body size (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Data type code carried by every field.
///
/// Scalar codes occupy `0x01..=0x0e`; setting [`WireType::ARRAY_BIT`] turns a
/// scalar code into "array of that type".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireType(u16);

impl WireType {
    /// Invalid / unset type. Never valid on the wire.
    pub const INVALID: Self = Self(0x00);
    /// NUL-terminated string with a `u32` length prefix.
    pub const STRING: Self = Self(0x01);
    /// Signed 32-bit integer (generic "integer").
    pub const INTEGER: Self = Self(0x02);
    /// Unsigned 32-bit integer (generic "unsigned").
    pub const UNSIGNED: Self = Self(0x03);
    /// IEEE-754 binary64, host byte order.
    pub const DOUBLE: Self = Self(0x04);
    /// Boolean, transmitted as a `u32` 0 or 1.
    pub const BOOL: Self = Self(0x05);
    /// Unsigned 8-bit integer.
    pub const UINT8: Self = Self(0x06);
    /// Signed 8-bit integer.
    pub const SINT8: Self = Self(0x07);
    /// Unsigned 16-bit integer.
    pub const UINT16: Self = Self(0x08);
    /// Signed 16-bit integer.
    pub const SINT16: Self = Self(0x09);
    /// Unsigned 32-bit integer.
    pub const UINT32: Self = Self(0x0a);
    /// Signed 32-bit integer.
    pub const SINT32: Self = Self(0x0b);
    /// Unsigned 64-bit integer.
    pub const UINT64: Self = Self(0x0c);
    /// Signed 64-bit integer.
    pub const SINT64: Self = Self(0x0d);
    /// Opaque byte blob with a `u32` length prefix.
    pub const BLOB: Self = Self(0x0e);

    /// Bit marking an array of the base type.
    pub const ARRAY_BIT: u16 = 0x80;

    /// Parse a wire code, rejecting unknown scalar codes and stray bits.
    pub fn from_code(code: u16) -> Option<Self> {
        let base = code & !Self::ARRAY_BIT;
        if (Self::STRING.0..=Self::BLOB.0).contains(&base) {
            Some(Self(code))
        } else {
            None
        }
    }

    /// Raw wire code.
    #[inline]
    pub const fn code(self) -> u16 {
        self.0
    }

    /// Array type whose elements have type `base`.
    #[inline]
    pub const fn array_of(base: Self) -> Self {
        Self(base.0 | Self::ARRAY_BIT)
    }

    /// Check if this is an array type.
    #[inline]
    pub const fn is_array(self) -> bool {
        self.0 & Self::ARRAY_BIT != 0
    }

    /// Element type for arrays, the type itself for scalars.
    #[inline]
    pub const fn base(self) -> Self {
        Self(self.0 & !Self::ARRAY_BIT)
    }

    /// Human-readable name of the scalar base type.
    pub const fn name(self) -> &'static str {
        match self.base().0 {
            0x01 => "string",
            0x02 => "integer",
            0x03 => "unsigned",
            0x04 => "double",
            0x05 => "bool",
            0x06 => "uint8",
            0x07 => "sint8",
            0x08 => "uint16",
            0x09 => "sint16",
            0x0a => "uint32",
            0x0b => "sint32",
            0x0c => "uint64",
            0x0d => "sint64",
            0x0e => "blob",
            _ => "invalid",
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array() {
            write!(f, "array<{}>", self.name())
        } else {
            f.write_str(self.name())
        }
    }
}
