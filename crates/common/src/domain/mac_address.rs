use crate::domain::result::{DomainError, DomainResult};
use std::fmt;
use std::str::FromStr;

/// Hardware address of a mesh device.
///
/// Accepts `AA:BB:CC:DD:EE:FF`, `aa-bb-cc-dd-ee-ff` and `aabbccddeeff`.
/// Always displayed upper-case and colon separated; that canonical form is
/// what names the device's record file, so it must never contain anything
/// but hex digits and colons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn parse(input: &str) -> DomainResult<Self> {
        let trimmed = input.trim();
        let invalid = || DomainError::InvalidMacAddress(trimmed.to_string());

        let groups: Vec<&str> = if trimmed.contains(':') {
            trimmed.split(':').collect()
        } else if trimmed.contains('-') {
            trimmed.split('-').collect()
        } else if trimmed.len() == 12 && trimmed.is_ascii() {
            (0..6).map(|i| &trimmed[i * 2..i * 2 + 2]).collect()
        } else {
            return Err(invalid());
        };

        if groups.len() != 6 {
            return Err(invalid());
        }

        let mut octets = [0u8; 6];
        for (octet, group) in octets.iter_mut().zip(groups) {
            if group.len() != 2 || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(group, 16).map_err(|_| invalid())?;
        }

        Ok(Self(octets))
    }
}

impl FromStr for MacAddress {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}
