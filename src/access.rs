use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use bitflags::bitflags;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AuthzError;

bitflags! {
    /// Access rights granted by a rule, combined as a bitmask.
    ///
    /// The textual form is a subset of the letters `rwdu`:
    /// `r` read, `w` write, `d` delete, `u` update. The empty string is a
    /// valid mask and denotes no access (an explicit revocation).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Access: u8 {
        const READ = 0x01;
        const WRITE = 0x02;
        const DELETE = 0x04;
        const UPDATE = 0x08;
    }
}

impl Access {
    /// No access at all. This is also the lookup default when no rule matches.
    pub const NONE: Access = Access::empty();

    /// Every capability this engine models.
    pub const FULL: Access = Access::all();

    /// Check that every capability in `required` is granted by this mask.
    pub fn allows(self, required: Access) -> bool {
        self.contains(required)
    }
}

impl FromStr for Access {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut access = Access::NONE;
        for letter in s.chars() {
            access |= match letter {
                'r' => Access::READ,
                'w' => Access::WRITE,
                'd' => Access::DELETE,
                'u' => Access::UPDATE,
                _ => {
                    return Err(AuthzError::InvalidAccess {
                        access: s.to_string(),
                        letter,
                    });
                }
            };
        }
        Ok(access)
    }
}

impl Display for Access {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for (flag, letter) in [
            (Access::READ, 'r'),
            (Access::WRITE, 'w'),
            (Access::DELETE, 'd'),
            (Access::UPDATE, 'u'),
        ] {
            if self.contains(flag) {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

// The derived serde form would expose the raw bit values; consumers expect
// the same letter notation the configuration uses.
impl Serialize for Access {
    fn serialize<S>(&self, ser: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ser.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Access {
    fn deserialize<D>(de: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(de)?;
        s.parse().map_err(D::Error::custom)
    }
}
