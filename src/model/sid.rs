//! Structured security identifier.
//!
//! A SID is a revision, a 48-bit identifier authority and an ordered list
//! of 32-bit sub-authorities. The last sub-authority is the relative
//! identifier (RID); everything before it is the issuing prefix (a domain
//! or a machine). Remapping a local account into a global namespace is just
//! `new_prefix.add_component(local.rid())`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

use crate::{Error, Result};

/// Security identifier (`S-1-5-21-...`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid {
    revision: u8,
    authority: u64,
    sub_authorities: SmallVec<[u32; 6]>,
}

/// Well-known identifiers.
pub mod well_known {
    use super::Sid;

    pub fn everyone() -> Sid { Sid::new(1, 1, &[0]) }
    pub fn authenticated_users() -> Sid { Sid::new(1, 5, &[11]) }
    pub fn interactive() -> Sid { Sid::new(1, 5, &[4]) }
    pub fn remote_interactive() -> Sid { Sid::new(1, 5, &[14]) }
    pub fn local_system() -> Sid { Sid::new(1, 5, &[18]) }
    pub fn administrators() -> Sid { Sid::new(1, 5, &[32, 544]) }
}

impl Sid {
    pub fn new(revision: u8, authority: u64, sub_authorities: &[u32]) -> Self {
        Self {
            revision,
            authority,
            sub_authorities: SmallVec::from_slice(sub_authorities),
        }
    }

    /// Decode the binary layout (MS-DTYP 2.4.2):
    ///
    /// ```text
    /// Offset  Size  Field
    /// 0       1     Revision
    /// 1       1     SubAuthorityCount
    /// 2       6     IdentifierAuthority (big-endian)
    /// 8       4*N   SubAuthorities (little-endian)
    /// ```
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(Error::InvalidSid(format!(
                "binary SID too short ({} bytes, minimum 8)",
                bytes.len()
            )));
        }
        let count = bytes[1] as usize;
        if bytes.len() < 8 + count * 4 {
            return Err(Error::InvalidSid(format!(
                "binary SID data insufficient for {count} sub-authorities"
            )));
        }

        let authority = u64::from_be_bytes([
            0, 0, bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]);
        let sub_authorities = bytes[8..8 + count * 4]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Self { revision: bytes[0], authority, sub_authorities })
    }

    /// Encode back to the binary layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.sub_authorities.len() * 4);
        out.push(self.revision);
        out.push(self.sub_authorities.len() as u8);
        out.extend_from_slice(&self.authority.to_be_bytes()[2..]);
        for sub in &self.sub_authorities {
            out.extend_from_slice(&sub.to_le_bytes());
        }
        out
    }

    /// The all-zero SID used by collectors for "no identifier".
    pub fn is_blank(&self) -> bool {
        self.revision == 0 && self.authority == 0 && self.sub_authorities.is_empty()
    }

    /// Number of sub-authorities.
    pub fn components(&self) -> usize {
        self.sub_authorities.len()
    }

    pub fn sub_authorities(&self) -> &[u32] {
        &self.sub_authorities
    }

    /// Relative identifier: the last sub-authority.
    pub fn rid(&self) -> Option<u32> {
        self.sub_authorities.last().copied()
    }

    /// Drop the last sub-authority. A SID without sub-authorities is
    /// returned as-is.
    pub fn strip_rid(&self) -> Sid {
        let mut out = self.clone();
        out.sub_authorities.pop();
        out
    }

    /// Append a relative identifier to this prefix.
    pub fn add_component(&self, rid: u32) -> Sid {
        let mut out = self.clone();
        out.sub_authorities.push(rid);
        out
    }

    /// True if `other` starts with every component of `self` and is longer.
    pub fn is_prefix_of(&self, other: &Sid) -> bool {
        self.revision == other.revision
            && self.authority == other.authority
            && other.sub_authorities.len() > self.sub_authorities.len()
            && other.sub_authorities.starts_with(&self.sub_authorities)
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}-{}", self.revision, self.authority)?;
        for sub in &self.sub_authorities {
            write!(f, "-{sub}")?;
        }
        Ok(())
    }
}

impl FromStr for Sid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidSid(s.to_string());

        let mut parts = s.trim().split('-');
        match parts.next() {
            Some(p) if p.eq_ignore_ascii_case("S") => {}
            _ => return Err(invalid()),
        }
        let revision: u8 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let authority: u64 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        if authority >= 1 << 48 {
            return Err(invalid());
        }
        let sub_authorities = parts
            .map(|p| p.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<SmallVec<[u32; 6]>>>()?;

        Ok(Self { revision, authority, sub_authorities })
    }
}

impl Serialize for Sid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Sid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> Sid {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let s = sid("S-1-5-21-1004336348-1177238915-682003330-512");
        assert_eq!(s.components(), 5);
        assert_eq!(s.rid(), Some(512));
        assert_eq!(s.to_string(), "S-1-5-21-1004336348-1177238915-682003330-512");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Sid>().is_err());
        assert!("X-1-5".parse::<Sid>().is_err());
        assert!("S-1".parse::<Sid>().is_err());
        assert!("S-1-5-abc".parse::<Sid>().is_err());
        assert!("S-1-5-".parse::<Sid>().is_err());
    }

    #[test]
    fn test_strip_and_add() {
        let s = sid("S-1-5-21-10-20-30-1001");
        assert_eq!(s.strip_rid(), sid("S-1-5-21-10-20-30"));
        assert_eq!(sid("S-1-5-21-10-20-30").add_component(1001), s);
        assert!(sid("S-1-5-21-10-20-30").is_prefix_of(&s));
        assert!(!s.is_prefix_of(&s));
    }

    #[test]
    fn test_binary_layout() {
        // S-1-5-32-544 (BUILTIN\Administrators)
        let bytes = [1u8, 2, 0, 0, 0, 0, 0, 5, 32, 0, 0, 0, 0x20, 0x02, 0, 0];
        let s = Sid::from_bytes(&bytes).unwrap();
        assert_eq!(s, well_known::administrators());
        assert_eq!(s.to_bytes(), bytes.to_vec());
        assert!(Sid::from_bytes(&bytes[..10]).is_err());
    }

    #[test]
    fn test_serde_as_text() {
        let s = well_known::everyone();
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "\"S-1-1-0\"");
        let back: Sid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
