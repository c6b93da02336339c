//! Header metadata codec (C4) — a typed key/value sequence carried inside
//! the header block's single item.
//!
//! Wire format: `num_entries:varuint (key:string, value:tagged)*` where a
//! string is `len:varuint` followed by UTF-8 bytes, and a tagged value is
//! one tag byte followed by its payload (`BOOL` one byte, `INT`/`UINT`
//! signed/unsigned varints, `STRING` a length-prefixed string).

use integer_encoding::VarInt;

use crate::error::{Error, Result};

pub const KEY_TRAILER: &str = "trailer";
pub const KEY_TRANSFORMER: &str = "transformer";

const TAG_BOOL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_UINT: u8 = 2;
const TAG_STRING: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaEntry {
    pub key: String,
    pub value: MetaValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    entries: Vec<MetaEntry>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: MetaValue) {
        self.entries.push(MetaEntry {
            key: key.into(),
            value,
        });
    }

    pub fn entries(&self) -> &[MetaEntry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    /// True iff a `trailer` entry exists with a boolean `true` value.
    pub fn has_trailer(&self) -> bool {
        matches!(self.get(KEY_TRAILER), Some(MetaValue::Bool(true)))
    }

    /// The ordered list of `transformer` descriptor strings.
    pub fn transformers(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.key == KEY_TRANSFORMER)
            .filter_map(|e| match &e.value {
                MetaValue::Str(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_uvarint(&mut out, self.entries.len() as u64);
        for entry in &self.entries {
            write_string(&mut out, &entry.key);
            match &entry.value {
                MetaValue::Bool(b) => {
                    out.push(TAG_BOOL);
                    out.push(if *b { 1 } else { 0 });
                }
                MetaValue::Int(v) => {
                    out.push(TAG_INT);
                    write_ivarint(&mut out, *v);
                }
                MetaValue::UInt(v) => {
                    out.push(TAG_UINT);
                    write_uvarint(&mut out, *v);
                }
                MetaValue::Str(s) => {
                    out.push(TAG_STRING);
                    write_string(&mut out, s);
                }
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let num_entries = read_uvarint(bytes, &mut pos)?;
        let mut entries = Vec::with_capacity(num_entries.min(1 << 20) as usize);
        for _ in 0..num_entries {
            let key = read_string(bytes, &mut pos)?;
            if pos >= bytes.len() {
                return Err(Error::CorruptHeader("truncated before value tag".into()));
            }
            let tag = bytes[pos];
            pos += 1;
            let value = match tag {
                TAG_BOOL => {
                    if pos >= bytes.len() {
                        return Err(Error::CorruptHeader("truncated bool value".into()));
                    }
                    let b = bytes[pos] != 0;
                    pos += 1;
                    MetaValue::Bool(b)
                }
                TAG_INT => MetaValue::Int(read_ivarint(bytes, &mut pos)?),
                TAG_UINT => MetaValue::UInt(read_uvarint(bytes, &mut pos)?),
                TAG_STRING => MetaValue::Str(read_string(bytes, &mut pos)?),
                other => return Err(Error::CorruptHeader(format!("unknown value tag {other}"))),
            };
            entries.push(MetaEntry { key, value });
        }
        Ok(Self { entries })
    }
}

fn write_uvarint(out: &mut Vec<u8>, v: u64) {
    let mut buf = [0u8; 10];
    let n = v.encode_var(&mut buf);
    out.extend_from_slice(&buf[..n]);
}

fn write_ivarint(out: &mut Vec<u8>, v: i64) {
    let mut buf = [0u8; 10];
    let n = v.encode_var(&mut buf);
    out.extend_from_slice(&buf[..n]);
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    write_uvarint(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

fn read_uvarint(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let (v, n) = u64::decode_var(&bytes[*pos..])
        .ok_or_else(|| Error::CorruptHeader("truncated unsigned varint".into()))?;
    *pos += n;
    Ok(v)
}

fn read_ivarint(bytes: &[u8], pos: &mut usize) -> Result<i64> {
    let (v, n) = i64::decode_var(&bytes[*pos..])
        .ok_or_else(|| Error::CorruptHeader("truncated signed varint".into()))?;
    *pos += n;
    Ok(v)
}

fn read_string(bytes: &[u8], pos: &mut usize) -> Result<String> {
    let len = read_uvarint(bytes, pos)? as usize;
    if *pos + len > bytes.len() {
        return Err(Error::CorruptHeader("string length exceeds remaining bytes".into()));
    }
    let s = std::str::from_utf8(&bytes[*pos..*pos + len])
        .map_err(|e| Error::CorruptHeader(format!("non-UTF-8 string: {e}")))?
        .to_owned();
    *pos += len;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_value_kinds() {
        let mut h = Header::new();
        h.push(KEY_TRAILER, MetaValue::Bool(true));
        h.push("count", MetaValue::UInt(42));
        h.push("delta", MetaValue::Int(-7));
        h.push(KEY_TRANSFORMER, MetaValue::Str("zstd 3".into()));
        h.push(KEY_TRANSFORMER, MetaValue::Str("aesgcm deadbeef".into()));

        let bytes = h.encode();
        let decoded = Header::decode(&bytes).unwrap();
        assert_eq!(decoded, h);
        assert!(decoded.has_trailer());
        assert_eq!(decoded.transformers(), vec!["zstd 3", "aesgcm deadbeef"]);
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut h = Header::new();
        h.push("k", MetaValue::Bool(true));
        let mut bytes = h.encode();
        // flip the tag byte (right after the one-byte key "k")
        let tag_pos = bytes.len() - 2;
        bytes[tag_pos] = 0x7F;
        assert!(matches!(Header::decode(&bytes), Err(Error::CorruptHeader(_))));
    }

    #[test]
    fn rejects_truncated_input() {
        let mut h = Header::new();
        h.push("k", MetaValue::Str("value".into()));
        let bytes = h.encode();
        let truncated = &bytes[..bytes.len() - 2];
        assert!(Header::decode(truncated).is_err());
    }

    #[test]
    fn empty_header_round_trips() {
        let h = Header::new();
        let bytes = h.encode();
        let decoded = Header::decode(&bytes).unwrap();
        assert_eq!(decoded.entries().len(), 0);
        assert!(!decoded.has_trailer());
    }
}
