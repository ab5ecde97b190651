//! Bit-stable binary wire format for [`AnnotationRecord`]. Hand-rolled
//! rather than `serde`-derived because the exact byte layout is fixed:
//! a tag byte for `action`, a tag byte for `description`, then
//! varint-and-UTF8-framed fields in a fixed order per variant.

use crate::error::EngineError;
use crate::record::{AnnotationRecord, Endpoint, RecordBody};
use revtext_common::{AnnotationId, Lamport, SenderId, UserId};
use revtext_text::position::Position;

const ACTION_ADDITION: u8 = 0;
const ACTION_REMOVAL: u8 = 1;
const ACTION_UPDATE: u8 = 2;

const DESC_INSERT_SUGGESTION: u8 = 0;
const DESC_DELETE_SUGGESTION: u8 = 1;
const DESC_ADD_COMMENT: u8 = 2;
const DESC_ACCEPT_SUGGESTION: u8 = 3;
const DESC_DECLINE_SUGGESTION: u8 = 4;
const DESC_REMOVE_COMMENT: u8 = 5;
const DESC_RANGE_UPDATE: u8 = 6;

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    write_varint(buf, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

fn write_position(buf: &mut Vec<u8>, pos: Option<Position>) {
    match pos {
        None => buf.push(0),
        Some(p) => {
            buf.push(1);
            write_varint(buf, p.replica as u64);
            write_varint(buf, p.seq);
        }
    }
}

fn write_endpoint(buf: &mut Vec<u8>, e: Endpoint) {
    write_position(buf, e.pos);
    buf.push(e.closed as u8);
}

fn write_id(buf: &mut Vec<u8>, id: AnnotationId) {
    buf.extend_from_slice(id.0.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn byte(&mut self) -> Result<u8, EngineError> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| EngineError::Decode("unexpected end of buffer".into()))?;
        self.pos += 1;
        Ok(b)
    }

    fn varint(&mut self) -> Result<u64, EngineError> {
        let mut result: u64 = 0;
        let mut shift = 0;
        loop {
            let b = self.byte()?;
            result |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 63 {
                return Err(EngineError::Decode("varint too long".into()));
            }
        }
        Ok(result)
    }

    fn str(&mut self) -> Result<String, EngineError> {
        let len = self.varint()? as usize;
        let end = self.pos + len;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| EngineError::Decode("string out of bounds".into()))?;
        self.pos = end;
        String::from_utf8(slice.to_vec()).map_err(|e| EngineError::Decode(e.to_string()))
    }

    fn position(&mut self) -> Result<Option<Position>, EngineError> {
        match self.byte()? {
            0 => Ok(None),
            1 => {
                let replica = self.varint()? as u32;
                let seq = self.varint()?;
                Ok(Some(Position { replica, seq }))
            }
            other => Err(EngineError::Decode(format!("bad position presence tag {other}"))),
        }
    }

    fn endpoint(&mut self) -> Result<Endpoint, EngineError> {
        let pos = self.position()?;
        let closed = self.byte()? != 0;
        Ok(Endpoint { pos, closed })
    }

    fn id(&mut self) -> Result<AnnotationId, EngineError> {
        let end = self.pos + 16;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| EngineError::Decode("id out of bounds".into()))?;
        self.pos = end;
        let bytes: [u8; 16] = slice.try_into().unwrap();
        Ok(AnnotationId(uuid::Uuid::from_bytes(bytes)))
    }
}

/// Encode a fully-stamped record into the bit-stable wire format.
pub fn encode_record(record: &AnnotationRecord) -> Vec<u8> {
    let mut buf = Vec::new();
    let action_tag = match record.body.action() {
        crate::record::Action::Addition => ACTION_ADDITION,
        crate::record::Action::Removal => ACTION_REMOVAL,
        crate::record::Action::Update => ACTION_UPDATE,
    };
    buf.push(action_tag);

    let desc_tag = match &record.body {
        RecordBody::InsertSuggestion { .. } => DESC_INSERT_SUGGESTION,
        RecordBody::DeleteSuggestion { .. } => DESC_DELETE_SUGGESTION,
        RecordBody::AddComment { .. } => DESC_ADD_COMMENT,
        RecordBody::AcceptSuggestion { .. } => DESC_ACCEPT_SUGGESTION,
        RecordBody::DeclineSuggestion { .. } => DESC_DECLINE_SUGGESTION,
        RecordBody::RemoveComment { .. } => DESC_REMOVE_COMMENT,
        RecordBody::RangeUpdate { .. } => DESC_RANGE_UPDATE,
    };
    buf.push(desc_tag);

    write_id(&mut buf, record.id);
    write_str(&mut buf, record.user_id.as_str());
    write_varint(&mut buf, record.lamport.0);
    write_str(&mut buf, record.sender_id.as_str());
    write_varint(&mut buf, record.timestamp);

    match &record.body {
        RecordBody::InsertSuggestion { start, end } | RecordBody::DeleteSuggestion { start, end } => {
            write_endpoint(&mut buf, *start);
            write_endpoint(&mut buf, *end);
        }
        RecordBody::AddComment { start, end, value } => {
            write_endpoint(&mut buf, *start);
            write_endpoint(&mut buf, *end);
            write_str(&mut buf, value);
        }
        RecordBody::AcceptSuggestion { dependent_on }
        | RecordBody::DeclineSuggestion { dependent_on }
        | RecordBody::RemoveComment { dependent_on } => {
            write_id(&mut buf, *dependent_on);
        }
        RecordBody::RangeUpdate { dependent_on, start, end, value } => {
            write_id(&mut buf, *dependent_on);
            match start {
                None => buf.push(0),
                Some(e) => {
                    buf.push(1);
                    write_endpoint(&mut buf, *e);
                }
            }
            match end {
                None => buf.push(0),
                Some(e) => {
                    buf.push(1);
                    write_endpoint(&mut buf, *e);
                }
            }
            match value {
                None => buf.push(0),
                Some(v) => {
                    buf.push(1);
                    write_str(&mut buf, v);
                }
            }
        }
    }

    buf
}

/// Decode a record previously produced by [`encode_record`]. A
/// malformed buffer (truncated, unknown tag, invalid UTF-8) is fatal
/// and surfaces as [`EngineError::Decode`].
pub fn decode_record(bytes: &[u8]) -> Result<AnnotationRecord, EngineError> {
    let mut r = Reader::new(bytes);
    let action_tag = r.byte()?;
    let desc_tag = r.byte()?;
    let id = r.id()?;
    let user_id: UserId = r.str()?.into();
    let lamport = Lamport(r.varint()?);
    let sender_id: SenderId = r.str()?.into();
    let timestamp = r.varint()?;

    let body = match (action_tag, desc_tag) {
        (ACTION_ADDITION, DESC_INSERT_SUGGESTION) => RecordBody::InsertSuggestion { start: r.endpoint()?, end: r.endpoint()? },
        (ACTION_ADDITION, DESC_DELETE_SUGGESTION) => RecordBody::DeleteSuggestion { start: r.endpoint()?, end: r.endpoint()? },
        (ACTION_ADDITION, DESC_ADD_COMMENT) => {
            let start = r.endpoint()?;
            let end = r.endpoint()?;
            let value = r.str()?;
            RecordBody::AddComment { start, end, value }
        }
        (ACTION_REMOVAL, DESC_ACCEPT_SUGGESTION) => RecordBody::AcceptSuggestion { dependent_on: r.id()? },
        (ACTION_REMOVAL, DESC_DECLINE_SUGGESTION) => RecordBody::DeclineSuggestion { dependent_on: r.id()? },
        (ACTION_REMOVAL, DESC_REMOVE_COMMENT) => RecordBody::RemoveComment { dependent_on: r.id()? },
        (ACTION_UPDATE, DESC_RANGE_UPDATE) => {
            let dependent_on = r.id()?;
            let start = if r.byte()? == 1 { Some(r.endpoint()?) } else { None };
            let end = if r.byte()? == 1 { Some(r.endpoint()?) } else { None };
            let value = if r.byte()? == 1 { Some(r.str()?) } else { None };
            RecordBody::RangeUpdate { dependent_on, start, end, value }
        }
        (a, d) => return Err(EngineError::Decode(format!("unknown action/description tag pair ({a}, {d})"))),
    };

    Ok(AnnotationRecord { id, user_id, lamport, sender_id, timestamp, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Endpoint;

    fn sample(body: RecordBody) -> AnnotationRecord {
        AnnotationRecord {
            id: AnnotationId::new(),
            user_id: UserId::from("alice"),
            lamport: Lamport(42),
            sender_id: SenderId::from("replica-1"),
            timestamp: 1_700_000_000,
            body,
        }
    }

    #[test]
    fn insert_suggestion_roundtrips() {
        let record = sample(RecordBody::InsertSuggestion {
            start: Endpoint::open(Some(Position { replica: 0, seq: 3 })),
            end: Endpoint::open(None),
        });
        let bytes = encode_record(&record);
        let decoded = decode_record(&bytes).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn range_update_with_partial_fields_roundtrips() {
        let record = sample(RecordBody::RangeUpdate {
            dependent_on: AnnotationId::new(),
            start: None,
            end: Some(Endpoint::closed(Position { replica: 1, seq: 9 })),
            value: Some("edited".into()),
        });
        let bytes = encode_record(&record);
        let decoded = decode_record(&bytes).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn truncated_buffer_is_a_decode_error() {
        let record = sample(RecordBody::RemoveComment { dependent_on: AnnotationId::new() });
        let mut bytes = encode_record(&record);
        bytes.truncate(bytes.len() - 4);
        assert!(decode_record(&bytes).is_err());
    }

    #[test]
    fn unknown_tag_pair_is_a_decode_error() {
        let mut bytes = vec![9, 9];
        bytes.extend_from_slice(&[0u8; 16]); // id
        assert!(decode_record(&bytes).is_err());
    }
}
