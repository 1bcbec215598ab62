use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use integer_encoding::{VarIntReader, VarIntWriter};

use crate::error::{IngressError, Result};
use crate::events::ExecutionEvent;

/// One binary-log frame (§6): `eventId: u8`, `workerId: u32-varint`,
/// `timestamp: i64` (fixed-width big-endian), `payloadLength: i32-varint`,
/// `payload: bytes`. The payload is this event's JSON encoding — `eventId`
/// on the wire is the cheap dispatch key a consumer checks before paying
/// to deserialize it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub event_id: u8,
    pub worker_id: u32,
    pub timestamp: i64,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u8(self.event_id)?;
        out.write_varint(self.worker_id)?;
        out.write_i64::<BigEndian>(self.timestamp)?;
        out.write_varint(self.payload.len() as i32)?;
        out.extend_from_slice(&self.payload);
        Ok(())
    }

    pub fn decode(mut bytes: &[u8]) -> Result<(Self, &[u8])> {
        let event_id = bytes.read_u8()?;
        let worker_id: u32 = bytes.read_varint()?;
        let timestamp = bytes.read_i64::<BigEndian>()?;
        let payload_len: i32 = bytes.read_varint()?;
        let payload_len = payload_len as usize;
        if bytes.len() < payload_len {
            return Err(IngressError::Truncated {
                expected: payload_len,
                found: bytes.len(),
            });
        }
        let (payload, rest) = bytes.split_at(payload_len);
        Ok((
            Frame {
                event_id,
                worker_id,
                timestamp,
                payload: payload.to_vec(),
            },
            rest,
        ))
    }
}

/// Encode a typed event as a complete frame.
pub fn encode_event(event: &ExecutionEvent, worker_id: u32, timestamp: i64) -> Result<Vec<u8>> {
    let payload = match event {
        ExecutionEvent::Opaque { payload, .. } => payload.clone(),
        other => serde_json::to_vec(other)?,
    };
    let frame = Frame {
        event_id: event.event_id(),
        worker_id,
        timestamp,
        payload,
    };
    let mut out = Vec::new();
    frame.encode(&mut out)?;
    Ok(out)
}

/// Decode one frame into its typed event. Unknown `eventId`s (the five
/// opaque kinds from §6, or anything this core doesn't recognize) become
/// [`ExecutionEvent::Opaque`] rather than a decode failure.
pub fn decode_event(frame: &Frame) -> Result<ExecutionEvent> {
    use crate::events::event_id::*;
    Ok(match frame.event_id {
        PROCESS_FINGERPRINT_COMPUTED => serde_json::from_slice(&frame.payload)?,
        PIP_CACHE_MISS => serde_json::from_slice(&frame.payload)?,
        DIRECTORY_MEMBERSHIP_HASHED => serde_json::from_slice(&frame.payload)?,
        RECORD_FILE_FOR_BUILD_MANIFEST => serde_json::from_slice(&frame.payload)?,
        other => ExecutionEvent::Opaque {
            event_id: other,
            payload: frame.payload.clone(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{FingerprintComputationKind, ProcessFingerprintComputed};
    use fingerprint_store::{ContentHash, PipId};

    #[test]
    fn frame_roundtrips_through_bytes() {
        let event = ExecutionEvent::ProcessFingerprintComputed(ProcessFingerprintComputed {
            kind: FingerprintComputationKind::Execution,
            pip_id: PipId(42),
            formatted_semi_stable_hash: "Pip42".to_string(),
            pip_unique_output_hash: None,
            weak_fingerprint: ContentHash::compute(&[b"weak"]),
            weak_fingerprint_inputs: serde_json::json!({"cmd": "gcc"}),
            strong_fp_computations: vec![],
        });

        let bytes = encode_event(&event, 7, 1_700_000_000).unwrap();
        let (frame, rest) = Frame::decode(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(frame.worker_id, 7);
        assert_eq!(frame.timestamp, 1_700_000_000);

        let decoded = decode_event(&frame).unwrap();
        match decoded {
            ExecutionEvent::ProcessFingerprintComputed(p) => assert_eq!(p.pip_id, PipId(42)),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_id_decodes_as_opaque() {
        let frame = Frame {
            event_id: crate::events::event_id::BXL_INVOCATION,
            worker_id: 0,
            timestamp: 0,
            payload: vec![1, 2, 3],
        };
        let decoded = decode_event(&frame).unwrap();
        match decoded {
            ExecutionEvent::Opaque { event_id, payload } => {
                assert_eq!(event_id, crate::events::event_id::BXL_INVOCATION);
                assert_eq!(payload, vec![1, 2, 3]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut bytes = Vec::new();
        bytes.write_u8(1).unwrap();
        bytes.write_varint(0u32).unwrap();
        bytes.write_i64::<BigEndian>(0).unwrap();
        bytes.write_varint(10i32).unwrap();
        bytes.extend_from_slice(&[1, 2, 3]);

        let err = Frame::decode(&bytes).unwrap_err();
        assert!(matches!(err, IngressError::Truncated { .. }));
    }
}
