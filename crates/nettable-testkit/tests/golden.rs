//! Golden wire-format tests: the byte layout is an interop contract, so
//! every vector must match bit for bit in both directions.

use std::io::Cursor;

use nettable_core::{EntryId, EntryType, MessageKind, WireDecoder, WireEncoder, PROTO_REV_3};
use nettable_testkit::wire_vectors;

#[test]
fn test_every_vector_encodes_to_pinned_bytes() {
    for vector in wire_vectors() {
        let mut enc = WireEncoder::new(vector.proto_rev);
        enc.write_message(&(vector.message)()).unwrap();
        assert_eq!(
            hex::encode(enc.data()),
            vector.hex,
            "encoding mismatch for {}",
            vector.name
        );
    }
}

#[test]
fn test_every_vector_decodes_to_original_message() {
    for vector in wire_vectors() {
        let ty = vector.resolver_type;
        let resolver = move |_kind: MessageKind, _id: EntryId| -> Option<EntryType> { ty };
        let mut dec = WireDecoder::new(Cursor::new(vector.bytes()), vector.proto_rev);
        let msg = dec
            .read_message(&resolver)
            .unwrap_or_else(|e| panic!("decode failed for {}: {e}", vector.name))
            .unwrap_or_else(|| panic!("empty decode for {}", vector.name));
        assert_eq!(msg, (vector.message)(), "decoding mismatch for {}", vector.name);
        assert!(
            dec.read_message(&resolver).unwrap().is_none(),
            "trailing bytes after {}",
            vector.name
        );
    }
}

#[test]
fn test_rev3_vectors_decode_back_to_back_as_one_batch() {
    // the writer thread concatenates a whole batch into one stream; the
    // framing must keep messages separable with no delimiters
    let vectors: Vec<_> = wire_vectors()
        .into_iter()
        .filter(|v| v.proto_rev == PROTO_REV_3)
        .collect();
    let mut stream = Vec::new();
    for vector in &vectors {
        stream.extend_from_slice(&vector.bytes());
    }

    let resolver = |_kind: MessageKind, _id: EntryId| -> Option<EntryType> { None };
    let mut dec = WireDecoder::new(Cursor::new(stream), PROTO_REV_3);
    for vector in &vectors {
        let msg = dec.read_message(&resolver).unwrap().unwrap();
        assert_eq!(msg, (vector.message)(), "batch decode diverged at {}", vector.name);
    }
    assert!(dec.read_message(&resolver).unwrap().is_none());
}
