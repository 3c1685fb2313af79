// Result-set persistence: binary round trips and the file envelope

mod utils;

use phasemeter::attribution::persist::{decode_envelope, encode_envelope, FORMAT_VERSION, MAGIC};
use phasemeter::attribution::{drain, read_result_file, write_result_file, StepResult};
use phasemeter::{AttributionError, CodecError};
use tempfile::TempDir;
use utils::*;

fn assert_equivalent(a: &StepResult, b: &StepResult) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.phase().path(), y.phase().path());
        assert_eq!(paths(x.blocking_metrics()), paths(y.blocking_metrics()));
        assert_eq!(paths(x.consumable_metrics()), paths(y.consumable_metrics()));
        assert_eq!(
            paths(x.unused_blocking_metrics()),
            paths(y.unused_blocking_metrics())
        );
        assert_eq!(
            paths(x.unused_consumable_metrics()),
            paths(y.unused_consumable_metrics())
        );
        for (metric, rule) in x.rules() {
            assert_eq!(y.rule(metric), Some(rule));
            let mut ix = x.consumable_iterator(metric).unwrap();
            let mut iy = y.consumable_iterator(metric).unwrap();
            assert_eq!(drain(ix.as_mut()).unwrap(), drain(iy.as_mut()).unwrap());
        }
    }
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_bytes_round_trip() {
    let built = build(MIXED);
    let result = built.attribute(1).unwrap();

    let bytes = result.to_bytes().unwrap();
    let decoded = StepResult::from_bytes(&bytes, &built.context(), &built.providers).unwrap();
    assert_equivalent(&result, &decoded);
    assert_eq!(decoded.to_bytes().unwrap(), bytes);
}

#[test]
fn test_encoding_is_deterministic() {
    let built = build(MIXED);
    let sequential = built.attribute(1).unwrap();
    let parallel = built.attribute(4).unwrap();
    assert_eq!(sequential.to_bytes().unwrap(), parallel.to_bytes().unwrap());
}

#[test]
fn test_single_phase_layout() {
    let built = build(SCENARIO_A);
    let result = built.attribute(1).unwrap();
    let mut expected = vec![
        0x01, // one result
        0x00, // phase id 0
        0x00, // no blocking metrics
        0x00, // no unused blocking metrics
        0x00, // no unused consumable metrics
        0x01, // one consumable entry
        0x00, // metric id 0
        0x01, // tag Exact
    ];
    expected.extend_from_slice(&2.0f64.to_be_bytes());
    assert_eq!(result.to_bytes().unwrap(), expected);
}

#[test]
fn test_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("result.pmar");
    let built = build(MIXED);
    let result = built.attribute(2).unwrap();

    write_result_file(&path, &result).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], MAGIC);
    assert_eq!(bytes[4], FORMAT_VERSION);

    let loaded = read_result_file(&path, &built.context(), &built.providers).unwrap();
    assert_equivalent(&result, &loaded);
}

#[test]
fn test_empty_result_round_trip() {
    let built = build("");
    let result = built.attribute(1).unwrap();
    assert_eq!(result.to_bytes().unwrap(), vec![0x00]);
    let decoded = StepResult::from_bytes(&[0x00], &built.context(), &built.providers).unwrap();
    assert!(decoded.is_empty());
}

// ============================================================================
// Decoding failures
// ============================================================================

fn decode_err(built: &phasemeter::scenario::BuiltScenario, bytes: &[u8]) -> CodecError {
    match StepResult::from_bytes(bytes, &built.context(), &built.providers) {
        Err(AttributionError::Codec(err)) => err,
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("decoding should fail"),
    }
}

#[test]
fn test_truncated_input_rejected() {
    let built = build(SCENARIO_A);
    let bytes = built.attribute(1).unwrap().to_bytes().unwrap();
    for cut in 0..bytes.len() {
        assert!(
            matches!(decode_err(&built, &bytes[..cut]), CodecError::Truncated { .. }),
            "prefix of {} bytes",
            cut
        );
    }
}

#[test]
fn test_trailing_bytes_rejected() {
    let built = build(SCENARIO_A);
    let mut bytes = built.attribute(1).unwrap().to_bytes().unwrap();
    bytes.push(0xff);
    assert!(matches!(decode_err(&built, &bytes), CodecError::TrailingBytes(1)));
}

#[test]
fn test_unknown_rule_tag_rejected() {
    let built = build(SCENARIO_A);
    let mut bytes = built.attribute(1).unwrap().to_bytes().unwrap();
    bytes[7] = 9;
    assert!(matches!(
        decode_err(&built, &bytes),
        CodecError::UnknownTag { tag: 9, offset: 7 }
    ));
}

#[test]
fn test_negative_rule_payload_rejected() {
    let built = build(SCENARIO_A);
    let mut bytes = built.attribute(1).unwrap().to_bytes().unwrap();
    bytes.truncate(8);
    bytes.extend_from_slice(&(-1.0f64).to_be_bytes());
    assert!(matches!(decode_err(&built, &bytes), CodecError::InvalidRule(v) if v == -1.0));
}

#[test]
fn test_unknown_ids_rejected() {
    let built = build(SCENARIO_A);
    assert!(matches!(
        decode_err(&built, &[0x01, 0x05]),
        CodecError::UnknownPhase(5)
    ));
    assert!(matches!(
        decode_err(&built, &[0x01, 0x00, 0x01, 0x07]),
        CodecError::UnknownMetric(7)
    ));
}

#[test]
fn test_metric_kind_mismatch_rejected() {
    // Metric 0 of scenario A is consumable; file it as blocking
    let built = build(SCENARIO_A);
    let err = decode_err(&built, &[0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
    assert!(matches!(
        err,
        CodecError::KindMismatch {
            expected: "blocking",
            actual: "consumable",
            ..
        }
    ));
}

#[test]
fn test_stored_none_rule_violates_invariant() {
    let built = build(SCENARIO_A);
    let bytes = [0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00];
    assert!(matches!(
        StepResult::from_bytes(&bytes, &built.context(), &built.providers),
        Err(AttributionError::InvariantViolation(_))
    ));
}

#[test]
fn test_metric_listed_twice_in_one_set_rejected() {
    let built = build(SCENARIO_A);
    let bytes = [0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];
    assert!(matches!(
        decode_err(&built, &bytes),
        CodecError::DuplicateMetric {
            set: "unused consumable metrics",
            ..
        }
    ));

    // /node/gc (id 2) twice in the blocking set of /job/load
    let built = build(MIXED);
    let bytes = [0x01, 0x01, 0x02, 0x02, 0x02, 0x00, 0x00, 0x00];
    assert!(matches!(
        decode_err(&built, &bytes),
        CodecError::DuplicateMetric { ref metric, set: "blocking metrics" } if metric == "/node/gc"
    ));
}

#[test]
fn test_repeated_consumable_entry_rejected() {
    let built = build(SCENARIO_A);
    let mut bytes = vec![0x01, 0x00, 0x00, 0x00, 0x00, 0x02];
    for _ in 0..2 {
        bytes.extend_from_slice(&[0x00, 0x01]);
        bytes.extend_from_slice(&2.0f64.to_be_bytes());
    }
    assert!(matches!(
        decode_err(&built, &bytes),
        CodecError::DuplicateMetric {
            set: "consumable entries",
            ..
        }
    ));
}

#[test]
fn test_metric_in_two_sets_violates_invariant() {
    // Metric 0 both unused and attributed with an exact rule
    let built = build(SCENARIO_A);
    let mut bytes = vec![0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x01];
    bytes.extend_from_slice(&2.0f64.to_be_bytes());
    match StepResult::from_bytes(&bytes, &built.context(), &built.providers) {
        Err(AttributionError::InvariantViolation(msg)) => {
            assert!(msg.contains("more than one metric set"), "{}", msg)
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    // /node/gc both blocking and unused blocking
    let built = build(MIXED);
    let bytes = [0x01, 0x01, 0x01, 0x02, 0x01, 0x02, 0x00, 0x00];
    assert!(matches!(
        StepResult::from_bytes(&bytes, &built.context(), &built.providers),
        Err(AttributionError::InvariantViolation(_))
    ));
}

#[test]
fn test_repeated_phase_rejected() {
    let built = build(SCENARIO_A);
    let empty_phase = [0x00, 0x00, 0x00, 0x00, 0x00];
    let mut bytes = vec![0x02];
    bytes.extend_from_slice(&empty_phase);
    bytes.extend_from_slice(&empty_phase);
    assert!(matches!(
        decode_err(&built, &bytes),
        CodecError::DuplicatePhase(ref path) if path == "/p"
    ));
}

// ============================================================================
// Envelope
// ============================================================================

#[test]
fn test_envelope_round_trip() {
    let payload = [1u8, 2, 3, 4];
    let file = encode_envelope(&payload);
    assert_eq!(file.len(), 4 + 1 + payload.len() + 32);
    assert_eq!(decode_envelope(&file).unwrap(), &payload);
}

#[test]
fn test_envelope_rejects_bad_magic() {
    let mut file = encode_envelope(&[0]);
    file[0] = b'X';
    assert!(matches!(decode_envelope(&file), Err(CodecError::BadMagic)));
    assert!(matches!(decode_envelope(b"PM"), Err(CodecError::BadMagic)));
}

#[test]
fn test_envelope_rejects_unknown_version() {
    let mut file = encode_envelope(&[0]);
    file[4] = FORMAT_VERSION + 1;
    assert!(matches!(
        decode_envelope(&file),
        Err(CodecError::UnsupportedVersion(v)) if v == FORMAT_VERSION + 1
    ));
}

#[test]
fn test_envelope_detects_corruption() {
    let mut file = encode_envelope(&[0x01, 0x00]);
    file[5] ^= 0x40;
    assert!(matches!(
        decode_envelope(&file),
        Err(CodecError::ChecksumMismatch { .. })
    ));

    let file = encode_envelope(&[0x01]);
    assert!(matches!(
        decode_envelope(&file[..20]),
        Err(CodecError::Truncated { .. })
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let built = build(SCENARIO_A);
    let dir = TempDir::new().unwrap();
    let err = read_result_file(dir.path().join("absent"), &built.context(), &built.providers)
        .unwrap_err();
    assert!(matches!(err, AttributionError::Codec(CodecError::Io(_))));
}
