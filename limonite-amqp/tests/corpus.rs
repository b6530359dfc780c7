//! Replays an on-disk corpus of (possibly adversarial) byte sequences
//! through the decoders, asserting clean failure rather than panics.
//!
//! Enabled by pointing the `TEST_CORPUS` environment variable at a
//! directory of raw input files; without it the test passes trivially.

use std::fs;
use std::path::PathBuf;

use limonite_amqp::types::codec::{from_slice, read_value};
use limonite_amqp::types::messaging::Message;
use limonite_amqp::types::performatives::Performative;
use limonite_amqp::types::sasl::SaslFrameBody;

fn corpus_dir() -> Option<PathBuf> {
    std::env::var_os("TEST_CORPUS").map(PathBuf::from)
}

#[test]
fn corpus_replay_never_panics() {
    let Some(dir) = corpus_dir() else { return };

    let entries = fs::read_dir(&dir).unwrap_or_else(|err| {
        panic!("cannot read corpus directory {}: {}", dir.display(), err)
    });

    let mut files = 0usize;
    for entry in entries {
        let path = entry.unwrap().path();
        if !path.is_file() {
            continue;
        }
        let data = fs::read(&path).unwrap();
        files += 1;

        // every decoder must either produce a value or fail cleanly
        let _ = read_value(&data);
        let _ = from_slice::<Performative>(&data);
        let _ = from_slice::<SaslFrameBody>(&data);
        let _ = from_slice::<Message>(&data);
    }
    println!("replayed {} corpus files from {}", files, dir.display());
}

#[test]
fn pseudo_random_inputs_fail_cleanly() {
    // a cheap deterministic generator so the test needs no corpus on disk
    let mut state = 0x243f_6a88_85a3_08d3u64;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    for _ in 0..2000 {
        let len = (next() % 64) as usize;
        let mut data = Vec::with_capacity(len);
        for _ in 0..len {
            data.push(next() as u8);
        }
        let _ = read_value(&data);
        let _ = from_slice::<Performative>(&data);
    }
}

#[test]
fn truncations_of_valid_encodings_fail_cleanly() {
    use limonite_amqp::types::codec::to_vec;
    use limonite_amqp::types::performatives::Open;

    let open = Open {
        container_id: "corpus".to_string(),
        hostname: Some("example.com".to_string()),
        max_frame_size: 4096,
        idle_time_out: Some(30_000),
        ..Default::default()
    };
    let bytes = to_vec(&open);
    for cut in 0..bytes.len() {
        assert!(
            from_slice::<Performative>(&bytes[..cut]).is_err(),
            "truncation at {} must fail",
            cut
        );
    }
    let (decoded, consumed) = from_slice::<Performative>(&bytes).unwrap();
    assert_eq!(consumed, bytes.len());
    assert!(matches!(decoded, Performative::Open(_)));
}
