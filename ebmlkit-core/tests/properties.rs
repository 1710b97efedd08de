// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

//! Codec invariants, exercised densely around every encoding-length
//! threshold.

use std::io::Cursor;

use time::macros::datetime;
use time::Duration;

use ebmlkit_core::codec;
use ebmlkit_core::errors::Error;
use ebmlkit_core::vint;

/// Size values around every minimum-length threshold, plus assorted
/// mid-range values.
fn size_samples() -> Vec<u64> {
    let thresholds: [u64; 8] = [
        126,
        16_382,
        2_097_150,
        268_435_454,
        34_359_738_366,
        4_398_046_511_102,
        562_949_953_421_310,
        72_057_594_037_927_934,
    ];
    let mut samples = vec![0, 1, 2, 63, 64, 100, 1000, 123_456_789];
    for t in thresholds {
        samples.extend([t - 1, t]);
        if t < u64::MAX {
            samples.push(t + 1);
        }
    }
    samples.retain(|s| *s <= 72_057_594_037_927_934);
    samples.sort_unstable();
    samples.dedup();
    samples
}

#[test]
fn size_varint_round_trip_at_minimum_length() {
    for value in size_samples() {
        let encoded = vint::encode_size(Some(value), None).unwrap();
        assert_eq!(
            encoded.len() as u32,
            vint::min_size_length(value).unwrap(),
            "value {} not encoded at minimum length",
            value
        );
        let (decoded, length) = vint::read_size(&mut Cursor::new(&encoded)).unwrap();
        assert_eq!(decoded, Some(value));
        assert_eq!(length as usize, encoded.len());
    }
}

#[test]
fn unknown_size_round_trip_at_every_length() {
    for length in 1..=8u32 {
        let encoded = vint::encode_size(None, Some(length)).unwrap();
        let (decoded, decoded_length) = vint::read_size(&mut Cursor::new(&encoded)).unwrap();
        assert_eq!(decoded, None);
        assert_eq!(decoded_length, length);
    }
}

#[test]
fn id_round_trip_over_the_encodable_range() {
    // Canonical IDs of every length class, including both range endpoints.
    let ids: [u32; 12] = [
        0x81, 0xA3, 0xEC, 0xFE, 0x4286, 0x7FFE, 0x200002, 0x3FFFFE, 0x1A45DFA3, 0x18538067,
        0x10000002, 0x1FFFFFFE,
    ];
    for id in ids {
        let encoded = vint::encode_id(id, None).unwrap();
        let (decoded, length) = vint::read_id(&mut Cursor::new(&encoded)).unwrap();
        assert_eq!(decoded, id);
        assert_eq!(length as usize, encoded.len());
    }

    // Out of range without a fixed length that accommodates it.
    assert!(vint::encode_id(0x2000_0001, None).is_err());
}

#[test]
fn int_sign_preservation_across_widths() {
    let mut samples: Vec<i64> = vec![0, i64::MAX, i64::MIN];
    for shift in 0..63 {
        let magnitude = 1i64 << shift;
        samples.extend([magnitude, -magnitude, magnitude - 1, -magnitude - 1]);
    }

    for value in samples {
        let encoded = codec::encode_int(value, None).unwrap();
        let decoded = codec::read_int(&mut Cursor::new(&encoded), encoded.len() as u64).unwrap();
        assert_eq!(decoded, value, "sign or magnitude lost via {:02X?}", encoded);
    }
}

#[test]
fn uint_round_trip_across_widths() {
    let mut samples: Vec<u64> = vec![0, u64::MAX];
    for shift in 0..64 {
        let magnitude = 1u64 << shift;
        samples.extend([magnitude, magnitude - 1]);
    }

    for value in samples {
        let encoded = codec::encode_uint(value, None).unwrap();
        assert!(encoded.len() <= 8);
        let decoded = codec::read_uint(&mut Cursor::new(&encoded), encoded.len() as u64).unwrap();
        assert_eq!(decoded, value);
    }
}

#[test]
fn date_is_bijective_to_microseconds() {
    let epoch = datetime!(2001-01-01 00:00 UTC);
    assert_eq!(codec::encode_date(epoch, None).unwrap(), vec![0u8; 8]);

    let instants = [
        epoch - Duration::nanoseconds(1),
        epoch + Duration::microseconds(1),
        datetime!(1970-01-01 00:00 UTC),
        datetime!(2011-01-24 23:34:56.789012 UTC),
        datetime!(2038-01-19 03:14:07 UTC),
    ];
    for instant in instants {
        let encoded = codec::encode_date(instant, None).unwrap();
        assert_eq!(encoded.len(), 8);
        let decoded = codec::read_date(&mut Cursor::new(&encoded), 8).unwrap();
        // Full nanosecond fidelity implies microsecond fidelity.
        assert_eq!(decoded, instant);
    }
}

#[test]
fn fixed_length_never_silently_truncates() {
    assert!(matches!(
        vint::encode_size(Some(127), Some(1)),
        Err(Error::LengthTooSmall(_))
    ));
    assert!(matches!(codec::encode_uint(256, Some(1)), Err(Error::LengthTooSmall(_))));
    assert!(matches!(codec::encode_int(-129, Some(1)), Err(Error::LengthTooSmall(_))));
}
