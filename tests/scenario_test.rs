//! Operational scenarios: damaged buffers, partial readout and shared decoders

use fed9u_rs::fed::records::DaqTrailer;
use fed9u_rs::fed::{
    BufferCursor, BufferCursorMut, BufferEncoder, ChannelError, CrcCheck, DaqMode, DecodeError,
    DecodeSettings, EncodeError, EncodeSettings, ErrorKind, EventDecoder, EventFormat, EventId,
    HeaderFormat, CHANNELS_PER_FED, STRIPS_PER_FED,
};
use rand::prelude::*;
use rand::rngs::StdRng;

fn single_hit_event() -> Vec<u32> {
    let mut strips = vec![0u16; STRIPS_PER_FED];
    strips[5000] = 800;
    let id = EventId {
        event_number: 1,
        bunch_crossing: 42,
    };
    BufferEncoder::default()
        .encode(id, &strips, None)
        .expect("encode")
        .into_words()
}

#[test]
fn test_single_hit_lands_in_channel_19() {
    let words = single_hit_event();
    let event = EventDecoder::default().parse(&words).unwrap();

    assert_eq!(event.event_number(), 1);
    assert_eq!(event.bunch_crossing(), 42);
    assert_eq!(event.daq_mode(), DaqMode::ZeroSuppressed);
    assert!(matches!(event.check_event(true).crc, CrcCheck::Ok(_)));

    for channel in event.channels() {
        let clusters = channel.clusters().unwrap();
        if channel.fed_channel() == 19 {
            assert_eq!(clusters.len(), 1);
            assert_eq!(clusters[0].first_strip, 136);
            assert_eq!(clusters[0].values, vec![254]);
            assert_eq!(channel.fe_unit(), 1);
            assert_eq!(channel.fe_unit_channel(), 7);
        } else {
            assert!(clusters.is_empty(), "channel {}", channel.fed_channel());
        }
    }
}

#[test]
fn test_four_byte_buffer_is_structural_error() {
    let err = EventDecoder::default().parse(&[0x5100_0001]).unwrap_err();
    assert!(matches!(err, DecodeError::BufferTooShort { actual: 4, .. }));
    assert_eq!(err.kind(), ErrorKind::Structural);
}

#[test]
fn test_truncated_buffer_is_rejected() {
    let words = single_hit_event();
    let err = EventDecoder::default()
        .parse(&words[..words.len() - 2])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structural);
}

#[test]
fn test_corrupt_trailer_length() {
    let mut words = single_hit_event();
    let trailer_offset = words.len() * 4 - 8;
    let mut trailer =
        DaqTrailer::decode(&BufferCursor::new(&words), trailer_offset, EventFormat::Standard)
            .unwrap();
    trailer.length_words += 1;
    trailer
        .encode(
            &mut BufferCursorMut::new(&mut words),
            trailer_offset,
            EventFormat::Standard,
        )
        .unwrap();

    let event = EventDecoder::default().parse(&words).unwrap();
    let report = event.check_event(true);
    assert!(!report.length.is_ok());
    assert_eq!(report.length.recorded, report.length.decoded + 1);
    assert!(!report.is_ok());
}

#[test]
fn test_trailing_words_fail_length_check() {
    let mut words = single_hit_event();
    words.extend_from_slice(&[0; 4]);

    let event = EventDecoder::default().parse(&words).unwrap();
    let report = event.check_event(true);
    assert_eq!(report.length.recorded, report.length.decoded);
    assert_eq!(report.length.buffer, report.length.decoded + 2);
    assert!(!report.length.is_ok());
    assert!(matches!(report.crc, CrcCheck::Ok(_)));
    assert!(!report.is_ok());
}

#[test]
fn test_header_fields_too_wide_are_rejected() {
    let strips = vec![0u16; STRIPS_PER_FED];
    let id = EventId {
        event_number: 0x100_0005,
        bunch_crossing: 5000,
    };
    let err = BufferEncoder::default().encode(id, &strips, None).unwrap_err();
    assert!(matches!(
        err,
        EncodeError::FieldOutOfRange {
            field: "event number",
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Structural);

    let encoder = BufferEncoder::new(EncodeSettings {
        source_id: 0x1234,
        ..Default::default()
    });
    assert!(matches!(
        encoder.encode(EventId::default(), &strips, None),
        Err(EncodeError::FieldOutOfRange {
            field: "source id",
            value: 0x1234,
            max: 0xFFF
        })
    ));
}

#[test]
fn test_disabled_fe_unit() {
    let settings = EncodeSettings {
        fe_enable_mask: 0xFE,
        ..Default::default()
    };
    let strips = vec![30u16; STRIPS_PER_FED];
    let buffer = BufferEncoder::new(settings)
        .encode(EventId::default(), &strips, None)
        .unwrap();
    let event = EventDecoder::default().parse(buffer.words()).unwrap();

    assert_eq!(event.fe_enable_mask(), 0xFE);
    assert!(!event.fe_unit_enabled(7));
    assert_eq!(event.units().len(), 7);
    assert_eq!(event.channels().count(), CHANNELS_PER_FED - 12);
    assert!(event.check_event(true).is_ok());

    assert!(event.channel(83).is_ok());
    let err = event.channel(84).unwrap_err();
    assert_eq!(
        err,
        ChannelError::FeUnitDisabled {
            fed_channel: 84,
            fe_unit: 7
        }
    );
    assert_eq!(err.kind(), ErrorKind::Semantic);
    assert_eq!(
        event.channel(96).unwrap_err(),
        ChannelError::ChannelOutOfBounds { index: 96 }
    );
}

#[test]
fn test_declared_mode_must_match_buffer() {
    let words = single_hit_event();
    let decoder = EventDecoder::new(DecodeSettings {
        daq_mode: Some(DaqMode::VirginRaw),
        ..DecodeSettings::standard()
    });
    assert!(matches!(
        decoder.parse(&words),
        Err(DecodeError::DeclaredMismatch { .. })
    ));

    let decoder = EventDecoder::new(DecodeSettings {
        header_format: Some(HeaderFormat::FullDebug),
        daq_mode: Some(DaqMode::ZeroSuppressed),
        fe_enable_mask: Some(0xFF),
        ..DecodeSettings::standard()
    });
    assert!(decoder.parse(&words).is_ok());
}

#[test]
fn test_apv_error_status_fault() {
    let settings = EncodeSettings {
        header_format: HeaderFormat::ApvError,
        ..Default::default()
    };
    let strips = vec![0u16; STRIPS_PER_FED];
    let mut words = BufferEncoder::new(settings)
        .encode(EventId::default(), &strips, None)
        .unwrap()
        .into_words();

    // first status byte: channel 0 of unit 0 in the top two bits, clear APV0-good
    let status_byte = 16;
    let current = BufferCursor::new(&words).byte_at(status_byte).unwrap();
    BufferCursorMut::new(&mut words)
        .set_byte(status_byte, current & !0x80)
        .unwrap();

    let event = EventDecoder::default().parse(&words).unwrap();
    let faults = event.channel_statuses();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].fed_channel, 0);
    assert_eq!(faults[0].status, 0b01);
    assert_eq!(faults[0].expected, 0b11);

    let status = event.channel(0).unwrap().status();
    assert!(!status.is_ok());
    assert!(!status.apv_good(0));
    assert!(status.apv_good(1));
    assert!(matches!(
        event.check_event(true).crc,
        CrcCheck::Mismatch { .. }
    ));
}

#[test]
fn test_decoder_shared_between_threads() {
    let decoder = EventDecoder::default();
    let encoder = BufferEncoder::default();

    let buffers: Vec<(Vec<u16>, Vec<u32>)> = (0..8u64)
        .map(|seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let strips: Vec<u16> = (0..STRIPS_PER_FED)
                .map(|_| if rng.gen_bool(0.02) { rng.gen_range(1..0x3FF) } else { 0 })
                .collect();
            let id = EventId {
                event_number: seed as u32,
                bunch_crossing: seed as u16,
            };
            let words = encoder.encode(id, &strips, None).unwrap().into_words();
            (strips, words)
        })
        .collect();

    let hit_counts: Vec<usize> = std::thread::scope(|scope| {
        let handles: Vec<_> = buffers
            .iter()
            .map(|(_, words)| {
                let decoder = &decoder;
                scope.spawn(move || {
                    let event = decoder.parse(words).unwrap();
                    assert!(event.check_event(true).is_ok());
                    event
                        .channels()
                        .map(|c| {
                            c.clusters()
                                .unwrap()
                                .iter()
                                .map(|cl| cl.width())
                                .sum::<usize>()
                        })
                        .sum()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for ((strips, _), hits) in buffers.iter().zip(hit_counts) {
        assert_eq!(strips.iter().filter(|&&s| s > 0).count(), hits);
    }
}
