//! Integration tests for writing ADV files and verifying round-trip.

use adv::adv::{
    AdvFile, AdvReader, CompressionMode, DeltaBaseline, FrameKind, ImageLayout, StatusTagType,
    StatusValue,
};
use adv::core::{crc32, to_ticks};
use adv::Error;

use tempfile::NamedTempFile;

/// Slowly varying 12-bit test image with per-frame jitter.
fn star_field(width: usize, height: usize, k: usize) -> Vec<u16> {
    (0..width * height)
        .map(|i| {
            let background = 2000 + ((i * 13) % 97) as i32;
            let jitter = ((k * 7 + i * 3) % 11) as i32 - 5;
            (background + jitter) as u16
        })
        .collect()
}

#[test]
fn test_single_frame_scenario() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let path = temp.path();
    let pixels: Vec<u16> = (0..64u16).map(|i| i * 1000).collect();

    {
        let mut file = AdvFile::new();
        file.begin_file(path).expect("Failed to begin file");
        file.add_image_section(ImageLayout::raw(1, 8, 8, 16)).expect("Failed to add layout");
        file.begin_frame(1000, 0, 40).expect("Failed to begin frame");
        file.add_frame_image(1, &pixels, 16).expect("Failed to add image");
        file.end_frame().expect("Failed to end frame");
        file.end_file().expect("Failed to end file");
    }

    let reader = AdvReader::open(path).expect("Failed to open file");
    assert!(reader.is_finalized());
    assert_eq!(reader.frame_count(), 1, "Exactly one index entry");
    assert_eq!(reader.layouts().len(), 1, "Header declares one layout");
    assert_eq!(reader.header().layout_count, 1);

    let frame = reader.read_frame(0).expect("Failed to read frame");
    assert_eq!(frame.timestamp, 1000);
    assert_eq!(frame.elapsed, 0);
    assert_eq!(frame.exposure, 40);

    let image = frame.image.expect("Frame should carry an image");
    assert_eq!(image.kind, FrameKind::Keyframe);
    assert_eq!(crc32(&image.payload), image.checksum, "Stored checksum matches recomputation");

    assert_eq!(reader.decode_pixels(0).unwrap(), Some(pixels));
    let report = reader.verify().expect("Verification failed");
    assert_eq!(report.frames, 1);
    assert_eq!(report.images, 1);
}

#[test]
fn test_unregistered_layout_scenario() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let path = temp.path();

    {
        let mut file = AdvFile::new();
        file.begin_file(path).unwrap();
        file.add_image_section(ImageLayout::raw(1, 2, 2, 16)).unwrap();
        file.begin_frame(1000, 0, 40).unwrap();

        let err = file.add_frame_image(7, &[0; 4], 16).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {:?}", err);
        assert!(matches!(file.end_frame(), Err(Error::State(_))));
        assert_eq!(file.frame_count(), 0);
        file.end_file().unwrap();
    }

    let reader = AdvReader::open(path).unwrap();
    assert_eq!(reader.frame_count(), 0);
    assert!(reader.index().is_empty());
}

#[test]
fn test_dropped_file_is_incomplete() {
    let temp = NamedTempFile::new().unwrap();
    let path = temp.path();

    {
        let mut file = AdvFile::new();
        file.begin_file(path).unwrap();
        file.add_image_section(ImageLayout::raw(1, 4, 4, 8)).unwrap();
        for k in 0..3 {
            file.begin_frame(k * 400, 0, 0).unwrap();
            file.add_frame_image(1, &[k as u16; 16], 8).unwrap();
            file.end_frame().unwrap();
        }
        // Dropped without end_file.
    }

    assert!(matches!(AdvReader::open(path), Err(Error::Incomplete)));
    let header = AdvReader::probe(path).unwrap();
    assert!(!header.finalized);
    assert_eq!(header.frame_count, 0);
}

#[test]
fn test_corruption_detected() {
    let temp = NamedTempFile::new().unwrap();
    let path = temp.path();

    {
        let mut file = AdvFile::new();
        file.begin_file(path).unwrap();
        file.add_image_section(ImageLayout::raw(1, 16, 16, 16)).unwrap();
        for k in 0..4 {
            file.begin_frame(k * 400, 0, 0).unwrap();
            file.add_frame_image(1, &star_field(16, 16, k as usize), 16).unwrap();
            file.end_frame().unwrap();
        }
        file.end_file().unwrap();
    }

    let entry = {
        let reader = AdvReader::open(path).unwrap();
        reader.verify().expect("Clean file should verify");
        *reader.index().get(2).unwrap()
    };

    // Last payload byte of frame 2 sits right before its checksum.
    let mut bytes = std::fs::read(path).unwrap();
    bytes[entry.end() as usize - 5] ^= 0x5A;
    std::fs::write(path, &bytes).unwrap();

    let reader = AdvReader::open(path).unwrap();
    assert!(matches!(reader.verify(), Err(Error::Consistency(_))));
    assert!(matches!(reader.decode_pixels(2), Err(Error::Consistency(_))));
    assert!(reader.decode_pixels(1).is_ok());
}

#[test]
fn test_delta_round_trip() {
    let temp = NamedTempFile::new().unwrap();
    let path = temp.path();
    let (w, h) = (32usize, 24usize);

    let previous = ImageLayout::delta(1, w as u32, h as u32, 12, DeltaBaseline::PreviousFrame)
        .with_compression(CompressionMode::Generic)
        .with_keyframe_interval(4);
    let keyed = ImageLayout::delta(2, w as u32, h as u32, 12, DeltaBaseline::Keyframe);

    let mut written = Vec::new();
    {
        let mut file = AdvFile::new();
        file.begin_file(path).unwrap();
        file.add_image_section(previous).unwrap();
        file.add_image_section(keyed).unwrap();

        for k in 0..20usize {
            // Layouts alternate, with a status-only frame every fifth frame.
            let layout = if k % 5 == 4 { None } else if k % 2 == 0 { Some(1) } else { Some(2) };
            let pixels = star_field(w, h, k);
            file.begin_frame(k as i64 * 400, 400, 400).unwrap();
            if let Some(id) = layout {
                file.add_frame_image(id, &pixels, 12).unwrap();
            }
            file.end_frame().unwrap();
            written.push(layout.map(|id| (id, pixels)));
        }
        file.end_file().unwrap();
    }

    let reader = AdvReader::open(path).unwrap();
    assert_eq!(reader.frame_count(), 20);
    reader.verify().unwrap();

    let mut kinds = Vec::new();
    for (k, expected) in written.iter().enumerate() {
        let frame = reader.read_frame(k).unwrap();
        match expected {
            Some((id, pixels)) => {
                let image = frame.image.as_ref().unwrap();
                assert_eq!(image.layout_id, *id);
                kinds.push((*id, image.kind));
                assert_eq!(reader.decode_pixels(k).unwrap().as_ref(), Some(pixels), "frame {}", k);
            }
            None => {
                assert!(frame.image.is_none());
                assert_eq!(reader.decode_pixels(k).unwrap(), None);
            }
        }
    }

    let layout_kinds = |id: u8| -> Vec<FrameKind> {
        kinds.iter().filter(|(l, _)| *l == id).map(|(_, kind)| *kind).collect()
    };
    let first = layout_kinds(1);
    assert_eq!(first[0], FrameKind::Keyframe);
    assert_eq!(first[1], FrameKind::Delta);
    assert_eq!(first[4], FrameKind::Keyframe, "keyframe interval of 4");

    let second = layout_kinds(2);
    assert_eq!(second[0], FrameKind::Keyframe);
    assert!(second[1..].iter().all(|k| *k == FrameKind::Delta));

    let compressed = reader
        .frames()
        .filter_map(|f| f.unwrap().image)
        .filter(|i| i.layout_id == 1)
        .all(|i| i.compressed && i.payload.len() < i.raw_len as usize);
    assert!(compressed, "delta planes of a star field should compress");
}

#[test]
fn test_status_round_trip() {
    let temp = NamedTempFile::new().unwrap();
    let path = temp.path();
    let start = to_ticks(2024, 3, 14, 21, 5, 0, 0).unwrap();

    {
        let mut file = AdvFile::new();
        file.begin_file(path).unwrap();
        file.add_file_tag("OBSERVER", "M. Observer").unwrap();
        let gain = file.add_status_tag("Gain", StatusTagType::Real).unwrap();
        let counter = file.add_status_tag("HardwareCounter", StatusTagType::UInt64).unwrap();
        let sats = file.add_status_tag("GPSSatellites", StatusTagType::UInt8).unwrap();
        let fix = file.add_status_tag("GPSFix", StatusTagType::FixedString).unwrap();
        let log = file.add_status_tag("Messages", StatusTagType::List).unwrap();

        for k in 0..3u64 {
            file.begin_frame(start + k as i64 * 400, 400, 400).unwrap();
            file.add_frame_status_tag_real(gain, 1.5 * k as f32).unwrap();
            file.add_frame_status_tag_u64(counter, 1_000_000 + k).unwrap();
            if k != 1 {
                file.add_frame_status_tag_u8(sats, 7).unwrap();
            }
            file.add_frame_status_tag_string(fix, "3D").unwrap();
            file.add_frame_status_tag_message(log, "exposure ok").unwrap();
            file.add_frame_status_tag_message(log, &format!("frame {}", k)).unwrap();
            file.end_frame().unwrap();
        }
        file.end_file().unwrap();
    }

    let reader = AdvReader::open(path).unwrap();
    assert_eq!(reader.file_tags().get("OBSERVER"), Some("M. Observer"));
    assert!(reader.file_tags().get("RECORDER").is_some());

    let names: Vec<&str> = reader.status_tags().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["Gain", "HardwareCounter", "GPSSatellites", "GPSFix", "Messages"]);
    assert_eq!(reader.status_tags()[4].tag_type, StatusTagType::List);

    let frame = reader.read_frame(1).unwrap();
    assert_eq!(frame.timestamp, start + 400);
    assert!(frame.image.is_none());
    assert_eq!(frame.status.get(0), Some(&StatusValue::Real(1.5)));
    assert_eq!(frame.status.get(1), Some(&StatusValue::UInt64(1_000_001)));
    assert_eq!(frame.status.get(2), None);
    assert_eq!(frame.status.get(3), Some(&StatusValue::FixedString("3D".into())));
    assert_eq!(
        frame.status.get(4),
        Some(&StatusValue::List(vec!["exposure ok".into(), "frame 1".into()]))
    );
    assert_eq!(reader.read_frame(2).unwrap().status.get(2), Some(&StatusValue::UInt8(7)));
}

#[test]
fn test_index_is_complete_and_ordered() {
    let temp = NamedTempFile::new().unwrap();
    let path = temp.path();
    let mut committed = 0;

    {
        let mut file = AdvFile::new();
        file.begin_file(path).unwrap();
        file.add_image_section(ImageLayout::raw(1, 8, 8, 8)).unwrap();
        for k in 0..50usize {
            file.begin_frame(k as i64 * 400, 0, 0).unwrap();
            if k % 7 == 3 {
                // Over-range pixel aborts the frame.
                assert!(file.add_frame_image(1, &[300; 64], 8).is_err());
                continue;
            }
            file.add_frame_image(1, &[(k % 256) as u16; 64], 8).unwrap();
            file.end_frame().unwrap();
            committed += 1;
        }
        file.end_file().unwrap();
    }

    let reader = AdvReader::open(path).unwrap();
    assert_eq!(reader.frame_count(), committed);
    let entries: Vec<_> = reader.index().iter().copied().collect();
    for (i, pair) in entries.windows(2).enumerate() {
        assert_eq!(pair[0].frame_no as usize, i);
        assert_eq!(pair[1].frame_no, pair[0].frame_no + 1);
        assert!(pair[0].end() <= pair[1].offset);
    }
    assert!(matches!(
        reader.read_frame(committed),
        Err(Error::FrameOutOfBounds { .. })
    ));
}

#[test]
fn test_corrupt_trailer_rejected() {
    let temp = NamedTempFile::new().unwrap();
    let path = temp.path();

    {
        let mut file = AdvFile::new();
        file.begin_file(path).unwrap();
        file.add_image_section(ImageLayout::raw(1, 4, 4, 16)).unwrap();
        for k in 0..2 {
            file.begin_frame(k * 400, 0, 0).unwrap();
            file.add_frame_image(1, &star_field(4, 4, k as usize), 16).unwrap();
            file.end_frame().unwrap();
        }
        file.end_file().unwrap();
    }

    let index_pos = AdvReader::open(path).unwrap().header().index_pos as usize;
    let clean = std::fs::read(path).unwrap();
    // Trailer: count u32, then (offset u64, length u32) per frame.
    let first_offset = index_pos + 4;
    let second_offset = first_offset + 12;

    let mut bytes = clean.clone();
    bytes[first_offset..first_offset + 8].copy_from_slice(&(u64::MAX - 1).to_le_bytes());
    std::fs::write(path, &bytes).unwrap();
    assert!(matches!(AdvReader::open(path), Err(Error::InvalidStructure(_))));

    let mut bytes = clean.clone();
    bytes[second_offset..second_offset + 8].copy_from_slice(&(index_pos as u64 - 1).to_le_bytes());
    std::fs::write(path, &bytes).unwrap();
    assert!(matches!(AdvReader::open(path), Err(Error::InvalidStructure(_))));

    let mut bytes = clean;
    bytes[first_offset..first_offset + 8].copy_from_slice(&4u64.to_le_bytes());
    std::fs::write(path, &bytes).unwrap();
    assert!(matches!(AdvReader::open(path), Err(Error::InvalidStructure(_))));
}

#[test]
fn test_open_errors() {
    let temp = NamedTempFile::new().unwrap();
    std::fs::write(temp.path(), b"not an adv file at all, just some plain text padding").unwrap();
    assert!(matches!(AdvReader::open(temp.path()), Err(Error::InvalidMagic)));

    std::fs::write(temp.path(), b"FSTF").unwrap();
    assert!(matches!(AdvReader::open(temp.path()), Err(Error::UnexpectedEof(_))));

    let missing = temp.path().with_extension("missing.adv");
    assert!(matches!(AdvReader::open(&missing), Err(Error::FileNotFound(_))));
}
