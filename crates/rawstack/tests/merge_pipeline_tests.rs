mod common;

use {
    common::{plain_raw, read_fixture, textured_pixels, write_fixture, FixtureCodec},
    pretty_assertions::assert_eq,
    rawstack::{
        align::{align_burst, AlignSchedule},
        assemble::assemble,
        burst::Burst,
        compute::ComputeContext,
        config_file::RawstackConfig,
        frame::Frame,
        merge::{MergeOptions, MergeVariant, Merger},
        Pipeline,
    },
    std::sync::Arc,
    wrapped_rawcodec::DecodedRaw,
};

fn context() -> ComputeContext {
    ComputeContext::new(Some(2)).unwrap()
}

fn frame(raw: DecodedRaw, url: &str) -> Arc<Frame> {
    Frame::from_decoded(url, raw).map(Arc::new).unwrap()
}

/// A 64x64 single-frame burst of constant 1000 merges to itself, end to
/// end through the writer, with the template metadata preserved.
#[test_log::test]
fn identity_burst_roundtrips_bitwise() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("identity.dng");
    write_fixture(&input, &plain_raw(vec![1000; 64 * 64], 64, 64, 0, 555.0, 0)).unwrap();

    let mut config = RawstackConfig::default();
    config.output.directory = Some(dir.path().to_owned());
    config.threads = Some(2);
    let pipeline = Pipeline::new(config, Arc::new(FixtureCodec::new())).unwrap();
    let output = pipeline.process_burst(std::slice::from_ref(&input)).unwrap();

    let merged = read_fixture(&output).unwrap();
    assert_eq!(merged.pixels, vec![1000u16; 64 * 64]);
    assert_eq!((merged.width, merged.height, merged.mosaic_width), (64, 64, 2));
    assert_eq!(merged.white_level, 16383);
    assert_eq!(merged.iso_exposure_time, 555.0);
}

/// Two Bayer frames identical up to a 2-pixel translation: alignment finds
/// the translation everywhere it is reachable and the merge reproduces the
/// reference exactly outside the clamped right-edge tiles.
#[test_log::test]
fn two_frame_translation_aligns_and_merges_to_the_reference() {
    let ctx = context();
    let reference_pixels = textured_pixels(64, 64, 0, 0);
    let reference = frame(
        plain_raw(reference_pixels.clone(), 64, 64, 0, 1000.0, 0),
        "reference",
    );
    // the second frame's content sits two columns to the left
    let alternate = frame(
        plain_raw(textured_pixels(64, 64, -2, 0), 64, 64, 0, 1000.0, 0),
        "alternate",
    );
    let burst = Burst::new(vec![reference, alternate], 0).unwrap();

    let maps = align_burst(&ctx, &burst, &AlignSchedule::default());
    assert_eq!(maps.len(), 1);
    let map = &maps[0];
    for ty in 0..map.grid.tiles_y {
        for tx in 0..map.grid.tiles_x - 1 {
            let displacement = map.displacements[ty * map.grid.tiles_x + tx];
            assert_eq!(
                (displacement.dx, displacement.dy),
                (2, 0),
                "tile ({tx},{ty})"
            );
        }
    }

    let merger = Merger::from_options(&MergeOptions::default());
    let merged = merger.merge(&ctx, &burst, &maps);
    let out = assemble(&merged, burst.reference(), 0);
    assert_eq!((merged.width, merged.height), (64, 64));
    // pixels owned by the clamped right-edge tile column fall back to the
    // reference through robustness; everything else matches it exactly
    let edge_start = map.grid.stride * (map.grid.tiles_x - 1);
    for row in 0..64 {
        for col in 0..edge_start {
            assert_eq!(
                out[row * 64 + col],
                reference_pixels[row * 64 + col],
                "pixel ({col},{row})"
            );
        }
    }
}

/// Frames differing by two stops of exposure but identical content after
/// compensation merge back to the reference within one quantization step.
#[test_log::test]
fn exposure_mismatch_merges_to_the_reference_within_one_lsb() {
    let ctx = context();
    let black = 100u16;
    let bright: Vec<u16> = textured_pixels(64, 64, 0, 0)
        .iter()
        .map(|sample| black + (sample / 4) * 4)
        .collect();
    let dark: Vec<u16> = bright.iter().map(|sample| black + (sample - black) / 4).collect();

    let burst = Burst::new(
        vec![
            frame(
                plain_raw(bright.clone(), 64, 64, i32::from(black), 1000.0, 0),
                "bright",
            ),
            frame(
                plain_raw(dark, 64, 64, i32::from(black), 250.0, -200),
                "dark",
            ),
        ],
        0,
    )
    .unwrap();
    assert_eq!(burst.reference_index(), 0);

    let maps = align_burst(&ctx, &burst, &AlignSchedule::default());
    let merger = Merger::from_options(&MergeOptions::default());
    let merged = merger.merge(&ctx, &burst, &maps);
    let out = assemble(&merged, burst.reference(), 0);
    for (index, (merged_sample, reference_sample)) in out.iter().zip(&bright).enumerate() {
        let difference = i32::from(*merged_sample) - i32::from(*reference_sample);
        assert!(difference.abs() <= 1, "pixel {index}: {difference}");
    }
}

/// Output domain invariants: reference dimensions, samples within
/// [0, white_level], for both merge variants.
#[test_log::test]
fn merged_outputs_stay_inside_the_reference_domain() {
    let ctx = context();
    for variant in [MergeVariant::Spatial, MergeVariant::Frequency] {
        let burst = Burst::new(
            vec![
                frame(
                    plain_raw(textured_pixels(48, 32, 0, 64), 48, 32, 64, 1000.0, 0),
                    "reference",
                ),
                frame(
                    plain_raw(textured_pixels(48, 32, -4, 64), 48, 32, 64, 1000.0, 0),
                    "alternate",
                ),
            ],
            0,
        )
        .unwrap();
        let maps = align_burst(&ctx, &burst, &AlignSchedule::default());
        let options = MergeOptions {
            variant,
            ..MergeOptions::default()
        };
        let merged = Merger::from_options(&options).merge(&ctx, &burst, &maps);
        assert_eq!((merged.width, merged.height), (48, 32));
        let out = assemble(&merged, burst.reference(), 0);
        assert!(out.iter().all(|sample| *sample <= 16383));
    }
}

/// The frequency variant also satisfies the single-frame identity after
/// requantization.
#[test_log::test]
fn frequency_identity_burst_roundtrips_bitwise() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("identity.dng");
    let pixels = textured_pixels(64, 64, 0, 200);
    write_fixture(
        &input,
        &plain_raw(pixels.clone(), 64, 64, 200, 1000.0, 0),
    )
    .unwrap();

    let mut config = RawstackConfig::default();
    config.merge.variant = MergeVariant::Frequency;
    config.output.directory = Some(dir.path().to_owned());
    config.threads = Some(2);
    let pipeline = Pipeline::new(config, Arc::new(FixtureCodec::new())).unwrap();
    let output = pipeline.process_burst(std::slice::from_ref(&input)).unwrap();

    assert_eq!(read_fixture(&output).unwrap().pixels, pixels);
}

/// Cancellation observed at a stage boundary stops the burst.
#[test_log::test]
fn cancelled_pipeline_refuses_to_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("frame.dng");
    write_fixture(&input, &plain_raw(vec![900; 16 * 16], 16, 16, 0, 1000.0, 0)).unwrap();

    let mut config = RawstackConfig::default();
    config.threads = Some(1);
    let pipeline = Pipeline::new(config, Arc::new(FixtureCodec::new())).unwrap();
    pipeline.cancel();
    assert!(matches!(
        pipeline.process_burst(std::slice::from_ref(&input)),
        Err(rawstack::Error::Cancelled)
    ));
}
