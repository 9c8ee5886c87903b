//! Reference-frame selection: a pure function of frame metadata so tests
//! can pin or substitute the policy.

use crate::frame::FrameMetadata;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReferencePolicy {
    /// Frame whose exposure bias is closest to metered, lowest index on
    /// ties.
    #[default]
    ClosestToZeroBias,
    /// Always the first frame of the burst.
    First,
}

pub fn select_reference(frames: &[FrameMetadata], policy: ReferencePolicy) -> usize {
    match policy {
        ReferencePolicy::First => 0,
        ReferencePolicy::ClosestToZeroBias => frames
            .iter()
            .enumerate()
            .min_by_key(|(index, meta)| (meta.exposure_bias.unsigned_abs(), *index))
            .map(|(index, _)| index)
            .unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::frame::MosaicPattern};

    fn meta(exposure_bias: i32) -> FrameMetadata {
        FrameMetadata {
            url: format!("frame-{exposure_bias}"),
            width: 8,
            height: 8,
            mosaic: MosaicPattern::new(2).unwrap(),
            black_levels: vec![0.0; 4],
            white_level: 1023,
            exposure_bias,
            iso_exposure_time: 100.0,
            color_factors: [1.0; 3],
        }
    }

    #[test]
    fn picks_bias_closest_to_zero() {
        let frames = [meta(-200), meta(-25), meta(150)];
        assert_eq!(select_reference(&frames, ReferencePolicy::default()), 1);
    }

    #[test]
    fn ties_break_to_the_lowest_index() {
        let frames = [meta(100), meta(-100), meta(100)];
        assert_eq!(select_reference(&frames, ReferencePolicy::default()), 0);
    }

    #[test]
    fn first_policy_ignores_metadata() {
        let frames = [meta(500), meta(0)];
        assert_eq!(select_reference(&frames, ReferencePolicy::First), 0);
    }
}
