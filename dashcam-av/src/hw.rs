//! Encoder discovery: the configured encoder first, then whatever hardware
//! H.264 encoder the build offers, then software.

const HW_H264_ENCODERS: &[&str] = &["h264_v4l2m2m", "h264_vaapi", "h264_qsv", "h264_nvenc"];
const SW_H264_ENCODER: &str = "libx264";

/// Encoder names to try, in order, for the configured `preferred` encoder.
pub fn encoder_candidates(preferred: &str) -> Vec<&str> {
    let mut names = vec![preferred];
    for name in HW_H264_ENCODERS.iter().chain([&SW_H264_ENCODER]) {
        if !names.contains(name) {
            names.push(*name);
        }
    }
    names
}

pub fn is_hardware(codec_name: &str) -> bool {
    HW_H264_ENCODERS.contains(&codec_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_start_with_preferred() {
        let names = encoder_candidates("h264_v4l2m2m");
        assert_eq!(names[0], "h264_v4l2m2m");
        assert_eq!(names.last(), Some(&"libx264"));
        assert_eq!(names.iter().filter(|n| **n == "h264_v4l2m2m").count(), 1);
    }

    #[test]
    fn test_unknown_preferred_keeps_fallbacks() {
        let names = encoder_candidates("h264_omx");
        assert_eq!(names.len(), HW_H264_ENCODERS.len() + 2);
        assert!(!is_hardware("libx264"));
        assert!(is_hardware("h264_vaapi"));
    }
}
