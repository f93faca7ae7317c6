//! Screenshot file naming.
//!
//! Every screenshot is written as
//! `{reference_frame:06}_{source_frame:06}_{identity}.{ext}` into one flat
//! directory per run. The name is the only place the reference frame is
//! recorded on disk, so [`parse_screenshot_file_name`] can recover a run's
//! frame set from a directory listing.

use crate::error::ShotAlignError;

/// Characters that are replaced with `_` in identities.
const ILLEGAL_CHARACTERS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Make a source identity safe to embed in a filename.
///
/// Drops a trailing file extension and replaces characters that Windows and
/// Unix filesystems reject.
///
/// ```
/// use shotalign::sanitize_identity;
///
/// assert_eq!(sanitize_identity("Remaster: 2019.mkv"), "Remaster_ 2019");
/// assert_eq!(sanitize_identity("VerA"), "VerA");
/// ```
pub fn sanitize_identity(identity: &str) -> String {
    let stem = match identity.rfind('.') {
        Some(index) if index > 0 => &identity[..index],
        _ => identity,
    };
    stem.replace(ILLEGAL_CHARACTERS, "_")
}

/// Build the file name for one screenshot.
///
/// `identity` is sanitized; `extension` is used without a leading dot.
pub fn screenshot_file_name(
    reference_frame: u64,
    source_frame: u64,
    identity: &str,
    extension: &str,
) -> String {
    format!(
        "{reference_frame:06}_{source_frame:06}_{}.{}",
        sanitize_identity(identity),
        extension.trim_start_matches('.'),
    )
}

/// The parts of a screenshot file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotName {
    pub reference_frame: u64,
    pub source_frame: u64,
    /// Sanitized identity of the source.
    pub identity: String,
    pub extension: String,
}

/// Parse a name produced by [`screenshot_file_name`].
///
/// # Errors
///
/// Returns [`ShotAlignError::MalformedHistoryFilename`] when the name does
/// not have two numeric fields, an identity, and an extension.
pub fn parse_screenshot_file_name(file_name: &str) -> Result<ScreenshotName, ShotAlignError> {
    let malformed = || ShotAlignError::MalformedHistoryFilename(file_name.to_string());

    let (stem, extension) = file_name.rsplit_once('.').ok_or_else(malformed)?;
    if extension.is_empty() {
        return Err(malformed());
    }

    let mut fields = stem.splitn(3, '_');
    let reference_frame = parse_frame_field(fields.next()).ok_or_else(malformed)?;
    let source_frame = parse_frame_field(fields.next()).ok_or_else(malformed)?;
    let identity = fields.next().filter(|name| !name.is_empty()).ok_or_else(malformed)?;

    Ok(ScreenshotName {
        reference_frame,
        source_frame,
        identity: identity.to_string(),
        extension: extension.to_string(),
    })
}

fn parse_frame_field(field: Option<&str>) -> Option<u64> {
    field
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_zero_padded() {
        assert_eq!(screenshot_file_name(100, 96, "VerA", "png"), "000100_000096_VerA.png");
        assert_eq!(
            screenshot_file_name(52986, 63851, "DVD.mkv", ".png"),
            "052986_063851_DVD.png"
        );
    }

    #[test]
    fn wide_frame_numbers_are_not_truncated() {
        assert_eq!(
            screenshot_file_name(1_234_567, 7, "A", "png"),
            "1234567_000007_A.png"
        );
        let parsed = parse_screenshot_file_name("1234567_000007_A.png").unwrap();
        assert_eq!(parsed.reference_frame, 1_234_567);
    }

    #[test]
    fn sanitizes_illegal_characters() {
        assert_eq!(sanitize_identity(r#"a<b>c:d"e/f\g|h?i*j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_identity(".hidden"), ".hidden");
    }

    #[test]
    fn parses_identity_with_underscores() {
        let parsed = parse_screenshot_file_name("000250_000246_Ver_A_final.png").unwrap();
        assert_eq!(
            parsed,
            ScreenshotName {
                reference_frame: 250,
                source_frame: 246,
                identity: "Ver_A_final".to_string(),
                extension: "png".to_string(),
            }
        );
    }

    #[test]
    fn rejects_malformed_names() {
        for name in [
            "frame_000100.png",
            "000100_000096.png",
            "000100_000096_.png",
            "000100_000096_VerA",
            "000100_000096_VerA.",
            "00a100_000096_VerA.png",
            "-00100_000096_VerA.png",
            "_000096_VerA.png",
            "notes.txt",
        ] {
            assert!(
                matches!(
                    parse_screenshot_file_name(name),
                    Err(ShotAlignError::MalformedHistoryFilename(_))
                ),
                "{name} should be rejected",
            );
        }
    }

    #[test]
    fn name_round_trips_through_parser() {
        let name = screenshot_file_name(4, 5, "Blu-ray (JP).m2ts", "png");
        let parsed = parse_screenshot_file_name(&name).unwrap();
        assert_eq!(parsed.reference_frame, 4);
        assert_eq!(parsed.source_frame, 5);
        assert_eq!(parsed.identity, "Blu-ray (JP)");
    }
}
