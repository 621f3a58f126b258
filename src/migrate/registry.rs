//! Static lookup tables used while mapping legacy records.

pub const SEC_PUBLIC: i16 = 0;
pub const SEC_SENSITIVE: i16 = 1;
pub const SEC_PRIVATE: i16 = 2;

pub const LANG_UNKNOWN: &str = "xx";
pub const LANG_ENGLISH: &str = "en";
pub const LANG_HEBREW: &str = "he";
pub const LANG_RUSSIAN: &str = "ru";
pub const LANG_SPANISH: &str = "es";

/// Languages that receive the node name when a node has no localized text.
pub const FALLBACK_NAME_LANGS: [&str; 4] = [LANG_ENGLISH, LANG_HEBREW, LANG_RUSSIAN, LANG_SPANISH];

/// Role of a lecturer on a unit.
pub const LECTURER_ROLE_ID: i64 = 1;

/// Legacy lecturer id -> target person pattern.
pub fn lecturer_pattern(lecturer_id: i32) -> Option<&'static str> {
    match lecturer_id {
        1 => Some("rav"),
        8 => Some("rb"),
        _ => None,
    }
}

/// Legacy visibility level -> target visibility.
pub fn map_secure(legacy: i32) -> i16 {
    if legacy == 0 {
        SEC_PUBLIC
    } else if legacy < 4 {
        SEC_SENSITIVE
    } else {
        SEC_PRIVATE
    }
}

const LANG_MAP: &[(&str, &str)] = &[
    ("MLT", "zz"),
    ("ENG", "en"),
    ("HEB", "he"),
    ("RUS", "ru"),
    ("SPA", "es"),
    ("ITA", "it"),
    ("GER", "de"),
    ("DUT", "nl"),
    ("FRE", "fr"),
    ("POR", "pt"),
    ("TRK", "tr"),
    ("TUR", "tr"),
    ("POL", "pl"),
    ("ARB", "ar"),
    ("ARA", "ar"),
    ("HUN", "hu"),
    ("FIN", "fi"),
    ("LIT", "lt"),
    ("JPN", "ja"),
    ("BUL", "bg"),
    ("GEO", "ka"),
    ("NOR", "no"),
    ("SWE", "sv"),
    ("HRV", "hr"),
    ("CHN", "zh"),
    ("CHI", "zh"),
    ("PER", "fa"),
    ("RON", "ro"),
    ("HIN", "hi"),
    ("MKD", "mk"),
    ("LAV", "lv"),
    ("UKR", "ua"),
    ("AMH", "am"),
    ("IND", "id"),
    ("ARM", "hy"),
    ("ORI", "or"),
    ("SLV", "cs"),
    ("CZE", "cs"),
];

/// Normalizes a legacy language code. Three letter codes go through the
/// legacy table, known two letter codes pass through, anything else is
/// [`LANG_UNKNOWN`].
pub fn std_lang(raw: &str) -> &'static str {
    let raw = raw.trim();
    match raw.len() {
        2 => {
            let lower = raw.to_ascii_lowercase();
            LANG_MAP
                .iter()
                .map(|(_, two)| *two)
                .chain([LANG_UNKNOWN, "sl"])
                .find(|two| *two == lower)
                .unwrap_or(LANG_UNKNOWN)
        }
        3 => {
            let upper = raw.to_ascii_uppercase();
            LANG_MAP
                .iter()
                .find(|(three, _)| *three == upper)
                .map(|(_, two)| *two)
                .unwrap_or(LANG_UNKNOWN)
        }
        _ => LANG_UNKNOWN,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaType {
    pub extension: &'static str,
    pub kind: &'static str,
    pub sub_type: &'static str,
    pub mime_type: &'static str,
}

const fn mt(extension: &'static str, kind: &'static str, mime_type: &'static str) -> MediaType {
    MediaType {
        extension,
        kind,
        sub_type: "",
        mime_type,
    }
}

// First entry wins for duplicated extensions.
const MEDIA_TYPES: &[MediaType] = &[
    mt("mp4", "video", "video/mp4"),
    mt("wmv", "video", "video/x-ms-wmv"),
    mt("flv", "video", "video/x-flv"),
    mt("mov", "video", "video/quicktime"),
    mt("asf", "video", "video/x-ms-asf"),
    mt("mpg", "video", "video/mpeg"),
    mt("avi", "video", "video/x-msvideo"),
    mt("mp3", "audio", "audio/mpeg"),
    mt("wma", "audio", "audio/x-ms-wma"),
    mt("mid", "audio", "audio/midi"),
    mt("wav", "audio", "audio/x-wav"),
    mt("aac", "audio", "audio/aac"),
    mt("jpg", "image", "image/jpeg"),
    mt("png", "image", "image/png"),
    mt("gif", "image", "image/gif"),
    mt("bmp", "image", "image/bmp"),
    mt("tif", "image", "image/tiff"),
    mt("zip", "image", "application/zip"),
    mt("7z", "image", "application/x-7z-compressed"),
    mt("rar", "image", "application/x-rar-compressed"),
    mt("sfk", "image", ""),
    mt("doc", "text", "application/msword"),
    mt(
        "docx",
        "text",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    mt("htm", "text", "text/html"),
    mt("html", "text", "text/html"),
    mt("pdf", "text", "application/pdf"),
    mt("epub", "text", "application/epub+zip"),
    mt("rtf", "text", "text/rtf"),
    mt("txt", "text", "text/plain"),
    mt("fb2", "text", "text/xml"),
    mt("rb", "text", "application/x-rocketbook"),
    mt("xls", "sheet", "application/vnd.ms-excel"),
    mt("swf", "banner", "application/x-shockwave-flash"),
    mt("ppt", "presentation", "application/vnd.ms-powerpoint"),
    mt(
        "pptx",
        "presentation",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    mt("pps", "presentation", "application/vnd.ms-powerpoint"),
    mt("vtt", "subtitles", "text/vtt"),
];

/// Case-insensitive lookup by file extension.
pub fn media_type_by_extension(ext: &str) -> Option<&'static MediaType> {
    let lower = ext.trim().to_ascii_lowercase();
    MEDIA_TYPES.iter().find(|m| m.extension == lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_levels() {
        assert_eq!(map_secure(0), SEC_PUBLIC);
        assert_eq!(map_secure(1), SEC_SENSITIVE);
        assert_eq!(map_secure(3), SEC_SENSITIVE);
        assert_eq!(map_secure(4), SEC_PRIVATE);
        assert_eq!(map_secure(10), SEC_PRIVATE);
    }

    #[test]
    fn languages() {
        assert_eq!(std_lang("ENG"), "en");
        assert_eq!(std_lang("heb"), "he");
        assert_eq!(std_lang("CZE"), "cs");
        assert_eq!(std_lang("ru"), "ru");
        assert_eq!(std_lang("QQQ"), LANG_UNKNOWN);
        assert_eq!(std_lang("qq"), LANG_UNKNOWN);
        assert_eq!(std_lang(""), LANG_UNKNOWN);
    }

    #[test]
    fn lecturers() {
        assert_eq!(lecturer_pattern(1), Some("rav"));
        assert_eq!(lecturer_pattern(8), Some("rb"));
        assert_eq!(lecturer_pattern(2), None);
    }

    #[test]
    fn media_types_are_case_insensitive() {
        let m = media_type_by_extension("MP3").unwrap();
        assert_eq!(m.kind, "audio");
        assert_eq!(m.mime_type, "audio/mpeg");
        assert_eq!(media_type_by_extension("zip").unwrap().mime_type, "application/zip");
        assert!(media_type_by_extension("exe").is_none());
    }
}
