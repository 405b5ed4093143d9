use std::path::PathBuf;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SchedulerError};

/// Anchor flag bits as persisted in the camera store.
pub const ANCHOR_FIXED_TIME: u8 = 1 << 0;
/// Sunrise for the first anchor, sunset for the last.
pub const ANCHOR_SOLAR: u8 = 1 << 1;
/// Sunrise + 30 min / sunset - 30 min.
pub const ANCHOR_SOLAR_30M: u8 = 1 << 2;
/// Sunrise + 60 min / sunset - 60 min.
pub const ANCHOR_SOLAR_60M: u8 = 1 << 3;

/// Geographic position of a webcam, signed degrees. Not range-checked here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// When the first capture of the day happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FirstAnchor {
    /// Wall-clock time in the webcam's timezone.
    FixedTime { at: NaiveTime },
    Sunrise,
    #[serde(rename = "sunrise_plus_30m")]
    SunrisePlus30m,
    #[serde(rename = "sunrise_plus_60m")]
    SunrisePlus60m,
}

/// When the last capture of the day happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LastAnchor {
    /// Wall-clock time in the webcam's timezone.
    FixedTime { at: NaiveTime },
    Sunset,
    #[serde(rename = "sunset_minus_30m")]
    SunsetMinus30m,
    #[serde(rename = "sunset_minus_60m")]
    SunsetMinus60m,
}

impl FirstAnchor {
    /// Decode the persisted bitmask. Exactly one bit must be set, and the
    /// fixed-time bit needs `fixed_time`.
    pub fn from_flags(flags: u8, fixed_time: Option<NaiveTime>) -> Result<Self> {
        match decode_single_flag("first", flags)? {
            ANCHOR_FIXED_TIME => fixed_time
                .map(|at| FirstAnchor::FixedTime { at })
                .ok_or_else(|| SchedulerError::InvalidAnchorSelection {
                    anchor: "first",
                    reason: "fixed time selected without a time".to_string(),
                }),
            ANCHOR_SOLAR => Ok(FirstAnchor::Sunrise),
            ANCHOR_SOLAR_30M => Ok(FirstAnchor::SunrisePlus30m),
            _ => Ok(FirstAnchor::SunrisePlus60m),
        }
    }

    pub fn flags(&self) -> u8 {
        match self {
            FirstAnchor::FixedTime { .. } => ANCHOR_FIXED_TIME,
            FirstAnchor::Sunrise => ANCHOR_SOLAR,
            FirstAnchor::SunrisePlus30m => ANCHOR_SOLAR_30M,
            FirstAnchor::SunrisePlus60m => ANCHOR_SOLAR_60M,
        }
    }

    pub fn fixed_time(&self) -> Option<NaiveTime> {
        match self {
            FirstAnchor::FixedTime { at } => Some(*at),
            _ => None,
        }
    }
}

impl LastAnchor {
    /// Decode the persisted bitmask; same rules as [`FirstAnchor::from_flags`].
    pub fn from_flags(flags: u8, fixed_time: Option<NaiveTime>) -> Result<Self> {
        match decode_single_flag("last", flags)? {
            ANCHOR_FIXED_TIME => fixed_time
                .map(|at| LastAnchor::FixedTime { at })
                .ok_or_else(|| SchedulerError::InvalidAnchorSelection {
                    anchor: "last",
                    reason: "fixed time selected without a time".to_string(),
                }),
            ANCHOR_SOLAR => Ok(LastAnchor::Sunset),
            ANCHOR_SOLAR_30M => Ok(LastAnchor::SunsetMinus30m),
            _ => Ok(LastAnchor::SunsetMinus60m),
        }
    }

    pub fn flags(&self) -> u8 {
        match self {
            LastAnchor::FixedTime { .. } => ANCHOR_FIXED_TIME,
            LastAnchor::Sunset => ANCHOR_SOLAR,
            LastAnchor::SunsetMinus30m => ANCHOR_SOLAR_30M,
            LastAnchor::SunsetMinus60m => ANCHOR_SOLAR_60M,
        }
    }

    pub fn fixed_time(&self) -> Option<NaiveTime> {
        match self {
            LastAnchor::FixedTime { at } => Some(*at),
            _ => None,
        }
    }
}

fn decode_single_flag(anchor: &'static str, flags: u8) -> Result<u8> {
    const KNOWN: u8 = ANCHOR_FIXED_TIME | ANCHOR_SOLAR | ANCHOR_SOLAR_30M | ANCHOR_SOLAR_60M;
    if flags & !KNOWN != 0 {
        return Err(SchedulerError::InvalidAnchorSelection {
            anchor,
            reason: format!("unknown flag bits in {flags:#06b}"),
        });
    }
    match flags.count_ones() {
        1 => Ok(flags),
        0 => Err(SchedulerError::InvalidAnchorSelection {
            anchor,
            reason: "no option selected".to_string(),
        }),
        n => Err(SchedulerError::InvalidAnchorSelection {
            anchor,
            reason: format!("{n} options selected, expected exactly one"),
        }),
    }
}

/// A validated webcam definition, as handed to a driver loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDefinition {
    /// Display identifier, unique among running cameras.
    pub name: String,
    /// Image URL fetched on every capture.
    pub url: String,
    pub location: Location,
    pub first: FirstAnchor,
    pub last: LastAnchor,
    /// Captures strictly between the first and last anchor.
    pub additional: u32,
    /// Folder receiving the saved images.
    pub folder_path: PathBuf,
}

impl CameraDefinition {
    /// Number of entries in every daily schedule.
    pub fn captures_per_day(&self) -> usize {
        self.additional as usize + 2
    }

    /// Destination for an image taken at `at` (webcam local time):
    /// `<folder>/<root>_<YYYYMMDD>_<HHMMSS>.<ext>`.
    pub fn capture_path(&self, at: &DateTime<Tz>) -> PathBuf {
        let file = format!(
            "{}_{}.{}",
            file_root(&self.name),
            at.format("%Y%m%d_%H%M%S"),
            url_extension(&self.url)
        );
        self.folder_path.join(file)
    }
}

fn file_root(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Extension of the URL's last path segment, lower-cased; `jpg` when
/// absent, odd, or the URL does not parse.
fn url_extension(url: &str) -> String {
    let last = Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|s| s.last().map(str::to_string)))
        .unwrap_or_default();
    match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => "jpg".to_string(),
    }
}

/// Sun events for one calendar day, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolarTimes {
    pub sunrise: DateTime<Utc>,
    pub solar_noon: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::Los_Angeles;

    fn camera(url: &str) -> CameraDefinition {
        CameraDefinition {
            name: "Kohm Yah-man-yeh".to_string(),
            url: url.to_string(),
            location: Location {
                latitude: 40.437787,
                longitude: -121.5360307,
            },
            first: FirstAnchor::Sunrise,
            last: LastAnchor::Sunset,
            additional: 1,
            folder_path: PathBuf::from("/srv/timelapse/lavo"),
        }
    }

    #[test]
    fn first_anchor_decodes_each_single_flag() {
        assert_eq!(
            FirstAnchor::from_flags(ANCHOR_SOLAR, None).unwrap(),
            FirstAnchor::Sunrise
        );
        assert_eq!(
            FirstAnchor::from_flags(ANCHOR_SOLAR_30M, None).unwrap(),
            FirstAnchor::SunrisePlus30m
        );
        assert_eq!(
            FirstAnchor::from_flags(ANCHOR_SOLAR_60M, None).unwrap(),
            FirstAnchor::SunrisePlus60m
        );
        let at = NaiveTime::from_hms_opt(6, 0, 1).unwrap();
        assert_eq!(
            FirstAnchor::from_flags(ANCHOR_FIXED_TIME, Some(at)).unwrap(),
            FirstAnchor::FixedTime { at }
        );
    }

    #[test]
    fn anchor_flags_reject_zero_or_many() {
        let none = FirstAnchor::from_flags(0, None).unwrap_err();
        assert!(matches!(
            none,
            SchedulerError::InvalidAnchorSelection { anchor: "first", .. }
        ));
        let many = LastAnchor::from_flags(ANCHOR_SOLAR | ANCHOR_SOLAR_60M, None).unwrap_err();
        assert!(matches!(
            many,
            SchedulerError::InvalidAnchorSelection { anchor: "last", .. }
        ));
        assert!(LastAnchor::from_flags(0x10, None).is_err());
    }

    #[test]
    fn fixed_time_flag_needs_a_time() {
        assert!(LastAnchor::from_flags(ANCHOR_FIXED_TIME, None).is_err());
    }

    #[test]
    fn flags_round_trip_through_decoding() {
        for anchor in [
            LastAnchor::Sunset,
            LastAnchor::SunsetMinus30m,
            LastAnchor::SunsetMinus60m,
        ] {
            assert_eq!(LastAnchor::from_flags(anchor.flags(), None).unwrap(), anchor);
        }
    }

    #[test]
    fn capture_path_uses_local_timestamp_and_url_extension() {
        let cam = camera("https://www.nps.gov/webcams-lavo/kyvc_webcam1.JPG?1589316288166");
        let at = Los_Angeles.with_ymd_and_hms(2020, 5, 27, 13, 3, 28).unwrap();
        assert_eq!(
            cam.capture_path(&at),
            PathBuf::from("/srv/timelapse/lavo/Kohm_Yah-man-yeh_20200527_130328.jpg")
        );
    }

    #[test]
    fn capture_path_defaults_to_jpg() {
        let at = Los_Angeles.with_ymd_and_hms(2020, 5, 27, 5, 39, 41).unwrap();
        let cam = camera("https://www.konaweb.com/cam/guardian/latest");
        assert!(cam.capture_path(&at).to_string_lossy().ends_with("_053941.jpg"));
        let host_only = camera("http://cam.example.com");
        assert!(host_only.capture_path(&at).to_string_lossy().ends_with(".jpg"));
        let png = camera("http://cam.example.com/snap.png");
        assert!(png.capture_path(&at).to_string_lossy().ends_with(".png"));
        let dotted_query = camera("http://cam.example.com/live?file=x.gif#f.bmp");
        assert!(dotted_query.capture_path(&at).to_string_lossy().ends_with("_053941.jpg"));
        let unparsable = camera("not a url.png");
        assert!(unparsable.capture_path(&at).to_string_lossy().ends_with(".jpg"));
    }

    #[test]
    fn anchors_serialize_with_kind_tag() {
        let first = serde_json::to_value(FirstAnchor::SunrisePlus30m).unwrap();
        assert_eq!(first, serde_json::json!({ "kind": "sunrise_plus_30m" }));
        let last: LastAnchor =
            serde_json::from_str(r#"{"kind":"fixed_time","at":"18:30:00"}"#).unwrap();
        assert_eq!(
            last,
            LastAnchor::FixedTime {
                at: NaiveTime::from_hms_opt(18, 30, 0).unwrap()
            }
        );
    }
}
