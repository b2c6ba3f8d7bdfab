//! SSML envelope construction.
//!
//! Every chunk is wrapped in the same fixed template; only the voice name and the
//! prosody rate and volume vary. The chunk itself must already be XML-escaped.
//!
//! Reference: <https://learn.microsoft.com/en-us/azure/ai-services/speech-service/speech-synthesis-markup-voice#adjust-prosody>

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Voice used when none is configured.
pub const DEFAULT_VOICE: &str = "Microsoft Server Speech Text to Speech Voice (cy-GB, NiaNeural)";

static PERCENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-])(0|[1-9][0-9]{0,2})%$").expect("percent pattern is a valid regex")
});

fn parse_percent(s: &str) -> Result<i32, String> {
    let caps = PERCENT_PATTERN
        .captures(s.trim())
        .ok_or_else(|| format!("Invalid percentage '{s}': expected a form like +10% or -5%"))?;
    let magnitude: i32 = caps[2]
        .parse()
        .map_err(|e| format!("Invalid percentage '{s}': {e}"))?;
    Ok(if &caps[1] == "-" { -magnitude } else { magnitude })
}

fn format_percent(value: i32, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if value < 0 {
        write!(f, "-{}%", value.unsigned_abs())
    } else {
        write!(f, "+{value}%")
    }
}

macro_rules! percent_type {
    ($(#[$meta:meta])* $name:ident, $min:expr, $max:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(i32);

        impl $name {
            pub const MIN: i32 = $min;
            pub const MAX: i32 = $max;

            pub fn new(percent: i32) -> Result<Self, String> {
                if !(Self::MIN..=Self::MAX).contains(&percent) {
                    return Err(format!(
                        "{} {percent}% is out of range ({}% to +{}%)",
                        stringify!($name),
                        Self::MIN,
                        Self::MAX
                    ));
                }
                Ok(Self(percent))
            }

            pub fn percent(self) -> i32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                format_percent(self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(parse_percent(s)?)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

percent_type!(
    /// Speaking rate relative to the voice default, from -50% to +100%.
    Rate,
    -50,
    100
);

percent_type!(
    /// Volume relative to the voice default, from -999% to +999%.
    Volume,
    -999,
    999
);

/// Voice and prosody parameters for the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsmlOptions {
    pub voice: String,
    #[serde(default)]
    pub rate: Rate,
    #[serde(default)]
    pub volume: Volume,
}

impl Default for SsmlOptions {
    fn default() -> Self {
        Self {
            voice: DEFAULT_VOICE.to_string(),
            rate: Rate::default(),
            volume: Volume::default(),
        }
    }
}

/// Wraps an escaped chunk in the SSML envelope.
pub fn make_ssml(chunk: &str, options: &SsmlOptions) -> String {
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='en-US'>\
         <voice name='{}'><prosody pitch='+0Hz' rate='{}' volume='{}'>{}</prosody></voice></speak>",
        options.voice, options.rate, options.volume, chunk
    )
}
