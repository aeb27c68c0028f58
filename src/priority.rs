use crate::error::ProcscopeError;
use crate::platform::Platform;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Platform independent scheduling priority tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityClass {
    Idle,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
    RealTime,
}

impl PriorityClass {
    pub const ALL: [PriorityClass; 6] = [
        PriorityClass::Idle,
        PriorityClass::BelowNormal,
        PriorityClass::Normal,
        PriorityClass::AboveNormal,
        PriorityClass::High,
        PriorityClass::RealTime,
    ];

    /// Raw value understood by the platform's priority tool
    ///
    /// Unix values are nice levels for `renice`, Windows values are the
    /// `Win32_Process.SetPriority` class codes.
    pub fn raw(self, platform: Platform) -> i64 {
        match platform {
            Platform::Unix => match self {
                PriorityClass::Idle => 19,
                PriorityClass::BelowNormal => 10,
                PriorityClass::Normal => 0,
                PriorityClass::AboveNormal => -5,
                PriorityClass::High => -10,
                PriorityClass::RealTime => -20,
            },
            Platform::Windows => match self {
                PriorityClass::Idle => 64,
                PriorityClass::BelowNormal => 16384,
                PriorityClass::Normal => 32,
                PriorityClass::AboveNormal => 32768,
                PriorityClass::High => 128,
                PriorityClass::RealTime => 256,
            },
        }
    }

    /// Map a raw platform value back to a class
    ///
    /// Unrecognised values fall back to [`PriorityClass::Normal`].
    pub fn from_raw(platform: Platform, raw: i64) -> Self {
        match platform {
            Platform::Unix => match raw {
                19 => PriorityClass::Idle,
                10 => PriorityClass::BelowNormal,
                0 => PriorityClass::Normal,
                -5 => PriorityClass::AboveNormal,
                -10 => PriorityClass::High,
                -20 => PriorityClass::RealTime,
                _ => PriorityClass::Normal,
            },
            Platform::Windows => match raw {
                // Class codes, as accepted by SetPriority.
                64 => PriorityClass::Idle,
                16384 => PriorityClass::BelowNormal,
                32 => PriorityClass::Normal,
                32768 => PriorityClass::AboveNormal,
                128 => PriorityClass::High,
                256 => PriorityClass::RealTime,
                258 => PriorityClass::RealTime,
                // Base priorities, as reported by Win32_Process.Priority.
                4 => PriorityClass::Idle,
                6 => PriorityClass::BelowNormal,
                8 => PriorityClass::Normal,
                10 => PriorityClass::AboveNormal,
                13 => PriorityClass::High,
                24 => PriorityClass::RealTime,
                _ => PriorityClass::Normal,
            },
        }
    }

    /// Like [`PriorityClass::from_raw`] for a value still in text form
    ///
    /// `ps` prints `-` for processes without a nice value; that and any other
    /// non-numeric text is treated as normal priority.
    pub fn from_raw_str(platform: Platform, raw: &str) -> Self {
        raw.trim()
            .parse::<i64>()
            .map(|value| Self::from_raw(platform, value))
            .unwrap_or(PriorityClass::Normal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityClass::Idle => "idle",
            PriorityClass::BelowNormal => "below-normal",
            PriorityClass::Normal => "normal",
            PriorityClass::AboveNormal => "above-normal",
            PriorityClass::High => "high",
            PriorityClass::RealTime => "real-time",
        }
    }
}

impl Default for PriorityClass {
    fn default() -> Self {
        PriorityClass::Normal
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityClass {
    type Err = ProcscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        PriorityClass::ALL
            .into_iter()
            .find(|class| {
                class.as_str() == normalized || class.as_str().replace('-', "") == normalized
            })
            .ok_or_else(|| {
                ProcscopeError::InvalidArguments(format!("Unknown priority class: {}", s))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Platform::Unix)]
    #[case(Platform::Windows)]
    fn test_raw_round_trip(#[case] platform: Platform) {
        for class in PriorityClass::ALL {
            let raw = class.raw(platform);
            let text = raw.to_string();
            assert_eq!(PriorityClass::from_raw(platform, raw), class);
            assert_eq!(PriorityClass::from_raw_str(platform, &text), class);
        }
    }

    #[rstest]
    #[case(Platform::Unix, 7)]
    #[case(Platform::Unix, 5)]
    #[case(Platform::Windows, 7)]
    #[case(Platform::Windows, 99999)]
    fn test_unknown_raw_falls_back_to_normal(#[case] platform: Platform, #[case] raw: i64) {
        let class = PriorityClass::from_raw(platform, raw);
        assert_eq!(class, PriorityClass::Normal);
    }

    #[rstest]
    #[case(Platform::Unix, "-")]
    #[case(Platform::Unix, "")]
    #[case(Platform::Windows, "n/a")]
    fn test_non_numeric_raw_is_normal(#[case] platform: Platform, #[case] raw: &str) {
        let class = PriorityClass::from_raw_str(platform, raw);
        assert_eq!(class, PriorityClass::Normal);
    }

    #[rstest]
    #[case(4, PriorityClass::Idle)]
    #[case(8, PriorityClass::Normal)]
    #[case(13, PriorityClass::High)]
    #[case(24, PriorityClass::RealTime)]
    fn test_windows_base_priorities(#[case] raw: i64, #[case] class: PriorityClass) {
        assert_eq!(PriorityClass::from_raw(Platform::Windows, raw), class);
    }

    #[test]
    fn test_windows_legacy_real_time_code() {
        let class = PriorityClass::from_raw(Platform::Windows, 258);
        assert_eq!(class, PriorityClass::RealTime);
        assert_eq!(class.raw(Platform::Windows), 256);
        assert_eq!(
            PriorityClass::from_raw_str(Platform::Windows, "258"),
            PriorityClass::RealTime
        );
    }

    #[test]
    fn test_parse_names() {
        let high: PriorityClass = "high".parse().unwrap();
        assert_eq!(high, PriorityClass::High);
        assert_eq!(
            "BELOW_NORMAL".parse::<PriorityClass>().unwrap(),
            PriorityClass::BelowNormal
        );
        let real_time: PriorityClass = "realtime".parse().unwrap();
        assert_eq!(real_time, PriorityClass::RealTime);
        assert!("urgent".parse::<PriorityClass>().is_err());
    }
}
