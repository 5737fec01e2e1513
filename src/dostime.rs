use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// DOS date/time pair as stored in ZIP headers.
///   time bits 0-4:  seconds/2 (0-29)
///   time bits 5-10: minutes (0-59)
///   time bits 11-15: hours (0-23)
///   date bits 0-4:  day (1-31)
///   date bits 5-8:  month (1-12)
///   date bits 9-15: year offset from 1980
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable instant.
    pub const MIN: DosDateTime = DosDateTime {
        time: 0,
        date: (1 << 5) | 1,
    };

    pub fn new(time: u16, date: u16) -> Self {
        Self { time, date }
    }

    /// Convert a UTC timestamp, clamping to the DOS range (1980..=2107).
    pub fn from_system_time(t: SystemTime) -> Self {
        let secs = match t.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(_) => return Self::MIN,
        };
        let (year, month, day) = civil_from_days(secs.div_euclid(86400));
        if year < 1980 {
            return Self::MIN;
        }
        if year > 2107 {
            return Self {
                time: (23 << 11) | (59 << 5) | 29,
                date: (127 << 9) | (12 << 5) | 31,
            };
        }
        let sod = secs.rem_euclid(86400) as u32;
        let (hour, min, sec) = (sod / 3600, (sod / 60) % 60, sod % 60);
        Self {
            time: ((hour << 11) | (min << 5) | (sec >> 1)) as u16,
            date: (((year as u32 - 1980) << 9) | (month << 5) | day) as u16,
        }
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    pub fn to_system_time(self) -> Option<SystemTime> {
        let (year, month, day, hour, min, sec) = self.fields();

        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return None;
        }

        let days = days_from_epoch(year, month, day);
        let secs = days as u64 * 86400 + hour as u64 * 3600 + min as u64 * 60 + sec as u64;

        Some(UNIX_EPOCH + Duration::from_secs(secs))
    }

    fn fields(self) -> (u32, u32, u32, u32, u32, u32) {
        let t = self.time as u32;
        let d = self.date as u32;
        (
            ((d >> 9) & 0x7f) + 1980,
            (d >> 5) & 0x0f,
            d & 0x1f,
            (t >> 11) & 0x1f,
            (t >> 5) & 0x3f,
            (t & 0x1f) << 1,
        )
    }
}

/// Format as YYYY-MM-DD HH:MM:SS.
impl fmt::Display for DosDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (year, month, day, hour, min, sec) = self.fields();
        write!(
            f,
            "{year:04}-{month:02}-{day:02} {hour:02}:{min:02}:{sec:02}"
        )
    }
}

fn days_from_epoch(year: u32, month: u32, day: u32) -> i64 {
    // Howard Hinnant's algorithm for days since 1970-01-01.
    let y = if month <= 2 {
        year as i64 - 1
    } else {
        year as i64
    };
    let era = y.div_euclid(400);
    let yoe = y.rem_euclid(400) as u64;
    let m = month as i64;
    let doy = if m > 2 {
        (153 * (m - 3) + 2) / 5 + day as i64 - 1
    } else {
        (153 * (m + 9) + 2) / 5 + day as i64 - 1
    };
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy as u64;
    era * 146097 + doe as i64 - 719468
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    // Inverse of days_from_epoch.
    let z = days + 719468;
    let era = z.div_euclid(146097);
    let doe = z.rem_euclid(146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe as i64 + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}
