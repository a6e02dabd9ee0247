use chrono::{DateTime, Local, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Generates the string mapping shared by every stored enum.
macro_rules! stored_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {}: {}", stringify!($name), other)),
                }
            }
        }
    };
}

stored_enum!(Role {
    Admin => "ADMIN",
    Teacher => "TEACHER",
    Student => "STUDENT",
    Counselor => "COUNSELOR",
});

stored_enum!(AttendanceType {
    CheckIn => "CHECK_IN",
    CheckOut => "CHECK_OUT",
});

stored_enum!(AttendanceMethod {
    Face => "FACE",
    QrCode => "QR_CODE",
    Photo => "PHOTO",
    Manual => "MANUAL",
});

stored_enum!(ApprovalStatus {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

stored_enum!(VisitStatus {
    Planned => "PLANNED",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    Rescheduled => "RESCHEDULED",
});

impl ApprovalStatus {
    /// Teachers' own submissions need no review.
    pub fn initial_for(role: Role) -> Self {
        match role {
            Role::Teacher => ApprovalStatus::Approved,
            _ => ApprovalStatus::Pending,
        }
    }
}

/// Stored timestamps sort lexicographically in this format.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp (date part in UTC).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Some(d);
    }
    DateTime::parse_from_rfc3339(t)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).date_naive())
}

/// `[start, end)` of a local calendar day as stored timestamps.
pub fn local_day_bounds(day: NaiveDate) -> (String, String) {
    let start = local_midnight_utc(day);
    let end = day
        .succ_opt()
        .map(local_midnight_utc)
        .unwrap_or_else(|| start + chrono::Duration::days(1));
    (format_timestamp(start), format_timestamp(end))
}

fn local_midnight_utc(day: NaiveDate) -> DateTime<Utc> {
    let naive = day.and_hms_opt(0, 0, 0).unwrap_or_default();
    match Local.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        // Midnight skipped by a DST jump; fall back to the UTC reading.
        None => Utc.from_utc_datetime(&naive),
    }
}

pub fn today_local() -> NaiveDate {
    Local::now().date_naive()
}
