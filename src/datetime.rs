use crate::{WbemError, WbemResult};
use chrono::prelude::*;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The minimal length of a CIM datetime string:
/// `yyyymmddHHMMSS.mmmmmm` plus the signed UTC offset in minutes.
const DATETIME_PART_LEN: usize = 21;

/// A datetime value decoded from WMI's CIM datetime text format
/// (`20190113200517.500000-180`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CimDateTime(pub DateTime<FixedOffset>);

impl FromStr for CimDateTime {
    type Err = WbemError;

    fn from_str(s: &str) -> WbemResult<Self> {
        if s.len() < DATETIME_PART_LEN {
            return Err(WbemError::ConvertDatetimeError(s.into()));
        }

        let (datetime_part, tz_part) = s.split_at(DATETIME_PART_LEN);

        let tz_min: i32 = tz_part
            .parse()
            .map_err(|_| WbemError::ConvertDatetimeError(s.into()))?;
        let tz = FixedOffset::east_opt(tz_min * 60)
            .ok_or_else(|| WbemError::ConvertDatetimeError(s.into()))?;

        let naive = NaiveDateTime::parse_from_str(datetime_part, "%Y%m%d%H%M%S.%f")
            .map_err(|_| WbemError::ConvertDatetimeError(s.into()))?;

        naive
            .and_local_timezone(tz)
            .single()
            .map(Self)
            .ok_or_else(|| WbemError::ConvertDatetimeError(s.into()))
    }
}

/// Converts an OLE automation `DATE` (fractional days since 1899-12-30) to a
/// [`CimDateTime`] at UTC.
pub(crate) fn automation_date_to_datetime(days: f64) -> Option<CimDateTime> {
    let millis = (days * 86_400_000.0) as i64;
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let naive = base.checked_add_signed(chrono::Duration::milliseconds(millis))?;

    naive
        .and_local_timezone(FixedOffset::east_opt(0)?)
        .single()
        .map(CimDateTime)
}

impl fmt::Display for CimDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
