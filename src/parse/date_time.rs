// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! ECMA-119 defines two on-disc timestamp shapes: a 7-byte binary form used
//! by directory records and Rock Ridge `TF` entries, and a 17-byte ASCII
//! decimal form used by volume descriptors. Both carry a GMT offset in
//! 15-minute intervals rather than a zone name.

use nom::{
    bytes::complete::take,
    combinator::map_res,
    number::complete::{i8 as nom_i8, u8 as nom_u8},
    sequence::tuple,
};
use time::{Date, Month, OffsetDateTime, Time, UtcOffset};

use crate::error::NomRes;

/// Parses the 7-byte binary timestamp recorded in every directory record,
/// and reused verbatim by Rock Ridge `TF` fields.
///
/// Layout: year-since-1900 (u8), month (1-12), day (1-31), hour, minute,
/// second, then a signed GMT offset in 15-minute intervals.
pub fn dir_datetime(input: &[u8]) -> NomRes<&[u8], OffsetDateTime> {
    map_res(
        tuple((nom_u8, nom_u8, nom_u8, nom_u8, nom_u8, nom_u8, nom_i8)),
        |(year, month, day, hour, minute, second, gmt_offset)| {
            build_offset_datetime(1900 + year as i32, month, day, hour, minute, second, 0, gmt_offset)
        },
    )(input)
}

/// Parses the 17-byte ASCII decimal timestamp used by volume descriptors
/// (creation/modification/expiration/effective date-times).
///
/// Layout: 4-digit year, 2-digit month, day, hour, minute, second, 2-digit
/// hundredths of a second, all ASCII digits (or all `'0'`/zero bytes for
/// "not specified"), followed by the same signed 15-minute GMT offset byte.
pub fn vd_datetime(input: &[u8]) -> NomRes<&[u8], Option<OffsetDateTime>> {
    let (input, digits) = take(16usize)(input)?;
    let (input, gmt_offset) = nom_i8(input)?;

    if digits.iter().all(|&b| b == 0 || b == b'0') {
        return Ok((input, None));
    }

    let text = match std::str::from_utf8(digits) {
        Ok(t) => t,
        Err(_) => return Ok((input, None)),
    };

    let field = |range: std::ops::Range<usize>| text.get(range).and_then(|s| s.parse::<u32>().ok());

    let (year, month, day, hour, minute, second, hundredths) = match (
        field(0..4),
        field(4..6),
        field(6..8),
        field(8..10),
        field(10..12),
        field(12..14),
        field(14..16),
    ) {
        (Some(y), Some(mo), Some(d), Some(h), Some(mi), Some(s), Some(cc)) => (y, mo, d, h, mi, s, cc),
        _ => return Ok((input, None)),
    };

    match build_offset_datetime(year as i32, month as u8, day as u8, hour as u8, minute as u8, second as u8, hundredths, gmt_offset) {
        Ok(dt) => Ok((input, Some(dt))),
        Err(_) => Ok((input, None)),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_offset_datetime(
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    hundredths: u32,
    gmt_offset_quarter_hours: i8,
) -> Result<OffsetDateTime, time::error::ComponentRange> {
    let month = Month::try_from(month.clamp(1, 12))?;
    let date = Date::from_calendar_date(year, month, day.clamp(1, 31))?;
    let time = Time::from_hms_milli(
        hour.min(23),
        minute.min(59),
        second.min(59),
        (hundredths.min(99) * 10) as u16,
    )?;
    let offset_minutes = gmt_offset_quarter_hours as i32 * 15;
    let offset = UtcOffset::from_whole_seconds(offset_minutes * 60).unwrap_or(UtcOffset::UTC);
    Ok(OffsetDateTime::new_in_offset(date, time, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dir_datetime() {
        let buf = [124u8, 3, 15, 10, 30, 0, 0];
        let (_, dt) = dir_datetime(&buf).unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), Month::March);
        assert_eq!(dt.day(), 15);
    }

    #[test]
    fn vd_datetime_all_zero_is_none() {
        let buf = [0u8; 17];
        let (_, dt) = vd_datetime(&buf).unwrap();
        assert!(dt.is_none());
    }

    #[test]
    fn vd_datetime_parses_digits() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"2024031510300000");
        buf.push(0);
        let (_, dt) = vd_datetime(&buf).unwrap();
        let dt = dt.unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), Month::March);
    }
}
