//! Binary wire formats the driver has no `FromSql`/`ToSql` impl for.
//!
//! `numeric` is carried as exact decimal text, `timetz` and `interval` are rendered as text,
//! and anything else unrecognised is kept as raw bytes.

use std::error::Error;

use chrono::NaiveTime;
use tokio_postgres::types::{FromSql, Type};
use tokio_util::bytes::{BufMut, BytesMut};

type BoxError = Box<dyn Error + Sync + Send>;

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Decimal digits per base-10000 `numeric` digit.
const DEC_DIGITS: usize = 4;
const NBASE: u16 = 10_000;

const MICROS_PER_SECOND: u64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * 1_000_000;

/// A `numeric` value as exact decimal text (`NaN`, `Infinity` and `-Infinity` included).
pub(crate) struct PgNumeric(pub(crate) String);

/// A `timetz` value rendered as `HH:MM:SS[.ffffff]±HH:MM`.
pub(crate) struct PgTimeTz(pub(crate) String);

/// An `interval` rendered the way the server's default `postgres` style prints it.
pub(crate) struct PgInterval(pub(crate) String);

/// Undecoded column bytes, for types without a dedicated conversion.
pub(crate) struct RawValue(pub(crate) Vec<u8>);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        decode_numeric(raw).map(Self)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

impl<'a> FromSql<'a> for PgTimeTz {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        decode_timetz(raw).map(Self)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::TIMETZ
    }
}

impl<'a> FromSql<'a> for PgInterval {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        decode_interval(raw).map(Self)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(Self(raw.to_vec()))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn read_bytes<const N: usize>(raw: &[u8], at: usize) -> Result<[u8; N], BoxError> {
    raw.get(at..at + N)
        .and_then(|bytes| <[u8; N]>::try_from(bytes).ok())
        .ok_or_else(|| BoxError::from(format!("value truncated at byte {at}")))
}

fn read_u16(raw: &[u8], at: usize) -> Result<u16, BoxError> {
    read_bytes(raw, at).map(u16::from_be_bytes)
}

fn read_i16(raw: &[u8], at: usize) -> Result<i16, BoxError> {
    read_bytes(raw, at).map(i16::from_be_bytes)
}

fn read_i32(raw: &[u8], at: usize) -> Result<i32, BoxError> {
    read_bytes(raw, at).map(i32::from_be_bytes)
}

fn read_i64(raw: &[u8], at: usize) -> Result<i64, BoxError> {
    read_bytes(raw, at).map(i64::from_be_bytes)
}

/// `numeric` binary layout: ndigits, weight, sign, dscale, then `ndigits` base-10000
/// digits. `weight` is the power of 10000 of the first digit; `dscale` is the number of
/// decimal places to print.
pub(crate) fn decode_numeric(raw: &[u8]) -> Result<String, BoxError> {
    let ndigits = usize::try_from(read_i16(raw, 0)?)?;
    let weight = i32::from(read_i16(raw, 2)?);
    let sign = read_u16(raw, 4)?;
    let dscale = usize::from(read_u16(raw, 6)?);

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign {other:#06x}").into()),
    }

    let mut digits = Vec::with_capacity(ndigits);
    for i in 0..ndigits {
        let digit = read_u16(raw, 8 + 2 * i)?;
        if digit >= NBASE {
            return Err(format!("invalid numeric digit {digit}").into());
        }
        digits.push(digit);
    }
    let digit_at = |pos: i32| -> u16 {
        usize::try_from(pos)
            .ok()
            .and_then(|pos| digits.get(pos))
            .copied()
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit_at(0).to_string());
        for pos in 1..=weight {
            out.push_str(&format!("{:04}", digit_at(pos)));
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + DEC_DIGITS);
        let mut pos = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit_at(pos)));
            pos += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

/// Encode decimal text (`-12.50`, `NaN`, `Infinity`) as a binary `numeric`.
pub(crate) fn encode_numeric(text: &str, out: &mut BytesMut) -> Result<(), BoxError> {
    let text = text.trim();
    let special = match text {
        "NaN" | "nan" => Some(NUMERIC_NAN),
        "Infinity" | "+Infinity" | "inf" | "+inf" => Some(NUMERIC_PINF),
        "-Infinity" | "-inf" => Some(NUMERIC_NINF),
        _ => None,
    };
    if let Some(sign) = special {
        out.put_i16(0);
        out.put_i16(0);
        out.put_u16(sign);
        out.put_u16(0);
        return Ok(());
    }

    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = int_part
        .bytes()
        .chain(frac_part.bytes())
        .all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits {
        return Err(format!("invalid numeric value {text:?}").into());
    }

    let int_digits = int_part.trim_start_matches('0');
    let lead_pad = (DEC_DIGITS - int_digits.len() % DEC_DIGITS) % DEC_DIGITS;
    let trail_pad = (DEC_DIGITS - frac_part.len() % DEC_DIGITS) % DEC_DIGITS;
    let padded: Vec<u8> = std::iter::repeat_n(b'0', lead_pad)
        .chain(int_digits.bytes())
        .chain(frac_part.bytes())
        .chain(std::iter::repeat_n(b'0', trail_pad))
        .collect();
    let mut groups: Vec<u16> = padded
        .chunks(DEC_DIGITS)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0'))
        })
        .collect();

    let mut weight = i32::try_from((lead_pad + int_digits.len()) / DEC_DIGITS)? - 1;
    let leading_zeros = groups.iter().take_while(|&&g| g == 0).count();
    groups.drain(..leading_zeros);
    weight -= i32::try_from(leading_zeros)?;
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
    }

    out.put_i16(i16::try_from(groups.len())?);
    out.put_i16(i16::try_from(weight)?);
    out.put_u16(if negative && !groups.is_empty() {
        NUMERIC_NEG
    } else {
        NUMERIC_POS
    });
    out.put_u16(u16::try_from(frac_part.len())?);
    for group in groups {
        out.put_u16(group);
    }
    Ok(())
}

fn time_of_day(micros: i64) -> Result<String, BoxError> {
    // `time` allows 24:00:00, which chrono cannot represent.
    if micros == MICROS_PER_DAY {
        return Ok("24:00:00".to_string());
    }
    let micros = u64::try_from(micros)?;
    let secs = u32::try_from(micros / MICROS_PER_SECOND)?;
    let nanos = u32::try_from(micros % MICROS_PER_SECOND)? * 1_000;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .map(|t| t.format("%H:%M:%S%.f").to_string())
        .ok_or_else(|| BoxError::from(format!("time of day out of range: {micros}us")))
}

/// `timetz` binary layout: microseconds since midnight, then the zone offset in seconds
/// *west* of UTC.
pub(crate) fn decode_timetz(raw: &[u8]) -> Result<String, BoxError> {
    let micros = read_i64(raw, 0)?;
    let west = read_i32(raw, 8)?;

    let east = -i64::from(west);
    let sign = if east < 0 { '-' } else { '+' };
    let offset = east.unsigned_abs();
    let mut out = format!(
        "{}{sign}{:02}:{:02}",
        time_of_day(micros)?,
        offset / 3600,
        offset % 3600 / 60
    );
    if offset % 60 != 0 {
        out.push_str(&format!(":{:02}", offset % 60));
    }
    Ok(out)
}

fn plural(value: i64, unit: &str) -> String {
    if value == 1 {
        format!("{value} {unit}")
    } else {
        format!("{value} {unit}s")
    }
}

/// `interval` binary layout: microseconds, days, months.
pub(crate) fn decode_interval(raw: &[u8]) -> Result<String, BoxError> {
    let micros = read_i64(raw, 0)?;
    let days = i64::from(read_i32(raw, 8)?);
    let months = i64::from(read_i32(raw, 12)?);

    let mut parts = Vec::new();
    if months / 12 != 0 {
        parts.push(plural(months / 12, "year"));
    }
    if months % 12 != 0 {
        parts.push(plural(months % 12, "mon"));
    }
    if days != 0 {
        parts.push(plural(days, "day"));
    }
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let total = micros.unsigned_abs();
        let secs = total / MICROS_PER_SECOND;
        let mut clock = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            secs % 3600 / 60,
            secs % 60
        );
        let fraction = total % MICROS_PER_SECOND;
        if fraction != 0 {
            let digits = format!("{fraction:06}");
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }
    Ok(parts.join(" "))
}
