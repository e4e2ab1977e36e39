use anyhow::{Context, anyhow};
use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

/// Parses a due expression: `now`, RFC 3339, `YYYY-MM-DD [HH:MM[:SS]]` in
/// local time, or a relative offset like `+30m`, `+2h`, `+1d`.
pub fn parse_due_expr(raw: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(anyhow!("empty due expression"));
    }
    if token.eq_ignore_ascii_case("now") {
        return Ok(now);
    }

    let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[mhd])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

    if let Some(caps) = rel_re.captures(token) {
        let sign = caps.name("sign").map(|m| m.as_str()).unwrap_or("+");
        let num: i64 = caps
            .name("num")
            .map(|m| m.as_str())
            .unwrap_or("0")
            .parse()
            .with_context(|| format!("invalid offset amount in '{token}'"))?;
        let unit = caps.name("unit").map(|m| m.as_str()).unwrap_or("d");

        let delta = match unit {
            "m" => chrono::Duration::try_minutes(num),
            "h" => chrono::Duration::try_hours(num),
            _ => chrono::Duration::try_days(num),
        }
        .ok_or_else(|| anyhow!("offset out of range in '{token}'"))?;

        return Ok(if sign == "-" { now - delta } else { now + delta });
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(token) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(token, format) {
            return local_to_utc(naive);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        let naive = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("invalid date '{token}'"))?;
        return local_to_utc(naive);
    }

    Err(anyhow!("unrecognized due expression: '{token}'"))
}

/// Start of the named local day.
pub fn parse_day_start(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let date = parse_plain_date(raw)?;
    let naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid date '{raw}'"))?;
    local_to_utc(naive)
}

/// Last representable moment of the named local day.
pub fn parse_day_end(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let date = parse_plain_date(raw)?;
    let naive = date
        .and_hms_milli_opt(23, 59, 59, 999)
        .ok_or_else(|| anyhow!("invalid date '{raw}'"))?;
    local_to_utc(naive)
}

pub fn fmt_local_date(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

pub fn fmt_local_datetime(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn parse_plain_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM-DD, got '{raw}'"))
}

fn local_to_utc(naive: NaiveDateTime) -> anyhow::Result<DateTime<Utc>> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, _) => Ok(first.with_timezone(&Utc)),
        LocalResult::None => Err(anyhow!("local time {naive} does not exist")),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{fmt_local_date, parse_day_end, parse_day_start, parse_due_expr};

    fn fixed_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn parses_relative_offsets() {
        let now = fixed_now();
        assert_eq!(
            parse_due_expr("+30m", now).expect("parse +30m"),
            now + chrono::Duration::minutes(30)
        );
        assert_eq!(
            parse_due_expr("+2h", now).expect("parse +2h"),
            now + chrono::Duration::hours(2)
        );
        assert_eq!(
            parse_due_expr("+1d", now).expect("parse +1d"),
            now + chrono::Duration::days(1)
        );
        assert_eq!(
            parse_due_expr("-1d", now).expect("parse -1d"),
            now - chrono::Duration::days(1)
        );
    }

    #[test]
    fn now_keyword_is_the_reference_instant() {
        let now = fixed_now();
        assert_eq!(parse_due_expr("now", now).expect("parse now"), now);
        assert_eq!(parse_due_expr(" NOW ", now).expect("parse NOW"), now);
    }

    #[test]
    fn parses_rfc3339() {
        let parsed = parse_due_expr("2026-09-01T08:00:00Z", fixed_now()).expect("parse rfc3339");
        assert_eq!(
            parsed,
            Utc.with_ymd_and_hms(2026, 9, 1, 8, 0, 0)
                .single()
                .expect("valid date")
        );
    }

    #[test]
    fn plain_date_lands_on_that_local_day() {
        let parsed = parse_due_expr("2026-09-01", fixed_now()).expect("parse date");
        assert_eq!(fmt_local_date(parsed), "2026-09-01");
    }

    #[test]
    fn local_datetime_round_trips_through_display() {
        let parsed = parse_due_expr("2026-09-01 18:45", fixed_now()).expect("parse datetime");
        assert_eq!(super::fmt_local_datetime(parsed), "2026-09-01 18:45");
    }

    #[test]
    fn day_bounds_bracket_the_day() {
        let start = parse_day_start("2026-09-01").expect("day start");
        let end = parse_day_end("2026-09-01").expect("day end");
        assert!(start < end);
        assert_eq!(fmt_local_date(start), "2026-09-01");
        assert_eq!(fmt_local_date(end), "2026-09-01");
    }

    #[test]
    fn rejects_garbage() {
        let now = fixed_now();
        assert!(parse_due_expr("", now).is_err());
        assert!(parse_due_expr("soon", now).is_err());
        assert!(parse_due_expr("09/01", now).is_err());
        assert!(parse_due_expr("+5w", now).is_err());
        assert!(parse_day_start("september").is_err());
    }
}
