//! The closed set of formula functions and their synchronous helpers.

use std::str::FromStr;

use serde_json::Value;
use time::{
    Date, OffsetDateTime, Time, format_description::well_known::Rfc3339, macros::format_description,
};

use super::FormulaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Rand,
    Now,
    DateAdd,
    SplitIndex,
    Replace,
    Config,
    Value,
    User,
    Profile,
    Role,
    Cookie,
    Form,
    Path,
    Domain,
    Title,
    Obj,
    Attr,
    AttrSplit,
    Query,
    SendMail,
    Resize,
}

impl Builtin {
    /// Case-insensitive lookup. Unknown names return `None`.
    pub fn lookup(name: &str) -> Option<Self> {
        let builtin = match name.to_ascii_uppercase().as_str() {
            "RAND" => Builtin::Rand,
            "NOW" => Builtin::Now,
            "DATEADD" => Builtin::DateAdd,
            "SPLITINDEX" => Builtin::SplitIndex,
            "REPLACE" => Builtin::Replace,
            "CONFIG" => Builtin::Config,
            "VALUE" => Builtin::Value,
            "USER" => Builtin::User,
            "PROFILE" => Builtin::Profile,
            "ROLE" => Builtin::Role,
            "COOKIE" => Builtin::Cookie,
            "FORM" => Builtin::Form,
            "PATH" => Builtin::Path,
            "DOMAIN" => Builtin::Domain,
            "TITLE" => Builtin::Title,
            "OBJ" => Builtin::Obj,
            "ATTR" => Builtin::Attr,
            "ATTRSPLIT" => Builtin::AttrSplit,
            "QUERY" => Builtin::Query,
            "SENDMAIL" => Builtin::SendMail,
            "RESIZE" => Builtin::Resize,
            _ => return None,
        };
        Some(builtin)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Rand => "rand",
            Builtin::Now => "now",
            Builtin::DateAdd => "dateadd",
            Builtin::SplitIndex => "splitindex",
            Builtin::Replace => "replace",
            Builtin::Config => "config",
            Builtin::Value => "value",
            Builtin::User => "user",
            Builtin::Profile => "profile",
            Builtin::Role => "role",
            Builtin::Cookie => "cookie",
            Builtin::Form => "form",
            Builtin::Path => "path",
            Builtin::Domain => "domain",
            Builtin::Title => "title",
            Builtin::Obj => "obj",
            Builtin::Attr => "attr",
            Builtin::AttrSplit => "attrsplit",
            Builtin::Query => "query",
            Builtin::SendMail => "sendmail",
            Builtin::Resize => "resize",
        }
    }

    /// Inclusive bounds on the argument count.
    pub fn arity(self) -> (usize, usize) {
        match self {
            Builtin::Rand | Builtin::Path | Builtin::Domain | Builtin::Title => (0, 0),
            Builtin::Now => (0, 1),
            Builtin::DateAdd => (2, 4),
            Builtin::SplitIndex => (3, 4),
            Builtin::Replace => (3, 4),
            Builtin::Config
            | Builtin::Value
            | Builtin::User
            | Builtin::Profile
            | Builtin::Cookie
            | Builtin::Form => (1, 2),
            Builtin::Role | Builtin::Obj => (1, 2),
            Builtin::Attr => (1, 4),
            Builtin::AttrSplit => (3, 4),
            Builtin::Query => (1, 3),
            Builtin::SendMail => (3, 3),
            Builtin::Resize => (2, 3),
        }
    }

    /// Builtins whose result comes from configuration and may hold calls.
    pub fn expands_result(self) -> bool {
        matches!(self, Self::Config | Self::Value)
    }

    pub fn check_arity(self, args: &[String]) -> Result<(), FormulaError> {
        let (min, max) = self.arity();
        if (min..=max).contains(&args.len()) {
            Ok(())
        } else {
            Err(FormulaError::Arity {
                name: self.name(),
                min,
                max,
                found: args.len(),
            })
        }
    }
}

/// Optional argument, `None` when absent.
pub fn arg(args: &[String], idx: usize) -> Option<&str> {
    args.get(idx).map(String::as_str)
}

/// Optional argument, falling back when absent or blank.
pub fn arg_or<'a>(args: &'a [String], idx: usize, fallback: &'a str) -> &'a str {
    match arg(args, idx) {
        Some(value) if !value.is_empty() => value,
        _ => fallback,
    }
}

pub fn parse_number<T: FromStr>(
    builtin: Builtin,
    label: &str,
    raw: &str,
) -> Result<T, FormulaError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| FormulaError::invalid(builtin, format!("{label} `{raw}` is not a number")))
}

/// Five characters of a fresh random identifier.
pub fn rand() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[1..6].to_string()
}

pub fn format_instant(instant: OffsetDateTime, format: Option<&str>) -> Result<String, FormulaError> {
    match format.filter(|format| !format.trim().is_empty()) {
        None => instant
            .format(&Rfc3339)
            .map_err(|err| FormulaError::invalid(Builtin::Now, err.to_string())),
        Some(description) => {
            let items = time::format_description::parse(description).map_err(|err| {
                FormulaError::invalid(Builtin::Now, format!("bad format `{description}`: {err}"))
            })?;
            instant
                .format(&items)
                .map_err(|err| FormulaError::invalid(Builtin::Now, err.to_string()))
        }
    }
}

/// `date, amount, [unit], [format]`.
pub fn date_add(now: OffsetDateTime, args: &[String]) -> Result<String, FormulaError> {
    let raw_date = arg_or(args, 0, "now").trim();
    let amount: i64 = parse_number(Builtin::DateAdd, "amount", arg_or(args, 1, "0"))?;
    let unit = arg_or(args, 2, "days").trim().to_ascii_lowercase();

    let (start, date_only) = if raw_date.eq_ignore_ascii_case("now") {
        (now, false)
    } else if let Ok(instant) = OffsetDateTime::parse(raw_date, &Rfc3339) {
        (instant, false)
    } else {
        let date = Date::parse(raw_date, format_description!("[year]-[month]-[day]")).map_err(
            |_| FormulaError::invalid(Builtin::DateAdd, format!("unrecognised date `{raw_date}`")),
        )?;
        (date.with_time(Time::MIDNIGHT).assume_utc(), true)
    };

    let delta = match unit.as_str() {
        "day" | "days" | "d" => time::Duration::days(amount),
        "week" | "weeks" | "w" => time::Duration::weeks(amount),
        "hour" | "hours" | "h" => time::Duration::hours(amount),
        "minute" | "minutes" | "m" => time::Duration::minutes(amount),
        "second" | "seconds" | "s" => time::Duration::seconds(amount),
        other => {
            return Err(FormulaError::invalid(
                Builtin::DateAdd,
                format!("unknown unit `{other}`"),
            ));
        }
    };
    let shifted = start
        .checked_add(delta)
        .ok_or_else(|| FormulaError::invalid(Builtin::DateAdd, "date out of range"))?;

    match arg(args, 3).filter(|format| !format.trim().is_empty()) {
        Some(format) => format_instant(shifted, Some(format)),
        None if date_only => shifted
            .date()
            .format(format_description!("[year]-[month]-[day]"))
            .map_err(|err| FormulaError::invalid(Builtin::DateAdd, err.to_string())),
        None => format_instant(shifted, None),
    }
}

/// Nth piece of `text` split on `sep`. Out-of-range indexes yield the
/// default when one is supplied.
pub fn split_index(
    builtin: Builtin,
    text: &str,
    sep: &str,
    raw_index: &str,
    default: Option<&str>,
) -> Result<String, FormulaError> {
    if sep.is_empty() {
        return Err(FormulaError::invalid(builtin, "separator must not be empty"));
    }
    let index: i64 = parse_number(builtin, "index", raw_index)?;
    let pieces: Vec<&str> = text.split(sep).collect();

    let piece = usize::try_from(index)
        .ok()
        .and_then(|index| pieces.get(index).copied());
    match (piece, default) {
        (Some(piece), _) => Ok(piece.to_string()),
        (None, Some(default)) => Ok(default.to_string()),
        (None, None) => Err(FormulaError::IndexOutOfRange {
            index,
            len: pieces.len(),
        }),
    }
}

/// Replace the first `count` occurrences; all of them when `count` is absent
/// or negative.
pub fn replace(args: &[String]) -> Result<String, FormulaError> {
    let text = arg_or(args, 0, "");
    let from = arg_or(args, 1, "");
    let to = arg(args, 2).unwrap_or_default();
    if from.is_empty() {
        return Ok(text.to_string());
    }

    let count: i64 = match arg(args, 3).filter(|raw| !raw.trim().is_empty()) {
        Some(raw) => parse_number(Builtin::Replace, "count", raw)?,
        None => -1,
    };
    Ok(match usize::try_from(count) {
        Ok(count) => text.replacen(from, to, count),
        Err(_) => text.replace(from, to),
    })
}

/// Textual form of a JSON value: strings verbatim, null as empty.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Dotted lookup (`a.b.0.c`) through objects and arrays.
pub fn lookup_path<'a>(root: &'a serde_json::Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.trim().split('.');
    let mut current = root.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(Builtin::lookup("SplitIndex"), Some(Builtin::SplitIndex));
        assert_eq!(Builtin::lookup("attrsplit"), Some(Builtin::AttrSplit));
        assert_eq!(Builtin::lookup("nope"), None);
    }

    #[test]
    fn arity_is_enforced() {
        assert!(Builtin::Rand.check_arity(&[]).is_ok());
        assert!(matches!(
            Builtin::Rand.check_arity(&args(&["x"])),
            Err(FormulaError::Arity { found: 1, .. })
        ));
        assert!(Builtin::SendMail.check_arity(&args(&["a", "b"])).is_err());
    }

    #[test]
    fn rand_yields_five_distinct_chars() {
        let first = rand();
        let second = rand();
        assert_eq!(first.len(), 5);
        assert!(first.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn split_index_picks_piece_or_default() {
        let pick = |text, index, default| split_index(Builtin::SplitIndex, text, ",", index, default);
        assert_eq!(pick("a,b,c", "1", Some("dflt")).unwrap(), "b");
        assert_eq!(pick("a,b", "5", Some("dflt")).unwrap(), "dflt");
        assert_eq!(pick("a,b", "-1", Some("dflt")).unwrap(), "dflt");
        assert!(matches!(
            pick("a,b", "5", None),
            Err(FormulaError::IndexOutOfRange { index: 5, len: 2 })
        ));
        assert!(pick("a,b", "one", None).is_err());
    }

    #[test]
    fn replace_honours_count() {
        assert_eq!(replace(&args(&["a-b-c", "-", "+"])).unwrap(), "a+b+c");
        assert_eq!(replace(&args(&["a-b-c", "-", "+", "1"])).unwrap(), "a+b-c");
        assert_eq!(replace(&args(&["a-b-c", "-", "+", "-1"])).unwrap(), "a+b+c");
        assert_eq!(replace(&args(&["a-b-c", "", "+"])).unwrap(), "a-b-c");
    }

    #[test]
    fn date_add_handles_units_and_date_only_inputs() {
        let now = datetime!(2024-02-28 10:00 UTC);
        assert_eq!(
            date_add(now, &args(&["2024-02-28", "2"])).unwrap(),
            "2024-03-01"
        );
        assert_eq!(
            date_add(now, &args(&["now", "3", "hours"])).unwrap(),
            "2024-02-28T13:00:00Z"
        );
        assert_eq!(
            date_add(now, &args(&["now", "1", "weeks", "[day].[month].[year]"])).unwrap(),
            "06.03.2024"
        );
        assert!(date_add(now, &args(&["yesterday", "1"])).is_err());
        assert!(date_add(now, &args(&["now", "1", "fortnights"])).is_err());
    }

    #[test]
    fn now_formats_with_description() {
        let instant = datetime!(2024-05-06 07:08:09 UTC);
        assert_eq!(
            format_instant(instant, Some("[year]/[month]/[day]")).unwrap(),
            "2024/05/06"
        );
        assert_eq!(format_instant(instant, None).unwrap(), "2024-05-06T07:08:09Z");
    }

    #[test]
    fn dotted_lookup_walks_objects_and_arrays() {
        let root = json!({"site": {"tags": ["a", {"name": "b"}]}, "n": 3});
        let map = root.as_object().unwrap();
        assert_eq!(lookup_path(map, "site.tags.1.name"), Some(&json!("b")));
        assert_eq!(lookup_path(map, "n").map(value_text), Some("3".to_string()));
        assert_eq!(lookup_path(map, "site.missing"), None);
    }
}
