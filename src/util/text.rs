//! Small text helpers shared by the router and the built-in handlers.
//!
//! Recognized speech arrives lower-cased and mostly unpunctuated, so matching
//! is plain substring containment, the same rule the router applies to stop
//! phrases and trigger keywords.

/// True if `haystack` contains any of `needles` as a substring.
pub fn contains_any<S: AsRef<str>>(haystack: &str, needles: &[S]) -> bool {
    needles.iter().any(|n| {
        let n = n.as_ref();
        !n.is_empty() && haystack.contains(n)
    })
}

fn unit_value(word: &str) -> Option<u64> {
    let v = match word {
        "zero" => 0,
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "seventy" => 70,
        "eighty" => 80,
        "ninety" => 90,
        _ => return None,
    };
    Some(v)
}

fn scale_value(word: &str) -> Option<u64> {
    let v = match word {
        "hundred" => 100,
        "thousand" => 1_000,
        "million" => 1_000_000,
        "billion" => 1_000_000_000,
        "trillion" => 1_000_000_000_000,
        _ => return None,
    };
    Some(v)
}

/// Extract a number from free text, accepting number words or digits.
///
/// Unknown words are skipped. The first word that parses as a plain integer
/// wins outright ("set a timer for 90 seconds" yields 90). Returns 0 when the
/// text holds no number at all.
pub fn text_to_int(text: &str) -> u64 {
    let mut current: u64 = 0;
    let mut result: u64 = 0;
    for raw in text.split_whitespace() {
        let word = raw.trim_matches(|c: char| matches!(c, ',' | '?' | '!' | ';'));
        if word == "and" {
            continue;
        }
        if let Some(v) = unit_value(word) {
            current = current.saturating_add(v);
        } else if let Some(scale) = scale_value(word) {
            current = current.max(1).saturating_mul(scale);
            if scale > 100 {
                result = result.saturating_add(current);
                current = 0;
            }
        } else if let Ok(v) = word.parse::<u64>() {
            return v;
        }
    }
    result.saturating_add(current)
}

/// A duration parsed from a spoken command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpokenDuration {
    /// The spoken amount ("five" minutes → 5).
    pub amount: u64,
    /// The duration in seconds.
    pub seconds: u64,
    /// Unit label suitable for reading back ("minute", "hours", ...).
    pub units: &'static str,
}

/// Parse a single-denomination duration ("five minutes", "2 hours", "90").
///
/// Bare numbers are read as seconds. Mixed denominations ("one minute twenty
/// seconds") are not supported; the first number wins.
pub fn parse_duration(command: &str) -> Option<SpokenDuration> {
    let amount = text_to_int(command);
    if amount == 0 {
        return None;
    }
    let plural = amount > 1;
    let (seconds, units) = if command.contains("minute") {
        (amount.saturating_mul(60), if plural { "minutes" } else { "minute" })
    } else if command.contains("hour") {
        (amount.saturating_mul(3600), if plural { "hours" } else { "hour" })
    } else {
        (amount, if plural { "seconds" } else { "second" })
    };
    Some(SpokenDuration {
        amount,
        seconds,
        units,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_to_int_words() {
        assert_eq!(text_to_int("set a timer for five minutes"), 5);
        assert_eq!(text_to_int("twenty five"), 25);
        assert_eq!(text_to_int("one hundred and twenty"), 120);
        assert_eq!(text_to_int("two thousand three hundred"), 2300);
    }

    #[test]
    fn test_text_to_int_digits_win() {
        assert_eq!(text_to_int("timer for 90 seconds"), 90);
        assert_eq!(text_to_int("no numbers here"), 0);
    }

    #[test]
    fn test_parse_duration_units() {
        let d = parse_duration("timer for ten minutes").unwrap();
        assert_eq!(d.seconds, 600);
        assert_eq!(d.units, "minutes");

        let d = parse_duration("timer for one hour").unwrap();
        assert_eq!(d.seconds, 3600);
        assert_eq!(d.units, "hour");

        let d = parse_duration("timer for 45").unwrap();
        assert_eq!(d.seconds, 45);
        assert_eq!(d.units, "seconds");

        assert!(parse_duration("set a timer").is_none());
    }

    #[test]
    fn test_contains_any_ignores_empty_needles() {
        assert!(contains_any("good night everyone", &["good night"]));
        assert!(!contains_any("anything", &[""]));
        assert!(!contains_any("hello", &Vec::<String>::new()));
    }
}
