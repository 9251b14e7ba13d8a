use std::str::FromStr;

/// Marker for prices quoted in units of 10,000 yen.
const TEN_THOUSAND_MARKER: char = '万';

/// Normalization rule applied to a raw extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingRule {
    Currency,
    Number,
    Age,
    #[default]
    None,
}

impl ProcessingRule {
    pub fn apply(&self, value: &str) -> String {
        match self {
            ProcessingRule::Currency => process_currency(value),
            ProcessingRule::Number => process_number(value),
            ProcessingRule::Age => process_age(value),
            ProcessingRule::None => value.trim().to_string(),
        }
    }
}

impl FromStr for ProcessingRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "currency" => Ok(ProcessingRule::Currency),
            "number" => Ok(ProcessingRule::Number),
            "age" => Ok(ProcessingRule::Age),
            "none" => Ok(ProcessingRule::None),
            other => Err(format!("unknown processing rule '{other}'")),
        }
    }
}

/// Collapse whitespace runs to single spaces and trim the ends.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip everything but ASCII digits and the decimal point.
pub fn process_number(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect()
}

/// Normalize a currency expression to a plain decimal string.
///
/// Prices quoted with the ten-thousand marker are scaled: `5.5万円` →
/// `55000`. Plain yen amounts just lose their separators: `80,000円` →
/// `80000`.
pub fn process_currency(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if text.contains(TEN_THOUSAND_MARKER) {
        return match first_decimal_number(text) {
            Some(number) => shift_decimal_point(&number, 4),
            None => String::new(),
        };
    }
    process_number(text)
}

/// Normalize a building-age expression: newly built is age zero.
pub fn process_age(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if text.contains("新築") {
        return "0".to_string();
    }
    process_number(text)
}

/// First run of `digits[.digits]` in the text, if any.
fn first_decimal_number(text: &str) -> Option<String> {
    let mut number = String::new();
    let mut seen_dot = false;
    for c in text.chars() {
        if c.is_ascii_digit() {
            number.push(c);
        } else if c == '.' && !number.is_empty() && !seen_dot {
            number.push(c);
            seen_dot = true;
        } else if !number.is_empty() {
            break;
        }
    }
    // A trailing dot belongs to the surrounding text, not the number.
    let number = number.trim_end_matches('.').to_string();
    if number.is_empty() {
        None
    } else {
        Some(number)
    }
}

/// Multiply a decimal string by 10^places without going through floats,
/// so `5.5` shifted by 4 is exactly `55000`.
fn shift_decimal_point(number: &str, places: usize) -> String {
    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    let mut digits: String = int_part.to_string();
    let mut frac: Vec<char> = frac_part.chars().collect();
    for _ in 0..places {
        if frac.is_empty() {
            digits.push('0');
        } else {
            digits.push(frac.remove(0));
        }
    }
    let mut result = digits.trim_start_matches('0').to_string();
    if result.is_empty() {
        result.push('0');
    }
    if !frac.is_empty() {
        result.push('.');
        result.extend(frac);
    }
    result
}
