#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Text layout for the 16x2 character display.

/// Columns of the character LCD.
pub const LCD_COLUMNS: usize = 16;

fn width(s: &str) -> usize {
    s.chars().count()
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Lay `elements` out on one line of exactly `columns` characters.
///
/// The free space is spread over the gaps between elements, earlier gaps
/// getting the remainder, so the first element is left-aligned and the last
/// one right-aligned. Elements that only just fit may touch. When they do not
/// fit at all they are joined with single spaces and cut at `columns`.
pub fn pad_elements_to_fit(columns: usize, elements: &[impl AsRef<str>]) -> String {
    let parts: Vec<&str> = elements.iter().map(AsRef::as_ref).collect();
    match parts.as_slice() {
        [] => " ".repeat(columns),
        [only] => {
            let mut line = truncate(only, columns);
            line.push_str(&" ".repeat(columns - width(&line)));
            line
        }
        _ => {
            let used: usize = parts.iter().map(|p| width(p)).sum();
            let gaps = parts.len() - 1;
            if used > columns {
                return truncate(&parts.join(" "), columns);
            }
            let free = columns - used;
            let (each, extra) = (free / gaps, free % gaps);
            let mut line = String::with_capacity(columns);
            for (i, part) in parts.iter().enumerate() {
                line.push_str(part);
                if i < gaps {
                    let n = each + usize::from(i < extra);
                    line.push_str(&" ".repeat(n));
                }
            }
            line
        }
    }
}

/// The display's status row: valve state, temperature, auto mode.
pub fn status_line(elements: &[impl AsRef<str>]) -> String {
    pad_elements_to_fit(LCD_COLUMNS, elements)
}

/// Split free text over the two rows, breaking at the last space that keeps
/// the first row within `columns`. Both rows are padded to `columns`.
pub fn wrap_two_lines(text: &str, columns: usize) -> (String, String) {
    let pad = |s: &str| {
        let s = truncate(s, columns);
        let fill = columns - width(&s);
        s + &" ".repeat(fill)
    };
    if width(text) <= columns {
        return (pad(text), pad(""));
    }
    let head: String = truncate(text, columns + 1);
    match head.rfind(char::is_whitespace) {
        Some(at) if at > 0 => (pad(&text[..at]), pad(text[at..].trim_start())),
        _ => {
            let split = text.char_indices().nth(columns).map_or(text.len(), |(i, _)| i);
            (pad(&text[..split]), pad(&text[split..]))
        }
    }
}
