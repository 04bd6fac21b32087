//! @ai:module:intent Minimal RFC 4180 line codec for metric tables
//! @ai:module:layer infrastructure
//! @ai:module:public_api parse_line, format_line
//! @ai:module:stateless true

/// @ai:intent Split one CSV line into fields, honoring double-quoted fields
/// @ai:pre line contains no record separator (quoted newlines are unsupported)
/// @ai:effects pure
pub fn parse_line(line: &str) -> Result<Vec<String>, String> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;
    let mut quoted = false;

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if field.is_empty() && !quoted => {
                in_quotes = true;
                quoted = true;
            }
            ('"', false) => return Err("unexpected quote in unquoted field".to_string()),
            (',', false) => {
                fields.push(std::mem::take(&mut field));
                quoted = false;
            }
            (c, _) if quoted && !in_quotes => {
                return Err(format!("unexpected '{c}' after closing quote"));
            }
            (c, _) => field.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }

    fields.push(field);
    Ok(fields)
}

/// @ai:intent Join fields into one CSV line, quoting where needed
/// @ai:post fails on fields containing a line break; rows are newline-delimited
/// @ai:effects pure
pub fn format_line<I, S>(fields: I) -> Result<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let escaped = fields
        .into_iter()
        .map(|f| escape(f.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(escaped.join(","))
}

fn escape(field: &str) -> Result<String, String> {
    if field.contains(['\n', '\r']) {
        return Err(format!("field {field:?} contains a line break"));
    }

    if field.contains([',', '"']) || field.starts_with(' ') || field.ends_with(' ') {
        Ok(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Ok(field.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_quoted() {
        assert_eq!(parse_line("a,b,,c").unwrap(), vec!["a", "b", "", "c"]);
        assert_eq!(
            parse_line("\"x, y\",\"say \"\"hi\"\"\",z\r").unwrap(),
            vec!["x, y", "say \"hi\"", "z"]
        );
    }

    #[test]
    fn test_parse_rejects_broken_quotes() {
        assert!(parse_line("\"open,b").is_err());
        assert!(parse_line("\"a\"b,c").is_err());
        assert!(parse_line("a\"b,c").is_err());
    }

    #[test]
    fn test_format_quotes_when_needed() {
        let line = format_line(["src/a.py", "x, y", "say \"hi\""]).unwrap();
        assert_eq!(line, "src/a.py,\"x, y\",\"say \"\"hi\"\"\"");
        assert_eq!(parse_line(&line).unwrap(), vec!["src/a.py", "x, y", "say \"hi\""]);
    }

    #[test]
    fn test_format_refuses_line_breaks() {
        assert!(format_line(["ok", "two\nlines"]).is_err());
        assert!(format_line(["carriage\rreturn"]).is_err());
    }
}
