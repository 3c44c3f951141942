//! GDB/MI result records
//!
//! Watch expressions are driven through `interpreter mi`, so their replies
//! arrive inside a capture as MI result records. This module finds and parses
//! them.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

static RESULT_RECORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)?\^(done|running|connected|error|exit)(?:,(.*))?$").expect("valid regex")
});

/// A GDB/MI result record
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub token: Option<u32>,
    pub class: ResultClass,
    pub results: HashMap<String, Value>,
}

impl ResultRecord {
    /// String field of the record
    pub fn field(&self, key: &str) -> Option<&str> {
        self.results.get(key).and_then(|v| v.as_string())
    }

    /// `msg` of an `^error` record
    pub fn error_message(&self) -> Option<&str> {
        if self.class == ResultClass::Error {
            self.field("msg")
        } else {
            None
        }
    }
}

/// GDB/MI result classes
#[derive(Debug, Clone, PartialEq)]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Error,
    Exit,
}

/// Values in GDB/MI output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    List(Vec<Value>),
    Tuple(HashMap<String, Value>),
}

impl Value {
    /// Get the value as a string, if possible
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as a list, if possible
    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Get the value as a tuple, if possible
    pub fn as_tuple(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Tuple(tuple) => Some(tuple),
            _ => None,
        }
    }
}

/// Find the first result record in captured output
///
/// Captures may carry console noise around the record (echoed prompts, stray
/// newlines), so every line is tried in order.
pub fn find_result_record(capture: &str) -> Option<ResultRecord> {
    capture
        .lines()
        .map(str::trim)
        .find_map(|line| parse_result_record(line).ok())
}

/// Parse a result record line such as `^done,name="var1"`
pub fn parse_result_record(line: &str) -> Result<ResultRecord, String> {
    let caps = RESULT_RECORD
        .captures(line)
        .ok_or_else(|| format!("Invalid result record format: {}", line))?;

    let token = caps.get(1).and_then(|m| m.as_str().parse().ok());

    let class = match caps.get(2).map(|m| m.as_str()) {
        Some("done") => ResultClass::Done,
        Some("running") => ResultClass::Running,
        Some("connected") => ResultClass::Connected,
        Some("error") => ResultClass::Error,
        Some("exit") => ResultClass::Exit,
        other => return Err(format!("Unknown result class: {:?}", other)),
    };

    let results = if let Some(results_str) = caps.get(3) {
        parse_results(results_str.as_str())?
    } else {
        HashMap::new()
    };

    Ok(ResultRecord {
        token,
        class,
        results,
    })
}

/// Parse result key-value pairs
fn parse_results(input: &str) -> Result<HashMap<String, Value>, String> {
    let mut results = HashMap::new();
    let mut chars = input.chars().peekable();

    while chars.peek().is_some() {
        while chars.peek() == Some(&' ') {
            chars.next();
        }

        if chars.peek().is_none() {
            break;
        }

        let key = parse_identifier(&mut chars)?;

        if chars.next() != Some('=') {
            return Err("Expected '=' after key".into());
        }

        let value = parse_value(&mut chars)?;
        results.insert(key, value);

        if chars.peek() == Some(&',') {
            chars.next();
        }
    }

    Ok(results)
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

/// Parse an identifier (key name)
fn parse_identifier(chars: &mut Chars) -> Result<String, String> {
    let mut identifier = String::new();

    while let Some(&ch) = chars.peek() {
        if ch.is_alphanumeric() || ch == '_' || ch == '-' {
            identifier.push(ch);
            chars.next();
        } else {
            break;
        }
    }

    if identifier.is_empty() {
        return Err("Empty identifier".into());
    }

    Ok(identifier)
}

/// Parse a value (string, list, or tuple)
fn parse_value(chars: &mut Chars) -> Result<Value, String> {
    match chars.peek() {
        Some('"') => {
            chars.next();
            Ok(Value::String(parse_quoted(chars)))
        }
        Some('[') => {
            chars.next();
            let mut list = Vec::new();

            while chars.peek() != Some(&']') && chars.peek().is_some() {
                // Lists hold either bare values or `name=value` results;
                // for results only the value is kept.
                let value = match chars.peek() {
                    Some('"') | Some('[') | Some('{') => parse_value(chars)?,
                    _ => {
                        parse_identifier(chars)?;
                        if chars.next() != Some('=') {
                            return Err("Expected '=' in list result".into());
                        }
                        parse_value(chars)?
                    }
                };
                list.push(value);

                if chars.peek() == Some(&',') {
                    chars.next();
                }
            }

            if chars.next() != Some(']') {
                return Err("Expected closing bracket".into());
            }

            Ok(Value::List(list))
        }
        Some('{') => {
            chars.next();
            let mut tuple = HashMap::new();

            while chars.peek() != Some(&'}') && chars.peek().is_some() {
                let key = parse_identifier(chars)?;

                if chars.next() != Some('=') {
                    return Err("Expected '=' in tuple".into());
                }

                let value = parse_value(chars)?;
                tuple.insert(key, value);

                if chars.peek() == Some(&',') {
                    chars.next();
                }
            }

            if chars.next() != Some('}') {
                return Err("Expected closing brace".into());
            }

            Ok(Value::Tuple(tuple))
        }
        _ => Err("Expected string, list or tuple".into()),
    }
}

/// Body of a C string after its opening quote, unescaped
fn parse_quoted(chars: &mut Chars) -> String {
    let mut string_val = String::new();
    let mut escaped = false;

    for ch in chars.by_ref() {
        if escaped {
            match ch {
                'n' => string_val.push('\n'),
                't' => string_val.push('\t'),
                'r' => string_val.push('\r'),
                '\\' => string_val.push('\\'),
                '"' => string_val.push('"'),
                other => {
                    string_val.push('\\');
                    string_val.push(other);
                }
            }
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '"' {
            break;
        } else {
            string_val.push(ch);
        }
    }

    string_val
}

/// Quote text so it survives as one argument inside `interpreter mi "..."`
pub fn escape_c_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_results() {
        let results = parse_results("msg=\"test message\"").unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results.get("msg").unwrap().as_string(), Some("test message"));
    }

    #[test]
    fn test_parse_var_create_record() {
        let record =
            parse_result_record("^done,name=\"var1\",numchild=\"0\",value=\"5\",type=\"int\",has_more=\"0\"")
                .unwrap();

        assert_eq!(record.class, ResultClass::Done);
        assert_eq!(record.field("name"), Some("var1"));
        assert_eq!(record.field("numchild"), Some("0"));
        assert_eq!(record.field("type"), Some("int"));
    }

    #[test]
    fn test_parse_children_list_of_results() {
        let record = parse_result_record(
            "^done,numchild=\"2\",children=[child={name=\"var1.a\",exp=\"a\",numchild=\"0\",type=\"int\"},child={name=\"var1.b\",exp=\"b\",numchild=\"1\",type=\"struct s\"}]",
        )
        .unwrap();

        let children = record.results.get("children").unwrap().as_list().unwrap();
        assert_eq!(children.len(), 2);
        let second = children[1].as_tuple().unwrap();
        assert_eq!(second.get("name").unwrap().as_string(), Some("var1.b"));
        assert_eq!(second.get("type").unwrap().as_string(), Some("struct s"));
    }

    #[test]
    fn test_parse_list_of_strings() {
        let results = parse_results("thread-groups=[\"i1\"]").unwrap();
        let groups = results.get("thread-groups").unwrap().as_list().unwrap();
        assert_eq!(groups[0].as_string(), Some("i1"));
    }

    #[test]
    fn test_error_record_message() {
        let record = parse_result_record("^error,msg=\"-var-create: unable to create variable object\"").unwrap();
        assert_eq!(record.error_message(), Some("-var-create: unable to create variable object"));
    }

    #[test]
    fn test_find_record_among_noise() {
        let capture = "\n(gdb) \n^done,value=\"\\\"hi\\\"\"\n";
        let record = find_result_record(capture).unwrap();
        assert_eq!(record.field("value"), Some("\"hi\""));
    }

    #[test]
    fn test_escape_c_string() {
        assert_eq!(escape_c_string(r#"s == "a\n""#), r#"s == \"a\\n\""#);
    }
}
