//! Locating the launch query inside a login response body.
//!
//! The body is an HTML page with inline script. The query string sits in an
//! attribute (`flashVars="..."` by default), sometimes inside a JS string
//! literal with escaped quotes, sometimes as `<param name="flashVars" value="...">`.
//! The scan prefers the region after the scope marker, then the whole body,
//! then a backslash-unescaped copy of the body.

use regex::Regex;
use thiserror::Error;

use super::credential::LaunchCredential;
use crate::config::CaptureConfig;
use crate::error::{Result, ShellError};

/// Why a matching response did not yield a credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
	#[error("response has no {attribute} attribute")]
	MissingAttribute { attribute: String },

	#[error("{attribute} attribute is empty")]
	EmptyValue { attribute: String },

	#[error("launch query is missing required fields: {}", missing.join(", "))]
	MissingFields { missing: Vec<String> },
}

pub struct ResponseParser {
	attribute: String,
	inline: Regex,
	param: Regex,
	scope_marker: String,
	required_fields: Vec<String>,
	max_bytes: usize,
}

impl ResponseParser {
	pub fn new(config: &CaptureConfig) -> Result<Self> {
		let attr = regex::escape(&config.attribute);
		let inline = Regex::new(&format!(r#"(?i)\b{attr}\s*=\s*(\\?["'])"#)).map_err(|err| ShellError::Config(err.to_string()))?;
		let param = Regex::new(&format!(r#"(?i)\bname\s*=\s*\\?["']{attr}\\?["']\s+value\s*=\s*(\\?["'])"#))
			.map_err(|err| ShellError::Config(err.to_string()))?;
		Ok(Self {
			attribute: config.attribute.clone(),
			inline,
			param,
			scope_marker: config.scope_marker.clone(),
			required_fields: config.required_fields.clone(),
			max_bytes: config.max_response_bytes,
		})
	}

	pub fn parse(&self, body: &str) -> std::result::Result<LaunchCredential, ParseFailure> {
		let body = truncate(body, self.max_bytes);
		let value = self.locate(body).ok_or_else(|| ParseFailure::MissingAttribute {
			attribute: self.attribute.clone(),
		})?;

		let query = value.trim().trim_start_matches('?').trim_start_matches('&');
		if query.is_empty() {
			return Err(ParseFailure::EmptyValue {
				attribute: self.attribute.clone(),
			});
		}

		let credential = LaunchCredential::from_query(query);
		let missing: Vec<String> = self
			.required_fields
			.iter()
			.filter(|name| !credential.has(name))
			.cloned()
			.collect();
		if !missing.is_empty() {
			return Err(ParseFailure::MissingFields { missing });
		}
		Ok(credential)
	}

	fn locate(&self, body: &str) -> Option<String> {
		if !self.scope_marker.is_empty() {
			if let Some(start) = body.find(&self.scope_marker) {
				if let Some(value) = self.scan(&body[start..]) {
					return Some(value);
				}
			}
		}
		if let Some(value) = self.scan(body) {
			return Some(value);
		}
		if body.contains('\\') {
			return self.scan(&unescape(body));
		}
		None
	}

	fn scan(&self, text: &str) -> Option<String> {
		let mut hits: Vec<(usize, usize, char)> = self
			.inline
			.captures_iter(text)
			.chain(self.param.captures_iter(text))
			.filter_map(|caps| {
				let quote = caps.get(1)?;
				let ch = quote.as_str().chars().last()?;
				Some((quote.start(), quote.end(), ch))
			})
			.collect();
		hits.sort_by_key(|(start, _, _)| *start);
		hits.into_iter().find_map(|(_, end, quote)| read_quoted(&text[end..], quote))
	}
}

/// Reads up to the closing `quote`, resolving backslash escapes.
fn read_quoted(text: &str, quote: char) -> Option<String> {
	let mut out = String::new();
	let mut chars = text.chars();
	while let Some(ch) = chars.next() {
		match ch {
			'\\' => match chars.next()? {
				'n' => out.push('\n'),
				'r' => out.push('\r'),
				't' => out.push('\t'),
				// `\"` closes a value that was opened with `\"`.
				c if c == quote => return Some(out),
				other => out.push(other),
			},
			c if c == quote => return Some(out),
			c => out.push(c),
		}
	}
	None
}

fn unescape(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	let mut chars = text.chars();
	while let Some(ch) = chars.next() {
		if ch != '\\' {
			out.push(ch);
			continue;
		}
		match chars.next() {
			Some('n') => out.push('\n'),
			Some('r') => out.push('\r'),
			Some('t') => out.push('\t'),
			Some(c @ ('"' | '\'' | '\\')) => out.push(c),
			Some(other) => {
				out.push('\\');
				out.push(other);
			}
			None => out.push('\\'),
		}
	}
	out
}

fn truncate(body: &str, max_bytes: usize) -> &str {
	if body.len() <= max_bytes {
		return body;
	}
	let mut end = max_bytes;
	while !body.is_char_boundary(end) {
		end -= 1;
	}
	&body[..end]
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parser() -> ResponseParser {
		ResponseParser::new(&CaptureConfig::default()).unwrap()
	}

	#[test]
	fn reads_param_value_inside_scope() {
		let html = r#"
		<html><body>
		<script>function swf(id){
			var swfurl='<param name="FlashVars" value="config=//res.example/Global.xml&angel_uin=123&angel_key=abc&skey=def" />';
		}</script>
		</body></html>
		"#;
		let credential = parser().parse(html).unwrap();
		assert_eq!(credential.get("config"), Some("//res.example/Global.xml"));
		assert_eq!(credential.get("angel_uin"), Some("123"));
		assert_eq!(credential.field_names(), ["config", "angel_uin", "angel_key", "skey"]);
	}

	#[test]
	fn reads_escaped_quotes() {
		let html = r#"function swf(id){var swfurl="<embed flashVars=\"config=//res.example/Global.xml&angel_uin=1\" />";}"#;
		let credential = parser().parse(html).unwrap();
		assert_eq!(credential.get("angel_uin"), Some("1"));
	}

	#[test]
	fn prefers_scope_region() {
		let html = r#"<embed flashvars="config=outer&angel_uin=0"> function swf(){ x = 'flashVars = "config=inner&angel_uin=9"' }"#;
		let credential = parser().parse(html).unwrap();
		assert_eq!(credential.get("config"), Some("inner"));
	}

	#[test]
	fn falls_back_to_unescaped_body() {
		let html = r#"document.write("<embed src=x flashVars=\\\"config=c&angel_uin=5\\\">")"#;
		let credential = parser().parse(html).unwrap();
		assert_eq!(credential.get("angel_uin"), Some("5"));
	}

	#[test]
	fn leading_separators_are_trimmed() {
		let credential = parser().parse(r#"flashVars="?&config=a&angel_uin=2""#).unwrap();
		assert_eq!(credential.field_names(), ["config", "angel_uin"]);
	}

	#[test]
	fn missing_attribute_is_reported() {
		let err = parser().parse("<html>login failed</html>").unwrap_err();
		assert_eq!(
			err,
			ParseFailure::MissingAttribute {
				attribute: "flashVars".to_string()
			}
		);
	}

	#[test]
	fn missing_required_field_is_reported() {
		let err = parser().parse(r#"flashVars="config=a&skey=b""#).unwrap_err();
		assert_eq!(
			err,
			ParseFailure::MissingFields {
				missing: vec!["angel_uin".to_string()]
			}
		);
	}

	#[test]
	fn empty_value_is_reported() {
		let err = parser().parse(r#"flashVars=" ? ""#).unwrap_err();
		assert!(matches!(err, ParseFailure::EmptyValue { .. }));
	}

	#[test]
	fn body_is_truncated_at_limit() {
		let config = CaptureConfig {
			max_response_bytes: 16,
			..CaptureConfig::default()
		};
		let parser = ResponseParser::new(&config).unwrap();
		let html = format!("{}flashVars=\"config=a&angel_uin=1\"", " ".repeat(32));
		assert!(matches!(parser.parse(&html), Err(ParseFailure::MissingAttribute { .. })));
	}

	#[test]
	fn truncate_respects_char_boundaries() {
		assert_eq!(truncate("héllo", 2), "h");
	}
}
