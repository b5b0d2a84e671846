//! Decoding of child process output.
//!
//! External tools write in whatever the system code page is. The encoding is taken
//! from the config when given, otherwise guessed from the locale environment and,
//! on Windows, from the ANSI code page. It falls back to a fixed default when
//! nothing matches. Invalid byte sequences are replaced with U+FFFD and never fail.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::{debug, warn};

/// Locale environment variables, in priority order.
const LOCALE_VARS: [&str; 3] = ["LC_ALL", "LC_CTYPE", "LANG"];

/// Locale codesets that are not WHATWG encoding labels.
const CODESET_ALIASES: &[(&str, &str)] = &[
    ("c", "utf-8"),
    ("posix", "utf-8"),
    ("utf8", "utf-8"),
    ("ansi_x3.4-1968", "windows-1252"),
    ("cp1252", "windows-1252"),
    ("cp1251", "windows-1251"),
    ("cp1250", "windows-1250"),
    ("eucjp", "euc-jp"),
    ("euckr", "euc-kr"),
    ("sjis", "shift_jis"),
];

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TextDecoding {
    /// Explicit encoding label such as `utf-8` or `windows-1252`.
    #[serde(default)]
    pub encoding: Option<String>,
    /// Used when no explicit label is given and neither the locale nor the
    /// Windows ANSI code page names a known encoding.
    #[serde(default)]
    pub fallback: Option<String>,
}

impl TextDecoding {
    /// Resolves the encoding to use for this run.
    pub fn resolve(&self) -> Result<TextDecoder> {
        if let Some(label) = &self.encoding {
            return lookup(label)
                .map(TextDecoder::new)
                .ok_or_else(|| Error::UnknownEncoding(label.clone()));
        }

        let fallback = match &self.fallback {
            Some(label) => lookup(label).ok_or_else(|| Error::UnknownEncoding(label.clone()))?,
            None => UTF_8,
        };

        let detected = detect_from_env(|k| std::env::var(k).ok())
            .map(|e| (e, "locale"))
            .or_else(|| system_code_page().map(|e| (e, "system code page")));
        match detected {
            Some((encoding, source)) => {
                debug!("Decoding command output as {} (from {})", encoding.name(), source);
                Ok(TextDecoder::new(encoding))
            }
            None => {
                debug!("No usable locale, decoding command output as {}", fallback.name());
                Ok(TextDecoder::new(fallback))
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TextDecoder {
    encoding: &'static Encoding,
}

impl Default for TextDecoder {
    fn default() -> Self {
        Self::new(UTF_8)
    }
}

impl TextDecoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let (text, _, had_errors) = self.encoding.decode(bytes);
        if had_errors {
            warn!(
                "Command output is not valid {}, replaced undecodable bytes",
                self.encoding.name()
            );
        }
        text
    }
}

fn lookup(label: &str) -> Option<&'static Encoding> {
    let label = label.trim().to_ascii_lowercase();
    let label = CODESET_ALIASES
        .iter()
        .find(|(codeset, _)| *codeset == label)
        .map(|(_, l)| *l)
        .unwrap_or(label.as_str());
    Encoding::for_label(label.as_bytes())
}

/// Picks the encoding from the first non-empty locale variable, e.g.
/// `de_DE.ISO-8859-1@euro` gives ISO-8859-1 and `C` gives UTF-8.
fn detect_from_env<F: Fn(&str) -> Option<String>>(get: F) -> Option<&'static Encoding> {
    let locale = LOCALE_VARS
        .iter()
        .filter_map(|k| get(k))
        .find(|v| !v.is_empty())?;
    let without_modifier = locale.split('@').next().unwrap_or_default();
    let codeset = match without_modifier.split_once('.') {
        Some((_, codeset)) => codeset,
        None => without_modifier,
    };
    lookup(codeset)
}

/// WHATWG label of a Windows code page identifier.
fn code_page_label(code_page: u32) -> Option<String> {
    let label = match code_page {
        65001 => "utf-8".to_string(),
        866 => "ibm866".to_string(),
        874 | 1250..=1258 => format!("windows-{}", code_page),
        932 => "shift_jis".to_string(),
        936 => "gbk".to_string(),
        949 => "euc-kr".to_string(),
        950 => "big5".to_string(),
        20866 => "koi8-r".to_string(),
        21866 => "koi8-u".to_string(),
        28591..=28606 => format!("iso-8859-{}", code_page - 28590),
        _ => return None,
    };
    Some(label)
}

#[cfg(windows)]
fn system_code_page() -> Option<&'static Encoding> {
    // SAFETY: GetACP takes no arguments and only reads process state.
    let code_page = unsafe { winapi::um::winnls::GetACP() };
    code_page_label(code_page).and_then(|label| lookup(&label))
}

#[cfg(not(windows))]
fn system_code_page() -> Option<&'static Encoding> {
    None
}
