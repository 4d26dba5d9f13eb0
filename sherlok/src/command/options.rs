//! Short-flag clustered command options
//!
//! Dump and trace commands take options of the form `-m1000` (flag `m`,
//! value `1000`); the value is glued to the flag letter. The three format
//! words `-ascii`, `-tree`, `-xml` are recognized whole. Everything not
//! starting with `-` is positional.

use crate::domain::CommandError;
use crate::output::OutputFormat;

#[derive(Debug, Default)]
pub struct ShortOpts {
    flags: Vec<(char, String)>,
    positional: Vec<String>,
    format: Option<OutputFormat>,
}

impl ShortOpts {
    pub fn parse(args: &[&str]) -> Result<Self, CommandError> {
        let mut opts = ShortOpts::default();
        for token in args {
            if let Some(rest) = token.strip_prefix('-') {
                if let Some(format) = OutputFormat::parse(rest) {
                    opts.format = Some(format);
                    continue;
                }
                let mut chars = rest.chars();
                let Some(flag) = chars.next() else {
                    return Err(CommandError::BadOption {
                        flag: '-',
                        reason: "empty option".to_string(),
                    });
                };
                opts.flags.push((flag, chars.collect()));
            } else {
                opts.positional.push((*token).to_string());
            }
        }
        Ok(opts)
    }

    #[must_use]
    pub fn has(&self, flag: char) -> bool {
        self.flags.iter().any(|(f, _)| *f == flag)
    }

    #[must_use]
    pub fn get(&self, flag: char) -> Option<&str> {
        self.flags.iter().find(|(f, _)| *f == flag).map(|(_, v)| v.as_str())
    }

    /// Decimal value glued to the flag, e.g. `-m1000`.
    pub fn get_u64(&self, flag: char) -> Result<Option<u64>, CommandError> {
        match self.get(flag) {
            None => Ok(None),
            Some(value) => value.parse().map(Some).map_err(|_| CommandError::BadOption {
                flag,
                reason: format!("expected a number, got {value:?}"),
            }),
        }
    }

    /// Hex id glued to the flag, e.g. `-C1a2b`.
    pub fn get_hex(&self, flag: char) -> Result<Option<u64>, CommandError> {
        match self.get(flag) {
            None => Ok(None),
            Some(value) => {
                u64::from_str_radix(value, 16).map(Some).map_err(|_| CommandError::BadOption {
                    flag,
                    reason: format!("expected a hex id, got {value:?}"),
                })
            }
        }
    }

    #[must_use]
    pub fn format(&self) -> Option<OutputFormat> {
        self.format
    }

    #[must_use]
    pub fn positional(&self) -> &[String] {
        &self.positional
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clustered_flags() {
        let opts = ShortOpts::parse(&["-m1000", "-sn", "-x", "-fjava/util"]).unwrap();
        assert_eq!(opts.get_u64('m').unwrap(), Some(1000));
        assert_eq!(opts.get('s'), Some("n"));
        assert!(opts.has('x'));
        assert_eq!(opts.get('f'), Some("java/util"));
        assert!(!opts.has('z'));
    }

    #[test]
    fn test_hex_ids() {
        let opts = ShortOpts::parse(&["-C1a2b", "-Mff"]).unwrap();
        assert_eq!(opts.get_hex('C').unwrap(), Some(0x1a2b));
        assert_eq!(opts.get_hex('M').unwrap(), Some(0xff));
    }

    #[test]
    fn test_bad_number_is_an_error() {
        let opts = ShortOpts::parse(&["-mlots"]).unwrap();
        assert!(opts.get_u64('m').is_err());
    }

    #[test]
    fn test_format_words() {
        let opts = ShortOpts::parse(&["-ascii", "-e10"]).unwrap();
        assert_eq!(opts.format(), Some(OutputFormat::Ascii));
        assert_eq!(opts.get_u64('e').unwrap(), Some(10));
    }

    #[test]
    fn test_positional_arguments() {
        let opts = ShortOpts::parse(&["java/io", "-e5", "java/lang"]).unwrap();
        assert_eq!(opts.positional(), &["java/io".to_string(), "java/lang".to_string()]);
    }
}
