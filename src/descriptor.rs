//! The `feat_num`-style descriptor file: three whitespace-separated
//! non-negative integers, one per line — `user_num`, `item_num`, `d`
//! one per line — `user_num`, `item_num`, `d`.

use std::fs;
use std::path::Path;

use crate::error::{MfError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub user_num: usize,
    pub item_num: usize,
    pub d: usize,
}

impl Descriptor {
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            MfError::Configuration(format!("cannot read descriptor {}: {e}", path.display()))
        })?;

        let mut nums = text.split_whitespace();
        let parse_next = |nums: &mut std::str::SplitWhitespace, what: &str| -> Result<usize> {
            nums.next()
                .ok_or_else(|| MfError::Configuration(format!("descriptor missing {what}")))?
                .parse::<usize>()
                .map_err(|_| MfError::Configuration(format!("descriptor {what} is not an integer")))
        };

        let user_num = parse_next(&mut nums, "user_num")?;
        let item_num = parse_next(&mut nums, "item_num")?;
        let d = parse_next(&mut nums, "latent dimension")?;

        if user_num == 0 || item_num == 0 || d == 0 {
            return Err(MfError::Configuration(
                "user_num, item_num and d must all be non-zero".into(),
            ));
        }

        Ok(Self {
            user_num,
            item_num,
            d,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_three_lines() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "10\n20\n8").unwrap();
        let d = Descriptor::read(f.path()).unwrap();
        assert_eq!(d.user_num, 10);
        assert_eq!(d.item_num, 20);
        assert_eq!(d.d, 8);
    }

    #[test]
    fn rejects_zero_dim() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "10\n20\n0").unwrap();
        assert!(Descriptor::read(f.path()).is_err());
    }

    #[test]
    fn rejects_missing_file() {
        assert!(Descriptor::read("/nonexistent/feat_num").is_err());
    }
}
