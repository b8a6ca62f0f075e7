use crate::{IdSource, IdSourceError};
use pandump::MAX_STANDARD_ID;
use regex::Regex;
use std::sync::LazyLock;

static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(0[xX][0-9a-fA-F]+|[0-9]+)",
        r"(?:\s*-\s*(0[xX][0-9a-fA-F]+|[0-9]+))?$"
    ))
    .unwrap()
});

/// Literal list of ids, e.g. `0x152,0x3e9,0x100-0x10f,1000`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IdList {
    ids: Vec<u32>,
}

impl IdList {
    pub fn new(ids: Vec<u32>) -> Self {
        Self { ids }
    }

    /// Parse comma separated ids and inclusive `a-b` ranges. Numbers are
    /// decimal unless prefixed with `0x`.
    pub fn parse(list: &str) -> Result<Self, IdSourceError> {
        let mut ids = Vec::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let c = ID_PATTERN
                .captures(item)
                .ok_or_else(|| IdSourceError::InvalidId(item.to_string()))?;

            let first = number(c.get(1).map_or("", |m| m.as_str()))
                .ok_or_else(|| IdSourceError::InvalidId(item.to_string()))?;

            match c.get(2) {
                None => ids.push(first),
                Some(last) => {
                    let last = number(last.as_str()).ok_or_else(|| {
                        IdSourceError::InvalidId(item.to_string())
                    })?;
                    if last < first {
                        return Err(IdSourceError::EmptyRange(item.to_string()));
                    }
                    if last > MAX_STANDARD_ID as u32 {
                        return Err(IdSourceError::RangeOutOfBounds(
                            item.to_string(),
                        ));
                    }
                    ids.extend(first..=last);
                }
            }
        }
        Ok(Self { ids })
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

fn number(s: &str) -> Option<u32> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

impl IdSource for IdList {
    fn name(&self) -> String {
        "id list".to_string()
    }

    fn ids(&self) -> Vec<u32> {
        self.ids.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_ids() {
        let list = IdList::parse("0x152, 0x3E9,1000").unwrap();
        assert_eq!(list.ids(), vec![0x152, 0x3e9, 1000]);
    }

    #[test]
    fn ranges() {
        let list = IdList::parse("0x100-0x103,7 - 9").unwrap();
        assert_eq!(list.ids(), vec![0x100, 0x101, 0x102, 0x103, 7, 8, 9]);
        let list = IdList::parse("0x7fe-0x7ff").unwrap();
        assert_eq!(list.ids(), vec![0x7fe, 0x7ff]);
    }

    #[test]
    fn empty_list() {
        assert!(IdList::parse("").unwrap().is_empty());
        assert!(IdList::parse(" , ,").unwrap().is_empty());
    }

    #[test]
    fn single_ids_out_of_range_are_kept() {
        // rejected later by the subscription encoder, with a warning
        let list = IdList::parse("0x800").unwrap();
        assert_eq!(list.ids(), vec![0x800]);
    }

    #[test]
    fn invalid_lists() {
        assert!(matches!(
            IdList::parse("0x152,abc"),
            Err(IdSourceError::InvalidId(s)) if s == "abc"
        ));
        assert!(matches!(
            IdList::parse("0xfffffffff"),
            Err(IdSourceError::InvalidId(_))
        ));
        assert!(matches!(
            IdList::parse("0x10-0x5"),
            Err(IdSourceError::EmptyRange(_))
        ));
        assert!(matches!(
            IdList::parse("0x700-0x900"),
            Err(IdSourceError::RangeOutOfBounds(_))
        ));
    }
}
