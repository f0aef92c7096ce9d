use std::{fmt::Debug, ops::Range};

/// Byte range in module source text.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct U32Span {
    pub start: u32,
    pub end: u32,
}

impl Debug for U32Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl From<Range<usize>> for U32Span {
    fn from(value: Range<usize>) -> Self {
        Self {
            start: saturating_u32(value.start),
            end: saturating_u32(value.end),
        }
    }
}

impl From<U32Span> for Range<usize> {
    fn from(value: U32Span) -> Self {
        value.start as usize..value.end as usize
    }
}

fn saturating_u32(offset: usize) -> u32 {
    u32::try_from(offset).unwrap_or(u32::MAX)
}
