use std::sync::atomic::{AtomicU32, Ordering};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a tensor's elements are arranged in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LayoutKind {
    #[default]
    Strided,
    Sparse,
    SparseCsr,
    Mkldnn,
}

impl LayoutKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strided => "strided",
            Self::Sparse => "sparse",
            Self::SparseCsr => "sparse_csr",
            Self::Mkldnn => "mkldnn",
        }
    }

    pub fn tag(&self) -> Tag {
        match self {
            Self::Strided => Tag::Strided,
            Self::Sparse => Tag::Sparse,
            Self::SparseCsr => Tag::SparseCsr,
            Self::Mkldnn => Tag::Mkldnn,
        }
    }
}

/// A single capability bit carried by a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Tag {
    Cpu = 1 << 0,
    Cuda = 1 << 1,
    Mps = 1 << 2,
    Meta = 1 << 3,
    Strided = 1 << 4,
    Sparse = 1 << 5,
    SparseCsr = 1 << 6,
    Mkldnn = 1 << 7,
    Floating = 1 << 8,
    Integral = 1 << 9,
    Boolean = 1 << 10,
    Conjugate = 1 << 11,
    Inference = 1 << 12,
    NoStorage = 1 << 13,
}

impl Tag {
    pub const ALL: [Tag; 14] = [
        Tag::Cpu,
        Tag::Cuda,
        Tag::Mps,
        Tag::Meta,
        Tag::Strided,
        Tag::Sparse,
        Tag::SparseCsr,
        Tag::Mkldnn,
        Tag::Floating,
        Tag::Integral,
        Tag::Boolean,
        Tag::Conjugate,
        Tag::Inference,
        Tag::NoStorage,
    ];

    #[inline]
    pub const fn bit(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TagSet(u32);

impl TagSet {
    pub const EMPTY: TagSet = TagSet(0);

    pub fn from_tags(tags: &[Tag]) -> Self {
        Self(tags.iter().fold(0, |acc, t| acc | t.bit()))
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn contains(&self, tag: Tag) -> bool {
        self.0 & tag.bit() != 0
    }

    pub fn insert(&mut self, tag: Tag) {
        self.0 |= tag.bit();
    }

    pub fn remove(&mut self, tag: Tag) {
        self.0 &= !tag.bit();
    }

    #[must_use]
    pub fn union(self, other: TagSet) -> Self {
        Self(self.0 | other.0)
    }

    /// Every tag in `self` is also in `other`.
    pub fn is_subset(&self, other: TagSet) -> bool {
        self.0 & other.0 == self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = Tag> + '_ {
        Tag::ALL.into_iter().filter(|t| self.contains(*t))
    }
}

/// Tag storage that can be flipped through a shared reference.
///
/// Only the bits that describe mutable attributes (conjugation) are expected to change
/// after construction.
#[derive(Debug, Default)]
pub struct AtomicTagSet(AtomicU32);

impl AtomicTagSet {
    pub fn new(tags: TagSet) -> Self {
        Self(AtomicU32::new(tags.bits()))
    }

    pub fn load(&self) -> TagSet {
        TagSet(self.0.load(Ordering::Acquire))
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.load().contains(tag)
    }

    pub fn set(&self, tag: Tag, on: bool) {
        if on {
            self.0.fetch_or(tag.bit(), Ordering::AcqRel);
        } else {
            self.0.fetch_and(!tag.bit(), Ordering::AcqRel);
        }
    }
}

impl Clone for AtomicTagSet {
    fn clone(&self) -> Self {
        Self::new(self.load())
    }
}
