//! Masked find-and-replace over opaque memory images.
//!
//! A [`PatchRule`] locates the first occurrence of its find pattern in a region and
//! overwrites the start of that occurrence with its replace pattern. Both patterns may
//! carry a mask: a find mask byte selects which bits of the region must match, a replace
//! mask byte of zero leaves the corresponding region byte untouched.
//!
//! Rules are checked when they are built. The `const` constructors are meant for static
//! rule tables, where a bad rule stops the build; [`PatchRule::try_new`] is for rules put
//! together at runtime.

use log::{debug, warn};

use crate::error::{Error, Result};

/// A single rewrite instruction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PatchRule<'a> {
    label: &'a str,
    find: &'a [u8],
    find_mask: Option<&'a [u8]>,
    replace: &'a [u8],
    replace_mask: Option<&'a [u8]>,
}

impl<'a> PatchRule<'a> {
    /// Exact find, full replace.
    pub const fn new(label: &'a str, find: &'a [u8], replace: &'a [u8]) -> Self {
        Self::with_masks(label, find, None, replace, None)
    }

    /// Masked find, full replace.
    pub const fn masked(
        label: &'a str,
        find: &'a [u8],
        find_mask: &'a [u8],
        replace: &'a [u8],
    ) -> Self {
        Self::with_masks(label, find, Some(find_mask), replace, None)
    }

    /// Masked find, masked replace.
    pub const fn masked_both(
        label: &'a str,
        find: &'a [u8],
        find_mask: &'a [u8],
        replace: &'a [u8],
        replace_mask: &'a [u8],
    ) -> Self {
        Self::with_masks(label, find, Some(find_mask), replace, Some(replace_mask))
    }

    const fn with_masks(
        label: &'a str,
        find: &'a [u8],
        find_mask: Option<&'a [u8]>,
        replace: &'a [u8],
        replace_mask: Option<&'a [u8]>,
    ) -> Self {
        assert!(!find.is_empty(), "find pattern is empty");
        assert!(
            replace.len() <= find.len(),
            "replace pattern is longer than find pattern"
        );
        if let Some(mask) = find_mask {
            assert!(mask.len() == find.len(), "find mask length mismatch");
        }
        if let Some(mask) = replace_mask {
            assert!(mask.len() == replace.len(), "replace mask length mismatch");
        }
        Self {
            label,
            find,
            find_mask,
            replace,
            replace_mask,
        }
    }

    /// Runtime-checked constructor.
    pub fn try_new(
        label: &'a str,
        find: &'a [u8],
        find_mask: Option<&'a [u8]>,
        replace: &'a [u8],
        replace_mask: Option<&'a [u8]>,
    ) -> Result<Self> {
        if find.is_empty() {
            return Err(Error::EmptyFindPattern);
        }
        if replace.len() > find.len() {
            return Err(Error::ReplaceTooLong {
                find: find.len(),
                replace: replace.len(),
            });
        }
        if find_mask.is_some_and(|m| m.len() != find.len())
            || replace_mask.is_some_and(|m| m.len() != replace.len())
        {
            return Err(Error::MaskLengthMismatch);
        }
        Ok(Self {
            label,
            find,
            find_mask,
            replace,
            replace_mask,
        })
    }

    pub fn label(&self) -> &'a str {
        self.label
    }

    pub fn find_len(&self) -> usize {
        self.find.len()
    }

    /// Whether `window` matches the find pattern. `window` must be exactly as long as
    /// the pattern.
    pub fn matches(&self, window: &[u8]) -> bool {
        masked_eq(window, self.find, self.find_mask)
    }

    /// Offset of the earliest match at or after `start`.
    pub fn find_in(&self, region: &[u8], start: usize) -> Option<usize> {
        region
            .get(start..)?
            .windows(self.find.len())
            .position(|window| self.matches(window))
            .map(|pos| pos + start)
    }

    /// Overwrite `region[offset..]` with the replace pattern, honoring the replace mask.
    fn write_at(&self, region: &mut [u8], offset: usize) {
        masked_write(&mut region[offset..offset + self.replace.len()], self.replace, self.replace_mask);
    }

    /// Patch the earliest match in `region`. Returns whether a match was found.
    pub fn apply(&self, region: &mut [u8]) -> bool {
        match self.find_in(region, 0) {
            Some(offset) => {
                self.write_at(region, offset);
                debug!(target: "patch", "Applied '{}' patch at {:#x}", self.label, offset);
                true
            }
            None => false,
        }
    }

    /// Patch up to `count` non-overlapping matches, scanning forward from the end of each
    /// matched span. Returns how many were patched.
    pub fn apply_n(&self, region: &mut [u8], count: usize) -> usize {
        let mut patched = 0;
        let mut start = 0;
        while patched < count {
            let Some(offset) = self.find_in(region, start) else {
                break;
            };
            self.write_at(region, offset);
            patched += 1;
            start = offset + self.find.len();
        }
        patched
    }
}

/// Apply every rule independently against the same region. A rule that does not match is
/// reported and skipped. Returns how many rules matched.
pub fn apply_all(rules: &[PatchRule<'_>], region: &mut [u8]) -> usize {
    rules
        .iter()
        .filter(|rule| {
            let applied = rule.apply(region);
            if !applied {
                warn!(target: "patch", "Failed to apply '{}' patch", rule.label);
            }
            applied
        })
        .count()
}

/// A rule applied to at most `count` occurrences.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LookupPatch<'a> {
    pub rule: PatchRule<'a>,
    pub count: usize,
}

impl LookupPatch<'_> {
    /// Returns how many occurrences were patched; zero is tolerated and only logged.
    pub fn apply(&self, region: &mut [u8]) -> usize {
        let patched = self.rule.apply_n(region, self.count);
        if patched == 0 {
            warn!(target: "patch", "Lookup patch '{}' found nothing", self.rule.label);
        } else {
            debug!(target: "patch", "Lookup patch '{}' applied {} time(s)", self.rule.label, patched);
        }
        patched
    }
}

/// Byte-wise `(a & mask) == (b & mask)`, or plain equality without a mask.
pub fn masked_eq(window: &[u8], pattern: &[u8], mask: Option<&[u8]>) -> bool {
    if window.len() != pattern.len() {
        return false;
    }
    match mask {
        Some(mask) => window
            .iter()
            .zip(pattern)
            .zip(mask)
            .all(|((w, p), m)| w & m == p & m),
        None => window == pattern,
    }
}

/// Copy `pattern` into `dest`, skipping positions whose mask byte is zero.
pub fn masked_write(dest: &mut [u8], pattern: &[u8], mask: Option<&[u8]>) {
    match mask {
        Some(mask) => {
            for ((d, p), m) in dest.iter_mut().zip(pattern).zip(mask) {
                if *m != 0 {
                    *d = *p;
                }
            }
        }
        None => dest.copy_from_slice(pattern),
    }
}
