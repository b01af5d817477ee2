//! Text diffing.
//!
//! Computes the insert/delete operations that turn one text into another.
//! The engine is Myers' O((N+M)D) algorithm in its linear-space form
//! (recursive middle-snake bisection), run over Unicode scalar values after
//! stripping the common prefix and suffix. A configurable edit-cost cap bounds
//! the work on pathological inputs: once exceeded, the remaining region is
//! emitted as one delete plus one insert, which is still a correct script.
//!
//! All offsets are in `char`s, not bytes.
//!
//! ## Offset convention
//!
//! Operations are meant to be applied in order. Walking the edit script left
//! to right, a cursor tracks the position in the progressively-updated text:
//! equal spans advance it, inserts are reported at the cursor and then advance
//! it by the inserted length, deletes are reported at the cursor and leave it
//! where it is.

use serde::{Deserialize, Serialize};

/// Default cap on the number of edit steps explored per bisection.
pub const DEFAULT_MAX_COST: usize = 4096;

/// Kind of a [`DiffOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Insert,
    Delete,
}

/// One operation of an edit script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOp {
    pub kind: DiffKind,
    /// Position in chars, see the module docs for the convention.
    pub offset: usize,
    pub value: String,
}

impl DiffOp {
    pub fn insert(offset: usize, value: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::Insert,
            offset,
            value: value.into(),
        }
    }

    pub fn delete(offset: usize, value: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::Delete,
            offset,
            value: value.into(),
        }
    }

    /// Length of `value` in chars.
    pub fn len(&self) -> usize {
        self.value.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Tuning for [`diff_with_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffConfig {
    /// Maximum edit distance explored before falling back to delete+insert.
    pub max_cost: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_cost: DEFAULT_MAX_COST,
        }
    }
}

/// Compute the edit script from `old` to `new` with default tuning.
pub fn diff(old: &str, new: &str) -> Vec<DiffOp> {
    diff_with_config(old, new, DiffConfig::default())
}

/// Compute the edit script from `old` to `new`.
///
/// Returns an empty script when the texts are equal.
pub fn diff_with_config(old: &str, new: &str, config: DiffConfig) -> Vec<DiffOp> {
    if old == new {
        return Vec::new();
    }
    let old: Vec<char> = old.chars().collect();
    let new: Vec<char> = new.chars().collect();

    let mut spans = Vec::new();
    let max_d = (old.len() + new.len()).div_ceil(2) + 1;
    let mut vf = V::new(max_d);
    let mut vb = V::new(max_d);
    conquer(
        &old,
        0..old.len(),
        &new,
        0..new.len(),
        &mut vf,
        &mut vb,
        config.max_cost,
        &mut spans,
    );
    to_ops(&old, &new, spans)
}

/// Apply an edit script to `text`.
///
/// Operations whose offset falls outside the text are clamped to its end.
pub fn apply(text: &str, ops: &[DiffOp]) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    for op in ops {
        let offset = op.offset.min(chars.len());
        match op.kind {
            DiffKind::Insert => {
                chars.splice(offset..offset, op.value.chars());
            }
            DiffKind::Delete => {
                let end = (offset + op.len()).min(chars.len());
                chars.drain(offset..end);
            }
        }
    }
    chars.into_iter().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    Equal(usize),
    /// Range into the old text.
    Delete(usize, usize),
    /// Range into the new text.
    Insert(usize, usize),
}

fn push_span(spans: &mut Vec<Span>, span: Span) {
    match (spans.last_mut(), span) {
        (Some(Span::Equal(len)), Span::Equal(more)) => *len += more,
        (Some(Span::Delete(_, end)), Span::Delete(start, more_end)) if *end == start => {
            *end = more_end
        }
        (Some(Span::Insert(_, end)), Span::Insert(start, more_end)) if *end == start => {
            *end = more_end
        }
        _ => spans.push(span),
    }
}

fn to_ops(old: &[char], new: &[char], spans: Vec<Span>) -> Vec<DiffOp> {
    let mut ops = Vec::new();
    let mut cursor = 0;
    for span in spans {
        match span {
            Span::Equal(len) => cursor += len,
            Span::Insert(start, end) => {
                ops.push(DiffOp::insert(cursor, new[start..end].iter().collect::<String>()));
                cursor += end - start;
            }
            Span::Delete(start, end) => {
                ops.push(DiffOp::delete(cursor, old[start..end].iter().collect::<String>()));
            }
        }
    }
    ops
}

/// Diagonal-indexed frontier for the Myers search.
struct V {
    offset: isize,
    v: Vec<usize>,
}

impl V {
    fn new(max_d: usize) -> Self {
        Self {
            offset: max_d as isize,
            v: vec![0; 2 * max_d + 1],
        }
    }
}

impl std::ops::Index<isize> for V {
    type Output = usize;

    fn index(&self, k: isize) -> &usize {
        &self.v[(k + self.offset) as usize]
    }
}

impl std::ops::IndexMut<isize> for V {
    fn index_mut(&mut self, k: isize) -> &mut usize {
        &mut self.v[(k + self.offset) as usize]
    }
}

fn common_prefix(a: &[char], b: &[char]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &[char], b: &[char]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Find the start of a middle snake splitting the ranges, or `None` when the
/// cost cap is reached first.
fn find_middle_snake(
    old: &[char],
    old_range: std::ops::Range<usize>,
    new: &[char],
    new_range: std::ops::Range<usize>,
    vf: &mut V,
    vb: &mut V,
    max_cost: usize,
) -> Option<(usize, usize)> {
    let n = old_range.len();
    let m = new_range.len();
    let delta = n as isize - m as isize;
    let odd = delta & 1 == 1;
    let d_max = (n + m).div_ceil(2) + 1;

    vf[1] = 0;
    vb[1] = 0;

    for d in 0..d_max.min(max_cost.max(1)) as isize {
        // Forward search.
        let mut k = d;
        while k >= -d {
            let mut x = if k == -d || (k != d && vf[k - 1] < vf[k + 1]) {
                vf[k + 1]
            } else {
                vf[k - 1] + 1
            };
            let y = (x as isize - k) as usize;
            let (x0, y0) = (x, y);
            if x < n && y < m {
                x += common_prefix(
                    &old[old_range.start + x..old_range.end],
                    &new[new_range.start + y..new_range.end],
                );
            }
            vf[k] = x;
            if odd && (k - delta).abs() <= d - 1 && vf[k] + vb[-(k - delta)] >= n {
                return Some((x0 + old_range.start, y0 + new_range.start));
            }
            k -= 2;
        }

        // Backward search.
        let mut k = d;
        while k >= -d {
            let mut x = if k == -d || (k != d && vb[k - 1] < vb[k + 1]) {
                vb[k + 1]
            } else {
                vb[k - 1] + 1
            };
            let mut y = (x as isize - k) as usize;
            if x < n && y < m {
                let advance = common_suffix(
                    &old[old_range.start..old_range.start + n - x],
                    &new[new_range.start..new_range.start + m - y],
                );
                x += advance;
                y += advance;
            }
            vb[k] = x;
            if !odd && (k - delta).abs() <= d && vb[k] + vf[-(k - delta)] >= n {
                return Some((n - x + old_range.start, m - y + new_range.start));
            }
            k -= 2;
        }
    }
    None
}

#[allow(clippy::too_many_arguments)]
fn conquer(
    old: &[char],
    mut old_range: std::ops::Range<usize>,
    new: &[char],
    mut new_range: std::ops::Range<usize>,
    vf: &mut V,
    vb: &mut V,
    max_cost: usize,
    spans: &mut Vec<Span>,
) {
    let prefix = common_prefix(&old[old_range.clone()], &new[new_range.clone()]);
    if prefix > 0 {
        push_span(spans, Span::Equal(prefix));
    }
    old_range.start += prefix;
    new_range.start += prefix;

    let suffix = common_suffix(&old[old_range.clone()], &new[new_range.clone()]);
    old_range.end -= suffix;
    new_range.end -= suffix;

    if old_range.is_empty() && new_range.is_empty() {
        // Nothing left between prefix and suffix.
    } else if old_range.is_empty() {
        push_span(spans, Span::Insert(new_range.start, new_range.end));
    } else if new_range.is_empty() {
        push_span(spans, Span::Delete(old_range.start, old_range.end));
    } else if let Some((x, y)) = find_middle_snake(
        old,
        old_range.clone(),
        new,
        new_range.clone(),
        vf,
        vb,
        max_cost,
    ) {
        conquer(
            old,
            old_range.start..x,
            new,
            new_range.start..y,
            vf,
            vb,
            max_cost,
            spans,
        );
        conquer(
            old,
            x..old_range.end,
            new,
            y..new_range.end,
            vf,
            vb,
            max_cost,
            spans,
        );
    } else {
        push_span(spans, Span::Delete(old_range.start, old_range.end));
        push_span(spans, Span::Insert(new_range.start, new_range.end));
    }

    if suffix > 0 {
        push_span(spans, Span::Equal(suffix));
    }
}
