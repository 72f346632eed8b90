//! `Accept` header content negotiation.
//!
//! Each writer is scored by the most specific media range it matches
//! (`type/subtype` over `type/*` over `*/*`); that range's quality decides,
//! and `q=0` refuses the type even if a broader range admits it. Writers are
//! then ranked by quality, specificity, weight and configured order. A
//! missing or empty `Accept` header accepts everything.

use std::cmp::Ordering;

use mime::Mime;

/// How precisely a media range matched a media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specificity {
    /// `*/*`
    Any,
    /// `type/*`
    Subtype,
    /// `type/subtype`
    Exact,
}

/// One entry of an `Accept` header.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    range: Mime,
    quality: f32,
}

impl MediaRange {
    /// The media range, parameters stripped of `q`.
    pub fn range(&self) -> &Mime {
        &self.range
    }

    /// The quality value in `[0, 1]`.
    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// How this range matches `media_type`, if at all.
    pub fn matches(&self, media_type: &Mime) -> Option<Specificity> {
        let any_type = self.range.type_() == mime::STAR;
        let any_subtype = self.range.subtype() == mime::STAR;

        if any_type && any_subtype {
            return Some(Specificity::Any);
        }
        if !self.range.type_().as_str().eq_ignore_ascii_case(media_type.type_().as_str()) {
            return None;
        }
        if any_subtype {
            return Some(Specificity::Subtype);
        }
        self.range
            .subtype()
            .as_str()
            .eq_ignore_ascii_case(media_type.subtype().as_str())
            .then_some(Specificity::Exact)
    }
}

/// Parses an `Accept` header value.
///
/// Entries that fail to parse are ignored. Entries with `q=0` are kept so
/// they can refuse a type. Quality values outside `[0, 1]` are clamped.
pub fn parse_accept(header: &str) -> Vec<MediaRange> {
    header
        .split(',')
        .filter_map(|entry| {
            let range: Mime = entry.trim().parse().ok()?;
            let quality = range
                .get_param("q")
                .and_then(|q| q.as_str().parse::<f32>().ok())
                .map_or(1.0, |q| q.clamp(0.0, 1.0));
            Some(MediaRange { range, quality })
        })
        .collect()
}

/// `(quality, specificity)` of the most specific range matching
/// `media_type`.
///
/// Among equally specific ranges the highest quality counts. Returns `None`
/// when nothing matches or the deciding range has `q=0`.
pub fn acceptance(ranges: &[MediaRange], media_type: &Mime) -> Option<(f32, Specificity)> {
    ranges
        .iter()
        .filter_map(|range| range.matches(media_type).map(|s| (range.quality, s)))
        .max_by(|a, b| {
            a.1.cmp(&b.1)
                .then(a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal))
        })
        .filter(|(quality, _)| *quality > 0.0)
}

fn compare_acceptance(a: (f32, Specificity), b: (f32, Specificity)) -> Ordering {
    a.0.partial_cmp(&b.0)
        .unwrap_or(Ordering::Equal)
        .then(a.1.cmp(&b.1))
}

/// Picks the index of the best candidate for an `Accept` header.
///
/// `candidates` yields `(media type, weight)` in configured order. With no
/// header (or an empty one) every candidate is acceptable and only weight
/// and order count. Returns `None` when no candidate is acceptable.
///
/// # Example
///
/// ```rust
/// use trellis_core::negotiation::select;
///
/// let json = mime::APPLICATION_JSON;
/// let text = mime::TEXT_PLAIN_UTF_8;
/// let candidates = [(&json, 0), (&text, 0)];
///
/// assert_eq!(select(Some("text/*, application/json;q=0.5"), candidates), Some(1));
/// assert_eq!(select(None, candidates), Some(0));
/// assert_eq!(select(Some("image/png"), candidates), None);
/// ```
pub fn select<'a, I>(accept: Option<&str>, candidates: I) -> Option<usize>
where
    I: IntoIterator<Item = (&'a Mime, i32)>,
{
    let ranges = accept.map(parse_accept).unwrap_or_default();
    let accept_all = accept.map_or(true, |header| header.trim().is_empty());

    let mut best: Option<(usize, (f32, Specificity), i32)> = None;
    for (index, (media_type, weight)) in candidates.into_iter().enumerate() {
        let score = if accept_all {
            (1.0, Specificity::Any)
        } else {
            match acceptance(&ranges, media_type) {
                Some(score) => score,
                None => continue,
            }
        };

        let better = match best {
            None => true,
            Some((_, best_score, best_weight)) => {
                compare_acceptance(score, best_score).then(weight.cmp(&best_weight))
                    == Ordering::Greater
            }
        };
        if better {
            best = Some((index, score, weight));
        }
    }
    best.map(|(index, _, _)| index)
}
