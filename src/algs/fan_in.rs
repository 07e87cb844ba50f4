//! XOR fan-in tree over an ordered participant list.
//!
//! `participants[0]` is the root. At level `i = 1, 2, 4, ...` a node pairs
//! with `me ^ i`: the lower index receives, the higher index sends and
//! leaves the tree. Every participant derives the same tree from the same
//! list without communicating.

/// This node's role in one fan-in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FanIn {
    /// Ranks to receive from, in the order their data must be merged.
    pub sources: Vec<usize>,
    /// Rank to forward the merged result to; `None` for the root.
    pub target: Option<usize>,
}

impl FanIn {
    pub fn is_root(&self) -> bool {
        self.target.is_none()
    }
}

/// Compute sources and target for the participant at index `my_local_rank`.
///
/// The tree has depth at most `ceil(log2(participants.len()))`.
pub fn compute_fan_in(participants: &[usize], my_local_rank: usize, root: usize) -> FanIn {
    debug_assert_eq!(participants.first(), Some(&root));
    debug_assert!(my_local_rank < participants.len());
    let k = participants.len();
    let mut out = FanIn::default();
    let mut i = 1usize;
    while i < k {
        let other = my_local_rank ^ i;
        if other < k {
            if my_local_rank > other {
                out.target = Some(participants[other]);
                break;
            }
            out.sources.push(participants[other]);
        }
        i <<= 1;
    }
    out
}

/// `root` first, then every other rank of `others` in increasing order.
pub fn participants_for(root: usize, others: impl IntoIterator<Item = usize>) -> Vec<usize> {
    let mut rest: Vec<usize> = others.into_iter().filter(|&r| r != root).collect();
    rest.sort_unstable();
    rest.dedup();
    let mut out = Vec::with_capacity(rest.len() + 1);
    out.push(root);
    out.extend(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_way_tree() {
        let p: Vec<usize> = (10..18).collect();
        assert_eq!(compute_fan_in(&p, 0, 10).sources, vec![11, 12, 14]);
        assert_eq!(compute_fan_in(&p, 5, 10).target, Some(14));
        let six = compute_fan_in(&p, 6, 10);
        assert_eq!(six.sources, vec![17]);
        assert_eq!(six.target, Some(14));
    }

    #[test]
    fn missing_partner_is_skipped() {
        let p = [3, 0, 1, 4, 6];
        let fi = compute_fan_in(&p, 2, 3);
        assert_eq!(fi.sources, vec![4]);
        assert_eq!(fi.target, Some(3));
        let last = compute_fan_in(&p, 4, 3);
        assert_eq!(last.target, Some(3));
        assert!(last.sources.is_empty());
    }

    #[test]
    fn root_is_forced_first() {
        assert_eq!(participants_for(4, [6, 1, 4, 1]), vec![4, 1, 6]);
        assert!(compute_fan_in(&[2], 0, 2).is_root());
    }
}
