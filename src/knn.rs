use ndarray::ArrayView2;
use smallvec::SmallVec;
use tracing::debug;

use crate::*;

/// One candidate label in a k-NN vote.
struct Ballot<'a, L> {
    label: &'a L,
    votes: usize,
}

/// Predict a label for every row of `test_feats` by majority vote among its `k`
/// nearest rows of `train_feats` (Euclidean distance).
///
/// Neighbors are ranked by ascending distance; equal distances keep the lower training
/// index first. When several labels share the highest vote count, the one held by the
/// nearest neighbor wins. `k` larger than the training set uses every training row.
pub fn nearest_neighbor_classify<L: Clone + PartialEq>(
    train_feats: ArrayView2<f32>,
    train_labels: &[L],
    test_feats: ArrayView2<f32>,
    k: usize,
) -> BowResult<Vec<L>> {
    if k == 0 {
        return Err(BowErr::InvalidParameter("k must be positive"));
    }
    if train_feats.nrows() == 0 {
        return Err(BowErr::InvalidParameter("no training samples"));
    }
    if train_labels.len() != train_feats.nrows() {
        return Err(BowErr::LengthMismatch {
            expected: train_feats.nrows(),
            found: train_labels.len(),
        });
    }
    let d = pairwise_distances(test_feats, train_feats)?;
    debug!(test = test_feats.nrows(), train = train_feats.nrows(), k, "kNN classify");

    let mut order: Vec<usize> = Vec::with_capacity(train_feats.nrows());
    let predictions = d
        .outer_iter()
        .map(|row| {
            order.clear();
            order.extend(0..row.len());
            order.sort_by(|&a, &b| row[a].total_cmp(&row[b]));
            vote(order.iter().take(k).map(|&j| &train_labels[j])).clone()
        })
        .collect();
    Ok(predictions)
}

/// Most frequent label among `neighbors` (nearest first). Ties go to the label seen first.
fn vote<'a, L: PartialEq>(neighbors: impl Iterator<Item = &'a L>) -> &'a L {
    let mut ballots: SmallVec<[Ballot<'a, L>; 8]> = SmallVec::new();
    for label in neighbors {
        match ballots.iter_mut().find(|b| b.label == label) {
            Some(b) => b.votes += 1,
            None => ballots.push(Ballot { label, votes: 1 }),
        }
    }
    // Strict comparison keeps the earliest ballot among equals.
    let mut best = &ballots[0];
    for b in ballots.iter().skip(1) {
        if b.votes > best.votes {
            best = b;
        }
    }
    best.label
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn nearest_point_and_majority() {
        let train = array![[0f32, 0.], [10., 10.], [10., 11.]];
        let labels = vec!["a", "b", "b"];
        let test = array![[0f32, 1.]];

        let k1 = nearest_neighbor_classify(train.view(), &labels, test.view(), 1).unwrap();
        assert_eq!(k1, vec!["a"]);
        let k3 = nearest_neighbor_classify(train.view(), &labels, test.view(), 3).unwrap();
        assert_eq!(k3, vec!["b"]);
    }

    #[test]
    fn tie_goes_to_nearest_label() {
        let train = array![[5f32], [1.], [2.], [6.]];
        let labels = vec!["far", "near", "far", "near"];
        let test = array![[0f32], [7.]];
        // Rows sorted by distance from 0: near(1), far(2), far(5), near(6) -> k=2 tie.
        // From 7: near(6), far(5), far(2), near(1).
        let pred = nearest_neighbor_classify(train.view(), &labels, test.view(), 2).unwrap();
        assert_eq!(pred, vec!["near", "near"]);
        let pred = nearest_neighbor_classify(train.view(), &labels, test.view(), 4).unwrap();
        assert_eq!(pred, vec!["near", "near"]);
    }

    #[test]
    fn equal_distances_keep_training_order() {
        let train = array![[1f32], [-1.]];
        let labels = vec![String::from("right"), String::from("left")];
        let test = array![[0f32]];
        let pred = nearest_neighbor_classify(train.view(), &labels, test.view(), 1).unwrap();
        assert_eq!(pred, vec!["right".to_string()]);
    }

    #[test]
    fn k_larger_than_training_set() {
        let train = array![[0f32], [1.], [2.]];
        let labels = vec![1u8, 2, 2];
        let test = array![[0f32]];
        let pred = nearest_neighbor_classify(train.view(), &labels, test.view(), 10).unwrap();
        assert_eq!(pred, vec![2]);
    }

    #[test]
    fn rejects_bad_inputs() {
        let train = array![[0f32, 0.], [1., 1.]];
        let test = array![[0f32, 0.]];
        assert!(matches!(
            nearest_neighbor_classify(train.view(), &["a"], test.view(), 1),
            Err(BowErr::LengthMismatch { expected: 2, found: 1 })
        ));
        assert!(matches!(
            nearest_neighbor_classify(train.view(), &["a", "b"], test.view(), 0),
            Err(BowErr::InvalidParameter(_))
        ));
        assert!(matches!(
            nearest_neighbor_classify(train.view(), &["a", "b"], array![[0f32]].view(), 1),
            Err(BowErr::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn stateless() {
        let train = array![[0f32], [3.]];
        let labels = vec!["x", "y"];
        let test = array![[1f32], [2.5]];
        let a = nearest_neighbor_classify(train.view(), &labels, test.view(), 1).unwrap();
        let b = nearest_neighbor_classify(train.view(), &labels, test.view(), 1).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, vec!["x", "y"]);
    }
}
