//! Reference/target pairing.
//!
//! Automatic pairing groups items by dataset (and run, for the "Data" category),
//! pairs lone items directly and falls back to greedy similarity matching inside
//! crowded buckets. Manual categories pair by position.

pub mod file_name;
pub mod similarity;

use std::collections::HashMap;

use serde::Serialize;

use crate::error::Result;
use crate::relmon::{Category, Item, ItemStatus};

pub use file_name::{BucketKey, DqmFileName, ALL_RUNS};
pub use similarity::similarity_ratio;

/// Indices into the reference and target slices handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pair {
    pub reference: usize,
    pub target: usize,
    /// `None` when the pair was decided without scoring.
    pub similarity: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairingOutcome {
    pub pairs: Vec<Pair>,
    pub unmatched_references: Vec<usize>,
    pub unmatched_targets: Vec<usize>,
}

impl PairingOutcome {
    /// `(reference, target)` index tuples in pairing order.
    pub fn index_pairs(&self) -> Vec<(usize, usize)> {
        self.pairs.iter().map(|p| (p.reference, p.target)).collect()
    }
}

/// Aligned file lists consumed by the comparison tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryPairs {
    pub references: Vec<String>,
    pub targets: Vec<String>,
}

impl CategoryPairs {
    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// Items of one side grouped by bucket, in first-appearance order.
struct Buckets {
    order: Vec<BucketKey>,
    members: HashMap<BucketKey, Vec<usize>>,
}

impl Buckets {
    fn build(items: &[Item], by_run: bool) -> Result<Self> {
        let mut order = Vec::new();
        let mut members: HashMap<BucketKey, Vec<usize>> = HashMap::new();

        for (index, item) in items.iter().enumerate() {
            if !is_eligible(item) {
                continue;
            }
            let key = DqmFileName::parse(&item.file_name)?.bucket_key(by_run);
            let entry = members.entry(key.clone()).or_default();
            if entry.is_empty() {
                order.push(key);
            }
            entry.push(index);
        }

        Ok(Self { order, members })
    }

    fn get(&self, key: &BucketKey) -> &[usize] {
        self.members.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn is_eligible(item: &Item) -> bool {
    item.has_file() && !item.status.is_failure()
}

/// Pairing engine with an injectable similarity function.
pub struct PairingEngine<F = fn(&str, &str) -> f64> {
    scorer: F,
}

impl PairingEngine {
    pub fn new() -> Self {
        Self {
            scorer: similarity_ratio,
        }
    }
}

impl Default for PairingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> PairingEngine<F>
where
    F: Fn(&str, &str) -> f64,
{
    pub fn with_scorer(scorer: F) -> Self {
        Self { scorer }
    }

    /// Pair by dataset bucket, then by greedy similarity where a bucket holds
    /// more than one candidate on either side.
    pub fn pair_automatic(
        &self,
        references: &[Item],
        targets: &[Item],
        by_run: bool,
    ) -> Result<PairingOutcome> {
        let reference_buckets = Buckets::build(references, by_run)?;
        let target_buckets = Buckets::build(targets, by_run)?;

        let mut used_references = vec![false; references.len()];
        let mut used_targets = vec![false; targets.len()];
        let mut pairs = Vec::new();

        for key in &reference_buckets.order {
            let bucket_references = reference_buckets.get(key);
            let bucket_targets = target_buckets.get(key);

            if let ([reference], [target]) = (bucket_references, bucket_targets) {
                tracing::debug!(dataset = %key.dataset, run = %key.run, "single candidate pair");
                used_references[*reference] = true;
                used_targets[*target] = true;
                pairs.push(Pair {
                    reference: *reference,
                    target: *target,
                    similarity: None,
                });
                continue;
            }

            let mut scored = Vec::with_capacity(bucket_references.len() * bucket_targets.len());
            for &reference in bucket_references {
                let reference_key = canonical(&references[reference])?;
                for &target in bucket_targets {
                    let ratio = (self.scorer)(&reference_key, &canonical(&targets[target])?);
                    tracing::debug!(reference = %reference_key, target, ratio, "similarity");
                    scored.push((reference, target, ratio));
                }
            }

            // Stable: equal ratios keep reference-major input order.
            scored.sort_by(|a, b| b.2.total_cmp(&a.2));

            for (reference, target, ratio) in scored {
                if used_references[reference] || used_targets[target] {
                    continue;
                }
                used_references[reference] = true;
                used_targets[target] = true;
                pairs.push(Pair {
                    reference,
                    target,
                    similarity: Some(ratio),
                });
            }
        }

        Ok(PairingOutcome {
            pairs,
            unmatched_references: unused(&used_references),
            unmatched_targets: unused(&used_targets),
        })
    }

    /// Pair by index; positions where either side has no file are dropped.
    pub fn pair_positional(&self, references: &[Item], targets: &[Item]) -> PairingOutcome {
        let mut outcome = PairingOutcome::default();

        for (index, (reference, target)) in references.iter().zip(targets).enumerate() {
            if !reference.has_file() {
                tracing::error!(item = %reference.name, "downloaded file name is missing, will not compare");
            }
            if !target.has_file() {
                tracing::error!(item = %target.name, "downloaded file name is missing, will not compare");
            }
            if reference.has_file() && target.has_file() {
                outcome.pairs.push(Pair {
                    reference: index,
                    target: index,
                    similarity: None,
                });
            } else {
                outcome.unmatched_references.push(index);
                outcome.unmatched_targets.push(index);
            }
        }

        let paired = references.len().min(targets.len());
        outcome.unmatched_references.extend(paired..references.len());
        outcome.unmatched_targets.extend(paired..targets.len());
        outcome
    }

    /// Pair a whole category and mark unmatched downloaded items as `no_match`.
    pub fn pair_category(&self, category: &mut Category) -> Result<CategoryPairs> {
        let outcome = if category.automatic_pairing {
            tracing::info!(category = %category.name, "automatic pairing");
            let outcome =
                self.pair_automatic(&category.reference, &category.target, category.is_data())?;
            mark_no_match(&mut category.reference, &outcome.unmatched_references);
            mark_no_match(&mut category.target, &outcome.unmatched_targets);
            outcome
        } else {
            self.pair_positional(&category.reference, &category.target)
        };

        let mut pairs = CategoryPairs::default();
        for pair in &outcome.pairs {
            pairs
                .references
                .push(category.reference[pair.reference].file_name.clone());
            pairs
                .targets
                .push(category.target[pair.target].file_name.clone());
        }

        tracing::info!(category = %category.name, pairs = pairs.len(), "pairing finished");
        Ok(pairs)
    }
}

fn canonical(item: &Item) -> Result<String> {
    Ok(DqmFileName::parse(&item.file_name)?.canonical())
}

fn unused(used: &[bool]) -> Vec<usize> {
    used.iter()
        .enumerate()
        .filter_map(|(index, used)| (!used).then_some(index))
        .collect()
}

fn mark_no_match(items: &mut [Item], unmatched: &[usize]) {
    for &index in unmatched {
        let item = &mut items[index];
        if item.status == ItemStatus::Downloaded {
            tracing::debug!(item = %item.name, "no match");
            item.status = ItemStatus::NoMatch;
        }
    }
}
