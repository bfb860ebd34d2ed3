use log::{info, warn};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};

use libhhpair::align::PickStrategy;
use libhhpair::structs::{Alignment, Hit, Profile};
use libhhpair::{AlignError, AlignmentConfig};

use crate::args::{AlignMode, HhpairArgs};

/// Everything one query-template comparison reported.
pub struct PairResult {
    pub query_idx: usize,
    pub template_idx: usize,
    pub alignments: Vec<Alignment>,
}

/// What a comparison should produce, detached from the command line.
#[derive(Clone, Debug)]
pub struct PairPlan {
    pub mode: AlignMode,
    pub repeats: usize,
    pub samples: usize,
    pub seed: u64,
}

impl From<&HhpairArgs> for PairPlan {
    fn from(args: &HhpairArgs) -> Self {
        Self {
            mode: args.mode,
            repeats: args.repeats.max(1),
            samples: args.samples,
            seed: args.seed,
        }
    }
}

/// Aligns one query against one template.
///
/// Repeats stop early once a backtrace comes back empty. A profile
/// compared against a profile with the same name is treated as a self
/// comparison.
pub fn align_pair(
    query: &Profile,
    template: &Profile,
    config: &AlignmentConfig,
    plan: &PairPlan,
    pair_seed: u64,
) -> Result<Vec<Alignment>, AlignError> {
    let self_comparison = query.name == template.name;
    let mut hit = Hit::new(query, template, self_comparison, config)?;
    let mut alignments = vec![];

    match plan.mode {
        AlignMode::Viterbi => {
            for _ in 0..plan.repeats {
                hit.viterbi(config)?;
                let alignment = hit.viterbi_traceback(config)?;
                if alignment.is_empty() {
                    break;
                }
                alignments.push(alignment);
                hit.next_repeat();
            }
        }
        AlignMode::Mac => {
            hit.forward(config)?;
            hit.backward(config)?;
            for _ in 0..plan.repeats {
                hit.maximum_accuracy(config)?;
                let alignment = hit.mac_traceback(config)?;
                if alignment.is_empty() {
                    break;
                }
                alignments.push(alignment);
                hit.next_repeat();
            }
        }
        AlignMode::Stochastic => {
            hit.forward(config)?;
            let mut rng = Pcg64::seed_from_u64(pair_seed);
            for _ in 0..plan.samples {
                let alignment = hit.stochastic_traceback(config, PickStrategy::Sample, &mut rng)?;
                if !alignment.is_empty() {
                    alignments.push(alignment);
                }
            }
        }
    }

    hit.release_matrices();
    Ok(alignments)
}

/// Aligns every query against every template in parallel.
///
/// A pair that fails is logged and skipped so that one bad template does
/// not sink the whole run.
pub fn align_all(
    queries: &[Profile],
    templates: &[Profile],
    config: &AlignmentConfig,
    plan: &PairPlan,
) -> Vec<PairResult> {
    let pairs: Vec<(usize, usize)> = (0..queries.len())
        .flat_map(|query_idx| {
            (0..templates.len()).map(move |template_idx| (query_idx, template_idx))
        })
        .collect();

    info!(
        "aligning {} queries against {} templates ({:?})",
        queries.len(),
        templates.len(),
        plan.mode
    );

    let results: Vec<PairResult> = pairs
        .par_iter()
        .enumerate()
        .filter_map(|(pair_idx, &(query_idx, template_idx))| {
            let query = &queries[query_idx];
            let template = &templates[template_idx];
            let pair_seed = plan.seed ^ pair_idx as u64;

            match align_pair(query, template, config, plan, pair_seed) {
                Ok(alignments) => Some(PairResult {
                    query_idx,
                    template_idx,
                    alignments,
                }),
                Err(err) => {
                    warn!("{} x {}: {err}", query.name, template.name);
                    None
                }
            }
        })
        .collect();

    info!(
        "{} alignments from {} pairs",
        results.iter().map(|r| r.alignments.len()).sum::<usize>(),
        results.len()
    );

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::read_profiles;
    use crate::io::test_files::*;
    use libhhpair::structs::BacktraceMode;
    use libhhpair::AlignmentConfigBuilder;
    use serde_json::json;

    fn plan(mode: AlignMode, repeats: usize) -> PairPlan {
        PairPlan {
            mode,
            repeats,
            samples: 5,
            seed: 11,
        }
    }

    fn load(value: serde_json::Value) -> anyhow::Result<Vec<Profile>> {
        let file = write_json(&value)?;
        read_profiles(file.path())
    }

    #[test]
    fn test_align_pair_modes() -> anyhow::Result<()> {
        let profiles = load(json!([
            profile_json("q", &[0, 1, 2, 3, 0, 1, 2, 3]),
            profile_json("t", &[3, 3, 0, 1, 2, 3, 0, 1, 2, 3, 2]),
        ]))?;
        let config = AlignmentConfigBuilder::default().shift(1.0).build()?;

        let viterbi = align_pair(
            &profiles[0],
            &profiles[1],
            &config,
            &plan(AlignMode::Viterbi, 1),
            0,
        )?;
        assert_eq!(viterbi.len(), 1);
        assert_eq!(viterbi[0].mode, BacktraceMode::Viterbi);
        assert!(viterbi[0].score > 0.0);

        let mac = align_pair(
            &profiles[0],
            &profiles[1],
            &config,
            &plan(AlignMode::Mac, 1),
            0,
        )?;
        assert_eq!(mac.len(), 1);
        assert!(mac[0].sum_of_probs.is_some());

        let sampled = align_pair(
            &profiles[0],
            &profiles[1],
            &config,
            &plan(AlignMode::Stochastic, 1),
            3,
        )?;
        assert_eq!(sampled.len(), 5);
        assert!(sampled.iter().all(|a| a.mode == BacktraceMode::Stochastic));
        Ok(())
    }

    #[test]
    fn test_repeats_are_numbered() -> anyhow::Result<()> {
        let profiles = load(json!([
            profile_json("q", &[0, 1, 2, 3, 0, 1]),
            profile_json("t", &[0, 1, 2, 3, 0, 1, 3, 3, 2, 2, 2, 0, 1, 2, 3, 0, 1]),
        ]))?;
        let config = AlignmentConfigBuilder::default().shift(0.5).build()?;

        let alignments = align_pair(
            &profiles[0],
            &profiles[1],
            &config,
            &plan(AlignMode::Viterbi, 3),
            0,
        )?;
        assert!(alignments.len() >= 2);
        for (idx, alignment) in alignments.iter().enumerate() {
            assert_eq!(alignment.repeat_idx, idx);
        }
        Ok(())
    }

    #[test]
    fn test_align_all_skips_failed_pairs() -> anyhow::Result<()> {
        let queries = load(json!([profile_json("q", &[0, 1, 2, 3])]))?;
        let mut templates = load(json!([profile_json("t", &[0, 1, 2, 3, 1])]))?;

        let mut other = profile_json("wide", &[0, 1]);
        other["emissions"] = json!(vec![vec![0.2; 5]; 2]);
        templates.extend(load(other)?);

        let config = AlignmentConfig::default();
        let results = align_all(&queries, &templates, &config, &plan(AlignMode::Viterbi, 1));

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].template_idx, 0);
        Ok(())
    }

    #[test]
    fn test_stochastic_is_reproducible() -> anyhow::Result<()> {
        let profiles = load(json!([
            profile_json("q", &[0, 1, 2, 3, 0]),
            profile_json("t", &[1, 0, 1, 2, 3, 0, 2]),
        ]))?;
        let config = AlignmentConfig::default();
        let plan = plan(AlignMode::Stochastic, 1);

        let first = align_pair(&profiles[0], &profiles[1], &config, &plan, 99)?;
        let second = align_pair(&profiles[0], &profiles[1], &config, &plan, 99)?;
        let first: Vec<_> = first.iter().map(|a| a.steps.clone()).collect();
        let second: Vec<_> = second.iter().map(|a| a.steps.clone()).collect();
        assert_eq!(first, second);
        Ok(())
    }
}
