//! Exhaustive scan used by `brute_force` and `seq_search`.
//!
//! Exact by construction: every stored point is compared with the query.
//! `seq_search` can split a single query's scan over several workers.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::Point;
use crate::params::ParamMap;
use crate::Result;

use super::{top_k, Candidate, Corpus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanIndex {
    multi_thread: bool,
    thread_qty: usize,
}

impl ScanIndex {
    /// Single-threaded scan per query.
    pub fn exhaustive() -> Self {
        Self {
            multi_thread: false,
            thread_qty: 1,
        }
    }

    /// `threadQty` workers per query when `multiThread` is set.
    pub fn from_params(params: &ParamMap) -> Result<Self> {
        let thread_qty = params.get_usize("threadQty")?.unwrap_or(1).max(1);
        let multi_thread = params.get_bool("multiThread")?.unwrap_or(thread_qty > 1);
        Ok(Self {
            multi_thread,
            thread_qty,
        })
    }

    pub fn search(&self, corpus: Corpus<'_>, query: Point<'_>, k: usize) -> Vec<Candidate> {
        let n = corpus.len();
        if self.multi_thread && self.thread_qty > 1 && n > self.thread_qty {
            let chunk = n.div_ceil(self.thread_qty);
            let partial: Vec<Vec<Candidate>> = (0..n)
                .into_par_iter()
                .chunks(chunk)
                .map(|ids| {
                    top_k(
                        ids.into_iter().map(|i| Candidate::new(i, corpus.to(query, i))),
                        k,
                    )
                })
                .collect();
            return top_k(partial.into_iter().flatten(), k);
        }

        top_k((0..n).map(|i| Candidate::new(i, corpus.to(query, i))), k)
    }
}
