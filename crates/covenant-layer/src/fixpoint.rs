use std::collections::VecDeque;

use covenant_ir::{Apc, BlockId, Cfg, HasTop, Lattice, Successor};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::{AbstractValue, AnalysisDivergence, CodeLayer, Decoder, Operation, WideningStrategy};

/// Default iteration budget of a fixpoint run.
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// A forward dataflow analysis over the operations of one layer.
///
/// States are the abstract states *before* the operation at a point.
pub trait ForwardAnalysis<V> {
    type State: AbstractValue + HasTop + Clone;

    /// State after `op` executes in `state`.
    fn transfer(&mut self, apc: &Apc, op: &Operation<V>, state: &Self::State) -> Self::State;

    /// Specialize the state leaving `op` to the edge reaching `to`. That is
    /// the post-state of `op`, or the state before it when `to` is reached
    /// by raising an exception. A bottom result marks the edge infeasible.
    fn refine(
        &mut self,
        _from: &Apc,
        _op: &Operation<V>,
        _to: &Successor,
        state: Self::State,
    ) -> Self::State {
        state
    }

    fn join(&mut self, _at: &Apc, current: &Self::State, incoming: &Self::State) -> Self::State {
        current.join(incoming)
    }

    fn widen(&mut self, _at: &Apc, current: &Self::State, incoming: &Self::State) -> Self::State {
        current.widen(incoming)
    }
}

/// A prepared, not yet started, fixpoint computation.
pub struct FixpointRunner<'l, D, A> {
    layer: &'l CodeLayer<D>,
    analysis: A,
    max_iterations: usize,
    widening: WideningStrategy,
}

impl<'l, D, A> FixpointRunner<'l, D, A>
where
    D: Decoder,
    A: ForwardAnalysis<D::Variable>,
{
    pub(crate) fn new(layer: &'l CodeLayer<D>, analysis: A) -> Self {
        Self {
            layer,
            analysis,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            widening: WideningStrategy::default(),
        }
    }

    /// Number of worklist steps before the run gives up and widens the
    /// remaining points to top.
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn widening(mut self, widening: WideningStrategy) -> Self {
        self.widening = widening;
        self
    }

    /// Run the worklist loop from the method entry in `initial`.
    pub fn run(self, initial: A::State) -> FixpointResult<A, A::State> {
        let Self {
            layer,
            mut analysis,
            max_iterations,
            widening,
        } = self;
        let cfg = layer.cfg();
        let loop_heads = cfg.back_edge_targets();
        let mut states: FxHashMap<Apc, A::State> = FxHashMap::default();
        let mut visits: FxHashMap<Apc, usize> = FxHashMap::default();
        let mut worklist = VecDeque::new();
        let mut queued = FxHashSet::default();

        let entry = cfg.entry_point();
        if !initial.is_bottom() {
            states.insert(entry.clone(), initial);
            queued.insert(entry.clone());
            worklist.push_back(entry);
        }

        let mut iterations = 0;
        let mut divergence = None;
        while let Some(apc) = worklist.pop_front() {
            if iterations == max_iterations {
                worklist.push_front(apc);
                let forced = force_top(cfg, &mut states, worklist);
                let err = AnalysisDivergence {
                    method: cfg.method(),
                    layer: layer.name(),
                    budget: max_iterations,
                    forced,
                };
                log::warn!("{err}");
                divergence = Some(err);
                break;
            }
            iterations += 1;
            queued.remove(&apc);

            let Some(state) = states.get(&apc).cloned() else {
                continue;
            };
            let Some(op) = layer.decode(&apc) else {
                continue;
            };
            let post = analysis.transfer(&apc, &op, &state);
            for succ in cfg.successors(&apc) {
                let leaving = if succ.is_exceptional() { &state } else { &post };
                if leaving.is_bottom() {
                    continue;
                }
                let out = analysis.refine(&apc, &op, &succ, leaving.clone());
                if out.is_bottom() {
                    log::trace!("edge {apc} -> {} is infeasible", succ.apc);
                    continue;
                }
                let merged = match states.get(&succ.apc) {
                    None => Some(out),
                    Some(current) => {
                        let count = visits.entry(succ.apc.clone()).or_insert(0);
                        *count += 1;
                        let at_loop_head =
                            succ.apc.index == 0 && loop_heads.contains(&succ.apc.block);
                        let merged = if at_loop_head && widening.should_widen(*count) {
                            analysis.widen(&succ.apc, current, &out)
                        } else {
                            analysis.join(&succ.apc, current, &out)
                        };
                        let changed =
                            !merged.is_subseteq(current) || !current.is_subseteq(&merged);
                        changed.then_some(merged)
                    }
                };
                if let Some(merged) = merged {
                    states.insert(succ.apc.clone(), merged);
                    if queued.insert(succ.apc.clone()) {
                        worklist.push_back(succ.apc);
                    }
                }
            }
        }

        log::debug!(
            "{} fixpoint of {}: {iterations} iterations, {} points",
            layer.name(),
            cfg.method(),
            states.len()
        );
        FixpointResult::new(analysis, states, divergence, iterations)
    }
}

/// Set every point reachable from `pending` to top. Returns the number of
/// points forced.
fn force_top<S: HasTop>(
    cfg: &Cfg,
    states: &mut FxHashMap<Apc, S>,
    pending: VecDeque<Apc>,
) -> usize {
    let mut seen: FxHashSet<Apc> = pending.iter().cloned().collect();
    let mut queue = pending;
    while let Some(apc) = queue.pop_front() {
        for succ in cfg.successors(&apc) {
            if seen.insert(succ.apc.clone()) {
                queue.push_back(succ.apc);
            }
        }
        states.insert(apc, S::top());
    }
    seen.len()
}

/// States computed by a fixpoint run, keyed by program point, together
/// with the analysis that produced them.
pub struct FixpointResult<A, S> {
    analysis: A,
    states: FxHashMap<Apc, S>,
    by_point: FxHashMap<(BlockId, u32), SmallVec<[Apc; 1]>>,
    divergence: Option<AnalysisDivergence>,
    iterations: usize,
}

impl<A, S: Lattice + Clone> FixpointResult<A, S> {
    fn new(
        analysis: A,
        states: FxHashMap<Apc, S>,
        divergence: Option<AnalysisDivergence>,
        iterations: usize,
    ) -> Self {
        let mut by_point: FxHashMap<_, SmallVec<[Apc; 1]>> = FxHashMap::default();
        for apc in states.keys() {
            by_point
                .entry((apc.block, apc.index))
                .or_default()
                .push(apc.clone());
        }
        Self {
            analysis,
            states,
            by_point,
            divergence,
            iterations,
        }
    }

    pub fn analysis(&self) -> &A {
        &self.analysis
    }

    pub fn analysis_mut(&mut self) -> &mut A {
        &mut self.analysis
    }

    /// State recorded at exactly `apc`.
    pub fn exact(&self, apc: &Apc) -> Option<&S> {
        self.states.get(apc)
    }

    /// State at `apc`. A point asked for in the root context that was only
    /// reached inside handler subroutines answers with the join over every
    /// context it was reached in.
    pub fn state(&self, apc: &Apc) -> Option<S> {
        if let Some(state) = self.states.get(apc) {
            return Some(state.clone());
        }
        if !apc.context.is_root() {
            return None;
        }
        self.by_point
            .get(&(apc.block, apc.index))?
            .iter()
            .filter_map(|p| self.states.get(p))
            .fold(None, |acc: Option<S>, s| match acc {
                None => Some(s.clone()),
                Some(acc) => Some(acc.join(s)),
            })
    }

    /// Points with a recorded state, in unspecified order.
    pub fn points(&self) -> impl Iterator<Item = &Apc> {
        self.states.keys()
    }

    pub fn contexts_at(&self, block: BlockId, index: u32) -> &[Apc] {
        self.by_point
            .get(&(block, index))
            .map(|apcs| apcs.as_slice())
            .unwrap_or(&[])
    }

    pub fn divergence(&self) -> Option<&AnalysisDivergence> {
        self.divergence.as_ref()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }
}
