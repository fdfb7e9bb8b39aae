//! Attack path search.
//!
//! Breadth-first over partial paths, one layer per hop. Each partial path
//! carries its own object list, so an object may appear on many paths but
//! never twice on one; together with the depth bound that guarantees
//! termination. Probabilities are computed per hop as the path reaches it,
//! because calculators depend on the concrete endpoints.

use std::time::Instant;

use hashbrown::HashSet;

use super::{resolve_all, Bounds, EmptyReason, InformativeEdge, PathOutcome, PathRequest, Truncation};
use crate::config::EngineConfig;
use crate::model::{AttackPath, Direction, EdgeBitmap, ObjectId, PathHop};
use crate::objects::Objects;
use crate::probability::{self, Probability};
use crate::registry::EdgeCatalog;
use crate::Result;

/// A path still being extended.
#[derive(Clone)]
struct Partial {
    hops: Vec<PathHop>,
    tip: ObjectId,
    score: Probability,
}

impl Partial {
    fn start(id: ObjectId) -> Self {
        Self { hops: Vec::new(), tip: id, score: Probability::MAX }
    }

    fn visits(&self, id: ObjectId) -> bool {
        self.tip == id || self.hops.iter().any(|h| h.object == id)
    }

    fn extend(&self, next: ObjectId, kinds: EdgeBitmap, probability: Probability) -> Self {
        let mut hops = self.hops.clone();
        hops.push(PathHop { object: self.tip, kinds, probability });
        Self { hops, tip: next, score: self.score.min(probability) }
    }

    fn finish(self) -> AttackPath {
        AttackPath { hops: self.hops, target: self.tip, score: self.score }
    }
}

/// Find and rank attack paths from `request.start` to `request.target`.
///
/// Hops only follow non-informative kinds from the filter. A path ends at
/// the first target it reaches. When the deadline passes or the
/// exploration budget runs out the best paths found so far are returned
/// with [`PathOutcome::truncated`] set.
#[tracing::instrument(skip_all, fields(objects = objects.len()))]
pub fn find_paths(
    objects: &Objects,
    catalog: &EdgeCatalog,
    config: &EngineConfig,
    request: &PathRequest,
) -> Result<PathOutcome> {
    let bounds = request.bounds(config)?;
    let started = Instant::now();

    let starts = resolve_all(&request.start, objects);
    if starts.is_empty() {
        tracing::debug!("no start objects");
        return Ok(PathOutcome::empty(EmptyReason::UnknownStart));
    }
    let targets: HashSet<ObjectId> = resolve_all(&request.target, objects).into_iter().collect();
    if targets.is_empty() {
        tracing::debug!("no target objects");
        return Ok(PathOutcome::empty(EmptyReason::UnknownTarget));
    }

    let filter = match request.edge_mask {
        Some(mask) if mask.is_empty() => catalog.all_mask(),
        Some(mask) => mask,
        None if request.edge_kinds.is_empty() => catalog.all_mask(),
        None => match catalog.mask_of(&request.edge_kinds) {
            Ok(mask) => mask,
            Err(name) => return Ok(PathOutcome::empty(EmptyReason::UnknownEdgeKind { name })),
        },
    };
    let traversable = filter.difference(&catalog.informative_mask());
    if traversable.is_empty() {
        return Ok(PathOutcome::empty(EmptyReason::NoTraversableEdges));
    }

    let mut outcome = search(objects, catalog, &bounds, started, &starts, &targets, traversable);
    rank(&mut outcome.paths, bounds.max_paths);

    if request.include_informative {
        outcome.informative_edges = informative_edges(objects, catalog, &outcome.paths);
    }

    tracing::info!(
        starts = starts.len(),
        targets = targets.len(),
        paths = outcome.paths.len(),
        explored = outcome.explored,
        truncated = ?outcome.truncated,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "path query finished"
    );
    Ok(outcome)
}

fn search(
    objects: &Objects,
    catalog: &EdgeCatalog,
    bounds: &Bounds,
    started: Instant,
    starts: &[ObjectId],
    targets: &HashSet<ObjectId>,
    traversable: EdgeBitmap,
) -> PathOutcome {
    let min = Probability::new(bounds.min_probability);
    let mut outcome = PathOutcome::default();
    let mut queue: Vec<Partial> = starts.iter().map(|id| Partial::start(*id)).collect();

    'layers: for depth in 0..bounds.max_depth {
        let mut next_queue = Vec::new();

        for partial in &queue {
            if bounds.deadline.is_some_and(|d| started.elapsed() >= d) {
                outcome.truncated = Some(Truncation::Deadline);
                break 'layers;
            }
            let Some(edges) = objects.edges(partial.tip, Direction::Outgoing, traversable) else {
                continue;
            };

            for (next, kinds) in edges {
                if partial.visits(next) {
                    continue;
                }
                let p = probability::evaluate(catalog, objects, partial.tip, next, kinds);
                if p < min {
                    continue;
                }
                if outcome.explored >= bounds.budget {
                    outcome.truncated = Some(Truncation::Budget);
                    break 'layers;
                }
                outcome.explored += 1;

                let extended = partial.extend(next, kinds, p);
                if targets.contains(&next) {
                    outcome.paths.push(extended.finish());
                } else if depth + 1 < bounds.max_depth {
                    next_queue.push(extended);
                }
            }
        }

        queue = next_queue;
        if queue.is_empty() {
            break;
        }
    }
    outcome
}

/// Best score first, then fewer hops; the stable sort keeps discovery
/// order among equals.
fn rank(paths: &mut Vec<AttackPath>, max_paths: usize) {
    paths.sort_by(|a, b| b.score.cmp(&a.score).then(a.len().cmp(&b.len())));
    paths.truncate(max_paths);
}

fn informative_edges(objects: &Objects, catalog: &EdgeCatalog, paths: &[AttackPath]) -> Vec<InformativeEdge> {
    let informative = catalog.informative_mask();
    if informative.is_empty() {
        return Vec::new();
    }
    let mut on_paths: Vec<ObjectId> = paths.iter().flat_map(|p| p.objects()).collect();
    on_paths.sort();
    on_paths.dedup();
    let members: HashSet<ObjectId> = on_paths.iter().copied().collect();

    let mut found = Vec::new();
    for source in &on_paths {
        let Some(edges) = objects.edges(*source, Direction::Outgoing, informative) else {
            continue;
        };
        for (target, kinds) in edges {
            if members.contains(&target) {
                found.push(InformativeEdge { source: *source, target, kinds });
            }
        }
    }
    found
}
