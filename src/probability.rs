//! # Edge probabilities
//!
//! Every edge kind may carry a [`Calculator`] estimating how exploitable a
//! specific edge instance is, from 0 to 100. Kinds without one are fully
//! trusted (100).
//!
//! ## Non-recursion
//!
//! A calculator must never cause another edge's probability to be
//! computed: a calculator that walks neighbouring edges and asks for their
//! probability can recurse forever once two such calculators look at each
//! other. This is enforced structurally. Calculators receive a
//! [`GraphView`] (attribute reads and raw adjacency bitmasks) and nothing
//! else; the only dispatch point, [`evaluate`], needs an
//! [`EdgeCatalog`] that a view cannot reach. A calculator that cannot
//! decide without wider context returns `None` and gets its floor.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{AttributeValues, Direction, EdgeBitmap, Edges, Object, ObjectId};
use crate::objects::Objects;
use crate::registry::{Attribute, EdgeCatalog, EdgeKind};

/// Exploitability in percent, always within `0..=100`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Probability(u8);

impl Probability {
    pub const ZERO: Probability = Probability(0);
    pub const MAX: Probability = Probability(100);

    /// Clamp into range.
    pub fn new(percent: u8) -> Self {
        Probability(percent.min(100))
    }

    pub fn from_i64(percent: i64) -> Self {
        Probability(percent.clamp(0, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

// ============================================================================
// Read-only view handed to calculators
// ============================================================================

/// What a calculator may see: objects, attributes and raw adjacency.
#[derive(Clone, Copy)]
pub struct GraphView<'a> {
    objects: &'a Objects,
}

impl<'a> GraphView<'a> {
    pub(crate) fn new(objects: &'a Objects) -> Self {
        Self { objects }
    }

    pub fn object(&self, id: ObjectId) -> Option<&'a Object> {
        self.objects.get(id)
    }

    pub fn attribute(&self, id: ObjectId, attr: Attribute) -> Option<&'a AttributeValues> {
        self.objects.get(id)?.get(attr)
    }

    /// Raw adjacency, filtered by kind. Yields bitmasks, never probabilities.
    pub fn edges(&self, id: ObjectId, dir: Direction, filter: EdgeBitmap) -> Option<Edges<'a>> {
        self.objects.get(id).map(|o| o.edges(dir, filter))
    }
}

// ============================================================================
// Calculators
// ============================================================================

/// Plugin calculator.
pub trait ProbabilityCalculator: Send + Sync {
    /// Short name shown in the edge catalog.
    fn name(&self) -> &str;

    /// `None` means "cannot tell"; the caller substitutes the floor.
    fn probability(&self, view: &GraphView<'_>, source: ObjectId, target: ObjectId) -> Option<Probability>;
}

/// Strategy attached to an edge kind.
#[derive(Clone)]
pub enum Calculator {
    /// Same probability for every instance.
    Fixed(Probability),
    /// Instance-specific, with a floor used when the plugin returns `None`.
    Plugin {
        calculator: Arc<dyn ProbabilityCalculator>,
        floor: Probability,
    },
}

impl Calculator {
    pub fn fixed(percent: u8) -> Self {
        Calculator::Fixed(Probability::new(percent))
    }

    pub fn plugin(calculator: impl ProbabilityCalculator + 'static, floor: u8) -> Self {
        Calculator::Plugin { calculator: Arc::new(calculator), floor: Probability::new(floor) }
    }

    /// Display label for catalogs.
    pub fn describe(&self) -> String {
        match self {
            Calculator::Fixed(p) => format!("fixed {p}"),
            Calculator::Plugin { calculator, floor } => {
                format!("{} (floor {floor})", calculator.name())
            }
        }
    }

    fn compute(&self, view: &GraphView<'_>, source: ObjectId, target: ObjectId) -> Probability {
        match self {
            Calculator::Fixed(p) => *p,
            Calculator::Plugin { calculator, floor } => calculator
                .probability(view, source, target)
                .map(|p| Probability::new(p.value()))
                .unwrap_or(*floor),
        }
    }
}

impl PartialEq for Calculator {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Calculator::Fixed(a), Calculator::Fixed(b)) => a == b,
            (
                Calculator::Plugin { calculator: a, floor: fa },
                Calculator::Plugin { calculator: b, floor: fb },
            ) => Arc::ptr_eq(a, b) && fa == fb,
            _ => false,
        }
    }
}

impl Eq for Calculator {}

impl fmt::Debug for Calculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Probability of one kind on the edge `source → target`.
pub fn kind_probability(
    catalog: &EdgeCatalog,
    objects: &Objects,
    kind: EdgeKind,
    source: ObjectId,
    target: ObjectId,
) -> Probability {
    let Some(descriptor) = catalog.descriptor(kind) else {
        return Probability::MAX;
    };
    if descriptor.is_informative() {
        return Probability::ZERO;
    }
    match &descriptor.calculator {
        None => Probability::MAX,
        Some(calc) => calc.compute(&GraphView::new(objects), source, target),
    }
}

/// Probability of an edge carrying `kinds`: the best non-informative kind.
/// Edges with only informative kinds score zero.
pub fn evaluate(
    catalog: &EdgeCatalog,
    objects: &Objects,
    source: ObjectId,
    target: ObjectId,
    kinds: EdgeBitmap,
) -> Probability {
    kinds
        .difference(&catalog.informative_mask())
        .iter()
        .map(|kind| kind_probability(catalog, objects, kind, source, target))
        .max()
        .unwrap_or(Probability::ZERO)
}
