//! Bill-of-materials requirement resolution.
//!
//! Kitting uses [`resolve_requirements`], a single-level expansion of an
//! assembly's direct BOM lines. [`explode`] is a separate multi-level resolver
//! that walks sub-assemblies down to purchased parts; it is read-only and
//! rejects cyclic BOM graphs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use forgemrp_core::{DomainError, DomainResult, PartKey, Quantity};

/// Deepest sub-assembly nesting [`explode`] will follow.
pub const MAX_BOM_DEPTH: usize = 32;

/// `qty_per` units of `child` go into one unit of `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomLine {
    parent: PartKey,
    child: PartKey,
    qty_per: Quantity,
}

impl BomLine {
    pub fn new(parent: PartKey, child: PartKey, qty_per: Quantity) -> DomainResult<Self> {
        if parent == child {
            return Err(DomainError::validation(format!(
                "part {parent} cannot be a component of itself"
            )));
        }
        if qty_per.is_zero() {
            return Err(DomainError::validation("qty_per must be greater than zero"));
        }
        Ok(Self {
            parent,
            child,
            qty_per,
        })
    }

    pub fn parent(&self) -> &PartKey {
        &self.parent
    }

    pub fn child(&self) -> &PartKey {
        &self.child
    }

    pub fn qty_per(&self) -> Quantity {
        self.qty_per
    }
}

/// Quantity of one component needed to build an assembly quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub component: PartKey,
    pub required: Quantity,
}

/// Single-level expansion: `required = build_qty × qty_per` for every direct
/// line of `assembly`, sorted by component key.
///
/// An assembly without lines yields an empty list (kitting then trivially
/// succeeds). Lines for other parents are ignored; repeated children are summed.
pub fn resolve_requirements(
    assembly: &PartKey,
    lines: &[BomLine],
    build_qty: Quantity,
) -> DomainResult<Vec<Requirement>> {
    let mut totals: BTreeMap<PartKey, Quantity> = BTreeMap::new();
    for line in lines.iter().filter(|l| l.parent() == assembly) {
        let required = build_qty.scaled(line.qty_per())?;
        let entry = totals.entry(line.child().clone()).or_insert(Quantity::ZERO);
        *entry = entry.checked_add(required)?;
    }

    Ok(totals
        .into_iter()
        .map(|(component, required)| Requirement {
            component,
            required,
        })
        .collect())
}

/// Read-only access to BOM lines by parent part.
pub trait BomSource {
    fn lines_for(&self, parent: &PartKey) -> Vec<BomLine>;
}

/// In-memory BOM graph, indexed by parent.
#[derive(Debug, Clone, Default)]
pub struct BomIndex {
    by_parent: BTreeMap<PartKey, Vec<BomLine>>,
}

impl BomIndex {
    pub fn from_lines(lines: impl IntoIterator<Item = BomLine>) -> Self {
        let mut by_parent: BTreeMap<PartKey, Vec<BomLine>> = BTreeMap::new();
        for line in lines {
            by_parent.entry(line.parent().clone()).or_default().push(line);
        }
        Self { by_parent }
    }
}

impl BomSource for BomIndex {
    fn lines_for(&self, parent: &PartKey) -> Vec<BomLine> {
        self.by_parent.get(parent).cloned().unwrap_or_default()
    }
}

/// Multi-level explosion down to leaf components (parts with no BOM of their
/// own), aggregating demand for parts reached along several paths.
///
/// Fails with an invariant violation if the graph below `assembly` contains a
/// cycle or nests deeper than [`MAX_BOM_DEPTH`].
pub fn explode(
    assembly: &PartKey,
    build_qty: Quantity,
    source: &impl BomSource,
) -> DomainResult<Vec<Requirement>> {
    let mut totals: BTreeMap<PartKey, Quantity> = BTreeMap::new();
    let mut path = vec![assembly.clone()];
    walk(assembly, build_qty, source, &mut path, &mut totals)?;

    Ok(totals
        .into_iter()
        .map(|(component, required)| Requirement {
            component,
            required,
        })
        .collect())
}

fn walk(
    parent: &PartKey,
    qty: Quantity,
    source: &impl BomSource,
    path: &mut Vec<PartKey>,
    totals: &mut BTreeMap<PartKey, Quantity>,
) -> DomainResult<()> {
    for line in source.lines_for(parent) {
        let child = line.child();
        if path.contains(child) {
            let cycle = path
                .iter()
                .map(PartKey::as_str)
                .chain(core::iter::once(child.as_str()))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(DomainError::invariant(format!("bom cycle: {cycle}")));
        }
        if path.len() > MAX_BOM_DEPTH {
            return Err(DomainError::invariant(format!(
                "bom deeper than {MAX_BOM_DEPTH} levels below {}",
                path[0]
            )));
        }

        let required = qty.scaled(line.qty_per())?;
        if source.lines_for(child).is_empty() {
            let entry = totals.entry(child.clone()).or_insert(Quantity::ZERO);
            *entry = entry.checked_add(required)?;
        } else {
            path.push(child.clone());
            walk(child, required, source, path, totals)?;
            path.pop();
        }
    }
    Ok(())
}
